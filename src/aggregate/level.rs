//! Bottom-up per-level aggregation
//!
//! Levels are processed deepest first, so every child is fully aggregated
//! before its parent. Small levels run sequentially; levels at or above the
//! parallel threshold are pre-summed into independent rows and fanned out
//! over rayon chunks. Both paths compute identical values.

use crate::progress::ProgressSender;
use crate::taxon::{IconicTaxa, TaxonAggregate, TaxonId};
use crate::tree::{AncestryTable, ChildIndex};
use rayon::prelude::*;
use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use thiserror::Error;
use tracing::debug;

/// Progress task shared by the coordinator and both execution paths.
pub(crate) const AGGREGATE_TASK: &str = "Aggregating";

/// Sequential rows per progress increment.
const SEQUENTIAL_REPORT_INTERVAL: usize = 100;

/// Aggregates keyed by taxon id; merged disjointly across branches.
pub type AggregateMap = HashMap<TaxonId, TaxonAggregate>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AggregationWorkerError {
    #[error("aggregation worker panicked while processing level {depth}")]
    LevelPanicked { depth: usize },

    #[error("aggregation worker panicked while processing branch {root}")]
    BranchPanicked { root: TaxonId },
}

/// One pre-summed input row for the parallel path. Child contributions are
/// folded in by the caller, so workers touch no shared aggregate state.
struct PreparedRow<'t> {
    id: TaxonId,
    has_children: bool,
    own_count: u64,
    child_observation_sum: u64,
    child_leaf_sum: u64,
    ancestors: &'t [TaxonId],
}

/// Aggregates one run of levels (a branch or the upper remainder) into an
/// [`AggregateMap`].
pub struct LevelAggregator<'a> {
    children: &'a ChildIndex,
    ancestry: &'a AncestryTable,
    iconic: &'a IconicTaxa,
    own_counts: &'a HashMap<TaxonId, u64>,
    parallel_threshold: usize,
    chunk_size: usize,
    progress: ProgressSender,
}

impl<'a> LevelAggregator<'a> {
    pub fn new(
        children: &'a ChildIndex,
        ancestry: &'a AncestryTable,
        iconic: &'a IconicTaxa,
        own_counts: &'a HashMap<TaxonId, u64>,
    ) -> Self {
        Self {
            children,
            ancestry,
            iconic,
            own_counts,
            parallel_threshold: crate::config::DEFAULT_PARALLEL_THRESHOLD,
            chunk_size: crate::config::DEFAULT_CHUNK_SIZE,
            progress: ProgressSender::disconnected(),
        }
    }

    /// Levels at or above this size fan out over rayon.
    pub fn with_parallel_threshold(mut self, threshold: usize) -> Self {
        self.parallel_threshold = threshold;
        self
    }

    /// Rows handed to each parallel worker.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.max(1);
        self
    }

    pub fn with_progress(mut self, progress: ProgressSender) -> Self {
        self.progress = progress;
        self
    }

    /// Process `levels` from the deepest up to the first, filling
    /// `aggregates`. The map must already hold every node below the given
    /// levels (for branches that is nothing; for the upper remainder it is
    /// every branch total).
    pub fn aggregate_levels(
        &self,
        levels: &[Vec<TaxonId>],
        aggregates: &mut AggregateMap,
    ) -> Result<(), AggregationWorkerError> {
        for (depth, ids) in levels.iter().enumerate().rev() {
            if ids.is_empty() {
                continue;
            }
            if ids.len() < self.parallel_threshold {
                self.aggregate_level(ids, aggregates);
            } else {
                self.aggregate_level_parallel(depth, ids, aggregates)?;
            }
        }
        Ok(())
    }

    fn aggregate_level(&self, ids: &[TaxonId], aggregates: &mut AggregateMap) {
        for (i, &id) in ids.iter().enumerate() {
            let aggregate = self.compute_one(id, aggregates);
            aggregates.insert(id, aggregate);
            if (i + 1) % SEQUENTIAL_REPORT_INTERVAL == 0 {
                self.progress
                    .advance(AGGREGATE_TASK, SEQUENTIAL_REPORT_INTERVAL as u64);
            }
        }
        let remaining = ids.len() % SEQUENTIAL_REPORT_INTERVAL;
        if remaining > 0 {
            self.progress.advance(AGGREGATE_TASK, remaining as u64);
        }
    }

    fn aggregate_level_parallel(
        &self,
        depth: usize,
        ids: &[TaxonId],
        aggregates: &mut AggregateMap,
    ) -> Result<(), AggregationWorkerError> {
        let rows: Vec<PreparedRow<'_>> = ids
            .iter()
            .map(|&id| self.prepare_row(id, aggregates))
            .collect();
        debug!(
            depth,
            taxa = rows.len(),
            chunks = rows.len().div_ceil(self.chunk_size),
            "processing level in parallel"
        );

        let iconic = self.iconic;
        let progress = &self.progress;
        let chunk_results = catch_unwind(AssertUnwindSafe(|| {
            rows.par_chunks(self.chunk_size)
                .map(|chunk| {
                    let mut results = Vec::with_capacity(chunk.len());
                    // Report roughly ten times per chunk, never per row
                    let report_interval = (chunk.len() / 10).max(1);
                    for (i, row) in chunk.iter().enumerate() {
                        results.push((row.id, compute_prepared(row, iconic)));
                        if (i + 1) % report_interval == 0 {
                            progress.advance(AGGREGATE_TASK, report_interval as u64);
                        }
                    }
                    let remaining = chunk.len() % report_interval;
                    if remaining > 0 {
                        progress.advance(AGGREGATE_TASK, remaining as u64);
                    }
                    results
                })
                .collect::<Vec<Vec<(TaxonId, TaxonAggregate)>>>()
        }))
        .map_err(|_| AggregationWorkerError::LevelPanicked { depth })?;

        for chunk in chunk_results {
            aggregates.extend(chunk);
        }
        Ok(())
    }

    /// Pre-sum one row's child contributions out of the aggregate map.
    /// Children sit one level deeper and are already aggregated.
    fn prepare_row(&self, id: TaxonId, aggregates: &AggregateMap) -> PreparedRow<'_> {
        let child_ids = self.children.children(id);
        let mut child_observation_sum = 0;
        let mut child_leaf_sum = 0;
        for child in child_ids {
            let child_aggregate = aggregates.get(child).copied().unwrap_or_default();
            child_observation_sum += child_aggregate.aggregated_observation_count;
            child_leaf_sum += child_aggregate.leaf_taxa_count;
        }
        PreparedRow {
            id,
            has_children: !child_ids.is_empty(),
            own_count: self.own_counts.get(&id).copied().unwrap_or(0),
            child_observation_sum,
            child_leaf_sum,
            ancestors: self.ancestry.ancestors(id),
        }
    }

    fn compute_one(&self, id: TaxonId, aggregates: &AggregateMap) -> TaxonAggregate {
        let row = self.prepare_row(id, aggregates);
        compute_prepared(&row, self.iconic)
    }
}

fn compute_prepared(row: &PreparedRow<'_>, iconic: &IconicTaxa) -> TaxonAggregate {
    let leaf_taxa_count = if row.has_children {
        row.child_leaf_sum
    } else {
        1
    };
    TaxonAggregate {
        leaf_taxa_count,
        aggregated_observation_count: row.own_count + row.child_observation_sum,
        iconic_taxon_id: iconic.nearest(row.id, row.ancestors),
    }
}
