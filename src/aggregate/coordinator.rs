//! Aggregation run orchestration
//!
//! The coordinator owns the store handle and walks one run through its
//! stages: derive ancestry, partition the tree, fan branches out over
//! workers, finish the levels above the branches, merge in common names,
//! and persist through the backup-guarded writer. Branch maps are private
//! per worker and key-disjoint, so the fan-in merge needs no locking, and
//! nothing is persisted unless every stage succeeds.

use crate::aggregate::level::{AggregateMap, AggregationWorkerError, LevelAggregator, AGGREGATE_TASK};
use crate::config::AggregationConfig;
use crate::names::load_common_names;
use crate::progress::{LogProgress, ProgressObserver, ProgressRelay, ProgressSender};
use crate::store::TaxonStore;
use crate::taxon::{format_rank_range, IconicTaxa, TaxonId, TaxonNode, TaxonRecord};
use crate::tree::{AncestryTable, ChildIndex, Partition, SubtreePartitioner};
use crate::writer::ResultWriter;
use crate::{LinnaeaError, Result};
use rayon::prelude::*;
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Stages of one aggregation run. `Failed` is terminal and reachable from
/// every other stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregationStage {
    Idle,
    BuildingAncestry,
    PartitioningBranches,
    AggregatingBranches,
    AggregatingUpperLevels,
    LoadingAuxiliaryData,
    Persisting,
    Done,
    Failed,
}

impl AggregationStage {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::BuildingAncestry => "Computing ancestry",
            Self::PartitioningBranches => "Partitioning branches",
            Self::AggregatingBranches => "Aggregating branches",
            Self::AggregatingUpperLevels => "Aggregating upper levels",
            Self::LoadingAuxiliaryData => "Loading common names",
            Self::Persisting => "Saving results",
            Self::Done => "Done",
            Self::Failed => "Failed",
        }
    }
}

impl fmt::Display for AggregationStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AggregationStats {
    pub taxa_count: usize,
    pub branch_count: usize,
    pub level_count: usize,
    pub max_depth: u32,
    /// Levels large enough to have fanned out over worker chunks.
    pub parallel_levels: usize,
    pub elapsed: Duration,
}

/// The outcome of a successful run: every node fully aggregated, in input
/// row order, plus run statistics.
#[derive(Debug, Clone)]
pub struct AggregatedTaxonomy {
    pub nodes: Vec<TaxonNode>,
    pub stats: AggregationStats,
}

/// Read-only inputs shared by every aggregation worker.
struct AggregationContext<'a> {
    children: &'a ChildIndex,
    ancestry: &'a AncestryTable,
    iconic: &'a IconicTaxa,
    own_counts: &'a HashMap<TaxonId, u64>,
    parallel_threshold: usize,
    chunk_size: usize,
}

impl<'a> AggregationContext<'a> {
    fn aggregator(&self, progress: ProgressSender) -> LevelAggregator<'a> {
        LevelAggregator::new(self.children, self.ancestry, self.iconic, self.own_counts)
            .with_parallel_threshold(self.parallel_threshold)
            .with_chunk_size(self.chunk_size)
            .with_progress(progress)
    }
}

pub struct AggregationCoordinator {
    store: Box<dyn TaxonStore>,
    config: AggregationConfig,
    observer: Option<Box<dyn ProgressObserver>>,
    common_names: Option<HashMap<TaxonId, String>>,
    stage: AggregationStage,
}

impl AggregationCoordinator {
    pub fn new(store: Box<dyn TaxonStore>, config: AggregationConfig) -> Self {
        Self {
            store,
            config,
            observer: None,
            common_names: None,
            stage: AggregationStage::Idle,
        }
    }

    /// Observer for this coordinator's next run (the run consumes it).
    /// Without one, progress goes to the log.
    pub fn with_observer(mut self, observer: Box<dyn ProgressObserver>) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Inject common names directly instead of loading the configured CSV.
    pub fn with_common_names(mut self, names: HashMap<TaxonId, String>) -> Self {
        self.common_names = Some(names);
        self
    }

    pub fn stage(&self) -> AggregationStage {
        self.stage
    }

    /// Execute one full aggregation run.
    pub fn run(&mut self) -> Result<AggregatedTaxonomy> {
        let start = Instant::now();
        let observer = self
            .observer
            .take()
            .unwrap_or_else(|| Box::new(LogProgress::default()) as Box<dyn ProgressObserver>);
        let (relay, progress) = ProgressRelay::spawn(observer);

        let result = self.run_stages(&progress, start);
        if result.is_err() {
            self.set_stage(AggregationStage::Failed);
        }
        relay.finish(progress);
        result
    }

    fn run_stages(
        &mut self,
        progress: &ProgressSender,
        start: Instant,
    ) -> Result<AggregatedTaxonomy> {
        self.set_stage(AggregationStage::BuildingAncestry);
        progress.stage("Computing ancestry", 0);
        progress.message("Computing ancestry...");
        let records = self.store.load_taxa().map_err(LinnaeaError::Store)?;
        let children = ChildIndex::build(&records);
        let ancestry = AncestryTable::build(&records, &children)?;
        progress.message(format!(
            "Loaded {} taxa (max depth {})",
            records.len(),
            ancestry.max_depth()
        ));

        let own_counts: HashMap<TaxonId, u64> = records
            .iter()
            .map(|r| (r.id, r.own_observation_count))
            .collect();
        let ranks_by_id: HashMap<TaxonId, &str> = records
            .iter()
            .map(|r| (r.id, r.rank.as_str()))
            .collect();
        let iconic = IconicTaxa::from_ids(self.config.iconic_taxon_ids.iter().copied());

        self.set_stage(AggregationStage::PartitioningBranches);
        progress.stage("Partitioning branches", 0);
        let branch_roots = match &self.config.branch_root_ids {
            Some(roots) => roots.clone(),
            None => children.children(ancestry.root()).to_vec(),
        };
        let partition = SubtreePartitioner::new(&children, &ancestry).partition(&branch_roots)?;
        progress.message(format!(
            "Partitioned into {} branches ({} taxa, {} above the branches)",
            partition.branches.len(),
            partition.branch_taxa(),
            partition.upper_taxa()
        ));

        let pool = build_pool(self.config.max_workers)?;
        let ctx = AggregationContext {
            children: &children,
            ancestry: &ancestry,
            iconic: &iconic,
            own_counts: &own_counts,
            parallel_threshold: self.config.parallel_threshold,
            chunk_size: self.config.chunk_size,
        };

        self.set_stage(AggregationStage::AggregatingBranches);
        progress.stage(AGGREGATE_TASK, records.len() as u64);
        info!(
            workers = self.config.worker_count(),
            branches = partition.branches.len(),
            taxa = records.len(),
            "starting aggregation"
        );
        let mut aggregates =
            run_in_pool(&pool, || aggregate_branches(&ctx, &partition, progress))?;

        self.set_stage(AggregationStage::AggregatingUpperLevels);
        run_in_pool(&pool, || {
            aggregate_upper_levels(
                &ctx,
                &partition.upper_levels,
                &ranks_by_id,
                &mut aggregates,
                progress,
            )
        })?;

        self.set_stage(AggregationStage::LoadingAuxiliaryData);
        progress.stage("Loading common names", 0);
        progress.message("Loading common names...");
        let common_names = match self.common_names.take() {
            Some(names) => names,
            None => match &self.config.common_names_csv {
                Some(path) => load_common_names(path)?,
                None => HashMap::new(),
            },
        };

        self.set_stage(AggregationStage::Persisting);
        progress.stage("Saving results", 0);
        progress.message("Saving results...");
        let nodes = assemble_nodes(&records, &children, &ancestry, &aggregates, &common_names);
        let writer = ResultWriter::new(self.config.backup_path.clone());
        writer.persist(self.store.as_ref(), &nodes)?;

        let elapsed = start.elapsed();
        let stats = AggregationStats {
            taxa_count: records.len(),
            branch_count: partition.branches.len(),
            level_count: ancestry.levels().len(),
            max_depth: ancestry.max_depth(),
            parallel_levels: count_parallel_levels(&partition, self.config.parallel_threshold),
            elapsed,
        };
        self.set_stage(AggregationStage::Done);
        progress.message(format!(
            "Completed taxonomy aggregation in {:.2}s",
            elapsed.as_secs_f64()
        ));
        Ok(AggregatedTaxonomy { nodes, stats })
    }

    fn set_stage(&mut self, stage: AggregationStage) {
        debug!(from = %self.stage, to = %stage, "stage transition");
        self.stage = stage;
    }
}

fn build_pool(max_workers: Option<usize>) -> Result<Option<ThreadPool>> {
    match max_workers {
        Some(n) if n > 0 => {
            let pool = ThreadPoolBuilder::new()
                .num_threads(n)
                .build()
                .map_err(|e| LinnaeaError::Internal(format!("failed to build worker pool: {e}")))?;
            Ok(Some(pool))
        }
        _ => Ok(None),
    }
}

fn run_in_pool<R: Send>(pool: &Option<ThreadPool>, op: impl FnOnce() -> R + Send) -> R {
    match pool {
        Some(pool) => pool.install(op),
        None => op(),
    }
}

/// Fan branches out over workers, each filling a private map. Any branch
/// failure discards every map; on success the disjoint maps merge into one.
fn aggregate_branches(
    ctx: &AggregationContext<'_>,
    partition: &Partition,
    progress: &ProgressSender,
) -> std::result::Result<AggregateMap, AggregationWorkerError> {
    let mut master = AggregateMap::with_capacity(partition.branch_taxa() + partition.upper_taxa());
    if partition.branches.is_empty() {
        return Ok(master);
    }

    let locals: Vec<AggregateMap> = partition
        .branches
        .par_iter()
        .map(|branch| {
            progress.message(format!(
                "Processing branch {} ({} taxa)",
                branch.root, branch.size
            ));
            let aggregator = ctx.aggregator(progress.clone());
            let mut local = AggregateMap::with_capacity(branch.size);
            match catch_unwind(AssertUnwindSafe(|| {
                aggregator.aggregate_levels(&branch.levels, &mut local)
            })) {
                Ok(Ok(())) => Ok(local),
                Ok(Err(e)) => Err(e),
                Err(_) => Err(AggregationWorkerError::BranchPanicked { root: branch.root }),
            }
        })
        .collect::<std::result::Result<Vec<_>, _>>()?;

    for local in locals {
        master.extend(local);
    }
    Ok(master)
}

/// Sequentially finish every level no branch claimed, deepest first. Branch
/// totals are already in the map, so parents of branch roots see them.
fn aggregate_upper_levels(
    ctx: &AggregationContext<'_>,
    upper_levels: &[Vec<TaxonId>],
    ranks_by_id: &HashMap<TaxonId, &str>,
    aggregates: &mut AggregateMap,
    progress: &ProgressSender,
) -> std::result::Result<(), AggregationWorkerError> {
    let aggregator = ctx.aggregator(progress.clone());
    for depth in (0..upper_levels.len()).rev() {
        let ids = &upper_levels[depth];
        if ids.is_empty() {
            continue;
        }
        progress.message(format!(
            "Aggregating level {} ({})...",
            depth,
            level_rank_label(ranks_by_id, ids)
        ));
        aggregator
            .aggregate_levels(std::slice::from_ref(ids), aggregates)
            .map_err(|e| match e {
                AggregationWorkerError::LevelPanicked { .. } => {
                    AggregationWorkerError::LevelPanicked { depth }
                }
                other => other,
            })?;
    }
    Ok(())
}

fn level_rank_label(ranks_by_id: &HashMap<TaxonId, &str>, ids: &[TaxonId]) -> String {
    let mut ranks: Vec<&str> = Vec::new();
    for id in ids {
        if let Some(&rank) = ranks_by_id.get(id) {
            if !ranks.contains(&rank) {
                ranks.push(rank);
            }
        }
    }
    format_rank_range(&ranks)
}

/// Assemble the final nodes in input row order. Raw fields pass through
/// untouched; every derived column comes from this run.
fn assemble_nodes(
    records: &[TaxonRecord],
    children: &ChildIndex,
    ancestry: &AncestryTable,
    aggregates: &AggregateMap,
    common_names: &HashMap<TaxonId, String>,
) -> Vec<TaxonNode> {
    records
        .iter()
        .map(|record| {
            let aggregate = aggregates.get(&record.id).copied().unwrap_or_default();
            TaxonNode {
                id: record.id,
                parent_id: record.parent_id,
                rank: record.rank.clone(),
                name: record.name.clone(),
                own_observation_count: record.own_observation_count,
                depth: ancestry.depth(record.id).unwrap_or(0),
                ancestor_ids: ancestry.ancestors(record.id).to_vec(),
                child_ids: children.children(record.id).to_vec(),
                leaf_taxa_count: aggregate.leaf_taxa_count,
                aggregated_observation_count: aggregate.aggregated_observation_count,
                iconic_taxon_id: aggregate.iconic_taxon_id,
                preferred_common_name: common_names.get(&record.id).cloned(),
            }
        })
        .collect()
}

fn count_parallel_levels(partition: &Partition, threshold: usize) -> usize {
    partition
        .branches
        .iter()
        .flat_map(|b| b.levels.iter())
        .chain(partition.upper_levels.iter())
        .filter(|level| level.len() >= threshold)
        .count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_labels() {
        assert_eq!(AggregationStage::BuildingAncestry.label(), "Computing ancestry");
        assert_eq!(AggregationStage::Persisting.to_string(), "Saving results");
    }

    #[test]
    fn test_level_rank_label_spans_ranks() {
        let ranks_by_id: HashMap<TaxonId, &str> = [
            (TaxonId(1), "genus"),
            (TaxonId(2), "species"),
            (TaxonId(3), "species"),
        ]
        .into_iter()
        .collect();

        let label = level_rank_label(&ranks_by_id, &[TaxonId(1), TaxonId(2), TaxonId(3)]);
        assert_eq!(label, "species through genus");
        let single = level_rank_label(&ranks_by_id, &[TaxonId(2), TaxonId(3)]);
        assert_eq!(single, "species");
    }

    #[test]
    fn test_count_parallel_levels() {
        let partition = Partition {
            branches: vec![crate::tree::Branch {
                root: TaxonId(2),
                levels: vec![vec![TaxonId(2)], vec![TaxonId(3); 10]],
                size: 11,
            }],
            upper_levels: vec![vec![TaxonId(1)]],
        };
        assert_eq!(count_parallel_levels(&partition, 5), 1);
        assert_eq!(count_parallel_levels(&partition, 1), 3);
        assert_eq!(count_parallel_levels(&partition, 100), 0);
    }
}
