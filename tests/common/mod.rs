/// Common test utilities for linnaea integration tests
///
/// Shared fixture trees and store doubles, to avoid duplicating test setup
/// across the integration test crates.
use anyhow::anyhow;
use linnaea::store::{MemoryTaxonStore, TaxonStore};
use linnaea::taxon::{TaxonId, TaxonNode, TaxonRecord};

/// Initialize test logging (call once per test module)
#[allow(dead_code)]
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[allow(dead_code)]
pub fn record(id: u64, parent: Option<u64>, rank: &str, count: u64) -> TaxonRecord {
    TaxonRecord::new(id, parent.map(TaxonId), rank, format!("taxon {id}"), count)
}

/// The canonical five-node tree: root -> kingdom -> phylum -> two species
/// with 5 and 7 observations.
#[allow(dead_code)]
pub fn five_node_tree() -> Vec<TaxonRecord> {
    vec![
        record(1, None, "root", 0),
        record(2, Some(1), "k", 0),
        record(3, Some(2), "p", 0),
        record(4, Some(3), "species", 5),
        record(5, Some(3), "species", 7),
    ]
}

/// A balanced tree: the root plus `fanout` children per node down to
/// `depth` levels, every leaf carrying one observation. Ids are assigned
/// breadth-first starting at 1.
#[allow(dead_code)]
pub fn balanced_tree(fanout: u64, depth: u32) -> Vec<TaxonRecord> {
    let ranks = ["stateofmatter", "kingdom", "phylum", "class", "order", "family", "genus", "species"];
    let mut records = vec![record(1, None, ranks[0], 0)];
    let mut next_id = 2;
    let mut frontier = vec![1u64];
    for level in 1..=depth {
        let rank = ranks[(level as usize).min(ranks.len() - 1)];
        let mut next_frontier = Vec::new();
        for parent in frontier {
            for _ in 0..fanout {
                let count = if level == depth { 1 } else { 0 };
                records.push(record(next_id, Some(parent), rank, count));
                next_frontier.push(next_id);
                next_id += 1;
            }
        }
        frontier = next_frontier;
    }
    records
}

/// A store whose reads succeed but whose replace always fails, for
/// exercising the backup-retention path.
#[allow(dead_code)]
#[derive(Clone)]
pub struct FailingStore {
    inner: MemoryTaxonStore,
}

#[allow(dead_code)]
impl FailingStore {
    pub fn new(records: Vec<TaxonRecord>) -> Self {
        Self {
            inner: MemoryTaxonStore::new(records),
        }
    }

    pub fn records(&self) -> Vec<TaxonRecord> {
        self.inner.records()
    }
}

impl TaxonStore for FailingStore {
    fn load_taxa(&self) -> anyhow::Result<Vec<TaxonRecord>> {
        self.inner.load_taxa()
    }

    fn replace_taxa(&self, _nodes: &[TaxonNode]) -> anyhow::Result<()> {
        Err(anyhow!("simulated store failure"))
    }
}
