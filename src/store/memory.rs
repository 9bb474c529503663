//! In-memory taxon store

use crate::store::TaxonStore;
use crate::taxon::{TaxonNode, TaxonRecord};
use anyhow::{anyhow, Result};
use std::sync::{Arc, Mutex, MutexGuard};

#[derive(Debug, Default)]
struct Inner {
    records: Vec<TaxonRecord>,
    nodes: Vec<TaxonNode>,
}

/// Reference [`TaxonStore`] holding the table in memory.
///
/// Clones share the same table, so a clone kept outside the engine can
/// inspect what a run wrote. Useful as a test double and for callers that
/// persist elsewhere themselves.
#[derive(Debug, Clone, Default)]
pub struct MemoryTaxonStore {
    inner: Arc<Mutex<Inner>>,
}

impl MemoryTaxonStore {
    pub fn new(records: Vec<TaxonRecord>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Inner {
                records,
                nodes: Vec::new(),
            })),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Inner>> {
        self.inner
            .lock()
            .map_err(|_| anyhow!("taxon store lock poisoned"))
    }

    /// Current raw rows.
    pub fn records(&self) -> Vec<TaxonRecord> {
        self.inner
            .lock()
            .map(|inner| inner.records.clone())
            .unwrap_or_default()
    }

    /// Aggregated nodes from the last successful replace.
    pub fn nodes(&self) -> Vec<TaxonNode> {
        self.inner
            .lock()
            .map(|inner| inner.nodes.clone())
            .unwrap_or_default()
    }
}

impl TaxonStore for MemoryTaxonStore {
    fn load_taxa(&self) -> Result<Vec<TaxonRecord>> {
        Ok(self.lock()?.records.clone())
    }

    fn replace_taxa(&self, nodes: &[TaxonNode]) -> Result<()> {
        let mut inner = self.lock()?;
        inner.records = nodes.iter().map(TaxonNode::to_record).collect();
        inner.nodes = nodes.to_vec();
        Ok(())
    }
}
