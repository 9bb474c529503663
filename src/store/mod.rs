//! Taxon storage abstraction
//!
//! The aggregation engine reads the raw taxon table once per run and writes
//! the aggregated table back once. Durable backends (SQLite and friends)
//! live with callers; the engine only depends on this trait.

use crate::taxon::{TaxonNode, TaxonRecord};
use anyhow::Result;

pub mod memory;

pub use memory::MemoryTaxonStore;

pub trait TaxonStore: Send + Sync {
    /// Load every raw taxon row.
    fn load_taxa(&self) -> Result<Vec<TaxonRecord>>;

    /// Replace the full taxon table with the aggregated nodes.
    ///
    /// Implementations must be all-or-nothing: either every row is replaced
    /// or the previous table is left untouched. The engine relies on this to
    /// guarantee no partial state is ever visible.
    fn replace_taxa(&self, nodes: &[TaxonNode]) -> Result<()>;
}
