//! Parallel subtree aggregation for large taxonomic classification trees.
//!
//! Given a flat taxon table (id, parent id, rank, name, observation count),
//! linnaea derives the tree structure, rolls observation and leaf-taxon
//! counts up from the leaves, resolves each taxon's nearest iconic ancestor,
//! merges in vernacular names, and writes the fully aggregated table back
//! through a crash-safe, backup-guarded replace.
//!
//! ```no_run
//! use linnaea::aggregate::AggregationCoordinator;
//! use linnaea::config::AggregationConfig;
//! use linnaea::store::MemoryTaxonStore;
//! use linnaea::taxon::TaxonRecord;
//!
//! # fn main() -> linnaea::Result<()> {
//! let store = MemoryTaxonStore::new(vec![
//!     TaxonRecord::new(48460u64, None, "stateofmatter", "Life", 0),
//!     TaxonRecord::new(1u64, Some(48460.into()), "kingdom", "Animalia", 4),
//! ]);
//! let mut coordinator =
//!     AggregationCoordinator::new(Box::new(store.clone()), AggregationConfig::default());
//! let aggregated = coordinator.run()?;
//! assert_eq!(aggregated.nodes[0].leaf_taxa_count, 1);
//! # Ok(())
//! # }
//! ```

pub mod aggregate;
pub mod config;
pub mod names;
pub mod progress;
pub mod store;
pub mod taxon;
pub mod tree;
pub mod writer;

pub use crate::aggregate::{AggregatedTaxonomy, AggregationCoordinator, AggregationStage};
pub use crate::config::AggregationConfig;
pub use crate::store::TaxonStore;
pub use crate::taxon::{TaxonId, TaxonNode, TaxonRecord};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LinnaeaError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Ancestry error: {0}")]
    Ancestry(#[from] crate::tree::AncestryError),

    #[error("Partition error: {0}")]
    Partition(#[from] crate::tree::PartitionError),

    #[error("Aggregation error: {0}")]
    Worker(#[from] crate::aggregate::AggregationWorkerError),

    #[error("Persistence error: {0}")]
    Persistence(#[from] crate::writer::PersistenceError),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Taxon store error: {0}")]
    Store(anyhow::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("{0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, LinnaeaError>;
