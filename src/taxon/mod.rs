pub mod iconic;
pub mod rank;
pub mod types;

// Re-export commonly used types at module level
pub use iconic::{IconicTaxa, INAT_ICONIC_TAXA};
pub use rank::{format_rank_range, rank_level};
pub use types::{TaxonAggregate, TaxonId, TaxonNode, TaxonRecord};
