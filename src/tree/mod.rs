pub mod ancestry;
pub mod children;
pub mod partition;

// Re-export commonly used types at module level
pub use ancestry::{AncestryError, AncestryTable};
pub use children::ChildIndex;
pub use partition::{branch_roots_at_rank, Branch, Partition, PartitionError, SubtreePartitioner};
