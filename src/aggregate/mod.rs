pub mod coordinator;
pub mod level;

// Re-export commonly used types at module level
pub use coordinator::{
    AggregatedTaxonomy, AggregationCoordinator, AggregationStage, AggregationStats,
};
pub use level::{AggregateMap, AggregationWorkerError, LevelAggregator};
