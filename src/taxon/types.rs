/// Core taxon record types shared across the aggregation pipeline
use serde::{Deserialize, Serialize};
use std::fmt;

/// Taxon ID type - newtype pattern for type safety
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct TaxonId(pub u64);

impl TaxonId {
    /// Create a new TaxonId
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    /// Get the inner value
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaxonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for TaxonId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl From<TaxonId> for u64 {
    fn from(taxon: TaxonId) -> Self {
        taxon.0
    }
}

/// One raw taxon row as read from the taxon store.
///
/// Only the fields an external loader populates; every derived column lives
/// on [`TaxonNode`] and is recomputed from scratch on each aggregation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxonRecord {
    pub id: TaxonId,
    /// None only for the single root taxon
    pub parent_id: Option<TaxonId>,
    pub rank: String,
    pub name: String,
    /// Observations tagged with this exact taxon, not including descendants
    pub own_observation_count: u64,
}

impl TaxonRecord {
    pub fn new(
        id: impl Into<TaxonId>,
        parent_id: Option<TaxonId>,
        rank: impl Into<String>,
        name: impl Into<String>,
        own_observation_count: u64,
    ) -> Self {
        Self {
            id: id.into(),
            parent_id,
            rank: rank.into(),
            name: name.into(),
            own_observation_count,
        }
    }
}

/// A fully aggregated taxon row: the raw record plus every derived column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaxonNode {
    pub id: TaxonId,
    pub parent_id: Option<TaxonId>,
    pub rank: String,
    pub name: String,
    pub own_observation_count: u64,
    /// 0 at the root; `depth == ancestor_ids.len()` always holds
    pub depth: u32,
    /// Path from the root to this taxon's parent, root first, excluding self
    pub ancestor_ids: Vec<TaxonId>,
    /// Direct children in input encounter order; empty for leaf taxa
    pub child_ids: Vec<TaxonId>,
    /// 1 for leaves, otherwise the sum over children
    pub leaf_taxa_count: u64,
    /// `own_observation_count` plus all descendants' counts
    pub aggregated_observation_count: u64,
    /// Nearest ancestor (including self) in the configured iconic set
    pub iconic_taxon_id: Option<TaxonId>,
    pub preferred_common_name: Option<String>,
}

impl TaxonNode {
    /// Recover the raw input row. Derived columns are dropped, which is what
    /// makes rerunning aggregation on a written-back table idempotent.
    pub fn to_record(&self) -> TaxonRecord {
        TaxonRecord {
            id: self.id,
            parent_id: self.parent_id,
            rank: self.rank.clone(),
            name: self.name.clone(),
            own_observation_count: self.own_observation_count,
        }
    }

    pub fn is_leaf(&self) -> bool {
        self.child_ids.is_empty()
    }
}

/// The computed aggregate triple for one taxon.
///
/// Workers fill `id -> TaxonAggregate` maps; the coordinator merges the
/// disjoint maps and assembles [`TaxonNode`]s from them at the end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TaxonAggregate {
    pub leaf_taxa_count: u64,
    pub aggregated_observation_count: u64,
    pub iconic_taxon_id: Option<TaxonId>,
}
