//! Parent-to-children index over the raw taxon table

use crate::taxon::{TaxonId, TaxonRecord};
use std::collections::HashMap;

/// Groups every taxon id under its parent in a single pass.
///
/// Child order within a parent is input encounter order, so two builds over
/// the same rows produce identical orderings everywhere downstream.
#[derive(Debug, Clone, Default)]
pub struct ChildIndex {
    children: HashMap<TaxonId, Vec<TaxonId>>,
}

impl ChildIndex {
    pub fn build(records: &[TaxonRecord]) -> Self {
        let mut children: HashMap<TaxonId, Vec<TaxonId>> = HashMap::new();
        for record in records {
            if let Some(parent) = record.parent_id {
                children.entry(parent).or_default().push(record.id);
            }
        }
        Self { children }
    }

    /// Direct children of `id`, empty for leaves and unknown ids.
    pub fn children(&self, id: TaxonId) -> &[TaxonId] {
        self.children.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_leaf(&self, id: TaxonId) -> bool {
        self.children(id).is_empty()
    }

    /// Number of taxa that have at least one child.
    pub fn parent_count(&self) -> usize {
        self.children.len()
    }
}
