//! Breadth-first ancestry derivation for the taxonomy tree
//!
//! Depth and ancestor chains are never trusted from the input; they are
//! rebuilt here from the bare parent relation on every run. The same pass
//! groups ids by depth, and those level groups drive every level-ordered
//! stage downstream.

use crate::taxon::{TaxonId, TaxonRecord};
use crate::tree::ChildIndex;
use std::collections::{HashMap, HashSet};
use thiserror::Error;
use tracing::debug;

/// Structural defects in the parent relation. All of these abort the run
/// before any aggregation starts.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AncestryError {
    #[error("taxon table is empty")]
    EmptyTable,

    #[error("no root taxon found (expected exactly one row without a parent)")]
    MissingRoot,

    #[error("multiple root taxa found: {first} and {second}")]
    MultipleRoots { first: TaxonId, second: TaxonId },

    #[error("duplicate taxon id {id}")]
    DuplicateId { id: TaxonId },

    #[error("taxon {id} has unresolved parent {parent} (missing row or parent cycle)")]
    UnresolvedParent { id: TaxonId, parent: TaxonId },
}

/// Per-taxon depth and root-first ancestor chains for the whole tree.
#[derive(Debug, Clone)]
pub struct AncestryTable {
    root: TaxonId,
    depths: HashMap<TaxonId, u32>,
    ancestors: HashMap<TaxonId, Vec<TaxonId>>,
    /// `levels[d]` holds every id at depth `d`, in traversal order.
    levels: Vec<Vec<TaxonId>>,
}

impl AncestryTable {
    /// Walk the tree breadth-first from the root, assigning each taxon its
    /// depth and ancestor chain (parent's chain plus the parent itself).
    ///
    /// A row never reached from the root means its parent is either absent
    /// from the table or part of a parent cycle; the first such row in input
    /// order is reported.
    pub fn build(records: &[TaxonRecord], children: &ChildIndex) -> Result<Self, AncestryError> {
        if records.is_empty() {
            return Err(AncestryError::EmptyTable);
        }

        let mut seen: HashSet<TaxonId> = HashSet::with_capacity(records.len());
        let mut root: Option<TaxonId> = None;
        for record in records {
            if !seen.insert(record.id) {
                return Err(AncestryError::DuplicateId { id: record.id });
            }
            if record.parent_id.is_none() {
                match root {
                    None => root = Some(record.id),
                    Some(first) => {
                        return Err(AncestryError::MultipleRoots {
                            first,
                            second: record.id,
                        })
                    }
                }
            }
        }
        let root = root.ok_or(AncestryError::MissingRoot)?;

        let mut depths: HashMap<TaxonId, u32> = HashMap::with_capacity(records.len());
        let mut ancestors: HashMap<TaxonId, Vec<TaxonId>> = HashMap::with_capacity(records.len());
        let mut levels: Vec<Vec<TaxonId>> = Vec::new();

        depths.insert(root, 0);
        ancestors.insert(root, Vec::new());

        let mut frontier = vec![root];
        let mut depth: u32 = 0;
        while !frontier.is_empty() {
            let mut next = Vec::new();
            for &id in &frontier {
                for &child in children.children(id) {
                    let mut chain = ancestors[&id].clone();
                    chain.push(id);
                    depths.insert(child, depth + 1);
                    ancestors.insert(child, chain);
                    next.push(child);
                }
            }
            levels.push(frontier);
            frontier = next;
            depth += 1;
        }

        if depths.len() != records.len() {
            // Every unresolved parent leaves its whole subtree unreached;
            // report the earliest unreached row.
            for record in records {
                if !depths.contains_key(&record.id) {
                    return Err(AncestryError::UnresolvedParent {
                        id: record.id,
                        parent: record.parent_id.unwrap_or(record.id),
                    });
                }
            }
        }

        debug!(
            taxa = records.len(),
            max_depth = levels.len().saturating_sub(1),
            "ancestry table built"
        );

        Ok(Self {
            root,
            depths,
            ancestors,
            levels,
        })
    }

    pub fn root(&self) -> TaxonId {
        self.root
    }

    pub fn contains(&self, id: TaxonId) -> bool {
        self.depths.contains_key(&id)
    }

    pub fn depth(&self, id: TaxonId) -> Option<u32> {
        self.depths.get(&id).copied()
    }

    /// Root-first chain from the root down to `id`'s parent, excluding `id`
    /// itself. Empty for the root and for unknown ids.
    pub fn ancestors(&self, id: TaxonId) -> &[TaxonId] {
        self.ancestors.get(&id).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Ids grouped by depth, root level first.
    pub fn levels(&self) -> &[Vec<TaxonId>] {
        &self.levels
    }

    pub fn max_depth(&self) -> u32 {
        self.levels.len().saturating_sub(1) as u32
    }

    pub fn len(&self) -> usize {
        self.depths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.depths.is_empty()
    }
}
