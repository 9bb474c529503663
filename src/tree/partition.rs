//! Disjoint subtree partitioning for parallel aggregation
//!
//! A partition splits the tree into branches (one per requested branch root,
//! covering that root's whole subtree) plus the upper remainder: everything
//! no branch claims. Branches never overlap, so each one can be aggregated
//! into a private map with no coordination, and the remainder is finished
//! sequentially once every branch total is in.

use crate::taxon::{TaxonId, TaxonRecord};
use crate::tree::{AncestryTable, ChildIndex};
use std::collections::HashSet;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PartitionError {
    #[error("branch root {id} is not in the taxonomy")]
    UnknownRoot { id: TaxonId },

    #[error("branch root {id} listed more than once")]
    DuplicateRoot { id: TaxonId },

    #[error("branch root {child} lies inside the subtree of branch root {ancestor}")]
    NestedRoots { ancestor: TaxonId, child: TaxonId },
}

/// One branch of the partition: a root and its entire descendant closure,
/// grouped by depth relative to the branch root (branch root first).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Branch {
    pub root: TaxonId,
    pub levels: Vec<Vec<TaxonId>>,
    pub size: usize,
}

/// The full partition: disjoint branches plus the unclaimed remainder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    pub branches: Vec<Branch>,
    /// Unclaimed ids grouped by absolute depth, root level first. Interior
    /// levels may be empty; trailing empty levels are trimmed.
    pub upper_levels: Vec<Vec<TaxonId>>,
}

impl Partition {
    pub fn branch_taxa(&self) -> usize {
        self.branches.iter().map(|b| b.size).sum()
    }

    pub fn upper_taxa(&self) -> usize {
        self.upper_levels.iter().map(Vec::len).sum()
    }
}

pub struct SubtreePartitioner<'a> {
    children: &'a ChildIndex,
    ancestry: &'a AncestryTable,
}

impl<'a> SubtreePartitioner<'a> {
    pub fn new(children: &'a ChildIndex, ancestry: &'a AncestryTable) -> Self {
        Self { children, ancestry }
    }

    /// Split the tree at the given branch roots.
    ///
    /// Every root must exist, appear once, and not sit inside another
    /// requested branch; nesting would make two branches share rows. An
    /// empty root list is a valid degenerate partition where everything
    /// lands in `upper_levels`.
    pub fn partition(&self, roots: &[TaxonId]) -> Result<Partition, PartitionError> {
        let mut unique: HashSet<TaxonId> = HashSet::with_capacity(roots.len());
        for &root in roots {
            if !self.ancestry.contains(root) {
                return Err(PartitionError::UnknownRoot { id: root });
            }
            if !unique.insert(root) {
                return Err(PartitionError::DuplicateRoot { id: root });
            }
        }
        for &root in roots {
            if let Some(ancestor) = self
                .ancestry
                .ancestors(root)
                .iter()
                .copied()
                .find(|a| unique.contains(a))
            {
                return Err(PartitionError::NestedRoots {
                    ancestor,
                    child: root,
                });
            }
        }

        let mut claimed: HashSet<TaxonId> = HashSet::new();
        let branches: Vec<Branch> = roots
            .iter()
            .map(|&root| {
                let branch = self.expand_branch(root);
                for level in &branch.levels {
                    claimed.extend(level.iter().copied());
                }
                branch
            })
            .collect();

        let mut upper_levels: Vec<Vec<TaxonId>> = self
            .ancestry
            .levels()
            .iter()
            .map(|level| {
                level
                    .iter()
                    .copied()
                    .filter(|id| !claimed.contains(id))
                    .collect()
            })
            .collect();
        while upper_levels.last().is_some_and(Vec::is_empty) {
            upper_levels.pop();
        }

        debug!(
            branches = branches.len(),
            branch_taxa = claimed.len(),
            upper_taxa = upper_levels.iter().map(Vec::len).sum::<usize>(),
            "tree partitioned"
        );

        Ok(Partition {
            branches,
            upper_levels,
        })
    }

    /// Per-level fan-out over the child index, collecting the branch root's
    /// descendant closure grouped by relative depth.
    fn expand_branch(&self, root: TaxonId) -> Branch {
        let mut levels: Vec<Vec<TaxonId>> = Vec::new();
        let mut size = 0;
        let mut frontier = vec![root];
        while !frontier.is_empty() {
            let next: Vec<TaxonId> = frontier
                .iter()
                .flat_map(|&id| self.children.children(id).iter().copied())
                .collect();
            size += frontier.len();
            levels.push(frontier);
            frontier = next;
        }
        Branch { root, levels, size }
    }
}

/// Pick branch roots by rank: every taxon at `rank` whose parent is not in
/// `exclude_parents`, in input order. Excluding a parent keeps that parent's
/// entire subtree out of the branch fan-out so it can be handled separately.
pub fn branch_roots_at_rank(
    records: &[TaxonRecord],
    rank: &str,
    exclude_parents: &[TaxonId],
) -> Vec<TaxonId> {
    records
        .iter()
        .filter(|r| r.rank == rank)
        .filter(|r| !r.parent_id.is_some_and(|p| exclude_parents.contains(&p)))
        .map(|r| r.id)
        .collect()
}
