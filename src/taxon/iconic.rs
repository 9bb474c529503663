//! Iconic taxon resolution
//!
//! Iconic taxa are a small fixed set of high-level taxa (Aves, Mammalia,
//! Fungi, ...) used for coarse classification in search and display. Every
//! taxon resolves to the nearest ancestor (including itself) that belongs
//! to the set, or to none at all.

use crate::taxon::TaxonId;
use std::collections::HashSet;

/// The iNaturalist iconic taxa, id and scientific name.
///
/// The synthetic "Unknown" entry (id 0) is intentionally absent: it is a UI
/// placeholder, never a real ancestor.
pub const INAT_ICONIC_TAXA: &[(u64, &str)] = &[
    (1, "Animalia"),
    (3, "Aves"),
    (20978, "Amphibia"),
    (26036, "Reptilia"),
    (40151, "Mammalia"),
    (47115, "Mollusca"),
    (47119, "Arachnida"),
    (47126, "Plantae"),
    (47158, "Insecta"),
    (47170, "Fungi"),
    (47178, "Actinopterygii"),
    (47686, "Protozoa"),
    (48222, "Chromista"),
];

/// The set of iconic taxon ids consulted during aggregation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IconicTaxa {
    ids: HashSet<TaxonId>,
}

impl IconicTaxa {
    pub fn from_ids<I>(ids: I) -> Self
    where
        I: IntoIterator,
        I::Item: Into<TaxonId>,
    {
        Self {
            ids: ids.into_iter().map(Into::into).collect(),
        }
    }

    /// The default iNaturalist set from [`INAT_ICONIC_TAXA`].
    pub fn inat_default() -> Self {
        Self::from_ids(INAT_ICONIC_TAXA.iter().map(|(id, _)| *id))
    }

    pub fn contains(&self, id: TaxonId) -> bool {
        self.ids.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Resolve the most specific iconic taxon for a node: the node itself if
    /// iconic, otherwise the closest ancestor in the set (`ancestors` is
    /// root-first, so the scan runs from the back).
    pub fn nearest(&self, id: TaxonId, ancestors: &[TaxonId]) -> Option<TaxonId> {
        if self.contains(id) {
            return Some(id);
        }
        ancestors.iter().rev().copied().find(|a| self.contains(*a))
    }
}

impl Default for IconicTaxa {
    fn default() -> Self {
        Self::inat_default()
    }
}
