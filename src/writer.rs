//! Transactional write-back of aggregated taxa
//!
//! The store replace is destructive, so a full CSV snapshot is written
//! first. On success the snapshot is deleted again; on failure it stays on
//! disk and the error names it, making the run recoverable by hand or by
//! [`read_backup`]. Id sequences are flattened to comma-joined columns.

use crate::store::TaxonStore;
use crate::taxon::{TaxonId, TaxonNode};
use crate::{LinnaeaError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("failed writing backup snapshot {path}: {reason}")]
    BackupFailed { path: PathBuf, reason: String },

    #[error("store replace failed ({reason}); backup available at {backup_path}")]
    ReplaceFailed { backup_path: PathBuf, reason: String },

    #[error("malformed snapshot {path}: {reason}")]
    MalformedSnapshot { path: PathBuf, reason: String },
}

/// One flattened CSV row of the full backup snapshot.
#[derive(Debug, Serialize, Deserialize)]
struct BackupRow {
    id: TaxonId,
    parent_id: Option<TaxonId>,
    rank: String,
    name: String,
    own_observation_count: u64,
    depth: u32,
    ancestor_ids: Option<String>,
    child_ids: Option<String>,
    leaf_taxa_count: u64,
    aggregated_observation_count: u64,
    iconic_taxon_id: Option<TaxonId>,
    preferred_common_name: Option<String>,
}

impl BackupRow {
    fn from_node(node: &TaxonNode) -> Self {
        Self {
            id: node.id,
            parent_id: node.parent_id,
            rank: node.rank.clone(),
            name: node.name.clone(),
            own_observation_count: node.own_observation_count,
            depth: node.depth,
            ancestor_ids: join_ids(&node.ancestor_ids),
            child_ids: join_ids(&node.child_ids),
            leaf_taxa_count: node.leaf_taxa_count,
            aggregated_observation_count: node.aggregated_observation_count,
            iconic_taxon_id: node.iconic_taxon_id,
            preferred_common_name: node.preferred_common_name.clone(),
        }
    }

    fn into_node(self, path: &Path) -> Result<TaxonNode> {
        Ok(TaxonNode {
            id: self.id,
            parent_id: self.parent_id,
            rank: self.rank,
            name: self.name,
            own_observation_count: self.own_observation_count,
            depth: self.depth,
            ancestor_ids: split_ids(self.ancestor_ids.as_deref(), path)?,
            child_ids: split_ids(self.child_ids.as_deref(), path)?,
            leaf_taxa_count: self.leaf_taxa_count,
            aggregated_observation_count: self.aggregated_observation_count,
            iconic_taxon_id: self.iconic_taxon_id,
            preferred_common_name: self.preferred_common_name,
        })
    }
}

fn join_ids(ids: &[TaxonId]) -> Option<String> {
    if ids.is_empty() {
        None
    } else {
        Some(
            ids.iter()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join(","),
        )
    }
}

fn split_ids(joined: Option<&str>, path: &Path) -> Result<Vec<TaxonId>> {
    let Some(joined) = joined else {
        return Ok(Vec::new());
    };
    if joined.is_empty() {
        return Ok(Vec::new());
    }
    joined
        .split(',')
        .map(|part| {
            part.trim().parse::<u64>().map(TaxonId).map_err(|e| {
                PersistenceError::MalformedSnapshot {
                    path: path.to_path_buf(),
                    reason: format!("invalid id {part:?}: {e}"),
                }
                .into()
            })
        })
        .collect()
}

fn ensure_parent_dir(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// Writes the aggregated node set back to a [`TaxonStore`], guarded by a
/// CSV backup at a configured path.
pub struct ResultWriter {
    backup_path: PathBuf,
}

impl ResultWriter {
    pub fn new<P: Into<PathBuf>>(backup_path: P) -> Self {
        Self {
            backup_path: backup_path.into(),
        }
    }

    pub fn backup_path(&self) -> &Path {
        &self.backup_path
    }

    /// Snapshot to CSV, then replace the store table. The backup outlives
    /// only failed runs.
    pub fn persist(&self, store: &dyn TaxonStore, nodes: &[TaxonNode]) -> Result<()> {
        self.write_backup(nodes)?;
        match store.replace_taxa(nodes) {
            Ok(()) => {
                if let Err(e) = std::fs::remove_file(&self.backup_path) {
                    warn!(
                        path = %self.backup_path.display(),
                        error = %e,
                        "backup could not be removed after successful replace"
                    );
                }
                info!(taxa = nodes.len(), "taxon table replaced");
                Ok(())
            }
            Err(e) => {
                warn!(
                    path = %self.backup_path.display(),
                    "failed writing to store; backup retained"
                );
                Err(PersistenceError::ReplaceFailed {
                    backup_path: self.backup_path.clone(),
                    reason: e.to_string(),
                }
                .into())
            }
        }
    }

    fn write_backup(&self, nodes: &[TaxonNode]) -> Result<()> {
        let backup_error = |reason: String| PersistenceError::BackupFailed {
            path: self.backup_path.clone(),
            reason,
        };
        ensure_parent_dir(&self.backup_path).map_err(|e| backup_error(e.to_string()))?;
        let mut writer =
            csv::Writer::from_path(&self.backup_path).map_err(|e| backup_error(e.to_string()))?;
        for node in nodes {
            writer
                .serialize(BackupRow::from_node(node))
                .map_err(|e| backup_error(e.to_string()))?;
        }
        writer.flush().map_err(|e| backup_error(e.to_string()))?;
        Ok(())
    }

    /// Join a saved aggregates snapshot onto the store's current raw rows
    /// and persist the result through the same backup-guarded path. Rows
    /// absent from the snapshot keep their raw fields with zeroed counts.
    pub fn apply_aggregates_snapshot<P: AsRef<Path>>(
        &self,
        store: &dyn TaxonStore,
        snapshot_path: P,
    ) -> Result<Vec<TaxonNode>> {
        let snapshot_path = snapshot_path.as_ref();
        let records = store.load_taxa().map_err(LinnaeaError::Store)?;
        let aggregates = read_aggregate_rows(snapshot_path)?;

        let mut nodes = Vec::with_capacity(records.len());
        for record in records {
            let node = match aggregates.get(&record.id) {
                Some(row) => {
                    let ancestor_ids = split_ids(row.ancestor_ids.as_deref(), snapshot_path)?;
                    TaxonNode {
                        depth: ancestor_ids.len() as u32,
                        ancestor_ids,
                        child_ids: split_ids(row.child_ids.as_deref(), snapshot_path)?,
                        leaf_taxa_count: row.leaf_taxa_count,
                        aggregated_observation_count: row.aggregated_observation_count,
                        iconic_taxon_id: row.iconic_taxon_id,
                        preferred_common_name: row.preferred_common_name.clone(),
                        id: record.id,
                        parent_id: record.parent_id,
                        rank: record.rank,
                        name: record.name,
                        own_observation_count: record.own_observation_count,
                    }
                }
                None => TaxonNode {
                    id: record.id,
                    parent_id: record.parent_id,
                    rank: record.rank,
                    name: record.name,
                    own_observation_count: record.own_observation_count,
                    depth: 0,
                    ancestor_ids: Vec::new(),
                    child_ids: Vec::new(),
                    leaf_taxa_count: 0,
                    aggregated_observation_count: 0,
                    iconic_taxon_id: None,
                    preferred_common_name: None,
                },
            };
            nodes.push(node);
        }

        self.persist(store, &nodes)?;
        Ok(nodes)
    }
}

/// Restore the node set from a retained backup snapshot.
pub fn read_backup<P: AsRef<Path>>(path: P) -> Result<Vec<TaxonNode>> {
    let path = path.as_ref();
    let mut reader = csv::Reader::from_path(path)?;
    let mut nodes = Vec::new();
    for row in reader.deserialize() {
        let row: BackupRow = row?;
        nodes.push(row.into_node(path)?);
    }
    Ok(nodes)
}

/// One row of the minimal aggregates-only snapshot: just the computed
/// columns, keyed by id.
#[derive(Debug, Serialize, Deserialize)]
struct AggregateRow {
    id: TaxonId,
    ancestor_ids: Option<String>,
    child_ids: Option<String>,
    iconic_taxon_id: Option<TaxonId>,
    aggregated_observation_count: u64,
    leaf_taxa_count: u64,
    preferred_common_name: Option<String>,
}

/// Save just the computed columns, most observed taxa first, for reuse
/// against a freshly loaded raw table.
pub fn write_aggregates_snapshot<P: AsRef<Path>>(path: P, nodes: &[TaxonNode]) -> Result<()> {
    let path = path.as_ref();
    ensure_parent_dir(path)?;

    let mut sorted: Vec<&TaxonNode> = nodes.iter().collect();
    // Stable sort keeps input order among equal counts
    sorted.sort_by(|a, b| {
        b.aggregated_observation_count
            .cmp(&a.aggregated_observation_count)
    });

    let mut writer = csv::Writer::from_path(path)?;
    for node in sorted {
        writer.serialize(AggregateRow {
            id: node.id,
            ancestor_ids: join_ids(&node.ancestor_ids),
            child_ids: join_ids(&node.child_ids),
            iconic_taxon_id: node.iconic_taxon_id,
            aggregated_observation_count: node.aggregated_observation_count,
            leaf_taxa_count: node.leaf_taxa_count,
            preferred_common_name: node.preferred_common_name.clone(),
        })?;
    }
    writer.flush()?;
    info!(path = %path.display(), taxa = nodes.len(), "aggregates snapshot saved");
    Ok(())
}

fn read_aggregate_rows(path: &Path) -> Result<HashMap<TaxonId, AggregateRow>> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut rows = HashMap::new();
    for row in reader.deserialize() {
        let row: AggregateRow = row?;
        rows.insert(row.id, row);
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryTaxonStore;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn sample_nodes() -> Vec<TaxonNode> {
        vec![
            TaxonNode {
                id: TaxonId(1),
                parent_id: None,
                rank: "stateofmatter".to_string(),
                name: "Life".to_string(),
                own_observation_count: 0,
                depth: 0,
                ancestor_ids: vec![],
                child_ids: vec![TaxonId(2)],
                leaf_taxa_count: 1,
                aggregated_observation_count: 7,
                iconic_taxon_id: None,
                preferred_common_name: None,
            },
            TaxonNode {
                id: TaxonId(2),
                parent_id: Some(TaxonId(1)),
                rank: "species".to_string(),
                name: "Sturnus vulgaris".to_string(),
                own_observation_count: 7,
                depth: 1,
                ancestor_ids: vec![TaxonId(1)],
                child_ids: vec![],
                leaf_taxa_count: 1,
                aggregated_observation_count: 7,
                iconic_taxon_id: Some(TaxonId(1)),
                preferred_common_name: Some("European Starling".to_string()),
            },
        ]
    }

    #[test]
    fn test_backup_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("backup.csv");
        let nodes = sample_nodes();

        ResultWriter::new(&path).write_backup(&nodes).unwrap();
        let restored = read_backup(&path).unwrap();
        assert_eq!(restored, nodes);
    }

    #[test]
    fn test_persist_removes_backup_on_success() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("backup.csv");
        let store = MemoryTaxonStore::new(vec![]);
        let nodes = sample_nodes();

        ResultWriter::new(&path).persist(&store, &nodes).unwrap();
        assert!(!path.exists());
        assert_eq!(store.nodes(), nodes);
    }

    #[test]
    fn test_join_and_split_ids() {
        let ids = vec![TaxonId(1), TaxonId(2), TaxonId(30)];
        let joined = join_ids(&ids);
        assert_eq!(joined.as_deref(), Some("1,2,30"));
        assert_eq!(
            split_ids(joined.as_deref(), Path::new("x.csv")).unwrap(),
            ids
        );
        assert_eq!(join_ids(&[]), None);
        assert!(split_ids(None, Path::new("x.csv")).unwrap().is_empty());
    }

    #[test]
    fn test_split_rejects_garbage() {
        let result = split_ids(Some("1,two,3"), Path::new("bad.csv"));
        assert!(matches!(
            result,
            Err(LinnaeaError::Persistence(
                PersistenceError::MalformedSnapshot { .. }
            ))
        ));
    }

    #[test]
    fn test_aggregates_snapshot_round_trip() {
        let dir = TempDir::new().unwrap();
        let snapshot = dir.path().join("agg").join("taxon_aggregates.csv");
        let backup = dir.path().join("backup.csv");
        let nodes = sample_nodes();

        write_aggregates_snapshot(&snapshot, &nodes).unwrap();

        // A store holding only the raw rows, plus one row the snapshot
        // does not know about
        let mut records: Vec<_> = nodes.iter().map(TaxonNode::to_record).collect();
        records.push(crate::taxon::TaxonRecord::new(99u64, Some(TaxonId(1)), "species", "Novel", 3));
        let store = MemoryTaxonStore::new(records);

        let writer = ResultWriter::new(&backup);
        let restored = writer.apply_aggregates_snapshot(&store, &snapshot).unwrap();

        assert_eq!(restored.len(), 3);
        assert_eq!(restored[1].preferred_common_name.as_deref(), Some("European Starling"));
        assert_eq!(restored[1].depth, 1);
        // Unknown row defaults its computed columns to zero
        assert_eq!(restored[2].aggregated_observation_count, 0);
        assert_eq!(restored[2].leaf_taxa_count, 0);
        assert!(!backup.exists());
    }
}
