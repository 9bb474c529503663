//! Configuration for aggregation runs

use crate::taxon::{TaxonId, INAT_ICONIC_TAXA};
use crate::LinnaeaError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Level size at which aggregation switches from sequential to parallel.
pub const DEFAULT_PARALLEL_THRESHOLD: usize = 6000;
/// Rows handed to each parallel worker.
pub const DEFAULT_CHUNK_SIZE: usize = 2000;
/// Backup snapshot written next to the process before the store replace.
pub const DEFAULT_BACKUP_PATH: &str = "taxa_backup.csv";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregationConfig {
    /// CSV snapshot written before the destructive table replace; deleted
    /// again once the replace succeeds.
    #[serde(default = "default_backup_path")]
    pub backup_path: PathBuf,

    /// DwC-A vernacular names CSV. Common names are skipped when unset.
    #[serde(default)]
    pub common_names_csv: Option<PathBuf>,

    /// Subtree roots aggregated as independent branches. When unset, the
    /// direct children of the tree root are used.
    #[serde(default)]
    pub branch_root_ids: Option<Vec<TaxonId>>,

    /// Taxa eligible as `iconic_taxon_id` values.
    #[serde(default = "default_iconic_taxon_ids")]
    pub iconic_taxon_ids: Vec<TaxonId>,

    /// Level size over which parallelization should be used.
    #[serde(default = "default_parallel_threshold")]
    pub parallel_threshold: usize,

    /// Chunk size per parallel worker.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Worker threads for branch and chunk fan-out. When unset, the global
    /// rayon pool (sized to the machine) is used.
    #[serde(default)]
    pub max_workers: Option<usize>,
}

// Default value functions
fn default_backup_path() -> PathBuf {
    PathBuf::from(DEFAULT_BACKUP_PATH)
}
fn default_iconic_taxon_ids() -> Vec<TaxonId> {
    INAT_ICONIC_TAXA.iter().map(|(id, _)| TaxonId(*id)).collect()
}
fn default_parallel_threshold() -> usize {
    DEFAULT_PARALLEL_THRESHOLD
}
fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

impl Default for AggregationConfig {
    fn default() -> Self {
        Self {
            backup_path: default_backup_path(),
            common_names_csv: None,
            branch_root_ids: None,
            iconic_taxon_ids: default_iconic_taxon_ids(),
            parallel_threshold: default_parallel_threshold(),
            chunk_size: default_chunk_size(),
            max_workers: None,
        }
    }
}

impl AggregationConfig {
    /// Effective worker count for this run.
    pub fn worker_count(&self) -> usize {
        self.max_workers.unwrap_or_else(num_cpus::get)
    }
}

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<AggregationConfig, LinnaeaError> {
    let contents = std::fs::read_to_string(path)?;
    let config: AggregationConfig = toml::from_str(&contents)
        .map_err(|e| LinnaeaError::Config(format!("Failed to parse config: {}", e)))?;
    Ok(config)
}

pub fn save_config<P: AsRef<Path>>(path: P, config: &AggregationConfig) -> Result<(), LinnaeaError> {
    let contents = toml::to_string_pretty(config)
        .map_err(|e| LinnaeaError::Config(format!("Failed to serialize config: {}", e)))?;
    std::fs::write(path, contents)?;
    Ok(())
}
