//! Vernacular (common) name loading
//!
//! Reads the DwC-A taxonomy export's per-language vernacular names CSV.
//! Only the `id` and `vernacularName` columns are used; the export carries
//! several more, all ignored.

use crate::taxon::TaxonId;
use crate::Result;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
struct VernacularRow {
    id: TaxonId,
    #[serde(rename = "vernacularName")]
    vernacular_name: String,
}

/// Load `id -> preferred common name`, keeping the first row per id (the
/// export is already sorted by relevance). A missing file is not an error:
/// it is reported and an empty map returned, so aggregation can proceed
/// without names.
pub fn load_common_names<P: AsRef<Path>>(path: P) -> Result<HashMap<TaxonId, String>> {
    let path = path.as_ref();
    if !path.is_file() {
        warn!(
            path = %path.display(),
            "file not found; common names will not be loaded"
        );
        return Ok(HashMap::new());
    }

    let mut reader = csv::Reader::from_path(path)?;
    let mut names = HashMap::new();
    for row in reader.deserialize() {
        let row: VernacularRow = row?;
        names.entry(row.id).or_insert(row.vernacular_name);
    }
    debug!(count = names.len(), "loaded common names");
    Ok(names)
}
