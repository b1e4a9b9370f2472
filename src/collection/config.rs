//! Persisted collection settings: `<name>.json` and `<name>_indexes.json`.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{VdbError, VdbResult};
use crate::index::IndexDefinition;
use crate::storage::StorageError;
use crate::storage::error::IoContext;
use crate::vector::{DistanceMetric, VectorDimension};

/// Contents of a collection's `<name>.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectionConfig {
    #[serde(rename = "Name")]
    pub name: String,

    #[serde(rename = "VectorDimension")]
    pub dimension: VectorDimension,

    #[serde(rename = "DistanceFuncName", with = "metric_name")]
    pub metric: DistanceMetric,

    /// Last persisted squared diagonal of the bounding box.
    #[serde(rename = "DiagonalLength", default)]
    pub diagonal_length: f64,
}

impl CollectionConfig {
    pub fn new(name: impl Into<String>, dimension: VectorDimension, metric: DistanceMetric) -> Self {
        Self {
            name: name.into(),
            dimension,
            metric,
            diagonal_length: 0.0,
        }
    }

    pub fn read(path: &Path) -> VdbResult<Self> {
        let bytes = fs::read(path).with_path(path)?;
        serde_json::from_slice(&bytes)
            .map_err(|e| VdbError::Config(format!("{}: {e}", path.display())))
    }

    pub fn write(&self, path: &Path) -> VdbResult<()> {
        let bytes = serde_json::to_vec_pretty(self)
            .map_err(|e| VdbError::Config(format!("{}: {e}", path.display())))?;
        write_file(path, &bytes)
    }
}

/// Reads index definitions; a missing file means no indexes.
pub fn read_index_definitions(path: &Path) -> VdbResult<Vec<IndexDefinition>> {
    match fs::read(path) {
        Ok(bytes) => serde_json::from_slice(&bytes)
            .map_err(|e| VdbError::Config(format!("{}: {e}", path.display()))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
        Err(e) => Err(StorageError::Io {
            path: path.to_path_buf(),
            source: e,
        }
        .into()),
    }
}

pub fn write_index_definitions(path: &Path, definitions: &[IndexDefinition]) -> VdbResult<()> {
    let bytes = serde_json::to_vec_pretty(definitions)
        .map_err(|e| VdbError::Config(format!("{}: {e}", path.display())))?;
    write_file(path, &bytes)
}

/// Writes beside the target and renames over it.
fn write_file(path: &Path, bytes: &[u8]) -> VdbResult<()> {
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, bytes).with_path(&tmp)?;
    fs::rename(&tmp, path).with_path(path)?;
    Ok(())
}

/// Metric names are matched case-insensitively on read.
mod metric_name {
    use super::*;

    pub fn serialize<S: Serializer>(metric: &DistanceMetric, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(metric.as_str())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<DistanceMetric, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}
