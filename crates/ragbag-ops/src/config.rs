//! Operator configuration.

use ragbag_core::DType;
use serde::{Deserialize, Serialize};
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Json(#[from] serde_json::Error),
}

/// Configuration shared by the operators in this crate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpsConfig {
    /// Dtypes `group_by_indices` and `unique` may sort by.
    pub sortable_dtypes: Vec<DType>,
    pub extract: ExtractConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractConfig {
    /// Upper bound on traversal tasks per call; `None` means unbounded.
    pub max_tasks: Option<usize>,
}

impl Default for OpsConfig {
    fn default() -> Self {
        Self {
            sortable_dtypes: vec![
                DType::Int32,
                DType::Int64,
                DType::Float32,
                DType::Float64,
                DType::Bool,
                DType::Mask,
                DType::Text,
                DType::Bytes,
            ],
            extract: ExtractConfig::default(),
        }
    }
}

impl OpsConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&text)
    }

    pub fn is_sortable(&self, dtype: DType) -> bool {
        self.sortable_dtypes.contains(&dtype)
    }
}
