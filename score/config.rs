use crate::binning::BinTable;
use crate::category::CategoryMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Identifying and free-text columns removed before feature engineering.
pub const DROPPED_COLUMNS: [&str; 4] = ["PassengerId", "Name", "Ticket", "Cabin"];

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read preprocessing config '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse preprocessing config '{path}': {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

/// Constants consumed by the preprocessor. Everything here is immutable once
/// the pipeline starts; the defaults are the thresholds and codes the shipped
/// model was trained against.
///
/// A TOML file may override any subset of the fields:
///
/// ```toml
/// fare_fill = 0.0
/// age_bins = [0.0, 18.0, 24.0, 29.0, 35.0, 42.0, 80.10]
///
/// [embarked_codes]
/// C = 0.0
/// S = 1.0
/// Q = 2.0
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PreprocessConfig {
    pub dropped_columns: Vec<String>,
    pub age_bins: BinTable,
    pub fare_bins: BinTable,
    /// Fare nulls are filled with this constant, not with a column statistic.
    pub fare_fill: f64,
    pub sex_codes: CategoryMap,
    pub embarked_codes: CategoryMap,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            dropped_columns: DROPPED_COLUMNS.iter().map(|c| c.to_string()).collect(),
            age_bins: BinTable::age(),
            fare_bins: BinTable::fare(),
            fare_fill: 0.0,
            sex_codes: CategoryMap::sex(),
            embarked_codes: CategoryMap::embarked(),
        }
    }
}

impl PreprocessConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        log::debug!("Loaded preprocessing config from '{}'", path.display());
        Ok(config)
    }
}
