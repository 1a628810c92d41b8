use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CategoryMapError {
    #[error("A category map needs at least one entry.")]
    Empty,
    #[error("Category '{label}' maps to a non-finite code ({code}).")]
    NonFiniteCode { label: String, code: f64 },
}

/// A fixed mapping from string labels to numeric codes.
///
/// Lookups are exact and case-sensitive. A label outside the map has no code;
/// there is no fallback code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "BTreeMap<String, f64>", into = "BTreeMap<String, f64>")]
pub struct CategoryMap {
    codes: HashMap<String, f64, ahash::RandomState>,
}

impl CategoryMap {
    pub fn new<I, S>(entries: I) -> Result<Self, CategoryMapError>
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        let mut codes: HashMap<String, f64, ahash::RandomState> = HashMap::default();
        for (label, code) in entries {
            let label = label.into();
            if !code.is_finite() {
                return Err(CategoryMapError::NonFiniteCode { label, code });
            }
            codes.insert(label, code);
        }
        if codes.is_empty() {
            return Err(CategoryMapError::Empty);
        }
        Ok(Self { codes })
    }

    /// `male -> 0.0`, `female -> 1.0`.
    pub fn sex() -> Self {
        Self::from_constants(&[("male", 0.0), ("female", 1.0)])
    }

    /// Port of embarkation: `C -> 0.0`, `S -> 1.0`, `Q -> 2.0`.
    pub fn embarked() -> Self {
        Self::from_constants(&[("C", 0.0), ("S", 1.0), ("Q", 2.0)])
    }

    fn from_constants(entries: &[(&str, f64)]) -> Self {
        Self {
            codes: entries
                .iter()
                .map(|&(label, code)| (label.to_string(), code))
                .collect(),
        }
    }

    pub fn map(&self, label: &str) -> Option<f64> {
        self.codes.get(label).copied()
    }
}

impl TryFrom<BTreeMap<String, f64>> for CategoryMap {
    type Error = CategoryMapError;

    fn try_from(entries: BTreeMap<String, f64>) -> Result<Self, Self::Error> {
        Self::new(entries)
    }
}

impl From<CategoryMap> for BTreeMap<String, f64> {
    fn from(map: CategoryMap) -> Self {
        map.codes.into_iter().collect()
    }
}
