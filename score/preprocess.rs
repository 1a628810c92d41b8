//! # Feature Preprocessing
//!
//! Column-level feature engineering applied once per dataset, in a fixed
//! order, because later steps consume columns replaced by earlier ones:
//!
//! 1. Drop identifying and free-text columns.
//! 2. Impute missing Age with the mean of the present Age values.
//! 3. Replace Age with its bin index.
//! 4. Impute missing Fare with a constant (0.0 by default, never a statistic).
//! 5. Replace Fare with its bin index.
//! 6. Replace Sex with its category code.
//! 7. Replace Embarked with its category code.
//!
//! No step ever drops or shortens a column. A value that falls outside every
//! bin, or a label with no code, leaves a null cell in place and is recorded as
//! a `RowDefect`. What to do with defective rows is the caller's decision.

use crate::binning::BinTable;
use crate::category::CategoryMap;
use crate::config::PreprocessConfig;
use polars::prelude::*;
use std::fmt;
use thiserror::Error;

pub const AGE: &str = "Age";
pub const FARE: &str = "Fare";
pub const SEX: &str = "Sex";
pub const EMBARKED: &str = "Embarked";

#[derive(Error, Debug)]
pub enum PreprocessError {
    #[error("Error from the underlying Polars DataFrame library: {0}")]
    Polars(#[from] PolarsError),
    #[error("Column '{0}' is required for preprocessing but is absent.")]
    MissingColumn(String),
    #[error("Cannot impute '{0}': the column has missing values but no present ones.")]
    NothingToImpute(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum DefectKind {
    /// The value lies outside every bin interval.
    Unbinned { value: f64 },
    /// The label has no code in the category map. `None` is a missing cell.
    Unmapped { value: Option<String> },
}

/// A cell that could not be turned into a feature value.
#[derive(Debug, Clone, PartialEq)]
pub struct RowDefect {
    pub row: usize,
    pub column: String,
    pub kind: DefectKind,
}

impl fmt::Display for RowDefect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            DefectKind::Unbinned { value } => write!(
                f,
                "row {}: {} value {} falls outside every bin",
                self.row, self.column, value
            ),
            DefectKind::Unmapped { value: Some(label) } => write!(
                f,
                "row {}: {} label '{}' has no code",
                self.row, self.column, label
            ),
            DefectKind::Unmapped { value: None } => {
                write!(f, "row {}: {} is missing", self.row, self.column)
            }
        }
    }
}

/// Result of `impute_mean`.
#[derive(Debug, Clone, PartialEq)]
pub struct Imputation {
    pub values: Vec<f64>,
    /// Mean of the present values, `None` for an empty column.
    pub mean: Option<f64>,
    pub replaced: usize,
}

/// Replaces every missing value with the mean of the present ones.
///
/// Returns `None` when there are missing values but nothing to average.
pub fn impute_mean(values: &[Option<f64>]) -> Option<Imputation> {
    let (sum, count) = values
        .iter()
        .flatten()
        .fold((0.0, 0usize), |(s, n), &v| (s + v, n + 1));
    let replaced = values.len() - count;
    let mean = (count > 0).then(|| sum / count as f64);
    if replaced > 0 && mean.is_none() {
        return None;
    }
    let fill = mean.unwrap_or_default();
    Some(Imputation {
        values: values.iter().map(|v| v.unwrap_or(fill)).collect(),
        mean,
        replaced,
    })
}

/// Replaces every missing value with `fill`.
pub fn impute_constant(values: &[Option<f64>], fill: f64) -> Vec<f64> {
    values.iter().map(|v| v.unwrap_or(fill)).collect()
}

/// Bin index for every value; unassigned values become null plus a defect.
pub fn bin_column(
    column: &str,
    values: &[f64],
    table: &BinTable,
) -> (Vec<Option<i64>>, Vec<RowDefect>) {
    let mut defects = Vec::new();
    let binned = values
        .iter()
        .enumerate()
        .map(|(row, &value)| {
            let index = table.assign(value);
            if index.is_none() {
                defects.push(RowDefect {
                    row,
                    column: column.to_string(),
                    kind: DefectKind::Unbinned { value },
                });
            }
            index.map(|i| i as i64)
        })
        .collect();
    (binned, defects)
}

/// Category code for every label; unmapped or missing labels become null plus
/// a defect.
pub fn map_column(
    column: &str,
    labels: &[Option<String>],
    map: &CategoryMap,
) -> (Vec<Option<f64>>, Vec<RowDefect>) {
    let mut defects = Vec::new();
    let mapped = labels
        .iter()
        .enumerate()
        .map(|(row, label)| {
            let code = label.as_deref().and_then(|l| map.map(l));
            if code.is_none() {
                defects.push(RowDefect {
                    row,
                    column: column.to_string(),
                    kind: DefectKind::Unmapped {
                        value: label.clone(),
                    },
                });
            }
            code
        })
        .collect();
    (mapped, defects)
}

/// The feature table plus everything the preprocessor could not convert.
#[derive(Debug, Clone)]
pub struct PreprocessedTable {
    pub features: DataFrame,
    /// Sorted by row, then by the step that found the defect.
    pub defects: Vec<RowDefect>,
    pub age_mean: Option<f64>,
}

#[derive(Debug, Clone, Default)]
pub struct Preprocessor {
    config: PreprocessConfig,
}

impl Preprocessor {
    pub fn new(config: PreprocessConfig) -> Self {
        Self { config }
    }

    pub fn apply(&self, mut df: DataFrame) -> Result<PreprocessedTable, PreprocessError> {
        let config = &self.config;
        let mut defects = Vec::new();

        for name in &config.dropped_columns {
            if df.get_column_index(name).is_some() {
                df.drop_in_place(name)?;
            }
        }

        let ages = float_column(&df, AGE)?;
        let imputed =
            impute_mean(&ages).ok_or_else(|| PreprocessError::NothingToImpute(AGE.to_string()))?;
        if let Some(mean) = imputed.mean {
            log::info!(
                "Imputed {} missing {AGE} value(s) with mean {mean:.6}",
                imputed.replaced
            );
        }
        let (age_bins, age_defects) = bin_column(AGE, &imputed.values, &config.age_bins);
        df.with_column(Series::new(AGE.into(), age_bins))?;
        defects.extend(age_defects);

        let fares = float_column(&df, FARE)?;
        let missing_fares = fares.iter().filter(|v| v.is_none()).count();
        if missing_fares > 0 {
            log::info!(
                "Imputed {missing_fares} missing {FARE} value(s) with {}",
                config.fare_fill
            );
        }
        let fares = impute_constant(&fares, config.fare_fill);
        let (fare_bins, fare_defects) = bin_column(FARE, &fares, &config.fare_bins);
        df.with_column(Series::new(FARE.into(), fare_bins))?;
        defects.extend(fare_defects);

        for (name, map) in [(SEX, &config.sex_codes), (EMBARKED, &config.embarked_codes)] {
            let labels = text_column(&df, name)?;
            let (codes, map_defects) = map_column(name, &labels, map);
            df.with_column(Series::new(name.into(), codes))?;
            defects.extend(map_defects);
        }

        // Stable: defects found by earlier steps stay first within a row.
        defects.sort_by_key(|d| d.row);
        if !defects.is_empty() {
            log::warn!(
                "Preprocessing found {} defective cell(s) in {} row(s)",
                defects.len(),
                count_rows(&defects)
            );
        }

        Ok(PreprocessedTable {
            features: df,
            defects,
            age_mean: imputed.mean,
        })
    }
}

fn count_rows(defects: &[RowDefect]) -> usize {
    let mut rows: Vec<usize> = defects.iter().map(|d| d.row).collect();
    rows.dedup();
    rows.len()
}

fn float_column(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>, PreprocessError> {
    let column = df
        .column(name)
        .map_err(|_| PreprocessError::MissingColumn(name.to_string()))?;
    let casted = column.cast(&DataType::Float64)?;
    Ok(casted.f64()?.into_iter().collect())
}

fn text_column(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>, PreprocessError> {
    let column = df
        .column(name)
        .map_err(|_| PreprocessError::MissingColumn(name.to_string()))?;
    let casted = column.cast(&DataType::String)?;
    Ok(casted
        .str()?
        .into_iter()
        .map(|v| v.map(str::to_string))
        .collect())
}
