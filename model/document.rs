//! Serialized form of a model-interchange document.
//!
//! These structs mirror the on-disk TOML one-to-one and carry no behaviour. A
//! document is only usable after `verify::check_document` has accepted it and
//! the evaluator has been built from it.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ModelDocument {
    pub header: Header,
    pub data_dictionary: Vec<DataField>,
    pub mining_schema: Vec<MiningField>,
    pub regression: RegressionSpec,
    #[serde(default)]
    pub verification: Option<VerificationSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Header {
    pub description: String,
    #[serde(default)]
    pub application: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpType {
    Continuous,
    Categorical,
}

/// Storage type of a field value. Decides whether a table column is read as a
/// decimal or an integer during marshalling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Double,
    Integer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Closure {
    ClosedClosed,
    ClosedOpen,
    OpenClosed,
    OpenOpen,
}

/// A valid range for a continuous field. A missing margin is unbounded.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Interval {
    pub closure: Closure,
    #[serde(default)]
    pub left: Option<f64>,
    #[serde(default)]
    pub right: Option<f64>,
}

impl Interval {
    pub fn contains(&self, value: f64) -> bool {
        let above_left = match (self.left, self.closure) {
            (None, _) => true,
            (Some(l), Closure::ClosedClosed | Closure::ClosedOpen) => value >= l,
            (Some(l), Closure::OpenClosed | Closure::OpenOpen) => value > l,
        };
        let below_right = match (self.right, self.closure) {
            (None, _) => true,
            (Some(r), Closure::ClosedClosed | Closure::OpenClosed) => value <= r,
            (Some(r), Closure::ClosedOpen | Closure::OpenOpen) => value < r,
        };
        above_left && below_right
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DataField {
    pub name: String,
    pub op_type: OpType,
    pub data_type: DataType,
    /// Valid values for a categorical field. Empty means unrestricted.
    #[serde(default)]
    pub values: Vec<f64>,
    /// Valid ranges for a continuous field. Empty means unrestricted.
    #[serde(default)]
    pub intervals: Vec<Interval>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldUsage {
    Active,
    Target,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidValueTreatment {
    #[default]
    ReturnInvalid,
    AsIs,
    AsMissing,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MiningField {
    pub name: String,
    pub usage: FieldUsage,
    #[serde(default)]
    pub invalid_value_treatment: InvalidValueTreatment,
    #[serde(default)]
    pub missing_value_replacement: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunctionName {
    Classification,
    Regression,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalizationMethod {
    #[default]
    None,
    Logit,
    Softmax,
    Simplemax,
    Exp,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegressionSpec {
    pub function_name: FunctionName,
    #[serde(default)]
    pub normalization_method: NormalizationMethod,
    pub tables: Vec<RegressionTableSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegressionTableSpec {
    pub intercept: f64,
    #[serde(default)]
    pub target_category: Option<f64>,
    #[serde(default)]
    pub predictors: Vec<NumericPredictor>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NumericPredictor {
    pub name: String,
    pub coefficient: f64,
    #[serde(default = "default_exponent")]
    pub exponent: i32,
}

fn default_exponent() -> i32 {
    1
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VerificationSpec {
    /// Relative tolerance for probability and regression outputs.
    #[serde(default = "default_precision")]
    pub precision: f64,
    /// Absolute values below this are treated as zero on both sides.
    #[serde(default = "default_zero_threshold")]
    pub zero_threshold: f64,
    #[serde(default)]
    pub records: Vec<VerificationRecord>,
}

fn default_precision() -> f64 {
    1e-6
}

fn default_zero_threshold() -> f64 {
    1e-16
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VerificationRecord {
    pub inputs: BTreeMap<String, f64>,
    pub expected: BTreeMap<String, f64>,
}
