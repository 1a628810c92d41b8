//! Load-time self-consistency checks.
//!
//! `check_document` validates the structure of a freshly parsed document and
//! resolves the ordered input fields and the target. `verify_records` replays
//! the document's embedded verification records through a built scorer and
//! compares the outputs with the expected values.

use super::document::{
    FieldUsage, FunctionName, ModelDocument, NormalizationMethod, VerificationSpec,
};
use super::field::{FieldPreparationError, InputField, RawValue};
use super::record::{FeatureRecord, ResultValue};
use super::regression::TargetField;
use super::{EvaluationError, Scorer};
use itertools::Itertools;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Inconsistency {
    #[error("field '{0}' is declared more than once")]
    DuplicateField(String),
    #[error("mining schema references '{0}', which is not in the data dictionary")]
    UnknownMiningField(String),
    #[error("expected exactly one target field, found {0}")]
    TargetCount(usize),
    #[error("the mining schema declares no active fields")]
    NoActiveFields,
    #[error("predictor '{name}' is not an active field")]
    UnknownPredictor { name: String },
    #[error("a {function:?} model cannot have {found} regression tables")]
    TableCount { function: FunctionName, found: usize },
    #[error("{method:?} normalization does not apply to a {function:?} model")]
    NormalizationNotApplicable {
        method: NormalizationMethod,
        function: FunctionName,
    },
    #[error("regression table {table} has no target category")]
    MissingTargetCategory { table: usize },
    #[error("target category {category} is not a value of the target field")]
    UnknownTargetCategory { category: f64 },
    #[error("target category {category} has more than one regression table")]
    DuplicateTargetCategory { category: f64 },
    #[error("non-finite coefficient for '{name}'")]
    NonFiniteCoefficient { name: String },
    #[error("verification record {record}: {source}")]
    VerificationInput {
        record: usize,
        #[source]
        source: FieldPreparationError,
    },
    #[error("verification record {record}: {source}")]
    VerificationEvaluation {
        record: usize,
        #[source]
        source: EvaluationError,
    },
    #[error("verification record {record}: output '{field}' was not produced")]
    VerificationMissingOutput { record: usize, field: String },
    #[error("verification record {record}: output '{field}' is {actual}, expected {expected}")]
    VerificationMismatch {
        record: usize,
        field: String,
        expected: f64,
        actual: String,
    },
}

/// Input fields in mining-schema order, and the target.
#[derive(Debug, Clone)]
pub struct CheckedSchema {
    pub fields: Vec<InputField>,
    pub target: TargetField,
}

pub fn check_document(document: &ModelDocument) -> Result<CheckedSchema, Inconsistency> {
    if let Some(name) = document
        .data_dictionary
        .iter()
        .map(|f| f.name.as_str())
        .duplicates()
        .next()
    {
        return Err(Inconsistency::DuplicateField(name.to_string()));
    }
    if let Some(name) = document
        .mining_schema
        .iter()
        .map(|f| f.name.as_str())
        .duplicates()
        .next()
    {
        return Err(Inconsistency::DuplicateField(name.to_string()));
    }

    let mut fields = Vec::new();
    let mut targets = Vec::new();
    for mining in &document.mining_schema {
        let data = document
            .data_dictionary
            .iter()
            .find(|d| d.name == mining.name)
            .ok_or_else(|| Inconsistency::UnknownMiningField(mining.name.clone()))?;
        match mining.usage {
            FieldUsage::Active => fields.push(InputField::new(data, mining)),
            FieldUsage::Target => targets.push(TargetField {
                name: data.name.clone(),
                data_type: data.data_type,
                values: data.values.clone(),
            }),
        }
    }

    if targets.len() != 1 {
        return Err(Inconsistency::TargetCount(targets.len()));
    }
    if fields.is_empty() {
        return Err(Inconsistency::NoActiveFields);
    }
    let target = targets.remove(0);

    let regression = &document.regression;
    let tables = &regression.tables;
    match regression.function_name {
        FunctionName::Regression => {
            if tables.len() != 1 {
                return Err(Inconsistency::TableCount {
                    function: regression.function_name,
                    found: tables.len(),
                });
            }
            if matches!(
                regression.normalization_method,
                NormalizationMethod::Softmax | NormalizationMethod::Simplemax
            ) {
                return Err(Inconsistency::NormalizationNotApplicable {
                    method: regression.normalization_method,
                    function: regression.function_name,
                });
            }
        }
        FunctionName::Classification => {
            if tables.len() < 2 {
                return Err(Inconsistency::TableCount {
                    function: regression.function_name,
                    found: tables.len(),
                });
            }
            let mut seen: Vec<f64> = Vec::with_capacity(tables.len());
            for (index, table) in tables.iter().enumerate() {
                let category = table
                    .target_category
                    .ok_or(Inconsistency::MissingTargetCategory { table: index })?;
                if !target.values.is_empty() && !target.values.contains(&category) {
                    return Err(Inconsistency::UnknownTargetCategory { category });
                }
                if seen.contains(&category) {
                    return Err(Inconsistency::DuplicateTargetCategory { category });
                }
                seen.push(category);
            }
        }
    }

    for table in tables {
        if !table.intercept.is_finite() {
            return Err(Inconsistency::NonFiniteCoefficient {
                name: "intercept".to_string(),
            });
        }
        for predictor in &table.predictors {
            if !fields.iter().any(|f| f.name() == predictor.name) {
                return Err(Inconsistency::UnknownPredictor {
                    name: predictor.name.clone(),
                });
            }
            if !predictor.coefficient.is_finite() {
                return Err(Inconsistency::NonFiniteCoefficient {
                    name: predictor.name.clone(),
                });
            }
        }
    }

    Ok(CheckedSchema { fields, target })
}

/// Replays every verification record; returns how many were checked.
pub fn verify_records(
    scorer: &dyn Scorer,
    spec: &VerificationSpec,
) -> Result<usize, Inconsistency> {
    for (index, record) in spec.records.iter().enumerate() {
        let mut arguments = FeatureRecord::with_capacity(scorer.input_fields().len());
        for field in scorer.input_fields() {
            let raw = record
                .inputs
                .get(field.name())
                .map_or(RawValue::Missing, |&v| RawValue::Double(v));
            let value = field
                .prepare(raw)
                .map_err(|source| Inconsistency::VerificationInput {
                    record: index,
                    source,
                })?;
            arguments.insert(field.name(), value);
        }

        let result = scorer
            .evaluate(&arguments)
            .map_err(|source| Inconsistency::VerificationEvaluation {
                record: index,
                source,
            })?;

        for (name, &expected) in &record.expected {
            let actual = result.get(name).ok_or_else(|| {
                Inconsistency::VerificationMissingOutput {
                    record: index,
                    field: name.clone(),
                }
            })?;
            let agrees = match actual {
                ResultValue::Integer(v) => *v as f64 == expected,
                ResultValue::Double(v) => within_precision(*v, expected, spec),
                ResultValue::Text(_) => false,
            };
            if !agrees {
                return Err(Inconsistency::VerificationMismatch {
                    record: index,
                    field: name.clone(),
                    expected,
                    actual: actual.to_string(),
                });
            }
        }
    }
    Ok(spec.records.len())
}

fn within_precision(actual: f64, expected: f64, spec: &VerificationSpec) -> bool {
    if actual.abs() < spec.zero_threshold && expected.abs() < spec.zero_threshold {
        return true;
    }
    (actual - expected).abs() <= spec.precision * expected.abs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::regression::RegressionEvaluator;

    const BASE: &str = r#"
[header]
description = "check fixture"

[[data_dictionary]]
name = "a"
op_type = "continuous"
data_type = "double"

[[data_dictionary]]
name = "t"
op_type = "categorical"
data_type = "integer"
values = [0, 1]

[[mining_schema]]
name = "a"
usage = "active"

[[mining_schema]]
name = "t"
usage = "target"

[regression]
function_name = "classification"
normalization_method = "logit"

[[regression.tables]]
target_category = 1
intercept = 0.0

[[regression.tables.predictors]]
name = "a"
coefficient = 1.0

[[regression.tables]]
target_category = 0
intercept = 0.0
"#;

    fn parse(text: &str) -> ModelDocument {
        toml::from_str(text).unwrap()
    }

    #[test]
    fn accepts_a_well_formed_document() {
        let schema = check_document(&parse(BASE)).unwrap();
        assert_eq!(schema.fields.len(), 1);
        assert_eq!(schema.fields[0].name(), "a");
        assert_eq!(schema.target.name, "t");
    }

    #[test]
    fn rejects_unknown_predictor() {
        let text = BASE.replacen("name = \"a\"\ncoefficient", "name = \"b\"\ncoefficient", 1);
        assert_eq!(
            check_document(&parse(&text)).unwrap_err(),
            Inconsistency::UnknownPredictor {
                name: "b".to_string()
            }
        );
    }

    #[test]
    fn rejects_category_outside_target_values() {
        let text = BASE.replacen("target_category = 0", "target_category = 2", 1);
        assert_eq!(
            check_document(&parse(&text)).unwrap_err(),
            Inconsistency::UnknownTargetCategory { category: 2.0 }
        );
    }

    #[test]
    fn rejects_duplicate_dictionary_entries() {
        let mut document = parse(BASE);
        document.data_dictionary.push(document.data_dictionary[0].clone());
        assert_eq!(
            check_document(&document).unwrap_err(),
            Inconsistency::DuplicateField("a".to_string())
        );
    }

    #[test]
    fn rejects_missing_target() {
        let mut document = parse(BASE);
        document.mining_schema.retain(|m| m.usage == FieldUsage::Active);
        assert_eq!(
            check_document(&document).unwrap_err(),
            Inconsistency::TargetCount(0)
        );
    }

    #[test]
    fn rejects_softmax_regression() {
        let mut document = parse(BASE);
        document.regression.function_name = FunctionName::Regression;
        document.regression.normalization_method = NormalizationMethod::Softmax;
        document.regression.tables.truncate(1);
        assert!(matches!(
            check_document(&document).unwrap_err(),
            Inconsistency::NormalizationNotApplicable { .. }
        ));
    }

    #[test]
    fn verification_records_detect_drift() {
        let evaluator = RegressionEvaluator::from_document(&parse(BASE)).unwrap();

        let good: VerificationSpec = toml::from_str(
            r#"
[[records]]
inputs = { a = 0.0 }
expected = { t = 1, "probability(1)" = 0.5, "probability(0)" = 0.5 }

[[records]]
inputs = { a = -2.0 }
expected = { t = 0, "probability(1)" = 0.11920292202211755 }
"#,
        )
        .unwrap();
        assert_eq!(verify_records(&evaluator, &good), Ok(2));

        let drifted: VerificationSpec = toml::from_str(
            r#"
[[records]]
inputs = { a = -2.0 }
expected = { "probability(1)" = 0.2 }
"#,
        )
        .unwrap();
        assert!(matches!(
            verify_records(&evaluator, &drifted),
            Err(Inconsistency::VerificationMismatch { record: 0, .. })
        ));
    }

    #[test]
    fn verification_reports_unprepared_inputs() {
        let evaluator = RegressionEvaluator::from_document(&parse(BASE)).unwrap();
        let spec: VerificationSpec =
            toml::from_str("[[records]]\ninputs = {}\nexpected = { t = 1 }\n").unwrap();
        assert!(matches!(
            verify_records(&evaluator, &spec),
            Err(Inconsistency::VerificationInput { record: 0, .. })
        ));
    }
}
