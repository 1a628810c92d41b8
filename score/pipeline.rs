// ========================================================================================
//
//                     THE EVALUATION LOOP: FROM RAW ROWS TO SUBMISSION
//
// ========================================================================================
//
// Drives one batch end to end: read the test table, split off the identifiers,
// preprocess, settle row defects, marshal each row field-by-field into the
// model's schema, evaluate, and assemble the two-column submission.
//
// Row order is the invariant everything else protects. Identifiers are taken
// before preprocessing and travel alongside the feature table; any row removed
// from one is removed from the other in the same step.

use crate::io::{PASSENGER_ID, SURVIVED, TestFileReadError, read_test_table};
use crate::model::document::DataType as FieldType;
use crate::model::field::{FieldPreparationError, InputField, RawValue};
use crate::model::record::{FeatureRecord, ResultRecord, ResultValue};
use crate::model::{EvaluationError, ModelHandle};
use crate::preprocess::{PreprocessError, PreprocessedTable, Preprocessor, RowDefect};
use polars::prelude::*;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// What to do with rows that cannot be turned into model arguments, either
/// because preprocessing left a cell unconverted or because a value falls
/// outside the domain the model declares for its field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum RowDefectPolicy {
    /// The first defective row fails the whole batch.
    #[default]
    Abort,
    /// Defective rows are logged and left out of the submission.
    Skip,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResultExtractionError {
    #[error("the result has no '{field}' field")]
    Missing { field: String },
    #[error("result field '{field}' is not numeric ({value})")]
    NotNumeric { field: String, value: String },
    #[error("result field '{field}' is not an integer ({value})")]
    NotInteger { field: String, value: f64 },
}

#[derive(Error, Debug)]
pub enum PredictError {
    #[error(transparent)]
    Read(#[from] TestFileReadError),
    #[error("No model is loaded (source '{}'); cannot predict", path.display())]
    ModelNotLoaded { path: PathBuf },
    #[error("Preprocessing failed: {0}")]
    Preprocess(#[from] PreprocessError),
    #[error("Row {row} has no PassengerId")]
    MissingIdentifier { row: usize },
    #[error("Defective row for PassengerId {passenger_id}: {defect}")]
    RowDefect {
        passenger_id: i64,
        defect: RowDefect,
    },
    #[error("Feature table does not match the model schema: {0}")]
    Schema(#[source] FieldPreparationError),
    #[error("Failed to prepare row {row} (PassengerId {passenger_id}): {source}")]
    FieldPreparation {
        row: usize,
        passenger_id: i64,
        #[source]
        source: FieldPreparationError,
    },
    #[error("Failed to evaluate row {row} (PassengerId {passenger_id}): {source}")]
    Evaluation {
        row: usize,
        passenger_id: i64,
        #[source]
        source: EvaluationError,
    },
    #[error("No usable outcome for row {row} (PassengerId {passenger_id}): {source}")]
    ResultExtraction {
        row: usize,
        passenger_id: i64,
        #[source]
        source: ResultExtractionError,
    },
    #[error("Error from the underlying Polars DataFrame library: {0}")]
    Polars(#[from] PolarsError),
}

#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    preprocessor: Preprocessor,
    policy: RowDefectPolicy,
}

impl Pipeline {
    pub fn new(preprocessor: Preprocessor, policy: RowDefectPolicy) -> Self {
        Self {
            preprocessor,
            policy,
        }
    }

    /// Reads `test_path` and predicts every row with `handle`.
    ///
    /// The table is read before the handle is checked, so a missing test file
    /// is reported even when the model also failed to load.
    pub fn predict(
        &self,
        handle: &ModelHandle,
        test_path: impl AsRef<Path>,
    ) -> Result<DataFrame, PredictError> {
        let raw = read_test_table(test_path)?;
        self.predict_frame(handle, raw)
    }

    /// Predicts every row of an in-memory raw table.
    pub fn predict_frame(
        &self,
        handle: &ModelHandle,
        raw: DataFrame,
    ) -> Result<DataFrame, PredictError> {
        if !handle.is_loaded() {
            return Err(PredictError::ModelNotLoaded {
                path: handle.source().to_path_buf(),
            });
        }

        let ids = passenger_ids(&raw)?;
        let table = self.preprocessor.apply(raw)?;
        let (features, ids) = settle_defects(table, ids, self.policy)?;

        log::info!("Scoring {} row(s)", features.height());
        let (ids, predictions) = evaluate_rows(handle, &features, &ids, self.policy)?;
        log::info!(
            "Predicted {} of {} row(s) as survivors",
            predictions.iter().filter(|&&p| p == 1).count(),
            predictions.len()
        );

        let submission = DataFrame::new(vec![
            Series::new(PASSENGER_ID.into(), ids).into(),
            Series::new(SURVIVED.into(), predictions).into(),
        ])?;
        Ok(submission)
    }
}

fn passenger_ids(raw: &DataFrame) -> Result<Vec<i64>, PredictError> {
    let column = raw
        .column(PASSENGER_ID)
        .map_err(|_| PreprocessError::MissingColumn(PASSENGER_ID.to_string()))?
        .cast(&DataType::Int64)?;
    column
        .i64()?
        .into_iter()
        .enumerate()
        .map(|(row, id)| id.ok_or(PredictError::MissingIdentifier { row }))
        .collect()
}

/// Applies the defect policy, keeping identifiers and features row-aligned.
fn settle_defects(
    table: PreprocessedTable,
    mut ids: Vec<i64>,
    policy: RowDefectPolicy,
) -> Result<(DataFrame, Vec<i64>), PredictError> {
    let PreprocessedTable {
        features, defects, ..
    } = table;
    if defects.is_empty() {
        return Ok((features, ids));
    }

    match policy {
        RowDefectPolicy::Abort => {
            let defect = defects[0].clone();
            Err(PredictError::RowDefect {
                passenger_id: ids[defect.row],
                defect,
            })
        }
        RowDefectPolicy::Skip => {
            let mut keep = vec![true; ids.len()];
            for defect in &defects {
                log::warn!("Skipping PassengerId {}: {defect}", ids[defect.row]);
                keep[defect.row] = false;
            }
            let mask = Series::new("keep".into(), keep.as_slice());
            let features = features.filter(mask.bool()?)?;
            let mut flags = keep.iter();
            ids.retain(|_| flags.next().copied().unwrap_or(false));
            log::warn!(
                "Skipped {} defective row(s); {} remain",
                keep.iter().filter(|&&k| !k).count(),
                ids.len()
            );
            Ok((features, ids))
        }
    }
}

/// A feature column read once, in the representation its field declares.
enum TypedColumn {
    Double(Float64Chunked),
    Integer(Int64Chunked),
}

impl TypedColumn {
    fn read(features: &DataFrame, field: &InputField) -> Result<Self, PredictError> {
        let column = features.column(field.name()).map_err(|_| {
            PredictError::Schema(FieldPreparationError::ColumnNotFound {
                field: field.name().to_string(),
            })
        })?;
        // Integer fields read integer columns directly; a decimal column is read
        // as decimals so preparation can reject fractional values instead of
        // truncating them.
        let typed = match field.data_type() {
            FieldType::Integer if column.dtype().is_integer() => {
                TypedColumn::Integer(column.cast(&DataType::Int64)?.i64()?.clone())
            }
            _ => TypedColumn::Double(column.cast(&DataType::Float64)?.f64()?.clone()),
        };
        Ok(typed)
    }

    fn raw(&self, row: usize) -> RawValue {
        match self {
            TypedColumn::Double(ca) => ca.get(row).map_or(RawValue::Missing, RawValue::Double),
            TypedColumn::Integer(ca) => ca.get(row).map_or(RawValue::Missing, RawValue::Integer),
        }
    }
}

/// Scores every feature row. Returns the identifiers that were scored and
/// their outcomes, index-aligned.
fn evaluate_rows(
    handle: &ModelHandle,
    features: &DataFrame,
    ids: &[i64],
    policy: RowDefectPolicy,
) -> Result<(Vec<i64>, Vec<i64>), PredictError> {
    let fields = handle.input_fields();
    let columns = fields
        .iter()
        .map(|field| TypedColumn::read(features, field))
        .collect::<Result<Vec<_>, _>>()?;

    let mut scored = Vec::with_capacity(features.height());
    let mut predictions = Vec::with_capacity(features.height());
    for (row, &passenger_id) in ids.iter().enumerate().take(features.height()) {
        let arguments = match prepare_row(fields, &columns, row) {
            Ok(arguments) => arguments,
            Err(source) if policy == RowDefectPolicy::Skip => {
                log::warn!("Skipping PassengerId {passenger_id}: {source}");
                continue;
            }
            Err(source) => {
                return Err(PredictError::FieldPreparation {
                    row,
                    passenger_id,
                    source,
                });
            }
        };

        let result = handle
            .evaluate(&arguments)
            .map_err(|source| PredictError::Evaluation {
                row,
                passenger_id,
                source,
            })?;
        let outcome = extract_outcome(&result, SURVIVED).map_err(|source| {
            PredictError::ResultExtraction {
                row,
                passenger_id,
                source,
            }
        })?;
        scored.push(passenger_id);
        predictions.push(outcome);
    }
    Ok((scored, predictions))
}

fn prepare_row(
    fields: &[InputField],
    columns: &[TypedColumn],
    row: usize,
) -> Result<FeatureRecord, FieldPreparationError> {
    let mut arguments = FeatureRecord::with_capacity(fields.len());
    for (field, column) in fields.iter().zip(columns) {
        arguments.insert(field.name(), field.prepare(column.raw(row))?);
    }
    Ok(arguments)
}

/// Reads an integer outcome out of a result record.
pub fn extract_outcome(result: &ResultRecord, field: &str) -> Result<i64, ResultExtractionError> {
    match result.get(field) {
        None => Err(ResultExtractionError::Missing {
            field: field.to_string(),
        }),
        Some(ResultValue::Integer(v)) => Ok(*v),
        Some(ResultValue::Double(v)) if v.is_finite() && v.fract() == 0.0 => Ok(*v as i64),
        Some(ResultValue::Double(v)) => Err(ResultExtractionError::NotInteger {
            field: field.to_string(),
            value: *v,
        }),
        Some(ResultValue::Text(text)) => {
            text.trim()
                .parse::<i64>()
                .map_err(|_| ResultExtractionError::NotNumeric {
                    field: field.to_string(),
                    value: text.clone(),
                })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Scorer;
    use crate::model::document::{
        DataField, FieldUsage, InvalidValueTreatment, MiningField, OpType,
    };
    use crate::model::field::FieldValue;
    use crate::preprocess::DefectKind;

    /// Echoes the Sex code back as the outcome.
    struct SexEcho {
        fields: Vec<InputField>,
    }

    impl SexEcho {
        fn new() -> Self {
            Self {
                fields: vec![
                    InputField::unrestricted("Pclass", FieldType::Integer),
                    InputField::unrestricted("Sex", FieldType::Double),
                    InputField::unrestricted("Age", FieldType::Double),
                    InputField::unrestricted("Fare", FieldType::Double),
                    InputField::unrestricted("Embarked", FieldType::Double),
                ],
            }
        }
    }

    impl Scorer for SexEcho {
        fn input_fields(&self) -> &[InputField] {
            &self.fields
        }

        fn target_name(&self) -> &str {
            SURVIVED
        }

        fn evaluate(&self, arguments: &FeatureRecord) -> Result<ResultRecord, EvaluationError> {
            let mut result = ResultRecord::new();
            let sex = arguments
                .get("Sex")
                .map(FieldValue::as_f64)
                .unwrap_or(-1.0);
            result.insert(SURVIVED, ResultValue::Double(sex));
            Ok(result)
        }
    }

    fn raw_frame(ages: Vec<Option<f64>>, sexes: Vec<&str>) -> DataFrame {
        let n = ages.len();
        DataFrame::new(vec![
            Series::new(PASSENGER_ID.into(), (100..100 + n as i64).collect::<Vec<_>>()).into(),
            Series::new("Pclass".into(), vec![3i64; n]).into(),
            Series::new("Sex".into(), sexes).into(),
            Series::new("Age".into(), ages).into(),
            Series::new("Fare".into(), vec![Some(10.0); n]).into(),
            Series::new("Embarked".into(), vec!["S"; n]).into(),
        ])
        .unwrap()
    }

    fn column_i64(df: &DataFrame, name: &str) -> Vec<i64> {
        df.column(name)
            .unwrap()
            .i64()
            .unwrap()
            .into_no_null_iter()
            .collect()
    }

    #[test]
    fn outcomes_follow_input_order() {
        let handle = ModelHandle::from_scorer("echo", SexEcho::new());
        let raw = raw_frame(
            vec![Some(20.0), None, Some(40.0), Some(5.0)],
            vec!["female", "male", "male", "female"],
        );
        let out = Pipeline::default().predict_frame(&handle, raw).unwrap();
        assert_eq!(out.get_column_names_str(), vec![PASSENGER_ID, SURVIVED]);
        assert_eq!(column_i64(&out, PASSENGER_ID), vec![100, 101, 102, 103]);
        assert_eq!(column_i64(&out, SURVIVED), vec![1, 0, 0, 1]);
    }

    #[test]
    fn abort_policy_names_the_defective_passenger() {
        let handle = ModelHandle::from_scorer("echo", SexEcho::new());
        let raw = raw_frame(vec![Some(20.0), Some(80.10)], vec!["female", "male"]);
        let err = Pipeline::default().predict_frame(&handle, raw).unwrap_err();
        match err {
            PredictError::RowDefect {
                passenger_id,
                defect,
            } => {
                assert_eq!(passenger_id, 101);
                assert_eq!(defect.kind, DefectKind::Unbinned { value: 80.10 });
            }
            other => panic!("Expected RowDefect, got {other:?}"),
        }
    }

    #[test]
    fn skip_policy_drops_ids_and_features_together() {
        let handle = ModelHandle::from_scorer("echo", SexEcho::new());
        let raw = raw_frame(
            vec![Some(20.0), Some(80.10), Some(30.0), Some(33.0)],
            vec!["female", "male", "X", "male"],
        );
        let pipeline = Pipeline::new(Preprocessor::default(), RowDefectPolicy::Skip);
        let out = pipeline.predict_frame(&handle, raw).unwrap();
        assert_eq!(column_i64(&out, PASSENGER_ID), vec![100, 103]);
        assert_eq!(column_i64(&out, SURVIVED), vec![1, 0]);
    }

    fn restricted_pclass_echo() -> SexEcho {
        let pclass = DataField {
            name: "Pclass".to_string(),
            op_type: OpType::Categorical,
            data_type: FieldType::Integer,
            values: vec![1.0, 2.0, 3.0],
            intervals: Vec::new(),
        };
        let mining = MiningField {
            name: "Pclass".to_string(),
            usage: FieldUsage::Active,
            invalid_value_treatment: InvalidValueTreatment::ReturnInvalid,
            missing_value_replacement: None,
        };
        SexEcho {
            fields: vec![
                InputField::new(&pclass, &mining),
                InputField::unrestricted("Sex", FieldType::Double),
            ],
        }
    }

    #[test]
    fn out_of_domain_field_follows_the_row_policy() {
        let handle = ModelHandle::from_scorer("restricted", restricted_pclass_echo());
        let mut raw = raw_frame(
            vec![Some(20.0), Some(30.0), Some(40.0)],
            vec!["female", "male", "female"],
        );
        raw.with_column(Series::new("Pclass".into(), vec![3i64, 4, 1])).unwrap();

        match Pipeline::default().predict_frame(&handle, raw.clone()).unwrap_err() {
            PredictError::FieldPreparation {
                row, passenger_id, ..
            } => {
                assert_eq!(row, 1);
                assert_eq!(passenger_id, 101);
            }
            other => panic!("Expected FieldPreparation, got {other:?}"),
        }

        let pipeline = Pipeline::new(Preprocessor::default(), RowDefectPolicy::Skip);
        let out = pipeline.predict_frame(&handle, raw).unwrap();
        assert_eq!(column_i64(&out, PASSENGER_ID), vec![100, 102]);
        assert_eq!(column_i64(&out, SURVIVED), vec![1, 1]);
    }

    #[test]
    fn empty_handle_fails_before_preprocessing() {
        let handle = ModelHandle::empty("/nonexistent");
        let raw = raw_frame(vec![Some(20.0)], vec!["female"]);
        let err = Pipeline::default().predict_frame(&handle, raw).unwrap_err();
        match err {
            PredictError::ModelNotLoaded { path } => assert_eq!(path, Path::new("/nonexistent")),
            other => panic!("Expected ModelNotLoaded, got {other:?}"),
        }
    }

    #[test]
    fn undeclared_feature_column_is_a_schema_error() {
        struct NeedsDeck(Vec<InputField>);
        impl Scorer for NeedsDeck {
            fn input_fields(&self) -> &[InputField] {
                &self.0
            }
            fn target_name(&self) -> &str {
                SURVIVED
            }
            fn evaluate(&self, _: &FeatureRecord) -> Result<ResultRecord, EvaluationError> {
                Ok(ResultRecord::new())
            }
        }
        let handle = ModelHandle::from_scorer(
            "deck",
            NeedsDeck(vec![InputField::unrestricted("Deck", FieldType::Double)]),
        );
        let raw = raw_frame(vec![Some(20.0)], vec!["female"]);
        let err = Pipeline::default().predict_frame(&handle, raw).unwrap_err();
        match err {
            PredictError::Schema(FieldPreparationError::ColumnNotFound { field }) => {
                assert_eq!(field, "Deck")
            }
            other => panic!("Expected Schema, got {other:?}"),
        }
    }

    #[test]
    fn extraction_accepts_integral_numbers_only() {
        let mut result = ResultRecord::new();
        result.insert("a", ResultValue::Integer(1));
        result.insert("b", ResultValue::Double(0.0));
        result.insert("c", ResultValue::Double(0.7));
        result.insert("d", ResultValue::Text("1".to_string()));
        result.insert("e", ResultValue::Text("yes".to_string()));
        assert_eq!(extract_outcome(&result, "a"), Ok(1));
        assert_eq!(extract_outcome(&result, "b"), Ok(0));
        assert!(matches!(
            extract_outcome(&result, "c"),
            Err(ResultExtractionError::NotInteger { .. })
        ));
        assert_eq!(extract_outcome(&result, "d"), Ok(1));
        assert!(matches!(
            extract_outcome(&result, "e"),
            Err(ResultExtractionError::NotNumeric { .. })
        ));
        assert_eq!(
            extract_outcome(&result, "Survived"),
            Err(ResultExtractionError::Missing {
                field: "Survived".to_string()
            })
        );
    }
}
