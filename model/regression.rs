use super::document::{DataType, FunctionName, ModelDocument, NormalizationMethod};
use super::field::InputField;
use super::record::{FeatureRecord, ResultRecord, ResultValue, probability_name};
use super::verify::{self, Inconsistency};
use super::{EvaluationError, Scorer};
use ndarray::Array1;

/// The predicted field as declared in the data dictionary.
#[derive(Debug, Clone)]
pub struct TargetField {
    pub name: String,
    pub data_type: DataType,
    pub values: Vec<f64>,
}

/// One regression equation, with predictors resolved to input positions.
#[derive(Debug, Clone)]
struct RegressionTable {
    intercept: f64,
    category: Option<f64>,
    coefficients: Array1<f64>,
    inputs: Vec<usize>,
    exponents: Vec<i32>,
}

impl RegressionTable {
    fn linear_predictor(
        &self,
        fields: &[InputField],
        arguments: &FeatureRecord,
    ) -> Result<f64, EvaluationError> {
        let mut x = Array1::<f64>::zeros(self.inputs.len());
        for (j, (&input, &exponent)) in self.inputs.iter().zip(&self.exponents).enumerate() {
            let name = fields[input].name();
            let value = arguments
                .get(name)
                .ok_or_else(|| EvaluationError::MissingArgument {
                    field: name.to_string(),
                })?
                .as_f64();
            x[j] = value.powi(exponent);
        }
        Ok(self.intercept + self.coefficients.dot(&x))
    }
}

/// Evaluates a (multi-table) regression model: a linear predictor per table,
/// followed by the document's normalization.
#[derive(Debug, Clone)]
pub struct RegressionEvaluator {
    fields: Vec<InputField>,
    target: TargetField,
    function: FunctionName,
    normalization: NormalizationMethod,
    tables: Vec<RegressionTable>,
}

impl RegressionEvaluator {
    /// Builds an evaluator from a document that has not yet been checked.
    /// Structural checks run first, so every reference resolves afterwards.
    pub fn from_document(document: &ModelDocument) -> Result<Self, Inconsistency> {
        let schema = verify::check_document(document)?;

        let tables = document
            .regression
            .tables
            .iter()
            .map(|table| {
                let inputs = table
                    .predictors
                    .iter()
                    .map(|p| {
                        schema
                            .fields
                            .iter()
                            .position(|f| f.name() == p.name)
                            .ok_or_else(|| Inconsistency::UnknownPredictor {
                                name: p.name.clone(),
                            })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(RegressionTable {
                    intercept: table.intercept,
                    category: table.target_category,
                    coefficients: table.predictors.iter().map(|p| p.coefficient).collect(),
                    inputs,
                    exponents: table.predictors.iter().map(|p| p.exponent).collect(),
                })
            })
            .collect::<Result<Vec<_>, Inconsistency>>()?;

        Ok(Self {
            fields: schema.fields,
            target: schema.target,
            function: document.regression.function_name,
            normalization: document.regression.normalization_method,
            tables,
        })
    }

    pub fn target(&self) -> &TargetField {
        &self.target
    }

    fn typed_target(&self, value: f64) -> ResultValue {
        match self.target.data_type {
            DataType::Integer => ResultValue::Integer(value.round() as i64),
            DataType::Double => ResultValue::Double(value),
        }
    }

    fn score_regression(&self, arguments: &FeatureRecord) -> Result<ResultRecord, EvaluationError> {
        // Table count is fixed to one by the structural check.
        let y = self.tables[0].linear_predictor(&self.fields, arguments)?;
        let value = match self.normalization {
            NormalizationMethod::Logit => sigmoid(y),
            NormalizationMethod::Exp => y.exp(),
            _ => y,
        };
        let mut result = ResultRecord::new();
        result.insert(self.target.name.clone(), self.typed_target(value));
        Ok(result)
    }

    fn score_classification(
        &self,
        arguments: &FeatureRecord,
    ) -> Result<ResultRecord, EvaluationError> {
        let scores = self
            .tables
            .iter()
            .map(|t| t.linear_predictor(&self.fields, arguments))
            .collect::<Result<Vec<f64>, _>>()?;
        let probabilities = normalize(&scores, self.normalization)?;

        let winner = arg_max(&probabilities).ok_or_else(|| EvaluationError::Degenerate {
            reason: "classification without regression tables".to_string(),
        })?;

        let mut result = ResultRecord::new();
        for (table, &p) in self.tables.iter().zip(&probabilities) {
            // Categories are guaranteed by the structural check.
            if let Some(category) = table.category {
                result.insert(probability_name(category), ResultValue::Double(p));
            }
        }
        if let Some(category) = self.tables[winner].category {
            result.insert(self.target.name.clone(), self.typed_target(category));
        }
        log::trace!("Scores {scores:?} normalized to {probabilities:?}");
        Ok(result)
    }
}

impl Scorer for RegressionEvaluator {
    fn input_fields(&self) -> &[InputField] {
        &self.fields
    }

    fn target_name(&self) -> &str {
        &self.target.name
    }

    fn evaluate(&self, arguments: &FeatureRecord) -> Result<ResultRecord, EvaluationError> {
        match self.function {
            FunctionName::Regression => self.score_regression(arguments),
            FunctionName::Classification => self.score_classification(arguments),
        }
    }
}

fn sigmoid(y: f64) -> f64 {
    // Clamp eta to prevent numerical overflow in exp().
    let y = y.clamp(-700.0, 700.0);
    1.0 / (1.0 + f64::exp(-y))
}

/// Index of the largest value; the first one wins ties.
fn arg_max(values: &[f64]) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (i, &v) in values.iter().enumerate() {
        match best {
            Some(b) if v <= values[b] => {}
            _ => best = Some(i),
        }
    }
    best
}

/// Converts per-category scores into the reported probabilities.
fn normalize(scores: &[f64], method: NormalizationMethod) -> Result<Vec<f64>, EvaluationError> {
    let probabilities = match method {
        NormalizationMethod::None => scores.to_vec(),
        NormalizationMethod::Exp => scores.iter().map(|y| y.exp()).collect(),
        NormalizationMethod::Logit if scores.len() == 2 => {
            let first = sigmoid(scores[0]);
            vec![first, 1.0 - first]
        }
        NormalizationMethod::Logit => scores.iter().map(|&y| sigmoid(y)).collect(),
        NormalizationMethod::Softmax => {
            let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            let exps: Vec<f64> = scores.iter().map(|y| (y - max).exp()).collect();
            let total: f64 = exps.iter().sum();
            exps.into_iter().map(|e| e / total).collect()
        }
        NormalizationMethod::Simplemax => {
            let total: f64 = scores.iter().sum();
            if total == 0.0 {
                return Err(EvaluationError::Degenerate {
                    reason: "simplemax scores sum to zero".to_string(),
                });
            }
            scores.iter().map(|y| y / total).collect()
        }
    };

    if probabilities.iter().any(|p| !p.is_finite()) {
        return Err(EvaluationError::Degenerate {
            reason: format!("non-finite scores {scores:?}"),
        });
    }
    Ok(probabilities)
}
