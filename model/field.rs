use super::document::{DataField, DataType, Interval, InvalidValueTreatment, MiningField, OpType};
use thiserror::Error;

/// A value as read from a table cell, before any validation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RawValue {
    Double(f64),
    Integer(i64),
    Missing,
}

/// A value that has passed preparation for one specific field.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue {
    Double(f64),
    Integer(i64),
}

impl FieldValue {
    pub fn as_f64(self) -> f64 {
        match self {
            FieldValue::Double(v) => v,
            FieldValue::Integer(v) => v as f64,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FieldPreparationError {
    #[error("Field '{field}' is missing a value and declares no replacement.")]
    MissingValue { field: String },
    #[error("Value {value} is outside the accepted domain of field '{field}'.")]
    InvalidValue { field: String, value: f64 },
    #[error("Value {value} cannot be stored in integer field '{field}'.")]
    NotInteger { field: String, value: f64 },
    #[error("The feature table has no column for model input '{field}'.")]
    ColumnNotFound { field: String },
}

/// One model input: the data-dictionary definition joined with its
/// mining-schema treatment.
#[derive(Debug, Clone)]
pub struct InputField {
    name: String,
    op_type: OpType,
    data_type: DataType,
    values: Vec<f64>,
    intervals: Vec<Interval>,
    invalid_value_treatment: InvalidValueTreatment,
    missing_value_replacement: Option<f64>,
}

impl InputField {
    pub fn new(data: &DataField, mining: &MiningField) -> Self {
        Self {
            name: data.name.clone(),
            op_type: data.op_type,
            data_type: data.data_type,
            values: data.values.clone(),
            intervals: data.intervals.clone(),
            invalid_value_treatment: mining.invalid_value_treatment,
            missing_value_replacement: mining.missing_value_replacement,
        }
    }

    /// A field with no domain restriction, replacement, or special treatment.
    pub fn unrestricted(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            op_type: OpType::Continuous,
            data_type,
            values: Vec::new(),
            intervals: Vec::new(),
            invalid_value_treatment: InvalidValueTreatment::ReturnInvalid,
            missing_value_replacement: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    /// Turns an arbitrary raw value into a known-good value for this field.
    pub fn prepare(&self, raw: RawValue) -> Result<FieldValue, FieldPreparationError> {
        let value = match raw {
            RawValue::Missing => return self.replace_missing(),
            RawValue::Double(v) => v,
            RawValue::Integer(v) => v as f64,
        };

        if value.is_finite() && self.is_valid(value) {
            return self.convert(value);
        }

        match self.invalid_value_treatment {
            InvalidValueTreatment::ReturnInvalid => Err(FieldPreparationError::InvalidValue {
                field: self.name.clone(),
                value,
            }),
            InvalidValueTreatment::AsMissing => self.replace_missing(),
            InvalidValueTreatment::AsIs if value.is_finite() => self.convert(value),
            InvalidValueTreatment::AsIs => Err(FieldPreparationError::InvalidValue {
                field: self.name.clone(),
                value,
            }),
        }
    }

    fn is_valid(&self, value: f64) -> bool {
        match self.op_type {
            OpType::Categorical if !self.values.is_empty() => {
                self.values.iter().any(|&v| v == value)
            }
            OpType::Continuous if !self.intervals.is_empty() => {
                self.intervals.iter().any(|i| i.contains(value))
            }
            _ => true,
        }
    }

    fn replace_missing(&self) -> Result<FieldValue, FieldPreparationError> {
        match self.missing_value_replacement {
            Some(replacement) => self.convert(replacement),
            None => Err(FieldPreparationError::MissingValue {
                field: self.name.clone(),
            }),
        }
    }

    fn convert(&self, value: f64) -> Result<FieldValue, FieldPreparationError> {
        match self.data_type {
            DataType::Double => Ok(FieldValue::Double(value)),
            DataType::Integer => {
                if value.fract() != 0.0 || value.abs() > i64::MAX as f64 {
                    return Err(FieldPreparationError::NotInteger {
                        field: self.name.clone(),
                        value,
                    });
                }
                Ok(FieldValue::Integer(value as i64))
            }
        }
    }
}
