//! # Model Handle
//!
//! Owns a loaded scoring model and its declared input schema.
//!
//! A model is read from a declarative TOML interchange document, checked for
//! internal consistency, and replayed against any verification records it
//! embeds before it is handed out. Loading can be strict (`ModelHandle::load`)
//! or permissive (`ModelHandle::open`). The permissive form logs the failure
//! and yields an empty handle whose every evaluation fails fast with
//! `EvaluationError::ModelNotLoaded`, so a bad model never crashes the process.
//!
//! Scoring itself sits behind the `Scorer` trait: given a record of prepared,
//! named arguments it produces a record of named results. The shipped
//! implementation is `regression::RegressionEvaluator`.

pub mod document;
pub mod field;
pub mod record;
pub mod regression;
pub mod verify;

use document::{DataType, ModelDocument};
use field::InputField;
use record::{FeatureRecord, ResultRecord};
use regression::RegressionEvaluator;
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;
use verify::Inconsistency;

/// A pure scoring function over named, prepared arguments.
pub trait Scorer {
    /// Declared inputs, in marshalling order.
    fn input_fields(&self) -> &[InputField];
    /// Name of the result field carrying the prediction.
    fn target_name(&self) -> &str;
    fn evaluate(&self, arguments: &FeatureRecord) -> Result<ResultRecord, EvaluationError>;
}

#[derive(Error, Debug)]
pub enum ModelLoadError {
    #[error("Cannot find model file '{}'", path.display())]
    NotFound { path: PathBuf },
    #[error("Failed to read model file '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse model file '{}': {source}", path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("Model file '{}' failed its self-check: {reason}", path.display())]
    Inconsistent {
        path: PathBuf,
        #[source]
        reason: Inconsistency,
    },
}

impl ModelLoadError {
    pub fn path(&self) -> &Path {
        match self {
            ModelLoadError::NotFound { path }
            | ModelLoadError::Io { path, .. }
            | ModelLoadError::Malformed { path, .. }
            | ModelLoadError::Inconsistent { path, .. } => path,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvaluationError {
    #[error("No model is loaded (source '{}')", path.display())]
    ModelNotLoaded { path: PathBuf },
    #[error("Argument '{field}' was not supplied")]
    MissingArgument { field: String },
    #[error("Scoring produced no usable outcome: {reason}")]
    Degenerate { reason: String },
}

pub struct ModelHandle {
    source: PathBuf,
    scorer: Option<Box<dyn Scorer>>,
}

impl fmt::Debug for ModelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelHandle")
            .field("source", &self.source)
            .field("loaded", &self.is_loaded())
            .finish()
    }
}

impl ModelHandle {
    /// Loads, checks, and verifies the model document at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ModelLoadError> {
        let path = path.as_ref();
        log::info!("Loading model from '{}'", path.display());

        let text = fs::read_to_string(path).map_err(|source| match source.kind() {
            ErrorKind::NotFound => ModelLoadError::NotFound {
                path: path.to_path_buf(),
            },
            _ => ModelLoadError::Io {
                path: path.to_path_buf(),
                source,
            },
        })?;
        let document: ModelDocument =
            toml::from_str(&text).map_err(|source| ModelLoadError::Malformed {
                path: path.to_path_buf(),
                source,
            })?;

        let inconsistent = |reason| ModelLoadError::Inconsistent {
            path: path.to_path_buf(),
            reason,
        };
        let evaluator = RegressionEvaluator::from_document(&document).map_err(inconsistent)?;
        if let Some(spec) = &document.verification {
            let checked = verify::verify_records(&evaluator, spec).map_err(inconsistent)?;
            log::info!("Model passed {checked} verification record(s)");
        }

        log::info!(
            "Loaded model '{}' with {} input field(s), target '{}'",
            document.header.description,
            evaluator.input_fields().len(),
            evaluator.target().name
        );
        Ok(Self {
            source: path.to_path_buf(),
            scorer: Some(Box::new(evaluator)),
        })
    }

    /// Like `load`, but a failure is logged and turned into an empty handle.
    pub fn open(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match Self::load(path) {
            Ok(handle) => handle,
            Err(e) => {
                log::error!("{e}");
                Self::empty(path)
            }
        }
    }

    /// A handle with no model; evaluation always fails.
    pub fn empty(source: impl Into<PathBuf>) -> Self {
        Self {
            source: source.into(),
            scorer: None,
        }
    }

    pub fn from_scorer(source: impl Into<PathBuf>, scorer: impl Scorer + 'static) -> Self {
        Self {
            source: source.into(),
            scorer: Some(Box::new(scorer)),
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.scorer.is_some()
    }

    pub fn source(&self) -> &Path {
        &self.source
    }

    /// Declared inputs in marshalling order; empty when no model is loaded.
    pub fn input_fields(&self) -> &[InputField] {
        match &self.scorer {
            Some(scorer) => scorer.input_fields(),
            None => &[],
        }
    }

    /// `(field name, declared type)` pairs in marshalling order.
    pub fn input_schema(&self) -> Vec<(&str, DataType)> {
        self.input_fields()
            .iter()
            .map(|f| (f.name(), f.data_type()))
            .collect()
    }

    pub fn target_name(&self) -> Option<&str> {
        self.scorer.as_ref().map(|s| s.target_name())
    }

    pub fn evaluate(&self, arguments: &FeatureRecord) -> Result<ResultRecord, EvaluationError> {
        match &self.scorer {
            Some(scorer) => scorer.evaluate(arguments),
            None => Err(EvaluationError::ModelNotLoaded {
                path: self.source.clone(),
            }),
        }
    }
}
