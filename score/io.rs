//! # Table I/O
//!
//! Reads the delimited test table into a `polars` `DataFrame` and writes the
//! submission table back out.
//!
//! - Required columns are checked up front so later stages can index them
//!   without re-validating. Empty cells become nulls.
//! - Writing goes through a temporary file in the destination directory that
//!   is renamed into place only after the whole table has been serialized. A
//!   failed write therefore never leaves a partial submission behind.

use polars::prelude::*;
use std::fs::File;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub const PASSENGER_ID: &str = "PassengerId";
pub const SURVIVED: &str = "Survived";

/// Columns the preprocessor consumes, with the dtype family each must have.
const REQUIRED_COLUMNS: [(&str, ColumnKind); 5] = [
    (PASSENGER_ID, ColumnKind::Integer),
    ("Sex", ColumnKind::Text),
    ("Age", ColumnKind::Numeric),
    ("Fare", ColumnKind::Numeric),
    ("Embarked", ColumnKind::Text),
];

#[derive(Debug, Clone, Copy)]
enum ColumnKind {
    Integer,
    Numeric,
    Text,
}

impl ColumnKind {
    fn accepts(self, dtype: &DataType) -> bool {
        match self {
            ColumnKind::Integer => dtype.is_integer(),
            ColumnKind::Numeric => dtype.is_primitive_numeric() || dtype.is_null(),
            ColumnKind::Text => matches!(dtype, DataType::String | DataType::Null),
        }
    }

    fn label(self) -> &'static str {
        match self {
            ColumnKind::Integer => "integer",
            ColumnKind::Numeric => "numeric",
            ColumnKind::Text => "text",
        }
    }
}

#[derive(Error, Debug)]
pub enum TestFileReadError {
    #[error("Cannot find file '{}'", path.display())]
    NotFound { path: PathBuf },
    #[error("Failed to read file '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Failed to parse file '{}': {source}", path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: PolarsError,
    },
    #[error("File '{}' has no required column '{column}'", path.display())]
    MissingColumn { path: PathBuf, column: String },
    #[error(
        "Column '{column}' in '{}' must be {expected}, but was read as {found}",
        path.display()
    )]
    WrongType {
        path: PathBuf,
        column: String,
        expected: &'static str,
        found: String,
    },
}

#[derive(Error, Debug)]
#[error("Failed to save file '{}': {source}", path.display())]
pub struct OutputWriteError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

/// Raised when there is no prediction table to write.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Prediction table is empty; nothing was written to '{}'", path.display())]
pub struct EmptyPredictionError {
    pub path: PathBuf,
}

#[derive(Error, Debug)]
pub enum SubmissionError {
    #[error(transparent)]
    Empty(#[from] EmptyPredictionError),
    #[error(transparent)]
    Write(#[from] OutputWriteError),
}

/// Reads a comma-separated test table with a header row.
pub fn read_test_table(path: impl AsRef<Path>) -> Result<DataFrame, TestFileReadError> {
    let path = path.as_ref();
    log::info!("Reading test data from '{}'", path.display());

    let file = File::open(path).map_err(|source| match source.kind() {
        ErrorKind::NotFound => TestFileReadError::NotFound {
            path: path.to_path_buf(),
        },
        _ => TestFileReadError::Io {
            path: path.to_path_buf(),
            source,
        },
    })?;

    let df = CsvReadOptions::default()
        .with_has_header(true)
        .map_parse_options(|options| options.with_separator(b','))
        .into_reader_with_file_handle(file)
        .finish()
        .map_err(|source| TestFileReadError::Malformed {
            path: path.to_path_buf(),
            source,
        })?;

    let df = fill_empty_numeric_columns(df, path)?;
    validate_columns(&df, path)?;
    log::info!(
        "Loaded {} row(s) and {} column(s)",
        df.height(),
        df.width()
    );
    Ok(df)
}

/// The reader infers a column with no values at all as text. A numeric
/// column in that state is cast to Float64 so it reaches imputation with
/// every cell missing.
fn fill_empty_numeric_columns(
    mut df: DataFrame,
    path: &Path,
) -> Result<DataFrame, TestFileReadError> {
    let malformed = |source: PolarsError| TestFileReadError::Malformed {
        path: path.to_path_buf(),
        source,
    };
    for (name, kind) in REQUIRED_COLUMNS {
        if !matches!(kind, ColumnKind::Numeric) {
            continue;
        }
        let Ok(column) = df.column(name) else {
            continue;
        };
        if column.dtype() == &DataType::String && column.null_count() == column.len() {
            log::warn!("Column '{name}' has no values; reading it as all missing");
            let casted = column.cast(&DataType::Float64).map_err(malformed)?;
            df.with_column(casted).map_err(malformed)?;
        }
    }
    Ok(df)
}

fn validate_columns(df: &DataFrame, path: &Path) -> Result<(), TestFileReadError> {
    for (name, kind) in REQUIRED_COLUMNS {
        let column = df
            .column(name)
            .map_err(|_| TestFileReadError::MissingColumn {
                path: path.to_path_buf(),
                column: name.to_string(),
            })?;
        if !kind.accepts(column.dtype()) {
            return Err(TestFileReadError::WrongType {
                path: path.to_path_buf(),
                column: name.to_string(),
                expected: kind.label(),
                found: column.dtype().to_string(),
            });
        }
    }
    Ok(())
}

/// Writes the submission table, or reports that there is nothing to write.
pub fn write_submission(
    table: Option<&DataFrame>,
    path: impl AsRef<Path>,
) -> Result<(), SubmissionError> {
    let path = path.as_ref();
    let table = table.ok_or_else(|| EmptyPredictionError {
        path: path.to_path_buf(),
    })?;
    write_table(table, path)?;
    log::info!("Wrote {} row(s) to '{}'", table.height(), path.display());
    Ok(())
}

fn write_table(table: &DataFrame, path: &Path) -> Result<(), OutputWriteError> {
    let wrap = |source: std::io::Error| OutputWriteError {
        path: path.to_path_buf(),
        source,
    };

    let directory = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut staged = tempfile::Builder::new()
        .prefix(".submission")
        .suffix(".csv.tmp")
        .tempfile_in(directory)
        .map_err(wrap)?;

    let mut frame = table.clone();
    CsvWriter::new(staged.as_file_mut())
        .include_header(true)
        .with_separator(b',')
        .finish(&mut frame)
        .map_err(|e| wrap(std::io::Error::other(e)))?;

    staged.as_file().sync_all().map_err(wrap)?;
    staged.persist(path).map_err(|e| wrap(e.error))?;
    Ok(())
}
