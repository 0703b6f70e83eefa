use std::fmt;
use thiserror::Error;

/// A single cell that could not be coerced to its declared type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowCoercionFailure {
    /// Zero-based data row index (header excluded).
    pub row: usize,
    pub column: &'static str,
    pub value: String,
}

impl fmt::Display for RowCoercionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "row {}: column `{}` cannot be coerced from {:?}",
            self.row, self.column, self.value
        )
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("schema mismatch: missing required columns {missing:?}")]
    SchemaMismatch { missing: Vec<String> },

    #[error("{0}")]
    RowCoercion(RowCoercionFailure),

    #[error("cannot read CSV artifact `{key}`: {source}")]
    FileRead {
        key: String,
        #[source]
        source: csv::Error,
    },

    #[error("load job for `{uri}` failed: {message}")]
    LoadJob { uri: String, message: String },

    #[error("storage {op} on `{key}` failed: {message}")]
    Storage {
        op: &'static str,
        key: String,
        message: String,
    },

    #[error("arrow: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    pub(crate) fn storage(op: &'static str, key: &str, err: impl fmt::Display) -> Self {
        PipelineError::Storage {
            op,
            key: key.to_string(),
            message: err.to_string(),
        }
    }

    pub(crate) fn load_job(uri: &str, err: impl fmt::Display) -> Self {
        PipelineError::LoadJob {
            uri: uri.to_string(),
            message: err.to_string(),
        }
    }
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
