// =====================================================
// ERROR MODULE
// Loader error type and its coarse taxonomy
// =====================================================

use thiserror::Error;

pub const CANCELED_ERROR: &str = "canceled";

/// Coarse classification used by the request surface and the job registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Configuration,
    Validation,
    NotFound,
    MissingColumn,
    Cancellation,
    UnderlyingStore,
}

#[derive(Debug, Error)]
pub enum LoaderError {
    #[error("{0}")]
    Configuration(String),

    #[error("{0}")]
    Validation(String),

    #[error("Invalid SQL identifier: {0}")]
    InvalidIdentifier(String),

    #[error("{0}")]
    NotFound(String),

    #[error("CSV file is empty")]
    EmptyFile,

    #[error("CSV header is missing or empty")]
    EmptyHeader,

    #[error("primary_key column(s) not present in file: {}", .0.join(", "))]
    MissingPrimaryKeyColumns(Vec<String>),

    #[error("Row {row} is missing field '{column}'")]
    MissingField { row: usize, column: String },

    #[error(
        "Source query is missing required column(s): {}",
        .0.iter().map(|(target, source)| format!("{}->{}", target, source)).collect::<Vec<_>>().join(", ")
    )]
    MissingSourceColumns(Vec<(String, String)>),

    #[error("canceled")]
    Canceled,

    #[error("Operation timed out after {0} seconds")]
    Timeout(u64),

    #[error("{0}")]
    Store(#[from] sqlx::Error),

    #[error("Invalid JSON payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid CSV payload: {0}")]
    Csv(#[from] csv::Error),
}

impl LoaderError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LoaderError::Configuration(_) => ErrorKind::Configuration,
            LoaderError::Validation(_)
            | LoaderError::InvalidIdentifier(_)
            | LoaderError::EmptyFile
            | LoaderError::EmptyHeader
            | LoaderError::Json(_)
            | LoaderError::Csv(_) => ErrorKind::Validation,
            LoaderError::NotFound(_) => ErrorKind::NotFound,
            LoaderError::MissingPrimaryKeyColumns(_)
            | LoaderError::MissingField { .. }
            | LoaderError::MissingSourceColumns(_) => ErrorKind::MissingColumn,
            LoaderError::Canceled => ErrorKind::Cancellation,
            LoaderError::Timeout(_) | LoaderError::Store(_) => ErrorKind::UnderlyingStore,
        }
    }

    pub fn is_cancellation(&self) -> bool {
        self.kind() == ErrorKind::Cancellation
    }

    pub fn validation(message: impl Into<String>) -> Self {
        LoaderError::Validation(message.into())
    }
}

pub type LoaderResult<T> = Result<T, LoaderError>;
