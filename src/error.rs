//! Error kinds shared by the value codec, range decoder, task registry and dispatcher.
//!
//! Estimator primitives never propagate an error past their own module: they degrade to a
//! best-effort default and log a warning instead (see `services::estimator`). `EstimatorError`
//! exists for the handful of places that genuinely cannot proceed - malformed literals, ingest
//! validation, and unknown tasks - and the dispatcher is the only layer that turns one into an
//! HTTP status code.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, EstimatorError>;

#[derive(Debug, Error)]
pub enum EstimatorError {
    #[error("invalid literal {value:?} for type {data_type}")]
    InvalidLiteral { value: String, data_type: String },

    #[error("unsupported data type {0}")]
    UnsupportedType(String),

    #[error("validation error: {0}")]
    ValidationError(String),

    #[error("no metadata for task {task_id:?} db {db} table {table}")]
    NotFound {
        task_id: Option<String>,
        db: String,
        table: String,
    },

    #[error("deadline exceeded")]
    DeadlineExceeded,

    #[error("internal error ({error_id}): {message}")]
    Internal { error_id: String, message: String },
}

impl EstimatorError {
    pub fn internal(message: impl Into<String>) -> Self {
        EstimatorError::Internal {
            error_id: uuid::Uuid::new_v4().to_string(),
            message: message.into(),
        }
    }

    /// HTTP status this error maps to, per the dispatcher's translation table.
    pub fn status_code(&self) -> u16 {
        match self {
            EstimatorError::InvalidLiteral { .. } => 200,
            EstimatorError::UnsupportedType(_) => 200,
            EstimatorError::ValidationError(_) => 400,
            EstimatorError::NotFound { .. } => 200,
            EstimatorError::DeadlineExceeded => 504,
            EstimatorError::Internal { .. } => 500,
        }
    }
}
