//! Error types for sigfetch

use std::time::Duration;
use thiserror::Error;

/// Main error type for sigfetch operations
#[derive(Debug, Error)]
pub enum SigfetchError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("URL parsing error: {0}")]
    Url(#[from] url::ParseError),

    #[error("Unexpected status {status} for range {range}")]
    HttpStatus { status: u16, range: String },

    #[error("Range starting at {start} returned {actual} bytes, expected {expected}")]
    RangeMismatch { start: u64, expected: u64, actual: u64 },

    #[error("Unbalanced braces in script text starting at offset {0}")]
    UnbalancedBraces(usize),

    #[error("Dispatcher function not found in script")]
    DispatcherNotFound,

    #[error("Helper declaration not found: {0}")]
    HelperNotFound(String),

    #[error("Script evaluation error: {0}")]
    Evaluation(String),

    #[error("Script evaluation exceeded {0:?}")]
    EvaluationTimeout(Duration),

    #[error("Invalid download plan: {0}")]
    InvalidPlan(String),

    #[error("Download aborted")]
    Aborted,

    #[error("Worker failure: {0}")]
    Worker(String),

    #[error("Generic error: {0}")]
    Generic(String),
}

impl SigfetchError {
    /// Check if a range worker should retry after this error.
    ///
    /// Transport failures (no HTTP status attached) and IO errors are transient;
    /// any other failure aborts the whole download.
    pub fn is_transient(&self) -> bool {
        match self {
            SigfetchError::Http(e) => e.status().is_none() && !e.is_builder(),
            SigfetchError::Io(_) => true,
            _ => false,
        }
    }
}
