//! Error types for the analytics core

use polars::prelude::PolarsError;
use thiserror::Error;

/// Result type used throughout the library
pub type Result<T> = std::result::Result<T, TradeError>;

/// Errors surfaced to callers of the analytics core
#[derive(Error, Debug)]
pub enum TradeError {
    /// An argument is out of range or the input table has the wrong shape
    #[error("Invalid argument '{name}': {reason}")]
    InvalidArgument { name: String, reason: String },

    /// The table library itself failed
    #[error("Table operation failed: {0}")]
    Table(#[from] PolarsError),
}

impl TradeError {
    pub(crate) fn invalid_argument(name: impl Into<String>, reason: impl Into<String>) -> Self {
        TradeError::InvalidArgument {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

/// Reasons a time series model could not be fitted or projected.
///
/// These never leave the forecaster: every variant is converted into the
/// mean fallback.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FitError {
    #[error("Insufficient data: need at least {required} points, got {actual}")]
    InsufficientData { required: usize, actual: usize },

    #[error("Non-finite value in {0}")]
    NonFinite(String),

    #[error("Degenerate series: {0}")]
    Degenerate(String),

    #[error("Regression system is singular")]
    Singular,

    #[error("Autoregressive polynomial is not stationary")]
    NonStationary,

    #[error("Moving-average polynomial is not invertible")]
    NonInvertible,
}
