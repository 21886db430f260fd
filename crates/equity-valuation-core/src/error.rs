use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ValuationError {
    #[error("Missing data: {field} ({context})")]
    MissingData { field: String, context: String },

    #[error("Invalid parameter: {field}: {reason}")]
    InvalidParameter { field: String, reason: String },

    #[error("Degenerate math: {0}")]
    DegenerateMath(String),

    #[error("Convergence failure: {function} did not converge after {iterations} iterations (delta: {last_delta})")]
    ConvergenceFailure {
        function: String,
        iterations: u32,
        last_delta: Decimal,
    },

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("Data provider error: {0}")]
    Provider(String),

    #[error("Export error: {0}")]
    Export(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl ValuationError {
    pub(crate) fn missing(field: impl Into<String>, context: impl Into<String>) -> Self {
        ValuationError::MissingData {
            field: field.into(),
            context: context.into(),
        }
    }

    pub(crate) fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        ValuationError::InvalidParameter {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for ValuationError {
    fn from(e: serde_json::Error) -> Self {
        ValuationError::SerializationError(e.to_string())
    }
}
