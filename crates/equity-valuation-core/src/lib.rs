pub mod assumptions;
pub mod config;
pub mod error;
pub mod pe;
pub mod pipeline;
pub mod ratios;
pub mod scenarios;
pub mod statements;
pub mod time_value;
pub mod types;
pub mod valuation;

pub use error::ValuationError;
pub use types::*;

/// Standard result type for all valuation operations
pub type ValuationResult<T> = Result<T, ValuationError>;
