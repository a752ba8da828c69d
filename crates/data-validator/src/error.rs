//! Validation Error Types

use thiserror::Error;

/// Errors during record validation
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// Value out of allowed range
    #[error("{field} value {value} is out of range [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    /// NaN or infinite value
    #[error("{field} is not a finite number")]
    NonFinite { field: &'static str },

    /// Missing required field
    #[error("Missing required field: {0}")]
    MissingField(&'static str),
}
