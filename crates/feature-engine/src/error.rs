//! Feature Engine Error Types

use thiserror::Error;

/// Errors while merging records or resolving features
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MergeError {
    /// A required field is absent from every record of an input
    #[error("Schema mismatch: {input} records carry no {field}")]
    SchemaMismatch {
        input: &'static str,
        field: &'static str,
    },

    /// Feature name outside the catalogue
    #[error("Unknown feature: {0}")]
    UnknownFeature(String),
}
