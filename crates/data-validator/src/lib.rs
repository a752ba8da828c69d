//! Record Validation
//!
//! Range checking for fetched pollution and weather records. Records that
//! fail validation are skipped by the merger, never fatal to a run.

mod error;
mod validator;

pub use error::ValidationError;
pub use validator::{ValidationConfig, ValidationResult, Validator};
