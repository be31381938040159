//! Error types for maidan-plan.

use thiserror::Error;

/// Planning error type.
#[derive(Error, Debug)]
pub enum PlanError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Precomputation file error: {0}")]
    Precomputation(String),
}

impl From<serde_yaml::Error> for PlanError {
    fn from(e: serde_yaml::Error) -> Self {
        PlanError::Precomputation(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, PlanError>;
