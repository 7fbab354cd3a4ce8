use std::fmt::{self, Display};

/// Errors produced by model constructors and parsing routines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelError {
    InvalidExternalId(String),
    InvalidStage(String),
    InvalidErrorKind(String),
}

impl Display for ModelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ModelError::InvalidExternalId(raw) => {
                write!(f, "invalid external id: {raw}")
            }
            ModelError::InvalidStage(raw) => {
                write!(f, "invalid processing stage: {raw}")
            }
            ModelError::InvalidErrorKind(raw) => {
                write!(f, "invalid error kind: {raw}")
            }
        }
    }
}

impl std::error::Error for ModelError {}

pub type Result<T> = std::result::Result<T, ModelError>;
