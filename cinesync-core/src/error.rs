use thiserror::Error;

use crate::link::LinkError;
use crate::parse::ParseFailure;
use crate::persist::PersistenceError;
use crate::resolve::{ProviderError, ResolveError};

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Parse(#[from] ParseFailure),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Link(#[from] LinkError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    #[error("Watcher error: {0}")]
    Watch(String),

    #[error("No record for {0}")]
    UnknownRecord(String),

    #[error("Invalid decision: {0}")]
    InvalidDecision(String),

    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
