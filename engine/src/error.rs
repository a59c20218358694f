//! Error types for the Settle engine.

use crate::{config::ConfigError, RecordId, TableName};
use thiserror::Error;

/// All possible errors from the Settle engine.
///
/// A record that cannot be found while resolving sync eligibility is not an
/// error; it is logged and skipped. Everything here is a hard failure that
/// aborts the enclosing write transaction.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Error {
    // Lookup errors
    #[error("table not found: {0}")]
    TableNotFound(TableName),

    #[error("record not found: {0}/{1}")]
    RecordNotFound(TableName, RecordId),

    #[error("record already exists: {0}/{1}")]
    RecordAlreadyExists(TableName, RecordId),

    // Storage errors
    #[error("storage error: {0}")]
    Storage(String),

    // Setup errors
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
}

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, Error>;
