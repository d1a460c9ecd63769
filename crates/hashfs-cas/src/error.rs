//! CAS error types.

use std::io;
use thiserror::Error;

/// Errors raised by a content store.
#[derive(Debug, Error)]
pub enum CasError {
    /// A hash string was not 64 hex characters.
    #[error("invalid content hash: {0}")]
    InvalidHash(String),

    /// Stored bytes no longer match the hash they are filed under.
    #[error("object {0} is corrupt")]
    Corrupt(String),

    /// I/O error from an on-disk store.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// CAS result type.
pub type CasResult<T> = Result<T, CasError>;
