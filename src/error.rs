//! Public error type for the store facade.
//!
//! Wraps the internal taxonomy into one stable enum. `NotFound`,
//! `AlreadyExists`, `LimitExceeded` and `MalformedIdentifier` are ordinary
//! outcomes; `Io`, `Serialization` and `MigrationFailed` are fatal for the
//! current request and are the caller's to retry or surface.

use thiserror::Error;

/// All metafs errors.
#[derive(Debug, Error)]
pub enum Error {
    /// An identifier was corrupt or produced by a foreign encoder.
    #[error("malformed identifier: {0}")]
    MalformedIdentifier(String),

    /// Entity not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Creation collided with an existing entity.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// A structural limit was violated (one workspace per account).
    #[error("limit exceeded: {0}")]
    LimitExceeded(String),

    /// I/O error from the underlying filesystem.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A document could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A schema migration could not complete.
    #[error("migration failed: {0}")]
    MigrationFailed(String),
}

/// Result type for metafs operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Check if this is a not-found error.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }

    /// Check if this is a creation collision.
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Error::AlreadyExists(_))
    }

    /// Check if this error is fatal for the request rather than an
    /// expected outcome.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Io(_) | Error::Serialization(_) | Error::MigrationFailed(_)
        )
    }
}

// Convert from internal core errors
impl From<metafs_core::Error> for Error {
    fn from(e: metafs_core::Error) -> Self {
        use metafs_core::Error as CoreError;
        match e {
            CoreError::MalformedIdentifier(msg) => Error::MalformedIdentifier(msg),
            CoreError::NotFound(msg) => Error::NotFound(msg),
            CoreError::AlreadyExists(msg) => Error::AlreadyExists(msg),
            CoreError::LimitExceeded(msg) => Error::LimitExceeded(msg),
            CoreError::Storage(io_err) => Error::Io(io_err),
            CoreError::Serialization(msg) => Error::Serialization(msg),
            CoreError::MigrationFailed { account, reason } => {
                Error::MigrationFailed(format!("account {account}: {reason}"))
            }
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_errors_map_onto_public_variants() {
        let err: Error = metafs_core::Error::NotFound("alice".into()).into();
        assert!(err.is_not_found());
        assert!(!err.is_fatal());

        let err: Error = metafs_core::Error::MigrationFailed {
            account: "alice".into(),
            reason: "disk full".into(),
        }
        .into();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("alice"));
    }
}
