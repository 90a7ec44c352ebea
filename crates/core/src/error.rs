//! Error taxonomy for the metadata store.
//!
//! `NotFound`, `AlreadyExists`, `LimitExceeded` and `MalformedIdentifier`
//! are ordinary outcomes a caller is expected to handle. `Storage`,
//! `Serialization` and `MigrationFailed` are fatal for the current request.

use thiserror::Error;

/// All metadata store errors.
#[derive(Debug, Error)]
pub enum Error {
    /// An identifier could not be decoded back to the name that produced it.
    #[error("malformed identifier: {0}")]
    MalformedIdentifier(String),

    /// Entity absent.
    #[error("not found: {0}")]
    NotFound(String),

    /// Creation collided with an existing entity.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// A structural limit was violated (one workspace per account).
    #[error("limit exceeded: {0}")]
    LimitExceeded(String),

    /// Underlying filesystem failure.
    #[error("storage I/O error: {0}")]
    Storage(#[from] std::io::Error),

    /// A document could not be encoded or decoded as JSON.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A schema transform could not complete for an account.
    #[error("migration failed for account {account}: {reason}")]
    MigrationFailed {
        /// The account whose migration aborted.
        account: String,
        /// What went wrong.
        reason: String,
    },
}

/// Result type for metadata store operations.
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

    /// Check if this error is an expected outcome rather than a failure.
    ///
    /// Expected outcomes are reported to the caller without error-level
    /// logging; everything else is fatal for the current request.
    pub fn is_expected(&self) -> bool {
        matches!(
            self,
            Error::MalformedIdentifier(_)
                | Error::NotFound(_)
                | Error::AlreadyExists(_)
                | Error::LimitExceeded(_)
        )
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
    fn expected_outcomes_are_not_fatal() {
        assert!(Error::NotFound("x".into()).is_expected());
        assert!(Error::AlreadyExists("x".into()).is_expected());
        assert!(Error::LimitExceeded("x".into()).is_expected());
        assert!(Error::MalformedIdentifier("x".into()).is_expected());
    }

    #[test]
    fn storage_and_migration_are_fatal() {
        let io = Error::Storage(std::io::Error::new(std::io::ErrorKind::Other, "disk full"));
        assert!(!io.is_expected());
        let mig = Error::MigrationFailed {
            account: "alice".into(),
            reason: "torn rename".into(),
        };
        assert!(!mig.is_expected());
        assert!(mig.to_string().contains("alice"));
    }

    #[test]
    fn serde_json_errors_convert() {
        let bad: std::result::Result<serde_json::Value, _> = serde_json::from_str("{");
        let err: Error = bad.unwrap_err().into();
        assert!(matches!(err, Error::Serialization(_)));
    }
}
