//! Error types for the sync engine.

use thiserror::Error;

/// Result type alias using SyncError.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Errors that can occur while synchronizing the version store and the
/// vector store. Adapter-specific failures are mapped into one of these
/// kinds at the adapter boundary; callers never match on raw messages.
#[derive(Error, Debug)]
pub enum SyncError {
    /// The external version-store executable could not be located or run.
    #[error("version store executable not found: {path}")]
    ExecutableNotFound { path: String },

    /// A clone or open targeted a repository with no commits.
    #[error("version store repository is empty")]
    EmptyRepository,

    /// The configured remote does not exist.
    #[error("remote not found: {name}")]
    RemoteNotFound { name: String },

    /// Authentication against the remote failed.
    #[error("authentication to remote failed")]
    RemoteAuthFailed,

    /// The version store working tree has changes the operation did not expect.
    #[error("uncommitted changes in version store: {detail}")]
    UncommittedChanges { detail: String },

    /// XS→VS pending changes block a destructive operation.
    #[error("local changes exist in {count} document(s); pass force to override")]
    LocalChangesExist { count: usize },

    /// A version-store merge produced conflicts.
    #[error("merge conflicts in {table}: {rows:?}")]
    Conflicts { table: String, rows: Vec<String> },

    /// The recorded embedding model no longer matches configuration.
    #[error("embedding model mismatch: sync state has '{recorded}', configured '{configured}'")]
    ModelMismatch { recorded: String, configured: String },

    /// The documents/collections schema has not been created yet.
    #[error("required schema is missing: {detail}")]
    SchemaMissing { detail: String },

    /// A content hash did not match its expected value.
    #[error("content hash mismatch for {collection}/{doc_id}: expected {expected}, got {actual}")]
    ContentHashMismatch {
        collection: String,
        doc_id: String,
        expected: String,
        actual: String,
    },

    /// The Stager failed to apply an XS→VS batch.
    #[error("stager failed: {message}")]
    StagerFailure { message: String },

    /// The Hydrator failed to apply a VS→XS batch.
    #[error("hydrator failed: {message}")]
    HydratorFailure { message: String },

    /// The operation was cancelled by the caller.
    #[error("operation cancelled")]
    Cancelled,

    /// An invariant was violated and does not fit a more specific kind.
    #[error("inconsistent state: {message}")]
    Inconsistent { message: String },

    /// The version-store CLI ran but returned an unrecognized failure, or timed out.
    #[error("version store command failed: {message}")]
    ExecutableFailure { message: String },

    /// The vector-store adapter returned a failure.
    #[error("vector store error: {message}")]
    XsFailure { message: String },

    /// Invalid argument provided by the caller.
    #[error("invalid argument: {message}")]
    InvalidArgument { message: String },

    /// State store (side-band SQLite) error.
    #[error("database error: {message}")]
    Database { message: String },

    /// Configuration error.
    #[error("configuration error: {message}")]
    Config { message: String },

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error (unexpected).
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl SyncError {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    pub fn database(message: impl Into<String>) -> Self {
        Self::Database {
            message: message.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
        }
    }

    pub fn stager(message: impl Into<String>) -> Self {
        Self::StagerFailure {
            message: message.into(),
        }
    }

    pub fn hydrator(message: impl Into<String>) -> Self {
        Self::HydratorFailure {
            message: message.into(),
        }
    }

    pub fn executable_failure(message: impl Into<String>) -> Self {
        Self::ExecutableFailure {
            message: message.into(),
        }
    }

    pub fn xs_failure(message: impl Into<String>) -> Self {
        Self::XsFailure {
            message: message.into(),
        }
    }

    pub fn inconsistent(message: impl Into<String>) -> Self {
        Self::Inconsistent {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Stable, machine-readable code for this error kind.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::ExecutableNotFound { .. } => "EXECUTABLE_NOT_FOUND",
            Self::EmptyRepository => "EMPTY_REPOSITORY",
            Self::RemoteNotFound { .. } => "REMOTE_NOT_FOUND",
            Self::RemoteAuthFailed => "REMOTE_AUTH_FAILED",
            Self::UncommittedChanges { .. } => "UNCOMMITTED_CHANGES",
            Self::LocalChangesExist { .. } => "LOCAL_CHANGES_EXIST",
            Self::Conflicts { .. } => "CONFLICTS",
            Self::ModelMismatch { .. } => "MODEL_MISMATCH",
            Self::SchemaMissing { .. } => "SCHEMA_MISSING",
            Self::ContentHashMismatch { .. } => "CONTENT_HASH_MISMATCH",
            Self::StagerFailure { .. } => "STAGER_FAILURE",
            Self::HydratorFailure { .. } => "HYDRATOR_FAILURE",
            Self::Cancelled => "CANCELLED",
            Self::Inconsistent { .. } => "INCONSISTENT",
            Self::ExecutableFailure { .. } => "EXECUTABLE_FAILURE",
            Self::XsFailure { .. } => "XS_FAILURE",
            Self::InvalidArgument { .. } => "INVALID_ARGUMENT",
            Self::Database { .. } => "DATABASE_ERROR",
            Self::Config { .. } => "CONFIG_ERROR",
            Self::Io(_) => "IO_ERROR",
            Self::Serialization(_) => "SERIALIZATION_ERROR",
            Self::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    /// True for errors that block a destructive operation but leave both
    /// stores untouched, as opposed to ones raised after a failed attempt.
    pub fn is_blocking(&self) -> bool {
        matches!(
            self,
            Self::LocalChangesExist { .. } | Self::Conflicts { .. } | Self::ModelMismatch { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SyncError::RemoteNotFound {
            name: "origin".to_string(),
        };
        assert!(err.to_string().contains("origin"));
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            SyncError::LocalChangesExist { count: 2 }.error_code(),
            "LOCAL_CHANGES_EXIST"
        );
        assert_eq!(
            SyncError::database("boom").error_code(),
            "DATABASE_ERROR"
        );
    }

    #[test]
    fn blocking_classification() {
        assert!(SyncError::LocalChangesExist { count: 1 }.is_blocking());
        assert!(!SyncError::Cancelled.is_blocking());
    }
}
