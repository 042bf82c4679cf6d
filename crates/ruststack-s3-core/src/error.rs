//! Storage engine error types.
//!
//! [`StorageError`] covers the failures the filesystem engine can report. The
//! HTTP layer maps each variant onto a wire error code; the access-log
//! pipeline only needs the message.

use std::path::PathBuf;

/// Storage engine error type.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The specified bucket does not exist.
    #[error("The specified bucket does not exist: {bucket}")]
    NoSuchBucket {
        /// The bucket name that was not found.
        bucket: String,
    },

    /// A bucket with this name already exists.
    #[error("The requested bucket name is not available: {bucket}")]
    BucketAlreadyExists {
        /// The bucket name that already exists.
        bucket: String,
    },

    /// The bucket still holds objects.
    #[error("The bucket you tried to delete is not empty: {bucket}")]
    BucketNotEmpty {
        /// The bucket name that is not empty.
        bucket: String,
    },

    /// The specified key does not exist.
    #[error("The specified key does not exist: {key}")]
    NoSuchKey {
        /// The key that was not found.
        key: String,
    },

    /// The bucket name violates the naming rules.
    #[error("Invalid bucket name: {name}: {reason}")]
    InvalidBucketName {
        /// The invalid bucket name.
        name: String,
        /// The rule that was violated.
        reason: String,
    },

    /// The object key cannot be stored.
    #[error("Invalid object key: {key}: {reason}")]
    InvalidKey {
        /// The invalid key.
        key: String,
        /// The rule that was violated.
        reason: String,
    },

    /// A filesystem operation failed.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// The path being accessed.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// An object's metadata sidecar could not be read or written.
    #[error("corrupt object metadata at {}: {source}", path.display())]
    Metadata {
        /// Path of the sidecar file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: serde_json::Error,
    },
}

impl StorageError {
    /// Wrap an I/O error with the path that produced it.
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Convenience result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;
