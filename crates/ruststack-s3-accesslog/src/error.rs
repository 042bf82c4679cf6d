//! Access-log pipeline errors.
//!
//! Neither variant is fatal to the server. Both are reported with `warn!` by
//! the flush task and handed to any caller awaiting the flush.

/// Access-log pipeline error type.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AccessLogError {
    /// The log bucket could neither be found nor created. The batch being
    /// flushed is dropped.
    #[error("unable to create S3 log bucket {bucket}: {reason}")]
    Bootstrap {
        /// The configured log bucket.
        bucket: String,
        /// Why creation failed.
        reason: String,
    },

    /// The log object could not be written. The batch being flushed is dropped.
    #[error("unable to write S3 log {bucket}/{key}: {reason}")]
    Delivery {
        /// The configured log bucket.
        bucket: String,
        /// The key of the object being written.
        key: String,
        /// Why the write failed.
        reason: String,
    },

    /// The pipeline has already shut down.
    #[error("access log pipeline is closed")]
    Closed,
}

/// Convenience result type for access-log operations.
pub type AccessLogResult<T> = Result<T, AccessLogError>;
