//! Wire-level S3 errors.
//!
//! [`S3Error`] is what handlers return; [`error_to_response`] renders it as
//! the provider's flat `<Error>` document with the matching status code.

use std::fmt;

use ruststack_s3_core::StorageError;

use crate::body::S3ResponseBody;
use crate::xml::error_to_xml;

/// S3 error codes produced by the emulator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum S3ErrorCode {
    /// BucketAlreadyExists error.
    BucketAlreadyExists,
    /// BucketNotEmpty error.
    BucketNotEmpty,
    /// InternalError error.
    InternalError,
    /// InvalidArgument error.
    InvalidArgument,
    /// InvalidBucketName error.
    InvalidBucketName,
    /// InvalidRequest error.
    InvalidRequest,
    /// KeyTooLongError error.
    KeyTooLongError,
    /// MethodNotAllowed error.
    MethodNotAllowed,
    /// NoSuchBucket error.
    NoSuchBucket,
    /// NoSuchKey error.
    NoSuchKey,
    /// NotImplemented error.
    NotImplemented,
}

impl S3ErrorCode {
    /// Returns the error code as a string.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BucketAlreadyExists => "BucketAlreadyExists",
            Self::BucketNotEmpty => "BucketNotEmpty",
            Self::InternalError => "InternalError",
            Self::InvalidArgument => "InvalidArgument",
            Self::InvalidBucketName => "InvalidBucketName",
            Self::InvalidRequest => "InvalidRequest",
            Self::KeyTooLongError => "KeyTooLongError",
            Self::MethodNotAllowed => "MethodNotAllowed",
            Self::NoSuchBucket => "NoSuchBucket",
            Self::NoSuchKey => "NoSuchKey",
            Self::NotImplemented => "NotImplemented",
        }
    }

    /// Returns the default HTTP status code for this error.
    #[must_use]
    pub fn default_status_code(&self) -> http::StatusCode {
        match self {
            Self::InvalidArgument
            | Self::InvalidBucketName
            | Self::InvalidRequest
            | Self::KeyTooLongError => http::StatusCode::BAD_REQUEST,
            Self::NoSuchBucket | Self::NoSuchKey => http::StatusCode::NOT_FOUND,
            Self::MethodNotAllowed => http::StatusCode::METHOD_NOT_ALLOWED,
            Self::BucketAlreadyExists | Self::BucketNotEmpty => http::StatusCode::CONFLICT,
            Self::InternalError => http::StatusCode::INTERNAL_SERVER_ERROR,
            Self::NotImplemented => http::StatusCode::NOT_IMPLEMENTED,
        }
    }

    /// Returns the default message for this error.
    #[must_use]
    pub fn default_message(&self) -> &'static str {
        match self {
            Self::BucketAlreadyExists => "The requested bucket name is not available",
            Self::BucketNotEmpty => "The bucket you tried to delete is not empty",
            Self::InternalError => "We encountered an internal error. Please try again.",
            Self::InvalidArgument => "Invalid Argument",
            Self::InvalidBucketName => "The specified bucket is not valid",
            Self::InvalidRequest => "Invalid Request",
            Self::KeyTooLongError => "Your key is too long",
            Self::MethodNotAllowed => "The specified method is not allowed against this resource",
            Self::NoSuchBucket => "The specified bucket does not exist",
            Self::NoSuchKey => "The specified key does not exist",
            Self::NotImplemented => {
                "A header you provided implies functionality that is not implemented"
            }
        }
    }
}

impl fmt::Display for S3ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An S3 error response.
#[derive(Debug, thiserror::Error)]
#[error("S3Error({code}): {message}")]
pub struct S3Error {
    /// The error code.
    pub code: S3ErrorCode,
    /// A human-readable error message.
    pub message: String,
    /// The resource that caused the error.
    pub resource: Option<String>,
    /// The HTTP status code.
    pub status_code: http::StatusCode,
    /// The underlying storage error, if any.
    #[source]
    pub source: Option<StorageError>,
}

impl S3Error {
    /// Create an error with the code's default message.
    #[must_use]
    pub fn new(code: S3ErrorCode) -> Self {
        Self::with_message(code, code.default_message())
    }

    /// Create an error with a custom message.
    #[must_use]
    pub fn with_message(code: S3ErrorCode, message: impl Into<String>) -> Self {
        Self {
            status_code: code.default_status_code(),
            message: message.into(),
            code,
            resource: None,
            source: None,
        }
    }

    /// Set the resource that caused this error.
    #[must_use]
    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }

    /// Create a NoSuchBucket error.
    #[must_use]
    pub fn no_such_bucket(bucket: impl Into<String>) -> Self {
        Self::new(S3ErrorCode::NoSuchBucket).with_resource(bucket)
    }

    /// Create a NoSuchKey error.
    #[must_use]
    pub fn no_such_key(key: impl Into<String>) -> Self {
        Self::new(S3ErrorCode::NoSuchKey).with_resource(key)
    }

    /// Create a NotImplemented error naming the operation.
    #[must_use]
    pub fn not_implemented(operation: &str) -> Self {
        Self::with_message(
            S3ErrorCode::NotImplemented,
            format!("{operation} is not implemented"),
        )
    }

    /// Create a MethodNotAllowed error.
    #[must_use]
    pub fn method_not_allowed(method: &str) -> Self {
        Self::with_message(
            S3ErrorCode::MethodNotAllowed,
            format!("The specified method is not allowed against this resource: {method}"),
        )
    }

    /// Create an InternalError.
    #[must_use]
    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::with_message(S3ErrorCode::InternalError, message)
    }
}

impl From<StorageError> for S3Error {
    fn from(err: StorageError) -> Self {
        let mut s3 = match &err {
            StorageError::NoSuchBucket { bucket } => Self::no_such_bucket(bucket.clone()),
            StorageError::BucketAlreadyExists { bucket } => {
                Self::new(S3ErrorCode::BucketAlreadyExists).with_resource(bucket.clone())
            }
            StorageError::BucketNotEmpty { bucket } => {
                Self::new(S3ErrorCode::BucketNotEmpty).with_resource(bucket.clone())
            }
            StorageError::NoSuchKey { key } => Self::no_such_key(key.clone()),
            StorageError::InvalidBucketName { name, reason } => {
                Self::with_message(S3ErrorCode::InvalidBucketName, reason.clone())
                    .with_resource(name.clone())
            }
            StorageError::InvalidKey { key, reason } => {
                let code = if key.len() > 1024 {
                    S3ErrorCode::KeyTooLongError
                } else {
                    S3ErrorCode::InvalidArgument
                };
                Self::with_message(code, reason.clone())
            }
            StorageError::Io { .. } | StorageError::Metadata { .. } => {
                Self::new(S3ErrorCode::InternalError)
            }
        };
        s3.source = Some(err);
        s3
    }
}

/// Render an error as an XML response.
#[must_use]
pub fn error_to_response(err: &S3Error, request_id: &str) -> http::Response<S3ResponseBody> {
    let xml = error_to_xml(
        err.code.as_str(),
        &err.message,
        err.resource.as_deref(),
        request_id,
    );

    http::Response::builder()
        .status(err.status_code)
        .header(http::header::CONTENT_TYPE, "application/xml")
        .body(S3ResponseBody::from_xml(xml))
        .unwrap_or_else(|_| {
            http::Response::builder()
                .status(http::StatusCode::INTERNAL_SERVER_ERROR)
                .body(S3ResponseBody::empty())
                .expect("static response should be valid")
        })
}
