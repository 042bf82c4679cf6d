//! The per-request snapshot handed to the access-log pipeline.

use std::net::IpAddr;
use std::time::Duration;

use chrono::{DateTime, Utc};
use http::{HeaderMap, Method, Version};
use typed_builder::TypedBuilder;

/// Path-style addressing of a request: `/{bucket}/{key}{query}`.
///
/// `bucket` and `key` are kept exactly as they appeared on the wire (still
/// percent-encoded), since the access-log grammar echoes the request URI.
/// `query` is either empty or starts with `?`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestTarget {
    /// First path segment.
    pub bucket: String,
    /// Everything after the bucket segment; empty for bucket-level requests.
    pub key: String,
    /// Query string including the leading `?`, or empty.
    pub query: String,
}

impl RequestTarget {
    /// Create a target from its parts. A non-empty `query` without a leading
    /// `?` gets one.
    #[must_use]
    pub fn new(bucket: impl Into<String>, key: impl Into<String>, query: impl Into<String>) -> Self {
        let mut query = query.into();
        if !query.is_empty() && !query.starts_with('?') {
            query.insert(0, '?');
        }
        Self {
            bucket: bucket.into(),
            key: key.into(),
            query,
        }
    }

    /// Split a canonical path-style request target.
    ///
    /// # Examples
    ///
    /// ```
    /// use ruststack_s3_accesslog::RequestTarget;
    ///
    /// let target = RequestTarget::from_path_and_query("/data/dir/file.txt?versionId=3");
    /// assert_eq!(target.bucket, "data");
    /// assert_eq!(target.key, "dir/file.txt");
    /// assert_eq!(target.query, "?versionId=3");
    /// ```
    #[must_use]
    pub fn from_path_and_query(path_and_query: &str) -> Self {
        let (path, query) = match path_and_query.find('?') {
            Some(pos) => path_and_query.split_at(pos),
            None => (path_and_query, ""),
        };
        let trimmed = path.strip_prefix('/').unwrap_or(path);
        let (bucket, key) = trimmed.split_once('/').unwrap_or((trimmed, ""));
        Self::new(bucket, key, query)
    }
}

/// An immutable snapshot of one completed HTTP transaction.
///
/// Produced once per request by the HTTP layer and consumed once by
/// [`build_entry`](crate::build_entry).
#[derive(Debug, Clone, TypedBuilder)]
pub struct LogRequestRecord {
    /// Request method.
    pub method: Method,
    /// Canonical path-style target.
    pub target: RequestTarget,
    /// When the request was received.
    #[builder(default = Utc::now())]
    pub time: DateTime<Utc>,
    /// Client address.
    #[builder(default)]
    pub remote_addr: Option<IpAddr>,
    /// Request protocol version.
    #[builder(default = Version::HTTP_11)]
    pub http_version: Version,
    /// Response status code.
    pub status: u16,
    /// Response `Content-Length`.
    #[builder(default)]
    pub content_length: Option<u64>,
    /// `Referer` request header.
    #[builder(default)]
    pub referrer: Option<String>,
    /// `User-Agent` request header.
    #[builder(default)]
    pub user_agent: Option<String>,
    /// All request headers.
    #[builder(default)]
    pub headers: HeaderMap,
    /// Time spent producing the response.
    #[builder(default)]
    pub processing_time: Option<Duration>,
}
