//! S3 request routing: virtual hosting resolution and operation identification.
//!
//! The [`S3Router`] maps an incoming request to an [`S3Operation`] by looking
//! at the method, whether a bucket and key are present, and the
//! `x-amz-copy-source` header (which turns a PUT into a copy).
//!
//! The bucket can come from the `Host` header (`mybucket.s3.localhost`,
//! `mybucket.s3-us-west-2.amazonaws.com`) or from the first path segment.
//! With website hosting enabled, any other non-local host names the bucket
//! outright (`www.example.com` serves bucket `www.example.com`).
//! Either way the router also produces the canonical path-style target,
//! `/{bucket}{path}{query}`, which is what the access log records.

use std::fmt;

use http::Method;
use percent_encoding::percent_decode_str;

use crate::error::{S3Error, S3ErrorCode};

/// Header naming the source object of a copy.
const COPY_SOURCE: &str = "x-amz-copy-source";

/// Suffix of the real service's hostnames, always honored for virtual hosting.
const AWS_SUFFIX: &str = ".amazonaws.com";

/// Operations the emulator serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum S3Operation {
    /// `GET /`
    ListBuckets,
    /// `PUT /{bucket}`
    CreateBucket,
    /// `DELETE /{bucket}`
    DeleteBucket,
    /// `HEAD /{bucket}`
    HeadBucket,
    /// `GET /{bucket}`
    ListObjects,
    /// `PUT /{bucket}/{key}`
    PutObject,
    /// `PUT /{bucket}/{key}` with `x-amz-copy-source`
    CopyObject,
    /// `GET /{bucket}/{key}`
    GetObject,
    /// `HEAD /{bucket}/{key}`
    HeadObject,
    /// `DELETE /{bucket}/{key}`
    DeleteObject,
}

impl S3Operation {
    /// The operation name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ListBuckets => "ListBuckets",
            Self::CreateBucket => "CreateBucket",
            Self::DeleteBucket => "DeleteBucket",
            Self::HeadBucket => "HeadBucket",
            Self::ListObjects => "ListObjects",
            Self::PutObject => "PutObject",
            Self::CopyObject => "CopyObject",
            Self::GetObject => "GetObject",
            Self::HeadObject => "HeadObject",
            Self::DeleteObject => "DeleteObject",
        }
    }
}

impl fmt::Display for S3Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Configuration for S3 request routing.
#[derive(Debug, Clone)]
pub struct S3Router {
    /// The base domain for virtual-hosted-style requests (e.g., `s3.localhost`).
    pub domain: String,
    /// Whether to enable virtual-hosted-style bucket addressing.
    pub virtual_hosting: bool,
    /// Treat any other non-local `Host` as a bucket name, as static
    /// website hosting does.
    pub website_hosting: bool,
}

/// The result of routing an HTTP request to an S3 operation.
#[derive(Debug, Clone)]
pub struct RoutingContext {
    /// The resolved bucket name, if any.
    pub bucket: Option<String>,
    /// The resolved, percent-decoded object key, if any.
    pub key: Option<String>,
    /// The identified S3 operation.
    pub operation: S3Operation,
    /// Parsed query parameters from the request URI.
    pub query_params: Vec<(String, String)>,
}

impl RoutingContext {
    /// First value of a query parameter.
    #[must_use]
    pub fn query_value(&self, key: &str) -> Option<&str> {
        query_value(&self.query_params, key)
    }
}

impl S3Router {
    /// Create a new router with the given domain and virtual hosting setting.
    #[must_use]
    pub fn new(domain: impl Into<String>, virtual_hosting: bool) -> Self {
        Self {
            domain: domain.into(),
            virtual_hosting,
            website_hosting: false,
        }
    }

    /// Enable or disable `Host`-as-bucket addressing for website hosting.
    #[must_use]
    pub fn with_website_hosting(mut self, enabled: bool) -> Self {
        self.website_hosting = enabled;
        self
    }

    /// The bucket named by the request host, if virtual or website hosting
    /// applies.
    ///
    /// The host comes from the `Host` header, or from the URI authority for
    /// HTTP/2 requests that only carry `:authority`.
    #[must_use]
    pub fn virtual_host_bucket<B>(&self, req: &http::Request<B>) -> Option<String> {
        if !self.virtual_hosting && !self.website_hosting {
            return None;
        }
        let host = request_host(req)?;

        let bucket = if self.virtual_hosting {
            bucket_from_domain(&host, &self.domain).or_else(|| bucket_from_aws_host(&host))
        } else {
            None
        };
        bucket.or_else(|| {
            let website = self.website_hosting && !host.is_empty() && host != self.domain;
            (website && !is_local_host(&host)).then_some(host)
        })
    }

    /// Rewrite the request target to path style: `/{bucket}{path}{?query}`.
    ///
    /// Path-style requests are returned unchanged. Percent-encoding is kept.
    ///
    /// # Examples
    ///
    /// ```
    /// use ruststack_s3_http::router::S3Router;
    ///
    /// let router = S3Router::new("s3.localhost", true);
    /// let req = http::Request::builder()
    ///     .uri("/dir/file.txt?acl")
    ///     .header("host", "data.s3.localhost:4578")
    ///     .body(())
    ///     .unwrap();
    /// assert_eq!(router.canonical_target(&req), "/data/dir/file.txt?acl");
    /// ```
    #[must_use]
    pub fn canonical_target<B>(&self, req: &http::Request<B>) -> String {
        let uri = req.uri();
        let path = uri.path();
        let mut target = match self.virtual_host_bucket(req) {
            Some(bucket) if path == "/" || path.is_empty() => format!("/{bucket}"),
            Some(bucket) => format!("/{bucket}{path}"),
            None => path.to_owned(),
        };
        if let Some(query) = uri.query() {
            target.push('?');
            target.push_str(query);
        }
        target
    }

    /// Resolve an HTTP request to a routing context.
    ///
    /// # Errors
    ///
    /// Returns `MethodNotAllowed` for methods the addressed resource does not
    /// support and `NotImplemented` for `POST`.
    pub fn resolve<B>(&self, req: &http::Request<B>) -> Result<RoutingContext, S3Error> {
        let uri = req.uri();
        let headers = req.headers();
        let query_params = parse_query_params(uri.query().unwrap_or(""));
        let path = uri.path();

        let (bucket, key) = match self.virtual_host_bucket(req) {
            Some(vhost_bucket) => {
                let raw_key = path.strip_prefix('/').unwrap_or(path);
                let key = (!raw_key.is_empty()).then(|| decode_uri_component(raw_key));
                (Some(vhost_bucket), key)
            }
            None => parse_path(path),
        };

        let operation = identify_operation(
            req.method(),
            bucket.is_some(),
            key.is_some(),
            headers.contains_key(COPY_SOURCE),
        )?;

        Ok(RoutingContext {
            bucket,
            key,
            operation,
            query_params,
        })
    }
}

/// Lowercased request host without the port.
fn request_host<B>(req: &http::Request<B>) -> Option<String> {
    let host = match req.headers().get(http::header::HOST) {
        Some(value) => {
            let host = value.to_str().ok()?;
            host.split(':').next().unwrap_or(host)
        }
        None => req.uri().host()?,
    };
    Some(host.to_ascii_lowercase())
}

fn is_local_host(host: &str) -> bool {
    host == "localhost" || host == "127.0.0.1"
}

/// `{bucket}.{domain}` with a non-empty bucket part.
fn bucket_from_domain(host: &str, domain: &str) -> Option<String> {
    let bucket = host.strip_suffix(domain)?.strip_suffix('.')?;
    (!bucket.is_empty()).then(|| bucket.to_owned())
}

/// `{bucket}.s3.amazonaws.com` or `{bucket}.s3-{region}.amazonaws.com`.
fn bucket_from_aws_host(host: &str) -> Option<String> {
    let rest = host.strip_suffix(AWS_SUFFIX)?;
    rest.rmatch_indices(".s3")
        .find(|(idx, _)| {
            let tail = &rest[idx + 3..];
            *idx > 0 && (tail.is_empty() || tail.starts_with('-'))
        })
        .map(|(idx, _)| rest[..idx].to_owned())
}

/// Parse the URI path into an optional bucket and optional key.
fn parse_path(path: &str) -> (Option<String>, Option<String>) {
    let trimmed = path.strip_prefix('/').unwrap_or(path);
    if trimmed.is_empty() {
        return (None, None);
    }

    match trimmed.split_once('/') {
        Some((bucket, key)) => {
            let key = (!key.is_empty()).then(|| decode_uri_component(key));
            (Some(decode_uri_component(bucket)), key)
        }
        None => (Some(decode_uri_component(trimmed)), None),
    }
}

/// Decode a percent-encoded URI component.
fn decode_uri_component(s: &str) -> String {
    percent_decode_str(s).decode_utf8_lossy().into_owned()
}

/// Parse a query string into key-value pairs.
fn parse_query_params(query: &str) -> Vec<(String, String)> {
    query
        .split('&')
        .filter(|s| !s.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((k, v)) => (
                decode_uri_component(k),
                decode_uri_component(&v.replace('+', " ")),
            ),
            None => (decode_uri_component(pair), String::new()),
        })
        .collect()
}

fn query_value<'a>(params: &'a [(String, String)], key: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

fn identify_operation(
    method: &Method,
    has_bucket: bool,
    has_key: bool,
    has_copy_source: bool,
) -> Result<S3Operation, S3Error> {
    if *method == Method::POST {
        return Err(S3Error::not_implemented("POST"));
    }

    match (method, has_bucket, has_key) {
        (&Method::GET, false, false) => Ok(S3Operation::ListBuckets),

        (&Method::GET, true, false) => Ok(S3Operation::ListObjects),
        (&Method::PUT, true, false) => Ok(S3Operation::CreateBucket),
        (&Method::DELETE, true, false) => Ok(S3Operation::DeleteBucket),
        (&Method::HEAD, true, false) => Ok(S3Operation::HeadBucket),

        (&Method::GET, true, true) => Ok(S3Operation::GetObject),
        (&Method::HEAD, true, true) => Ok(S3Operation::HeadObject),
        (&Method::DELETE, true, true) => Ok(S3Operation::DeleteObject),
        (&Method::PUT, true, true) if has_copy_source => Ok(S3Operation::CopyObject),
        (&Method::PUT, true, true) => Ok(S3Operation::PutObject),

        (_, false, true) => Err(S3Error::with_message(
            S3ErrorCode::InvalidRequest,
            "Object key specified without bucket",
        )),
        (method, _, _) => Err(S3Error::method_not_allowed(method.as_str())),
    }
}
