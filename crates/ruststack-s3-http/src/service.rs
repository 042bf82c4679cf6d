//! The main S3 HTTP service implementing hyper's `Service` trait.
//!
//! [`S3HttpService`] handles, in order:
//!
//! 1. Health check interception (`GET /_localstack/health`)
//! 2. CORS preflight requests (`OPTIONS`)
//! 3. S3 request routing via [`S3Router`]
//! 4. Request body collection
//! 5. Operation dispatch to the [`S3Handler`]
//! 6. Common response headers (`x-amz-request-id`, `Server`, CORS)
//! 7. Handing the completed transaction to the access log, if enabled
//!
//! The access log sees every request, including health checks and errors,
//! addressed in canonical path style.

use std::convert::Infallible;
use std::fmt;
use std::future::Future;
use std::net::IpAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use http_body_util::BodyExt;
use hyper::body::Incoming;
use hyper::service::Service;
use ruststack_s3_accesslog::{AccessLogger, LogRequestRecord, RequestTarget, request_id};
use tracing::{debug, error, info, warn};

use crate::body::S3ResponseBody;
use crate::dispatch::{S3Handler, dispatch_operation};
use crate::error::{S3Error, error_to_response};
use crate::router::S3Router;

/// Configuration for the S3 HTTP service.
#[derive(Debug, Clone)]
pub struct S3HttpConfig {
    /// The base domain for virtual-hosted-style requests (e.g., `s3.localhost`).
    pub domain: String,
    /// Whether to enable virtual-hosted-style bucket addressing.
    pub virtual_hosting: bool,
    /// Whether a non-local `Host` header names the bucket directly.
    pub website_hosting: bool,
}

impl Default for S3HttpConfig {
    fn default() -> Self {
        Self {
            domain: "s3.localhost".to_owned(),
            virtual_hosting: true,
            website_hosting: false,
        }
    }
}

/// The S3 HTTP service that implements hyper's `Service` trait.
///
/// # Type Parameters
///
/// - `H`: The business logic handler implementing [`S3Handler`].
#[derive(Debug)]
pub struct S3HttpService<H: S3Handler> {
    handler: Arc<H>,
    router: S3Router,
    config: Arc<S3HttpConfig>,
    access_log: Option<AccessLogger>,
    remote_addr: Option<IpAddr>,
}

impl<H: S3Handler> S3HttpService<H> {
    /// Create a new S3 HTTP service with the given handler and configuration.
    #[must_use]
    pub fn new(handler: H, config: S3HttpConfig) -> Self {
        Self::from_shared(Arc::new(handler), config)
    }

    /// Create a new S3 HTTP service from an `Arc<H>` handler and configuration.
    #[must_use]
    pub fn from_shared(handler: Arc<H>, config: S3HttpConfig) -> Self {
        let router = S3Router::new(&config.domain, config.virtual_hosting)
            .with_website_hosting(config.website_hosting);
        Self {
            handler,
            router,
            config: Arc::new(config),
            access_log: None,
            remote_addr: None,
        }
    }

    /// Record every completed request with `logger`.
    #[must_use]
    pub fn with_access_log(mut self, logger: AccessLogger) -> Self {
        self.access_log = Some(logger);
        self
    }

    /// A copy of this service bound to one client connection.
    #[must_use]
    pub fn with_remote_addr(&self, addr: IpAddr) -> Self {
        let mut service = self.clone();
        service.remote_addr = Some(addr);
        service
    }

    /// The service configuration.
    #[must_use]
    pub fn config(&self) -> &S3HttpConfig {
        &self.config
    }

    /// Run one request through the full pipeline.
    pub async fn handle<B>(&self, req: http::Request<B>) -> http::Response<S3ResponseBody>
    where
        B: http_body::Body<Data = Bytes>,
        B::Error: fmt::Display,
    {
        let started = Instant::now();
        let request_id = request_id();
        let snapshot = self
            .access_log
            .as_ref()
            .map(|_| RequestSnapshot::capture(&req, &self.router));

        let response = process_request(req, self.handler.as_ref(), &self.router, &request_id).await;
        let response = add_common_headers(response, &request_id);

        if let (Some(logger), Some(snapshot)) = (&self.access_log, snapshot) {
            let record = snapshot.into_record(&response, started, self.remote_addr);
            logger.log_entry(&record);
        }

        response
    }
}

impl<H: S3Handler> Clone for S3HttpService<H> {
    fn clone(&self) -> Self {
        Self {
            handler: Arc::clone(&self.handler),
            router: self.router.clone(),
            config: Arc::clone(&self.config),
            access_log: self.access_log.clone(),
            remote_addr: self.remote_addr,
        }
    }
}

impl<H: S3Handler> Service<http::Request<Incoming>> for S3HttpService<H> {
    type Response = http::Response<S3ResponseBody>;
    type Error = Infallible;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response, Self::Error>> + Send>>;

    fn call(&self, req: http::Request<Incoming>) -> Self::Future {
        let service = self.clone();
        Box::pin(async move { Ok(service.handle(req).await) })
    }
}

/// The request-side fields of an access-log record, taken before the
/// request is consumed.
#[derive(Debug)]
struct RequestSnapshot {
    method: http::Method,
    target: RequestTarget,
    time: DateTime<Utc>,
    http_version: http::Version,
    headers: http::HeaderMap,
}

impl RequestSnapshot {
    fn capture<B>(req: &http::Request<B>, router: &S3Router) -> Self {
        Self {
            method: req.method().clone(),
            target: RequestTarget::from_path_and_query(&router.canonical_target(req)),
            time: Utc::now(),
            http_version: req.version(),
            headers: req.headers().clone(),
        }
    }

    fn into_record(
        self,
        response: &http::Response<S3ResponseBody>,
        started: Instant,
        remote_addr: Option<IpAddr>,
    ) -> LogRequestRecord {
        let header = |name: http::header::HeaderName| {
            self.headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(ToOwned::to_owned)
        };
        let referrer = header(http::header::REFERER);
        let user_agent = header(http::header::USER_AGENT);

        LogRequestRecord::builder()
            .method(self.method)
            .target(self.target)
            .time(self.time)
            .remote_addr(remote_addr)
            .http_version(self.http_version)
            .status(response.status().as_u16())
            .content_length(response_length(response))
            .referrer(referrer)
            .user_agent(user_agent)
            .headers(self.headers)
            .processing_time(Some(started.elapsed()))
            .build()
    }
}

/// `Content-Length` of a response: the header when set, otherwise the size
/// of a buffered body.
fn response_length(response: &http::Response<S3ResponseBody>) -> Option<u64> {
    let from_header = response
        .headers()
        .get(http::header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok());
    from_header.or_else(|| match response.body() {
        S3ResponseBody::Empty => None,
        body @ S3ResponseBody::Buffered(_) => body.content_length(),
    })
}

/// Process an incoming HTTP request through the S3 pipeline.
async fn process_request<B, H>(
    req: http::Request<B>,
    handler: &H,
    router: &S3Router,
    request_id: &str,
) -> http::Response<S3ResponseBody>
where
    B: http_body::Body<Data = Bytes>,
    B::Error: fmt::Display,
    H: S3Handler,
{
    let method = req.method().clone();
    let uri = req.uri().clone();
    debug!(%method, %uri, request_id, "processing S3 request");

    if is_health_check(&method, uri.path()) {
        return health_check_response();
    }

    if method == http::Method::OPTIONS {
        return cors_preflight_response();
    }

    let ctx = match router.resolve(&req) {
        Ok(ctx) => ctx,
        Err(err) => {
            warn!(%method, %uri, error = %err, request_id, "failed to route S3 request");
            return error_to_response(&err, request_id);
        }
    };

    info!(
        operation = %ctx.operation,
        bucket = ?ctx.bucket,
        key = ?ctx.key,
        request_id,
        "routed S3 request"
    );

    let (parts, body) = req.into_parts();
    let body = match body.collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(err) => {
            error!(error = %err, request_id, "failed to collect request body");
            let s3_err = S3Error::internal_error("Failed to read request body");
            return error_to_response(&s3_err, request_id);
        }
    };

    match dispatch_operation(handler, parts, body, ctx).await {
        Ok(response) => response,
        Err(err) => {
            debug!(error = %err, request_id, "S3 operation returned error");
            error_to_response(&err, request_id)
        }
    }
}

/// Check if the request is a health check request.
fn is_health_check(method: &http::Method, path: &str) -> bool {
    *method == http::Method::GET
        && (path == "/_localstack/health" || path == "/_health" || path == "/health")
}

/// Produce a health check response.
fn health_check_response() -> http::Response<S3ResponseBody> {
    http::Response::builder()
        .status(http::StatusCode::OK)
        .header("Content-Type", "application/json")
        .body(S3ResponseBody::from_string(
            r#"{"services":{"s3":"running"}}"#,
        ))
        .expect("static health response should be valid")
}

/// Produce a CORS preflight response.
fn cors_preflight_response() -> http::Response<S3ResponseBody> {
    http::Response::builder()
        .status(http::StatusCode::OK)
        .header("Access-Control-Allow-Origin", "*")
        .header(
            "Access-Control-Allow-Methods",
            "GET, PUT, POST, DELETE, HEAD, OPTIONS",
        )
        .header(
            "Access-Control-Allow-Headers",
            "*, Authorization, Content-Type, x-amz-*",
        )
        .header("Access-Control-Max-Age", "86400")
        .body(S3ResponseBody::empty())
        .expect("static CORS response should be valid")
}

/// Add common response headers to every S3 response.
fn add_common_headers(
    mut response: http::Response<S3ResponseBody>,
    request_id: &str,
) -> http::Response<S3ResponseBody> {
    let headers = response.headers_mut();

    if let Ok(hv) = http::header::HeaderValue::from_str(request_id) {
        headers.insert("x-amz-request-id", hv);
    }
    headers.insert(
        "Server",
        http::header::HeaderValue::from_static("RustStackS3"),
    );
    headers.insert(
        "Access-Control-Allow-Origin",
        http::header::HeaderValue::from_static("*"),
    );
    headers.insert(
        "Access-Control-Expose-Headers",
        http::header::HeaderValue::from_static("x-amz-request-id, ETag"),
    );

    response
}
