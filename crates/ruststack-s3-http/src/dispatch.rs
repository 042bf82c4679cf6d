//! Operation dispatch: the boundary between HTTP plumbing and storage logic.

use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;

use crate::body::S3ResponseBody;
use crate::error::S3Error;
use crate::router::{RoutingContext, S3Operation};

/// Boxed response future returned by [`S3Handler::handle_operation`].
pub type HandlerFuture =
    Pin<Box<dyn Future<Output = Result<http::Response<S3ResponseBody>, S3Error>> + Send>>;

/// Business logic behind the HTTP layer.
///
/// Boxed futures keep the trait object safe so the service can hold any
/// implementation behind an `Arc`.
pub trait S3Handler: Send + Sync + 'static {
    /// Handle a routed operation and produce a complete response.
    fn handle_operation(
        &self,
        op: S3Operation,
        parts: http::request::Parts,
        body: Bytes,
        ctx: RoutingContext,
    ) -> HandlerFuture;
}

/// Dispatch a routed request to the handler.
pub async fn dispatch_operation<H: S3Handler>(
    handler: &H,
    parts: http::request::Parts,
    body: Bytes,
    ctx: RoutingContext,
) -> Result<http::Response<S3ResponseBody>, S3Error> {
    let op = ctx.operation;
    tracing::debug!(operation = %op, bucket = ?ctx.bucket, key = ?ctx.key, "dispatching S3 operation");
    handler.handle_operation(op, parts, body, ctx).await
}
