//! S3 HTTP routing, XML responses, and the hyper service for RustStack.
//!
//! This crate provides the HTTP layer of the S3 emulator:
//!
//! - **Routing** ([`router`]): Maps HTTP requests to S3 operations by examining
//!   method and path. Supports both path-style and virtual-hosted-style bucket
//!   addressing, and rewrites every request into its canonical path-style
//!   target for the access log.
//!
//! - **XML** ([`xml`]): Serializes listing, copy, and error documents.
//!
//! - **Dispatch** ([`dispatch`]): Routes identified S3 operations to the business logic
//!   handler via the [`S3Handler`](dispatch::S3Handler) trait.
//!
//! - **Service** ([`service`]): The main [`S3HttpService`](service::S3HttpService) that
//!   implements hyper's `Service` trait and hands each completed transaction
//!   to the [`AccessLogger`](ruststack_s3_accesslog::AccessLogger).
//!
//! - **Body** ([`body`]): The [`S3ResponseBody`](body::S3ResponseBody) type supporting
//!   buffered and empty response modes.
//!
//! # Architecture
//!
//! ```text
//! HTTP Request
//!   -> S3HttpService (hyper Service)
//!     -> Health check / CORS interception
//!     -> S3Router (virtual hosting + operation identification)
//!     -> Body collection
//!     -> dispatch_operation (S3Handler trait)
//!     -> Common response headers (x-amz-request-id, Server, etc.)
//!     -> AccessLogger::log_entry (optional)
//!   <- HTTP Response
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use bytes::Bytes;
//! use ruststack_s3_http::dispatch::{HandlerFuture, S3Handler};
//! use ruststack_s3_http::error::S3Error;
//! use ruststack_s3_http::router::{RoutingContext, S3Operation};
//! use ruststack_s3_http::service::{S3HttpConfig, S3HttpService};
//!
//! struct Unsupported;
//!
//! impl S3Handler for Unsupported {
//!     fn handle_operation(
//!         &self,
//!         op: S3Operation,
//!         _parts: http::request::Parts,
//!         _body: Bytes,
//!         _ctx: RoutingContext,
//!     ) -> HandlerFuture {
//!         Box::pin(async move { Err(S3Error::not_implemented(op.as_str())) })
//!     }
//! }
//!
//! let service = S3HttpService::new(Unsupported, S3HttpConfig::default());
//! // Use `service` with hyper server.
//! ```

// S3Error carries its storage source; boxing it on every Result buys nothing here.
#![allow(clippy::result_large_err)]

pub mod body;
pub mod dispatch;
pub mod error;
pub mod router;
pub mod service;
pub mod xml;

pub use body::S3ResponseBody;
pub use dispatch::{HandlerFuture, S3Handler};
pub use error::{S3Error, S3ErrorCode, error_to_response};
pub use router::{RoutingContext, S3Operation, S3Router};
pub use service::{S3HttpConfig, S3HttpService};
