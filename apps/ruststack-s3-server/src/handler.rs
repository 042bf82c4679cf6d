//! S3 operation handler backed by the filesystem [`FileStore`].
//!
//! Bridges the HTTP layer (`ruststack-s3-http`) and the storage engine
//! (`ruststack-s3-core`) by implementing [`S3Handler`]. Successful object
//! writes and deletes are published on an [`EventHub`]. With an index
//! document configured the handler also serves static websites.

use std::collections::BTreeMap;
use std::sync::Arc;

use bytes::Bytes;
use http::HeaderMap;
use percent_encoding::percent_decode_str;
use ruststack_s3_core::{
    EventHub, FileStore, ObjectInfo, ObjectMetadataInput, S3Event, S3EventName,
};
use ruststack_s3_http::body::S3ResponseBody;
use ruststack_s3_http::dispatch::{HandlerFuture, S3Handler};
use ruststack_s3_http::error::{S3Error, S3ErrorCode};
use ruststack_s3_http::router::{RoutingContext, S3Operation};
use ruststack_s3_http::xml;

/// Prefix of user metadata headers.
const META_PREFIX: &str = "x-amz-meta-";

/// Default page size of ListObjects.
const DEFAULT_MAX_KEYS: usize = 1000;

type S3Result = Result<http::Response<S3ResponseBody>, S3Error>;

/// Static website documents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WebsiteConfig {
    /// Appended to keys ending in `/` and served for a bare bucket `GET`.
    pub index_document: Option<String>,
    /// Served with status 404 when the requested key does not exist.
    pub error_document: Option<String>,
}

/// Implements [`S3Handler`] over a shared [`FileStore`].
#[derive(Debug, Clone)]
pub struct RustStackHandler {
    store: Arc<FileStore>,
    events: EventHub,
    website: Arc<WebsiteConfig>,
}

impl RustStackHandler {
    /// Handler over `store` with its own event hub and no website documents.
    #[must_use]
    pub fn new(store: Arc<FileStore>) -> Self {
        Self {
            store,
            events: EventHub::default(),
            website: Arc::new(WebsiteConfig::default()),
        }
    }

    /// Publish object changes on `events`.
    #[must_use]
    pub fn with_events(mut self, events: EventHub) -> Self {
        self.events = events;
        self
    }

    /// Serve static website documents.
    #[must_use]
    pub fn with_website(mut self, website: WebsiteConfig) -> Self {
        self.website = Arc::new(website);
        self
    }

    /// The hub object changes are published on.
    #[must_use]
    pub fn events(&self) -> &EventHub {
        &self.events
    }

    async fn run(
        &self,
        op: S3Operation,
        parts: http::request::Parts,
        body: Bytes,
        ctx: RoutingContext,
    ) -> S3Result {
        let store = self.store.as_ref();
        match op {
            S3Operation::ListBuckets => list_buckets(store).await,
            S3Operation::CreateBucket => {
                let bucket = bucket_of(&ctx)?;
                store.create_bucket(bucket).await?;
                http::Response::builder()
                    .status(http::StatusCode::OK)
                    .header(http::header::LOCATION, format!("/{bucket}"))
                    .body(S3ResponseBody::empty())
                    .map_err(internal)
            }
            S3Operation::DeleteBucket => {
                store.delete_bucket(bucket_of(&ctx)?).await?;
                no_content()
            }
            S3Operation::HeadBucket => {
                store.get_bucket(bucket_of(&ctx)?).await?;
                http::Response::builder()
                    .status(http::StatusCode::OK)
                    .body(S3ResponseBody::empty())
                    .map_err(internal)
            }
            S3Operation::ListObjects => match self.website.index_document.as_deref() {
                Some(index) if ctx.query_params.is_empty() => {
                    self.serve_page(bucket_of(&ctx)?, index, true).await
                }
                _ => list_objects(store, &ctx).await,
            },
            S3Operation::PutObject => {
                let (bucket, key) = object_of(&ctx)?;
                let metadata = ObjectMetadataInput {
                    content_type: header_str(&parts.headers, http::header::CONTENT_TYPE.as_str())
                        .map(ToOwned::to_owned),
                    user_metadata: user_metadata(&parts.headers),
                };
                let info = store.put_bytes(bucket, key, body, metadata).await?;
                self.publish_created(S3EventName::ObjectCreatedPut, bucket, key, &info);
                http::Response::builder()
                    .status(http::StatusCode::OK)
                    .header(http::header::ETAG, info.etag)
                    .body(S3ResponseBody::empty())
                    .map_err(internal)
            }
            S3Operation::CopyObject => {
                let (bucket, key) = object_of(&ctx)?;
                let (src_bucket, src_key) = copy_source(&parts.headers)?;
                let info = store.copy_object(&src_bucket, &src_key, bucket, key).await?;
                self.publish_created(S3EventName::ObjectCreatedCopy, bucket, key, &info);
                xml_response(xml::copy_object_xml(&info))
            }
            S3Operation::GetObject => {
                let (bucket, key) = object_of(&ctx)?;
                self.serve_page(bucket, &self.index_key(key), true).await
            }
            S3Operation::HeadObject => {
                let (bucket, key) = object_of(&ctx)?;
                self.serve_page(bucket, &self.index_key(key), false).await
            }
            S3Operation::DeleteObject => {
                let (bucket, key) = object_of(&ctx)?;
                store.delete_object(bucket, key).await?;
                self.events.publish(S3Event::removed(bucket, key));
                no_content()
            }
        }
    }

    /// `key` with the index document appended when it names a directory.
    fn index_key(&self, key: &str) -> String {
        match self.website.index_document.as_deref() {
            Some(index) if key.ends_with('/') => format!("{key}{index}"),
            _ => key.to_owned(),
        }
    }

    /// Serve an object, falling back to the error document for missing keys.
    async fn serve_page(&self, bucket: &str, key: &str, with_body: bool) -> S3Result {
        let err = match fetch_object(&self.store, bucket, key, with_body).await {
            Ok((info, body)) => return object_response(&info, body, http::StatusCode::OK),
            Err(err) => S3Error::from(err),
        };
        let Some(error_document) = self.website.error_document.as_deref() else {
            return Err(err);
        };
        if err.code != S3ErrorCode::NoSuchKey {
            return Err(err);
        }
        match fetch_object(&self.store, bucket, error_document, with_body).await {
            Ok((info, body)) => object_response(&info, body, http::StatusCode::NOT_FOUND),
            Err(_) => Err(err),
        }
    }

    fn publish_created(&self, name: S3EventName, bucket: &str, key: &str, info: &ObjectInfo) {
        let etag = info.etag.trim_matches('"');
        self.events
            .publish(S3Event::created(name, bucket, key, info.size, etag));
    }
}

impl S3Handler for RustStackHandler {
    fn handle_operation(
        &self,
        op: S3Operation,
        parts: http::request::Parts,
        body: Bytes,
        ctx: RoutingContext,
    ) -> HandlerFuture {
        let handler = self.clone();
        Box::pin(async move { handler.run(op, parts, body, ctx).await })
    }
}

async fn fetch_object(
    store: &FileStore,
    bucket: &str,
    key: &str,
    with_body: bool,
) -> ruststack_s3_core::StorageResult<(ObjectInfo, S3ResponseBody)> {
    if with_body {
        let (info, data) = store.get_object(bucket, key).await?;
        Ok((info, S3ResponseBody::from_bytes(data)))
    } else {
        let info = store.head_object(bucket, key).await?;
        Ok((info, S3ResponseBody::empty()))
    }
}

async fn list_buckets(store: &FileStore) -> S3Result {
    let buckets = store.list_buckets().await?;
    xml_response(xml::list_buckets_xml(&buckets))
}

async fn list_objects(store: &FileStore, ctx: &RoutingContext) -> S3Result {
    let bucket = bucket_of(ctx)?;
    let prefix = ctx.query_value("prefix").unwrap_or("");
    let max_keys = match ctx.query_value("max-keys") {
        Some(raw) => raw.parse().map_err(|_| {
            S3Error::with_message(
                S3ErrorCode::InvalidArgument,
                "Provided max-keys not an integer or within integer range",
            )
        })?,
        None => DEFAULT_MAX_KEYS,
    };
    let result = store.list_objects(bucket, prefix, max_keys).await?;
    xml_response(xml::list_objects_xml(bucket, prefix, max_keys, &result))
}

fn bucket_of(ctx: &RoutingContext) -> Result<&str, S3Error> {
    ctx.bucket
        .as_deref()
        .ok_or_else(|| S3Error::with_message(S3ErrorCode::InvalidRequest, "Missing bucket name"))
}

fn object_of(ctx: &RoutingContext) -> Result<(&str, &str), S3Error> {
    let bucket = bucket_of(ctx)?;
    let key = ctx
        .key
        .as_deref()
        .ok_or_else(|| S3Error::with_message(S3ErrorCode::InvalidRequest, "Missing object key"))?;
    Ok((bucket, key))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// `x-amz-meta-*` headers without the prefix.
fn user_metadata(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            let name = name.as_str().strip_prefix(META_PREFIX)?;
            Some((name.to_owned(), value.to_str().ok()?.to_owned()))
        })
        .collect()
}

/// Decode `x-amz-copy-source` (`[/]bucket/key[?versionId=..]`).
fn copy_source(headers: &HeaderMap) -> Result<(String, String), S3Error> {
    let invalid = || {
        S3Error::with_message(
            S3ErrorCode::InvalidArgument,
            "Copy Source must mention the source bucket and key: sourcebucket/sourcekey",
        )
    };
    let raw = header_str(headers, "x-amz-copy-source").ok_or_else(invalid)?;
    let raw = raw.split_once('?').map_or(raw, |(path, _)| path);
    let decoded = percent_decode_str(raw).decode_utf8_lossy();
    let trimmed = decoded.strip_prefix('/').unwrap_or(&decoded);
    match trimmed.split_once('/') {
        Some((bucket, key)) if !bucket.is_empty() && !key.is_empty() => {
            Ok((bucket.to_owned(), key.to_owned()))
        }
        _ => Err(invalid()),
    }
}

fn object_response(
    info: &ObjectInfo,
    body: S3ResponseBody,
    status: http::StatusCode,
) -> S3Result {
    let mut builder = http::Response::builder()
        .status(status)
        .header(http::header::CONTENT_TYPE, &info.content_type)
        .header(http::header::CONTENT_LENGTH, info.size)
        .header(http::header::ETAG, &info.etag)
        .header(
            http::header::LAST_MODIFIED,
            info.last_modified
                .format("%a, %d %b %Y %H:%M:%S GMT")
                .to_string(),
        );
    for (name, value) in &info.user_metadata {
        builder = builder.header(format!("{META_PREFIX}{name}"), value);
    }
    builder.body(body).map_err(internal)
}

fn xml_response(xml: Vec<u8>) -> S3Result {
    http::Response::builder()
        .status(http::StatusCode::OK)
        .header(http::header::CONTENT_TYPE, "application/xml")
        .body(S3ResponseBody::from_xml(xml))
        .map_err(internal)
}

fn no_content() -> S3Result {
    http::Response::builder()
        .status(http::StatusCode::NO_CONTENT)
        .body(S3ResponseBody::empty())
        .map_err(internal)
}

fn internal(err: http::Error) -> S3Error {
    S3Error::internal_error(format!("failed to build response: {err}"))
}
