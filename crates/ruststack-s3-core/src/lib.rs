//! Storage engine and configuration for the RustStack S3 emulator.
//!
//! Buckets are directories under a configurable root and every object is a
//! directory holding its content and a JSON metadata sidecar. This lets keys
//! nest (`a/b` and `a/b/c` coexist) the same way they do in the real service.
//!
//! # Architecture
//!
//! ```text
//! ruststack-s3-http (routing, XML)      ruststack-s3-accesslog
//!        |                                      |
//!        v                                      v
//!   FileStore (inherent API)  <----  StorageBackend (trait)
//!        |
//!        v
//!   {data_dir}/{bucket}/{key}/.content + .metadata.json
//! ```
//!
//! Object writes and deletes are announced on an [`EventHub`].

pub mod config;
pub mod error;
pub mod event;
pub mod storage;
pub mod validation;

pub use config::S3Config;
pub use error::{StorageError, StorageResult};
pub use event::{EventHub, S3Event, S3EventName};
pub use storage::{
    BucketInfo, ByteStream, FileStore, ListObjectsResult, ObjectInfo, ObjectMetadataInput,
    StorageBackend,
};
