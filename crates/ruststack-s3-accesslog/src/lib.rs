//! Server access-log emulation for the RustStack S3 emulator.
//!
//! Completed requests against selected source buckets are turned into lines
//! in the real service's access-log grammar, buffered, and delivered in
//! batches as `text/plain` objects in a log bucket.
//!
//! # Architecture
//!
//! ```text
//! S3HttpService --LogRequestRecord--> AccessLogger::log_entry
//!                                          |
//!                                     build_entry (0, 1 or 2 lines, flush signal)
//!                                          |  mpsc
//!                                          v
//!                                   Scheduler task (owns the buffer)
//!                                     triggers: size / timer / implicit / manual
//!                                          |  swap buffer, spawn flush
//!                                          v
//!                          Bootstrapper::ensure --> StorageBackend::put_object
//! ```
//!
//! At most one flush is in flight at any time. The buffer is swapped out
//! before any I/O, so lines recorded during a delivery land in the next
//! batch.

pub mod bootstrap;
pub mod builder;
pub mod config;
pub mod error;
pub mod logger;
pub mod record;
pub mod scheduler;

#[cfg(test)]
pub(crate) mod testing;

pub use bootstrap::{BootstrapState, Bootstrapper};
pub use builder::{BuiltEntry, COPY_SOURCE_HEADER, LogLine, build_entry, request_id};
pub use config::{AccessLogConfig, RearmPolicy};
pub use error::{AccessLogError, AccessLogResult};
pub use logger::AccessLogger;
pub use record::{LogRequestRecord, RequestTarget};
pub use scheduler::{FlushReport, FlushTrigger, MAX_BUFFERED_LINES};
