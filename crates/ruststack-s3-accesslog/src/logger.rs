//! The [`AccessLogger`] handle held by the HTTP layer.

use std::sync::Arc;

use parking_lot::Mutex;
use ruststack_s3_core::StorageBackend;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::bootstrap::{BootstrapState, Bootstrapper};
use crate::builder::build_entry;
use crate::config::AccessLogConfig;
use crate::error::{AccessLogError, AccessLogResult};
use crate::record::LogRequestRecord;
use crate::scheduler::{Command, FlushReport, FlushTrigger, Scheduler};

/// Cheaply cloneable handle to a running access-log pipeline.
///
/// Recording a request never blocks and never fails: lines are handed to the
/// pipeline task and written in the background. Delivery problems are
/// reported with `warn!` and, for explicit flushes, returned to the caller.
///
/// # Examples
///
/// ```no_run
/// use std::sync::Arc;
///
/// use ruststack_s3_accesslog::{AccessLogConfig, AccessLogger, LogRequestRecord, RequestTarget};
/// use ruststack_s3_core::FileStore;
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let config = AccessLogConfig::builder()
///     .log_bucket("logs".into())
///     .buckets_to_log(["data".to_owned()].into())
///     .build();
/// let logger = AccessLogger::spawn(config, Arc::new(FileStore::new("/tmp/s3")));
///
/// let record = LogRequestRecord::builder()
///     .method(http::Method::GET)
///     .target(RequestTarget::from_path_and_query("/data/file.txt"))
///     .status(200)
///     .build();
/// logger.log_entry(&record);
/// logger.flush().await?;
/// logger.shutdown().await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct AccessLogger {
    inner: Arc<Inner>,
}

#[derive(Debug)]
struct Inner {
    config: Arc<AccessLogConfig>,
    commands: mpsc::UnboundedSender<Command>,
    bootstrapper: Arc<Bootstrapper>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl AccessLogger {
    /// Start the pipeline task on the current tokio runtime.
    ///
    /// The log bucket is not touched until the first flush or
    /// [`warm_up`](Self::warm_up).
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    #[must_use]
    pub fn spawn(config: AccessLogConfig, storage: Arc<dyn StorageBackend>) -> Self {
        info!(
            bucket = %config.log_bucket,
            prefix = %config.log_prefix,
            max_delay_ms = config.flush_interval.map_or(0, |d| d.as_millis()),
            buckets = ?config.buckets_to_log,
            "S3 access logging enabled"
        );

        let config = Arc::new(config);
        let bootstrapper = Arc::new(Bootstrapper::new(
            config.log_bucket.clone(),
            storage.clone(),
        ));
        let (tx, rx) = mpsc::unbounded_channel();
        let scheduler = Scheduler::new(config.clone(), bootstrapper.clone(), storage, rx);
        let task = tokio::spawn(scheduler.run());

        Self {
            inner: Arc::new(Inner {
                config,
                commands: tx,
                bootstrapper,
                task: Mutex::new(Some(task)),
            }),
        }
    }

    /// The pipeline configuration.
    #[must_use]
    pub fn config(&self) -> &AccessLogConfig {
        &self.inner.config
    }

    /// Record one completed request. Returns the number of lines queued.
    pub fn log_entry(&self, record: &LogRequestRecord) -> usize {
        let entry = build_entry(record, &self.inner.config);
        let count = entry.lines.len();
        if count == 0 && !entry.flush_requested {
            return 0;
        }

        let command = Command::Append {
            lines: entry.lines,
            flush_requested: entry.flush_requested,
        };
        if self.inner.commands.send(command).is_err() {
            debug!(lines = count, "S3 access log pipeline closed, dropping lines");
            return 0;
        }
        count
    }

    /// Deliver everything buffered so far and wait for the outcome.
    ///
    /// When a flush is already in flight this waits for it and then for a
    /// follow-up flush of the lines buffered since.
    ///
    /// # Errors
    ///
    /// Returns the bootstrap or delivery error of the flush, or
    /// [`AccessLogError::Closed`] after shutdown.
    pub async fn flush(&self) -> AccessLogResult<FlushReport> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Flush {
            trigger: FlushTrigger::Manual,
            waiter: Some(tx),
        })?;
        rx.await.map_err(|_| AccessLogError::Closed)?
    }

    /// Number of lines buffered and not yet handed to a flush.
    ///
    /// # Errors
    ///
    /// Returns [`AccessLogError::Closed`] after shutdown.
    pub async fn pending(&self) -> AccessLogResult<usize> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Pending(tx))?;
        rx.await.map_err(|_| AccessLogError::Closed)
    }

    /// Create or adopt the log bucket now instead of on the first flush.
    ///
    /// # Errors
    ///
    /// Returns [`AccessLogError::Bootstrap`]; the next flush retries.
    pub async fn warm_up(&self) -> AccessLogResult<()> {
        self.inner.bootstrapper.ensure().await
    }

    /// Current log bucket bootstrap state.
    #[must_use]
    pub fn bootstrap_state(&self) -> BootstrapState {
        self.inner.bootstrapper.state()
    }

    /// Wait for any in-flight flush, deliver the remaining lines and stop the
    /// pipeline. Lines recorded afterwards are dropped.
    ///
    /// # Errors
    ///
    /// Returns the error of the final delivery, or
    /// [`AccessLogError::Closed`] if the pipeline already stopped.
    pub async fn shutdown(&self) -> AccessLogResult<FlushReport> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Shutdown(tx))?;
        let outcome = rx.await.map_err(|_| AccessLogError::Closed)?;

        let task = self.inner.task.lock().take();
        if let Some(task) = task {
            if let Err(e) = task.await {
                debug!(error = %e, "S3 access log task ended abnormally");
            }
        }
        outcome
    }

    fn send(&self, command: Command) -> AccessLogResult<()> {
        self.inner
            .commands
            .send(command)
            .map_err(|_| AccessLogError::Closed)
    }
}
