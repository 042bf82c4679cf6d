//! Log buffer and flush scheduler.
//!
//! A single task owns the buffer and is the only place it is mutated. Every
//! other party talks to it through [`Command`]s, so appends from concurrent
//! requests are serialized in completion order without a lock on the hot
//! path.
//!
//! Flushes are strictly serialized:
//!
//! - the buffer is swapped for an empty one *before* any I/O, so lines
//!   appended while a batch is being written go into the next batch;
//! - the timer is disarmed while a flush is in flight and re-armed only after
//!   it settles (see [`RearmPolicy`]);
//! - triggers that arrive during an in-flight flush are coalesced into a
//!   single follow-up flush started as soon as the current one settles.

use std::fmt;
use std::ops::ControlFlow;
use std::pin::Pin;
use std::sync::Arc;

use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use ruststack_s3_core::{ByteStream, ObjectMetadataInput, StorageBackend};
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinError, JoinHandle};
use tokio::time::Sleep;
use tracing::{debug, warn};

use crate::bootstrap::Bootstrapper;
use crate::builder::LogLine;
use crate::config::{AccessLogConfig, RearmPolicy};
use crate::error::{AccessLogError, AccessLogResult};

/// Buffered line count that triggers an immediate flush.
pub const MAX_BUFFERED_LINES: usize = 100;

/// Size of the chunks a batch is streamed to storage in.
const CHUNK_SIZE: usize = 64 * 1024;

/// Content type of delivered log objects.
const LOG_CONTENT_TYPE: &str = "text/plain";

/// Why a flush was started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushTrigger {
    /// The buffer reached [`MAX_BUFFERED_LINES`].
    SizeThreshold,
    /// The flush timer elapsed.
    TimerElapsed,
    /// A client listed the log bucket.
    ImplicitSignal,
    /// [`AccessLogger::flush`](crate::AccessLogger::flush) was called.
    Manual,
}

impl fmt::Display for FlushTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::SizeThreshold => "size_threshold",
            Self::TimerElapsed => "timer_elapsed",
            Self::ImplicitSignal => "implicit_signal",
            Self::Manual => "manual",
        })
    }
}

/// Outcome of a settled flush.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushReport {
    /// The buffer was empty; nothing was written.
    Idle,
    /// A batch was written as one object.
    Delivered {
        /// Key of the new object in the log bucket.
        key: String,
        /// Number of lines in the object.
        lines: usize,
    },
}

pub(crate) type FlushWaiter = oneshot::Sender<AccessLogResult<FlushReport>>;

/// Messages accepted by the scheduler task.
#[derive(Debug)]
pub(crate) enum Command {
    /// Append lines, then flush if the request asked for it.
    Append {
        lines: Vec<LogLine>,
        flush_requested: bool,
    },
    /// Flush now and report the outcome.
    Flush {
        trigger: FlushTrigger,
        waiter: Option<FlushWaiter>,
    },
    /// Report the number of buffered lines.
    Pending(oneshot::Sender<usize>),
    /// Drain and stop.
    Shutdown(FlushWaiter),
}

#[derive(Debug)]
struct InFlight {
    key: String,
    handle: JoinHandle<AccessLogResult<FlushReport>>,
    waiters: Vec<FlushWaiter>,
}

#[derive(Debug)]
struct FollowUp {
    trigger: FlushTrigger,
    waiters: Vec<FlushWaiter>,
}

#[derive(Debug)]
pub(crate) struct Scheduler {
    config: Arc<AccessLogConfig>,
    bootstrapper: Arc<Bootstrapper>,
    storage: Arc<dyn StorageBackend>,
    commands: mpsc::UnboundedReceiver<Command>,
    buffer: Vec<LogLine>,
    timer: Option<Pin<Box<Sleep>>>,
    in_flight: Option<InFlight>,
    follow_up: Option<FollowUp>,
    last_key_millis: i64,
}

impl Scheduler {
    pub(crate) fn new(
        config: Arc<AccessLogConfig>,
        bootstrapper: Arc<Bootstrapper>,
        storage: Arc<dyn StorageBackend>,
        commands: mpsc::UnboundedReceiver<Command>,
    ) -> Self {
        Self {
            config,
            bootstrapper,
            storage,
            commands,
            buffer: Vec::with_capacity(MAX_BUFFERED_LINES),
            timer: None,
            in_flight: None,
            follow_up: None,
            last_key_millis: i64::MIN,
        }
    }

    /// Run until shut down or until every handle is dropped.
    pub(crate) async fn run(mut self) {
        self.arm_timer();

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(command) => {
                        if self.handle(command).await.is_break() {
                            break;
                        }
                    }
                    None => {
                        let _ = self.drain().await;
                        break;
                    }
                },
                () = wait_timer(&mut self.timer) => {
                    self.timer = None;
                    self.start_flush(FlushTrigger::TimerElapsed, Vec::new());
                }
                joined = wait_in_flight(&mut self.in_flight) => {
                    self.settle(joined);
                    if let Some(FollowUp { trigger, waiters }) = self.follow_up.take() {
                        self.start_flush(trigger, waiters);
                    }
                }
            }
        }

        self.commands.close();
        debug!(bucket = %self.config.log_bucket, "S3 access log pipeline stopped");
    }

    async fn handle(&mut self, command: Command) -> ControlFlow<()> {
        match command {
            Command::Append {
                lines,
                flush_requested,
            } => {
                self.buffer.extend(lines);
                if flush_requested {
                    self.start_flush(FlushTrigger::ImplicitSignal, Vec::new());
                } else if self.buffer.len() >= MAX_BUFFERED_LINES {
                    self.start_flush(FlushTrigger::SizeThreshold, Vec::new());
                }
            }
            Command::Flush { trigger, waiter } => {
                self.start_flush(trigger, waiter.into_iter().collect());
            }
            Command::Pending(reply) => {
                let _ = reply.send(self.buffer.len());
            }
            Command::Shutdown(done) => {
                let outcome = self.drain().await;
                let _ = done.send(outcome);
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    fn start_flush(&mut self, trigger: FlushTrigger, waiters: Vec<FlushWaiter>) {
        if self.in_flight.is_some() {
            match &mut self.follow_up {
                Some(follow_up) => follow_up.waiters.extend(waiters),
                None => {
                    debug!(%trigger, "Flush in flight, scheduling follow-up");
                    self.follow_up = Some(FollowUp { trigger, waiters });
                }
            }
            return;
        }

        if self.buffer.is_empty() {
            debug!(%trigger, "S3 access log idle tick");
            for waiter in waiters {
                let _ = waiter.send(Ok(FlushReport::Idle));
            }
            self.arm_timer();
            return;
        }

        self.timer = None;
        let lines = std::mem::replace(&mut self.buffer, Vec::with_capacity(MAX_BUFFERED_LINES));
        let key = self.next_key();
        debug!(%trigger, key = %key, lines = lines.len(), "Flushing S3 access log");

        let handle = tokio::spawn(deliver(
            self.bootstrapper.clone(),
            self.storage.clone(),
            key.clone(),
            lines,
        ));
        self.in_flight = Some(InFlight {
            key,
            handle,
            waiters,
        });
    }

    fn settle(&mut self, joined: Result<AccessLogResult<FlushReport>, JoinError>) {
        let Some(InFlight { key, waiters, .. }) = self.in_flight.take() else {
            return;
        };

        let outcome = joined.unwrap_or_else(|e| {
            warn!(bucket = %self.config.log_bucket, key = %key, error = %e, "S3 access log flush task failed");
            Err(AccessLogError::Delivery {
                bucket: self.config.log_bucket.clone(),
                key,
                reason: e.to_string(),
            })
        });

        match self.config.rearm_policy {
            RearmPolicy::Always => self.arm_timer(),
            RearmPolicy::OnSuccess if outcome.is_ok() => self.arm_timer(),
            RearmPolicy::OnSuccess => {
                debug!(bucket = %self.config.log_bucket, "Flush failed, timer left disarmed");
            }
        }

        for waiter in waiters {
            let _ = waiter.send(outcome.clone());
        }
    }

    /// Settle any in-flight flush, then deliver whatever is still buffered.
    async fn drain(&mut self) -> AccessLogResult<FlushReport> {
        self.timer = None;

        if let Some(in_flight) = self.in_flight.as_mut() {
            let joined = (&mut in_flight.handle).await;
            self.settle(joined);
            self.timer = None;
        }

        let waiters = self
            .follow_up
            .take()
            .map(|follow_up| follow_up.waiters)
            .unwrap_or_default();

        let outcome = if self.buffer.is_empty() {
            Ok(FlushReport::Idle)
        } else {
            let lines = std::mem::take(&mut self.buffer);
            let key = self.next_key();
            debug!(key = %key, lines = lines.len(), "Draining S3 access log");
            deliver(
                self.bootstrapper.clone(),
                self.storage.clone(),
                key,
                lines,
            )
            .await
        };

        for waiter in waiters {
            let _ = waiter.send(outcome.clone());
        }
        outcome
    }

    fn arm_timer(&mut self) {
        self.timer = self
            .config
            .flush_interval
            .map(|interval| Box::pin(tokio::time::sleep(interval)));
    }

    /// Key for the next object, strictly increasing across batches so two
    /// flushes within one millisecond never overwrite each other.
    fn next_key(&mut self) -> String {
        let mut now = Utc::now();
        if now.timestamp_millis() <= self.last_key_millis {
            now = DateTime::from_timestamp_millis(self.last_key_millis + 1).unwrap_or(now);
        }
        self.last_key_millis = now.timestamp_millis();
        object_key(&self.config.log_prefix, now)
    }
}

/// `{prefix}YYYY-MM-DD-HH-mm-ss-{epoch millis}`, in UTC.
pub(crate) fn object_key(prefix: &str, now: DateTime<Utc>) -> String {
    format!(
        "{prefix}{}-{}",
        now.format("%Y-%m-%d-%H-%M-%S"),
        now.timestamp_millis()
    )
}

/// Bootstrap the log bucket, then write one batch as one object.
async fn deliver(
    bootstrapper: Arc<Bootstrapper>,
    storage: Arc<dyn StorageBackend>,
    key: String,
    lines: Vec<LogLine>,
) -> AccessLogResult<FlushReport> {
    let bucket = bootstrapper.bucket().to_owned();
    let count = lines.len();

    if let Err(e) = bootstrapper.ensure().await {
        warn!(bucket = %bucket, lines = count, error = %e, "Dropping S3 access log batch");
        return Err(e);
    }

    let body = join_lines(&lines);
    let metadata = ObjectMetadataInput::with_content_type(LOG_CONTENT_TYPE);
    match storage
        .put_object(&bucket, &key, chunked(body), metadata)
        .await
    {
        Ok(_) => {
            debug!(bucket = %bucket, key = %key, lines = count, "Delivered S3 access log");
            Ok(FlushReport::Delivered { key, lines: count })
        }
        Err(e) => {
            warn!(bucket = %bucket, key = %key, lines = count, error = %e, "Unable to write S3 log");
            Err(AccessLogError::Delivery {
                bucket,
                key,
                reason: e.to_string(),
            })
        }
    }
}

fn join_lines(lines: &[LogLine]) -> Bytes {
    let body = lines
        .iter()
        .map(LogLine::as_str)
        .collect::<Vec<_>>()
        .join("\n");
    Bytes::from(body)
}

fn chunked(body: Bytes) -> ByteStream {
    let chunks: Vec<Result<Bytes, std::io::Error>> = (0..body.len())
        .step_by(CHUNK_SIZE)
        .map(|start| Ok(body.slice(start..body.len().min(start + CHUNK_SIZE))))
        .collect();
    futures::stream::iter(chunks).boxed()
}

async fn wait_timer(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer {
        Some(sleep) => sleep.as_mut().await,
        None => std::future::pending().await,
    }
}

async fn wait_in_flight(
    in_flight: &mut Option<InFlight>,
) -> Result<AccessLogResult<FlushReport>, JoinError> {
    match in_flight {
        Some(in_flight) => (&mut in_flight.handle).await,
        None => std::future::pending().await,
    }
}
