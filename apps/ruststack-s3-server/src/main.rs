//! RustStack S3 Server - S3 emulator with server access-log emulation.
//!
//! This binary serves a filesystem-backed S3 API built on `ruststack-s3-http`
//! and, when configured, records every request against selected buckets as
//! an S3 server access log delivered into a log bucket.
//!
//! # Usage
//!
//! ```text
//! S3_LOG_BUCKET=logs S3_BUCKETS_TO_LOG=data ruststack-s3-server
//! ```
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `GATEWAY_LISTEN` | `0.0.0.0:4578` | Bind address |
//! | `S3_DOMAIN` | `s3.localhost` | Virtual hosting domain |
//! | `DATA_DIR` | `{tmp}/s3rver` | Storage root |
//! | `S3_LOG_BUCKET` | *(unset)* | Access-log destination bucket |
//! | `S3_BUCKETS_TO_LOG` | *(empty)* | Comma-separated logged buckets |
//! | `S3_INDEX_DOCUMENT` | *(unset)* | Enables static website hosting |
//! | `S3_ERROR_DOCUMENT` | *(unset)* | Website page for missing keys |
//! | `LOG_LEVEL` | `info` | Log level filter |
//! | `RUST_LOG` | *(unset)* | Fine-grained tracing filter (overrides `LOG_LEVEL`) |

mod handler;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as HttpConnBuilder;
use tokio::net::TcpListener;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use ruststack_s3_accesslog::{AccessLogConfig, AccessLogger};
use ruststack_s3_core::{EventHub, FileStore, S3Config};
use ruststack_s3_http::service::{S3HttpConfig, S3HttpService};

use crate::handler::{RustStackHandler, WebsiteConfig};

/// Server version reported at startup.
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the tracing subscriber.
///
/// Uses `RUST_LOG` if set, otherwise falls back to the `LOG_LEVEL` config value.
fn init_tracing(log_level: &str) -> Result<()> {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::try_new(log_level)
            .with_context(|| format!("invalid log level filter: {log_level}"))?
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();

    Ok(())
}

/// Build the [`S3HttpConfig`] from the application [`S3Config`].
fn build_http_config(config: &S3Config) -> S3HttpConfig {
    S3HttpConfig {
        domain: config.s3_domain.clone(),
        virtual_hosting: config.s3_virtual_hosting,
        website_hosting: config.website_hosting(),
    }
}

fn build_website_config(config: &S3Config) -> WebsiteConfig {
    WebsiteConfig {
        index_document: config.index_document.clone(),
        error_document: config.error_document.clone(),
    }
}

/// Trace every object change published on `events`.
///
/// The task ends once every publisher is dropped.
fn spawn_event_log(events: &EventHub) -> JoinHandle<()> {
    let mut rx = events.subscribe();
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(event) => debug!(
                    event = event.event_name.as_str(),
                    bucket = %event.bucket,
                    key = %event.key,
                    size = ?event.size,
                    "S3 event",
                ),
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "S3 event subscriber lagging, events dropped");
                }
                Err(RecvError::Closed) => break,
            }
        }
    })
}

/// Spawn the access-log pipeline if a log bucket and logged buckets are set.
///
/// The log bucket is bootstrapped eagerly; a failure here is retried on the
/// first flush.
async fn start_access_log(config: &S3Config, store: &Arc<FileStore>) -> Option<AccessLogger> {
    let Some(log_config) = AccessLogConfig::from_s3_config(config) else {
        if config.log_bucket.is_some() {
            warn!("S3_LOG_BUCKET is set but S3_BUCKETS_TO_LOG is empty, access logging disabled");
        }
        return None;
    };

    let logger = AccessLogger::spawn(log_config, Arc::clone(store) as _);
    if let Err(e) = logger.warm_up().await {
        warn!(error = %e, "access-log bucket not ready, will retry on first flush");
    }
    Some(logger)
}

/// Run the accept loop, serving connections until a shutdown signal is received.
async fn serve<H: ruststack_s3_http::dispatch::S3Handler>(
    listener: TcpListener,
    service: S3HttpService<H>,
) -> Result<()> {
    let graceful = hyper_util::server::graceful::GracefulShutdown::new();
    let http = HttpConnBuilder::new(TokioExecutor::new());

    let shutdown = async {
        tokio::signal::ctrl_c().await.ok();
        info!("received shutdown signal, draining connections");
    };

    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            result = listener.accept() => {
                let (stream, peer_addr) = match result {
                    Ok(conn) => conn,
                    Err(e) => {
                        warn!(error = %e, "failed to accept connection");
                        continue;
                    }
                };

                let svc = service.with_remote_addr(peer_addr.ip());
                let conn = http.serve_connection(TokioIo::new(stream), svc);
                let conn = graceful.watch(conn.into_owned());

                tokio::spawn(async move {
                    if let Err(e) = conn.await {
                        error!(peer_addr = %peer_addr, error = %e, "connection error");
                    }
                });
            }

            () = &mut shutdown => {
                info!("shutting down gracefully");
                break;
            }
        }
    }

    graceful.shutdown().await;
    info!("all connections drained");

    Ok(())
}

/// Perform a health check by connecting to the gateway and requesting the health endpoint.
///
/// Exits with code 0 if healthy, 1 otherwise.
async fn run_health_check(addr: &str) -> Result<()> {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    let stream = TcpStream::connect(addr)
        .await
        .with_context(|| format!("cannot connect to {addr}"))?;

    let (mut reader, mut writer) = stream.into_split();

    let request =
        format!("GET /_localstack/health HTTP/1.1\r\nHost: {addr}\r\nConnection: close\r\n\r\n");
    writer.write_all(request.as_bytes()).await?;
    writer.shutdown().await?;

    let mut response = String::new();
    reader.read_to_string(&mut response).await?;

    if response.contains("200 OK") && response.contains("\"s3\":\"running\"") {
        Ok(())
    } else {
        anyhow::bail!("unhealthy response from {addr}")
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Handle --health-check flag for Docker HEALTHCHECK.
    if std::env::args().any(|a| a == "--health-check") {
        let config = S3Config::from_env();
        let addr = config.gateway_listen.replace("0.0.0.0", "127.0.0.1");
        let healthy = run_health_check(&addr).await.is_ok();
        std::process::exit(i32::from(!healthy));
    }

    let config = S3Config::from_env();

    init_tracing(&config.log_level)?;

    info!(
        gateway_listen = %config.gateway_listen,
        s3_domain = %config.s3_domain,
        s3_virtual_hosting = config.s3_virtual_hosting,
        data_dir = %config.data_dir,
        log_bucket = ?config.log_bucket,
        index_document = ?config.index_document,
        version = VERSION,
        "starting RustStack S3 Server",
    );

    let store = Arc::new(FileStore::new(&config.data_dir));
    store
        .ensure_root()
        .await
        .with_context(|| format!("failed to create data directory {}", config.data_dir))?;

    let access_log = start_access_log(&config, &store).await;

    let handler = RustStackHandler::new(Arc::clone(&store))
        .with_events(EventHub::default())
        .with_website(build_website_config(&config));
    spawn_event_log(handler.events());
    let mut service = S3HttpService::new(handler, build_http_config(&config));
    if let Some(logger) = &access_log {
        service = service.with_access_log(logger.clone());
    }

    let addr: SocketAddr = config
        .gateway_listen
        .parse()
        .with_context(|| format!("invalid bind address: {}", config.gateway_listen))?;

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind to {addr}"))?;

    info!(%addr, "listening for connections");

    serve(listener, service).await?;

    if let Some(logger) = access_log {
        if let Err(e) = logger.shutdown().await {
            warn!(error = %e, "final access-log delivery failed");
        }
    }

    if config.remove_buckets_on_close {
        store
            .reset()
            .await
            .context("failed to remove buckets on close")?;
    }

    info!("exiting");
    Ok(())
}
