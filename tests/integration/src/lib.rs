//! Integration tests for the RustStack S3 server.
//!
//! These tests require a running server at `localhost:4578`, started with
//! access logging enabled for the bucket named by [`LOGGED_BUCKET`]:
//!
//! ```text
//! S3_LOG_BUCKET=access-logs S3_BUCKETS_TO_LOG=logged-data S3_LOG_MAX_DELAY=200 \
//!     cargo run -p ruststack-s3-server
//! cargo test -p ruststack-integration -- --ignored
//! ```
//!
//! They are marked `#[ignore]` so they don't run during normal `cargo test`.

use std::sync::Once;
use std::time::Duration;

use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};

/// Source bucket the server is configured to log.
pub const LOGGED_BUCKET: &str = "logged-data";

/// Bucket receiving the server's access-log objects.
pub const LOG_BUCKET: &str = "access-logs";

static INIT: Once = Once::new();

/// Initialize tracing (once).
fn init_tracing() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .init();
    });
}

/// Endpoint URL for the server.
fn endpoint_url() -> String {
    std::env::var("S3_ENDPOINT_URL").unwrap_or_else(|_| "http://localhost:4578".to_owned())
}

/// Create a configured S3 client pointing at the local server.
#[must_use]
pub fn s3_client() -> aws_sdk_s3::Client {
    init_tracing();

    let creds = Credentials::new("test", "test", None, None, "integration-test");

    let config = aws_sdk_s3::config::Builder::new()
        .behavior_version(BehaviorVersion::latest())
        .region(Region::new("us-east-1"))
        .credentials_provider(creds)
        .endpoint_url(endpoint_url())
        .force_path_style(true)
        .build();

    aws_sdk_s3::Client::from_conf(config)
}

/// Generate a unique bucket name for a test.
#[must_use]
pub fn test_bucket_name(prefix: &str) -> String {
    let id = uuid::Uuid::new_v4().to_string()[..8].to_owned();
    format!("test-{prefix}-{id}")
}

/// Create a bucket and return its name. Caller is responsible for cleanup.
pub async fn create_test_bucket(client: &aws_sdk_s3::Client, prefix: &str) -> String {
    let name = test_bucket_name(prefix);
    client
        .create_bucket()
        .bucket(&name)
        .send()
        .await
        .unwrap_or_else(|e| panic!("failed to create bucket {name}: {e}"));
    name
}

/// Delete all objects in a bucket, then delete the bucket.
pub async fn cleanup_bucket(client: &aws_sdk_s3::Client, bucket: &str) {
    let Ok(resp) = client.list_objects().bucket(bucket).send().await else {
        return; // Bucket may not exist.
    };
    for obj in resp.contents() {
        if let Some(key) = obj.key() {
            let _ = client.delete_object().bucket(bucket).key(key).send().await;
        }
    }
    let _ = client.delete_bucket().bucket(bucket).send().await;
}

/// Poll `bucket` until an object whose body contains `needle` shows up.
///
/// Listing the log bucket itself asks the server to deliver buffered lines.
pub async fn wait_for_log_line(
    client: &aws_sdk_s3::Client,
    bucket: &str,
    needle: &str,
) -> Option<String> {
    for _ in 0..50 {
        if let Ok(resp) = client.list_objects().bucket(bucket).send().await {
            for key in resp.contents().iter().filter_map(|o| o.key()) {
                let Ok(object) = client.get_object().bucket(bucket).key(key).send().await else {
                    continue;
                };
                let Ok(data) = object.body.collect().await else {
                    continue;
                };
                let text = String::from_utf8_lossy(&data.into_bytes()).into_owned();
                if let Some(line) = text.lines().find(|l| l.contains(needle)) {
                    return Some(line.to_owned());
                }
            }
        }
        tokio::time::sleep(Duration::from_millis(200)).await;
    }
    None
}

mod test_access_log;
mod test_bucket;
mod test_object;
