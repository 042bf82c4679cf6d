//! Access-log pipeline configuration.

use std::collections::BTreeSet;
use std::time::Duration;

use ruststack_s3_core::S3Config;
use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

/// When the flush timer is re-armed after a flush settles.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RearmPolicy {
    /// Re-arm after every settled flush, successful or not.
    #[default]
    Always,
    /// Re-arm only after a successful delivery. A failed bootstrap or write
    /// leaves timed flushing stalled until a size or implicit trigger fires.
    OnSuccess,
}

/// Access-log pipeline configuration. Immutable once the pipeline is spawned.
///
/// # Examples
///
/// ```
/// use ruststack_s3_accesslog::AccessLogConfig;
///
/// let config = AccessLogConfig::builder()
///     .log_bucket("logs".into())
///     .buckets_to_log(["data".to_owned()].into())
///     .build();
/// assert!(config.is_logged("data"));
/// assert_eq!(config.flush_interval.map(|d| d.as_millis()), Some(5000));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TypedBuilder)]
#[serde(rename_all = "camelCase")]
pub struct AccessLogConfig {
    /// Bucket receiving delivered log objects.
    pub log_bucket: String,

    /// Prefix prepended to every delivered object key.
    #[builder(default)]
    pub log_prefix: String,

    /// Timer interval between flushes; `None` disables timed flushing.
    #[builder(default = Some(Duration::from_millis(5000)))]
    pub flush_interval: Option<Duration>,

    /// Source buckets whose object requests are logged.
    #[builder(default)]
    pub buckets_to_log: BTreeSet<String>,

    /// Timer re-arm behavior after a flush settles.
    #[builder(default)]
    pub rearm_policy: RearmPolicy,
}

impl AccessLogConfig {
    /// Derive the pipeline configuration from the server configuration.
    ///
    /// Returns `None` unless a log bucket is set and at least one bucket is
    /// selected for logging.
    #[must_use]
    pub fn from_s3_config(config: &S3Config) -> Option<Self> {
        let log_bucket = config.log_bucket.clone()?;
        if config.buckets_to_log.is_empty() {
            return None;
        }

        let flush_interval =
            (config.log_max_delay_ms > 0).then(|| Duration::from_millis(config.log_max_delay_ms));

        Some(Self {
            log_bucket,
            log_prefix: config.log_prefix.clone(),
            flush_interval,
            buckets_to_log: config.buckets_to_log.iter().cloned().collect(),
            rearm_policy: RearmPolicy::default(),
        })
    }

    /// Whether requests against `bucket` are logged.
    #[must_use]
    pub fn is_logged(&self, bucket: &str) -> bool {
        self.buckets_to_log.contains(bucket)
    }
}
