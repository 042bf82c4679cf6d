//! Server configuration.
//!
//! Provides [`S3Config`] for configuring the RustStack S3 emulator. Values are
//! loaded from environment variables, including the server access-logging
//! options consumed by `ruststack-s3-accesslog`.

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

/// Default flush interval for access-log delivery, in milliseconds.
pub const DEFAULT_LOG_MAX_DELAY_MS: u64 = 5000;

/// S3 emulator configuration.
///
/// # Examples
///
/// ```
/// use ruststack_s3_core::config::S3Config;
///
/// let config = S3Config::default();
/// assert_eq!(config.gateway_listen, "0.0.0.0:4578");
/// assert!(config.log_bucket.is_none());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, TypedBuilder)]
#[serde(rename_all = "camelCase")]
pub struct S3Config {
    /// Bind address for the gateway (e.g. `"0.0.0.0:4578"`).
    #[builder(default = String::from("0.0.0.0:4578"))]
    pub gateway_listen: String,

    /// Whether virtual-hosted-style addressing is enabled.
    #[builder(default = true)]
    pub s3_virtual_hosting: bool,

    /// Domain for virtual hosting resolution.
    #[builder(default = String::from("s3.localhost"))]
    pub s3_domain: String,

    /// Root directory of the filesystem storage engine.
    #[builder(default = default_data_dir())]
    pub data_dir: String,

    /// Remove every bucket from `data_dir` when the server stops.
    #[builder(default = false)]
    pub remove_buckets_on_close: bool,

    /// Log level filter string (e.g. `"info"`, `"debug"`).
    #[builder(default = String::from("info"))]
    pub log_level: String,

    /// Destination bucket for emulated server access logs.
    #[builder(default)]
    pub log_bucket: Option<String>,

    /// Key prefix for delivered access-log objects.
    #[builder(default)]
    pub log_prefix: String,

    /// Access-log flush interval in milliseconds. Zero disables timed flushes.
    #[builder(default = DEFAULT_LOG_MAX_DELAY_MS)]
    pub log_max_delay_ms: u64,

    /// Source buckets whose traffic is written to the access log.
    #[builder(default)]
    pub buckets_to_log: Vec<String>,

    /// Object served for directory-style requests when hosting static websites.
    #[builder(default)]
    pub index_document: Option<String>,

    /// Object served in place of a missing key when hosting static websites.
    #[builder(default)]
    pub error_document: Option<String>,
}

impl Default for S3Config {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl S3Config {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `GATEWAY_LISTEN` | `0.0.0.0:4578` |
    /// | `S3_VIRTUAL_HOSTING` | `true` |
    /// | `S3_DOMAIN` | `s3.localhost` |
    /// | `DATA_DIR` | `{tmp}/s3rver` |
    /// | `REMOVE_BUCKETS_ON_CLOSE` | `false` |
    /// | `LOG_LEVEL` | `info` |
    /// | `S3_LOG_BUCKET` | *(unset)* |
    /// | `S3_LOG_PREFIX` | *(empty)* |
    /// | `S3_LOG_MAX_DELAY` | `5000` |
    /// | `S3_BUCKETS_TO_LOG` | *(empty)* |
    /// | `S3_INDEX_DOCUMENT` | *(unset)* |
    /// | `S3_ERROR_DOCUMENT` | *(unset)* |
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    ///
    /// [`S3Config::from_env`] delegates here; tests pass a map instead of
    /// mutating the process environment.
    #[must_use]
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(v) = lookup("GATEWAY_LISTEN") {
            config.gateway_listen = v;
        }
        if let Some(v) = lookup("S3_VIRTUAL_HOSTING") {
            config.s3_virtual_hosting = parse_bool(&v);
        }
        if let Some(v) = lookup("S3_DOMAIN") {
            config.s3_domain = v;
        }
        if let Some(v) = lookup("DATA_DIR") {
            config.data_dir = v;
        }
        if let Some(v) = lookup("REMOVE_BUCKETS_ON_CLOSE") {
            config.remove_buckets_on_close = parse_bool(&v);
        }
        if let Some(v) = lookup("LOG_LEVEL") {
            config.log_level = v;
        }
        if let Some(v) = lookup("S3_LOG_BUCKET") {
            if !v.is_empty() {
                config.log_bucket = Some(v);
            }
        }
        if let Some(v) = lookup("S3_LOG_PREFIX") {
            config.log_prefix = v;
        }
        if let Some(v) = lookup("S3_LOG_MAX_DELAY") {
            config.log_max_delay_ms = parse_delay(&v);
        }
        if let Some(v) = lookup("S3_BUCKETS_TO_LOG") {
            config.buckets_to_log = v
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(ToOwned::to_owned)
                .collect();
        }
        config.index_document = lookup("S3_INDEX_DOCUMENT").filter(|v| !v.is_empty());
        config.error_document = lookup("S3_ERROR_DOCUMENT").filter(|v| !v.is_empty());

        config
    }

    /// Whether static website hosting is configured.
    #[must_use]
    pub fn website_hosting(&self) -> bool {
        self.index_document.is_some()
    }
}

fn default_data_dir() -> String {
    std::env::temp_dir()
        .join("s3rver")
        .to_string_lossy()
        .into_owned()
}

/// Parse a string as a boolean, accepting `"1"` and `"true"` (case-insensitive).
fn parse_bool(value: &str) -> bool {
    value == "1" || value.eq_ignore_ascii_case("true")
}

/// Parse the flush delay. `false` and `0` disable the timer; garbage keeps the default.
fn parse_delay(value: &str) -> u64 {
    if value.eq_ignore_ascii_case("false") {
        return 0;
    }
    value.trim().parse().unwrap_or(DEFAULT_LOG_MAX_DELAY_MS)
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_should_create_default_config() {
        let config = S3Config::default();
        assert_eq!(config.gateway_listen, "0.0.0.0:4578");
        assert!(config.s3_virtual_hosting);
        assert_eq!(config.s3_domain, "s3.localhost");
        assert!(config.data_dir.ends_with("s3rver"));
        assert!(!config.remove_buckets_on_close);
        assert_eq!(config.log_level, "info");
        assert!(config.log_bucket.is_none());
        assert!(config.log_prefix.is_empty());
        assert_eq!(config.log_max_delay_ms, 5000);
        assert!(config.buckets_to_log.is_empty());
        assert!(config.index_document.is_none());
        assert!(!config.website_hosting());
    }

    #[test]
    fn test_should_load_website_documents() {
        let config = S3Config::from_lookup(lookup_from(&[
            ("S3_INDEX_DOCUMENT", "index.html"),
            ("S3_ERROR_DOCUMENT", "404.html"),
        ]));
        assert_eq!(config.index_document.as_deref(), Some("index.html"));
        assert_eq!(config.error_document.as_deref(), Some("404.html"));
        assert!(config.website_hosting());

        let blank = S3Config::from_lookup(lookup_from(&[("S3_INDEX_DOCUMENT", "")]));
        assert!(!blank.website_hosting());
    }

    #[test]
    fn test_should_load_access_log_settings() {
        let config = S3Config::from_lookup(lookup_from(&[
            ("S3_LOG_BUCKET", "logs"),
            ("S3_LOG_PREFIX", "access/"),
            ("S3_LOG_MAX_DELAY", "250"),
            ("S3_BUCKETS_TO_LOG", "data, images,,"),
        ]));
        assert_eq!(config.log_bucket.as_deref(), Some("logs"));
        assert_eq!(config.log_prefix, "access/");
        assert_eq!(config.log_max_delay_ms, 250);
        assert_eq!(config.buckets_to_log, vec!["data", "images"]);
    }

    #[test]
    fn test_should_disable_delay_with_zero_or_false() {
        let zero = S3Config::from_lookup(lookup_from(&[("S3_LOG_MAX_DELAY", "0")]));
        assert_eq!(zero.log_max_delay_ms, 0);
        let off = S3Config::from_lookup(lookup_from(&[("S3_LOG_MAX_DELAY", "FALSE")]));
        assert_eq!(off.log_max_delay_ms, 0);
        let junk = S3Config::from_lookup(lookup_from(&[("S3_LOG_MAX_DELAY", "soon")]));
        assert_eq!(junk.log_max_delay_ms, DEFAULT_LOG_MAX_DELAY_MS);
    }

    #[test]
    fn test_should_ignore_empty_log_bucket() {
        let config = S3Config::from_lookup(lookup_from(&[("S3_LOG_BUCKET", "")]));
        assert!(config.log_bucket.is_none());
    }

    #[test]
    fn test_should_build_with_typed_builder() {
        let config = S3Config::builder()
            .gateway_listen("127.0.0.1:9999".into())
            .s3_virtual_hosting(false)
            .data_dir("/tmp/data".into())
            .log_bucket(Some("logs".into()))
            .buckets_to_log(vec!["data".into()])
            .build();

        assert_eq!(config.gateway_listen, "127.0.0.1:9999");
        assert!(!config.s3_virtual_hosting);
        assert_eq!(config.data_dir, "/tmp/data");
        assert_eq!(config.log_bucket.as_deref(), Some("logs"));
        assert_eq!(config.log_max_delay_ms, DEFAULT_LOG_MAX_DELAY_MS);
    }

    #[test]
    fn test_should_serialize_to_camel_case_json() {
        let config = S3Config::default();
        let json = serde_json::to_string(&config).expect("test serialization");
        assert!(json.contains("gatewayListen"));
        assert!(json.contains("bucketsToLog"));
    }

    #[test]
    fn test_should_parse_bool_values() {
        assert!(parse_bool("1"));
        assert!(parse_bool("TRUE"));
        assert!(!parse_bool("0"));
        assert!(!parse_bool(""));
    }
}
