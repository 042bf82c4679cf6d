//! Log record builder: turns a [`LogRequestRecord`] into access-log lines.
//!
//! Only object-level requests against logged buckets produce lines. A
//! successful copy produces two: a `REST.COPY.OBJECT_GET` line for the read
//! of the source object, then the line for the request itself. Every line
//! follows the provider's server access-log grammar:
//!
//! ```text
//! - {bucket} [{date}] {remoteAddr} - {requestId} REST.{METHOD}.OBJECT {key|-} "{METHOD} /{bucket}/{key}{query} HTTP/{httpVersion}" {status} - {length|-} - - {processingTime|-} "{referrer|-}" "{userAgent|-}"
//! ```
//!
//! An empty-key `GET` on the log bucket itself is never logged; it asks the
//! pipeline to deliver pending lines now.

use std::fmt;

use http::{HeaderMap, Method, Version};
use percent_encoding::percent_decode_str;
use rand::RngExt as _;

use crate::config::AccessLogConfig;
use crate::record::LogRequestRecord;

/// Header naming the source of a copy operation.
pub const COPY_SOURCE_HEADER: &str = "x-amz-copy-source";

/// Placeholder for absent fields.
const ABSENT: &str = "-";

/// One formatted access-log line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogLine(String);

impl LogLine {
    pub(crate) fn from_string(line: String) -> Self {
        Self(line)
    }

    /// The line text, without a trailing newline.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the line.
    #[must_use]
    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for LogLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What one request contributes to the pipeline.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuiltEntry {
    /// Lines to append, in order.
    pub lines: Vec<LogLine>,
    /// The request asked for an immediate flush.
    pub flush_requested: bool,
}

/// Classify a completed request and format its log lines.
#[must_use]
pub fn build_entry(record: &LogRequestRecord, config: &AccessLogConfig) -> BuiltEntry {
    let target = &record.target;
    let mut entry = BuiltEntry {
        lines: Vec::new(),
        flush_requested: target.bucket == config.log_bucket
            && record.method == Method::GET
            && target.key.is_empty(),
    };

    // Bucket-level operations are not logged by the real service either.
    if !config.is_logged(&target.bucket) || target.key.is_empty() {
        return entry;
    }

    if record.status == 200 {
        if let Some((src_bucket, src_key)) = copy_source(&record.headers) {
            entry.lines.push(format_line(
                record,
                &src_bucket,
                &src_key,
                "REST.COPY.OBJECT_GET",
                Method::GET.as_str(),
            ));
        }
    }

    let method = record.method.as_str();
    entry.lines.push(format_line(
        record,
        &target.bucket,
        &target.key,
        &format!("REST.{method}.OBJECT"),
        method,
    ));

    entry
}

/// Generate a request identifier: 16 uppercase hex characters.
#[must_use]
pub fn request_id() -> String {
    let mut rng = rand::rng();
    let mut buf = [0u8; 8];
    rng.fill(&mut buf);
    hex::encode_upper(buf)
}

fn format_line(
    record: &LogRequestRecord,
    bucket: &str,
    key: &str,
    operation: &str,
    verb: &str,
) -> LogLine {
    let date = record.time.format("%d/%b/%Y:%H:%M:%S %z");
    let remote = record
        .remote_addr
        .map_or_else(|| ABSENT.to_owned(), |ip| ip.to_string());
    let length = record
        .content_length
        .map_or_else(|| ABSENT.to_owned(), |n| n.to_string());
    let elapsed = record
        .processing_time
        .map_or_else(|| ABSENT.to_owned(), |d| d.as_millis().to_string());

    LogLine(format!(
        "- {bucket} [{date}] {remote} - {id} {operation} {key_field} \"{verb} /{bucket}/{key}{query} HTTP/{version}\" {status} - {length} - - {elapsed} \"{referrer}\" \"{agent}\"",
        id = request_id(),
        key_field = if key.is_empty() { ABSENT } else { key },
        query = record.target.query,
        version = version_str(record.http_version),
        status = record.status,
        referrer = record.referrer.as_deref().unwrap_or(ABSENT),
        agent = record.user_agent.as_deref().unwrap_or(ABSENT),
    ))
}

/// Decode the copy-source header into `(bucket, key)`.
fn copy_source(headers: &HeaderMap) -> Option<(String, String)> {
    let raw = headers.get(COPY_SOURCE_HEADER)?.to_str().ok()?;
    let decoded = percent_decode_str(raw).decode_utf8_lossy();
    let trimmed = decoded.strip_prefix('/').unwrap_or(&decoded);
    let (bucket, key) = trimmed.split_once('/').unwrap_or((trimmed, ""));
    if bucket.is_empty() {
        return None;
    }
    Some((bucket.to_owned(), key.to_owned()))
}

fn version_str(version: Version) -> &'static str {
    match version {
        Version::HTTP_09 => "0.9",
        Version::HTTP_10 => "1.0",
        Version::HTTP_2 => "2.0",
        Version::HTTP_3 => "3.0",
        _ => "1.1",
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::TimeZone;
    use http::HeaderValue;

    use super::*;
    use crate::record::RequestTarget;

    fn config() -> AccessLogConfig {
        AccessLogConfig::builder()
            .log_bucket("logs".into())
            .buckets_to_log(["data".to_owned()].into())
            .flush_interval(None)
            .build()
    }

    fn record(method: Method, path: &str, status: u16) -> LogRequestRecord {
        LogRequestRecord::builder()
            .method(method)
            .target(RequestTarget::from_path_and_query(path))
            .time(
                chrono::Utc
                    .with_ymd_and_hms(2024, 3, 9, 14, 5, 7)
                    .single()
                    .expect("valid time"),
            )
            .status(status)
            .build()
    }

    /// Drop the random request id so lines can be compared verbatim.
    fn without_id(line: &LogLine) -> String {
        let mut fields: Vec<&str> = line.as_str().split(' ').collect();
        fields.remove(6);
        fields.join(" ")
    }

    #[test]
    fn test_should_format_primary_line() {
        let mut rec = record(Method::GET, "/data/file.txt", 200);
        rec.content_length = Some(42);

        let entry = build_entry(&rec, &config());
        assert!(!entry.flush_requested);
        assert_eq!(entry.lines.len(), 1);
        assert_eq!(
            without_id(&entry.lines[0]),
            "- data [09/Mar/2024:14:05:07 +0000] - - REST.GET.OBJECT file.txt \"GET /data/file.txt HTTP/1.1\" 200 - 42 - - - \"-\" \"-\""
        );
    }

    #[test]
    fn test_should_render_optional_fields() {
        let mut rec = record(Method::PUT, "/data/dir/a.bin?x-id=PutObject", 403);
        rec.remote_addr = Some("10.0.0.7".parse().expect("ip"));
        rec.http_version = Version::HTTP_2;
        rec.processing_time = Some(Duration::from_millis(17));
        rec.referrer = Some("http://example.com/".into());
        rec.user_agent = Some("aws-cli/2.0".into());

        let entry = build_entry(&rec, &config());
        assert_eq!(
            without_id(&entry.lines[0]),
            "- data [09/Mar/2024:14:05:07 +0000] 10.0.0.7 - REST.PUT.OBJECT dir/a.bin \"PUT /data/dir/a.bin?x-id=PutObject HTTP/2.0\" 403 - - - - 17 \"http://example.com/\" \"aws-cli/2.0\""
        );
    }

    #[test]
    fn test_should_skip_unlogged_buckets() {
        let entry = build_entry(&record(Method::GET, "/other/file.txt", 200), &config());
        assert_eq!(entry, BuiltEntry::default());
    }

    #[test]
    fn test_should_skip_bucket_level_requests() {
        for method in [Method::PUT, Method::DELETE, Method::GET, Method::HEAD] {
            let entry = build_entry(&record(method, "/data", 200), &config());
            assert!(entry.lines.is_empty());
            assert!(!entry.flush_requested);
        }
    }

    #[test]
    fn test_should_emit_copy_line_before_primary_line() {
        let mut rec = record(Method::PUT, "/data/copy.txt", 200);
        rec.headers.insert(
            COPY_SOURCE_HEADER,
            HeaderValue::from_static("/src-bucket/dir/my%20file.txt"),
        );
        rec.content_length = Some(234);

        let entry = build_entry(&rec, &config());
        assert_eq!(entry.lines.len(), 2);
        assert_eq!(
            without_id(&entry.lines[0]),
            "- src-bucket [09/Mar/2024:14:05:07 +0000] - - REST.COPY.OBJECT_GET dir/my file.txt \"GET /src-bucket/dir/my file.txt HTTP/1.1\" 200 - 234 - - - \"-\" \"-\""
        );
        assert!(entry.lines[1].as_str().contains("REST.PUT.OBJECT copy.txt"));
    }

    #[test]
    fn test_should_accept_copy_source_without_leading_slash() {
        let mut rec = record(Method::PUT, "/data/copy.txt", 200);
        rec.headers
            .insert(COPY_SOURCE_HEADER, HeaderValue::from_static("src/key"));
        let entry = build_entry(&rec, &config());
        assert!(
            entry.lines[0]
                .as_str()
                .contains("REST.COPY.OBJECT_GET key \"GET /src/key HTTP/1.1\"")
        );
    }

    #[test]
    fn test_should_skip_copy_line_for_failed_copy() {
        let mut rec = record(Method::PUT, "/data/copy.txt", 404);
        rec.headers
            .insert(COPY_SOURCE_HEADER, HeaderValue::from_static("/src/key"));
        let entry = build_entry(&rec, &config());
        assert_eq!(entry.lines.len(), 1);
        assert!(entry.lines[0].as_str().contains("REST.PUT.OBJECT"));
    }

    #[test]
    fn test_should_signal_flush_on_log_bucket_poll() {
        let entry = build_entry(&record(Method::GET, "/logs", 200), &config());
        assert!(entry.flush_requested);
        assert!(entry.lines.is_empty());

        let entry = build_entry(&record(Method::GET, "/logs/?prefix=2024", 200), &config());
        assert!(entry.flush_requested);
    }

    #[test]
    fn test_should_signal_without_line_when_log_bucket_is_logged() {
        let mut config = config();
        config.buckets_to_log.insert("logs".to_owned());

        let entry = build_entry(&record(Method::GET, "/logs", 200), &config);
        assert!(entry.flush_requested);
        assert!(entry.lines.is_empty());

        let entry = build_entry(&record(Method::GET, "/logs/some-object", 200), &config);
        assert!(!entry.flush_requested);
        assert_eq!(entry.lines.len(), 1);
    }

    #[test]
    fn test_should_not_signal_for_other_methods_on_log_bucket() {
        for method in [Method::PUT, Method::HEAD, Method::DELETE] {
            let entry = build_entry(&record(method, "/logs", 200), &config());
            assert!(!entry.flush_requested);
        }
    }

    #[test]
    fn test_should_generate_distinct_request_ids_per_line() {
        let mut rec = record(Method::PUT, "/data/copy.txt", 200);
        rec.headers
            .insert(COPY_SOURCE_HEADER, HeaderValue::from_static("/src/key"));
        let entry = build_entry(&rec, &config());

        let ids: Vec<&str> = entry
            .lines
            .iter()
            .map(|l| l.as_str().split(' ').nth(6).expect("id field"))
            .collect();
        for id in &ids {
            assert_eq!(id.len(), 16);
            assert!(
                id.chars()
                    .all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c))
            );
        }
        assert_ne!(ids[0], ids[1]);
    }

    #[test]
    fn test_should_generate_uppercase_hex_request_id() {
        let id = request_id();
        assert_eq!(id.len(), 16);
        assert_eq!(id, id.to_ascii_uppercase());
        assert!(hex::decode(&id).is_ok_and(|bytes| bytes.len() == 8));
        assert_ne!(request_id(), request_id());
    }
}
