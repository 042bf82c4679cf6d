//! Object change notifications.
//!
//! Every successful object write or delete is published on an [`EventHub`]
//! as an [`S3Event`]. Subscribers get their own receiver; a slow subscriber
//! lags and loses the oldest events instead of blocking request handling.

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{Value, json};
use tokio::sync::broadcast;

/// Default number of events buffered per subscriber.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Kind of object change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum S3EventName {
    /// An object was stored by `PutObject`.
    ObjectCreatedPut,
    /// An object was stored by `CopyObject`.
    ObjectCreatedCopy,
    /// An object was removed by `DeleteObject`.
    ObjectRemovedDelete,
}

impl S3EventName {
    /// Notification name, e.g. `ObjectCreated:Put`.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ObjectCreatedPut => "ObjectCreated:Put",
            Self::ObjectCreatedCopy => "ObjectCreated:Copy",
            Self::ObjectRemovedDelete => "ObjectRemoved:Delete",
        }
    }
}

/// One object change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct S3Event {
    /// What happened.
    pub event_name: S3EventName,
    /// When it happened.
    pub event_time: DateTime<Utc>,
    /// Bucket holding the object.
    pub bucket: String,
    /// Object key.
    pub key: String,
    /// Object size in bytes; absent for deletions.
    pub size: Option<u64>,
    /// Object ETag without quotes; absent for deletions.
    pub etag: Option<String>,
}

impl S3Event {
    /// An object-created event.
    #[must_use]
    pub fn created(
        event_name: S3EventName,
        bucket: impl Into<String>,
        key: impl Into<String>,
        size: u64,
        etag: impl Into<String>,
    ) -> Self {
        Self {
            event_name,
            event_time: Utc::now(),
            bucket: bucket.into(),
            key: key.into(),
            size: Some(size),
            etag: Some(etag.into()),
        }
    }

    /// An object-removed event.
    #[must_use]
    pub fn removed(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            event_name: S3EventName::ObjectRemovedDelete,
            event_time: Utc::now(),
            bucket: bucket.into(),
            key: key.into(),
            size: None,
            etag: None,
        }
    }

    /// The event as an S3 notification document with a single record.
    #[must_use]
    pub fn to_notification(&self) -> Value {
        let mut object = json!({ "key": self.key });
        if let Some(size) = self.size {
            object["size"] = json!(size);
        }
        if let Some(etag) = &self.etag {
            object["eTag"] = json!(etag);
        }

        json!({
            "Records": [{
                "eventVersion": "2.0",
                "eventSource": "aws:s3",
                "awsRegion": "us-east-1",
                "eventTime": self.event_time.to_rfc3339_opts(SecondsFormat::Millis, true),
                "eventName": self.event_name.as_str(),
                "s3": {
                    "s3SchemaVersion": "1.0",
                    "bucket": {
                        "name": self.bucket,
                        "arn": format!("arn:aws:s3:::{}", self.bucket),
                    },
                    "object": object,
                },
            }]
        })
    }
}

/// Fan-out point for [`S3Event`]s.
///
/// Cloning shares the underlying channel.
#[derive(Debug, Clone)]
pub struct EventHub {
    sender: broadcast::Sender<S3Event>,
}

impl EventHub {
    /// Create a hub buffering up to `capacity` events per subscriber.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// A receiver for every event published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<S3Event> {
        self.sender.subscribe()
    }

    /// Publish an event, returning how many subscribers will see it.
    ///
    /// Publishing with no subscribers is not an error.
    pub fn publish(&self, event: S3Event) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    /// Number of live subscribers.
    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}
