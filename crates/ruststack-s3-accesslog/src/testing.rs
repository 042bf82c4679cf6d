//! In-memory recording [`StorageBackend`] for pipeline tests.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use futures::TryStreamExt;
use parking_lot::Mutex;
use ruststack_s3_core::{
    BucketInfo, ByteStream, ObjectInfo, ObjectMetadataInput, StorageBackend, StorageError,
    StorageResult,
};
use tokio::sync::{Notify, Semaphore};

/// One object written through the backend.
#[derive(Debug, Clone)]
pub(crate) struct StoredObject {
    pub(crate) bucket: String,
    pub(crate) key: String,
    pub(crate) body: String,
    pub(crate) chunks: usize,
    pub(crate) content_type: Option<String>,
}

impl StoredObject {
    pub(crate) fn lines(&self) -> Vec<&str> {
        self.body.split('\n').collect()
    }
}

#[derive(Debug, Default)]
pub(crate) struct MockBackend {
    buckets: Mutex<BTreeSet<String>>,
    objects: Mutex<Vec<StoredObject>>,
    pub(crate) fail_create: AtomicBool,
    pub(crate) fail_put: AtomicBool,
    pub(crate) get_calls: AtomicUsize,
    pub(crate) create_calls: AtomicUsize,
    pub(crate) put_calls: AtomicUsize,
    gate: Mutex<Option<Arc<Semaphore>>>,
    write_started: Notify,
    stored: Notify,
}

impl MockBackend {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn with_bucket(bucket: &str) -> Arc<Self> {
        let backend = Self::default();
        backend.buckets.lock().insert(bucket.to_owned());
        Arc::new(backend)
    }

    pub(crate) fn has_bucket(&self, bucket: &str) -> bool {
        self.buckets.lock().contains(bucket)
    }

    pub(crate) fn objects(&self) -> Vec<StoredObject> {
        self.objects.lock().clone()
    }

    pub(crate) fn calls(&self) -> (usize, usize, usize) {
        (
            self.get_calls.load(Ordering::SeqCst),
            self.create_calls.load(Ordering::SeqCst),
            self.put_calls.load(Ordering::SeqCst),
        )
    }

    /// Block every subsequent write until [`Self::release_writes`].
    pub(crate) fn hold_writes(&self) {
        *self.gate.lock() = Some(Arc::new(Semaphore::new(0)));
    }

    pub(crate) fn release_writes(&self, n: usize) {
        if let Some(gate) = self.gate.lock().as_ref() {
            gate.add_permits(n);
        }
    }

    /// Wait until a write has entered the backend.
    pub(crate) async fn write_started(&self) {
        tokio::time::timeout(Duration::from_secs(30), self.write_started.notified())
            .await
            .expect("a write should start");
    }

    /// Wait until at least `n` objects have been stored.
    pub(crate) async fn wait_for_objects(&self, n: usize) -> Vec<StoredObject> {
        let wait = async {
            loop {
                let stored = self.stored.notified();
                {
                    let objects = self.objects.lock();
                    if objects.len() >= n {
                        return objects.clone();
                    }
                }
                stored.await;
            }
        };
        tokio::time::timeout(Duration::from_secs(30), wait)
            .await
            .expect("objects should be stored")
    }
}

fn injected(bucket: &str) -> StorageError {
    StorageError::Io {
        path: bucket.into(),
        source: std::io::Error::other("injected failure"),
    }
}

#[async_trait]
impl StorageBackend for MockBackend {
    async fn get_bucket(&self, bucket: &str) -> StorageResult<BucketInfo> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        if self.buckets.lock().contains(bucket) {
            Ok(BucketInfo {
                name: bucket.to_owned(),
                creation_date: Utc::now(),
            })
        } else {
            Err(StorageError::NoSuchBucket {
                bucket: bucket.to_owned(),
            })
        }
    }

    async fn create_bucket(&self, bucket: &str) -> StorageResult<BucketInfo> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(injected(bucket));
        }
        if !self.buckets.lock().insert(bucket.to_owned()) {
            return Err(StorageError::BucketAlreadyExists {
                bucket: bucket.to_owned(),
            });
        }
        Ok(BucketInfo {
            name: bucket.to_owned(),
            creation_date: Utc::now(),
        })
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: ByteStream,
        metadata: ObjectMetadataInput,
    ) -> StorageResult<ObjectInfo> {
        self.put_calls.fetch_add(1, Ordering::SeqCst);
        self.write_started.notify_one();

        let gate = self.gate.lock().clone();
        if let Some(gate) = gate {
            gate.acquire().await.expect("gate open").forget();
        }

        if self.fail_put.load(Ordering::SeqCst) {
            return Err(injected(bucket));
        }
        if !self.buckets.lock().contains(bucket) {
            return Err(StorageError::NoSuchBucket {
                bucket: bucket.to_owned(),
            });
        }

        let chunks: Vec<Bytes> = body
            .try_collect()
            .await
            .map_err(|e| StorageError::Io {
                path: key.into(),
                source: e,
            })?;
        let bytes: Vec<u8> = chunks.iter().flat_map(|c| c.iter().copied()).collect();
        let body = String::from_utf8(bytes).expect("log bodies are utf-8");

        self.objects.lock().push(StoredObject {
            bucket: bucket.to_owned(),
            key: key.to_owned(),
            chunks: chunks.len(),
            content_type: metadata.content_type.clone(),
            body: body.clone(),
        });
        self.stored.notify_waiters();

        Ok(ObjectInfo {
            key: key.to_owned(),
            size: body.len() as u64,
            etag: String::new(),
            content_type: metadata
                .content_type
                .unwrap_or_else(|| "text/plain".to_owned()),
            last_modified: Utc::now(),
            user_metadata: metadata.user_metadata,
        })
    }
}
