//! Filesystem storage engine for buckets and objects.
//!
//! Every bucket is a directory under the store root. Every object is a
//! directory named after its key, holding the raw bytes in `.content` and a
//! JSON [`ObjectInfo`] in `.metadata.json`:
//!
//! ```text
//! {root}/
//!   data/
//!     file.txt/.content
//!     file.txt/.metadata.json
//!     nested/dir/key/.content
//!     nested/dir/key/.metadata.json
//! ```
//!
//! Object bodies arrive as a [`ByteStream`] and are written chunk by chunk to
//! a temporary file next to the final location, hashed on the way, then
//! renamed into place so readers never observe a half-written object.
//!
//! [`StorageBackend`] is the narrow view of the engine used by the access-log
//! pipeline: bucket lookup, bucket creation and streamed object writes.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use futures::stream::BoxStream;
use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, trace, warn};

use crate::error::{StorageError, StorageResult};
use crate::validation::{validate_bucket_name, validate_object_key};

/// File holding an object's raw bytes.
const CONTENT_FILE: &str = ".content";

/// File holding an object's serialized [`ObjectInfo`].
const METADATA_FILE: &str = ".metadata.json";

/// Default content type for objects uploaded without one.
const DEFAULT_CONTENT_TYPE: &str = "binary/octet-stream";

/// A streamed object body.
pub type ByteStream = BoxStream<'static, Result<Bytes, std::io::Error>>;

/// A bucket as seen by callers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BucketInfo {
    /// Bucket name.
    pub name: String,
    /// When the bucket directory was created.
    pub creation_date: DateTime<Utc>,
}

/// Caller-supplied metadata for a new object.
#[derive(Debug, Clone, Default)]
pub struct ObjectMetadataInput {
    /// The `Content-Type` to store; defaults to `binary/octet-stream`.
    pub content_type: Option<String>,
    /// User metadata (`x-amz-meta-*` headers, without the prefix).
    pub user_metadata: BTreeMap<String, String>,
}

impl ObjectMetadataInput {
    /// Metadata with only a content type.
    #[must_use]
    pub fn with_content_type(content_type: impl Into<String>) -> Self {
        Self {
            content_type: Some(content_type.into()),
            user_metadata: BTreeMap::new(),
        }
    }
}

/// Stored object metadata, persisted as the object's sidecar file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectInfo {
    /// Object key.
    pub key: String,
    /// Size in bytes.
    pub size: u64,
    /// Quoted hex MD5 of the content.
    pub etag: String,
    /// Stored content type.
    pub content_type: String,
    /// Time of the last write.
    pub last_modified: DateTime<Utc>,
    /// User metadata.
    #[serde(default)]
    pub user_metadata: BTreeMap<String, String>,
}

/// A page of objects returned by [`FileStore::list_objects`].
#[derive(Debug, Clone, Default)]
pub struct ListObjectsResult {
    /// Objects in key order.
    pub objects: Vec<ObjectInfo>,
    /// Whether more keys matched than were returned.
    pub is_truncated: bool,
}

/// The storage operations the access-log pipeline depends on.
#[async_trait]
pub trait StorageBackend: Send + Sync + std::fmt::Debug + 'static {
    /// Look up a bucket, failing with [`StorageError::NoSuchBucket`] if absent.
    async fn get_bucket(&self, bucket: &str) -> StorageResult<BucketInfo>;

    /// Create a bucket.
    async fn create_bucket(&self, bucket: &str) -> StorageResult<BucketInfo>;

    /// Write an object from a streamed body.
    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: ByteStream,
        metadata: ObjectMetadataInput,
    ) -> StorageResult<ObjectInfo>;
}

/// Filesystem-backed storage engine.
///
/// # Examples
///
/// ```
/// use bytes::Bytes;
/// use ruststack_s3_core::storage::{FileStore, ObjectMetadataInput};
///
/// # tokio_test::block_on(async {
/// let dir = tempfile::tempdir().unwrap();
/// let store = FileStore::new(dir.path());
/// store.create_bucket("data").await.unwrap();
/// let info = store
///     .put_bytes("data", "hello.txt", Bytes::from("hello"), ObjectMetadataInput::default())
///     .await
///     .unwrap();
/// assert_eq!(info.size, 5);
///
/// let (_, body) = store.get_object("data", "hello.txt").await.unwrap();
/// assert_eq!(body.as_ref(), b"hello");
/// # });
/// ```
#[derive(Debug, Clone)]
pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    /// Create a store rooted at `root`. The directory is created lazily.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        debug!(root = %root.display(), "creating FileStore");
        Self { root }
    }

    /// The root directory.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the root directory if it does not exist.
    pub async fn ensure_root(&self) -> StorageResult<()> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|e| StorageError::io(&self.root, e))
    }

    /// List all buckets sorted by name.
    pub async fn list_buckets(&self) -> StorageResult<Vec<BucketInfo>> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(StorageError::io(&self.root, e)),
        };

        let mut buckets = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| StorageError::io(&self.root, e))?
        {
            let path = entry.path();
            let meta = entry
                .metadata()
                .await
                .map_err(|e| StorageError::io(&path, e))?;
            if !meta.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if validate_bucket_name(&name).is_err() {
                continue;
            }
            buckets.push(BucketInfo {
                name,
                creation_date: creation_time(&meta),
            });
        }

        buckets.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(buckets)
    }

    /// Look up a bucket.
    pub async fn get_bucket(&self, bucket: &str) -> StorageResult<BucketInfo> {
        let no_such_bucket = || StorageError::NoSuchBucket {
            bucket: bucket.to_owned(),
        };
        validate_bucket_name(bucket).map_err(|_| no_such_bucket())?;

        let path = self.root.join(bucket);
        match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_dir() => Ok(BucketInfo {
                name: bucket.to_owned(),
                creation_date: creation_time(&meta),
            }),
            Ok(_) => Err(no_such_bucket()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(no_such_bucket()),
            Err(e) => Err(StorageError::io(path, e)),
        }
    }

    /// Create a bucket.
    pub async fn create_bucket(&self, bucket: &str) -> StorageResult<BucketInfo> {
        validate_bucket_name(bucket)?;
        if self.get_bucket(bucket).await.is_ok() {
            return Err(StorageError::BucketAlreadyExists {
                bucket: bucket.to_owned(),
            });
        }

        let path = self.root.join(bucket);
        tokio::fs::create_dir_all(&path)
            .await
            .map_err(|e| StorageError::io(&path, e))?;

        info!(bucket, "bucket created");
        self.get_bucket(bucket).await
    }

    /// Delete an empty bucket.
    pub async fn delete_bucket(&self, bucket: &str) -> StorageResult<()> {
        self.get_bucket(bucket).await?;
        let path = self.root.join(bucket);

        let mut entries = tokio::fs::read_dir(&path)
            .await
            .map_err(|e| StorageError::io(&path, e))?;
        if entries
            .next_entry()
            .await
            .map_err(|e| StorageError::io(&path, e))?
            .is_some()
        {
            return Err(StorageError::BucketNotEmpty {
                bucket: bucket.to_owned(),
            });
        }

        tokio::fs::remove_dir(&path)
            .await
            .map_err(|e| StorageError::io(&path, e))?;
        info!(bucket, "bucket deleted");
        Ok(())
    }

    /// List objects whose key starts with `prefix`, at most `max_keys` of them.
    pub async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        max_keys: usize,
    ) -> StorageResult<ListObjectsResult> {
        self.get_bucket(bucket).await?;
        let bucket_dir = self.root.join(bucket);

        let mut keys = Vec::new();
        let mut pending = vec![(bucket_dir, String::new())];
        while let Some((dir, key)) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&dir)
                .await
                .map_err(|e| StorageError::io(&dir, e))?;
            while let Some(entry) = entries
                .next_entry()
                .await
                .map_err(|e| StorageError::io(&dir, e))?
            {
                let name = entry.file_name().to_string_lossy().into_owned();
                if name == METADATA_FILE {
                    if !key.is_empty() {
                        keys.push(key.clone());
                    }
                    continue;
                }
                if name.starts_with(CONTENT_FILE) {
                    continue;
                }
                let is_dir = entry
                    .file_type()
                    .await
                    .map_err(|e| StorageError::io(entry.path(), e))?
                    .is_dir();
                if is_dir {
                    let child = if key.is_empty() {
                        name
                    } else {
                        format!("{key}/{name}")
                    };
                    pending.push((entry.path(), child));
                }
            }
        }

        keys.retain(|k| k.starts_with(prefix));
        keys.sort();

        let is_truncated = keys.len() > max_keys;
        keys.truncate(max_keys);

        let mut objects = Vec::with_capacity(keys.len());
        for key in keys {
            objects.push(self.read_metadata(bucket, &key).await?);
        }

        Ok(ListObjectsResult {
            objects,
            is_truncated,
        })
    }

    /// Write an object from a streamed body.
    pub async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        mut body: ByteStream,
        metadata: ObjectMetadataInput,
    ) -> StorageResult<ObjectInfo> {
        validate_object_key(key)?;
        self.get_bucket(bucket).await?;

        let dir = self.object_dir(bucket, key);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(|e| StorageError::io(&dir, e))?;

        let tmp_path = dir.join(format!("{CONTENT_FILE}.{}.tmp", uuid::Uuid::new_v4()));
        let written = async {
            let mut file = tokio::fs::File::create(&tmp_path)
                .await
                .map_err(|e| StorageError::io(&tmp_path, e))?;
            let mut hasher = Md5::new();
            let mut size = 0u64;
            while let Some(chunk) = body.next().await {
                let chunk = chunk.map_err(|e| StorageError::io(&tmp_path, e))?;
                hasher.update(&chunk);
                size += chunk.len() as u64;
                file.write_all(&chunk)
                    .await
                    .map_err(|e| StorageError::io(&tmp_path, e))?;
            }
            file.flush()
                .await
                .map_err(|e| StorageError::io(&tmp_path, e))?;
            Ok::<_, StorageError>((size, hex::encode(hasher.finalize())))
        }
        .await;

        let (size, md5_hex) = match written {
            Ok(v) => v,
            Err(e) => {
                if let Err(rm) = tokio::fs::remove_file(&tmp_path).await {
                    warn!(path = %tmp_path.display(), error = %rm, "failed to remove temp file");
                }
                return Err(e);
            }
        };

        let content_path = dir.join(CONTENT_FILE);
        tokio::fs::rename(&tmp_path, &content_path)
            .await
            .map_err(|e| StorageError::io(&content_path, e))?;

        let info = ObjectInfo {
            key: key.to_owned(),
            size,
            etag: format!("\"{md5_hex}\""),
            content_type: metadata
                .content_type
                .unwrap_or_else(|| DEFAULT_CONTENT_TYPE.to_owned()),
            last_modified: Utc::now(),
            user_metadata: metadata.user_metadata,
        };
        self.write_metadata(&dir, &info).await?;

        trace!(bucket, key, size, "stored object");
        Ok(info)
    }

    /// Write an object from an in-memory buffer.
    pub async fn put_bytes(
        &self,
        bucket: &str,
        key: &str,
        data: Bytes,
        metadata: ObjectMetadataInput,
    ) -> StorageResult<ObjectInfo> {
        let body = futures::stream::once(async move { Ok(data) }).boxed();
        self.put_object(bucket, key, body, metadata).await
    }

    /// Read an object's metadata and full content.
    pub async fn get_object(&self, bucket: &str, key: &str) -> StorageResult<(ObjectInfo, Bytes)> {
        let info = self.head_object(bucket, key).await?;
        let path = self.object_dir(bucket, key).join(CONTENT_FILE);
        let data = tokio::fs::read(&path)
            .await
            .map_err(|e| StorageError::io(&path, e))?;
        Ok((info, Bytes::from(data)))
    }

    /// Read an object's metadata.
    pub async fn head_object(&self, bucket: &str, key: &str) -> StorageResult<ObjectInfo> {
        self.get_bucket(bucket).await?;
        if validate_object_key(key).is_err() {
            return Err(StorageError::NoSuchKey {
                key: key.to_owned(),
            });
        }
        self.read_metadata(bucket, key).await
    }

    /// Copy an object, keeping its content type and user metadata.
    pub async fn copy_object(
        &self,
        src_bucket: &str,
        src_key: &str,
        dst_bucket: &str,
        dst_key: &str,
    ) -> StorageResult<ObjectInfo> {
        let (src, data) = self.get_object(src_bucket, src_key).await?;
        debug!(
            src_bucket,
            src_key,
            dst_bucket,
            dst_key,
            size = data.len(),
            "copying object"
        );
        let metadata = ObjectMetadataInput {
            content_type: Some(src.content_type),
            user_metadata: src.user_metadata,
        };
        self.put_bytes(dst_bucket, dst_key, data, metadata).await
    }

    /// Delete an object. Deleting a missing key succeeds.
    pub async fn delete_object(&self, bucket: &str, key: &str) -> StorageResult<()> {
        self.get_bucket(bucket).await?;
        if validate_object_key(key).is_err() {
            return Ok(());
        }

        let dir = self.object_dir(bucket, key);
        for name in [CONTENT_FILE, METADATA_FILE] {
            let path = dir.join(name);
            match tokio::fs::remove_file(&path).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(StorageError::io(path, e)),
            }
        }

        // Prune now-empty key directories up to (not including) the bucket.
        let bucket_dir = self.root.join(bucket);
        let mut current = dir;
        while current != bucket_dir && tokio::fs::remove_dir(&current).await.is_ok() {
            match current.parent() {
                Some(parent) => current = parent.to_path_buf(),
                None => break,
            }
        }

        trace!(bucket, key, "deleted object");
        Ok(())
    }

    /// Remove every bucket under the root.
    pub async fn reset(&self) -> StorageResult<()> {
        for bucket in self.list_buckets().await? {
            let path = self.root.join(&bucket.name);
            tokio::fs::remove_dir_all(&path)
                .await
                .map_err(|e| StorageError::io(&path, e))?;
        }
        debug!(root = %self.root.display(), "removed all buckets");
        Ok(())
    }

    fn object_dir(&self, bucket: &str, key: &str) -> PathBuf {
        let mut path = self.root.join(bucket);
        path.extend(key.split('/'));
        path
    }

    async fn read_metadata(&self, bucket: &str, key: &str) -> StorageResult<ObjectInfo> {
        let path = self.object_dir(bucket, key).join(METADATA_FILE);
        let raw = match tokio::fs::read(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StorageError::NoSuchKey {
                    key: key.to_owned(),
                });
            }
            Err(e) => return Err(StorageError::io(path, e)),
        };
        serde_json::from_slice(&raw).map_err(|source| StorageError::Metadata { path, source })
    }

    async fn write_metadata(&self, dir: &Path, info: &ObjectInfo) -> StorageResult<()> {
        let path = dir.join(METADATA_FILE);
        let raw = serde_json::to_vec_pretty(info).map_err(|source| StorageError::Metadata {
            path: path.clone(),
            source,
        })?;
        tokio::fs::write(&path, raw)
            .await
            .map_err(|e| StorageError::io(path, e))
    }
}

#[async_trait]
impl StorageBackend for FileStore {
    async fn get_bucket(&self, bucket: &str) -> StorageResult<BucketInfo> {
        FileStore::get_bucket(self, bucket).await
    }

    async fn create_bucket(&self, bucket: &str) -> StorageResult<BucketInfo> {
        FileStore::create_bucket(self, bucket).await
    }

    async fn put_object(
        &self,
        bucket: &str,
        key: &str,
        body: ByteStream,
        metadata: ObjectMetadataInput,
    ) -> StorageResult<ObjectInfo> {
        FileStore::put_object(self, bucket, key, body, metadata).await
    }
}

/// Best available creation time for a bucket directory.
fn creation_time(meta: &std::fs::Metadata) -> DateTime<Utc> {
    meta.created()
        .or_else(|_| meta.modified())
        .map_or_else(|_| Utc::now(), DateTime::<Utc>::from)
}
