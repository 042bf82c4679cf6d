//! Lazy, idempotent creation of the log bucket.
//!
//! ```text
//! Uninitialized --> Resolving --found--> Initialized
//!                      |
//!                   missing
//!                      v
//!                  Creating --ok / already exists--> Initialized
//!                      |
//!                    error
//!                      v
//!                   Failed  (retried on the next ensure)
//! ```

use std::sync::Arc;

use parking_lot::Mutex;
use ruststack_s3_core::{StorageBackend, StorageError};
use tracing::{debug, info};

use crate::error::{AccessLogError, AccessLogResult};

/// Progress of the log bucket bootstrap.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BootstrapState {
    /// No attempt has been made yet.
    #[default]
    Uninitialized,
    /// Looking the bucket up.
    Resolving,
    /// The bucket was not found and is being created.
    Creating,
    /// The bucket exists. Terminal.
    Initialized,
    /// The last attempt could not create the bucket.
    Failed,
}

/// Ensures the log bucket exists before the first delivery.
#[derive(Debug)]
pub struct Bootstrapper {
    bucket: String,
    storage: Arc<dyn StorageBackend>,
    state: Mutex<BootstrapState>,
    attempt: tokio::sync::Mutex<()>,
}

impl Bootstrapper {
    /// Create a bootstrapper for `bucket`.
    #[must_use]
    pub fn new(bucket: impl Into<String>, storage: Arc<dyn StorageBackend>) -> Self {
        Self {
            bucket: bucket.into(),
            storage,
            state: Mutex::new(BootstrapState::Uninitialized),
            attempt: tokio::sync::Mutex::new(()),
        }
    }

    /// The log bucket name.
    #[must_use]
    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> BootstrapState {
        *self.state.lock()
    }

    /// Make sure the log bucket exists.
    ///
    /// Once initialized this returns immediately without touching storage.
    /// Concurrent callers wait for the attempt already running.
    ///
    /// # Errors
    ///
    /// Returns [`AccessLogError::Bootstrap`] when the bucket is missing and
    /// cannot be created. The next call tries again.
    pub async fn ensure(&self) -> AccessLogResult<()> {
        if self.state() == BootstrapState::Initialized {
            return Ok(());
        }

        let _attempt = self.attempt.lock().await;
        if self.state() == BootstrapState::Initialized {
            return Ok(());
        }

        self.set_state(BootstrapState::Resolving);
        match self.storage.get_bucket(&self.bucket).await {
            Ok(_) => {
                debug!(bucket = %self.bucket, "S3 log bucket found");
                self.set_state(BootstrapState::Initialized);
                return Ok(());
            }
            Err(e) => debug!(bucket = %self.bucket, error = %e, "S3 log bucket lookup failed"),
        }

        self.set_state(BootstrapState::Creating);
        match self.storage.create_bucket(&self.bucket).await {
            Ok(_) | Err(StorageError::BucketAlreadyExists { .. }) => {
                info!(bucket = %self.bucket, "Created S3 log bucket");
                self.set_state(BootstrapState::Initialized);
                Ok(())
            }
            Err(e) => {
                debug!(bucket = %self.bucket, error = %e, "Unable to create S3 log bucket");
                self.set_state(BootstrapState::Failed);
                Err(AccessLogError::Bootstrap {
                    bucket: self.bucket.clone(),
                    reason: e.to_string(),
                })
            }
        }
    }

    fn set_state(&self, state: BootstrapState) {
        *self.state.lock() = state;
    }
}
