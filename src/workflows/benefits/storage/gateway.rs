use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use tracing::{debug, error, warn};

use super::{ObjectStorage, StorageError, StoragePath};
use crate::workflows::benefits::invoices::InvoiceFile;

/// Source of upload timestamps, swappable in tests.
pub trait UploadClock: Send + Sync {
    fn now_millis(&self) -> i64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl UploadClock for SystemClock {
    fn now_millis(&self) -> i64 {
        Utc::now().timestamp_millis()
    }
}

/// Uploads invoice batches one file at a time under an owner-scoped prefix.
///
/// Processing stops at the first failing file. Files stored earlier in the same
/// batch stay in storage; the returned error lists them in `uploaded` so callers
/// can reconcile or clean up, but the batch is never reported as a success.
pub struct UploadGateway<S> {
    storage: Arc<S>,
    max_file_bytes: u64,
    clock: Arc<dyn UploadClock>,
    last_stamp: Mutex<i64>,
}

impl<S> UploadGateway<S>
where
    S: ObjectStorage + 'static,
{
    pub fn new(storage: Arc<S>, max_file_bytes: u64) -> Self {
        Self::with_clock(storage, max_file_bytes, Arc::new(SystemClock))
    }

    pub fn with_clock(storage: Arc<S>, max_file_bytes: u64, clock: Arc<dyn UploadClock>) -> Self {
        Self {
            storage,
            max_file_bytes,
            clock,
            last_stamp: Mutex::new(i64::MIN),
        }
    }

    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }

    pub fn max_file_bytes(&self) -> u64 {
        self.max_file_bytes
    }

    /// Upload `files` in order, returning one storage path per file.
    pub async fn upload(
        &self,
        owner_id: &str,
        files: &[InvoiceFile],
    ) -> Result<Vec<StoragePath>, UploadError> {
        let Some(first) = files.first() else {
            return Ok(Vec::new());
        };

        let owner_id = owner_id.trim();
        if owner_id.is_empty() {
            return Err(UploadError {
                file_name: first.name.clone(),
                cause: UploadFailure::MissingOwner,
                uploaded: Vec::new(),
            });
        }

        let mut uploaded = Vec::with_capacity(files.len());
        for file in files {
            let size = file.size_bytes();
            if size > self.max_file_bytes {
                warn!(
                    owner_id,
                    file_name = %file.name,
                    size,
                    limit = self.max_file_bytes,
                    "invoice exceeds upload limit"
                );
                return Err(UploadError {
                    file_name: file.name.clone(),
                    cause: UploadFailure::TooLarge {
                        size,
                        limit: self.max_file_bytes,
                    },
                    uploaded,
                });
            }

            let key = StoragePath::for_invoice(owner_id, self.next_stamp(), &file.name);
            if let Err(source) = self.storage.put_object(&key, file).await {
                error!(
                    owner_id,
                    file_name = %file.name,
                    %key,
                    stored_before_failure = uploaded.len(),
                    error = %source,
                    "invoice upload failed"
                );
                return Err(UploadError {
                    file_name: file.name.clone(),
                    cause: UploadFailure::Storage(source),
                    uploaded,
                });
            }

            debug!(owner_id, %key, size, "invoice stored");
            uploaded.push(key);
        }

        Ok(uploaded)
    }

    /// Millisecond stamp, strictly increasing for this gateway.
    fn next_stamp(&self) -> i64 {
        let mut last = self.last_stamp.lock().unwrap_or_else(PoisonError::into_inner);
        let now = self.clock.now_millis();
        let stamp = if now > *last { now } else { *last + 1 };
        *last = stamp;
        stamp
    }
}

/// Failure naming the offending file.
#[derive(Debug, thiserror::Error)]
#[error("failed to upload invoice '{file_name}': {cause}")]
pub struct UploadError {
    pub file_name: String,
    #[source]
    pub cause: UploadFailure,
    /// Paths stored earlier in the same batch; they are not rolled back.
    pub uploaded: Vec<StoragePath>,
}

#[derive(Debug, thiserror::Error)]
pub enum UploadFailure {
    #[error("file is {size} bytes, above the {limit} byte limit")]
    TooLarge { size: u64, limit: u64 },
    #[error("upload owner identifier is empty")]
    MissingOwner,
    #[error(transparent)]
    Storage(#[from] StorageError),
}
