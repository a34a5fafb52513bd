//! Remote object storage for invoice files and the upload gateway in front of it.

pub mod gateway;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use super::invoices::InvoiceFile;

pub use gateway::{SystemClock, UploadClock, UploadError, UploadFailure, UploadGateway};

/// Namespaced storage key, `{owner}/{timestamp}-{file name}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StoragePath(pub String);

impl StoragePath {
    pub fn for_invoice(owner_id: &str, timestamp_millis: i64, file_name: &str) -> Self {
        Self(format!(
            "{owner_id}/{timestamp_millis}-{}",
            sanitized_file_name(file_name)
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StoragePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn sanitized_file_name(raw: &str) -> String {
    let base = raw
        .rsplit(|c: char| c == '/' || c == '\\')
        .next()
        .unwrap_or(raw)
        .trim();
    if base.is_empty() {
        "invoice".to_string()
    } else {
        base.to_string()
    }
}

/// Backend holding uploaded invoices. Implementations must never overwrite a key.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    async fn put_object(&self, key: &StoragePath, file: &InvoiceFile) -> Result<(), StorageError>;
    async fn contains(&self, key: &StoragePath) -> Result<bool, StorageError>;
}

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("an object already exists at '{0}'")]
    AlreadyExists(String),
    #[error("storage rejected the object: {0}")]
    Rejected(String),
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub content_type: String,
    pub content: Bytes,
}

/// Process-local storage used by the demo server and tests.
#[derive(Debug, Default)]
pub struct InMemoryObjectStorage {
    objects: Mutex<BTreeMap<StoragePath, StoredObject>>,
}

impl InMemoryObjectStorage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keys(&self) -> Vec<StoragePath> {
        self.objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    pub fn get(&self, key: &StoragePath) -> Option<StoredObject> {
        self.objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ObjectStorage for InMemoryObjectStorage {
    async fn put_object(&self, key: &StoragePath, file: &InvoiceFile) -> Result<(), StorageError> {
        let mut objects = self.objects.lock().unwrap_or_else(PoisonError::into_inner);
        if objects.contains_key(key) {
            return Err(StorageError::AlreadyExists(key.to_string()));
        }
        objects.insert(
            key.clone(),
            StoredObject {
                content_type: file.content_type.clone(),
                content: file.content.clone(),
            },
        );
        Ok(())
    }

    async fn contains(&self, key: &StoragePath) -> Result<bool, StorageError> {
        Ok(self
            .objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(key))
    }
}
