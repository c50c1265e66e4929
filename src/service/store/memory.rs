//! In-process blob backend.

use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::base::error::BotResult;

use super::{BlobClient, GenericBlobStore, Metadata, PutOutcome};

/// A stored object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredBlob {
    pub body: Vec<u8>,
    pub content_type: String,
    pub metadata: Metadata,
}

/// Blob backend that keeps everything in memory. Useful for tests and local runs.
#[derive(Debug, Default)]
pub struct MemoryBlobStore {
    objects: RwLock<BTreeMap<String, StoredBlob>>,
}

impl MemoryBlobStore {
    /// Returns a copy of the object stored under `key`.
    pub fn object(&self, key: &str) -> Option<StoredBlob> {
        self.objects.read().get(key).cloned()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }
}

impl BlobClient {
    /// Creates an in-memory blob client.
    pub fn memory() -> Self {
        Self::new(std::sync::Arc::new(MemoryBlobStore::default()))
    }
}

#[async_trait]
impl GenericBlobStore for MemoryBlobStore {
    async fn put(&self, key: &str, body: Vec<u8>, content_type: &str, metadata: &Metadata) -> BotResult<PutOutcome> {
        let mut objects = self.objects.write();

        if objects.contains_key(key) {
            return Ok(PutOutcome::AlreadyExists);
        }

        objects.insert(
            key.to_string(),
            StoredBlob {
                body,
                content_type: content_type.to_string(),
                metadata: metadata.clone(),
            },
        );

        Ok(PutOutcome::Created)
    }

    async fn exists(&self, key: &str) -> BotResult<bool> {
        Ok(self.objects.read().contains_key(key))
    }

    async fn list(&self, prefix: &str) -> BotResult<Vec<String>> {
        let objects = self.objects.read();

        Ok(objects.range(prefix.to_string()..).map(|(key, _)| key).take_while(|key| key.starts_with(prefix)).cloned().collect())
    }
}
