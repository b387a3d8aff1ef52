//! In-memory object store.
//!
//! Objects are held in a `tokio::sync::RwLock<HashMap<...>>`.  Nothing
//! is persisted; the store is meant for tests and for running the
//! service locally without an S3 endpoint (`storage.backend: memory`).

use bytes::Bytes;
use std::collections::HashMap;
use tokio::io::AsyncReadExt;

use super::backend::{ObjectMetadata, ObjectStore, StoreError, StoreFuture, UploadSource};

/// A stored object: bytes plus the attributes written with it.
#[derive(Debug, Clone)]
pub struct MemoryObject {
    pub data: Bytes,
    pub content_type: String,
    pub metadata: ObjectMetadata,
}

/// In-memory object store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: tokio::sync::RwLock<HashMap<String, MemoryObject>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch a full object, as a public bucket URL would serve it.
    pub async fn get(&self, key: &str) -> Option<MemoryObject> {
        self.objects.read().await.get(key).cloned()
    }

    pub async fn contains(&self, key: &str) -> bool {
        self.objects.read().await.contains_key(key)
    }

    pub async fn len(&self) -> usize {
        self.objects.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.read().await.is_empty()
    }

    /// Sorted list of stored keys.
    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.objects.read().await.keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl ObjectStore for MemoryStore {
    fn upload_content<'a>(
        &'a self,
        key: &'a str,
        source: UploadSource,
        content_type: &'a str,
        metadata: &'a ObjectMetadata,
    ) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            let data = match source {
                UploadSource::Bytes(data) => data,
                UploadSource::Reader { mut reader, .. } => {
                    let mut buf = Vec::new();
                    reader
                        .read_to_end(&mut buf)
                        .await
                        .map_err(|e| StoreError::Upload {
                            key: key.to_string(),
                            source: e.into(),
                        })?;
                    Bytes::from(buf)
                }
            };

            tracing::debug!("memory upload: key={} size={}", key, data.len());

            self.objects.write().await.insert(
                key.to_string(),
                MemoryObject {
                    data,
                    content_type: content_type.to_string(),
                    metadata: metadata.clone(),
                },
            );
            Ok(())
        })
    }

    fn fetch_metadata<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ObjectMetadata> {
        Box::pin(async move {
            self.objects
                .read()
                .await
                .get(key)
                .map(|obj| obj.metadata.clone())
                .ok_or_else(|| StoreError::NotFound {
                    key: key.to_string(),
                })
        })
    }

    fn delete_objects<'a>(&'a self, keys: &'a [String]) -> StoreFuture<'a, ()> {
        Box::pin(async move {
            if keys.is_empty() {
                return Ok(());
            }
            let mut objects = self.objects.write().await;
            for key in keys {
                if objects.remove(key).is_none() {
                    tracing::debug!("memory delete: {} already absent", key);
                }
            }
            Ok(())
        })
    }
}

// ── Tests ──────────────────────────────────────────────────────────────
