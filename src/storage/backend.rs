//! Abstract object store trait.
//!
//! Every object store must implement [`ObjectStore`].  The controller
//! only ever needs three things from the store: write an object with
//! metadata attached, read that metadata back, and remove a batch of
//! objects.  Keeping the surface this small lets the request handlers
//! run against [`super::memory::MemoryStore`] in tests.

use bytes::Bytes;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;
use tokio::io::AsyncRead;

/// User metadata attached to a stored object (`x-amz-meta-*` on S3).
pub type ObjectMetadata = HashMap<String, String>;

/// Boxed future returned by every [`ObjectStore`] operation.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + Send + 'a>>;

/// Errors reported by an object store.
///
/// `NotFound` is kept separate from every other failure so callers can
/// treat a missing object as "already deleted" without inspecting the
/// underlying SDK error.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The object does not exist.
    #[error("object not found: {key}")]
    NotFound { key: String },

    /// The operation did not finish within the configured timeout.
    #[error("{operation} for {key} timed out after {timeout:?}")]
    Timeout {
        operation: &'static str,
        key: String,
        timeout: Duration,
    },

    /// Writing the object failed.
    #[error("upload of {key} failed: {source}")]
    Upload {
        key: String,
        #[source]
        source: anyhow::Error,
    },

    /// Reading the object's metadata failed for a reason other than absence.
    #[error("metadata lookup for {key} failed: {source}")]
    Metadata {
        key: String,
        #[source]
        source: anyhow::Error,
    },

    /// Some objects in a batch delete could not be removed.
    #[error("{failed} of {total} objects could not be deleted")]
    PartialDelete { failed: usize, total: usize },

    /// The batch delete request itself failed.
    #[error("batch delete failed: {0}")]
    Delete(#[source] anyhow::Error),
}

impl StoreError {
    /// Whether this error means the object is absent.
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }
}

/// Where the bytes of an upload come from.
pub enum UploadSource {
    /// Content already held in memory (pasted text, rendered pages).
    Bytes(Bytes),
    /// Content streamed from a reader (spooled file uploads).
    Reader {
        reader: Box<dyn AsyncRead + Send + Unpin>,
        /// Total length when known up front.
        size_hint: Option<u64>,
    },
}

impl UploadSource {
    /// Wrap a reader without a known length.
    pub fn reader(reader: impl AsyncRead + Send + Unpin + 'static) -> Self {
        UploadSource::Reader {
            reader: Box::new(reader),
            size_hint: None,
        }
    }

    /// Length of the content, when known.
    pub fn size_hint(&self) -> Option<u64> {
        match self {
            UploadSource::Bytes(data) => Some(data.len() as u64),
            UploadSource::Reader { size_hint, .. } => *size_hint,
        }
    }
}

impl std::fmt::Debug for UploadSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UploadSource::Bytes(data) => f.debug_tuple("Bytes").field(&data.len()).finish(),
            UploadSource::Reader { size_hint, .. } => f
                .debug_struct("Reader")
                .field("size_hint", size_hint)
                .finish_non_exhaustive(),
        }
    }
}

impl From<String> for UploadSource {
    fn from(value: String) -> Self {
        UploadSource::Bytes(Bytes::from(value))
    }
}

impl From<Bytes> for UploadSource {
    fn from(value: Bytes) -> Self {
        UploadSource::Bytes(value)
    }
}

/// Async object store contract.
///
/// Implementations are shared across requests behind an `Arc` and must
/// hold no per-request state.  Dropping a returned future cancels the
/// operation.
pub trait ObjectStore: Send + Sync + 'static {
    /// Write `source` to `key` with the given content type and metadata.
    fn upload_content<'a>(
        &'a self,
        key: &'a str,
        source: UploadSource,
        content_type: &'a str,
        metadata: &'a ObjectMetadata,
    ) -> StoreFuture<'a, ()>;

    /// Return the user metadata attached to `key`.
    ///
    /// Fails with [`StoreError::NotFound`] when the object is absent.
    fn fetch_metadata<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ObjectMetadata>;

    /// Remove every key in `keys` with a single batched request.
    ///
    /// An empty list is a no-op.  Keys that are already absent are not
    /// errors.
    fn delete_objects<'a>(&'a self, keys: &'a [String]) -> StoreFuture<'a, ()>;
}
