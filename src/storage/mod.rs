//! Object storage: where converted images end up.
//!
//! [`ObjectStore`] is the seam between the pipeline and a concrete store:
//!
//! | Backend | Module | Use |
//! |---|---|---|
//! | S3 (and compatibles) | [`s3`] | production |
//! | Local directory | [`local`] | single-host deployments, served under `/uploads` |
//! | In-memory map | [`memory`] | tests and `convert --dry-run` |
//!
//! Every backend counts the bytes it actually wrote and reports them as
//! [`StoredObject::bytes_transferred`]. The [`Uploader`] checks that count
//! against the encoded length, so a response can never carry a size taken
//! from some other byte source.
//!
//! Backends that stage data (temp files, multipart uploads) undo it through
//! a `CleanupGuard` when a write is dropped before it finishes.

mod cleanup;
pub mod local;
pub mod memory;
pub mod s3;

use crate::config::{StorageBackend, StorageConfig};
use crate::imaging::OutputFormat;
use crate::types::ErrorKind;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, info};

pub use local::LocalStore;
pub use memory::MemoryStore;
pub use s3::S3Store;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Connection, timeout or credential failure.
    #[error("object store unavailable: {0}")]
    Unavailable(String),
    /// The store answered and refused the write (permissions, quota, bad key).
    #[error("object store rejected the write: {0}")]
    Rejected(String),
    /// The backend wrote a different number of bytes than it was given.
    #[error("upload truncated: expected {expected} bytes, sent {sent}")]
    Truncated { expected: u64, sent: u64 },
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Unavailable(_) => ErrorKind::StoreUnavailable,
            Self::Rejected(_) => ErrorKind::StoreRejected,
            Self::Truncated { .. } => ErrorKind::InternalError,
        }
    }
}

/// Per-object write options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PutOptions {
    pub content_type: &'static str,
    pub public_read: bool,
}

/// A durably written object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub url: String,
    /// Bytes the backend counted while writing.
    pub bytes_transferred: u64,
}

/// A place converted images can be written to.
///
/// Writes to one key are individually atomic; concurrent writes to the same
/// key resolve last-writer-wins.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Short backend name for logs.
    fn name(&self) -> &'static str;

    async fn put(
        &self,
        key: &str,
        body: Bytes,
        options: &PutOptions,
    ) -> Result<StoredObject, StoreError>;
}

/// Split a body into zero-copy chunks of at most `size` bytes.
pub fn chunks(body: &Bytes, size: usize) -> impl Iterator<Item = Bytes> + '_ {
    let size = size.max(1);
    (0..body.len())
        .step_by(size)
        .map(move |start| body.slice(start..(start + size).min(body.len())))
}

/// Join a base URL and a key with exactly one slash.
pub fn join_url(base: &str, key: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        key.trim_start_matches('/')
    )
}

/// Build the configured store.
pub async fn create_store(config: &StorageConfig) -> Result<Arc<dyn ObjectStore>, StoreError> {
    let store: Arc<dyn ObjectStore> = match config.backend {
        StorageBackend::S3 => Arc::new(S3Store::from_config(&config.s3).await),
        StorageBackend::Local => Arc::new(LocalStore::new(
            &config.local.root,
            &config.local.public_base_url,
        )),
        StorageBackend::Memory => Arc::new(MemoryStore::default()),
    };
    debug!(backend = store.name(), "object store ready");
    Ok(store)
}

/// Bounded-concurrency front for an [`ObjectStore`].
///
/// At most `max_concurrent` uploads run at once across all batches sharing
/// this uploader.
#[derive(Clone)]
pub struct Uploader {
    store: Arc<dyn ObjectStore>,
    permits: Arc<Semaphore>,
    public_read: bool,
}

impl Uploader {
    pub fn new(store: Arc<dyn ObjectStore>, max_concurrent: usize, public_read: bool) -> Self {
        Self {
            store,
            permits: Arc::new(Semaphore::new(max_concurrent.max(1))),
            public_read,
        }
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// Write `body` under `key` and return where it can be fetched.
    pub async fn upload(
        &self,
        key: &str,
        body: Bytes,
        format: OutputFormat,
    ) -> Result<StoredObject, StoreError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|_| StoreError::Unavailable("upload limiter closed".into()))?;

        let expected = body.len() as u64;
        let options = PutOptions {
            content_type: format.mime_type(),
            public_read: self.public_read,
        };
        let stored = self.store.put(key, body, &options).await?;

        if stored.bytes_transferred != expected {
            return Err(StoreError::Truncated {
                expected,
                sent: stored.bytes_transferred,
            });
        }

        info!(
            key,
            bytes = expected,
            store = self.store.name(),
            "uploaded"
        );
        Ok(stored)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Store that claims to have written one byte less than it was given.
    struct ShortStore;

    #[async_trait]
    impl ObjectStore for ShortStore {
        fn name(&self) -> &'static str {
            "short"
        }

        async fn put(
            &self,
            key: &str,
            body: Bytes,
            _options: &PutOptions,
        ) -> Result<StoredObject, StoreError> {
            Ok(StoredObject {
                url: format!("mem://{key}"),
                bytes_transferred: body.len().saturating_sub(1) as u64,
            })
        }
    }

    #[test]
    fn chunks_cover_body_exactly() {
        let body = Bytes::from(vec![7u8; 10]);
        let parts: Vec<Bytes> = chunks(&body, 4).collect();
        let sizes: Vec<usize> = parts.iter().map(Bytes::len).collect();
        assert_eq!(sizes, vec![4, 4, 2]);
        assert_eq!(parts.concat(), body.to_vec());
    }

    #[test]
    fn chunks_of_empty_body() {
        assert_eq!(chunks(&Bytes::new(), 4).count(), 0);
    }

    #[test]
    fn join_url_normalizes_slashes() {
        assert_eq!(join_url("http://h/uploads/", "a.webp"), "http://h/uploads/a.webp");
        assert_eq!(join_url("http://h", "/a.webp"), "http://h/a.webp");
    }

    #[test]
    fn store_error_kinds() {
        assert_eq!(
            StoreError::Unavailable("x".into()).kind(),
            ErrorKind::StoreUnavailable
        );
        assert_eq!(
            StoreError::Rejected("x".into()).kind(),
            ErrorKind::StoreRejected
        );
        assert_eq!(
            StoreError::Truncated {
                expected: 2,
                sent: 1
            }
            .kind(),
            ErrorKind::InternalError
        );
    }

    #[tokio::test]
    async fn uploader_sets_content_type_and_counts_bytes() {
        let store = Arc::new(MemoryStore::default());
        let uploader = Uploader::new(store.clone(), 2, true);

        let stored = uploader
            .upload("a.webp", Bytes::from_static(b"12345"), OutputFormat::Webp)
            .await
            .unwrap();

        assert_eq!(stored.bytes_transferred, 5);
        let object = store.get("a.webp").unwrap();
        assert_eq!(object.content_type, "image/webp");
        assert!(object.public_read);
    }

    #[tokio::test]
    async fn uploader_rejects_short_writes() {
        let uploader = Uploader::new(Arc::new(ShortStore), 1, false);
        let err = uploader
            .upload("a.png", Bytes::from_static(b"abc"), OutputFormat::Png)
            .await
            .unwrap_err();
        assert_eq!(
            err,
            StoreError::Truncated {
                expected: 3,
                sent: 2
            }
        );
    }

    #[tokio::test]
    async fn create_store_memory_backend() {
        let config = StorageConfig {
            backend: StorageBackend::Memory,
            ..StorageConfig::default()
        };
        let store = create_store(&config).await.unwrap();
        assert_eq!(store.name(), "memory");
    }
}
