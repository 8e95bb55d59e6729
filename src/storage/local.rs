//! Filesystem object store.
//!
//! Objects land at `root/key`. Each write goes to a sibling temp file first
//! and is renamed into place, so readers never see a partial object and the
//! last rename wins. A write that fails or is dropped removes its temp file.

use super::cleanup::CleanupGuard;
use super::{ObjectStore, PutOptions, StoreError, StoredObject, chunks, join_url};
use async_trait::async_trait;
use bytes::Bytes;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::warn;

const CHUNK_SIZE: usize = 64 * 1024;

/// Temp-file suffix counter; keeps concurrent writers to one key apart.
static WRITE_SEQ: AtomicU64 = AtomicU64::new(0);

pub struct LocalStore {
    root: PathBuf,
    public_base_url: String,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>, public_base_url: &str) -> Self {
        Self {
            root: root.into(),
            public_base_url: public_base_url.to_string(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve `key` under the root, refusing anything that escapes it.
    fn object_path(&self, key: &str) -> Result<PathBuf, StoreError> {
        let relative = Path::new(key);
        let safe = !key.is_empty()
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !safe {
            return Err(StoreError::Rejected(format!("invalid object key: {key}")));
        }
        Ok(self.root.join(relative))
    }
}

/// Remove `path` on drop. Runs synchronously since `Drop` cannot await.
fn remove_on_drop(path: PathBuf) -> CleanupGuard {
    CleanupGuard::new(move || match std::fs::remove_file(&path) {
        Ok(()) => {}
        Err(e) if e.kind() == IoErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "failed to remove temp file"),
    })
}

fn io_error(path: &Path, err: std::io::Error) -> StoreError {
    let message = format!("{}: {err}", path.display());
    match err.kind() {
        IoErrorKind::PermissionDenied | IoErrorKind::StorageFull | IoErrorKind::ReadOnlyFilesystem => {
            StoreError::Rejected(message)
        }
        _ => StoreError::Unavailable(message),
    }
}

#[async_trait]
impl ObjectStore for LocalStore {
    fn name(&self) -> &'static str {
        "local"
    }

    async fn put(
        &self,
        key: &str,
        body: Bytes,
        _options: &PutOptions,
    ) -> Result<StoredObject, StoreError> {
        let path = self.object_path(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| io_error(parent, e))?;
        }

        let seq = WRITE_SEQ.fetch_add(1, Ordering::Relaxed);
        let tmp = path.with_extension(format!("part-{}-{seq}", std::process::id()));
        let cleanup = remove_on_drop(tmp.clone());

        let written = async {
            let mut file = fs::File::create(&tmp).await?;
            let mut sent = 0u64;
            for chunk in chunks(&body, CHUNK_SIZE) {
                file.write_all(&chunk).await?;
                sent += chunk.len() as u64;
            }
            file.sync_all().await?;
            Ok::<_, std::io::Error>(sent)
        }
        .await;

        let sent = written.map_err(|e| io_error(&tmp, e))?;
        fs::rename(&tmp, &path)
            .await
            .map_err(|e| io_error(&path, e))?;
        cleanup.disarm();

        Ok(StoredObject {
            url: join_url(&self.public_base_url, key),
            bytes_transferred: sent,
        })
    }
}
