//! In-process object store.

use super::{ObjectStore, PutOptions, StoreError, StoredObject, chunks, join_url};
use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, PoisonError};

const BASE_URL: &str = "memory://objects";
const CHUNK_SIZE: usize = 64 * 1024;

/// One stored object with the options it was written with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryObject {
    pub body: Bytes,
    pub content_type: &'static str,
    pub public_read: bool,
}

/// Map-backed store. Keys listed in `rejected` fail with
/// [`StoreError::Rejected`] so tests can exercise store failures.
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: Mutex<HashMap<String, MemoryObject>>,
    rejected: HashSet<String>,
}

impl MemoryStore {
    pub fn with_rejected<I, S>(keys: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            objects: Mutex::default(),
            rejected: keys.into_iter().map(Into::into).collect(),
        }
    }

    pub fn get(&self, key: &str) -> Option<MemoryObject> {
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

    /// Stored keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn put(
        &self,
        key: &str,
        body: Bytes,
        options: &PutOptions,
    ) -> Result<StoredObject, StoreError> {
        if self.rejected.contains(key) {
            return Err(StoreError::Rejected(format!("key {key} is not writable")));
        }

        let mut buf = BytesMut::with_capacity(body.len());
        let mut sent = 0u64;
        for chunk in chunks(&body, CHUNK_SIZE) {
            sent += chunk.len() as u64;
            buf.extend_from_slice(&chunk);
        }

        self.objects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                key.to_string(),
                MemoryObject {
                    body: buf.freeze(),
                    content_type: options.content_type,
                    public_read: options.public_read,
                },
            );

        Ok(StoredObject {
            url: join_url(BASE_URL, key),
            bytes_transferred: sent,
        })
    }
}
