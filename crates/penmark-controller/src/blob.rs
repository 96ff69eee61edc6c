use std::{
    collections::HashMap,
    fmt,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use tracing::debug;
use uuid::Uuid;

/// Locally resolvable address of a registered blob.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlobUrl(Uuid);

impl fmt::Display for BlobUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "blob:penmark/{}", self.0)
    }
}

/// Table of live blobs. Entries exist exactly as long as their handle.
#[derive(Clone, Default)]
pub struct BlobRegistry {
    entries: Arc<Mutex<HashMap<BlobUrl, Arc<[u8]>>>>,
}

impl BlobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create(&self, bytes: Vec<u8>) -> BlobHandle {
        let url = BlobUrl(Uuid::new_v4());
        let bytes: Arc<[u8]> = bytes.into();
        self.entries().insert(url, bytes.clone());
        debug!("Registered {} ({} bytes)", url, bytes.len());
        BlobHandle {
            url,
            bytes,
            registry: self.clone(),
        }
    }

    pub fn resolve(&self, url: &BlobUrl) -> Option<Arc<[u8]>> {
        self.entries().get(url).cloned()
    }

    pub fn live_count(&self) -> usize {
        self.entries().len()
    }

    fn revoke(&self, url: &BlobUrl) -> bool {
        self.entries().remove(url).is_some()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<BlobUrl, Arc<[u8]>>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Owning reference to a registered blob; dropping it revokes the URL.
pub struct BlobHandle {
    url: BlobUrl,
    bytes: Arc<[u8]>,
    registry: BlobRegistry,
}

impl BlobHandle {
    pub fn url(&self) -> BlobUrl {
        self.url
    }

    pub fn bytes(&self) -> Arc<[u8]> {
        self.bytes.clone()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for BlobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlobHandle")
            .field("url", &self.url.to_string())
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl Drop for BlobHandle {
    fn drop(&mut self) {
        if self.registry.revoke(&self.url) {
            debug!("Revoked {}", self.url);
        }
    }
}
