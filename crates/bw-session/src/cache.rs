//! Persisted engine cache.
//!
//! One durable slot under a fixed key: read at most once, at startup, and
//! written after each successful upgrade. The stored bytes are
//! envelope-framed, so a corrupt or stale-format entry is caught here and
//! never handed to the engine collaborator. There is a single writer and
//! writes replace the whole value, so no read-modify-write races exist.

use std::sync::Arc;

use thiserror::Error;

use bw_engine::{EngineError, EngineFactory, EngineHandle};

use crate::error::StoreError;
use crate::host::KeyValueStore;

/// Why a cached engine could not be used. Callers fall back to the next
/// engine source either way; the variant only changes what gets logged.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// The cache slot for the serialized engine.
pub struct EngineCache {
    store: Arc<dyn KeyValueStore>,
    key: String,
}

impl EngineCache {
    pub fn new(store: Arc<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        Self {
            store,
            key: key.into(),
        }
    }

    /// Load and validate the cached engine. `Ok(None)` means the slot is
    /// empty; `Err` means it exists but is unusable.
    pub async fn load(&self, factory: &dyn EngineFactory) -> Result<Option<EngineHandle>, CacheError> {
        match self.store.get(&self.key).await? {
            Some(blob) => Ok(Some(EngineHandle::from_blob(factory, &blob)?)),
            None => Ok(None),
        }
    }

    /// Persist a handle's serialized form into the slot.
    pub async fn store(&self, handle: &EngineHandle) -> Result<(), StoreError> {
        self.store.set(&self.key, &handle.serialize()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bw_engine::stub::{StaticEngine, StaticFactory};

    #[tokio::test]
    async fn empty_slot_loads_as_none() {
        let store = Arc::new(crate::host::MemoryStore::new());
        let cache = EngineCache::new(store, "engine/cached-blob");
        let loaded = cache.load(&StaticFactory::new()).await.expect("load should succeed");
        assert!(loaded.is_none());
    }

    #[tokio::test]
    async fn stores_and_reloads_a_handle() {
        let store = Arc::new(crate::host::MemoryStore::new());
        let cache = EngineCache::new(Arc::clone(&store) as Arc<dyn KeyValueStore>, "engine/cached-blob");

        let engine = StaticEngine::new().block("https://ads.example.com/a.js");
        let handle = EngineHandle::from_engine(Arc::new(engine));
        cache.store(&handle).await.expect("store should succeed");

        let reloaded = cache
            .load(&StaticFactory::new())
            .await
            .expect("load should succeed")
            .expect("slot should be filled");
        assert!(!reloaded.ptr_eq(&handle));
        assert_eq!(reloaded.serialize(), handle.serialize());
    }

    #[tokio::test]
    async fn garbage_in_the_slot_is_an_error() {
        let store = Arc::new(crate::host::MemoryStore::new());
        store.insert("engine/cached-blob", b"not an envelope".to_vec());
        let cache = EngineCache::new(store, "engine/cached-blob");

        let err = cache.load(&StaticFactory::new()).await.unwrap_err();
        assert!(matches!(err, CacheError::Engine(EngineError::CorruptData)));
    }
}
