//! Host platform collaborators.
//!
//! The browser's storage, packaged assets, and event-delivery APIs are
//! modelled as narrow traits so the controller stays independent of any
//! particular host runtime and can be driven with synthetic events. The
//! in-memory implementations at the bottom back tests and the simulator.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::oneshot;

use bw_engine::{CosmeticsPayload, FrameDescriptor, RequestDescriptor, TabId, Verdict};

use crate::error::StoreError;

// =============================================================================
// Collaborator traits
// =============================================================================

/// Durable key-value store. Read once per process for the engine cache,
/// written once per successful upgrade. Writes replace the whole value.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;
    async fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError>;
}

/// Read-only access to binary resources shipped with the extension package.
pub trait BundledAssets: Send + Sync {
    /// The pre-built engine blob fixed at build time, if the package
    /// carries one.
    fn engine_blob(&self) -> Option<Vec<u8>>;
}

// =============================================================================
// Host events
// =============================================================================

/// One event delivered by the host platform, in arrival order.
///
/// `Request` and `Cosmetics` carry reply channels: the interception hook
/// needs a verdict back before the request leaves the client, and the
/// content script waits for its cosmetics response.
#[derive(Debug)]
pub enum HostEvent {
    /// The user switched to this tab.
    TabActivated(TabId),
    /// A tab started loading a new top-level document.
    NavigationStarted(TabId),
    TabClosed(TabId),
    /// A network request was intercepted before leaving the client.
    Request(RequestDescriptor, oneshot::Sender<Verdict>),
    /// A frame asked for its cosmetic filters over the message channel.
    Cosmetics(FrameDescriptor, oneshot::Sender<CosmeticsPayload>),
    /// Explicit user toggle of blocking.
    Toggle,
}

// =============================================================================
// In-memory implementations
// =============================================================================

/// In-memory key-value store. Optionally refuses writes, to exercise the
/// persist-failure path.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
    fail_writes: bool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// A store whose `set` always fails.
    pub fn failing_writes() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            fail_writes: true,
        }
    }

    /// Seed an entry, bypassing the async interface.
    pub fn insert(&self, key: &str, value: Vec<u8>) {
        self.entries.lock().unwrap().insert(key.to_string(), value);
    }

    /// Read an entry, bypassing the async interface.
    pub fn raw(&self, key: &str) -> Option<Vec<u8>> {
        self.entries.lock().unwrap().get(key).cloned()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.entries.lock().unwrap().get(key).cloned())
    }

    async fn set(&self, key: &str, value: &[u8]) -> Result<(), StoreError> {
        if self.fail_writes {
            return Err(StoreError::Io("write refused".to_string()));
        }
        self.entries
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }
}

/// Bundled assets backed by an optional in-memory blob. Counts reads so
/// tests can assert the bundled asset was not touched.
#[derive(Debug, Default)]
pub struct MemoryAssets {
    blob: Option<Vec<u8>>,
    reads: Mutex<usize>,
}

impl MemoryAssets {
    /// A package with no bundled engine.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_engine(blob: Vec<u8>) -> Self {
        Self {
            blob: Some(blob),
            reads: Mutex::new(0),
        }
    }

    /// Number of times the bundled blob was read.
    pub fn read_count(&self) -> usize {
        *self.reads.lock().unwrap()
    }
}

impl BundledAssets for MemoryAssets {
    fn engine_blob(&self) -> Option<Vec<u8>> {
        *self.reads.lock().unwrap() += 1;
        self.blob.clone()
    }
}
