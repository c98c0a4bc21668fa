//! Engine handle lifecycle.
//!
//! The actual filtering logic — list parsing, URL matching, cosmetic rule
//! lookup — lives behind the `FilterEngine` and `EngineFactory` collaborator
//! traits. This module owns only the invariants the session layer needs on
//! top of them: a reference-counted, immutable handle with a build number
//! for logging, envelope validation on the blob path, and a safe always-allow
//! default for when no real engine data is available.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use log::debug;
use thiserror::Error;

use crate::envelope;
use crate::source::{ListFetcher, ListSource};
use crate::types::{CosmeticsPayload, FrameDescriptor, RequestDescriptor, Verdict};

// =============================================================================
// Errors
// =============================================================================

/// Error type for engine construction.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A cached or bundled blob is malformed or failed its integrity check
    #[error("corrupt engine data")]
    CorruptData,
    /// The blob envelope carries a version this build does not understand
    #[error("unsupported engine blob version: {0}")]
    UnsupportedVersion(u16),
    #[error("failed to fetch filter sources: {0}")]
    SourceFetch(String),
    #[error("failed to parse filter sources: {0}")]
    SourceParse(String),
}

// =============================================================================
// Collaborator traits
// =============================================================================

/// One compiled instance of the filtering engine.
///
/// `decide` and `cosmetics_for` are pure with respect to session state and
/// must never perform I/O; they sit on the hot path of every request. The
/// instance is held for the process lifetime and queried at high frequency.
pub trait FilterEngine: Send + Sync + std::fmt::Debug {
    /// Judge a network request.
    fn decide(&self, request: &RequestDescriptor) -> Verdict;

    /// Produce stylesheet/script directives for a frame.
    fn cosmetics_for(&self, frame: &FrameDescriptor) -> CosmeticsPayload;

    /// Snapshot the compiled state to bytes (without envelope framing).
    fn serialize(&self) -> Vec<u8>;
}

/// Constructs engine instances from serialized state or raw filter lists.
#[async_trait]
pub trait EngineFactory: Send + Sync {
    /// Rebuild an engine from a previously serialized payload.
    fn deserialize(&self, payload: &[u8]) -> Result<Arc<dyn FilterEngine>, EngineError>;

    /// Fetch and compile raw filter lists into a fresh engine.
    async fn build(
        &self,
        sources: &[ListSource],
        fetcher: &dyn ListFetcher,
    ) -> Result<Arc<dyn FilterEngine>, EngineError>;
}

// =============================================================================
// EngineHandle
// =============================================================================

/// Process-local build numbering for handles, 0 reserved for `empty()`.
static NEXT_BUILD: AtomicU32 = AtomicU32::new(1);

/// One immutable, versioned instance of the filtering engine.
///
/// Cloning is cheap (shared `Arc`); identity is observable via [`ptr_eq`],
/// which the swap tests rely on.
///
/// [`ptr_eq`]: EngineHandle::ptr_eq
#[derive(Clone)]
pub struct EngineHandle {
    engine: Arc<dyn FilterEngine>,
    build: u32,
}

impl EngineHandle {
    /// A handle that allows everything and injects nothing. Safe default
    /// before any real engine data is available.
    pub fn empty() -> Self {
        Self {
            engine: Arc::new(NullEngine),
            build: 0,
        }
    }

    /// Wrap an already constructed engine instance.
    pub fn from_engine(engine: Arc<dyn FilterEngine>) -> Self {
        Self {
            engine,
            build: NEXT_BUILD.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// Rebuild a handle from an envelope-framed blob (cache or bundled
    /// asset). Fails with [`EngineError::CorruptData`] or
    /// [`EngineError::UnsupportedVersion`] without touching the factory if
    /// the envelope is bad.
    pub fn from_blob(factory: &dyn EngineFactory, blob: &[u8]) -> Result<Self, EngineError> {
        let payload = envelope::open(blob)?;
        Ok(Self::from_engine(factory.deserialize(payload)?))
    }

    /// Build a fresh handle from raw filter-list sources. Suspends on
    /// network fetches; may take seconds.
    pub async fn from_sources(
        factory: &dyn EngineFactory,
        sources: &[ListSource],
        fetcher: &dyn ListFetcher,
    ) -> Result<Self, EngineError> {
        let engine = factory.build(sources, fetcher).await?;
        debug!("compiled engine from {} filter lists", sources.len());
        Ok(Self::from_engine(engine))
    }

    /// Judge a network request. Synchronous, no I/O.
    pub fn decide(&self, request: &RequestDescriptor) -> Verdict {
        self.engine.decide(request)
    }

    /// Cosmetic directives for a frame. Synchronous, no I/O.
    pub fn cosmetics_for(&self, frame: &FrameDescriptor) -> CosmeticsPayload {
        self.engine.cosmetics_for(frame)
    }

    /// Envelope-framed snapshot suitable for [`from_blob`].
    ///
    /// [`from_blob`]: EngineHandle::from_blob
    pub fn serialize(&self) -> Vec<u8> {
        envelope::seal(&self.engine.serialize())
    }

    /// Process-local build number, 0 for the empty handle.
    pub fn build(&self) -> u32 {
        self.build
    }

    /// True for the always-allow placeholder handle.
    pub fn is_empty(&self) -> bool {
        self.build == 0
    }

    /// Identity comparison: do both handles wrap the same engine instance?
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.engine, &other.engine)
    }
}

impl fmt::Debug for EngineHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineHandle")
            .field("build", &self.build)
            .finish()
    }
}

/// The engine behind `EngineHandle::empty()`.
#[derive(Debug)]
struct NullEngine;

impl FilterEngine for NullEngine {
    fn decide(&self, _request: &RequestDescriptor) -> Verdict {
        Verdict::Allow
    }

    fn cosmetics_for(&self, _frame: &FrameDescriptor) -> CosmeticsPayload {
        CosmeticsPayload::none()
    }

    fn serialize(&self) -> Vec<u8> {
        Vec::new()
    }
}
