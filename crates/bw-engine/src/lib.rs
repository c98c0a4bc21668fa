//! BlockWarden Engine Layer
//!
//! The session controller treats the filtering engine as an opaque
//! collaborator: something that can judge a request, produce cosmetics for a
//! frame, and snapshot itself to bytes. This crate defines that boundary.
//!
//! # Modules
//!
//! - `types`: wire types (verdicts, request/frame descriptors, cosmetics)
//! - `engine`: collaborator traits and the versioned `EngineHandle` wrapper
//! - `envelope`: durable framing for serialized engines (cache and bundle)
//! - `source`: filter-list sources and the network fetch collaborator
//! - `stub`: deterministic engine used by tests and the trace simulator

pub mod engine;
pub mod envelope;
pub mod source;
pub mod stub;
pub mod types;

// Re-export commonly used types
pub use engine::{EngineError, EngineFactory, EngineHandle, FilterEngine};
pub use source::{FetchError, ListFetcher, ListFormat, ListSource};
pub use types::{
    CosmeticsPayload, FrameDescriptor, RequestDescriptor, ResourceKind, ScriptletInjection, TabId,
    Verdict,
};
