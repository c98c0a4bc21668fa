//! Session-side error types.
//!
//! Engine construction errors come from `bw_engine::EngineError`; the types
//! here cover the host collaborators. None of them ever crash the session:
//! storage failures degrade to the next engine source or a skipped cache
//! write, and badge failures are swallowed entirely.

use bw_engine::TabId;
use thiserror::Error;

/// Durable key-value store failure.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("storage i/o failed: {0}")]
    Io(String),
}

/// Badge rendering failure. Best-effort UI only.
#[derive(Debug, Error)]
pub enum BadgeError {
    #[error("tab {0} no longer exists")]
    TabNotFound(TabId),
    #[error("badge backend failed: {0}")]
    Backend(String),
}
