//! BlockWarden Session Layer
//!
//! The long-lived background process of the extension. The filtering engine
//! itself is an opaque collaborator (see `bw-engine`); this crate owns what
//! sits around it: the engine's lifecycle across bootstrap and background
//! upgrades, the user's enable/disable toggle, per-tab counters of altered
//! requests, and the throttled badge that surfaces them.
//!
//! # Architecture
//!
//! A [`Session`] is an event loop around a [`SessionController`]. The host
//! platform (storage, bundled assets, badge chrome, event delivery) is
//! abstracted behind the traits in [`host`] and [`badge`], so the state
//! machine can be driven deterministically with synthetic events; the
//! in-memory implementations used for that double as the simulator's
//! backing.
//!
//! # Modules
//!
//! - `counter`: per-tab altered-request counters
//! - `badge`: throttled badge presenter and its debouncer
//! - `host`: host-platform collaborator traits and in-memory stand-ins
//! - `cache`: the persisted engine slot
//! - `config`: session tunables
//! - `controller`: the `Bootstrapping -> Active(enabled|disabled)` machine
//! - `session`: the event loop wiring it all together
//! - `error`: session-side error types
//!
//! [`Session`]: session::Session
//! [`SessionController`]: controller::SessionController

pub mod badge;
pub mod cache;
pub mod config;
pub mod controller;
pub mod counter;
pub mod error;
pub mod host;
pub mod session;

// Re-export commonly used types
pub use badge::{BadgePresenter, BadgeSink, Debouncer};
pub use config::SessionConfig;
pub use controller::{BlockingStatus, SessionController, SessionState};
pub use counter::BlockCounter;
pub use error::{BadgeError, StoreError};
pub use host::{BundledAssets, HostEvent, KeyValueStore};
pub use session::Session;
