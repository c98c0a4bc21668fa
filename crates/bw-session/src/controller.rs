//! Session controller state machine.
//!
//! Owns the active engine slot and the user's blocking status, and keeps
//! both consistent across asynchronous engine upgrades: an upgrade swap
//! never flips the status, and a disabled session stays inert no matter how
//! fresh its engine is. All request handling is synchronous; only the
//! bootstrap and cache-persist paths suspend. The event loop in `session`
//! runs handlers to completion in arrival order, which is what makes the
//! swap atomic with respect to request evaluation.

use std::sync::Arc;

use log::{debug, info, warn};
use tokio::time::Instant;

use bw_engine::{
    CosmeticsPayload, EngineError, EngineFactory, EngineHandle, FrameDescriptor,
    RequestDescriptor, TabId, Verdict,
};

use crate::badge::{BadgePresenter, BadgeSink};
use crate::cache::EngineCache;
use crate::config::SessionConfig;
use crate::counter::BlockCounter;
use crate::host::{BundledAssets, HostEvent, KeyValueStore};

// =============================================================================
// States
// =============================================================================

/// The user's explicit blocking posture. Never changed by an engine swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockingStatus {
    Enabled,
    Disabled,
}

/// Lifecycle state of the controller. There is no terminal state; the
/// controller lives as long as the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No engine activated yet; blocking affordances are shown disabled so
    /// the UI never implies protection before an engine is loaded.
    Bootstrapping,
    Active(BlockingStatus),
}

// =============================================================================
// SessionController
// =============================================================================

pub struct SessionController {
    state: SessionState,
    /// The active engine slot. Exactly one handle at a time; replaced
    /// wholesale by an upgrade swap.
    engine: EngineHandle,
    counters: BlockCounter,
    badge: BadgePresenter,
    cache: EngineCache,
    bundled: Arc<dyn BundledAssets>,
    factory: Arc<dyn EngineFactory>,
    active_tab: TabId,
}

impl SessionController {
    pub fn new(
        config: &SessionConfig,
        factory: Arc<dyn EngineFactory>,
        store: Arc<dyn KeyValueStore>,
        bundled: Arc<dyn BundledAssets>,
        badge_sink: Arc<dyn BadgeSink>,
    ) -> Self {
        Self {
            state: SessionState::Bootstrapping,
            engine: EngineHandle::empty(),
            counters: BlockCounter::new(),
            badge: BadgePresenter::new(badge_sink, config.badge_window()),
            cache: EngineCache::new(store, config.cache_key.clone()),
            bundled,
            factory,
            active_tab: -1,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn active_engine(&self) -> &EngineHandle {
        &self.engine
    }

    pub fn counters(&self) -> &BlockCounter {
        &self.counters
    }

    fn blocking_enabled(&self) -> bool {
        self.state == SessionState::Active(BlockingStatus::Enabled)
    }

    // =========================================================================
    // Bootstrap
    // =========================================================================

    /// Obtain and activate an initial engine, in order of preference:
    /// cached blob, bundled blob, empty handle. Never fails — the worst
    /// case is a session that allows everything until the upgrade lands.
    pub async fn bootstrap(&mut self) {
        self.badge.set_status(false);

        let mut handle = match self.cache.load(self.factory.as_ref()).await {
            Ok(Some(handle)) => {
                info!("activated cached engine (build {})", handle.build());
                Some(handle)
            }
            Ok(None) => {
                debug!("engine cache is empty");
                None
            }
            Err(e) => {
                warn!("cached engine unusable, falling back: {e}");
                None
            }
        };

        if handle.is_none() {
            handle = self.load_bundled();
        }

        self.engine = handle.unwrap_or_else(|| {
            warn!("no engine source available, starting with the empty handle");
            EngineHandle::empty()
        });
        self.state = SessionState::Active(BlockingStatus::Enabled);
        self.badge.set_status(true);
        self.render_active_badge();
    }

    fn load_bundled(&self) -> Option<EngineHandle> {
        let blob = self.bundled.engine_blob()?;
        match EngineHandle::from_blob(self.factory.as_ref(), &blob) {
            Ok(handle) => {
                info!("activated bundled engine (build {})", handle.build());
                Some(handle)
            }
            Err(e) => {
                warn!("bundled engine unusable, falling back: {e}");
                None
            }
        }
    }

    // =========================================================================
    // Upgrade swap
    // =========================================================================

    /// Install a freshly built or loaded engine as the active handle:
    /// activate-new, then retire-old. The previous handle's side effects
    /// end when it is dropped here. BlockingStatus is never modified; while
    /// disabled the new handle just waits for the next enable.
    pub fn install_engine(&mut self, handle: EngineHandle) {
        let old = std::mem::replace(&mut self.engine, handle);
        info!(
            "engine swapped: build {} -> build {}",
            old.build(),
            self.engine.build()
        );
    }

    /// Complete a background upgrade attempt. On success, swap and persist
    /// the new engine; a failed persist keeps the in-memory swap. On
    /// failure, keep the current handle — no retry is scheduled here.
    pub async fn finish_upgrade(&mut self, outcome: Result<EngineHandle, EngineError>) {
        match outcome {
            Ok(handle) => {
                self.install_engine(handle);
                if let Err(e) = self.cache.store(&self.engine).await {
                    warn!("failed to persist upgraded engine: {e}");
                }
            }
            Err(e) => {
                warn!("background engine upgrade failed: {e}");
            }
        }
    }

    // =========================================================================
    // Event handling
    // =========================================================================

    /// Process one host event. Called strictly in arrival order.
    pub fn handle_event(&mut self, event: HostEvent) {
        match event {
            HostEvent::TabActivated(tab) => {
                self.active_tab = tab;
                // Low-frequency, high-salience: paint immediately.
                self.render_active_badge();
            }
            HostEvent::NavigationStarted(tab) => {
                self.counters.reset(tab);
                if self.blocking_enabled() {
                    self.badge.schedule_refresh();
                }
            }
            HostEvent::TabClosed(tab) => {
                self.counters.forget(tab);
            }
            HostEvent::Request(request, reply) => {
                let verdict = self.handle_request(&request);
                // The host may have given up waiting; nothing to do then.
                let _ = reply.send(verdict);
            }
            HostEvent::Cosmetics(frame, reply) => {
                let _ = reply.send(self.cosmetics(&frame));
            }
            HostEvent::Toggle => self.toggle(),
        }
    }

    /// Judge one intercepted request and update the tab's counter.
    pub fn handle_request(&mut self, request: &RequestDescriptor) -> Verdict {
        let counted_tab = request.tab_id >= 0;

        // A new top-level document starts from zero regardless of the
        // verdict for the navigation request itself, and regardless of the
        // blocking status, so a later enable shows coherent counts.
        if request.is_main_frame() && counted_tab {
            self.counters.reset(request.tab_id);
        }

        if !self.blocking_enabled() {
            return Verdict::Allow;
        }

        let verdict = self.engine.decide(request);
        if verdict.is_altered() && counted_tab {
            self.counters.increment(request.tab_id);
        }
        if counted_tab && (request.is_main_frame() || verdict.is_altered()) {
            self.badge.schedule_refresh();
        }
        verdict
    }

    /// Header-phase interception for main-frame responses: a second chance
    /// to cancel a document load once response headers are known.
    pub fn handle_response_headers(&mut self, request: &RequestDescriptor) -> Verdict {
        if !self.blocking_enabled() {
            return Verdict::Allow;
        }
        self.engine.decide(request)
    }

    /// Cosmetic directives for a frame; neutral while disabled or still
    /// bootstrapping.
    pub fn cosmetics(&self, frame: &FrameDescriptor) -> CosmeticsPayload {
        if !self.blocking_enabled() {
            return CosmeticsPayload::none();
        }
        self.engine.cosmetics_for(frame)
    }

    /// Flip the blocking status. The badge reflects the change immediately;
    /// the engine slot is untouched either way.
    pub fn toggle(&mut self) {
        match self.state {
            SessionState::Bootstrapping => {
                debug!("toggle ignored while bootstrapping");
            }
            SessionState::Active(BlockingStatus::Enabled) => {
                self.state = SessionState::Active(BlockingStatus::Disabled);
                info!("blocking disabled");
                self.badge.set_status(false);
                self.render_active_badge();
            }
            SessionState::Active(BlockingStatus::Disabled) => {
                self.state = SessionState::Active(BlockingStatus::Enabled);
                info!("blocking enabled");
                self.badge.set_status(true);
                self.render_active_badge();
            }
        }
    }

    // =========================================================================
    // Badge
    // =========================================================================

    /// Deadline of the pending coalesced badge refresh, if one is armed.
    pub fn badge_deadline(&self) -> Option<Instant> {
        self.badge.deadline()
    }

    /// Paint the badge at the end of a coalescing window, using the state
    /// current now rather than when the refresh was first requested.
    pub fn flush_badge(&mut self) {
        let count = self.display_count();
        self.badge.flush(self.active_tab, count);
    }

    fn render_active_badge(&mut self) {
        let count = self.display_count();
        self.badge.render_now(self.active_tab, count);
    }

    /// What the badge should show for the active tab: the real count while
    /// enabled, neutral zero otherwise.
    fn display_count(&self) -> u64 {
        if self.blocking_enabled() {
            self.counters.get(self.active_tab)
        } else {
            0
        }
    }
}
