//! Badge rendering with coalesced refreshes.
//!
//! A busy page can produce hundreds of counter updates per second; painting
//! the badge on each one would dominate the event loop. Refresh requests are
//! therefore coalesced: the first request arms a timer, requests within the
//! window are absorbed, and a single render happens at the deadline using
//! whatever the state is at that moment. Discrete user-facing events (tab
//! switch, toggle) bypass the window and paint immediately.

use std::sync::{Arc, Mutex};

use log::debug;
use tokio::time::{Duration, Instant};

use bw_engine::TabId;

use crate::error::BadgeError;

// =============================================================================
// BadgeSink
// =============================================================================

/// Renders onto the extension's visible chrome.
///
/// Implementations may fail (the target tab can vanish at any time); callers
/// in this module treat every failure as non-fatal.
pub trait BadgeSink: Send + Sync {
    /// Paint the altered-request count for a tab.
    fn set_count(&self, tab: TabId, count: u64) -> Result<(), BadgeError>;

    /// Reflect the blocking status on the icon.
    fn set_status(&self, enabled: bool) -> Result<(), BadgeError>;
}

// =============================================================================
// Debouncer
// =============================================================================

/// Arm/cancel/fire-once timer used to coalesce refresh requests.
///
/// Holds at most one pending deadline. `arm` while armed is a no-op — that
/// is the coalescing guarantee. The owner polls [`expired`] (typically from
/// a `select!` arm) and calls [`fire`] when it completes.
///
/// [`expired`]: Debouncer::expired
/// [`fire`]: Debouncer::fire
#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    deadline: Option<Instant>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            deadline: None,
        }
    }

    /// Arm the timer if idle. Requests while armed are absorbed into the
    /// pending deadline.
    pub fn arm(&mut self) {
        if self.deadline.is_none() {
            self.deadline = Some(Instant::now() + self.window);
        }
    }

    /// Disarm without firing.
    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    /// Disarm after the deadline completed.
    pub fn fire(&mut self) {
        self.deadline = None;
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Wait until the armed deadline. Pends forever while idle, so it is
    /// safe to poll from a `select!` arm without a guard.
    pub async fn expired(&self) {
        match self.deadline {
            Some(deadline) => tokio::time::sleep_until(deadline).await,
            None => std::future::pending().await,
        }
    }
}

// =============================================================================
// BadgePresenter
// =============================================================================

/// Throttled view of the counter state on the extension badge.
pub struct BadgePresenter {
    sink: Arc<dyn BadgeSink>,
    debouncer: Debouncer,
}

impl BadgePresenter {
    pub fn new(sink: Arc<dyn BadgeSink>, window: Duration) -> Self {
        Self {
            sink,
            debouncer: Debouncer::new(window),
        }
    }

    /// Request a badge re-render at the end of the coalescing window.
    pub fn schedule_refresh(&mut self) {
        self.debouncer.arm();
    }

    /// Paint immediately, bypassing (and cancelling) any pending refresh so
    /// the same state is not painted twice.
    pub fn render_now(&mut self, tab: TabId, count: u64) {
        self.debouncer.cancel();
        if let Err(e) = self.sink.set_count(tab, count) {
            debug!("badge render skipped: {e}");
        }
    }

    /// Reflect the blocking status on the icon. Immediate, never throttled.
    pub fn set_status(&self, enabled: bool) {
        if let Err(e) = self.sink.set_status(enabled) {
            debug!("badge status update skipped: {e}");
        }
    }

    /// Deadline of the pending refresh, if one is armed.
    pub fn deadline(&self) -> Option<Instant> {
        self.debouncer.deadline()
    }

    /// Paint at the end of a coalescing window, with the state current now
    /// rather than when the refresh was first requested.
    pub fn flush(&mut self, tab: TabId, count: u64) {
        self.debouncer.fire();
        if let Err(e) = self.sink.set_count(tab, count) {
            debug!("badge render skipped: {e}");
        }
    }
}

// =============================================================================
// RecordingSink
// =============================================================================

/// Sink that records every call. Used by tests and the trace simulator.
#[derive(Debug, Default)]
pub struct RecordingSink {
    renders: Mutex<Vec<(TabId, u64)>>,
    statuses: Mutex<Vec<bool>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn renders(&self) -> Vec<(TabId, u64)> {
        self.renders.lock().unwrap().clone()
    }

    pub fn statuses(&self) -> Vec<bool> {
        self.statuses.lock().unwrap().clone()
    }

    pub fn render_count(&self) -> usize {
        self.renders.lock().unwrap().len()
    }

    /// The most recently painted (tab, count), if anything was painted.
    pub fn last_render(&self) -> Option<(TabId, u64)> {
        self.renders.lock().unwrap().last().copied()
    }
}

impl BadgeSink for RecordingSink {
    fn set_count(&self, tab: TabId, count: u64) -> Result<(), BadgeError> {
        self.renders.lock().unwrap().push((tab, count));
        Ok(())
    }

    fn set_status(&self, enabled: bool) -> Result<(), BadgeError> {
        self.statuses.lock().unwrap().push(enabled);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingSink;

    impl BadgeSink for FailingSink {
        fn set_count(&self, tab: TabId, _count: u64) -> Result<(), BadgeError> {
            Err(BadgeError::TabNotFound(tab))
        }

        fn set_status(&self, _enabled: bool) -> Result<(), BadgeError> {
            Err(BadgeError::Backend("gone".to_string()))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_arms_coalesce_into_one_deadline() {
        let mut debouncer = Debouncer::new(Duration::from_millis(500));
        debouncer.arm();
        let deadline = debouncer.deadline().expect("should be armed");

        tokio::time::advance(Duration::from_millis(200)).await;
        debouncer.arm();
        debouncer.arm();
        assert_eq!(debouncer.deadline(), Some(deadline));

        debouncer.expired().await;
        debouncer.fire();
        assert!(!debouncer.is_armed());
    }

    #[tokio::test(start_paused = true)]
    async fn rearming_after_fire_starts_a_new_window() {
        let mut debouncer = Debouncer::new(Duration::from_millis(300));
        debouncer.arm();
        let first = debouncer.deadline().unwrap();
        debouncer.expired().await;
        debouncer.fire();

        debouncer.arm();
        let second = debouncer.deadline().unwrap();
        assert!(second > first);
    }

    #[tokio::test(start_paused = true)]
    async fn storm_of_refreshes_renders_once_with_latest_state() {
        let sink = Arc::new(RecordingSink::new());
        let mut presenter = BadgePresenter::new(
            Arc::clone(&sink) as Arc<dyn BadgeSink>,
            Duration::from_millis(500),
        );

        for _ in 0..20 {
            presenter.schedule_refresh();
        }
        assert_eq!(sink.render_count(), 0);

        presenter.deadline().expect("refresh should be pending");
        // The count painted is whatever the caller reads at flush time.
        presenter.flush(7, 20);
        assert_eq!(sink.renders(), vec![(7, 20)]);
        assert!(presenter.deadline().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn render_now_cancels_the_pending_refresh() {
        let sink = Arc::new(RecordingSink::new());
        let mut presenter = BadgePresenter::new(
            Arc::clone(&sink) as Arc<dyn BadgeSink>,
            Duration::from_millis(500),
        );

        presenter.schedule_refresh();
        presenter.render_now(3, 11);
        assert!(presenter.deadline().is_none());
        assert_eq!(sink.renders(), vec![(3, 11)]);
    }

    #[test]
    fn sink_failures_are_swallowed() {
        let mut presenter = BadgePresenter::new(Arc::new(FailingSink), Duration::from_millis(500));
        presenter.render_now(1, 5);
        presenter.set_status(true);
        presenter.flush(1, 6);
    }
}
