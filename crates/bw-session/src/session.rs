//! Session event loop.
//!
//! Wires a controller to the host event channel and the timers around it:
//! the badge coalescing deadline, the delayed background upgrade, and the
//! completion of the upgrade build task. The loop is single-threaded and
//! strictly sequential — every handler runs to completion before the next
//! event is looked at, which is what the swap atomicity and the per-tab
//! counter ordering guarantees lean on. The upgrade build itself runs on a
//! separate task so a slow fetch never stalls request handling.

use std::sync::Arc;

use log::{debug, info};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{self, Duration, Instant};

use bw_engine::{EngineError, EngineFactory, EngineHandle, ListFetcher, ListSource};

use crate::badge::BadgeSink;
use crate::config::SessionConfig;
use crate::controller::SessionController;
use crate::host::{BundledAssets, HostEvent, KeyValueStore};

/// Capacity of the host event channel. Deliveries beyond this apply
/// backpressure to the host glue rather than growing without bound.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Stand-in deadline for disarmed timer branches; never reached because
/// those branches are guarded.
fn idle_deadline() -> Instant {
    Instant::now() + Duration::from_secs(3600)
}

/// One running session: a controller plus the plumbing that feeds it.
///
/// Lifecycle: [`create`] builds the session and hands back the event
/// sender, [`run`] drives it, and dropping every sender disposes it —
/// `run` then returns the controller so a shutting-down host can drain
/// final state. No global state anywhere; any number of sessions can
/// coexist in one process.
///
/// [`create`]: Session::create
/// [`run`]: Session::run
pub struct Session {
    controller: SessionController,
    events: mpsc::Receiver<HostEvent>,
    factory: Arc<dyn EngineFactory>,
    fetcher: Arc<dyn ListFetcher>,
    config: SessionConfig,
}

impl Session {
    /// Create a session and the sender half the host glue delivers events
    /// through. Nothing happens until [`run`].
    ///
    /// [`run`]: Session::run
    pub fn create(
        config: SessionConfig,
        factory: Arc<dyn EngineFactory>,
        fetcher: Arc<dyn ListFetcher>,
        store: Arc<dyn KeyValueStore>,
        bundled: Arc<dyn BundledAssets>,
        badge_sink: Arc<dyn BadgeSink>,
    ) -> (Self, mpsc::Sender<HostEvent>) {
        let (sender, events) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let controller =
            SessionController::new(&config, Arc::clone(&factory), store, bundled, badge_sink);
        (
            Self {
                controller,
                events,
                factory,
                fetcher,
                config,
            },
            sender,
        )
    }

    /// Bootstrap, then process events until every sender is gone.
    pub async fn run(mut self) -> SessionController {
        self.controller.bootstrap().await;

        let mut upgrade_at = if self.config.list_sources.is_empty() {
            debug!("no list sources configured; background upgrade disabled");
            None
        } else {
            Some(Instant::now() + self.config.upgrade_delay())
        };
        let mut upgrade_task: Option<JoinHandle<Result<EngineHandle, EngineError>>> = None;

        loop {
            let badge_deadline = self.controller.badge_deadline();
            let badge_sleep = badge_deadline.unwrap_or_else(idle_deadline);
            let upgrade_sleep = upgrade_at.unwrap_or_else(idle_deadline);

            tokio::select! {
                biased;

                _ = time::sleep_until(badge_sleep), if badge_deadline.is_some() => {
                    self.controller.flush_badge();
                }

                _ = time::sleep_until(upgrade_sleep), if upgrade_at.is_some() => {
                    upgrade_at = None;
                    upgrade_task = Some(spawn_upgrade(
                        Arc::clone(&self.factory),
                        Arc::clone(&self.fetcher),
                        self.config.list_sources.clone(),
                    ));
                }

                outcome = join_upgrade(&mut upgrade_task) => {
                    upgrade_task = None;
                    self.controller.finish_upgrade(outcome).await;
                }

                maybe_event = self.events.recv() => match maybe_event {
                    Some(event) => self.controller.handle_event(event),
                    None => break,
                },
            }
        }

        if let Some(task) = upgrade_task {
            task.abort();
        }
        self.controller
    }
}

fn spawn_upgrade(
    factory: Arc<dyn EngineFactory>,
    fetcher: Arc<dyn ListFetcher>,
    sources: Vec<ListSource>,
) -> JoinHandle<Result<EngineHandle, EngineError>> {
    info!("starting background engine upgrade ({} lists)", sources.len());
    tokio::spawn(async move {
        EngineHandle::from_sources(factory.as_ref(), &sources, fetcher.as_ref()).await
    })
}

/// Await the running upgrade task, pending forever while there is none.
async fn join_upgrade(
    task: &mut Option<JoinHandle<Result<EngineHandle, EngineError>>>,
) -> Result<EngineHandle, EngineError> {
    match task {
        Some(handle) => match handle.await {
            Ok(outcome) => outcome,
            Err(e) => Err(EngineError::SourceFetch(format!("upgrade task aborted: {e}"))),
        },
        None => std::future::pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::badge::RecordingSink;
    use crate::controller::{BlockingStatus, SessionState};
    use crate::host::{MemoryAssets, MemoryStore};
    use bw_engine::stub::{MemoryFetcher, StaticEngine, StaticFactory};
    use bw_engine::{RequestDescriptor, ResourceKind, Verdict};
    use tokio::sync::oneshot;

    const AD_URL: &str = "https://ads.example.com/banner.js";
    const TRACKER_URL: &str = "https://track.example.com/px.gif";
    const LIST_URL: &str = "https://lists.example.com/base.txt";

    struct Harness {
        sender: mpsc::Sender<HostEvent>,
        task: tokio::task::JoinHandle<SessionController>,
        store: Arc<MemoryStore>,
        sink: Arc<RecordingSink>,
    }

    fn bundled_blob() -> Vec<u8> {
        EngineHandle::from_engine(Arc::new(StaticEngine::new().block(AD_URL))).serialize()
    }

    fn start(config: SessionConfig, factory: StaticFactory, fetcher: MemoryFetcher) -> Harness {
        let store = Arc::new(MemoryStore::new());
        let sink = Arc::new(RecordingSink::new());
        let (session, sender) = Session::create(
            config,
            Arc::new(factory),
            Arc::new(fetcher),
            Arc::clone(&store) as Arc<dyn KeyValueStore>,
            Arc::new(MemoryAssets::with_engine(bundled_blob())),
            Arc::clone(&sink) as Arc<dyn BadgeSink>,
        );
        Harness {
            sender,
            task: tokio::spawn(session.run()),
            store,
            sink,
        }
    }

    fn upgrade_config() -> SessionConfig {
        let mut config = SessionConfig::default();
        config.list_sources = vec![ListSource {
            name: "base".to_string(),
            url: LIST_URL.to_string(),
            format: Default::default(),
        }];
        config
    }

    fn script_request(url: &str, tab: i32) -> RequestDescriptor {
        RequestDescriptor {
            url: url.to_string(),
            source_url: "https://news.example.com/".to_string(),
            kind: ResourceKind::Script,
            tab_id: tab,
        }
    }

    /// Round-trips a request through the session; doubles as a barrier
    /// proving every previously sent event has been processed.
    async fn verdict_for(sender: &mpsc::Sender<HostEvent>, request: RequestDescriptor) -> Verdict {
        let (reply, response) = oneshot::channel();
        sender
            .send(HostEvent::Request(request, reply))
            .await
            .unwrap();
        response.await.unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn bootstraps_from_bundled_and_counts_per_tab() {
        let h = start(SessionConfig::default(), StaticFactory::new(), MemoryFetcher::new());

        h.sender.send(HostEvent::TabActivated(7)).await.unwrap();
        h.sender
            .send(HostEvent::NavigationStarted(7))
            .await
            .unwrap();
        assert_eq!(verdict_for(&h.sender, script_request(AD_URL, 7)).await, Verdict::Block);
        assert_eq!(verdict_for(&h.sender, script_request(AD_URL, 7)).await, Verdict::Block);
        assert_eq!(
            verdict_for(&h.sender, script_request("https://cdn.example.com/app.js", 7)).await,
            Verdict::Allow
        );

        drop(h.sender);
        let controller = h.task.await.unwrap();
        assert_eq!(
            controller.state(),
            SessionState::Active(BlockingStatus::Enabled)
        );
        assert_eq!(controller.counters().get(7), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn request_storm_produces_one_badge_render() {
        let h = start(SessionConfig::default(), StaticFactory::new(), MemoryFetcher::new());

        h.sender.send(HostEvent::TabActivated(5)).await.unwrap();
        for _ in 0..10 {
            assert_eq!(verdict_for(&h.sender, script_request(AD_URL, 5)).await, Verdict::Block);
        }
        let renders_before = h.sink.render_count();
        assert!(renders_before > 0);

        // Let the coalescing window elapse; exactly one render follows,
        // carrying the final count.
        time::sleep(Duration::from_millis(600)).await;
        assert_eq!(h.sink.render_count(), renders_before + 1);
        assert_eq!(h.sink.last_render(), Some((5, 10)));

        drop(h.sender);
        h.task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn background_upgrade_swaps_and_persists() {
        let fetcher = MemoryFetcher::new().with_text(LIST_URL, &format!("{TRACKER_URL}\n"));
        let h = start(upgrade_config(), StaticFactory::new(), fetcher);

        // Before the upgrade lands, only the bundled table applies.
        assert_eq!(verdict_for(&h.sender, script_request(TRACKER_URL, 1)).await, Verdict::Allow);

        time::sleep(Duration::from_secs(6)).await;

        assert_eq!(verdict_for(&h.sender, script_request(TRACKER_URL, 1)).await, Verdict::Block);
        assert!(h.store.raw("engine/cached-blob").is_some());

        drop(h.sender);
        h.task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn failed_upgrade_keeps_blocking_with_the_old_engine() {
        let h = start(upgrade_config(), StaticFactory::failing(), MemoryFetcher::new());

        time::sleep(Duration::from_secs(6)).await;

        assert_eq!(verdict_for(&h.sender, script_request(AD_URL, 1)).await, Verdict::Block);
        assert!(h.store.raw("engine/cached-blob").is_none());

        drop(h.sender);
        h.task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn upgrade_preserves_a_disabled_toggle() {
        let fetcher = MemoryFetcher::new().with_text(LIST_URL, &format!("{TRACKER_URL}\n"));
        let h = start(upgrade_config(), StaticFactory::new(), fetcher);

        h.sender.send(HostEvent::Toggle).await.unwrap();
        time::sleep(Duration::from_secs(6)).await;

        // The new engine is installed but inert while disabled.
        assert_eq!(verdict_for(&h.sender, script_request(TRACKER_URL, 1)).await, Verdict::Allow);

        h.sender.send(HostEvent::Toggle).await.unwrap();
        assert_eq!(verdict_for(&h.sender, script_request(TRACKER_URL, 1)).await, Verdict::Block);

        drop(h.sender);
        let controller = h.task.await.unwrap();
        assert_eq!(controller.counters().get(1), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn rapid_toggles_settle_on_the_last_one() {
        let h = start(SessionConfig::default(), StaticFactory::new(), MemoryFetcher::new());

        for _ in 0..3 {
            h.sender.send(HostEvent::Toggle).await.unwrap();
        }
        assert_eq!(verdict_for(&h.sender, script_request(AD_URL, 2)).await, Verdict::Allow);

        drop(h.sender);
        let controller = h.task.await.unwrap();
        assert_eq!(
            controller.state(),
            SessionState::Active(BlockingStatus::Disabled)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cosmetics_flow_through_the_message_channel() {
        let store = Arc::new(MemoryStore::new());
        let blob = EngineHandle::from_engine(Arc::new(
            StaticEngine::new().style("news.example.com", ".banner { display: none; }"),
        ))
        .serialize();
        let (session, sender) = Session::create(
            SessionConfig::default(),
            Arc::new(StaticFactory::new()),
            Arc::new(MemoryFetcher::new()),
            store,
            Arc::new(MemoryAssets::with_engine(blob)),
            Arc::new(RecordingSink::new()),
        );
        let task = tokio::spawn(session.run());

        let (reply, response) = oneshot::channel();
        sender
            .send(HostEvent::Cosmetics(
                bw_engine::FrameDescriptor {
                    url: "https://news.example.com/".to_string(),
                    hostname: "news.example.com".to_string(),
                    tab_id: 1,
                    frame_id: 0,
                },
                reply,
            ))
            .await
            .unwrap();
        assert_eq!(response.await.unwrap().styles, ".banner { display: none; }");

        drop(sender);
        task.await.unwrap();
    }
}
