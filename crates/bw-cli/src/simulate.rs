//! Session trace replay.
//!
//! Replays a recorded host-event trace through a full session wired to the
//! deterministic stub engine and the in-memory collaborators. Reproduces
//! counter and badge behavior without a browser attached.

use std::collections::BTreeMap;
use std::fs;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::oneshot;

use bw_engine::stub::{MemoryFetcher, StaticEngine, StaticFactory};
use bw_engine::{EngineHandle, RequestDescriptor, ResourceKind};
use bw_session::badge::RecordingSink;
use bw_session::host::{HostEvent, MemoryAssets, MemoryStore};
use bw_session::{Session, SessionConfig};

/// Trace document: the stub engine's tables plus the event sequence.
#[derive(Debug, Deserialize)]
struct Trace {
    #[serde(default)]
    engine: TraceEngine,
    events: Vec<TraceEvent>,
}

#[derive(Debug, Default, Deserialize)]
struct TraceEngine {
    /// Exact URLs the stub engine blocks
    #[serde(default)]
    block: Vec<String>,
    /// hostname -> CSS injected for its frames
    #[serde(default)]
    styles: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum TraceEvent {
    TabActivated {
        tab: i32,
    },
    Navigation {
        tab: i32,
    },
    TabClosed {
        tab: i32,
    },
    Request {
        url: String,
        tab: i32,
        #[serde(default)]
        kind: Option<String>,
        #[serde(default)]
        source_url: String,
    },
    Toggle,
    /// Let wall-clock time pass, e.g. so a badge coalescing window elapses.
    Wait {
        ms: u64,
    },
}

pub struct SimulateOptions {
    pub trace_path: String,
    pub verbose: bool,
}

pub fn run_simulate(opts: SimulateOptions) -> Result<(), String> {
    let runtime = tokio::runtime::Runtime::new()
        .map_err(|e| format!("Failed to start tokio runtime: {}", e))?;
    runtime.block_on(run_simulate_async(opts))
}

async fn run_simulate_async(opts: SimulateOptions) -> Result<(), String> {
    let text = fs::read_to_string(&opts.trace_path)
        .map_err(|e| format!("Failed to read '{}': {}", opts.trace_path, e))?;
    let trace: Trace = serde_json::from_str(&text)
        .map_err(|e| format!("Failed to parse trace '{}': {}", opts.trace_path, e))?;

    let mut engine = StaticEngine::new();
    for url in &trace.engine.block {
        engine = engine.block(url);
    }
    for (hostname, css) in &trace.engine.styles {
        engine = engine.style(hostname, css);
    }
    let rules = engine.rule_count();
    let bundled = EngineHandle::from_engine(Arc::new(engine)).serialize();

    let sink = Arc::new(RecordingSink::new());
    let (session, sender) = Session::create(
        SessionConfig::default(),
        Arc::new(StaticFactory::new()),
        Arc::new(MemoryFetcher::new()),
        Arc::new(MemoryStore::new()),
        Arc::new(MemoryAssets::with_engine(bundled)),
        Arc::clone(&sink) as Arc<dyn bw_session::BadgeSink>,
    );
    let session_task = tokio::spawn(session.run());

    println!(
        "Replaying '{}' ({} events, {} stub rules)",
        opts.trace_path,
        trace.events.len(),
        rules
    );

    for event in trace.events {
        match event {
            TraceEvent::TabActivated { tab } => {
                send(&sender, HostEvent::TabActivated(tab)).await?;
            }
            TraceEvent::Navigation { tab } => {
                send(&sender, HostEvent::NavigationStarted(tab)).await?;
            }
            TraceEvent::TabClosed { tab } => {
                send(&sender, HostEvent::TabClosed(tab)).await?;
            }
            TraceEvent::Request {
                url,
                tab,
                kind,
                source_url,
            } => {
                let request = RequestDescriptor {
                    url: url.clone(),
                    source_url,
                    kind: ResourceKind::parse(kind.as_deref().unwrap_or("other")),
                    tab_id: tab,
                };
                let (reply, response) = oneshot::channel();
                send(&sender, HostEvent::Request(request, reply)).await?;
                let verdict = response
                    .await
                    .map_err(|_| "Session dropped a request reply".to_string())?;
                if opts.verbose {
                    println!("  [{tab}] {url} -> {verdict:?}");
                }
            }
            TraceEvent::Toggle => {
                send(&sender, HostEvent::Toggle).await?;
            }
            TraceEvent::Wait { ms } => {
                tokio::time::sleep(Duration::from_millis(ms)).await;
            }
        }
    }

    drop(sender);
    let controller = session_task
        .await
        .map_err(|e| format!("Session task failed: {}", e))?;

    println!("Final state: {:?}", controller.state());

    let mut counts: Vec<_> = controller.counters().iter().collect();
    counts.sort();
    println!("Counters ({} tabs):", counts.len());
    for (tab, count) in counts {
        println!("  tab {tab}: {count} altered");
    }

    println!("Badge: {} renders, {} status changes", sink.render_count(), sink.statuses().len());
    if let Some((tab, count)) = sink.last_render() {
        println!("  last render: tab {tab} = {count}");
    }

    Ok(())
}

async fn send(
    sender: &tokio::sync::mpsc::Sender<HostEvent>,
    event: HostEvent,
) -> Result<(), String> {
    sender
        .send(event)
        .await
        .map_err(|_| "Session ended before the trace finished".to_string())
}
