//! Deterministic stand-in engine.
//!
//! The session controller is engine-agnostic, so tests and the trace
//! simulator need an engine whose verdicts are known in advance.
//! `StaticEngine` judges requests by exact URL against a fixed table and
//! snapshots that table in a line-oriented format, so the cache and
//! bootstrap paths work end to end without a real matching engine.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::engine::{EngineError, EngineFactory, FilterEngine};
use crate::source::{FetchError, ListFetcher, ListSource};
use crate::types::{CosmeticsPayload, FrameDescriptor, RequestDescriptor, Verdict};

// =============================================================================
// StaticEngine
// =============================================================================

/// Fixed-table engine: exact URL match, miss means allow.
#[derive(Debug, Clone, Default)]
pub struct StaticEngine {
    verdicts: BTreeMap<String, Verdict>,
    styles: BTreeMap<String, String>,
}

impl StaticEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Block this exact URL.
    pub fn block(mut self, url: &str) -> Self {
        self.verdicts.insert(url.to_string(), Verdict::Block);
        self
    }

    /// Redirect this exact URL to a surrogate.
    pub fn redirect(mut self, url: &str, target: &str) -> Self {
        self.verdicts
            .insert(url.to_string(), Verdict::Redirect(target.to_string()));
        self
    }

    /// Inject this CSS for frames on the given hostname.
    pub fn style(mut self, hostname: &str, css: &str) -> Self {
        self.styles.insert(hostname.to_string(), css.to_string());
        self
    }

    pub fn rule_count(&self) -> usize {
        self.verdicts.len()
    }
}

impl FilterEngine for StaticEngine {
    fn decide(&self, request: &RequestDescriptor) -> Verdict {
        self.verdicts
            .get(&request.url)
            .cloned()
            .unwrap_or(Verdict::Allow)
    }

    fn cosmetics_for(&self, frame: &FrameDescriptor) -> CosmeticsPayload {
        match self.styles.get(&frame.hostname) {
            Some(css) => CosmeticsPayload {
                styles: css.clone(),
                ..CosmeticsPayload::none()
            },
            None => CosmeticsPayload::none(),
        }
    }

    fn serialize(&self) -> Vec<u8> {
        let mut out = String::new();
        for (url, verdict) in &self.verdicts {
            match verdict {
                Verdict::Block => {
                    out.push_str("block\t");
                    out.push_str(url);
                }
                Verdict::Redirect(target) => {
                    out.push_str("redirect\t");
                    out.push_str(url);
                    out.push('\t');
                    out.push_str(target);
                }
                Verdict::Allow => continue,
            }
            out.push('\n');
        }
        for (hostname, css) in &self.styles {
            out.push_str("style\t");
            out.push_str(hostname);
            out.push('\t');
            out.push_str(css);
            out.push('\n');
        }
        out.into_bytes()
    }
}

// =============================================================================
// StaticFactory
// =============================================================================

/// Factory over `StaticEngine`. `build` treats every non-comment line of a
/// fetched list as an exact URL to block.
#[derive(Debug, Clone, Default)]
pub struct StaticFactory {
    force_build_failure: bool,
}

impl StaticFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// A factory whose `build` always fails, regardless of the fetcher.
    /// Simulates an unreachable or misbehaving list CDN.
    pub fn failing() -> Self {
        Self {
            force_build_failure: true,
        }
    }
}

#[async_trait]
impl EngineFactory for StaticFactory {
    fn deserialize(&self, payload: &[u8]) -> Result<Arc<dyn FilterEngine>, EngineError> {
        let text = std::str::from_utf8(payload).map_err(|_| EngineError::CorruptData)?;

        let mut engine = StaticEngine::new();
        for line in text.lines() {
            if line.is_empty() {
                continue;
            }
            let mut fields = line.split('\t');
            match (fields.next(), fields.next(), fields.next()) {
                (Some("block"), Some(url), None) => {
                    engine.verdicts.insert(url.to_string(), Verdict::Block);
                }
                (Some("redirect"), Some(url), Some(target)) => {
                    engine
                        .verdicts
                        .insert(url.to_string(), Verdict::Redirect(target.to_string()));
                }
                (Some("style"), Some(hostname), Some(css)) => {
                    engine.styles.insert(hostname.to_string(), css.to_string());
                }
                _ => return Err(EngineError::CorruptData),
            }
        }
        Ok(Arc::new(engine))
    }

    async fn build(
        &self,
        sources: &[ListSource],
        fetcher: &dyn ListFetcher,
    ) -> Result<Arc<dyn FilterEngine>, EngineError> {
        if self.force_build_failure {
            return Err(EngineError::SourceFetch("forced build failure".to_string()));
        }

        let mut engine = StaticEngine::new();
        for source in sources {
            let text = fetcher
                .fetch_text(&source.url)
                .await
                .map_err(|e| EngineError::SourceFetch(e.to_string()))?;
            for line in text.lines() {
                let line = line.trim();
                if line.is_empty() || line.starts_with('!') || line.starts_with('#') {
                    continue;
                }
                engine.verdicts.insert(line.to_string(), Verdict::Block);
            }
        }
        Ok(Arc::new(engine))
    }
}

// =============================================================================
// MemoryFetcher
// =============================================================================

/// In-memory fetch collaborator: serves pre-registered documents, fails on
/// anything else.
#[derive(Debug, Clone, Default)]
pub struct MemoryFetcher {
    texts: BTreeMap<String, String>,
    blobs: BTreeMap<String, Vec<u8>>,
}

impl MemoryFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_text(mut self, url: &str, body: &str) -> Self {
        self.texts.insert(url.to_string(), body.to_string());
        self
    }

    pub fn with_bytes(mut self, url: &str, body: Vec<u8>) -> Self {
        self.blobs.insert(url.to_string(), body);
        self
    }
}

#[async_trait]
impl ListFetcher for MemoryFetcher {
    async fn fetch_text(&self, url: &str) -> Result<String, FetchError> {
        self.texts
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError(format!("no such url: {url}")))
    }

    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        self.blobs
            .get(url)
            .cloned()
            .ok_or_else(|| FetchError(format!("no such url: {url}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineHandle;
    use crate::types::ResourceKind;

    fn request(url: &str) -> RequestDescriptor {
        RequestDescriptor {
            url: url.to_string(),
            source_url: "https://news.example.com/".to_string(),
            kind: ResourceKind::Script,
            tab_id: 1,
        }
    }

    #[test]
    fn verdicts_come_from_the_table() {
        let engine = StaticEngine::new()
            .block("https://ads.example.com/a.js")
            .redirect("https://track.example.com/px.gif", "data:image/gif;base64,R0lGOD");

        assert_eq!(engine.decide(&request("https://ads.example.com/a.js")), Verdict::Block);
        assert_eq!(
            engine.decide(&request("https://track.example.com/px.gif")),
            Verdict::Redirect("data:image/gif;base64,R0lGOD".to_string())
        );
        assert_eq!(engine.decide(&request("https://cdn.example.com/app.js")), Verdict::Allow);
    }

    #[test]
    fn survives_a_serialize_cycle() {
        let engine = StaticEngine::new()
            .block("https://ads.example.com/a.js")
            .style("news.example.com", ".banner { display: none; }");
        let handle = EngineHandle::from_engine(Arc::new(engine));

        let blob = handle.serialize();
        let restored =
            EngineHandle::from_blob(&StaticFactory::new(), &blob).expect("blob should load");

        assert_eq!(
            restored.decide(&request("https://ads.example.com/a.js")),
            Verdict::Block
        );
        let frame = FrameDescriptor {
            url: "https://news.example.com/".into(),
            hostname: "news.example.com".into(),
            tab_id: 1,
            frame_id: 0,
        };
        assert_eq!(restored.cosmetics_for(&frame).styles, ".banner { display: none; }");
    }

    #[test]
    fn deserialize_rejects_garbage() {
        let err = StaticFactory::new()
            .deserialize(b"block\turl\textra-field")
            .unwrap_err();
        assert!(matches!(err, EngineError::CorruptData));
    }

    #[tokio::test]
    async fn builds_from_fetched_lists() {
        let fetcher = MemoryFetcher::new().with_text(
            "https://lists.example.com/base.txt",
            "! comment\nhttps://ads.example.com/a.js\n\nhttps://track.example.com/px.gif\n",
        );
        let sources = vec![ListSource {
            name: "base".to_string(),
            url: "https://lists.example.com/base.txt".to_string(),
            format: Default::default(),
        }];

        let handle = EngineHandle::from_sources(&StaticFactory::new(), &sources, &fetcher)
            .await
            .expect("build should succeed");
        assert_eq!(handle.decide(&request("https://ads.example.com/a.js")), Verdict::Block);
        assert_eq!(handle.decide(&request("https://cdn.example.com/app.js")), Verdict::Allow);
    }

    #[tokio::test]
    async fn build_fails_when_a_source_is_unreachable() {
        let sources = vec![ListSource {
            name: "base".to_string(),
            url: "https://lists.example.com/missing.txt".to_string(),
            format: Default::default(),
        }];

        let err = EngineHandle::from_sources(&StaticFactory::new(), &sources, &MemoryFetcher::new())
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::SourceFetch(_)));
    }
}
