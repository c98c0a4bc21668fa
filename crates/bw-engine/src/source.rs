//! Filter-list sources and the network fetch collaborator.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Syntax of a raw filter list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListFormat {
    /// Adblock Plus style rules (EasyList and friends)
    #[default]
    Abp,
    /// Plain hosts-file entries
    Hosts,
}

/// One raw filter list the engine can be built from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListSource {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub format: ListFormat,
}

/// Error returned by a fetch collaborator. Carries the failing URL context
/// already formatted; the session never inspects it beyond logging.
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
pub struct FetchError(pub String);

/// Retrieves filter lists and pre-built engine blobs by URL.
///
/// Implementations have arbitrary latency and failure modes; callers must
/// treat every call as fallible and potentially slow.
#[async_trait]
pub trait ListFetcher: Send + Sync {
    async fn fetch_text(&self, url: &str) -> Result<String, FetchError>;
    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, FetchError>;
}
