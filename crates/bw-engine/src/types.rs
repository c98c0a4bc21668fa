//! Wire types shared between the session layer and the filtering engine.
//!
//! Everything here crosses the extension message boundary (webRequest
//! replies, cosmetics responses for the content script), so the types carry
//! serde and TS derives for the JavaScript side.

use serde::{Deserialize, Serialize};
use ts_rs::TS;

/// Browser tab identifier. Browsers use `-1` for requests not tied to a tab.
pub type TabId = i32;

// =============================================================================
// Resource Kinds
// =============================================================================

/// Kind of resource a network request is fetching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[serde(rename_all = "snake_case")]
#[ts(export)]
pub enum ResourceKind {
    /// Top-level document load
    MainFrame,
    /// iframe/frame document
    SubFrame,
    Script,
    Stylesheet,
    Image,
    Font,
    Media,
    Websocket,
    Xhr,
    Ping,
    Other,
}

impl ResourceKind {
    /// Parse from the browser's request type string.
    pub fn parse(s: &str) -> Self {
        match s {
            "main_frame" | "document" => Self::MainFrame,
            "sub_frame" | "subdocument" => Self::SubFrame,
            "script" => Self::Script,
            "stylesheet" => Self::Stylesheet,
            "image" => Self::Image,
            "font" => Self::Font,
            "media" => Self::Media,
            "websocket" => Self::Websocket,
            "xmlhttprequest" | "xhr" => Self::Xhr,
            "ping" | "beacon" => Self::Ping,
            _ => Self::Other,
        }
    }
}

// =============================================================================
// Request / Frame Descriptors
// =============================================================================

/// A network request as seen by the interception hook, before it leaves the
/// client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RequestDescriptor {
    /// Full URL of the requested resource
    pub url: String,
    /// URL of the document that initiated the request (empty if unknown)
    pub source_url: String,
    pub kind: ResourceKind,
    pub tab_id: TabId,
}

impl RequestDescriptor {
    pub fn is_main_frame(&self) -> bool {
        self.kind == ResourceKind::MainFrame
    }
}

/// A document frame requesting cosmetic filters, as reported by the content
/// script over the runtime message channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct FrameDescriptor {
    pub url: String,
    pub hostname: String,
    pub tab_id: TabId,
    pub frame_id: i32,
}

// =============================================================================
// Verdicts
// =============================================================================

/// Outcome of evaluating a request against the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(tag = "decision", content = "target", rename_all = "snake_case")]
#[ts(export)]
pub enum Verdict {
    /// Let the request through unchanged
    Allow,
    /// Cancel the request
    Block,
    /// Redirect the request to a local surrogate resource
    Redirect(String),
}

impl Verdict {
    /// True for verdicts that alter the request (counted against the tab).
    pub fn is_altered(&self) -> bool {
        !matches!(self, Verdict::Allow)
    }
}

// =============================================================================
// Cosmetics
// =============================================================================

/// A scriptlet to be injected into a page by the content script.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ScriptletInjection {
    pub name: String,
    pub args: Vec<String>,
}

/// Stylesheet and script directives for one frame.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct CosmeticsPayload {
    /// Concatenated CSS to inject as a user stylesheet
    pub styles: String,
    pub scriptlets: Vec<ScriptletInjection>,
    /// Extended (procedural) selectors the content script evaluates itself
    pub extended: Vec<String>,
}

impl CosmeticsPayload {
    /// The neutral payload: inject nothing.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.styles.is_empty() && self.scriptlets.is_empty() && self.extended.is_empty()
    }
}
