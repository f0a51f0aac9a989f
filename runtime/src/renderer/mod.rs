//! Renderer abstraction for browser-based page analysis.
//!
//! Defines the `Renderer` and `RenderContext` traits that abstract over
//! the browser engine (currently Chromium via chromiumoxide). Everything the
//! pipeline asks of a browser goes through `RenderContext`, so sessions can
//! be driven by a scripted fake in tests.

pub mod chromium;

use crate::model::Viewport;
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

/// How settled a page must be before a navigation counts as done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Readiness {
    /// The document has been parsed.
    DomContentLoaded,
    /// Loaded, with at most two requests in flight for half a second.
    NetworkAlmostIdle,
    /// Loaded, with no requests in flight for half a second.
    NetworkIdle,
}

impl Readiness {
    /// Maximum in-flight requests tolerated, if network quiet is required.
    pub fn max_in_flight(self) -> Option<usize> {
        match self {
            Readiness::DomContentLoaded => None,
            Readiness::NetworkAlmostIdle => Some(2),
            Readiness::NetworkIdle => Some(0),
        }
    }
}

impl fmt::Display for Readiness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Readiness::DomContentLoaded => "domcontentloaded",
            Readiness::NetworkAlmostIdle => "networkidle2",
            Readiness::NetworkIdle => "networkidle0",
        })
    }
}

/// Result of navigating to a URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigationResult {
    /// The final URL after any redirects.
    pub final_url: String,
    /// Readiness condition that was satisfied.
    pub readiness: Readiness,
    /// Time taken to load the page in milliseconds.
    pub load_time_ms: u64,
}

/// Resource types that can be refused before they hit the network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Image,
    Font,
    Media,
}

/// Response metadata for one script resource.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScriptResponse {
    pub url: String,
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
}

/// Receives script responses as the page loads them.
///
/// `on_response` is called when headers arrive and decides whether the body
/// should be fetched; `on_body` is only called for accepted responses.
pub trait ScriptObserver: Send + Sync {
    fn on_response(&self, response: &ScriptResponse) -> bool;
    fn on_body(&self, response: &ScriptResponse, body: String);
}

/// A browser engine that can create rendering contexts.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Create a new browser context (tab).
    async fn new_context(&self) -> Result<Box<dyn RenderContext>>;
    /// Shut down the browser engine.
    async fn shutdown(&self) -> Result<()>;
    /// Number of currently active contexts.
    fn active_contexts(&self) -> usize;
}

/// A single browser context (tab) for analyzing pages.
#[async_trait]
pub trait RenderContext: Send + Sync {
    /// Navigate to a URL and wait until `readiness` holds.
    async fn navigate(
        &mut self,
        url: &str,
        readiness: Readiness,
        timeout_ms: u64,
    ) -> Result<NavigationResult>;
    /// Reload the current document.
    async fn reload(&mut self, readiness: Readiness, timeout_ms: u64) -> Result<NavigationResult>;
    /// Register a script that runs at document start of every new document.
    async fn add_init_script(&self, source: &str) -> Result<()>;
    /// Expose `window[name](payload)` to page scripts; payloads arrive on
    /// the returned channel in call order.
    async fn expose_binding(&self, name: &str) -> Result<mpsc::UnboundedReceiver<String>>;
    /// Refuse requests for the given resource kinds.
    async fn block_resources(&self, kinds: &[ResourceKind]) -> Result<()>;
    /// Stream script responses to `observer` for the life of the context.
    async fn observe_scripts(&self, observer: Arc<dyn ScriptObserver>) -> Result<()>;
    async fn set_viewport(&self, viewport: Viewport) -> Result<()>;
    async fn set_user_agent(&self, user_agent: &str) -> Result<()>;
    /// Execute JavaScript in the page context and return the result.
    async fn execute_js(&self, script: &str) -> Result<serde_json::Value>;
    /// Hover the `index`-th element matching `selector`; `false` when there
    /// is no such element.
    async fn hover(&self, selector: &str, index: usize) -> Result<bool>;
    /// Get the current URL.
    async fn get_url(&self) -> Result<String>;
    /// Close this context.
    async fn close(self: Box<Self>) -> Result<()>;
}

/// A no-op renderer used when Chromium is unavailable.
///
/// Every context request fails, so each site in a batch is reported as a
/// navigation failure instead of aborting the run.
pub struct NoopRenderer;

#[async_trait]
impl Renderer for NoopRenderer {
    async fn new_context(&self) -> Result<Box<dyn RenderContext>> {
        Err(anyhow::anyhow!("Browser not available"))
    }
    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
    fn active_contexts(&self) -> usize {
        0
    }
}
