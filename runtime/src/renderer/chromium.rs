//! Chromium-based renderer using chromiumoxide.

use super::{
    NavigationResult, Readiness, RenderContext, Renderer, ResourceKind, ScriptObserver,
    ScriptResponse,
};
use crate::config::BrowserSettings;
use crate::model::Viewport;
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use base64::Engine as _;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::{
    SetDeviceMetricsOverrideParams, SetUserAgentOverrideParams,
};
use chromiumoxide::cdp::browser_protocol::fetch::{
    self, EventRequestPaused, FailRequestParams, RequestPattern, RequestStage,
};
use chromiumoxide::cdp::browser_protocol::network::{
    self, ErrorReason, EventLoadingFailed, EventLoadingFinished, EventRequestWillBeSent,
    EventResponseReceived, GetResponseBodyParams, ResourceType,
};
use chromiumoxide::cdp::browser_protocol::page::{
    AddScriptToEvaluateOnNewDocumentParams, EventDomContentEventFired, EventLoadEventFired,
    NavigateParams, ReloadParams,
};
use chromiumoxide::cdp::js_protocol::runtime::{AddBindingParams, EventBindingCalled};
use chromiumoxide::listeners::EventStream;
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// How long the network must stay quiet for the idle readiness states.
const QUIET_WINDOW: Duration = Duration::from_millis(500);
/// Interval between readiness checks.
const READY_POLL: Duration = Duration::from_millis(100);

/// Find the Chromium binary path.
pub fn find_chromium(explicit: Option<&Path>) -> Option<PathBuf> {
    // 1. Configured path
    if let Some(path) = explicit {
        if path.exists() {
            return Some(path.to_path_buf());
        }
    }

    // 2. MOTION_PROBE_CHROMIUM_PATH env
    if let Ok(p) = std::env::var("MOTION_PROBE_CHROMIUM_PATH") {
        let path = PathBuf::from(&p);
        if path.exists() {
            return Some(path);
        }
    }

    // 3. ~/.motion-probe/chromium/
    if let Some(home) = dirs::home_dir() {
        let candidates = if cfg!(target_os = "macos") {
            vec![
                home.join(".motion-probe/chromium/chrome-mac-arm64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                home.join(".motion-probe/chromium/chrome-mac-x64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                home.join(".motion-probe/chromium/chrome"),
            ]
        } else {
            vec![
                home.join(".motion-probe/chromium/chrome-linux64/chrome"),
                home.join(".motion-probe/chromium/chrome"),
            ]
        };
        for c in candidates {
            if c.exists() {
                return Some(c);
            }
        }
    }

    // 4. System PATH
    for name in ["google-chrome", "chromium", "chromium-browser"] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    // 5. Common macOS location
    if cfg!(target_os = "macos") {
        let common =
            PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome");
        if common.exists() {
            return Some(common);
        }
    }

    None
}

/// Chromium-based renderer. One browser process, one page per context.
pub struct ChromiumRenderer {
    browser: Browser,
    active_count: Arc<AtomicUsize>,
}

impl ChromiumRenderer {
    /// Launch a Chromium instance configured by `settings`.
    pub async fn launch(settings: &BrowserSettings) -> Result<Self> {
        let chrome_path = find_chromium(settings.chromium_path.as_deref()).context(
            "Chromium not found. Set MOTION_PROBE_CHROMIUM_PATH or install Chrome.",
        )?;

        let mut builder = BrowserConfig::builder()
            .chrome_executable(chrome_path)
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-extensions")
            .arg("--disable-background-networking")
            .arg(format!(
                "--window-size={},{}",
                settings.viewport.width, settings.viewport.height
            ));
        builder = if settings.headless {
            builder.arg("--headless=new")
        } else {
            builder.with_head()
        };
        let config = builder
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("failed to launch Chromium")?;

        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                let _ = event;
            }
        });

        Ok(Self {
            browser,
            active_count: Arc::new(AtomicUsize::new(0)),
        })
    }
}

#[async_trait]
impl Renderer for ChromiumRenderer {
    async fn new_context(&self) -> Result<Box<dyn RenderContext>> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .context("failed to create new page")?;
        page.execute(network::EnableParams::default())
            .await
            .context("failed to enable network domain")?;

        let context = ChromiumContext {
            page,
            activity: Arc::new(NetworkActivity::default()),
            tasks: Mutex::new(Vec::new()),
            active_count: Arc::clone(&self.active_count),
        };
        context.track_network_activity().await?;
        self.active_count.fetch_add(1, Ordering::Relaxed);

        Ok(Box::new(context))
    }

    async fn shutdown(&self) -> Result<()> {
        // Browser is dropped when ChromiumRenderer is dropped
        Ok(())
    }

    fn active_contexts(&self) -> usize {
        self.active_count.load(Ordering::Relaxed)
    }
}

/// Request ids currently in flight on one page.
#[derive(Default)]
struct NetworkActivity {
    in_flight: Mutex<HashSet<String>>,
}

impl NetworkActivity {
    fn begin(&self, id: &str) {
        if let Ok(mut set) = self.in_flight.lock() {
            set.insert(id.to_string());
        }
    }

    fn end(&self, id: &str) {
        if let Ok(mut set) = self.in_flight.lock() {
            set.remove(id);
        }
    }

    fn count(&self) -> usize {
        self.in_flight.lock().map(|s| s.len()).unwrap_or(0)
    }
}

/// Main-frame lifecycle events, subscribed before a navigation starts.
///
/// Right after `Page.navigate` returns, `document.readyState` may still
/// describe the previous document, so readiness polling only starts once
/// the new document has fired its event.
struct DocumentEvents {
    dom_content: EventStream<EventDomContentEventFired>,
    load: EventStream<EventLoadEventFired>,
}

impl DocumentEvents {
    async fn subscribe(page: &Page) -> Result<Self> {
        Ok(Self {
            dom_content: page
                .event_listener::<EventDomContentEventFired>()
                .await
                .context("failed to listen for DOMContentLoaded")?,
            load: page
                .event_listener::<EventLoadEventFired>()
                .await
                .context("failed to listen for load")?,
        })
    }

    async fn wait(&mut self, readiness: Readiness) {
        match readiness {
            Readiness::DomContentLoaded => {
                self.dom_content.next().await;
            }
            Readiness::NetworkAlmostIdle | Readiness::NetworkIdle => {
                self.load.next().await;
            }
        }
    }
}

/// A single Chromium page context.
pub struct ChromiumContext {
    page: Page,
    activity: Arc<NetworkActivity>,
    /// Event pumps spawned for this page; aborted on close.
    tasks: Mutex<Vec<JoinHandle<()>>>,
    active_count: Arc<AtomicUsize>,
}

impl ChromiumContext {
    fn track(&self, handle: JoinHandle<()>) {
        if let Ok(mut tasks) = self.tasks.lock() {
            tasks.push(handle);
        }
    }

    async fn track_network_activity(&self) -> Result<()> {
        let mut started = self
            .page
            .event_listener::<EventRequestWillBeSent>()
            .await
            .context("failed to listen for requests")?;
        let mut finished = self.page.event_listener::<EventLoadingFinished>().await?;
        let mut failed = self.page.event_listener::<EventLoadingFailed>().await?;
        let activity = Arc::clone(&self.activity);

        self.track(tokio::spawn(async move {
            loop {
                tokio::select! {
                    Some(ev) = started.next() => activity.begin(ev.request_id.inner()),
                    Some(ev) = finished.next() => activity.end(ev.request_id.inner()),
                    Some(ev) = failed.next() => activity.end(ev.request_id.inner()),
                    else => break,
                }
            }
        }));
        Ok(())
    }

    async fn ready_state(&self) -> Option<String> {
        self.page
            .evaluate("document.readyState")
            .await
            .ok()
            .and_then(|r| r.into_value::<String>().ok())
    }

    async fn wait_until(&self, readiness: Readiness) {
        let mut quiet_since: Option<Instant> = None;
        loop {
            let state = self.ready_state().await.unwrap_or_default();
            let loaded = match readiness {
                Readiness::DomContentLoaded => state == "interactive" || state == "complete",
                _ => state == "complete",
            };

            match (loaded, readiness.max_in_flight()) {
                (true, None) => return,
                (true, Some(max)) if self.activity.count() <= max => {
                    let since = *quiet_since.get_or_insert_with(Instant::now);
                    if since.elapsed() >= QUIET_WINDOW {
                        return;
                    }
                }
                _ => quiet_since = None,
            }
            tokio::time::sleep(READY_POLL).await;
        }
    }

    async fn current_url_or(&self, fallback: &str) -> String {
        self.page
            .url()
            .await
            .unwrap_or_default()
            .map(|u| u.to_string())
            .unwrap_or_else(|| fallback.to_string())
    }
}

#[async_trait]
impl RenderContext for ChromiumContext {
    async fn navigate(
        &mut self,
        url: &str,
        readiness: Readiness,
        timeout_ms: u64,
    ) -> Result<NavigationResult> {
        let start = Instant::now();
        let mut document = DocumentEvents::subscribe(&self.page).await?;

        let result = tokio::time::timeout(Duration::from_millis(timeout_ms), async {
            let response = self
                .page
                .execute(NavigateParams::new(url))
                .await
                .map_err(|e| anyhow::anyhow!("{e}"))?;
            if let Some(error_text) = response.result.error_text.as_ref() {
                bail!("{error_text}");
            }
            // no loader id: same-document navigation, nothing new to wait for
            if response.result.loader_id.is_some() {
                document.wait(readiness).await;
            }
            self.wait_until(readiness).await;
            Ok::<(), anyhow::Error>(())
        })
        .await;

        match result {
            Ok(Ok(())) => Ok(NavigationResult {
                final_url: self.current_url_or(url).await,
                readiness,
                load_time_ms: start.elapsed().as_millis() as u64,
            }),
            Ok(Err(e)) => bail!("navigation failed: {e}"),
            Err(_) => bail!("navigation timed out after {timeout_ms}ms ({readiness})"),
        }
    }

    async fn reload(&mut self, readiness: Readiness, timeout_ms: u64) -> Result<NavigationResult> {
        let start = Instant::now();
        let mut document = DocumentEvents::subscribe(&self.page).await?;

        let result = tokio::time::timeout(Duration::from_millis(timeout_ms), async {
            self.page
                .execute(ReloadParams::default())
                .await
                .map_err(|e| anyhow::anyhow!("{e}"))?;
            document.wait(readiness).await;
            self.wait_until(readiness).await;
            Ok::<(), anyhow::Error>(())
        })
        .await;

        match result {
            Ok(Ok(())) => Ok(NavigationResult {
                final_url: self.current_url_or("").await,
                readiness,
                load_time_ms: start.elapsed().as_millis() as u64,
            }),
            Ok(Err(e)) => bail!("reload failed: {e}"),
            Err(_) => bail!("reload timed out after {timeout_ms}ms ({readiness})"),
        }
    }

    async fn add_init_script(&self, source: &str) -> Result<()> {
        self.page
            .execute(AddScriptToEvaluateOnNewDocumentParams::new(source))
            .await
            .context("failed to register init script")?;
        Ok(())
    }

    async fn expose_binding(&self, name: &str) -> Result<mpsc::UnboundedReceiver<String>> {
        let mut calls = self
            .page
            .event_listener::<EventBindingCalled>()
            .await
            .context("failed to listen for binding calls")?;
        self.page
            .execute(AddBindingParams::new(name))
            .await
            .context("failed to add binding")?;

        let (tx, rx) = mpsc::unbounded_channel();
        let name = name.to_string();
        self.track(tokio::spawn(async move {
            while let Some(call) = calls.next().await {
                if call.name == name && tx.send(call.payload.clone()).is_err() {
                    break;
                }
            }
        }));
        Ok(rx)
    }

    async fn block_resources(&self, kinds: &[ResourceKind]) -> Result<()> {
        if kinds.is_empty() {
            return Ok(());
        }
        let patterns = kinds
            .iter()
            .map(|kind| RequestPattern {
                url_pattern: Some("*".to_string()),
                resource_type: Some(resource_type(*kind)),
                request_stage: Some(RequestStage::Request),
            })
            .collect();

        let mut paused = self
            .page
            .event_listener::<EventRequestPaused>()
            .await
            .context("failed to listen for paused requests")?;
        self.page
            .execute(fetch::EnableParams {
                patterns: Some(patterns),
                handle_auth_requests: None,
            })
            .await
            .context("failed to enable request interception")?;

        let page = self.page.clone();
        self.track(tokio::spawn(async move {
            while let Some(request) = paused.next().await {
                let params = FailRequestParams::new(
                    request.request_id.clone(),
                    ErrorReason::BlockedByClient,
                );
                if let Err(e) = page.execute(params).await {
                    debug!("failed to block {}: {e}", request.request.url);
                }
            }
        }));
        Ok(())
    }

    async fn observe_scripts(&self, observer: Arc<dyn ScriptObserver>) -> Result<()> {
        let mut responses = self
            .page
            .event_listener::<EventResponseReceived>()
            .await
            .context("failed to listen for responses")?;
        let mut finished = self.page.event_listener::<EventLoadingFinished>().await?;
        let page = self.page.clone();

        self.track(tokio::spawn(async move {
            let mut pending: HashMap<String, ScriptResponse> = HashMap::new();
            loop {
                tokio::select! {
                    Some(ev) = responses.next() => {
                        if ev.r#type != ResourceType::Script {
                            continue;
                        }
                        let meta = script_response(&ev.response);
                        if observer.on_response(&meta) {
                            pending.insert(ev.request_id.inner().clone(), meta);
                        }
                    }
                    Some(ev) = finished.next() => {
                        let Some(meta) = pending.remove(ev.request_id.inner()) else {
                            continue;
                        };
                        let params = GetResponseBodyParams::new(ev.request_id.clone());
                        match page.execute(params).await {
                            Ok(resp) => match decode_body(
                                &resp.result.body,
                                resp.result.base64_encoded,
                            ) {
                                Some(body) => observer.on_body(&meta, body),
                                None => debug!(url = %meta.url, "script body was not decodable"),
                            },
                            Err(e) => debug!(url = %meta.url, "could not read script body: {e}"),
                        }
                    }
                    else => break,
                }
            }
        }));
        Ok(())
    }

    async fn set_viewport(&self, viewport: Viewport) -> Result<()> {
        self.page
            .execute(SetDeviceMetricsOverrideParams::new(
                i64::from(viewport.width),
                i64::from(viewport.height),
                1.0,
                false,
            ))
            .await
            .context("failed to set viewport")?;
        Ok(())
    }

    async fn set_user_agent(&self, user_agent: &str) -> Result<()> {
        self.page
            .execute(SetUserAgentOverrideParams::new(user_agent))
            .await
            .context("failed to set user agent")?;
        Ok(())
    }

    async fn execute_js(&self, script: &str) -> Result<serde_json::Value> {
        let result = self
            .page
            .evaluate(script)
            .await
            .context("JS execution failed")?;

        result
            .into_value()
            .map_err(|e| anyhow::anyhow!("failed to convert JS result: {e:?}"))
    }

    async fn hover(&self, selector: &str, index: usize) -> Result<bool> {
        let elements = self
            .page
            .find_elements(selector)
            .await
            .context("element lookup failed")?;
        match elements.get(index) {
            Some(element) => {
                element.hover().await.context("hover failed")?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get_url(&self) -> Result<String> {
        let url = self
            .page
            .url()
            .await
            .context("failed to get URL")?
            .map(|u| u.to_string())
            .unwrap_or_default();
        Ok(url)
    }

    async fn close(self: Box<Self>) -> Result<()> {
        if let Ok(mut tasks) = self.tasks.lock() {
            for task in tasks.drain(..) {
                task.abort();
            }
        }
        self.active_count.fetch_sub(1, Ordering::Relaxed);
        if let Err(e) = self.page.close().await {
            debug!("page close failed: {e}");
        }
        Ok(())
    }
}

fn resource_type(kind: ResourceKind) -> ResourceType {
    match kind {
        ResourceKind::Image => ResourceType::Image,
        ResourceKind::Font => ResourceType::Font,
        ResourceKind::Media => ResourceType::Media,
    }
}

fn script_response(response: &network::Response) -> ScriptResponse {
    let headers = response.headers.inner();
    let header = |name: &str| -> Option<String> {
        headers.as_object()?.iter().find_map(|(k, v)| {
            if k.eq_ignore_ascii_case(name) {
                v.as_str().map(String::from)
            } else {
                None
            }
        })
    };

    ScriptResponse {
        url: response.url.clone(),
        content_type: header("content-type").or_else(|| Some(response.mime_type.clone())),
        content_length: header("content-length").and_then(|v| v.trim().parse().ok()),
    }
}

fn decode_body(body: &str, base64_encoded: bool) -> Option<String> {
    if !base64_encoded {
        return Some(body.to_string());
    }
    base64::engine::general_purpose::STANDARD
        .decode(body)
        .ok()
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
}
