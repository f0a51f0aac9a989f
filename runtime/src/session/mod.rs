//! Session orchestrator.
//!
//! One URL is driven end to end through
//! `Idle → Launching → Navigating → Interacting → Extracting → Reconciling → Closed`.
//! The page is released before reconciliation on every exit path, and any
//! failure jumps straight to `Closed`. Batches run sessions one at a time
//! with a fixed pause in between.

use crate::config::{InteractionSettings, ProbeConfig};
use crate::error::{truncate_cause, CAUSE_PREVIEW_CHARS};
use crate::extract::{self, PageEvidence};
use crate::instrument::Instrumentation;
use crate::model::{BatchResult, SiteRecord};
use crate::navigation::{self, NavigationPolicy};
use crate::network::{CaptureLimits, ScriptCollector};
use crate::progress::{self, BatchEvent, ProgressSender};
use crate::reconcile::{self, SessionEvidence};
use crate::renderer::{NavigationResult, RenderContext, Renderer};
use anyhow::{Context, Result};
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Lifecycle of one site session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Launching,
    Navigating,
    Interacting,
    Extracting,
    Reconciling,
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Launching => "launching",
            SessionState::Navigating => "navigating",
            SessionState::Interacting => "interacting",
            SessionState::Extracting => "extracting",
            SessionState::Reconciling => "reconciling",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

struct Tracker<'a> {
    url: &'a str,
    state: SessionState,
}

impl<'a> Tracker<'a> {
    fn new(url: &'a str) -> Self {
        Self {
            url,
            state: SessionState::Idle,
        }
    }

    fn enter(&mut self, next: SessionState) {
        debug!("{}: {} -> {}", self.url, self.state, next);
        self.state = next;
    }
}

/// Fractions of the document height visited while interacting.
const SCROLL_STOPS: [f64; 3] = [1.0 / 3.0, 0.5, 0.0];

fn scroll_script(fraction: f64) -> String {
    format!(
        "/* interact:scroll */ (() => {{ \
         window.scrollTo(0, Math.floor(document.body.scrollHeight * {fraction})); \
         return true; }})()"
    )
}

/// Scripted interaction: settle, scroll through the page, hover a few
/// clickable-looking elements. Every step swallows its own failure.
pub async fn interact(ctx: &dyn RenderContext, settings: &InteractionSettings) {
    tokio::time::sleep(Duration::from_millis(settings.settle_ms)).await;

    for fraction in SCROLL_STOPS {
        if let Err(e) = ctx.execute_js(&scroll_script(fraction)).await {
            debug!("scroll to {fraction:.2} failed: {e}");
        }
        tokio::time::sleep(Duration::from_millis(settings.scroll_pause_ms)).await;
    }

    let mut hovered = 0;
    for index in 0..settings.max_hovers {
        match ctx.hover(&settings.hover_selector, index).await {
            Ok(true) => {
                hovered += 1;
                tokio::time::sleep(Duration::from_millis(settings.hover_pause_ms)).await;
            }
            Ok(false) => break,
            Err(e) => debug!("hover #{index} failed: {e}"),
        }
    }
    debug!("hovered {hovered} element(s)");
}

/// What the page yielded before it was closed.
struct PageOutcome {
    navigation: NavigationResult,
    page: PageEvidence,
}

/// Runs site sessions against one renderer.
pub struct Analyzer {
    renderer: Arc<dyn Renderer>,
    config: ProbeConfig,
    policy: NavigationPolicy,
}

impl Analyzer {
    pub fn new(renderer: Arc<dyn Renderer>, config: ProbeConfig) -> Self {
        let policy = NavigationPolicy::from(&config.navigation);
        Self {
            renderer,
            config,
            policy,
        }
    }

    pub fn config(&self) -> &ProbeConfig {
        &self.config
    }

    /// Analyze one URL in a fresh, isolated page.
    ///
    /// Fails only when the session cannot be set up or navigation is
    /// exhausted; every other problem reduces the record's completeness.
    pub async fn analyze(&self, url: &str) -> Result<SiteRecord> {
        let mut tracker = Tracker::new(url);
        tracker.enter(SessionState::Launching);

        let mut ctx = match self.renderer.new_context().await {
            Ok(ctx) => ctx,
            Err(e) => {
                tracker.enter(SessionState::Closed);
                return Err(e.context("failed to open browser session"));
            }
        };

        let collector = Arc::new(ScriptCollector::new(CaptureLimits::from(
            &self.config.capture,
        )));
        let mut instrumentation = None;
        let outcome = self
            .drive(ctx.as_mut(), url, &collector, &mut instrumentation, &mut tracker)
            .await;

        if let Err(e) = ctx.close().await {
            warn!("failed to close page for {url}: {e}");
        }

        let page = match outcome {
            Ok(page) => page,
            Err(e) => {
                tracker.enter(SessionState::Closed);
                return Err(e);
            }
        };

        tracker.enter(SessionState::Reconciling);
        let captures = instrumentation
            .map(Instrumentation::finish)
            .unwrap_or_default();
        let record = reconcile::reconcile(SessionEvidence {
            url: url.to_string(),
            final_url: page.navigation.final_url,
            viewport: self.config.browser.viewport,
            page: page.page,
            captures,
            network: collector.snapshot(),
        });
        tracker.enter(SessionState::Closed);
        Ok(record)
    }

    async fn drive(
        &self,
        ctx: &mut dyn RenderContext,
        url: &str,
        collector: &Arc<ScriptCollector>,
        instrumentation: &mut Option<Instrumentation>,
        tracker: &mut Tracker<'_>,
    ) -> Result<PageOutcome> {
        let browser = &self.config.browser;
        ctx.set_viewport(browser.viewport).await?;
        ctx.set_user_agent(&browser.user_agent).await?;
        if !browser.blocked_resources.is_empty() {
            ctx.block_resources(&browser.blocked_resources).await?;
        }
        ctx.observe_scripts(collector.clone()).await?;
        *instrumentation = Some(
            Instrumentation::install(ctx, &self.config.instrumentation)
                .await
                .context("failed to install instrumentation")?,
        );

        tracker.enter(SessionState::Navigating);
        let navigation = navigation::navigate_with_retry(ctx, url, &self.policy).await?;

        tracker.enter(SessionState::Interacting);
        interact(ctx, &self.config.interaction).await;

        tracker.enter(SessionState::Extracting);
        if let Some(hooks) = instrumentation.as_mut() {
            hooks.drain();
        }
        let page = extract::collect_page_evidence(ctx, self.config.capture.max_body_bytes).await;

        Ok(PageOutcome { navigation, page })
    }

    /// Analyze `urls` in order, one session at a time.
    ///
    /// The result has one slot per URL; a failed site leaves its slot empty
    /// and the batch carries on.
    pub async fn analyze_batch(
        &self,
        urls: &[String],
        progress: Option<&ProgressSender>,
    ) -> BatchResult {
        let started = Instant::now();
        let mut batch = BatchResult::new(urls.to_vec());
        let delay = Duration::from_millis(self.config.batch_delay_ms);
        progress::emit(progress, BatchEvent::BatchStarted { total: urls.len() });

        for (index, url) in urls.iter().enumerate() {
            if index > 0 && !delay.is_zero() {
                progress::emit(
                    progress,
                    BatchEvent::Waiting {
                        delay_ms: self.config.batch_delay_ms,
                    },
                );
                tokio::time::sleep(delay).await;
            }

            info!("[{}/{}] analyzing {url}", index + 1, urls.len());
            progress::emit(
                progress,
                BatchEvent::SiteStarted {
                    index,
                    url: url.clone(),
                },
            );
            let site_started = Instant::now();

            match self.analyze(url).await {
                Ok(record) => {
                    let libraries = record
                        .libraries
                        .iter()
                        .filter(|(_, d)| d.detected())
                        .map(|(l, _)| *l)
                        .collect();
                    progress::emit(
                        progress,
                        BatchEvent::SiteCompleted {
                            index,
                            url: url.clone(),
                            libraries,
                            captured_calls: record.captured.len(),
                            elapsed_ms: site_started.elapsed().as_millis() as u64,
                        },
                    );
                    batch.record_success(index, record);
                }
                Err(e) => {
                    let cause = truncate_cause(&format!("{e:#}"), CAUSE_PREVIEW_CHARS);
                    warn!("failed to analyze {url}: {cause}");
                    progress::emit(
                        progress,
                        BatchEvent::SiteFailed {
                            index,
                            url: url.clone(),
                            cause: cause.clone(),
                        },
                    );
                    batch.record_failure(index, cause);
                }
            }
        }

        batch.finish();
        let analyzed = batch.analyzed();
        info!("analyzed {analyzed}/{} site(s)", batch.total());
        progress::emit(
            progress,
            BatchEvent::BatchCompleted {
                analyzed,
                failed: batch.total() - analyzed,
                elapsed_ms: started.elapsed().as_millis() as u64,
            },
        );
        batch
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scroll_script_marker_and_fraction() {
        let script = scroll_script(0.5);
        assert!(script.starts_with("/* interact:scroll */"));
        assert!(script.contains("scrollHeight * 0.5"));
        assert!(scroll_script(0.0).contains("scrollHeight * 0)"));
    }

    #[test]
    fn test_state_names() {
        assert_eq!(SessionState::Reconciling.to_string(), "reconciling");
        let mut tracker = Tracker::new("https://site.test/");
        tracker.enter(SessionState::Launching);
        assert_eq!(tracker.state, SessionState::Launching);
    }
}
