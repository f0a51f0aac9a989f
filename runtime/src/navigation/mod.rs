//! Navigation controller: drives one page load to a usable state.
//!
//! The schedule (which readiness criterion to try, with which timeout, in
//! which order) is data in [`NavigationPolicy`]; [`navigate_with_retry`] is
//! the only place that attempts, backs off and recovers.

use crate::config::{NavigationSettings, NavigationStep};
use crate::error::{truncate_cause, ProbeError, CAUSE_PREVIEW_CHARS};
use crate::renderer::{NavigationResult, Readiness, RenderContext};
use std::time::Duration;
use tracing::{info, warn};

/// Error fragments that mark a dropped or reset connection.
const RESET_MARKERS: &[&str] = &[
    "socket hang up",
    "hang up",
    "socket closed",
    "econnreset",
    "err_connection_reset",
    "err_connection_closed",
    "connection closed",
];

/// Ordered navigation attempts plus backoff bounds.
#[derive(Debug, Clone, PartialEq)]
pub struct NavigationPolicy {
    pub steps: Vec<NavigationStep>,
    pub backoff_base: Duration,
    pub backoff_ceiling: Duration,
    pub reload_timeout_ms: u64,
}

impl From<&NavigationSettings> for NavigationPolicy {
    fn from(settings: &NavigationSettings) -> Self {
        Self {
            steps: settings.steps.clone(),
            backoff_base: Duration::from_millis(settings.backoff_base_ms),
            backoff_ceiling: Duration::from_millis(settings.backoff_ceiling_ms),
            reload_timeout_ms: settings.reload_timeout_ms,
        }
    }
}

impl Default for NavigationPolicy {
    fn default() -> Self {
        Self::from(&NavigationSettings::default())
    }
}

impl NavigationPolicy {
    pub fn max_attempts(&self) -> u32 {
        self.steps.len() as u32
    }

    /// Waits between consecutive attempts: linear in the attempt number,
    /// clipped so the total never exceeds the ceiling.
    pub fn backoff_schedule(&self) -> Vec<Duration> {
        let mut remaining = self.backoff_ceiling;
        (1..self.steps.len() as u32)
            .map(|attempt| {
                let wait = (self.backoff_base * attempt).min(remaining);
                remaining -= wait;
                wait
            })
            .collect()
    }
}

/// Whether an error message looks like a transient connection reset.
pub fn is_connection_reset(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    RESET_MARKERS.iter().any(|m| lower.contains(m))
}

/// Navigate `ctx` to `url` following `policy`.
///
/// Each failure is logged with its attempt number and a truncated cause.
/// A failure that looks like a connection reset triggers a reload with the
/// cheapest readiness criterion before the next attempt; that reload's own
/// failure is ignored. Exhausting every step yields
/// [`ProbeError::NavigationFailed`] carrying the last cause.
pub async fn navigate_with_retry(
    ctx: &mut dyn RenderContext,
    url: &str,
    policy: &NavigationPolicy,
) -> Result<NavigationResult, ProbeError> {
    let backoff = policy.backoff_schedule();
    let total = policy.max_attempts();
    let mut last_cause = String::from("no navigation attempted");

    for (i, step) in policy.steps.iter().enumerate() {
        let attempt = i as u32 + 1;
        info!(
            "loading {url} (attempt {attempt}/{total}, waiting for {})",
            step.readiness
        );

        match ctx.navigate(url, step.readiness, step.timeout_ms).await {
            Ok(result) => {
                info!(
                    "loaded {url} with {} in {}ms",
                    step.readiness, result.load_time_ms
                );
                return Ok(result);
            }
            Err(e) => {
                last_cause = e.to_string();
                warn!(
                    "attempt {attempt}/{total} failed for {url}: {}",
                    truncate_cause(&last_cause, CAUSE_PREVIEW_CHARS)
                );
            }
        }

        let Some(wait) = backoff.get(i).copied() else {
            continue;
        };

        if is_connection_reset(&last_cause) {
            warn!("connection reset while loading {url}, reloading before retry");
            if let Err(e) = ctx
                .reload(Readiness::DomContentLoaded, policy.reload_timeout_ms)
                .await
            {
                warn!(
                    "reload of {url} failed: {}",
                    truncate_cause(&e.to_string(), CAUSE_PREVIEW_CHARS)
                );
            }
        }

        if !wait.is_zero() {
            info!("waiting {}ms before next attempt", wait.as_millis());
            tokio::time::sleep(wait).await;
        }
    }

    Err(ProbeError::NavigationFailed {
        url: url.to_string(),
        attempts: total,
        cause: truncate_cause(&last_cause, CAUSE_PREVIEW_CHARS),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Viewport;
    use crate::renderer::{ResourceKind, ScriptObserver};
    use anyhow::Result;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use tokio::sync::mpsc;

    /// A context whose navigations fail with scripted messages.
    #[derive(Default)]
    struct FlakyContext {
        failures: Mutex<VecDeque<String>>,
        attempts: Mutex<Vec<Readiness>>,
        reloads: Mutex<u32>,
    }

    impl FlakyContext {
        fn failing(messages: &[&str]) -> Self {
            Self {
                failures: Mutex::new(messages.iter().map(|m| m.to_string()).collect()),
                ..Default::default()
            }
        }
    }

    #[async_trait]
    impl RenderContext for FlakyContext {
        async fn navigate(
            &mut self,
            url: &str,
            readiness: Readiness,
            _timeout_ms: u64,
        ) -> Result<NavigationResult> {
            self.attempts.lock().unwrap().push(readiness);
            if let Some(msg) = self.failures.lock().unwrap().pop_front() {
                anyhow::bail!(msg);
            }
            Ok(NavigationResult {
                final_url: url.to_string(),
                readiness,
                load_time_ms: 1,
            })
        }
        async fn reload(&mut self, readiness: Readiness, _t: u64) -> Result<NavigationResult> {
            *self.reloads.lock().unwrap() += 1;
            Ok(NavigationResult {
                final_url: String::new(),
                readiness,
                load_time_ms: 1,
            })
        }
        async fn add_init_script(&self, _source: &str) -> Result<()> {
            Ok(())
        }
        async fn expose_binding(&self, _name: &str) -> Result<mpsc::UnboundedReceiver<String>> {
            Ok(mpsc::unbounded_channel().1)
        }
        async fn block_resources(&self, _kinds: &[ResourceKind]) -> Result<()> {
            Ok(())
        }
        async fn observe_scripts(&self, _observer: Arc<dyn ScriptObserver>) -> Result<()> {
            Ok(())
        }
        async fn set_viewport(&self, _viewport: Viewport) -> Result<()> {
            Ok(())
        }
        async fn set_user_agent(&self, _ua: &str) -> Result<()> {
            Ok(())
        }
        async fn execute_js(&self, _script: &str) -> Result<serde_json::Value> {
            Ok(serde_json::Value::Null)
        }
        async fn hover(&self, _selector: &str, _index: usize) -> Result<bool> {
            Ok(false)
        }
        async fn get_url(&self) -> Result<String> {
            Ok(String::new())
        }
        async fn close(self: Box<Self>) -> Result<()> {
            Ok(())
        }
    }

    fn fast_policy() -> NavigationPolicy {
        NavigationPolicy {
            backoff_base: Duration::from_millis(1),
            backoff_ceiling: Duration::from_millis(5),
            ..NavigationPolicy::default()
        }
    }

    #[test]
    fn test_default_backoff_is_linear_and_capped() {
        let policy = NavigationPolicy::default();
        let schedule = policy.backoff_schedule();
        assert_eq!(
            schedule,
            vec![
                Duration::from_millis(3_000),
                Duration::from_millis(6_000),
                Duration::from_millis(9_000),
            ]
        );
        let total: Duration = schedule.iter().sum();
        assert!(total <= policy.backoff_ceiling);
    }

    #[test]
    fn test_backoff_clipped_by_ceiling() {
        let policy = NavigationPolicy {
            backoff_ceiling: Duration::from_millis(7_000),
            ..NavigationPolicy::default()
        };
        assert_eq!(
            policy.backoff_schedule(),
            vec![
                Duration::from_millis(3_000),
                Duration::from_millis(4_000),
                Duration::ZERO,
            ]
        );
    }

    #[test]
    fn test_connection_reset_classification() {
        assert!(is_connection_reset("net::ERR_CONNECTION_RESET"));
        assert!(is_connection_reset("socket hang up"));
        assert!(is_connection_reset("read ECONNRESET"));
        assert!(!is_connection_reset("navigation timed out after 60000ms"));
        assert!(!is_connection_reset(
            "Execution context was destroyed, most likely because of a navigation change"
        ));
        assert!(!is_connection_reset("frame changed before the request finished"));
    }

    #[tokio::test]
    async fn test_escalates_readiness_until_success() {
        let mut ctx = FlakyContext::failing(&["timeout", "timeout"]);
        let result = navigate_with_retry(&mut ctx, "https://example.com", &fast_policy())
            .await
            .unwrap();
        assert_eq!(result.readiness, Readiness::NetworkIdle);
        assert_eq!(
            *ctx.attempts.lock().unwrap(),
            vec![
                Readiness::DomContentLoaded,
                Readiness::NetworkAlmostIdle,
                Readiness::NetworkIdle,
            ]
        );
        assert_eq!(*ctx.reloads.lock().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_exhausted_attempts_yield_navigation_failed() {
        let mut ctx = FlakyContext::failing(&["a", "b", "c", "net::ERR_NAME_NOT_RESOLVED"]);
        let err = navigate_with_retry(&mut ctx, "https://down.test", &fast_policy())
            .await
            .unwrap_err();
        match err {
            ProbeError::NavigationFailed {
                url,
                attempts,
                cause,
            } => {
                assert_eq!(url, "https://down.test");
                assert_eq!(attempts, 4);
                assert!(cause.contains("ERR_NAME_NOT_RESOLVED"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_connection_reset_triggers_reload() {
        let mut ctx = FlakyContext::failing(&["net::ERR_CONNECTION_RESET"]);
        navigate_with_retry(&mut ctx, "https://flaky.test", &fast_policy())
            .await
            .unwrap();
        assert_eq!(*ctx.reloads.lock().unwrap(), 1);
    }
}
