//! Network evidence collector.
//!
//! Observes script responses while the page loads and retains bodies that
//! look relevant to a known library. Relevance is decided in two stages: a
//! cheap URL check, then a size-bounded body check. Scripts without a URL
//! hint are only sampled up to a separate, smaller allowance.
//!
//! All caps are monotonic counters, so a response arriving after extraction
//! has started is still accepted and picked up by the post-session merge.

use crate::config::CaptureSettings;
use crate::error::ProbeError;
use crate::model::{Library, NetworkStats};
use crate::renderer::{ScriptObserver, ScriptResponse};
use crate::signatures;
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::{Mutex, OnceLock};
use tracing::debug;

/// Number of script URLs kept for diagnostics.
pub const MAX_SAMPLE_URLS: usize = 8;

/// Resource bounds for one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureLimits {
    pub max_scripts: usize,
    pub max_unhinted_samples: usize,
    pub max_body_bytes: usize,
}

impl From<&CaptureSettings> for CaptureLimits {
    fn from(settings: &CaptureSettings) -> Self {
        Self {
            max_scripts: settings.max_scripts,
            max_unhinted_samples: settings.max_unhinted_samples,
            max_body_bytes: settings.max_body_bytes,
        }
    }
}

impl Default for CaptureLimits {
    fn default() -> Self {
        Self::from(&CaptureSettings::default())
    }
}

/// A retained script body.
#[derive(Debug, Clone, PartialEq)]
pub struct CapturedScript {
    pub url: String,
    pub text: String,
    /// The URL alone made the script relevant.
    pub hinted: bool,
}

/// What the collector knows once the session is over.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NetworkEvidence {
    pub scripts: Vec<CapturedScript>,
    /// Libraries whose pattern matched any observed script URL.
    pub url_hits: BTreeSet<Library>,
    pub stats: NetworkStats,
}

impl NetworkEvidence {
    /// Libraries whose pattern matched a retained body.
    pub fn body_hits(&self) -> BTreeSet<Library> {
        self.scripts
            .iter()
            .flat_map(|s| signatures::network_matches(&s.text))
            .collect()
    }
}

#[derive(Default)]
struct CollectorState {
    evidence: NetworkEvidence,
    unhinted_sampled: usize,
}

/// Thread-safe script collector, shared with the renderer's event pump.
pub struct ScriptCollector {
    limits: CaptureLimits,
    state: Mutex<CollectorState>,
}

fn js_url_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\.m?js(\?|#|$)").expect("valid regex"))
}

/// Whether a response is plausibly JavaScript, by content type or URL.
pub fn looks_like_javascript(content_type: Option<&str>, url: &str) -> bool {
    let ct = content_type.unwrap_or_default().to_ascii_lowercase();
    if ct.contains("javascript") || ct.contains("ecmascript") {
        return true;
    }
    js_url_regex().is_match(url)
}

fn skipped(url: &str, reason: String) {
    let err = ProbeError::ResourceCaptureSkipped {
        url: url.to_string(),
        reason,
    };
    debug!("{err}");
}

impl ScriptCollector {
    pub fn new(limits: CaptureLimits) -> Self {
        Self {
            limits,
            state: Mutex::new(CollectorState::default()),
        }
    }

    pub fn limits(&self) -> CaptureLimits {
        self.limits
    }

    /// First stage: decide from headers alone whether to fetch the body.
    pub fn screen(&self, response: &ScriptResponse) -> bool {
        let Ok(mut state) = self.state.lock() else {
            return false;
        };
        if state.evidence.scripts.len() >= self.limits.max_scripts {
            return false;
        }

        let url = response.url.as_str();
        let stats = &mut state.evidence.stats;
        stats.scripts_seen += 1;
        if stats.sample_urls.len() < MAX_SAMPLE_URLS {
            stats.sample_urls.push(url.to_string());
        }
        let url_libraries = signatures::network_matches(url);
        let hinted = !url_libraries.is_empty();
        state.evidence.url_hits.extend(url_libraries);

        if !looks_like_javascript(response.content_type.as_deref(), url) {
            return false;
        }

        if !hinted {
            if state.unhinted_sampled >= self.limits.max_unhinted_samples {
                return false;
            }
            state.unhinted_sampled += 1;
            state.evidence.stats.unhinted_attempts += 1;
        }

        if let Some(length) = response.content_length {
            if length > self.limits.max_body_bytes as u64 {
                skipped(
                    url,
                    format!(
                        "declared {length} bytes exceeds {} byte ceiling",
                        self.limits.max_body_bytes
                    ),
                );
                return false;
            }
        }
        true
    }

    /// Second stage: retain the body if it is within bounds and relevant.
    pub fn offer_body(&self, response: &ScriptResponse, body: String) -> bool {
        if body.len() > self.limits.max_body_bytes {
            skipped(
                &response.url,
                format!(
                    "body of {} bytes exceeds {} byte ceiling",
                    body.len(),
                    self.limits.max_body_bytes
                ),
            );
            return false;
        }

        let hinted = signatures::is_network_relevant(&response.url);
        if !hinted && !signatures::is_network_relevant(&body) {
            return false;
        }

        let Ok(mut state) = self.state.lock() else {
            return false;
        };
        if state.evidence.scripts.len() >= self.limits.max_scripts {
            skipped(&response.url, "capture cap reached".to_string());
            return false;
        }
        state.evidence.scripts.push(CapturedScript {
            url: response.url.clone(),
            text: body,
            hinted,
        });
        state.evidence.stats.scripts_captured += 1;
        true
    }

    /// Copy of everything observed so far.
    pub fn snapshot(&self) -> NetworkEvidence {
        self.state
            .lock()
            .map(|s| s.evidence.clone())
            .unwrap_or_default()
    }
}

impl ScriptObserver for ScriptCollector {
    fn on_response(&self, response: &ScriptResponse) -> bool {
        self.screen(response)
    }

    fn on_body(&self, response: &ScriptResponse, body: String) {
        self.offer_body(response, body);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn js(url: &str) -> ScriptResponse {
        ScriptResponse {
            url: url.to_string(),
            content_type: Some("application/javascript".into()),
            content_length: None,
        }
    }

    fn limits(max_scripts: usize, max_unhinted: usize, max_bytes: usize) -> CaptureLimits {
        CaptureLimits {
            max_scripts,
            max_unhinted_samples: max_unhinted,
            max_body_bytes: max_bytes,
        }
    }

    #[test]
    fn test_looks_like_javascript() {
        assert!(looks_like_javascript(Some("text/javascript; charset=utf-8"), "/x"));
        assert!(looks_like_javascript(None, "https://a.test/app.mjs?v=2"));
        assert!(looks_like_javascript(None, "https://a.test/app.js#frag"));
        assert!(!looks_like_javascript(Some("application/json"), "https://a.test/data"));
        assert!(!looks_like_javascript(None, "https://a.test/app.json"));
    }

    #[test]
    fn test_hinted_url_is_captured_without_body_hint() {
        let collector = ScriptCollector::new(CaptureLimits::default());
        let r = js("https://cdn.test/gsap.min.js");
        assert!(collector.screen(&r));
        assert!(collector.offer_body(&r, "!function(){}".into()));
        let evidence = collector.snapshot();
        assert_eq!(evidence.scripts.len(), 1);
        assert!(evidence.scripts[0].hinted);
        assert!(evidence.url_hits.contains(&Library::Gsap));
    }

    #[test]
    fn test_unhinted_body_must_match() {
        let collector = ScriptCollector::new(CaptureLimits::default());
        let r = js("https://a.test/vendor.js");
        assert!(collector.screen(&r));
        assert!(!collector.offer_body(&r, "console.log(1)".into()));
        assert!(collector.offer_body(&r, "window.gsap = gsap;".into()));
        assert_eq!(collector.snapshot().body_hits(), BTreeSet::from([Library::Gsap]));
    }

    #[test]
    fn test_unhinted_sampling_allowance() {
        let collector = ScriptCollector::new(limits(40, 2, 1024));
        let screened: Vec<bool> = (0..5)
            .map(|i| collector.screen(&js(&format!("https://a.test/chunk{i}.js"))))
            .collect();
        assert_eq!(screened, vec![true, true, false, false, false]);
        // hinted scripts are unaffected by the allowance
        assert!(collector.screen(&js("https://a.test/ScrollTrigger.js")));
        let stats = collector.snapshot().stats;
        assert_eq!(stats.unhinted_attempts, 2);
        assert_eq!(stats.scripts_seen, 6);
        assert_eq!(stats.sample_urls.len(), 6);
    }

    #[test]
    fn test_script_cap_is_never_exceeded() {
        let collector = ScriptCollector::new(limits(3, 3, 1024));
        for i in 0..10 {
            let r = js(&format!("https://cdn.test/gsap-part{i}.js"));
            if collector.screen(&r) {
                collector.offer_body(&r, "gsap".into());
            }
            // late bodies for already-screened responses are still bounded
            collector.offer_body(&r, "gsap".into());
        }
        assert_eq!(collector.snapshot().scripts.len(), 3);
    }

    #[test]
    fn test_byte_ceiling_applies_to_hinted_scripts() {
        let collector = ScriptCollector::new(limits(40, 15, 16));
        let mut r = js("https://cdn.test/gsap.js");
        r.content_length = Some(17);
        assert!(!collector.screen(&r));

        r.content_length = None;
        assert!(collector.screen(&r));
        assert!(!collector.offer_body(&r, "x".repeat(17)));
        assert!(collector.offer_body(&r, "x".repeat(16)));
        assert!(collector
            .snapshot()
            .scripts
            .iter()
            .all(|s| s.text.len() <= 16));
    }

    #[test]
    fn test_non_javascript_is_screened_out_but_url_counts() {
        let collector = ScriptCollector::new(CaptureLimits::default());
        let r = ScriptResponse {
            url: "https://cdn.test/lenis".into(),
            content_type: Some("text/plain".into()),
            content_length: None,
        };
        assert!(!collector.screen(&r));
        assert!(collector.snapshot().url_hits.contains(&Library::Lenis));
    }
}
