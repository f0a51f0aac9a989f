//! Instrumentation injector.
//!
//! Animation entry points are wrapped by a document-start script generated
//! from [`HOOKS`]. Wrapped calls are reported to the host over a binding
//! registered on the page, so captures live in a per-session [`CaptureLog`]
//! rather than in a page global that has to be read back.

use crate::config::InstrumentationSettings;
use crate::error::ProbeError;
use crate::model::{CapturedAnimations, CapturedCall, Library};
use crate::renderer::RenderContext;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Name of the page-to-host binding.
pub const BINDING_NAME: &str = "__motionProbeEmit";

const HOOKS_TEMPLATE: &str = include_str!("hooks.js");

/// How to intercept one library's API.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct HookSpec {
    pub library: Library,
    /// Global the library attaches itself to.
    pub global: &'static str,
    /// Methods to wrap. Empty means the global itself is the entry point.
    pub methods: &'static [&'static str],
    /// Argument index of the parameter object for specific methods.
    pub vars_index: &'static [(&'static str, usize)],
    pub default_vars_index: usize,
    /// Key of the easing parameter.
    pub ease_key: &'static str,
    /// Recorded when a call omits the easing.
    pub default_ease: &'static str,
    /// Recorded when a call omits the duration (library units).
    pub default_duration: f64,
    /// Keys whose presence makes a call trigger-bound.
    pub trigger_keys: &'static [&'static str],
}

pub const HOOKS: &[HookSpec] = &[
    HookSpec {
        library: Library::Gsap,
        global: "gsap",
        methods: &["to", "from", "fromTo"],
        vars_index: &[("fromTo", 2)],
        default_vars_index: 1,
        ease_key: "ease",
        default_ease: "power1.inOut",
        default_duration: 0.5,
        trigger_keys: &["scrollTrigger"],
    },
    HookSpec {
        library: Library::Anime,
        global: "anime",
        methods: &[],
        vars_index: &[],
        default_vars_index: 0,
        ease_key: "easing",
        default_ease: "easeOutElastic(1, .5)",
        default_duration: 1000.0,
        trigger_keys: &[],
    },
];

#[derive(Serialize)]
struct HookConfig<'a> {
    binding: &'a str,
    poll_interval_ms: u64,
    poll_window_ms: u64,
    start_delay_ms: u64,
    hooks: &'a [HookSpec],
}

/// Build the document-start instrumentation script.
pub fn init_script(settings: &InstrumentationSettings) -> Result<String> {
    let config = HookConfig {
        binding: BINDING_NAME,
        poll_interval_ms: settings.poll_interval_ms,
        poll_window_ms: settings.poll_window_ms,
        start_delay_ms: settings.start_delay_ms,
        hooks: HOOKS,
    };
    let json = serde_json::to_string(&config).context("failed to encode hook config")?;
    Ok(HOOKS_TEMPLATE.replace("__MOTION_PROBE_CONFIG__", &json))
}

/// A message sent by the page script.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HookEvent {
    /// A library's entry points were wrapped.
    Hooked {
        library: Library,
        #[serde(default)]
        version: Option<String>,
    },
    /// One intercepted call.
    Call(CapturedCall),
}

/// Everything the hooks reported during one session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CaptureLog {
    pub captured: CapturedAnimations,
    /// Libraries that were wrapped, with the version they reported.
    pub hooked: BTreeMap<Library, Option<String>>,
    /// Payloads that could not be decoded.
    pub malformed: usize,
}

impl CaptureLog {
    /// Decode and apply one payload.
    pub fn ingest(&mut self, payload: &str) {
        match serde_json::from_str::<HookEvent>(payload) {
            Ok(HookEvent::Hooked { library, version }) => {
                debug!("{library} hooked (version {})", version.as_deref().unwrap_or("unknown"));
                let entry = self.hooked.entry(library).or_insert(None);
                if entry.is_none() {
                    *entry = version;
                }
            }
            Ok(HookEvent::Call(call)) => self.captured.push(call),
            Err(e) => {
                self.malformed += 1;
                debug!("dropping malformed hook payload: {e}");
            }
        }
    }

    pub fn is_hooked(&self, library: Library) -> bool {
        self.hooked.contains_key(&library)
    }
}

/// Installed instrumentation for one page.
pub struct Instrumentation {
    events: mpsc::UnboundedReceiver<String>,
    window_ms: u64,
    log: CaptureLog,
}

impl Instrumentation {
    /// Register the binding, then the document-start script. Must run
    /// before the first navigation.
    pub async fn install(
        ctx: &dyn RenderContext,
        settings: &InstrumentationSettings,
    ) -> Result<Self> {
        let events = ctx.expose_binding(BINDING_NAME).await?;
        ctx.add_init_script(&init_script(settings)?).await?;
        Ok(Self {
            events,
            window_ms: settings.poll_window_ms,
            log: CaptureLog::default(),
        })
    }

    /// Pull every payload delivered so far into the log.
    pub fn drain(&mut self) {
        while let Ok(payload) = self.events.try_recv() {
            self.log.ingest(&payload);
        }
    }

    /// Drain the remaining payloads and close out the log. Libraries that
    /// never appeared are not an error; they are only noted in the logs.
    pub fn finish(mut self) -> CaptureLog {
        self.drain();
        for entry in HOOKS {
            if !self.log.is_hooked(entry.library) {
                let timeout = ProbeError::InstrumentationTimeout {
                    library: entry.library.to_string(),
                    window_ms: self.window_ms,
                };
                debug!("{timeout}");
            }
        }
        if !self.log.captured.is_empty() {
            info!(
                "captured {} animation call(s) ({} trigger-bound)",
                self.log.captured.len(),
                self.log.captured.trigger_bound.len()
            );
        }
        self.log
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_script_embeds_config() {
        let script = init_script(&InstrumentationSettings::default()).unwrap();
        assert!(!script.contains("__MOTION_PROBE_CONFIG__"));
        assert!(script.contains(r#""binding":"__motionProbeEmit""#));
        assert!(script.contains(r#""poll_interval_ms":250"#));
        assert!(script.contains(r#""vars_index":[["fromTo",2]]"#));
        assert!(script.contains(r#""default_ease":"easeOutElastic(1, .5)""#));
    }

    #[test]
    fn test_ingest_routes_calls_and_keeps_order() {
        let mut log = CaptureLog::default();
        log.ingest(r#"{"kind":"hooked","library":"gsap","version":"3.12.5"}"#);
        log.ingest(r#"{"kind":"call","library":"gsap","method":"to","ease":"power2.out","duration":1,"delay":0}"#);
        log.ingest(r#"{"kind":"call","library":"gsap","method":"from","ease":"power1.inOut","duration":0.5,"delay":0,"trigger":"{\"trigger\":\".hero\"}"}"#);
        log.ingest(r#"{"kind":"call","library":"gsap","method":"to","ease":"power2.out","duration":1,"delay":0}"#);

        assert_eq!(log.hooked.get(&Library::Gsap), Some(&Some("3.12.5".to_string())));
        assert_eq!(log.captured.standard.len(), 2);
        assert_eq!(log.captured.trigger_bound.len(), 1);
        assert_eq!(log.captured.trigger_bound[0].method, "from");
    }

    #[test]
    fn test_ingest_counts_malformed_payloads() {
        let mut log = CaptureLog::default();
        log.ingest("not json");
        log.ingest(r#"{"kind":"call","library":"velocity","method":"x","ease":"y"}"#);
        assert_eq!(log.malformed, 2);
        assert!(log.captured.is_empty());
    }

    #[test]
    fn test_first_reported_version_wins() {
        let mut log = CaptureLog::default();
        log.ingest(r#"{"kind":"hooked","library":"anime","version":null}"#);
        log.ingest(r#"{"kind":"hooked","library":"anime","version":"3.2.1"}"#);
        assert_eq!(log.hooked.get(&Library::Anime), Some(&Some("3.2.1".to_string())));
    }
}
