//! In-page probes.
//!
//! Each probe is a self-contained script evaluated in the page that returns
//! raw observations as JSON. Probes do no pattern matching of their own;
//! all easing recognition happens on the Rust side. Every script starts with
//! a `/* probe:<name> */` marker naming its section.

use super::css::ComputedStyle;
use crate::error::{truncate_cause, ProbeError, CAUSE_PREVIEW_CHARS};
use crate::model::{ElementSample, Viewport};
use crate::renderer::RenderContext;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::BTreeMap;
use tracing::warn;

/// The independent probe sections. A failure in one leaves the others intact.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProbeSection {
    Metadata,
    Signals,
    Computed,
    Stylesheets,
    Scripts,
    Elements,
}

impl ProbeSection {
    pub fn name(self) -> &'static str {
        match self {
            ProbeSection::Metadata => "metadata",
            ProbeSection::Signals => "signals",
            ProbeSection::Computed => "computed",
            ProbeSection::Stylesheets => "stylesheets",
            ProbeSection::Scripts => "scripts",
            ProbeSection::Elements => "elements",
        }
    }

    /// The marker comment every script of this section starts with.
    pub fn marker(self) -> String {
        format!("/* probe:{} */", self.name())
    }
}

const METADATA_PROBE: &str = r#"/* probe:metadata */
(() => ({
  title: document.title || '',
  description: (document.querySelector('meta[name="description"]') || {}).content || '',
  url: window.location.href,
  viewport: { width: window.innerWidth, height: window.innerHeight },
}))()"#;

const SIGNALS_PROBE: &str = r#"/* probe:signals */
(() => {
  const globals = {};
  for (const name of __GLOBALS__) {
    try { globals[name] = typeof window[name] !== 'undefined'; } catch (e) { globals[name] = false; }
  }
  const script_srcs = Array.from(document.scripts || [])
    .map(s => String(s.src || ''))
    .filter(Boolean);
  let resources = [];
  try {
    resources = ((performance.getEntriesByType && performance.getEntriesByType('resource')) || [])
      .map(r => String(r.name || ''))
      .slice(0, 1000);
  } catch (e) {}
  const versions = {};
  try { if (window.gsap && window.gsap.version) versions.gsap = String(window.gsap.version); } catch (e) {}
  try { if (window.TweenMax && window.TweenMax.version) versions.gsap_legacy = String(window.TweenMax.version); } catch (e) {}
  try { if (window.anime && window.anime.version) versions.anime = String(window.anime.version); } catch (e) {}
  let scroll_trigger = null;
  try {
    let st = window.ScrollTrigger;
    let registered = false;
    if (!st && window.gsap && window.gsap.core && typeof window.gsap.core.globals === 'function') {
      st = window.gsap.core.globals().ScrollTrigger;
      registered = !!st;
    }
    if (st) {
      scroll_trigger = {
        version: st.version ? String(st.version) : null,
        triggers: typeof st.getAll === 'function' ? st.getAll().length : null,
        registered,
      };
    }
  } catch (e) {}
  let lenis = null;
  try {
    if (window.Lenis) lenis = { smooth: !!(window.Lenis.prototype && window.Lenis.prototype.smooth !== undefined) };
  } catch (e) {}
  return { globals, script_srcs, resources, versions, scroll_trigger, lenis };
})()"#;

const COMPUTED_PROBE: &str = r#"/* probe:computed */
(() => {
  const seen = new Set();
  const styles = [];
  for (const el of document.querySelectorAll('*')) {
    const c = window.getComputedStyle(el);
    const entry = {
      transition: c.transition || '',
      transition_property: c.transitionProperty || '',
      transition_duration: c.transitionDuration || '',
      transition_delay: c.transitionDelay || '',
      transition_timing_function: c.transitionTimingFunction || '',
      animation: c.animation || '',
      animation_duration: c.animationDuration || '',
      animation_delay: c.animationDelay || '',
      animation_iteration_count: c.animationIterationCount || '',
      animation_timing_function: c.animationTimingFunction || '',
    };
    const key = JSON.stringify(entry);
    if (seen.has(key)) continue;
    seen.add(key);
    styles.push(entry);
    if (styles.length >= 5000) break;
  }
  return { styles };
})()"#;

const STYLESHEETS_PROBE: &str = r#"/* probe:stylesheets */
(() => {
  const rules = [];
  const keyframes = [];
  let unreadable = 0;
  for (const sheet of Array.from(document.styleSheets || [])) {
    let list = null;
    try { list = sheet.cssRules || sheet.rules; } catch (e) { unreadable++; continue; }
    if (!list) continue;
    for (const rule of Array.from(list)) {
      const text = rule.cssText || '';
      if (text.indexOf('cubic-bezier') !== -1) rules.push(text);
      if (rule.type === CSSRule.KEYFRAMES_RULE && rule.name) keyframes.push(rule.name);
    }
  }
  return { rules, keyframes, unreadable };
})()"#;

const SCRIPTS_PROBE: &str = r#"/* probe:scripts */
(() => ({
  inline: Array.from(document.scripts || [])
    .filter(s => !s.src)
    .map(s => String(s.textContent || ''))
    .filter(t => t.length > 0 && t.length <= __MAX_BYTES__),
}))()"#;

const ELEMENTS_PROBE: &str = r#"/* probe:elements */
(() => {
  const animated = document.querySelectorAll('[data-gsap], [data-scroll], [data-trigger], [class*="scroll-trigger"]');
  const samples = Array.from(animated).slice(0, 20).map(el => ({
    tag: el.tagName,
    classes: typeof el.className === 'string' ? el.className : String(el.getAttribute('class') || ''),
    data_attributes: Array.from(el.attributes)
      .filter(a => a.name.startsWith('data-'))
      .map(a => `${a.name}=${a.value}`)
      .join('; '),
  }));
  return {
    animated_count: animated.length,
    samples,
    has_data_attributes: document.querySelectorAll('[data-gsap], [data-scroll], [data-trigger]').length > 0,
    has_scroll_classes: document.querySelectorAll('[class*="scroll"], [class*="trigger"], [class*="animate"]').length > 0,
  };
})()"#;

pub fn metadata_script() -> &'static str {
    METADATA_PROBE
}

/// The signals probe, checking each of `globals`.
pub fn signals_script(globals: &[&str]) -> String {
    let names = serde_json::to_string(globals).unwrap_or_else(|_| "[]".to_string());
    SIGNALS_PROBE.replace("__GLOBALS__", &names)
}

pub fn computed_script() -> &'static str {
    COMPUTED_PROBE
}

pub fn stylesheets_script() -> &'static str {
    STYLESHEETS_PROBE
}

/// The inline-script probe; scripts longer than `max_bytes` are left out.
pub fn scripts_script(max_bytes: usize) -> String {
    SCRIPTS_PROBE.replace("__MAX_BYTES__", &max_bytes.to_string())
}

pub fn elements_script() -> &'static str {
    ELEMENTS_PROBE
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct PageMetadata {
    pub title: String,
    pub description: String,
    pub url: String,
    pub viewport: Option<Viewport>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ScrollTriggerInfo {
    pub version: Option<String>,
    pub triggers: Option<u64>,
    /// Found through GSAP's plugin registry rather than a global.
    pub registered: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct LenisInfo {
    pub smooth: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct PageSignals {
    pub globals: BTreeMap<String, bool>,
    pub script_srcs: Vec<String>,
    pub resources: Vec<String>,
    pub versions: BTreeMap<String, String>,
    pub scroll_trigger: Option<ScrollTriggerInfo>,
    pub lenis: Option<LenisInfo>,
}

impl PageSignals {
    pub fn has_global(&self, name: &str) -> bool {
        self.globals.get(name).copied().unwrap_or(false)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ComputedProbe {
    pub styles: Vec<ComputedStyle>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct StylesheetProbe {
    pub rules: Vec<String>,
    pub keyframes: Vec<String>,
    pub unreadable: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ScriptProbe {
    pub inline: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct ElementProbe {
    pub animated_count: u32,
    pub samples: Vec<ElementSample>,
    pub has_data_attributes: bool,
    pub has_scroll_classes: bool,
}

/// Evaluate one probe and decode its result.
///
/// A failing or malformed probe is contained here: it is logged as a
/// partial extraction failure and yields the section's empty value.
pub async fn run_probe<T>(ctx: &dyn RenderContext, section: ProbeSection, script: &str) -> T
where
    T: DeserializeOwned + Default,
{
    let outcome = match ctx.execute_js(script).await {
        Ok(value) => serde_json::from_value::<T>(value).map_err(|e| e.to_string()),
        Err(e) => Err(e.to_string()),
    };
    match outcome {
        Ok(parsed) => parsed,
        Err(cause) => {
            let err = ProbeError::ExtractionPartialFailure {
                step: section.name(),
                cause: truncate_cause(&cause, CAUSE_PREVIEW_CHARS),
            };
            warn!("{err}");
            T::default()
        }
    }
}
