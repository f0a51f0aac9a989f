// Copyright 2026 Motion Probe Contributors
// SPDX-License-Identifier: Apache-2.0

//! Per-site record types.
//!
//! A [`SiteRecord`] is assembled once, at the end of a session, and is only
//! read afterwards. Static easing findings are kept in [`EasingSet`]s (set
//! semantics per channel); runtime captures are kept as an ordered log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Animation and scroll libraries the pipeline knows how to detect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Library {
    Gsap,
    ScrollTrigger,
    Anime,
    Lenis,
    LocomotiveScroll,
}

impl Library {
    pub const ALL: [Library; 5] = [
        Library::Gsap,
        Library::ScrollTrigger,
        Library::Anime,
        Library::Lenis,
        Library::LocomotiveScroll,
    ];

    /// Human-readable name used in logs and reports.
    pub fn display_name(self) -> &'static str {
        match self {
            Library::Gsap => "GSAP",
            Library::ScrollTrigger => "ScrollTrigger",
            Library::Anime => "Anime.js",
            Library::Lenis => "Lenis",
            Library::LocomotiveScroll => "Locomotive Scroll",
        }
    }
}

impl fmt::Display for Library {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Source-code dialects whose easing literals are recovered from script text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScriptDialect {
    /// GSAP `ease:` parameters and `CustomEase.create(...)` literals.
    Gsap,
    /// anime.js `easing:` parameters.
    Anime,
    /// Declarative `ease:` values (array or string) as used by Framer Motion.
    Declarative,
}

impl ScriptDialect {
    pub const ALL: [ScriptDialect; 3] = [
        ScriptDialect::Gsap,
        ScriptDialect::Anime,
        ScriptDialect::Declarative,
    ];
}

/// A deduplicated set of normalized easing strings for one channel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EasingSet(BTreeSet<String>);

impl EasingSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an easing; returns `false` when it was already present.
    pub fn insert(&mut self, easing: impl Into<String>) -> bool {
        let easing = easing.into();
        if easing.is_empty() {
            return false;
        }
        self.0.insert(easing)
    }

    /// Union another set into this one.
    pub fn merge(&mut self, other: &EasingSet) {
        for easing in &other.0 {
            self.0.insert(easing.clone());
        }
    }

    pub fn union(&self, other: &EasingSet) -> EasingSet {
        let mut out = self.clone();
        out.merge(other);
        out
    }

    pub fn contains(&self, easing: &str) -> bool {
        self.0.contains(easing)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }
}

impl<S: Into<String>> FromIterator<S> for EasingSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut set = EasingSet::new();
        for easing in iter {
            set.insert(easing);
        }
        set
    }
}

/// Detection verdict for one library.
///
/// `detected` is derived from the evidence set and can never disagree with
/// it: evidence is only ever added, and deserialization recomputes the flag.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "DetectionWire")]
pub struct Detection {
    detected: bool,
    evidence: BTreeSet<String>,
    version: Option<String>,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Deserialize)]
struct DetectionWire {
    #[serde(default)]
    evidence: BTreeSet<String>,
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    extra: serde_json::Map<String, serde_json::Value>,
}

impl From<DetectionWire> for Detection {
    fn from(wire: DetectionWire) -> Self {
        Self {
            detected: !wire.evidence.is_empty(),
            evidence: wire.evidence,
            version: wire.version,
            extra: wire.extra,
        }
    }
}

impl Detection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one positive signal. Signals accumulate; none can retract another.
    pub fn add_evidence(&mut self, tag: impl Into<String>) {
        self.evidence.insert(tag.into());
        self.detected = true;
    }

    pub fn detected(&self) -> bool {
        self.detected
    }

    pub fn evidence(&self) -> &BTreeSet<String> {
        &self.evidence
    }

    pub fn has_evidence(&self, tag: &str) -> bool {
        self.evidence.contains(tag)
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// Keep the first non-empty version reported.
    pub fn set_version(&mut self, version: Option<String>) {
        if self.version.is_none() {
            self.version = version.filter(|v| !v.is_empty());
        }
    }

    pub fn extra(&self) -> &serde_json::Map<String, serde_json::Value> {
        &self.extra
    }

    pub fn set_extra(&mut self, key: &str, value: serde_json::Value) {
        self.extra.insert(key.to_string(), value);
    }
}

/// One intercepted animation call, in call order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapturedCall {
    pub library: Library,
    pub method: String,
    pub ease: String,
    /// JSON text of a non-string ease object (e.g. a CustomEase instance).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_ease: Option<String>,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub delay: Option<f64>,
    /// JSON text of the scroll/viewport trigger configuration.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stagger: Option<String>,
}

impl CapturedCall {
    pub fn is_trigger_bound(&self) -> bool {
        self.trigger.is_some()
    }
}

/// Runtime captures, split into plain and trigger-bound buckets.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CapturedAnimations {
    pub standard: Vec<CapturedCall>,
    pub trigger_bound: Vec<CapturedCall>,
}

impl CapturedAnimations {
    /// Route a call into its bucket, preserving call order within each.
    pub fn push(&mut self, call: CapturedCall) {
        if call.is_trigger_bound() {
            self.trigger_bound.push(call);
        } else {
            self.standard.push(call);
        }
    }

    pub fn len(&self) -> usize {
        self.standard.len() + self.trigger_bound.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// All calls made through one library, standard bucket first.
    pub fn for_library(&self, library: Library) -> impl Iterator<Item = &CapturedCall> {
        self.standard
            .iter()
            .chain(self.trigger_bound.iter())
            .filter(move |c| c.library == library)
    }
}

/// One CSS transition or keyframe animation observed on an element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnimationDetail {
    Transition {
        property: String,
        duration: String,
        delay: String,
        timing_function: String,
    },
    Keyframe {
        animation: String,
        duration: String,
        delay: String,
        iteration_count: String,
    },
}

/// Findings from computed styles and stylesheet rules.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CssFindings {
    /// Easings read from resolved element styles.
    pub computed: EasingSet,
    /// Bezier literals found in readable stylesheet rule text.
    pub stylesheet: EasingSet,
    /// Names of `@keyframes` rules.
    pub keyframes: BTreeSet<String>,
    pub details: Vec<AnimationDetail>,
    /// Stylesheets whose rules could not be read (cross-origin).
    pub unreadable_stylesheets: u32,
}

impl CssFindings {
    /// Union of both CSS channels.
    pub fn transitions(&self) -> EasingSet {
        self.computed.union(&self.stylesheet)
    }
}

/// Easings recovered from script text for one dialect, per channel.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DialectEasings {
    pub inline_script: EasingSet,
    pub network_script: EasingSet,
}

impl DialectEasings {
    /// Final easing set: channels merged additively.
    pub fn merged(&self) -> EasingSet {
        self.inline_script.union(&self.network_script)
    }
}

/// A sampled element that carries animation trigger markup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementSample {
    pub tag: String,
    #[serde(default)]
    pub classes: String,
    #[serde(default)]
    pub data_attributes: String,
}

/// Markup-level hints about how animations are wired.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ElementPatterns {
    pub animated_count: u32,
    pub samples: Vec<ElementSample>,
    pub has_scroll_animations: bool,
    pub has_data_attributes: bool,
    pub has_scroll_classes: bool,
}

/// Counters from the network evidence collector.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NetworkStats {
    pub scripts_seen: u32,
    pub scripts_captured: u32,
    pub unhinted_attempts: u32,
    pub sample_urls: Vec<String>,
}

/// Viewport dimensions in CSS pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            width: 1920,
            height: 1080,
        }
    }
}

/// Everything learned about one analyzed URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteRecord {
    /// URL as requested.
    pub url: String,
    /// URL the page settled on.
    pub final_url: String,
    pub title: String,
    pub description: String,
    pub viewport: Viewport,
    pub captured_at: DateTime<Utc>,
    pub libraries: BTreeMap<Library, Detection>,
    pub css: CssFindings,
    pub captured: CapturedAnimations,
    pub easings: BTreeMap<ScriptDialect, DialectEasings>,
    pub elements: ElementPatterns,
    pub network: NetworkStats,
}

impl SiteRecord {
    pub fn detection(&self, library: Library) -> Option<&Detection> {
        self.libraries.get(&library)
    }

    pub fn is_detected(&self, library: Library) -> bool {
        self.detection(library).map(Detection::detected).unwrap_or(false)
    }

    /// Final (all-channel) easing set for a script dialect.
    pub fn script_easings(&self, dialect: ScriptDialect) -> EasingSet {
        self.easings
            .get(&dialect)
            .map(DialectEasings::merged)
            .unwrap_or_default()
    }
}
