//! CSS easing channels: resolved element styles and stylesheet rule text.

use crate::model::{AnimationDetail, EasingSet};
use regex::Regex;
use serde::Deserialize;
use std::sync::OnceLock;

/// Maximum number of per-element animation details kept per site.
pub const MAX_ANIMATION_DETAILS: usize = 50;

/// Computed `transition` values that declare no real transition.
const DEFAULT_TRANSITIONS: &[&str] = &["all 0s ease 0s", "none", "all", ""];

/// Computed `animation` values that declare no real animation.
const DEFAULT_ANIMATIONS: &[&str] = &["none", "none 0s ease 0s 1 normal none running", ""];

/// Timing-function keywords recognized as easing values.
pub const NAMED_KEYWORDS: &[&str] = &[
    "linear",
    "ease",
    "ease-in",
    "ease-out",
    "ease-in-out",
    "step-start",
    "step-end",
];

/// Resolved animation-related style values of one element.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ComputedStyle {
    pub transition: String,
    pub transition_property: String,
    pub transition_duration: String,
    pub transition_delay: String,
    pub transition_timing_function: String,
    pub animation: String,
    pub animation_duration: String,
    pub animation_delay: String,
    pub animation_iteration_count: String,
    pub animation_timing_function: String,
}

impl ComputedStyle {
    pub fn has_transition(&self) -> bool {
        !DEFAULT_TRANSITIONS.contains(&self.transition.trim())
    }

    pub fn has_animation(&self) -> bool {
        !DEFAULT_ANIMATIONS.contains(&self.animation.trim())
    }
}

fn bezier_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"cubic-bezier\(\s*([-\d.]+)\s*,\s*([-\d.]+)\s*,\s*([-\d.]+)\s*,\s*([-\d.]+)\s*\)",
        )
        .expect("valid regex")
    })
}

/// Every 4-argument bezier literal in `text`, normalized to
/// `cubic-bezier(a, b, c, d)` with the numbers kept as written.
pub fn bezier_literals(text: &str) -> Vec<String> {
    bezier_regex()
        .captures_iter(text)
        .map(|c| format!("cubic-bezier({}, {}, {}, {})", &c[1], &c[2], &c[3], &c[4]))
        .collect()
}

/// Split a comma-separated value list at top level (commas inside
/// parentheses do not split).
fn split_top_level(list: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;
    for (i, ch) in list.char_indices() {
        match ch {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(list[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(list[start..].trim());
    parts.retain(|p| !p.is_empty());
    parts
}

/// Easing values in a timing-function list: bezier literals and named
/// keywords. Other functions (`steps()`, `linear()`) are ignored.
pub fn timing_function_easings(list: &str) -> Vec<String> {
    let mut out = Vec::new();
    for item in split_top_level(list) {
        if item.starts_with("cubic-bezier(") {
            out.extend(bezier_literals(item));
        } else if NAMED_KEYWORDS.contains(&item) {
            out.push(item.to_string());
        }
    }
    out
}

/// Easings and details from resolved element styles.
///
/// Elements whose transition and animation are both the no-op defaults
/// contribute nothing.
pub fn computed_findings(styles: &[ComputedStyle]) -> (EasingSet, Vec<AnimationDetail>) {
    let mut easings = EasingSet::new();
    let mut details = Vec::new();

    for style in styles {
        if style.has_transition() {
            for bezier in bezier_literals(&style.transition) {
                easings.insert(bezier);
            }
            for easing in timing_function_easings(&style.transition_timing_function) {
                easings.insert(easing);
            }
            if details.len() < MAX_ANIMATION_DETAILS {
                details.push(AnimationDetail::Transition {
                    property: style.transition_property.clone(),
                    duration: style.transition_duration.clone(),
                    delay: style.transition_delay.clone(),
                    timing_function: style.transition_timing_function.clone(),
                });
            }
        }

        if style.has_animation() {
            for bezier in bezier_literals(&style.animation) {
                easings.insert(bezier);
            }
            for easing in timing_function_easings(&style.animation_timing_function) {
                easings.insert(easing);
            }
            if details.len() < MAX_ANIMATION_DETAILS {
                details.push(AnimationDetail::Keyframe {
                    animation: style.animation.clone(),
                    duration: style.animation_duration.clone(),
                    delay: style.animation_delay.clone(),
                    iteration_count: style.animation_iteration_count.clone(),
                });
            }
        }
    }

    (easings, details)
}

/// Bezier literals from readable stylesheet rule text.
pub fn stylesheet_easings<S: AsRef<str>>(rules: &[S]) -> EasingSet {
    rules
        .iter()
        .flat_map(|rule| bezier_literals(rule.as_ref()))
        .collect()
}
