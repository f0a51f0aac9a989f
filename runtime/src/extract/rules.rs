//! Declarative easing rules for script text.
//!
//! Every rule is a (dialect, pattern, capture, rendering, denylist) tuple and
//! all of them are applied the same way; per-dialect gating decides which
//! script texts a dialect's rules see at all.

use crate::model::{EasingSet, Library, ScriptDialect};
use regex::Regex;
use std::sync::OnceLock;

/// Which part of a match becomes the easing value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capture {
    /// The first capture group.
    Group,
    /// The whole match.
    Whole,
}

/// How the captured text is turned into an easing string.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Render {
    Trimmed,
    Verbatim,
    /// Wrapped in `[...]`, as for array-valued curves.
    Bracketed,
}

#[derive(Debug, Clone, Copy)]
pub struct EasingRule {
    pub dialect: ScriptDialect,
    pub pattern: &'static str,
    pub capture: Capture,
    pub render: Render,
    /// Values containing any of these fragments are dropped.
    pub deny: &'static [&'static str],
}

pub const EASING_RULES: &[EasingRule] = &[
    EasingRule {
        dialect: ScriptDialect::Gsap,
        pattern: r#"ease\s*:\s*["']([^"']+)["']"#,
        capture: Capture::Group,
        render: Render::Trimmed,
        deny: &[],
    },
    EasingRule {
        dialect: ScriptDialect::Gsap,
        pattern: r"ease\s*:\s*([a-zA-Z_$][\w$]*(?:\.[\w$]+)*(?:\([^)]*\))?)\s*[,}]",
        capture: Capture::Group,
        render: Render::Trimmed,
        deny: &[],
    },
    EasingRule {
        dialect: ScriptDialect::Gsap,
        pattern: r"CustomEase\.create\([^)]*\)",
        capture: Capture::Whole,
        render: Render::Verbatim,
        deny: &[],
    },
    EasingRule {
        dialect: ScriptDialect::Anime,
        pattern: r#"easing\s*:\s*["']([^"']+)["']"#,
        capture: Capture::Group,
        render: Render::Verbatim,
        deny: &[],
    },
    EasingRule {
        dialect: ScriptDialect::Declarative,
        pattern: r"ease\s*:\s*\[([^\]]+)\]",
        capture: Capture::Group,
        render: Render::Bracketed,
        deny: &[],
    },
    EasingRule {
        dialect: ScriptDialect::Declarative,
        pattern: r#"ease\s*:\s*["']([^"']+)["']"#,
        capture: Capture::Group,
        render: Render::Verbatim,
        deny: &["power", "expo"],
    },
];

/// When a dialect's rules are applied to a piece of script text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Gate {
    Always,
    Never,
    /// The text (or its URL) matches this case-insensitive pattern.
    TextMatches(&'static str),
    /// The library was detected on the page.
    LibraryDetected(Library),
}

/// Where script text came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptSource {
    Inline,
    Network,
}

#[derive(Debug, Clone, Copy)]
pub struct DialectGate {
    pub dialect: ScriptDialect,
    pub inline: Gate,
    pub network: Gate,
}

pub const DIALECT_GATES: &[DialectGate] = &[
    DialectGate {
        dialect: ScriptDialect::Gsap,
        inline: Gate::TextMatches(r"(\bgsap\b|CustomEase|ScrollTrigger|TweenMax|TweenLite)"),
        network: Gate::TextMatches(
            r"(\bgsap\b|greensock|scrolltrigger|customease|tweenmax|tweenlite|timelinemax|timelinelite)",
        ),
    },
    DialectGate {
        dialect: ScriptDialect::Anime,
        inline: Gate::LibraryDetected(Library::Anime),
        network: Gate::LibraryDetected(Library::Anime),
    },
    DialectGate {
        dialect: ScriptDialect::Declarative,
        inline: Gate::Always,
        network: Gate::Never,
    },
];

struct CompiledRule {
    rule: &'static EasingRule,
    regex: Regex,
}

fn compiled_rules() -> &'static [CompiledRule] {
    static RULES: OnceLock<Vec<CompiledRule>> = OnceLock::new();
    RULES.get_or_init(|| {
        EASING_RULES
            .iter()
            .map(|rule| CompiledRule {
                rule,
                regex: Regex::new(rule.pattern).expect("valid regex"),
            })
            .collect()
    })
}

fn gate_regex(pattern: &'static str) -> Option<&'static Regex> {
    static GATES: OnceLock<Vec<(&'static str, Regex)>> = OnceLock::new();
    let gates = GATES.get_or_init(|| {
        DIALECT_GATES
            .iter()
            .flat_map(|g| [g.inline, g.network])
            .filter_map(|gate| match gate {
                Gate::TextMatches(p) => {
                    Some((p, Regex::new(&format!("(?i){p}")).expect("valid regex")))
                }
                _ => None,
            })
            .collect()
    });
    gates.iter().find(|(p, _)| *p == pattern).map(|(_, re)| re)
}

/// Whether `dialect` should be extracted from this text.
pub fn dialect_applies(
    dialect: ScriptDialect,
    source: ScriptSource,
    text: &str,
    url: Option<&str>,
    detected: impl Fn(Library) -> bool,
) -> bool {
    let Some(gate) = DIALECT_GATES.iter().find(|g| g.dialect == dialect) else {
        return false;
    };
    let gate = match source {
        ScriptSource::Inline => gate.inline,
        ScriptSource::Network => gate.network,
    };
    match gate {
        Gate::Always => true,
        Gate::Never => false,
        Gate::LibraryDetected(library) => detected(library),
        Gate::TextMatches(pattern) => gate_regex(pattern)
            .is_some_and(|re| re.is_match(text) || url.is_some_and(|u| re.is_match(u))),
    }
}

/// Apply every rule of `dialect` to `text`, unioning all matches.
pub fn extract(dialect: ScriptDialect, text: &str) -> EasingSet {
    let mut found = EasingSet::new();
    for compiled in compiled_rules().iter().filter(|c| c.rule.dialect == dialect) {
        let rule = compiled.rule;
        for caps in compiled.regex.captures_iter(text) {
            let raw = match rule.capture {
                Capture::Group => caps.get(1),
                Capture::Whole => caps.get(0),
            };
            let Some(raw) = raw.map(|m| m.as_str()) else {
                continue;
            };
            if rule.deny.iter().any(|d| raw.contains(d)) {
                continue;
            }
            let value = match rule.render {
                Render::Trimmed => raw.trim().to_string(),
                Render::Verbatim => raw.to_string(),
                Render::Bracketed => format!("[{raw}]"),
            };
            found.insert(value);
        }
    }
    found
}

/// Extract `dialect` from `text` if the dialect's gate admits it.
pub fn extract_gated(
    dialect: ScriptDialect,
    source: ScriptSource,
    text: &str,
    url: Option<&str>,
    detected: impl Fn(Library) -> bool,
) -> EasingSet {
    if dialect_applies(dialect, source, text, url, detected) {
        extract(dialect, text)
    } else {
        EasingSet::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gsap_quoted_identifier_and_custom_ease() {
        let text = r#"
            gsap.to(".a", { ease: "power2.out", duration: 1 });
            gsap.from(".b", { y: 20, ease: Expo.easeOut });
            gsap.to(".c", { ease: steps(12) });
            CustomEase.create("hop", "M0,0 C0.5,0 0.5,1 1,1");
        "#;
        let set = extract(ScriptDialect::Gsap, text);
        assert!(set.contains("power2.out"));
        assert!(set.contains("Expo.easeOut"));
        assert!(set.contains("steps(12)"));
        assert!(set.contains(r#"CustomEase.create("hop", "M0,0 C0.5,0 0.5,1 1,1")"#));
        assert_eq!(set.len(), 4);
    }

    #[test]
    fn test_gsap_quoted_value_is_trimmed() {
        let set = extract(ScriptDialect::Gsap, r#"{ ease: " sine.inOut " }"#);
        assert!(set.contains("sine.inOut"));
    }

    #[test]
    fn test_identifier_requires_terminator() {
        // a call expression continuing past the identifier is not an ease value
        let set = extract(ScriptDialect::Gsap, "{ ease: makeEase + 1 }");
        assert!(set.is_empty());
    }

    #[test]
    fn test_anime_easing() {
        let set = extract(
            ScriptDialect::Anime,
            r#"anime({ targets: '.x', easing: 'easeInOutQuad' }); anime({ easing: "spring(1, 80, 10, 0)" })"#,
        );
        assert_eq!(set.len(), 2);
        assert!(set.contains("spring(1, 80, 10, 0)"));
    }

    #[test]
    fn test_declarative_array_and_denylist() {
        let text = r#"
            animate={{ x: 0 }} transition={{ ease: [0.6, 0.01, -0.05, 0.95] }}
            transition={{ ease: "easeOut" }}
            gsap.to(x, { ease: "power3.out" }); gsap.to(y, { ease: "expo.inOut" })
        "#;
        let set = extract(ScriptDialect::Declarative, text);
        assert!(set.contains("[0.6, 0.01, -0.05, 0.95]"));
        assert!(set.contains("easeOut"));
        assert!(!set.contains("power3.out"));
        assert!(!set.contains("expo.inOut"));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_gsap_gate_for_inline_scripts() {
        let none = |_| false;
        assert!(dialect_applies(
            ScriptDialect::Gsap,
            ScriptSource::Inline,
            "gsap.to('.x', {ease: 'none'})",
            None,
            none
        ));
        assert!(!dialect_applies(
            ScriptDialect::Gsap,
            ScriptSource::Inline,
            "const a = { ease: 'linear' }",
            None,
            none
        ));
    }

    #[test]
    fn test_network_gate_accepts_hinted_url() {
        assert!(dialect_applies(
            ScriptDialect::Gsap,
            ScriptSource::Network,
            "!function(t){...}",
            Some("https://cdn.example.com/gsap.min.js"),
            |_| false
        ));
    }

    #[test]
    fn test_anime_gate_follows_detection() {
        let text = "{ easing: 'linear' }";
        let off = extract_gated(ScriptDialect::Anime, ScriptSource::Inline, text, None, |_| false);
        assert!(off.is_empty());
        let on = extract_gated(ScriptDialect::Anime, ScriptSource::Inline, text, None, |l| {
            l == Library::Anime
        });
        assert!(on.contains("linear"));
    }

    #[test]
    fn test_declarative_never_applies_to_network_scripts() {
        assert!(!dialect_applies(
            ScriptDialect::Declarative,
            ScriptSource::Network,
            "ease: [0, 0, 1, 1]",
            None,
            |_| true
        ));
    }
}
