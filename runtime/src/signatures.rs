//! Declarative per-library detection signals.
//!
//! Each supported library is described once: which globals it installs,
//! and which patterns identify it in script URLs, inline script text,
//! resource-timing entries and captured network scripts. Detection and the
//! network collector both read this table, so adding a library does not
//! touch the reconciliation logic.

use crate::model::Library;
use regex::Regex;
use std::sync::OnceLock;

/// Evidence tag for a legacy global alias.
pub const TAG_LEGACY_GLOBAL: &str = "global.legacy";
pub const TAG_SCRIPT_SRC: &str = "script-src";
pub const TAG_INLINE_CODE: &str = "inline-code";
pub const TAG_RESOURCE: &str = "resource";
pub const TAG_NETWORK_URL: &str = "network-js-url";
pub const TAG_NETWORK_BODY: &str = "network-js";

/// Detection signals for one library. Patterns are case-insensitive.
#[derive(Debug, Clone, Copy)]
pub struct LibrarySignature {
    pub library: Library,
    /// Globals whose presence is direct evidence; tagged `global.<name>`.
    pub globals: &'static [&'static str],
    /// Older aliases; any one of them is tagged [`TAG_LEGACY_GLOBAL`].
    pub legacy_globals: &'static [&'static str],
    pub script_src: Option<&'static str>,
    pub inline_code: Option<&'static str>,
    pub resource: Option<&'static str>,
    /// Matched against captured script URLs and bodies.
    pub network: Option<&'static str>,
}

pub const SIGNATURES: &[LibrarySignature] = &[
    LibrarySignature {
        library: Library::Gsap,
        globals: &["gsap"],
        legacy_globals: &["TweenMax", "TweenLite", "TimelineMax", "TimelineLite"],
        script_src: Some(r"(gsap|greensock|tweenmax|tweenlite|scrolltrigger)"),
        inline_code: Some(r"(\bgsap\b|CustomEase|ScrollTrigger|TweenMax|TweenLite)"),
        resource: Some(r"(gsap|greensock|scrolltrigger|tweenmax|tweenlite)"),
        network: Some(
            r"(\bgsap\b|greensock|scrolltrigger|customease|tweenmax|tweenlite|timelinemax|timelinelite)",
        ),
    },
    LibrarySignature {
        library: Library::ScrollTrigger,
        globals: &["ScrollTrigger"],
        legacy_globals: &[],
        script_src: Some(r"scrolltrigger"),
        inline_code: Some(r"\bScrollTrigger\b"),
        resource: Some(r"scrolltrigger"),
        network: Some(r"scrolltrigger"),
    },
    LibrarySignature {
        library: Library::Anime,
        globals: &["anime"],
        legacy_globals: &[],
        script_src: Some(r"anime(\.min)?\.js"),
        inline_code: Some(r"\banime\b"),
        resource: Some(r"anime(\.min)?\.js"),
        network: Some(r"(anime(\.min)?\.js|\banime\.timeline\b)"),
    },
    LibrarySignature {
        library: Library::Lenis,
        globals: &["Lenis"],
        legacy_globals: &[],
        script_src: Some(r"\blenis\b"),
        inline_code: None,
        resource: Some(r"\blenis\b"),
        network: Some(r"\blenis\b"),
    },
    LibrarySignature {
        library: Library::LocomotiveScroll,
        globals: &["LocomotiveScroll"],
        legacy_globals: &[],
        script_src: Some(r"locomotive-scroll"),
        inline_code: None,
        resource: Some(r"locomotive-scroll"),
        network: Some(r"locomotive-scroll"),
    },
];

/// A signature with its patterns compiled.
pub struct CompiledSignature {
    pub signature: &'static LibrarySignature,
    pub script_src: Option<Regex>,
    pub inline_code: Option<Regex>,
    pub resource: Option<Regex>,
    pub network: Option<Regex>,
}

fn compile(pattern: Option<&str>) -> Option<Regex> {
    pattern.map(|p| Regex::new(&format!("(?i){p}")).expect("valid regex"))
}

/// The signature table, compiled once.
pub fn compiled() -> &'static [CompiledSignature] {
    static COMPILED: OnceLock<Vec<CompiledSignature>> = OnceLock::new();
    COMPILED.get_or_init(|| {
        SIGNATURES
            .iter()
            .map(|signature| CompiledSignature {
                signature,
                script_src: compile(signature.script_src),
                inline_code: compile(signature.inline_code),
                resource: compile(signature.resource),
                network: compile(signature.network),
            })
            .collect()
    })
}

/// Look up the compiled signature for one library.
pub fn signature(library: Library) -> Option<&'static CompiledSignature> {
    compiled().iter().find(|c| c.signature.library == library)
}

/// Every global name the page probe must check.
pub fn probed_globals() -> Vec<&'static str> {
    SIGNATURES
        .iter()
        .flat_map(|s| s.globals.iter().chain(s.legacy_globals.iter()))
        .copied()
        .collect()
}

/// Libraries whose network pattern matches `text` (a URL or a script body).
pub fn network_matches(text: &str) -> Vec<Library> {
    compiled()
        .iter()
        .filter(|c| c.network.as_ref().is_some_and(|re| re.is_match(text)))
        .map(|c| c.signature.library)
        .collect()
}

/// Whether `text` is relevant to any known library.
pub fn is_network_relevant(text: &str) -> bool {
    compiled()
        .iter()
        .any(|c| c.network.as_ref().is_some_and(|re| re.is_match(text)))
}
