//! Evidence reconciler.
//!
//! Detection is a union over independent signals: every positive signal adds
//! a tag and none can remove one. The first pass runs on what the page
//! probes and hooks observed; the second pass folds in the network capture,
//! which is only complete once the page has closed.

use crate::extract::probe::PageSignals;
use crate::extract::rules::ScriptSource;
use crate::extract::{self, PageEvidence};
use crate::instrument::CaptureLog;
use crate::model::{
    Detection, DialectEasings, EasingSet, Library, ScriptDialect, SiteRecord, Viewport,
};
use crate::network::NetworkEvidence;
use crate::signatures::{self, CompiledSignature};
use chrono::Utc;
use serde_json::json;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// The runtime hook wrapped the library's entry points.
pub const TAG_RUNTIME_HOOK: &str = "runtime-hook";
/// ScrollTrigger was found through GSAP's plugin registry.
pub const TAG_REGISTERED_PLUGIN: &str = "registered-plugin";

pub type Detections = BTreeMap<Library, Detection>;

/// Everything one session gathered, handed over after the page closed.
#[derive(Debug, Clone)]
pub struct SessionEvidence {
    pub url: String,
    pub final_url: String,
    pub viewport: Viewport,
    pub page: PageEvidence,
    pub captures: CaptureLog,
    pub network: NetworkEvidence,
}

/// First pass: signals observed inside the page.
pub fn detect_in_page(page: &PageEvidence, captures: &CaptureLog) -> Detections {
    signatures::compiled()
        .iter()
        .map(|compiled| {
            let library = compiled.signature.library;
            let mut detection = Detection::new();
            add_page_signals(&mut detection, compiled, page);
            if let Some(version) = captures.hooked.get(&library) {
                detection.add_evidence(TAG_RUNTIME_HOOK);
                detection.set_version(version.clone());
            }
            add_library_info(&mut detection, library, &page.signals);
            (library, detection)
        })
        .collect()
}

fn add_page_signals(detection: &mut Detection, compiled: &CompiledSignature, page: &PageEvidence) {
    let signature = compiled.signature;
    let signals = &page.signals;

    for global in signature.globals {
        if signals.has_global(global) {
            detection.add_evidence(format!("global.{global}"));
        }
    }
    if signature.legacy_globals.iter().any(|g| signals.has_global(g)) {
        detection.add_evidence(signatures::TAG_LEGACY_GLOBAL);
    }
    if let Some(re) = &compiled.script_src {
        if signals.script_srcs.iter().any(|src| re.is_match(src)) {
            detection.add_evidence(signatures::TAG_SCRIPT_SRC);
        }
    }
    if let Some(re) = &compiled.inline_code {
        if page.inline_scripts.iter().any(|text| re.is_match(text)) {
            detection.add_evidence(signatures::TAG_INLINE_CODE);
        }
    }
    if let Some(re) = &compiled.resource {
        if signals.resources.iter().any(|name| re.is_match(name)) {
            detection.add_evidence(signatures::TAG_RESOURCE);
        }
    }
}

fn add_library_info(detection: &mut Detection, library: Library, signals: &PageSignals) {
    let version = |key: &str| signals.versions.get(key).cloned();
    match library {
        Library::Gsap => {
            detection.set_version(version("gsap"));
            detection.set_version(version("gsap_legacy"));
        }
        Library::Anime => detection.set_version(version("anime")),
        Library::ScrollTrigger => {
            if let Some(st) = &signals.scroll_trigger {
                if st.registered {
                    detection.add_evidence(TAG_REGISTERED_PLUGIN);
                }
                detection.set_version(st.version.clone());
                detection.set_extra("available", json!(true));
                if let Some(triggers) = st.triggers {
                    detection.set_extra("triggers", json!(triggers));
                }
            }
        }
        Library::Lenis => {
            if let Some(lenis) = &signals.lenis {
                detection.set_extra("smooth", json!(lenis.smooth));
            }
        }
        Library::LocomotiveScroll => {
            if signals.has_global("LocomotiveScroll") {
                detection.set_extra("present", json!(true));
            }
        }
    }
}

/// Second pass: fold network URL and body matches into existing detections.
pub fn merge_network(detections: &mut Detections, network: &NetworkEvidence) {
    for library in &network.url_hits {
        detections
            .entry(*library)
            .or_default()
            .add_evidence(signatures::TAG_NETWORK_URL);
    }
    for library in network.body_hits() {
        detections
            .entry(library)
            .or_default()
            .add_evidence(signatures::TAG_NETWORK_BODY);
    }
}

fn is_detected(detections: &Detections, library: Library) -> bool {
    detections.get(&library).is_some_and(Detection::detected)
}

/// Assemble the final record for one site.
pub fn reconcile(evidence: SessionEvidence) -> SiteRecord {
    let SessionEvidence {
        url,
        final_url,
        viewport,
        page,
        captures,
        network,
    } = evidence;

    let mut libraries = detect_in_page(&page, &captures);
    let inline = extract::script_easings(
        page.inline_scripts.iter().map(|text| (text.as_str(), None)),
        ScriptSource::Inline,
        |l| is_detected(&libraries, l),
    );

    merge_network(&mut libraries, &network);
    let from_network = extract::script_easings(
        network
            .scripts
            .iter()
            .map(|s| (s.text.as_str(), Some(s.url.as_str()))),
        ScriptSource::Network,
        |l| is_detected(&libraries, l),
    );

    let easings: BTreeMap<ScriptDialect, DialectEasings> = ScriptDialect::ALL
        .into_iter()
        .map(|dialect| {
            let pick = |m: &BTreeMap<ScriptDialect, EasingSet>| {
                m.get(&dialect).cloned().unwrap_or_default()
            };
            let channels = DialectEasings {
                inline_script: pick(&inline),
                network_script: pick(&from_network),
            };
            (dialect, channels)
        })
        .collect();

    let detected: Vec<&str> = libraries
        .iter()
        .filter(|(_, d)| d.detected())
        .map(|(l, _)| l.display_name())
        .collect();
    if detected.is_empty() {
        info!("{url}: no animation libraries detected");
        debug!(
            "{url}: {} script(s) seen, samples: {:?}",
            network.stats.scripts_seen, network.stats.sample_urls
        );
    } else {
        info!(
            "{url}: detected {} ({} captured call(s), {} css easing(s))",
            detected.join(", "),
            captures.captured.len(),
            page.css.transitions().len()
        );
    }

    let mut elements = page.elements;
    elements.has_scroll_animations = !captures.captured.trigger_bound.is_empty();

    let metadata = page.metadata;
    SiteRecord {
        url,
        final_url: if metadata.url.is_empty() {
            final_url
        } else {
            metadata.url
        },
        title: metadata.title,
        description: metadata.description,
        viewport: metadata.viewport.unwrap_or(viewport),
        captured_at: Utc::now(),
        libraries,
        css: page.css,
        captured: captures.captured,
        easings,
        elements,
        network: network.stats,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extract::probe::ScrollTriggerInfo;
    use crate::network::CapturedScript;
    use std::collections::BTreeSet;

    fn page_with_globals(globals: &[&str]) -> PageEvidence {
        let mut page = PageEvidence::default();
        for g in globals {
            page.signals.globals.insert(g.to_string(), true);
        }
        page
    }

    fn evidence(
        page: PageEvidence,
        captures: CaptureLog,
        network: NetworkEvidence,
    ) -> SessionEvidence {
        SessionEvidence {
            url: "https://site.test/".into(),
            final_url: "https://site.test/home".into(),
            viewport: Viewport::default(),
            page,
            captures,
            network,
        }
    }

    #[test]
    fn test_absent_library_has_no_evidence() {
        let detections = detect_in_page(&PageEvidence::default(), &CaptureLog::default());
        for library in Library::ALL {
            let d = &detections[&library];
            assert!(!d.detected(), "{library} should not be detected");
            assert!(d.evidence().is_empty());
        }
    }

    #[test]
    fn test_signals_accumulate() {
        let mut page = page_with_globals(&["gsap", "TweenMax"]);
        page.signals.script_srcs.push("https://cdn.test/gsap.min.js".into());
        page.signals.resources.push("https://cdn.test/gsap.min.js".into());
        page.inline_scripts.push("gsap.to('.x', {y: 1})".into());
        page.signals.versions.insert("gsap_legacy".into(), "2.1.3".into());
        page.signals.versions.insert("gsap".into(), "3.12.5".into());

        let detections = detect_in_page(&page, &CaptureLog::default());
        let gsap = &detections[&Library::Gsap];
        let expected: BTreeSet<String> = [
            "global.gsap",
            signatures::TAG_LEGACY_GLOBAL,
            signatures::TAG_SCRIPT_SRC,
            signatures::TAG_RESOURCE,
            signatures::TAG_INLINE_CODE,
        ]
        .into_iter()
        .map(String::from)
        .collect();
        assert_eq!(gsap.evidence(), &expected);
        assert_eq!(gsap.version(), Some("3.12.5"));
    }

    #[test]
    fn test_registered_scroll_trigger() {
        let mut page = page_with_globals(&["gsap"]);
        page.signals.scroll_trigger = Some(ScrollTriggerInfo {
            version: Some("3.12.5".into()),
            triggers: Some(3),
            registered: true,
        });
        let detections = detect_in_page(&page, &CaptureLog::default());
        let st = &detections[&Library::ScrollTrigger];
        assert!(st.has_evidence(TAG_REGISTERED_PLUGIN));
        assert_eq!(st.extra()["triggers"], json!(3));
        assert_eq!(st.extra()["available"], json!(true));
    }

    #[test]
    fn test_hooked_library_is_detected() {
        let mut captures = CaptureLog::default();
        captures.ingest(r#"{"kind":"hooked","library":"anime","version":"3.2.1"}"#);
        let detections = detect_in_page(&PageEvidence::default(), &captures);
        let anime = &detections[&Library::Anime];
        assert!(anime.has_evidence(TAG_RUNTIME_HOOK));
        assert_eq!(anime.version(), Some("3.2.1"));
    }

    #[test]
    fn test_network_pass_only_adds() {
        let mut detections = detect_in_page(&page_with_globals(&["gsap"]), &CaptureLog::default());
        let network = NetworkEvidence {
            scripts: vec![CapturedScript {
                url: "https://a.test/bundle.js".into(),
                text: "new Lenis({ smooth: true })".into(),
                hinted: false,
            }],
            url_hits: BTreeSet::from([Library::Gsap]),
            ..Default::default()
        };
        merge_network(&mut detections, &network);

        let gsap = &detections[&Library::Gsap];
        assert!(gsap.has_evidence("global.gsap"));
        assert!(gsap.has_evidence(signatures::TAG_NETWORK_URL));
        assert!(detections[&Library::Lenis].has_evidence(signatures::TAG_NETWORK_BODY));
        assert!(!detections[&Library::Anime].detected());
    }

    #[test]
    fn test_reconcile_merges_channels() {
        let mut page = page_with_globals(&["gsap"]);
        page.inline_scripts
            .push(r#"gsap.to(".hero", { ease: "power2.out" })"#.into());
        page.metadata.title = "Site".into();
        let network = NetworkEvidence {
            scripts: vec![CapturedScript {
                url: "https://cdn.test/gsap-app.js".into(),
                text: r#"gsap.to(".a",{ease:"expo.inOut"});gsap.to(".b",{ease:"power2.out"})"#.into(),
                hinted: true,
            }],
            ..Default::default()
        };
        let mut captures = CaptureLog::default();
        captures.ingest(r#"{"kind":"call","library":"gsap","method":"to","ease":"power1.inOut","duration":0.5,"delay":0,"trigger":"{}"}"#);

        let record = reconcile(evidence(page, captures, network));
        let gsap = &record.easings[&ScriptDialect::Gsap];
        assert!(gsap.inline_script.contains("power2.out"));
        assert!(gsap.network_script.contains("expo.inOut"));
        assert_eq!(record.script_easings(ScriptDialect::Gsap).len(), 2);
        assert!(record.elements.has_scroll_animations);
        assert_eq!(record.final_url, "https://site.test/home");
        assert_eq!(record.title, "Site");
        assert!(record.is_detected(Library::Gsap));
    }

    #[test]
    fn test_anime_text_ignored_unless_detected() {
        let mut page = PageEvidence::default();
        page.inline_scripts.push("animate({ easing: 'easeInQuad' })".into());
        let record = reconcile(evidence(
            page.clone(),
            CaptureLog::default(),
            NetworkEvidence::default(),
        ));
        assert!(record.script_easings(ScriptDialect::Anime).is_empty());

        page.signals.globals.insert("anime".into(), true);
        let record = reconcile(evidence(page, CaptureLog::default(), NetworkEvidence::default()));
        assert!(record.script_easings(ScriptDialect::Anime).contains("easeInQuad"));
    }
}
