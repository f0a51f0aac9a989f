//! Static extraction: easing literals and structure recovered from page
//! styles, the DOM and script text, without relying on runtime hooks.

pub mod css;
pub mod probe;
pub mod rules;

use crate::model::{CssFindings, EasingSet, ElementPatterns, Library, ScriptDialect};
use crate::renderer::RenderContext;
use crate::signatures;
use probe::{
    ComputedProbe, ElementProbe, PageMetadata, PageSignals, ProbeSection, ScriptProbe,
    StylesheetProbe,
};
use rules::ScriptSource;
use std::collections::BTreeMap;
use tracing::debug;

/// Everything the in-page probes observed on the settled page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageEvidence {
    pub metadata: PageMetadata,
    pub signals: PageSignals,
    pub css: CssFindings,
    pub inline_scripts: Vec<String>,
    pub elements: ElementPatterns,
}

/// Run every probe section against the page. Never fails: a broken section
/// only leaves its part of the evidence empty.
pub async fn collect_page_evidence(
    ctx: &dyn RenderContext,
    max_script_bytes: usize,
) -> PageEvidence {
    let metadata: PageMetadata =
        probe::run_probe(ctx, ProbeSection::Metadata, probe::metadata_script()).await;

    let signals_script = probe::signals_script(&signatures::probed_globals());
    let signals: PageSignals = probe::run_probe(ctx, ProbeSection::Signals, &signals_script).await;

    let computed: ComputedProbe =
        probe::run_probe(ctx, ProbeSection::Computed, probe::computed_script()).await;
    let sheets: StylesheetProbe =
        probe::run_probe(ctx, ProbeSection::Stylesheets, probe::stylesheets_script()).await;

    let scripts_script = probe::scripts_script(max_script_bytes);
    let scripts: ScriptProbe = probe::run_probe(ctx, ProbeSection::Scripts, &scripts_script).await;

    let elements: ElementProbe =
        probe::run_probe(ctx, ProbeSection::Elements, probe::elements_script()).await;

    let (computed_easings, details) = css::computed_findings(&computed.styles);
    let css = CssFindings {
        computed: computed_easings,
        stylesheet: css::stylesheet_easings(&sheets.rules),
        keyframes: sheets.keyframes.into_iter().collect(),
        details,
        unreadable_stylesheets: sheets.unreadable,
    };
    debug!(
        "css: {} computed, {} stylesheet easings, {} unreadable sheets",
        css.computed.len(),
        css.stylesheet.len(),
        css.unreadable_stylesheets
    );

    PageEvidence {
        metadata,
        signals,
        css,
        inline_scripts: scripts.inline,
        elements: ElementPatterns {
            animated_count: elements.animated_count,
            samples: elements.samples,
            has_scroll_animations: false,
            has_data_attributes: elements.has_data_attributes,
            has_scroll_classes: elements.has_scroll_classes,
        },
    }
}

/// Easings per dialect from a set of script texts of one source.
///
/// `texts` pairs each script body with its URL when known.
pub fn script_easings<'a>(
    texts: impl IntoIterator<Item = (&'a str, Option<&'a str>)>,
    source: ScriptSource,
    detected: impl Fn(Library) -> bool,
) -> BTreeMap<ScriptDialect, EasingSet> {
    let mut out: BTreeMap<ScriptDialect, EasingSet> = ScriptDialect::ALL
        .into_iter()
        .map(|d| (d, EasingSet::new()))
        .collect();
    for (text, url) in texts {
        for dialect in ScriptDialect::ALL {
            let found = rules::extract_gated(dialect, source, text, url, &detected);
            if let Some(set) = out.get_mut(&dialect) {
                set.merge(&found);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_easings_are_per_dialect() {
        let inline = [
            (r#"gsap.to('.a', { ease: "power4.out" })"#, None),
            (r#"motion.div({ transition: { ease: [0.2, 0.8, 0.2, 1] } })"#, None),
            (r#"anime({ easing: 'easeOutExpo' })"#, None),
        ];
        let found = script_easings(inline, ScriptSource::Inline, |l| l == Library::Anime);
        assert!(found[&ScriptDialect::Gsap].contains("power4.out"));
        assert!(found[&ScriptDialect::Declarative].contains("[0.2, 0.8, 0.2, 1]"));
        assert!(!found[&ScriptDialect::Declarative].contains("power4.out"));
        assert!(found[&ScriptDialect::Anime].contains("easeOutExpo"));
    }

    #[test]
    fn test_script_easings_idempotent() {
        let text = r#"gsap.to(x, { ease: "back.out(1.7)" }); gsap.to(y, { ease: Power2.easeIn })"#;
        let a = script_easings([(text, None)], ScriptSource::Inline, |_| false);
        let b = script_easings([(text, None), (text, None)], ScriptSource::Inline, |_| false);
        assert_eq!(a, b);
    }
}
