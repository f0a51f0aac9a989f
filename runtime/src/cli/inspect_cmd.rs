//! `motion-probe inspect <results.json>`: print one view of a saved run.

use super::output::{self, Styled};
use crate::model::{ScriptDialect, SiteRecord, SummaryChannel};
use crate::report::BatchReport;
use anyhow::Result;
use clap::ValueEnum;
use serde_json::{json, Value};
use std::path::Path;

/// What to show from a results file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum InspectView {
    /// Static easing sets per site
    Easings,
    /// Runtime-captured animation calls
    Captured,
    /// Scroll-triggered calls with their trigger configuration
    Triggers,
    /// Cross-site frequency tables
    Summary,
    /// Animated element patterns
    Elements,
}

fn site_label(site: &SiteRecord) -> &str {
    if site.title.is_empty() {
        &site.url
    } else {
        &site.title
    }
}

/// JSON form of one view.
pub fn view_json(report: &BatchReport, view: InspectView, limit: usize) -> Value {
    match view {
        InspectView::Summary => {
            let channels: serde_json::Map<String, Value> = SummaryChannel::ALL
                .iter()
                .filter_map(|c| report.summary.channel(*c).map(|t| (c, t)))
                .map(|(c, t)| {
                    let key = serde_json::to_value(c)
                        .ok()
                        .and_then(|v| v.as_str().map(String::from))
                        .unwrap_or_default();
                    (key, json!(t.top(limit)))
                })
                .collect();
            json!({
                "total_sites": report.total_sites,
                "analyzed_sites": report.analyzed_sites,
                "channels": channels,
                "library_sites": report.summary.library_sites,
            })
        }
        _ => Value::Array(
            report
                .records()
                .map(|site| {
                    let body = match view {
                        InspectView::Easings => json!({
                            "css": site.css.transitions(),
                            "gsap": site.script_easings(ScriptDialect::Gsap),
                            "anime": site.script_easings(ScriptDialect::Anime),
                            "declarative": site.script_easings(ScriptDialect::Declarative),
                        }),
                        InspectView::Captured => json!(site.captured.standard),
                        InspectView::Triggers => json!(site.captured.trigger_bound),
                        InspectView::Elements => json!(site.elements),
                        InspectView::Summary => Value::Null,
                    };
                    json!({"url": site.url, "view": body})
                })
                .collect(),
        ),
    }
}

fn print_site(s: &Styled, site: &SiteRecord, view: InspectView, limit: usize) {
    output::print_section(s, site_label(site));
    match view {
        InspectView::Easings => {
            let join = |set: crate::model::EasingSet| {
                let values: Vec<&str> = set.iter().take(limit).collect();
                if values.is_empty() {
                    s.dim("none")
                } else {
                    values.join(", ")
                }
            };
            output::print_row("CSS", &join(site.css.transitions()));
            output::print_row("GSAP", &join(site.script_easings(ScriptDialect::Gsap)));
            output::print_row("Anime.js", &join(site.script_easings(ScriptDialect::Anime)));
            output::print_row(
                "Declarative",
                &join(site.script_easings(ScriptDialect::Declarative)),
            );
        }
        InspectView::Captured | InspectView::Triggers => {
            let calls = if view == InspectView::Captured {
                &site.captured.standard
            } else {
                &site.captured.trigger_bound
            };
            if calls.is_empty() {
                eprintln!("    {}", s.dim("no calls captured"));
            }
            for call in calls.iter().take(limit) {
                let duration = call
                    .duration
                    .map(|d| d.to_string())
                    .unwrap_or_else(|| "?".into());
                let mut line = format!(
                    "{}.{} ease={} duration={duration}",
                    call.library, call.method, call.ease
                );
                if let Some(trigger) = &call.trigger {
                    line.push_str(&format!(" trigger={trigger}"));
                }
                eprintln!("    {line}");
            }
        }
        InspectView::Elements => {
            let e = &site.elements;
            output::print_row("Animated elements", &e.animated_count.to_string());
            output::print_row("Scroll animations", &e.has_scroll_animations.to_string());
            output::print_row("Data attributes", &e.has_data_attributes.to_string());
            output::print_row("Scroll classes", &e.has_scroll_classes.to_string());
            for sample in e.samples.iter().take(limit) {
                eprintln!(
                    "    <{}> {} {}",
                    sample.tag.to_ascii_lowercase(),
                    sample.classes,
                    s.dim(&sample.data_attributes)
                );
            }
        }
        InspectView::Summary => {}
    }
    eprintln!();
}

/// Run the inspect command.
pub fn run(path: &Path, view: InspectView, limit: usize) -> Result<()> {
    let report = BatchReport::load(path)?;
    if output::is_json() {
        output::print_json(&view_json(&report, view, limit));
        return Ok(());
    }

    let s = Styled::new();
    if view == InspectView::Summary {
        output::print_row(
            "Sites analyzed",
            &format!("{}/{}", report.analyzed_sites, report.total_sites),
        );
        eprintln!();
        for channel in SummaryChannel::ALL {
            let Some(table) = report.summary.channel(channel) else {
                continue;
            };
            output::print_section(&s, channel.title());
            if table.unique.is_empty() {
                eprintln!("    {}", s.dim("none"));
            }
            for (value, count) in table.top(limit) {
                output::print_row(&value, &count.to_string());
            }
            eprintln!();
        }
        return Ok(());
    }

    for site in report.records() {
        print_site(&s, site, view, limit);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{BatchResult, CapturedCall, Library, Viewport};
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn report() -> BatchReport {
        let mut record = SiteRecord {
            url: "https://a.test/".into(),
            final_url: "https://a.test/".into(),
            title: String::new(),
            description: String::new(),
            viewport: Viewport::default(),
            captured_at: Utc::now(),
            libraries: BTreeMap::new(),
            css: Default::default(),
            captured: Default::default(),
            easings: BTreeMap::new(),
            elements: Default::default(),
            network: Default::default(),
        };
        record.css.stylesheet.insert("cubic-bezier(0.7, 0, 0.3, 1)");
        record.captured.push(CapturedCall {
            library: Library::Gsap,
            method: "fromTo".into(),
            ease: "power3.out".into(),
            custom_ease: None,
            duration: Some(0.8),
            delay: None,
            trigger: Some(r#"{"start":"top 80%"}"#.into()),
            stagger: None,
        });
        let mut batch = BatchResult::new(vec!["https://a.test/".into()]);
        batch.record_success(0, record);
        BatchReport::from_batch(&batch)
    }

    #[test]
    fn test_triggers_view_lists_trigger_bound_calls() {
        let value = view_json(&report(), InspectView::Triggers, 10);
        assert_eq!(value[0]["view"][0]["method"], "fromTo");
        let captured = view_json(&report(), InspectView::Captured, 10);
        assert_eq!(captured[0]["view"].as_array().map(Vec::len), Some(0));
    }

    #[test]
    fn test_summary_view_uses_channel_keys() {
        let value = view_json(&report(), InspectView::Summary, 5);
        assert_eq!(value["channels"]["css_transitions"][0][0], "cubic-bezier(0.7, 0, 0.3, 1)");
        assert_eq!(value["channels"]["gsap_captured"][0][1], 1);
    }

    #[test]
    fn test_easings_view() {
        let value = view_json(&report(), InspectView::Easings, 5);
        assert_eq!(value[0]["view"]["css"][0], "cubic-bezier(0.7, 0, 0.3, 1)");
    }
}
