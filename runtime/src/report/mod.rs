//! Batch reports: machine-readable JSON and a Markdown digest.
//!
//! The summary is derived from the batch when a report is built; nothing in
//! a report is computed from anything other than the site records.

use crate::model::{
    BatchResult, Library, ScriptDialect, SiteFailure, SiteRecord, Summary, SummaryChannel,
};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Entries listed per channel in the Markdown report.
pub const TOP_EASINGS: usize = 15;

/// Serialized form of a finished batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub run_id: String,
    pub extracted_at: DateTime<Utc>,
    pub total_sites: usize,
    pub analyzed_sites: usize,
    /// One entry per input URL; `null` for failed sites.
    pub sites: Vec<Option<SiteRecord>>,
    #[serde(default)]
    pub failures: Vec<SiteFailure>,
    pub summary: Summary,
}

impl BatchReport {
    pub fn from_batch(batch: &BatchResult) -> Self {
        Self {
            run_id: batch.run_id.clone(),
            extracted_at: batch.finished_at.unwrap_or(batch.started_at),
            total_sites: batch.total(),
            analyzed_sites: batch.analyzed(),
            sites: batch.sites.clone(),
            failures: batch.failures.clone(),
            summary: batch.summary(),
        }
    }

    /// Read a report written by [`write_reports`].
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        serde_json::from_str(&content)
            .with_context(|| format!("{} is not a results file", path.display()))
    }

    pub fn records(&self) -> impl Iterator<Item = &SiteRecord> {
        self.sites.iter().flatten()
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).context("failed to encode report")
    }
}

/// Where [`write_reports`] put its files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportPaths {
    pub json: PathBuf,
    pub markdown: PathBuf,
}

/// Write `<dir>/<name>-results.json` and `<dir>/<name>-report.md`.
pub fn write_reports(report: &BatchReport, dir: &Path, name: &str) -> Result<ReportPaths> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("failed to create {}", dir.display()))?;
    let paths = ReportPaths {
        json: dir.join(format!("{name}-results.json")),
        markdown: dir.join(format!("{name}-report.md")),
    };
    std::fs::write(&paths.json, report.to_json()?)
        .with_context(|| format!("failed to write {}", paths.json.display()))?;
    std::fs::write(&paths.markdown, render_markdown(report))
        .with_context(|| format!("failed to write {}", paths.markdown.display()))?;
    Ok(paths)
}

fn percent(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 * 100.0 / whole as f64
    }
}

fn easing_list(values: impl Iterator<Item = String>) -> String {
    let items: Vec<String> = values.map(|v| format!("`{v}`")).collect();
    if items.is_empty() {
        "none".to_string()
    } else {
        items.join(", ")
    }
}

fn render_channel(out: &mut String, summary: &Summary, channel: SummaryChannel) {
    let Some(table) = summary.channel(channel) else {
        return;
    };
    out.push_str(&format!("## {}\n\n", channel.title()));
    if table.unique.is_empty() {
        out.push_str("_None found._\n\n");
        return;
    }
    out.push_str(&format!(
        "{} unique value(s). Top {}:\n\n",
        table.unique.len(),
        TOP_EASINGS.min(table.unique.len())
    ));
    out.push_str("| # | Easing | Count |\n|---|---|---|\n");
    for (rank, (value, count)) in table.top(TOP_EASINGS).into_iter().enumerate() {
        out.push_str(&format!("| {} | `{value}` | {count} |\n", rank + 1));
    }
    out.push('\n');
}

fn render_site(out: &mut String, site: &SiteRecord) {
    let heading = if site.title.is_empty() {
        site.url.as_str()
    } else {
        site.title.as_str()
    };
    out.push_str(&format!("### {heading}\n\n- URL: {}\n", site.url));

    let detected: Vec<String> = site
        .libraries
        .iter()
        .filter(|(_, d)| d.detected())
        .map(|(library, d)| match d.version() {
            Some(v) => format!("{library} {v}"),
            None => library.to_string(),
        })
        .collect();
    out.push_str(&format!(
        "- Libraries: {}\n",
        if detected.is_empty() {
            "none".to_string()
        } else {
            detected.join(", ")
        }
    ));
    out.push_str(&format!(
        "- CSS easings: {}\n",
        easing_list(site.css.transitions().iter().map(String::from))
    ));
    for (dialect, label) in [
        (ScriptDialect::Gsap, "GSAP"),
        (ScriptDialect::Anime, "Anime.js"),
        (ScriptDialect::Declarative, "Declarative"),
    ] {
        let set = site.script_easings(dialect);
        if !set.is_empty() {
            out.push_str(&format!(
                "- {label} easings in source: {}\n",
                easing_list(set.iter().map(String::from))
            ));
        }
    }
    if !site.captured.is_empty() {
        out.push_str(&format!(
            "- Captured calls: {} ({} scroll-triggered)\n",
            site.captured.len(),
            site.captured.trigger_bound.len()
        ));
    }
    if !site.css.keyframes.is_empty() {
        out.push_str(&format!("- Keyframes: {}\n", site.css.keyframes.len()));
    }
    out.push('\n');
}

/// Render the Markdown digest.
pub fn render_markdown(report: &BatchReport) -> String {
    let summary = &report.summary;
    let mut out = String::from("# Motion easing report\n\n");
    out.push_str(&format!(
        "Extracted {}. Analyzed {} of {} site(s).\n\n",
        report.extracted_at.format("%Y-%m-%d %H:%M UTC"),
        report.analyzed_sites,
        report.total_sites
    ));

    out.push_str("## Library distribution\n\n| Library | Sites | Share |\n|---|---|---|\n");
    for library in Library::ALL {
        let sites = summary.library_sites.get(&library).copied().unwrap_or(0);
        out.push_str(&format!(
            "| {library} | {sites} | {:.1}% |\n",
            percent(sites, report.analyzed_sites)
        ));
    }
    out.push('\n');

    for channel in [
        SummaryChannel::CssTransitions,
        SummaryChannel::GsapSource,
        SummaryChannel::GsapCaptured,
        SummaryChannel::AnimeSource,
        SummaryChannel::AnimeCaptured,
        SummaryChannel::DeclarativeSource,
    ] {
        render_channel(&mut out, summary, channel);
    }

    if !report.failures.is_empty() {
        out.push_str("## Failed sites\n\n");
        for failure in &report.failures {
            out.push_str(&format!("- {}: {}\n", failure.url, failure.cause));
        }
        out.push('\n');
    }

    out.push_str("## Sites\n\n");
    for site in report.records() {
        render_site(&mut out, site);
    }
    out
}
