//! `motion-probe analyze <targets>...`: run a batch and write its reports.

use super::output::{self, Styled};
use crate::config::ProbeConfig;
use crate::model::{Library, SummaryChannel};
use crate::progress::{self, BatchEvent, ProgressReceiver};
use crate::renderer::chromium::ChromiumRenderer;
use crate::renderer::Renderer;
use crate::report::{self, BatchReport};
use crate::session::Analyzer;
use crate::sites::{self, Targets};
use anyhow::{bail, Result};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tracing::warn;

/// Options for one `analyze` run. CLI values override the config file.
#[derive(Debug, Clone, Default)]
pub struct AnalyzeOptions {
    pub targets: Vec<String>,
    pub out_dir: PathBuf,
    /// Report file prefix; derived from the targets when absent.
    pub name: Option<String>,
    pub config: Option<PathBuf>,
    pub chromium: Option<PathBuf>,
    pub delay_ms: Option<u64>,
    pub headful: bool,
    pub no_report: bool,
}

impl AnalyzeOptions {
    fn apply(&self, config: &mut ProbeConfig) {
        if let Some(path) = &self.chromium {
            config.browser.chromium_path = Some(path.clone());
        }
        if let Some(delay) = self.delay_ms {
            config.batch_delay_ms = delay;
        }
        if self.headful {
            config.browser.headless = false;
        }
    }
}

/// Resolve every target and merge their URLs, dropping repeats.
pub fn collect_targets(targets: &[String], name: Option<&str>) -> Result<Targets> {
    if targets.is_empty() {
        bail!("no targets given (a category, a URL or a file of URLs)");
    }
    let mut names = Vec::new();
    let mut urls: Vec<String> = Vec::new();
    for target in targets {
        let resolved = sites::resolve_target(target)?;
        names.push(resolved.name);
        for url in &resolved.urls {
            sites::push_unique(&mut urls, url);
        }
    }
    let name = match name {
        Some(n) => n.to_string(),
        None if names.len() == 1 => names.remove(0),
        None => "batch".to_string(),
    };
    Ok(Targets { name, urls })
}

async fn show_progress(mut rx: ProgressReceiver, total: u64) {
    let bar = ProgressBar::new(total);
    bar.set_style(
        ProgressStyle::with_template("  {spinner:.cyan} [{bar:30.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-"),
    );
    loop {
        match rx.recv().await {
            Ok(BatchEvent::SiteStarted { url, .. }) => bar.set_message(url),
            Ok(BatchEvent::SiteCompleted { .. }) | Ok(BatchEvent::SiteFailed { .. }) => bar.inc(1),
            Ok(BatchEvent::Waiting { delay_ms }) => {
                bar.set_message(format!("waiting {delay_ms}ms"));
            }
            Ok(BatchEvent::BatchCompleted { .. }) => break,
            Ok(BatchEvent::BatchStarted { .. }) => {}
            Err(RecvError::Lagged(_)) => continue,
            Err(RecvError::Closed) => break,
        }
    }
    bar.finish_and_clear();
}

fn print_summary(s: &Styled, report: &BatchReport) {
    output::print_section(s, "Results");
    let status = format!("{}/{}", report.analyzed_sites, report.total_sites);
    let status = if report.failures.is_empty() {
        s.green(&status)
    } else {
        s.yellow(&status)
    };
    output::print_row("Sites analyzed", &status);
    for library in Library::ALL {
        let count = report
            .summary
            .library_sites
            .get(&library)
            .copied()
            .unwrap_or(0);
        if count > 0 {
            output::print_row(library.display_name(), &format!("{count} site(s)"));
        }
    }
    if let Some(css) = report.summary.channel(SummaryChannel::CssTransitions) {
        for (value, count) in css.top(5) {
            output::print_row(&value, &s.dim(&format!("{count}x")));
        }
    }
    for failure in &report.failures {
        eprintln!("    {} {} {}", s.fail_sym(), failure.url, s.dim(&failure.cause));
    }
}

/// Run the analyze command.
pub async fn run(opts: &AnalyzeOptions) -> Result<()> {
    let s = Styled::new();
    let chatty = !output::is_quiet() && !output::is_json();

    let mut config = ProbeConfig::load(opts.config.as_deref())?;
    opts.apply(&mut config);
    config.validate()?;
    let targets = collect_targets(&opts.targets, opts.name.as_deref())?;

    if chatty {
        output::print_header(&s);
        output::print_row(
            "Targets",
            &format!("{} ({} URL(s))", targets.name, targets.urls.len()),
        );
        eprintln!();
    }

    let renderer: Arc<dyn Renderer> = Arc::new(ChromiumRenderer::launch(&config.browser).await?);
    let analyzer = Analyzer::new(Arc::clone(&renderer), config);

    let (tx, rx) = progress::channel();
    let display = if chatty {
        Some(tokio::spawn(show_progress(rx, targets.urls.len() as u64)))
    } else {
        drop(rx);
        None
    };
    let batch = analyzer.analyze_batch(&targets.urls, Some(&tx)).await;
    drop(tx);
    if let Some(handle) = display {
        let _ = handle.await;
    }
    if let Err(e) = renderer.shutdown().await {
        warn!("browser shutdown failed: {e}");
    }

    let report = BatchReport::from_batch(&batch);
    let paths = if opts.no_report {
        None
    } else {
        Some(report::write_reports(&report, &opts.out_dir, &targets.name)?)
    };

    if output::is_json() {
        output::print_json(&serde_json::to_value(&report)?);
    } else if chatty {
        print_summary(&s, &report);
        if let Some(paths) = paths {
            eprintln!();
            output::print_row("Results", &paths.json.display().to_string());
            output::print_row("Report", &paths.markdown.display().to_string());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_collect_targets_merges_and_names() {
        let targets =
            collect_targets(&["awwwards".to_string(), "agencies".to_string()], None).unwrap();
        assert_eq!(targets.name, "batch");
        assert_eq!(targets.urls.len(), 12);

        let single = collect_targets(&["ecommerce".to_string()], None).unwrap();
        assert_eq!(single.name, "ecommerce");

        let named = collect_targets(&["ecommerce".to_string()], Some("shops")).unwrap();
        assert_eq!(named.name, "shops");
    }

    #[test]
    fn test_collect_targets_treats_equivalent_urls_as_one() {
        let targets =
            collect_targets(&["portfolios".to_string(), "awwwards".to_string()], None).unwrap();
        assert_eq!(targets.urls.len(), 7);

        let mixed = collect_targets(&["resn.co.nz".to_string(), "agencies".to_string()], None)
            .unwrap();
        assert_eq!(mixed.urls.len(), 7);
        assert_eq!(mixed.urls[0], "https://resn.co.nz/");
    }

    #[test]
    fn test_collect_targets_requires_input() {
        assert!(collect_targets(&[], None).is_err());
    }

    #[test]
    fn test_cli_overrides_config() {
        let opts = AnalyzeOptions {
            delay_ms: Some(0),
            headful: true,
            ..Default::default()
        };
        let mut config = ProbeConfig::default();
        opts.apply(&mut config);
        assert_eq!(config.batch_delay_ms, 0);
        assert!(!config.browser.headless);
    }
}
