// Copyright 2026 Motion Probe Contributors
// SPDX-License-Identifier: Apache-2.0

//! Batch results and the derived cross-site summary.
//!
//! The summary is never stored on the batch; it is recomputed from the site
//! records whenever it is asked for.

use super::record::{Library, ScriptDialect, SiteRecord};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Why one URL produced no record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteFailure {
    pub index: usize,
    pub url: String,
    /// Truncated underlying cause.
    pub cause: String,
}

/// Ordered outcome of a batch: one slot per input URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchResult {
    /// Identifies this run in logs and reports.
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub urls: Vec<String>,
    /// `None` marks a site whose analysis failed.
    pub sites: Vec<Option<SiteRecord>>,
    pub failures: Vec<SiteFailure>,
}

impl BatchResult {
    /// Reserve one empty slot per URL.
    pub fn new(urls: Vec<String>) -> Self {
        let sites = vec![None; urls.len()];
        Self {
            run_id: Uuid::new_v4().to_string(),
            started_at: Utc::now(),
            finished_at: None,
            urls,
            sites,
            failures: Vec::new(),
        }
    }

    /// Fill the slot for `index` with a completed record.
    pub fn record_success(&mut self, index: usize, record: SiteRecord) {
        if let Some(slot) = self.sites.get_mut(index) {
            *slot = Some(record);
        }
    }

    /// Leave the slot for `index` empty and remember why.
    pub fn record_failure(&mut self, index: usize, cause: String) {
        let url = self.urls.get(index).cloned().unwrap_or_default();
        self.failures.push(SiteFailure { index, url, cause });
    }

    pub fn finish(&mut self) {
        self.finished_at = Some(Utc::now());
    }

    pub fn total(&self) -> usize {
        self.sites.len()
    }

    pub fn analyzed(&self) -> usize {
        self.records().count()
    }

    /// Populated records, in input order.
    pub fn records(&self) -> impl Iterator<Item = &SiteRecord> {
        self.sites.iter().flatten()
    }

    /// Fold all populated records into per-channel frequency tables.
    pub fn summary(&self) -> Summary {
        let mut summary = Summary::default();
        for channel in SummaryChannel::ALL {
            summary.channels.insert(channel, ChannelSummary::default());
        }

        for site in self.records() {
            for channel in SummaryChannel::ALL {
                let Some(table) = summary.channels.get_mut(&channel) else {
                    continue;
                };
                for value in channel.values(site) {
                    table.record(&value);
                }
            }
            for library in Library::ALL {
                if site.is_detected(library) {
                    *summary.library_sites.entry(library).or_insert(0) += 1;
                }
            }
        }

        summary.total_sites = self.total();
        summary.analyzed_sites = self.analyzed();
        summary
    }
}

/// A channel of easing strings tallied across sites.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryChannel {
    CssComputed,
    CssStylesheet,
    CssTransitions,
    GsapSource,
    GsapCaptured,
    AnimeSource,
    AnimeCaptured,
    DeclarativeSource,
}

impl SummaryChannel {
    pub const ALL: [SummaryChannel; 8] = [
        SummaryChannel::CssComputed,
        SummaryChannel::CssStylesheet,
        SummaryChannel::CssTransitions,
        SummaryChannel::GsapSource,
        SummaryChannel::GsapCaptured,
        SummaryChannel::AnimeSource,
        SummaryChannel::AnimeCaptured,
        SummaryChannel::DeclarativeSource,
    ];

    pub fn title(self) -> &'static str {
        match self {
            SummaryChannel::CssComputed => "CSS easings (computed styles)",
            SummaryChannel::CssStylesheet => "CSS easings (stylesheet rules)",
            SummaryChannel::CssTransitions => "CSS easings",
            SummaryChannel::GsapSource => "GSAP easings (from source code)",
            SummaryChannel::GsapCaptured => "GSAP easings (captured live)",
            SummaryChannel::AnimeSource => "Anime.js easings (from source code)",
            SummaryChannel::AnimeCaptured => "Anime.js easings (captured live)",
            SummaryChannel::DeclarativeSource => "Declarative easings (from source code)",
        }
    }

    /// Values one site contributes to this channel. Set channels contribute
    /// each string once; captured channels contribute once per call.
    fn values(self, site: &SiteRecord) -> Vec<String> {
        let owned = |set: crate::model::EasingSet| set.iter().map(String::from).collect();
        match self {
            SummaryChannel::CssComputed => owned(site.css.computed.clone()),
            SummaryChannel::CssStylesheet => owned(site.css.stylesheet.clone()),
            SummaryChannel::CssTransitions => owned(site.css.transitions()),
            SummaryChannel::GsapSource => owned(site.script_easings(ScriptDialect::Gsap)),
            SummaryChannel::AnimeSource => owned(site.script_easings(ScriptDialect::Anime)),
            SummaryChannel::DeclarativeSource => {
                owned(site.script_easings(ScriptDialect::Declarative))
            }
            SummaryChannel::GsapCaptured => site
                .captured
                .for_library(Library::Gsap)
                .map(|c| c.ease.clone())
                .collect(),
            SummaryChannel::AnimeCaptured => site
                .captured
                .for_library(Library::Anime)
                .map(|c| c.ease.clone())
                .collect(),
        }
    }
}

/// Unique values (first-seen order) and their occurrence counts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChannelSummary {
    pub unique: Vec<String>,
    pub frequency: BTreeMap<String, usize>,
}

impl ChannelSummary {
    pub fn record(&mut self, value: &str) {
        let count = self.frequency.entry(value.to_string()).or_insert(0);
        if *count == 0 {
            self.unique.push(value.to_string());
        }
        *count += 1;
    }

    /// The `n` most frequent values; ties keep first-seen order.
    pub fn top(&self, n: usize) -> Vec<(String, usize)> {
        let mut ranked: Vec<(usize, &String)> = self.unique.iter().enumerate().collect();
        ranked.sort_by(|(ia, a), (ib, b)| {
            let ca = self.frequency.get(*a).copied().unwrap_or(0);
            let cb = self.frequency.get(*b).copied().unwrap_or(0);
            cb.cmp(&ca).then(ia.cmp(ib))
        });
        ranked
            .into_iter()
            .take(n)
            .map(|(_, v)| (v.clone(), self.frequency.get(v).copied().unwrap_or(0)))
            .collect()
    }
}

/// Cross-site aggregate derived from a batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub total_sites: usize,
    pub analyzed_sites: usize,
    pub channels: BTreeMap<SummaryChannel, ChannelSummary>,
    /// Number of sites on which each library was detected.
    pub library_sites: BTreeMap<Library, usize>,
}

impl Summary {
    pub fn channel(&self, channel: SummaryChannel) -> Option<&ChannelSummary> {
        self.channels.get(&channel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CapturedCall, Detection, EasingSet, Viewport};

    fn site(url: &str, css: &[&str], gsap_captured: &[&str]) -> SiteRecord {
        let mut record = SiteRecord {
            url: url.into(),
            final_url: url.into(),
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
        record.css.computed = css.iter().copied().collect::<EasingSet>();
        for ease in gsap_captured {
            record.captured.push(CapturedCall {
                library: Library::Gsap,
                method: "to".into(),
                ease: (*ease).into(),
                custom_ease: None,
                duration: Some(0.5),
                delay: Some(0.0),
                trigger: None,
                stagger: None,
            });
        }
        let mut gsap = Detection::new();
        if !gsap_captured.is_empty() {
            gsap.add_evidence("global.gsap");
        }
        record.libraries.insert(Library::Gsap, gsap);
        record
    }

    #[test]
    fn test_new_batch_reserves_slots() {
        let batch = BatchResult::new(vec!["a".into(), "b".into(), "c".into()]);
        assert_eq!(batch.total(), 3);
        assert_eq!(batch.analyzed(), 0);
    }

    #[test]
    fn test_failure_keeps_position() {
        let mut batch = BatchResult::new(vec!["https://a".into(), "https://b".into()]);
        batch.record_failure(0, "timeout".into());
        batch.record_success(1, site("https://b", &["ease"], &[]));
        assert!(batch.sites[0].is_none());
        assert!(batch.sites[1].is_some());
        assert_eq!(batch.failures[0].url, "https://a");
    }

    #[test]
    fn test_summary_counts_sets_once_per_site_and_calls_per_call() {
        let mut batch = BatchResult::new(vec!["1".into(), "2".into(), "3".into()]);
        batch.record_success(
            0,
            site(
                "1",
                &["ease", "cubic-bezier(0.4, 0, 0.2, 1)"],
                &["power2.out", "power2.out"],
            ),
        );
        batch.record_failure(1, "boom".into());
        batch.record_success(2, site("3", &["cubic-bezier(0.4, 0, 0.2, 1)"], &[]));

        let summary = batch.summary();
        assert_eq!(summary.total_sites, 3);
        assert_eq!(summary.analyzed_sites, 2);

        let css = summary.channel(SummaryChannel::CssComputed).unwrap();
        assert_eq!(css.frequency["cubic-bezier(0.4, 0, 0.2, 1)"], 2);
        assert_eq!(css.frequency["ease"], 1);

        let captured = summary.channel(SummaryChannel::GsapCaptured).unwrap();
        assert_eq!(captured.frequency["power2.out"], 2);
        assert_eq!(summary.library_sites.get(&Library::Gsap), Some(&1));
    }

    #[test]
    fn test_top_orders_by_count_then_first_seen() {
        let mut table = ChannelSummary::default();
        for v in ["b", "a", "a", "c", "b", "d"] {
            table.record(v);
        }
        let top = table.top(3);
        assert_eq!(
            top,
            vec![("b".to_string(), 2), ("a".to_string(), 2), ("c".to_string(), 1)]
        );
        assert_eq!(table.unique, vec!["b", "a", "c", "d"]);
    }
}
