// Copyright 2026 Motion Probe Contributors
// SPDX-License-Identifier: Apache-2.0

//! Error taxonomy for the evidence extraction pipeline.
//!
//! Only [`ProbeError::NavigationFailed`] ever escapes a session. The other
//! pipeline variants are built at the point of failure, logged, and turned
//! into missing data for that one source.

/// Maximum length of an underlying cause kept in log lines and reports.
pub const CAUSE_PREVIEW_CHARS: usize = 80;

/// All classified errors produced by the pipeline.
#[derive(thiserror::Error, Debug)]
pub enum ProbeError {
    #[error("navigation to {url} failed after {attempts} attempt(s): {cause}")]
    NavigationFailed {
        url: String,
        attempts: u32,
        cause: String,
    },

    #[error("extraction step `{step}` failed: {cause}")]
    ExtractionPartialFailure { step: &'static str, cause: String },

    #[error("{library} did not appear within {window_ms}ms")]
    InstrumentationTimeout { library: String, window_ms: u64 },

    #[error("script capture skipped for {url}: {reason}")]
    ResourceCaptureSkipped { url: String, reason: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ProbeError {
    /// Whether this error aborts the current site (as opposed to being
    /// contained within one extraction source).
    pub fn is_fatal_for_site(&self) -> bool {
        matches!(self, ProbeError::NavigationFailed { .. })
    }
}

/// Shorten an error message for logs, keeping char boundaries intact.
pub fn truncate_cause(message: &str, max_chars: usize) -> String {
    let flat = message.replace('\n', " ");
    if flat.chars().count() <= max_chars {
        return flat;
    }
    let mut out: String = flat.chars().take(max_chars).collect();
    out.push_str("...");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_cause_short_message_unchanged() {
        assert_eq!(truncate_cause("net::ERR_FAILED", 80), "net::ERR_FAILED");
    }

    #[test]
    fn test_truncate_cause_long_message() {
        let msg = "x".repeat(200);
        let out = truncate_cause(&msg, 60);
        assert_eq!(out.len(), 63);
        assert!(out.ends_with("..."));
    }

    #[test]
    fn test_truncate_cause_multibyte_and_newlines() {
        let out = truncate_cause("héllo\nwörld", 7);
        assert_eq!(out, "héllo w...");
    }

    #[test]
    fn test_only_navigation_is_fatal() {
        let nav = ProbeError::NavigationFailed {
            url: "https://example.com".into(),
            attempts: 4,
            cause: "timeout".into(),
        };
        let partial = ProbeError::ExtractionPartialFailure {
            step: "stylesheets",
            cause: "SecurityError".into(),
        };
        assert!(nav.is_fatal_for_site());
        assert!(!partial.is_fatal_for_site());
        assert!(nav.to_string().contains("4 attempt(s)"));
    }
}
