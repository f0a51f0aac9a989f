//! Configuration loading and resolution.
//!
//! Resolution order (first hit wins for the file; env overrides apply on top):
//! 1. explicit `--config <path>`
//! 2. `MOTION_PROBE_CONFIG`
//! 3. `./.motion-probe.json`
//! 4. `~/.motion-probe/config.json`
//! 5. compiled defaults

use crate::error::ProbeError;
use crate::model::Viewport;
use crate::renderer::{Readiness, ResourceKind};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// One entry in the navigation schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NavigationStep {
    pub readiness: Readiness,
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigationSettings {
    /// Attempts in order; the length is the attempt bound.
    pub steps: Vec<NavigationStep>,
    /// Wait before attempt `n + 1` is `backoff_base_ms * n`.
    pub backoff_base_ms: u64,
    /// Ceiling on the summed backoff across all attempts.
    pub backoff_ceiling_ms: u64,
    pub reload_timeout_ms: u64,
}

impl Default for NavigationSettings {
    fn default() -> Self {
        let step = |readiness, timeout_ms| NavigationStep {
            readiness,
            timeout_ms,
        };
        Self {
            steps: vec![
                step(Readiness::DomContentLoaded, 60_000),
                step(Readiness::NetworkAlmostIdle, 60_000),
                step(Readiness::NetworkIdle, 60_000),
                step(Readiness::NetworkIdle, 60_000),
            ],
            backoff_base_ms: 3_000,
            backoff_ceiling_ms: 20_000,
            reload_timeout_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstrumentationSettings {
    pub poll_interval_ms: u64,
    pub poll_window_ms: u64,
    /// Delay after the load event before the polling window restarts.
    pub start_delay_ms: u64,
}

impl Default for InstrumentationSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 250,
            poll_window_ms: 15_000,
            start_delay_ms: 500,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    pub max_scripts: usize,
    pub max_unhinted_samples: usize,
    pub max_body_bytes: usize,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            max_scripts: 40,
            max_unhinted_samples: 15,
            max_body_bytes: 4 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InteractionSettings {
    pub settle_ms: u64,
    pub scroll_pause_ms: u64,
    pub hover_selector: String,
    pub max_hovers: usize,
    pub hover_pause_ms: u64,
}

impl Default for InteractionSettings {
    fn default() -> Self {
        Self {
            settle_ms: 3_000,
            scroll_pause_ms: 1_000,
            hover_selector: r#"button, a, .button, [class*="btn"]"#.to_string(),
            max_hovers: 5,
            hover_pause_ms: 200,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    pub chromium_path: Option<PathBuf>,
    pub headless: bool,
    pub viewport: Viewport,
    pub user_agent: String,
    pub blocked_resources: Vec<ResourceKind>,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            chromium_path: None,
            headless: true,
            viewport: Viewport::default(),
            user_agent: DEFAULT_USER_AGENT.to_string(),
            blocked_resources: vec![ResourceKind::Image, ResourceKind::Font, ResourceKind::Media],
        }
    }
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    pub navigation: NavigationSettings,
    pub instrumentation: InstrumentationSettings,
    pub capture: CaptureSettings,
    pub interaction: InteractionSettings,
    pub browser: BrowserSettings,
    /// Fixed pause between sessions of a batch.
    pub batch_delay_ms: u64,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            navigation: NavigationSettings::default(),
            instrumentation: InstrumentationSettings::default(),
            capture: CaptureSettings::default(),
            interaction: InteractionSettings::default(),
            browser: BrowserSettings::default(),
            batch_delay_ms: 2_000,
        }
    }
}

impl ProbeConfig {
    /// Resolve, load, apply env overrides and validate.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ProbeError> {
        let mut config = match resolve_config_path(explicit) {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ProbeError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
            .map_err(|e| ProbeError::Config(format!("{}: {e}", path.display())))
    }

    pub fn from_json(json: &str) -> Result<Self, ProbeError> {
        serde_json::from_str(json).map_err(|e| ProbeError::Config(e.to_string()))
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var("MOTION_PROBE_CHROMIUM_PATH") {
            if !path.is_empty() {
                self.browser.chromium_path = Some(PathBuf::from(path));
            }
        }
        if let Ok(delay) = std::env::var("MOTION_PROBE_BATCH_DELAY_MS") {
            if let Ok(ms) = delay.trim().parse() {
                self.batch_delay_ms = ms;
            }
        }
    }

    pub fn validate(&self) -> Result<(), ProbeError> {
        if self.navigation.steps.is_empty() {
            return Err(ProbeError::Config(
                "navigation.steps must contain at least one attempt".into(),
            ));
        }
        if self.instrumentation.poll_interval_ms == 0 {
            return Err(ProbeError::Config(
                "instrumentation.poll_interval_ms must be greater than 0".into(),
            ));
        }
        if self.capture.max_unhinted_samples > self.capture.max_scripts {
            return Err(ProbeError::Config(
                "capture.max_unhinted_samples cannot exceed capture.max_scripts".into(),
            ));
        }
        Ok(())
    }
}

/// Find the config file to load, if any.
pub fn resolve_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }

    if let Ok(env_path) = std::env::var("MOTION_PROBE_CONFIG") {
        if !env_path.is_empty() {
            return Some(PathBuf::from(env_path));
        }
    }

    let cwd_config = PathBuf::from(".motion-probe.json");
    if cwd_config.exists() {
        return Some(cwd_config);
    }

    dirs::home_dir()
        .map(|home| home.join(".motion-probe").join("config.json"))
        .filter(|p| p.exists())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ProbeConfig::default();
        assert_eq!(config.navigation.steps.len(), 4);
        assert_eq!(config.navigation.steps[0].readiness, Readiness::DomContentLoaded);
        assert_eq!(config.capture.max_body_bytes, 4 * 1024 * 1024);
        assert_eq!(config.batch_delay_ms, 2_000);
        assert!(!config.browser.blocked_resources.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = ProbeConfig::from_json(
            r#"{"batch_delay_ms": 0, "capture": {"max_scripts": 10, "max_unhinted_samples": 3}}"#,
        )
        .unwrap();
        assert_eq!(config.batch_delay_ms, 0);
        assert_eq!(config.capture.max_scripts, 10);
        assert_eq!(config.capture.max_body_bytes, 4 * 1024 * 1024);
        assert_eq!(config.interaction.max_hovers, 5);
    }

    #[test]
    fn test_readiness_serializes_snake_case() {
        let config = ProbeConfig::from_json(
            r#"{"navigation": {"steps": [{"readiness": "network_idle", "timeout_ms": 1000}]}}"#,
        )
        .unwrap();
        assert_eq!(config.navigation.steps[0].readiness, Readiness::NetworkIdle);
        assert_eq!(config.navigation.backoff_base_ms, 3_000);
    }

    #[test]
    fn test_validate_rejects_empty_schedule() {
        let mut config = ProbeConfig::default();
        config.navigation.steps.clear();
        assert!(matches!(config.validate(), Err(ProbeError::Config(_))));
    }

    #[test]
    fn test_from_file_and_explicit_resolution() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("probe.json");
        std::fs::write(&path, r#"{"interaction": {"max_hovers": 2}}"#).unwrap();

        assert_eq!(resolve_config_path(Some(&path)), Some(path.clone()));
        let config = ProbeConfig::from_file(&path).unwrap();
        assert_eq!(config.interaction.max_hovers, 2);
    }

    #[test]
    fn test_invalid_json_is_config_error() {
        assert!(matches!(
            ProbeConfig::from_json("{not json"),
            Err(ProbeError::Config(_))
        ));
    }
}
