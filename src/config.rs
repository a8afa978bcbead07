//! Pipeline settings and daemon configuration.
//!
//! Two ingestion paths with different postures:
//! - Explicit runtime updates (`SettingsUpdate`) are validated eagerly and
//!   applied all-or-nothing; a rejection reports every violated field, and
//!   the previous settings stay in force.
//! - File/env configuration (`CrowddConfig::load`) clamps out-of-range
//!   values field by field with a warning, so a daemon with a sloppy config
//!   file still starts.

use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::fmt;
use std::path::Path;

const DEFAULT_SOURCE_URL: &str = "stub://promenade";
const DEFAULT_INTERVAL_MS: u64 = 1_000;

const CONFIDENCE_RANGE: (f32, f32) = (0.1, 0.9);
const NMS_RANGE: (f32, f32) = (0.1, 0.9);
const MAX_DETECTIONS_RANGE: (usize, usize) = (10, 1_000);
const INPUT_SIZE_RANGE: (u32, u32) = (64, 1_920);
const CACHE_CAPACITY_RANGE: (usize, usize) = (1, 4_096);
const CACHE_BUCKET_MS_RANGE: (u64, u64) = (100, 60_000);

// ----------------------------------------------------------------------------
// Pipeline settings
// ----------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq)]
pub struct PipelineSettings {
    pub confidence_threshold: f32,
    pub nms_threshold: f32,
    pub max_detections: usize,
    /// Model input edge length; the canonical tensor is square.
    pub input_size: u32,
    /// Discard non-person classes before confidence filtering.
    pub people_only: bool,
    pub cache_capacity: usize,
    pub cache_bucket_ms: u64,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.5,
            nms_threshold: 0.45,
            max_detections: 300,
            input_size: 640,
            people_only: true,
            cache_capacity: 32,
            cache_bucket_ms: 5_000,
        }
    }
}

/// Partial settings update; `None` fields keep their current value.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct SettingsUpdate {
    pub confidence_threshold: Option<f32>,
    pub nms_threshold: Option<f32>,
    pub max_detections: Option<usize>,
    pub input_size: Option<u32>,
    pub people_only: Option<bool>,
    pub cache_capacity: Option<usize>,
    pub cache_bucket_ms: Option<u64>,
}

/// Settings rejection carrying every violated field, not just the first.
#[derive(Debug)]
pub struct SettingsError {
    pub violations: Vec<String>,
}

impl fmt::Display for SettingsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid settings: {}", self.violations.join("; "))
    }
}

impl std::error::Error for SettingsError {}

impl PipelineSettings {
    /// Apply an update all-or-nothing.
    ///
    /// Every violated field is collected before deciding; on rejection the
    /// current settings are untouched.
    pub fn apply_update(&mut self, update: &SettingsUpdate) -> Result<(), SettingsError> {
        let mut candidate = self.clone();
        if let Some(v) = update.confidence_threshold {
            candidate.confidence_threshold = v;
        }
        if let Some(v) = update.nms_threshold {
            candidate.nms_threshold = v;
        }
        if let Some(v) = update.max_detections {
            candidate.max_detections = v;
        }
        if let Some(v) = update.input_size {
            candidate.input_size = v;
        }
        if let Some(v) = update.people_only {
            candidate.people_only = v;
        }
        if let Some(v) = update.cache_capacity {
            candidate.cache_capacity = v;
        }
        if let Some(v) = update.cache_bucket_ms {
            candidate.cache_bucket_ms = v;
        }

        let violations = candidate.violations();
        if !violations.is_empty() {
            return Err(SettingsError { violations });
        }
        *self = candidate;
        Ok(())
    }

    fn violations(&self) -> Vec<String> {
        let mut violations = Vec::new();
        check_range_f32(
            &mut violations,
            "confidence_threshold",
            self.confidence_threshold,
            CONFIDENCE_RANGE,
        );
        check_range_f32(&mut violations, "nms_threshold", self.nms_threshold, NMS_RANGE);
        check_range(
            &mut violations,
            "max_detections",
            self.max_detections,
            MAX_DETECTIONS_RANGE,
        );
        check_range(&mut violations, "input_size", self.input_size, INPUT_SIZE_RANGE);
        check_range(
            &mut violations,
            "cache_capacity",
            self.cache_capacity,
            CACHE_CAPACITY_RANGE,
        );
        check_range(
            &mut violations,
            "cache_bucket_ms",
            self.cache_bucket_ms,
            CACHE_BUCKET_MS_RANGE,
        );
        violations
    }

    /// Clamp every field into its safe range, warning per adjusted field.
    /// Used for file/env ingestion where startup should survive a bad value.
    pub fn clamped(mut self) -> Self {
        self.confidence_threshold = clamp_f32(
            "confidence_threshold",
            self.confidence_threshold,
            CONFIDENCE_RANGE,
        );
        self.nms_threshold = clamp_f32("nms_threshold", self.nms_threshold, NMS_RANGE);
        self.max_detections = clamp("max_detections", self.max_detections, MAX_DETECTIONS_RANGE);
        self.input_size = clamp("input_size", self.input_size, INPUT_SIZE_RANGE);
        self.cache_capacity = clamp("cache_capacity", self.cache_capacity, CACHE_CAPACITY_RANGE);
        self.cache_bucket_ms = clamp("cache_bucket_ms", self.cache_bucket_ms, CACHE_BUCKET_MS_RANGE);
        self
    }
}

fn check_range_f32(violations: &mut Vec<String>, field: &str, value: f32, range: (f32, f32)) {
    if !value.is_finite() || value < range.0 || value > range.1 {
        violations.push(format!(
            "{field} must be within {}..={}, got {value}",
            range.0, range.1
        ));
    }
}

fn check_range<T: PartialOrd + fmt::Display + Copy>(
    violations: &mut Vec<String>,
    field: &str,
    value: T,
    range: (T, T),
) {
    if value < range.0 || value > range.1 {
        violations.push(format!(
            "{field} must be within {}..={}, got {value}",
            range.0, range.1
        ));
    }
}

fn clamp_f32(field: &str, value: f32, range: (f32, f32)) -> f32 {
    let clamped = if value.is_finite() {
        value.clamp(range.0, range.1)
    } else {
        range.0
    };
    if clamped != value {
        log::warn!("{field} {value} out of range, clamped to {clamped}");
    }
    clamped
}

fn clamp<T: PartialOrd + fmt::Display + Copy>(field: &str, value: T, range: (T, T)) -> T {
    let clamped = if value < range.0 {
        range.0
    } else if value > range.1 {
        range.1
    } else {
        value
    };
    if clamped != value {
        log::warn!("{field} {value} out of range, clamped to {clamped}");
    }
    clamped
}

// ----------------------------------------------------------------------------
// Daemon configuration
// ----------------------------------------------------------------------------

#[derive(Debug, Deserialize, Default)]
struct CrowddConfigFile {
    source: Option<SourceConfigFile>,
    model_path: Option<String>,
    interval_ms: Option<u64>,
    settings: Option<SettingsUpdate>,
}

#[derive(Debug, Deserialize, Default)]
struct SourceConfigFile {
    url: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
}

/// Resolved daemon configuration.
#[derive(Clone, Debug)]
pub struct CrowddConfig {
    pub source_url: String,
    pub source_width: u32,
    pub source_height: u32,
    /// ONNX model file for the tract strategy, when built with it.
    pub model_path: Option<String>,
    /// Continuous-mode tick interval.
    pub interval_ms: u64,
    pub settings: PipelineSettings,
}

impl CrowddConfig {
    /// Load from the `CROWD_CONFIG` JSON file (when set), then apply env
    /// overrides, then clamp settings into their safe ranges.
    pub fn load() -> Result<Self> {
        let config_path = std::env::var("CROWD_CONFIG").ok();
        let file_cfg = match config_path.as_deref() {
            Some(path) => read_config_file(Path::new(path))?,
            None => CrowddConfigFile::default(),
        };
        let mut cfg = Self::from_file(file_cfg);
        cfg.apply_env()?;
        cfg.settings = cfg.settings.clamped();
        Ok(cfg)
    }

    fn from_file(file: CrowddConfigFile) -> Self {
        let mut settings = PipelineSettings::default();
        if let Some(update) = file.settings {
            // File values may be out of range; clamping happens after env
            // overrides, so merge without validation here.
            apply_unchecked(&mut settings, &update);
        }
        Self {
            source_url: file
                .source
                .as_ref()
                .and_then(|s| s.url.clone())
                .unwrap_or_else(|| DEFAULT_SOURCE_URL.to_string()),
            source_width: file.source.as_ref().and_then(|s| s.width).unwrap_or(640),
            source_height: file.source.and_then(|s| s.height).unwrap_or(640),
            model_path: file.model_path,
            interval_ms: file.interval_ms.unwrap_or(DEFAULT_INTERVAL_MS),
            settings,
        }
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = std::env::var("CROWD_SOURCE_URL") {
            if !url.trim().is_empty() {
                self.source_url = url;
            }
        }
        if let Ok(path) = std::env::var("CROWD_MODEL") {
            if !path.trim().is_empty() {
                self.model_path = Some(path);
            }
        }
        if let Ok(interval) = std::env::var("CROWD_INTERVAL_MS") {
            self.interval_ms = interval
                .parse()
                .map_err(|_| anyhow!("CROWD_INTERVAL_MS must be an integer number of ms"))?;
        }
        if let Ok(threshold) = std::env::var("CROWD_CONFIDENCE") {
            self.settings.confidence_threshold = threshold
                .parse()
                .map_err(|_| anyhow!("CROWD_CONFIDENCE must be a float"))?;
        }
        if let Ok(people_only) = std::env::var("CROWD_PEOPLE_ONLY") {
            self.settings.people_only = people_only
                .parse()
                .map_err(|_| anyhow!("CROWD_PEOPLE_ONLY must be true or false"))?;
        }
        Ok(())
    }
}

/// Merge update fields without range checks; `clamped()` runs afterwards.
fn apply_unchecked(settings: &mut PipelineSettings, update: &SettingsUpdate) {
    if let Some(v) = update.confidence_threshold {
        settings.confidence_threshold = v;
    }
    if let Some(v) = update.nms_threshold {
        settings.nms_threshold = v;
    }
    if let Some(v) = update.max_detections {
        settings.max_detections = v;
    }
    if let Some(v) = update.input_size {
        settings.input_size = v;
    }
    if let Some(v) = update.people_only {
        settings.people_only = v;
    }
    if let Some(v) = update.cache_capacity {
        settings.cache_capacity = v;
    }
    if let Some(v) = update.cache_bucket_ms {
        settings.cache_bucket_ms = v;
    }
}

fn read_config_file(path: &Path) -> Result<CrowddConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let cfg = serde_json::from_str(&raw)
        .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_are_valid() {
        assert!(PipelineSettings::default().violations().is_empty());
    }

    #[test]
    fn rejected_update_leaves_settings_unchanged() {
        let mut settings = PipelineSettings::default();
        let before = settings.clone();

        let err = settings
            .apply_update(&SettingsUpdate {
                confidence_threshold: Some(5.0),
                ..SettingsUpdate::default()
            })
            .unwrap_err();

        assert_eq!(settings, before);
        assert_eq!(err.violations.len(), 1);
        assert!(err.violations[0].contains("confidence_threshold"));
    }

    #[test]
    fn rejection_lists_every_violation() {
        let mut settings = PipelineSettings::default();
        let err = settings
            .apply_update(&SettingsUpdate {
                confidence_threshold: Some(5.0),
                nms_threshold: Some(-1.0),
                max_detections: Some(3),
                ..SettingsUpdate::default()
            })
            .unwrap_err();

        assert_eq!(err.violations.len(), 3);
        let joined = err.to_string();
        assert!(joined.contains("confidence_threshold"));
        assert!(joined.contains("nms_threshold"));
        assert!(joined.contains("max_detections"));
    }

    #[test]
    fn valid_update_applies_all_fields() {
        let mut settings = PipelineSettings::default();
        settings
            .apply_update(&SettingsUpdate {
                confidence_threshold: Some(0.25),
                max_detections: Some(50),
                people_only: Some(false),
                ..SettingsUpdate::default()
            })
            .unwrap();

        assert!((settings.confidence_threshold - 0.25).abs() < 1e-6);
        assert_eq!(settings.max_detections, 50);
        assert!(!settings.people_only);
        // Untouched fields keep their defaults.
        assert_eq!(settings.input_size, 640);
    }

    #[test]
    fn clamping_pulls_values_into_range() {
        let settings = PipelineSettings {
            confidence_threshold: 5.0,
            nms_threshold: 0.0,
            max_detections: 5_000,
            input_size: 8,
            people_only: true,
            cache_capacity: 0,
            cache_bucket_ms: 1,
        }
        .clamped();

        assert!((settings.confidence_threshold - 0.9).abs() < 1e-6);
        assert!((settings.nms_threshold - 0.1).abs() < 1e-6);
        assert_eq!(settings.max_detections, 1_000);
        assert_eq!(settings.input_size, 64);
        assert_eq!(settings.cache_capacity, 1);
        assert_eq!(settings.cache_bucket_ms, 100);
    }

    #[test]
    fn non_finite_confidence_is_a_violation() {
        let mut settings = PipelineSettings::default();
        let err = settings
            .apply_update(&SettingsUpdate {
                confidence_threshold: Some(f32::NAN),
                ..SettingsUpdate::default()
            })
            .unwrap_err();
        assert_eq!(err.violations.len(), 1);
    }
}
