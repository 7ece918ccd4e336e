//! Configuration management for the screen translator.
//!
//! Loads configuration from TOML files and provides runtime defaults.

use crate::languages;
use crate::types::{ConfigError, ScreenRect};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub general: GeneralConfig,

    #[serde(default)]
    pub capture: CaptureConfig,

    #[serde(default)]
    pub timing: TimingConfig,

    #[serde(default)]
    pub change_detection: ChangeDetectionConfig,

    #[serde(default)]
    pub ocr: OcrConfig,

    #[serde(default)]
    pub translation: TranslationConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Log per-block skip reasons
    #[serde(default)]
    pub debug: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            debug: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureConfig {
    /// Left edge of the monitored region
    #[serde(default)]
    pub x: i32,

    /// Top edge of the monitored region
    #[serde(default)]
    pub y: i32,

    /// Region width
    #[serde(default = "default_region_width")]
    pub width: u32,

    /// Region height
    #[serde(default = "default_region_height")]
    pub height: u32,

    /// Read frames from this image file instead of the screen
    #[serde(default)]
    pub image_path: Option<PathBuf>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            x: 0,
            y: 0,
            width: default_region_width(),
            height: default_region_height(),
            image_path: None,
        }
    }
}

impl CaptureConfig {
    pub fn region(&self) -> ScreenRect {
        ScreenRect::new(self.x, self.y, self.width, self.height)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Wait after a tick that found no change
    #[serde(default = "default_unchanged_interval")]
    pub unchanged_interval_ms: u64,

    /// Wait after a tick that ran a cycle
    #[serde(default = "default_changed_interval")]
    pub changed_interval_ms: u64,

    /// Wait after a failed capture
    #[serde(default = "default_capture_retry")]
    pub capture_retry_ms: u64,

    /// Wait after an unexpected error in a tick
    #[serde(default = "default_error_backoff")]
    pub error_backoff_ms: u64,

    /// Poll interval while paused
    #[serde(default = "default_pause_poll")]
    pub pause_poll_ms: u64,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            unchanged_interval_ms: default_unchanged_interval(),
            changed_interval_ms: default_changed_interval(),
            capture_retry_ms: default_capture_retry(),
            error_backoff_ms: default_error_backoff(),
            pause_poll_ms: default_pause_poll(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangeDetectionConfig {
    /// Percentage of luminance change that triggers a cycle
    #[serde(default = "default_threshold_percent")]
    pub threshold_percent: f64,
}

impl Default for ChangeDetectionConfig {
    fn default() -> Self {
        Self {
            threshold_percent: default_threshold_percent(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrConfig {
    /// Path to the tesseract binary
    #[serde(default)]
    pub binary_path: Option<PathBuf>,

    /// Words at or below this confidence are discarded
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f32,

    /// Kill the engine after this many seconds
    #[serde(default = "default_ocr_timeout")]
    pub timeout_seconds: u64,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            binary_path: None,
            min_confidence: default_min_confidence(),
            timeout_seconds: default_ocr_timeout(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslationConfig {
    /// Language to translate from (translation service code)
    #[serde(default = "default_source_language")]
    pub source_language: String,

    /// Language to translate to
    #[serde(default = "default_target_language")]
    pub target_language: String,

    /// Recognition engine language; derived from the source language when unset
    #[serde(default)]
    pub ocr_language: Option<String>,

    /// Parallel translation workers
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Language detections below this confidence (0-1) are treated as ambiguous
    #[serde(default = "default_min_detection_confidence")]
    pub min_detection_confidence: f64,

    /// Translation service endpoint
    #[serde(default = "default_endpoint")]
    pub endpoint: String,

    /// Per-request timeout
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            source_language: default_source_language(),
            target_language: default_target_language(),
            ocr_language: None,
            workers: default_workers(),
            min_detection_confidence: default_min_detection_confidence(),
            endpoint: default_endpoint(),
            request_timeout_seconds: default_request_timeout(),
        }
    }
}

impl TranslationConfig {
    /// Recognition language hint: explicit setting, else the catalogue entry
    pub fn resolved_ocr_language(&self) -> Result<String, ConfigError> {
        if let Some(lang) = self.ocr_language.as_deref().filter(|l| !l.trim().is_empty()) {
            return Ok(lang.to_string());
        }
        languages::find(&self.source_language)
            .map(|l| l.ocr_code.to_string())
            .ok_or_else(|| ConfigError::UnknownLanguage(self.source_language.clone()))
    }
}

// Default value functions for serde
fn default_log_level() -> String {
    "info".to_string()
}

fn default_region_width() -> u32 {
    800
}

fn default_region_height() -> u32 {
    600
}

fn default_unchanged_interval() -> u64 {
    1000
}

fn default_changed_interval() -> u64 {
    3000
}

fn default_capture_retry() -> u64 {
    1000
}

fn default_error_backoff() -> u64 {
    2000
}

fn default_pause_poll() -> u64 {
    100
}

fn default_threshold_percent() -> f64 {
    0.1
}

fn default_min_confidence() -> f32 {
    50.0
}

fn default_ocr_timeout() -> u64 {
    30
}

fn default_source_language() -> String {
    "ja".to_string()
}

fn default_target_language() -> String {
    "en".to_string()
}

fn default_workers() -> usize {
    4
}

fn default_min_detection_confidence() -> f64 {
    0.1
}

fn default_endpoint() -> String {
    "https://translate.googleapis.com/translate_a/single".to_string()
}

fn default_request_timeout() -> u64 {
    10
}

impl Config {
    /// Load configuration from the default path
    pub fn load() -> Self {
        Self::load_from_path(Self::default_config_path())
    }

    /// Load configuration from a specific path
    pub fn load_from_path(path: PathBuf) -> Self {
        match std::fs::read_to_string(&path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => {
                    info!("Loaded configuration from {:?}", path);
                    config
                }
                Err(e) => {
                    warn!("Failed to parse config file: {}, using defaults", e);
                    Self::default()
                }
            },
            Err(_) => {
                info!("No config file found at {:?}, using defaults", path);
                Self::default()
            }
        }
    }

    /// Get the default configuration file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("screen-translator")
            .join("config.toml")
    }

    /// Save configuration to a specific path
    pub fn save_to_path(&self, path: PathBuf) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents)?;
        info!("Saved configuration to {:?}", path);
        Ok(())
    }

    /// Check values the orchestrator relies on
    pub fn validate(&self) -> Result<(), ConfigError> {
        let threshold = self.change_detection.threshold_percent;
        if !threshold.is_finite() || !(0.0..100.0).contains(&threshold) {
            return Err(ConfigError::Invalid(format!(
                "change_detection.threshold_percent must be in [0, 100), got {}",
                threshold
            )));
        }

        if self.translation.workers == 0 {
            return Err(ConfigError::Invalid(
                "translation.workers must be at least 1".to_string(),
            ));
        }

        let floor = self.translation.min_detection_confidence;
        if !floor.is_finite() || !(0.0..=1.0).contains(&floor) {
            return Err(ConfigError::Invalid(format!(
                "translation.min_detection_confidence must be in [0, 1], got {}",
                floor
            )));
        }

        if self.translation.source_language.trim().is_empty()
            || self.translation.target_language.trim().is_empty()
        {
            return Err(ConfigError::Invalid(
                "translation languages must not be empty".to_string(),
            ));
        }

        if self.capture.image_path.is_none() && self.capture.region().is_empty() {
            return Err(ConfigError::Invalid(
                "capture region must have a non-zero size".to_string(),
            ));
        }

        // Detected languages are reported with catalogue codes only, so any
        // other source language would never match a block.
        if languages::find(&self.translation.source_language).is_none() {
            return Err(ConfigError::UnknownLanguage(format!(
                "{} (supported: {})",
                self.translation.source_language,
                languages::LANGUAGES
                    .iter()
                    .map(|l| l.code)
                    .collect::<Vec<_>>()
                    .join(", ")
            )));
        }

        self.translation.resolved_ocr_language()?;
        Ok(())
    }

    /// Effective default log filter
    pub fn log_filter(&self) -> String {
        if self.general.debug {
            "debug".to_string()
        } else {
            self.general.log_level.clone()
        }
    }
}

/// Loop timing and thresholds handed to the orchestrator at construction
#[derive(Debug, Clone, PartialEq)]
pub struct CycleSettings {
    pub threshold_percent: f64,
    pub unchanged_interval: Duration,
    pub changed_interval: Duration,
    pub capture_retry: Duration,
    pub error_backoff: Duration,
    pub pause_poll: Duration,
}

impl From<&Config> for CycleSettings {
    fn from(config: &Config) -> Self {
        Self {
            threshold_percent: config.change_detection.threshold_percent,
            unchanged_interval: Duration::from_millis(config.timing.unchanged_interval_ms),
            changed_interval: Duration::from_millis(config.timing.changed_interval_ms),
            capture_retry: Duration::from_millis(config.timing.capture_retry_ms),
            error_backoff: Duration::from_millis(config.timing.error_backoff_ms),
            pause_poll: Duration::from_millis(config.timing.pause_poll_ms),
        }
    }
}

impl Default for CycleSettings {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.change_detection.threshold_percent, 0.1);
        assert_eq!(config.translation.workers, 4);
        assert_eq!(config.translation.target_language, "en");
        assert_eq!(config.ocr.min_confidence, 50.0);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_toml() {
        let toml_str = r#"
[general]
log_level = "debug"

[capture]
x = 100
y = 200
width = 640
height = 480

[timing]
changed_interval_ms = 5000

[change_detection]
threshold_percent = 0.5

[translation]
source_language = "ko"
workers = 2
"#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.general.log_level, "debug");
        assert_eq!(config.capture.region(), ScreenRect::new(100, 200, 640, 480));
        assert_eq!(config.timing.changed_interval_ms, 5000);
        assert_eq!(config.timing.unchanged_interval_ms, 1000);
        assert_eq!(config.change_detection.threshold_percent, 0.5);
        assert_eq!(config.translation.workers, 2);
        assert_eq!(config.translation.min_detection_confidence, 0.1);
        assert_eq!(config.translation.resolved_ocr_language().unwrap(), "kor");
    }

    #[test]
    fn test_explicit_ocr_language_wins() {
        let mut config = Config::default();
        config.translation.ocr_language = Some("jpn_vert".to_string());
        assert!(config.validate().is_ok());
        assert_eq!(config.translation.resolved_ocr_language().unwrap(), "jpn_vert");
    }

    #[test]
    fn test_source_language_outside_catalogue_is_rejected() {
        let mut config = Config::default();
        config.translation.source_language = "fr".to_string();
        config.translation.ocr_language = Some("fra".to_string());

        match config.validate() {
            Err(ConfigError::UnknownLanguage(message)) => {
                assert!(message.starts_with("fr "), "{}", message);
                assert!(message.contains("ja, ko"), "{}", message);
            }
            other => panic!("expected unknown language, got {:?}", other),
        }
    }

    #[test]
    fn test_source_language_accepts_any_catalogue_entry() {
        for language in languages::LANGUAGES {
            let mut config = Config::default();
            config.translation.source_language = language.code.to_string();
            assert!(config.validate().is_ok(), "{}", language.name);
            assert_eq!(
                config.translation.resolved_ocr_language().unwrap(),
                language.ocr_code
            );
        }
    }

    #[test]
    fn test_validate_rejects_bad_values() {
        let mut config = Config::default();
        config.translation.workers = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.change_detection.threshold_percent = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.translation.min_detection_confidence = 1.5;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.capture.width = 0;
        assert!(config.validate().is_err());

        config.capture.image_path = Some(PathBuf::from("frame.png"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = Config::default();
        config.translation.source_language = "de".to_string();
        config.timing.pause_poll_ms = 250;
        config.save_to_path(path.clone()).unwrap();

        let loaded = Config::load_from_path(path);
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_unparsable_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "this is = = not toml").unwrap();
        assert_eq!(Config::load_from_path(path), Config::default());
    }

    #[test]
    fn test_cycle_settings_from_config() {
        let mut config = Config::default();
        config.timing.changed_interval_ms = 1500;
        let settings = CycleSettings::from(&config);
        assert_eq!(settings.changed_interval, Duration::from_millis(1500));
        assert_eq!(settings.unchanged_interval, Duration::from_millis(1000));
        assert_eq!(settings.threshold_percent, 0.1);
    }

    #[test]
    fn test_debug_raises_log_filter() {
        let mut config = Config::default();
        assert_eq!(config.log_filter(), "info");
        config.general.debug = true;
        assert_eq!(config.log_filter(), "debug");
    }
}
