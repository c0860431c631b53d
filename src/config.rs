//! Configuration management for the correction, analysis and calibration layers
//!
//! Every tunable constant of the pipeline lives here with its default value.
//! Configuration can be loaded from a JSON file so thresholds can be adjusted
//! without recompilation; missing or malformed files fall back to defaults.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Complete pipeline configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub harmonic: HarmonicCorrectionConfig,
    pub voice: VoiceAnalysisConfig,
    pub calibration: CalibrationConfig,
}

/// Harmonic (octave) correction parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarmonicCorrectionConfig {
    /// History entries older than this are evicted before each correction
    pub history_window_ms: u64,
    /// Candidate confidence required before a correction is applied
    pub min_confidence_threshold: f64,
    /// Round-trip tolerance for accepting a harmonic candidate (cents)
    pub harmonic_tolerance_cents: f64,
    /// Highest harmonic number considered
    pub max_harmonic_number: u32,
    /// Weight of the average match score against history coverage
    pub stability_weight: f64,
    /// Weight of the volume term in per-sample confidence
    pub volume_weight: f64,
}

impl Default for HarmonicCorrectionConfig {
    fn default() -> Self {
        Self {
            history_window_ms: 2000,
            min_confidence_threshold: 0.6,
            harmonic_tolerance_cents: 30.0,
            max_harmonic_number: 8,
            stability_weight: 0.7,
            volume_weight: 0.3,
        }
    }
}

/// Partial update for [`HarmonicCorrectionConfig`]; `None` keeps the current value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarmonicCorrectionConfigPatch {
    pub history_window_ms: Option<u64>,
    pub min_confidence_threshold: Option<f64>,
    pub harmonic_tolerance_cents: Option<f64>,
    pub max_harmonic_number: Option<u32>,
    pub stability_weight: Option<f64>,
    pub volume_weight: Option<f64>,
}

impl HarmonicCorrectionConfig {
    /// Merge a partial update into this configuration
    pub fn apply(&mut self, patch: &HarmonicCorrectionConfigPatch) {
        if let Some(v) = patch.history_window_ms {
            self.history_window_ms = v;
        }
        if let Some(v) = patch.min_confidence_threshold {
            self.min_confidence_threshold = v;
        }
        if let Some(v) = patch.harmonic_tolerance_cents {
            self.harmonic_tolerance_cents = v;
        }
        if let Some(v) = patch.max_harmonic_number {
            self.max_harmonic_number = v;
        }
        if let Some(v) = patch.stability_weight {
            self.stability_weight = v;
        }
        if let Some(v) = patch.volume_weight {
            self.volume_weight = v;
        }
    }
}

/// Voice quality analysis parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceAnalysisConfig {
    /// Samples older than this are evicted from the analysis buffer
    pub analysis_window_ms: u64,
    /// Lowest vibrato rate accepted as vibrato (Hz)
    pub vibrato_min_rate: f64,
    /// Highest vibrato rate accepted as vibrato (Hz)
    pub vibrato_max_rate: f64,
    /// Minimum extremum-to-extremum depth accepted as vibrato (cents)
    pub vibrato_min_depth_cents: f64,
    /// Breathiness above this triggers breath-control recommendations
    pub breathiness_threshold: f64,
    /// Buffer time span needed before a verdict is considered settled
    pub min_analysis_time_ms: u64,
}

impl Default for VoiceAnalysisConfig {
    fn default() -> Self {
        Self {
            analysis_window_ms: 3000,
            vibrato_min_rate: 4.5,
            vibrato_max_rate: 7.5,
            vibrato_min_depth_cents: 50.0,
            breathiness_threshold: 0.6,
            min_analysis_time_ms: 1000,
        }
    }
}

/// Partial update for [`VoiceAnalysisConfig`]; `None` keeps the current value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VoiceAnalysisConfigPatch {
    pub analysis_window_ms: Option<u64>,
    pub vibrato_min_rate: Option<f64>,
    pub vibrato_max_rate: Option<f64>,
    pub vibrato_min_depth_cents: Option<f64>,
    pub breathiness_threshold: Option<f64>,
    pub min_analysis_time_ms: Option<u64>,
}

impl VoiceAnalysisConfig {
    /// Merge a partial update into this configuration
    pub fn apply(&mut self, patch: &VoiceAnalysisConfigPatch) {
        if let Some(v) = patch.analysis_window_ms {
            self.analysis_window_ms = v;
        }
        if let Some(v) = patch.vibrato_min_rate {
            self.vibrato_min_rate = v;
        }
        if let Some(v) = patch.vibrato_max_rate {
            self.vibrato_max_rate = v;
        }
        if let Some(v) = patch.vibrato_min_depth_cents {
            self.vibrato_min_depth_cents = v;
        }
        if let Some(v) = patch.breathiness_threshold {
            self.breathiness_threshold = v;
        }
        if let Some(v) = patch.min_analysis_time_ms {
            self.min_analysis_time_ms = v;
        }
    }
}

/// Device calibration timing and persistence parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    pub noise_duration_ms: u64,
    pub noise_poll_interval_ms: u64,
    pub noise_fft_size: usize,
    pub volume_duration_ms: u64,
    pub volume_poll_interval_ms: u64,
    pub volume_fft_size: usize,
    pub response_duration_ms: u64,
    pub response_poll_interval_ms: u64,
    pub response_fft_size: usize,
    /// Normalized RMS the volume offset aims the median at
    pub target_loudness: f64,
    /// Saved profiles older than this are rejected on load
    pub max_profile_age_ms: u64,
    /// Store key prefix; the device type is appended
    pub storage_key_prefix: String,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            noise_duration_ms: 2000,
            noise_poll_interval_ms: 100,
            noise_fft_size: 2048,
            volume_duration_ms: 3000,
            volume_poll_interval_ms: 50,
            volume_fft_size: 1024,
            response_duration_ms: 5000,
            response_poll_interval_ms: 100,
            response_fft_size: 4096,
            target_loudness: 0.3,
            max_profile_age_ms: 7 * 24 * 60 * 60 * 1000,
            storage_key_prefix: "voice_pitch_calibration_".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from JSON file
    ///
    /// Missing fields take their default values. If the file doesn't exist or
    /// the JSON is invalid, the whole default configuration is returned.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Self {
        match fs::read_to_string(&path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(config) => {
                    tracing::info!("[Config] Loaded configuration from {:?}", path.as_ref());
                    config
                }
                Err(err) => {
                    tracing::warn!(
                        "[Config] Failed to parse JSON from {:?}: {}. Using defaults.",
                        path.as_ref(),
                        err
                    );
                    Self::default()
                }
            },
            Err(err) => {
                tracing::warn!(
                    "[Config] Failed to read config file {:?}: {}. Using defaults.",
                    path.as_ref(),
                    err
                );
                Self::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.harmonic.history_window_ms, 2000);
        assert_eq!(config.harmonic.max_harmonic_number, 8);
        assert_eq!(config.voice.analysis_window_ms, 3000);
        assert_eq!(config.voice.vibrato_min_rate, 4.5);
        assert_eq!(config.calibration.volume_fft_size, 1024);
        assert_eq!(config.calibration.max_profile_age_ms, 604_800_000);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let json = r#"{ "harmonic": { "min_confidence_threshold": 0.75 } }"#;
        let config: AppConfig = serde_json::from_str(json).unwrap();

        assert_eq!(config.harmonic.min_confidence_threshold, 0.75);
        assert_eq!(config.harmonic.harmonic_tolerance_cents, 30.0);
        assert_eq!(config.voice, VoiceAnalysisConfig::default());
    }

    #[test]
    fn test_harmonic_patch_merges_only_set_fields() {
        let mut config = HarmonicCorrectionConfig::default();
        config.apply(&HarmonicCorrectionConfigPatch {
            max_harmonic_number: Some(4),
            volume_weight: Some(0.5),
            ..Default::default()
        });

        assert_eq!(config.max_harmonic_number, 4);
        assert_eq!(config.volume_weight, 0.5);
        assert_eq!(config.stability_weight, 0.7);
    }

    #[test]
    fn test_voice_patch_merges_only_set_fields() {
        let mut config = VoiceAnalysisConfig::default();
        config.apply(&VoiceAnalysisConfigPatch {
            vibrato_max_rate: Some(8.0),
            ..Default::default()
        });

        assert_eq!(config.vibrato_max_rate, 8.0);
        assert_eq!(config.vibrato_min_rate, 4.5);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "calibration": {{ "noise_duration_ms": 500 }} }}"#).unwrap();

        let config = AppConfig::load_from_file(file.path());
        assert_eq!(config.calibration.noise_duration_ms, 500);
        assert_eq!(config.calibration.volume_duration_ms, 3000);
    }

    #[test]
    fn test_load_missing_file_falls_back() {
        let config = AppConfig::load_from_file("/nonexistent/voice_pitch_config.json");
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn test_json_roundtrip() {
        let config = AppConfig::default();
        let json = serde_json::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, config);
    }
}
