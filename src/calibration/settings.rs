// Optimal detector settings derived from the measurement phases

use serde::{Deserialize, Serialize};

use crate::analysis::stats::mean;
use crate::calibration::device::DeviceSpecs;
use crate::calibration::measurement::{SpectrumProfile, VolumeCalibration};

/// Noise-profile band averaged for the noise gate (Hz)
const NOISE_BAND_HZ: std::ops::RangeInclusive<u32> = 100..=800;

/// Level assumed when a band has no usable bins (dB)
const EMPTY_BAND_DB: f64 = -60.0;

const SENSITIVITY_SCALE_MIN: f64 = 0.5;
const SENSITIVITY_SCALE_MAX: f64 = 2.0;

/// Detector filter chain parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FilterSettings {
    pub highpass_hz: f64,
    pub lowpass_hz: f64,
    /// Power line hum notch
    pub notch_hz: f64,
    pub highpass_q: f64,
    pub lowpass_q: f64,
    pub notch_q: f64,
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            highpass_hz: 80.0,
            lowpass_hz: 800.0,
            notch_hz: 60.0,
            highpass_q: 0.7,
            lowpass_q: 0.7,
            notch_q: 10.0,
        }
    }
}

/// Band gain compensation relative to the mid band
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeviceAdjustments {
    pub low_freq_compensation: f64,
    pub high_freq_compensation: f64,
}

impl Default for DeviceAdjustments {
    fn default() -> Self {
        Self {
            low_freq_compensation: 1.0,
            high_freq_compensation: 1.0,
        }
    }
}

/// Settings pushed into the external detector
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OptimalSettings {
    pub sensitivity: f64,
    /// Noise gate as normalized RMS
    pub noise_gate: f64,
    pub volume_offset: f64,
    pub filter_settings: FilterSettings,
    pub device_adjustments: DeviceAdjustments,
}

/// Settings used when no calibration is available
pub fn default_settings(device: &DeviceSpecs) -> OptimalSettings {
    OptimalSettings {
        sensitivity: device.sensitivity,
        noise_gate: device.noise_gate,
        volume_offset: 0.0,
        filter_settings: FilterSettings::default(),
        device_adjustments: DeviceAdjustments::default(),
    }
}

/// Derive settings from the three phase results
///
/// - sensitivity: device default scaled by `clamp(1 - offset, 0.5, 2.0)`
/// - noise gate: `max(default, |mean noise dB (100-800 Hz) + 10| / 1000)`.
///   The level is not clamped at -20 dB first, so a very quiet device can
///   derive a gate above 0.02 (-100 dB gives 0.09)
/// - filters: response split into equal-count low/mid/high thirds; a weak low
///   third raises the highpass to 100 Hz, a strong high third lowers the
///   lowpass to 600 Hz
/// - adjustments: mid/low and mid/high level ratios, clamped
pub fn calculate_optimal_settings(
    device: &DeviceSpecs,
    noise_profile: &SpectrumProfile,
    volume: &VolumeCalibration,
    frequency_response: &SpectrumProfile,
) -> OptimalSettings {
    let defaults = default_settings(device);

    let scale = (1.0 - volume.offset).clamp(SENSITIVITY_SCALE_MIN, SENSITIVITY_SCALE_MAX);
    let sensitivity = defaults.sensitivity * scale;

    let noise_levels: Vec<f64> = noise_profile
        .iter()
        .filter(|(hz, _)| NOISE_BAND_HZ.contains(*hz))
        .map(|(_, &db)| db)
        .collect();
    let noise_db = if noise_levels.is_empty() {
        EMPTY_BAND_DB
    } else {
        mean(&noise_levels)
    };
    let noise_gate = defaults.noise_gate.max((noise_db + 10.0).abs() / 1000.0);

    let (low, mid, high) = band_thirds(frequency_response);

    let filter_settings = FilterSettings {
        highpass_hz: if low < mid - 5.0 { 100.0 } else { 80.0 },
        lowpass_hz: if high > mid + 3.0 { 600.0 } else { 800.0 },
        ..defaults.filter_settings
    };

    let device_adjustments = DeviceAdjustments {
        low_freq_compensation: (mid / nonzero_level(low)).clamp(0.8, 1.5),
        high_freq_compensation: (mid / nonzero_level(high)).clamp(0.8, 1.2),
    };

    OptimalSettings {
        sensitivity: round_to(sensitivity, 10.0),
        noise_gate: round_to(noise_gate, 1000.0),
        volume_offset: volume.offset,
        filter_settings,
        device_adjustments,
    }
}

/// Mean level of the low, mid and high equal-count thirds (ascending Hz)
fn band_thirds(response: &SpectrumProfile) -> (f64, f64, f64) {
    let levels: Vec<f64> = response.values().copied().collect();
    let n = levels.len();
    let (a, b) = (n / 3, 2 * n / 3);
    (
        mean(&levels[..a]),
        mean(&levels[a..b]),
        mean(&levels[b..]),
    )
}

fn nonzero_level(db: f64) -> f64 {
    if db == 0.0 {
        EMPTY_BAND_DB
    } else {
        db
    }
}

fn round_to(value: f64, factor: f64) -> f64 {
    (value * factor).round() / factor
}
