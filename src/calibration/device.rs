// Device-type defaults
//
// Each device class ships with baseline detector settings. The table is an
// explicit value handed to CalibrationSystem at construction, so callers can
// override or extend it without touching shared state.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Device type used when a lookup misses
pub const FALLBACK_DEVICE_TYPE: &str = "PC";

/// Baseline detector settings for one device class
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSpecs {
    pub device_type: String,
    /// Default detector sensitivity multiplier
    pub sensitivity: f64,
    /// Default noise gate (normalized RMS)
    pub noise_gate: f64,
    /// Volume normalization divisor
    pub divisor: f64,
    /// Gain applied to compensate quiet built-in microphones
    pub gain_compensation: f64,
    /// Noise threshold on the detector's percentage volume scale
    pub noise_threshold: f64,
    /// Volume smoothing factor
    pub smoothing_factor: f64,
}

impl DeviceSpecs {
    pub fn pc() -> Self {
        Self {
            device_type: "PC".to_string(),
            sensitivity: 1.0,
            noise_gate: 0.02,
            divisor: 6.0,
            gain_compensation: 1.0,
            noise_threshold: 15.0,
            smoothing_factor: 0.2,
        }
    }

    pub fn iphone() -> Self {
        Self {
            device_type: "iPhone".to_string(),
            sensitivity: 3.0,
            noise_gate: 0.015,
            divisor: 4.0,
            gain_compensation: 1.5,
            noise_threshold: 12.0,
            smoothing_factor: 0.2,
        }
    }

    pub fn ipad() -> Self {
        Self {
            device_type: "iPad".to_string(),
            sensitivity: 7.0,
            noise_gate: 0.01,
            divisor: 4.0,
            gain_compensation: 1.5,
            noise_threshold: 12.0,
            smoothing_factor: 0.2,
        }
    }
}

/// Device type → baseline settings map
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceProfileTable {
    profiles: HashMap<String, DeviceSpecs>,
}

impl DeviceProfileTable {
    /// Table with the PC, iPhone and iPad profiles
    pub fn standard() -> Self {
        let mut table = Self {
            profiles: HashMap::new(),
        };
        table.insert(DeviceSpecs::pc());
        table.insert(DeviceSpecs::iphone());
        table.insert(DeviceSpecs::ipad());
        table
    }

    /// Add or replace the profile for `specs.device_type`
    pub fn insert(&mut self, specs: DeviceSpecs) {
        self.profiles.insert(specs.device_type.clone(), specs);
    }

    /// Exact lookup
    pub fn get(&self, device_type: &str) -> Option<&DeviceSpecs> {
        self.profiles.get(device_type)
    }

    /// Lookup falling back to the PC profile for unknown device types
    pub fn resolve(&self, device_type: &str) -> DeviceSpecs {
        if let Some(specs) = self.profiles.get(device_type) {
            return specs.clone();
        }

        tracing::warn!(
            "[CalibrationSystem] Unknown device type {:?}, using {} defaults",
            device_type,
            FALLBACK_DEVICE_TYPE
        );
        self.profiles
            .get(FALLBACK_DEVICE_TYPE)
            .cloned()
            .unwrap_or_else(DeviceSpecs::pc)
    }

    pub fn device_types(&self) -> impl Iterator<Item = &str> {
        self.profiles.keys().map(String::as_str)
    }
}

impl Default for DeviceProfileTable {
    fn default() -> Self {
        Self::standard()
    }
}
