// Calibration lifecycle state and status snapshot

use serde::{Deserialize, Serialize};

use crate::calibration::device::DeviceSpecs;
use crate::calibration::persistence::CalibrationProfile;

/// Lifecycle of a CalibrationSystem
///
/// `Idle → Calibrating → {Calibrated | Failed}`. Loading a saved profile
/// moves straight to `Calibrated`; `reset` returns to `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CalibrationState {
    #[default]
    Idle,
    Calibrating,
    Calibrated,
    Failed,
}

impl CalibrationState {
    pub fn display_name(&self) -> &'static str {
        match self {
            CalibrationState::Idle => "idle",
            CalibrationState::Calibrating => "calibrating",
            CalibrationState::Calibrated => "calibrated",
            CalibrationState::Failed => "failed",
        }
    }
}

/// Snapshot returned by `CalibrationSystem::status`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationStatus {
    pub state: CalibrationState,
    pub is_calibrated: bool,
    pub in_progress: bool,
    pub device_specs: DeviceSpecs,
    pub profile: Option<CalibrationProfile>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_state_is_idle() {
        assert_eq!(CalibrationState::default(), CalibrationState::Idle);
        assert_eq!(CalibrationState::Calibrated.display_name(), "calibrated");
    }
}
