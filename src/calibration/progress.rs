// Progress events broadcast while a calibration run is active

use serde::{Deserialize, Serialize};

use crate::calibration::measurement::MeasurementPhase;

/// Broadcast channel capacity; slow subscribers see `Lagged` rather than
/// stalling the measurement loop
pub const EVENT_CHANNEL_CAPACITY: usize = 32;

/// Calibration lifecycle event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum CalibrationEvent {
    Started {
        device_type: String,
    },
    PhaseStarted {
        phase: MeasurementPhase,
    },
    PhaseCompleted {
        phase: MeasurementPhase,
        polls: usize,
    },
    Completed,
    Failed {
        reason: String,
    },
}

impl CalibrationEvent {
    /// Whether no further events follow for this run
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            CalibrationEvent::Completed | CalibrationEvent::Failed { .. }
        )
    }

    /// Phase this event refers to, if any
    pub fn phase(&self) -> Option<MeasurementPhase> {
        match self {
            CalibrationEvent::PhaseStarted { phase } => Some(*phase),
            CalibrationEvent::PhaseCompleted { phase, .. } => Some(*phase),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_events() {
        assert!(CalibrationEvent::Completed.is_terminal());
        assert!(CalibrationEvent::Failed {
            reason: "x".to_string()
        }
        .is_terminal());
        assert!(!CalibrationEvent::PhaseStarted {
            phase: MeasurementPhase::VolumeLevels
        }
        .is_terminal());
    }

    #[test]
    fn test_event_phase() {
        let event = CalibrationEvent::PhaseCompleted {
            phase: MeasurementPhase::FrequencyResponse,
            polls: 50,
        };
        assert_eq!(event.phase(), Some(MeasurementPhase::FrequencyResponse));
        assert_eq!(CalibrationEvent::Completed.phase(), None);
    }

    #[test]
    fn test_event_serialization_is_tagged() {
        let json = serde_json::to_string(&CalibrationEvent::PhaseStarted {
            phase: MeasurementPhase::BackgroundNoise,
        })
        .unwrap();
        assert_eq!(json, r#"{"event":"phase_started","phase":"BackgroundNoise"}"#);
    }
}
