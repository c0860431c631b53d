// Calibration error types and constants

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Calibration error code constants
///
/// Single source of truth for the numeric codes reported by
/// [`CalibrationError`].
///
/// Error code range: 2001-2008
pub struct CalibrationErrorCodes {}

impl CalibrationErrorCodes {
    /// Calibration already in progress
    pub const ALREADY_IN_PROGRESS: i32 = 2001;

    /// A measurement phase failed while polling the audio tap
    pub const MEASUREMENT_FAILED: i32 = 2002;

    /// A measurement phase finished without collecting any polls
    pub const INSUFFICIENT_SAMPLES: i32 = 2003;

    /// No calibration profile is available
    pub const NOT_CALIBRATED: i32 = 2004;

    /// Calibration state RwLock was poisoned
    pub const STATE_POISONED: i32 = 2005;

    /// Persisted profile could not be written or read
    pub const PERSISTENCE: i32 = 2006;

    /// Persisted profile is older than the maximum profile age
    pub const EXPIRED: i32 = 2007;

    /// Persisted profile belongs to another device type
    pub const DEVICE_MISMATCH: i32 = 2008;
}

/// Log a calibration error with structured context
///
/// The logging is non-blocking and will not panic on failure.
pub fn log_calibration_error(err: &CalibrationError, context: &str) {
    error!(
        "Calibration error in {}: code={}, component=CalibrationSystem, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Calibration-related errors
///
/// These errors cover the measurement phases, profile state management and
/// profile persistence.
///
/// Error code range: 2001-2008
#[derive(Debug, Clone, PartialEq)]
pub enum CalibrationError {
    /// Calibration already in progress
    AlreadyInProgress,

    /// Audio tap failed during a measurement phase
    MeasurementFailed { phase: String, reason: String },

    /// A measurement phase collected fewer polls than required
    InsufficientSamples {
        phase: String,
        required: usize,
        collected: usize,
    },

    /// No calibration profile is available
    NotCalibrated,

    /// Calibration state RwLock was poisoned
    StatePoisoned,

    /// Key-value store or record encoding failure
    Persistence { reason: String },

    /// Persisted profile is too old to trust
    Expired { age_ms: u64 },

    /// Persisted profile was captured on another device type
    DeviceMismatch { expected: String, found: String },
}

impl ErrorCode for CalibrationError {
    fn code(&self) -> i32 {
        match self {
            CalibrationError::AlreadyInProgress => CalibrationErrorCodes::ALREADY_IN_PROGRESS,
            CalibrationError::MeasurementFailed { .. } => {
                CalibrationErrorCodes::MEASUREMENT_FAILED
            }
            CalibrationError::InsufficientSamples { .. } => {
                CalibrationErrorCodes::INSUFFICIENT_SAMPLES
            }
            CalibrationError::NotCalibrated => CalibrationErrorCodes::NOT_CALIBRATED,
            CalibrationError::StatePoisoned => CalibrationErrorCodes::STATE_POISONED,
            CalibrationError::Persistence { .. } => CalibrationErrorCodes::PERSISTENCE,
            CalibrationError::Expired { .. } => CalibrationErrorCodes::EXPIRED,
            CalibrationError::DeviceMismatch { .. } => CalibrationErrorCodes::DEVICE_MISMATCH,
        }
    }

    fn message(&self) -> String {
        match self {
            CalibrationError::AlreadyInProgress => "Calibration already in progress".to_string(),
            CalibrationError::MeasurementFailed { phase, reason } => {
                format!("Measurement failed during {}: {}", phase, reason)
            }
            CalibrationError::InsufficientSamples {
                phase,
                required,
                collected,
            } => {
                format!(
                    "Insufficient samples during {}: need {}, got {}",
                    phase, required, collected
                )
            }
            CalibrationError::NotCalibrated => "No calibration data available".to_string(),
            CalibrationError::StatePoisoned => "Calibration state lock poisoned".to_string(),
            CalibrationError::Persistence { reason } => {
                format!("Calibration persistence failed: {}", reason)
            }
            CalibrationError::Expired { age_ms } => {
                format!(
                    "Saved calibration is too old ({} hours)",
                    age_ms / (60 * 60 * 1000)
                )
            }
            CalibrationError::DeviceMismatch { expected, found } => {
                format!(
                    "Saved calibration belongs to device type {} (expected {})",
                    found, expected
                )
            }
        }
    }
}

impl fmt::Display for CalibrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CalibrationError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for CalibrationError {}

impl From<serde_json::Error> for CalibrationError {
    fn from(err: serde_json::Error) -> Self {
        CalibrationError::Persistence {
            reason: err.to_string(),
        }
    }
}
