// Errors raised while polling an audio tap and while running, applying or
// persisting a calibration
//
// Harmonic correction and voice analysis never fail, so they have no error
// type. Tap errors are folded into CalibrationError::MeasurementFailed by the
// phase that polled the tap.

mod audio;
mod calibration;

pub use audio::{log_audio_error, AudioError, AudioErrorCodes};
pub use calibration::{log_calibration_error, CalibrationError, CalibrationErrorCodes};

/// Stable numeric code plus a one-line message
///
/// Codes are grouped by source (1xxx audio tap, 2xxx calibration) so a host
/// UI can map a failed run or load to its own wording. The message is also
/// what `CalibrationEvent::Failed` carries to progress subscribers.
pub trait ErrorCode {
    fn code(&self) -> i32;

    fn message(&self) -> String;
}
