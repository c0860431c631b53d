// Audio tap error types and constants

use crate::error::ErrorCode;
use log::error;
use std::fmt;

/// Audio error code constants
///
/// Single source of truth for the numeric codes reported by [`AudioError`].
///
/// Error code range: 1001-1004
pub struct AudioErrorCodes {}

impl AudioErrorCodes {
    /// Input stream ended or was torn down
    pub const STREAM_ENDED: i32 = 1001;

    /// Hardware error occurred
    pub const HARDWARE_ERROR: i32 = 1002;

    /// Requested FFT size is not usable by the tap
    pub const INVALID_FFT_SIZE: i32 = 1003;

    /// Source data could not be decoded
    pub const DECODE_FAILED: i32 = 1004;
}

/// Log an audio error with structured context
///
/// The logging is non-blocking and will not panic on failure.
pub fn log_audio_error(err: &AudioError, context: &str) {
    error!(
        "Audio error in {}: code={}, component=AudioTap, message={}",
        context,
        err.code(),
        err.message()
    );
}

/// Audio analysis tap errors
///
/// These errors are raised by [`crate::calibration::AudioTap`] implementations
/// while a measurement phase polls them.
///
/// Error code range: 1001-1004
#[derive(Debug, Clone, PartialEq)]
pub enum AudioError {
    /// Input stream ended or was torn down mid-measurement
    StreamEnded,

    /// Hardware error occurred
    HardwareError { details: String },

    /// FFT size must be a non-zero power of two
    InvalidFftSize { fft_size: usize },

    /// Source data could not be decoded
    DecodeFailed { reason: String },
}

impl ErrorCode for AudioError {
    fn code(&self) -> i32 {
        match self {
            AudioError::StreamEnded => AudioErrorCodes::STREAM_ENDED,
            AudioError::HardwareError { .. } => AudioErrorCodes::HARDWARE_ERROR,
            AudioError::InvalidFftSize { .. } => AudioErrorCodes::INVALID_FFT_SIZE,
            AudioError::DecodeFailed { .. } => AudioErrorCodes::DECODE_FAILED,
        }
    }

    fn message(&self) -> String {
        match self {
            AudioError::StreamEnded => "Audio input stream ended".to_string(),
            AudioError::HardwareError { details } => {
                format!("Hardware error: {}", details)
            }
            AudioError::InvalidFftSize { fft_size } => {
                format!("FFT size must be a non-zero power of two (got {})", fft_size)
            }
            AudioError::DecodeFailed { reason } => {
                format!("Failed to decode audio source: {}", reason)
            }
        }
    }
}

impl fmt::Display for AudioError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "AudioError::{:?} (code {}): {}",
            self,
            self.code(),
            self.message()
        )
    }
}

impl std::error::Error for AudioError {}

/// Convert from std::io::Error to AudioError
impl From<std::io::Error> for AudioError {
    fn from(err: std::io::Error) -> Self {
        AudioError::HardwareError {
            details: err.to_string(),
        }
    }
}

impl From<hound::Error> for AudioError {
    fn from(err: hound::Error) -> Self {
        AudioError::DecodeFailed {
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_error_codes() {
        assert_eq!(AudioError::StreamEnded.code(), 1001);
        assert_eq!(
            AudioError::HardwareError {
                details: "test".to_string()
            }
            .code(),
            1002
        );
        assert_eq!(AudioError::InvalidFftSize { fft_size: 3 }.code(), 1003);
        assert_eq!(
            AudioError::DecodeFailed {
                reason: "test".to_string()
            }
            .code(),
            1004
        );
    }

    #[test]
    fn test_audio_error_messages() {
        let err = AudioError::InvalidFftSize { fft_size: 1000 };
        assert!(err.message().contains("got 1000"));

        let err = AudioError::StreamEnded;
        assert!(err.message().contains("ended"));
    }

    #[test]
    fn test_audio_error_display() {
        let err = AudioError::StreamEnded;
        let display = format!("{}", err);
        assert!(display.contains("AudioError"));
        assert!(display.contains("1001"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe closed");
        let audio_err: AudioError = io_err.into();

        match audio_err {
            AudioError::HardwareError { details } => {
                assert!(details.contains("pipe closed"));
            }
            _ => panic!("Expected HardwareError variant"),
        }
    }
}
