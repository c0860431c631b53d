// Voice Pitch Core - pitch post-processing and device calibration
// Harmonic correction, voice quality analysis and per-device calibration
// for a live pitch detector

// Module declarations
pub mod analysis;
pub mod calibration;
pub mod clock;
pub mod config;
pub mod error;
pub mod testing;

// Re-exports for convenience
pub use analysis::{
    CorrectionResult, HarmonicCorrector, QualityLevel, Sample, VoiceAnalysisResult,
    VoiceQualityAnalyzer,
};
pub use calibration::{
    AudioTap, CalibrationOutcome, CalibrationSystem, DetectorHooks, OptimalSettings,
};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::AppConfig;
pub use error::{AudioError, CalibrationError, ErrorCode};

use tracing_subscriber::EnvFilter;

/// Install a fmt subscriber filtered by `RUST_LOG` (default `info`)
///
/// `log` records from this crate are bridged through `tracing`. Calling this
/// more than once, or after the host installed its own subscriber, is a no-op.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if tracing_subscriber::fmt().with_env_filter(filter).try_init().is_ok() {
        tracing::info!("[Logging] Subscriber installed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging_is_idempotent() {
        init_logging();
        init_logging();
    }
}
