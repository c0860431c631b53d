// Analysis module - post-processing of raw pitch detector frames
//
// The raw detector produces one frame per analysis hop carrying frequency,
// volume and clarity. Two consumers live here:
// 1. HarmonicCorrector: folds octave/harmonic misdetections back onto the
//    fundamental using a short rolling history
// 2. VoiceQualityAnalyzer: summarizes a few seconds of frames into a quality
//    verdict with practice recommendations
//
// Both own their buffers exclusively and are driven synchronously from the
// detection loop, one call per frame.
//
// Volume is a 0..1 fraction throughout this crate. Adapters feeding
// percentage volumes must divide by 100 before calling in.

pub mod harmonic;
pub mod stats;
pub mod voice;

pub use harmonic::{AnalysisStats, CorrectionResult, HarmonicCandidate, HarmonicCorrector};
pub use voice::{
    BufferStats, QualityLevel, Recommendation, VibratoInfo, VoiceAnalysisResult,
    VoiceQualityAnalyzer,
};

/// One raw detector frame
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Sample {
    /// Detected frequency in Hz (0 or negative means unvoiced)
    pub frequency_hz: f64,
    /// Volume as a 0..1 fraction
    pub volume: f64,
    /// Detector clarity / periodicity confidence (0..1)
    pub clarity: f64,
    /// Wall-clock capture time in milliseconds
    pub timestamp_ms: u64,
}
