// VoiceQualityAnalyzer - short-term voice quality verdicts
//
// Accumulates a rolling window (3 s, at most 200 frames) of detector frames
// and derives four component scores from it:
// - stability: pitch spread across the window
// - vibrato: rate/depth/regularity of periodic pitch oscillation
// - breathiness: high-band vs low-band spectral energy (needs a spectrum)
// - consistency: steadiness of volume and clarity
//
// The weighted sum of the components maps to a QualityLevel, and a fixed
// rule table turns the components into practice recommendations.
//
// Every score has an explicit insufficient-data fallback, so a verdict is
// always available and never NaN.

mod recommendations;
mod vibrato;

use std::collections::VecDeque;
use std::sync::Arc;

use crate::analysis::stats::{dispersion_score, finite_or_zero, mean, std_dev};
use crate::analysis::Sample;
use crate::clock::{Clock, SystemClock};
use crate::config::{VoiceAnalysisConfig, VoiceAnalysisConfigPatch};

pub use recommendations::Recommendation;
pub use vibrato::VibratoInfo;

/// Maximum number of frames retained in the analysis buffer
pub const BUFFER_CAPACITY: usize = 200;

/// Frames required before stability and consistency are measured
const MIN_SAMPLES_FOR_STATISTICS: usize = 10;

/// Voiced frames required before stability is measured
const MIN_VOICED_FOR_STABILITY: usize = 5;

/// Neutral score used while the buffer is still filling
const NEUTRAL_SCORE: f64 = 0.5;

/// Stability reported when the buffer is mostly unvoiced
const UNVOICED_STABILITY: f64 = 0.3;

/// Pitch spread (approximate cents) at which stability reaches zero
const STABILITY_ZERO_CENTS: f64 = 100.0;

/// Component weights of the overall score
const STABILITY_WEIGHT: f64 = 0.4;
const CONSISTENCY_WEIGHT: f64 = 0.3;
const BREATHINESS_WEIGHT: f64 = 0.2;
const VIBRATO_WEIGHT: f64 = 0.1;

/// Breathiness term used when no spectrum was supplied
const UNKNOWN_BREATHINESS_TERM: f64 = 0.7;

/// Overall voice quality verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityLevel {
    Excellent,
    Good,
    Fair,
    Poor,
}

impl QualityLevel {
    /// Map an overall score to a level (≥0.85, ≥0.70, ≥0.50, below)
    pub fn from_score(score: f64) -> Self {
        if score >= 0.85 {
            QualityLevel::Excellent
        } else if score >= 0.7 {
            QualityLevel::Good
        } else if score >= 0.5 {
            QualityLevel::Fair
        } else {
            QualityLevel::Poor
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            QualityLevel::Excellent => "excellent",
            QualityLevel::Good => "good",
            QualityLevel::Fair => "fair",
            QualityLevel::Poor => "poor",
        }
    }
}

/// Result of one analysis call
#[derive(Debug, Clone, PartialEq)]
pub struct VoiceAnalysisResult {
    pub quality: QualityLevel,
    /// Pitch stability (0..1)
    pub stability: f64,
    /// Recommendation messages in rule order
    pub recommendations: Vec<String>,
    /// Volume/clarity consistency (0..1)
    pub consistency: f64,
    /// High/low band energy ratio (0..1), `None` without a spectrum
    pub breathiness: Option<f64>,
    pub vibrato: VibratoInfo,
    /// Weighted component sum the quality level was derived from
    pub overall_score: f64,
    /// Whether the buffer spans at least the configured minimum analysis time
    pub settled: bool,
}

/// Diagnostics over the current analysis buffer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BufferStats {
    pub entry_count: usize,
    pub time_span_ms: u64,
    pub average_volume: f64,
    pub average_clarity: f64,
}

/// Rolling-window voice quality analyzer
pub struct VoiceQualityAnalyzer {
    config: VoiceAnalysisConfig,
    buffer: VecDeque<Sample>,
    last_vibrato: VibratoInfo,
    clock: Arc<dyn Clock>,
}

impl VoiceQualityAnalyzer {
    /// Create an analyzer with default configuration and the system clock
    pub fn new() -> Self {
        Self::with_config(VoiceAnalysisConfig::default())
    }

    pub fn with_config(config: VoiceAnalysisConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: VoiceAnalysisConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            buffer: VecDeque::with_capacity(BUFFER_CAPACITY + 1),
            last_vibrato: VibratoInfo::none(),
            clock,
        }
    }

    /// Analyze a frame stamped with the current clock time
    ///
    /// # Arguments
    /// * `frequency_hz` - Detected (ideally harmonic-corrected) frequency
    /// * `volume` - Volume as a 0..1 fraction
    /// * `clarity` - Detector clarity (0..1)
    /// * `spectrum` - Optional magnitude spectrum of the same frame
    pub fn analyze_voice(
        &mut self,
        frequency_hz: f64,
        volume: f64,
        clarity: f64,
        spectrum: Option<&[f64]>,
    ) -> VoiceAnalysisResult {
        let now = self.clock.now_ms();
        self.analyze_voice_at(frequency_hz, volume, clarity, spectrum, now)
    }

    /// Analyze a frame captured at `timestamp_ms`
    pub fn analyze_voice_at(
        &mut self,
        frequency_hz: f64,
        volume: f64,
        clarity: f64,
        spectrum: Option<&[f64]>,
        timestamp_ms: u64,
    ) -> VoiceAnalysisResult {
        self.push(Sample {
            frequency_hz: finite_or_zero(frequency_hz),
            volume: finite_or_zero(volume),
            clarity: finite_or_zero(clarity),
            timestamp_ms,
        });
        self.evict(timestamp_ms);

        let stability = self.calculate_stability();
        let vibrato = self.detect_vibrato();
        let breathiness = spectrum.and_then(analyze_breathiness);
        let consistency = self.analyze_consistency();
        let overall_score = overall_score(stability, &vibrato, breathiness, consistency);
        let quality = QualityLevel::from_score(overall_score);

        let recommendations = recommendations::generate(
            quality,
            stability,
            &vibrato,
            breathiness,
            consistency,
            &self.config,
        )
        .into_iter()
        .map(|r| r.message().to_string())
        .collect();

        self.last_vibrato = vibrato;

        VoiceAnalysisResult {
            quality,
            stability,
            recommendations,
            consistency,
            breathiness,
            vibrato,
            overall_score,
            settled: self.time_span_ms() >= self.config.min_analysis_time_ms,
        }
    }

    /// Pitch stability from the spread of voiced frequencies
    ///
    /// The spread is approximated in cents as `stddev / mean × 1200`;
    /// 0 cents maps to 1.0 and 100 cents or more to 0.0.
    fn calculate_stability(&self) -> f64 {
        if self.buffer.len() < MIN_SAMPLES_FOR_STATISTICS {
            return NEUTRAL_SCORE;
        }

        let voiced = self.voiced_frequencies();
        if voiced.len() < MIN_VOICED_FOR_STABILITY {
            return UNVOICED_STABILITY;
        }

        let spread_cents = std_dev(&voiced) / mean(&voiced) * 1200.0;
        let stability = 1.0 - spread_cents / STABILITY_ZERO_CENTS;
        if stability.is_finite() {
            stability.clamp(0.0, 1.0)
        } else {
            NEUTRAL_SCORE
        }
    }

    fn detect_vibrato(&self) -> VibratoInfo {
        let (Some(first), Some(last)) = (self.buffer.front(), self.buffer.back()) else {
            return VibratoInfo::none();
        };
        let duration_s = last.timestamp_ms.saturating_sub(first.timestamp_ms) as f64 / 1000.0;
        vibrato::detect(
            self.buffer.len(),
            &self.voiced_frequencies(),
            duration_s,
            &self.config,
        )
    }

    /// Average of the volume and clarity dispersion scores
    fn analyze_consistency(&self) -> f64 {
        if self.buffer.len() < MIN_SAMPLES_FOR_STATISTICS {
            return NEUTRAL_SCORE;
        }

        let volumes: Vec<f64> = self.buffer.iter().map(|s| s.volume).collect();
        let clarities: Vec<f64> = self.buffer.iter().map(|s| s.clarity).collect();
        (dispersion_score(&volumes) + dispersion_score(&clarities)) / 2.0
    }

    fn voiced_frequencies(&self) -> Vec<f64> {
        self.buffer
            .iter()
            .map(|s| s.frequency_hz)
            .filter(|&f| f > 0.0)
            .collect()
    }

    fn push(&mut self, sample: Sample) {
        self.buffer.push_back(sample);
        while self.buffer.len() > BUFFER_CAPACITY {
            self.buffer.pop_front();
        }
    }

    /// Drop frames at or before `now - analysis_window_ms`
    fn evict(&mut self, now_ms: u64) {
        let Some(cutoff) = now_ms.checked_sub(self.config.analysis_window_ms) else {
            return;
        };
        while self
            .buffer
            .front()
            .is_some_and(|sample| sample.timestamp_ms <= cutoff)
        {
            self.buffer.pop_front();
        }
    }

    fn time_span_ms(&self) -> u64 {
        match (self.buffer.front(), self.buffer.back()) {
            (Some(first), Some(last)) => last.timestamp_ms.saturating_sub(first.timestamp_ms),
            _ => 0,
        }
    }

    /// Vibrato measured by the most recent analysis call
    pub fn vibrato(&self) -> VibratoInfo {
        self.last_vibrato
    }

    /// Clear the analysis buffer
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.last_vibrato = VibratoInfo::none();
    }

    pub fn buffer_stats(&self) -> BufferStats {
        let volumes: Vec<f64> = self.buffer.iter().map(|s| s.volume).collect();
        let clarities: Vec<f64> = self.buffer.iter().map(|s| s.clarity).collect();
        BufferStats {
            entry_count: self.buffer.len(),
            time_span_ms: self.time_span_ms(),
            average_volume: mean(&volumes),
            average_clarity: mean(&clarities),
        }
    }

    /// Merge a partial configuration update
    pub fn update_config(&mut self, patch: &VoiceAnalysisConfigPatch) {
        self.config.apply(patch);
    }

    pub fn config(&self) -> &VoiceAnalysisConfig {
        &self.config
    }
}

impl Default for VoiceQualityAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

/// High-band to low-band energy ratio of a magnitude spectrum, capped at 1
///
/// The low band is the first 20% of bins (twice the lowest decile), the high
/// band the last 30%. Energy is the sum of squared magnitudes. An empty
/// spectrum carries no information and yields `None`; a silent low band
/// yields full breathiness.
fn analyze_breathiness(spectrum: &[f64]) -> Option<f64> {
    if spectrum.is_empty() {
        return None;
    }

    let decile = spectrum.len() / 10;
    let low_end = (decile * 2).min(spectrum.len());
    let high_start = spectrum.len() * 7 / 10;

    let energy = |bins: &[f64]| bins.iter().filter(|m| m.is_finite()).map(|m| m * m).sum::<f64>();
    let low_energy = energy(&spectrum[..low_end]);
    let high_energy = energy(&spectrum[high_start..]);

    if low_energy == 0.0 {
        return Some(1.0);
    }
    Some((high_energy / low_energy).min(1.0))
}

/// Weighted sum of the component scores
fn overall_score(
    stability: f64,
    vibrato: &VibratoInfo,
    breathiness: Option<f64>,
    consistency: f64,
) -> f64 {
    let breathiness_term = match breathiness {
        Some(b) => 1.0 - b.min(1.0),
        None => UNKNOWN_BREATHINESS_TERM,
    };
    let vibrato_term = if vibrato.detected && vibrato.regularity.unwrap_or(0.0) > 0.7 {
        0.9
    } else if vibrato.detected {
        0.6
    } else {
        0.5
    };

    let score = stability * STABILITY_WEIGHT
        + consistency * CONSISTENCY_WEIGHT
        + breathiness_term * BREATHINESS_WEIGHT
        + vibrato_term * VIBRATO_WEIGHT;
    if score.is_finite() {
        score
    } else {
        NEUTRAL_SCORE
    }
}
