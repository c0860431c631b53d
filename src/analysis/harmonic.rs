// HarmonicCorrector - octave/harmonic misdetection correction
//
// Pitch detectors regularly lock onto the 2nd or 3rd harmonic of a voice
// instead of its fundamental. Given a newly detected frequency, this module
// enumerates the fundamentals it could be a harmonic of and scores each one
// against the last few detections. A lower fundamental is only reported when
// it explains the recent history clearly better than the raw detection does.
//
// History is time-windowed (2 s default) and capped at 50 entries; it is
// evicted at the start of every correction call.

use std::cmp::Ordering;
use std::collections::VecDeque;
use std::sync::Arc;

use crate::analysis::stats::{cents, finite_or_zero, mean, std_dev};
use crate::clock::{Clock, SystemClock};
use crate::config::{HarmonicCorrectionConfig, HarmonicCorrectionConfigPatch};

/// Maximum number of history entries retained
pub const HISTORY_CAPACITY: usize = 50;

/// Minimum number of history entries before correction is attempted
pub const MIN_HISTORY_FOR_CORRECTION: usize = 3;

/// Number of most recent detections candidates are scored against
pub const SCORING_LOOKBACK: usize = 10;

/// Candidate fundamentals below this are never proposed (Hz)
pub const MIN_FUNDAMENTAL_HZ: f64 = 60.0;

/// Confidence reported when there is not enough evidence to judge
pub const INSUFFICIENT_EVIDENCE_CONFIDENCE: f64 = 0.1;

/// Likelihood assigned to the uncorrected (n = 1) candidate
const TRIVIAL_CANDIDATE_LIKELIHOOD: f64 = 0.5;

/// Minimum frequency change reported as an applied correction (Hz)
const CORRECTION_EPSILON_HZ: f64 = 1.0;

/// Confidences closer than this are treated as equal
const CONFIDENCE_TIE_EPSILON: f64 = 1e-9;

/// Outcome of a single correction call
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CorrectionResult {
    pub corrected_frequency_hz: f64,
    /// Confidence of the winning hypothesis (0..1)
    pub confidence: f64,
    /// True when the corrected frequency differs from the input by more than 1 Hz
    pub correction_applied: bool,
}

/// A fundamental the detected frequency may be a harmonic of
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HarmonicCandidate {
    pub fundamental_hz: f64,
    /// 1 = the detection itself, 2..=8 = detection is that harmonic
    pub harmonic_number: u32,
    /// Round-trip fit of `fundamental × n` to the detection (0..1)
    pub likelihood: f64,
}

/// Diagnostics over the current history buffer
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalysisStats {
    pub history_length: usize,
    pub average_confidence: f64,
    /// (min, max) detected frequency, `None` when history is empty
    pub frequency_range: Option<(f64, f64)>,
    /// `1 - stddev/mean` of history frequencies, floored at 0
    pub stability_score: f64,
}

#[derive(Debug, Clone, Copy)]
struct HistoryEntry {
    frequency_hz: f64,
    confidence: f64,
    timestamp_ms: u64,
}

#[derive(Debug, Clone, Copy)]
struct ScoredCandidate {
    fundamental_hz: f64,
    harmonic_number: u32,
    confidence: f64,
}

impl ScoredCandidate {
    /// Higher confidence wins; ties go to the lower harmonic number
    fn beats(&self, other: &ScoredCandidate) -> bool {
        let diff = self.confidence - other.confidence;
        if diff > CONFIDENCE_TIE_EPSILON {
            return true;
        }
        diff.abs() <= CONFIDENCE_TIE_EPSILON && self.harmonic_number < other.harmonic_number
    }
}

/// Corrects octave and harmonic misdetections using a rolling history
pub struct HarmonicCorrector {
    config: HarmonicCorrectionConfig,
    history: VecDeque<HistoryEntry>,
    clock: Arc<dyn Clock>,
}

impl HarmonicCorrector {
    /// Create a corrector with default configuration and the system clock
    pub fn new() -> Self {
        Self::with_config(HarmonicCorrectionConfig::default())
    }

    pub fn with_config(config: HarmonicCorrectionConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: HarmonicCorrectionConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            config,
            history: VecDeque::with_capacity(HISTORY_CAPACITY + 1),
            clock,
        }
    }

    /// Correct a detected frequency, stamping it with the current clock time
    ///
    /// # Arguments
    /// * `detected_hz` - Raw detector frequency
    /// * `volume` - Frame volume as a 0..1 fraction, used as a confidence proxy
    pub fn correct_frequency(&mut self, detected_hz: f64, volume: f64) -> CorrectionResult {
        let now = self.clock.now_ms();
        self.correct_frequency_at(detected_hz, volume, now)
    }

    /// Correct a detected frequency captured at `timestamp_ms`
    ///
    /// Never fails: with too little history, or for an unvoiced
    /// (non-positive or non-finite) detection, the input is returned
    /// unchanged with confidence 0.1.
    pub fn correct_frequency_at(
        &mut self,
        detected_hz: f64,
        volume: f64,
        timestamp_ms: u64,
    ) -> CorrectionResult {
        self.evict(timestamp_ms);

        if !detected_hz.is_finite() || detected_hz <= 0.0 {
            return Self::uncorrected(detected_hz, INSUFFICIENT_EVIDENCE_CONFIDENCE);
        }

        self.push_history(detected_hz, volume, timestamp_ms);

        if self.history.len() < MIN_HISTORY_FOR_CORRECTION {
            return Self::uncorrected(detected_hz, INSUFFICIENT_EVIDENCE_CONFIDENCE);
        }

        let recent: Vec<f64> = self
            .history
            .iter()
            .rev()
            .take(SCORING_LOOKBACK)
            .map(|entry| entry.frequency_hz)
            .collect();

        let best = self
            .fundamental_candidates(detected_hz)
            .into_iter()
            .map(|candidate| ScoredCandidate {
                fundamental_hz: candidate.fundamental_hz,
                harmonic_number: candidate.harmonic_number,
                confidence: self.score_candidate(candidate.fundamental_hz, &recent),
            })
            .fold(None::<ScoredCandidate>, |best, candidate| match best {
                Some(current) if !candidate.beats(&current) => Some(current),
                _ => Some(candidate),
            });

        let Some(best) = best else {
            return Self::uncorrected(detected_hz, INSUFFICIENT_EVIDENCE_CONFIDENCE);
        };

        let corrected = if best.harmonic_number > 1
            && best.confidence > self.config.min_confidence_threshold
        {
            best.fundamental_hz
        } else {
            detected_hz
        };

        if corrected != detected_hz {
            tracing::debug!(
                "[HarmonicCorrector] {:.1} Hz -> {:.1} Hz (harmonic {}, confidence {:.2})",
                detected_hz,
                corrected,
                best.harmonic_number,
                best.confidence
            );
        }

        CorrectionResult {
            corrected_frequency_hz: corrected,
            confidence: best.confidence,
            correction_applied: (corrected - detected_hz).abs() > CORRECTION_EPSILON_HZ,
        }
    }

    /// Enumerate candidate fundamentals for a detection, most likely first
    ///
    /// Harmonic numbers 2..=max are accepted when the fundamental is at least
    /// 60 Hz and `fundamental × n` lands within the cents tolerance of the
    /// detection. The uncorrected candidate (n = 1, likelihood 0.5) is always
    /// included.
    pub fn fundamental_candidates(&self, detected_hz: f64) -> Vec<HarmonicCandidate> {
        let tolerance = self.config.harmonic_tolerance_cents;
        let mut candidates: Vec<HarmonicCandidate> = (2..=self.config.max_harmonic_number)
            .filter_map(|n| {
                let fundamental = detected_hz / n as f64;
                if fundamental < MIN_FUNDAMENTAL_HZ {
                    return None;
                }
                let deviation = cents(detected_hz, fundamental * n as f64).abs();
                (deviation <= tolerance).then(|| HarmonicCandidate {
                    fundamental_hz: fundamental,
                    harmonic_number: n,
                    likelihood: 1.0 - deviation / tolerance,
                })
            })
            .collect();

        candidates.push(HarmonicCandidate {
            fundamental_hz: detected_hz,
            harmonic_number: 1,
            likelihood: TRIVIAL_CANDIDATE_LIKELIHOOD,
        });

        candidates.sort_by(|a, b| {
            b.likelihood
                .partial_cmp(&a.likelihood)
                .unwrap_or(Ordering::Equal)
                .then(a.harmonic_number.cmp(&b.harmonic_number))
        });
        candidates
    }

    /// Confidence that `recent` detections form a harmonic series over `fundamental`
    ///
    /// Each detection is compared to its nearest integer multiple of the
    /// fundamental with twice the candidate tolerance. The result blends the
    /// average closeness of matching frames with the share of frames matching.
    fn score_candidate(&self, fundamental: f64, recent: &[f64]) -> f64 {
        if recent.len() < MIN_HISTORY_FOR_CORRECTION {
            return INSUFFICIENT_EVIDENCE_CONFIDENCE;
        }

        let tolerance = self.config.harmonic_tolerance_cents * 2.0;
        let mut score_sum = 0.0;
        let mut matches = 0usize;

        for &frequency in recent {
            let multiple = (frequency / fundamental).round().max(1.0);
            let deviation = cents(frequency, fundamental * multiple).abs();
            if deviation <= tolerance {
                score_sum += 1.0 - deviation / tolerance;
                matches += 1;
            }
        }

        if matches == 0 {
            return INSUFFICIENT_EVIDENCE_CONFIDENCE;
        }

        let average = score_sum / matches as f64;
        let coverage = (matches as f64 / recent.len() as f64).min(1.0);
        let weight = self.config.stability_weight;
        (average * weight + coverage * (1.0 - weight)).min(1.0)
    }

    fn push_history(&mut self, frequency_hz: f64, volume: f64, timestamp_ms: u64) {
        let volume_term = finite_or_zero(volume).clamp(0.0, 1.0);
        let jitter_term = match self.history.back() {
            Some(previous) => {
                let ratio = frequency_hz.max(previous.frequency_hz)
                    / frequency_hz.min(previous.frequency_hz);
                (1.0 - (ratio - 1.0) * 5.0).max(0.0)
            }
            None => 0.5,
        };
        let weight = self.config.volume_weight;

        self.history.push_back(HistoryEntry {
            frequency_hz,
            confidence: volume_term * weight + jitter_term * (1.0 - weight),
            timestamp_ms,
        });
        while self.history.len() > HISTORY_CAPACITY {
            self.history.pop_front();
        }
    }

    /// Drop entries at or before `now - history_window_ms`
    fn evict(&mut self, now_ms: u64) {
        let Some(cutoff) = now_ms.checked_sub(self.config.history_window_ms) else {
            return;
        };
        while self
            .history
            .front()
            .is_some_and(|entry| entry.timestamp_ms <= cutoff)
        {
            self.history.pop_front();
        }
    }

    fn uncorrected(detected_hz: f64, confidence: f64) -> CorrectionResult {
        CorrectionResult {
            corrected_frequency_hz: detected_hz,
            confidence,
            correction_applied: false,
        }
    }

    /// Clear the correction history
    pub fn reset_history(&mut self) {
        self.history.clear();
    }

    /// Summarize the current history buffer
    pub fn analysis_stats(&self) -> AnalysisStats {
        if self.history.is_empty() {
            return AnalysisStats {
                history_length: 0,
                average_confidence: 0.0,
                frequency_range: None,
                stability_score: 0.0,
            };
        }

        let frequencies: Vec<f64> = self.history.iter().map(|e| e.frequency_hz).collect();
        let confidences: Vec<f64> = self.history.iter().map(|e| e.confidence).collect();
        let min = frequencies.iter().copied().fold(f64::INFINITY, f64::min);
        let max = frequencies.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let average = mean(&frequencies);
        let stability_score = if average > 0.0 {
            (1.0 - std_dev(&frequencies) / average).max(0.0)
        } else {
            0.0
        };

        AnalysisStats {
            history_length: self.history.len(),
            average_confidence: mean(&confidences),
            frequency_range: Some((min, max)),
            stability_score,
        }
    }

    /// Merge a partial configuration update
    pub fn update_config(&mut self, patch: &HarmonicCorrectionConfigPatch) {
        self.config.apply(patch);
    }

    pub fn config(&self) -> &HarmonicCorrectionConfig {
        &self.config
    }
}

impl Default for HarmonicCorrector {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "harmonic_tests.rs"]
mod tests;
