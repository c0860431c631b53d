// Vibrato detection from peak/valley periodicity
//
// The voiced pitch track is smoothed with a 3-frame moving average and
// scanned for strict local extrema. Two extrema make one cycle, so the rate
// is half the extremum count per second of buffer time. Depth is the mean
// cents distance between neighbouring extrema and regularity compares the
// spacing of every other extremum (peak to peak, valley to valley).

use crate::analysis::stats::{cents, mean, std_dev};
use crate::config::VoiceAnalysisConfig;

/// Frames required in the buffer before vibrato is measured
const MIN_FRAMES: usize = 30;

/// Voiced frames required before vibrato is measured
const MIN_VOICED_FRAMES: usize = 20;

/// Extrema required for a rate estimate (two full cycles)
const MIN_EXTREMA: usize = 4;

/// Peak-to-peak intervals required for a regularity estimate
const MIN_INTERVALS: usize = 3;

const SMOOTHING_WINDOW: usize = 3;

/// Vibrato measurement over the analysis buffer
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct VibratoInfo {
    pub detected: bool,
    /// Oscillation rate (Hz)
    pub rate_hz: Option<f64>,
    /// Mean extremum-to-extremum depth (cents)
    pub depth_cents: Option<f64>,
    /// Spacing regularity (0..1)
    pub regularity: Option<f64>,
}

impl VibratoInfo {
    /// Not enough data to measure anything
    pub fn none() -> Self {
        Self {
            detected: false,
            rate_hz: None,
            depth_cents: None,
            regularity: None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Extremum {
    index: usize,
}

/// Measure vibrato over a buffer
///
/// # Arguments
/// * `frame_count` - Total frames in the buffer, voiced or not
/// * `voiced` - Voiced frequencies in buffer order
/// * `duration_s` - Time between the first and last buffered frame
pub(super) fn detect(
    frame_count: usize,
    voiced: &[f64],
    duration_s: f64,
    config: &VoiceAnalysisConfig,
) -> VibratoInfo {
    if frame_count < MIN_FRAMES || voiced.len() < MIN_VOICED_FRAMES || duration_s <= 0.0 {
        return VibratoInfo::none();
    }

    let smoothed = smooth(voiced, SMOOTHING_WINDOW);
    let extrema = find_extrema(&smoothed);
    if extrema.len() < MIN_EXTREMA {
        return VibratoInfo::none();
    }

    let rate = (extrema.len() as f64 / 2.0) / duration_s;

    let depths: Vec<f64> = extrema
        .windows(2)
        .map(|pair| (smoothed[pair[0].index], smoothed[pair[1].index]))
        .filter(|&(a, b)| a > 0.0 && b > 0.0)
        .map(|(a, b)| cents(a, b).abs())
        .collect();
    let depth = mean(&depths);

    let intervals: Vec<f64> = extrema
        .iter()
        .step_by(2)
        .collect::<Vec<_>>()
        .windows(2)
        .map(|pair| (pair[1].index - pair[0].index) as f64)
        .collect();
    let regularity = if intervals.len() >= MIN_INTERVALS {
        let average = mean(&intervals);
        (1.0 - std_dev(&intervals) / average).max(0.0)
    } else {
        0.0
    };

    VibratoInfo {
        detected: rate >= config.vibrato_min_rate
            && rate <= config.vibrato_max_rate
            && depth >= config.vibrato_min_depth_cents,
        rate_hz: Some(rate),
        depth_cents: Some(depth),
        regularity: Some(regularity),
    }
}

/// Centered moving average, window truncated at the edges
fn smooth(values: &[f64], window: usize) -> Vec<f64> {
    let half = window / 2;
    (0..values.len())
        .map(|i| {
            let start = i.saturating_sub(half);
            let end = (i + half + 1).min(values.len());
            mean(&values[start..end])
        })
        .collect()
}

/// Strict local maxima and minima, endpoints excluded
fn find_extrema(values: &[f64]) -> Vec<Extremum> {
    values
        .windows(3)
        .enumerate()
        .filter(|(_, w)| (w[1] > w[0] && w[1] > w[2]) || (w[1] < w[0] && w[1] < w[2]))
        .map(|(i, _)| Extremum { index: i + 1 })
        .collect()
}
