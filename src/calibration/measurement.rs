// Timed measurement phases
//
// Each phase is one bounded polling loop over a caller-supplied AudioTap:
// check elapsed time, poll the tap, sleep for the poll interval. Phases share
// the tap, so CalibrationSystem runs them strictly one after another.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::config::CalibrationConfig;
use crate::error::{log_audio_error, AudioError, CalibrationError, ErrorCode};

/// Lower edge of the frequency-response band (Hz)
pub const RESPONSE_BAND_MIN_HZ: u32 = 80;

/// Upper edge of the frequency-response band (Hz)
pub const RESPONSE_BAND_MAX_HZ: u32 = 1000;

/// Per-bin average level keyed by bin frequency rounded to whole Hz
pub type SpectrumProfile = BTreeMap<u32, f64>;

/// Live audio analysis primitive polled by the measurement phases
///
/// Implementations wrap whatever capture and FFT machinery the host has.
/// Errors surface as measurement failures, so a torn-down stream should
/// return [`AudioError::StreamEnded`] from the next poll.
pub trait AudioTap: Send + Sync {
    fn sample_rate_hz(&self) -> u32;

    /// Current magnitude spectrum in dB, `fft_size / 2` bins
    fn frequency_data(&self, fft_size: usize) -> Result<Vec<f32>, AudioError>;

    /// Most recent `fft_size` time-domain samples in -1..1
    fn time_domain_data(&self, fft_size: usize) -> Result<Vec<f32>, AudioError>;
}

/// Calibration measurement phases in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MeasurementPhase {
    BackgroundNoise,
    VolumeLevels,
    FrequencyResponse,
}

impl MeasurementPhase {
    pub const ALL: [MeasurementPhase; 3] = [
        MeasurementPhase::BackgroundNoise,
        MeasurementPhase::VolumeLevels,
        MeasurementPhase::FrequencyResponse,
    ];

    pub fn display_name(&self) -> &'static str {
        match self {
            MeasurementPhase::BackgroundNoise => "background noise",
            MeasurementPhase::VolumeLevels => "volume levels",
            MeasurementPhase::FrequencyResponse => "frequency response",
        }
    }
}

impl fmt::Display for MeasurementPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Duration, poll interval and analysis size of one phase
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseTiming {
    pub duration: Duration,
    pub poll_interval: Duration,
    pub fft_size: usize,
}

impl PhaseTiming {
    pub fn for_phase(config: &CalibrationConfig, phase: MeasurementPhase) -> Self {
        let (duration_ms, interval_ms, fft_size) = match phase {
            MeasurementPhase::BackgroundNoise => (
                config.noise_duration_ms,
                config.noise_poll_interval_ms,
                config.noise_fft_size,
            ),
            MeasurementPhase::VolumeLevels => (
                config.volume_duration_ms,
                config.volume_poll_interval_ms,
                config.volume_fft_size,
            ),
            MeasurementPhase::FrequencyResponse => (
                config.response_duration_ms,
                config.response_poll_interval_ms,
                config.response_fft_size,
            ),
        };

        Self {
            duration: Duration::from_millis(duration_ms),
            // A zero interval would spin without yielding to the timer
            poll_interval: Duration::from_millis(interval_ms.max(1)),
            fft_size,
        }
    }
}

/// Phase result together with the number of tap polls behind it
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseOutput<T> {
    pub data: T,
    pub polls: usize,
}

/// Volume range measured from time-domain RMS
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VolumeCalibration {
    /// Target loudness minus median RMS
    pub offset: f64,
    pub min_rms: f64,
    pub max_rms: f64,
    pub median_rms: f64,
}

/// Average the tap's spectrum over the phase (silence expected)
pub async fn measure_background_noise(
    tap: &dyn AudioTap,
    timing: PhaseTiming,
) -> Result<PhaseOutput<SpectrumProfile>, CalibrationError> {
    let phase = MeasurementPhase::BackgroundNoise;
    let sample_rate = tap.sample_rate_hz();
    let mut accumulator = BinAccumulator::default();

    let polls = poll_phase(phase, timing, || {
        let bins = tap.frequency_data(timing.fft_size)?;
        for (index, &db) in bins.iter().enumerate() {
            accumulator.add(bin_frequency(index, sample_rate, timing.fft_size), db);
        }
        Ok(())
    })
    .await?;

    Ok(PhaseOutput {
        data: accumulator.averages(),
        polls,
    })
}

/// Collect time-domain RMS readings and derive the loudness offset
///
/// # Arguments
/// * `target_loudness` - Normalized RMS the median reading should map to
pub async fn calibrate_volume_levels(
    tap: &dyn AudioTap,
    timing: PhaseTiming,
    target_loudness: f64,
) -> Result<PhaseOutput<VolumeCalibration>, CalibrationError> {
    let mut readings = Vec::new();

    let polls = poll_phase(MeasurementPhase::VolumeLevels, timing, || {
        let samples = tap.time_domain_data(timing.fft_size)?;
        readings.push(rms(&samples));
        Ok(())
    })
    .await?;

    readings.sort_by(f64::total_cmp);
    let median_rms = readings[readings.len() / 2];

    Ok(PhaseOutput {
        data: VolumeCalibration {
            offset: target_loudness - median_rms,
            min_rms: readings[0],
            max_rms: readings[readings.len() - 1],
            median_rms,
        },
        polls,
    })
}

/// Average the tap's spectrum over the 80-1000 Hz band
pub async fn measure_frequency_response(
    tap: &dyn AudioTap,
    timing: PhaseTiming,
) -> Result<PhaseOutput<SpectrumProfile>, CalibrationError> {
    let sample_rate = tap.sample_rate_hz();
    let mut accumulator = BinAccumulator::default();

    let polls = poll_phase(MeasurementPhase::FrequencyResponse, timing, || {
        let bins = tap.frequency_data(timing.fft_size)?;
        for (index, &db) in bins.iter().enumerate() {
            let hz = bin_frequency(index, sample_rate, timing.fft_size);
            if (RESPONSE_BAND_MIN_HZ..=RESPONSE_BAND_MAX_HZ).contains(&hz) {
                accumulator.add(hz, db);
            }
        }
        Ok(())
    })
    .await?;

    Ok(PhaseOutput {
        data: accumulator.averages(),
        polls,
    })
}

/// Poll until the phase duration has elapsed, sleeping between polls
///
/// Returns the number of polls taken. The first tap error aborts the phase.
async fn poll_phase<F>(
    phase: MeasurementPhase,
    timing: PhaseTiming,
    mut poll: F,
) -> Result<usize, CalibrationError>
where
    F: FnMut() -> Result<(), AudioError>,
{
    let started = Instant::now();
    let mut polls = 0usize;

    loop {
        if started.elapsed() >= timing.duration {
            break;
        }

        poll().map_err(|err| {
            log_audio_error(&err, phase.display_name());
            CalibrationError::MeasurementFailed {
                phase: phase.to_string(),
                reason: err.message(),
            }
        })?;
        polls += 1;

        tokio::time::sleep(timing.poll_interval).await;
    }

    if polls == 0 {
        return Err(CalibrationError::InsufficientSamples {
            phase: phase.to_string(),
            required: 1,
            collected: 0,
        });
    }

    tracing::debug!("[CalibrationSystem] {} phase took {} polls", phase, polls);
    Ok(polls)
}

/// Centre frequency of an FFT bin rounded to whole Hz
fn bin_frequency(index: usize, sample_rate: u32, fft_size: usize) -> u32 {
    if fft_size == 0 {
        return 0;
    }
    (index as f64 * sample_rate as f64 / fft_size as f64).round() as u32
}

fn rms(samples: &[f32]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let energy: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    (energy / samples.len() as f64).sqrt()
}

/// Running per-frequency sums; non-finite levels are skipped
#[derive(Default)]
struct BinAccumulator {
    sums: BTreeMap<u32, (f64, usize)>,
}

impl BinAccumulator {
    fn add(&mut self, hz: u32, db: f32) {
        if !db.is_finite() {
            return;
        }
        let entry = self.sums.entry(hz).or_insert((0.0, 0));
        entry.0 += db as f64;
        entry.1 += 1;
    }

    fn averages(self) -> SpectrumProfile {
        self.sums
            .into_iter()
            .map(|(hz, (sum, count))| (hz, sum / count as f64))
            .collect()
    }
}
