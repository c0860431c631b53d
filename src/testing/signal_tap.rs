//! Deterministic [`AudioTap`] over synthetic or recorded PCM.
//!
//! Each poll reads the next `fft_size` samples from the source and advances
//! the read head, so consecutive polls see consecutive audio. Spectra use a
//! Hann window and are reported in dB relative to full scale, floored at
//! [`DB_FLOOR`].

use rand::{rngs::StdRng, Rng, SeedableRng};
use rustfft::{num_complex::Complex, FftPlanner};
use std::f32::consts::PI;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use crate::calibration::AudioTap;
use crate::error::AudioError;

/// Lowest level reported for a bin (dB)
pub const DB_FLOOR: f32 = -160.0;

/// PCM source behind a [`SignalTap`].
#[derive(Debug, Clone, PartialEq)]
pub enum SignalSource {
    Silence,
    Sine { frequency_hz: f32, amplitude: f32 },
    /// Uniform white noise in `-amplitude..amplitude` from a seeded RNG.
    WhiteNoise { amplitude: f32, seed: u64 },
    /// Mono samples played in a loop.
    Samples(Vec<f32>),
}

struct TapState {
    /// Index of the next sample to read
    position: usize,
    polls: usize,
    rng: StdRng,
    planner: FftPlanner<f32>,
}

pub struct SignalTap {
    sample_rate: u32,
    source: SignalSource,
    /// Polls allowed before the stream reports it has ended
    fail_after: Option<usize>,
    state: Mutex<TapState>,
}

impl SignalTap {
    pub fn new(sample_rate: u32, source: SignalSource) -> Self {
        let seed = match source {
            SignalSource::WhiteNoise { seed, .. } => seed,
            _ => 0,
        };
        Self {
            sample_rate,
            source,
            fail_after: None,
            state: Mutex::new(TapState {
                position: 0,
                polls: 0,
                rng: StdRng::seed_from_u64(seed),
                planner: FftPlanner::new(),
            }),
        }
    }

    pub fn silence(sample_rate: u32) -> Self {
        Self::new(sample_rate, SignalSource::Silence)
    }

    pub fn sine(sample_rate: u32, frequency_hz: f32, amplitude: f32) -> Self {
        Self::new(
            sample_rate,
            SignalSource::Sine {
                frequency_hz,
                amplitude,
            },
        )
    }

    pub fn white_noise(sample_rate: u32, amplitude: f32, seed: u64) -> Self {
        Self::new(sample_rate, SignalSource::WhiteNoise { amplitude, seed })
    }

    /// Load a WAV file, mixing multi-channel audio down to mono
    pub fn from_wav<P: AsRef<Path>>(path: P) -> Result<Self, AudioError> {
        let (samples, sample_rate) = read_wav(path.as_ref())?;
        Ok(Self::new(sample_rate, SignalSource::Samples(samples)))
    }

    /// Report [`AudioError::StreamEnded`] once `polls` polls have been served
    pub fn fail_after(mut self, polls: usize) -> Self {
        self.fail_after = Some(polls);
        self
    }

    /// Polls served so far
    pub fn polls(&self) -> usize {
        self.lock().map(|state| state.polls).unwrap_or(0)
    }

    fn lock(&self) -> Result<MutexGuard<'_, TapState>, AudioError> {
        self.state.lock().map_err(|_| AudioError::HardwareError {
            details: "signal tap state poisoned".to_string(),
        })
    }

    /// Validate the request, count the poll and read the next block
    fn next_block(
        &self,
        state: &mut TapState,
        fft_size: usize,
    ) -> Result<Vec<f32>, AudioError> {
        if fft_size < 2 || !fft_size.is_power_of_two() {
            return Err(AudioError::InvalidFftSize { fft_size });
        }
        if self.fail_after.is_some_and(|limit| state.polls >= limit) {
            return Err(AudioError::StreamEnded);
        }
        state.polls += 1;

        let start = state.position;
        state.position += fft_size;

        let block = match &self.source {
            SignalSource::Silence => vec![0.0; fft_size],
            SignalSource::Sine {
                frequency_hz,
                amplitude,
            } => (start..start + fft_size)
                .map(|n| {
                    let t = n as f64 / self.sample_rate as f64;
                    amplitude * (2.0 * std::f64::consts::PI * *frequency_hz as f64 * t).sin() as f32
                })
                .collect(),
            SignalSource::WhiteNoise { amplitude, .. } => {
                if *amplitude <= 0.0 {
                    vec![0.0; fft_size]
                } else {
                    (0..fft_size)
                        .map(|_| state.rng.gen_range(-*amplitude..*amplitude))
                        .collect()
                }
            }
            SignalSource::Samples(samples) => {
                if samples.is_empty() {
                    vec![0.0; fft_size]
                } else {
                    (start..start + fft_size)
                        .map(|n| samples[n % samples.len()])
                        .collect()
                }
            }
        };
        Ok(block)
    }
}

impl AudioTap for SignalTap {
    fn sample_rate_hz(&self) -> u32 {
        self.sample_rate
    }

    fn frequency_data(&self, fft_size: usize) -> Result<Vec<f32>, AudioError> {
        let mut state = self.lock()?;
        let block = self.next_block(&mut state, fft_size)?;

        let mut buffer: Vec<Complex<f32>> = block
            .iter()
            .enumerate()
            .map(|(i, &sample)| Complex::new(sample * hann(i, fft_size), 0.0))
            .collect();
        let fft = state.planner.plan_fft_forward(fft_size);
        fft.process(&mut buffer);

        Ok(buffer[..fft_size / 2]
            .iter()
            .map(|c| (20.0 * (c.norm() / fft_size as f32).log10()).max(DB_FLOOR))
            .collect())
    }

    fn time_domain_data(&self, fft_size: usize) -> Result<Vec<f32>, AudioError> {
        let mut state = self.lock()?;
        self.next_block(&mut state, fft_size)
    }
}

fn hann(i: usize, size: usize) -> f32 {
    0.5 * (1.0 - ((2.0 * PI * i as f32) / (size as f32 - 1.0)).cos())
}

fn read_wav(path: &Path) -> Result<(Vec<f32>, u32), AudioError> {
    let mut reader = hound::WavReader::open(path)?;
    let spec = reader.spec();
    if spec.channels == 0 {
        return Err(AudioError::DecodeFailed {
            reason: format!("{} has zero channels", path.display()),
        });
    }

    let samples = match spec.sample_format {
        hound::SampleFormat::Float => reader.samples::<f32>().collect::<Result<Vec<_>, _>>()?,
        hound::SampleFormat::Int => match spec.bits_per_sample {
            16 => reader
                .samples::<i16>()
                .map(|s| s.map(|v| v as f32 / i16::MAX as f32))
                .collect::<Result<Vec<_>, _>>()?,
            24 => reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / 8_388_607.0))
                .collect::<Result<Vec<_>, _>>()?,
            32 => reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / i32::MAX as f32))
                .collect::<Result<Vec<_>, _>>()?,
            bits => {
                return Err(AudioError::DecodeFailed {
                    reason: format!("unsupported bits_per_sample={bits} for {}", path.display()),
                })
            }
        },
    };

    let channels = spec.channels as usize;
    if channels == 1 {
        return Ok((samples, spec.sample_rate));
    }

    let mono = samples
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / channels as f32)
        .collect();
    Ok((mono, spec.sample_rate))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn peak_bin(spectrum: &[f32]) -> usize {
        spectrum
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)
            .unwrap()
    }

    #[test]
    fn test_silence_is_floored() {
        let tap = SignalTap::silence(44_100);
        let spectrum = tap.frequency_data(2048).unwrap();
        assert_eq!(spectrum.len(), 1024);
        assert!(spectrum.iter().all(|&db| db == DB_FLOOR));
        assert!(tap.time_domain_data(1024).unwrap().iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_sine_peak_bin() {
        let tap = SignalTap::sine(48_000, 375.0, 0.5);
        let spectrum = tap.frequency_data(4096).unwrap();
        // 375 Hz / (48000 / 4096) = 32
        assert_eq!(peak_bin(&spectrum), 32);
        assert!(spectrum[32] > -20.0);
        assert!(spectrum[32] - spectrum[400] > 60.0);
    }

    #[test]
    fn test_read_head_advances() {
        let tap = SignalTap::new(8, SignalSource::Samples(vec![0.0, 0.25, 0.5, 0.75]));
        assert_eq!(tap.time_domain_data(2).unwrap(), vec![0.0, 0.25]);
        assert_eq!(tap.time_domain_data(4).unwrap(), vec![0.5, 0.75, 0.0, 0.25]);
        assert_eq!(tap.polls(), 2);
    }

    #[test]
    fn test_white_noise_is_seeded() {
        let a = SignalTap::white_noise(44_100, 0.1, 9);
        let b = SignalTap::white_noise(44_100, 0.1, 9);
        let block = a.time_domain_data(256).unwrap();
        assert_eq!(block, b.time_domain_data(256).unwrap());
        assert!(block.iter().all(|s| s.abs() < 0.1));
        assert!(block.iter().any(|&s| s != 0.0));
    }

    #[test]
    fn test_fail_after() {
        let tap = SignalTap::silence(44_100).fail_after(2);
        assert!(tap.time_domain_data(64).is_ok());
        assert!(tap.frequency_data(64).is_ok());
        assert_eq!(tap.time_domain_data(64), Err(AudioError::StreamEnded));
        assert_eq!(tap.polls(), 2);
    }

    #[test]
    fn test_invalid_fft_size() {
        let tap = SignalTap::silence(44_100);
        assert_eq!(
            tap.frequency_data(1000),
            Err(AudioError::InvalidFftSize { fft_size: 1000 })
        );
        assert_eq!(tap.polls(), 0);
    }

    #[test]
    fn test_wav_stereo_mixdown() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("tone.wav");
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 16_000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for _ in 0..8 {
            writer.write_sample(i16::MAX).unwrap();
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();

        let tap = SignalTap::from_wav(&path).unwrap();
        assert_eq!(tap.sample_rate_hz(), 16_000);
        let block = tap.time_domain_data(8).unwrap();
        assert!(block.iter().all(|&s| (s - 0.5).abs() < 1e-6));
    }

    #[test]
    fn test_missing_wav_is_decode_error() {
        let err = SignalTap::from_wav("/nonexistent/tone.wav").err().unwrap();
        assert!(matches!(err, AudioError::DecodeFailed { .. }));
    }
}
