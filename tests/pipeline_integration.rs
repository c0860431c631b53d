//! Integration tests for the detection post-processing pipeline
//!
//! Raw detector frames go through the HarmonicCorrector first and the
//! corrected frequency is handed to the VoiceQualityAnalyzer, the same order
//! a live detection loop uses.

use std::io::Write;
use std::sync::Arc;

use tempfile::NamedTempFile;
use voice_pitch_core::{
    AppConfig, Clock, HarmonicCorrector, ManualClock, QualityLevel, VoiceAnalysisResult,
    VoiceQualityAnalyzer,
};

const FRAME_MS: u64 = 20;

/// Steady 220 Hz voice where the detector locks onto the 3rd harmonic for
/// two out of every six frames
fn misdetected_track(frames: usize) -> Vec<f64> {
    (0..frames)
        .map(|i| if i % 6 < 4 { 220.0 } else { 660.0 })
        .collect()
}

fn run_pipeline(
    corrector: &mut HarmonicCorrector,
    analyzer: &mut VoiceQualityAnalyzer,
    track: &[f64],
    correct: bool,
) -> (Vec<f64>, VoiceAnalysisResult) {
    let mut corrected = Vec::with_capacity(track.len());
    let mut last = None;
    for (i, &detected) in track.iter().enumerate() {
        let timestamp = i as u64 * FRAME_MS;
        let frequency = if correct {
            corrector
                .correct_frequency_at(detected, 0.8, timestamp)
                .corrected_frequency_hz
        } else {
            detected
        };
        corrected.push(frequency);
        last = Some(analyzer.analyze_voice_at(frequency, 0.8, 0.9, None, timestamp));
    }
    (corrected, last.expect("track must not be empty"))
}

#[test]
fn test_corrected_track_is_stable() {
    let track = misdetected_track(100);
    let mut corrector = HarmonicCorrector::new();
    let mut analyzer = VoiceQualityAnalyzer::new();

    let (corrected, result) = run_pipeline(&mut corrector, &mut analyzer, &track, true);

    assert!(
        corrected.iter().all(|&f| (f - 220.0).abs() < 0.5),
        "every frame should fold back onto 220 Hz"
    );
    assert!(result.stability > 0.95, "stability {}", result.stability);
    assert_eq!(result.quality, QualityLevel::Excellent);
    assert!(result.settled);
    assert!(!result.vibrato.detected);
}

#[test]
fn test_uncorrected_track_scores_worse() {
    let track = misdetected_track(100);

    let mut corrector = HarmonicCorrector::new();
    let mut analyzer = VoiceQualityAnalyzer::new();
    let (_, corrected) = run_pipeline(&mut corrector, &mut analyzer, &track, true);

    let mut corrector = HarmonicCorrector::new();
    let mut analyzer = VoiceQualityAnalyzer::new();
    let (_, raw) = run_pipeline(&mut corrector, &mut analyzer, &track, false);

    assert!(raw.stability < 0.1, "raw stability {}", raw.stability);
    assert!(raw.overall_score < corrected.overall_score);
    assert_ne!(raw.quality, QualityLevel::Excellent);
    assert!(!raw.recommendations.is_empty());
}

#[test]
fn test_config_file_drives_components() {
    let mut file = NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{
            "harmonic": {{ "min_confidence_threshold": 1.5 }},
            "voice": {{ "analysis_window_ms": 500 }}
        }}"#
    )
    .unwrap();

    let config = AppConfig::load_from_file(file.path());
    assert_eq!(config.harmonic.min_confidence_threshold, 1.5);
    assert_eq!(config.harmonic.max_harmonic_number, 8);
    assert_eq!(config.voice.analysis_window_ms, 500);

    // No candidate can clear a threshold above 1, so nothing is corrected
    let mut corrector = HarmonicCorrector::with_config(config.harmonic.clone());
    let mut analyzer = VoiceQualityAnalyzer::with_config(config.voice.clone());
    let (corrected, _) = run_pipeline(&mut corrector, &mut analyzer, &misdetected_track(60), true);
    assert_eq!(corrected, misdetected_track(60));

    // 500 ms window at 20 ms frames keeps 25 frames
    assert_eq!(analyzer.buffer_stats().entry_count, 25);
}

#[test]
fn test_missing_config_file_uses_defaults() {
    let config = AppConfig::load_from_file("/nonexistent/voice_pitch.json");
    assert_eq!(config, AppConfig::default());
}

#[test]
fn test_shared_clock_drives_both_components() {
    let clock = Arc::new(ManualClock::new(1_000));
    let config = AppConfig::default();
    let mut corrector = HarmonicCorrector::with_clock(config.harmonic, clock.clone());
    let mut analyzer = VoiceQualityAnalyzer::with_clock(config.voice, clock.clone());

    for &detected in &misdetected_track(30) {
        let result = corrector.correct_frequency(detected, 0.8);
        analyzer.analyze_voice(result.corrected_frequency_hz, 0.8, 0.9, None);
        clock.advance(FRAME_MS);
    }

    let stats = analyzer.buffer_stats();
    assert_eq!(stats.entry_count, 30);
    assert_eq!(stats.time_span_ms, 29 * FRAME_MS);
    assert_eq!(corrector.analysis_stats().history_length, 30);
    assert_eq!(clock.now_ms(), 1_000 + 30 * FRAME_MS);
}
