//! Integration tests for the calibration workflow
//!
//! These tests run complete calibrations against synthetic audio from
//! `SignalTap` and persist the result through the file-backed store:
//! - Full three-phase run and derived settings
//! - Save in one system, restore in a fresh one sharing the store directory
//! - Failure path falling back to device defaults

use std::sync::Arc;

use futures::StreamExt;
use tempfile::TempDir;
use voice_pitch_core::calibration::{
    default_settings, CalibrationEvent, CalibrationState, DeviceProfileTable, FilterSettings,
    JsonFileStore, KeyValueStore, MeasurementPhase,
};
use voice_pitch_core::config::CalibrationConfig;
use voice_pitch_core::testing::SignalTap;
use voice_pitch_core::{CalibrationError, CalibrationSystem, DetectorHooks, ManualClock};

const NOW_MS: u64 = 1_700_000_000_000;

fn file_backed_system(dir: &TempDir, device_type: &str, clock: &Arc<ManualClock>) -> CalibrationSystem {
    let store: Arc<dyn KeyValueStore> = Arc::new(JsonFileStore::open(dir.path()).unwrap());
    let device = DeviceProfileTable::standard().resolve(device_type);
    CalibrationSystem::new(device, CalibrationConfig::default(), store).with_clock(clock.clone())
}

#[derive(Default)]
struct Detector {
    sensitivity: Option<f64>,
    noise_gate: Option<f64>,
    filters: Option<FilterSettings>,
}

impl DetectorHooks for Detector {
    fn set_sensitivity(&mut self, sensitivity: f64) -> anyhow::Result<()> {
        self.sensitivity = Some(sensitivity);
        Ok(())
    }

    fn set_noise_gate(&mut self, noise_gate: f64) -> anyhow::Result<()> {
        self.noise_gate = Some(noise_gate);
        Ok(())
    }

    fn update_filter_settings(&mut self, filters: &FilterSettings) -> anyhow::Result<()> {
        self.filters = Some(*filters);
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn test_full_calibration_with_sine_input() {
    let dir = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new(NOW_MS));
    let system = file_backed_system(&dir, "iPhone", &clock);
    let tap = SignalTap::sine(48_000, 220.0, 0.5);

    let outcome = system.calibrate(&tap).await.unwrap();

    assert!(outcome.success, "calibration failed: {:?}", outcome.error);
    assert_eq!(tap.polls(), 20 + 60 + 50);

    let profile = outcome.profile.expect("successful run carries a profile");
    assert_eq!(profile.device_type, "iPhone");
    assert_eq!(profile.captured_at_ms, NOW_MS);

    // RMS of a 0.5 sine is ~0.354, above the 0.3 target
    assert!(
        profile.volume_offset < 0.0 && profile.volume_offset > -0.1,
        "volume offset {}",
        profile.volume_offset
    );
    let settings = outcome.recommended_settings;
    assert!(settings.sensitivity > 3.0 && settings.sensitivity < 3.3);
    assert!(settings.noise_gate >= 0.015);

    // Every voice band bin is measured, rounded to whole Hz
    assert!(profile
        .frequency_response
        .keys()
        .all(|&hz| (80..=1000).contains(&hz)));
    assert!(profile.noise_profile.len() > profile.frequency_response.len());

    let mut detector = Detector::default();
    assert!(system.apply_calibration(&mut detector));
    assert_eq!(detector.sensitivity, Some(settings.sensitivity));
    assert_eq!(detector.noise_gate, Some(settings.noise_gate));
    assert_eq!(detector.filters, Some(settings.filter_settings));
}

#[tokio::test(start_paused = true)]
async fn test_saved_profile_survives_restart() {
    let dir = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new(NOW_MS));

    let first = file_backed_system(&dir, "iPad", &clock);
    let outcome = first
        .calibrate(&SignalTap::white_noise(44_100, 0.2, 3))
        .await
        .unwrap();
    assert!(outcome.success);
    first.save_calibration().unwrap();
    drop(first);

    clock.advance(24 * 60 * 60 * 1000);
    let restarted = file_backed_system(&dir, "iPad", &clock);
    assert_eq!(restarted.state().unwrap(), CalibrationState::Idle);

    restarted.load_calibration().unwrap();

    assert_eq!(restarted.state().unwrap(), CalibrationState::Calibrated);
    assert_eq!(restarted.profile().unwrap(), outcome.profile);
    assert_eq!(
        restarted.recommended_settings().unwrap(),
        outcome.recommended_settings
    );

    // The profile is stored per device type
    let other = file_backed_system(&dir, "iPhone", &clock);
    assert_eq!(other.load_calibration(), Err(CalibrationError::NotCalibrated));
}

#[tokio::test(start_paused = true)]
async fn test_unknown_device_calibrates_as_pc() {
    let dir = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new(NOW_MS));
    let system = file_backed_system(&dir, "Toaster", &clock);
    assert_eq!(system.device_specs().device_type, "PC");

    let outcome = system.calibrate(&SignalTap::silence(44_100)).await.unwrap();
    assert!(outcome.success);
    system.save_calibration().unwrap();

    assert!(dir
        .path()
        .read_dir()
        .unwrap()
        .filter_map(Result::ok)
        .any(|entry| entry.file_name().to_string_lossy().contains("PC")));
}

#[tokio::test(start_paused = true)]
async fn test_stream_failure_falls_back_to_defaults() {
    let dir = TempDir::new().unwrap();
    let clock = Arc::new(ManualClock::new(NOW_MS));
    let system = file_backed_system(&dir, "iPhone", &clock);
    let events = system.progress_stream();

    // Ends during the frequency response phase
    let tap = SignalTap::sine(48_000, 220.0, 0.5).fail_after(100);
    let outcome = system.calibrate(&tap).await.unwrap();

    assert!(!outcome.success);
    assert!(outcome.profile.is_none());
    assert_eq!(
        outcome.recommended_settings,
        default_settings(system.device_specs())
    );
    assert!(matches!(
        outcome.error,
        Some(CalibrationError::MeasurementFailed { .. })
    ));
    assert_eq!(system.state().unwrap(), CalibrationState::Failed);
    assert_eq!(
        system.save_calibration(),
        Err(CalibrationError::NotCalibrated)
    );

    let mut detector = Detector::default();
    assert!(!system.apply_calibration(&mut detector));
    assert!(detector.sensitivity.is_none());

    drop(system);
    let events: Vec<CalibrationEvent> = events.collect().await;
    assert!(events.contains(&CalibrationEvent::PhaseStarted {
        phase: MeasurementPhase::FrequencyResponse
    }));
    assert!(matches!(events.last(), Some(CalibrationEvent::Failed { .. })));
}
