// CalibrationSystem: per-device calibration lifecycle
//
// Runs the three measurement phases in sequence against one AudioTap,
// derives OptimalSettings, and owns the resulting profile. The profile can
// be pushed into a detector, saved to a key-value store and restored later.
//
// Only one run may be active at a time. A failed run never surfaces as an
// error: it resolves to device defaults, the same settings an uncalibrated
// system reports.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use futures::{Stream, StreamExt};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use crate::calibration::device::DeviceSpecs;
use crate::calibration::measurement::{
    calibrate_volume_levels, measure_background_noise, measure_frequency_response, AudioTap,
    MeasurementPhase, PhaseTiming,
};
use crate::calibration::persistence::{CalibrationProfile, KeyValueStore, PersistedCalibration};
use crate::calibration::progress::{CalibrationEvent, EVENT_CHANNEL_CAPACITY};
use crate::calibration::settings::{
    calculate_optimal_settings, default_settings, FilterSettings, OptimalSettings,
};
use crate::calibration::state::{CalibrationState, CalibrationStatus};
use crate::clock::{Clock, SystemClock};
use crate::config::CalibrationConfig;
use crate::error::{log_calibration_error, CalibrationError, ErrorCode};

/// Setter hooks on an external pitch detector
///
/// Every hook defaults to a no-op, so detectors implement only the ones they
/// support.
pub trait DetectorHooks {
    fn set_sensitivity(&mut self, _sensitivity: f64) -> anyhow::Result<()> {
        Ok(())
    }

    fn set_noise_gate(&mut self, _noise_gate: f64) -> anyhow::Result<()> {
        Ok(())
    }

    fn update_filter_settings(&mut self, _filters: &FilterSettings) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Result of a calibration run
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationOutcome {
    pub success: bool,
    /// Present on success
    pub profile: Option<CalibrationProfile>,
    /// Calibrated settings on success, device defaults on failure
    pub recommended_settings: OptimalSettings,
    /// Present on failure
    pub error: Option<CalibrationError>,
}

#[derive(Debug, Default)]
struct Inner {
    state: CalibrationState,
    profile: Option<CalibrationProfile>,
}

pub struct CalibrationSystem {
    device: DeviceSpecs,
    config: CalibrationConfig,
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    in_progress: AtomicBool,
    inner: RwLock<Inner>,
    events: broadcast::Sender<CalibrationEvent>,
}

/// Marks a run active; clears the flag when the run ends or its future is
/// dropped
struct ActiveRun<'a> {
    system: &'a CalibrationSystem,
}

impl Drop for ActiveRun<'_> {
    fn drop(&mut self) {
        if let Ok(mut inner) = self.system.inner.write() {
            if inner.state == CalibrationState::Calibrating {
                tracing::warn!("[CalibrationSystem] Calibration abandoned mid-run");
                inner.state = CalibrationState::Failed;
            }
        }
        self.system.in_progress.store(false, Ordering::SeqCst);
    }
}

impl CalibrationSystem {
    /// Create a system for one device using the system clock
    pub fn new(
        device: DeviceSpecs,
        config: CalibrationConfig,
        store: Arc<dyn KeyValueStore>,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            device,
            config,
            store,
            clock: Arc::new(SystemClock),
            in_progress: AtomicBool::new(false),
            inner: RwLock::new(Inner::default()),
            events,
        }
    }

    /// Replace the clock used for profile timestamps and expiry
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Run all measurement phases and derive a new profile
    ///
    /// Phases run strictly in order: background noise, volume levels,
    /// frequency response. The caller should pause live detection on the tap
    /// for the duration.
    ///
    /// # Returns
    /// * `Ok(outcome)` - Run finished; `outcome.success` tells whether it
    ///   produced a profile
    /// * `Err(CalibrationError::AlreadyInProgress)` - Another run is active
    /// * `Err(CalibrationError::StatePoisoned)` - State lock poisoned
    pub async fn calibrate(
        &self,
        tap: &dyn AudioTap,
    ) -> Result<CalibrationOutcome, CalibrationError> {
        if self
            .in_progress
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            let err = CalibrationError::AlreadyInProgress;
            log_calibration_error(&err, "calibrate");
            return Err(err);
        }
        let _run = ActiveRun { system: self };

        self.write_inner()?.state = CalibrationState::Calibrating;
        tracing::info!(
            "[CalibrationSystem] Starting calibration for {}",
            self.device.device_type
        );
        self.emit(CalibrationEvent::Started {
            device_type: self.device.device_type.clone(),
        });

        match self.run_phases(tap).await {
            Ok(profile) => {
                let settings = profile.optimal_settings;
                {
                    let mut inner = self.write_inner()?;
                    inner.state = CalibrationState::Calibrated;
                    inner.profile = Some(profile.clone());
                }
                tracing::info!(
                    "[CalibrationSystem] Calibration completed: sensitivity={}, noise_gate={}",
                    settings.sensitivity,
                    settings.noise_gate
                );
                self.emit(CalibrationEvent::Completed);

                Ok(CalibrationOutcome {
                    success: true,
                    profile: Some(profile),
                    recommended_settings: settings,
                    error: None,
                })
            }
            Err(err) => {
                log_calibration_error(&err, "calibrate");
                {
                    let mut inner = self.write_inner()?;
                    inner.state = CalibrationState::Failed;
                    inner.profile = None;
                }
                self.emit(CalibrationEvent::Failed {
                    reason: err.message(),
                });

                Ok(CalibrationOutcome {
                    success: false,
                    profile: None,
                    recommended_settings: default_settings(&self.device),
                    error: Some(err),
                })
            }
        }
    }

    async fn run_phases(&self, tap: &dyn AudioTap) -> Result<CalibrationProfile, CalibrationError> {
        let noise_timing = self.begin_phase(MeasurementPhase::BackgroundNoise);
        let noise = measure_background_noise(tap, noise_timing).await?;
        self.end_phase(MeasurementPhase::BackgroundNoise, noise.polls);

        let volume_timing = self.begin_phase(MeasurementPhase::VolumeLevels);
        let volume =
            calibrate_volume_levels(tap, volume_timing, self.config.target_loudness).await?;
        self.end_phase(MeasurementPhase::VolumeLevels, volume.polls);

        let response_timing = self.begin_phase(MeasurementPhase::FrequencyResponse);
        let response = measure_frequency_response(tap, response_timing).await?;
        self.end_phase(MeasurementPhase::FrequencyResponse, response.polls);

        let optimal_settings =
            calculate_optimal_settings(&self.device, &noise.data, &volume.data, &response.data);

        Ok(CalibrationProfile {
            device_type: self.device.device_type.clone(),
            volume_offset: volume.data.offset,
            noise_profile: noise.data,
            frequency_response: response.data,
            optimal_settings,
            captured_at_ms: self.clock.now_ms(),
        })
    }

    fn begin_phase(&self, phase: MeasurementPhase) -> PhaseTiming {
        tracing::info!("[CalibrationSystem] Measuring {}", phase);
        self.emit(CalibrationEvent::PhaseStarted { phase });
        PhaseTiming::for_phase(&self.config, phase)
    }

    fn end_phase(&self, phase: MeasurementPhase, polls: usize) {
        tracing::debug!("[CalibrationSystem] Finished {} ({} polls)", phase, polls);
        self.emit(CalibrationEvent::PhaseCompleted { phase, polls });
    }

    /// Push the calibrated settings into a detector
    ///
    /// Returns `false` when no profile is available or a hook fails.
    pub fn apply_calibration(&self, detector: &mut dyn DetectorHooks) -> bool {
        let settings = match self.read_inner() {
            Ok(inner) => match inner.profile.as_ref() {
                Some(profile) => profile.optimal_settings,
                None => {
                    tracing::warn!("[CalibrationSystem] No calibration data available");
                    return false;
                }
            },
            Err(err) => {
                log_calibration_error(&err, "apply_calibration");
                return false;
            }
        };

        match push_settings(detector, &settings) {
            Ok(()) => {
                tracing::info!("[CalibrationSystem] Calibration applied");
                true
            }
            Err(err) => {
                tracing::error!("[CalibrationSystem] Failed to apply calibration: {:#}", err);
                false
            }
        }
    }

    pub fn status(&self) -> Result<CalibrationStatus, CalibrationError> {
        let inner = self.read_inner()?;
        Ok(CalibrationStatus {
            state: inner.state,
            is_calibrated: inner.profile.is_some(),
            in_progress: self.in_progress.load(Ordering::SeqCst),
            device_specs: self.device.clone(),
            profile: inner.profile.clone(),
        })
    }

    pub fn state(&self) -> Result<CalibrationState, CalibrationError> {
        Ok(self.read_inner()?.state)
    }

    pub fn profile(&self) -> Result<Option<CalibrationProfile>, CalibrationError> {
        Ok(self.read_inner()?.profile.clone())
    }

    /// Calibrated settings, or device defaults when uncalibrated
    pub fn recommended_settings(&self) -> Result<OptimalSettings, CalibrationError> {
        Ok(self
            .read_inner()?
            .profile
            .as_ref()
            .map(|profile| profile.optimal_settings)
            .unwrap_or_else(|| default_settings(&self.device)))
    }

    /// Drop the in-memory profile
    ///
    /// A run still in flight keeps its `Calibrating` state and will store its
    /// own result when it finishes.
    pub fn reset(&self) -> Result<(), CalibrationError> {
        let mut inner = self.write_inner()?;
        inner.profile = None;
        if inner.state != CalibrationState::Calibrating {
            inner.state = CalibrationState::Idle;
        }
        tracing::info!("[CalibrationSystem] Calibration reset");
        Ok(())
    }

    /// Persist the current profile under this device's key
    pub fn save_calibration(&self) -> Result<(), CalibrationError> {
        let profile = self.read_inner()?.profile.clone().ok_or_else(|| {
            let err = CalibrationError::NotCalibrated;
            log_calibration_error(&err, "save_calibration");
            err
        })?;

        let record = PersistedCalibration {
            device_specs: self.device.clone(),
            calibration_data: profile,
            timestamp: self.clock.now_ms(),
        };
        let key = self.storage_key();
        record
            .to_json()
            .and_then(|json| self.store.set(&key, &json))
            .inspect_err(|err| log_calibration_error(err, "save_calibration"))?;

        tracing::info!("[CalibrationSystem] Calibration saved under {}", key);
        Ok(())
    }

    /// Restore a saved profile for this device
    ///
    /// Rejects records older than the configured maximum age and records
    /// captured on another device type. A rejected load leaves the current
    /// state untouched.
    pub fn load_calibration(&self) -> Result<(), CalibrationError> {
        let result = self.read_saved_profile();
        match &result {
            Ok(_) => tracing::info!("[CalibrationSystem] Calibration loaded"),
            Err(err @ (CalibrationError::Expired { .. } | CalibrationError::DeviceMismatch { .. })) => {
                tracing::info!(
                    "[CalibrationSystem] Ignoring saved calibration: {}",
                    err.message()
                )
            }
            Err(err) => log_calibration_error(err, "load_calibration"),
        }

        let profile = result?;
        let mut inner = self.write_inner()?;
        inner.profile = Some(profile);
        if inner.state != CalibrationState::Calibrating {
            inner.state = CalibrationState::Calibrated;
        }
        Ok(())
    }

    /// Delete this device's saved record; the in-memory profile is kept
    pub fn clear_saved_calibration(&self) -> Result<(), CalibrationError> {
        let key = self.storage_key();
        self.store
            .remove(&key)
            .inspect_err(|err| log_calibration_error(err, "clear_saved_calibration"))?;
        tracing::info!("[CalibrationSystem] Saved calibration cleared from {}", key);
        Ok(())
    }

    fn read_saved_profile(&self) -> Result<CalibrationProfile, CalibrationError> {
        let json = self
            .store
            .get(&self.storage_key())?
            .ok_or(CalibrationError::NotCalibrated)?;
        let record = PersistedCalibration::from_json(&json)?;

        let age_ms = self.clock.now_ms().saturating_sub(record.timestamp);
        if age_ms > self.config.max_profile_age_ms {
            return Err(CalibrationError::Expired { age_ms });
        }

        if record.device_specs.device_type != self.device.device_type {
            return Err(CalibrationError::DeviceMismatch {
                expected: self.device.device_type.clone(),
                found: record.device_specs.device_type,
            });
        }

        Ok(record.calibration_data)
    }

    /// Receive progress events for subsequent runs
    pub fn subscribe(&self) -> broadcast::Receiver<CalibrationEvent> {
        self.events.subscribe()
    }

    /// Progress events as a stream; events a lagging consumer missed are skipped
    pub fn progress_stream(&self) -> impl Stream<Item = CalibrationEvent> + Send + 'static {
        BroadcastStream::new(self.events.subscribe())
            .filter_map(|result| async move { result.ok() })
    }

    pub fn device_specs(&self) -> &DeviceSpecs {
        &self.device
    }

    pub fn config(&self) -> &CalibrationConfig {
        &self.config
    }

    pub fn is_in_progress(&self) -> bool {
        self.in_progress.load(Ordering::SeqCst)
    }

    fn storage_key(&self) -> String {
        format!("{}{}", self.config.storage_key_prefix, self.device.device_type)
    }

    fn emit(&self, event: CalibrationEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn read_inner(&self) -> Result<RwLockReadGuard<'_, Inner>, CalibrationError> {
        self.inner.read().map_err(|_| CalibrationError::StatePoisoned)
    }

    fn write_inner(&self) -> Result<RwLockWriteGuard<'_, Inner>, CalibrationError> {
        self.inner.write().map_err(|_| CalibrationError::StatePoisoned)
    }
}

fn push_settings(detector: &mut dyn DetectorHooks, settings: &OptimalSettings) -> anyhow::Result<()> {
    detector.set_sensitivity(settings.sensitivity)?;
    detector.set_noise_gate(settings.noise_gate)?;
    detector.update_filter_settings(&settings.filter_settings)?;
    Ok(())
}

#[cfg(test)]
#[path = "system_tests.rs"]
mod tests;
