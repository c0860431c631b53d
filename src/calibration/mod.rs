// Calibration module - per-device detector tuning
//
// A calibration run measures three things through an AudioTap, in order:
// 1. Background noise: per-bin ambient level while the user stays quiet
// 2. Volume levels: time-domain RMS range while the user speaks or sings
// 3. Frequency response: per-bin level over the 80-1000 Hz voice band
//
// The results, starting from the device-type defaults, become an
// OptimalSettings profile that is applied to the external detector and
// persisted per device type.

pub mod device;
pub mod measurement;
pub mod persistence;
pub mod progress;
pub mod settings;
pub mod state;
pub mod system;

pub use device::{DeviceProfileTable, DeviceSpecs};
pub use measurement::{AudioTap, MeasurementPhase, PhaseTiming, SpectrumProfile, VolumeCalibration};
pub use persistence::{
    CalibrationProfile, JsonFileStore, KeyValueStore, MemoryStore, PersistedCalibration,
};
pub use progress::CalibrationEvent;
pub use settings::{
    calculate_optimal_settings, default_settings, DeviceAdjustments, FilterSettings,
    OptimalSettings,
};
pub use state::{CalibrationState, CalibrationStatus};
pub use system::{CalibrationOutcome, CalibrationSystem, DetectorHooks};
