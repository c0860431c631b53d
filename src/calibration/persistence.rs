// Calibration profile persistence
//
// Profiles are stored as JSON strings in a get/set key-value store, one key
// per device type. The record wraps the profile with the device specs it was
// captured on and a capture timestamp used for expiry.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::calibration::device::DeviceSpecs;
use crate::calibration::settings::OptimalSettings;
use crate::error::CalibrationError;

/// Everything a calibration run produced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationProfile {
    pub device_type: String,
    pub volume_offset: f64,
    /// Ambient level per bin (Hz → dB)
    pub noise_profile: BTreeMap<u32, f64>,
    /// 80-1000 Hz level per bin (Hz → dB)
    pub frequency_response: BTreeMap<u32, f64>,
    pub optimal_settings: OptimalSettings,
    pub captured_at_ms: u64,
}

/// Stored form of a profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistedCalibration {
    pub device_specs: DeviceSpecs,
    pub calibration_data: CalibrationProfile,
    /// Save time in wall-clock milliseconds
    pub timestamp: u64,
}

impl PersistedCalibration {
    pub fn to_json(&self) -> Result<String, CalibrationError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, CalibrationError> {
        Ok(serde_json::from_str(json)?)
    }
}

/// String key-value store used for profile persistence
pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, CalibrationError>;
    fn set(&self, key: &str, value: &str) -> Result<(), CalibrationError>;
    fn remove(&self, key: &str) -> Result<(), CalibrationError>;
}

/// Process-local store
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, HashMap<String, String>>, CalibrationError> {
        self.entries
            .lock()
            .map_err(|_| CalibrationError::StatePoisoned)
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, CalibrationError> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), CalibrationError> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), CalibrationError> {
        self.lock()?.remove(key);
        Ok(())
    }
}

/// Directory-backed store writing one `<key>.json` file per key
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    /// Open a store rooted at `dir`, creating the directory if needed
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self, CalibrationError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir).map_err(|err| persistence_error(&dir, err))?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Keys are reduced to `[A-Za-z0-9_-]` so they cannot escape the directory
    fn path_for(&self, key: &str) -> PathBuf {
        let file_stem: String = key
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        self.dir.join(format!("{file_stem}.json"))
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<String>, CalibrationError> {
        let path = self.path_for(key);
        match fs::read_to_string(&path) {
            Ok(contents) => Ok(Some(contents)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(persistence_error(&path, err)),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), CalibrationError> {
        let path = self.path_for(key);
        fs::write(&path, value).map_err(|err| persistence_error(&path, err))
    }

    fn remove(&self, key: &str) -> Result<(), CalibrationError> {
        let path = self.path_for(key);
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(persistence_error(&path, err)),
        }
    }
}

fn persistence_error(path: &Path, err: io::Error) -> CalibrationError {
    CalibrationError::Persistence {
        reason: format!("{}: {err}", path.display()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::calibration::settings::default_settings;
    use tempfile::TempDir;

    fn sample_record() -> PersistedCalibration {
        let device = DeviceSpecs::iphone();
        PersistedCalibration {
            calibration_data: CalibrationProfile {
                device_type: device.device_type.clone(),
                volume_offset: 0.12,
                noise_profile: [(0, -95.5), (22, -88.25)].into_iter().collect(),
                frequency_response: [(86, -41.0), (97, -40.5)].into_iter().collect(),
                optimal_settings: default_settings(&device),
                captured_at_ms: 1_700_000_000_000,
            },
            device_specs: device,
            timestamp: 1_700_000_000_500,
        }
    }

    #[test]
    fn test_record_json_roundtrip() {
        let record = sample_record();
        let json = record.to_json().unwrap();
        assert!(json.contains("\"device_specs\""));
        assert!(json.contains("\"calibration_data\""));
        assert_eq!(PersistedCalibration::from_json(&json).unwrap(), record);
    }

    #[test]
    fn test_invalid_record_is_persistence_error() {
        let err = PersistedCalibration::from_json("{not json").unwrap_err();
        assert!(matches!(err, CalibrationError::Persistence { .. }));
    }

    #[test]
    fn test_memory_store() {
        let store = MemoryStore::new();
        assert_eq!(store.get("a").unwrap(), None);
        store.set("a", "1").unwrap();
        store.set("a", "2").unwrap();
        assert_eq!(store.get("a").unwrap(), Some("2".to_string()));
        store.remove("a").unwrap();
        assert_eq!(store.get("a").unwrap(), None);
    }

    #[test]
    fn test_json_file_store() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::open(dir.path().join("profiles")).unwrap();

        assert_eq!(store.get("voice_pitch_calibration_PC").unwrap(), None);
        store.set("voice_pitch_calibration_PC", "{}").unwrap();
        assert!(dir
            .path()
            .join("profiles/voice_pitch_calibration_PC.json")
            .exists());
        assert_eq!(
            store.get("voice_pitch_calibration_PC").unwrap(),
            Some("{}".to_string())
        );

        store.remove("voice_pitch_calibration_PC").unwrap();
        store.remove("voice_pitch_calibration_PC").unwrap();
        assert_eq!(store.get("voice_pitch_calibration_PC").unwrap(), None);
    }

    #[test]
    fn test_json_file_store_sanitizes_keys() {
        let dir = TempDir::new().unwrap();
        let store = JsonFileStore::open(dir.path()).unwrap();
        store.set("../escape/attempt", "x").unwrap();

        assert!(dir.path().join("___escape_attempt.json").exists());
        assert_eq!(store.get("../escape/attempt").unwrap(), Some("x".to_string()));
    }
}
