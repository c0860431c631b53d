//! Deterministic audio sources for tests and hardware-free calibration runs.
//!
//! [`SignalTap`] implements [`crate::calibration::AudioTap`] over silence,
//! tones, seeded noise or WAV recordings, so calibration can be exercised
//! without a live input stream.

pub mod signal_tap;

pub use signal_tap::{SignalSource, SignalTap, DB_FLOOR};
