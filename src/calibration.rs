//! Calibration data lifecycle
//!
//! Hardware bias terms and the magnetometer rescale matrix, persisted as a
//! JSON record. A missing or corrupt record is not an error at the system
//! level; the driver substitutes defaults and keeps going.

use std::fmt;
use std::fs;
use std::path::Path;

use log::warn;
use serde::{Deserialize, Serialize};

/// Default location of the persisted calibration record
pub const CALIBRATION_PATH: &str = "/etc/icm20948cal.json";

/// Hardware calibration values applied to every published sample
///
/// Gyro and accelerometer biases are raw-LSB offsets subtracted before
/// scaling. The magnetometer bias is in microteslas, subtracted after unit
/// conversion; the rescale matrix is then applied. Only the diagonal is
/// populated by default, which gives independent per-axis scale correction
/// without full soft-iron calibration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    /// Gyro hardware bias (raw LSB)
    pub gyro_bias: [f64; 3],
    /// Accelerometer hardware bias (raw LSB)
    pub accel_bias: [f64; 3],
    /// Magnetometer hardware bias (µT)
    pub mag_bias: [f64; 3],
    /// Magnetometer rescale matrix, row-major
    pub mag_rescale: [[f64; 3]; 3],
}

impl Default for Calibration {
    fn default() -> Self {
        Self {
            gyro_bias: [0.0; 3],
            accel_bias: [0.0; 3],
            mag_bias: [0.0; 3],
            mag_rescale: [[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]],
        }
    }
}

impl Calibration {
    /// Load a persisted calibration record
    ///
    /// # Errors
    ///
    /// Returns [`CalibrationError::Io`] when the file cannot be read and
    /// [`CalibrationError::Parse`] when it does not deserialize.
    pub fn load(path: &Path) -> Result<Self, CalibrationError> {
        let raw = fs::read_to_string(path).map_err(CalibrationError::Io)?;
        serde_json::from_str(&raw).map_err(CalibrationError::Parse)
    }

    /// Load a persisted record, substituting defaults on any failure
    ///
    /// Failures are logged, not propagated; construction must not depend on
    /// the record existing.
    #[must_use]
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(cal) => cal,
            Err(e) => {
                warn!(
                    "could not read calibration from {}: {e}; using defaults",
                    path.display()
                );
                Self::default()
            }
        }
    }

    /// Serialize the current values and overwrite the persisted record
    ///
    /// # Errors
    ///
    /// Returns [`CalibrationError`] on serialization or write failure.
    pub fn save(&self, path: &Path) -> Result<(), CalibrationError> {
        let raw = serde_json::to_string(self).map_err(CalibrationError::Parse)?;
        fs::write(path, raw).map_err(CalibrationError::Io)
    }
}

/// Calibration persistence failures
#[derive(Debug)]
pub enum CalibrationError {
    /// Record could not be read or written
    Io(std::io::Error),
    /// Record contents did not deserialize
    Parse(serde_json::Error),
}

impl fmt::Display for CalibrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "calibration file I/O failed: {e}"),
            Self::Parse(e) => write!(f, "calibration record invalid: {e}"),
        }
    }
}

impl std::error::Error for CalibrationError {}
