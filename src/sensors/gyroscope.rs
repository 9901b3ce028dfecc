//! Gyroscope range and filter configuration
//!
//! Provides the full-scale range and low-pass filter tier enums for the
//! ICM-20948's 3-axis gyroscope, including the per-LSB scale factor used to
//! convert raw readings to deg/s.

use crate::ConfigError;

/// Gyroscope full-scale range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GyroRange {
    /// ±250 deg/s
    Dps250,
    /// ±500 deg/s
    Dps500,
    /// ±1000 deg/s
    Dps1000,
    /// ±2000 deg/s
    Dps2000,
}

impl GyroRange {
    /// Validate an integer range in deg/s
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::GyroRange`] for any value outside
    /// {250, 500, 1000, 2000}.
    pub const fn from_dps(dps: u16) -> Result<Self, ConfigError> {
        match dps {
            250 => Ok(Self::Dps250),
            500 => Ok(Self::Dps500),
            1000 => Ok(Self::Dps1000),
            2000 => Ok(Self::Dps2000),
            other => Err(ConfigError::GyroRange(other)),
        }
    }

    /// Full-scale range in deg/s
    #[must_use]
    pub const fn dps(self) -> u16 {
        match self {
            Self::Dps250 => 250,
            Self::Dps500 => 500,
            Self::Dps1000 => 1000,
            Self::Dps2000 => 2000,
        }
    }

    /// `GYRO_FS_SEL` field value, already shifted into register position
    #[must_use]
    pub const fn fs_bits(self) -> u8 {
        match self {
            Self::Dps250 => 0x00,
            Self::Dps500 => 0x02,
            Self::Dps1000 => 0x04,
            Self::Dps2000 => 0x06,
        }
    }

    /// Scale factor in deg/s per LSB (range divided by the maximum positive
    /// 16-bit value)
    #[must_use]
    pub fn scale(self) -> f64 {
        f64::from(self.dps()) / f64::from(i16::MAX)
    }
}

/// Gyroscope low-pass filter bandwidth tier
///
/// The discriminant is the chip's `GYRO_DLPFCFG` code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GyroDlpf {
    /// 197 Hz bandwidth
    Hz197 = 0,
    /// 152 Hz bandwidth
    Hz152 = 1,
    /// 120 Hz bandwidth
    Hz120 = 2,
    /// 51 Hz bandwidth
    Hz51 = 3,
    /// 24 Hz bandwidth
    Hz24 = 4,
    /// 12 Hz bandwidth
    Hz12 = 5,
    /// 6 Hz bandwidth
    Hz6 = 6,
}

impl GyroDlpf {
    /// `GYRO_DLPFCFG` field value, shifted into register position
    #[must_use]
    pub const fn bits(self) -> u8 {
        (self as u8) << 3
    }

    /// Select the highest-bandwidth tier whose threshold does not exceed the
    /// filter target
    ///
    /// Thresholds are inclusive: a target exactly at a tier's bandwidth
    /// selects that tier. Targets below every threshold fall through to the
    /// 6 Hz tier.
    #[must_use]
    pub const fn for_rate(target: u8) -> Self {
        match target {
            t if t >= 197 => Self::Hz197,
            t if t >= 152 => Self::Hz152,
            t if t >= 120 => Self::Hz120,
            t if t >= 51 => Self::Hz51,
            t if t >= 24 => Self::Hz24,
            t if t >= 12 => Self::Hz12,
            _ => Self::Hz6,
        }
    }
}
