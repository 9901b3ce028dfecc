//! Accelerometer range and filter configuration

use crate::ConfigError;

/// Accelerometer full-scale range
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccelRange {
    /// ±2 g
    G2,
    /// ±4 g
    G4,
    /// ±8 g
    G8,
    /// ±16 g
    G16,
}

impl AccelRange {
    /// Validate an integer range in g
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::AccelRange`] for any value outside {2, 4, 8, 16}.
    pub const fn from_g(g: u16) -> Result<Self, ConfigError> {
        match g {
            2 => Ok(Self::G2),
            4 => Ok(Self::G4),
            8 => Ok(Self::G8),
            16 => Ok(Self::G16),
            other => Err(ConfigError::AccelRange(other)),
        }
    }

    /// Full-scale range in g
    #[must_use]
    pub const fn g(self) -> u16 {
        match self {
            Self::G2 => 2,
            Self::G4 => 4,
            Self::G8 => 8,
            Self::G16 => 16,
        }
    }

    /// `ACCEL_FS_SEL` field value, already shifted into register position
    #[must_use]
    pub const fn fs_bits(self) -> u8 {
        match self {
            Self::G2 => 0x00,
            Self::G4 => 0x02,
            Self::G8 => 0x04,
            Self::G16 => 0x06,
        }
    }

    /// Scale factor in g per LSB (range divided by the maximum positive
    /// 16-bit value)
    #[must_use]
    pub fn scale(self) -> f64 {
        f64::from(self.g()) / f64::from(i16::MAX)
    }
}

/// Accelerometer low-pass filter bandwidth tier
///
/// The discriminant is the chip's `ACCEL_DLPFCFG` code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccelDlpf {
    /// 246 Hz bandwidth
    Hz246 = 1,
    /// 111 Hz bandwidth
    Hz111 = 2,
    /// 50 Hz bandwidth
    Hz50 = 3,
    /// 24 Hz bandwidth
    Hz24 = 4,
    /// 12 Hz bandwidth
    Hz12 = 5,
    /// 6 Hz bandwidth
    Hz6 = 6,
}

impl AccelDlpf {
    /// `ACCEL_DLPFCFG` field value, shifted into register position
    #[must_use]
    pub const fn bits(self) -> u8 {
        (self as u8) << 3
    }

    /// Select the highest-bandwidth tier whose threshold does not exceed the
    /// filter target (inclusive at tier edges; floor is the 6 Hz tier)
    #[must_use]
    pub const fn for_rate(target: u8) -> Self {
        match target {
            t if t >= 246 => Self::Hz246,
            t if t >= 111 => Self::Hz111,
            t if t >= 50 => Self::Hz50,
            t if t >= 24 => Self::Hz24,
            t if t >= 12 => Self::Hz12,
            _ => Self::Hz6,
        }
    }
}
