#![doc = include_str!("../README.md")]
#![warn(missing_docs)]

use core::fmt;

pub mod calibration;
pub mod device;
pub mod driver;
pub mod interface;
pub mod registers;
pub mod sampler;
pub mod sensors;

// Re-export main types
pub use calibration::{Calibration, CalibrationError, CALIBRATION_PATH};
pub use device::Icm20948;
pub use driver::{Config, Icm20948Driver};
pub use interface::{I2cInterface, RegisterBus};
pub use sampler::{CommandError, Sample, SampleError};
pub use sensors::{AccelDlpf, AccelRange, GyroDlpf, GyroRange, MagMode};

/// Re-export of the Linux transport crate (I2C device + delay provider)
#[cfg(feature = "linux")]
pub use linux_embedded_hal;

/// ICM-20948 I2C address when the AD0 pin is low (default: 0x68)
///
/// This is the most common configuration. The AD0 pin is typically pulled low
/// or left floating (has internal pull-down). Use [`I2cInterface::default()`]
/// for this configuration.
pub const I2C_ADDRESS_AD0_LOW: u8 = 0x68;

/// ICM-20948 I2C address when the AD0 pin is high (alternative: 0x69)
///
/// Use this address when the AD0 pin is explicitly pulled high to VDD.
/// Use [`I2cInterface::alternative()`] for this configuration.
pub const I2C_ADDRESS_AD0_HIGH: u8 = 0x69;

/// Expected value of the `WHO_AM_I` register
pub const WHO_AM_I_VALUE: u8 = 0xEA;

/// Register bank identifiers
///
/// The ICM-20948 exposes more registers than fit in one address byte. The
/// register space is paged into four banks selected through `REG_BANK_SEL`;
/// the bank number occupies the high nibble of the written byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bank {
    /// Bank 0 - Power management, sub-bus routing, and sensor data registers
    Bank0 = 0,
    /// Bank 1 - Self-test and factory accelerometer offsets
    Bank1 = 1,
    /// Bank 2 - Gyro and accelerometer configuration
    Bank2 = 2,
    /// Bank 3 - I2C master (sub-bus) configuration
    Bank3 = 3,
}

/// Bring-up stages, used to identify where construction failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BringUpStep {
    /// Chip reset
    Reset,
    /// Clock selection / wake from sleep
    Wake,
    /// Enabling the gyro and accelerometer
    PowerOn,
    /// Full-scale range configuration
    Ranges,
    /// Low-pass filter and sample-rate divider configuration
    Filtering,
    /// Internal I2C master (sub-bus) configuration and enable
    SubBus,
    /// Factory bias register read
    BiasRead,
}

impl fmt::Display for BringUpStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Reset => "reset",
            Self::Wake => "wake",
            Self::PowerOn => "sensor power-on",
            Self::Ranges => "range configuration",
            Self::Filtering => "filter/rate configuration",
            Self::SubBus => "sub-bus configuration",
            Self::BiasRead => "factory bias read",
        };
        f.write_str(name)
    }
}

/// Invalid construction parameters, reported before any device state changes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// Gyro full-scale range is not one of 250/500/1000/2000 deg/s
    GyroRange(u16),
    /// Accelerometer full-scale range is not one of 2/4/8/16 g
    AccelRange(u16),
    /// Sample rate outside the 5..=1125 Hz range the divider byte can express
    SampleRate(u16),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::GyroRange(v) => write!(f, "{v} is not a valid gyro range (deg/s)"),
            Self::AccelRange(v) => write!(f, "{v} is not a valid accel range (g)"),
            Self::SampleRate(v) => write!(f, "{v} Hz is not a valid sample rate"),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Driver errors
#[derive(Debug)]
pub enum Error<E> {
    /// Bus transport failure, tagged with the register that was being accessed
    Bus {
        /// Register address the failing transaction targeted
        reg: u8,
        /// Underlying transport error
        source: E,
    },
    /// Invalid `WHO_AM_I` register value (contains the actual value read)
    InvalidDevice(u8),
    /// Invalid configuration parameter
    Config(ConfigError),
    /// Fatal failure during bring-up, identifying the failing stage
    BringUp {
        /// The stage that failed
        step: BringUpStep,
        /// The underlying failure
        source: Box<Error<E>>,
    },
    /// Sub-bus one-shot transaction did not complete
    SubBus,
    /// Memory-region write would cross the 256-byte bank boundary
    MemoryBankOverflow {
        /// Requested start address
        addr: u16,
        /// Requested write length
        len: usize,
    },
}

impl<E> Error<E> {
    /// Tag this error with the bring-up stage it occurred in
    #[must_use]
    pub fn during(self, step: BringUpStep) -> Self {
        Self::BringUp {
            step,
            source: Box::new(self),
        }
    }
}

impl<E: fmt::Display> fmt::Display for Error<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bus { reg, source } => {
                write!(f, "bus error accessing register {reg:#04x}: {source}")
            }
            Self::InvalidDevice(v) => write!(f, "unexpected WHO_AM_I value {v:#04x}"),
            Self::Config(e) => write!(f, "invalid configuration: {e}"),
            Self::BringUp { step, source } => write!(f, "bring-up failed at {step}: {source}"),
            Self::SubBus => f.write_str("sub-bus transaction did not complete"),
            Self::MemoryBankOverflow { addr, len } => write!(
                f,
                "memory write of {len} bytes at {addr:#06x} crosses the bank boundary"
            ),
        }
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for Error<E> {}
