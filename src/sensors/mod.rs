//! Sensor configuration types for the ICM-20948
//!
//! Full-scale ranges, low-pass filter tiers, and the AK09916 magnetometer's
//! operating modes, with the selection rules the bring-up sequencer applies.

pub mod accelerometer;
pub mod gyroscope;
pub mod magnetometer;

pub use accelerometer::{AccelDlpf, AccelRange};
pub use gyroscope::{GyroDlpf, GyroRange};
pub use magnetometer::MagMode;
