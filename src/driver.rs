//! Public driver handle
//!
//! Construction validates the configuration, loads calibration, runs the
//! bring-up sequence (with a bounded retry, since the bus may be transiently
//! busy), and hands the device to the acquisition engine thread. From then on
//! the handle communicates with the engine only through channels; it never
//! touches the bus itself.

use core::fmt;
use std::path::PathBuf;
use std::sync::mpsc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use embedded_hal::delay::DelayNs;
use embedded_hal::i2c::I2c;
use log::{info, warn};

use crate::calibration::{Calibration, CALIBRATION_PATH};
use crate::device::{Icm20948, BASE_RATE_HZ};
use crate::interface::{I2cInterface, RegisterBus};
use crate::sampler::{CommandError, History, Request, Sample, Sampler, HISTORY_CAPACITY};
use crate::sensors::{AccelRange, GyroRange};
use crate::{ConfigError, Error};

/// Pause between bring-up attempts
const RETRY_DELAY: Duration = Duration::from_millis(100);

/// Driver construction parameters
#[derive(Debug, Clone)]
pub struct Config {
    /// Gyro full-scale range
    pub gyro_range: GyroRange,
    /// Accelerometer full-scale range
    pub accel_range: AccelRange,
    /// Sample rate in Hz; drives the inertial timer and (capped at 100 Hz)
    /// the magnetometer timer
    pub sample_rate: u16,
    /// Bring the AK09916 magnetometer up through the sub-bus master
    pub enable_mag: bool,
    /// Load the factory-programmed bias registers into the calibration
    pub apply_hw_offsets: bool,
    /// Location of the persisted calibration record
    pub calibration_path: PathBuf,
    /// Bring-up attempts before construction fails (minimum 1)
    pub bringup_attempts: u8,
    /// Wall-clock wait before the startup-transient averaged sample is
    /// discarded
    pub startup_settle: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            gyro_range: GyroRange::Dps250,
            accel_range: AccelRange::G4,
            sample_rate: 50,
            enable_mag: true,
            apply_hw_offsets: false,
            calibration_path: PathBuf::from(CALIBRATION_PATH),
            bringup_attempts: 3,
            startup_settle: Duration::from_millis(500),
        }
    }
}

impl Config {
    /// Check parameters that the type system cannot
    ///
    /// # Errors
    ///
    /// [`ConfigError::SampleRate`] unless the rate lies in 5..=1125 Hz, the
    /// span the chip's divider byte can express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_rate < 5 || self.sample_rate > BASE_RATE_HZ {
            return Err(ConfigError::SampleRate(self.sample_rate));
        }
        Ok(())
    }
}

/// Handle to a running ICM-20948 acquisition engine
///
/// Dropping the handle stops the engine. There is no restart path; construct
/// a fresh driver to resume acquisition.
pub struct Icm20948Driver {
    tx: mpsc::Sender<Request>,
    history: History,
    sample_rate: u16,
    mag_enabled: bool,
    calibration: Calibration,
    engine: Option<JoinHandle<()>>,
}

impl Icm20948Driver {
    /// Construct a driver over an I2C peripheral at the default address
    ///
    /// # Errors
    ///
    /// Configuration errors, a failed `WHO_AM_I` check, or a fatal bring-up
    /// failure after the configured number of attempts.
    pub fn new<I, E, D>(i2c: I, delay: D, config: &Config) -> Result<Self, Error<E>>
    where
        I: I2c<Error = E> + Send + 'static,
        E: fmt::Debug + Send + 'static,
        D: DelayNs + Send + 'static,
    {
        Self::with_bus(I2cInterface::default(i2c), delay, config)
    }

    /// Construct a driver over any [`RegisterBus`] transport
    ///
    /// # Errors
    ///
    /// See [`new`](Self::new).
    pub fn with_bus<B, D>(bus: B, delay: D, config: &Config) -> Result<Self, Error<B::Error>>
    where
        B: RegisterBus + Send + 'static,
        B::Error: fmt::Debug + Send + 'static,
        D: DelayNs + Send + 'static,
    {
        config.validate().map_err(Error::Config)?;

        let mut cal = Calibration::load_or_default(&config.calibration_path);
        let mut dev = Icm20948::new(bus, delay);

        let attempts = config.bringup_attempts.max(1);
        let mut attempt = 1;
        loop {
            match dev.bring_up(config, &mut cal) {
                Ok(()) => break,
                Err(e) if attempt < attempts => {
                    warn!("bring-up attempt {attempt}/{attempts} failed: {e:?}; retrying");
                    attempt += 1;
                    thread::sleep(RETRY_DELAY);
                }
                Err(e) => return Err(e),
            }
        }

        let (tx, rx) = mpsc::channel();
        let history = History::new(HISTORY_CAPACITY);
        let sample_rate = dev.sample_rate();
        let mag_enabled = dev.mag_enabled();

        let sampler = Sampler::new(
            dev,
            cal.clone(),
            config.calibration_path.clone(),
            rx,
            history.clone(),
        );
        let engine = thread::Builder::new()
            .name("icm20948-sampler".into())
            .spawn(move || sampler.run())
            .expect("spawn acquisition thread");

        let driver = Self {
            tx,
            history,
            sample_rate,
            mag_enabled,
            calibration: cal,
            engine: Some(engine),
        };

        // Let the chip settle, then read and discard one averaged sample so
        // startup transients never reach a consumer.
        thread::sleep(config.startup_settle);
        let _ = driver.average();

        info!(
            "ICM-20948 ready at {sample_rate} Hz (magnetometer {})",
            if mag_enabled { "enabled" } else { "disabled" }
        );
        Ok(driver)
    }

    /// The most recent instantaneous sample, scaled and bias-corrected
    ///
    /// # Errors
    ///
    /// [`CommandError::Stopped`] once the engine has exited.
    pub fn current(&self) -> Result<Sample, CommandError> {
        self.request(Request::Current)
    }

    /// The running average since the last call, resetting the accumulators
    ///
    /// The inertial and magnetometer averages are computed independently. A
    /// category with no readings in the window carries an error flag instead
    /// of data.
    ///
    /// # Errors
    ///
    /// [`CommandError::Stopped`] once the engine has exited.
    pub fn average(&self) -> Result<Sample, CommandError> {
        self.request(Request::Average)
    }

    /// Drain the bounded history of instantaneous samples, oldest first
    #[must_use]
    pub fn drain_history(&self) -> Vec<Sample> {
        self.history.drain()
    }

    /// Configured sample rate in Hz
    #[must_use]
    pub fn sample_rate(&self) -> u16 {
        self.sample_rate
    }

    /// Whether the magnetometer is being read
    #[must_use]
    pub fn mag_enabled(&self) -> bool {
        self.mag_enabled
    }

    /// Calibration values the engine applies to every sample, including any
    /// factory biases loaded at bring-up
    #[must_use]
    pub fn calibration(&self) -> &Calibration {
        &self.calibration
    }

    /// Enable or disable gyro motion-bias auto-compensation
    ///
    /// Routed through the engine thread, which is the sole bus owner.
    ///
    /// # Errors
    ///
    /// [`CommandError::Bus`] if the memory write fails,
    /// [`CommandError::Stopped`] once the engine has exited.
    pub fn set_gyro_bias_compensation(&self, enable: bool) -> Result<(), CommandError> {
        self.request(|reply| Request::SetBiasComp { enable, reply })?
    }

    /// Persist the engine-owned calibration record
    ///
    /// # Errors
    ///
    /// [`CommandError::Storage`] on serialization or write failure (details
    /// are logged), [`CommandError::Stopped`] once the engine has exited.
    pub fn save_calibration(&self) -> Result<(), CommandError> {
        self.request(|reply| Request::SaveCalibration { reply })?
    }

    /// Stop the acquisition engine
    ///
    /// One-shot: the chip is left powered, and further requests fail with
    /// [`CommandError::Stopped`].
    pub fn stop(&mut self) {
        let _ = self.tx.send(Request::Stop);
        if let Some(engine) = self.engine.take() {
            let _ = engine.join();
        }
    }

    fn request<T>(
        &self,
        build: impl FnOnce(mpsc::Sender<T>) -> Request,
    ) -> Result<T, CommandError> {
        let (reply_tx, reply_rx) = mpsc::channel();
        self.tx
            .send(build(reply_tx))
            .map_err(|_| CommandError::Stopped)?;
        reply_rx.recv().map_err(|_| CommandError::Stopped)
    }
}

impl Drop for Icm20948Driver {
    fn drop(&mut self) {
        self.stop();
    }
}
