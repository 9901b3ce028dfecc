//! Acquisition engine
//!
//! A single spawned thread owns the bus exclusively for the lifetime of the
//! driver. It polls the inertial registers at the configured rate and the
//! magnetometer mirror registers at a capped rate, maintains running sums for
//! averaging, and services consumer requests between ticks. Consumers never
//! touch the bus; they rendezvous with the loop through a request channel,
//! or drain the bounded history ring asynchronously.

use std::collections::VecDeque;
use std::fmt;
use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant, SystemTime};

use embedded_hal::delay::DelayNs;
use log::{debug, warn};

use crate::calibration::Calibration;
use crate::device::Icm20948;
use crate::interface::RegisterBus;
use crate::registers::ak09916;
use crate::sensors::magnetometer::UT_PER_LSB;

/// Capacity of the history ring of instantaneous samples
pub const HISTORY_CAPACITY: usize = 250;

/// The sub-bus cannot sustain continuous reads much above this rate
const MAG_RATE_CAP_HZ: u16 = 100;

/// Die temperature conversion: degrees C = raw / sensitivity + offset
const TEMP_SENSITIVITY: f64 = 333.87;
const TEMP_OFFSET_C: f64 = 21.0;

/// Why a sample category carries no usable data
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleError {
    /// A bus transport failure occurred during the last read cycle
    Bus,
    /// No valid readings were available
    NoData,
}

impl fmt::Display for SampleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bus => f.write_str("bus transport failure"),
            Self::NoData => f.write_str("no new readings"),
        }
    }
}

/// Failure of a driver-handle request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandError {
    /// The acquisition engine has stopped; construct a fresh driver to resume
    Stopped,
    /// The engine could not complete the bus transaction
    Bus,
    /// Calibration persistence failed (details are logged)
    Storage,
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stopped => f.write_str("acquisition engine has stopped"),
            Self::Bus => f.write_str("bus transaction failed"),
            Self::Storage => f.write_str("calibration persistence failed"),
        }
    }
}

impl std::error::Error for CommandError {}

/// One scaled, bias-corrected reading
///
/// The inertial group (gyro, accel, temperature) and the magnetometer group
/// are sampled at different rates and carry independent capture timestamps,
/// counts, and error indicators. For an instantaneous sample the counts are
/// 1, or 0 when that category's error indicator is set; for an averaged
/// sample they are the number of readings accumulated in the window.
#[derive(Debug, Clone)]
pub struct Sample {
    /// Angular rate in deg/s
    pub gyro: [f64; 3],
    /// Acceleration in g
    pub accel: [f64; 3],
    /// Magnetic field in µT
    pub mag: [f64; 3],
    /// Die temperature in degrees C
    pub temp_c: f64,
    /// Inertial-group error indicator
    pub imu_error: Option<SampleError>,
    /// Magnetometer-group error indicator
    pub mag_error: Option<SampleError>,
    /// Valid inertial readings represented by this sample
    pub imu_count: u32,
    /// Valid magnetometer readings represented by this sample
    pub mag_count: u32,
    /// Capture time of the inertial group
    pub captured_at: SystemTime,
    /// Capture time of the magnetometer group
    pub mag_captured_at: SystemTime,
    /// Averaging-window length for the inertial group (zero for instantaneous)
    pub window: Duration,
    /// Averaging-window length for the magnetometer group
    pub mag_window: Duration,
    /// The magnetometer identity check never succeeded; treat heading data
    /// with suspicion
    pub mag_degraded: bool,
}

impl Sample {
    /// A sample carrying no data in either category
    pub(crate) fn unavailable(mag_degraded: bool) -> Self {
        let now = SystemTime::now();
        Self {
            gyro: [0.0; 3],
            accel: [0.0; 3],
            mag: [0.0; 3],
            temp_c: 0.0,
            imu_error: Some(SampleError::NoData),
            mag_error: Some(SampleError::NoData),
            imu_count: 0,
            mag_count: 0,
            captured_at: now,
            mag_captured_at: now,
            window: Duration::ZERO,
            mag_window: Duration::ZERO,
            mag_degraded,
        }
    }
}

/// Requests the engine services between ticks
pub(crate) enum Request {
    /// Reply with the most recent instantaneous sample
    Current(mpsc::Sender<Sample>),
    /// Reply with the running average and reset the accumulators
    Average(mpsc::Sender<Sample>),
    /// Write the motion-bias compensation blob from the engine thread
    SetBiasComp {
        enable: bool,
        reply: mpsc::Sender<Result<(), CommandError>>,
    },
    /// Persist the engine-owned calibration
    SaveCalibration {
        reply: mpsc::Sender<Result<(), CommandError>>,
    },
    /// Exit the loop; the chip is left powered
    Stop,
}

/// Bounded FIFO of recent instantaneous samples
///
/// Populated only by the inertial tick; consumers drain it asynchronously
/// without ever blocking the producer. Pushing past capacity evicts the
/// oldest entry.
#[derive(Clone)]
pub(crate) struct History {
    inner: Arc<Mutex<VecDeque<Sample>>>,
    capacity: usize,
}

impl History {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    pub(crate) fn push(&self, sample: Sample) {
        let mut buf = self.inner.lock().unwrap();
        if buf.len() == self.capacity {
            buf.pop_front();
        }
        buf.push_back(sample);
    }

    pub(crate) fn drain(&self) -> Vec<Sample> {
        self.inner.lock().unwrap().drain(..).collect()
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }
}

/// Apply the row-major rescale matrix to a magnetometer vector
fn apply_rescale(m: &[[f64; 3]; 3], v: [f64; 3]) -> [f64; 3] {
    [
        m[0][0] * v[0] + m[0][1] * v[1] + m[0][2] * v[2],
        m[1][0] * v[0] + m[1][1] * v[1] + m[1][2] * v[2],
        m[2][0] * v[0] + m[2][1] * v[1] + m[2][2] * v[2],
    ]
}

/// The acquisition loop state: exclusive bus owner after bring-up
pub(crate) struct Sampler<B, D> {
    dev: Icm20948<B, D>,
    cal: Calibration,
    cal_path: PathBuf,
    rx: mpsc::Receiver<Request>,
    history: History,

    raw_gyro: [i16; 3],
    raw_accel: [i16; 3],
    raw_temp: i16,
    raw_mag: [i16; 3],

    sum_gyro: [f64; 3],
    sum_accel: [f64; 3],
    sum_temp: f64,
    inertial_count: u32,
    sum_mag: [f64; 3],
    mag_count: u32,

    imu_fault: Option<SampleError>,
    mag_fault: Option<SampleError>,
    not_ready_count: u32,

    last: Sample,
    captured_at: SystemTime,
    mag_captured_at: SystemTime,
    window_start: Instant,
    mag_window_start: Instant,
}

impl<B, D> Sampler<B, D>
where
    B: RegisterBus,
    B::Error: fmt::Debug,
    D: DelayNs,
{
    pub(crate) fn new(
        dev: Icm20948<B, D>,
        cal: Calibration,
        cal_path: PathBuf,
        rx: mpsc::Receiver<Request>,
        history: History,
    ) -> Self {
        let now = SystemTime::now();
        let mag_degraded = dev.mag_degraded();
        let mag_fault = Some(SampleError::NoData);
        Self {
            dev,
            cal,
            cal_path,
            rx,
            history,
            raw_gyro: [0; 3],
            raw_accel: [0; 3],
            raw_temp: 0,
            raw_mag: [0; 3],
            sum_gyro: [0.0; 3],
            sum_accel: [0.0; 3],
            sum_temp: 0.0,
            inertial_count: 0,
            sum_mag: [0.0; 3],
            mag_count: 0,
            imu_fault: Some(SampleError::NoData),
            mag_fault,
            not_ready_count: 0,
            last: Sample::unavailable(mag_degraded),
            captured_at: now,
            mag_captured_at: now,
            window_start: Instant::now(),
            mag_window_start: Instant::now(),
        }
    }

    /// Run the event loop until a stop request or channel disconnect
    pub(crate) fn run(mut self) {
        let inertial_period = Duration::from_secs_f64(1.0 / f64::from(self.dev.sample_rate()));
        let mag_rate = self.dev.sample_rate().min(MAG_RATE_CAP_HZ);
        let mag_period = Duration::from_secs_f64(1.0 / f64::from(mag_rate));

        let mut next_inertial = Instant::now() + inertial_period;
        let mut next_mag = Instant::now() + mag_period;

        loop {
            let now = Instant::now();

            if now >= next_inertial {
                self.inertial_tick();
                next_inertial += inertial_period;
                if next_inertial <= Instant::now() {
                    // Fell behind; skip missed ticks rather than bursting.
                    next_inertial = Instant::now() + inertial_period;
                }
                continue;
            }

            if now >= next_mag {
                self.mag_tick();
                next_mag += mag_period;
                if next_mag <= Instant::now() {
                    next_mag = Instant::now() + mag_period;
                }
                continue;
            }

            let wait = next_inertial.min(next_mag).duration_since(now);
            match self.rx.recv_timeout(wait) {
                Ok(Request::Stop) => break,
                Ok(req) => self.serve(req),
                Err(mpsc::RecvTimeoutError::Timeout) => {}
                Err(mpsc::RecvTimeoutError::Disconnected) => break,
            }
        }
        debug!("acquisition loop stopped");
    }

    /// Read the inertial registers, update the accumulators, and push the
    /// fresh instantaneous sample into the history ring
    fn inertial_tick(&mut self) {
        self.captured_at = SystemTime::now();
        self.imu_fault = None;

        // Fixed read order: gyro X/Y/Z, accel X/Y/Z, temperature.
        match self.dev.read_gyro_raw() {
            Ok(v) => self.raw_gyro = v,
            Err(e) => {
                warn!("gyro read failed: {e:?}");
                self.imu_fault = Some(SampleError::Bus);
            }
        }
        match self.dev.read_accel_raw() {
            Ok(v) => self.raw_accel = v,
            Err(e) => {
                warn!("accel read failed: {e:?}");
                self.imu_fault = Some(SampleError::Bus);
            }
        }
        match self.dev.read_temp_raw() {
            Ok(v) => self.raw_temp = v,
            Err(e) => {
                warn!("temperature read failed: {e:?}");
                self.imu_fault = Some(SampleError::Bus);
            }
        }

        if self.imu_fault.is_none() {
            for i in 0..3 {
                self.sum_gyro[i] += f64::from(self.raw_gyro[i]);
                self.sum_accel[i] += f64::from(self.raw_accel[i]);
            }
            self.sum_temp += f64::from(self.raw_temp);
            self.inertial_count += 1;
        }

        self.last = self.make_sample();
        self.history.push(self.last.clone());
    }

    /// Poll the magnetometer mirror registers; accumulate only when the
    /// data-ready bit is set and the overflow bit is clear
    fn mag_tick(&mut self) {
        if !self.dev.mag_enabled() {
            return;
        }

        let st1 = match self.dev.read_mag_status() {
            Ok(v) => v,
            Err(e) => {
                warn!("magnetometer status read failed: {e:?}");
                self.mag_fault = Some(SampleError::Bus);
                return;
            }
        };

        if st1 & ak09916::ST1_DRDY == 0 {
            self.not_ready_count += 1;
            if self.not_ready_count <= 5 || self.not_ready_count % 100 == 0 {
                warn!(
                    "magnetometer data not ready (count={}, ST1={st1:#04x})",
                    self.not_ready_count
                );
            }
            return;
        }

        let payload = match self.dev.read_mag_payload() {
            Ok(p) => p,
            Err(e) => {
                warn!("magnetometer data read failed: {e:?}");
                self.mag_fault = Some(SampleError::Bus);
                return;
            }
        };

        let st2 = payload[7];
        if st2 & ak09916::ST2_HOFL != 0 {
            warn!("magnetometer overflow, sample discarded");
            return;
        }

        self.raw_mag = [
            i16::from_le_bytes([payload[0], payload[1]]),
            i16::from_le_bytes([payload[2], payload[3]]),
            i16::from_le_bytes([payload[4], payload[5]]),
        ];
        self.mag_fault = None;
        self.mag_captured_at = SystemTime::now();

        for i in 0..3 {
            self.sum_mag[i] += f64::from(self.raw_mag[i]);
        }
        self.mag_count += 1;

        if self.mag_count == 1 || self.mag_count % 100 == 0 {
            debug!(
                "magnetometer read #{}: raw {:?} (ST1={st1:#04x}, ST2={st2:#04x})",
                self.mag_count, self.raw_mag
            );
        }
    }

    fn serve(&mut self, req: Request) {
        match req {
            Request::Current(reply) => {
                let _ = reply.send(self.last.clone());
            }
            Request::Average(reply) => {
                let avg = self.make_average();
                self.reset_accumulators();
                let _ = reply.send(avg);
            }
            Request::SetBiasComp { enable, reply } => {
                let result = self.dev.set_gyro_bias_compensation(enable).map_err(|e| {
                    warn!("motion-bias compensation write failed: {e:?}");
                    CommandError::Bus
                });
                let _ = reply.send(result);
            }
            Request::SaveCalibration { reply } => {
                let result = self.cal.save(&self.cal_path).map_err(|e| {
                    warn!(
                        "could not save calibration to {}: {e}",
                        self.cal_path.display()
                    );
                    CommandError::Storage
                });
                let _ = reply.send(result);
            }
            Request::Stop => {}
        }
    }

    /// Assemble an instantaneous sample from the latest raw values
    fn make_sample(&self) -> Sample {
        Sample {
            gyro: self.scale_gyro(self.raw_gyro.map(f64::from)),
            accel: self.scale_accel(self.raw_accel.map(f64::from)),
            mag: self.scale_mag(self.raw_mag.map(f64::from)),
            temp_c: f64::from(self.raw_temp) / TEMP_SENSITIVITY + TEMP_OFFSET_C,
            imu_error: self.imu_fault,
            mag_error: self.mag_fault,
            imu_count: u32::from(self.imu_fault.is_none()),
            mag_count: u32::from(self.mag_fault.is_none()),
            captured_at: self.captured_at,
            mag_captured_at: self.mag_captured_at,
            window: Duration::ZERO,
            mag_window: Duration::ZERO,
            mag_degraded: self.dev.mag_degraded(),
        }
    }

    /// Assemble the averaged view; the two categories are computed
    /// independently since their counts differ
    fn make_average(&self) -> Sample {
        let mut sample = Sample::unavailable(self.dev.mag_degraded());

        if self.inertial_count > 0 {
            let n = f64::from(self.inertial_count);
            sample.gyro = self.scale_gyro(self.sum_gyro.map(|s| s / n));
            sample.accel = self.scale_accel(self.sum_accel.map(|s| s / n));
            sample.temp_c = self.sum_temp / n / TEMP_SENSITIVITY + TEMP_OFFSET_C;
            sample.imu_error = None;
            sample.imu_count = self.inertial_count;
            sample.captured_at = self.captured_at;
            sample.window = self.window_start.elapsed();
        }

        if self.mag_count > 0 {
            let nm = f64::from(self.mag_count);
            sample.mag = self.scale_mag(self.sum_mag.map(|s| s / nm));
            sample.mag_error = None;
            sample.mag_count = self.mag_count;
            sample.mag_captured_at = self.mag_captured_at;
            sample.mag_window = self.mag_window_start.elapsed();
        }

        sample
    }

    fn reset_accumulators(&mut self) {
        self.sum_gyro = [0.0; 3];
        self.sum_accel = [0.0; 3];
        self.sum_temp = 0.0;
        self.inertial_count = 0;
        self.sum_mag = [0.0; 3];
        self.mag_count = 0;
        self.window_start = Instant::now();
        self.mag_window_start = Instant::now();
    }

    fn scale_gyro(&self, raw: [f64; 3]) -> [f64; 3] {
        let scale = self.dev.scale_gyro();
        [
            (raw[0] - self.cal.gyro_bias[0]) * scale,
            (raw[1] - self.cal.gyro_bias[1]) * scale,
            (raw[2] - self.cal.gyro_bias[2]) * scale,
        ]
    }

    fn scale_accel(&self, raw: [f64; 3]) -> [f64; 3] {
        let scale = self.dev.scale_accel();
        [
            (raw[0] - self.cal.accel_bias[0]) * scale,
            (raw[1] - self.cal.accel_bias[1]) * scale,
            (raw[2] - self.cal.accel_bias[2]) * scale,
        ]
    }

    /// Raw counts go through the fixed per-family conversion, bias
    /// correction, and the rescale matrix, in that order
    fn scale_mag(&self, raw: [f64; 3]) -> [f64; 3] {
        let centered = [
            raw[0] * UT_PER_LSB - self.cal.mag_bias[0],
            raw[1] * UT_PER_LSB - self.cal.mag_bias[1],
            raw[2] * UT_PER_LSB - self.cal.mag_bias[2],
        ];
        apply_rescale(&self.cal.mag_rescale, centered)
    }
}
