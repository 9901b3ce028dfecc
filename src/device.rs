//! Register gateway and bring-up sequencing for the ICM-20948
//!
//! [`Icm20948`] owns the bus transport and the device context: the cached
//! register bank, the configured scale factors, and the magnetometer state.
//! It provides the banked register primitives every other part of the driver
//! goes through, and the multi-stage bring-up sequence that must run before
//! the acquisition engine takes ownership of the bus.
//!
//! Bank selection is cached: selecting the already-current bank issues no bus
//! traffic. Every physical register write is followed by a short settle delay
//! because the chip requires spacing between consecutive writes.

use embedded_hal::delay::DelayNs;
use log::{debug, info, warn};

use crate::calibration::Calibration;
use crate::driver::Config;
use crate::interface::RegisterBus;
use crate::registers::{ak09916, bank0, bank1, bank2, bank3, bits};
use crate::registers::{CFG_MOTION_BIAS, MEM_BANK_SIZE, REG_BANK_SEL};
use crate::sensors::{AccelDlpf, AccelRange, GyroDlpf, GyroRange, MagMode};
use crate::{Bank, BringUpStep, Error, WHO_AM_I_VALUE};

/// Settle time after every physical register write (write-to-write spacing)
const WRITE_SETTLE_MS: u32 = 1;

/// Settle time after asserting the chip reset bit
const RESET_SETTLE_MS: u32 = 100;

/// Settle time after clock selection
const WAKE_SETTLE_MS: u32 = 10;

/// Time for the gyro and accelerometer to start after power-on
const SENSOR_STARTUP_MS: u32 = 50;

/// Stabilization time after enabling the sub-bus master, covering several
/// full sub-bus poll cycles
const SUB_BUS_SETTLE_MS: u32 = 500;

/// Time for the AK09916 to come back after a soft reset
const MAG_RESET_SETTLE_MS: u32 = 100;

/// Polling attempts for a slave-4 one-shot transaction to complete
const SLV4_DONE_ATTEMPTS: u32 = 100;

/// DMP memory blob enabling gyro motion-bias compensation
const MOTION_BIAS_ENABLE: [u8; 9] = [0xb8, 0xaa, 0xb3, 0x8d, 0xb4, 0x98, 0x0d, 0x35, 0x5d];

/// DMP memory blob disabling gyro motion-bias compensation
const MOTION_BIAS_DISABLE: [u8; 9] = [0xb8, 0xaa, 0xaa, 0xaa, 0xb0, 0x88, 0xc3, 0xc5, 0xc7];

/// The chip's base output data rate; the sample-rate divider derives from it
pub const BASE_RATE_HZ: u16 = 1125;

/// Low-level ICM-20948 device: register gateway plus device context
pub struct Icm20948<B, D> {
    bus: B,
    delay: D,
    current_bank: Option<Bank>,
    scale_gyro: f64,
    scale_accel: f64,
    sample_rate: u16,
    mag_enabled: bool,
    mag_verified: bool,
}

impl<B, D> Icm20948<B, D>
where
    B: RegisterBus,
    B::Error: core::fmt::Debug,
    D: DelayNs,
{
    /// Create a device over the given transport and delay provider
    ///
    /// No bus traffic is issued; call [`bring_up`](Self::bring_up) to
    /// configure the chip. The bank cache starts out unknown, so the first
    /// bank selection always writes.
    pub fn new(bus: B, delay: D) -> Self {
        Self {
            bus,
            delay,
            current_bank: None,
            scale_gyro: 0.0,
            scale_accel: 0.0,
            sample_rate: 0,
            mag_enabled: false,
            mag_verified: false,
        }
    }

    /// Consume the device and return the bus transport
    pub fn release(self) -> B {
        self.bus
    }

    /// Gyro scale factor in deg/s per LSB, recorded at range configuration
    #[must_use]
    pub fn scale_gyro(&self) -> f64 {
        self.scale_gyro
    }

    /// Accelerometer scale factor in g per LSB
    #[must_use]
    pub fn scale_accel(&self) -> f64 {
        self.scale_accel
    }

    /// Configured sample rate in Hz
    #[must_use]
    pub fn sample_rate(&self) -> u16 {
        self.sample_rate
    }

    /// Whether the magnetometer was brought up
    #[must_use]
    pub fn mag_enabled(&self) -> bool {
        self.mag_enabled
    }

    /// Whether magnetometer data should be treated as degraded
    ///
    /// True when the magnetometer is enabled but its identity check never
    /// succeeded during bring-up.
    #[must_use]
    pub fn mag_degraded(&self) -> bool {
        self.mag_enabled && !self.mag_verified
    }

    // ---------------------------------------------------------------- gateway

    /// Select a register bank
    ///
    /// Writes the bank-select register only if the cached current bank
    /// differs, then updates the cache.
    ///
    /// # Errors
    ///
    /// Returns an error if communication with the device fails.
    pub fn select_bank(&mut self, bank: Bank) -> Result<(), Error<B::Error>> {
        if self.current_bank != Some(bank) {
            self.write_register(REG_BANK_SEL, (bank as u8) << 4)?;
            self.current_bank = Some(bank);
        }
        Ok(())
    }

    /// Write a single register in the currently selected bank
    ///
    /// Honors the write-to-write settle contract.
    pub fn write_register(&mut self, reg: u8, value: u8) -> Result<(), Error<B::Error>> {
        self.bus
            .write_registers(reg, &[value])
            .map_err(|source| Error::Bus { reg, source })?;
        self.delay.delay_ms(WRITE_SETTLE_MS);
        Ok(())
    }

    /// Write a block of bytes starting at `reg`
    pub fn write_block(&mut self, reg: u8, data: &[u8]) -> Result<(), Error<B::Error>> {
        self.bus
            .write_registers(reg, data)
            .map_err(|source| Error::Bus { reg, source })?;
        self.delay.delay_ms(WRITE_SETTLE_MS);
        Ok(())
    }

    /// Read a single register in the currently selected bank
    pub fn read_register(&mut self, reg: u8) -> Result<u8, Error<B::Error>> {
        let mut buf = [0u8; 1];
        self.bus
            .read_registers(reg, &mut buf)
            .map_err(|source| Error::Bus { reg, source })?;
        Ok(buf[0])
    }

    /// Read a big-endian 16-bit word starting at `reg`
    ///
    /// Used for the gyro/accel/temperature high-byte registers.
    pub fn read_word(&mut self, reg: u8) -> Result<i16, Error<B::Error>> {
        let mut buf = [0u8; 2];
        self.bus
            .read_registers(reg, &mut buf)
            .map_err(|source| Error::Bus { reg, source })?;
        Ok(i16::from_be_bytes(buf))
    }

    /// Read a block of bytes starting at `reg`
    pub fn read_block(&mut self, reg: u8, buf: &mut [u8]) -> Result<(), Error<B::Error>> {
        self.bus
            .read_registers(reg, buf)
            .map_err(|source| Error::Bus { reg, source })
    }

    /// Write a block into DMP memory
    ///
    /// Memory is organized in 256-byte banks addressed through
    /// `MEM_BANK_SEL`/`MEM_START_ADDR`. A write that would cross the bank
    /// boundary fails up-front without touching the bus.
    ///
    /// # Errors
    ///
    /// [`Error::MemoryBankOverflow`] when `addr + data.len()` crosses the
    /// bank boundary; bus errors otherwise.
    pub fn write_mem(&mut self, addr: u16, data: &[u8]) -> Result<(), Error<B::Error>> {
        let offset = (addr & 0xFF) as usize;
        if offset + data.len() > MEM_BANK_SIZE {
            return Err(Error::MemoryBankOverflow {
                addr,
                len: data.len(),
            });
        }

        self.select_bank(Bank::Bank0)?;
        #[allow(clippy::cast_possible_truncation)]
        self.write_register(bank0::MEM_BANK_SEL, (addr >> 8) as u8)?;
        #[allow(clippy::cast_possible_truncation)]
        self.write_register(bank0::MEM_START_ADDR, (addr & 0xFF) as u8)?;
        self.write_block(bank0::MEM_R_W, data)
    }

    // ---------------------------------------------------------- configuration

    /// Set the gyro full-scale range and record the per-LSB scale factor
    pub fn set_gyro_range(&mut self, range: GyroRange) -> Result<(), Error<B::Error>> {
        self.select_bank(Bank::Bank2)?;
        self.write_register(bank2::GYRO_CONFIG_1, range.fs_bits())?;
        self.scale_gyro = range.scale();
        Ok(())
    }

    /// Set the accelerometer full-scale range and record the scale factor
    pub fn set_accel_range(&mut self, range: AccelRange) -> Result<(), Error<B::Error>> {
        self.select_bank(Bank::Bank2)?;
        self.write_register(bank2::ACCEL_CONFIG, range.fs_bits())?;
        self.scale_accel = range.scale();
        Ok(())
    }

    /// Enable the gyro low-pass filter at the given tier
    pub fn set_gyro_dlpf(&mut self, dlpf: GyroDlpf) -> Result<(), Error<B::Error>> {
        self.select_bank(Bank::Bank2)?;
        let cfg = self.read_register(bank2::GYRO_CONFIG_1)?;
        self.write_register(bank2::GYRO_CONFIG_1, cfg | bits::DLPF_ENABLE | dlpf.bits())
    }

    /// Enable the accelerometer low-pass filter at the given tier
    pub fn set_accel_dlpf(&mut self, dlpf: AccelDlpf) -> Result<(), Error<B::Error>> {
        self.select_bank(Bank::Bank2)?;
        let cfg = self.read_register(bank2::ACCEL_CONFIG)?;
        self.write_register(bank2::ACCEL_CONFIG, cfg | bits::DLPF_ENABLE | dlpf.bits())
    }

    /// Program the gyro and accelerometer sample-rate dividers
    pub fn set_sample_rate_dividers(&mut self, divider: u8) -> Result<(), Error<B::Error>> {
        self.select_bank(Bank::Bank2)?;
        self.write_register(bank2::GYRO_SMPLRT_DIV, divider)?;
        self.write_register(bank2::ACCEL_SMPLRT_DIV_2, divider)
    }

    /// Read the factory-programmed gyro bias registers
    ///
    /// The registers are stored at the 1000 deg/s range; the values are
    /// rescaled to the configured range.
    pub fn read_factory_gyro_bias(
        &mut self,
        range: GyroRange,
    ) -> Result<[f64; 3], Error<B::Error>> {
        self.select_bank(Bank::Bank2)?;
        let x = self.read_word(bank2::XG_OFFS_USRH)?;
        let y = self.read_word(bank2::YG_OFFS_USRH)?;
        let z = self.read_word(bank2::ZG_OFFS_USRH)?;

        let factor = match range {
            GyroRange::Dps2000 => 0.5,
            GyroRange::Dps1000 => 1.0,
            GyroRange::Dps500 => 2.0,
            GyroRange::Dps250 => 4.0,
        };
        Ok([
            f64::from(x) * factor,
            f64::from(y) * factor,
            f64::from(z) * factor,
        ])
    }

    /// Read the factory-programmed accelerometer bias registers
    ///
    /// Stored at the 8 g range; rescaled to the configured range.
    pub fn read_factory_accel_bias(
        &mut self,
        range: AccelRange,
    ) -> Result<[f64; 3], Error<B::Error>> {
        self.select_bank(Bank::Bank1)?;
        let x = self.read_word(bank1::XA_OFFS_H)?;
        let y = self.read_word(bank1::YA_OFFS_H)?;
        let z = self.read_word(bank1::ZA_OFFS_H)?;

        let factor = match range {
            AccelRange::G16 => 0.5,
            AccelRange::G8 => 1.0,
            AccelRange::G4 => 2.0,
            AccelRange::G2 => 4.0,
        };
        Ok([
            f64::from(x) * factor,
            f64::from(y) * factor,
            f64::from(z) * factor,
        ])
    }

    /// Enable or disable gyro motion-bias auto-compensation
    ///
    /// Writes the corresponding configuration blob into DMP memory. Usually
    /// left disabled: the compensation pollutes the gyro in a non-inertial
    /// frame.
    pub fn set_gyro_bias_compensation(&mut self, enable: bool) -> Result<(), Error<B::Error>> {
        let blob = if enable {
            &MOTION_BIAS_ENABLE
        } else {
            &MOTION_BIAS_DISABLE
        };
        self.write_mem(CFG_MOTION_BIAS, blob)
    }

    // ------------------------------------------------------------- data reads

    /// Read the raw gyro words in X, Y, Z order
    pub fn read_gyro_raw(&mut self) -> Result<[i16; 3], Error<B::Error>> {
        self.select_bank(Bank::Bank0)?;
        Ok([
            self.read_word(bank0::GYRO_XOUT_H)?,
            self.read_word(bank0::GYRO_YOUT_H)?,
            self.read_word(bank0::GYRO_ZOUT_H)?,
        ])
    }

    /// Read the raw accelerometer words in X, Y, Z order
    pub fn read_accel_raw(&mut self) -> Result<[i16; 3], Error<B::Error>> {
        self.select_bank(Bank::Bank0)?;
        Ok([
            self.read_word(bank0::ACCEL_XOUT_H)?,
            self.read_word(bank0::ACCEL_YOUT_H)?,
            self.read_word(bank0::ACCEL_ZOUT_H)?,
        ])
    }

    /// Read the raw die temperature word
    pub fn read_temp_raw(&mut self) -> Result<i16, Error<B::Error>> {
        self.select_bank(Bank::Bank0)?;
        self.read_word(bank0::TEMP_OUT_H)
    }

    /// Read the magnetometer status byte mirrored by the sub-bus master
    pub fn read_mag_status(&mut self) -> Result<u8, Error<B::Error>> {
        self.select_bank(Bank::Bank0)?;
        self.read_register(bank0::EXT_SLV_SENS_DATA_00)
    }

    /// Read the mirrored magnetometer payload: six little-endian data bytes,
    /// a dummy byte, and the trailing status byte
    pub fn read_mag_payload(&mut self) -> Result<[u8; 8], Error<B::Error>> {
        self.select_bank(Bank::Bank0)?;
        let mut buf = [0u8; 8];
        self.read_block(bank0::EXT_SLV_SENS_DATA_00 + 1, &mut buf)?;
        Ok(buf)
    }

    // --------------------------------------------------- one-shot sub-bus ops

    /// Read one AK09916 register through the slave-4 one-shot channel
    pub fn read_mag_register(&mut self, reg: u8) -> Result<u8, Error<B::Error>> {
        self.select_bank(Bank::Bank3)?;
        self.write_register(bank3::I2C_SLV4_ADDR, bits::I2C_SLV_READ | ak09916::I2C_ADDR)?;
        self.write_register(bank3::I2C_SLV4_REG, reg)?;
        self.write_register(bank3::I2C_SLV4_CTRL, bits::I2C_SLV_EN)?;
        self.wait_for_slv4_done()?;

        self.select_bank(Bank::Bank3)?;
        self.read_register(bank3::I2C_SLV4_DI)
    }

    /// Write one AK09916 register through the slave-4 one-shot channel
    pub fn write_mag_register(&mut self, reg: u8, value: u8) -> Result<(), Error<B::Error>> {
        self.select_bank(Bank::Bank3)?;
        self.write_register(bank3::I2C_SLV4_ADDR, ak09916::I2C_ADDR)?;
        self.write_register(bank3::I2C_SLV4_REG, reg)?;
        self.write_register(bank3::I2C_SLV4_DO, value)?;
        self.write_register(bank3::I2C_SLV4_CTRL, bits::I2C_SLV_EN)?;
        self.wait_for_slv4_done()
    }

    /// Poll the master status register until the slave-4 transaction reports
    /// completion
    fn wait_for_slv4_done(&mut self) -> Result<(), Error<B::Error>> {
        for _ in 0..SLV4_DONE_ATTEMPTS {
            self.select_bank(Bank::Bank0)?;
            let status = self.read_register(bank0::I2C_MST_STATUS)?;
            if status & bits::I2C_SLV4_DONE != 0 {
                return Ok(());
            }
            self.delay.delay_ms(1);
        }
        Err(Error::SubBus)
    }

    // --------------------------------------------------------------- bring-up

    /// Run the full bring-up sequence
    ///
    /// Resets and wakes the chip, powers the inertial sensors, configures
    /// ranges, filtering, and the sample rate, optionally brings the sub-bus
    /// master online for the magnetometer, and optionally loads the factory
    /// bias registers into `cal`.
    ///
    /// # Errors
    ///
    /// Any transport failure is fatal and is tagged with the failing stage
    /// via [`Error::BringUp`]. A magnetometer identity mismatch is a soft
    /// failure: it is logged, the device is marked degraded, and bring-up
    /// proceeds.
    pub fn bring_up(
        &mut self,
        config: &Config,
        cal: &mut Calibration,
    ) -> Result<(), Error<B::Error>> {
        self.sample_rate = config.sample_rate;
        self.mag_enabled = config.enable_mag;
        self.mag_verified = false;

        self.reset().map_err(|e| e.during(BringUpStep::Reset))?;
        self.wake().map_err(|e| e.during(BringUpStep::Wake))?;
        self.power_on_sensors()
            .map_err(|e| e.during(BringUpStep::PowerOn))?;

        self.set_gyro_range(config.gyro_range)
            .map_err(|e| e.during(BringUpStep::Ranges))?;
        self.set_accel_range(config.accel_range)
            .map_err(|e| e.during(BringUpStep::Ranges))?;

        self.configure_filtering(config.sample_rate)
            .map_err(|e| e.during(BringUpStep::Filtering))?;

        if config.enable_mag {
            self.bring_up_magnetometer()
                .map_err(|e| e.during(BringUpStep::SubBus))?;
        }

        if config.apply_hw_offsets {
            cal.gyro_bias = self
                .read_factory_gyro_bias(config.gyro_range)
                .map_err(|e| e.during(BringUpStep::BiasRead))?;
            cal.accel_bias = self
                .read_factory_accel_bias(config.accel_range)
                .map_err(|e| e.during(BringUpStep::BiasRead))?;
            info!(
                "factory biases applied: gyro {:?}, accel {:?}",
                cal.gyro_bias, cal.accel_bias
            );
        }

        Ok(())
    }

    /// Assert the chip reset bit and wait for the part to come back
    fn reset(&mut self) -> Result<(), Error<B::Error>> {
        self.current_bank = None;
        self.select_bank(Bank::Bank0)?;
        self.write_register(bank0::PWR_MGMT_1, bits::H_RESET)?;
        self.delay.delay_ms(RESET_SETTLE_MS);
        Ok(())
    }

    /// Select the auto clock source and verify the chip identity
    ///
    /// CLKSEL must be 1..=5 for full gyro performance per the register map.
    fn wake(&mut self) -> Result<(), Error<B::Error>> {
        self.write_register(bank0::PWR_MGMT_1, bits::CLKSEL_AUTO)?;
        self.delay.delay_ms(WAKE_SETTLE_MS);

        let who_am_i = self.read_register(bank0::WHO_AM_I)?;
        if who_am_i != WHO_AM_I_VALUE {
            return Err(Error::InvalidDevice(who_am_i));
        }
        Ok(())
    }

    /// Clear every sensor-disable bit
    ///
    /// Must happen before sub-bus configuration: the sub-bus master clock is
    /// derived from the gyro, so the master cannot run with the sensors off.
    fn power_on_sensors(&mut self) -> Result<(), Error<B::Error>> {
        self.write_register(bank0::PWR_MGMT_2, 0x00)?;
        self.delay.delay_ms(SENSOR_STARTUP_MS);
        debug!("gyro and accel powered on");
        Ok(())
    }

    /// Derive the divider byte and program filtering and rate
    fn configure_filtering(&mut self, sample_rate: u16) -> Result<(), Error<B::Error>> {
        #[allow(clippy::cast_possible_truncation)]
        let divider = (BASE_RATE_HZ / sample_rate - 1) as u8;
        let filter_target = divider >> 1;

        self.set_gyro_dlpf(GyroDlpf::for_rate(filter_target))?;
        self.set_accel_dlpf(AccelDlpf::for_rate(filter_target))?;
        self.set_sample_rate_dividers(divider)
    }

    /// Bring the internal I2C master online and put the AK09916 into
    /// continuous measurement mode
    fn bring_up_magnetometer(&mut self) -> Result<(), Error<B::Error>> {
        info!("initializing AK09916 magnetometer");

        // Bypass routing would put the magnetometer on the host bus directly;
        // it must be off before any sub-bus master configuration.
        self.select_bank(Bank::Bank0)?;
        self.write_register(bank0::INT_PIN_CFG, 0x00)?;
        self.delay.delay_ms(10);

        // The master must poll continuously, not duty-cycled.
        let lp_config = self.read_register(bank0::LP_CONFIG)?;
        if lp_config & bits::I2C_MST_CYCLE != 0 {
            self.write_register(bank0::LP_CONFIG, lp_config & !bits::I2C_MST_CYCLE)?;
            debug!("cleared duty-cycled sub-bus polling");
        }

        // Master clock and the continuous status-block read on slave 0.
        self.select_bank(Bank::Bank3)?;
        self.write_register(bank3::I2C_MST_ODR_CONFIG, 0x04)?;
        self.write_register(
            bank3::I2C_MST_CTRL,
            bits::I2C_MST_CLK_400KHZ | bits::I2C_MST_P_NSR,
        )?;
        self.program_mag_status_block_read()?;

        let mode = MagMode::for_rate(self.sample_rate);

        // Enabling the master before the slave channels are configured causes
        // undefined transaction ordering, so this comes last.
        self.select_bank(Bank::Bank0)?;
        self.write_register(bank0::USER_CTRL, bits::I2C_MST_EN)?;
        self.delay.delay_ms(100);
        self.delay.delay_ms(SUB_BUS_SETTLE_MS);

        match self.verify_mag_identity() {
            Ok(true) => self.mag_verified = true,
            Ok(false) => {
                warn!("AK09916 identity mismatch; magnetometer data will be flagged degraded");
            }
            Err(e) => {
                warn!("AK09916 identity read failed ({e:?}); magnetometer data will be flagged degraded");
            }
        }

        // Soft-reset the magnetometer, then select the continuous mode
        // computed from the configured rate.
        self.write_mag_register(ak09916::CNTL3, ak09916::SRST)?;
        self.delay.delay_ms(MAG_RESET_SETTLE_MS);
        self.write_mag_register(ak09916::CNTL2, mode.bits())?;
        self.delay.delay_ms(20);

        // Read the mode back through slave 0, which clobbers the channel, and
        // restore the continuous status-block read afterwards.
        self.select_bank(Bank::Bank3)?;
        self.write_register(bank3::I2C_SLV0_ADDR, bits::I2C_SLV_READ | ak09916::I2C_ADDR)?;
        self.write_register(bank3::I2C_SLV0_REG, ak09916::CNTL2)?;
        self.write_register(bank3::I2C_SLV0_CTRL, bits::I2C_SLV_EN | 1)?;
        self.delay.delay_ms(10);

        self.select_bank(Bank::Bank0)?;
        let echo = self.read_register(bank0::EXT_SLV_SENS_DATA_00)?;
        debug!(
            "AK09916 CNTL2 readback {echo:#04x} (expected {:#04x})",
            mode.bits()
        );

        self.program_mag_status_block_read()?;
        self.select_bank(Bank::Bank0)?;

        info!(
            "AK09916 initialization complete, continuous mode {:#04x}",
            mode.bits()
        );
        Ok(())
    }

    /// Program slave 0 to continuously mirror the AK09916 status + data block
    fn program_mag_status_block_read(&mut self) -> Result<(), Error<B::Error>> {
        self.select_bank(Bank::Bank3)?;
        self.write_register(bank3::I2C_SLV0_ADDR, bits::I2C_SLV_READ | ak09916::I2C_ADDR)?;
        self.write_register(bank3::I2C_SLV0_REG, ak09916::ST1)?;
        self.write_register(
            bank3::I2C_SLV0_CTRL,
            bits::I2C_SLV_EN | ak09916::STATUS_BLOCK_LEN,
        )
    }

    /// Check the two AK09916 identity registers through the one-shot channel
    fn verify_mag_identity(&mut self) -> Result<bool, Error<B::Error>> {
        let wia1 = self.read_mag_register(ak09916::WIA1)?;
        let wia2 = self.read_mag_register(ak09916::WIA2)?;
        debug!(
            "AK09916 identity: {wia1:#04x}/{wia2:#04x} (expect {:#04x}/{:#04x})",
            ak09916::WIA1_VALUE,
            ak09916::WIA2_VALUE
        );
        Ok(wia1 == ak09916::WIA1_VALUE && wia2 == ak09916::WIA2_VALUE)
    }
}
