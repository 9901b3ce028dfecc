//! Register definitions for the ICM-20948
//!
//! The ICM-20948 uses a bank-switching architecture where registers at
//! addresses 0x00-0x7F have different meanings depending on which bank is
//! selected via `REG_BANK_SEL` (0x7F, valid in every bank).
//!
//! ## Bank architecture
//! - **Bank 0**: Power management, sub-bus routing, and sensor data
//! - **Bank 1**: Self-test and factory accelerometer offsets
//! - **Bank 2**: Gyroscope and accelerometer configuration
//! - **Bank 3**: I2C master configuration for magnetometer access

/// Bank-select register, valid from every bank. The bank number occupies the
/// high nibble of the written byte.
pub const REG_BANK_SEL: u8 = 0x7F;

/// Bank 0 registers
pub mod bank0 {
    /// Device ID register, expected to read 0xEA
    pub const WHO_AM_I: u8 = 0x00;
    /// User control: DMP/FIFO/I2C-master enables and resets
    pub const USER_CTRL: u8 = 0x03;
    /// Low-power duty-cycle configuration
    pub const LP_CONFIG: u8 = 0x05;
    /// Power management 1: reset, sleep, clock source
    pub const PWR_MGMT_1: u8 = 0x06;
    /// Power management 2: per-axis sensor disables
    pub const PWR_MGMT_2: u8 = 0x07;
    /// Interrupt pin / bypass routing configuration
    pub const INT_PIN_CFG: u8 = 0x0F;
    /// I2C master status (slave NACKs, slave-4 completion)
    pub const I2C_MST_STATUS: u8 = 0x17;
    /// Accelerometer X-axis high byte (X/Y/Z words at 0x2D..0x32)
    pub const ACCEL_XOUT_H: u8 = 0x2D;
    /// Accelerometer Y-axis high byte
    pub const ACCEL_YOUT_H: u8 = 0x2F;
    /// Accelerometer Z-axis high byte
    pub const ACCEL_ZOUT_H: u8 = 0x31;
    /// Gyroscope X-axis high byte (X/Y/Z words at 0x33..0x38)
    pub const GYRO_XOUT_H: u8 = 0x33;
    /// Gyroscope Y-axis high byte
    pub const GYRO_YOUT_H: u8 = 0x35;
    /// Gyroscope Z-axis high byte
    pub const GYRO_ZOUT_H: u8 = 0x37;
    /// Die temperature high byte
    pub const TEMP_OUT_H: u8 = 0x39;
    /// First external (sub-bus slave) sensor data register; 0x3B..0x52
    pub const EXT_SLV_SENS_DATA_00: u8 = 0x3B;
    /// DMP memory start address within the selected memory bank
    pub const MEM_START_ADDR: u8 = 0x7C;
    /// DMP memory data port (address auto-increments per byte)
    pub const MEM_R_W: u8 = 0x7D;
    /// DMP memory bank select (256-byte banks)
    pub const MEM_BANK_SEL: u8 = 0x7E;
}

/// Bank 1 registers
pub mod bank1 {
    /// Factory accelerometer X offset, high byte
    pub const XA_OFFS_H: u8 = 0x14;
    /// Factory accelerometer Y offset, high byte
    pub const YA_OFFS_H: u8 = 0x17;
    /// Factory accelerometer Z offset, high byte
    pub const ZA_OFFS_H: u8 = 0x1A;
}

/// Bank 2 registers
pub mod bank2 {
    /// Gyro sample rate divider (ODR = 1125 / (1 + div) Hz)
    pub const GYRO_SMPLRT_DIV: u8 = 0x00;
    /// Gyro full-scale range, DLPF tier, and filter enable
    pub const GYRO_CONFIG_1: u8 = 0x01;
    /// Factory gyro X offset, high byte
    pub const XG_OFFS_USRH: u8 = 0x03;
    /// Factory gyro Y offset, high byte
    pub const YG_OFFS_USRH: u8 = 0x05;
    /// Factory gyro Z offset, high byte
    pub const ZG_OFFS_USRH: u8 = 0x07;
    /// Accelerometer sample rate divider, low byte
    pub const ACCEL_SMPLRT_DIV_2: u8 = 0x11;
    /// Accelerometer full-scale range, DLPF tier, and filter enable
    pub const ACCEL_CONFIG: u8 = 0x14;
}

/// Bank 3 registers (I2C master / sub-bus)
pub mod bank3 {
    /// I2C master output data rate configuration (duty-cycled mode)
    pub const I2C_MST_ODR_CONFIG: u8 = 0x00;
    /// I2C master clock select and stop-between-reads flag
    pub const I2C_MST_CTRL: u8 = 0x01;
    /// Per-slave access delay control
    pub const I2C_MST_DELAY_CTRL: u8 = 0x02;
    /// Slave 0 target address (bit 7 = read)
    pub const I2C_SLV0_ADDR: u8 = 0x03;
    /// Slave 0 target register
    pub const I2C_SLV0_REG: u8 = 0x04;
    /// Slave 0 control: enable bit + transfer length
    pub const I2C_SLV0_CTRL: u8 = 0x05;
    /// Slave 0 data-out register
    pub const I2C_SLV0_DO: u8 = 0x06;
    /// Slave 4 (one-shot channel) target address
    pub const I2C_SLV4_ADDR: u8 = 0x13;
    /// Slave 4 target register
    pub const I2C_SLV4_REG: u8 = 0x14;
    /// Slave 4 control: transaction enable
    pub const I2C_SLV4_CTRL: u8 = 0x15;
    /// Slave 4 data-out register
    pub const I2C_SLV4_DO: u8 = 0x16;
    /// Slave 4 data-in register
    pub const I2C_SLV4_DI: u8 = 0x17;
}

/// Control bits shared across registers
pub mod bits {
    /// PWR_MGMT_1: device reset
    pub const H_RESET: u8 = 0x80;
    /// PWR_MGMT_1: auto-select best available clock source
    pub const CLKSEL_AUTO: u8 = 0x01;
    /// USER_CTRL: I2C master (sub-bus) enable
    pub const I2C_MST_EN: u8 = 0x20;
    /// LP_CONFIG: I2C master duty-cycled mode
    pub const I2C_MST_CYCLE: u8 = 0x40;
    /// INT_PIN_CFG: bypass multiplexer enable
    pub const BYPASS_EN: u8 = 0x02;
    /// I2C_MST_CTRL: issue a stop between slave reads
    pub const I2C_MST_P_NSR: u8 = 0x10;
    /// I2C_MST_CTRL: ~345.6 kHz master clock
    pub const I2C_MST_CLK_400KHZ: u8 = 0x07;
    /// Slave address registers: transaction is a read
    pub const I2C_SLV_READ: u8 = 0x80;
    /// Slave control registers: channel enable
    pub const I2C_SLV_EN: u8 = 0x80;
    /// I2C_MST_STATUS: slave 4 transaction complete
    pub const I2C_SLV4_DONE: u8 = 0x40;
    /// GYRO_CONFIG_1 / ACCEL_CONFIG: low-pass filter enable (FCHOICE)
    pub const DLPF_ENABLE: u8 = 0x01;
}

/// AK09916 magnetometer register map and constants
pub mod ak09916 {
    /// Magnetometer address on the chip's internal sub-bus
    pub const I2C_ADDR: u8 = 0x0C;
    /// Company ID register
    pub const WIA1: u8 = 0x00;
    /// Device ID register
    pub const WIA2: u8 = 0x01;
    /// Status 1: data ready
    pub const ST1: u8 = 0x10;
    /// Measurement data start (HXL; six bytes, little-endian)
    pub const HXL: u8 = 0x11;
    /// Status 2: magnetic overflow
    pub const ST2: u8 = 0x18;
    /// Control 2: operating mode
    pub const CNTL2: u8 = 0x31;
    /// Control 3: soft reset
    pub const CNTL3: u8 = 0x32;

    /// Expected company ID (AKM)
    pub const WIA1_VALUE: u8 = 0x48;
    /// Expected device ID (AK09916)
    pub const WIA2_VALUE: u8 = 0x09;
    /// ST1: data-ready bit
    pub const ST1_DRDY: u8 = 0x01;
    /// ST2: magnetic sensor overflow bit
    pub const ST2_HOFL: u8 = 0x08;
    /// CNTL3: soft-reset bit
    pub const SRST: u8 = 0x01;

    /// Length of the continuous status + data block read through slave 0:
    /// ST1, HXL..HZH, a dummy byte, ST2
    pub const STATUS_BLOCK_LEN: u8 = 9;
}

/// DMP memory bank size in bytes; memory writes may not cross a bank boundary
pub const MEM_BANK_SIZE: usize = 256;

/// DMP memory address of the motion-bias compensation configuration block
pub const CFG_MOTION_BIAS: u16 = 1208;
