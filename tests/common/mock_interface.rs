//! Mock bus implementation for testing the driver without hardware
//!
//! Models the chip's banked register map, the bank-select register, the
//! slave-4 one-shot sub-bus channel (with a simulated AK09916 behind it), and
//! the slave-0 mirror into the external sensor data registers. State lives
//! behind an `Arc<Mutex<_>>` so a clone of the mock can inspect and mutate
//! registers while the acquisition engine owns the other clone.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use icm20948_stream::{Bank, RegisterBus};

/// Records operations performed on the mock bus
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// Read register operation
    ReadRegister {
        /// Bank where the register was read
        bank: Bank,
        /// Register address
        address: u8,
        /// Value that was returned
        value: u8,
    },
    /// Write register operation
    WriteRegister {
        /// Bank where the register was written
        bank: Bank,
        /// Register address
        address: u8,
        /// Value that was written
        value: u8,
    },
    /// Bank switch operation
    BankSwitch {
        /// Previous bank
        from: Bank,
        /// New bank
        to: Bank,
    },
}

#[derive(Debug)]
struct MockState {
    /// Simulated register values (bank, address) -> value
    registers: HashMap<(Bank, u8), u8>,

    /// Current bank selection
    current_bank: Bank,

    /// Operations log for verification
    operations: Vec<Operation>,

    /// Failure injection flags
    fail_next_read: bool,
    fail_next_write: bool,
    fail_bank_switch: bool,

    /// Simulated AK09916 registers behind the sub-bus
    mag_registers: HashMap<u8, u8>,

    /// Bytes streamed into the DMP memory data port
    dmp_memory: Vec<u8>,
}

impl MockState {
    fn new() -> Self {
        let mut state = Self {
            registers: HashMap::new(),
            current_bank: Bank::Bank0,
            operations: Vec::new(),
            fail_next_read: false,
            fail_next_write: false,
            fail_bank_switch: false,
            mag_registers: HashMap::new(),
            dmp_memory: Vec::new(),
        };

        // Default WHO_AM_I value (0xEA)
        state.registers.insert((Bank::Bank0, 0x00), 0xEA);

        // AK09916 defaults: valid identity, no data ready, no overflow
        state.mag_registers.insert(0x00, 0x48); // WIA1
        state.mag_registers.insert(0x01, 0x09); // WIA2
        state.mag_registers.insert(0x10, 0x00); // ST1
        state.mag_registers.insert(0x18, 0x00); // ST2

        state
    }

    /// Simulate a slave-4 one-shot transaction
    ///
    /// Triggered when I2C_SLV4_CTRL (Bank 3, 0x15) is written with the enable
    /// bit set. Reads land in I2C_SLV4_DI; completion sets the SLV4_DONE bit
    /// in I2C_MST_STATUS (Bank 0, 0x17), which clears on read.
    fn simulate_slv4_transaction(&mut self) {
        let slv4_addr = self.reg(Bank::Bank3, 0x13);
        let slv4_reg = self.reg(Bank::Bank3, 0x14);
        let slv4_ctrl = self.reg(Bank::Bank3, 0x15);
        let slv4_do = self.reg(Bank::Bank3, 0x16);

        if slv4_ctrl & 0x80 == 0 {
            return;
        }

        let is_read = slv4_addr & 0x80 != 0;
        let i2c_addr = slv4_addr & 0x7F;

        // Only the AK09916 address is wired up
        if i2c_addr == 0x0C {
            if is_read {
                let value = self.mag_registers.get(&slv4_reg).copied().unwrap_or(0);
                self.registers.insert((Bank::Bank3, 0x17), value);
            } else {
                self.mag_registers.insert(slv4_reg, slv4_do);
            }

            let status = self.reg(Bank::Bank0, 0x17);
            self.registers.insert((Bank::Bank0, 0x17), status | 0x40);
        }
    }

    /// Simulate the slave-0 channel mirroring magnetometer registers into the
    /// external sensor data area
    ///
    /// Triggered when I2C_SLV0_CTRL (Bank 3, 0x05) is written with the enable
    /// bit set: copies the configured register run into EXT_SLV_SENS_DATA.
    fn simulate_slv0_mirror(&mut self) {
        let slv0_addr = self.reg(Bank::Bank3, 0x03);
        let slv0_reg = self.reg(Bank::Bank3, 0x04);
        let slv0_ctrl = self.reg(Bank::Bank3, 0x05);

        if slv0_ctrl & 0x80 == 0 || slv0_addr & 0x80 == 0 || slv0_addr & 0x7F != 0x0C {
            return;
        }

        let len = slv0_ctrl & 0x0F;
        for i in 0..len {
            let value = self
                .mag_registers
                .get(&slv0_reg.wrapping_add(i))
                .copied()
                .unwrap_or(0);
            self.registers.insert((Bank::Bank0, 0x3B + i), value);
        }
    }

    fn reg(&self, bank: Bank, address: u8) -> u8 {
        self.registers.get(&(bank, address)).copied().unwrap_or(0)
    }
}

/// Mock bus for testing
#[derive(Clone)]
pub struct MockBus {
    state: Arc<Mutex<MockState>>,
}

impl MockBus {
    /// Create a new mock bus with default register values
    #[allow(dead_code)]
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::new())),
        }
    }

    /// Set a register value
    #[allow(dead_code)]
    pub fn set_register(&self, bank: Bank, address: u8, value: u8) {
        self.state
            .lock()
            .unwrap()
            .registers
            .insert((bank, address), value);
    }

    /// Get a register value
    #[allow(dead_code)]
    pub fn get_register(&self, bank: Bank, address: u8) -> u8 {
        self.state.lock().unwrap().reg(bank, address)
    }

    /// Set the chip's WHO_AM_I register value
    #[allow(dead_code)]
    pub fn set_who_am_i(&self, value: u8) {
        self.set_register(Bank::Bank0, 0x00, value);
    }

    /// Set a simulated AK09916 register
    #[allow(dead_code)]
    pub fn set_mag_register(&self, reg: u8, value: u8) {
        self.state.lock().unwrap().mag_registers.insert(reg, value);
    }

    /// Get a simulated AK09916 register
    #[allow(dead_code)]
    pub fn get_mag_register(&self, reg: u8) -> u8 {
        self.state
            .lock()
            .unwrap()
            .mag_registers
            .get(&reg)
            .copied()
            .unwrap_or(0)
    }

    /// Override the AK09916 identity bytes returned through the one-shot
    /// channel
    #[allow(dead_code)]
    pub fn set_mag_identity(&self, wia1: u8, wia2: u8) {
        let mut state = self.state.lock().unwrap();
        state.mag_registers.insert(0x00, wia1);
        state.mag_registers.insert(0x01, wia2);
    }

    /// Set gyroscope data (big-endian words at GYRO_XOUT_H..)
    #[allow(dead_code)]
    pub fn set_gyro_data(&self, x: i16, y: i16, z: i16) {
        let mut state = self.state.lock().unwrap();
        for (i, v) in [x, y, z].into_iter().enumerate() {
            let [h, l] = v.to_be_bytes();
            let base = 0x33 + (i as u8) * 2;
            state.registers.insert((Bank::Bank0, base), h);
            state.registers.insert((Bank::Bank0, base + 1), l);
        }
    }

    /// Set accelerometer data (big-endian words at ACCEL_XOUT_H..)
    #[allow(dead_code)]
    pub fn set_accel_data(&self, x: i16, y: i16, z: i16) {
        let mut state = self.state.lock().unwrap();
        for (i, v) in [x, y, z].into_iter().enumerate() {
            let [h, l] = v.to_be_bytes();
            let base = 0x2D + (i as u8) * 2;
            state.registers.insert((Bank::Bank0, base), h);
            state.registers.insert((Bank::Bank0, base + 1), l);
        }
    }

    /// Set die temperature data (big-endian word at TEMP_OUT_H)
    #[allow(dead_code)]
    pub fn set_temperature_data(&self, raw: i16) {
        let mut state = self.state.lock().unwrap();
        let [h, l] = raw.to_be_bytes();
        state.registers.insert((Bank::Bank0, 0x39), h);
        state.registers.insert((Bank::Bank0, 0x3A), l);
    }

    /// Set magnetometer data in the mirrored external sensor registers with
    /// data-ready set and no overflow
    #[allow(dead_code)]
    pub fn set_mag_data(&self, x: i16, y: i16, z: i16) {
        self.set_mag_data_with_status(x, y, z, 0x01, 0x00);
    }

    /// Set mirrored magnetometer data with explicit status bytes
    ///
    /// Layout matches the slave-0 block read: ST1, HXL..HZH (little-endian),
    /// a dummy byte, ST2.
    #[allow(dead_code)]
    pub fn set_mag_data_with_status(&self, x: i16, y: i16, z: i16, st1: u8, st2: u8) {
        let mut state = self.state.lock().unwrap();
        state.registers.insert((Bank::Bank0, 0x3B), st1);
        for (i, v) in [x, y, z].into_iter().enumerate() {
            let [l, h] = v.to_le_bytes();
            let base = 0x3C + (i as u8) * 2;
            state.registers.insert((Bank::Bank0, base), l);
            state.registers.insert((Bank::Bank0, base + 1), h);
        }
        state.registers.insert((Bank::Bank0, 0x42), 0x00);
        state.registers.insert((Bank::Bank0, 0x43), st2);
    }

    /// Simulate a magnetometer overflow condition
    #[allow(dead_code)]
    pub fn set_mag_overflow(&self) {
        self.set_mag_data_with_status(0, 0, 0, 0x01, 0x08);
    }

    /// Inject a read failure on the next read operation
    #[allow(dead_code)]
    pub fn fail_next_read(&self) {
        self.state.lock().unwrap().fail_next_read = true;
    }

    /// Inject a write failure on the next write operation
    #[allow(dead_code)]
    pub fn fail_next_write(&self) {
        self.state.lock().unwrap().fail_next_write = true;
    }

    /// Inject bank switch failures
    #[allow(dead_code)]
    pub fn fail_bank_switch(&self, enable: bool) {
        self.state.lock().unwrap().fail_bank_switch = enable;
    }

    /// Get the operations log
    #[allow(dead_code)]
    pub fn operations(&self) -> Vec<Operation> {
        self.state.lock().unwrap().operations.clone()
    }

    /// Clear the operations log
    #[allow(dead_code)]
    pub fn clear_operations(&self) {
        self.state.lock().unwrap().operations.clear();
    }

    /// Count bank switch operations
    #[allow(dead_code)]
    pub fn bank_switch_count(&self) -> usize {
        self.state
            .lock()
            .unwrap()
            .operations
            .iter()
            .filter(|op| matches!(op, Operation::BankSwitch { .. }))
            .count()
    }

    /// Bytes that were streamed into the DMP memory data port
    #[allow(dead_code)]
    pub fn dmp_memory(&self) -> Vec<u8> {
        self.state.lock().unwrap().dmp_memory.clone()
    }
}

impl Default for MockBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Mock error type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockError {
    /// Simulated communication error
    Communication,
    /// Simulated bank switch error
    BankSwitch,
}

impl fmt::Display for MockError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Communication => f.write_str("simulated communication error"),
            Self::BankSwitch => f.write_str("simulated bank switch error"),
        }
    }
}

impl RegisterBus for MockBus {
    type Error = MockError;

    fn read_registers(&mut self, reg: u8, buf: &mut [u8]) -> Result<(), Self::Error> {
        let mut state = self.state.lock().unwrap();

        if state.fail_next_read {
            state.fail_next_read = false;
            return Err(MockError::Communication);
        }

        // The bank-select register reads back the current bank in every bank
        if reg == 0x7F {
            let current = state.current_bank;
            buf[0] = (current as u8) << 4;
            state.operations.push(Operation::ReadRegister {
                bank: current,
                address: reg,
                value: buf[0],
            });
            return Ok(());
        }

        for (i, byte) in buf.iter_mut().enumerate() {
            let address = reg.wrapping_add(i as u8);
            let bank = state.current_bank;
            *byte = state.reg(bank, address);

            state.operations.push(Operation::ReadRegister {
                bank,
                address,
                value: *byte,
            });

            // SLV4_DONE (bit 6) clears when I2C_MST_STATUS is read
            if bank == Bank::Bank0 && address == 0x17 {
                state.registers.insert((Bank::Bank0, 0x17), *byte & !0x40);
            }
        }

        Ok(())
    }

    fn write_registers(&mut self, reg: u8, data: &[u8]) -> Result<(), Self::Error> {
        let mut state = self.state.lock().unwrap();

        if state.fail_next_write {
            state.fail_next_write = false;
            return Err(MockError::Communication);
        }

        // Bank-select register
        if reg == 0x7F {
            if state.fail_bank_switch {
                return Err(MockError::BankSwitch);
            }

            let new_bank = match (data[0] >> 4) & 0x03 {
                0 => Bank::Bank0,
                1 => Bank::Bank1,
                2 => Bank::Bank2,
                _ => Bank::Bank3,
            };

            let old_bank = state.current_bank;
            state.current_bank = new_bank;
            state.operations.push(Operation::BankSwitch {
                from: old_bank,
                to: new_bank,
            });
            return Ok(());
        }

        // The DMP memory data port does not auto-increment; a burst streams
        // into memory at the previously latched bank/address
        if state.current_bank == Bank::Bank0 && reg == 0x7D {
            for &byte in data {
                state.dmp_memory.push(byte);
                state.operations.push(Operation::WriteRegister {
                    bank: Bank::Bank0,
                    address: reg,
                    value: byte,
                });
            }
            return Ok(());
        }

        for (i, &byte) in data.iter().enumerate() {
            let address = reg.wrapping_add(i as u8);
            let bank = state.current_bank;
            state.registers.insert((bank, address), byte);

            state.operations.push(Operation::WriteRegister {
                bank,
                address,
                value: byte,
            });

            if bank == Bank::Bank3 && address == 0x15 {
                state.simulate_slv4_transaction();
            }
            if bank == Bank::Bank3 && address == 0x05 {
                state.simulate_slv0_mirror();
            }
        }

        Ok(())
    }
}
