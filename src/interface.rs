//! Bus interface implementations for the ICM-20948
//!
//! The driver talks to the chip through the [`RegisterBus`] trait, which is
//! the seam between the register gateway and the physical transport. The
//! production implementation is [`I2cInterface`] over any
//! `embedded_hal::i2c::I2c`; tests substitute an in-memory mock.

use crate::I2C_ADDRESS_AD0_LOW;

/// Raw register transport
///
/// Implementations perform a register-addressed read or write transaction.
/// Multi-byte operations follow the chip's auto-increment convention: the
/// register address names the first register of the run.
pub trait RegisterBus {
    /// Transport error type
    type Error;

    /// Read `buf.len()` bytes starting at `reg`
    fn read_registers(&mut self, reg: u8, buf: &mut [u8]) -> Result<(), Self::Error>;

    /// Write `data` starting at `reg`
    fn write_registers(&mut self, reg: u8, data: &[u8]) -> Result<(), Self::Error>;
}

/// I2C interface for the ICM-20948
pub struct I2cInterface<I2C> {
    i2c: I2C,
    address: u8,
}

impl<I2C> I2cInterface<I2C> {
    /// Create a new I2C interface with the default address (0x68, AD0 pin LOW)
    ///
    /// This is the most common configuration where the AD0 pin is pulled low
    /// or left floating (has internal pull-down on most breakout boards).
    pub const fn default(i2c: I2C) -> Self {
        Self {
            i2c,
            address: I2C_ADDRESS_AD0_LOW,
        }
    }

    /// Create a new I2C interface with the alternative address (0x69, AD0 pin HIGH)
    ///
    /// Use this when the AD0 pin is explicitly pulled high to VDD.
    pub const fn alternative(i2c: I2C) -> Self {
        Self {
            i2c,
            address: crate::I2C_ADDRESS_AD0_HIGH,
        }
    }

    /// Create a new I2C interface with a custom device address
    pub const fn new(i2c: I2C, address: u8) -> Self {
        Self { i2c, address }
    }

    /// Consume the interface and return the I2C peripheral
    pub fn release(self) -> I2C {
        self.i2c
    }
}

impl<I2C, E> RegisterBus for I2cInterface<I2C>
where
    I2C: embedded_hal::i2c::I2c<Error = E>,
{
    type Error = E;

    fn read_registers(&mut self, reg: u8, buf: &mut [u8]) -> Result<(), Self::Error> {
        self.i2c.write_read(self.address, &[reg], buf)
    }

    fn write_registers(&mut self, reg: u8, data: &[u8]) -> Result<(), Self::Error> {
        // Create a buffer with address + data
        let mut buffer = [0u8; 33]; // Max: 1 address + 32 data bytes
        buffer[0] = reg;
        let len = data.len().min(32);
        buffer[1..=len].copy_from_slice(&data[..len]);

        self.i2c.write(self.address, &buffer[..=len])
    }
}
