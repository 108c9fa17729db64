//! Register access seam between the driver and the I2C peripheral

use super::SensorError;
use rppal::i2c::I2c;
use tracing::{debug, info};

/// Byte-wide register reads and writes on a single device
pub trait RegisterBus: Send {
    fn read_register(&mut self, register: u8) -> Result<u8, SensorError>;

    /// Burst read starting at `register`, relying on address auto-increment
    fn read_registers(&mut self, register: u8, buf: &mut [u8]) -> Result<(), SensorError>;

    fn write_register(&mut self, register: u8, value: u8) -> Result<(), SensorError>;
}

/// Opens `/dev/i2c-<bus>` and addresses the device at `address`
pub fn open_i2c(bus: u8, address: u16) -> Result<I2c, SensorError> {
    info!("Opening I2C bus {} for device {:#04x}", bus, address);
    let mut i2c = I2c::with_bus(bus).map_err(|e| SensorError::Bus(e.to_string()))?;
    i2c.set_slave_address(address)
        .map_err(|e| SensorError::Bus(e.to_string()))?;
    debug!("I2C clock speed: {:?}", i2c.clock_speed());
    Ok(i2c)
}

impl RegisterBus for I2c {
    fn read_register(&mut self, register: u8) -> Result<u8, SensorError> {
        self.smbus_read_byte(register)
            .map_err(|e| SensorError::Bus(format!("read {:#04x}: {}", register, e)))
    }

    fn read_registers(&mut self, register: u8, buf: &mut [u8]) -> Result<(), SensorError> {
        self.write_read(&[register], buf)
            .map_err(|e| SensorError::Bus(format!("burst read {:#04x}: {}", register, e)))
    }

    fn write_register(&mut self, register: u8, value: u8) -> Result<(), SensorError> {
        self.smbus_write_byte(register, value)
            .map_err(|e| SensorError::Bus(format!("write {:#04x}: {}", register, e)))
    }
}
