//!This library provides a register level `Transport` over the Raspberry Pi I2C buses. It is a wrapper around the rppal
//! library.
//!
//! `RpiTransport::open` takes the bus device path (`/dev/i2c-N`) and the 7 bit address of the device on that bus.

//internal error type for rppal i2c failures
pub mod error;

use std::sync::{Mutex, MutexGuard};

use pwm_core::{
    error::{PwmError, TransportError},
    transport::{expect_length, Transport},
};
use tracing::{debug, trace};

use crate::error::I2cError;

pub use rppal;
pub use rppal::i2c::I2c;

///Bus number of an i2c-dev device path such as `/dev/i2c-1`.
pub fn bus_from_path(device: &str) -> Result<u8, PwmError> {
    device
        .rsplit_once("i2c-")
        .and_then(|(_, bus)| bus.parse::<u8>().ok())
        .ok_or_else(|| {
            PwmError::Configuration(format!(
                "'{}' is not an i2c device path like /dev/i2c-1",
                device
            ))
        })
}

pub struct RpiTransport {
    i2c: Mutex<I2c>,
    address: u8,
}

impl RpiTransport {
    pub fn open(device: &str, address: u8) -> Result<Self, PwmError> {
        let bus = bus_from_path(device)?;
        let mut i2c = I2c::with_bus(bus)
            .map_err(|err| I2cError::new(format!("could not open i2c bus {}", bus), err))?;
        i2c.set_slave_address(address as u16).map_err(|err| {
            I2cError::new(format!("could not select i2c address 0x{:02x}", address), err)
        })?;
        debug!("opened i2c bus {} ({}) at address 0x{:02x}", bus, device, address);
        Ok(Self {
            i2c: Mutex::new(i2c),
            address,
        })
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    fn bus(&self) -> MutexGuard<'_, I2c> {
        match self.i2c.lock() {
            Ok(i2c) => i2c,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl Transport for RpiTransport {
    async fn read(&self, register: u8, length: u32) -> Result<Vec<u8>, TransportError> {
        let mut buffer = vec![0u8; length as usize];
        self.bus()
            .write_read(&[register], &mut buffer)
            .map_err(|err| I2cError::new(format!("read of register 0x{:02x} failed", register), err))?;
        trace!("read 0x{:02x}: {:02x?}", register, buffer);
        expect_length(register, length, buffer)
    }

    async fn write(&self, register: u8, bytes: &[u8]) -> Result<(), TransportError> {
        let mut message = Vec::with_capacity(bytes.len() + 1);
        message.push(register);
        message.extend_from_slice(bytes);
        let written = self
            .bus()
            .write(&message)
            .map_err(|err| I2cError::new(format!("write of register 0x{:02x} failed", register), err))?;
        if written != message.len() {
            return Err(TransportError::from_string(format!(
                "short write to register 0x{:02x}: {} of {} bytes",
                register,
                written,
                message.len()
            )));
        }
        Ok(())
    }
}
