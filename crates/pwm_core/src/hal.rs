use std::{
    error::Error,
    fmt::{Display, Formatter},
    sync::Mutex,
};

use embedded_hal::i2c::{Error as _, ErrorKind, I2c};
use tracing::trace;

use crate::{
    error::TransportError,
    transport::{expect_length, Transport},
};

///The kind of failure an `embedded-hal` bus reported. Kept as the `source` of the resulting `TransportError`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HalI2cError(pub ErrorKind);

impl Display for HalI2cError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Error for HalI2cError {}

///A `Transport` over any blocking `embedded-hal` I2C bus.
///
/// The bus is held behind a mutex so each transaction runs to completion before the next begins.
pub struct HalTransport<I2C> {
    i2c: Mutex<I2C>,
    address: u8,
}

impl<I2C> HalTransport<I2C>
where
    I2C: I2c,
{
    pub fn new(i2c: I2C, address: u8) -> Self {
        Self {
            i2c: Mutex::new(i2c),
            address,
        }
    }

    pub fn address(&self) -> u8 {
        self.address
    }

    pub fn release(self) -> I2C {
        match self.i2c.into_inner() {
            Ok(i2c) => i2c,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn with_bus<T>(&self, op: impl FnOnce(&mut I2C) -> Result<T, I2C::Error>) -> Result<T, TransportError> {
        let mut i2c = match self.i2c.lock() {
            Ok(i2c) => i2c,
            Err(poisoned) => poisoned.into_inner(),
        };
        op(&mut *i2c).map_err(|err| {
            TransportError::new(
                &format!(
                    "i2c transaction with device 0x{:02x} failed ({:?})",
                    self.address, err
                ),
                HalI2cError(err.kind()),
            )
        })
    }
}

impl<I2C> Transport for HalTransport<I2C>
where
    I2C: I2c,
{
    async fn read(&self, register: u8, length: u32) -> Result<Vec<u8>, TransportError> {
        let mut buffer = vec![0u8; length as usize];
        self.with_bus(|i2c| i2c.write_read(self.address, &[register], &mut buffer))?;
        trace!("read 0x{:02x}: {:02x?}", register, buffer);
        expect_length(register, length, buffer)
    }

    async fn write(&self, register: u8, bytes: &[u8]) -> Result<(), TransportError> {
        let mut message = Vec::with_capacity(bytes.len() + 1);
        message.push(register);
        message.extend_from_slice(bytes);
        self.with_bus(|i2c| i2c.write(self.address, &message))
    }
}
