use std::fmt::{Debug, Formatter};

use pwm_core::error::{PwmError, TransportError};

///An rppal i2c failure along with what was being attempted.
pub struct I2cError {
    pub message: String,
    pub cause: rppal::i2c::Error,
}

impl I2cError {
    pub fn new(message: String, cause: rppal::i2c::Error) -> Self {
        Self { message, cause }
    }
}

impl Debug for I2cError {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> Result<(), std::fmt::Error> {
        fmt.write_fmt(format_args!("RpiI2cError - {} - Cause: {}", self.message, self.cause))
    }
}

impl From<rppal::i2c::Error> for I2cError {
    fn from(err: rppal::i2c::Error) -> Self {
        Self::new("i2c transaction failed".to_string(), err)
    }
}

impl From<I2cError> for TransportError {
    fn from(err: I2cError) -> Self {
        TransportError::new(&err.message, err.cause)
    }
}

impl From<I2cError> for PwmError {
    fn from(err: I2cError) -> Self {
        PwmError::Configuration(format!("{} - Cause: {}", err.message, err.cause))
    }
}
