use std::future::Future;

use crate::error::TransportError;

///Register level access to one device at a fixed bus address.
///
/// A `Transport` issues a single bus transaction per call. Callers that need several registers written in a particular
/// order must await each call before issuing the next one.
pub trait Transport {
    ///Read `length` bytes starting at `register`. A successful read returns exactly `length` bytes.
    fn read(
        &self,
        register: u8,
        length: u32,
    ) -> impl Future<Output = Result<Vec<u8>, TransportError>>;

    ///Write `bytes` starting at `register`.
    fn write(
        &self,
        register: u8,
        bytes: &[u8],
    ) -> impl Future<Output = Result<(), TransportError>>;

    ///Write a single byte value, sent on the bus as a one element sequence.
    fn write_byte(
        &self,
        register: u8,
        value: u8,
    ) -> impl Future<Output = Result<(), TransportError>> {
        async move { self.write(register, &[value]).await }
    }
}

///Checks that a real bus returned what was asked for.
pub fn expect_length(register: u8, length: u32, bytes: Vec<u8>) -> Result<Vec<u8>, TransportError> {
    if bytes.len() == length as usize {
        Ok(bytes)
    } else {
        Err(TransportError::from_string(format!(
            "read of register 0x{:02x} returned {} bytes, expected {}",
            register,
            bytes.len(),
            length
        )))
    }
}
