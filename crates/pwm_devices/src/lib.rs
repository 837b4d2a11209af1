//!Chip drivers written against the `pwm_core` capabilities.
//!
//! `bus::BusTransport` picks the bus a driver talks to from its configuration: the mock bus always, the Raspberry Pi
//! i2c bus when built with the `rpi` feature.

pub mod bus;
pub mod devices;
