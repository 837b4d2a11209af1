//!This is the core library for the pwm driver. It holds the capabilities a chip driver is written against: a register
//! level bus `Transport`, a `Delay`, and the shared error types. Concrete buses live in other crates (or behind the `hal`
//! feature), so anything built on this crate compiles and runs without hardware through `mock`.

pub mod delay;
pub mod error;
pub mod mock;
pub mod transport;

///`Transport` for any `embedded-hal` 1.0 I2C bus.
#[cfg(feature = "hal")]
pub mod hal;

pub use delay::{Delay, TokioDelay};
pub use error::{PwmError, TransportError};
pub use mock::{BusEvent, EventLog, MockDelay, MockTransport};
pub use transport::Transport;
