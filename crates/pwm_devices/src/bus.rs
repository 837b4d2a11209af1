use pwm_core::{
    error::{PwmError, TransportError},
    mock::MockTransport,
    transport::Transport,
};
use tracing::info;

#[cfg(feature = "rpi")]
use pwm_rpi_i2c::RpiTransport;

use crate::devices::pca9685::Pca9685Config;

///The bus chosen at construction time.
pub enum BusTransport {
    Mock(MockTransport),
    #[cfg(feature = "rpi")]
    Rpi(RpiTransport),
}

impl BusTransport {
    pub fn open(config: &Pca9685Config) -> Result<Self, PwmError> {
        if config.mock_mode {
            info!(
                "using mock i2c bus in place of {} at address 0x{:02x}",
                config.device, config.address
            );
            Ok(Self::Mock(MockTransport::new(config.debug || config.bus_debug)))
        } else {
            open_hardware(config)
        }
    }

    pub fn is_mock(&self) -> bool {
        matches!(self, Self::Mock(_))
    }
}

#[cfg(feature = "rpi")]
fn open_hardware(config: &Pca9685Config) -> Result<BusTransport, PwmError> {
    let transport = RpiTransport::open(&config.device, config.address)?;
    info!("using i2c bus {} at address 0x{:02x}", config.device, config.address);
    Ok(BusTransport::Rpi(transport))
}

#[cfg(not(feature = "rpi"))]
fn open_hardware(config: &Pca9685Config) -> Result<BusTransport, PwmError> {
    Err(PwmError::Configuration(format!(
        "cannot open {}: built without i2c hardware support (enable the rpi feature or set mock_mode)",
        config.device
    )))
}

impl Transport for BusTransport {
    async fn read(&self, register: u8, length: u32) -> Result<Vec<u8>, TransportError> {
        match self {
            Self::Mock(mock) => mock.read(register, length).await,
            #[cfg(feature = "rpi")]
            Self::Rpi(rpi) => rpi.read(register, length).await,
        }
    }

    async fn write(&self, register: u8, bytes: &[u8]) -> Result<(), TransportError> {
        match self {
            Self::Mock(mock) => mock.write(register, bytes).await,
            #[cfg(feature = "rpi")]
            Self::Rpi(rpi) => rpi.write(register, bytes).await,
        }
    }
}
