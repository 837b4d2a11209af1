use pwm_core::{delay::Delay, error::PwmError, transport::Transport};
use pwm_devices::devices::pca9685::{Pca9685, Pca9685Config};
use serde::Deserialize;
use tracing::{info, warn};

///On/off ticks within the 4096 tick cycle.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct PwmSetting {
    pub on: u16,
    pub off: u16,
}

#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct ChannelSetting {
    pub channel: u8,
    pub on: u16,
    pub off: u16,
}

///Top level configuration: which chip to talk to and what to program into it.
#[derive(Debug, Deserialize)]
pub struct DriverConfig {
    #[serde(default)]
    pub device: Pca9685Config,
    pub frequency_hz: Option<f64>,
    pub all: Option<PwmSetting>,
    #[serde(default)]
    pub channels: Vec<ChannelSetting>,
    ///Keep the outputs running until ctrl-c, then stop them.
    #[serde(default)]
    pub hold: bool,
}

impl DriverConfig {
    ///Initialize the chip, then apply the frequency, the all-channel setting and the per-channel settings in that order.
    pub async fn program<T, D>(&self, pca: &mut Pca9685<T, D>) -> Result<(), PwmError>
    where
        T: Transport,
        D: Delay,
    {
        pca.init().await?;
        if let Some(freq) = self.frequency_hz {
            let prescale = pca.set_pwm_freq(freq).await?;
            info!("pwm frequency {} Hz (prescale {})", freq, prescale);
        }
        if let Some(all) = self.all {
            pca.set_all_pwm(all.on, all.off).await?;
        }
        for setting in &self.channels {
            pca.set_pwm(setting.channel, setting.on, setting.off).await?;
        }
        info!("programmed {} channel(s)", self.channels.len());
        Ok(())
    }

    pub async fn start(&self) -> Result<(), PwmError> {
        let mut pca = Pca9685::open(self.device.clone())?;
        self.program(&mut pca).await?;

        if self.hold {
            info!("outputs running, press ctrl-c to stop");
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!("could not wait for ctrl-c: {}", err);
            }
            pca.stop().await?;
            info!("outputs stopped");
        }
        Ok(())
    }
}
