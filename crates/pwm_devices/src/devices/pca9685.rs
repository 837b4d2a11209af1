use futures::try_join;
use pwm_core::{
    delay::{Delay, TokioDelay},
    error::{PwmError, TransportError},
    transport::Transport,
};
use serde::Deserialize;
use tracing::{debug, trace};

use crate::bus::BusTransport;

//chip level logging goes to debug when the device is configured with `debug`, otherwise to trace
macro_rules! note {
    ($enabled:expr, $($arg:tt)+) => {
        if $enabled {
            debug!($($arg)+)
        } else {
            trace!($($arg)+)
        }
    };
}

///Register addresses of the PCA9685.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Register {
    Mode1,
    Mode2,
    SubAdr1,
    SubAdr2,
    SubAdr3,
    Prescale,
    Led0OnL,
    Led0OnH,
    Led0OffL,
    Led0OffH,
    AllLedOnL,
    AllLedOnH,
    AllLedOffL,
    AllLedOffH,
}

impl Register {
    pub const fn addr(self) -> u8 {
        match self {
            Self::Mode1 => 0x00,
            Self::Mode2 => 0x01,
            Self::SubAdr1 => 0x02,
            Self::SubAdr2 => 0x03,
            Self::SubAdr3 => 0x04,
            Self::Prescale => 0xFE,
            Self::Led0OnL => 0x06,
            Self::Led0OnH => 0x07,
            Self::Led0OffL => 0x08,
            Self::Led0OffH => 0x09,
            Self::AllLedOnL => 0xFA,
            Self::AllLedOnH => 0xFB,
            Self::AllLedOffL => 0xFC,
            Self::AllLedOffH => 0xFD,
        }
    }
}

///Mode register bits.
pub mod bits {
    ///MODE1
    pub const RESTART: u8 = 0x80;
    ///MODE1
    pub const SLEEP: u8 = 0x10;
    ///MODE1
    pub const ALLCALL: u8 = 0x01;
    ///MODE2, output logic inverted
    pub const INVRT: u8 = 0x10;
    ///MODE2, totem pole outputs instead of open drain
    pub const OUTDRV: u8 = 0x04;
}

pub const CHANNELS: u8 = 16;
pub const MAX_TICK: u16 = 4095;
pub const OSCILLATOR_HZ: f64 = 25_000_000.0;
pub const STEPS_PER_CYCLE: f64 = 4096.0;
pub const MIN_PRESCALE: f64 = 3.0;
pub const MAX_PRESCALE: f64 = 255.0;

///Settling time after changing MODE1, in microseconds.
pub const SETTLE_US: u64 = 5000;

///Registers `[ON_L, ON_H, OFF_L, OFF_H]` of one channel.
pub fn channel_registers(channel: u8) -> Result<[u8; 4], PwmError> {
    if channel >= CHANNELS {
        return Err(PwmError::invalid_argument(format!(
            "channel {} is out of range, the PCA9685 has channels 0 to {}",
            channel,
            CHANNELS - 1
        )));
    }
    let base = 4 * channel;
    Ok([
        Register::Led0OnL.addr() + base,
        Register::Led0OnH.addr() + base,
        Register::Led0OffL.addr() + base,
        Register::Led0OffH.addr() + base,
    ])
}

const ALL_LED_REGISTERS: [u8; 4] = [
    Register::AllLedOnL.addr(),
    Register::AllLedOnH.addr(),
    Register::AllLedOffL.addr(),
    Register::AllLedOffH.addr(),
];

///Prescale before rounding: `25MHz / 4096 / freq - 1`.
pub fn estimate_prescale(freq: f64) -> f64 {
    let mut prescale = OSCILLATOR_HZ;
    prescale /= STEPS_PER_CYCLE;
    prescale /= freq;
    prescale -= 1.0;
    prescale
}

///Prescale register value for `freq` Hz, rounded to nearest. Nothing is validated, so a zero or negative frequency gives
/// a value the chip cannot take.
pub fn prescale_for(freq: f64) -> f64 {
    (estimate_prescale(freq) + 0.5).floor()
}

///Like `prescale_for`, but rejects frequencies whose prescale would fall outside 3..=255.
pub fn checked_prescale(freq: f64) -> Result<u8, PwmError> {
    if !freq.is_finite() || freq <= 0.0 {
        return Err(PwmError::invalid_argument(format!(
            "pwm frequency must be a positive number of Hz, got {}",
            freq
        )));
    }
    let prescale = prescale_for(freq);
    if !(MIN_PRESCALE..=MAX_PRESCALE).contains(&prescale) {
        return Err(PwmError::invalid_argument(format!(
            "pwm frequency {} Hz needs prescale {}, outside {}..={}",
            freq, prescale, MIN_PRESCALE, MAX_PRESCALE
        )));
    }
    Ok(prescale as u8)
}

fn check_tick(name: &str, value: u16) -> Result<(), PwmError> {
    if value > MAX_TICK {
        Err(PwmError::invalid_argument(format!(
            "{} tick {} does not fit in 12 bits (max {})",
            name, value, MAX_TICK
        )))
    } else {
        Ok(())
    }
}

fn default_address() -> u8 {
    0x40
}

fn default_device() -> String {
    "/dev/i2c-1".to_string()
}

///Options for one PCA9685. Anything left out of a config file takes the default.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Pca9685Config {
    ///7 bit i2c address of the chip.
    pub address: u8,
    ///i2c bus device path.
    pub device: String,
    ///Log what the driver computes and writes.
    pub debug: bool,
    ///Log every bus write made by the mock bus.
    pub bus_debug: bool,
    ///Use the mock bus instead of hardware.
    pub mock_mode: bool,
}

impl Default for Pca9685Config {
    fn default() -> Self {
        Self {
            address: default_address(),
            device: default_device(),
            debug: false,
            bus_debug: false,
            mock_mode: false,
        }
    }
}

impl Pca9685Config {
    pub fn validate(&self) -> Result<(), PwmError> {
        if self.address > 0x7F {
            return Err(PwmError::Configuration(format!(
                "i2c address 0x{:02x} is not a 7 bit address",
                self.address
            )));
        }
        if !self.mock_mode && self.device.trim().is_empty() {
            return Err(PwmError::configuration(
                "a device path is required unless mock_mode is set",
            ));
        }
        Ok(())
    }
}

///Driver for a PCA9685 16 channel, 12 bit PWM chip.
///
/// Every operation is an ordered series of register accesses on `transport` with settling waits on `delay`. The chip has
/// no transactions, so a failed operation leaves it partially configured; run `init` again before carrying on.
pub struct Pca9685<T, D> {
    transport: T,
    delay: D,
    config: Pca9685Config,
    prescale: Option<u8>,
}

impl Pca9685<BusTransport, TokioDelay> {
    ///Open the bus named by `config` (or the mock bus when `mock_mode` is set).
    pub fn open(config: Pca9685Config) -> Result<Self, PwmError> {
        //checked before the bus is touched
        config.validate()?;
        let transport = BusTransport::open(&config)?;
        Ok(Self::with_valid_config(config, transport, TokioDelay))
    }
}

impl<T, D> Pca9685<T, D>
where
    T: Transport,
    D: Delay,
{
    pub fn new(config: Pca9685Config, transport: T, delay: D) -> Result<Self, PwmError> {
        config.validate()?;
        Ok(Self::with_valid_config(config, transport, delay))
    }

    fn with_valid_config(config: Pca9685Config, transport: T, delay: D) -> Self {
        Self {
            transport,
            delay,
            config,
            prescale: None,
        }
    }

    pub fn config(&self) -> &Pca9685Config {
        &self.config
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    ///The prescale written by the last successful `set_pwm_freq`.
    pub fn prescale(&self) -> Option<u8> {
        self.prescale
    }

    pub fn release(self) -> (T, D) {
        (self.transport, self.delay)
    }

    ///Zero every channel, select totem pole outputs, enable all call and wake the oscillator.
    pub async fn init(&self) -> Result<(), PwmError> {
        note!(
            self.config.debug,
            "resetting PCA9685 on {} at address 0x{:02x}",
            self.config.device,
            self.config.address
        );

        self.set_all_pwm(0, 0).await?;
        self.transport
            .write_byte(Register::Mode2.addr(), bits::OUTDRV)
            .await?;
        self.transport
            .write_byte(Register::Mode1.addr(), bits::ALLCALL)
            .await?;
        self.delay.usleep(SETTLE_US).await;

        let mode1 = self.read_mode1().await?;
        let awake = mode1 & !bits::SLEEP;
        self.transport
            .write_byte(Register::Mode1.addr(), awake)
            .await?;
        //oscillator start up
        self.delay.usleep(SETTLE_US).await;

        note!(self.config.debug, "PCA9685 init done, mode1: 0x{:02x}", awake);
        Ok(())
    }

    ///Set the PWM frequency of every channel. Returns the prescale written.
    ///
    /// The prescale register only takes writes while the oscillator sleeps, so the chip is put to sleep, reprogrammed,
    /// given its old mode back and then restarted.
    pub async fn set_pwm_freq(&mut self, freq: f64) -> Result<u8, PwmError> {
        note!(self.config.debug, "setting PWM frequency to {} Hz", freq);
        note!(
            self.config.debug,
            "estimated pre-scale: {}",
            estimate_prescale(freq)
        );
        let prescale = checked_prescale(freq)?;
        note!(self.config.debug, "final pre-scale: {}", prescale);

        let old_mode = self.read_mode1().await?;
        let new_mode = (old_mode & !bits::RESTART) | bits::SLEEP;
        note!(
            self.config.debug,
            "prescale {}, new mode: 0x{:02x}",
            prescale,
            new_mode
        );
        self.transport
            .write_byte(Register::Mode1.addr(), new_mode)
            .await?;
        self.transport
            .write_byte(Register::Prescale.addr(), prescale)
            .await?;
        self.transport
            .write_byte(Register::Mode1.addr(), old_mode)
            .await?;
        self.delay.usleep(SETTLE_US).await;
        self.transport
            .write_byte(Register::Mode1.addr(), old_mode | bits::RESTART)
            .await?;

        self.prescale = Some(prescale);
        Ok(prescale)
    }

    ///Program one channel to switch on at tick `on` and off at tick `off` of each 4096 tick cycle.
    pub async fn set_pwm(&self, channel: u8, on: u16, off: u16) -> Result<(), PwmError> {
        let registers = channel_registers(channel)?;
        note!(
            self.config.debug,
            "setting PWM channel: {}, on: {} off: {}",
            channel,
            on,
            off
        );
        self.write_on_off(registers, on, off).await
    }

    ///Program every channel at once through the ALL_LED registers.
    pub async fn set_all_pwm(&self, on: u16, off: u16) -> Result<(), PwmError> {
        note!(self.config.debug, "setting all PWM channels, on: {} off: {}", on, off);
        self.write_on_off(ALL_LED_REGISTERS, on, off).await
    }

    ///Force every output off. The oscillator keeps running.
    pub async fn stop(&self) -> Result<(), PwmError> {
        note!(self.config.debug, "stopping all PWM outputs");
        self.transport
            .write_byte(Register::AllLedOffH.addr(), 0x01)
            .await?;
        Ok(())
    }

    async fn read_mode1(&self) -> Result<u8, PwmError> {
        let data = self.transport.read(Register::Mode1.addr(), 1).await?;
        data.first().copied().ok_or_else(|| {
            PwmError::Transport(TransportError::from_string(
                "MODE1 read returned no data".to_string(),
            ))
        })
    }

    //the four registers are independent, so the writes are issued together
    async fn write_on_off(&self, registers: [u8; 4], on: u16, off: u16) -> Result<(), PwmError> {
        check_tick("on", on)?;
        check_tick("off", off)?;
        let [on_l, on_h, off_l, off_h] = registers;
        try_join!(
            self.transport.write_byte(on_l, (on & 0xFF) as u8),
            self.transport.write_byte(on_h, (on >> 8) as u8),
            self.transport.write_byte(off_l, (off & 0xFF) as u8),
            self.transport.write_byte(off_h, (off >> 8) as u8),
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::{io, sync::Mutex, time::Duration};

    use pwm_core::{
        error::{PwmError, TransportError},
        mock::{BusEvent, EventLog, MockDelay, MockTransport},
        transport::Transport,
    };

    use super::*;

    const MODE1: u8 = 0x00;
    const SETTLE: BusEvent = BusEvent::Delay(Duration::from_micros(5000));

    fn write(register: u8, value: u8) -> BusEvent {
        BusEvent::Write {
            register,
            bytes: vec![value],
        }
    }

    fn mock_config() -> Pca9685Config {
        Pca9685Config {
            mock_mode: true,
            ..Default::default()
        }
    }

    fn mock_pca(mode1: u8) -> (Pca9685<MockTransport, MockDelay>, EventLog) {
        let log = EventLog::new();
        let transport = MockTransport::with_log(log.clone(), false);
        transport.preset(MODE1, mode1);
        let pca = Pca9685::new(mock_config(), transport, MockDelay::with_log(log.clone())).unwrap();
        (pca, log)
    }

    //fails every write to `fail_register` with an io error and records writes it accepted
    struct FailingTransport {
        fail_register: u8,
        writes: Mutex<Vec<u8>>,
    }

    impl Transport for FailingTransport {
        async fn read(&self, _register: u8, length: u32) -> Result<Vec<u8>, TransportError> {
            Ok(vec![0; length as usize])
        }

        async fn write(&self, register: u8, _bytes: &[u8]) -> Result<(), TransportError> {
            if register == self.fail_register {
                let cause = io::Error::new(io::ErrorKind::BrokenPipe, "nack");
                return Err(TransportError::new("write failed", cause));
            }
            self.writes.lock().unwrap().push(register);
            Ok(())
        }
    }

    #[test]
    fn test_prescale_for() {
        assert_eq!(prescale_for(40.0), 152.0);
        assert_eq!(prescale_for(50.0), 121.0);
        assert_eq!(prescale_for(60.0), 101.0);
        assert_eq!(prescale_for(200.0), 30.0);
        assert_eq!(prescale_for(1000.0), 5.0);

        for freq in 40..=1000 {
            let freq = freq as f64;
            let expected = (25_000_000.0 / 4096.0 / freq - 1.0 + 0.5).floor();
            assert_eq!(checked_prescale(freq).unwrap() as f64, expected, "{} Hz", freq);
        }
    }

    #[test]
    fn test_checked_prescale_rejects() {
        for freq in [0.0, -50.0, f64::NAN, f64::INFINITY, 1.0, 5000.0] {
            match checked_prescale(freq) {
                Err(PwmError::InvalidArgument(_)) => {}
                other => panic!("{} Hz should be rejected, got {:?}", freq, other),
            }
        }
        //edges of the 3..=255 range
        assert_eq!(checked_prescale(1526.0).unwrap(), 3);
        assert_eq!(checked_prescale(23.8).unwrap(), 255);
    }

    #[test]
    fn test_channel_registers() {
        assert_eq!(channel_registers(0).unwrap(), [0x06, 0x07, 0x08, 0x09]);
        assert_eq!(channel_registers(15).unwrap(), [0x42, 0x43, 0x44, 0x45]);
        assert!(channel_registers(16).is_err());
    }

    #[test]
    fn test_config_validation() {
        assert!(Pca9685Config::default().validate().is_ok());

        let config = Pca9685Config {
            address: 0x80,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(PwmError::Configuration(_))));

        let config = Pca9685Config {
            device: "".to_string(),
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(PwmError::Configuration(_))));

        let config = Pca9685Config {
            device: "".to_string(),
            mock_mode: true,
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[tokio::test]
    async fn test_init_sequence() {
        let (pca, log) = mock_pca(0x11);
        pca.init().await.unwrap();

        let expected = vec![
            write(0xFA, 0x00),
            write(0xFB, 0x00),
            write(0xFC, 0x00),
            write(0xFD, 0x00),
            write(0x01, bits::OUTDRV),
            write(0x00, bits::ALLCALL),
            SETTLE,
            BusEvent::Read { register: MODE1, length: 1 },
            write(0x00, 0x01),
            SETTLE,
        ];
        assert_eq!(log.events(), expected);

        //nothing carried over between runs
        log.clear();
        pca.init().await.unwrap();
        assert_eq!(log.events(), expected);
        assert_eq!(pca.prescale(), None);
    }

    #[tokio::test]
    async fn test_set_pwm_freq_sequence() {
        let (mut pca, log) = mock_pca(0x01);
        assert_eq!(pca.set_pwm_freq(50.0).await.unwrap(), 121);

        assert_eq!(
            log.events(),
            vec![
                BusEvent::Read { register: MODE1, length: 1 },
                write(0x00, 0x11),
                write(0xFE, 121),
                write(0x00, 0x01),
                SETTLE,
                write(0x00, 0x81),
            ]
        );
        assert_eq!(pca.prescale(), Some(121));
    }

    #[tokio::test]
    async fn test_set_pwm_freq_restores_old_mode_verbatim() {
        let (mut pca, log) = mock_pca(0x91);
        pca.set_pwm_freq(60.0).await.unwrap();

        assert_eq!(
            log.writes(),
            vec![
                (0x00, vec![0x11]),
                (0xFE, vec![101]),
                (0x00, vec![0x91]),
                (0x00, vec![0x91]),
            ]
        );
    }

    #[tokio::test]
    async fn test_set_pwm_freq_rejects_before_bus_traffic() {
        let (mut pca, log) = mock_pca(0x01);
        pca.set_pwm_freq(50.0).await.unwrap();
        log.clear();

        assert!(matches!(
            pca.set_pwm_freq(0.0).await,
            Err(PwmError::InvalidArgument(_))
        ));
        assert!(log.events().is_empty());
        assert_eq!(pca.prescale(), Some(121));
    }

    #[tokio::test]
    async fn test_set_pwm() {
        let (pca, log) = mock_pca(0x00);
        pca.set_pwm(0, 0x0ABC, 0x0100).await.unwrap();
        assert_eq!(
            log.writes(),
            vec![
                (0x06, vec![0xBC]),
                (0x07, vec![0x0A]),
                (0x08, vec![0x00]),
                (0x09, vec![0x01]),
            ]
        );

        log.clear();
        pca.set_pwm(3, 0, 4095).await.unwrap();
        assert_eq!(
            log.writes(),
            vec![
                (0x12, vec![0x00]),
                (0x13, vec![0x00]),
                (0x14, vec![0xFF]),
                (0x15, vec![0x0F]),
            ]
        );
    }

    #[tokio::test]
    async fn test_set_pwm_rejects_bad_arguments() {
        let (pca, log) = mock_pca(0x00);
        assert!(matches!(
            pca.set_pwm(16, 0, 100).await,
            Err(PwmError::InvalidArgument(_))
        ));
        assert!(matches!(
            pca.set_pwm(0, 0, 4096).await,
            Err(PwmError::InvalidArgument(_))
        ));
        assert!(matches!(
            pca.set_all_pwm(5000, 0).await,
            Err(PwmError::InvalidArgument(_))
        ));
        assert!(log.events().is_empty());
    }

    #[tokio::test]
    async fn test_set_all_pwm() {
        let (pca, log) = mock_pca(0x00);
        pca.set_all_pwm(0x0123, 0x0FED).await.unwrap();
        assert_eq!(
            log.writes(),
            vec![
                (0xFA, vec![0x23]),
                (0xFB, vec![0x01]),
                (0xFC, vec![0xED]),
                (0xFD, vec![0x0F]),
            ]
        );
    }

    #[tokio::test]
    async fn test_stop() {
        let (pca, log) = mock_pca(0x00);
        pca.stop().await.unwrap();
        assert_eq!(log.events(), vec![write(0xFD, 0x01)]);
    }

    #[tokio::test]
    async fn test_transport_error_aborts_init() {
        let transport = FailingTransport {
            fail_register: Register::Mode2.addr(),
            writes: Mutex::new(Vec::new()),
        };
        let pca = Pca9685::new(mock_config(), transport, MockDelay::new()).unwrap();

        let err = pca.init().await.unwrap_err();
        let PwmError::Transport(transport_err) = &err else {
            panic!("expected a transport error, got {:?}", err);
        };
        let cause = transport_err
            .inner()
            .and_then(|inner| inner.downcast_ref::<io::Error>())
            .expect("the io error is kept");
        assert_eq!(cause.kind(), io::ErrorKind::BrokenPipe);

        //only the ALL_LED writes made it out, MODE1 was never touched
        let (transport, _) = pca.release();
        assert_eq!(*transport.writes.lock().unwrap(), vec![0xFA, 0xFB, 0xFC, 0xFD]);
    }

    #[tokio::test]
    async fn test_transport_error_during_set_pwm() {
        let transport = FailingTransport {
            fail_register: 0x08,
            writes: Mutex::new(Vec::new()),
        };
        let pca = Pca9685::new(mock_config(), transport, MockDelay::new()).unwrap();
        assert!(matches!(
            pca.set_pwm(0, 1, 2).await,
            Err(PwmError::Transport(_))
        ));
    }

    #[test]
    fn test_new_validates_config() {
        let config = Pca9685Config {
            address: 0xFF,
            ..mock_config()
        };
        let res = Pca9685::new(config, MockTransport::new(false), MockDelay::new());
        assert!(matches!(res, Err(PwmError::Configuration(_))));
    }
}
