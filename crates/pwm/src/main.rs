pub mod config;

use config::DriverConfig;
use config_rs::{Config, File};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "pwm=info,pwm_devices=debug,pwm_core=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() != 2 {
        warn!("only one parameter, the config file, is expected.");
        warn!("got {}", args.join(","));
        std::process::exit(2);
    } else if let Some(cfg_name) = args.get(1).map(|o| o.as_str()) {
        let config_res = Config::builder()
            .add_source(File::with_name(cfg_name))
            .build()
            .and_then(|config| config.try_deserialize::<DriverConfig>());

        match config_res {
            Ok(config) => {
                info!(
                    "PCA9685 driver starting up on {} at address 0x{:02x}{}",
                    config.device.device,
                    config.device.address,
                    if config.device.mock_mode { " (mock)" } else { "" }
                );
                match config.start().await {
                    Ok(_) => info!("PCA9685 driver done!"),
                    Err(err) => {
                        error!("PCA9685 driver exited with an error: {:?}", err);
                        std::process::exit(1);
                    }
                }
            }
            Err(err) => {
                error!("Failed to parse config: {:?}", err);
                std::process::exit(1);
            }
        }
    }
}
