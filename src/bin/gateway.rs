//! SX1302 LoRaWAN gateway.
//!
//! Resets the concentrator, starts the HAL, answers joins and serves the
//! latest readings over HTTP until interrupted.
//!
//! # Usage
//!
//! ```bash
//! cargo run --release --features sx1302 --bin gateway -- gateway.json
//! ```
//!
//! The configuration path can also come from `GATEWAY_CONFIG`.

use log::{error, info};

const DEFAULT_CONFIG_PATH: &str = "gateway.json";

fn config_path() -> String {
    std::env::args()
        .nth(1)
        .or_else(|| std::env::var("GATEWAY_CONFIG").ok())
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string())
}

#[cfg(feature = "sx1302")]
#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!("=== SX1302 gateway starting ===");

    if let Err(e) = run(&config_path()).await {
        error!("{}", e);
        std::process::exit(1);
    }
}

#[cfg(feature = "sx1302")]
async fn run(path: &str) -> Result<(), sx1302_gateway::GatewayError> {
    use log::warn;
    use std::sync::Arc;
    use sx1302_gateway::gpio::{reset_concentrator, PinctrlPin};
    use sx1302_gateway::radio::{shared, sx1302::Sx1302};
    use sx1302_gateway::{
        DeviceRegistry, Gateway, GatewayConfig, OsRandom, RawPayloadDecoder, ReadingsServer,
    };
    use tokio_util::sync::CancellationToken;

    let config = GatewayConfig::load(path)?;
    let registry = DeviceRegistry::new(config.devices()?)?;
    let settings = config.settings()?;
    info!("Loaded {} devices from {}", registry.len(), path);

    let reset = PinctrlPin::new(config.reset_pin, config.bookworm);
    let power = config
        .power_pin
        .map(|pin| PinctrlPin::new(pin, config.bookworm));
    reset_concentrator(reset, power, &CancellationToken::new()).await?;

    let gateway = Gateway::start(
        shared(Sx1302::new()),
        registry,
        Arc::new(RawPayloadDecoder),
        Arc::new(OsRandom),
        settings,
    )
    .await?;

    // Keep server alive until shutdown; dropping it stops the thread
    let _server = if config.readings_port == 0 {
        None
    } else {
        match ReadingsServer::start(None, config.readings_port, gateway.readings(), gateway.stats())
        {
            Ok(server) => Some(server),
            Err(e) => {
                warn!("Failed to start readings server: {}", e);
                warn!("Continuing without readings server");
                None
            }
        }
    };

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Interrupt received");

    if let Err(e) = gateway.shutdown().await {
        error!("Radio shutdown failed: {}", e);
    }
    Ok(())
}

#[cfg(not(feature = "sx1302"))]
fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let path = config_path();
    match sx1302_gateway::GatewayConfig::load(&path) {
        Ok(config) => info!("{} is valid ({} devices)", path, config.devices.len()),
        Err(e) => {
            error!("{}", e);
            std::process::exit(1);
        }
    }
    error!("Built without the sx1302 feature; rebuild with --features sx1302 to run the radio");
    std::process::exit(2);
}
