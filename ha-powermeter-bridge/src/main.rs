//! Home Assistant bridge for Modbus RTU power meters.
//!
//! This bridge polls power meters on a serial line and publishes their
//! readings to MQTT with Home Assistant discovery.

use anyhow::{Context, Result};
use clap::Parser;
use ha_powermeter_bridge::config::{Overrides, PowerMeterBridgeConfig};
use ha_powermeter_bridge::meter::{Catalogs, PowerMeter};
use ha_powermeter_bridge::poller::{MeterPoller, Mode};
use ha_powermeter_bridge::reader::{BusReader, SharedBus};
use ha_powermeter_bridge::rtu::RtuTransport;
use powermeter_bridge_framework::{
    BridgeArgs, BridgeConfig, MqttBroker, Publisher, TopicBuilder,
};
use tracing::info;

/// Home Assistant bridge for Modbus RTU power meters.
#[derive(Parser, Debug)]
#[command(name = "ha-powermeter-bridge")]
#[command(about = "Polls Modbus RTU power meters and publishes to Home Assistant over MQTT")]
#[command(version)]
struct Args {
    #[command(flatten)]
    common: BridgeArgs,

    /// Override the serial port
    #[arg(short, long)]
    serial: Option<String>,

    /// Publish readings to MQTT (otherwise they are only logged)
    #[arg(short, long)]
    publish: bool,

    /// Override the poll interval in milliseconds
    #[arg(short = 'f', long, value_parser = clap::value_parser!(u64).range(1..))]
    interval_ms: Option<u64>,
}

impl Args {
    fn overrides(&self) -> Overrides {
        Overrides {
            serial_port: self.serial.clone(),
            publish: self.publish,
            poll_interval_ms: self.interval_ms,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration
    let mut config = PowerMeterBridgeConfig::load(&args.common.config)
        .with_context(|| format!("Failed to load config from {:?}", args.common.config))?;
    config
        .apply_overrides(&args.overrides())
        .context("Invalid configuration after command-line overrides")?;

    // Initialize logging
    let log_config = args.common.logging(config.logging());
    powermeter_common::init_tracing(&log_config)
        .map_err(|e| anyhow::anyhow!("Failed to init tracing: {}", e))?;

    info!("Starting ha-powermeter-bridge");
    info!("Loaded configuration from {:?}", args.common.config);

    let catalogs = Catalogs::new();
    catalogs
        .validate()
        .map_err(|(model, e)| anyhow::anyhow!("Invalid {} register catalog: {}", model, e))?;

    let meters: Vec<PowerMeter> = config
        .meters
        .iter()
        .map(|meter| PowerMeter::from_config(meter, &catalogs))
        .collect();

    // Open the serial bus shared by every meter
    let transport = RtuTransport::open(&config.bus).context("Failed to open serial bus")?;
    let reader = BusReader::new(SharedBus::new(transport));

    // Connect to MQTT
    info!("Connecting to MQTT broker...");
    let broker = MqttBroker::connect(&config.mqtt)
        .await
        .context("Failed to connect to MQTT broker")?;
    let publisher = Publisher::new(
        broker,
        TopicBuilder::with_prefix(config.mqtt.discovery_prefix.clone()),
    );

    let mode = Mode::from_publish_flag(config.publish);
    let poller = MeterPoller::new(reader, publisher, meters, mode, config.poll_interval());

    let count = poller
        .discover()
        .await
        .context("Failed to publish discovery configs")?;
    info!(
        "Published {} discovery config(s) for {} meter(s)",
        count,
        poller.meters().len()
    );

    poller
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
                std::future::pending::<()>().await;
            }
            info!("Received shutdown signal");
        })
        .await;

    poller.into_publisher().into_broker().disconnect().await;
    info!("Power meter bridge stopped");

    Ok(())
}
