//! Power meter bridge framework
//!
//! Plumbing shared by bridges that republish meter readings to an MQTT broker
//! for Home Assistant.
//!
//! # Overview
//!
//! This framework provides:
//! - [`BridgeConfig`] trait for configuration loading and validation
//! - [`Broker`] trait for the publish side of a message broker, with the
//!   [`MqttBroker`] implementation and an in-memory [`MemoryBroker`]
//! - [`Publisher`] for discovery and state publishing with retained delivery
//! - [`BridgeArgs`] for common CLI argument parsing
//!
//! # Example
//!
//! ```ignore
//! use powermeter_bridge_framework::{BridgeConfig, MqttBroker, Publisher};
//!
//! let config = MyBridgeConfig::load("powermeter.json5")?;
//! let broker = MqttBroker::connect(config.mqtt()).await?;
//! let topics = TopicBuilder::with_prefix(&config.mqtt().discovery_prefix);
//! let publisher = Publisher::new(broker, topics);
//!
//! publisher.publish_discovery(&device, "Voltage", &classification).await?;
//! publisher.publish_value(&device, "Voltage", &value).await?;
//! ```

mod args;
mod broker;
mod config;
mod error;
mod mqtt;
mod publisher;

pub use args::BridgeArgs;
pub use broker::{Broker, MemoryBroker, PublishedMessage};
pub use config::BridgeConfig;
pub use error::{BridgeError, Result};
pub use mqtt::MqttBroker;
pub use publisher::{PublishStats, Publisher};

// Re-export commonly used types from powermeter-common
pub use powermeter_common::{
    DeviceIdentity, LoggingConfig, MeasurementValue, MqttConfig, SensorClassification,
    TopicBuilder,
};
