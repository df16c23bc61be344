//! Power meter bridge common library
//!
//! This crate provides shared types and utilities for the Home Assistant power meter bridge:
//!
//! - [`value`] - Decoded measurement value (`MeasurementValue`)
//! - [`discovery`] - Home Assistant discovery model (`DeviceIdentity`, `DiscoveryMessage`)
//! - [`topic`] - MQTT topic builders (state, discovery, unique id)
//! - [`config`] - MQTT and logging configuration types
//! - [`error`] - Error types

pub mod config;
pub mod discovery;
pub mod error;
pub mod topic;
pub mod value;

// Re-export commonly used types at the crate root
pub use config::{LogFormat, LoggingConfig, MqttConfig};
pub use discovery::{
    DeviceIdentity, DiscoveryMessage, SensorClassification, StateClass, device_class_for_unit,
    encode_discovery,
};
pub use error::{Error, Result};
pub use topic::{DISCOVERY_PREFIX, TopicBuilder, canonical_token, state_topic};
pub use value::MeasurementValue;

/// Initialize tracing with the given configuration.
///
/// Supports two output formats:
/// - `LogFormat::Text` (default): Human-readable text format
/// - `LogFormat::Json`: Structured JSON format for log aggregation systems
///
/// `RUST_LOG` takes precedence over the configured level when set.
///
/// # Example
///
/// ```ignore
/// use powermeter_common::{LoggingConfig, LogFormat, init_tracing};
///
/// let config = LoggingConfig {
///     level: "info".to_string(),
///     format: LogFormat::Json,
/// };
/// init_tracing(&config)?;
/// ```
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    match config.format {
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(fmt::layer())
                .with(filter)
                .try_init()
                .map_err(|e| Error::Config(format!("Failed to initialize tracing: {}", e)))?;
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(fmt::layer().json())
                .with(filter)
                .try_init()
                .map_err(|e| Error::Config(format!("Failed to initialize tracing: {}", e)))?;
        }
    }

    Ok(())
}
