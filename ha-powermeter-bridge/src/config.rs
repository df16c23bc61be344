//! Configuration for the power meter bridge.

use std::collections::HashSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use powermeter_bridge_framework::{
    BridgeConfig, BridgeError, DeviceIdentity, LoggingConfig, MqttConfig, Result,
};
use powermeter_common::topic::validate_topic_level;

use crate::catalog::MeterModel;

/// Manufacturer reported to Home Assistant when none is configured.
pub const DEFAULT_MANUFACTURER: &str = "ha-powermeter-bridge";

/// Complete bridge configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PowerMeterBridgeConfig {
    /// MQTT broker settings
    #[serde(default)]
    pub mqtt: MqttConfig,

    /// Serial bus settings
    #[serde(default)]
    pub bus: BusConfig,

    /// Delay between poll cycles in milliseconds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Publish readings to MQTT (otherwise they are only logged)
    #[serde(default)]
    pub publish: bool,

    /// Meters on the bus
    pub meters: Vec<MeterConfig>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

fn default_poll_interval_ms() -> u64 {
    1000
}

/// Modbus RTU serial line configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BusConfig {
    /// Serial port path (e.g., "/dev/ttyUSB0" or "COM1")
    #[serde(default = "default_port")]
    pub port: String,
    /// Baud rate (default: 9600)
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    /// Data bits (default: 8)
    #[serde(default = "default_data_bits")]
    pub data_bits: u8,
    /// Parity: "none", "even", or "odd" (default: "even")
    #[serde(default = "default_parity")]
    pub parity: String,
    /// Stop bits: 1 or 2 (default: 1)
    #[serde(default = "default_stop_bits")]
    pub stop_bits: u8,
    /// Response timeout per read in milliseconds
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl BusConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            baud_rate: default_baud_rate(),
            data_bits: default_data_bits(),
            parity: default_parity(),
            stop_bits: default_stop_bits(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

fn default_port() -> String {
    "/dev/ttyUSB0".to_string()
}

fn default_baud_rate() -> u32 {
    9600
}

fn default_data_bits() -> u8 {
    8
}

fn default_parity() -> String {
    "even".to_string()
}

fn default_stop_bits() -> u8 {
    1
}

fn default_timeout_ms() -> u64 {
    500
}

/// Configuration for a single meter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeterConfig {
    /// Meter name, used as the root of its MQTT topics
    pub name: String,

    /// Modbus unit/slave ID (1-247)
    #[serde(default = "default_unit_id")]
    pub unit_id: u8,

    /// Meter model
    pub model: MeterModel,

    /// Device name shown in Home Assistant (default: `name`)
    #[serde(default)]
    pub display_name: Option<String>,

    /// Manufacturer shown in Home Assistant
    #[serde(default)]
    pub manufacturer: Option<String>,
}

fn default_unit_id() -> u8 {
    1
}

impl MeterConfig {
    /// Home Assistant identity of this meter.
    pub fn identity(&self) -> DeviceIdentity {
        DeviceIdentity::new(
            self.manufacturer
                .clone()
                .unwrap_or_else(|| DEFAULT_MANUFACTURER.to_string()),
            self.model.label(),
            self.display_name.clone().unwrap_or_else(|| self.name.clone()),
            self.name.clone(),
        )
    }
}

/// Command-line values that take precedence over the configuration file.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub serial_port: Option<String>,
    pub publish: bool,
    pub poll_interval_ms: Option<u64>,
}

impl PowerMeterBridgeConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Apply command-line overrides and validate the result.
    pub fn apply_overrides(&mut self, overrides: &Overrides) -> Result<()> {
        if let Some(port) = &overrides.serial_port {
            self.bus.port = port.clone();
        }
        if overrides.publish {
            self.publish = true;
        }
        if let Some(interval_ms) = overrides.poll_interval_ms {
            self.poll_interval_ms = interval_ms;
        }
        self.validate()
    }
}

impl BridgeConfig for PowerMeterBridgeConfig {
    fn mqtt(&self) -> &MqttConfig {
        &self.mqtt
    }

    fn logging(&self) -> &LoggingConfig {
        &self.logging
    }

    fn validate(&self) -> Result<()> {
        if self.meters.is_empty() {
            return Err(BridgeError::validation(
                "At least one meter must be configured",
            ));
        }

        if self.poll_interval_ms == 0 {
            return Err(BridgeError::validation("poll_interval_ms must be non-zero"));
        }

        validate_topic_level(&self.mqtt.discovery_prefix).map_err(|e| {
            BridgeError::validation(format!("Invalid discovery_prefix: {}", e))
        })?;

        self.bus.validate()?;

        let mut names = HashSet::new();
        let mut units = HashSet::new();

        for meter in &self.meters {
            validate_topic_level(&meter.name)
                .map_err(|e| BridgeError::validation(format!("Invalid meter name: {}", e)))?;

            if !names.insert(meter.name.as_str()) {
                return Err(BridgeError::validation(format!(
                    "Duplicate meter name '{}'",
                    meter.name
                )));
            }

            if !(1..=247).contains(&meter.unit_id) {
                return Err(BridgeError::validation(format!(
                    "Meter '{}': unit_id must be 1-247",
                    meter.name
                )));
            }

            if !units.insert(meter.unit_id) {
                return Err(BridgeError::validation(format!(
                    "Meter '{}': unit_id {} is already used on this bus",
                    meter.name, meter.unit_id
                )));
            }
        }

        Ok(())
    }
}

impl BusConfig {
    fn validate(&self) -> Result<()> {
        if self.port.is_empty() {
            return Err(BridgeError::validation("Serial port cannot be empty"));
        }

        match self.parity.to_lowercase().as_str() {
            "none" | "even" | "odd" => {}
            _ => {
                return Err(BridgeError::validation(format!(
                    "Invalid parity '{}' (use none, even, or odd)",
                    self.parity
                )));
            }
        }

        if !(5..=8).contains(&self.data_bits) {
            return Err(BridgeError::validation(format!(
                "Invalid data_bits {} (use 5-8)",
                self.data_bits
            )));
        }

        if !matches!(self.stop_bits, 1 | 2) {
            return Err(BridgeError::validation(format!(
                "Invalid stop_bits {} (use 1 or 2)",
                self.stop_bits
            )));
        }

        if self.baud_rate == 0 || self.timeout_ms == 0 {
            return Err(BridgeError::validation(
                "baud_rate and timeout_ms must be non-zero",
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let json = r#"{
            mqtt: {
                host: "10.0.10.10",
                port: 1883,
                username: "panasonic",
                password: "panasonic",
            },
            bus: { port: "/dev/ttyUSB1", baud_rate: 19200, parity: "none" },
            poll_interval_ms: 2000,
            publish: true,
            meters: [
                { name: "ha-powermeter-bridge", unit_id: 2, model: "or-we-517" },
                { name: "ha-powermeter-bridge-heat-pump", unit_id: 1, model: "or-we-514" },
            ],
            logging: { level: "debug", format: "json" },
        }"#;

        let config = PowerMeterBridgeConfig::parse(json).unwrap();

        assert_eq!(config.mqtt.host, "10.0.10.10");
        assert_eq!(config.mqtt.username.as_deref(), Some("panasonic"));
        assert_eq!(config.bus.port, "/dev/ttyUSB1");
        assert_eq!(config.bus.baud_rate, 19200);
        assert_eq!(config.bus.data_bits, 8);
        assert_eq!(config.poll_interval(), Duration::from_secs(2));
        assert!(config.publish);
        assert_eq!(config.meters.len(), 2);
        assert_eq!(config.meters[0].model, MeterModel::OrWe517);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_defaults() {
        let json = r#"{
            meters: [ { name: "meter", model: "or-we-514" } ]
        }"#;

        let config = PowerMeterBridgeConfig::parse(json).unwrap();

        assert_eq!(config.mqtt.host, "localhost");
        assert_eq!(config.mqtt.keep_alive_secs, 5);
        assert_eq!(config.bus.port, "/dev/ttyUSB0");
        assert_eq!(config.bus.baud_rate, 9600);
        assert_eq!(config.bus.parity, "even");
        assert_eq!(config.bus.stop_bits, 1);
        assert_eq!(config.bus.timeout(), Duration::from_millis(500));
        assert_eq!(config.poll_interval_ms, 1000);
        assert!(!config.publish);
        assert_eq!(config.meters[0].unit_id, 1);
    }

    #[test]
    fn test_identity_defaults() {
        let meter: MeterConfig =
            json5::from_str(r#"{ name: "heat-pump", unit_id: 1, model: "or-we-514" }"#).unwrap();
        let identity = meter.identity();

        assert_eq!(identity.identifiers, "heat-pump");
        assert_eq!(identity.name, "heat-pump");
        assert_eq!(identity.model, "OR-WE-514");
        assert_eq!(identity.manufacturer, DEFAULT_MANUFACTURER);
    }

    #[test]
    fn test_identity_overrides() {
        let meter: MeterConfig = json5::from_str(
            r#"{
                name: "main",
                model: "or-we-517",
                display_name: "Main meter",
                manufacturer: "Orno",
            }"#,
        )
        .unwrap();
        let identity = meter.identity();

        assert_eq!(identity.identifiers, "main");
        assert_eq!(identity.name, "Main meter");
        assert_eq!(identity.manufacturer, "Orno");
    }

    #[test]
    fn test_validate_empty_meters() {
        let result = PowerMeterBridgeConfig::parse("{ meters: [] }");
        assert!(matches!(result, Err(BridgeError::ConfigValidation(_))));
    }

    #[test]
    fn test_validate_duplicate_names() {
        let json = r#"{
            meters: [
                { name: "meter", unit_id: 1, model: "or-we-514" },
                { name: "meter", unit_id: 2, model: "or-we-517" },
            ]
        }"#;
        assert!(PowerMeterBridgeConfig::parse(json).is_err());
    }

    #[test]
    fn test_validate_duplicate_unit_ids() {
        let json = r#"{
            meters: [
                { name: "a", unit_id: 3, model: "or-we-514" },
                { name: "b", unit_id: 3, model: "or-we-517" },
            ]
        }"#;
        assert!(PowerMeterBridgeConfig::parse(json).is_err());
    }

    #[test]
    fn test_validate_unit_id_range() {
        for unit_id in [0, 248] {
            let json = format!(
                r#"{{ meters: [ {{ name: "meter", unit_id: {}, model: "or-we-514" }} ] }}"#,
                unit_id
            );
            assert!(PowerMeterBridgeConfig::parse(&json).is_err(), "unit_id {}", unit_id);
        }
    }

    #[test]
    fn test_validate_topic_unsafe_name() {
        for name in ["", "a/b", "a+b", "a#"] {
            let json = format!(
                r#"{{ meters: [ {{ name: "{}", model: "or-we-514" }} ] }}"#,
                name
            );
            assert!(PowerMeterBridgeConfig::parse(&json).is_err(), "name {:?}", name);
        }
    }

    #[test]
    fn test_validate_parity() {
        let json = r#"{
            bus: { parity: "mark" },
            meters: [ { name: "meter", model: "or-we-514" } ]
        }"#;
        assert!(PowerMeterBridgeConfig::parse(json).is_err());
    }

    #[test]
    fn test_validate_zero_interval() {
        let json = r#"{
            poll_interval_ms: 0,
            meters: [ { name: "meter", model: "or-we-514" } ]
        }"#;
        assert!(PowerMeterBridgeConfig::parse(json).is_err());
    }

    #[test]
    fn test_overrides_are_validated() {
        let json = r#"{ meters: [ { name: "meter", model: "or-we-514" } ] }"#;
        let mut config = PowerMeterBridgeConfig::parse(json).unwrap();

        let result = config.apply_overrides(&Overrides {
            serial_port: Some(String::new()),
            ..Overrides::default()
        });
        assert!(matches!(result, Err(BridgeError::ConfigValidation(_))));

        let mut config = PowerMeterBridgeConfig::parse(json).unwrap();
        let result = config.apply_overrides(&Overrides {
            poll_interval_ms: Some(0),
            ..Overrides::default()
        });
        assert!(matches!(result, Err(BridgeError::ConfigValidation(_))));
    }

    #[test]
    fn test_overrides_applied() {
        let json = r#"{ meters: [ { name: "meter", model: "or-we-514" } ] }"#;
        let mut config = PowerMeterBridgeConfig::parse(json).unwrap();

        config
            .apply_overrides(&Overrides {
                serial_port: Some("/dev/ttyUSB1".to_string()),
                publish: true,
                poll_interval_ms: Some(250),
            })
            .unwrap();

        assert_eq!(config.bus.port, "/dev/ttyUSB1");
        assert!(config.publish);
        assert_eq!(config.poll_interval(), Duration::from_millis(250));
    }

    #[test]
    fn test_unknown_model_rejected() {
        let json = r#"{ meters: [ { name: "meter", model: "or-we-999" } ] }"#;
        assert!(matches!(
            PowerMeterBridgeConfig::parse(json),
            Err(BridgeError::ConfigParse(_))
        ));
    }
}
