//! Home Assistant MQTT discovery model.
//!
//! A [`DiscoveryMessage`] tells Home Assistant how to present one measurement
//! as a sensor entity. It is derived from a [`DeviceIdentity`], a measurement
//! name and a [`SensorClassification`], then serialized and published retained
//! to the discovery topic built by [`TopicBuilder`].

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::topic::{TopicBuilder, state_topic, unique_id};

/// Identity of one physical meter.
///
/// `identifiers` is the namespace root for every topic the meter produces and
/// groups all of its sensors under a single Home Assistant device.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceIdentity {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub manufacturer: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub model: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub identifiers: String,
}

impl DeviceIdentity {
    pub fn new(
        manufacturer: impl Into<String>,
        model: impl Into<String>,
        name: impl Into<String>,
        identifiers: impl Into<String>,
    ) -> Self {
        Self {
            manufacturer: manufacturer.into(),
            model: model.into(),
            name: name.into(),
            identifiers: identifiers.into(),
        }
    }

    /// State topic of one of this device's measurements.
    pub fn state_topic(&self, measurement: &str) -> String {
        state_topic(&self.identifiers, measurement)
    }
}

/// How Home Assistant aggregates a measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateClass {
    /// Instantaneous reading.
    Measurement,
    /// Monotonically accumulating total.
    Total,
}

impl StateClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            StateClass::Measurement => "measurement",
            StateClass::Total => "total",
        }
    }
}

impl std::fmt::Display for StateClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Sensor metadata attached to an exposed measurement.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SensorClassification {
    pub state_class: StateClass,
    pub unit: String,
}

impl SensorClassification {
    /// An instantaneous reading in `unit`.
    pub fn measurement(unit: impl Into<String>) -> Self {
        Self {
            state_class: StateClass::Measurement,
            unit: unit.into(),
        }
    }

    /// An accumulating total in `unit`.
    pub fn total(unit: impl Into<String>) -> Self {
        Self {
            state_class: StateClass::Total,
            unit: unit.into(),
        }
    }

    /// Device class hint derived from the unit.
    pub fn device_class(&self) -> Option<&'static str> {
        device_class_for_unit(&self.unit)
    }
}

/// Map a unit of measurement to a Home Assistant device class.
///
/// Advisory metadata only; unknown units have no device class.
pub fn device_class_for_unit(unit: &str) -> Option<&'static str> {
    match unit {
        "W" | "kW" => Some("power"),
        "Wh" | "kWh" => Some("energy"),
        "A" => Some("current"),
        _ => None,
    }
}

/// Discovery config payload for one sensor entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryMessage {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    pub state_topic: String,
    pub state_class: StateClass,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub unit_of_measurement: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub device_class: Option<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub unique_id: String,
    pub device: DeviceIdentity,
}

impl DiscoveryMessage {
    /// Derive the discovery message for one measurement of a device.
    pub fn new(
        device: &DeviceIdentity,
        measurement: &str,
        classification: &SensorClassification,
    ) -> Self {
        Self {
            name: measurement.to_string(),
            state_topic: device.state_topic(measurement),
            state_class: classification.state_class,
            unit_of_measurement: classification.unit.clone(),
            device_class: classification.device_class().map(str::to_string),
            unique_id: unique_id(&device.identifiers, measurement),
            device: device.clone(),
        }
    }
}

/// Encode a measurement's discovery message.
///
/// Returns the discovery topic and the JSON payload.
pub fn encode_discovery(
    topics: &TopicBuilder,
    device: &DeviceIdentity,
    measurement: &str,
    classification: &SensorClassification,
) -> Result<(String, Vec<u8>)> {
    let topic = topics.discovery(&device.identifiers, measurement);
    let message = DiscoveryMessage::new(device, measurement, classification);
    let payload = serde_json::to_vec(&message)?;

    Ok((topic, payload))
}
