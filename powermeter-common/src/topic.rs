use crate::error::{Error, Result};

/// Default Home Assistant discovery prefix.
pub const DISCOVERY_PREFIX: &str = "homeassistant";

/// Home Assistant entity component used for every measurement.
pub const SENSOR_COMPONENT: &str = "sensor";

/// Map a measurement name to its canonical token.
///
/// Tokens are the upper-cased name with spaces replaced by underscores. They
/// form the last level of state topics and the suffix of unique ids.
///
/// # Example
/// ```
/// use powermeter_common::topic::canonical_token;
///
/// assert_eq!(canonical_token("Total Active Power"), "TOTAL_ACTIVE_POWER");
/// ```
pub fn canonical_token(name: &str) -> String {
    name.to_uppercase().replace(' ', "_")
}

/// Build the state topic a measurement's value is published to.
///
/// # Example
/// ```
/// use powermeter_common::topic::state_topic;
///
/// assert_eq!(
///     state_topic("ha-powermeter-bridge-heat-pump", "Grid Frequency"),
///     "ha-powermeter-bridge-heat-pump/GRID_FREQUENCY"
/// );
/// ```
pub fn state_topic(identifier: &str, name: &str) -> String {
    format!("{}/{}", identifier, canonical_token(name))
}

/// Build the unique id Home Assistant uses to track a sensor entity.
///
/// # Example
/// ```
/// use powermeter_common::topic::unique_id;
///
/// assert_eq!(unique_id("meter", "L1 Voltage"), "meter_L1_VOLTAGE");
/// ```
pub fn unique_id(identifier: &str, name: &str) -> String {
    format!("{}_{}", identifier, canonical_token(name))
}

/// Check that a string can be used as a single MQTT topic level.
///
/// Rejects empty strings, level separators and wildcards.
pub fn validate_topic_level(level: &str) -> Result<()> {
    if level.is_empty() {
        return Err(Error::Topic("topic level cannot be empty".to_string()));
    }

    if let Some(c) = level.chars().find(|c| matches!(c, '/' | '+' | '#' | '\0')) {
        return Err(Error::Topic(format!(
            "'{}' contains reserved character {:?}",
            level, c
        )));
    }

    Ok(())
}

/// Builder for Home Assistant discovery topics.
///
/// Discovery topics follow the pattern:
/// `<prefix>/sensor/<identifier>/<TOKEN>/config`
#[derive(Debug, Clone)]
pub struct TopicBuilder {
    prefix: String,
}

impl Default for TopicBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TopicBuilder {
    /// Create a builder using the default `homeassistant` prefix.
    pub fn new() -> Self {
        Self {
            prefix: DISCOVERY_PREFIX.to_string(),
        }
    }

    /// Create a builder with a custom discovery prefix.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Get the discovery prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Build the discovery config topic for a measurement.
    ///
    /// # Example
    /// ```
    /// use powermeter_common::topic::TopicBuilder;
    ///
    /// let builder = TopicBuilder::new();
    /// assert_eq!(
    ///     builder.discovery("meter", "Total Active Energy"),
    ///     "homeassistant/sensor/meter/TOTAL_ACTIVE_ENERGY/config"
    /// );
    /// ```
    pub fn discovery(&self, identifier: &str, name: &str) -> String {
        format!(
            "{}/{}/{}/{}/config",
            self.prefix,
            SENSOR_COMPONENT,
            identifier,
            canonical_token(name)
        )
    }

    /// Build the state topic for a measurement.
    ///
    /// State topics are not prefixed; they live under the device identifier.
    pub fn state(&self, identifier: &str, name: &str) -> String {
        state_topic(identifier, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_token() {
        assert_eq!(canonical_token("Total Active Power"), "TOTAL_ACTIVE_POWER");
        assert_eq!(canonical_token("Total Active Energy"), "TOTAL_ACTIVE_ENERGY");
        assert_eq!(canonical_token("T1 Total Active energy"), "T1_TOTAL_ACTIVE_ENERGY");
        assert_eq!(canonical_token("Voltage"), "VOLTAGE");
    }

    #[test]
    fn test_state_topic_is_deterministic() {
        for _ in 0..3 {
            assert_eq!(
                state_topic("ha-powermeter-bridge-heat-pump", "Grid Frequency"),
                "ha-powermeter-bridge-heat-pump/GRID_FREQUENCY"
            );
        }
    }

    #[test]
    fn test_topic_builder() {
        let builder = TopicBuilder::new();

        assert_eq!(
            builder.discovery("ha-powermeter-bridge", "L1 Voltage"),
            "homeassistant/sensor/ha-powermeter-bridge/L1_VOLTAGE/config"
        );
        assert_eq!(
            builder.state("ha-powermeter-bridge", "L1 Voltage"),
            "ha-powermeter-bridge/L1_VOLTAGE"
        );

        let custom = TopicBuilder::with_prefix("ha");
        assert_eq!(custom.prefix(), "ha");
        assert_eq!(
            custom.discovery("meter", "Voltage"),
            "ha/sensor/meter/VOLTAGE/config"
        );
    }

    #[test]
    fn test_unique_id() {
        assert_eq!(
            unique_id("ha-powermeter-bridge", "Total Active Power"),
            "ha-powermeter-bridge_TOTAL_ACTIVE_POWER"
        );
    }

    #[test]
    fn test_validate_topic_level() {
        assert!(validate_topic_level("ha-powermeter-bridge").is_ok());
        assert!(validate_topic_level("meter_01.local").is_ok());

        assert!(validate_topic_level("").is_err());
        assert!(validate_topic_level("a/b").is_err());
        assert!(validate_topic_level("meter+").is_err());
        assert!(validate_topic_level("#").is_err());
    }
}
