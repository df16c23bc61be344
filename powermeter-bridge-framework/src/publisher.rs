//! Discovery and state publisher.

use powermeter_common::{
    DeviceIdentity, MeasurementValue, SensorClassification, TopicBuilder, encode_discovery,
};

use crate::broker::Broker;
use crate::error::{BridgeError, Result};

/// Publisher for Home Assistant discovery configs and measurement states.
///
/// Wraps a [`Broker`] and derives every topic from the device identity and
/// the measurement name. All messages are published retained so a late
/// subscriber immediately sees the last config and value.
#[derive(Debug)]
pub struct Publisher<B> {
    broker: B,
    topics: TopicBuilder,
}

impl<B: Broker> Publisher<B> {
    /// Create a new publisher.
    pub fn new(broker: B, topics: TopicBuilder) -> Self {
        Self { broker, topics }
    }

    /// Get a reference to the broker.
    pub fn broker(&self) -> &B {
        &self.broker
    }

    /// Get the topic builder.
    pub fn topics(&self) -> &TopicBuilder {
        &self.topics
    }

    /// Consume the publisher, returning the broker.
    pub fn into_broker(self) -> B {
        self.broker
    }

    /// Publish the discovery config of one measurement.
    pub async fn publish_discovery(
        &self,
        device: &DeviceIdentity,
        measurement: &str,
        classification: &SensorClassification,
    ) -> Result<()> {
        let (topic, payload) = encode_discovery(&self.topics, device, measurement, classification)
            .map_err(|e| BridgeError::Serialization(format!("{}: {}", measurement, e)))?;

        self.broker.publish(&topic, payload, true).await?;

        tracing::debug!(topic = %topic, "Published discovery config");
        Ok(())
    }

    /// Publish the current value of one measurement to its state topic.
    pub async fn publish_value(
        &self,
        device: &DeviceIdentity,
        measurement: &str,
        value: &MeasurementValue,
    ) -> Result<()> {
        let topic = self.topics.state(&device.identifiers, measurement);

        self.broker.publish(&topic, value.to_payload(), true).await?;

        tracing::trace!(topic = %topic, value = %value, "Published state");
        Ok(())
    }

    /// Publish a batch of measurement values.
    ///
    /// Failures are logged and counted; they never stop the rest of the batch.
    pub async fn publish_values<'a, I>(&self, device: &DeviceIdentity, values: I) -> PublishStats
    where
        I: IntoIterator<Item = (&'a str, &'a MeasurementValue)>,
    {
        let mut stats = PublishStats::default();

        for (measurement, value) in values {
            match self.publish_value(device, measurement, value).await {
                Ok(()) => stats.success += 1,
                Err(e) => {
                    stats.failed += 1;
                    tracing::warn!(
                        device = %device.identifiers,
                        measurement,
                        error = %e,
                        "Failed to publish state"
                    );
                }
            }
        }

        stats
    }
}

/// Statistics from a batch publish operation.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PublishStats {
    /// Number of successfully published values.
    pub success: usize,
    /// Number of failed publishes.
    pub failed: usize,
}

impl PublishStats {
    /// Total number of attempted publishes.
    pub fn total(&self) -> usize {
        self.success + self.failed
    }

    /// Success rate as a percentage.
    pub fn success_rate(&self) -> f64 {
        if self.total() == 0 {
            100.0
        } else {
            (self.success as f64 / self.total() as f64) * 100.0
        }
    }
}
