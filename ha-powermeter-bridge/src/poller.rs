//! Meter polling loop.
//!
//! Each cycle reads every configured meter in turn through the shared bus and
//! either logs the readings or publishes them to their state topics.

use std::future::Future;
use std::time::Duration;

use powermeter_bridge_framework::{Broker, BridgeError, PublishStats, Publisher};

use crate::meter::PowerMeter;
use crate::reader::{BusReader, RegisterTransport};

/// What a poll cycle does with its readings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Log readings without publishing them.
    PollOnly,
    /// Publish exposed readings to their state topics.
    Publish,
}

impl Mode {
    pub fn from_publish_flag(publish: bool) -> Self {
        if publish { Mode::Publish } else { Mode::PollOnly }
    }
}

/// Error type for polling operations.
#[derive(Debug, thiserror::Error)]
pub enum PollerError {
    #[error("discovery of '{measurement}' for meter '{meter}' failed: {source}")]
    Discovery {
        meter: String,
        measurement: &'static str,
        #[source]
        source: BridgeError,
    },
}

/// Outcome of one poll cycle across all meters.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CycleStats {
    /// Measurements read and decoded.
    pub read: usize,
    /// Measurements skipped after a read error.
    pub skipped: usize,
    /// State publishes, all zero in poll-only mode.
    pub published: PublishStats,
}

/// Polls a set of meters sharing one bus.
#[derive(Debug)]
pub struct MeterPoller<T, B> {
    reader: BusReader<T>,
    publisher: Publisher<B>,
    meters: Vec<PowerMeter>,
    mode: Mode,
    interval: Duration,
}

impl<T: RegisterTransport, B: Broker> MeterPoller<T, B> {
    pub fn new(
        reader: BusReader<T>,
        publisher: Publisher<B>,
        meters: Vec<PowerMeter>,
        mode: Mode,
        interval: Duration,
    ) -> Self {
        Self {
            reader,
            publisher,
            meters,
            mode,
            interval,
        }
    }

    pub fn meters(&self) -> &[PowerMeter] {
        &self.meters
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn publisher(&self) -> &Publisher<B> {
        &self.publisher
    }

    /// Consume the poller, returning the publisher.
    pub fn into_publisher(self) -> Publisher<B> {
        self.publisher
    }

    /// Publish the discovery config of every exposed measurement of every meter.
    ///
    /// Stops at the first failure. Returns the number of configs published.
    pub async fn discover(&self) -> Result<usize, PollerError> {
        let mut count = 0;

        for meter in &self.meters {
            for (entry, sensor) in meter.catalog().exposed() {
                self.publisher
                    .publish_discovery(meter.identity(), entry.name, sensor)
                    .await
                    .map_err(|source| PollerError::Discovery {
                        meter: meter.name().to_string(),
                        measurement: entry.name,
                        source,
                    })?;
                count += 1;
            }

            tracing::info!(
                meter = %meter.name(),
                model = %meter.identity().model,
                unit_id = meter.unit_id(),
                "Published discovery configs"
            );
        }

        Ok(count)
    }

    /// Run one poll cycle over every meter.
    pub async fn poll_once(&self) -> CycleStats {
        let mut stats = CycleStats::default();

        for meter in &self.meters {
            let readings = self.reader.read_all(meter).await;
            stats.read += readings.len();
            stats.skipped += meter.catalog().len() - readings.len();

            match self.mode {
                Mode::PollOnly => {
                    for reading in readings.iter() {
                        tracing::info!(
                            meter = %meter.name(),
                            measurement = reading.name,
                            value = %reading.value,
                            "Reading"
                        );
                    }
                }
                Mode::Publish => {
                    let published = self
                        .publisher
                        .publish_values(meter.identity(), readings.exposed())
                        .await;
                    stats.published.success += published.success;
                    stats.published.failed += published.failed;
                }
            }
        }

        stats
    }

    /// Poll until `shutdown` completes.
    ///
    /// Shutdown is observed between cycles, so a cycle in progress always
    /// finishes.
    pub async fn run(&self, shutdown: impl Future<Output = ()>) {
        tracing::info!(
            meters = self.meters.len(),
            mode = ?self.mode,
            interval_ms = self.interval.as_millis() as u64,
            "Starting poll loop"
        );

        tokio::pin!(shutdown);

        loop {
            let stats = self.poll_once().await;
            tracing::debug!(
                read = stats.read,
                skipped = stats.skipped,
                published = stats.published.success,
                publish_failed = stats.published.failed,
                publish_success_rate = stats.published.success_rate(),
                "Poll cycle complete"
            );

            tokio::select! {
                _ = &mut shutdown => break,
                _ = tokio::time::sleep(self.interval) => {}
            }
        }

        tracing::info!("Poll loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use powermeter_bridge_framework::{MemoryBroker, TopicBuilder};

    use crate::catalog::MeterModel;
    use crate::config::MeterConfig;
    use crate::meter::Catalogs;
    use crate::reader::{SharedBus, TransportError};

    /// Transport returning the same register bytes for every read.
    struct ConstantTransport;

    impl RegisterTransport for ConstantTransport {
        async fn read_holding_registers(
            &mut self,
            _unit: u8,
            _address: u16,
            words: u16,
        ) -> Result<Vec<u8>, TransportError> {
            // 0x4248 0x0000 is 50.0 as f32, 0x4248 is 169.68 at /100
            Ok([0x42, 0x48, 0x00, 0x00]
                .into_iter()
                .take(usize::from(words) * 2)
                .collect())
        }
    }

    fn meter(name: &str, unit_id: u8, model: MeterModel) -> PowerMeter {
        let config = MeterConfig {
            name: name.to_string(),
            unit_id,
            model,
            display_name: None,
            manufacturer: None,
        };
        PowerMeter::from_config(&config, &Catalogs::new())
    }

    fn poller(mode: Mode, meters: Vec<PowerMeter>) -> MeterPoller<ConstantTransport, MemoryBroker> {
        MeterPoller::new(
            BusReader::new(SharedBus::new(ConstantTransport)),
            Publisher::new(MemoryBroker::new(), TopicBuilder::new()),
            meters,
            mode,
            Duration::from_millis(10),
        )
    }

    #[tokio::test]
    async fn test_discover_all_meters() {
        let poller = poller(
            Mode::Publish,
            vec![
                meter("main", 2, MeterModel::OrWe517),
                meter("heat-pump", 1, MeterModel::OrWe514),
            ],
        );

        let count = poller.discover().await.unwrap();
        assert_eq!(count, 71 + 9);

        let broker = poller.publisher().broker();
        assert!(
            broker
                .last("homeassistant/sensor/heat-pump/GRID_FREQUENCY/config")
                .is_some()
        );
        assert!(
            broker
                .last("homeassistant/sensor/main/L1_VOLTAGE/config")
                .is_some()
        );
    }

    #[tokio::test]
    async fn test_discover_failure_is_fatal() {
        let poller = poller(Mode::Publish, vec![meter("heat-pump", 1, MeterModel::OrWe514)]);
        poller
            .publisher()
            .broker()
            .fail_topic("homeassistant/sensor/heat-pump/VOLTAGE/config");

        let err = poller.discover().await.unwrap_err();
        let PollerError::Discovery {
            meter, measurement, ..
        } = err;
        assert_eq!(meter, "heat-pump");
        assert_eq!(measurement, "Voltage");
    }

    #[tokio::test]
    async fn test_poll_once_publishes_exposed_readings() {
        let poller = poller(Mode::Publish, vec![meter("heat-pump", 1, MeterModel::OrWe514)]);

        let stats = poller.poll_once().await;

        assert_eq!(stats.read, 9);
        assert_eq!(stats.skipped, 0);
        assert_eq!(stats.published.success, 9);

        let message = poller
            .publisher()
            .broker()
            .last("heat-pump/GRID_FREQUENCY")
            .unwrap();
        assert_eq!(message.payload_str(), "169.68");
        assert!(message.retain);
    }

    #[tokio::test]
    async fn test_poll_only_publishes_nothing() {
        let poller = poller(Mode::PollOnly, vec![meter("main", 2, MeterModel::OrWe517)]);

        let stats = poller.poll_once().await;

        assert_eq!(stats.read, 71);
        assert_eq!(stats.published, PublishStats::default());
        assert!(poller.publisher().broker().messages().is_empty());
    }

    #[tokio::test]
    async fn test_run_stops_on_shutdown() {
        let poller = poller(Mode::Publish, vec![meter("heat-pump", 1, MeterModel::OrWe514)]);

        poller
            .run(tokio::time::sleep(Duration::from_millis(35)))
            .await;

        // at least the first cycle ran before shutdown was observed
        let published = poller.publisher().broker().messages().len();
        assert!(published >= 9);
        assert_eq!(published % 9, 0);
    }

    #[test]
    fn test_mode_from_flag() {
        assert_eq!(Mode::from_publish_flag(true), Mode::Publish);
        assert_eq!(Mode::from_publish_flag(false), Mode::PollOnly);
    }
}
