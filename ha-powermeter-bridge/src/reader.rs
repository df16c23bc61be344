//! Serialized register reads over a shared bus.
//!
//! A half-duplex RTU line carries one request at a time. Every meter reads
//! through a [`BusReader`] holding the same [`SharedBus`], whose lock is held
//! for exactly one transport call.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Mutex;

use powermeter_common::MeasurementValue;

use crate::catalog::{CatalogEntry, RegisterDescriptor};
use crate::meter::PowerMeter;

/// Errors reported by a register transport.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("no response within {0:?}")]
    Timeout(Duration),
    #[error("I/O error: {0}")]
    Io(String),
    #[error("device exception: {0}")]
    Exception(String),
}

/// Errors reading one measurement.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReadError {
    #[error("read of register {address:#06x} failed: {source}")]
    Transport {
        address: u16,
        #[source]
        source: TransportError,
    },
    #[error("register {address:#06x} returned no data")]
    EmptyResponse { address: u16 },
    #[error("register {address:#06x} returned {actual} bytes, expected {expected}")]
    ShortResponse {
        address: u16,
        expected: usize,
        actual: usize,
    },
}

/// A transport that can read holding registers from a unit on the bus.
///
/// Returned bytes are the register contents in wire order, two bytes per
/// register, high byte first.
pub trait RegisterTransport: Send {
    fn read_holding_registers(
        &mut self,
        unit: u8,
        address: u16,
        words: u16,
    ) -> impl Future<Output = Result<Vec<u8>, TransportError>> + Send;

    /// Bring the line back to a known state after a timed-out request, so
    /// a late reply cannot be taken as the answer to the next one.
    fn reset(&mut self) -> impl Future<Output = Result<(), TransportError>> + Send {
        async { Ok(()) }
    }
}

/// Shared handle to the single transport of a bus.
#[derive(Debug)]
pub struct SharedBus<T> {
    transport: Arc<Mutex<T>>,
}

impl<T> SharedBus<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport: Arc::new(Mutex::new(transport)),
        }
    }
}

impl<T> Clone for SharedBus<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
        }
    }
}

/// Reads and decodes catalog entries through a [`SharedBus`].
#[derive(Debug)]
pub struct BusReader<T> {
    bus: SharedBus<T>,
}

impl<T> Clone for BusReader<T> {
    fn clone(&self) -> Self {
        Self {
            bus: self.bus.clone(),
        }
    }
}

impl<T: RegisterTransport> BusReader<T> {
    pub fn new(bus: SharedBus<T>) -> Self {
        Self { bus }
    }

    /// Read and decode one register range from `unit`.
    ///
    /// Issues exactly one transport call while holding the bus lock.
    pub async fn read_one(
        &self,
        unit: u8,
        register: &RegisterDescriptor,
    ) -> Result<MeasurementValue, ReadError> {
        let address = register.address;

        let bytes = {
            let mut transport = self.bus.transport.lock().await;
            let result = transport
                .read_holding_registers(unit, address, register.words)
                .await;

            if let Err(TransportError::Timeout(_)) = result {
                if let Err(e) = transport.reset().await {
                    tracing::warn!(error = %e, "Failed to reset bus after timeout");
                }
            }

            result.map_err(|source| ReadError::Transport { address, source })?
        };

        if bytes.is_empty() {
            return Err(ReadError::EmptyResponse { address });
        }

        let expected = register.byte_len();
        if bytes.len() != expected {
            return Err(ReadError::ShortResponse {
                address,
                expected,
                actual: bytes.len(),
            });
        }

        Ok(register.decoder.decode(&bytes))
    }

    /// Read every catalog entry of a meter in catalog order.
    ///
    /// Failed entries are logged and left out of the result.
    pub async fn read_all(&self, meter: &PowerMeter) -> Readings {
        let mut readings = Readings::with_capacity(meter.catalog().len());

        for entry in meter.catalog().entries() {
            match self.read_one(meter.unit_id(), &entry.register).await {
                Ok(value) => readings.push(entry, value),
                Err(e) => {
                    tracing::warn!(
                        meter = %meter.name(),
                        measurement = entry.name,
                        address = entry.register.address,
                        error = %e,
                        "Skipping measurement"
                    );
                }
            }
        }

        readings
    }
}

/// One successfully decoded measurement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Reading {
    pub name: &'static str,
    pub value: MeasurementValue,
    /// Whether the measurement is exposed to Home Assistant.
    pub exposed: bool,
}

/// Decoded measurements of one meter, in catalog order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Readings {
    readings: Vec<Reading>,
}

impl Readings {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            readings: Vec::with_capacity(capacity),
        }
    }

    fn push(&mut self, entry: &CatalogEntry, value: MeasurementValue) {
        self.readings.push(Reading {
            name: entry.name,
            value,
            exposed: entry.sensor.is_some(),
        });
    }

    pub fn iter(&self) -> impl Iterator<Item = &Reading> {
        self.readings.iter()
    }

    /// Name/value pairs of the readings exposed to Home Assistant.
    pub fn exposed(&self) -> impl Iterator<Item = (&str, &MeasurementValue)> {
        self.readings
            .iter()
            .filter(|reading| reading.exposed)
            .map(|reading| (reading.name, &reading.value))
    }

    pub fn get(&self, name: &str) -> Option<&MeasurementValue> {
        self.readings
            .iter()
            .find(|reading| reading.name == name)
            .map(|reading| &reading.value)
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.readings.iter().map(|reading| reading.name).collect()
    }

    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use powermeter_common::DeviceIdentity;

    use crate::catalog::Catalog;
    use crate::decode::Decoder;

    /// Transport answering from a fixed register map.
    struct MapTransport {
        responses: HashMap<u16, Result<Vec<u8>, TransportError>>,
        calls: Vec<(u8, u16, u16)>,
        resets: usize,
    }

    impl RegisterTransport for MapTransport {
        async fn read_holding_registers(
            &mut self,
            unit: u8,
            address: u16,
            words: u16,
        ) -> Result<Vec<u8>, TransportError> {
            self.calls.push((unit, address, words));
            self.responses
                .get(&address)
                .cloned()
                .unwrap_or_else(|| Err(TransportError::Exception("illegal address".into())))
        }

        async fn reset(&mut self) -> Result<(), TransportError> {
            self.resets += 1;
            Ok(())
        }
    }

    fn reader(responses: Vec<(u16, Result<Vec<u8>, TransportError>)>) -> BusReader<MapTransport> {
        BusReader::new(SharedBus::new(MapTransport {
            responses: responses.into_iter().collect(),
            calls: Vec::new(),
            resets: 0,
        }))
    }

    #[tokio::test]
    async fn test_read_one_decodes() {
        let reader = reader(vec![(0x0130, Ok(vec![0x13, 0x89]))]);
        let register = RegisterDescriptor::new(0x0130, 1, Decoder::U16Scaled(100));

        let value = reader.read_one(2, &register).await.unwrap();
        assert_eq!(value, MeasurementValue::F64(50.01));

        let transport = reader.bus.transport.lock().await;
        assert_eq!(transport.calls, vec![(2, 0x0130, 1)]);
    }

    #[tokio::test]
    async fn test_read_one_transport_error() {
        let reader = reader(vec![(
            0x000E,
            Err(TransportError::Timeout(Duration::from_millis(500))),
        )]);
        let register = RegisterDescriptor::new(0x000E, 2, Decoder::F32);

        let err = reader.read_one(1, &register).await.unwrap_err();
        assert_eq!(
            err,
            ReadError::Transport {
                address: 0x000E,
                source: TransportError::Timeout(Duration::from_millis(500)),
            }
        );
    }

    #[tokio::test]
    async fn test_timeout_resets_bus_before_next_read() {
        let reader = reader(vec![
            (0x0130, Err(TransportError::Timeout(Duration::from_millis(500)))),
            (0x0131, Ok(vec![0x59, 0x5C])),
            (0x0139, Err(TransportError::Exception("illegal address".into()))),
        ]);

        let frequency = RegisterDescriptor::new(0x0130, 1, Decoder::U16Scaled(100));
        let voltage = RegisterDescriptor::new(0x0131, 1, Decoder::U16Scaled(100));
        let current = RegisterDescriptor::new(0x0139, 2, Decoder::U32Scaled(1000));

        assert!(reader.read_one(1, &frequency).await.is_err());
        assert_eq!(reader.bus.transport.lock().await.resets, 1);

        assert_eq!(
            reader.read_one(1, &voltage).await.unwrap(),
            MeasurementValue::F64(228.76)
        );
        assert!(reader.read_one(1, &current).await.is_err());

        // only timeouts leave a reply in flight
        assert_eq!(reader.bus.transport.lock().await.resets, 1);
    }

    #[tokio::test]
    async fn test_read_one_empty_response() {
        let reader = reader(vec![(0x000E, Ok(Vec::new()))]);
        let register = RegisterDescriptor::new(0x000E, 2, Decoder::F32);

        let err = reader.read_one(1, &register).await.unwrap_err();
        assert_eq!(err, ReadError::EmptyResponse { address: 0x000E });
    }

    #[tokio::test]
    async fn test_read_one_short_response() {
        let reader = reader(vec![(0x000E, Ok(vec![0x42, 0x48]))]);
        let register = RegisterDescriptor::new(0x000E, 2, Decoder::F32);

        let err = reader.read_one(1, &register).await.unwrap_err();
        assert_eq!(
            err,
            ReadError::ShortResponse {
                address: 0x000E,
                expected: 4,
                actual: 2,
            }
        );
        assert_eq!(
            err.to_string(),
            "register 0x000e returned 2 bytes, expected 4"
        );
    }

    #[tokio::test]
    async fn test_read_all_keeps_catalog_order() {
        let catalog = Catalog::new(vec![
            CatalogEntry::new(
                "Voltage",
                RegisterDescriptor::new(0x0131, 1, Decoder::U16Scaled(100)),
                Some(powermeter_common::SensorClassification::measurement("V")),
            ),
            CatalogEntry::new(
                "Grid Frequency",
                RegisterDescriptor::new(0x0130, 1, Decoder::U16Scaled(100)),
                Some(powermeter_common::SensorClassification::measurement("Hz")),
            ),
            CatalogEntry::new(
                "Serial Number",
                RegisterDescriptor::new(0x0001, 2, Decoder::U32),
                None,
            ),
        ]);
        let meter = PowerMeter::new(
            DeviceIdentity::new("acme", "OR-WE-514", "meter", "meter"),
            1,
            Arc::new(catalog),
        );

        let reader = reader(vec![
            (0x0130, Ok(vec![0x13, 0x89])),
            (0x0131, Ok(vec![0x59, 0x5C])),
            (0x0001, Ok(vec![0x00, 0x00, 0x00, 0x2A])),
        ]);

        let readings = reader.read_all(&meter).await;

        assert_eq!(readings.names(), vec!["Voltage", "Grid Frequency", "Serial Number"]);
        assert_eq!(readings.get("Serial Number"), Some(&MeasurementValue::U32(42)));

        let exposed: Vec<&str> = readings.exposed().map(|(name, _)| name).collect();
        assert_eq!(exposed, vec!["Voltage", "Grid Frequency"]);
    }
}
