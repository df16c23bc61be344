//! Home Assistant bridge for Modbus RTU power meters.
//!
//! This bridge polls ORNO OR-WE-514 and OR-WE-517 meters sharing one serial
//! line and publishes their readings to MQTT, announcing every measurement
//! through Home Assistant discovery.
//!
//! # Topics
//!
//! ```text
//! homeassistant/sensor/<meter>/<MEASUREMENT>/config   discovery config (JSON)
//! <meter>/<MEASUREMENT>                               current value (text)
//! ```
//!
//! Where:
//! - `<meter>` - Meter name from configuration
//! - `<MEASUREMENT>` - Measurement name upper-cased, spaces replaced by `_`
//!
//! Every message is published retained with QoS 0.

pub mod catalog;
pub mod config;
pub mod decode;
pub mod meter;
pub mod poller;
pub mod reader;
pub mod rtu;

pub use catalog::{Catalog, CatalogEntry, CatalogError, MeterModel, RegisterDescriptor};
pub use config::{BusConfig, MeterConfig, Overrides, PowerMeterBridgeConfig};
pub use decode::Decoder;
pub use meter::{Catalogs, PowerMeter};
pub use poller::{CycleStats, MeterPoller, Mode, PollerError};
pub use reader::{
    BusReader, ReadError, Reading, Readings, RegisterTransport, SharedBus, TransportError,
};
pub use rtu::{RtuError, RtuTransport};
