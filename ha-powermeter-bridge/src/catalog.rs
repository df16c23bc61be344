//! Register catalogs of the supported meter models.
//!
//! A catalog maps measurement names to the holding registers that carry them.
//! Catalogs are plain data built once at startup; [`Catalog::validate`] checks
//! the invariants the rest of the bridge relies on.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use powermeter_common::{SensorClassification, canonical_token};

use crate::decode::Decoder;

/// Catalog consistency errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("duplicate measurement '{0}'")]
    DuplicateName(&'static str),
    #[error("measurements '{first}' and '{second}' share the topic token {token}")]
    TokenCollision {
        first: &'static str,
        second: &'static str,
        token: String,
    },
    #[error("measurement '{name}' reads {words} register(s) but its decoder needs {expected}")]
    WidthMismatch {
        name: &'static str,
        words: u16,
        expected: u16,
    },
    #[error("registers of '{first}' and '{second}' overlap")]
    Overlap {
        first: &'static str,
        second: &'static str,
    },
}

/// Supported meter models.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MeterModel {
    /// Single-phase meter with fixed-point registers.
    #[serde(rename = "or-we-514")]
    OrWe514,
    /// Three-phase meter with IEEE-754 float registers.
    #[serde(rename = "or-we-517")]
    OrWe517,
}

impl MeterModel {
    /// Model label shown in Home Assistant.
    pub fn label(&self) -> &'static str {
        match self {
            MeterModel::OrWe514 => "OR-WE-514",
            MeterModel::OrWe517 => "OR-WE-517",
        }
    }
}

impl std::fmt::Display for MeterModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Location and encoding of one measurement on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterDescriptor {
    /// First holding register.
    pub address: u16,
    /// Number of 16-bit registers to read.
    pub words: u16,
    /// Decoder applied to the returned bytes.
    pub decoder: Decoder,
}

impl RegisterDescriptor {
    pub const fn new(address: u16, words: u16, decoder: Decoder) -> Self {
        Self {
            address,
            words,
            decoder,
        }
    }

    /// Number of bytes a read of this descriptor returns.
    pub fn byte_len(&self) -> usize {
        usize::from(self.words) * 2
    }

    /// One past the last register, widened so it cannot overflow.
    fn end(&self) -> u32 {
        u32::from(self.address) + u32::from(self.words)
    }
}

/// A named measurement in a catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub name: &'static str,
    pub register: RegisterDescriptor,
    /// `None` for measurements that are read but never exposed.
    pub sensor: Option<SensorClassification>,
}

impl CatalogEntry {
    pub fn new(
        name: &'static str,
        register: RegisterDescriptor,
        sensor: Option<SensorClassification>,
    ) -> Self {
        Self {
            name,
            register,
            sensor,
        }
    }
}

/// Ordered register table of one meter model.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    entries: Vec<CatalogEntry>,
}

impl Catalog {
    /// Build a catalog from entries, keeping their order.
    pub fn new(entries: Vec<CatalogEntry>) -> Self {
        Self { entries }
    }

    /// The catalog of a supported meter model.
    pub fn for_model(model: MeterModel) -> Self {
        match model {
            MeterModel::OrWe514 => or_we_514(),
            MeterModel::OrWe517 => or_we_517(),
        }
    }

    /// All entries in catalog order.
    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    /// Entries exposed to Home Assistant.
    pub fn exposed(&self) -> impl Iterator<Item = (&CatalogEntry, &SensorClassification)> {
        self.entries
            .iter()
            .filter_map(|entry| entry.sensor.as_ref().map(|sensor| (entry, sensor)))
    }

    /// Look up an entry by measurement name.
    pub fn get(&self, name: &str) -> Option<&CatalogEntry> {
        self.entries.iter().find(|entry| entry.name == name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Check names, topic tokens, register widths and address ranges.
    pub fn validate(&self) -> Result<(), CatalogError> {
        let mut tokens: HashMap<String, &'static str> = HashMap::new();

        for entry in &self.entries {
            let expected = entry.register.decoder.words();
            if entry.register.words != expected {
                return Err(CatalogError::WidthMismatch {
                    name: entry.name,
                    words: entry.register.words,
                    expected,
                });
            }

            let token = canonical_token(entry.name);
            if let Some(first) = tokens.insert(token.clone(), entry.name) {
                if first == entry.name {
                    return Err(CatalogError::DuplicateName(entry.name));
                }
                return Err(CatalogError::TokenCollision {
                    first,
                    second: entry.name,
                    token,
                });
            }
        }

        let mut ranges: Vec<&CatalogEntry> = self.entries.iter().collect();
        ranges.sort_by_key(|entry| entry.register.address);

        for pair in ranges.windows(2) {
            if pair[0].register.end() > u32::from(pair[1].register.address) {
                return Err(CatalogError::Overlap {
                    first: pair[0].name,
                    second: pair[1].name,
                });
            }
        }

        Ok(())
    }
}

fn measurement(
    name: &'static str,
    address: u16,
    words: u16,
    decoder: Decoder,
    unit: &str,
) -> CatalogEntry {
    CatalogEntry::new(
        name,
        RegisterDescriptor::new(address, words, decoder),
        Some(SensorClassification::measurement(unit)),
    )
}

fn total(
    name: &'static str,
    address: u16,
    words: u16,
    decoder: Decoder,
    unit: &str,
) -> CatalogEntry {
    CatalogEntry::new(
        name,
        RegisterDescriptor::new(address, words, decoder),
        Some(SensorClassification::total(unit)),
    )
}

// OR-WE-514 keeps fixed-point values with two or three decimal digits.
const CENTI_16: Decoder = Decoder::U16Scaled(100);
const CENTI_32: Decoder = Decoder::U32Scaled(100);
const MILLI_32: Decoder = Decoder::U32Scaled(1000);

fn or_we_514() -> Catalog {
    Catalog::new(vec![
        measurement("Grid Frequency", 0x0130, 1, CENTI_16, "Hz"),
        measurement("Voltage", 0x0131, 1, CENTI_16, "V"),
        measurement("Current", 0x0139, 2, MILLI_32, "A"),
        measurement("Total Active Power", 0x0140, 2, MILLI_32, "kW"),
        measurement("Total reactive power", 0x0148, 2, MILLI_32, "kW"),
        measurement("Total Apparent Power", 0x0150, 2, MILLI_32, "kW"),
        measurement("Total Power Factor", 0x0158, 1, CENTI_16, "kW"),
        total("Total Active Energy", 0xA000, 2, CENTI_32, "kWh"),
        total("Total Reactive Energy", 0xA01E, 2, CENTI_32, "kWh"),
    ])
}

fn or_we_517() -> Catalog {
    use Decoder::F32;

    Catalog::new(vec![
        measurement("L1 Voltage", 0x000E, 2, F32, "V"),
        measurement("L2 Voltage", 0x0010, 2, F32, "V"),
        measurement("L3 Voltage", 0x0012, 2, F32, "V"),
        measurement("Grid Frequency", 0x0014, 2, F32, "Hz"),
        measurement("L1 Current", 0x0016, 2, F32, "A"),
        measurement("L2 Current", 0x0018, 2, F32, "A"),
        measurement("L3 Current", 0x001A, 2, F32, "A"),
        measurement("Total Active Power", 0x001C, 2, F32, "kW"),
        measurement("L1 Active Power", 0x001E, 2, F32, "kW"),
        measurement("L2 Active Power", 0x0020, 2, F32, "kW"),
        measurement("L3 Active Power", 0x0022, 2, F32, "kW"),
        measurement("Total reactive power", 0x0024, 2, F32, "kW"),
        measurement("L1 reactive power", 0x0026, 2, F32, "kW"),
        measurement("L2 reactive power", 0x0028, 2, F32, "kW"),
        measurement("L3 reactive power", 0x002A, 2, F32, "kW"),
        measurement("Total Apparent Power", 0x002C, 2, F32, "kW"),
        measurement("L1 Apparent Power", 0x002E, 2, F32, "kW"),
        measurement("L2 Apparent Power", 0x0030, 2, F32, "kW"),
        measurement("L3 Apparent Power", 0x0032, 2, F32, "kW"),
        measurement("Total Power Factor", 0x0034, 2, F32, "kW"),
        measurement("L1 Power Factor", 0x0036, 2, F32, "kW"),
        measurement("L2 Power Factor", 0x0038, 2, F32, "kW"),
        measurement("L3 Power Factor", 0x003A, 2, F32, "kW"),
        total("Total Active Energy", 0x0100, 2, F32, "kWh"),
        total("L1 Total Active Energy", 0x0102, 2, F32, "kWh"),
        total("L2 Total Active Energy", 0x0104, 2, F32, "kWh"),
        total("L3 Total Active Energy", 0x0106, 2, F32, "kWh"),
        total("Forward Active Energy", 0x0108, 2, F32, "kWh"),
        total("L1 Forward Active Energy", 0x010A, 2, F32, "kWh"),
        total("L2 Forward Active Energy", 0x010C, 2, F32, "kWh"),
        total("L3 Forward Active Energy", 0x010E, 2, F32, "kWh"),
        total("Reverse Active Energy", 0x0110, 2, F32, "kWh"),
        total("L1 Reverse Active Energy", 0x0112, 2, F32, "kWh"),
        total("L2 Reverse Active Energy", 0x0114, 2, F32, "kWh"),
        total("L3 Reverse Active Energy", 0x0116, 2, F32, "kWh"),
        total("Total Reactive Energy", 0x0118, 2, F32, "kWh"),
        total("L1 Reactive Energy", 0x011A, 2, F32, "kWh"),
        total("L2 Reactive Energy", 0x011C, 2, F32, "kWh"),
        total("L3 Reactive Energy", 0x011E, 2, F32, "kWh"),
        total("Forward Reactive Energy", 0x0120, 2, F32, "kWh"),
        total("L1 Forward Reactive Energy", 0x0122, 2, F32, "kWh"),
        total("L2 Forward Reactive Energy", 0x0124, 2, F32, "kWh"),
        total("L3 Forward Reactive Energy", 0x0126, 2, F32, "kWh"),
        total("Reverse Reactive Energy", 0x0128, 2, F32, "kWh"),
        total("L1 Reverse Reactive Energy", 0x012A, 2, F32, "kWh"),
        total("L2 Reverse Reactive Energy", 0x012C, 2, F32, "kWh"),
        total("L3 Reverse Reactive Energy", 0x012E, 2, F32, "kWh"),
        total("T1 Total Active energy", 0x0130, 2, F32, "kWh"),
        total("T1 Forward Active Energy", 0x0132, 2, F32, "kWh"),
        total("T1 Reverse Active Energy", 0x0134, 2, F32, "kWh"),
        total("T1 Total Reactive Energy", 0x0136, 2, F32, "kWh"),
        total("T1 Forward Reactive Energy", 0x0138, 2, F32, "kWh"),
        total("T1 Reverse Reactive Energy", 0x013A, 2, F32, "kWh"),
        total("T2 Total Active energy", 0x013C, 2, F32, "kWh"),
        total("T2 Forward Active Energy", 0x013E, 2, F32, "kWh"),
        total("T2 Reverse Active Energy", 0x0140, 2, F32, "kWh"),
        total("T2 Total Reactive Energy", 0x0142, 2, F32, "kWh"),
        total("T2 Forward Reactive Energy", 0x0144, 2, F32, "kWh"),
        total("T2 Reverse Reactive Energy", 0x0146, 2, F32, "kWh"),
        total("T3 Total Active energy", 0x0148, 2, F32, "kWh"),
        total("T3 Forward Active Energy", 0x014A, 2, F32, "kWh"),
        total("T3 Reverse Active Energy", 0x014C, 2, F32, "kWh"),
        total("T3 Total Reactive Energy", 0x014E, 2, F32, "kWh"),
        total("T3 Forward Reactive Energy", 0x0150, 2, F32, "kWh"),
        total("T3 Reverse Reactive Energy", 0x0152, 2, F32, "kWh"),
        total("T4 Total Active energy", 0x0154, 2, F32, "kWh"),
        total("T4 Forward Active Energy", 0x0156, 2, F32, "kWh"),
        total("T4 Reverse Active Energy", 0x0158, 2, F32, "kWh"),
        total("T4 Total Reactive Energy", 0x015A, 2, F32, "kWh"),
        total("T4 Forward Reactive Energy", 0x015C, 2, F32, "kWh"),
        total("T4 Reverse Reactive Energy", 0x015E, 2, F32, "kWh"),
    ])
}
