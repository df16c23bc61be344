//! Configured meters on the bus.

use std::sync::Arc;

use powermeter_common::DeviceIdentity;

use crate::catalog::{Catalog, CatalogError, MeterModel};
use crate::config::MeterConfig;

/// One physical meter: its Home Assistant identity, bus address and catalog.
#[derive(Debug, Clone)]
pub struct PowerMeter {
    identity: DeviceIdentity,
    unit_id: u8,
    catalog: Arc<Catalog>,
}

impl PowerMeter {
    pub fn new(identity: DeviceIdentity, unit_id: u8, catalog: Arc<Catalog>) -> Self {
        Self {
            identity,
            unit_id,
            catalog,
        }
    }

    /// Build a meter from its configuration, sharing the catalog of its model.
    pub fn from_config(config: &MeterConfig, catalogs: &Catalogs) -> Self {
        Self::new(config.identity(), config.unit_id, catalogs.get(config.model))
    }

    pub fn identity(&self) -> &DeviceIdentity {
        &self.identity
    }

    /// Configured meter name, the root of every topic it produces.
    pub fn name(&self) -> &str {
        &self.identity.identifiers
    }

    pub fn unit_id(&self) -> u8 {
        self.unit_id
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }
}

/// The catalogs of every supported model, built once and shared.
#[derive(Debug, Clone)]
pub struct Catalogs {
    or_we_514: Arc<Catalog>,
    or_we_517: Arc<Catalog>,
}

impl Catalogs {
    pub fn new() -> Self {
        Self {
            or_we_514: Arc::new(Catalog::for_model(MeterModel::OrWe514)),
            or_we_517: Arc::new(Catalog::for_model(MeterModel::OrWe517)),
        }
    }

    pub fn get(&self, model: MeterModel) -> Arc<Catalog> {
        match model {
            MeterModel::OrWe514 => Arc::clone(&self.or_we_514),
            MeterModel::OrWe517 => Arc::clone(&self.or_we_517),
        }
    }

    /// Validate every catalog, stopping at the first inconsistent one.
    pub fn validate(&self) -> Result<(), (MeterModel, CatalogError)> {
        for model in [MeterModel::OrWe514, MeterModel::OrWe517] {
            self.get(model).validate().map_err(|e| (model, e))?;
        }
        Ok(())
    }
}

impl Default for Catalogs {
    fn default() -> Self {
        Self::new()
    }
}
