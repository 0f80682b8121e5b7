//! Name-to-factory lookup for card drivers.
//!
//! The CLI selects a driver by the `card.driver` config value (or `-s` for
//! the simulation card). The registry is built once at startup and handed
//! to whoever opens the session.

use awg_common::card::driver::{CardDriver, DeviceError, DriverFactory};
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// Card drivers known to this build, keyed by name.
#[derive(Debug, Default)]
pub struct DriverRegistry {
    factories: BTreeMap<&'static str, DriverFactory>,
}

impl DriverRegistry {
    /// Registry with no drivers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every driver in [`crate::drivers`].
    pub fn with_builtin_drivers() -> Self {
        let mut registry = Self::new();
        crate::drivers::register_all_drivers(&mut registry);
        registry
    }

    /// Add `factory` under `name`.
    ///
    /// Returns `false` when an earlier factory with the same name was
    /// replaced.
    pub fn register(&mut self, name: &'static str, factory: DriverFactory) -> bool {
        match self.factories.insert(name, factory) {
            Some(_) => {
                warn!("Card driver '{}' registered twice, keeping the latest", name);
                false
            }
            None => {
                debug!("Card driver '{}' registered", name);
                true
            }
        }
    }

    /// Whether a driver named `name` is available.
    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    /// Instantiate the driver named `name`.
    ///
    /// # Errors
    /// `DeviceError::NotOpen` naming the available drivers when `name` is
    /// unknown.
    pub fn create_driver(&self, name: &str) -> Result<Box<dyn CardDriver>, DeviceError> {
        let factory = self.factories.get(name).ok_or_else(|| {
            DeviceError::NotOpen(format!(
                "no card driver named '{name}' (available: {})",
                self.list_drivers().join(", ")
            ))
        })?;
        let driver = factory();
        debug!("Created card driver {} v{}", driver.name(), driver.version());
        Ok(driver)
    }

    /// Registered names in sorted order.
    pub fn list_drivers(&self) -> Vec<&'static str> {
        self.factories.keys().copied().collect()
    }
}
