//! Driver registry keyed by api name.
//!
//! Switches persist only their `api_name`; the registry turns it back into a
//! driver. Adding a switch family means registering one more driver here,
//! nothing in the engine changes.

use haas_model::{FieldValues, Switch};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::info;

use crate::driver::SwitchDriver;
use crate::error::{SwitchError, SwitchResult};

/// Lookup table from api name to driver.
#[derive(Clone, Default)]
pub struct DriverRegistry {
    drivers: HashMap<String, Arc<dyn SwitchDriver>>,
}

impl DriverRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a driver under its api name.
    pub fn register(&mut self, driver: Arc<dyn SwitchDriver>) -> SwitchResult<()> {
        let api_name = driver.api_name().to_string();
        if self.drivers.contains_key(&api_name) {
            return Err(SwitchError::DuplicateDriver { api_name });
        }
        info!(api_name = %api_name, "Registered switch driver");
        self.drivers.insert(api_name, driver);
        Ok(())
    }

    /// Returns the driver for an api name.
    pub fn get(&self, api_name: &str) -> SwitchResult<Arc<dyn SwitchDriver>> {
        self.drivers
            .get(api_name)
            .cloned()
            .ok_or_else(|| SwitchError::UnknownDriver {
                api_name: api_name.to_string(),
            })
    }

    /// Returns true if a driver is registered for the api name.
    pub fn contains(&self, api_name: &str) -> bool {
        self.drivers.contains_key(api_name)
    }

    /// Returns the registered api names, sorted.
    pub fn api_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.drivers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Returns the number of registered drivers.
    pub fn len(&self) -> usize {
        self.drivers.len()
    }

    /// Returns true if no driver is registered.
    pub fn is_empty(&self) -> bool {
        self.drivers.is_empty()
    }

    /// Validates a switch configuration with the driver for `api_name`.
    pub fn validate_switch(&self, api_name: &str, config: &FieldValues) -> SwitchResult<()> {
        self.get(api_name)?.validate(config)
    }

    /// Validates a port label with the driver of the owning switch.
    pub fn validate_port(&self, switch: &Switch, label: &str) -> SwitchResult<()> {
        self.get(&switch.api_name)?.validate_port_label(label)
    }
}

impl fmt::Debug for DriverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DriverRegistry")
            .field("drivers", &self.api_names())
            .finish()
    }
}
