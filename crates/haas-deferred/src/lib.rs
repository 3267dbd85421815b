//! Deferred networking engine for HaaS.
//!
//! Topology operations only queue [`haas_model::NetworkingAction`]s; this
//! crate realizes them on switches later, oldest first:
//!
//! - [`ActionStore`] / [`MemoryStore`]: the queue and topology seen by the
//!   engine
//! - [`NetworkEngine`]: drains the queue one committed action at a time,
//!   with at most one drain running
//! - [`SessionCache`]: one switch session per switch per drain
//! - [`DrainWorker`]: periodic and on-demand background drains
//! - [`HaasConfig`]: daemon configuration
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use haas_deferred::{MemoryStore, NetworkEngine};
//!
//! let engine = NetworkEngine::new(Arc::new(store), Arc::new(registry));
//! let report = engine.drain().await?;
//! println!("applied {} actions", report.applied);
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod logging;
pub mod session;
pub mod store;
pub mod worker;

pub use config::{ConfigError, HaasConfig, DEFAULT_CONFIG_PATH};
pub use engine::{DrainReport, NetworkEngine};
pub use error::{DrainError, DrainResult, RegistrationError, StoreError, StoreResult};
pub use session::SessionCache;
pub use store::{ActionStore, MemoryStore, ResolvedAction};
pub use worker::{DrainWorker, WorkerHandle, WorkerStats};

use haas_switch::drivers::{LinuxBridgeDriver, MockSwitchDriver};
use haas_switch::{DriverRegistry, SwitchResult};
use std::sync::Arc;

/// Builds a registry holding the built-in drivers, configured from `config`.
pub fn builtin_registry(config: &HaasConfig) -> SwitchResult<DriverRegistry> {
    let mut registry = DriverRegistry::new();
    registry.register(Arc::new(MockSwitchDriver::new()))?;
    registry.register(Arc::new(
        LinuxBridgeDriver::new(config.command_timeout()).with_dry_run(config.drivers.bridge_dry_run),
    ))?;
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use haas_switch::drivers::{bridge, mock};

    #[test]
    fn test_builtin_registry() {
        let registry = builtin_registry(&HaasConfig::default()).unwrap();
        assert_eq!(registry.api_names(), vec![bridge::API_NAME, mock::API_NAME]);
    }
}
