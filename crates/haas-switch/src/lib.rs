//! Switch driver contract and built-in drivers for HaaS.
//!
//! - [`SwitchDriver`] / [`SwitchSession`]: the capability contract every
//!   switch backend implements (validate, open session, apply, close)
//! - [`DriverRegistry`]: dispatch from a switch's stable `api_name` to its
//!   driver
//! - [`PortAction`]: a queued networking action resolved to an absolute port
//!   change
//! - [`drivers`]: the in-memory `mock` driver and the `linux-bridge` driver
//! - [`shell`]: quoted, time-bounded command execution used by shell-backed
//!   drivers
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use haas_switch::{drivers::MockSwitchDriver, DriverRegistry};
//!
//! let mut registry = DriverRegistry::new();
//! registry.register(Arc::new(MockSwitchDriver::new()))?;
//!
//! let driver = registry.get(&switch.api_name)?;
//! let mut session = driver.open_session(&switch).await?;
//! session.apply(&port_action).await?;
//! session.close().await?;
//! ```

pub mod driver;
pub mod drivers;
pub mod error;
pub mod registry;
pub mod shell;

pub use driver::{validate_schema, NetworkBinding, PortAction, SwitchDriver, SwitchSession};
pub use error::{SwitchError, SwitchResult};
pub use registry::DriverRegistry;
