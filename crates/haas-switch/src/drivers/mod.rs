//! Built-in switch drivers.

pub mod bridge;
pub mod mock;

pub use bridge::LinuxBridgeDriver;
pub use mock::{MockPortState, MockSwitchDriver, MockSwitchState};
