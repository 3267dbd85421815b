//! Topology model for HaaS deferred networking.
//!
//! This crate holds the ground truth of "what should be connected to what":
//!
//! - [`entities`]: Node, Nic, Port, Switch, Network, Project and the queued
//!   [`NetworkingAction`] rows
//! - [`Channel`]: how a network is carried on a switchport (native or tagged)
//! - [`Topology`]: the entity tables plus the admission-time operations that
//!   enqueue networking actions
//! - [`error`]: Error types for topology operations
//!
//! # Architecture
//!
//! Tenant-facing operations mutate the topology and enqueue actions:
//!
//! 1. `node_connect_network` / `node_detach_network` validate access and
//!    admission, then append a [`NetworkingAction`] to the FIFO queue
//! 2. The deferred engine peeks the oldest action and applies it to the switch
//! 3. [`Topology::complete_action`] removes the action and updates the Nic's
//!    live attachment in the same step
//!
//! # Example
//!
//! ```
//! use haas_model::{Channel, Topology};
//!
//! let mut topology = Topology::new();
//! topology.register_project("anvil-nextgen").unwrap();
//! assert_eq!(topology.pending_count(), 0);
//! assert_eq!("vlan/native".parse::<Channel>().unwrap(), Channel::Native);
//! ```

pub mod channel;
pub mod entities;
pub mod error;
pub mod fields;
pub mod topology;

pub use channel::Channel;
pub use entities::{
    ActionId, Network, NetworkingAction, Nic, NicRef, Node, ObmHandle, Port, PortRef, Project,
    Switch,
};
pub use error::{TopologyError, TopologyResult};
pub use fields::{FieldValue, FieldValues, FieldValuesExt};
pub use topology::{ActionTarget, Topology};
