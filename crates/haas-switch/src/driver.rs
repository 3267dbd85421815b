//! The switch driver contract.
//!
//! A driver is looked up by the switch's `api_name` and used in three steps:
//!
//! 1. [`SwitchDriver::validate`] at registration, before any session exists
//! 2. [`SwitchDriver::open_session`] on first use of the switch within a drain
//! 3. [`SwitchSession::apply`] once per action, then [`SwitchSession::close`]
//!    when the drain ends
//!
//! Actions carry the old and new network of the channel, so a driver can
//! compute the absolute target configuration of the port without reading the
//! switch. Applying the same action twice must leave the port in the same
//! state as applying it once.
//!
//! Drivers bound their own I/O latency. A driver call that never returns
//! stalls every later action in the queue.

use async_trait::async_trait;
use haas_model::{
    ActionId, ActionTarget, Channel, FieldValues, FieldValuesExt, NetworkingAction, NicRef, Switch,
};
use std::fmt;

use crate::error::{SwitchError, SwitchResult};

/// A network as seen by a driver.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkBinding {
    /// Network label
    pub label: String,
    /// Provider-assigned id (VLAN tag)
    pub network_id: String,
}

/// A networking action resolved to a concrete switchport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortAction {
    /// Queue id of the originating action
    pub action_id: ActionId,
    /// Switch label
    pub switch: String,
    /// Port label on the switch
    pub port: String,
    /// Nic cabled to the port
    pub nic: NicRef,
    /// Channel being changed
    pub channel: Channel,
    /// Network currently on the channel
    pub old_network: Option<NetworkBinding>,
    /// Network to put on the channel; `None` means detach
    pub new_network: Option<NetworkBinding>,
}

impl PortAction {
    /// Builds the port action for a queued action and its resolved target.
    pub fn from_target(action: &NetworkingAction, target: &ActionTarget<'_>) -> Self {
        let binding = |network: &haas_model::Network| NetworkBinding {
            label: network.label.clone(),
            network_id: network.network_id.clone(),
        };

        Self {
            action_id: action.id,
            switch: target.switch.label.clone(),
            port: target.port.label.clone(),
            nic: action.nic.clone(),
            channel: action.channel,
            old_network: target.old_network.map(binding),
            new_network: target.new_network.map(binding),
        }
    }

    /// Returns true if this action removes a network from the port.
    pub fn is_detach(&self) -> bool {
        self.new_network.is_none()
    }
}

impl fmt::Display for PortAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = |b: &Option<NetworkBinding>| {
            b.as_ref()
                .map(|b| b.network_id.clone())
                .unwrap_or_else(|| "none".to_string())
        };
        write!(
            f,
            "#{} {}:{} {} {} -> {}",
            self.action_id,
            self.switch,
            self.port,
            self.channel,
            name(&self.old_network),
            name(&self.new_network)
        )
    }
}

/// A switch backend.
///
/// Implementations are registered once in a [`crate::DriverRegistry`] and
/// shared between drains, so they hold no per-switch connection state.
#[async_trait]
pub trait SwitchDriver: Send + Sync {
    /// Returns the stable identifier persisted with every switch using this
    /// driver.
    fn api_name(&self) -> &str;

    /// Checks that a configuration mapping is well-formed for this driver.
    ///
    /// Must be free of side effects; no connection is made.
    fn validate(&self, config: &FieldValues) -> SwitchResult<()>;

    /// Checks that a port label names an interface this driver can address.
    fn validate_port_label(&self, _label: &str) -> SwitchResult<()> {
        Ok(())
    }

    /// Opens a reusable session to the switch.
    async fn open_session(&self, switch: &Switch) -> SwitchResult<Box<dyn SwitchSession>>;
}

/// A live handle to one switch.
#[async_trait]
pub trait SwitchSession: Send {
    /// Returns the label of the switch this session talks to.
    fn switch_label(&self) -> &str;

    /// Realizes one action on the switch.
    async fn apply(&mut self, action: &PortAction) -> SwitchResult<()>;

    /// Releases the session.
    ///
    /// Called exactly once per opened session, also after the session has
    /// failed. Errors are reported but the session is discarded either way.
    async fn close(&mut self) -> SwitchResult<()>;
}

/// Checks a configuration mapping against a fixed set of string fields.
///
/// Every `required` field must be present; any field outside `required` and
/// `optional` is rejected.
pub fn validate_schema(
    api_name: &str,
    config: &FieldValues,
    required: &[&str],
    optional: &[&str],
) -> SwitchResult<()> {
    for field in required {
        if !config.has_field(field) {
            return Err(SwitchError::invalid_config(
                api_name,
                *field,
                "missing required field",
            ));
        }
    }
    for field in config.field_names() {
        if !required.contains(&field) && !optional.contains(&field) {
            return Err(SwitchError::invalid_config(
                api_name,
                field,
                "unexpected field",
            ));
        }
    }
    Ok(())
}
