//! Topology entities.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::channel::Channel;
use crate::fields::FieldValues;

/// Identifier of a queued networking action.
///
/// Ids are allocated from a monotonically increasing counter, so ordering by
/// id is insertion (FIFO) order.
pub type ActionId = u64;

/// Reference to a nic: `(node label, nic label)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NicRef {
    /// Owning node label
    pub node: String,
    /// Nic label, unique within the node
    pub nic: String,
}

impl NicRef {
    /// Creates a new nic reference.
    pub fn new(node: impl Into<String>, nic: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            nic: nic.into(),
        }
    }
}

impl fmt::Display for NicRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.node, self.nic)
    }
}

/// Reference to a port: `(switch label, port label)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PortRef {
    /// Owning switch label
    pub switch: String,
    /// Port label, unique within the switch
    pub port: String,
}

impl PortRef {
    /// Creates a new port reference.
    pub fn new(switch: impl Into<String>, port: impl Into<String>) -> Self {
        Self {
            switch: switch.into(),
            port: port.into(),
        }
    }
}

impl fmt::Display for PortRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.switch, self.port)
    }
}

/// Opaque out-of-band management handle carried by a node.
///
/// The deferred engine never looks inside; the power-management subsystem
/// interprets `obm_type` and `fields`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ObmHandle {
    /// OBM driver type, e.g. `http://schema.massopencloud.org/haas/v0/obm/ipmi`
    pub obm_type: String,
    /// Driver-specific fields (host, user, password, ...)
    #[serde(default)]
    pub fields: FieldValues,
}

impl ObmHandle {
    /// Creates a new OBM handle.
    pub fn new(obm_type: impl Into<String>, fields: FieldValues) -> Self {
        Self {
            obm_type: obm_type.into(),
            fields,
        }
    }
}

/// A tenant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    /// Unique label
    pub label: String,
}

/// A physical machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    /// Unique label
    pub label: String,
    /// Out-of-band management handle
    pub obm: ObmHandle,
    /// Project the node is allocated to, if any
    #[serde(default)]
    pub project: Option<String>,
    /// Nics indexed by label
    #[serde(default)]
    pub nics: BTreeMap<String, Nic>,
}

impl Node {
    /// Creates an unallocated node with no nics.
    pub fn new(label: impl Into<String>, obm: ObmHandle) -> Self {
        Self {
            label: label.into(),
            obm,
            project: None,
            nics: BTreeMap::new(),
        }
    }
}

/// A network interface of a node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Nic {
    /// Label, unique within the node
    pub label: String,
    /// Hardware (MAC) address
    pub macaddr: String,
    /// Switchport this nic is cabled to
    #[serde(default)]
    pub port: Option<PortRef>,
    /// Live network attachments: channel -> network label
    #[serde(default)]
    pub attachments: BTreeMap<Channel, String>,
}

impl Nic {
    /// Creates a nic with no port and no attachments.
    pub fn new(label: impl Into<String>, macaddr: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            macaddr: macaddr.into(),
            port: None,
            attachments: BTreeMap::new(),
        }
    }

    /// Returns the channel the network is attached on, if any.
    pub fn channel_of(&self, network: &str) -> Option<Channel> {
        self.attachments
            .iter()
            .find(|(_, attached)| attached.as_str() == network)
            .map(|(channel, _)| *channel)
    }
}

/// A physical switch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Switch {
    /// Unique label
    pub label: String,
    /// Stable driver identifier used for dispatch
    pub api_name: String,
    /// Driver configuration (hostname, credentials, vendor fields)
    #[serde(default)]
    pub config: FieldValues,
    /// Ports indexed by label
    #[serde(default)]
    pub ports: BTreeMap<String, Port>,
}

impl Switch {
    /// Creates a switch with no ports.
    pub fn new(label: impl Into<String>, api_name: impl Into<String>, config: FieldValues) -> Self {
        Self {
            label: label.into(),
            api_name: api_name.into(),
            config,
            ports: BTreeMap::new(),
        }
    }
}

/// A switchport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Port {
    /// Label, unique within the switch (physical interface name)
    pub label: String,
    /// Nic cabled to this port
    #[serde(default)]
    pub nic: Option<NicRef>,
}

impl Port {
    /// Creates a port with no nic.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            nic: None,
        }
    }
}

/// A logical L2 segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Network {
    /// Unique label
    pub label: String,
    /// Provider-assigned id (the VLAN tag for VLAN-based drivers)
    pub network_id: String,
    /// Creating project; `None` for administrator-created networks
    #[serde(default)]
    pub creator: Option<String>,
    /// Projects allowed to attach nodes
    #[serde(default)]
    pub access: BTreeSet<String>,
    /// True when the id was handed out by the allocator, false for
    /// externally provided networks
    pub allocated: bool,
}

impl Network {
    /// Creates a new network.
    pub fn new(
        label: impl Into<String>,
        network_id: impl Into<String>,
        creator: Option<String>,
        access: impl IntoIterator<Item = String>,
        allocated: bool,
    ) -> Self {
        Self {
            label: label.into(),
            network_id: network_id.into(),
            creator,
            access: access.into_iter().collect(),
            allocated,
        }
    }

    /// Returns true if the project may attach nodes to this network.
    ///
    /// Only administrator-created networks with an empty access set are
    /// public; the creator always has access.
    pub fn is_accessible_by(&self, project: &str) -> bool {
        if self.access.is_empty() && self.creator.is_none() {
            return true;
        }
        self.creator.as_deref() == Some(project) || self.access.contains(project)
    }
}

/// A queued change to a nic's network connectivity.
///
/// Rows are consumed and deleted one at a time; they are never updated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkingAction {
    /// Queue position
    pub id: ActionId,
    /// The nic whose switchport changes
    pub nic: NicRef,
    /// Network currently attached on the channel, if any
    pub old_network: Option<String>,
    /// Network to attach; `None` means detach
    pub new_network: Option<String>,
    /// Channel the change applies to
    pub channel: Channel,
}

impl NetworkingAction {
    /// Returns true if this action detaches a network.
    pub fn is_detach(&self) -> bool {
        self.new_network.is_none()
    }
}

impl fmt::Display for NetworkingAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} {} {}: {} -> {}",
            self.id,
            self.nic,
            self.channel,
            self.old_network.as_deref().unwrap_or("none"),
            self.new_network.as_deref().unwrap_or("none")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refs_display() {
        assert_eq!(NicRef::new("node-99", "ipmi").to_string(), "node-99/ipmi");
        assert_eq!(PortRef::new("switch", "104/0/10").to_string(), "switch:104/0/10");
    }

    #[test]
    fn test_nic_channel_of() {
        let mut nic = Nic::new("eth0", "00:11:22:33:44:55");
        nic.attachments.insert(Channel::Native, "hammernet".to_string());
        nic.attachments.insert(Channel::Tagged(7), "pxe".to_string());

        assert_eq!(nic.channel_of("hammernet"), Some(Channel::Native));
        assert_eq!(nic.channel_of("pxe"), Some(Channel::Tagged(7)));
        assert_eq!(nic.channel_of("other"), None);
    }

    #[test]
    fn test_network_access() {
        let public = Network::new("public", "100", None, Vec::new(), false);
        assert!(public.is_accessible_by("anyone"));

        let private = Network::new(
            "hammernet",
            "102",
            Some("anvil-nextgen".to_string()),
            vec!["anvil-nextgen".to_string()],
            true,
        );
        assert!(private.is_accessible_by("anvil-nextgen"));
        assert!(!private.is_accessible_by("other"));

        let owned = Network::new(
            "owned",
            "103",
            Some("anvil-nextgen".to_string()),
            Vec::new(),
            true,
        );
        assert!(owned.is_accessible_by("anvil-nextgen"));
        assert!(!owned.is_accessible_by("other"));
    }

    #[test]
    fn test_action_display() {
        let action = NetworkingAction {
            id: 3,
            nic: NicRef::new("node-99", "eth0"),
            old_network: None,
            new_network: Some("hammernet".to_string()),
            channel: Channel::Native,
        };
        assert_eq!(
            action.to_string(),
            "#3 node-99/eth0 vlan/native: none -> hammernet"
        );
        assert!(!action.is_detach());
    }
}
