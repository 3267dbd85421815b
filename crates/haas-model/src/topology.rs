//! Topology tables and admission-time operations.
//!
//! Every mutating method validates all of its preconditions before touching
//! any table, so a refused operation leaves the topology unchanged.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

use crate::channel::Channel;
use crate::entities::{
    ActionId, Network, NetworkingAction, Nic, NicRef, Node, ObmHandle, Port, PortRef, Project,
    Switch,
};
use crate::error::{TopologyError, TopologyResult};
use crate::fields::FieldValues;

/// Everything the deferred engine needs to realize one action on a switch.
#[derive(Debug, Clone, Copy)]
pub struct ActionTarget<'a> {
    /// Switch owning the nic's port
    pub switch: &'a Switch,
    /// The nic's port
    pub port: &'a Port,
    /// Network currently on the channel
    pub old_network: Option<&'a Network>,
    /// Network to put on the channel
    pub new_network: Option<&'a Network>,
}

/// The topology tables plus the networking action queue.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Topology {
    #[serde(default)]
    projects: BTreeMap<String, Project>,
    #[serde(default)]
    nodes: BTreeMap<String, Node>,
    #[serde(default)]
    switches: BTreeMap<String, Switch>,
    #[serde(default)]
    networks: BTreeMap<String, Network>,
    #[serde(default)]
    actions: BTreeMap<ActionId, NetworkingAction>,
    #[serde(default)]
    next_action_id: ActionId,
}

impl Topology {
    /// Creates an empty topology.
    pub fn new() -> Self {
        Self::default()
    }

    // ---- read access ----

    /// Returns the project with the given label.
    pub fn project(&self, label: &str) -> Option<&Project> {
        self.projects.get(label)
    }

    /// Returns the node with the given label.
    pub fn node(&self, label: &str) -> Option<&Node> {
        self.nodes.get(label)
    }

    /// Returns the referenced nic.
    pub fn nic(&self, nic: &NicRef) -> Option<&Nic> {
        self.nodes.get(&nic.node)?.nics.get(&nic.nic)
    }

    /// Returns the switch with the given label.
    pub fn switch(&self, label: &str) -> Option<&Switch> {
        self.switches.get(label)
    }

    /// Returns all switches.
    pub fn switches(&self) -> impl Iterator<Item = &Switch> {
        self.switches.values()
    }

    /// Returns the referenced port.
    pub fn port(&self, port: &PortRef) -> Option<&Port> {
        self.switches.get(&port.switch)?.ports.get(&port.port)
    }

    /// Returns the network with the given label.
    pub fn network(&self, label: &str) -> Option<&Network> {
        self.networks.get(label)
    }

    /// Returns the oldest pending action.
    pub fn oldest_action(&self) -> Option<&NetworkingAction> {
        self.actions.values().next()
    }

    /// Returns pending actions in apply order.
    pub fn pending_actions(&self) -> impl Iterator<Item = &NetworkingAction> {
        self.actions.values()
    }

    /// Returns the number of pending actions.
    pub fn pending_count(&self) -> usize {
        self.actions.len()
    }

    /// Returns true if an action is pending on the nic.
    pub fn has_pending_action(&self, nic: &NicRef) -> bool {
        self.actions.values().any(|a| &a.nic == nic)
    }

    // ---- registration ----

    /// Registers a project.
    pub fn register_project(&mut self, label: &str) -> TopologyResult<()> {
        if self.projects.contains_key(label) {
            return Err(TopologyError::duplicate("project", label));
        }
        self.projects.insert(
            label.to_string(),
            Project {
                label: label.to_string(),
            },
        );
        info!(project = label, "Registered project");
        Ok(())
    }

    /// Registers a node with its OBM handle.
    pub fn register_node(&mut self, label: &str, obm: ObmHandle) -> TopologyResult<()> {
        if self.nodes.contains_key(label) {
            return Err(TopologyError::duplicate("node", label));
        }
        self.nodes.insert(label.to_string(), Node::new(label, obm));
        info!(node = label, "Registered node");
        Ok(())
    }

    /// Registers a nic on an existing node.
    pub fn register_nic(&mut self, node: &str, label: &str, macaddr: &str) -> TopologyResult<()> {
        let node_entry = self
            .nodes
            .get_mut(node)
            .ok_or_else(|| TopologyError::not_found("node", node))?;
        if node_entry.nics.contains_key(label) {
            return Err(TopologyError::duplicate("nic", format!("{}/{}", node, label)));
        }
        node_entry
            .nics
            .insert(label.to_string(), Nic::new(label, macaddr));
        info!(node, nic = label, macaddr, "Registered nic");
        Ok(())
    }

    /// Registers a switch.
    ///
    /// The driver configuration must already have been validated by the
    /// switch's driver.
    pub fn register_switch(
        &mut self,
        label: &str,
        api_name: &str,
        config: FieldValues,
    ) -> TopologyResult<()> {
        if self.switches.contains_key(label) {
            return Err(TopologyError::duplicate("switch", label));
        }
        self.switches
            .insert(label.to_string(), Switch::new(label, api_name, config));
        info!(switch = label, api_name, "Registered switch");
        Ok(())
    }

    /// Registers a port on an existing switch.
    pub fn register_port(&mut self, switch: &str, label: &str) -> TopologyResult<()> {
        let switch_entry = self
            .switches
            .get_mut(switch)
            .ok_or_else(|| TopologyError::not_found("switch", switch))?;
        if switch_entry.ports.contains_key(label) {
            return Err(TopologyError::duplicate(
                "port",
                PortRef::new(switch, label).to_string(),
            ));
        }
        switch_entry.ports.insert(label.to_string(), Port::new(label));
        info!(switch, port = label, "Registered port");
        Ok(())
    }

    /// Creates a network.
    ///
    /// `creator` and every access project must exist, and the provider id must
    /// not already be in use. The creator is always added to the access set.
    pub fn create_network(
        &mut self,
        label: &str,
        network_id: &str,
        creator: Option<&str>,
        access: &[&str],
        allocated: bool,
    ) -> TopologyResult<()> {
        if self.networks.contains_key(label) {
            return Err(TopologyError::duplicate("network", label));
        }
        if self.networks.values().any(|n| n.network_id == network_id) {
            return Err(TopologyError::duplicate("network id", network_id));
        }
        for project in creator.iter().chain(access.iter()) {
            if !self.projects.contains_key(*project) {
                return Err(TopologyError::not_found("project", *project));
            }
        }

        let network = Network::new(
            label,
            network_id,
            creator.map(str::to_string),
            creator.iter().chain(access.iter()).map(|p| p.to_string()),
            allocated,
        );
        self.networks.insert(label.to_string(), network);
        info!(network = label, network_id, "Created network");
        Ok(())
    }

    // ---- cabling ----

    /// Records that the nic is cabled to the port.
    ///
    /// Both sides are updated together so the nic's port and the port's nic
    /// always agree.
    pub fn port_connect_nic(&mut self, port: &PortRef, nic: &NicRef) -> TopologyResult<()> {
        let port_entry = self
            .port(port)
            .ok_or_else(|| TopologyError::not_found("port", port.to_string()))?;
        if let Some(existing) = &port_entry.nic {
            return Err(TopologyError::busy(
                "port",
                port.to_string(),
                format!("already connected to {}", existing),
            ));
        }
        let nic_entry = self
            .nic(nic)
            .ok_or_else(|| TopologyError::not_found("nic", nic.to_string()))?;
        if let Some(existing) = &nic_entry.port {
            return Err(TopologyError::busy(
                "nic",
                nic.to_string(),
                format!("already connected to {}", existing),
            ));
        }

        self.port_mut(port)?.nic = Some(nic.clone());
        self.nic_mut(nic)?.port = Some(port.clone());
        info!(port = %port, nic = %nic, "Connected nic to port");
        Ok(())
    }

    /// Removes the cabling record of the port.
    pub fn port_detach_nic(&mut self, port: &PortRef) -> TopologyResult<()> {
        let port_entry = self
            .port(port)
            .ok_or_else(|| TopologyError::not_found("port", port.to_string()))?;
        let nic = port_entry
            .nic
            .clone()
            .ok_or_else(|| TopologyError::not_found("nic on port", port.to_string()))?;
        self.ensure_nic_idle(&nic)?;

        self.port_mut(port)?.nic = None;
        self.nic_mut(&nic)?.port = None;
        info!(port = %port, nic = %nic, "Detached nic from port");
        Ok(())
    }

    // ---- allocation ----

    /// Allocates a node to a project.
    pub fn project_connect_node(&mut self, project: &str, node: &str) -> TopologyResult<()> {
        if !self.projects.contains_key(project) {
            return Err(TopologyError::not_found("project", project));
        }
        let node_entry = self
            .nodes
            .get_mut(node)
            .ok_or_else(|| TopologyError::not_found("node", node))?;
        if let Some(owner) = &node_entry.project {
            return Err(TopologyError::busy(
                "node",
                node,
                format!("already allocated to project '{}'", owner),
            ));
        }
        node_entry.project = Some(project.to_string());
        info!(project, node, "Connected node to project");
        Ok(())
    }

    /// Returns a node to the free pool.
    ///
    /// Refused while any of the node's nics is attached to a network or has a
    /// pending action.
    pub fn project_detach_node(&mut self, project: &str, node: &str) -> TopologyResult<()> {
        let node_entry = self
            .nodes
            .get(node)
            .ok_or_else(|| TopologyError::not_found("node", node))?;
        if node_entry.project.as_deref() != Some(project) {
            return Err(TopologyError::not_found(
                "node in project",
                format!("{}/{}", project, node),
            ));
        }
        let nics: Vec<NicRef> = node_entry
            .nics
            .keys()
            .map(|nic| NicRef::new(node, nic.as_str()))
            .collect();
        for nic in &nics {
            self.ensure_nic_idle(nic)?;
        }

        if let Some(node_entry) = self.nodes.get_mut(node) {
            node_entry.project = None;
        }
        info!(project, node, "Detached node from project");
        Ok(())
    }

    /// Deletes a fully decommissioned node.
    pub fn delete_node(&mut self, label: &str) -> TopologyResult<()> {
        let node = self
            .nodes
            .get(label)
            .ok_or_else(|| TopologyError::not_found("node", label))?;
        if let Some(project) = &node.project {
            return Err(TopologyError::busy(
                "node",
                label,
                format!("allocated to project '{}'", project),
            ));
        }
        if let Some(nic) = node.nics.values().find(|nic| nic.port.is_some()) {
            return Err(TopologyError::busy(
                "node",
                label,
                format!("nic '{}' is connected to a port", nic.label),
            ));
        }
        self.nodes.remove(label);
        info!(node = label, "Deleted node");
        Ok(())
    }

    // ---- networking (enqueue side) ----

    /// Queues attaching `network` to the nic on `channel`.
    ///
    /// Admission checks: the node is allocated to a project with access to
    /// the network, the nic is cabled, the channel is legal for the network
    /// and free on the nic, the network is not already on the nic, and the nic
    /// has no pending action.
    pub fn node_connect_network(
        &mut self,
        nic: &NicRef,
        network: &str,
        channel: Channel,
    ) -> TopologyResult<ActionId> {
        let node = self
            .nodes
            .get(&nic.node)
            .ok_or_else(|| TopologyError::not_found("node", nic.node.as_str()))?;
        let nic_entry = node
            .nics
            .get(&nic.nic)
            .ok_or_else(|| TopologyError::not_found("nic", nic.to_string()))?;
        let network_entry = self
            .networks
            .get(network)
            .ok_or_else(|| TopologyError::not_found("network", network))?;

        let project = node.project.as_deref().ok_or_else(|| {
            TopologyError::busy("node", nic.node.as_str(), "not allocated to a project")
        })?;
        if !network_entry.is_accessible_by(project) {
            return Err(TopologyError::NoAccess {
                project: project.to_string(),
                network: network.to_string(),
            });
        }
        if nic_entry.port.is_none() {
            return Err(TopologyError::busy(
                "nic",
                nic.to_string(),
                "not connected to a switchport",
            ));
        }
        if !channel.carries(&network_entry.network_id) {
            return Err(TopologyError::bad_channel(
                channel.to_string(),
                format!("not legal for network '{}'", network),
            ));
        }
        if self.has_pending_action(nic) {
            return Err(TopologyError::Blocked {
                nic: nic.to_string(),
            });
        }
        if let Some(attached) = nic_entry.attachments.get(&channel) {
            return Err(TopologyError::busy(
                "nic",
                nic.to_string(),
                format!("channel {} already carries '{}'", channel, attached),
            ));
        }
        if let Some(existing) = nic_entry.channel_of(network) {
            return Err(TopologyError::busy(
                "nic",
                nic.to_string(),
                format!("network '{}' already attached on {}", network, existing),
            ));
        }

        Ok(self.enqueue(nic.clone(), None, Some(network.to_string()), channel))
    }

    /// Queues detaching `network` from the nic.
    pub fn node_detach_network(&mut self, nic: &NicRef, network: &str) -> TopologyResult<ActionId> {
        let nic_entry = self
            .nic(nic)
            .ok_or_else(|| TopologyError::not_found("nic", nic.to_string()))?;
        if !self.networks.contains_key(network) {
            return Err(TopologyError::not_found("network", network));
        }
        let channel = nic_entry.channel_of(network).ok_or_else(|| {
            TopologyError::not_found("attachment", format!("{} on {}", network, nic))
        })?;
        if self.has_pending_action(nic) {
            return Err(TopologyError::Blocked {
                nic: nic.to_string(),
            });
        }

        Ok(self.enqueue(nic.clone(), Some(network.to_string()), None, channel))
    }

    fn enqueue(
        &mut self,
        nic: NicRef,
        old_network: Option<String>,
        new_network: Option<String>,
        channel: Channel,
    ) -> ActionId {
        let id = self.next_action_id;
        self.next_action_id += 1;

        let action = NetworkingAction {
            id,
            nic,
            old_network,
            new_network,
            channel,
        };
        info!(action = %action, "Queued networking action");
        self.actions.insert(id, action);
        id
    }

    // ---- networking (apply side) ----

    /// Resolves the nic -> port -> switch chain and the networks of an action.
    pub fn action_target(&self, action: &NetworkingAction) -> TopologyResult<ActionTarget<'_>> {
        let nic = self
            .nic(&action.nic)
            .ok_or_else(|| TopologyError::not_found("nic", action.nic.to_string()))?;
        let port_ref = nic.port.as_ref().ok_or_else(|| {
            TopologyError::busy(
                "nic",
                action.nic.to_string(),
                "not connected to a switchport",
            )
        })?;
        let switch = self
            .switches
            .get(&port_ref.switch)
            .ok_or_else(|| TopologyError::not_found("switch", port_ref.switch.as_str()))?;
        let port = switch
            .ports
            .get(&port_ref.port)
            .ok_or_else(|| TopologyError::not_found("port", port_ref.to_string()))?;

        Ok(ActionTarget {
            switch,
            port,
            old_network: self.lookup_network(action.old_network.as_deref())?,
            new_network: self.lookup_network(action.new_network.as_deref())?,
        })
    }

    /// Removes an applied action and records its effect on the nic.
    ///
    /// Only the oldest pending action may complete; anything else would break
    /// the FIFO apply order.
    pub fn complete_action(&mut self, id: ActionId) -> TopologyResult<NetworkingAction> {
        match self.actions.keys().next() {
            Some(head) if *head == id => {}
            _ => return Err(TopologyError::OutOfOrder { action: id }),
        }

        let nic_ref = self.actions[&id].nic.clone();
        // Resolve before removing so a dangling nic leaves the queue untouched.
        self.nic_mut(&nic_ref)?;

        let action = self
            .actions
            .remove(&id)
            .ok_or(TopologyError::OutOfOrder { action: id })?;
        let nic = self.nic_mut(&nic_ref)?;
        match &action.new_network {
            Some(network) => {
                nic.attachments.insert(action.channel, network.clone());
            }
            None => {
                nic.attachments.remove(&action.channel);
            }
        }
        debug!(action = %action, "Completed networking action");
        Ok(action)
    }

    // ---- helpers ----

    fn lookup_network(&self, label: Option<&str>) -> TopologyResult<Option<&Network>> {
        label
            .map(|label| {
                self.networks
                    .get(label)
                    .ok_or_else(|| TopologyError::not_found("network", label))
            })
            .transpose()
    }

    fn port_mut(&mut self, port: &PortRef) -> TopologyResult<&mut Port> {
        self.switches
            .get_mut(&port.switch)
            .and_then(|s| s.ports.get_mut(&port.port))
            .ok_or_else(|| TopologyError::not_found("port", port.to_string()))
    }

    fn nic_mut(&mut self, nic: &NicRef) -> TopologyResult<&mut Nic> {
        self.nodes
            .get_mut(&nic.node)
            .and_then(|n| n.nics.get_mut(&nic.nic))
            .ok_or_else(|| TopologyError::not_found("nic", nic.to_string()))
    }

    fn ensure_nic_idle(&self, nic: &NicRef) -> TopologyResult<()> {
        if self.has_pending_action(nic) {
            return Err(TopologyError::Blocked {
                nic: nic.to_string(),
            });
        }
        let attached = self
            .nic(nic)
            .map(|n| !n.attachments.is_empty())
            .unwrap_or(false);
        if attached {
            return Err(TopologyError::busy(
                "nic",
                nic.to_string(),
                "still attached to networks",
            ));
        }
        Ok(())
    }
}
