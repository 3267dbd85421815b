//! Topology fixtures
//!
//! Every fixture returns a topology whose queue already holds the actions
//! under test, so a test only has to build an engine and drain.

use haas_model::{
    field_values, ActionId, Channel, FieldValues, NicRef, ObmHandle, PortRef, Topology,
    TopologyResult,
};

/// Project owning every fixture node
pub const PROJECT: &str = "anvil-nextgen";

/// Network attached by the fixtures
pub const NETWORK: &str = "hammernet";

/// Provider id (VLAN) of [`NETWORK`]
pub const NETWORK_ID: &str = "102";

/// Default switch label
pub const SWITCH: &str = "switch";

/// First switchport
pub const INTERFACE1: &str = "104/0/10";

/// Second switchport
pub const INTERFACE2: &str = "104/0/18";

/// Nic label used on every fixture node
pub const NIC: &str = "ipmi";

/// Mac address used on every fixture nic
pub const MACADDR: &str = "00:11:22:33:44:55";

/// Switch configuration accepted by the mock and recording drivers.
pub fn switch_config() -> FieldValues {
    field_values! {
        "hostname" => "http://example.com",
        "username" => "admin",
        "password" => "admin",
    }
}

/// Returns the nic of a fixture node.
pub fn nic(node: &str) -> NicRef {
    NicRef::new(node, NIC)
}

/// Creates the project and the network, with no switches or nodes.
pub fn base_topology() -> TopologyResult<Topology> {
    let mut topology = Topology::new();
    topology.register_project(PROJECT)?;
    topology.create_network(NETWORK, NETWORK_ID, Some(PROJECT), &[PROJECT], true)?;
    Ok(topology)
}

/// Registers a switch driven by `api_name`.
pub fn add_switch(topology: &mut Topology, label: &str, api_name: &str) -> TopologyResult<()> {
    topology.register_switch(label, api_name, switch_config())
}

/// Registers a node with one nic cabled to `switch:port` and allocates it to
/// [`PROJECT`].
pub fn add_cabled_node(
    topology: &mut Topology,
    node: &str,
    switch: &str,
    port: &str,
) -> TopologyResult<()> {
    topology.register_node(node, ObmHandle::default())?;
    topology.register_nic(node, NIC, MACADDR)?;
    topology.register_port(switch, port)?;
    topology.port_connect_nic(&PortRef::new(switch, port), &nic(node))?;
    topology.project_connect_node(PROJECT, node)
}

/// Queues a native attach of [`NETWORK`] on the node's nic.
pub fn queue_attach(topology: &mut Topology, node: &str) -> TopologyResult<ActionId> {
    topology.node_connect_network(&nic(node), NETWORK, Channel::Native)
}

/// The hammernet scenario: `node-99` on [`INTERFACE1`] and `node-98` on
/// [`INTERFACE2`] of one switch, each with a queued native attach of
/// [`NETWORK`].
pub fn hammernet(api_name: &str) -> TopologyResult<Topology> {
    let mut topology = base_topology()?;
    add_switch(&mut topology, SWITCH, api_name)?;
    for (node, port) in [("node-99", INTERFACE1), ("node-98", INTERFACE2)] {
        add_cabled_node(&mut topology, node, SWITCH, port)?;
        queue_attach(&mut topology, node)?;
    }
    Ok(topology)
}

/// One queued attach per entry of `switches`, in order.
///
/// Entry `i` uses node `node-i` on port `port-i` of switch `switches[i]`;
/// repeated labels share a switch.
pub fn queued_on_switches(api_name: &str, switches: &[&str]) -> TopologyResult<Topology> {
    let mut topology = base_topology()?;
    for (i, switch) in switches.iter().enumerate() {
        if topology.switch(switch).is_none() {
            add_switch(&mut topology, switch, api_name)?;
        }
        let node = format!("node-{}", i);
        add_cabled_node(&mut topology, &node, switch, &format!("port-{}", i))?;
        queue_attach(&mut topology, &node)?;
    }
    Ok(topology)
}

/// `count` queued attaches on one switch.
pub fn queued_actions(api_name: &str, count: usize) -> TopologyResult<Topology> {
    queued_on_switches(api_name, &vec![SWITCH; count])
}
