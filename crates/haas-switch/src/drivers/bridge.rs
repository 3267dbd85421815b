//! Driver for a Linux VLAN-filtering bridge.
//!
//! The switch is a local bridge device; its ports are the interfaces
//! enslaved to it. Changes go through `ip` and `bridge`, one command at a
//! time, each bounded by the driver's command timeout.
//!
//! Switch configuration:
//!
//! | field    | required | meaning                        |
//! |----------|----------|--------------------------------|
//! | `bridge` | yes      | name of the bridge device      |

use async_trait::async_trait;
use haas_model::channel::{MAX_VLAN_TAG, MIN_VLAN_TAG};
use haas_model::{Channel, FieldValues, FieldValuesExt, Switch};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument};

use crate::driver::{validate_schema, NetworkBinding, PortAction, SwitchDriver, SwitchSession};
use crate::error::{SwitchError, SwitchResult};
use crate::shell::{self, shellquote, BRIDGE_CMD, IP_CMD};

/// Api name of the linux-bridge driver.
pub const API_NAME: &str = "http://schema.massopencloud.org/haas/v0/switches/linux-bridge";

/// Default per-command timeout.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(10);

const BRIDGE_FIELD: &str = "bridge";

/// Linux interface names: at most 15 bytes, no whitespace or slashes.
static IFNAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9._-]{1,15}$").expect("Invalid regex pattern"));

fn is_ifname(name: &str) -> bool {
    IFNAME_RE.is_match(name)
}

/// Parses a network id into a VLAN id.
pub fn parse_vlan_id(network_id: &str) -> Option<u16> {
    network_id
        .parse::<u16>()
        .ok()
        .filter(|vid| (MIN_VLAN_TAG..=MAX_VLAN_TAG).contains(vid))
}

/// Build check bridge exists command
pub fn build_check_bridge_cmd(bridge: &str) -> String {
    format!("{} link show {}", IP_CMD, shellquote(bridge))
}

/// Build enslave port command
pub fn build_enslave_port_cmd(port: &str, bridge: &str) -> String {
    format!(
        "{} link set dev {} master {}",
        IP_CMD,
        shellquote(port),
        shellquote(bridge)
    )
}

/// Build add port VLAN command
pub fn build_add_port_vlan_cmd(port: &str, vlan_id: u16, untagged: bool) -> String {
    let mode = if untagged { " pvid untagged" } else { "" };
    format!(
        "{} vlan add vid {} dev {}{}",
        BRIDGE_CMD,
        vlan_id,
        shellquote(port),
        mode
    )
}

/// Build remove port VLAN command
///
/// Removing a VLAN the port does not carry is not an error.
pub fn build_remove_port_vlan_cmd(port: &str, vlan_id: u16) -> String {
    format!(
        "{} vlan del vid {} dev {} 2>/dev/null || true",
        BRIDGE_CMD,
        vlan_id,
        shellquote(port)
    )
}

/// Builds the command sequence realizing one port action.
///
/// Every command is safe to rerun, so a partially applied action can be
/// retried from the start.
pub fn build_port_action_cmds(bridge: &str, action: &PortAction) -> SwitchResult<Vec<String>> {
    let vid = |binding: &NetworkBinding| {
        parse_vlan_id(&binding.network_id).ok_or_else(|| {
            SwitchError::apply(
                &action.switch,
                &action.port,
                format!("network id '{}' is not a VLAN id", binding.network_id),
            )
        })
    };

    let mut cmds = Vec::new();
    match (&action.new_network, action.channel) {
        (Some(new), Channel::Native) => {
            let new_vid = vid(new)?;
            cmds.push(build_enslave_port_cmd(&action.port, bridge));
            if let Some(old) = &action.old_network {
                let old_vid = vid(old)?;
                if old_vid != new_vid {
                    cmds.push(build_remove_port_vlan_cmd(&action.port, old_vid));
                }
            }
            cmds.push(build_add_port_vlan_cmd(&action.port, new_vid, true));
        }
        (Some(_), Channel::Tagged(tag)) => {
            cmds.push(build_enslave_port_cmd(&action.port, bridge));
            cmds.push(build_add_port_vlan_cmd(&action.port, tag, false));
        }
        (None, Channel::Native) => {
            if let Some(old) = &action.old_network {
                cmds.push(build_remove_port_vlan_cmd(&action.port, vid(old)?));
            }
        }
        (None, Channel::Tagged(tag)) => {
            cmds.push(build_remove_port_vlan_cmd(&action.port, tag));
        }
    }
    Ok(cmds)
}

/// Driver for Linux VLAN-filtering bridges.
#[derive(Debug, Clone)]
pub struct LinuxBridgeDriver {
    command_timeout: Duration,
    dry_run: bool,
    captured_commands: Arc<Mutex<Vec<String>>>,
}

impl Default for LinuxBridgeDriver {
    fn default() -> Self {
        Self::new(DEFAULT_COMMAND_TIMEOUT)
    }
}

impl LinuxBridgeDriver {
    /// Creates a driver that runs commands with the given timeout.
    pub fn new(command_timeout: Duration) -> Self {
        Self {
            command_timeout,
            dry_run: false,
            captured_commands: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Records commands instead of running them.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Returns the commands recorded in dry-run mode.
    pub fn captured_commands(&self) -> Vec<String> {
        self.captured_commands.lock().clone()
    }
}

#[async_trait]
impl SwitchDriver for LinuxBridgeDriver {
    fn api_name(&self) -> &str {
        API_NAME
    }

    fn validate(&self, config: &FieldValues) -> SwitchResult<()> {
        validate_schema(API_NAME, config, &[BRIDGE_FIELD], &[])?;
        let bridge = config.get_field_or(BRIDGE_FIELD, "");
        if !is_ifname(bridge) {
            return Err(SwitchError::invalid_config(
                API_NAME,
                BRIDGE_FIELD,
                format!("'{}' is not an interface name", bridge),
            ));
        }
        Ok(())
    }

    fn validate_port_label(&self, label: &str) -> SwitchResult<()> {
        if is_ifname(label) {
            Ok(())
        } else {
            Err(SwitchError::invalid_port(label, "not an interface name"))
        }
    }

    #[instrument(skip(self, switch), fields(switch = %switch.label))]
    async fn open_session(&self, switch: &Switch) -> SwitchResult<Box<dyn SwitchSession>> {
        let bridge = switch
            .config
            .get_field(BRIDGE_FIELD)
            .ok_or_else(|| SwitchError::connection(&switch.label, "no bridge configured"))?
            .to_string();

        if !self.dry_run {
            shell::exec_or_throw(&build_check_bridge_cmd(&bridge), self.command_timeout)
                .await
                .map_err(|e| SwitchError::connection(&switch.label, e.to_string()))?;
        }
        info!(bridge = %bridge, dry_run = self.dry_run, "Opened bridge session");

        Ok(Box::new(BridgeSession {
            switch: switch.label.clone(),
            bridge,
            timeout: self.command_timeout,
            dry_run: self.dry_run,
            captured_commands: Arc::clone(&self.captured_commands),
        }))
    }
}

struct BridgeSession {
    switch: String,
    bridge: String,
    timeout: Duration,
    dry_run: bool,
    captured_commands: Arc<Mutex<Vec<String>>>,
}

impl BridgeSession {
    async fn exec(&self, action: &PortAction, cmd: &str) -> SwitchResult<()> {
        if self.dry_run {
            debug!("Dry-run exec: {}", cmd);
            self.captured_commands.lock().push(cmd.to_string());
            return Ok(());
        }

        shell::exec_or_throw(cmd, self.timeout)
            .await
            .map(|_| ())
            .map_err(|e| match e {
                SwitchError::CommandTimeout { .. } | SwitchError::ShellExec { .. } => {
                    SwitchError::connection(&self.switch, e.to_string())
                }
                other => SwitchError::apply(&self.switch, &action.port, other.to_string()),
            })
    }
}

#[async_trait]
impl SwitchSession for BridgeSession {
    fn switch_label(&self) -> &str {
        &self.switch
    }

    #[instrument(skip(self, action), fields(action = %action))]
    async fn apply(&mut self, action: &PortAction) -> SwitchResult<()> {
        for cmd in build_port_action_cmds(&self.bridge, action)? {
            self.exec(action, &cmd).await?;
        }
        Ok(())
    }

    async fn close(&mut self) -> SwitchResult<()> {
        debug!(bridge = %self.bridge, "Closed bridge session");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use haas_model::{field_values, NicRef};
    use pretty_assertions::assert_eq;

    fn binding(id: &str) -> NetworkBinding {
        NetworkBinding {
            label: format!("net-{}", id),
            network_id: id.to_string(),
        }
    }

    fn action(channel: Channel, old: Option<&str>, new: Option<&str>) -> PortAction {
        PortAction {
            action_id: 1,
            switch: "br-switch".to_string(),
            port: "eth1".to_string(),
            nic: NicRef::new("node-99", "eth0"),
            channel,
            old_network: old.map(binding),
            new_network: new.map(binding),
        }
    }

    fn bridge_switch() -> Switch {
        Switch::new("br-switch", API_NAME, field_values! { "bridge" => "br0" })
    }

    #[test]
    fn test_parse_vlan_id() {
        assert_eq!(parse_vlan_id("102"), Some(102));
        assert_eq!(parse_vlan_id("4094"), Some(4094));
        assert_eq!(parse_vlan_id("0"), None);
        assert_eq!(parse_vlan_id("4095"), None);
        assert_eq!(parse_vlan_id("hammer"), None);
    }

    #[test]
    fn test_validate() {
        let driver = LinuxBridgeDriver::default();
        assert!(driver.validate(&field_values! { "bridge" => "br0" }).is_ok());
        assert!(driver.validate(&Vec::new()).is_err());
        assert!(driver
            .validate(&field_values! { "bridge" => "br0; reboot" })
            .unwrap_err()
            .is_validation());
        assert!(driver.validate_port_label("eth1").is_ok());
        assert!(driver.validate_port_label("104/0/10").is_err());
    }

    #[test]
    fn test_native_attach_cmds() {
        let cmds =
            build_port_action_cmds("br0", &action(Channel::Native, None, Some("102"))).unwrap();
        assert_eq!(
            cmds,
            vec![
                "/sbin/ip link set dev \"eth1\" master \"br0\"".to_string(),
                "/sbin/bridge vlan add vid 102 dev \"eth1\" pvid untagged".to_string(),
            ]
        );
    }

    #[test]
    fn test_native_replace_removes_old_vlan() {
        let native = action(Channel::Native, Some("101"), Some("102"));
        let cmds = build_port_action_cmds("br0", &native).unwrap();
        assert_eq!(cmds.len(), 3);
        assert_eq!(
            cmds[1],
            "/sbin/bridge vlan del vid 101 dev \"eth1\" 2>/dev/null || true"
        );
    }

    #[test]
    fn test_tagged_cmds() {
        let attach =
            build_port_action_cmds("br0", &action(Channel::Tagged(7), None, Some("7"))).unwrap();
        assert_eq!(attach[1], "/sbin/bridge vlan add vid 7 dev \"eth1\"");

        let detach =
            build_port_action_cmds("br0", &action(Channel::Tagged(7), Some("7"), None)).unwrap();
        assert_eq!(
            detach,
            vec!["/sbin/bridge vlan del vid 7 dev \"eth1\" 2>/dev/null || true".to_string()]
        );
    }

    #[test]
    fn test_bad_network_id() {
        let bad = action(Channel::Native, None, Some("hammer"));
        let err = build_port_action_cmds("br0", &bad).unwrap_err();
        assert!(matches!(err, SwitchError::Apply { .. }));
    }

    #[tokio::test]
    async fn test_dry_run_session() {
        let driver = LinuxBridgeDriver::default().with_dry_run(true);
        let mut session = driver.open_session(&bridge_switch()).await.unwrap();
        session
            .apply(&action(Channel::Native, None, Some("102")))
            .await
            .unwrap();
        session
            .apply(&action(Channel::Native, Some("102"), None))
            .await
            .unwrap();
        session.close().await.unwrap();

        let cmds = driver.captured_commands();
        assert_eq!(cmds.len(), 3);
        assert!(cmds[2].contains("vlan del vid 102"));
    }

    #[tokio::test]
    async fn test_open_session_without_bridge_field() {
        let driver = LinuxBridgeDriver::default().with_dry_run(true);
        let switch = Switch::new("br-switch", API_NAME, Vec::new());
        let err = driver.open_session(&switch).await.err().unwrap();
        assert!(matches!(err, SwitchError::Connection { .. }));
    }
}
