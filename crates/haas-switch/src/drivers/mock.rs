//! In-memory switch driver.
//!
//! Keeps the VLAN configuration of every port in a shared table instead of
//! talking to hardware. The table outlives sessions, so it behaves like a
//! real switch across drains, and tests can inspect it through
//! [`MockSwitchState`].

use async_trait::async_trait;
use haas_model::{Channel, FieldValues, Switch};
use parking_lot::Mutex;
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tracing::{debug, instrument};

use crate::driver::{validate_schema, PortAction, SwitchDriver, SwitchSession};
use crate::error::{SwitchError, SwitchResult};

/// Api name of the mock driver.
pub const API_NAME: &str = "http://schema.massopencloud.org/haas/v0/switches/mock";

const REQUIRED_FIELDS: [&str; 3] = ["hostname", "username", "password"];

/// VLAN configuration of one mock port.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MockPortState {
    /// Network id carried untagged
    pub native: Option<String>,
    /// Tags carried tagged
    pub tagged: BTreeSet<u16>,
}

/// Shared port table: switch label -> port label -> state.
#[derive(Debug, Clone, Default)]
pub struct MockSwitchState {
    ports: Arc<Mutex<HashMap<String, HashMap<String, MockPortState>>>>,
}

impl MockSwitchState {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the state of a port, if it was ever configured.
    pub fn port(&self, switch: &str, port: &str) -> Option<MockPortState> {
        self.ports.lock().get(switch)?.get(port).cloned()
    }

    /// Returns the number of configured ports on a switch.
    pub fn port_count(&self, switch: &str) -> usize {
        self.ports.lock().get(switch).map_or(0, HashMap::len)
    }

    fn update(&self, switch: &str, port: &str, f: impl FnOnce(&mut MockPortState)) {
        let mut ports = self.ports.lock();
        let entry = ports
            .entry(switch.to_string())
            .or_default()
            .entry(port.to_string())
            .or_default();
        f(entry);
    }
}

/// Driver for the in-memory switch.
#[derive(Debug, Clone, Default)]
pub struct MockSwitchDriver {
    state: MockSwitchState,
}

impl MockSwitchDriver {
    /// Creates a driver with a fresh port table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a driver writing into an existing port table.
    pub fn with_state(state: MockSwitchState) -> Self {
        Self { state }
    }

    /// Returns the port table.
    pub fn state(&self) -> &MockSwitchState {
        &self.state
    }
}

#[async_trait]
impl SwitchDriver for MockSwitchDriver {
    fn api_name(&self) -> &str {
        API_NAME
    }

    fn validate(&self, config: &FieldValues) -> SwitchResult<()> {
        validate_schema(API_NAME, config, &REQUIRED_FIELDS, &[])
    }

    async fn open_session(&self, switch: &Switch) -> SwitchResult<Box<dyn SwitchSession>> {
        debug!(switch = %switch.label, "Opening mock switch session");
        Ok(Box::new(MockSession {
            switch: switch.label.clone(),
            state: self.state.clone(),
            closed: false,
        }))
    }
}

struct MockSession {
    switch: String,
    state: MockSwitchState,
    closed: bool,
}

#[async_trait]
impl SwitchSession for MockSession {
    fn switch_label(&self) -> &str {
        &self.switch
    }

    #[instrument(skip(self))]
    async fn apply(&mut self, action: &PortAction) -> SwitchResult<()> {
        if self.closed {
            return Err(SwitchError::apply(
                &self.switch,
                &action.port,
                "session already closed",
            ));
        }

        let new_id = action.new_network.as_ref().map(|n| n.network_id.clone());
        match action.channel {
            Channel::Native => self
                .state
                .update(&self.switch, &action.port, |port| port.native = new_id),
            Channel::Tagged(tag) => self.state.update(&self.switch, &action.port, |port| {
                if new_id.is_some() {
                    port.tagged.insert(tag);
                } else {
                    port.tagged.remove(&tag);
                }
            }),
        }

        debug!(action = %action, "Applied action to mock switch");
        Ok(())
    }

    async fn close(&mut self) -> SwitchResult<()> {
        self.closed = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::NetworkBinding;
    use haas_model::{field_values, NicRef};
    use pretty_assertions::assert_eq;

    fn action(channel: Channel, new_network: Option<&str>) -> PortAction {
        PortAction {
            action_id: 0,
            switch: "switch".to_string(),
            port: "104/0/10".to_string(),
            nic: NicRef::new("node-99", "ipmi"),
            channel,
            old_network: None,
            new_network: new_network.map(|id| NetworkBinding {
                label: format!("net-{}", id),
                network_id: id.to_string(),
            }),
        }
    }

    #[test]
    fn test_validate() {
        let driver = MockSwitchDriver::new();
        let config = field_values! {
            "hostname" => "http://example.com",
            "username" => "admin",
            "password" => "admin",
        };
        assert!(driver.validate(&config).is_ok());
        assert!(driver.validate(&Vec::new()).is_err());
    }

    #[tokio::test]
    async fn test_apply_native_and_tagged() {
        let driver = MockSwitchDriver::new();
        let switch = Switch::new("switch", API_NAME, Vec::new());
        let mut session = driver.open_session(&switch).await.unwrap();

        session.apply(&action(Channel::Native, Some("102"))).await.unwrap();
        session.apply(&action(Channel::Tagged(7), Some("7"))).await.unwrap();

        let state = driver.state().port("switch", "104/0/10").unwrap();
        assert_eq!(state.native.as_deref(), Some("102"));
        assert_eq!(state.tagged, BTreeSet::from([7]));

        session.apply(&action(Channel::Native, None)).await.unwrap();
        session.apply(&action(Channel::Tagged(7), None)).await.unwrap();
        assert_eq!(
            driver.state().port("switch", "104/0/10").unwrap(),
            MockPortState::default()
        );
    }

    #[tokio::test]
    async fn test_apply_is_idempotent() {
        let driver = MockSwitchDriver::new();
        let switch = Switch::new("switch", API_NAME, Vec::new());
        let mut session = driver.open_session(&switch).await.unwrap();

        let attach = action(Channel::Native, Some("102"));
        session.apply(&attach).await.unwrap();
        let once = driver.state().port("switch", "104/0/10");
        session.apply(&attach).await.unwrap();
        assert_eq!(driver.state().port("switch", "104/0/10"), once);
        assert_eq!(driver.state().port_count("switch"), 1);
    }

    #[tokio::test]
    async fn test_closed_session_rejects_apply() {
        let driver = MockSwitchDriver::new();
        let switch = Switch::new("switch", API_NAME, Vec::new());
        let mut session = driver.open_session(&switch).await.unwrap();
        session.close().await.unwrap();

        let err = session
            .apply(&action(Channel::Native, Some("102")))
            .await
            .unwrap_err();
        assert!(matches!(err, SwitchError::Apply { .. }));
    }
}
