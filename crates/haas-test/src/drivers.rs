//! Spy and oracle switch drivers
//!
//! Both drivers keep their observations behind shared handles, so a test can
//! register a clone with the engine and inspect the original afterwards.

use async_trait::async_trait;
use haas_model::{ActionId, FieldValues, Switch};
use haas_switch::{
    validate_schema, PortAction, SwitchDriver, SwitchError, SwitchResult, SwitchSession,
};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Api name of the [`RecordingDriver`].
pub const RECORDING_API_NAME: &str = "http://schema.massopencloud.org/haas/v0/switches/test";

/// Api name of the [`CountingDriver`].
pub const COUNTING_API_NAME: &str = "http://schema.massopencloud.org/haas/v0/switches/deferred";

/// Message returned by the [`CountingDriver`] when the queue did not shrink by
/// exactly one between applies.
pub const NOT_COMMITTED: &str = "network daemon did not commit previous change!";

const REQUIRED_FIELDS: [&str; 3] = ["hostname", "username", "password"];

/// Everything a [`RecordingDriver`] observed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DriverLog {
    /// Action ids passed to `apply`, including failed ones
    pub attempted: Vec<ActionId>,
    /// Action ids applied successfully, in order
    pub applied: Vec<ActionId>,
    /// Switch labels of opened sessions
    pub opened: Vec<String>,
    /// Switch labels of closed sessions
    pub closed: Vec<String>,
}

#[derive(Debug, Default)]
struct Faults {
    fail_actions: HashSet<ActionId>,
    fail_open: HashSet<String>,
    fail_close: bool,
    apply_delay: Option<Duration>,
}

/// A driver that records every call and fails on demand.
#[derive(Clone, Default)]
pub struct RecordingDriver {
    log: Arc<Mutex<DriverLog>>,
    faults: Arc<Mutex<Faults>>,
}

impl fmt::Debug for RecordingDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordingDriver")
            .field("log", &*self.log.lock())
            .finish()
    }
}

impl RecordingDriver {
    /// Creates a driver with no faults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every apply of `action` fail until faults are cleared.
    pub fn fail_action(&self, action: ActionId) {
        self.faults.lock().fail_actions.insert(action);
    }

    /// Makes opening a session to `switch` fail until faults are cleared.
    pub fn fail_open(&self, switch: &str) {
        self.faults.lock().fail_open.insert(switch.to_string());
    }

    /// Makes every session close fail.
    pub fn fail_close(&self) {
        self.faults.lock().fail_close = true;
    }

    /// Delays every apply by `delay`.
    pub fn set_apply_delay(&self, delay: Duration) {
        self.faults.lock().apply_delay = Some(delay);
    }

    /// Removes all injected faults and delays.
    pub fn clear_faults(&self) {
        *self.faults.lock() = Faults::default();
    }

    /// Returns a copy of the call log.
    pub fn log(&self) -> DriverLog {
        self.log.lock().clone()
    }

    /// Returns the successfully applied action ids, in order.
    pub fn applied(&self) -> Vec<ActionId> {
        self.log.lock().applied.clone()
    }

    /// Returns the number of `apply` calls, including failed ones.
    pub fn apply_calls(&self) -> usize {
        self.log.lock().attempted.len()
    }

    /// Clears the call log.
    pub fn reset_log(&self) {
        *self.log.lock() = DriverLog::default();
    }
}

#[async_trait]
impl SwitchDriver for RecordingDriver {
    fn api_name(&self) -> &str {
        RECORDING_API_NAME
    }

    fn validate(&self, config: &FieldValues) -> SwitchResult<()> {
        validate_schema(RECORDING_API_NAME, config, &REQUIRED_FIELDS, &[])
    }

    async fn open_session(&self, switch: &Switch) -> SwitchResult<Box<dyn SwitchSession>> {
        if self.faults.lock().fail_open.contains(&switch.label) {
            return Err(SwitchError::connection(&switch.label, "injected failure"));
        }
        self.log.lock().opened.push(switch.label.clone());
        Ok(Box::new(RecordingSession {
            switch: switch.label.clone(),
            log: Arc::clone(&self.log),
            faults: Arc::clone(&self.faults),
        }))
    }
}

struct RecordingSession {
    switch: String,
    log: Arc<Mutex<DriverLog>>,
    faults: Arc<Mutex<Faults>>,
}

#[async_trait]
impl SwitchSession for RecordingSession {
    fn switch_label(&self) -> &str {
        &self.switch
    }

    async fn apply(&mut self, action: &PortAction) -> SwitchResult<()> {
        let (delay, fail) = {
            let faults = self.faults.lock();
            (
                faults.apply_delay,
                faults.fail_actions.contains(&action.action_id),
            )
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut log = self.log.lock();
        log.attempted.push(action.action_id);
        if fail {
            return Err(SwitchError::apply(
                &self.switch,
                &action.port,
                "injected failure",
            ));
        }
        log.applied.push(action.action_id);
        debug!(action = %action, "Recorded apply");
        Ok(())
    }

    async fn close(&mut self) -> SwitchResult<()> {
        self.log.lock().closed.push(self.switch.clone());
        if self.faults.lock().fail_close {
            return Err(SwitchError::connection(&self.switch, "injected close failure"));
        }
        Ok(())
    }
}

type PendingCount = dyn Fn() -> usize + Send + Sync;

#[derive(Debug, Default)]
struct CountState {
    last_count: Option<usize>,
    open_sessions: usize,
}

/// A driver asserting that the queue shrinks by exactly one between applies.
///
/// Each apply reads the queue depth; if a previous apply in the same drain
/// saw depth `n`, this one must see `n - 1`. Anything else means an action
/// was applied twice or was not committed, and the apply fails with
/// [`NOT_COMMITTED`]. The check spans every session of the drain and starts
/// over once all sessions are closed.
#[derive(Clone)]
pub struct CountingDriver {
    pending: Arc<PendingCount>,
    state: Arc<Mutex<CountState>>,
    applies: Arc<Mutex<usize>>,
}

impl fmt::Debug for CountingDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CountingDriver")
            .field("state", &*self.state.lock())
            .field("applies", &*self.applies.lock())
            .finish()
    }
}

impl CountingDriver {
    /// Creates a driver reading the queue depth through `pending`.
    pub fn new(pending: impl Fn() -> usize + Send + Sync + 'static) -> Self {
        Self {
            pending: Arc::new(pending),
            state: Arc::new(Mutex::new(CountState::default())),
            applies: Arc::new(Mutex::new(0)),
        }
    }

    /// Returns the number of successful applies.
    pub fn applies(&self) -> usize {
        *self.applies.lock()
    }
}

#[async_trait]
impl SwitchDriver for CountingDriver {
    fn api_name(&self) -> &str {
        COUNTING_API_NAME
    }

    fn validate(&self, config: &FieldValues) -> SwitchResult<()> {
        validate_schema(COUNTING_API_NAME, config, &REQUIRED_FIELDS, &[])
    }

    async fn open_session(&self, switch: &Switch) -> SwitchResult<Box<dyn SwitchSession>> {
        let mut state = self.state.lock();
        if state.open_sessions == 0 {
            // First session of a new drain.
            state.last_count = None;
        }
        state.open_sessions += 1;
        Ok(Box::new(CountingSession {
            switch: switch.label.clone(),
            driver: self.clone(),
            closed: false,
        }))
    }
}

struct CountingSession {
    switch: String,
    driver: CountingDriver,
    closed: bool,
}

#[async_trait]
impl SwitchSession for CountingSession {
    fn switch_label(&self) -> &str {
        &self.switch
    }

    async fn apply(&mut self, action: &PortAction) -> SwitchResult<()> {
        let current = (self.driver.pending)();
        let mut state = self.driver.state.lock();
        if let Some(previous) = state.last_count {
            if previous.checked_sub(1) != Some(current) {
                return Err(SwitchError::apply(&self.switch, &action.port, NOT_COMMITTED));
            }
        }
        state.last_count = Some(current);
        *self.driver.applies.lock() += 1;
        Ok(())
    }

    async fn close(&mut self) -> SwitchResult<()> {
        if !self.closed {
            self.closed = true;
            let mut state = self.driver.state.lock();
            state.open_sessions = state.open_sessions.saturating_sub(1);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::switch_config;
    use haas_model::{Channel, NicRef};
    use pretty_assertions::assert_eq;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn port_action(id: ActionId) -> PortAction {
        PortAction {
            action_id: id,
            switch: "switch".to_string(),
            port: "104/0/10".to_string(),
            nic: NicRef::new("node-99", "ipmi"),
            channel: Channel::Native,
            old_network: None,
            new_network: None,
        }
    }

    #[tokio::test]
    async fn test_recording_driver() {
        let driver = RecordingDriver::new();
        assert!(driver.validate(&switch_config()).is_ok());
        driver.fail_action(1);

        let switch = Switch::new("switch", RECORDING_API_NAME, switch_config());
        let mut session = driver.open_session(&switch).await.unwrap();
        session.apply(&port_action(0)).await.unwrap();
        assert!(session.apply(&port_action(1)).await.is_err());
        session.close().await.unwrap();

        assert_eq!(
            driver.log(),
            DriverLog {
                attempted: vec![0, 1],
                applied: vec![0],
                opened: vec!["switch".to_string()],
                closed: vec!["switch".to_string()],
            }
        );

        driver.fail_open("switch");
        assert!(driver.open_session(&switch).await.is_err());
        driver.clear_faults();
        assert!(driver.open_session(&switch).await.is_ok());
    }

    #[tokio::test]
    async fn test_counting_driver() {
        let depth = Arc::new(AtomicUsize::new(3));
        let reader = Arc::clone(&depth);
        let driver = CountingDriver::new(move || reader.load(Ordering::SeqCst));

        let switch = Switch::new("switch", COUNTING_API_NAME, switch_config());
        let mut session = driver.open_session(&switch).await.unwrap();
        session.apply(&port_action(0)).await.unwrap();
        depth.store(2, Ordering::SeqCst);
        session.apply(&port_action(1)).await.unwrap();

        // Not committed: depth unchanged.
        let err = session.apply(&port_action(2)).await.unwrap_err();
        assert!(err.to_string().contains(NOT_COMMITTED));
        assert_eq!(driver.applies(), 2);
    }

    #[tokio::test]
    async fn test_counting_driver_spans_sessions() {
        let depth = Arc::new(AtomicUsize::new(3));
        let reader = Arc::clone(&depth);
        let driver = CountingDriver::new(move || reader.load(Ordering::SeqCst));

        let a = Switch::new("a", COUNTING_API_NAME, switch_config());
        let b = Switch::new("b", COUNTING_API_NAME, switch_config());
        let mut on_a = driver.open_session(&a).await.unwrap();
        on_a.apply(&port_action(0)).await.unwrap();

        // Opening a second switch mid-drain keeps the previous depth.
        depth.store(1, Ordering::SeqCst);
        let mut on_b = driver.open_session(&b).await.unwrap();
        let err = on_b.apply(&port_action(1)).await.unwrap_err();
        assert!(err.to_string().contains(NOT_COMMITTED));

        depth.store(2, Ordering::SeqCst);
        on_b.apply(&port_action(1)).await.unwrap();
        depth.store(1, Ordering::SeqCst);
        on_a.apply(&port_action(2)).await.unwrap();
        on_a.close().await.unwrap();
        on_b.close().await.unwrap();

        // A new drain starts a fresh count.
        let mut again = driver.open_session(&a).await.unwrap();
        again.apply(&port_action(3)).await.unwrap();
        assert_eq!(driver.applies(), 4);
    }
}
