//! Per-drain switch session cache.

use haas_model::Switch;
use haas_switch::{SwitchDriver, SwitchResult, SwitchSession};
use std::collections::hash_map::Entry;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Open sessions keyed by switch label, scoped to one drain.
///
/// The first action on a switch opens its session; later actions reuse it.
/// [`SessionCache::close_all`] must run when the drain ends, whether it
/// succeeded or not.
#[derive(Default)]
pub struct SessionCache {
    sessions: HashMap<String, Box<dyn SwitchSession>>,
    opened: usize,
}

impl SessionCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the open session for `switch`, opening one with `driver` on
    /// first use.
    ///
    /// A failed open is not cached; the error goes to the caller.
    pub async fn session_for(
        &mut self,
        switch: &Switch,
        driver: &dyn SwitchDriver,
    ) -> SwitchResult<&mut Box<dyn SwitchSession>> {
        match self.sessions.entry(switch.label.clone()) {
            Entry::Occupied(entry) => Ok(entry.into_mut()),
            Entry::Vacant(entry) => {
                let session = driver.open_session(switch).await?;
                self.opened += 1;
                debug!(switch = %switch.label, "Opened switch session");
                Ok(entry.insert(session))
            }
        }
    }

    /// Returns the number of sessions opened so far.
    pub fn opened_count(&self) -> usize {
        self.opened
    }

    /// Returns the number of sessions currently open.
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Returns true if no session is open.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Closes every open session once.
    ///
    /// Close failures are logged and dropped. Returns the number of sessions
    /// closed.
    pub async fn close_all(&mut self) -> usize {
        let sessions = std::mem::take(&mut self.sessions);
        let count = sessions.len();
        for (switch, mut session) in sessions {
            if let Err(e) = session.close().await {
                warn!(switch = %switch, error = %e, "Failed to close switch session");
            } else {
                debug!(switch = %switch, "Closed switch session");
            }
        }
        count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use haas_switch::drivers::{mock, MockSwitchDriver};

    #[tokio::test]
    async fn test_session_reuse() {
        let driver = MockSwitchDriver::new();
        let a = Switch::new("a", mock::API_NAME, Vec::new());
        let b = Switch::new("b", mock::API_NAME, Vec::new());
        let mut cache = SessionCache::new();

        for switch in [&a, &b, &a] {
            let session = cache.session_for(switch, &driver).await.unwrap();
            assert_eq!(session.switch_label(), switch.label);
        }
        assert_eq!(cache.opened_count(), 2);
        assert_eq!(cache.len(), 2);

        assert_eq!(cache.close_all().await, 2);
        assert!(cache.is_empty());
        assert_eq!(cache.close_all().await, 0);
    }
}
