//! Access to the pending action queue and the topology it refers to.
//!
//! The engine only needs four things from storage: the oldest pending action,
//! the switchport it targets, a way to commit it once applied, and the queue
//! depth. [`ActionStore`] is that seam; [`MemoryStore`] implements it over an
//! in-process [`Topology`], optionally backed by a JSON state file.

use async_trait::async_trait;
use haas_model::{FieldValues, NetworkingAction, Switch, Topology, TopologyResult};
use haas_switch::{DriverRegistry, PortAction};
use parking_lot::Mutex;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::{RegistrationError, StoreError, StoreResult};

/// An action resolved against the topology.
#[derive(Debug, Clone)]
pub struct ResolvedAction {
    /// The switch owning the target port
    pub switch: Switch,
    /// The action expressed as a port change
    pub action: PortAction,
}

/// Storage used by the engine.
#[async_trait]
pub trait ActionStore: Send + Sync {
    /// Returns the oldest pending action without removing it.
    async fn peek_oldest(&self) -> StoreResult<Option<NetworkingAction>>;

    /// Resolves the nic -> port -> switch chain of an action.
    async fn resolve(&self, action: &NetworkingAction) -> StoreResult<ResolvedAction>;

    /// Removes an applied action and records its effect on the nic, in one
    /// transaction.
    async fn commit_applied(&self, action: &NetworkingAction) -> StoreResult<()>;

    /// Returns the number of pending actions.
    async fn pending_count(&self) -> StoreResult<usize>;
}

/// In-memory store over a [`Topology`].
///
/// Mutations go through [`MemoryStore::update`], which applies them to a copy
/// and swaps it in only on success, so a failed operation leaves no partial
/// state behind. With a state file, every successful mutation (including each
/// committed action) is written to disk before it becomes visible, so a
/// restarted daemon resumes from the last commit.
#[derive(Debug, Default)]
pub struct MemoryStore {
    topology: Mutex<Topology>,
    state_file: Option<PathBuf>,
}

impl MemoryStore {
    /// Creates a store holding `topology`.
    pub fn new(topology: Topology) -> Self {
        Self {
            topology: Mutex::new(topology),
            state_file: None,
        }
    }

    /// Creates a store from a JSON topology snapshot.
    pub fn from_json(json: &str) -> StoreResult<Self> {
        let topology: Topology = serde_json::from_str(json)?;
        Ok(Self::new(topology))
    }

    /// Opens a store persisted at `path`.
    pub fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|source| StoreError::StateFile {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::from_json(&json)?.with_state_file(path))
    }

    /// Persists every later mutation to `path`.
    ///
    /// Nothing is written until the next mutation or [`MemoryStore::save`].
    pub fn with_state_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.state_file = Some(path.into());
        self
    }

    /// Returns the state file, if any.
    pub fn state_file(&self) -> Option<&Path> {
        self.state_file.as_deref()
    }

    /// Writes the current topology to the state file.
    pub fn save(&self) -> StoreResult<()> {
        let topology = self.topology.lock();
        self.persist(&topology)
    }

    /// Serializes the current topology as JSON.
    pub fn to_json(&self) -> StoreResult<String> {
        Ok(serde_json::to_string_pretty(&*self.topology.lock())?)
    }

    /// Runs `f` against the current topology.
    pub fn read<R>(&self, f: impl FnOnce(&Topology) -> R) -> R {
        f(&self.topology.lock())
    }

    /// Returns a copy of the current topology.
    pub fn snapshot(&self) -> Topology {
        self.topology.lock().clone()
    }

    /// Runs a topology operation as a transaction.
    pub fn update<R>(&self, f: impl FnOnce(&mut Topology) -> TopologyResult<R>) -> StoreResult<R> {
        Ok(self.transact(f)??)
    }

    /// Applies `f` to a draft and, if it succeeds, persists the draft and
    /// swaps it in. The outer error is a storage failure, the inner one the
    /// topology's refusal.
    fn transact<R>(
        &self,
        f: impl FnOnce(&mut Topology) -> TopologyResult<R>,
    ) -> StoreResult<TopologyResult<R>> {
        let mut topology = self.topology.lock();
        let mut draft = topology.clone();
        let result = match f(&mut draft) {
            Ok(result) => result,
            Err(e) => return Ok(Err(e)),
        };
        self.persist(&draft)?;
        *topology = draft;
        Ok(Ok(result))
    }

    /// Atomically replaces the state file with `topology`.
    fn persist(&self, topology: &Topology) -> StoreResult<()> {
        let Some(path) = &self.state_file else {
            return Ok(());
        };
        let state_file_error = |source: std::io::Error| StoreError::StateFile {
            path: path.clone(),
            source,
        };

        let json = serde_json::to_vec_pretty(topology)?;
        let dir = path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let mut file = NamedTempFile::new_in(dir).map_err(state_file_error)?;
        file.write_all(&json).map_err(state_file_error)?;
        file.as_file().sync_all().map_err(state_file_error)?;
        file.persist(path).map_err(|e| state_file_error(e.error))?;
        Ok(())
    }

    /// Registers a switch after its driver accepted the configuration.
    pub fn register_switch(
        &self,
        registry: &DriverRegistry,
        label: &str,
        api_name: &str,
        config: FieldValues,
    ) -> Result<(), RegistrationError> {
        registry.validate_switch(api_name, &config)?;
        self.update(|t| t.register_switch(label, api_name, config))?;
        Ok(())
    }

    /// Registers a port after the switch's driver accepted the label.
    pub fn register_port(
        &self,
        registry: &DriverRegistry,
        switch: &str,
        label: &str,
    ) -> Result<(), RegistrationError> {
        let owner = self
            .read(|t| t.switch(switch).cloned())
            .ok_or_else(|| haas_model::TopologyError::not_found("switch", switch))?;
        registry.validate_port(&owner, label)?;
        self.update(|t| t.register_port(switch, label))?;
        Ok(())
    }
}

#[async_trait]
impl ActionStore for MemoryStore {
    async fn peek_oldest(&self) -> StoreResult<Option<NetworkingAction>> {
        Ok(self.read(|t| t.oldest_action().cloned()))
    }

    async fn resolve(&self, action: &NetworkingAction) -> StoreResult<ResolvedAction> {
        self.read(|t| {
            let target = t.action_target(action)?;
            Ok(ResolvedAction {
                switch: target.switch.clone(),
                action: PortAction::from_target(action, &target),
            })
        })
        .map_err(|source| StoreError::Resolve {
            action: action.id,
            source,
        })
    }

    async fn commit_applied(&self, action: &NetworkingAction) -> StoreResult<()> {
        self.transact(|t| t.complete_action(action.id))?
            .map_err(|source| StoreError::Commit {
                action: action.id,
                source,
            })?;
        debug!(action = action.id, "Committed networking action");
        Ok(())
    }

    async fn pending_count(&self) -> StoreResult<usize> {
        Ok(self.read(Topology::pending_count))
    }
}
