//! Error types for the deferred networking engine.

use haas_model::{ActionId, TopologyError};
use haas_switch::SwitchError;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for drain operations.
pub type DrainResult<T> = Result<T, DrainError>;

/// Result type alias for action store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised by an action store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The action's nic, port or switch could not be resolved.
    #[error("Cannot resolve action #{action}: {source}")]
    Resolve {
        /// The action being resolved.
        action: ActionId,
        /// What was missing.
        #[source]
        source: TopologyError,
    },

    /// The applied action could not be committed.
    #[error("Cannot commit action #{action}: {source}")]
    Commit {
        /// The action being committed.
        action: ActionId,
        /// Why the commit was refused.
        #[source]
        source: TopologyError,
    },

    /// A topology snapshot could not be read or written.
    #[error("Invalid topology snapshot: {0}")]
    Snapshot(#[from] serde_json::Error),

    /// The topology rejected an update.
    #[error(transparent)]
    Topology(#[from] TopologyError),

    /// The state file could not be read or replaced.
    #[error("Cannot access state file {}: {source}", .path.display())]
    StateFile {
        /// The state file.
        path: PathBuf,
        /// IO error.
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    /// Returns the action the error is about, if any.
    pub fn action_id(&self) -> Option<ActionId> {
        match self {
            StoreError::Resolve { action, .. } | StoreError::Commit { action, .. } => Some(*action),
            StoreError::Snapshot(_) | StoreError::Topology(_) | StoreError::StateFile { .. } => {
                None
            }
        }
    }
}

/// Errors that stop a drain.
///
/// The failing action stays at the head of the queue; every action before it
/// has been applied and committed.
#[derive(Debug, Error)]
pub enum DrainError {
    /// A session to the action's switch could not be opened.
    #[error("Action #{action}: cannot connect to switch '{switch}': {source}")]
    Connection {
        /// The failing action.
        action: ActionId,
        /// Switch label.
        switch: String,
        /// Driver error.
        #[source]
        source: SwitchError,
    },

    /// The driver failed to realize the action.
    #[error("Action #{action}: switch '{switch}' failed to apply: {source}")]
    Apply {
        /// The failing action.
        action: ActionId,
        /// Switch label.
        switch: String,
        /// Driver error.
        #[source]
        source: SwitchError,
    },

    /// The switch's api name has no registered driver.
    #[error("Action #{action}: no driver registered for switch '{switch}' ({api_name})")]
    UnknownDriver {
        /// The failing action.
        action: ActionId,
        /// Switch label.
        switch: String,
        /// The unknown api name.
        api_name: String,
    },

    /// Store access failed.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Another drain holds the engine.
    #[error("A drain is already in progress")]
    AlreadyDraining,

    /// The drain task was aborted, e.g. by runtime shutdown.
    #[error("Drain task aborted: {0}")]
    Aborted(String),
}

impl DrainError {
    /// Returns the id of the action that stopped the drain, if any.
    pub fn action_id(&self) -> Option<ActionId> {
        match self {
            DrainError::Connection { action, .. }
            | DrainError::Apply { action, .. }
            | DrainError::UnknownDriver { action, .. } => Some(*action),
            DrainError::Store(e) => e.action_id(),
            DrainError::AlreadyDraining | DrainError::Aborted(_) => None,
        }
    }

    /// Returns true if draining again later may succeed without operator
    /// intervention.
    pub fn is_retryable(&self) -> bool {
        match self {
            DrainError::Connection { .. }
            | DrainError::AlreadyDraining
            | DrainError::Aborted(_)
            | DrainError::Store(StoreError::StateFile { .. }) => true,
            DrainError::Apply { source, .. } => source.is_retryable(),
            DrainError::Store(StoreError::Commit { source, .. }) => source.is_retryable(),
            DrainError::UnknownDriver { .. } | DrainError::Store(_) => false,
        }
    }
}

/// Errors raised while registering switches and ports.
#[derive(Debug, Error)]
pub enum RegistrationError {
    /// The driver rejected the configuration or port label.
    #[error(transparent)]
    Validation(#[from] SwitchError),

    /// The topology rejected the registration.
    #[error(transparent)]
    Topology(#[from] TopologyError),

    /// The registration could not be stored.
    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for RegistrationError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::Topology(e) => RegistrationError::Topology(e),
            other => RegistrationError::Store(other),
        }
    }
}
