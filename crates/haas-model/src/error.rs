//! Error types for topology operations.

use thiserror::Error;

/// Result type alias for topology operations.
pub type TopologyResult<T> = Result<T, TopologyError>;

/// Errors raised when a topology change is refused or cannot be resolved.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TopologyError {
    /// Referenced entity does not exist.
    #[error("{kind} '{name}' not found")]
    NotFound {
        /// Entity kind (e.g., "node", "switch").
        kind: &'static str,
        /// Label of the missing entity.
        name: String,
    },

    /// Entity with the same label already exists.
    #[error("{kind} '{name}' already exists")]
    Duplicate {
        /// Entity kind.
        kind: &'static str,
        /// Conflicting label.
        name: String,
    },

    /// Entity is still in use and cannot be changed or removed.
    #[error("{kind} '{name}' is busy: {reason}")]
    Busy {
        /// Entity kind.
        kind: &'static str,
        /// Label of the busy entity.
        name: String,
        /// Why the operation was refused.
        reason: String,
    },

    /// A networking action is already pending on the nic.
    #[error("A networking operation is already pending on nic '{nic}'")]
    Blocked {
        /// The nic, as `node/nic`.
        nic: String,
    },

    /// The project may not use the network.
    #[error("Project '{project}' does not have access to network '{network}'")]
    NoAccess {
        /// Project label.
        project: String,
        /// Network label.
        network: String,
    },

    /// Channel string is malformed or not legal for the network.
    #[error("Invalid channel '{channel}': {message}")]
    BadChannel {
        /// The offending channel.
        channel: String,
        /// Error message.
        message: String,
    },

    /// The action is not at the head of the queue.
    #[error("Networking action {action} is not the oldest pending action")]
    OutOfOrder {
        /// The action id that was expected at the head.
        action: u64,
    },
}

impl TopologyError {
    /// Creates a not found error.
    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind,
            name: name.into(),
        }
    }

    /// Creates a duplicate error.
    pub fn duplicate(kind: &'static str, name: impl Into<String>) -> Self {
        Self::Duplicate {
            kind,
            name: name.into(),
        }
    }

    /// Creates a busy error.
    pub fn busy(kind: &'static str, name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Busy {
            kind,
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Creates a bad channel error.
    pub fn bad_channel(channel: impl Into<String>, message: impl Into<String>) -> Self {
        Self::BadChannel {
            channel: channel.into(),
            message: message.into(),
        }
    }

    /// Returns true if the refusal is expected to clear on its own, i.e. once
    /// the deferred engine has consumed the pending work.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TopologyError::Blocked { .. } | TopologyError::Busy { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TopologyError::not_found("node", "node-99");
        assert_eq!(err.to_string(), "node 'node-99' not found");

        let err = TopologyError::Blocked {
            nic: "node-99/ipmi".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "A networking operation is already pending on nic 'node-99/ipmi'"
        );
    }

    #[test]
    fn test_is_retryable() {
        assert!(TopologyError::Blocked {
            nic: "n/e".to_string()
        }
        .is_retryable());
        assert!(TopologyError::busy("port", "104/0/10", "attached").is_retryable());
        assert!(!TopologyError::duplicate("switch", "sw0").is_retryable());
    }
}
