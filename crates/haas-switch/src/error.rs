//! Error types for switch drivers.
//!
//! All errors implement `std::error::Error` via `thiserror`.

use std::io;
use thiserror::Error;

/// Result type alias for driver operations.
pub type SwitchResult<T> = Result<T, SwitchError>;

/// Errors raised by switch drivers and the driver registry.
#[derive(Debug, Error)]
pub enum SwitchError {
    /// Driver configuration is malformed.
    #[error("Invalid configuration for {api_name}: {field}: {message}")]
    InvalidConfig {
        /// Driver the configuration was checked against.
        api_name: String,
        /// The field that failed validation.
        field: String,
        /// Error message.
        message: String,
    },

    /// Port label is not acceptable to the driver.
    #[error("Invalid port name '{port}': {message}")]
    InvalidPort {
        /// The port label.
        port: String,
        /// Error message.
        message: String,
    },

    /// No driver is registered for the api name.
    #[error("No switch driver registered for '{api_name}'")]
    UnknownDriver {
        /// The unknown api name.
        api_name: String,
    },

    /// A driver with the same api name is already registered.
    #[error("Switch driver '{api_name}' is already registered")]
    DuplicateDriver {
        /// The api name.
        api_name: String,
    },

    /// Could not reach or authenticate to the switch.
    #[error("Connection to switch '{switch}' failed: {message}")]
    Connection {
        /// Switch label.
        switch: String,
        /// Error message.
        message: String,
    },

    /// The switch rejected the change or could not realize it.
    #[error("Switch '{switch}' failed to configure port '{port}': {message}")]
    Apply {
        /// Switch label.
        switch: String,
        /// Port label.
        port: String,
        /// Error message.
        message: String,
    },

    /// Failed to execute a shell command (spawn error).
    #[error("Failed to execute shell command '{command}': {source}")]
    ShellExec {
        /// The command that failed to execute.
        command: String,
        /// The underlying IO error.
        #[source]
        source: io::Error,
    },

    /// Shell command returned non-zero exit code.
    #[error("Shell command failed: '{command}' (exit code {exit_code}): {output}")]
    ShellCommandFailed {
        /// The command that failed.
        command: String,
        /// The exit code.
        exit_code: i32,
        /// Combined stdout/stderr output.
        output: String,
    },

    /// Shell command did not finish in time.
    #[error("Shell command timed out after {timeout_ms}ms: '{command}'")]
    CommandTimeout {
        /// The command that was abandoned.
        command: String,
        /// The timeout that expired.
        timeout_ms: u64,
    },
}

impl SwitchError {
    /// Creates an invalid configuration error.
    pub fn invalid_config(
        api_name: impl Into<String>,
        field: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::InvalidConfig {
            api_name: api_name.into(),
            field: field.into(),
            message: message.into(),
        }
    }

    /// Creates an invalid port error.
    pub fn invalid_port(port: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidPort {
            port: port.into(),
            message: message.into(),
        }
    }

    /// Creates a connection error.
    pub fn connection(switch: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Connection {
            switch: switch.into(),
            message: message.into(),
        }
    }

    /// Creates an apply error.
    pub fn apply(
        switch: impl Into<String>,
        port: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Apply {
            switch: switch.into(),
            port: port.into(),
            message: message.into(),
        }
    }

    /// Returns true for configuration and port-name validation failures,
    /// which are reported at registration time.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            SwitchError::InvalidConfig { .. } | SwitchError::InvalidPort { .. }
        )
    }

    /// Returns true if this error indicates a transient condition
    /// that may succeed on retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SwitchError::Connection { .. }
                | SwitchError::ShellCommandFailed { .. }
                | SwitchError::CommandTimeout { .. }
        )
    }
}
