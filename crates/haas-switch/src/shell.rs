//! Shell command execution for shell-backed switch drivers.
//!
//! Every command runs through `/bin/sh -c` with a hard deadline; a command
//! that outlives its deadline is killed and reported as
//! [`SwitchError::CommandTimeout`]. Arguments that come from the topology
//! (port labels, bridge names) must go through [`shellquote`].
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use haas_switch::shell::{self, BRIDGE_CMD, shellquote};
//!
//! let cmd = format!("{} vlan show dev {}", BRIDGE_CMD, shellquote("eth1"));
//! let output = shell::exec_or_throw(&cmd, Duration::from_secs(5)).await?;
//! ```

use once_cell::sync::Lazy;
use regex::Regex;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use crate::error::{SwitchError, SwitchResult};

/// Path to the `ip` command for network interface configuration.
pub const IP_CMD: &str = "/sbin/ip";

/// Path to the `bridge` command for bridge/VLAN configuration.
pub const BRIDGE_CMD: &str = "/sbin/bridge";

/// Regex for characters that need escaping in shell double-quotes.
/// Matches: $, `, ", \, and newline
static SHELL_ESCAPE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"([$`"\\\n])"#).expect("Invalid regex pattern"));

/// Quotes a string for safe use in shell commands.
///
/// Wraps the string in double quotes and escapes `$`, `` ` ``, `"`, `\` and
/// newline.
///
/// # Example
///
/// ```
/// use haas_switch::shell::shellquote;
///
/// assert_eq!(shellquote("eth1"), "\"eth1\"");
/// assert_eq!(shellquote("with$var"), "\"with\\$var\"");
/// ```
pub fn shellquote(s: &str) -> String {
    let escaped = SHELL_ESCAPE_RE.replace_all(s, r"\$1");
    format!("\"{}\"", escaped)
}

/// Result of a shell command execution.
#[derive(Debug, Clone)]
pub struct ExecResult {
    /// The exit code of the command (0 = success).
    pub exit_code: i32,
    /// The stdout output.
    pub stdout: String,
    /// The stderr output.
    pub stderr: String,
}

impl ExecResult {
    /// Returns true if the command succeeded (exit code 0).
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Returns the combined output (stdout + stderr) for error messages.
    pub fn combined_output(&self) -> String {
        if self.stderr.is_empty() {
            self.stdout.clone()
        } else if self.stdout.is_empty() {
            self.stderr.clone()
        } else {
            format!("{}\n{}", self.stdout, self.stderr)
        }
    }
}

/// Executes a shell command, giving up after `timeout`.
///
/// A non-zero exit is not an error here; see [`exec_or_throw`].
pub async fn exec(cmd: &str, timeout: Duration) -> SwitchResult<ExecResult> {
    tracing::debug!(command = %cmd, timeout_ms = timeout.as_millis() as u64, "Executing shell command");

    let child = Command::new("/bin/sh")
        .arg("-c")
        .arg(cmd)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output();

    let output = tokio::time::timeout(timeout, child)
        .await
        .map_err(|_| SwitchError::CommandTimeout {
            command: cmd.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        })?
        .map_err(|e| SwitchError::ShellExec {
            command: cmd.to_string(),
            source: e,
        })?;

    let exit_code = output.status.code().unwrap_or(-1);
    let result = ExecResult {
        exit_code,
        stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    };

    if result.success() {
        tracing::trace!(command = %cmd, exit_code = exit_code, "Command succeeded");
    } else {
        tracing::warn!(
            command = %cmd,
            exit_code = exit_code,
            stderr = %result.stderr,
            "Command failed"
        );
    }

    Ok(result)
}

/// Executes a shell command and fails on non-zero exit.
///
/// Returns stdout on success.
pub async fn exec_or_throw(cmd: &str, timeout: Duration) -> SwitchResult<String> {
    let result = exec(cmd, timeout).await?;
    if result.success() {
        Ok(result.stdout)
    } else {
        Err(SwitchError::ShellCommandFailed {
            command: cmd.to_string(),
            exit_code: result.exit_code,
            output: result.combined_output(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TIMEOUT: Duration = Duration::from_secs(5);

    #[test]
    fn test_shellquote_simple() {
        assert_eq!(shellquote("simple"), "\"simple\"");
        assert_eq!(shellquote("104/0/10"), "\"104/0/10\"");
    }

    #[test]
    fn test_shellquote_special_chars() {
        assert_eq!(shellquote("$HOME"), "\"\\$HOME\"");
        assert_eq!(shellquote("`whoami`"), "\"\\`whoami\\`\"");
        assert_eq!(shellquote("say \"hello\""), "\"say \\\"hello\\\"\"");
        assert_eq!(shellquote("path\\to"), "\"path\\\\to\"");
        assert_eq!(shellquote(""), "\"\"");
    }

    #[test]
    fn test_exec_result_combined() {
        let result = ExecResult {
            exit_code: 0,
            stdout: "stdout".to_string(),
            stderr: "stderr".to_string(),
        };
        assert!(result.success());
        assert_eq!(result.combined_output(), "stdout\nstderr");
    }

    #[tokio::test]
    async fn test_exec_echo() {
        let result = exec("echo hello", TIMEOUT).await.unwrap();
        assert!(result.success());
        assert_eq!(result.stdout, "hello");
    }

    #[tokio::test]
    async fn test_exec_or_throw_failure() {
        match exec_or_throw("exit 3", TIMEOUT).await {
            Err(SwitchError::ShellCommandFailed { exit_code, .. }) => assert_eq!(exit_code, 3),
            other => panic!("Expected ShellCommandFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_exec_timeout() {
        let result = exec("sleep 5", Duration::from_millis(50)).await;
        assert!(matches!(
            result,
            Err(SwitchError::CommandTimeout { timeout_ms: 50, .. })
        ));
    }
}
