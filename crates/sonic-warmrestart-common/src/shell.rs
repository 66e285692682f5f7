//! Shell command execution for the coordinators.
//!
//! The routing control plane is reached through `vtysh` and the kernel
//! neighbor table through `ip neigh`; both are run via `/bin/sh -c` with
//! every interpolated argument passed through [`shellquote`].

use once_cell::sync::Lazy;
use regex::Regex;
use std::process::Stdio;
use tokio::process::Command;

use crate::error::{WarmRestartError, WarmResult};

/// Path to the FRR `vtysh` shell.
pub const VTYSH_CMD: &str = "/usr/bin/vtysh";

/// Path to the `ip` command.
pub const IP_CMD: &str = "/sbin/ip";

/// Characters that need escaping inside shell double-quotes:
/// `$`, backtick, `"`, `\` and newline.
static SHELL_ESCAPE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"([$`"\\\n])"#).expect("Invalid regex pattern"));

/// Quotes a string for safe use in shell commands.
///
/// ```
/// use sonic_warmrestart_common::shell::shellquote;
///
/// assert_eq!(shellquote("10.0.0.1"), "\"10.0.0.1\"");
/// assert_eq!(shellquote("Vlan$1"), "\"Vlan\\$1\"");
/// ```
pub fn shellquote(s: &str) -> String {
    let escaped = SHELL_ESCAPE_RE.replace_all(s, r"\$1");
    format!("\"{}\"", escaped)
}

/// Result of a shell command execution.
#[derive(Debug, Clone)]
pub struct ExecResult {
    /// Exit code (0 = success, -1 when killed by a signal).
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ExecResult {
    /// Returns true if the command succeeded (exit code 0).
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Returns stdout and stderr joined, for error messages.
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

/// Executes a shell command and captures its output.
///
/// A non-zero exit is reported in the returned [`ExecResult`], not as an
/// error; only a failure to spawn the shell is an error.
pub async fn exec(cmd: &str) -> WarmResult<ExecResult> {
    tracing::debug!(command = %cmd, "Executing shell command");

    let output = Command::new("/bin/sh")
        .arg("-c")
        .arg(cmd)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| WarmRestartError::ShellExec {
            command: cmd.to_string(),
            source: e,
        })?;

    let result = ExecResult {
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    };

    if !result.success() {
        tracing::debug!(
            command = %cmd,
            exit_code = result.exit_code,
            stderr = %result.stderr,
            "Command returned non-zero"
        );
    }

    Ok(result)
}

/// Executes a shell command and returns stdout, failing on non-zero exit.
pub async fn exec_or_throw(cmd: &str) -> WarmResult<String> {
    let result = exec(cmd).await?;
    if result.success() {
        Ok(result.stdout)
    } else {
        Err(WarmRestartError::ShellCommandFailed {
            command: cmd.to_string(),
            exit_code: result.exit_code,
            output: result.combined_output(),
        })
    }
}
