//! Shell command execution for the `ip`/`iw` kernel driver.
//!
//! Commands run through `/bin/sh -c`. Interface names come from
//! configuration and from kernel notifications, so every argument that
//! ends up in a command line must pass through [`shellquote`].
//!
//! # Example
//!
//! ```ignore
//! use apvlan_common::shell::{self, IP_CMD, shellquote};
//!
//! let cmd = format!("{} link set dev {} up", IP_CMD, shellquote("brvlan10"));
//! let result = shell::exec(&cmd).await?;
//! ```

use once_cell::sync::Lazy;
use regex::Regex;
use std::process::Stdio;
use tokio::process::Command;

use crate::error::{VlanError, VlanResult};

/// Path to the `ip` command for link configuration.
pub const IP_CMD: &str = "/sbin/ip";

/// Path to the `iw` command for wireless interface management.
pub const IW_CMD: &str = "/usr/sbin/iw";

/// Characters with special meaning inside shell double quotes.
static SHELL_ESCAPE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"([$`"\\\n])"#).expect("Invalid regex pattern"));

/// Quotes a string for safe use in shell commands.
///
/// The result is wrapped in double quotes with `$`, `` ` ``, `"`, `\` and
/// newline escaped.
///
/// # Example
///
/// ```
/// use apvlan_common::shell::shellquote;
///
/// assert_eq!(shellquote("wlan0.10"), "\"wlan0.10\"");
/// assert_eq!(shellquote("br$x"), "\"br\\$x\"");
/// ```
pub fn shellquote(s: &str) -> String {
    let escaped = SHELL_ESCAPE_RE.replace_all(s, r"\$1");
    format!("\"{}\"", escaped)
}

/// Outcome of a finished shell command.
#[derive(Debug, Clone)]
pub struct ExecResult {
    /// Exit code (0 = success, -1 = killed by signal).
    pub exit_code: i32,
    /// Trimmed stdout.
    pub stdout: String,
    /// Trimmed stderr.
    pub stderr: String,
}

impl ExecResult {
    /// Returns true if the command exited with 0.
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

    /// Returns true if the combined output mentions `needle`.
    ///
    /// Used to classify `ip` failures such as "File exists".
    pub fn output_contains(&self, needle: &str) -> bool {
        self.stdout.contains(needle) || self.stderr.contains(needle)
    }
}

/// Executes a shell command.
///
/// A non-zero exit status is not an error here; callers inspect the
/// returned [`ExecResult`]. Only a spawn failure yields `Err`.
pub async fn exec(cmd: &str) -> VlanResult<ExecResult> {
    tracing::debug!(command = %cmd, "Executing shell command");

    let output = Command::new("/bin/sh")
        .arg("-c")
        .arg(cmd)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| VlanError::ShellExec {
            command: cmd.to_string(),
            source: e,
        })?;

    let result = ExecResult {
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).trim().to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    };

    if result.success() {
        tracing::trace!(command = %cmd, "Command succeeded");
    } else {
        tracing::debug!(
            command = %cmd,
            exit_code = result.exit_code,
            stderr = %result.stderr,
            "Command failed"
        );
    }

    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shellquote_interface_names() {
        assert_eq!(shellquote("wlan0"), "\"wlan0\"");
        assert_eq!(shellquote("wlan0.10"), "\"wlan0.10\"");
        assert_eq!(shellquote("breth0.10"), "\"breth0.10\"");
    }

    #[test]
    fn test_shellquote_special_chars() {
        assert_eq!(shellquote("$IFACE"), "\"\\$IFACE\"");
        assert_eq!(shellquote("`id`"), "\"\\`id\\`\"");
        assert_eq!(shellquote("a\"b"), "\"a\\\"b\"");
        assert_eq!(shellquote("a\\b"), "\"a\\\\b\"");
    }

    #[test]
    fn test_shellquote_empty() {
        assert_eq!(shellquote(""), "\"\"");
    }

    #[test]
    fn test_exec_result_output() {
        let result = ExecResult {
            exit_code: 2,
            stdout: String::new(),
            stderr: "RTNETLINK answers: File exists".to_string(),
        };
        assert!(!result.success());
        assert!(result.output_contains("File exists"));
        assert!(!result.output_contains("Cannot find device"));
        assert_eq!(result.combined_output(), "RTNETLINK answers: File exists");
    }

    #[test]
    fn test_exec_result_combined() {
        let result = ExecResult {
            exit_code: 0,
            stdout: "stdout".to_string(),
            stderr: "stderr".to_string(),
        };
        assert_eq!(result.combined_output(), "stdout\nstderr");
    }

    #[tokio::test]
    async fn test_exec_echo() {
        let result = exec("echo hello").await.unwrap();
        assert!(result.success());
        assert_eq!(result.stdout, "hello");
    }
}
