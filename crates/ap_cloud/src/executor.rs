//! Command execution utilities for the cloud CLIs
//!
//! This module provides the `Executor` abstraction for running external
//! programs with an explicit argument vector. Arguments are never joined into
//! a single string and re-split, so values containing spaces survive intact.

use crate::CloudError;
use crate::redact;
use serde::de::DeserializeOwned;
use std::ffi::OsStr;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, instrument, warn};

/// Default per-command timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// A program plus its arguments
#[derive(Clone, PartialEq, Eq)]
pub struct CommandSpec {
    program: PathBuf,
    args: Vec<String>,
}

impl CommandSpec {
    /// Start a command for the given program
    #[must_use]
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    /// Append one argument
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Append a flag followed by its value
    #[must_use]
    pub fn flag(self, flag: &str, value: impl Into<String>) -> Self {
        self.arg(flag).arg(value)
    }

    /// The program to run
    #[must_use]
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// The argument vector
    #[must_use]
    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    /// Short program name for log fields
    #[must_use]
    pub fn program_name(&self) -> String {
        self.program
            .file_name()
            .unwrap_or_else(|| OsStr::new("?"))
            .to_string_lossy()
            .into_owned()
    }
}

/// Renders the command with credentials masked and shell quoting for readability
impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program.display())?;
        for arg in redact::redact_args(&self.args) {
            write!(f, " {}", shell_quote(&arg))?;
        }
        Ok(())
    }
}

impl fmt::Debug for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CommandSpec({self})")
    }
}

/// Output from command execution
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandOutput {
    /// Check if the command succeeded (exit code 0)
    #[must_use]
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Command executor for running the cloud CLIs
#[derive(Debug, Clone)]
pub struct Executor {
    timeout: Duration,
}

impl Default for Executor {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT)
    }
}

impl Executor {
    /// Create an executor with the given per-command timeout
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Run a command with timeout, returning whatever it produced
    ///
    /// # Errors
    ///
    /// Returns [`CloudError`] when the process cannot be spawned or times out.
    #[instrument(skip_all, fields(program = %spec.program_name()))]
    pub async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, CloudError> {
        debug!(cmd = %spec, "Running command");

        let child = Command::new(&spec.program)
            .args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    CloudError::ToolNotFound(spec.program.display().to_string())
                } else {
                    CloudError::ExecutionError(e.to_string())
                }
            })?;

        let result = tokio::time::timeout(self.timeout, child.wait_with_output()).await;

        match result {
            Ok(Ok(output)) => Ok(CommandOutput {
                stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).to_string(),
                exit_code: output.status.code().unwrap_or(-1),
            }),
            Ok(Err(e)) => Err(CloudError::ExecutionError(e.to_string())),
            Err(_) => Err(CloudError::Timeout(self.timeout)),
        }
    }

    /// Run a command, returning stdout on success
    ///
    /// # Errors
    ///
    /// Returns [`CloudError`] when execution fails, times out, or the command exits non-zero.
    pub async fn run_checked(&self, spec: &CommandSpec) -> Result<String, CloudError> {
        let output = self.run(spec).await?;
        if !output.success() {
            let stderr = redact::redact_text(output.stderr.trim());
            warn!(
                program = %spec.program_name(),
                exit_code = output.exit_code,
                stderr = %stderr,
                "Command failed"
            );
            return Err(CloudError::CommandFailed {
                program: spec.program_name(),
                exit_code: output.exit_code,
                stderr,
            });
        }
        Ok(output.stdout)
    }

    /// Run a command and decode its stdout as JSON
    ///
    /// # Errors
    ///
    /// Returns [`CloudError`] when the command fails or its output is not the expected JSON.
    pub async fn run_json<T: DeserializeOwned>(&self, spec: &CommandSpec) -> Result<T, CloudError> {
        let stdout = self.run_checked(spec).await?;
        decode_json(&stdout)
    }
}

/// Decode CLI JSON output, keeping a short excerpt of the payload on failure
///
/// # Errors
///
/// Returns [`CloudError::ParseError`] when the text is not valid JSON for `T`.
pub fn decode_json<T: DeserializeOwned>(stdout: &str) -> Result<T, CloudError> {
    serde_json::from_str(stdout).map_err(|e| {
        CloudError::ParseError(format!(
            "{e}. Output was: {}",
            stdout.chars().take(200).collect::<String>()
        ))
    })
}

/// Quote an argument for display if it contains shell-significant characters
fn shell_quote(s: &str) -> String {
    let plain = !s.is_empty()
        && s
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./:=,@[]+%".contains(c));
    if plain {
        s.to_string()
    } else {
        format!("'{}'", s.replace('\'', "'\\''"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize)]
    struct Item {
        id: String,
    }

    #[test]
    fn test_command_spec_builder() {
        let spec = CommandSpec::new("/usr/bin/openstack")
            .flag("--os-region-name", "RegionOne")
            .args(["server", "list"]);

        assert_eq!(spec.program(), Path::new("/usr/bin/openstack"));
        assert_eq!(spec.program_name(), "openstack");
        assert_eq!(
            spec.get_args(),
            &["--os-region-name", "RegionOne", "server", "list"]
        );
    }

    #[test]
    fn test_display_redacts_and_quotes() {
        let spec = CommandSpec::new("workloadmgr")
            .flag("--os-password", "hunter2")
            .flag("--jobschedule", "start_time=02:00 AM");

        let shown = spec.to_string();
        assert!(!shown.contains("hunter2"));
        assert!(shown.contains("--os-password [REDACTED]"));
        assert!(shown.contains("'start_time=02:00 AM'"));
    }

    #[test]
    fn test_shell_quote() {
        assert_eq!(shell_quote("simple"), "simple");
        assert_eq!(shell_quote("with spaces"), "'with spaces'");
        assert_eq!(shell_quote("with'quote"), "'with'\\''quote'");
        assert_eq!(shell_quote(""), "''");
    }

    #[test]
    fn test_decode_json() {
        let items: Vec<Item> = decode_json(r#"[{"id": "a"}, {"id": "b"}]"#).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].id, "b");

        let err = decode_json::<Vec<Item>>("not json").unwrap_err();
        assert!(matches!(err, CloudError::ParseError(_)));
        assert!(err.to_string().contains("not json"));
    }

    #[tokio::test]
    async fn test_run_keeps_argument_boundaries() {
        let executor = Executor::default();
        let spec = CommandSpec::new("printf").args(["%s|", "two words", "x"]);
        let stdout = executor.run_checked(&spec).await.unwrap();
        assert_eq!(stdout, "two words|x|");
    }

    #[tokio::test]
    async fn test_run_checked_failure() {
        let executor = Executor::default();
        let spec = CommandSpec::new("sh").args(["-c", "echo boom >&2; exit 3"]);
        let err = executor.run_checked(&spec).await.unwrap_err();
        match err {
            CloudError::CommandFailed {
                exit_code, stderr, ..
            } => {
                assert_eq!(exit_code, 3);
                assert_eq!(stderr, "boom");
            }
            other => panic!("Expected CommandFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_run_missing_tool() {
        let executor = Executor::default();
        let spec = CommandSpec::new("nonexistent_tool_xyz");
        let err = executor.run(&spec).await.unwrap_err();
        assert!(matches!(err, CloudError::ToolNotFound(_)));
    }

    #[tokio::test]
    async fn test_run_timeout() {
        let executor = Executor::new(Duration::from_millis(100));
        let spec = CommandSpec::new("sleep").arg("5");
        let err = executor.run(&spec).await.unwrap_err();
        assert!(matches!(err, CloudError::Timeout(_)));
    }

    #[tokio::test]
    async fn test_run_json() {
        let executor = Executor::default();
        let spec = CommandSpec::new("echo").arg(r#"[{"id": "vm-1"}]"#);
        let items: Vec<Item> = executor.run_json(&spec).await.unwrap();
        assert_eq!(items[0].id, "vm-1");
    }
}
