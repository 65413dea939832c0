//! Unified script execution interface and shared types.
//!
//! Defines [`ScriptExecutor`], the trait the interpreter runner implements,
//! along with [`ScriptInput`], [`ExecutionResult`], [`ExecutionPolicy`] and
//! [`ScriptError`].

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Default wall-clock budget for one script run.
pub const DEFAULT_SCRIPT_TIMEOUT: Duration = Duration::from_secs(60 * 60);

/// Input passed to a script executor.
#[derive(Debug, Clone)]
pub struct ScriptInput {
    /// Positional arguments placed after the script path.
    pub args: Vec<OsString>,
    /// Additional environment variables set for the child process.
    pub env_vars: Vec<(String, String)>,
    /// Working directory for the child process (uses current dir if `None`).
    pub working_directory: Option<PathBuf>,
    /// Maximum wall-clock time before the process is killed.
    pub timeout: Duration,
}

impl ScriptInput {
    /// Input with the given positional arguments, run from `working_directory`.
    pub fn new(args: Vec<OsString>, working_directory: &Path) -> Self {
        Self {
            args,
            env_vars: vec![],
            working_directory: Some(working_directory.to_path_buf()),
            timeout: DEFAULT_SCRIPT_TIMEOUT,
        }
    }

    /// Replace the timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Everything observed while a script ran.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResult {
    /// Process exit code (`None` if killed by a signal).
    pub exit_code: Option<i32>,
    /// Stdout lines, in order.
    pub stdout: Vec<String>,
    /// Stderr lines classified as benign warnings, in order.
    pub warnings: Vec<String>,
    /// Stderr lines that are not warnings, in order.
    pub failures: Vec<String>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
    /// Set when a stream exceeded the capture cap. Every line was still
    /// logged, but not every line is retained above.
    pub truncated: bool,
}

impl ExecutionResult {
    /// Whether the process exited normally with code 0.
    pub fn exited_cleanly(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Errors that can occur during script execution.
#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    /// The interpreter binary is absent. Nothing was launched.
    #[error("Interpreter not found at {}", .0.display())]
    ToolMissing(PathBuf),

    /// The script ran and reported a semantic error.
    #[error("Script reported an error: {0}")]
    ScriptFailure(String),

    /// The script exceeded its configured timeout and was killed.
    #[error("Script timed out after {elapsed_ms}ms")]
    Timeout {
        /// Elapsed wall-clock time before the process was killed.
        elapsed_ms: u64,
    },

    /// An I/O error occurred while spawning or communicating with the process.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Decides whether a finished run counts as a script failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionPolicy {
    /// Treat any non-warning stderr line as a failure.
    pub fail_on_stderr: bool,
    /// Treat a non-zero (or signal) exit as a failure.
    pub fail_on_exit_code: bool,
}

impl Default for ExecutionPolicy {
    fn default() -> Self {
        Self {
            fail_on_stderr: true,
            fail_on_exit_code: true,
        }
    }
}

impl ExecutionPolicy {
    /// Check `result` against this policy.
    ///
    /// Stderr is consulted before the exit code so the reported message is
    /// the script's own diagnostic when there is one.
    pub fn evaluate(&self, result: &ExecutionResult) -> Result<(), ScriptError> {
        if self.fail_on_stderr {
            if let Some(first) = result.failures.first() {
                let more = result.failures.len() - 1;
                let message = if more == 0 {
                    first.clone()
                } else {
                    format!("{first} (and {more} more non-warning stderr lines)")
                };
                return Err(ScriptError::ScriptFailure(message));
            }
        }

        if self.fail_on_exit_code && !result.exited_cleanly() {
            let message = match result.exit_code {
                Some(code) => format!("process exited with code {code}"),
                None => "process terminated by signal".to_string(),
            };
            return Err(ScriptError::ScriptFailure(message));
        }

        Ok(())
    }
}

/// Trait implemented by script runners.
///
/// The runner receives the script path and structured input, spawns the
/// subprocess, and returns what it observed or an error.
pub trait ScriptExecutor: Send + Sync {
    /// Execute the script at `script_path` with the given `input`.
    fn execute(
        &self,
        script_path: &Path,
        input: ScriptInput,
    ) -> impl std::future::Future<Output = Result<ExecutionResult, ScriptError>> + Send;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
