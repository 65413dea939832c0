//! Interpreter executor.
//!
//! Runs `<interpreter> <script> <args...>` directly (no shell). The
//! interpreter must already be unpacked; its absence is reported as
//! [`ScriptError::ToolMissing`] without launching anything.

use std::path::{Path, PathBuf};

use super::executor::{ExecutionResult, ScriptError, ScriptExecutor, ScriptInput};
use super::subprocess;
use crate::runtime::RuntimeLayout;

/// Executor bound to one interpreter binary.
#[derive(Debug, Clone)]
pub struct InterpreterExecutor {
    interpreter: PathBuf,
}

impl InterpreterExecutor {
    pub fn new(interpreter: impl Into<PathBuf>) -> Self {
        Self {
            interpreter: interpreter.into(),
        }
    }

    /// Executor for the interpreter of `layout` unpacked in `working_dir`.
    pub fn from_layout(layout: &RuntimeLayout, working_dir: &Path) -> Self {
        Self::new(layout.interpreter_path(working_dir))
    }

    pub fn interpreter(&self) -> &Path {
        &self.interpreter
    }
}

impl ScriptExecutor for InterpreterExecutor {
    async fn execute(
        &self,
        script_path: &Path,
        input: ScriptInput,
    ) -> Result<ExecutionResult, ScriptError> {
        let present = tokio::fs::metadata(&self.interpreter)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false);
        if !present {
            tracing::error!(
                interpreter = %self.interpreter.display(),
                "Interpreter does not exist",
            );
            return Err(ScriptError::ToolMissing(self.interpreter.clone()));
        }

        tracing::info!(
            interpreter = %self.interpreter.display(),
            script = %script_path.display(),
            args = ?input.args,
            "Script execution started",
        );

        let mut cmd = tokio::process::Command::new(&self.interpreter);
        cmd.arg(script_path).args(&input.args);
        subprocess::run_command(&mut cmd, input).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
