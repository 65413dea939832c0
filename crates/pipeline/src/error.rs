use etlrun_cloud::TransferError;
use etlrun_core::scripting::executor::ScriptError;

use crate::orchestrator::ActivityState;

/// Anything that stops an activity run.
#[derive(Debug, thiserror::Error)]
pub enum ActivityError {
    /// Fetching or publishing an artifact failed.
    #[error(transparent)]
    Transfer(#[from] TransferError),

    /// Running the script failed: interpreter missing, timeout, spawn
    /// failure, or a semantic error reported by the script.
    #[error(transparent)]
    Script(#[from] ScriptError),

    /// Nothing was staged, so there is no script to run.
    #[error("No input artifacts were staged; the first input must be the script")]
    NoScript,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse triage class of an [`ActivityError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Tooling, storage or environment is broken; needs an operator.
    Infrastructure,
    /// The script itself failed or overran its budget.
    Script,
}

impl ActivityError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Script(ScriptError::ScriptFailure(_) | ScriptError::Timeout { .. }) => {
                FailureKind::Script
            }
            _ => FailureKind::Infrastructure,
        }
    }
}

/// Structured failure surfaced to the host.
#[derive(Debug, thiserror::Error)]
#[error("Activity failed after reaching {failed_in:?}: {error}")]
pub struct ActivityFailure {
    /// Last state reached before the failure.
    pub failed_in: ActivityState,
    #[source]
    pub error: ActivityError,
    /// Every state entered, ending with `Failed`.
    pub trail: Vec<ActivityState>,
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;

    #[test]
    fn script_failures_and_timeouts_are_script_kind() {
        let err = ActivityError::from(ScriptError::ScriptFailure("Error: boom".into()));
        assert_eq!(err.kind(), FailureKind::Script);
        let err = ActivityError::from(ScriptError::Timeout { elapsed_ms: 10 });
        assert_eq!(err.kind(), FailureKind::Script);
    }

    #[test]
    fn tool_missing_and_transfer_are_infrastructure() {
        let err = ActivityError::from(ScriptError::ToolMissing(PathBuf::from("/w/Rscript")));
        assert_eq!(err.kind(), FailureKind::Infrastructure);
        let err = ActivityError::from(TransferError::NotFound {
            container: "c".into(),
            blob: "b".into(),
        });
        assert_eq!(err.kind(), FailureKind::Infrastructure);
    }

    #[test]
    fn failure_message_names_state() {
        let failure = ActivityFailure {
            failed_in: ActivityState::InputsStaged,
            error: ActivityError::NoScript,
            trail: vec![ActivityState::Start, ActivityState::Failed],
        };
        assert!(failure.to_string().starts_with("Activity failed after reaching InputsStaged"));
    }
}
