//! `etlrun-worker` -- runs one ETL activity invocation and exits.
//!
//! Configuration comes from the environment (see [`config::WorkerConfig`]).
//! The process exit code tells the host how the run ended:
//!
//! | Code | Meaning                                                    |
//! |------|------------------------------------------------------------|
//! | `0`  | Activity reached `Done`                                    |
//! | `1`  | Infrastructure failure: configuration, transfer, I/O, missing interpreter |
//! | `2`  | The script reported an error or ran past its timeout       |

pub mod config;

use std::sync::Arc;

use etlrun_cloud::open_store;
use etlrun_pipeline::{ActivityFailure, ActivityReport, FailureKind, Orchestrator};

use crate::config::{ConfigError, WorkerConfig};

pub const EXIT_SUCCESS: u8 = 0;
pub const EXIT_INFRASTRUCTURE: u8 = 1;
pub const EXIT_SCRIPT: u8 = 2;

/// Why the worker did not complete the activity.
#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Activity(#[from] ActivityFailure),
}

impl WorkerError {
    /// Process exit code for this failure.
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Config(_) => EXIT_INFRASTRUCTURE,
            Self::Activity(failure) => match failure.error.kind() {
                FailureKind::Infrastructure => EXIT_INFRASTRUCTURE,
                FailureKind::Script => EXIT_SCRIPT,
            },
        }
    }
}

/// Load configuration from the environment and run the activity once.
pub async fn run() -> Result<ActivityReport, WorkerError> {
    let config = WorkerConfig::from_env()?;
    run_with(&config, env_vars()).await
}

/// Run the activity once with `config`. `vars` supplies `ETL_PROP_*`
/// properties when no properties file is configured.
pub async fn run_with(
    config: &WorkerConfig,
    vars: impl IntoIterator<Item = (String, String)>,
) -> Result<ActivityReport, WorkerError> {
    let properties = config.load_properties(vars)?;
    let activity = config.activity_config(&properties)?;
    let store = open_store(&config.connection).map_err(ConfigError::from)?;

    tracing::info!(
        backend = config.connection.backend_type().name(),
        working_dir = %activity.working_dir.display(),
        interpreter = %activity.layout.interpreter_path(&activity.working_dir).display(),
        timeout_secs = activity.timeout.as_secs(),
        "Worker configured",
    );

    let orchestrator = Orchestrator::new(activity, properties, Arc::from(store));
    Ok(orchestrator.run().await?)
}

/// Environment variables that are valid unicode.
fn env_vars() -> impl Iterator<Item = (String, String)> {
    std::env::vars_os()
        .filter_map(|(name, value)| Some((name.into_string().ok()?, value.into_string().ok()?)))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use assert_matches::assert_matches;
    use etlrun_core::scripting::executor::ScriptError;
    use etlrun_pipeline::{ActivityError, ActivityState};

    use super::*;

    fn failure(error: ActivityError) -> WorkerError {
        WorkerError::Activity(ActivityFailure {
            failed_in: ActivityState::InputsStaged,
            error,
            trail: vec![
                ActivityState::Start,
                ActivityState::RuntimeProvisioned,
                ActivityState::InputsStaged,
                ActivityState::Failed,
            ],
        })
    }

    #[test]
    fn exit_codes_follow_failure_kind() {
        assert_eq!(
            WorkerError::Config(ConfigError::Missing("ETL_CONNECTION_STRING")).exit_code(),
            EXIT_INFRASTRUCTURE
        );
        assert_eq!(
            failure(ScriptError::ToolMissing(PathBuf::from("/w/Rscript")).into()).exit_code(),
            EXIT_INFRASTRUCTURE
        );
        assert_eq!(
            failure(ScriptError::ScriptFailure("Error: boom".into()).into()).exit_code(),
            EXIT_SCRIPT
        );
        assert_eq!(
            failure(ScriptError::Timeout { elapsed_ms: 1 }.into()).exit_code(),
            EXIT_SCRIPT
        );
    }

    #[tokio::test]
    async fn missing_runtime_package_is_infrastructure_failure() {
        let store = tempfile::tempdir().unwrap();
        let work = tempfile::tempdir().unwrap();
        let config = WorkerConfig::from_lookup(|var: &str| match var {
            "ETL_CONNECTION_STRING" => Some(format!("LocalRoot={}", store.path().display())),
            "ETL_WORKING_DIR" => Some(work.path().display().to_string()),
            _ => None,
        })
        .unwrap();
        let vars = vec![("ETL_PROP_scriptName".to_string(), "etl.R".to_string())];

        let err = run_with(&config, vars).await.unwrap_err();

        assert_matches!(
            &err,
            WorkerError::Activity(f) if f.failed_in == ActivityState::Start
        );
        assert_eq!(err.exit_code(), EXIT_INFRASTRUCTURE);
    }
}
