//! Activity orchestration.
//!
//! One [`Orchestrator::run`] is one activity invocation:
//!
//! ```text
//! Start -> RuntimeProvisioned -> InputsStaged -> Executed -> Published -> Done
//! ```
//!
//! Any error moves the run to `Failed` and is returned as an
//! [`ActivityFailure`] naming the last state reached. Stages never overlap.
//! `run` consumes the orchestrator, so an invocation cannot be replayed;
//! the state trail travels with the report or the failure instead.

use std::io;
use std::sync::Arc;

use etlrun_cloud::ArtifactStore;
use etlrun_core::scripting::executor::{
    ExecutionResult, ScriptError, ScriptExecutor, ScriptInput,
};
use etlrun_core::scripting::interpreter::InterpreterExecutor;
use serde::Serialize;
use uuid::Uuid;

use crate::config::{machine_name, ActivityConfig, ActivityProperties};
use crate::error::{ActivityError, ActivityFailure};
use crate::provisioner::{ensure_runtime, ProvisionOutcome};
use crate::publisher::{publish_if_present, PublishOutcome};
use crate::stager::{stage_all, StagedFile};

/// Lifecycle position of an activity run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityState {
    Start,
    RuntimeProvisioned,
    InputsStaged,
    Executed,
    Published,
    Done,
    Failed,
}

impl ActivityState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

/// Everything a successful run produced.
#[derive(Debug, Clone, Serialize)]
pub struct ActivityReport {
    pub invocation_id: Uuid,
    pub provision: ProvisionOutcome,
    pub staged: Vec<StagedFile>,
    pub execution: ExecutionResult,
    /// One entry per configured output, in configuration order.
    pub outputs: Vec<PublishOutcome>,
    pub state: ActivityState,
    /// Every state entered, starting with `Start`.
    pub trail: Vec<ActivityState>,
}

/// Drives one activity invocation through its stages.
pub struct Orchestrator<E: ScriptExecutor = InterpreterExecutor> {
    config: ActivityConfig,
    properties: ActivityProperties,
    store: Arc<dyn ArtifactStore>,
    executor: E,
    state: ActivityState,
    trail: Vec<ActivityState>,
}

impl Orchestrator<InterpreterExecutor> {
    /// Orchestrator running the interpreter of `config.layout` from the
    /// working directory.
    pub fn new(
        config: ActivityConfig,
        properties: ActivityProperties,
        store: Arc<dyn ArtifactStore>,
    ) -> Self {
        let executor = InterpreterExecutor::from_layout(&config.layout, &config.working_dir);
        Self::with_executor(config, properties, store, executor)
    }
}

impl<E: ScriptExecutor> Orchestrator<E> {
    pub fn with_executor(
        config: ActivityConfig,
        properties: ActivityProperties,
        store: Arc<dyn ArtifactStore>,
        executor: E,
    ) -> Self {
        Self {
            config,
            properties,
            store,
            executor,
            state: ActivityState::Start,
            trail: vec![ActivityState::Start],
        }
    }

    pub fn config(&self) -> &ActivityConfig {
        &self.config
    }

    /// Run the activity to completion.
    pub async fn run(mut self) -> Result<ActivityReport, ActivityFailure> {
        let invocation_id = Uuid::new_v4();
        self.log_activation(invocation_id);

        match self.run_stages(invocation_id).await {
            Ok(report) => {
                tracing::info!(
                    %invocation_id,
                    published = report.outputs.iter().filter(|o| o.is_published()).count(),
                    duration_ms = report.execution.duration_ms,
                    "Activity completed",
                );
                Ok(report)
            }
            Err(error) => {
                let failed_in = self.state;
                if matches!(error, ActivityError::Script(ScriptError::ScriptFailure(_))) {
                    tracing::error!(%invocation_id, error = %error, "Detected ETL error in script");
                }
                tracing::error!(
                    %invocation_id,
                    failed_in = ?failed_in,
                    kind = ?error.kind(),
                    error = %error,
                    "Activity failed",
                );
                self.transition(ActivityState::Failed);
                Err(ActivityFailure {
                    failed_in,
                    error,
                    trail: self.trail,
                })
            }
        }
    }

    async fn run_stages(&mut self, invocation_id: Uuid) -> Result<ActivityReport, ActivityError> {
        let working_dir = self.config.working_dir.clone();

        let provision = ensure_runtime(
            self.store.as_ref(),
            &working_dir,
            &self.config.runtime_source,
            &self.config.layout,
        )
        .await?;
        self.transition(ActivityState::RuntimeProvisioned);

        let staged = stage_all(
            self.store.as_ref(),
            &working_dir,
            &self.config.input_container,
            &self.config.inputs,
        )
        .await?;
        self.transition(ActivityState::InputsStaged);

        let execution = self.execute(&staged).await?;
        self.transition(ActivityState::Executed);

        let outputs = self.publish_outputs().await?;
        self.transition(ActivityState::Published);

        self.transition(ActivityState::Done);
        Ok(ActivityReport {
            invocation_id,
            provision,
            staged,
            execution,
            outputs,
            state: self.state,
            trail: self.trail.clone(),
        })
    }

    async fn execute(&self, staged: &[StagedFile]) -> Result<ExecutionResult, ActivityError> {
        let script = staged.first().ok_or(ActivityError::NoScript)?;
        self.clear_outputs().await?;
        let args = self.config.script_arguments().to_positional();
        let input =
            ScriptInput::new(args, &self.config.working_dir).with_timeout(self.config.timeout);

        let result = self.executor.execute(&script.local_path, input).await?;
        tracing::info!(
            exit_code = ?result.exit_code,
            stdout_lines = result.stdout.len(),
            warnings = result.warnings.len(),
            failures = result.failures.len(),
            duration_ms = result.duration_ms,
            "Script execution finished",
        );

        self.config.policy.evaluate(&result)?;
        Ok(result)
    }

    /// Remove expected outputs left behind by an earlier run in the same
    /// working directory, so only files this run writes get published.
    async fn clear_outputs(&self) -> Result<(), ActivityError> {
        for output in &self.config.outputs {
            let local_path = output.local_path(&self.config.working_dir);
            match tokio::fs::remove_file(&local_path).await {
                Ok(()) => {
                    tracing::info!(
                        output = %output.label,
                        path = %local_path.display(),
                        "Removed stale output",
                    );
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }

    /// Attempt every output even when one upload fails; the first failure
    /// is returned once all have been tried.
    async fn publish_outputs(&self) -> Result<Vec<PublishOutcome>, ActivityError> {
        let mut outcomes = Vec::with_capacity(self.config.outputs.len());
        let mut first_error = None;

        for output in &self.config.outputs {
            let local_path = output.local_path(&self.config.working_dir);
            match publish_if_present(
                self.store.as_ref(),
                &self.config.result_path,
                &local_path,
                &output.file_name,
            )
            .await
            {
                Ok(outcome) => outcomes.push(outcome),
                Err(e) => {
                    tracing::error!(output = %output.label, error = %e, "Output upload failed");
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(outcomes),
        }
    }

    fn log_activation(&self, invocation_id: Uuid) {
        let machine = machine_name().unwrap_or_else(|| "unknown".to_string());
        tracing::info!(
            %invocation_id,
            machine = %machine,
            working_dir = %self.config.working_dir.display(),
            "Activity invoked",
        );
        for (key, value) in self.properties.iter() {
            tracing::info!(%invocation_id, key, value, "Activity property");
        }
    }

    fn transition(&mut self, next: ActivityState) {
        tracing::debug!(from = ?self.state, to = ?next, "Activity state transition");
        self.state = next;
        self.trail.push(next);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
