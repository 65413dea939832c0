//! The ETL activity pipeline.
//!
//! Provisions the interpreter runtime, stages the script and its inputs from
//! the artifact store, runs the script and publishes whichever expected
//! outputs it produced. [`orchestrator::Orchestrator`] sequences the stages;
//! each stage also stands on its own.

pub mod config;
pub mod error;
pub mod orchestrator;
pub mod provisioner;
pub mod publisher;
pub mod stager;

pub use config::{ActivityConfig, ActivityProperties};
pub use error::{ActivityError, ActivityFailure, FailureKind};
pub use orchestrator::{ActivityReport, ActivityState, Orchestrator};
