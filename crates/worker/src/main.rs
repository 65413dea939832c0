use std::process::ExitCode;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Log filter used when `RUST_LOG` is unset.
const DEFAULT_LOG_FILTER: &str =
    "etlrun_worker=info,etlrun_pipeline=info,etlrun_core=info,etlrun_cloud=info,etl=info";

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    // Logs go to stderr; stdout carries the JSON report.
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "Starting etlrun-worker");

    match etlrun_worker::run().await {
        Ok(report) => {
            match serde_json::to_string_pretty(&report) {
                Ok(json) => println!("{json}"),
                Err(e) => tracing::warn!(error = %e, "Failed to serialize activity report"),
            }
            ExitCode::from(etlrun_worker::EXIT_SUCCESS)
        }
        Err(e) => {
            tracing::error!(error = %e, exit_code = e.exit_code(), "Worker finished with failure");
            ExitCode::from(e.exit_code())
        }
    }
}
