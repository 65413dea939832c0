//! Output publication.
//!
//! A script that did not produce an expected output is a reported condition,
//! not an error. A transfer that fails while uploading an output that does
//! exist is an error.

use std::path::{Path, PathBuf};

use etlrun_cloud::{ArtifactStore, ContainerPath, TransferError};
use serde::Serialize;

/// A local output uploaded to the result path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PublishedArtifact {
    pub local_path: PathBuf,
    pub container: String,
    pub blob: String,
}

/// What happened to one expected output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PublishOutcome {
    Published(PublishedArtifact),
    /// The script did not write the file.
    Missing { local_path: PathBuf },
}

impl PublishOutcome {
    pub fn is_published(&self) -> bool {
        matches!(self, Self::Published(_))
    }
}

/// Upload `local_path` as `remote_name` under `result_path` if the file exists.
pub async fn publish_if_present(
    store: &dyn ArtifactStore,
    result_path: &ContainerPath,
    local_path: &Path,
    remote_name: &str,
) -> Result<PublishOutcome, TransferError> {
    let is_file = tokio::fs::metadata(local_path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false);

    if !is_file {
        tracing::warn!(
            path = %local_path.display(),
            result_path = %result_path,
            "Expected output not found, skipping upload",
        );
        return Ok(PublishOutcome::Missing {
            local_path: local_path.to_path_buf(),
        });
    }

    let container = result_path.container();
    let blob = result_path.blob_name(remote_name);
    store.publish(container, local_path, &blob).await?;

    tracing::info!(
        container,
        blob = %blob,
        path = %local_path.display(),
        "Output published",
    );

    Ok(PublishOutcome::Published(PublishedArtifact {
        local_path: local_path.to_path_buf(),
        container: container.to_string(),
        blob,
    }))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
