//! Input artifact staging.

use std::path::{Path, PathBuf};

use etlrun_cloud::{ArtifactStore, TransferError};
use serde::Serialize;

/// One remote blob named by the activity configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactReference {
    pub container: String,
    pub name: String,
}

impl ArtifactReference {
    pub fn new(container: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            name: name.into(),
        }
    }

    /// Where this artifact lands inside `working_dir`.
    pub fn local_path(&self, working_dir: &Path) -> PathBuf {
        working_dir.join(&self.name)
    }
}

/// A fetched artifact and where it now lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StagedFile {
    pub name: String,
    pub local_path: PathBuf,
    /// Whether the file was found on disk after the fetch returned.
    pub present: bool,
}

/// Fetch every `names` entry from `container` into `working_dir`.
///
/// The result has the same length and order as `names`, so position 0 stays
/// the script. The first failed fetch aborts staging.
pub async fn stage_all(
    store: &dyn ArtifactStore,
    working_dir: &Path,
    container: &str,
    names: &[String],
) -> Result<Vec<StagedFile>, TransferError> {
    let mut staged = Vec::with_capacity(names.len());

    for name in names {
        let reference = ArtifactReference::new(container, name.as_str());
        staged.push(stage_one(store, working_dir, &reference).await?);
    }

    tracing::info!(container, count = staged.len(), "Input artifacts staged");
    Ok(staged)
}

async fn stage_one(
    store: &dyn ArtifactStore,
    working_dir: &Path,
    reference: &ArtifactReference,
) -> Result<StagedFile, TransferError> {
    let local_path = reference.local_path(working_dir);
    if let Some(parent) = local_path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    store
        .fetch(&reference.container, &reference.name, &local_path)
        .await?;

    // A fetch that reports success but leaves nothing behind is only logged.
    let present = tokio::fs::try_exists(&local_path).await.unwrap_or(false);
    if present {
        tracing::info!(
            blob = %reference.name,
            path = %local_path.display(),
            "Staged input artifact",
        );
    } else {
        tracing::warn!(
            blob = %reference.name,
            path = %local_path.display(),
            "Fetch succeeded but staged file is missing",
        );
    }

    Ok(StagedFile {
        name: reference.name.clone(),
        local_path,
        present,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
