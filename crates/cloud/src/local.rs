//! Directory-backed artifact store.
//!
//! Containers are sub-directories of the root and blobs are relative file
//! paths inside them. Used for local runs against a copy of the production
//! containers, and by the integration tests.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use crate::error::TransferError;
use crate::store::{validate_blob_name, write_atomically, ArtifactStore};

pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// On-disk path of `container/blob`.
    pub fn blob_path(&self, container: &str, blob: &str) -> Result<PathBuf, TransferError> {
        validate_blob_name(blob)?;
        validate_blob_name(container)?;
        Ok(self.root.join(container).join(blob))
    }
}

#[async_trait]
impl ArtifactStore for LocalStore {
    async fn fetch(
        &self,
        container: &str,
        blob: &str,
        destination: &Path,
    ) -> Result<(), TransferError> {
        let source = self.blob_path(container, blob)?;
        if !tokio::fs::metadata(&source)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false)
        {
            return Err(TransferError::NotFound {
                container: container.to_string(),
                blob: blob.to_string(),
            });
        }

        let bytes = write_atomically(destination, |mut file| async move {
            let mut reader = tokio::fs::File::open(&source).await?;
            let bytes = tokio::io::copy(&mut reader, &mut file).await?;
            file.flush().await?;
            Ok::<_, TransferError>(bytes)
        })
        .await?;
        tracing::info!(
            container,
            blob,
            path = %destination.display(),
            bytes,
            "Blob copied from local store",
        );
        Ok(())
    }

    async fn publish(
        &self,
        container: &str,
        local_path: &Path,
        blob: &str,
    ) -> Result<(), TransferError> {
        let target = self.blob_path(container, blob)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let bytes = tokio::fs::copy(local_path, &target).await?;
        tracing::info!(
            container,
            blob,
            path = %local_path.display(),
            bytes,
            "Blob written to local store",
        );
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
