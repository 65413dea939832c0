//! The artifact store abstraction.

use std::ffi::OsString;
use std::future::Future;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::azure::AzureBlobStore;
use crate::connection::ConnectionDescriptor;
use crate::error::TransferError;
use crate::local::LocalStore;

/// Fetches blobs to local files and publishes local files as blobs.
///
/// Implementations perform exactly one attempt per call; failures propagate
/// to the caller unchanged.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Download `container/blob` into `destination`, replacing any existing file.
    async fn fetch(
        &self,
        container: &str,
        blob: &str,
        destination: &Path,
    ) -> Result<(), TransferError>;

    /// Upload `local_path` as `container/blob`, replacing any existing blob.
    async fn publish(
        &self,
        container: &str,
        local_path: &Path,
        blob: &str,
    ) -> Result<(), TransferError>;
}

/// Build the store selected by `descriptor`.
pub fn open_store(
    descriptor: &ConnectionDescriptor,
) -> Result<Box<dyn ArtifactStore>, TransferError> {
    let store: Box<dyn ArtifactStore> = match descriptor {
        ConnectionDescriptor::Azure(account) => Box::new(AzureBlobStore::new(account.clone())?),
        ConnectionDescriptor::Local { root } => Box::new(LocalStore::new(root.clone())),
    };
    tracing::debug!(
        backend = descriptor.backend_type().label(),
        "Artifact store opened"
    );
    Ok(store)
}

/// Reject blob names that are empty or climb out of their container.
pub(crate) fn validate_blob_name(blob: &str) -> Result<(), TransferError> {
    let escapes = blob
        .split(['/', '\\'])
        .any(|segment| segment == "..");
    if blob.trim().is_empty() || escapes || blob.starts_with('/') {
        return Err(TransferError::InvalidBlobName(blob.to_string()));
    }
    Ok(())
}

/// Sibling file a download is written to before it replaces `destination`.
pub(crate) fn partial_path(destination: &Path) -> PathBuf {
    let mut name = destination
        .file_name()
        .map(OsString::from)
        .unwrap_or_default();
    name.push(".partial");
    destination.with_file_name(name)
}

/// Write `destination` through its [`partial_path`], renamed into place only
/// once `write` succeeds. On failure the partial file is removed and any
/// existing `destination` is left untouched.
pub(crate) async fn write_atomically<F, Fut>(
    destination: &Path,
    write: F,
) -> Result<u64, TransferError>
where
    F: FnOnce(tokio::fs::File) -> Fut,
    Fut: Future<Output = Result<u64, TransferError>>,
{
    let partial = partial_path(destination);
    let file = tokio::fs::File::create(&partial).await?;

    let result = match write(file).await {
        Ok(bytes) => tokio::fs::rename(&partial, destination)
            .await
            .map(|()| bytes)
            .map_err(TransferError::from),
        Err(e) => Err(e),
    };
    if result.is_err() {
        if let Err(e) = tokio::fs::remove_file(&partial).await {
            tracing::warn!(
                path = %partial.display(),
                error = %e,
                "Could not remove partial download",
            );
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use tokio::io::AsyncWriteExt;

    use super::*;

    #[test]
    fn accepts_plain_and_nested_names() {
        assert!(validate_blob_name("etl.R").is_ok());
        assert!(validate_blob_name("output/2026/daily.txt").is_ok());
    }

    #[test]
    fn rejects_escaping_names() {
        assert!(validate_blob_name("").is_err());
        assert!(validate_blob_name("../secrets").is_err());
        assert!(validate_blob_name("a/../../b").is_err());
        assert!(validate_blob_name("/etc/passwd").is_err());
        assert!(validate_blob_name("a\\..\\b").is_err());
    }

    #[test]
    fn opens_local_store() {
        let descriptor = ConnectionDescriptor::parse("LocalRoot=/tmp/blobs").unwrap();
        assert!(open_store(&descriptor).is_ok());
    }

    #[test]
    fn partial_path_is_a_sibling() {
        assert_eq!(
            partial_path(Path::new("/work/R-3.3.3.zip")),
            PathBuf::from("/work/R-3.3.3.zip.partial")
        );
    }

    #[tokio::test]
    async fn interrupted_write_leaves_no_destination() {
        let work = tempfile::tempdir().unwrap();
        let dest = work.path().join("R-3.3.3.zip");

        let result = write_atomically(&dest, |mut file| async move {
            file.write_all(b"PK\x03\x04 first chunk").await?;
            Err::<u64, _>(TransferError::Io(std::io::Error::new(
                std::io::ErrorKind::ConnectionReset,
                "connection reset mid-body",
            )))
        })
        .await;

        assert_matches!(result, Err(TransferError::Io(_)));
        assert!(!dest.exists());
        assert!(!partial_path(&dest).exists());
    }

    #[tokio::test]
    async fn interrupted_write_keeps_previous_destination() {
        let work = tempfile::tempdir().unwrap();
        let dest = work.path().join("orders.csv");
        std::fs::write(&dest, "id\n1\n").unwrap();

        let result = write_atomically(&dest, |mut file| async move {
            file.write_all(b"id\n").await?;
            Err::<u64, _>(TransferError::NotFound {
                container: "c".into(),
                blob: "orders.csv".into(),
            })
        })
        .await;

        assert!(result.is_err());
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), "id\n1\n");
    }

    #[tokio::test]
    async fn completed_write_replaces_destination() {
        let work = tempfile::tempdir().unwrap();
        let dest = work.path().join("orders.csv");
        std::fs::write(&dest, "old").unwrap();

        let bytes = write_atomically(&dest, |mut file| async move {
            file.write_all(b"new contents").await?;
            file.flush().await?;
            Ok::<_, TransferError>(12)
        })
        .await
        .unwrap();

        assert_eq!(bytes, 12);
        assert_eq!(std::fs::read_to_string(&dest).unwrap(), "new contents");
        assert!(!partial_path(&dest).exists());
    }
}
