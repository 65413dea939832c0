//! Azure Blob Storage backend.
//!
//! Built on the Azure storage SDK: [`ClientBuilder`] handles Shared Key
//! signing and request construction, this module maps blobs onto local
//! files and SDK errors onto [`TransferError`].

use std::path::Path;

use async_trait::async_trait;
use azure_core::error::ErrorKind;
use azure_core::StatusCode;
use azure_storage::{CloudLocation, StorageCredentials};
use azure_storage_blobs::prelude::{BlobClient, BlobServiceClient, ClientBuilder};
use futures::StreamExt;
use tokio::io::AsyncWriteExt;

use crate::connection::AzureAccount;
use crate::error::TransferError;
use crate::store::{validate_blob_name, write_atomically, ArtifactStore};

/// Content type used for every upload.
const UPLOAD_CONTENT_TYPE: &str = "application/octet-stream";

/// Artifact store backed by one Azure storage account.
pub struct AzureBlobStore {
    service: BlobServiceClient,
    account_name: String,
}

impl AzureBlobStore {
    pub fn new(account: AzureAccount) -> Result<Self, TransferError> {
        // Undecodable keys fail here rather than on the first request.
        account.key_bytes()?;

        let credentials = StorageCredentials::access_key(
            account.account_name.clone(),
            account.account_key().to_string(),
        );
        let location = CloudLocation::Custom {
            account: account.account_name.clone(),
            uri: account.blob_endpoint.clone(),
        };
        let service = ClientBuilder::with_location(location, credentials).blob_service_client();

        Ok(Self {
            service,
            account_name: account.account_name,
        })
    }

    fn blob_client(&self, container: &str, blob: &str) -> BlobClient {
        self.service.container_client(container).blob_client(blob)
    }
}

#[async_trait]
impl ArtifactStore for AzureBlobStore {
    async fn fetch(
        &self,
        container: &str,
        blob: &str,
        destination: &Path,
    ) -> Result<(), TransferError> {
        validate_blob_name(blob)?;
        tracing::debug!(account = %self.account_name, container, blob, "Downloading blob");

        let mut responses = self.blob_client(container, blob).get().into_stream();
        // The first response tells whether the blob exists; nothing is
        // written locally before that.
        let first = match responses.next().await {
            Some(response) => response.map_err(|e| service_error(e, container, blob))?,
            None => {
                return Err(TransferError::NotFound {
                    container: container.to_string(),
                    blob: blob.to_string(),
                })
            }
        };

        let bytes = write_atomically(destination, |mut file| async move {
            let mut bytes: u64 = 0;
            let mut body = first.data;
            loop {
                while let Some(chunk) = body.next().await {
                    let chunk = chunk.map_err(|e| service_error(e, container, blob))?;
                    file.write_all(&chunk).await?;
                    bytes += chunk.len() as u64;
                }
                match responses.next().await {
                    Some(response) => {
                        body = response.map_err(|e| service_error(e, container, blob))?.data;
                    }
                    None => break,
                }
            }
            file.flush().await?;
            Ok::<_, TransferError>(bytes)
        })
        .await?;

        tracing::info!(
            container,
            blob,
            path = %destination.display(),
            bytes,
            "Blob downloaded",
        );
        Ok(())
    }

    async fn publish(
        &self,
        container: &str,
        local_path: &Path,
        blob: &str,
    ) -> Result<(), TransferError> {
        validate_blob_name(blob)?;
        let body = tokio::fs::read(local_path).await?;
        let length = body.len();

        tracing::debug!(account = %self.account_name, container, blob, bytes = length, "Uploading blob");

        self.blob_client(container, blob)
            .put_block_blob(body)
            .content_type(UPLOAD_CONTENT_TYPE)
            .await
            .map_err(|e| service_error(e, container, blob))?;

        tracing::info!(
            container,
            blob,
            path = %local_path.display(),
            bytes = length,
            "Blob uploaded",
        );
        Ok(())
    }
}

/// A 404 from the service is [`TransferError::NotFound`]; everything else
/// keeps the SDK error as its source.
fn service_error(error: azure_core::Error, container: &str, blob: &str) -> TransferError {
    if is_not_found(&error) {
        return TransferError::NotFound {
            container: container.to_string(),
            blob: blob.to_string(),
        };
    }
    TransferError::Service {
        container: container.to_string(),
        blob: blob.to_string(),
        source: error,
    }
}

fn is_not_found(error: &azure_core::Error) -> bool {
    matches!(
        error.kind(),
        ErrorKind::HttpResponse { status, .. } if *status == StatusCode::NotFound
    )
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
