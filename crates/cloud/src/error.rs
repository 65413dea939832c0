/// Failure to move an artifact between the object store and local disk.
///
/// Every variant is terminal for the current activity run; nothing here is
/// retried.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    /// The connection string could not be understood.
    #[error("Invalid connection string: {0}")]
    InvalidConnection(String),

    /// A blob name that would escape its container.
    #[error("Invalid blob name '{0}'")]
    InvalidBlobName(String),

    /// The blob does not exist.
    #[error("Blob '{container}/{blob}' not found")]
    NotFound { container: String, blob: String },

    /// The blob service rejected the request or could not be reached.
    #[error("Object store request for '{container}/{blob}' failed: {source}")]
    Service {
        container: String,
        blob: String,
        #[source]
        source: azure_core::Error,
    },

    /// Reading or writing the local file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
