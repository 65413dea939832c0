//! Connection string parsing.
//!
//! Two shapes are accepted:
//!
//! - Azure storage: `DefaultEndpointsProtocol=https;AccountName=..;AccountKey=..`
//!   with optional `EndpointSuffix` and `BlobEndpoint`.
//! - Local directory: `LocalRoot=/path/to/root`.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use base64::Engine as _;

use crate::error::TransferError;

/// Endpoint suffix of the public Azure cloud.
pub const DEFAULT_ENDPOINT_SUFFIX: &str = "core.windows.net";

/// Protocol used when `DefaultEndpointsProtocol` is absent.
const DEFAULT_PROTOCOL: &str = "https";

// ---------------------------------------------------------------------------
// Backend type
// ---------------------------------------------------------------------------

/// Which store implementation a connection string selects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackendType {
    Azure,
    Local,
}

impl StoreBackendType {
    /// Human-readable label.
    pub fn label(self) -> &'static str {
        match self {
            Self::Azure => "Azure Blob Storage",
            Self::Local => "Local Filesystem",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Azure => "azure",
            Self::Local => "local",
        }
    }
}

// ---------------------------------------------------------------------------
// Descriptors
// ---------------------------------------------------------------------------

/// Credentials and endpoint of one Azure storage account.
#[derive(Clone, PartialEq, Eq)]
pub struct AzureAccount {
    pub account_name: String,
    account_key: String,
    /// Blob service base URL, without trailing slash.
    pub blob_endpoint: String,
}

impl AzureAccount {
    pub(crate) fn account_key(&self) -> &str {
        &self.account_key
    }

    /// Decoded shared key bytes.
    pub fn key_bytes(&self) -> Result<Vec<u8>, TransferError> {
        base64::engine::general_purpose::STANDARD
            .decode(&self.account_key)
            .map_err(|e| TransferError::InvalidConnection(format!("AccountKey is not base64: {e}")))
    }
}

impl fmt::Debug for AzureAccount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AzureAccount")
            .field("account_name", &self.account_name)
            .field("account_key", &"<redacted>")
            .field("blob_endpoint", &self.blob_endpoint)
            .finish()
    }
}

/// Parsed connection string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionDescriptor {
    Azure(AzureAccount),
    Local { root: PathBuf },
}

impl ConnectionDescriptor {
    /// Parse a `key=value;key=value` connection string.
    ///
    /// Keys are matched case-insensitively. Values may themselves contain
    /// `=` (base64 padding in `AccountKey`).
    pub fn parse(connection_string: &str) -> Result<Self, TransferError> {
        let pairs = parse_pairs(connection_string)?;

        if let Some(root) = pairs.get("localroot") {
            if root.trim().is_empty() {
                return Err(TransferError::InvalidConnection(
                    "LocalRoot must not be empty".into(),
                ));
            }
            return Ok(Self::Local {
                root: PathBuf::from(root),
            });
        }

        let account_name = require(&pairs, "accountname", "AccountName")?;
        let account_key = require(&pairs, "accountkey", "AccountKey")?;

        let blob_endpoint = match pairs.get("blobendpoint") {
            Some(endpoint) => endpoint.trim_end_matches('/').to_string(),
            None => {
                let protocol = pairs
                    .get("defaultendpointsprotocol")
                    .map(String::as_str)
                    .unwrap_or(DEFAULT_PROTOCOL);
                let suffix = pairs
                    .get("endpointsuffix")
                    .map(String::as_str)
                    .unwrap_or(DEFAULT_ENDPOINT_SUFFIX);
                format!("{protocol}://{account_name}.blob.{suffix}")
            }
        };

        let account = AzureAccount {
            account_name,
            account_key,
            blob_endpoint,
        };
        // Reject undecodable keys here rather than on the first request.
        account.key_bytes()?;

        Ok(Self::Azure(account))
    }

    pub fn backend_type(&self) -> StoreBackendType {
        match self {
            Self::Azure(_) => StoreBackendType::Azure,
            Self::Local { .. } => StoreBackendType::Local,
        }
    }
}

fn parse_pairs(connection_string: &str) -> Result<HashMap<String, String>, TransferError> {
    let mut pairs = HashMap::new();
    for segment in connection_string.split(';') {
        let segment = segment.trim();
        if segment.is_empty() {
            continue;
        }
        let (key, value) = segment.split_once('=').ok_or_else(|| {
            TransferError::InvalidConnection(format!("segment '{segment}' is not key=value"))
        })?;
        pairs.insert(key.trim().to_ascii_lowercase(), value.trim().to_string());
    }
    Ok(pairs)
}

fn require(
    pairs: &HashMap<String, String>,
    key: &str,
    display: &str,
) -> Result<String, TransferError> {
    match pairs.get(key) {
        Some(value) if !value.is_empty() => Ok(value.clone()),
        _ => Err(TransferError::InvalidConnection(format!(
            "{display} is required"
        ))),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
