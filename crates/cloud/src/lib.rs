//! Object-store access for the ETL activity.
//!
//! [`store::ArtifactStore`] is the seam the pipeline talks to. Two backends
//! implement it: Azure Blob Storage through its SDK, and a plain
//! directory tree used for local runs and tests. The backend is picked from
//! the connection string.

pub mod azure;
pub mod connection;
pub mod error;
pub mod local;
pub mod location;
pub mod store;

pub use connection::ConnectionDescriptor;
pub use error::TransferError;
pub use location::ContainerPath;
pub use store::{open_store, ArtifactStore};
