//! Domain logic shared by the ETL activity crates.
//!
//! Holds the runtime layout conventions and the subprocess machinery used to
//! run the external transformation script. Nothing in here touches the
//! object store.

pub mod error;
pub mod runtime;
pub mod scripting;
