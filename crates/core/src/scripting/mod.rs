//! External script execution.
//!
//! The interpreter is spawned as a plain child process. Its stdout is
//! forwarded to the log, its stderr is classified into warnings and
//! failures, and an [`executor::ExecutionPolicy`] decides afterwards whether
//! the run counts as a script failure.

pub mod executor;
pub mod interpreter;
pub mod stderr;
pub mod subprocess;
