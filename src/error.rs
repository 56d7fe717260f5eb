//! Typed fatal conditions the controller needs to tell apart.
//!
//! Everything else travels as `anyhow::Error` with context attached at the
//! I/O boundary.

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReplayError {
    /// The load file uses the dbench 1 (`SMBopenX ...`) format.
    #[error("ERROR: operation '{op}' at line {line} is from an old load file format, use a current load file")]
    LegacyTrace { op: String, line: u64 },

    /// A backend handler decided an operation outcome is fatal for its worker.
    #[error("ERROR: child {id} failed at line {line}: {reason}")]
    WorkerFailed { id: usize, line: u64, reason: String },

    #[error("only {ready}/{total} worker processes finished setup within {waited:?}")]
    SetupTimeout {
        ready: usize,
        total: usize,
        waited: Duration,
    },

    #[error("worker process {process} failed setup: {reason}")]
    SetupFailed { process: usize, reason: String },

    #[error("Unknown backend '{0}'")]
    UnknownBackend(String),
}
