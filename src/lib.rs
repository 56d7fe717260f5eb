// src/lib.rs

pub mod backend; // Storage backends and the Backend trait
pub mod config;
pub mod constants;
pub mod controller; // Worker lifecycle, ready gate and supervision
pub mod error;
pub mod ops; // Per-backend operation tables
pub mod pacing; // Rate limiting and trace-relative timing
pub mod replay; // Per-process replay loop
pub mod report; // Progress lines, latency tables, TSV export
pub mod stats; // Shared per-client counters and histograms
pub mod tokenizer;
pub mod trace; // Load file reading and line parsing

pub use config::{BackendKind, Options};
pub use controller::{run, run_with, RunSummary};
pub use error::ReplayError;
