// src/constants.rs
//
// Central location for the tunables and magic numbers used by the replay
// engine, the backends and the reporter.

use std::time::Duration;

// =============================================================================
// Run Defaults
// =============================================================================

/// Default number of worker processes (groups) when none is given
pub const DEFAULT_NPROCS: usize = 10;

/// Default run length in seconds (execute phase deadline)
pub const DEFAULT_TIMELIMIT_SECS: u64 = 600;

/// Default working directory for file based backends
pub const DEFAULT_DIRECTORY: &str = ".";

/// Default server for the socket backend
pub const DEFAULT_SERVER: &str = "localhost";

/// Default socket options applied by the socket backend
pub const DEFAULT_TCP_OPTIONS: &str = "TCP_NODELAY";

/// Warmup defaults to this fraction (1/N) of the time limit
pub const DEFAULT_WARMUP_DIVISOR: u64 = 5;

// =============================================================================
// Lifecycle
// =============================================================================

/// Interval between progress lines printed by the reporter
pub const PRINT_FREQ: Duration = Duration::from_secs(1);

/// How long the controller waits for every worker to finish backend setup
pub const READY_TIMEOUT: Duration = Duration::from_secs(30);

// =============================================================================
// Trace Grammar
// =============================================================================

/// Placeholder client name found in captured traces
pub const CLIENT_PLACEHOLDER: &str = "client1";

/// Upper bound on tokens per line, including the empty end-of-arguments token
pub const MAX_TOKENS: usize = 20;

/// Numeric parameters carried by one operation record
pub const MAX_PARAMS: usize = 10;

/// Lines starting with this are comments
pub const COMMENT_MARKER: char = '#';

/// Operation names with this prefix come from the old (v1) trace format
pub const LEGACY_OP_PREFIX: &str = "SMB";

/// Pseudo operation handled by the engine itself
pub const SLEEP_OP: &str = "Sleep";

// =============================================================================
// Backends
// =============================================================================

/// Size of the shared read/write buffer used by the I/O backends
pub const RWBUFSIZE: usize = 1024 * 1024;

/// Port the tbench server listens on
pub const TCP_PORT: u16 = 7003;

/// Timeout applied to every SG_IO command (milliseconds)
pub const SCSI_TIMEOUT_MS: u32 = 5000;

/// Logical block size assumed for READ10 transfer lengths
pub const SCSI_BLOCK_SIZE: u64 = 512;

/// Progress dot printed every N packet exchanges by the socket backend
pub const PACKET_DOT_INTERVAL: u64 = 3000;

// =============================================================================
// Latency Histograms
// =============================================================================

/// Lowest trackable latency in microseconds
pub const HIST_LOW_US: u64 = 1;

/// Highest trackable latency in microseconds (1 hour)
pub const HIST_HIGH_US: u64 = 3_600_000_000;

/// Significant figures kept by the latency histograms
pub const HIST_SIGFIG: u8 = 3;
