// -----------------------------------------------------------------------------
// dbench - trace-replay load generator for filesystems, block devices and
// network storage
// -----------------------------------------------------------------------------

use anyhow::{Context, Result};
use clap::Parser;
use dbench::config::{BackendKind, Options};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{debug, error};

// -----------------------------------------------------------------------------
// CLI definition
// -----------------------------------------------------------------------------
#[derive(Parser, Debug)]
#[command(
    name = "dbench",
    version,
    about = "Replay a captured storage workload from many simulated clients"
)]
struct Cli {
    /// Number of worker processes
    nprocs: Option<usize>,

    /// Verbose output (-v for info, -vv for debug, -vvv for trace)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    verbose: u8,

    /// YAML file with run options; command line flags override it
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Backend: fileio, sockio, block, nfs, scsi or smb
    #[arg(short = 'B', long)]
    backend: Option<BackendKind>,

    /// Run time limit in seconds
    #[arg(short = 't', long)]
    timelimit: Option<u64>,

    /// Load file(s), comma separated; process i replays entry i mod n
    #[arg(short = 'c', long)]
    loadfile: Option<String>,

    /// Working directory for file based backends
    #[arg(short = 'D', long)]
    directory: Option<PathBuf>,

    /// Socket options for the sockio backend
    #[arg(short = 'T', long = "tcp-options")]
    tcp_options: Option<String>,

    /// Aggregate target rate in MB/sec (0 replays at trace timing or flat out)
    #[arg(short = 'R', long = "target-rate")]
    target_rate: Option<f64>,

    /// Open files with O_SYNC
    #[arg(short = 's', long = "sync")]
    sync_open: bool,

    /// Sync the parent directory after namespace changes
    #[arg(short = 'S', long = "sync-dir")]
    sync_dirs: bool,

    /// fsync after every write
    #[arg(short = 'F', long = "fsync")]
    do_fsync: bool,

    /// Disable name resolution simulation
    #[arg(long)]
    no_resolve: bool,

    /// Number of clients per worker process
    #[arg(long)]
    clients_per_process: Option<usize>,

    /// Truncate every I/O to at most this many bytes
    #[arg(long)]
    trunc_io: Option<u64>,

    /// Skip one byte writes that would not change the file
    #[arg(long)]
    one_byte_write_fix: bool,

    /// Check for pointless creates and mkdirs
    #[arg(long)]
    stat_check: bool,

    /// Account reads and writes without doing the I/O
    #[arg(long)]
    fake_io: bool,

    /// Leave the client directories behind
    #[arg(long)]
    skip_cleanup: bool,

    /// Print per-client latency tables
    #[arg(long)]
    per_client_results: bool,

    /// Server for the sockio backend
    #[arg(long)]
    server: Option<String>,

    /// Mounted NFS export(s), comma separated
    #[arg(long)]
    nfs: Option<String>,

    /// Replay NLM lock operations
    #[arg(long)]
    enable_nlm: bool,

    /// Stop after one pass over the load file
    #[arg(long)]
    run_once: bool,

    /// SCSI generic device node for the scsi backend
    #[arg(long)]
    scsi: Option<String>,

    /// Warmup seconds (default: a fifth of the time limit)
    #[arg(long)]
    warmup: Option<u64>,

    /// Machine readable progress and results
    #[arg(long)]
    machine_readable: bool,

    /// //SERVER/SHARE for the smb backend
    #[arg(long)]
    smb_share: Option<String>,

    /// [<domain>/]<user>%<password> for the smb backend
    #[arg(long)]
    smb_user: Option<String>,

    /// Block device(s) for the block backend, comma separated
    #[arg(long)]
    block: Option<String>,

    /// Stop each client after this many load file lines
    #[arg(long)]
    line_limit: Option<u64>,

    /// Write <BASE>-results.tsv with per-operation statistics
    #[arg(long, value_name = "BASE")]
    results_tsv: Option<PathBuf>,
}

impl Cli {
    /// Options from the config file (or defaults) with explicit flags on top.
    fn into_options(self) -> Result<Options> {
        let mut o = match &self.config {
            Some(path) => Options::from_yaml_file(path)?,
            None => Options::default(),
        };

        if let Some(v) = self.nprocs {
            o.nprocs = v;
        }
        if let Some(v) = self.backend {
            o.backend = v;
        }
        if let Some(v) = self.timelimit {
            o.timelimit = v;
        }
        if let Some(v) = self.loadfile {
            o.loadfile = Some(v);
        }
        if let Some(v) = self.directory {
            o.directory = v;
        }
        if let Some(v) = self.tcp_options {
            o.tcp_options = v;
        }
        if let Some(v) = self.target_rate {
            o.target_rate = v;
        }
        if let Some(v) = self.clients_per_process {
            o.clients_per_process = v;
        }
        if let Some(v) = self.trunc_io {
            o.trunc_io = v;
        }
        if let Some(v) = self.server {
            o.server = v;
        }
        if self.nfs.is_some() {
            o.nfs = self.nfs;
        }
        if self.scsi.is_some() {
            o.scsi = self.scsi;
        }
        if self.warmup.is_some() {
            o.warmup = self.warmup;
        }
        if self.smb_share.is_some() {
            o.smb_share = self.smb_share;
        }
        if self.smb_user.is_some() {
            o.smb_user = self.smb_user;
        }
        if self.block.is_some() {
            o.block = self.block;
        }
        if self.line_limit.is_some() {
            o.line_limit = self.line_limit;
        }
        if self.results_tsv.is_some() {
            o.results_tsv = self.results_tsv;
        }

        // Switches only ever turn things on
        o.sync_open |= self.sync_open;
        o.sync_dirs |= self.sync_dirs;
        o.do_fsync |= self.do_fsync;
        o.no_resolve |= self.no_resolve;
        o.one_byte_write_fix |= self.one_byte_write_fix;
        o.stat_check |= self.stat_check;
        o.fake_io |= self.fake_io;
        o.skip_cleanup |= self.skip_cleanup;
        o.per_client_results |= self.per_client_results;
        o.enable_nlm |= self.enable_nlm;
        o.run_once |= self.run_once;
        o.machine_readable |= self.machine_readable;

        Ok(o)
    }
}

// -----------------------------------------------------------------------------
// main
// -----------------------------------------------------------------------------
fn main() -> ExitCode {
    let cli = Cli::parse();

    // -v info, -vv debug, -vvv trace; RUST_LOG wins when set
    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    use tracing_subscriber::{fmt, EnvFilter};
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("dbench={}", level)));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    println!("dbench-rs version {}", env!("CARGO_PKG_VERSION"));
    let opts = cli.into_options().context("Invalid options")?;
    debug!("options: {:?}", opts);

    let summary = dbench::run(Arc::new(opts))?;
    debug!(
        "{} operations, {} diagnostics",
        summary.ops.iter().map(|o| o.count).sum::<u64>(),
        summary.diagnostics
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_overrides() {
        let cli = Cli::try_parse_from([
            "dbench", "-B", "sockio", "-t", "30", "-c", "a.txt,b.txt", "--server", "filer", "-s", "4",
        ])
        .unwrap();
        let o = cli.into_options().unwrap();
        assert_eq!(o.nprocs, 4);
        assert_eq!(o.backend, BackendKind::Sockio);
        assert_eq!(o.timelimit, 30);
        assert_eq!(o.loadfile.as_deref(), Some("a.txt,b.txt"));
        assert_eq!(o.server, "filer");
        assert!(o.sync_open);
        assert!(!o.sync_dirs);
    }

    #[test]
    fn test_config_file_then_flags() {
        let dir = tempfile::TempDir::new().unwrap();
        let cfg = dir.path().join("run.yaml");
        std::fs::write(&cfg, "nprocs: 3\ntimelimit: 90\nstat_check: true\nloadfile: client.txt\n").unwrap();
        let cli = Cli::try_parse_from([
            "dbench".to_string(),
            "--config".to_string(),
            cfg.display().to_string(),
            "-t".to_string(),
            "10".to_string(),
        ])
        .unwrap();
        let o = cli.into_options().unwrap();
        assert_eq!(o.nprocs, 3);
        assert_eq!(o.timelimit, 10);
        assert!(o.stat_check);
        assert_eq!(o.loadfile.as_deref(), Some("client.txt"));
    }

    #[test]
    fn test_unknown_backend_rejected() {
        assert!(Cli::try_parse_from(["dbench", "-B", "floppy", "2"]).is_err());
    }
}
