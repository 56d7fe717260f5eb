// src/config.rs
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::constants::{
    DEFAULT_DIRECTORY, DEFAULT_NPROCS, DEFAULT_SERVER, DEFAULT_TCP_OPTIONS,
    DEFAULT_TIMELIMIT_SECS, DEFAULT_WARMUP_DIVISOR,
};
use crate::error::ReplayError;

/// Storage target the replayed operations are executed against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Local filesystem under `directory`
    #[default]
    Fileio,
    /// Emulated request/response packets against a tbench server
    Sockio,
    /// Raw block device (pread/pwrite)
    Block,
    /// Mounted NFS export, outcomes reported as NFSv3 status codes
    Nfs,
    /// Linux SCSI generic device driven through SG_IO
    Scsi,
    /// Mounted SMB/CIFS share
    Smb,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Fileio => "fileio",
            BackendKind::Sockio => "sockio",
            BackendKind::Block => "block",
            BackendKind::Nfs => "nfs",
            BackendKind::Scsi => "scsi",
            BackendKind::Smb => "smb",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = ReplayError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "fileio" => Ok(BackendKind::Fileio),
            "sockio" => Ok(BackendKind::Sockio),
            "block" => Ok(BackendKind::Block),
            "nfs" => Ok(BackendKind::Nfs),
            "scsi" => Ok(BackendKind::Scsi),
            "smb" => Ok(BackendKind::Smb),
            _ => Err(ReplayError::UnknownBackend(s.to_string())),
        }
    }
}

/// Run configuration. Built once at startup and shared read-only as
/// `Arc<Options>` by the controller, the workers and the backends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Options {
    #[serde(default)]
    pub backend: BackendKind,

    /// Number of worker processes (groups)
    #[serde(default = "default_nprocs")]
    pub nprocs: usize,

    /// Logical clients multiplexed inside each worker process
    #[serde(default = "default_clients_per_process")]
    pub clients_per_process: usize,

    /// Execute phase length in seconds
    #[serde(default = "default_timelimit")]
    pub timelimit: u64,

    /// Warmup length in seconds. None means timelimit / 5.
    #[serde(default)]
    pub warmup: Option<u64>,

    /// Comma separated list of load files; process `i` replays entry `i mod n`
    #[serde(default)]
    pub loadfile: Option<String>,

    /// Working directory that trace paths are resolved against
    #[serde(default = "default_directory")]
    pub directory: PathBuf,

    /// Aggregate target throughput in MB/sec (0 = as fast as possible)
    #[serde(default)]
    pub target_rate: f64,

    #[serde(default)]
    pub sync_open: bool,
    #[serde(default)]
    pub sync_dirs: bool,
    #[serde(default)]
    pub do_fsync: bool,

    /// Disable case-insensitive name resolution simulation
    #[serde(default)]
    pub no_resolve: bool,

    #[serde(default)]
    pub one_byte_write_fix: bool,

    /// Skip creates and mkdirs a stat shows to be pointless
    #[serde(default)]
    pub stat_check: bool,

    /// Account read/write bytes without touching the data path
    #[serde(default)]
    pub fake_io: bool,

    /// Truncate every read/write to this many bytes (0 = off)
    #[serde(default)]
    pub trunc_io: u64,

    #[serde(default)]
    pub run_once: bool,
    #[serde(default)]
    pub skip_cleanup: bool,
    #[serde(default)]
    pub per_client_results: bool,
    #[serde(default)]
    pub machine_readable: bool,

    /// Stop each client after this many trace lines
    #[serde(default)]
    pub line_limit: Option<u64>,

    #[serde(default = "default_server")]
    pub server: String,
    #[serde(default = "default_tcp_options")]
    pub tcp_options: String,

    /// Block device (comma list allowed, first entry is used)
    #[serde(default)]
    pub block: Option<String>,

    /// Mount point(s) of the NFS export; client `i` uses entry `i mod n`
    #[serde(default)]
    pub nfs: Option<String>,
    #[serde(default)]
    pub enable_nlm: bool,

    /// SCSI generic device node, e.g. /dev/sg1
    #[serde(default)]
    pub scsi: Option<String>,

    /// `//SERVER/SHARE` of a mounted SMB share
    #[serde(default)]
    pub smb_share: Option<String>,
    /// `[<domain>/]<user>%<password>`
    #[serde(default)]
    pub smb_user: Option<String>,

    /// Base name for `<base>-results.tsv`
    #[serde(default)]
    pub results_tsv: Option<PathBuf>,
}

fn default_nprocs() -> usize {
    DEFAULT_NPROCS
}

fn default_clients_per_process() -> usize {
    1
}

fn default_timelimit() -> u64 {
    DEFAULT_TIMELIMIT_SECS
}

fn default_directory() -> PathBuf {
    PathBuf::from(DEFAULT_DIRECTORY)
}

fn default_server() -> String {
    DEFAULT_SERVER.to_string()
}

fn default_tcp_options() -> String {
    DEFAULT_TCP_OPTIONS.to_string()
}

impl Default for Options {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            nprocs: default_nprocs(),
            clients_per_process: default_clients_per_process(),
            timelimit: default_timelimit(),
            warmup: None,
            loadfile: None,
            directory: default_directory(),
            target_rate: 0.0,
            sync_open: false,
            sync_dirs: false,
            do_fsync: false,
            no_resolve: false,
            one_byte_write_fix: false,
            stat_check: false,
            fake_io: false,
            trunc_io: 0,
            run_once: false,
            skip_cleanup: false,
            per_client_results: false,
            machine_readable: false,
            line_limit: None,
            server: default_server(),
            tcp_options: default_tcp_options(),
            block: None,
            nfs: None,
            enable_nlm: false,
            scsi: None,
            smb_share: None,
            smb_user: None,
            results_tsv: None,
        }
    }
}

impl Options {
    /// Load options from a YAML file. Missing keys take their defaults.
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let opts: Options = serde_yaml::from_str(&text)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(opts)
    }

    /// Total number of simulated clients
    pub fn nclients(&self) -> usize {
        self.nprocs * self.clients_per_process
    }

    /// Effective warmup in seconds
    pub fn warmup_secs(&self) -> u64 {
        self.warmup
            .unwrap_or(self.timelimit / DEFAULT_WARMUP_DIVISOR)
    }

    /// Share of the aggregate target rate owned by one client (MB/sec)
    pub fn client_rate(&self) -> f64 {
        let n = self.nclients().max(1);
        self.target_rate / n as f64
    }

    /// Load file replayed by worker process `process`
    pub fn loadfile_for(&self, process: usize) -> Result<PathBuf> {
        let list = self
            .loadfile
            .as_deref()
            .context("No loadfile was specified")?;
        let entry = next_arg(list, process).context("Empty loadfile list")?;
        Ok(PathBuf::from(entry))
    }

    /// Check the combination of options before anything is started.
    pub fn validate(&self) -> Result<()> {
        if self.nprocs < 1 {
            bail!("create {} procs?  you must be kidding.", self.nprocs);
        }
        if self.clients_per_process < 1 {
            bail!("clients per process must be at least 1");
        }
        if self.loadfile.as_deref().map_or(true, |l| l.trim().is_empty()) {
            bail!("No loadfile was specified. Aborting.");
        }
        if !self.target_rate.is_finite() || self.target_rate < 0.0 {
            bail!("target rate must be a non-negative number, got {}", self.target_rate);
        }

        match self.backend {
            BackendKind::Block if self.block.is_none() => {
                bail!("the block backend needs --block <device>")
            }
            BackendKind::Nfs if self.nfs.is_none() => {
                bail!("the nfs backend needs --nfs <mount point of the export>")
            }
            BackendKind::Scsi if self.scsi.is_none() => {
                bail!("the scsi backend needs --scsi <device node>")
            }
            BackendKind::Smb => {
                let share = self
                    .smb_share
                    .as_deref()
                    .context("the smb backend needs --smb-share //SERVER/SHARE")?;
                parse_smb_share(share)?;
                if let Some(user) = self.smb_user.as_deref() {
                    parse_smb_user(user)?;
                }
            }
            _ => {}
        }
        Ok(())
    }
}

/// Pick entry `index` (wrapping) from a comma separated list.
pub fn next_arg(list: &str, index: usize) -> Option<&str> {
    let items: Vec<&str> = list
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect();
    if items.is_empty() {
        return None;
    }
    Some(items[index % items.len()])
}

/// Split `//SERVER/SHARE` into its server and share parts.
pub fn parse_smb_share(share: &str) -> Result<(String, String)> {
    let rest = share
        .strip_prefix("//")
        .with_context(|| format!("Invalid SMB share '{}', expected //SERVER/SHARE", share))?;
    match rest.split_once('/') {
        Some((server, name)) if !server.is_empty() && !name.is_empty() && !name.contains('/') => {
            Ok((server.to_string(), name.to_string()))
        }
        _ => bail!("Invalid SMB share '{}', expected //SERVER/SHARE", share),
    }
}

/// Credentials parsed from `[<domain>/]<user>%<password>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SmbUser {
    pub domain: Option<String>,
    pub user: String,
    pub password: String,
}

pub fn parse_smb_user(spec: &str) -> Result<SmbUser> {
    let (account, password) = spec
        .split_once('%')
        .with_context(|| format!("Invalid SMB user '{}', expected [<domain>/]<user>%<password>", spec))?;
    let (domain, user) = match account.split_once('/') {
        Some((d, u)) => (Some(d.to_string()), u.to_string()),
        None => (None, account.to_string()),
    };
    if user.is_empty() || domain.as_deref() == Some("") {
        bail!("Invalid SMB user '{}', expected [<domain>/]<user>%<password>", spec);
    }
    Ok(SmbUser {
        domain,
        user,
        password: password.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let opts = Options::default();
        assert_eq!(opts.nprocs, 10);
        assert_eq!(opts.timelimit, 600);
        assert_eq!(opts.warmup_secs(), 120);
        assert_eq!(opts.tcp_options, "TCP_NODELAY");
        assert_eq!(opts.backend, BackendKind::Fileio);
    }

    #[test]
    fn test_explicit_warmup_overrides_default() {
        let opts = Options {
            warmup: Some(0),
            ..Default::default()
        };
        assert_eq!(opts.warmup_secs(), 0);
    }

    #[test]
    fn test_client_rate_splits_aggregate() {
        let opts = Options {
            nprocs: 4,
            clients_per_process: 2,
            target_rate: 80.0,
            ..Default::default()
        };
        assert_eq!(opts.nclients(), 8);
        assert!((opts.client_rate() - 10.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_next_arg_wraps() {
        assert_eq!(next_arg("a,b,c", 0), Some("a"));
        assert_eq!(next_arg("a,b,c", 4), Some("b"));
        assert_eq!(next_arg("only", 7), Some("only"));
        assert_eq!(next_arg(" , ", 0), None);
    }

    #[test]
    fn test_backend_from_str() {
        assert_eq!("NFS".parse::<BackendKind>().unwrap(), BackendKind::Nfs);
        let err = "iscsi".parse::<BackendKind>().unwrap_err();
        assert!(matches!(err, ReplayError::UnknownBackend(ref b) if b == "iscsi"));
    }

    #[test]
    fn test_validate_requires_loadfile() {
        let opts = Options::default();
        assert!(opts.validate().is_err());

        let opts = Options {
            loadfile: Some("client.txt".into()),
            ..Default::default()
        };
        assert!(opts.validate().is_ok());
    }

    #[test]
    fn test_validate_backend_targets() {
        let base = Options {
            loadfile: Some("client.txt".into()),
            ..Default::default()
        };
        let block = Options {
            backend: BackendKind::Block,
            ..base.clone()
        };
        assert!(block.validate().is_err());

        let smb = Options {
            backend: BackendKind::Smb,
            smb_share: Some("//server/share".into()),
            smb_user: Some("user".into()),
            ..base
        };
        assert!(smb.validate().is_err());
    }

    #[test]
    fn test_smb_parsing() {
        let (server, share) = parse_smb_share("//fs01/data").unwrap();
        assert_eq!(server, "fs01");
        assert_eq!(share, "data");
        assert!(parse_smb_share("fs01/data").is_err());
        assert!(parse_smb_share("//fs01/").is_err());

        let u = parse_smb_user("CORP/alice%secret").unwrap();
        assert_eq!(u.domain.as_deref(), Some("CORP"));
        assert_eq!(u.user, "alice");
        assert_eq!(u.password, "secret");

        let u = parse_smb_user("bob%").unwrap();
        assert_eq!(u.domain, None);
        assert_eq!(u.password, "");
    }

    #[test]
    fn test_yaml_partial_config() {
        let yaml = r#"
backend: sockio
nprocs: 4
loadfile: "a.txt,b.txt"
run_once: true
"#;
        let opts: Options = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(opts.backend, BackendKind::Sockio);
        assert_eq!(opts.nprocs, 4);
        assert!(opts.run_once);
        assert_eq!(opts.timelimit, 600);
        assert_eq!(opts.loadfile_for(1).unwrap(), PathBuf::from("b.txt"));
        assert_eq!(opts.loadfile_for(2).unwrap(), PathBuf::from("a.txt"));
    }
}
