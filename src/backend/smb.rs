//! SMB share backend
//!
//! Runs the CIFS-style load against `//SERVER/SHARE` through the kernel SMB
//! client: the share must already be mounted (cifs or smb3) and is located in
//! the mount table. Sessions, operations and cleanup are those of the local
//! filesystem backend rooted at the mount point.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tracing::info;

use super::fileio::{cifs_table, cleanup_client, FileSession};
use super::{remove_tree, Backend};
use crate::config::{parse_smb_share, parse_smb_user, Options};
use crate::ops::OpTable;
use crate::stats::WorkerSlot;

const MOUNT_TABLE: &str = "/proc/mounts";

/// Decode the octal escapes (`\040` for space) used in the mount table.
fn unescape(field: &str) -> String {
    let bytes = field.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\\' && i + 3 < bytes.len() {
            let digits = std::str::from_utf8(&bytes[i + 1..i + 4]).ok();
            if let Some(v) = digits.and_then(|d| u8::from_str_radix(d, 8).ok()) {
                out.push(v);
                i += 4;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

/// Find the mount point of `//server/share` in mount table text.
pub fn find_share_mount(table: &str, server: &str, share: &str) -> Option<PathBuf> {
    table.lines().find_map(|line| {
        let mut fields = line.split_whitespace();
        let source = unescape(fields.next()?);
        let target = unescape(fields.next()?);
        let fstype = fields.next()?;
        if !matches!(fstype, "cifs" | "smb3") {
            return None;
        }
        let (srv, shr) = parse_smb_share(source.trim_end_matches('/')).ok()?;
        (srv.eq_ignore_ascii_case(server) && shr.eq_ignore_ascii_case(share)).then(|| PathBuf::from(target))
    })
}

pub struct Smb {
    mount: OnceLock<PathBuf>,
}

impl Smb {
    pub fn new() -> Self {
        Smb {
            mount: OnceLock::new(),
        }
    }

    fn locate(&self, opts: &Options) -> Result<PathBuf> {
        if let Some(m) = self.mount.get() {
            return Ok(m.clone());
        }
        let spec = opts
            .smb_share
            .as_deref()
            .context("the smb backend needs --smb-share //SERVER/SHARE")?;
        let (server, share) = parse_smb_share(spec)?;
        let table = fs::read_to_string(MOUNT_TABLE)
            .with_context(|| format!("Failed to read {}", MOUNT_TABLE))?;
        let mount = find_share_mount(&table, &server, &share)
            .with_context(|| format!("{} is not mounted (cifs/smb3)", spec))?;
        Ok(self.mount.get_or_init(|| mount).clone())
    }
}

impl Default for Smb {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for Smb {
    type Session = FileSession;

    fn name(&self) -> &'static str {
        "smb"
    }

    fn init(&self, opts: &Options) -> Result<()> {
        if let Some(user) = opts.smb_user.as_deref() {
            let u = parse_smb_user(user)?;
            info!(
                "smb credentials for {}{} are taken from the kernel mount",
                u.domain.map(|d| format!("{}/", d)).unwrap_or_default(),
                u.user
            );
        }
        let mount = self.locate(opts)?;
        info!("smb backend using share mounted at {}", mount.display());
        Ok(())
    }

    fn setup(&self, _slot: &WorkerSlot, opts: &Options) -> Result<FileSession> {
        let mount = self.locate(opts)?;
        let mut session_opts = opts.clone();
        session_opts.directory = mount.clone();
        Ok(FileSession::new(Arc::new(session_opts), mount))
    }

    fn cleanup(&self, session: &mut FileSession, slot: &WorkerSlot) -> Result<()> {
        cleanup_client(session, slot)
    }

    fn deltree(&self, _session: &mut FileSession, path: &Path) -> Result<()> {
        remove_tree(path).with_context(|| format!("deltree {} failed", path.display()))
    }

    fn op_table(&self, _opts: &Options) -> OpTable<FileSession> {
        cifs_table()
    }

    fn base_dir(&self, opts: &Options, _process: usize) -> PathBuf {
        self.locate(opts).unwrap_or_else(|_| opts.directory.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MOUNTS: &str = "\
sysfs /sys sysfs rw,nosuid,nodev,noexec,relatime 0 0
/dev/sda1 / ext4 rw,relatime 0 0
//fileserver/public /mnt/public cifs rw,relatime,vers=3.1.1 0 0
//FILESERVER/Team\\040Docs /mnt/team\\040docs smb3 rw,relatime 0 0
//nas/backup /mnt/backup nfs rw 0 0
";

    #[test]
    fn test_find_share_mount() {
        assert_eq!(
            find_share_mount(MOUNTS, "fileserver", "public"),
            Some(PathBuf::from("/mnt/public"))
        );
        assert_eq!(
            find_share_mount(MOUNTS, "FileServer", "PUBLIC"),
            Some(PathBuf::from("/mnt/public"))
        );
        assert_eq!(
            find_share_mount(MOUNTS, "fileserver", "team docs"),
            Some(PathBuf::from("/mnt/team docs"))
        );
        // wrong filesystem type
        assert_eq!(find_share_mount(MOUNTS, "nas", "backup"), None);
        assert_eq!(find_share_mount(MOUNTS, "fileserver", "private"), None);
    }

    #[test]
    fn test_unescape() {
        assert_eq!(unescape("a\\040b"), "a b");
        assert_eq!(unescape("plain"), "plain");
        assert_eq!(unescape("trailing\\04"), "trailing\\04");
    }

    #[test]
    fn test_unmounted_share_fails_init() {
        let opts = Options {
            smb_share: Some("//no-such-server-here/nothing".into()),
            ..Default::default()
        };
        assert!(Smb::new().init(&opts).is_err());
    }
}
