//! Storage backends
//!
//! A backend owns one session per simulated client and exposes its
//! operations through an [`OpTable`]. The controller picks the backend once
//! from [`BackendKind`] and everything below it is monomorphized, so the hot
//! path never goes through a trait object.

use anyhow::Result;
use std::fs::{self, File};
use std::io;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

use crate::config::Options;
use crate::ops::OpTable;
use crate::stats::WorkerSlot;
use crate::trace::parse_param;

pub mod block;
pub mod fileio;
pub mod nfs;
pub mod scsi;
pub mod smb;
pub mod sockio;

/// Lifecycle hooks plus the operation table every backend provides.
pub trait Backend: Send + Sync + 'static {
    /// Per-client state, owned by the worker thread running that client
    type Session: Send;

    fn name(&self) -> &'static str;

    /// One-time check before any worker starts; fail fast when the target
    /// is unreachable or misconfigured.
    fn init(&self, _opts: &Options) -> Result<()> {
        Ok(())
    }

    /// Per-client setup, run before the client reports ready.
    fn setup(&self, slot: &WorkerSlot, opts: &Options) -> Result<Self::Session>;

    /// Per-client teardown after the replay loop has finished.
    fn cleanup(&self, session: &mut Self::Session, slot: &WorkerSlot) -> Result<()>;

    /// Recursive delete used by cleanup and by `Deltree` trace lines.
    fn deltree(&self, session: &mut Self::Session, path: &Path) -> Result<()>;

    fn op_table(&self, opts: &Options) -> OpTable<Self::Session>;

    /// Directory trace paths are resolved against for worker `process`.
    fn base_dir(&self, opts: &Options, _process: usize) -> PathBuf {
        opts.directory.clone()
    }
}

/// Numeric status comparison: `*` matches anything, `0x..` compares the
/// value, `NT_STATUS_OK` means 0, any other shape never matches.
pub fn check_status(code: u32, expected: &str) -> bool {
    if expected == "*" {
        return true;
    }
    if expected.starts_with("0x") {
        return i64::from(code) == parse_param(expected);
    }
    expected == "NT_STATUS_OK" && code == 0
}

/// Whether the trace expects the operation to succeed. None for `*`.
pub fn expect_success(expected: &str) -> Option<bool> {
    if expected == "*" {
        return None;
    }
    if expected.starts_with("0x") {
        return Some(parse_param(expected) == 0);
    }
    Some(expected == "NT_STATUS_OK")
}

/// Remove a directory tree; a missing path is not an error.
pub fn remove_tree(path: &Path) -> io::Result<()> {
    match fs::symlink_metadata(path) {
        Ok(md) if md.is_dir() => fs::remove_dir_all(path),
        Ok(_) => fs::remove_file(path),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Clamp a requested transfer length to `trunc_io` (when set) and `cap`.
pub fn io_len(requested: i64, trunc_io: u64, cap: usize) -> usize {
    let mut len = requested.max(0) as u64;
    if trunc_io > 0 && len > trunc_io {
        len = trunc_io;
    }
    len.min(cap as u64) as usize
}

/// `<base>/clients/client<id>`: the per-client tree removed at cleanup.
pub fn client_dir(base: &Path, slot: &WorkerSlot) -> PathBuf {
    base.join("clients").join(slot.client_name())
}

/// Byte range lock request for [`range_lock`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockKind {
    Read,
    Write,
    Unlock,
}

fn flock_for(kind: LockKind, offset: i64, len: i64) -> libc::flock {
    // SAFETY: flock is plain old data; every field we rely on is set below.
    let mut fl: libc::flock = unsafe { std::mem::zeroed() };
    fl.l_type = match kind {
        LockKind::Read => libc::F_RDLCK,
        LockKind::Write => libc::F_WRLCK,
        LockKind::Unlock => libc::F_UNLCK,
    } as libc::c_short;
    fl.l_whence = libc::SEEK_SET as libc::c_short;
    fl.l_start = offset.max(0) as libc::off_t;
    fl.l_len = len.max(0) as libc::off_t;
    fl
}

/// Non-blocking open-file-description lock. Locks belong to the handle, so
/// clients sharing this process still conflict with each other.
pub fn range_lock(file: &File, offset: i64, len: i64, kind: LockKind) -> io::Result<()> {
    let fl = flock_for(kind, offset, len);
    // SAFETY: the fd is owned by `file` and `fl` outlives the call.
    let rc = unsafe { libc::fcntl(file.as_raw_fd(), libc::F_OFD_SETLK, &fl as *const libc::flock) };
    if rc == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Whether a write lock on the range would be granted right now.
pub fn range_test(file: &File, offset: i64, len: i64) -> io::Result<bool> {
    let mut fl = flock_for(LockKind::Write, offset, len);
    // SAFETY: as above; F_OFD_GETLK writes the conflicting lock back into fl.
    let rc = unsafe { libc::fcntl(file.as_raw_fd(), libc::F_OFD_GETLK, &mut fl as *mut libc::flock) };
    if rc == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(fl.l_type == libc::F_UNLCK as libc::c_short)
}

/// Buffer of `len` bytes whose start is aligned to `align` (for O_DIRECT).
pub struct AlignedBuf {
    storage: Vec<u8>,
    offset: usize,
    len: usize,
}

impl AlignedBuf {
    pub fn new(len: usize, align: usize, fill: u8) -> Self {
        let storage = vec![fill; len + align];
        let addr = storage.as_ptr() as usize;
        let offset = (align - addr % align) % align;
        Self {
            storage,
            offset,
            len,
        }
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.storage[self.offset..self.offset + self.len]
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.storage[self.offset..self.offset + self.len]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}
