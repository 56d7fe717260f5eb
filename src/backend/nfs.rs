//! NFSv3 workload backend
//!
//! Replays NFSv3-style traces (`GETATTR3`, `WRITE3`, ...) against a mounted
//! export. Trace paths are relative to the export root and resolve under the
//! mount point; each outcome is mapped to the NFS3 status the server would
//! have returned, and any mismatch with the trace ends the client. With
//! `--enable-nlm` the NLM lock calls (`LOCK4`, `UNLOCK4`, `TEST4`) are
//! replayed as byte range locks on the mounted files.

use anyhow::{bail, Context, Result};
use std::collections::HashMap;
use std::ffi::CString;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::{FileExt, OpenOptionsExt};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::{check_status, client_dir, io_len, range_lock, range_test, remove_tree, Backend, LockKind};
use crate::config::{next_arg, Options};
use crate::constants::RWBUFSIZE;
use crate::ops::{Op, OpTable};
use crate::stats::WorkerSlot;

pub const NFS3_OK: u32 = 0;
pub const NFS3ERR_PERM: u32 = 1;
pub const NFS3ERR_NOENT: u32 = 2;
pub const NFS3ERR_IO: u32 = 5;
pub const NFS3ERR_NXIO: u32 = 6;
pub const NFS3ERR_ACCES: u32 = 13;
pub const NFS3ERR_EXIST: u32 = 17;
pub const NFS3ERR_XDEV: u32 = 18;
pub const NFS3ERR_NODEV: u32 = 19;
pub const NFS3ERR_NOTDIR: u32 = 20;
pub const NFS3ERR_ISDIR: u32 = 21;
pub const NFS3ERR_INVAL: u32 = 22;
pub const NFS3ERR_FBIG: u32 = 27;
pub const NFS3ERR_NOSPC: u32 = 28;
pub const NFS3ERR_ROFS: u32 = 30;
pub const NFS3ERR_MLINK: u32 = 31;
pub const NFS3ERR_NAMETOOLONG: u32 = 63;
pub const NFS3ERR_NOTEMPTY: u32 = 66;
pub const NFS3ERR_DQUOT: u32 = 69;
pub const NFS3ERR_STALE: u32 = 70;
pub const NFS3ERR_NOTSUPP: u32 = 10004;
pub const NFS3ERR_SERVERFAULT: u32 = 10006;

// nlm4_stats
pub const NLM4_GRANTED: u32 = 0;
pub const NLM4_DENIED: u32 = 1;
pub const NLM4_FAILED: u32 = 9;

/// NFS3 status for the outcome of a local call.
pub fn nfs3_status<T>(res: &io::Result<T>) -> u32 {
    let e = match res {
        Ok(_) => return NFS3_OK,
        Err(e) => e,
    };
    match e.raw_os_error() {
        Some(libc::EPERM) => NFS3ERR_PERM,
        Some(libc::ENOENT) => NFS3ERR_NOENT,
        Some(libc::EIO) => NFS3ERR_IO,
        Some(libc::ENXIO) => NFS3ERR_NXIO,
        Some(libc::EACCES) => NFS3ERR_ACCES,
        Some(libc::EEXIST) => NFS3ERR_EXIST,
        Some(libc::EXDEV) => NFS3ERR_XDEV,
        Some(libc::ENODEV) => NFS3ERR_NODEV,
        Some(libc::ENOTDIR) => NFS3ERR_NOTDIR,
        Some(libc::EISDIR) => NFS3ERR_ISDIR,
        Some(libc::EINVAL) => NFS3ERR_INVAL,
        Some(libc::EFBIG) => NFS3ERR_FBIG,
        Some(libc::ENOSPC) => NFS3ERR_NOSPC,
        Some(libc::EROFS) => NFS3ERR_ROFS,
        Some(libc::EMLINK) => NFS3ERR_MLINK,
        Some(libc::ENAMETOOLONG) => NFS3ERR_NAMETOOLONG,
        Some(libc::ENOTEMPTY) => NFS3ERR_NOTEMPTY,
        Some(libc::EDQUOT) => NFS3ERR_DQUOT,
        Some(libc::ESTALE) => NFS3ERR_STALE,
        Some(libc::EOPNOTSUPP) => NFS3ERR_NOTSUPP,
        _ => match e.kind() {
            io::ErrorKind::NotFound => NFS3ERR_NOENT,
            io::ErrorKind::PermissionDenied => NFS3ERR_ACCES,
            io::ErrorKind::AlreadyExists => NFS3ERR_EXIST,
            _ => NFS3ERR_SERVERFAULT,
        },
    }
}

pub struct NfsSession {
    mount: PathBuf,
    buf: Vec<u8>,
    trunc_io: u64,
    /// Files holding this client's NLM locks; a lock lives as long as its handle.
    locks: HashMap<PathBuf, File>,
}

impl NfsSession {
    fn lock_handle(&mut self, path: &Path) -> io::Result<&File> {
        if !self.locks.contains_key(path) {
            let f = OpenOptions::new().read(true).write(true).open(path)?;
            self.locks.insert(path.to_path_buf(), f);
        }
        self.locks
            .get(path)
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))
    }
}

fn cpath(path: &Path) -> io::Result<CString> {
    CString::new(path.as_os_str().as_bytes()).map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))
}

fn check_rc(rc: libc::c_int) -> io::Result<()> {
    if rc == -1 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

fn statvfs(path: &Path) -> io::Result<libc::statvfs> {
    let c = cpath(path)?;
    let mut st: libc::statvfs = unsafe { std::mem::zeroed() };
    // SAFETY: valid C path and out pointer for the duration of the call.
    check_rc(unsafe { libc::statvfs(c.as_ptr(), &mut st) })?;
    Ok(st)
}

/// Compare against the trace; a mismatch is fatal for the client.
fn verdict(op: &Op<'_>, what: &str, target: &str, code: u32) -> Result<()> {
    if check_status(code, op.status) {
        return Ok(());
    }
    Err(op.failed(format!(
        "{} \"{}\" failed ({:x}) - expected {}",
        what, target, code, op.status
    )))
}

fn named(op: &Op<'_>) -> Result<PathBuf> {
    Ok(PathBuf::from(op.fname()?))
}

fn getattr(_s: &mut NfsSession, op: &Op<'_>) -> Result<()> {
    let p = named(op)?;
    verdict(op, "GETATTR", op.fname()?, nfs3_status(&fs::symlink_metadata(&p)))
}

fn setattr(_s: &mut NfsSession, op: &Op<'_>) -> Result<()> {
    let p = named(op)?;
    let res = fs::symlink_metadata(&p).and_then(|md| fs::set_permissions(&p, md.permissions()));
    verdict(op, "SETATTR", op.fname()?, nfs3_status(&res))
}

fn lookup(_s: &mut NfsSession, op: &Op<'_>) -> Result<()> {
    let p = named(op)?;
    verdict(op, "LOOKUP", op.fname()?, nfs3_status(&fs::symlink_metadata(&p)))
}

fn access(_s: &mut NfsSession, op: &Op<'_>) -> Result<()> {
    let p = named(op)?;
    let res = cpath(&p).and_then(|c| {
        // SAFETY: c is a valid NUL terminated path.
        check_rc(unsafe { libc::access(c.as_ptr(), libc::F_OK) })
    });
    verdict(op, "ACCESS", op.fname()?, nfs3_status(&res))
}

fn pathconf(_s: &mut NfsSession, op: &Op<'_>) -> Result<()> {
    let p = named(op)?;
    let res = fs::symlink_metadata(&p).and_then(|_| cpath(&p)).map(|c| {
        // SAFETY: c is a valid NUL terminated path.
        unsafe { libc::pathconf(c.as_ptr(), libc::_PC_NAME_MAX) }
    });
    verdict(op, "PATHCONF", op.fname()?, nfs3_status(&res))
}

fn readlink(_s: &mut NfsSession, op: &Op<'_>) -> Result<()> {
    let p = named(op)?;
    verdict(op, "READLINK", op.fname()?, nfs3_status(&fs::read_link(&p)))
}

fn create(_s: &mut NfsSession, op: &Op<'_>) -> Result<()> {
    let p = named(op)?;
    // UNCHECKED create: an existing file is fine and left untruncated
    let res = OpenOptions::new().write(true).create(true).mode(0o666).open(&p);
    verdict(op, "CREATE", op.fname()?, nfs3_status(&res))
}

fn write(s: &mut NfsSession, op: &Op<'_>) -> Result<()> {
    let p = named(op)?;
    let offset = op.param(0).max(0) as u64;
    let len = io_len(op.param(1), s.trunc_io, RWBUFSIZE);
    let stable = op.param(2) != 0;
    let res = OpenOptions::new().write(true).open(&p).and_then(|f| {
        f.write_all_at(&s.buf[..len], offset)?;
        if stable {
            f.sync_data()?;
        }
        Ok(())
    });
    verdict(op, "WRITE", op.fname()?, nfs3_status(&res))?;
    op.slot.add_bytes(len as u64);
    Ok(())
}

fn commit(_s: &mut NfsSession, op: &Op<'_>) -> Result<()> {
    let p = named(op)?;
    let res = OpenOptions::new().write(true).open(&p).and_then(|f| f.sync_data());
    verdict(op, "COMMIT", op.fname()?, nfs3_status(&res))
}

fn read(s: &mut NfsSession, op: &Op<'_>) -> Result<()> {
    let p = named(op)?;
    let offset = op.param(0).max(0) as u64;
    let len = io_len(op.param(1), s.trunc_io, RWBUFSIZE);
    let res = File::open(&p).and_then(|f| f.read_at(&mut s.buf[..len], offset));
    verdict(op, "READ", op.fname()?, nfs3_status(&res))?;
    op.slot.add_bytes(len as u64);
    Ok(())
}

fn mkdir(_s: &mut NfsSession, op: &Op<'_>) -> Result<()> {
    let p = named(op)?;
    verdict(op, "MKDIR", op.fname()?, nfs3_status(&fs::create_dir(&p)))
}

fn rmdir(_s: &mut NfsSession, op: &Op<'_>) -> Result<()> {
    let p = named(op)?;
    verdict(op, "RMDIR", op.fname()?, nfs3_status(&fs::remove_dir(&p)))
}

fn fsstat(s: &mut NfsSession, op: &Op<'_>) -> Result<()> {
    let res = statvfs(&s.mount);
    verdict(op, "FSSTAT", &s.mount.display().to_string(), nfs3_status(&res))
}

fn fsinfo(s: &mut NfsSession, op: &Op<'_>) -> Result<()> {
    let res = statvfs(&s.mount).map(|st| st.f_bsize);
    verdict(op, "FSINFO", &s.mount.display().to_string(), nfs3_status(&res))
}

fn symlink(_s: &mut NfsSession, op: &Op<'_>) -> Result<()> {
    let link = named(op)?;
    let target = op.fname2()?;
    let res = std::os::unix::fs::symlink(target, &link);
    verdict(op, "SYMLINK", &format!("{}\"->\"{}", op.fname()?, target), nfs3_status(&res))
}

fn link(_s: &mut NfsSession, op: &Op<'_>) -> Result<()> {
    let link = named(op)?;
    let target = op.fname2()?;
    let res = fs::hard_link(target, &link);
    verdict(op, "LINK", &format!("{}\"->\"{}", op.fname()?, target), nfs3_status(&res))
}

fn remove(s: &mut NfsSession, op: &Op<'_>) -> Result<()> {
    let p = named(op)?;
    s.locks.remove(&p);
    verdict(op, "REMOVE", op.fname()?, nfs3_status(&fs::remove_file(&p)))
}

fn rename(s: &mut NfsSession, op: &Op<'_>) -> Result<()> {
    let from = named(op)?;
    let to = op.fname2()?;
    if let Some(f) = s.locks.remove(&from) {
        s.locks.insert(PathBuf::from(to), f);
    }
    let res = fs::rename(&from, to);
    verdict(op, "RENAME", &format!("{}\"->\"{}", op.fname()?, to), nfs3_status(&res))
}

fn readdirplus(_s: &mut NfsSession, op: &Op<'_>) -> Result<()> {
    let p = named(op)?;
    let res = fs::read_dir(&p).and_then(|entries| {
        let mut n = 0usize;
        for entry in entries {
            entry?.metadata()?;
            n += 1;
        }
        Ok(n)
    });
    if let Ok(n) = &res {
        debug!("READDIRPLUS {} returned {} entries", p.display(), n);
    }
    verdict(op, "READDIRPLUS", op.fname()?, nfs3_status(&res))
}

/// Export-side recursive delete; a tree that survives is fatal.
fn deltree(_s: &mut NfsSession, op: &Op<'_>) -> Result<()> {
    let p = named(op)?;
    if let Err(e) = remove_tree(&p) {
        debug!("deltree {}: {}", p.display(), e);
    }
    if p.symlink_metadata().is_ok() {
        return Err(op.failed(format!("Directory \"{}\" not empty. Aborting", p.display())));
    }
    Ok(())
}

fn nlm_status(res: &io::Result<()>) -> u32 {
    match res {
        Ok(()) => NLM4_GRANTED,
        Err(e) if matches!(e.raw_os_error(), Some(libc::EAGAIN) | Some(libc::EACCES)) => NLM4_DENIED,
        Err(_) => NLM4_FAILED,
    }
}

fn lock_range(fname: &str, offset: i64, len: i64) -> String {
    format!("{} {}-{}", fname, offset, offset.saturating_add(len))
}

fn lock(s: &mut NfsSession, op: &Op<'_>) -> Result<()> {
    let p = named(op)?;
    let (offset, len) = (op.param(0), op.param(1));
    let res = s.lock_handle(&p).and_then(|f| range_lock(f, offset, len, LockKind::Write));
    let what = lock_range(op.fname()?, offset, len);
    verdict(op, "LOCK", &what, nlm_status(&res))
}

fn unlock(s: &mut NfsSession, op: &Op<'_>) -> Result<()> {
    let p = named(op)?;
    let (offset, len) = (op.param(0), op.param(1));
    let res = s.lock_handle(&p).and_then(|f| range_lock(f, offset, len, LockKind::Unlock));
    let what = lock_range(op.fname()?, offset, len);
    verdict(op, "UNLOCK", &what, nlm_status(&res))
}

fn test(s: &mut NfsSession, op: &Op<'_>) -> Result<()> {
    let p = named(op)?;
    let (offset, len) = (op.param(0), op.param(1));
    let res = s.lock_handle(&p).and_then(|f| range_test(f, offset, len));
    let code = match res {
        Ok(true) => NLM4_GRANTED,
        Ok(false) => NLM4_DENIED,
        Err(_) => NLM4_FAILED,
    };
    let what = lock_range(op.fname()?, offset, len);
    verdict(op, "TEST", &what, code)
}

pub struct Nfs;

impl Nfs {
    pub fn new() -> Self {
        Nfs
    }

    fn mount(opts: &Options, index: usize) -> Result<PathBuf> {
        let list = opts.nfs.as_deref().context("--nfs target was not specified")?;
        let mount = next_arg(list, index).context("empty --nfs list")?;
        Ok(PathBuf::from(mount))
    }
}

impl Default for Nfs {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for Nfs {
    type Session = NfsSession;

    fn name(&self) -> &'static str {
        "nfs"
    }

    fn init(&self, opts: &Options) -> Result<()> {
        let mount = Self::mount(opts, 0)?;
        let md = fs::metadata(&mount)
            .with_context(|| format!("Failed to reach NFS export at {}", mount.display()))?;
        if !md.is_dir() {
            bail!("NFS target {} is not a directory", mount.display());
        }
        info!("nfs backend using export mounted at {}", mount.display());
        Ok(())
    }

    fn setup(&self, slot: &WorkerSlot, opts: &Options) -> Result<NfsSession> {
        let mount = Self::mount(opts, slot.process)?;
        let clients = mount.join("clients");
        match fs::create_dir(&clients) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::AlreadyExists => {}
            Err(e) => {
                return Err(e).with_context(|| {
                    format!("Failed to create '/clients' directory under {}", mount.display())
                })
            }
        }
        Ok(NfsSession {
            mount,
            buf: vec![1u8; RWBUFSIZE],
            trunc_io: opts.trunc_io,
            locks: HashMap::new(),
        })
    }

    fn cleanup(&self, session: &mut NfsSession, slot: &WorkerSlot) -> Result<()> {
        session.locks.clear();
        let dir = client_dir(&session.mount, slot);
        self.deltree(session, &dir)
    }

    fn deltree(&self, _session: &mut NfsSession, path: &Path) -> Result<()> {
        remove_tree(path).with_context(|| format!("Failed to remove {}", path.display()))?;
        if path.symlink_metadata().is_ok() {
            bail!("Directory \"{}\" not empty. Aborting", path.display());
        }
        Ok(())
    }

    fn op_table(&self, opts: &Options) -> OpTable<NfsSession> {
        let table = OpTable::new()
            .with("Deltree", deltree)
            .with("ACCESS3", access)
            .with("COMMIT3", commit)
            .with("CREATE3", create)
            .with("FSINFO3", fsinfo)
            .with("FSSTAT3", fsstat)
            .with("GETATTR3", getattr)
            .with("LINK3", link)
            .with("LOOKUP3", lookup)
            .with("MKDIR3", mkdir)
            .with("PATHCONF3", pathconf)
            .with("READ3", read)
            .with("READDIRPLUS3", readdirplus)
            .with("READLINK3", readlink)
            .with("REMOVE3", remove)
            .with("RENAME3", rename)
            .with("RMDIR3", rmdir)
            .with("SETATTR3", setattr)
            .with("SYMLINK3", symlink)
            .with("WRITE3", write);
        if !opts.enable_nlm {
            return table;
        }
        table
            .with("LOCK4", lock)
            .with("UNLOCK4", unlock)
            .with("TEST4", test)
    }

    fn base_dir(&self, opts: &Options, process: usize) -> PathBuf {
        Self::mount(opts, process).unwrap_or_else(|_| opts.directory.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::MAX_PARAMS;
    use crate::error::ReplayError;
    use crate::stats::RunState;
    use tempfile::TempDir;

    struct Fixture {
        export: TempDir,
        state: RunState,
        table: OpTable<NfsSession>,
        session: NfsSession,
    }

    fn fixture(nlm: bool) -> Fixture {
        let export = TempDir::new().unwrap();
        let opts = Options {
            nfs: Some(export.path().display().to_string()),
            enable_nlm: nlm,
            ..Default::default()
        };
        let backend = Nfs::new();
        backend.init(&opts).unwrap();
        let table = backend.op_table(&opts);
        let state = RunState::new(1, 1, table.names());
        let session = backend.setup(state.slot(0), &opts).unwrap();
        Fixture {
            export,
            state,
            table,
            session,
        }
    }

    impl Fixture {
        fn path(&self, rel: &str) -> String {
            format!("{}{}", self.export.path().display(), rel)
        }

        fn run(&mut self, name: &str, f1: &str, f2: Option<&str>, params: &[i64], status: &str) -> Result<()> {
            let mut p = [0i64; MAX_PARAMS];
            p[..params.len()].copy_from_slice(params);
            let op = Op {
                slot: self.state.slot(0),
                line: 3,
                name,
                fname: Some(self.path(f1)),
                fname2: f2.map(|f| self.path(f)),
                status,
                params: p,
            };
            let (_, h) = self.table.lookup(name).unwrap();
            h(&mut self.session, &op)
        }
    }

    #[test]
    fn test_status_mapping() {
        let e = |errno| -> io::Result<()> { Err(io::Error::from_raw_os_error(errno)) };
        assert_eq!(nfs3_status::<()>(&Ok(())), NFS3_OK);
        assert_eq!(nfs3_status(&e(libc::ENOENT)), NFS3ERR_NOENT);
        assert_eq!(nfs3_status(&e(libc::EEXIST)), NFS3ERR_EXIST);
        assert_eq!(nfs3_status(&e(libc::ENOTEMPTY)), NFS3ERR_NOTEMPTY);
        assert_eq!(nfs3_status(&e(libc::ENAMETOOLONG)), NFS3ERR_NAMETOOLONG);
        assert_eq!(nfs3_status(&e(libc::ESTALE)), NFS3ERR_STALE);
        assert_eq!(nfs3_status(&e(libc::EBADF)), NFS3ERR_SERVERFAULT);
    }

    #[test]
    fn test_setup_creates_clients_dir() {
        let fx = fixture(false);
        assert!(fx.export.path().join("clients").is_dir());
        assert!(!fx.table.contains("LOCK4"));
    }

    #[test]
    fn test_file_lifecycle() {
        let mut fx = fixture(false);
        fx.run("MKDIR3", "/clients/client0", None, &[], "0x00000000").unwrap();
        fx.run("CREATE3", "/clients/client0/f", None, &[], "0x00000000").unwrap();
        fx.run("WRITE3", "/clients/client0/f", None, &[0, 8192, 2], "0x00000000").unwrap();
        fx.run("COMMIT3", "/clients/client0/f", None, &[], "0x00000000").unwrap();
        fx.run("READ3", "/clients/client0/f", None, &[0, 4096], "0x00000000").unwrap();
        fx.run("GETATTR3", "/clients/client0/f", None, &[], "0x00000000").unwrap();
        fx.run("ACCESS3", "/clients/client0/f", None, &[], "0x00000000").unwrap();
        fx.run("SETATTR3", "/clients/client0/f", None, &[], "0x00000000").unwrap();
        fx.run("PATHCONF3", "/clients/client0/f", None, &[], "*").unwrap();
        fx.run("FSSTAT3", "/", None, &[], "0x00000000").unwrap();
        fx.run("FSINFO3", "/", None, &[], "0x00000000").unwrap();
        fx.run("SYMLINK3", "/clients/client0/s", Some("/clients/client0/f"), &[], "0x00000000").unwrap();
        fx.run("READLINK3", "/clients/client0/s", None, &[], "0x00000000").unwrap();
        fx.run("LINK3", "/clients/client0/h", Some("/clients/client0/f"), &[], "0x00000000").unwrap();
        fx.run("RENAME3", "/clients/client0/h", Some("/clients/client0/h2"), &[], "0x00000000").unwrap();
        fx.run("READDIRPLUS3", "/clients/client0", None, &[], "0x00000000").unwrap();
        fx.run("LOOKUP3", "/clients/client0/h", None, &[], "0x00000002").unwrap();
        fx.run("REMOVE3", "/clients/client0/h2", None, &[], "0x00000000").unwrap();
        assert_eq!(fx.state.slot(0).bytes(), 8192 + 4096);
        assert!(!fx.state.slot(0).has_failed());

        fx.run("Deltree", "/clients/client0", None, &[], "*").unwrap();
        assert!(!fx.export.path().join("clients/client0").exists());
    }

    #[test]
    fn test_mismatch_is_fatal() {
        let mut fx = fixture(false);
        let err = fx
            .run("LOOKUP3", "/clients/missing", None, &[], "0x00000000")
            .unwrap_err();
        match err.downcast_ref::<ReplayError>() {
            Some(ReplayError::WorkerFailed { id, line, reason }) => {
                assert_eq!(*id, 0);
                assert_eq!(*line, 3);
                assert!(reason.contains("LOOKUP"));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(fx.state.slot(0).has_failed());
    }

    #[test]
    fn test_nlm_ops() {
        let mut fx = fixture(true);
        assert!(fx.table.contains("TEST4"));
        fs::write(fx.export.path().join("clients/l"), vec![0u8; 64]).unwrap();
        fx.run("LOCK4", "/clients/l", None, &[0, 16], "0x00000000").unwrap();
        fx.run("TEST4", "/clients/l", None, &[32, 16], "0x00000000").unwrap();
        fx.run("UNLOCK4", "/clients/l", None, &[0, 16], "0x00000000").unwrap();
    }

    #[test]
    fn test_nlm_range_at_end_of_file_offsets() {
        let mut fx = fixture(true);
        fs::write(fx.export.path().join("clients/l"), b"x").unwrap();
        for name in ["LOCK4", "TEST4", "UNLOCK4"] {
            fx.run(name, "/clients/l", None, &[i64::MAX, 1], "*").unwrap();
        }
        // A mismatch on the same range is reported, not a crash
        let err = fx
            .run("LOCK4", "/clients/l", None, &[i64::MAX, 1], "0x00000002")
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ReplayError>(),
            Some(ReplayError::WorkerFailed { line: 3, .. })
        ));
        assert_eq!(lock_range("/x", i64::MAX, 1), format!("/x {}-{}", i64::MAX, i64::MAX));
    }

    #[test]
    fn test_cleanup_removes_client_tree() {
        let mut fx = fixture(false);
        fs::create_dir_all(fx.export.path().join("clients/client0/deep/er")).unwrap();
        let backend = Nfs::new();
        backend.cleanup(&mut fx.session, fx.state.slot(0)).unwrap();
        assert!(!fx.export.path().join("clients/client0").exists());
        assert!(fx.export.path().join("clients").exists());
    }
}
