//! Local filesystem backend
//!
//! Executes the CIFS-style load (`NTCreateX`, `ReadX`, `WriteX`, ...) with
//! plain POSIX calls under the working directory. Handles (`fnum`) from the
//! trace map to open files in a per-client table.
//!
//! A status mismatch on `Unlink`, `Rmdir` or `Rename`, and a short write, end
//! the client. Everything else is reported and the replay continues.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::ffi::CString;
use std::fs::{self, File, OpenOptions};
use std::io;
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::{FileExt, OpenOptionsExt};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use super::{client_dir, expect_success, io_len, range_lock, remove_tree, Backend, LockKind};
use crate::config::Options;
use crate::constants::RWBUFSIZE;
use crate::ops::{Op, OpTable};
use crate::stats::WorkerSlot;

// NTCreateX create_options / create_disposition values
const FILE_DIRECTORY_FILE: i64 = 0x0001;
const FILE_SUPERSEDE: i64 = 0;
const FILE_OPEN: i64 = 1;
const FILE_CREATE: i64 = 2;
const FILE_OPEN_IF: i64 = 3;
const FILE_OVERWRITE: i64 = 4;
const FILE_OVERWRITE_IF: i64 = 5;

struct OpenFile {
    file: File,
    name: PathBuf,
}

/// Per-client state of the filesystem backend.
pub struct FileSession {
    opts: Arc<Options>,
    handles: HashMap<i64, OpenFile>,
    buf: Vec<u8>,
    root: PathBuf,
}

impl FileSession {
    pub fn new(opts: Arc<Options>, root: PathBuf) -> Self {
        Self {
            opts,
            handles: HashMap::new(),
            buf: vec![1u8; RWBUFSIZE],
            root,
        }
    }

    pub fn open_handles(&self) -> usize {
        self.handles.len()
    }

    fn handle(&self, op: &Op<'_>, fnum: i64) -> Option<&OpenFile> {
        let h = self.handles.get(&fnum);
        if h.is_none() {
            op.warn(format_args!("{}: handle {} was not open", op.name, fnum));
        }
        h
    }

    /// Case-insensitive lookup of a missing name, the way a CIFS server
    /// resolves names on a case-sensitive filesystem.
    fn resolve(&self, name: &str) -> PathBuf {
        let path = PathBuf::from(name);
        if self.opts.no_resolve || path.symlink_metadata().is_ok() {
            return path;
        }
        let (Some(parent), Some(wanted)) = (path.parent(), path.file_name()) else {
            return path;
        };
        let wanted = wanted.to_string_lossy();
        let Ok(entries) = fs::read_dir(parent) else {
            return path;
        };
        for entry in entries.flatten() {
            if entry.file_name().to_string_lossy().eq_ignore_ascii_case(&wanted) {
                return entry.path();
            }
        }
        path
    }

    fn sync_parent(&self, op: &Op<'_>, path: &Path) {
        if !self.opts.sync_dirs {
            return;
        }
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        match File::open(dir) {
            Ok(f) => {
                if let Err(e) = f.sync_data() {
                    op.warn(format_args!("datasync directory \"{}\" failed: {}", dir.display(), e));
                }
            }
            Err(e) => op.warn(format_args!(
                "open directory \"{}\" for sync failed: {}",
                dir.display(),
                e
            )),
        }
    }
}

/// Compare an outcome against the trace; returns a description on mismatch.
fn mismatch(res: &io::Result<()>, expected: &str) -> Option<String> {
    match (expect_success(expected), res) {
        (Some(true), Err(e)) => Some(format!("{} - expected {}", e, expected)),
        (Some(false), Ok(())) => Some(format!("succeeded - expected {}", expected)),
        _ => None,
    }
}

fn nt_createx(s: &mut FileSession, op: &Op<'_>) -> Result<()> {
    let fname = s.resolve(op.fname()?);
    let create_options = op.param(0);
    let disposition = op.param(1);
    let fnum = op.param(2);

    let (create, truncate) = match disposition {
        FILE_SUPERSEDE | FILE_OVERWRITE_IF => (true, true),
        FILE_OPEN => (false, false),
        FILE_CREATE | FILE_OPEN_IF => (true, false),
        FILE_OVERWRITE => (false, true),
        other => {
            op.warn(format_args!("open {}: unknown disposition {}", fname.display(), other));
            return Ok(());
        }
    };
    let is_dir = create_options & FILE_DIRECTORY_FILE != 0;

    let result: io::Result<File> = if s.opts.stat_check && disposition == FILE_CREATE && fname.exists() {
        Err(io::Error::from(io::ErrorKind::AlreadyExists))
    } else if is_dir {
        if create {
            if let Err(e) = fs::create_dir(&fname) {
                if e.kind() != io::ErrorKind::AlreadyExists {
                    debug!("mkdir {} failed: {}", fname.display(), e);
                }
            }
        }
        File::open(&fname)
    } else {
        let mut oo = OpenOptions::new();
        oo.read(true).write(true).create(create).truncate(truncate);
        if disposition == FILE_CREATE {
            oo.create_new(true);
        }
        if s.opts.sync_open {
            oo.custom_flags(libc::O_SYNC);
        }
        oo.mode(0o600).open(&fname)
    };

    match (result, expect_success(op.status)) {
        (Err(e), Some(true)) => {
            op.warn(format_args!("open {} failed for handle {} ({})", fname.display(), fnum, e));
        }
        (Ok(_), Some(false)) => {
            op.warn(format_args!(
                "open {} succeeded for handle {} - expected {}",
                fname.display(),
                fnum,
                op.status
            ));
        }
        (Ok(file), _) => {
            if create {
                s.sync_parent(op, &fname);
            }
            s.handles.insert(fnum, OpenFile { file, name: fname });
        }
        (Err(_), _) => {}
    }
    Ok(())
}

fn close(s: &mut FileSession, op: &Op<'_>) -> Result<()> {
    let fnum = op.param(0);
    if s.handles.remove(&fnum).is_none() {
        op.warn(format_args!("nb_close: handle {} was not open", fnum));
    }
    Ok(())
}

fn rename(s: &mut FileSession, op: &Op<'_>) -> Result<()> {
    let old = s.resolve(op.fname()?);
    let new = PathBuf::from(op.fname2()?);
    let res = fs::rename(&old, &new);
    if let Some(why) = mismatch(&res, op.status) {
        return Err(op.failed(format!("rename {} {} {}", old.display(), new.display(), why)));
    }
    s.sync_parent(op, &new);
    Ok(())
}

fn unlink(s: &mut FileSession, op: &Op<'_>) -> Result<()> {
    let fname = s.resolve(op.fname()?);
    let res = fs::remove_file(&fname);
    if let Some(why) = mismatch(&res, op.status) {
        return Err(op.failed(format!("unlink {} {}", fname.display(), why)));
    }
    s.sync_parent(op, &fname);
    Ok(())
}

fn deltree(_s: &mut FileSession, op: &Op<'_>) -> Result<()> {
    let dname = PathBuf::from(op.fname()?);
    if let Err(e) = remove_tree(&dname) {
        op.warn(format_args!("deltree {} failed: {}", dname.display(), e));
    }
    Ok(())
}

fn rmdir(s: &mut FileSession, op: &Op<'_>) -> Result<()> {
    let fname = s.resolve(op.fname()?);
    let res = fs::remove_dir(&fname);
    if let Some(why) = mismatch(&res, op.status) {
        return Err(op.failed(format!("rmdir {} {}", fname.display(), why)));
    }
    s.sync_parent(op, &fname);
    Ok(())
}

fn mkdir(s: &mut FileSession, op: &Op<'_>) -> Result<()> {
    let fname = s.resolve(op.fname()?);
    if s.opts.stat_check && fname.is_dir() {
        return Ok(());
    }
    if let Err(e) = fs::create_dir(&fname) {
        debug!("mkdir {} failed ({})", fname.display(), e);
    }
    s.sync_parent(op, &fname);
    Ok(())
}

fn query_path_information(s: &mut FileSession, op: &Op<'_>) -> Result<()> {
    let fname = s.resolve(op.fname()?);
    let res = fs::metadata(&fname).map(|_| ());
    if let Some(why) = mismatch(&res, op.status) {
        op.warn(format_args!("query_path_info {} level {} {}", fname.display(), op.param(0), why));
    }
    Ok(())
}

fn query_file_information(s: &mut FileSession, op: &Op<'_>) -> Result<()> {
    let fnum = op.param(0);
    if let Some(h) = s.handle(op, fnum) {
        if let Err(e) = h.file.metadata() {
            op.warn(format_args!("query_file_info handle {} failed: {}", fnum, e));
        }
    }
    Ok(())
}

fn statvfs(path: &Path) -> io::Result<()> {
    let c = CString::new(path.as_os_str().as_bytes())
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    let mut st: libc::statvfs = unsafe { std::mem::zeroed() };
    // SAFETY: c is a valid NUL terminated path and st a valid out pointer.
    let rc = unsafe { libc::statvfs(c.as_ptr(), &mut st) };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

fn query_fs_information(s: &mut FileSession, op: &Op<'_>) -> Result<()> {
    let res = statvfs(&s.root);
    if let Some(why) = mismatch(&res, op.status) {
        op.warn(format_args!("query_fs_info level {} {}", op.param(0), why));
    }
    Ok(())
}

fn set_file_information(s: &mut FileSession, op: &Op<'_>) -> Result<()> {
    let fnum = op.param(0);
    if let Some(h) = s.handle(op, fnum) {
        // Touch the timestamps; the information level is not modelled.
        // SAFETY: fd is owned by an open File; a null times pointer means "now".
        let rc = unsafe { libc::futimens(h.file.as_raw_fd(), std::ptr::null()) };
        if rc != 0 {
            let e = io::Error::last_os_error();
            op.warn(format_args!("set_file_info handle {} failed: {}", fnum, e));
        }
    }
    Ok(())
}

fn find_first(s: &mut FileSession, op: &Op<'_>) -> Result<()> {
    let pattern = PathBuf::from(op.fname()?);
    let maxcnt = op.param(1).max(0) as usize;
    let dir = pattern.parent().map(Path::to_path_buf).unwrap_or_else(|| s.root.clone());

    let res = fs::read_dir(&dir).map(|entries| {
        let n = entries.flatten().take(maxcnt.max(1)).count();
        debug!("find_first {} listed {} entries", dir.display(), n);
    });
    if let Some(why) = mismatch(&res, op.status) {
        op.warn(format_args!("find_first {} {}", pattern.display(), why));
    }
    Ok(())
}

fn write_x(s: &mut FileSession, op: &Op<'_>) -> Result<()> {
    let fnum = op.param(0);
    let offset = op.param(1).max(0) as u64;
    let size = io_len(op.param(2), s.opts.trunc_io, RWBUFSIZE);
    let ret_size = op.param(3).max(0) as usize;

    let Some(h) = s.handle(op, fnum) else {
        return Ok(());
    };

    if s.opts.fake_io {
        op.slot.add_bytes(size as u64);
        return Ok(());
    }

    if s.opts.one_byte_write_fix && size == 1 {
        if let Ok(md) = h.file.metadata() {
            if md.len() > offset {
                let mut c = [0u8; 1];
                if h.file.read_at(&mut c, offset).is_ok() && c[0] == s.buf[0] {
                    op.slot.add_bytes(1);
                    return Ok(());
                }
            } else if s.buf[0] == 0 {
                let _ = h.file.set_len(offset + 1);
                op.slot.add_bytes(1);
                return Ok(());
            }
        }
    }

    let written = h.file.write_at(&s.buf[..size], offset);
    match written {
        Ok(n) if n >= ret_size.min(size) => {}
        Ok(n) => {
            return Err(op.failed(format!(
                "write failed on handle {} ({} of {} bytes)",
                fnum, n, ret_size
            )));
        }
        Err(e) => {
            return Err(op.failed(format!("write failed on handle {} ({})", fnum, e)));
        }
    }
    if s.opts.do_fsync {
        h.file
            .sync_all()
            .with_context(|| format!("fsync of {} failed", h.name.display()))?;
    }
    op.slot.add_bytes(size as u64);
    Ok(())
}

fn read_x(s: &mut FileSession, op: &Op<'_>) -> Result<()> {
    let fnum = op.param(0);
    let offset = op.param(1).max(0) as u64;
    let size = io_len(op.param(2), s.opts.trunc_io, RWBUFSIZE);
    let ret_size = op.param(3).max(0) as usize;

    if s.opts.fake_io {
        if s.handle(op, fnum).is_some() {
            op.slot.add_bytes(size as u64);
        }
        return Ok(());
    }

    let Some(h) = s.handles.get(&fnum) else {
        op.warn(format_args!("{}: handle {} was not open", op.name, fnum));
        return Ok(());
    };
    match h.file.read_at(&mut s.buf[..size], offset) {
        Ok(n) if n < ret_size.min(size) => {
            op.warn(format_args!(
                "read on handle {} returned {} of {} bytes",
                fnum, n, ret_size
            ));
        }
        Ok(_) => {}
        Err(e) => op.warn(format_args!("read failed on handle {} ({})", fnum, e)),
    }
    op.slot.add_bytes(size as u64);
    Ok(())
}

fn lock_x(s: &mut FileSession, op: &Op<'_>) -> Result<()> {
    let fnum = op.param(0);
    if let Some(h) = s.handle(op, fnum) {
        let res = range_lock(&h.file, op.param(1), op.param(2), LockKind::Write);
        if let Some(why) = mismatch(&res, op.status) {
            op.warn(format_args!("lockx handle {} {}", fnum, why));
        }
    }
    Ok(())
}

fn unlock_x(s: &mut FileSession, op: &Op<'_>) -> Result<()> {
    let fnum = op.param(0);
    if let Some(h) = s.handle(op, fnum) {
        let res = range_lock(&h.file, op.param(1), op.param(2), LockKind::Unlock);
        if let Some(why) = mismatch(&res, op.status) {
            op.warn(format_args!("unlockx handle {} {}", fnum, why));
        }
    }
    Ok(())
}

fn flush(s: &mut FileSession, op: &Op<'_>) -> Result<()> {
    let fnum = op.param(0);
    if let Some(h) = s.handle(op, fnum) {
        if let Err(e) = h.file.sync_all() {
            op.warn(format_args!("flush handle {} failed: {}", fnum, e));
        }
    }
    Ok(())
}

/// The CIFS-style operation table, shared with the SMB backend.
pub fn cifs_table() -> OpTable<FileSession> {
    OpTable::new()
        .with("NTCreateX", nt_createx)
        .with("Close", close)
        .with("Rename", rename)
        .with("Unlink", unlink)
        .with("Deltree", deltree)
        .with("Rmdir", rmdir)
        .with("Mkdir", mkdir)
        .with("QUERY_PATH_INFORMATION", query_path_information)
        .with("QUERY_FILE_INFORMATION", query_file_information)
        .with("QUERY_FS_INFORMATION", query_fs_information)
        .with("SET_FILE_INFORMATION", set_file_information)
        .with("FIND_FIRST", find_first)
        .with("WriteX", write_x)
        .with("ReadX", read_x)
        .with("LockX", lock_x)
        .with("UnlockX", unlock_x)
        .with("Flush", flush)
}

/// Client teardown shared with the SMB backend.
pub fn cleanup_client(session: &mut FileSession, slot: &WorkerSlot) -> Result<()> {
    session.handles.clear();
    let dir = client_dir(&session.root, slot);
    remove_tree(&dir).with_context(|| format!("Failed to remove {}", dir.display()))?;
    // Last client out removes the shared parent; the others find it non-empty.
    let _ = fs::remove_dir(session.root.join("clients"));
    Ok(())
}

pub struct FileIo;

impl FileIo {
    pub fn new() -> Self {
        FileIo
    }
}

impl Default for FileIo {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for FileIo {
    type Session = FileSession;

    fn name(&self) -> &'static str {
        "fileio"
    }

    fn init(&self, opts: &Options) -> Result<()> {
        let md = fs::metadata(&opts.directory)
            .with_context(|| format!("Cannot access directory {}", opts.directory.display()))?;
        if !md.is_dir() {
            anyhow::bail!("{} is not a directory", opts.directory.display());
        }
        info!("fileio backend using {}", opts.directory.display());
        Ok(())
    }

    fn setup(&self, _slot: &WorkerSlot, opts: &Options) -> Result<FileSession> {
        Ok(FileSession::new(Arc::new(opts.clone()), opts.directory.clone()))
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
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::MAX_PARAMS;
    use crate::error::ReplayError;
    use crate::stats::RunState;
    use tempfile::TempDir;

    struct Fixture {
        dir: TempDir,
        state: RunState,
        session: FileSession,
        table: OpTable<FileSession>,
    }

    fn fixture(tweak: impl FnOnce(&mut Options)) -> Fixture {
        let dir = TempDir::new().unwrap();
        let mut opts = Options {
            directory: dir.path().to_path_buf(),
            ..Default::default()
        };
        tweak(&mut opts);
        let table = cifs_table();
        let state = RunState::new(1, 1, table.names());
        let session = FileSession::new(Arc::new(opts), dir.path().to_path_buf());
        Fixture {
            dir,
            state,
            session,
            table,
        }
    }

    impl Fixture {
        fn path(&self, rel: &str) -> String {
            format!("{}{}", self.dir.path().display(), rel)
        }

        fn run(&mut self, name: &str, f1: Option<String>, f2: Option<String>, params: &[i64], status: &str) -> Result<()> {
            let mut p = [0i64; MAX_PARAMS];
            p[..params.len()].copy_from_slice(params);
            let op = Op {
                slot: self.state.slot(0),
                line: 1,
                name,
                fname: f1,
                fname2: f2,
                status,
                params: p,
            };
            let (_, h) = self.table.lookup(name).unwrap();
            h(&mut self.session, &op)
        }
    }

    #[test]
    fn test_create_write_read_close() {
        let mut fx = fixture(|_| {});
        let f = fx.path("/data.bin");
        fx.run("NTCreateX", Some(f.clone()), None, &[0, FILE_OVERWRITE_IF, 7], "NT_STATUS_OK").unwrap();
        assert_eq!(fx.session.open_handles(), 1);

        fx.run("WriteX", None, None, &[7, 0, 4096, 4096], "NT_STATUS_OK").unwrap();
        fx.run("ReadX", None, None, &[7, 0, 4096, 4096], "NT_STATUS_OK").unwrap();
        fx.run("Flush", None, None, &[7], "NT_STATUS_OK").unwrap();
        fx.run("Close", None, None, &[7], "NT_STATUS_OK").unwrap();

        assert_eq!(fx.session.open_handles(), 0);
        assert_eq!(fs::metadata(&f).unwrap().len(), 4096);
        assert_eq!(fx.state.slot(0).bytes(), 8192);
        assert_eq!(fx.state.slot(0).diagnostics(), 0);
    }

    #[test]
    fn test_unknown_handle_is_diagnostic() {
        let mut fx = fixture(|_| {});
        fx.run("Close", None, None, &[99], "NT_STATUS_OK").unwrap();
        fx.run("ReadX", None, None, &[99, 0, 10, 10], "NT_STATUS_OK").unwrap();
        assert_eq!(fx.state.slot(0).diagnostics(), 2);
        assert_eq!(fx.state.slot(0).bytes(), 0);
    }

    #[test]
    fn test_unlink_mismatch_is_fatal() {
        let mut fx = fixture(|_| {});
        let missing = fx.path("/nope.txt");
        let err = fx.run("Unlink", Some(missing), None, &[0], "NT_STATUS_OK").unwrap_err();
        assert!(matches!(err.downcast_ref::<ReplayError>(), Some(ReplayError::WorkerFailed { .. })));
        assert!(fx.state.slot(0).has_failed());
    }

    #[test]
    fn test_expected_failure_is_not_fatal() {
        let mut fx = fixture(|_| {});
        let missing = fx.path("/nope.txt");
        fx.run("Unlink", Some(missing), None, &[0], "NT_STATUS_OBJECT_NAME_NOT_FOUND").unwrap();
        fx.run("Rmdir", Some(fx.path("/nodir")), None, &[], "*").unwrap();
        assert!(!fx.state.slot(0).has_failed());
    }

    #[test]
    fn test_open_mismatch_only_logs() {
        let mut fx = fixture(|_| {});
        let missing = fx.path("/missing.doc");
        fx.run("NTCreateX", Some(missing), None, &[0, FILE_OPEN, 3], "NT_STATUS_OK").unwrap();
        assert_eq!(fx.state.slot(0).diagnostics(), 1);
        assert_eq!(fx.session.open_handles(), 0);
    }

    #[test]
    fn test_name_resolution() {
        let mut fx = fixture(|_| {});
        fs::write(fx.dir.path().join("Report.DOC"), b"x").unwrap();
        fx.run("QUERY_PATH_INFORMATION", Some(fx.path("/report.doc")), None, &[1004], "NT_STATUS_OK").unwrap();
        assert_eq!(fx.state.slot(0).diagnostics(), 0);

        let mut strict = fixture(|o| o.no_resolve = true);
        fs::write(strict.dir.path().join("Report.DOC"), b"x").unwrap();
        strict
            .run("QUERY_PATH_INFORMATION", Some(strict.path("/report.doc")), None, &[1004], "NT_STATUS_OK")
            .unwrap();
        assert_eq!(strict.state.slot(0).diagnostics(), 1);
    }

    #[test]
    fn test_directory_ops_and_rename() {
        let mut fx = fixture(|_| {});
        fx.run("Mkdir", Some(fx.path("/d")), None, &[], "NT_STATUS_OK").unwrap();
        fx.run("NTCreateX", Some(fx.path("/d/a")), None, &[0, FILE_CREATE, 1], "NT_STATUS_OK").unwrap();
        fx.run("Close", None, None, &[1], "NT_STATUS_OK").unwrap();
        fx.run("Rename", Some(fx.path("/d/a")), Some(fx.path("/d/b")), &[], "NT_STATUS_OK").unwrap();
        assert!(fx.dir.path().join("d/b").exists());
        fx.run("FIND_FIRST", Some(fx.path("/d/*")), None, &[260, 1366, 0], "NT_STATUS_OK").unwrap();
        fx.run("Deltree", Some(fx.path("/d")), None, &[], "*").unwrap();
        assert!(!fx.dir.path().join("d").exists());
        assert_eq!(fx.state.slot(0).diagnostics(), 0);
    }

    #[test]
    fn test_fake_io_and_trunc() {
        let mut fx = fixture(|o| {
            o.fake_io = true;
            o.trunc_io = 100;
        });
        fx.run("NTCreateX", Some(fx.path("/f")), None, &[0, FILE_OVERWRITE_IF, 2], "NT_STATUS_OK").unwrap();
        fx.run("WriteX", None, None, &[2, 0, 65536, 65536], "NT_STATUS_OK").unwrap();
        assert_eq!(fx.state.slot(0).bytes(), 100);
        assert_eq!(fs::metadata(fx.path("/f")).unwrap().len(), 0);
    }

    #[test]
    fn test_locks() {
        let mut fx = fixture(|_| {});
        fx.run("NTCreateX", Some(fx.path("/l")), None, &[0, FILE_OVERWRITE_IF, 5], "NT_STATUS_OK").unwrap();
        fx.run("LockX", None, None, &[5, 0, 10], "NT_STATUS_OK").unwrap();
        fx.run("UnlockX", None, None, &[5, 0, 10], "NT_STATUS_OK").unwrap();
        assert_eq!(fx.state.slot(0).diagnostics(), 0);
    }

    #[test]
    fn test_cleanup_removes_client_tree() {
        let mut fx = fixture(|_| {});
        let slot_dir = fx.dir.path().join("clients/client0/sub");
        fs::create_dir_all(&slot_dir).unwrap();
        cleanup_client(&mut fx.session, fx.state.slot(0)).unwrap();
        assert!(!fx.dir.path().join("clients").exists());
    }
}
