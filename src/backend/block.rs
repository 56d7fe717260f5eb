//! Raw block device backend
//!
//! `READ`/`WRITE offset length` go straight to the device with pread/pwrite
//! through an aligned buffer, opened with O_DIRECT where the target allows
//! it. `FDATASYNC` flushes the device. Any I/O error ends the client.

use anyhow::{Context, Result};
use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::fs::{FileExt, OpenOptionsExt};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::{io_len, AlignedBuf, Backend};
use crate::config::{next_arg, Options};
use crate::constants::RWBUFSIZE;
use crate::ops::{Op, OpTable};
use crate::stats::WorkerSlot;

const ALIGN: usize = 4096;

pub struct BlockSession {
    device: File,
    path: PathBuf,
    buf: AlignedBuf,
    trunc_io: u64,
}

/// Open read-write with O_DIRECT, falling back to buffered I/O when the
/// target rejects direct I/O (tmpfs, some image files).
fn open_device(path: &Path) -> io::Result<File> {
    let direct = OpenOptions::new()
        .read(true)
        .write(true)
        .custom_flags(libc::O_DIRECT)
        .open(path);
    match direct {
        Err(e) if e.raw_os_error() == Some(libc::EINVAL) => {
            debug!("{} does not support O_DIRECT, using buffered I/O", path.display());
            OpenOptions::new().read(true).write(true).open(path)
        }
        other => other,
    }
}

fn device_for(opts: &Options, index: usize) -> Result<PathBuf> {
    let list = opts.block.as_deref().context("no block device given")?;
    let dev = next_arg(list, index).context("empty block device list")?;
    Ok(PathBuf::from(dev))
}

fn read(s: &mut BlockSession, op: &Op<'_>) -> Result<()> {
    let offset = op.param(0).max(0) as u64;
    let len = io_len(op.param(1), s.trunc_io, s.buf.len());
    if let Err(e) = s.device.read_at(&mut s.buf.as_mut_slice()[..len], offset) {
        return Err(op.failed(format!("READ \"{}\" failed ({})", s.path.display(), e)));
    }
    op.slot.add_bytes(len as u64);
    Ok(())
}

fn write(s: &mut BlockSession, op: &Op<'_>) -> Result<()> {
    let offset = op.param(0).max(0) as u64;
    let len = io_len(op.param(1), s.trunc_io, s.buf.len());
    if let Err(e) = s.device.write_at(&s.buf.as_slice()[..len], offset) {
        return Err(op.failed(format!("WRITE \"{}\" failed ({})", s.path.display(), e)));
    }
    op.slot.add_bytes(len as u64);
    Ok(())
}

fn fdatasync(s: &mut BlockSession, op: &Op<'_>) -> Result<()> {
    if let Err(e) = s.device.sync_data() {
        return Err(op.failed(format!("FDATASYNC \"{}\" failed ({})", s.path.display(), e)));
    }
    Ok(())
}

pub struct Block;

impl Block {
    pub fn new() -> Self {
        Block
    }
}

impl Default for Block {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for Block {
    type Session = BlockSession;

    fn name(&self) -> &'static str {
        "block"
    }

    fn init(&self, opts: &Options) -> Result<()> {
        let dev = device_for(opts, 0)?;
        OpenOptions::new()
            .read(true)
            .write(true)
            .open(&dev)
            .with_context(|| format!("Can not access block device {}", dev.display()))?;
        info!("block backend using {}", dev.display());
        Ok(())
    }

    fn setup(&self, slot: &WorkerSlot, opts: &Options) -> Result<BlockSession> {
        let path = device_for(opts, slot.id)?;
        let device = open_device(&path)
            .with_context(|| format!("Can not access block device {}", path.display()))?;
        Ok(BlockSession {
            device,
            path,
            buf: AlignedBuf::new(RWBUFSIZE, ALIGN, 1),
            trunc_io: opts.trunc_io,
        })
    }

    fn cleanup(&self, _session: &mut BlockSession, _slot: &WorkerSlot) -> Result<()> {
        Ok(())
    }

    fn deltree(&self, _session: &mut BlockSession, _path: &Path) -> Result<()> {
        Ok(())
    }

    fn op_table(&self, _opts: &Options) -> OpTable<BlockSession> {
        OpTable::new()
            .with("READ", read)
            .with("WRITE", write)
            .with("FDATASYNC", fdatasync)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::MAX_PARAMS;
    use crate::stats::RunState;
    use tempfile::NamedTempFile;

    fn op<'a>(state: &'a RunState, name: &'a str, params: &[i64]) -> Op<'a> {
        let mut p = [0i64; MAX_PARAMS];
        p[..params.len()].copy_from_slice(params);
        Op {
            slot: state.slot(0),
            line: 1,
            name,
            fname: None,
            fname2: None,
            status: "*",
            params: p,
        }
    }

    #[test]
    fn test_write_read_sync_on_image_file() {
        let image = NamedTempFile::new().unwrap();
        image.as_file().set_len(1 << 20).unwrap();
        let opts = Options {
            block: Some(image.path().display().to_string()),
            ..Default::default()
        };
        let backend = Block::new();
        backend.init(&opts).unwrap();
        let table = backend.op_table(&Options::default());
        let state = RunState::new(1, 1, table.names());
        let mut session = backend.setup(state.slot(0), &opts).unwrap();

        let (_, w) = table.lookup("write").unwrap();
        w(&mut session, &op(&state, "WRITE", &[8192, 4096])).unwrap();
        let (_, r) = table.lookup("READ").unwrap();
        r(&mut session, &op(&state, "READ", &[8192, 4096])).unwrap();
        let (_, f) = table.lookup("FDATASYNC").unwrap();
        f(&mut session, &op(&state, "FDATASYNC", &[])).unwrap();

        assert_eq!(state.slot(0).bytes(), 8192);
        let mut check = [0u8; 4];
        image.as_file().read_at(&mut check, 8192).unwrap();
        assert_eq!(check, [1, 1, 1, 1]);
    }

    #[test]
    fn test_trunc_io_caps_length() {
        let image = NamedTempFile::new().unwrap();
        image.as_file().set_len(1 << 20).unwrap();
        let opts = Options {
            block: Some(image.path().display().to_string()),
            trunc_io: 4096,
            ..Default::default()
        };
        let backend = Block::new();
        let table = backend.op_table(&Options::default());
        let state = RunState::new(1, 1, table.names());
        let mut session = backend.setup(state.slot(0), &opts).unwrap();
        let (_, r) = table.lookup("READ").unwrap();
        r(&mut session, &op(&state, "READ", &[0, 65536])).unwrap();
        assert_eq!(state.slot(0).bytes(), 4096);
    }

    #[test]
    fn test_missing_device() {
        let opts = Options {
            block: Some("/nonexistent/dbench-device".into()),
            ..Default::default()
        };
        assert!(Block::new().init(&opts).is_err());
    }
}
