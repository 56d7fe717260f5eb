//! SCSI command backend (Linux SG_IO)
//!
//! Issues `READ10`, `READCAPACITY10` and `TESTUNITREADY` straight to an sg
//! device node. The outcome compared with the trace is the sense key of the
//! command (0 when there was no check condition); any mismatch, and any
//! transport level failure, ends the client.

use anyhow::{bail, Context, Result};
use std::fs::{File, OpenOptions};
use std::io;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::{check_status, Backend};
use crate::config::Options;
use crate::constants::{RWBUFSIZE, SCSI_BLOCK_SIZE, SCSI_TIMEOUT_MS};
use crate::ops::{Op, OpTable};
use crate::stats::WorkerSlot;

const SG_IO: libc::c_ulong = 0x2285;
const SG_GET_VERSION_NUM: libc::c_ulong = 0x2282;
const SG_DXFER_FROM_DEV: libc::c_int = -3;
const SG_INFO_OK_MASK: libc::c_uint = 0x1;
const SG_INFO_OK: libc::c_uint = 0x0;
const SG_MIN_VERSION: libc::c_int = 30000;
const SENSE_LEN: usize = 32;

/// `struct sg_io_hdr` from <scsi/sg.h>
#[repr(C)]
struct SgIoHdr {
    interface_id: libc::c_int,
    dxfer_direction: libc::c_int,
    cmd_len: libc::c_uchar,
    mx_sb_len: libc::c_uchar,
    iovec_count: libc::c_ushort,
    dxfer_len: libc::c_uint,
    dxferp: *mut libc::c_void,
    cmdp: *const libc::c_uchar,
    sbp: *mut libc::c_uchar,
    timeout: libc::c_uint,
    flags: libc::c_uint,
    pack_id: libc::c_int,
    usr_ptr: *mut libc::c_void,
    status: libc::c_uchar,
    masked_status: libc::c_uchar,
    msg_status: libc::c_uchar,
    sb_len_wr: libc::c_uchar,
    host_status: libc::c_ushort,
    driver_status: libc::c_ushort,
    resid: libc::c_int,
    duration: libc::c_uint,
    info: libc::c_uint,
}

/// Transport level failure of an SG_IO call.
#[derive(Debug, thiserror::Error)]
pub enum ScsiIoError {
    #[error("SG_IO ioctl failed: {0}")]
    Ioctl(#[source] io::Error),
    #[error("SCSI status=0x{status:x} masked_status=0x{masked:x}")]
    Status { status: u8, masked: u8 },
    #[error("SCSI host_status=0x{0:x}")]
    Host(u16),
    #[error("driver_status=0x{0:x}")]
    Driver(u16),
}

pub fn read10_cdb(lba: u32, xferlen: u16, rd: u8, grp: u8) -> [u8; 10] {
    let lba = lba.to_be_bytes();
    let len = xferlen.to_be_bytes();
    [0x28, rd, lba[0], lba[1], lba[2], lba[3], grp & 0x1f, len[0], len[1], 0]
}

pub fn readcapacity10_cdb(lba: u32, pmi: bool) -> [u8; 10] {
    let lba = lba.to_be_bytes();
    [0x25, 0, lba[0], lba[1], lba[2], lba[3], 0, 0, u8::from(pmi), 0]
}

pub const TESTUNITREADY_CDB: [u8; 6] = [0; 6];

/// Sense key of fixed format sense data.
pub fn sense_key(sense: &[u8]) -> u8 {
    sense.get(2).map_or(0, |b| b & 0x0f)
}

pub struct ScsiSession {
    device: File,
    path: PathBuf,
    data: Vec<u8>,
}

fn open_sg(path: &Path) -> Result<File> {
    let device = OpenOptions::new()
        .read(true)
        .write(true)
        .open(path)
        .with_context(|| format!("Failed to open scsi device node : {}", path.display()))?;
    let mut version: libc::c_int = 0;
    // SAFETY: SG_GET_VERSION_NUM writes one int through the pointer.
    let rc = unsafe { libc::ioctl(device.as_raw_fd(), SG_GET_VERSION_NUM as _, &mut version as *mut libc::c_int) };
    if rc < 0 || version < SG_MIN_VERSION {
        bail!("{} is not a SCSI device node", path.display());
    }
    Ok(device)
}

impl ScsiSession {
    /// Run one device-to-host command; returns the sense key.
    fn io(&mut self, cdb: &[u8], data_len: usize) -> Result<u8, ScsiIoError> {
        let mut sense = [0u8; SENSE_LEN];
        let data_len = data_len.min(self.data.len());
        let mut hdr = SgIoHdr {
            interface_id: b'S' as libc::c_int,
            dxfer_direction: SG_DXFER_FROM_DEV,
            cmd_len: cdb.len() as libc::c_uchar,
            mx_sb_len: SENSE_LEN as libc::c_uchar,
            iovec_count: 0,
            dxfer_len: data_len as libc::c_uint,
            dxferp: self.data.as_mut_ptr() as *mut libc::c_void,
            cmdp: cdb.as_ptr(),
            sbp: sense.as_mut_ptr(),
            timeout: SCSI_TIMEOUT_MS,
            flags: 0,
            pack_id: 0,
            usr_ptr: std::ptr::null_mut(),
            status: 0,
            masked_status: 0,
            msg_status: 0,
            sb_len_wr: 0,
            host_status: 0,
            driver_status: 0,
            resid: 0,
            duration: 0,
            info: 0,
        };
        // SAFETY: every pointer in hdr refers to a buffer that outlives the call
        // and the lengths match those buffers.
        let rc = unsafe { libc::ioctl(self.device.as_raw_fd(), SG_IO as _, &mut hdr as *mut SgIoHdr) };
        if rc < 0 {
            return Err(ScsiIoError::Ioctl(io::Error::last_os_error()));
        }
        if hdr.info & SG_INFO_OK_MASK != SG_INFO_OK && hdr.sb_len_wr > 0 {
            return Ok(sense_key(&sense[..(hdr.sb_len_wr as usize).min(SENSE_LEN)]));
        }
        if hdr.masked_status != 0 {
            return Err(ScsiIoError::Status {
                status: hdr.status,
                masked: hdr.masked_status,
            });
        }
        if hdr.host_status != 0 {
            return Err(ScsiIoError::Host(hdr.host_status));
        }
        if hdr.driver_status != 0 {
            return Err(ScsiIoError::Driver(hdr.driver_status));
        }
        Ok(0)
    }

    fn command(&mut self, op: &Op<'_>, what: &str, cdb: &[u8], data_len: usize) -> Result<()> {
        let sc = self
            .io(cdb, data_len)
            .map_err(|e| op.failed(format!("SCSI_IO failed ({})", e)))?;
        if !check_status(u32::from(sc), op.status) {
            return Err(op.failed(format!(
                "{} \"{}\" failed (0x{:02x}) - expected {}",
                what,
                self.path.display(),
                sc,
                op.status
            )));
        }
        Ok(())
    }
}

/// CDB field `i` of the trace line; a value the field cannot hold ends the
/// client like any other mismatch.
fn cdb_field<T: TryFrom<i64>>(op: &Op<'_>, i: usize, what: &str) -> Result<T> {
    let v = op.param(i);
    T::try_from(v).map_err(|_| {
        op.failed(format!(
            "{} {} {} does not fit the CDB - expected {}",
            op.name, what, v, op.status
        ))
    })
}

fn read10(s: &mut ScsiSession, op: &Op<'_>) -> Result<()> {
    let lba: u32 = cdb_field(op, 0, "lba")?;
    let xferlen: u16 = cdb_field(op, 1, "block count")?;
    let cdb = read10_cdb(lba, xferlen, op.param(2) as u8, op.param(3) as u8);
    let len = (u64::from(xferlen) * SCSI_BLOCK_SIZE).min(s.data.len() as u64) as usize;
    s.command(op, "READ10", &cdb, len)?;
    op.slot.add_bytes(len as u64);
    Ok(())
}

fn readcapacity10(s: &mut ScsiSession, op: &Op<'_>) -> Result<()> {
    let lba: u32 = cdb_field(op, 0, "lba")?;
    let cdb = readcapacity10_cdb(lba, op.param(1) != 0);
    s.command(op, "READCAPACITY10", &cdb, 8)
}

fn testunitready(s: &mut ScsiSession, op: &Op<'_>) -> Result<()> {
    s.command(op, "TESTUNITREADY", &TESTUNITREADY_CDB, 200)
}

pub struct Scsi;

impl Scsi {
    pub fn new() -> Self {
        Scsi
    }

    fn device(opts: &Options) -> Result<PathBuf> {
        opts.scsi
            .as_deref()
            .map(PathBuf::from)
            .context("--scsi device node was not specified")
    }
}

impl Default for Scsi {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for Scsi {
    type Session = ScsiSession;

    fn name(&self) -> &'static str {
        "scsi"
    }

    fn init(&self, opts: &Options) -> Result<()> {
        let path = Self::device(opts)?;
        open_sg(&path)?;
        info!("scsi backend using {}", path.display());
        Ok(())
    }

    fn setup(&self, slot: &WorkerSlot, opts: &Options) -> Result<ScsiSession> {
        let path = Self::device(opts)?;
        let device = open_sg(&path)?;
        debug!("client {} opened {}", slot.id, path.display());
        Ok(ScsiSession {
            device,
            path,
            data: vec![0u8; RWBUFSIZE],
        })
    }

    fn cleanup(&self, _session: &mut ScsiSession, _slot: &WorkerSlot) -> Result<()> {
        Ok(())
    }

    fn deltree(&self, _session: &mut ScsiSession, _path: &Path) -> Result<()> {
        Ok(())
    }

    fn op_table(&self, _opts: &Options) -> OpTable<ScsiSession> {
        OpTable::new()
            .with("READ10", read10)
            .with("READCAPACITY10", readcapacity10)
            .with("TESTUNITREADY", testunitready)
    }
}
