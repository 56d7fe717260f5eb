//! Network emulation backend
//!
//! Every CIFS-style operation becomes one request/response exchange of the
//! size a real SMB server would see, against a tbench-compatible server. The
//! first two big-endian words of each request carry the request body length
//! and the reply body length; the server echoes the reply length back as the
//! first word of the reply.

use anyhow::{bail, Context, Result};
use std::io::{self, Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::os::unix::io::AsRawFd;
use std::path::Path;
use tracing::{debug, info, warn};

use super::{io_len, Backend};
use crate::config::Options;
use crate::constants::{PACKET_DOT_INTERVAL, RWBUFSIZE, TCP_PORT};
use crate::ops::{Op, OpTable};
use crate::stats::WorkerSlot;

/// Request and reply headers are both 8 bytes.
const HEADER: usize = 8;
const BUF_SIZE: usize = RWBUFSIZE + 256;

pub struct SockSession {
    stream: TcpStream,
    buf: Vec<u8>,
    trunc_io: u64,
    packets: u64,
}

/// What one exchange looked like from the client side.
#[derive(Debug, PartialEq, Eq)]
pub enum Exchange {
    InSync,
    LostSync { expected: u32, got: u32 },
}

impl SockSession {
    pub fn connect(server: &str, port: u16, tcp_options: &str, trunc_io: u64) -> Result<Self> {
        let stream = TcpStream::connect((server, port))
            .with_context(|| format!("Failed to connect to {}:{}", server, port))?;
        apply_tcp_options(&stream, tcp_options)?;
        let mut s = Self {
            stream,
            buf: vec![0u8; BUF_SIZE],
            trunc_io,
            packets: 0,
        };
        if let Exchange::LostSync { expected, got } = s.exchange(HEADER, HEADER)? {
            bail!("server handshake out of sync (expected {} got {})", expected, got);
        }
        Ok(s)
    }

    /// Send `send` bytes and read back exactly `recv` bytes.
    pub fn exchange(&mut self, send: usize, recv: usize) -> io::Result<Exchange> {
        let send = send.clamp(HEADER, BUF_SIZE);
        let recv = recv.clamp(HEADER, BUF_SIZE);
        self.buf[0..4].copy_from_slice(&((send - 4) as u32).to_be_bytes());
        self.buf[4..8].copy_from_slice(&((recv - 4) as u32).to_be_bytes());
        self.stream.write_all(&self.buf[..send])?;
        self.stream.read_exact(&mut self.buf[..recv])?;

        self.packets += 1;
        if self.packets % PACKET_DOT_INTERVAL == 1 {
            print!(".");
            let _ = io::stdout().flush();
        }

        let got = u32::from_be_bytes([self.buf[0], self.buf[1], self.buf[2], self.buf[3]]);
        let expected = (recv - 4) as u32;
        if got != expected {
            return Ok(Exchange::LostSync { expected, got });
        }
        Ok(Exchange::InSync)
    }

    pub fn packets(&self) -> u64 {
        self.packets
    }
}

fn setsockopt_int(stream: &TcpStream, level: libc::c_int, name: libc::c_int, value: libc::c_int) -> io::Result<()> {
    // SAFETY: the fd is owned by `stream`, value lives for the call.
    let rc = unsafe {
        libc::setsockopt(
            stream.as_raw_fd(),
            level,
            name,
            &value as *const libc::c_int as *const libc::c_void,
            std::mem::size_of::<libc::c_int>() as libc::socklen_t,
        )
    };
    if rc != 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(())
}

/// Apply a `--tcp-options` list such as `TCP_NODELAY,SO_SNDBUF=65536`.
pub fn apply_tcp_options(stream: &TcpStream, spec: &str) -> Result<()> {
    for opt in spec.split(|c: char| c == ',' || c.is_whitespace()).filter(|s| !s.is_empty()) {
        let (name, value) = match opt.split_once('=') {
            Some((n, v)) => (n, Some(v)),
            None => (opt, None),
        };
        let int_value = || -> Result<libc::c_int> {
            value
                .with_context(|| format!("socket option {} needs a value", name))?
                .parse()
                .with_context(|| format!("bad value for socket option {}", name))
        };
        match name.to_ascii_uppercase().as_str() {
            "TCP_NODELAY" => stream.set_nodelay(true).context("TCP_NODELAY")?,
            "SO_KEEPALIVE" => setsockopt_int(stream, libc::SOL_SOCKET, libc::SO_KEEPALIVE, 1).context("SO_KEEPALIVE")?,
            "SO_SNDBUF" => setsockopt_int(stream, libc::SOL_SOCKET, libc::SO_SNDBUF, int_value()?).context("SO_SNDBUF")?,
            "SO_RCVBUF" => setsockopt_int(stream, libc::SOL_SOCKET, libc::SO_RCVBUF, int_value()?).context("SO_RCVBUF")?,
            other => warn!("Unknown socket option {}", other),
        }
    }
    Ok(())
}

/// Server side of the exchange: answer requests until the peer hangs up.
/// Returns the number of requests served.
pub fn serve_connection(mut stream: TcpStream) -> io::Result<u64> {
    let mut buf = vec![0u8; BUF_SIZE];
    let mut served = 0u64;
    loop {
        let mut head = [0u8; 4];
        match stream.read_exact(&mut head) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(served),
            Err(e) => return Err(e),
        }
        let body = u32::from_be_bytes(head) as usize;
        if !(4..=BUF_SIZE - 4).contains(&body) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("bad request length {}", body),
            ));
        }
        stream.read_exact(&mut buf[..body])?;
        let reply = u32::from_be_bytes([buf[0], buf[1], buf[2], buf[3]]) as usize;
        if reply + 4 > BUF_SIZE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("bad reply length {}", reply),
            ));
        }
        buf[0..4].copy_from_slice(&(reply as u32).to_be_bytes());
        stream.write_all(&buf[..reply + 4])?;
        served += 1;
    }
}

fn packets(s: &mut SockSession, op: &Op<'_>, send: usize, recv: usize) -> Result<()> {
    match s.exchange(send, recv) {
        Ok(Exchange::InSync) => Ok(()),
        Ok(Exchange::LostSync { expected, got }) => {
            op.warn(format_args!("lost sync ({} {})", expected, got));
            Ok(())
        }
        Err(e) => Err(op.failed(format!("error exchanging {}/{} bytes: {}", send, recv, e))),
    }
}

fn name_len(op: &Op<'_>) -> usize {
    op.fname.as_deref().map_or(0, str::len)
}

fn nt_createx(s: &mut SockSession, op: &Op<'_>) -> Result<()> {
    packets(s, op, 111, 69)
}

fn close(s: &mut SockSession, op: &Op<'_>) -> Result<()> {
    packets(s, op, 45, 39)
}

fn rename(s: &mut SockSession, op: &Op<'_>) -> Result<()> {
    let len2 = op.fname2.as_deref().map_or(0, str::len);
    packets(s, op, 41 + name_len(op) + len2, 39)
}

fn unlink(s: &mut SockSession, op: &Op<'_>) -> Result<()> {
    packets(s, op, 83, 39)
}

fn by_name(s: &mut SockSession, op: &Op<'_>) -> Result<()> {
    packets(s, op, 39 + name_len(op), 39)
}

fn query_path_information(s: &mut SockSession, op: &Op<'_>) -> Result<()> {
    packets(s, op, 39 + name_len(op), 59)
}

fn query_file_information(s: &mut SockSession, op: &Op<'_>) -> Result<()> {
    packets(s, op, 41, 71)
}

fn query_fs_information(s: &mut SockSession, op: &Op<'_>) -> Result<()> {
    packets(s, op, 39, 59)
}

fn set_file_information(s: &mut SockSession, op: &Op<'_>) -> Result<()> {
    packets(s, op, 41, 39)
}

fn find_first(s: &mut SockSession, op: &Op<'_>) -> Result<()> {
    // one directory entry record per returned name
    let count = op.param(2).clamp(0, 1000) as usize;
    packets(s, op, 39 + name_len(op), 39 + count * 70)
}

fn write_x(s: &mut SockSession, op: &Op<'_>) -> Result<()> {
    let size = io_len(op.param(2), s.trunc_io, RWBUFSIZE);
    packets(s, op, 51 + size, 41)?;
    op.slot.add_bytes(size as u64);
    Ok(())
}

fn read_x(s: &mut SockSession, op: &Op<'_>) -> Result<()> {
    let size = io_len(op.param(2), s.trunc_io, RWBUFSIZE);
    packets(s, op, 55, size + 4)?;
    op.slot.add_bytes(size as u64);
    Ok(())
}

fn lock(s: &mut SockSession, op: &Op<'_>) -> Result<()> {
    packets(s, op, 41, 39)
}

fn flush(s: &mut SockSession, op: &Op<'_>) -> Result<()> {
    packets(s, op, 39, 39)
}

pub struct SockIo;

impl SockIo {
    pub fn new() -> Self {
        SockIo
    }
}

impl Default for SockIo {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for SockIo {
    type Session = SockSession;

    fn name(&self) -> &'static str {
        "sockio"
    }

    fn init(&self, opts: &Options) -> Result<()> {
        let addrs: Vec<_> = (opts.server.as_str(), TCP_PORT)
            .to_socket_addrs()
            .with_context(|| format!("Cannot resolve server {}", opts.server))?
            .collect();
        info!("sockio backend talking to {} ({} addresses)", opts.server, addrs.len());
        Ok(())
    }

    fn setup(&self, slot: &WorkerSlot, opts: &Options) -> Result<SockSession> {
        let session = SockSession::connect(&opts.server, TCP_PORT, &opts.tcp_options, opts.trunc_io)
            .with_context(|| format!("client {} failed to start", slot.id))?;
        debug!("client {} connected to {}", slot.id, opts.server);
        Ok(session)
    }

    fn cleanup(&self, session: &mut SockSession, slot: &WorkerSlot) -> Result<()> {
        debug!("client {} exchanged {} packets", slot.id, session.packets());
        Ok(())
    }

    fn deltree(&self, _session: &mut SockSession, _path: &Path) -> Result<()> {
        Ok(())
    }

    fn op_table(&self, _opts: &Options) -> OpTable<SockSession> {
        OpTable::new()
            .with("NTCreateX", nt_createx)
            .with("Close", close)
            .with("Rename", rename)
            .with("Unlink", unlink)
            .with("Deltree", by_name)
            .with("Rmdir", by_name)
            .with("Mkdir", by_name)
            .with("QUERY_PATH_INFORMATION", query_path_information)
            .with("QUERY_FILE_INFORMATION", query_file_information)
            .with("QUERY_FS_INFORMATION", query_fs_information)
            .with("SET_FILE_INFORMATION", set_file_information)
            .with("FIND_FIRST", find_first)
            .with("WriteX", write_x)
            .with("ReadX", read_x)
            .with("LockX", lock)
            .with("UnlockX", lock)
            .with("Flush", flush)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    fn server() -> (u16, thread::JoinHandle<u64>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let h = thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            serve_connection(stream).unwrap()
        });
        (port, h)
    }

    #[test]
    fn test_exchange_round_trip() {
        let (port, h) = server();
        let mut s = SockSession::connect("127.0.0.1", port, "TCP_NODELAY", 0).unwrap();
        assert_eq!(s.exchange(111, 69).unwrap(), Exchange::InSync);
        assert_eq!(s.exchange(55, 65536 + 4).unwrap(), Exchange::InSync);
        assert_eq!(s.packets(), 3);
        drop(s);
        assert_eq!(h.join().unwrap(), 3);
    }

    #[test]
    fn test_tcp_options() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let stream = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
        apply_tcp_options(&stream, "TCP_NODELAY SO_KEEPALIVE,SO_SNDBUF=65536").unwrap();
        assert!(stream.nodelay().unwrap());
        assert!(apply_tcp_options(&stream, "SO_RCVBUF").is_err());
        assert!(apply_tcp_options(&stream, "SO_RCVBUF=lots").is_err());
        // unknown names only warn
        apply_tcp_options(&stream, "IPTOS_LOWDELAY").unwrap();
    }

    #[test]
    fn test_table_matches_fileio() {
        let names: Vec<String> = SockIo::new().op_table(&Options::default()).names();
        let fileio: Vec<String> = super::super::fileio::cifs_table().names();
        assert_eq!(names, fileio);
    }
}
