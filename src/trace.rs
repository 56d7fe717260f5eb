//! Load file reading and trace line parsing
//!
//! A load file line looks like
//!
//! ```text
//! [<target-elapsed-seconds>] <OpName> [<path-or-param> ...] <StatusToken>
//! ```
//!
//! Files ending in `.gz` are gunzipped and files ending in `.zst` are zstd
//! decoded on the fly; everything else is read as plain text.

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::constants::{COMMENT_MARKER, LEGACY_OP_PREFIX};
use crate::tokenizer::tokenize;

/// One parsed operation line.
#[derive(Debug, Clone, PartialEq)]
pub struct TraceLine {
    /// Trace-relative pacing target in seconds since phase start
    pub target_time: Option<f64>,
    pub op: String,
    /// Tokens between the operation name and the status token
    pub args: Vec<String>,
    pub status: String,
}

/// What the replay loop should do with a raw line.
#[derive(Debug, Clone, PartialEq)]
pub enum LineOutcome {
    /// Comment, blank or too short: nothing to do
    Skip,
    /// Operation name from the dbench 1 format
    Legacy(String),
    /// Status token has none of the accepted shapes
    BadStatus(String),
    Op(TraceLine),
}

/// Accepts `NT_STATUS_*`, `0x<hex>` and the `*` wildcard.
pub fn valid_status(status: &str) -> bool {
    if status == "*" || status.starts_with("NT_STATUS_") {
        return true;
    }
    match status.strip_prefix("0x") {
        Some(hex) => !hex.is_empty() && hex.chars().all(|c| c.is_ascii_hexdigit()),
        None => false,
    }
}

/// Permissive integer parsing for trace parameters: decimal or `0x` hex,
/// optional sign, trailing garbage ignored, anything unparsable is 0.
pub fn parse_param(s: &str) -> i64 {
    let s = s.trim();
    let (neg, body) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };
    let (radix, digits) = match body.strip_prefix("0x").or_else(|| body.strip_prefix("0X")) {
        Some(hex) => (16, hex),
        None => (10, body),
    };
    let end = digits
        .find(|c: char| !c.is_digit(radix))
        .unwrap_or(digits.len());
    let value = i64::from_str_radix(&digits[..end], radix)
        .or_else(|_| u64::from_str_radix(&digits[..end], radix).map(|v| v as i64))
        .unwrap_or(0);
    if neg {
        value.wrapping_neg()
    } else {
        value
    }
}

fn leading_time(token: &str) -> Option<f64> {
    if !token.starts_with(|c: char| c.is_ascii_digit()) {
        return None;
    }
    token.parse::<f64>().ok()
}

impl TraceLine {
    /// Tokenize and classify one raw line for the given client.
    pub fn parse(raw: &str, client_name: &str) -> LineOutcome {
        if raw.trim_start().starts_with(COMMENT_MARKER) {
            return LineOutcome::Skip;
        }

        let mut tokens = tokenize(raw, client_name).into_vec();
        if tokens.len() < 2 {
            return LineOutcome::Skip;
        }

        let target_time = leading_time(&tokens[0]);
        if target_time.is_some() {
            tokens.remove(0);
            if tokens.len() < 2 {
                return LineOutcome::Skip;
            }
        }

        if tokens[0].starts_with(LEGACY_OP_PREFIX) {
            return LineOutcome::Legacy(tokens.swap_remove(0));
        }

        let status = tokens.pop().unwrap_or_default();
        if !valid_status(&status) {
            return LineOutcome::BadStatus(status);
        }

        let op = tokens.remove(0);
        LineOutcome::Op(TraceLine {
            target_time,
            op,
            args: tokens,
            status,
        })
    }
}

/// Line reader over a (possibly compressed) load file that can start over.
pub struct TraceReader {
    path: PathBuf,
    reader: Box<dyn BufRead + Send>,
    /// Line number within the current pass, 1-based after a read
    line_no: u64,
    buf: Vec<u8>,
}

fn open_stream(path: &Path) -> Result<Box<dyn BufRead + Send>> {
    let file = File::open(path)
        .with_context(|| format!("dbench: error opening '{}'", path.display()))?;

    let ext = path.extension().and_then(|s| s.to_str()).unwrap_or("");
    let inner: Box<dyn Read + Send> = match ext {
        "gz" => {
            debug!("Detected gzip load file {}", path.display());
            Box::new(flate2::read::MultiGzDecoder::new(file))
        }
        "zst" => {
            debug!("Detected zstd load file {}", path.display());
            Box::new(
                zstd::stream::read::Decoder::new(file)
                    .with_context(|| format!("Failed to init zstd decoder for {}", path.display()))?,
            )
        }
        _ => Box::new(file),
    };
    Ok(Box::new(BufReader::new(inner)))
}

/// Make sure a load file exists and its first line decodes.
pub fn check_loadfile(path: &Path) -> Result<()> {
    let mut reader = open_stream(path)?;
    let mut probe = Vec::new();
    reader
        .read_until(b'\n', &mut probe)
        .with_context(|| format!("dbench: error reading '{}'", path.display()))?;
    Ok(())
}

impl TraceReader {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let reader = open_stream(&path)?;
        info!("Replaying load file {}", path.display());
        Ok(Self {
            path,
            reader,
            line_no: 0,
            buf: Vec::with_capacity(256),
        })
    }

    /// Next raw line without its terminator, or None at end of file.
    pub fn next_line(&mut self) -> Result<Option<String>> {
        self.buf.clear();
        let n = self
            .reader
            .read_until(b'\n', &mut self.buf)
            .with_context(|| format!("Failed to read {} at line {}", self.path.display(), self.line_no + 1))?;
        if n == 0 {
            return Ok(None);
        }
        self.line_no += 1;
        let line = String::from_utf8_lossy(&self.buf);
        Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
    }

    /// Start over from the first line. Compressed streams cannot seek, so
    /// the file is reopened.
    pub fn rewind(&mut self) -> Result<()> {
        self.reader = open_stream(&self.path)?;
        self.line_no = 0;
        Ok(())
    }

    pub fn line_no(&self) -> u64 {
        self.line_no
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_status_shapes() {
        for ok in ["NT_STATUS_OK", "NT_STATUS_NO_SUCH_FILE", "0x00000000", "0xC000000f", "*"] {
            assert!(valid_status(ok), "{} should be accepted", ok);
        }
        for bad in ["OK", "", "0x", "0xZZ", "**", "SUCCESS", "nt_status_ok", "0x12 "] {
            assert!(!valid_status(bad), "{} should be rejected", bad);
        }
    }

    #[test]
    fn test_parse_param() {
        assert_eq!(parse_param("65536"), 65536);
        assert_eq!(parse_param("0x10"), 16);
        assert_eq!(parse_param("-5"), -5);
        assert_eq!(parse_param("12abc"), 12);
        assert_eq!(parse_param("junk"), 0);
        assert_eq!(parse_param(""), 0);
    }

    #[test]
    fn test_parse_operation_line() {
        match TraceLine::parse("0.125 WriteX 9 0 4096 4096 NT_STATUS_OK", "client3") {
            LineOutcome::Op(t) => {
                assert_eq!(t.target_time, Some(0.125));
                assert_eq!(t.op, "WriteX");
                assert_eq!(t.args, vec!["9", "0", "4096", "4096"]);
                assert_eq!(t.status, "NT_STATUS_OK");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_parse_skips_and_rejections() {
        assert_eq!(TraceLine::parse("# a comment", "client1"), LineOutcome::Skip);
        assert_eq!(TraceLine::parse("", "client1"), LineOutcome::Skip);
        assert_eq!(TraceLine::parse("Flush", "client1"), LineOutcome::Skip);
        assert_eq!(TraceLine::parse("1.5 Flush", "client1"), LineOutcome::Skip);
        assert_eq!(
            TraceLine::parse("SMBopenX REQUEST x y", "client1"),
            LineOutcome::Legacy("SMBopenX".to_string())
        );
        assert_eq!(
            TraceLine::parse("Close 1 OOPS", "client1"),
            LineOutcome::BadStatus("OOPS".to_string())
        );
    }

    #[test]
    fn test_reader_rewind_and_gzip() {
        let dir = TempDir::new().unwrap();

        let plain = dir.path().join("load.txt");
        std::fs::write(&plain, "Flush 1 NT_STATUS_OK\nClose 1 NT_STATUS_OK\n").unwrap();

        let gz = dir.path().join("load.txt.gz");
        let mut enc = flate2::write::GzEncoder::new(
            std::fs::File::create(&gz).unwrap(),
            flate2::Compression::default(),
        );
        enc.write_all(b"Flush 1 NT_STATUS_OK\r\nClose 1 NT_STATUS_OK\r\n").unwrap();
        enc.finish().unwrap();

        for path in [&plain, &gz] {
            check_loadfile(path).unwrap();
            let mut r = TraceReader::open(path).unwrap();
            assert_eq!(r.next_line().unwrap().as_deref(), Some("Flush 1 NT_STATUS_OK"));
            assert_eq!(r.next_line().unwrap().as_deref(), Some("Close 1 NT_STATUS_OK"));
            assert_eq!(r.line_no(), 2);
            assert!(r.next_line().unwrap().is_none());
            r.rewind().unwrap();
            assert_eq!(r.line_no(), 0);
            assert_eq!(r.next_line().unwrap().as_deref(), Some("Flush 1 NT_STATUS_OK"));
        }
    }

    #[test]
    fn test_missing_loadfile() {
        let err = check_loadfile(Path::new("/nonexistent/client.txt")).unwrap_err();
        assert!(err.to_string().contains("error opening"));
    }
}
