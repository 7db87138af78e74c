//! Admission probe: size the response a connection is about to ask for, before any worker
//! touches it.
//!
//! The probe only peeks. Whatever it sees is still unread when the handler later reads the
//! request, so both observe the same byte stream.

use std::fs;
use std::io;
use std::net::TcpStream;
use std::path::Path;

use crate::constants::{INVALID_SIZE, MAX_PEEK};
use crate::error::ProbeError;
use crate::protocol::{self, ParseResult};

/// Read pending bytes without advancing the read cursor.
pub trait PeekSource {
    fn peek_bytes(&self, buf: &mut [u8]) -> io::Result<usize>;
}

impl PeekSource for TcpStream {
    fn peek_bytes(&self, buf: &mut [u8]) -> io::Result<usize> {
        TcpStream::peek(self, buf)
    }
}

/// Priority key for `conn`: the byte size of the file its request targets, or
/// `INVALID_SIZE` if that cannot be determined. Never fails.
pub fn probe<P: PeekSource + ?Sized>(conn: &P, root: &Path) -> i64 {
    match request_size(conn, root) {
        Ok(size) => size,
        Err(reason) => {
            tracing::debug!(%reason, "probe fell back to invalid size");
            INVALID_SIZE
        }
    }
}

/// Like `probe`, but reports why sizing failed.
pub fn request_size<P: PeekSource + ?Sized>(conn: &P, root: &Path) -> Result<i64, ProbeError> {
    let mut buf = vec![0u8; MAX_PEEK];
    let n = conn.peek_bytes(&mut buf).map_err(ProbeError::Peek)?;
    if n == 0 {
        return Err(ProbeError::Empty);
    }
    size_from_bytes(&buf[..n], root)
}

/// Size a request from already-peeked bytes.
pub fn size_from_bytes(bytes: &[u8], root: &Path) -> Result<i64, ProbeError> {
    let line = match protocol::try_parse_request_line(bytes) {
        ParseResult::Complete { line, .. } => line,
        ParseResult::Incomplete => return Err(ProbeError::Incomplete),
        ParseResult::Error(e) => return Err(ProbeError::Malformed(e)),
    };

    let resource = protocol::resolve_target(root, line.target)?;
    let meta = fs::metadata(resource.path()).map_err(|source| ProbeError::Stat {
        path: resource.path().to_path_buf(),
        source,
    })?;

    Ok(i64::try_from(meta.len()).unwrap_or(i64::MAX))
}
