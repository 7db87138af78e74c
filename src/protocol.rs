use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::constants::{DYNAMIC_MARKER, INDEX_FILE, MAX_PEEK, SERVER_NAME};

/// Result of attempting to parse an HTTP request line from a byte buffer.
#[derive(Debug, PartialEq, Eq)]
pub enum ParseResult<'a> {
    /// A full line was found. `bytes_consumed` includes the line terminator.
    Complete {
        line: RequestLine<'a>,
        bytes_consumed: usize,
    },
    /// No line terminator yet.
    Incomplete,
    /// Malformed line (wrong token count, not UTF-8, longer than `MAX_PEEK`).
    Error(&'static str),
}

/// The three tokens of a request line, borrowed from the input buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestLine<'a> {
    pub method: &'a str,
    pub target: &'a str,
    pub version: &'a str,
}

/// Try to parse the request line at the start of `buf`. Only the first line is examined;
/// headers and body are left for the handler.
pub fn try_parse_request_line(buf: &[u8]) -> ParseResult<'_> {
    let Some(end) = buf.iter().position(|&b| b == b'\n') else {
        if buf.len() >= MAX_PEEK {
            return ParseResult::Error("request line too long");
        }
        return ParseResult::Incomplete;
    };
    if end >= MAX_PEEK {
        return ParseResult::Error("request line too long");
    }

    let Ok(text) = std::str::from_utf8(&buf[..end]) else {
        return ParseResult::Error("request line is not utf-8");
    };

    let mut tokens = text.split_ascii_whitespace();
    let (Some(method), Some(target), Some(version), None) =
        (tokens.next(), tokens.next(), tokens.next(), tokens.next())
    else {
        return ParseResult::Error("request line must have three tokens");
    };

    ParseResult::Complete {
        line: RequestLine {
            method,
            target,
            version,
        },
        bytes_consumed: end + 1,
    }
}

/// What a sanitized target resolves to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resource {
    /// A file whose bytes are the response body.
    Static { path: PathBuf },
    /// A program whose output is the response body. `query` is everything after `?`.
    Dynamic { path: PathBuf, query: String },
}

impl Resource {
    pub fn path(&self) -> &Path {
        match self {
            Resource::Static { path } | Resource::Dynamic { path, .. } => path,
        }
    }

    pub fn is_dynamic(&self) -> bool {
        matches!(self, Resource::Dynamic { .. })
    }
}

/// Target rejected before it ever touches the filesystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TargetError {
    #[error("target contains a parent-directory segment")]
    Traversal,
    #[error("target is not rooted at '/'")]
    NotRooted,
}

/// Validate `target` and map it onto a path under `root`.
///
/// Dynamic targets lose their query string; static targets ending in `/` get
/// `index.html` appended. Any `..` anywhere in the target is rejected.
pub fn resolve_target(root: &Path, target: &str) -> Result<Resource, TargetError> {
    if target.contains("..") {
        return Err(TargetError::Traversal);
    }
    let Some(relative) = target.strip_prefix('/') else {
        return Err(TargetError::NotRooted);
    };

    if target.contains(DYNAMIC_MARKER) {
        let (relative, query) = relative.split_once('?').unwrap_or((relative, ""));
        return Ok(Resource::Dynamic {
            path: root.join(relative),
            query: query.to_string(),
        });
    }

    let mut path = root.join(relative);
    if target.ends_with('/') {
        path.push(INDEX_FILE);
    }
    Ok(Resource::Static { path })
}

/// Guess a Content-Type from the file extension.
pub fn content_type(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()) {
        Some("html") | Some("htm") => "text/html",
        Some("gif") => "image/gif",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("txt") => "text/plain",
        Some("css") => "text/css",
        Some("js") => "application/javascript",
        _ => "application/octet-stream",
    }
}

/// Serialize a status line plus the headers every response carries.
/// Format: `HTTP/1.1 <code> <reason>\r\nServer: wserver\r\n`
pub fn write_status<W: Write>(out: &mut W, code: u16, reason: &str) -> io::Result<()> {
    write!(out, "HTTP/1.1 {code} {reason}\r\nServer: {SERVER_NAME}\r\n")
}

/// Serialize a complete static-file response header block (terminated by the blank line).
pub fn write_file_header<W: Write>(out: &mut W, path: &Path, len: u64) -> io::Result<()> {
    write_status(out, 200, "OK")?;
    write!(
        out,
        "Content-Length: {len}\r\nContent-Type: {}\r\n\r\n",
        content_type(path)
    )
}

/// Serialize a complete error response with a short HTML body.
pub fn write_error<W: Write>(out: &mut W, code: u16, reason: &str, detail: &str) -> io::Result<()> {
    let body = format!(
        "<!doctype html>\r\n<head><title>{SERVER_NAME} error</title></head>\r\n\
         <body><h2>{code}: {reason}</h2><p>{detail}</p></body>\r\n"
    );
    write_status(out, code, reason)?;
    write!(
        out,
        "Content-Type: text/html\r\nContent-Length: {}\r\n\r\n{body}",
        body.len()
    )
}
