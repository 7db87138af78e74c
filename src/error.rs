//! Error types shared across the server.
//!
//! Admission failures never surface as errors to callers (they degrade to the invalid-size
//! key), so `ProbeError` exists only to give the log line a reason.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::protocol::TargetError;

/// Fatal conditions that stop the server before or while accepting.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("cannot use root directory {path:?}: {source}")]
    RootDir { path: PathBuf, source: io::Error },

    #[error("failed to bind port {port}: {source}")]
    Bind { port: u16, source: io::Error },

    #[error("accept failed: {0}")]
    Accept(#[source] io::Error),

    #[error("failed to spawn {name}: {source}")]
    Spawn { name: String, source: io::Error },
}

/// Why the probe fell back to the invalid-size key.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("peek failed: {0}")]
    Peek(#[source] io::Error),

    #[error("connection closed before a request arrived")]
    Empty,

    #[error("request line incomplete")]
    Incomplete,

    #[error("malformed request line: {0}")]
    Malformed(&'static str),

    #[error(transparent)]
    Target(#[from] TargetError),

    #[error("stat {path:?}: {source}")]
    Stat { path: PathBuf, source: io::Error },
}

/// Failure while servicing an admitted connection. Isolated to that connection.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("connection i/o: {0}")]
    Io(#[from] io::Error),

    #[error("client sent no request")]
    EmptyRequest,

    #[error("bad request line: {0}")]
    BadRequest(&'static str),

    #[error("dynamic handler {path:?} exited with {status}")]
    Program {
        path: PathBuf,
        status: std::process::ExitStatus,
    },
}
