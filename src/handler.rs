//! Request handlers: what a worker runs once it owns a connection.
//!
//! The scheduling core only sees the `RequestHandler` trait. `HttpHandler` is the default
//! used by the binary: static files plus programs whose target contains `cgi`.

use std::fs::{self, File};
use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::TcpStream;
use std::os::fd::OwnedFd;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use crate::constants::MAX_REQUEST_HEAD;
use crate::error::HandlerError;
use crate::protocol::{self, ParseResult, Resource};

/// Services one connection to completion. Runs on a worker thread with no queue lock held.
pub trait RequestHandler<C>: Send + Sync {
    fn handle(&self, conn: &mut C) -> Result<(), HandlerError>;
}

impl<C, F> RequestHandler<C> for F
where
    F: Fn(&mut C) -> Result<(), HandlerError> + Send + Sync,
{
    fn handle(&self, conn: &mut C) -> Result<(), HandlerError> {
        self(conn)
    }
}

pub struct HttpHandler {
    root: PathBuf,
}

impl HttpHandler {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl RequestHandler<TcpStream> for HttpHandler {
    fn handle(&self, conn: &mut TcpStream) -> Result<(), HandlerError> {
        let mut line = String::new();
        {
            let mut reader = BufReader::new((&*conn).take(MAX_REQUEST_HEAD));
            if reader.read_line(&mut line)? == 0 {
                return Err(HandlerError::EmptyRequest);
            }
            skip_headers(&mut reader)?;
        }

        let (method, target) = match protocol::try_parse_request_line(line.as_bytes()) {
            ParseResult::Complete { line: req, .. } => (req.method, req.target),
            ParseResult::Incomplete => {
                let reason = "truncated request line";
                protocol::write_error(conn, 400, "Bad Request", reason)?;
                return Err(HandlerError::BadRequest(reason));
            }
            ParseResult::Error(reason) => {
                protocol::write_error(conn, 400, "Bad Request", reason)?;
                return Err(HandlerError::BadRequest(reason));
            }
        };
        tracing::debug!(method, target, "handling");

        if !method.eq_ignore_ascii_case("GET") {
            let detail = "server does not implement this method";
            protocol::write_error(conn, 501, "Not Implemented", detail)?;
            return Ok(());
        }

        let resource = match protocol::resolve_target(&self.root, target) {
            Ok(resource) => resource,
            Err(e) => {
                protocol::write_error(conn, 400, "Bad Request", &e.to_string())?;
                return Ok(());
            }
        };

        let meta = match fs::metadata(resource.path()) {
            Ok(meta) => meta,
            Err(_) => {
                protocol::write_error(conn, 404, "Not Found", "server could not find this file")?;
                return Ok(());
            }
        };
        if !meta.is_file() {
            protocol::write_error(conn, 403, "Forbidden", "server could not read this file")?;
            return Ok(());
        }

        match &resource {
            Resource::Static { path } => serve_static(conn, path),
            Resource::Dynamic { path, query } => {
                if meta.permissions().mode() & 0o111 == 0 {
                    let detail = "server could not run this program";
                    protocol::write_error(conn, 403, "Forbidden", detail)?;
                    return Ok(());
                }
                serve_dynamic(conn, &self.root, path, query, method)
            }
        }
    }
}

/// Consume header lines up to and including the blank line (or EOF).
fn skip_headers<R: BufRead>(reader: &mut R) -> io::Result<()> {
    let mut header = String::new();
    loop {
        header.clear();
        if reader.read_line(&mut header)? == 0 || header == "\r\n" || header == "\n" {
            return Ok(());
        }
    }
}

fn serve_static(conn: &mut TcpStream, path: &Path) -> Result<(), HandlerError> {
    let mut file = match File::open(path) {
        Ok(file) => file,
        Err(_) => {
            protocol::write_error(conn, 403, "Forbidden", "server could not read this file")?;
            return Ok(());
        }
    };
    let len = file.metadata()?.len();

    let mut head = Vec::with_capacity(128);
    protocol::write_file_header(&mut head, path, len)?;
    conn.write_all(&head)?;
    io::copy(&mut file, conn)?;
    conn.flush()?;
    Ok(())
}

fn serve_dynamic(
    conn: &mut TcpStream,
    root: &Path,
    path: &Path,
    query: &str,
    method: &str,
) -> Result<(), HandlerError> {
    // The program writes its own remaining headers and body straight to the socket.
    protocol::write_status(conn, 200, "OK")?;
    conn.flush()?;

    let stdout = OwnedFd::from(conn.try_clone()?);
    let status = Command::new(path)
        .current_dir(root)
        .env("QUERY_STRING", query)
        .env("REQUEST_METHOD", method)
        .stdin(Stdio::null())
        .stdout(Stdio::from(stdout))
        .status()?;

    if !status.success() {
        return Err(HandlerError::Program {
            path: path.to_path_buf(),
            status,
        });
    }
    Ok(())
}
