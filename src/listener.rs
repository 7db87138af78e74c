//! Accept path: the single producer feeding the scheduling queue.
//!
//! Probing happens inline on this thread, so admission is serialized. When the queue is full
//! `enqueue` blocks and accepting stops until a worker frees a slot; the kernel backlog is the
//! only buffer beyond the queue.

use std::io;
use std::net::{Ipv4Addr, SocketAddr, TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::time::Duration;

use socket2::{Domain, Protocol, Socket, Type};

use crate::config::LISTEN_BACKLOG;
use crate::constants::INVALID_SIZE;
use crate::error::ServerError;
use crate::metrics;
use crate::probe::{self, PeekSource};
use crate::sched_queue::{QueueClosed, QueueEntry, SchedQueue};

/// Pause after the process runs out of descriptors, so the loop does not spin.
const RESOURCE_BACKOFF: Duration = Duration::from_millis(100);

/// Probe `conn` and queue it, blocking while the queue is full. Returns the priority key.
///
/// Connections the probe cannot size are queued anyway with `INVALID_SIZE`.
pub fn admit<C: PeekSource>(
    conn: C,
    queue: &SchedQueue<C>,
    root: &Path,
) -> Result<i64, QueueClosed<C>> {
    let priority = probe::probe(&conn, root);
    if priority == INVALID_SIZE {
        metrics::inc_admitted_invalid();
        tracing::warn!("request could not be sized, queueing with invalid size");
    }
    queue.enqueue(QueueEntry::new(conn, priority))?;
    metrics::inc_admitted();
    Ok(priority)
}

pub struct Listener {
    inner: TcpListener,
    root: PathBuf,
}

impl Listener {
    /// Listen on all IPv4 interfaces.
    pub fn bind(port: u16, root: impl Into<PathBuf>) -> Result<Self, ServerError> {
        Self::bind_addr(SocketAddr::from((Ipv4Addr::UNSPECIFIED, port)), root)
    }

    pub fn bind_addr(addr: SocketAddr, root: impl Into<PathBuf>) -> Result<Self, ServerError> {
        let inner = create_listener(addr).map_err(|source| ServerError::Bind {
            port: addr.port(),
            source,
        })?;
        Ok(Self {
            inner,
            root: root.into(),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.inner.local_addr()
    }

    /// Accept, probe and enqueue until a fatal accept error or until the queue is closed.
    pub fn run(&self, queue: &SchedQueue<TcpStream>) -> Result<(), ServerError> {
        loop {
            let (stream, peer) = match self.inner.accept() {
                Ok(accepted) => accepted,
                Err(e) if is_transient(&e) => {
                    tracing::warn!(error = %e, "accept failed, continuing");
                    if is_resource_exhaustion(&e) {
                        std::thread::sleep(RESOURCE_BACKOFF);
                    }
                    continue;
                }
                Err(e) => return Err(ServerError::Accept(e)),
            };
            tracing::debug!(%peer, "accepted");

            match admit(stream, queue, &self.root) {
                Ok(priority) => tracing::debug!(%peer, priority, "queued"),
                Err(QueueClosed(_)) => {
                    tracing::info!("scheduling queue closed, listener stopping");
                    return Ok(());
                }
            }
        }
    }
}

fn create_listener(addr: SocketAddr) -> io::Result<TcpListener> {
    let socket = Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    socket.listen(LISTEN_BACKLOG)?;
    Ok(socket.into())
}

/// Errors that concern one pending connection or a momentary condition, not the listener.
fn is_transient(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::Interrupted
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::WouldBlock
    ) || is_resource_exhaustion(e)
        || e.raw_os_error() == Some(libc::EPROTO)
}

fn is_resource_exhaustion(e: &io::Error) -> bool {
    matches!(
        e.raw_os_error(),
        Some(libc::EMFILE | libc::ENFILE | libc::ENOBUFS | libc::ENOMEM)
    )
}
