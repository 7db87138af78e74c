#![allow(dead_code)]

use std::fs;
use std::io::{Read, Write};
use std::net::{Ipv4Addr, SocketAddr, TcpListener, TcpStream};
use std::path::Path;
use std::sync::Arc;
use std::thread;

use tempfile::TempDir;

use wserver::config::Discipline;
use wserver::handler::HttpHandler;
use wserver::listener::Listener;
use wserver::sched_queue::SchedQueue;
use wserver::worker::WorkerPool;

/// Document root populated with `(relative path, size)` files of filler bytes.
pub fn doc_root(files: &[(&str, usize)]) -> TempDir {
    let dir = tempfile::tempdir().expect("tempdir");
    populate(dir.path(), files);
    dir
}

pub fn populate(root: &Path, files: &[(&str, usize)]) {
    for (name, size) in files {
        let path = root.join(name);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent");
        }
        let body: Vec<u8> = (0..*size).map(|i| b'a' + (i % 26) as u8).collect();
        fs::write(path, body).expect("write file");
    }
}

pub fn request_bytes(target: &str) -> Vec<u8> {
    format!("GET {target} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n").into_bytes()
}

pub fn loopback_listener() -> TcpListener {
    TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).expect("bind loopback")
}

/// Connect to `listener`, send a request for `target`, and return (client, server) ends.
/// The server end has the request pending, unread.
pub fn pending_request(listener: &TcpListener, target: &str) -> (TcpStream, TcpStream) {
    let addr = listener.local_addr().expect("local addr");
    let mut client = TcpStream::connect(addr).expect("connect");
    client.write_all(&request_bytes(target)).expect("send request");
    let (server, _) = listener.accept().expect("accept");
    (client, server)
}

/// A running server on an ephemeral loopback port. The listener thread is detached;
/// each test process tears it down on exit.
pub struct TestServer {
    pub addr: SocketAddr,
    pub queue: Arc<SchedQueue<TcpStream>>,
}

pub fn spawn_server(
    root: &Path,
    threads: usize,
    buffers: usize,
    discipline: Discipline,
) -> TestServer {
    let listener = Listener::bind_addr(SocketAddr::from((Ipv4Addr::LOCALHOST, 0)), root)
        .expect("bind server");
    let addr = listener.local_addr().expect("server addr");
    let queue = Arc::new(SchedQueue::new(buffers, discipline));
    let handler = Arc::new(HttpHandler::new(root));
    let pool = WorkerPool::spawn(threads, Arc::clone(&queue), handler).expect("spawn workers");

    let run_queue = Arc::clone(&queue);
    thread::spawn(move || {
        let _ = listener.run(&run_queue);
        run_queue.close();
        pool.join();
    });
    TestServer { addr, queue }
}

/// One-shot GET. Returns the status line and the raw bytes after the header block.
pub fn get(addr: SocketAddr, target: &str) -> (String, Vec<u8>) {
    let mut stream = TcpStream::connect(addr).expect("connect");
    stream.write_all(&request_bytes(target)).expect("send");
    let mut raw = Vec::new();
    stream.read_to_end(&mut raw).expect("read response");
    split_response(&raw)
}

pub fn split_response(raw: &[u8]) -> (String, Vec<u8>) {
    let end = raw
        .windows(4)
        .position(|w| w == b"\r\n\r\n")
        .expect("response has a header block");
    let head = String::from_utf8_lossy(&raw[..end]);
    let status = head.lines().next().unwrap_or_default().to_string();
    (status, raw[end + 4..].to_vec())
}

pub fn header<'a>(raw: &'a str, name: &str) -> Option<&'a str> {
    raw.lines()
        .find_map(|l| l.strip_prefix(name).and_then(|rest| rest.strip_prefix(": ")))
}
