//! Admission path over real loopback sockets: probe → enqueue → dequeue, no worker threads.

mod common;

use std::io::Read;
use std::net::TcpStream;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use wserver::config::Discipline;
use wserver::constants::INVALID_SIZE;
use wserver::listener::admit;
use wserver::probe;
use wserver::sched_queue::SchedQueue;

fn wait_for_len(q: &SchedQueue<TcpStream>, len: usize) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while q.len() != len {
        assert!(Instant::now() < deadline, "queue never reached {len} entries");
        thread::sleep(Duration::from_millis(5));
    }
}

#[test]
fn probe_sizes_real_connection_without_consuming_request() {
    let root = common::doc_root(&[("index.html", 321)]);
    let listener = common::loopback_listener();
    let (client, mut server) = common::pending_request(&listener, "/index.html");

    assert_eq!(probe::probe(&server, root.path()), 321);
    // Probing twice sees the same bytes.
    assert_eq!(probe::probe(&server, root.path()), 321);

    drop(client);
    let mut request = Vec::new();
    server.read_to_end(&mut request).unwrap();
    assert_eq!(request, common::request_bytes("/index.html"));
}

#[test]
fn probe_on_real_connection_rejects_missing_and_traversal() {
    let root = common::doc_root(&[("index.html", 10)]);
    let listener = common::loopback_listener();

    let (_c1, missing) = common::pending_request(&listener, "/missing.html");
    assert_eq!(probe::probe(&missing, root.path()), INVALID_SIZE);

    let (_c2, traversal) = common::pending_request(&listener, "/../index.html");
    assert_eq!(probe::probe(&traversal, root.path()), INVALID_SIZE);
}

#[test]
fn peer_closing_without_request_is_invalid() {
    let root = common::doc_root(&[]);
    let listener = common::loopback_listener();
    let client = TcpStream::connect(listener.local_addr().unwrap()).unwrap();
    let (server, _) = listener.accept().unwrap();
    drop(client);
    assert_eq!(probe::probe(&server, root.path()), INVALID_SIZE);
}

#[test]
fn sff_capacity_two_serves_smallest_first_under_backpressure() {
    let root = common::doc_root(&[("a.html", 500), ("b.html", 100), ("c.html", 300)]);
    let listener = common::loopback_listener();
    let q = Arc::new(SchedQueue::new(2, Discipline::Sff));

    let producer = {
        let q = Arc::clone(&q);
        let root = root.path().to_path_buf();
        thread::spawn(move || {
            let mut clients = Vec::new();
            for target in ["/a.html", "/b.html", "/c.html"] {
                let (client, server) = common::pending_request(&listener, target);
                clients.push(client);
                admit(server, &q, &root).unwrap();
            }
            clients
        })
    };

    // Third admission is stalled until a slot frees.
    wait_for_len(&q, 2);
    thread::sleep(Duration::from_millis(50));
    assert!(!producer.is_finished());

    assert_eq!(q.dequeue().unwrap().priority, 100);
    let _clients = producer.join().unwrap();
    wait_for_len(&q, 2);
    assert_eq!(q.dequeue().unwrap().priority, 300);
    assert_eq!(q.dequeue().unwrap().priority, 500);
}

#[test]
fn fifo_capacity_four_keeps_arrival_order() {
    let root = common::doc_root(&[
        ("a.html", 500),
        ("b.html", 100),
        ("c.html", 300),
        ("d.html", 10),
    ]);
    let listener = common::loopback_listener();
    let q = SchedQueue::new(4, Discipline::Fifo);

    let mut clients = Vec::new();
    for target in ["/a.html", "/b.html", "/c.html", "/d.html"] {
        let (client, server) = common::pending_request(&listener, target);
        clients.push(client);
        admit(server, &q, root.path()).unwrap();
    }

    let order: Vec<i64> = (0..4).map(|_| q.dequeue().unwrap().priority).collect();
    assert_eq!(order, vec![500, 100, 300, 10]);
}

#[test]
fn unsizable_request_is_queued_and_jumps_ahead_under_sff() {
    // Known weakness: the invalid-size key sorts below every real size, so a request the
    // probe could not size is served before legitimate ones instead of being rejected.
    let root = common::doc_root(&[("small.html", 1)]);
    let listener = common::loopback_listener();
    let q = SchedQueue::new(4, Discipline::Sff);

    let (_c1, small) = common::pending_request(&listener, "/small.html");
    let (_c2, missing) = common::pending_request(&listener, "/nope.html");
    assert_eq!(admit(small, &q, root.path()).unwrap(), 1);
    assert_eq!(admit(missing, &q, root.path()).unwrap(), INVALID_SIZE);

    assert_eq!(q.len(), 2);
    assert_eq!(q.dequeue().unwrap().priority, INVALID_SIZE);
    assert_eq!(q.dequeue().unwrap().priority, 1);
}

#[test]
fn admit_after_close_hands_connection_back() {
    let root = common::doc_root(&[("a.html", 5)]);
    let listener = common::loopback_listener();
    let q = SchedQueue::new(1, Discipline::Fifo);
    q.close();

    let (_client, server) = common::pending_request(&listener, "/a.html");
    let peer = server.peer_addr().unwrap();
    let rejected = admit(server, &q, root.path()).unwrap_err();
    assert_eq!(rejected.0.conn.peer_addr().unwrap(), peer);
    assert_eq!(rejected.0.priority, 5);
}
