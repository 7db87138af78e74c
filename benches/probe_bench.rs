//! Benchmark: admission probe cost (request-line parse + stat) on pre-peeked bytes.

use std::hint::black_box;
use std::time::{Duration, Instant};

use wserver::probe;

fn main() {
    let root = tempfile::tempdir().expect("tempdir");
    std::fs::write(root.path().join("index.html"), vec![b'x'; 4096]).expect("write");
    let request = b"GET /index.html HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n";

    // Warm up
    for _ in 0..10_000 {
        let _ = probe::size_from_bytes(request, root.path());
    }

    const TARGET_DURATION: Duration = Duration::from_secs(2);
    let start = Instant::now();
    let mut iterations: u64 = 0;
    while start.elapsed() < TARGET_DURATION {
        let size = probe::size_from_bytes(black_box(request), root.path());
        let _ = black_box(size);
        iterations += 1;
    }

    let elapsed = start.elapsed();
    eprintln!("probe: {} requests sized in {:?}", iterations, elapsed);
    eprintln!(
        "  {:.0} probes/s  {:.2}µs/probe",
        iterations as f64 / elapsed.as_secs_f64(),
        elapsed.as_secs_f64() * 1e6 / iterations as f64
    );
}
