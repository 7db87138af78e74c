use std::io::{self, BufRead, BufReader, Read, Write};
use std::net::TcpStream;
use std::process::ExitCode;
use std::sync::mpsc;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use clap::{Parser, Subcommand};

use wserver::config::DEFAULT_PORT;

#[derive(Parser)]
#[command(about = "Test client for wserver")]
struct Args {
    /// Server host
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Server port
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Request every target concurrently (one connection each) and print the responses
    Fetch {
        /// Targets such as /index.html
        #[arg(required = true)]
        targets: Vec<String>,
    },
    /// Measure latency and throughput of repeated one-shot requests
    Bench {
        /// Number of concurrent client threads
        #[arg(short, long, default_value_t = 4)]
        connections: usize,
        /// Requests per client thread
        #[arg(short, long, default_value_t = 1000)]
        requests: usize,
        /// Target requested by every client
        target: String,
    },
}

fn send_request(stream: &mut TcpStream, host: &str, target: &str) -> io::Result<()> {
    let req = format!("GET {target} HTTP/1.1\r\nHost: {host}\r\nConnection: close\r\n\r\n");
    stream.write_all(req.as_bytes())
}

/// Read a full one-shot response: headers up to the blank line, then body until EOF.
fn read_response(stream: &mut TcpStream) -> io::Result<(Vec<String>, Vec<u8>)> {
    let mut reader = BufReader::new(stream);
    let mut headers = Vec::new();
    loop {
        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 || line == "\r\n" || line == "\n" {
            break;
        }
        headers.push(line);
    }
    let mut body = Vec::new();
    reader.read_to_end(&mut body)?;
    Ok((headers, body))
}

fn one_request(addr: &str, host: &str, target: &str) -> io::Result<(Vec<String>, Vec<u8>)> {
    let mut stream = TcpStream::connect(addr)?;
    send_request(&mut stream, host, target)?;
    read_response(&mut stream)
}

fn main() -> ExitCode {
    let args = Args::parse();
    let addr = format!("{}:{}", args.host, args.port);

    let result = match args.command {
        Command::Fetch { targets } => fetch(&addr, &args.host, targets),
        Command::Bench {
            connections,
            requests,
            target,
        } => bench(&addr, &args.host, connections, requests, &target),
    };
    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("client: {e}");
            ExitCode::FAILURE
        }
    }
}

fn fetch(addr: &str, host: &str, targets: Vec<String>) -> io::Result<()> {
    let handles: Vec<_> = targets
        .into_iter()
        .map(|target| {
            let addr = addr.to_string();
            let host = host.to_string();
            std::thread::spawn(move || -> io::Result<()> {
                let opened = SystemTime::now()
                    .duration_since(UNIX_EPOCH)
                    .unwrap_or_default();
                let (headers, body) = one_request(&addr, &host, &target)?;

                // One write per response so concurrent output does not interleave.
                let mut out = format!(
                    "[{}.{:06}] Opened connection for {}\n",
                    opened.as_secs(),
                    opened.subsec_micros(),
                    target
                );
                for h in &headers {
                    out.push_str(h);
                }
                out.push_str(&String::from_utf8_lossy(&body));
                io::stdout().lock().write_all(out.as_bytes())
            })
        })
        .collect();

    let mut first_err = None;
    for h in handles {
        let res = h
            .join()
            .unwrap_or_else(|_| Err(io::Error::other("client thread panicked")));
        if let Err(e) = res {
            eprintln!("fetch failed: {e}");
            first_err.get_or_insert(e);
        }
    }
    first_err.map_or(Ok(()), Err)
}

fn percentile(sorted: &[u64], p: f64) -> f64 {
    let i = ((p / 100.0) * sorted.len() as f64) as usize;
    sorted[i.min(sorted.len() - 1)] as f64 / 1_000.0
}

fn bench(
    addr: &str,
    host: &str,
    num_connections: usize,
    requests_per_conn: usize,
    target: &str,
) -> io::Result<()> {
    eprintln!(
        "bench: {} clients x {} requests for {} → {}",
        num_connections, requests_per_conn, target, addr
    );

    let (tx, rx) = mpsc::channel::<io::Result<u64>>();
    let start = Instant::now();

    for _ in 0..num_connections {
        let addr = addr.to_string();
        let host = host.to_string();
        let target = target.to_string();
        let tx = tx.clone();
        std::thread::spawn(move || {
            for _ in 0..requests_per_conn {
                let sent_at = Instant::now();
                let sample = one_request(&addr, &host, &target)
                    .map(|_| sent_at.elapsed().as_nanos() as u64);
                let failed = sample.is_err();
                if tx.send(sample).is_err() || failed {
                    break;
                }
            }
        });
    }
    drop(tx);

    let mut samples: Vec<u64> = Vec::with_capacity(num_connections * requests_per_conn);
    let mut errors = 0usize;
    for sample in rx {
        match sample {
            Ok(ns) => samples.push(ns),
            Err(e) => {
                errors += 1;
                eprintln!("request failed: {e}");
            }
        }
    }
    let elapsed = start.elapsed();

    if samples.is_empty() {
        return Err(io::Error::other("no successful requests; is the server running?"));
    }
    samples.sort_unstable();
    report(&samples, elapsed, errors);
    Ok(())
}

fn report(sorted: &[u64], elapsed: Duration, errors: usize) {
    let n = sorted.len();
    eprintln!();
    eprintln!(
        "── summary ({:.1}s, {} requests, {} errors) ──────────────────────",
        elapsed.as_secs_f64(),
        n,
        errors
    );
    eprintln!("  qps     {:.0}", n as f64 / elapsed.as_secs_f64());
    eprintln!("  p50     {:.1}µs", percentile(sorted, 50.0));
    eprintln!("  p95     {:.1}µs", percentile(sorted, 95.0));
    eprintln!("  p99     {:.1}µs", percentile(sorted, 99.0));
    eprintln!("  max     {:.1}µs", sorted[n - 1] as f64 / 1_000.0);
}
