use std::net::TcpStream;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{CommandFactory, Parser, error::ErrorKind};
use tracing_subscriber::EnvFilter;

use wserver::config::{
    DEFAULT_BUFFERS, DEFAULT_PORT, DEFAULT_ROOT, DEFAULT_THREADS, Discipline, ServerConfig,
};
use wserver::error::ServerError;
use wserver::handler::HttpHandler;
use wserver::listener::Listener;
use wserver::metrics;
use wserver::sched_queue::SchedQueue;
use wserver::worker::WorkerPool;

#[derive(Parser)]
#[command(about = "Multi-threaded web server with FIFO or smallest-file-first scheduling")]
struct Args {
    /// Directory files are served from
    #[arg(short = 'd', long, default_value = DEFAULT_ROOT)]
    basedir: PathBuf,

    /// Port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Number of worker threads
    #[arg(short, long, default_value_t = DEFAULT_THREADS)]
    threads: usize,

    /// Scheduling queue capacity
    #[arg(short, long, default_value_t = DEFAULT_BUFFERS)]
    buffers: usize,

    /// Scheduling discipline
    #[arg(short, long, value_enum, default_value_t = Discipline::Fifo)]
    schedalg: Discipline,
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_thread_names(true)
        .init();
}

fn main() -> ExitCode {
    let args = Args::parse();
    let config = match ServerConfig::new(
        args.basedir,
        args.port,
        args.threads,
        args.buffers,
        args.schedalg,
    ) {
        Ok(config) => config,
        Err(e) => Args::command()
            .error(ErrorKind::ValueValidation, e)
            .exit(),
    };

    init_logging();
    metrics::spawn_reporter();

    match run(config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "server stopped");
            ExitCode::FAILURE
        }
    }
}

fn run(mut config: ServerConfig) -> Result<(), ServerError> {
    config.root = resolve_root(&config.root)?;

    let listener = Listener::bind(config.port, config.root.clone())?;
    let queue: Arc<SchedQueue<TcpStream>> =
        Arc::new(SchedQueue::new(config.buffers, config.discipline));
    let handler = Arc::new(HttpHandler::new(config.root.clone()));
    let pool = WorkerPool::spawn(config.threads, Arc::clone(&queue), handler)?;

    tracing::info!(
        root = %config.root.display(),
        port = config.port,
        threads = config.threads,
        buffers = config.buffers,
        discipline = %config.discipline,
        "wserver: ready"
    );

    let result = listener.run(&queue);

    // Let workers finish what was already admitted before the process exits.
    queue.close();
    pool.join();
    result
}

/// The root must exist and be a directory; everything downstream uses the absolute path.
fn resolve_root(root: &Path) -> Result<PathBuf, ServerError> {
    let canonical = root.canonicalize().map_err(|source| ServerError::RootDir {
        path: root.to_path_buf(),
        source,
    })?;
    if !canonical.is_dir() {
        return Err(ServerError::RootDir {
            path: root.to_path_buf(),
            source: std::io::Error::new(std::io::ErrorKind::NotADirectory, "not a directory"),
        });
    }
    Ok(canonical)
}
