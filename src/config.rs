//! Server sizing and operational configuration.
//!
//! Everything here is fixed once `main` has validated the command line; workers only ever
//! see a shared read-only `ServerConfig`.

use std::fmt;
use std::path::PathBuf;

use clap::ValueEnum;
use thiserror::Error;

/// Upper bound on `-t`; the pool is never resized after startup.
pub const MAX_THREADS: usize = 128;

/// Upper bound on `-b` (scheduling queue capacity).
pub const MAX_BUFFERS: usize = 512;

pub const DEFAULT_ROOT: &str = ".";
pub const DEFAULT_PORT: u16 = 10000;
pub const DEFAULT_THREADS: usize = 1;
pub const DEFAULT_BUFFERS: usize = 1;

/// Listen backlog handed to the kernel. Independent of the scheduling queue capacity.
pub const LISTEN_BACKLOG: i32 = 1024;

const _: () = assert!(DEFAULT_THREADS >= 1 && DEFAULT_THREADS <= MAX_THREADS);
const _: () = assert!(DEFAULT_BUFFERS >= 1 && DEFAULT_BUFFERS <= MAX_BUFFERS);

/// Order in which queued connections are handed to workers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum Discipline {
    /// Arrival order.
    #[default]
    #[value(name = "FIFO")]
    Fifo,
    /// Smallest expected response first.
    #[value(name = "SFF")]
    Sff,
}

impl fmt::Display for Discipline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Discipline::Fifo => f.write_str("FIFO"),
            Discipline::Sff => f.write_str("SFF"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("wrong number of threads: {0} (expected 1..={max})", max = MAX_THREADS)]
    Threads(usize),
    #[error("wrong number of buffers: {0} (expected 1..={max})", max = MAX_BUFFERS)]
    Buffers(usize),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub root: PathBuf,
    pub port: u16,
    pub threads: usize,
    pub buffers: usize,
    pub discipline: Discipline,
}

impl ServerConfig {
    pub fn new(
        root: impl Into<PathBuf>,
        port: u16,
        threads: usize,
        buffers: usize,
        discipline: Discipline,
    ) -> Result<Self, ConfigError> {
        if !(1..=MAX_THREADS).contains(&threads) {
            return Err(ConfigError::Threads(threads));
        }
        if !(1..=MAX_BUFFERS).contains(&buffers) {
            return Err(ConfigError::Buffers(buffers));
        }
        Ok(Self {
            root: root.into(),
            port,
            threads,
            buffers,
            discipline,
        })
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from(DEFAULT_ROOT),
            port: DEFAULT_PORT,
            threads: DEFAULT_THREADS,
            buffers: DEFAULT_BUFFERS,
            discipline: Discipline::default(),
        }
    }
}
