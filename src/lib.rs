//! Library crate for wserver: scheduling queue, admission probe, listener, worker pool, handler.
//!
//! The **binary** (`main.rs`) only parses arguments, binds the socket and wires these together,
//! so every piece of the accept → probe → queue → worker path is testable without a running
//! server process.

pub mod config;
pub mod constants;
pub mod error;
pub mod handler;
pub mod listener;
pub mod metrics;
pub mod probe;
pub mod protocol;
pub mod sched_queue;
pub mod worker;
