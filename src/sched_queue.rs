//! Bounded scheduling queue: the monitor between the listener and the worker pool.
//!
//! One mutex guards storage, occupancy and the discipline-specific indices. Two condition
//! variables carry the wakeups: `not_full` is signalled by `dequeue`, `not_empty` by
//! `enqueue`. Every wait re-checks its predicate in a loop.
//!
//! FIFO storage is a ring (write and read indices advance modulo capacity). SFF storage is a
//! sorted array: insertion scans down from the tail past strictly larger keys, removal takes
//! index 0 and shifts the remainder left. Equal keys therefore keep arrival order.

use std::fmt;

use parking_lot::{Condvar, Mutex};

use crate::config::Discipline;
use crate::metrics;

/// An admitted connection and its priority key (expected response size in bytes, or
/// `INVALID_SIZE`).
#[derive(Debug)]
pub struct QueueEntry<C> {
    pub conn: C,
    pub priority: i64,
}

impl<C> QueueEntry<C> {
    pub fn new(conn: C, priority: i64) -> Self {
        Self { conn, priority }
    }
}

/// Returned by `enqueue` once the queue has been closed; hands the entry back to the caller.
pub struct QueueClosed<C>(pub QueueEntry<C>);

impl<C> fmt::Debug for QueueClosed<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("QueueClosed")
            .field(&self.0.priority)
            .finish_non_exhaustive()
    }
}

impl<C> fmt::Display for QueueClosed<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("scheduling queue is closed")
    }
}

impl<C> std::error::Error for QueueClosed<C> {}

/// Discipline-specific storage. Chosen once at construction.
enum Slots<C> {
    Fifo {
        ring: Box<[Option<QueueEntry<C>>]>,
        next_write: usize,
        next_read: usize,
    },
    Sff {
        sorted: Vec<QueueEntry<C>>,
    },
}

impl<C> Slots<C> {
    fn new(discipline: Discipline, capacity: usize) -> Self {
        match discipline {
            Discipline::Fifo => Slots::Fifo {
                ring: (0..capacity).map(|_| None).collect(),
                next_write: 0,
                next_read: 0,
            },
            Discipline::Sff => Slots::Sff {
                sorted: Vec::with_capacity(capacity),
            },
        }
    }

    /// Caller guarantees there is a free slot.
    fn insert(&mut self, entry: QueueEntry<C>) {
        match self {
            Slots::Fifo {
                ring, next_write, ..
            } => {
                debug_assert!(ring[*next_write].is_none(), "ring slot still occupied");
                ring[*next_write] = Some(entry);
                *next_write = (*next_write + 1) % ring.len();
            }
            Slots::Sff { sorted } => {
                let mut i = sorted.len();
                while i > 0 && sorted[i - 1].priority > entry.priority {
                    i -= 1;
                }
                sorted.insert(i, entry);
            }
        }
    }

    /// Caller guarantees at least one entry is present.
    fn remove(&mut self) -> Option<QueueEntry<C>> {
        match self {
            Slots::Fifo {
                ring, next_read, ..
            } => {
                let entry = ring[*next_read].take();
                *next_read = (*next_read + 1) % ring.len();
                entry
            }
            Slots::Sff { sorted } => {
                if sorted.is_empty() {
                    None
                } else {
                    Some(sorted.remove(0))
                }
            }
        }
    }
}

struct State<C> {
    slots: Slots<C>,
    count: usize,
    closed: bool,
}

pub struct SchedQueue<C> {
    state: Mutex<State<C>>,
    not_full: Condvar,
    not_empty: Condvar,
    capacity: usize,
    discipline: Discipline,
}

impl<C> SchedQueue<C> {
    /// # Panics
    /// If `capacity` is zero. `ServerConfig` rejects that before a queue is built.
    pub fn new(capacity: usize, discipline: Discipline) -> Self {
        assert!(capacity > 0, "scheduling queue capacity must be non-zero");
        Self {
            state: Mutex::new(State {
                slots: Slots::new(discipline, capacity),
                count: 0,
                closed: false,
            }),
            not_full: Condvar::new(),
            not_empty: Condvar::new(),
            capacity,
            discipline,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn discipline(&self) -> Discipline {
        self.discipline
    }

    /// Current occupancy. Stale as soon as the lock is released.
    pub fn len(&self) -> usize {
        self.state.lock().count
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Insert `entry`, blocking while the queue is full.
    ///
    /// Fails only if the queue is closed, in which case the entry is handed back.
    pub fn enqueue(&self, entry: QueueEntry<C>) -> Result<(), QueueClosed<C>> {
        let mut state = self.state.lock();
        if state.count == self.capacity && !state.closed {
            metrics::inc_enqueue_stalls();
        }
        while state.count == self.capacity && !state.closed {
            self.not_full.wait(&mut state);
        }
        if state.closed {
            return Err(QueueClosed(entry));
        }

        state.slots.insert(entry);
        state.count += 1;
        metrics::set_queue_occ(state.count);

        self.not_empty.notify_one();
        Ok(())
    }

    /// Remove the next entry per the discipline, blocking while the queue is empty.
    ///
    /// Returns `None` only when the queue is closed and fully drained.
    pub fn dequeue(&self) -> Option<QueueEntry<C>> {
        let mut state = self.state.lock();
        while state.count == 0 && !state.closed {
            self.not_empty.wait(&mut state);
        }
        if state.count == 0 {
            return None;
        }

        let entry = state.slots.remove();
        debug_assert!(entry.is_some(), "occupancy and storage disagree");
        state.count -= 1;
        metrics::set_queue_occ(state.count);

        self.not_full.notify_one();
        entry
    }

    /// Stop accepting entries and wake every waiter. Entries already queued stay
    /// available to `dequeue`.
    pub fn close(&self) {
        let mut state = self.state.lock();
        state.closed = true;
        self.not_full.notify_all();
        self.not_empty.notify_all();
    }
}
