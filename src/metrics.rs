//! Process-wide counters for the admission and worker paths.
//!
//! Compiled in with `--features metrics`; otherwise every hook is an empty inline fn.

#[cfg(feature = "metrics")]
mod imp {
    use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
    use std::time::Duration;

    // Admission (cumulative)
    static ADMITTED: AtomicU64 = AtomicU64::new(0);
    static ADMITTED_INVALID: AtomicU64 = AtomicU64::new(0);
    // Backpressure: enqueue found the queue full and had to wait
    static ENQUEUE_STALLS: AtomicU64 = AtomicU64::new(0);
    // Workers (cumulative)
    static DEQUEUED: AtomicU64 = AtomicU64::new(0);
    static HANDLED: AtomicU64 = AtomicU64::new(0);
    static HANDLER_ERRORS: AtomicU64 = AtomicU64::new(0);
    // Gauges
    static QUEUE_OCC: AtomicUsize = AtomicUsize::new(0);
    static QUEUE_MAX_OCC: AtomicUsize = AtomicUsize::new(0);

    #[derive(Clone, Copy, Debug)]
    pub struct MetricsSnapshot {
        pub admitted: u64,
        pub admitted_invalid: u64,
        pub enqueue_stalls: u64,
        pub dequeued: u64,
        pub handled: u64,
        pub handler_errors: u64,
        pub queue_occ: usize,
        pub queue_max_occ: usize,
    }

    pub fn inc_admitted() {
        ADMITTED.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_admitted_invalid() {
        ADMITTED_INVALID.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_enqueue_stalls() {
        ENQUEUE_STALLS.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_dequeued() {
        DEQUEUED.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_handled() {
        HANDLED.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_handler_errors() {
        HANDLER_ERRORS.fetch_add(1, Ordering::Relaxed);
    }

    fn update_max(target: &AtomicUsize, value: usize) {
        let mut prev = target.load(Ordering::Relaxed);
        while value > prev {
            match target.compare_exchange_weak(prev, value, Ordering::Relaxed, Ordering::Relaxed) {
                Ok(_) => break,
                Err(next) => prev = next,
            }
        }
    }

    /// Record queue occupancy after a mutation. Called with the queue lock held.
    pub fn set_queue_occ(value: usize) {
        QUEUE_OCC.store(value, Ordering::Relaxed);
        update_max(&QUEUE_MAX_OCC, value);
    }

    pub fn snapshot() -> MetricsSnapshot {
        MetricsSnapshot {
            admitted: ADMITTED.load(Ordering::Relaxed),
            admitted_invalid: ADMITTED_INVALID.load(Ordering::Relaxed),
            enqueue_stalls: ENQUEUE_STALLS.load(Ordering::Relaxed),
            dequeued: DEQUEUED.load(Ordering::Relaxed),
            handled: HANDLED.load(Ordering::Relaxed),
            handler_errors: HANDLER_ERRORS.load(Ordering::Relaxed),
            queue_occ: QUEUE_OCC.load(Ordering::Relaxed),
            queue_max_occ: QUEUE_MAX_OCC.load(Ordering::Relaxed),
        }
    }

    pub fn spawn_reporter() {
        const INTERVAL_SECS: u64 = 10;
        let spawned = std::thread::Builder::new()
            .name("metrics".into())
            .spawn(|| {
                let mut last = snapshot();
                loop {
                    std::thread::sleep(Duration::from_secs(INTERVAL_SECS));
                    let snap = snapshot();
                    tracing::info!(
                        interval_secs = INTERVAL_SECS,
                        admitted = snap.admitted.saturating_sub(last.admitted),
                        admitted_invalid =
                            snap.admitted_invalid.saturating_sub(last.admitted_invalid),
                        enqueue_stalls = snap.enqueue_stalls.saturating_sub(last.enqueue_stalls),
                        dequeued = snap.dequeued.saturating_sub(last.dequeued),
                        handled = snap.handled.saturating_sub(last.handled),
                        handler_errors = snap.handler_errors.saturating_sub(last.handler_errors),
                        queue_occ = snap.queue_occ,
                        queue_max_occ = snap.queue_max_occ,
                        "metrics delta"
                    );
                    last = snap;
                }
            });
        if let Err(e) = spawned {
            tracing::warn!(error = %e, "metrics reporter not started");
        }
    }
}

#[cfg(not(feature = "metrics"))]
#[allow(dead_code)]
mod imp {
    #[derive(Clone, Copy, Debug)]
    pub struct MetricsSnapshot {
        pub admitted: u64,
        pub admitted_invalid: u64,
        pub enqueue_stalls: u64,
        pub dequeued: u64,
        pub handled: u64,
        pub handler_errors: u64,
        pub queue_occ: usize,
        pub queue_max_occ: usize,
    }

    pub fn inc_admitted() {}
    pub fn inc_admitted_invalid() {}
    pub fn inc_enqueue_stalls() {}
    pub fn inc_dequeued() {}
    pub fn inc_handled() {}
    pub fn inc_handler_errors() {}
    pub fn set_queue_occ(_: usize) {}
    pub fn snapshot() -> MetricsSnapshot {
        MetricsSnapshot {
            admitted: 0,
            admitted_invalid: 0,
            enqueue_stalls: 0,
            dequeued: 0,
            handled: 0,
            handler_errors: 0,
            queue_occ: 0,
            queue_max_occ: 0,
        }
    }
    pub fn spawn_reporter() {}
}

pub use imp::*;
