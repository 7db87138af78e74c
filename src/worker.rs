//! Worker pool: fixed set of consumer threads draining the scheduling queue.
//!
//! A worker owns a connection from the moment `dequeue` returns it until it is dropped
//! (closed) after the handler finishes. Nothing is held across iterations.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crate::error::ServerError;
use crate::handler::RequestHandler;
use crate::metrics;
use crate::sched_queue::{QueueEntry, SchedQueue};

pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `count` workers named `worker-<i>`, all pulling from `queue`.
    pub fn spawn<C, H>(
        count: usize,
        queue: Arc<SchedQueue<C>>,
        handler: Arc<H>,
    ) -> Result<Self, ServerError>
    where
        C: Send + 'static,
        H: RequestHandler<C> + ?Sized + 'static,
    {
        let mut handles = Vec::with_capacity(count);
        for id in 0..count {
            let name = format!("worker-{id}");
            let queue = Arc::clone(&queue);
            let handler = Arc::clone(&handler);
            let handle = thread::Builder::new()
                .name(name.clone())
                .spawn(move || run_worker(id, &queue, &*handler))
                .map_err(|source| ServerError::Spawn { name, source })?;
            handles.push(handle);
        }
        Ok(Self { handles })
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Wait for every worker to exit. Workers only exit once the queue is closed and drained.
    pub fn join(self) {
        for handle in self.handles {
            if handle.join().is_err() {
                tracing::error!("worker panicked");
            }
        }
    }
}

/// Consumer loop: dequeue, handle, close. Returns when the queue is closed and empty.
///
/// Handler failures are isolated to their connection; the loop keeps going.
pub fn run_worker<C, H>(id: usize, queue: &SchedQueue<C>, handler: &H)
where
    H: RequestHandler<C> + ?Sized,
{
    while let Some(QueueEntry { mut conn, priority }) = queue.dequeue() {
        metrics::inc_dequeued();
        tracing::debug!(worker = id, priority, "dequeued");

        match handler.handle(&mut conn) {
            Ok(()) => metrics::inc_handled(),
            Err(e) => {
                metrics::inc_handler_errors();
                tracing::warn!(worker = id, priority, error = %e, "request failed");
            }
        }
        drop(conn);
    }
    tracing::debug!(worker = id, "queue closed, worker exiting");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Discipline;
    use crate::error::HandlerError;
    use parking_lot::Mutex;

    #[test]
    fn worker_drains_queue_then_exits_on_close() {
        let queue = SchedQueue::new(4, Discipline::Sff);
        for (id, size) in [(0u32, 30), (1, 10), (2, 20)] {
            queue.enqueue(QueueEntry::new(id, size)).unwrap();
        }
        queue.close();

        let seen = Mutex::new(Vec::new());
        let handler = |conn: &mut u32| -> Result<(), HandlerError> {
            seen.lock().push(*conn);
            Ok(())
        };
        run_worker(0, &queue, &handler);
        assert_eq!(*seen.lock(), vec![1, 2, 0]);
    }

    #[test]
    fn handler_error_does_not_stop_worker() {
        let queue = SchedQueue::new(4, Discipline::Fifo);
        for id in 0u32..4 {
            queue.enqueue(QueueEntry::new(id, 0)).unwrap();
        }
        queue.close();

        let seen = Mutex::new(Vec::new());
        let handler = |conn: &mut u32| -> Result<(), HandlerError> {
            seen.lock().push(*conn);
            if *conn % 2 == 0 {
                Err(HandlerError::EmptyRequest)
            } else {
                Ok(())
            }
        };
        run_worker(0, &queue, &handler);
        assert_eq!(*seen.lock(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn pool_spawns_requested_workers_and_joins_after_close() {
        let queue = Arc::new(SchedQueue::<u32>::new(2, Discipline::Fifo));
        let handler = Arc::new(|_: &mut u32| -> Result<(), HandlerError> { Ok(()) });
        let pool = WorkerPool::spawn(3, Arc::clone(&queue), handler).unwrap();
        assert_eq!(pool.len(), 3);
        queue.enqueue(QueueEntry::new(1, 1)).unwrap();
        queue.close();
        pool.join();
        assert!(queue.is_empty());
    }
}
