//! Fixed-size worker pool for blob decoding and encoding.
//!
//! Jobs arrive over a crossbeam channel; each worker loops on `recv`
//! until the channel closes. With zero workers the pool degenerates
//! to synchronous execution on the submitting thread, which turns the
//! whole pipeline into a single-threaded one without changing its
//! contract.

use crossbeam_channel::{unbounded, Sender};
use std::thread::{self, JoinHandle};

type Job = Box<dyn FnOnce() + Send + 'static>;

/// A fixed-size pool of worker threads executing boxed jobs.
pub struct WorkerPool {
    sender: Option<Sender<Job>>,
    workers: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `num_workers` threads. Zero workers means jobs run
    /// inline in `submit`.
    pub fn new(num_workers: usize) -> Self {
        if num_workers == 0 {
            return Self {
                sender: None,
                workers: Vec::new(),
            };
        }
        let (sender, receiver) = unbounded::<Job>();
        let workers = (0..num_workers)
            .map(|_| {
                let receiver = receiver.clone();
                thread::spawn(move || {
                    // Runs until the last sender is dropped.
                    for job in receiver.iter() {
                        job();
                    }
                })
            })
            .collect();
        Self {
            sender: Some(sender),
            workers,
        }
    }

    /// Hand a job to the pool, or run it inline when the pool has no
    /// threads.
    pub fn submit(&self, job: impl FnOnce() + Send + 'static) {
        match &self.sender {
            Some(sender) => {
                // Send fails only after the workers are gone, which
                // cannot happen while the pool is alive.
                let _ = sender.send(Box::new(job));
            }
            None => job(),
        }
    }

    /// Number of submitted jobs not yet picked up by a worker. Used
    /// by the framing stage's back-pressure check.
    pub fn queue_len(&self) -> usize {
        self.sender.as_ref().map_or(0, |sender| sender.len())
    }

    /// Number of worker threads.
    pub fn num_workers(&self) -> usize {
        self.workers.len()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Closing the channel lets each worker drain the backlog and
        // exit; then wait for them.
        self.sender.take();
        for worker in self.workers.drain(..) {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn jobs_run_on_workers() {
        let pool = WorkerPool::new(2);
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..100 {
            let counter = Arc::clone(&counter);
            pool.submit(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        drop(pool);
        assert_eq!(counter.load(Ordering::SeqCst), 100);
    }

    #[test]
    fn zero_workers_runs_inline() {
        let pool = WorkerPool::new(0);
        let counter = Arc::new(AtomicUsize::new(0));
        {
            let counter = Arc::clone(&counter);
            pool.submit(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        // Inline execution completes before submit returns.
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(pool.queue_len(), 0);
    }

    #[test]
    fn drop_joins_after_draining_backlog() {
        let pool = WorkerPool::new(1);
        let counter = Arc::new(AtomicUsize::new(0));
        for _ in 0..10 {
            let counter = Arc::clone(&counter);
            pool.submit(move || {
                std::thread::sleep(std::time::Duration::from_millis(1));
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }
        drop(pool);
        assert_eq!(counter.load(Ordering::SeqCst), 10);
    }
}
