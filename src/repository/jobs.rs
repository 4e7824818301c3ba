// src/repository/jobs.rs

//! Fixed-size worker pool with a bounded queue
//!
//! Submitting while the queue is full blocks the caller. Jobs submitted as
//! waitable are counted so [`JobPool::wait`] can block until all of them
//! have finished.

use crate::error::{Error, Result};
use rayon::{ThreadPool, ThreadPoolBuilder};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use tracing::{debug, error};

#[derive(Debug, Default)]
struct Counters {
    /// Jobs accepted and not yet finished, queued or running
    pending: usize,
    /// Waitable jobs not yet finished
    waitable: usize,
}

#[derive(Debug, Default)]
struct Shared {
    counters: Mutex<Counters>,
    changed: Condvar,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Counters> {
        // Counters stay consistent even if a job panicked while another
        // thread held the lock.
        self.counters.lock().unwrap_or_else(|p| p.into_inner())
    }
}

/// Marks one job finished when dropped, even on panic
struct Completion {
    shared: Arc<Shared>,
    waitable: bool,
}

impl Drop for Completion {
    fn drop(&mut self) {
        let mut c = self.shared.lock();
        c.pending -= 1;
        if self.waitable {
            c.waitable -= 1;
        }
        drop(c);
        self.shared.changed.notify_all();
    }
}

/// Worker pool owned by the caller and handed to whoever needs it
pub struct JobPool {
    pool: ThreadPool,
    threads: usize,
    capacity: usize,
    shared: Arc<Shared>,
}

impl JobPool {
    /// Start `threads` workers with room for `queue` waiting jobs
    pub fn new(threads: usize, queue: usize) -> Result<Self> {
        let threads = threads.max(1);
        let pool = ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("archdeps-job-{}", i))
            .panic_handler(|_| error!("A background job panicked"))
            .build()
            .map_err(|e| Error::InitError(format!("Failed to start worker pool: {}", e)))?;

        debug!("Started job pool with {} threads, queue {}", threads, queue);
        Ok(Self {
            pool,
            threads,
            capacity: threads + queue.max(1),
            shared: Arc::new(Shared::default()),
        })
    }

    pub fn threads(&self) -> usize {
        self.threads
    }

    /// Jobs accepted and not yet finished
    pub fn pending(&self) -> usize {
        self.shared.lock().pending
    }

    /// Queue a job that [`wait`](Self::wait) will block on
    pub fn submit<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.enqueue(job, true);
    }

    /// Queue a job nobody waits for
    pub fn submit_detached<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.enqueue(job, false);
    }

    fn enqueue<F>(&self, job: F, waitable: bool)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut c = self.shared.lock();
        while c.pending >= self.capacity {
            c = self
                .shared
                .changed
                .wait(c)
                .unwrap_or_else(|p| p.into_inner());
        }
        c.pending += 1;
        if waitable {
            c.waitable += 1;
        }
        drop(c);

        let completion = Completion {
            shared: Arc::clone(&self.shared),
            waitable,
        };
        self.pool.spawn(move || {
            let _completion = completion;
            job();
        });
    }

    /// Block until every waitable job has finished
    pub fn wait(&self) {
        let mut c = self.shared.lock();
        while c.waitable > 0 {
            c = self
                .shared
                .changed
                .wait(c)
                .unwrap_or_else(|p| p.into_inner());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn test_wait_for_all() {
        let pool = JobPool::new(4, 8).unwrap();
        let done = Arc::new(AtomicUsize::new(0));
        for _ in 0..32 {
            let done = Arc::clone(&done);
            pool.submit(move || {
                std::thread::sleep(Duration::from_millis(1));
                done.fetch_add(1, Ordering::SeqCst);
            });
        }
        pool.wait();
        assert_eq!(done.load(Ordering::SeqCst), 32);
        assert_eq!(pool.pending(), 0);
    }

    #[test]
    fn test_submit_blocks_when_full() {
        let pool = JobPool::new(1, 1).unwrap();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let release_rx = Arc::new(Mutex::new(release_rx));

        for _ in 0..2 {
            let rx = Arc::clone(&release_rx);
            pool.submit(move || {
                let _ = rx.lock().unwrap().recv();
            });
        }
        assert_eq!(pool.pending(), 2);

        let (submitted_tx, submitted_rx) = mpsc::channel();
        std::thread::scope(|s| {
            s.spawn(|| {
                pool.submit(|| {});
                submitted_tx.send(()).unwrap();
            });
            assert!(submitted_rx.recv_timeout(Duration::from_millis(100)).is_err());
            release_tx.send(()).unwrap();
            release_tx.send(()).unwrap();
            submitted_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        });
        pool.wait();
    }

    #[test]
    fn test_detached_not_waited() {
        let pool = JobPool::new(2, 2).unwrap();
        let (tx, rx) = mpsc::channel::<()>();
        pool.submit_detached(move || {
            let _ = rx.recv();
        });
        pool.submit(|| {});
        pool.wait();
        assert_eq!(pool.pending(), 1);
        drop(tx);
    }

    #[test]
    fn test_panicking_job_still_completes() {
        let pool = JobPool::new(1, 1).unwrap();
        pool.submit(|| panic!("job failed"));
        pool.submit(|| {});
        pool.wait();
        assert_eq!(pool.pending(), 0);
        assert_eq!(pool.threads(), 1);
    }
}
