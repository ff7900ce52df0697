//! Bounded worker pool for asynchronous listeners, dispatches and publishes.
//!
//! A fixed set of std threads pulls boxed jobs from one bounded channel.
//! Submission never blocks: a full queue is reported as
//! [`PoolError::Exhausted`] and the job is dropped.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender, TrySendError};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};

use thiserror::Error;

pub(crate) type Job = Box<dyn FnOnce() + Send + 'static>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PoolError {
    /// Every worker is busy and the queue is full.
    #[error("worker pool exhausted: {capacity} jobs already queued")]
    Exhausted { capacity: usize },
    /// The pool has been shut down.
    #[error("worker pool is shut down")]
    Closed,
}

/// Counters since the pool was created.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub submitted: u64,
    pub completed: u64,
    pub panicked: u64,
    pub rejected: u64,
}

#[derive(Default)]
struct Counters {
    submitted: AtomicU64,
    completed: AtomicU64,
    panicked: AtomicU64,
    rejected: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> PoolStats {
        PoolStats {
            submitted: self.submitted.load(Ordering::Relaxed),
            completed: self.completed.load(Ordering::Relaxed),
            panicked: self.panicked.load(Ordering::Relaxed),
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }
}

pub struct WorkerPool {
    sender: Mutex<Option<SyncSender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    size: usize,
    capacity: usize,
    closed: AtomicBool,
    counters: Arc<Counters>,
}

impl WorkerPool {
    /// Start `size` workers sharing a queue of `queue_capacity` jobs.
    pub fn new(size: usize, queue_capacity: usize) -> Self {
        let (sender, receiver) = sync_channel::<Job>(queue_capacity);
        let receiver = Arc::new(Mutex::new(receiver));
        let counters = Arc::new(Counters::default());

        let mut workers = Vec::with_capacity(size);
        for index in 0..size {
            let receiver = Arc::clone(&receiver);
            let counters = Arc::clone(&counters);
            let spawned = thread::Builder::new()
                .name(format!("routed-events-worker-{}", index))
                .spawn(move || work(receiver, counters));
            match spawned {
                Ok(handle) => workers.push(handle),
                Err(e) => tracing::error!(worker = index, error = %e, "failed to spawn pool worker"),
            }
        }

        Self {
            sender: Mutex::new(Some(sender)),
            workers: Mutex::new(workers),
            size,
            capacity: queue_capacity,
            closed: AtomicBool::new(false),
            counters,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn stats(&self) -> PoolStats {
        self.counters.snapshot()
    }

    /// Queue `job` without blocking.
    pub(crate) fn submit(&self, job: Job) -> Result<(), PoolError> {
        if self.closed.load(Ordering::Acquire) {
            self.counters.rejected.fetch_add(1, Ordering::Relaxed);
            return Err(PoolError::Closed);
        }
        let sender = self.sender.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(sender) = sender.as_ref() else {
            self.counters.rejected.fetch_add(1, Ordering::Relaxed);
            return Err(PoolError::Closed);
        };

        match sender.try_send(job) {
            Ok(()) => {
                self.counters.submitted.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(TrySendError::Full(_)) => {
                self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                Err(PoolError::Exhausted {
                    capacity: self.capacity,
                })
            }
            Err(TrySendError::Disconnected(_)) => {
                self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                Err(PoolError::Closed)
            }
        }
    }

    /// Stop accepting jobs, let the queue drain, and join the workers.
    ///
    /// Safe to call more than once, and from inside a job: the calling
    /// worker is not joined.
    pub fn shutdown(&self) {
        self.closed.store(true, Ordering::Release);
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        let workers: Vec<JoinHandle<()>> = self
            .workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();

        let current = thread::current().id();
        for handle in workers {
            if handle.thread().id() == current {
                continue;
            }
            if handle.join().is_err() {
                tracing::error!("pool worker terminated abnormally");
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        // Close the queue; workers exit once it drains. Don't join on drop.
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

fn work(receiver: Arc<Mutex<Receiver<Job>>>, counters: Arc<Counters>) {
    loop {
        let job = {
            let receiver = receiver.lock().unwrap_or_else(PoisonError::into_inner);
            receiver.recv()
        };
        match job {
            Ok(job) => run(job, &counters),
            Err(_) => break,
        }
    }
}

fn run(job: Job, counters: &Counters) {
    match panic::catch_unwind(AssertUnwindSafe(job)) {
        Ok(()) => {
            counters.completed.fetch_add(1, Ordering::Relaxed);
        }
        Err(payload) => {
            counters.panicked.fetch_add(1, Ordering::Relaxed);
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "non-string panic payload".to_string());
            tracing::error!(panic = %message, "pool job panicked");
        }
    }
}
