//! Background mutation worker
//!
//! Store mutations are not applied on the caller's thread. They are queued
//! to a single worker thread and the caller returns at once. The returned
//! [`Completion`] may be dropped (fire-and-forget) or waited on.
//!
//! Jobs run one at a time in submission order. A panicking job is logged and
//! the worker keeps going; nothing is retried.

use crate::error::{Error, Result};
use crossbeam_channel::{Receiver, Sender};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread;
use std::time::Duration;
use tracing::{debug, error, warn};

type Job = Box<dyn FnOnce() + Send + 'static>;

struct Envelope {
    label: &'static str,
    job: Job,
    done: Sender<()>,
}

/// Handle to a submitted background job
#[derive(Debug)]
pub struct Completion {
    done: Receiver<()>,
}

impl Completion {
    /// Block until the job has run
    ///
    /// # Errors
    /// Returns [`Error::WorkerGone`] if the worker stopped before running it.
    pub fn wait(self) -> Result<()> {
        self.done.recv().map_err(|_| Error::WorkerGone)
    }

    /// Block until the job has run or `timeout` elapses
    ///
    /// Returns `true` if the job ran in time.
    pub fn wait_timeout(self, timeout: Duration) -> bool {
        self.done.recv_timeout(timeout).is_ok()
    }
}

/// Single-threaded FIFO executor for store mutations
#[derive(Debug)]
pub struct Dispatcher {
    queue: Sender<Envelope>,
}

impl Dispatcher {
    /// Spawn the worker thread
    ///
    /// # Errors
    /// Fails if the OS refuses to spawn a thread.
    pub fn spawn() -> Result<Self> {
        let (queue, jobs) = crossbeam_channel::unbounded::<Envelope>();

        thread::Builder::new()
            .name("fwpolicy-writer".to_string())
            .spawn(move || run_worker(&jobs))?;

        Ok(Self { queue })
    }

    /// Queue a job and return immediately
    pub fn submit<F>(&self, label: &'static str, job: F) -> Completion
    where
        F: FnOnce() + Send + 'static,
    {
        let (done, wait) = crossbeam_channel::bounded(1);
        let envelope = Envelope {
            label,
            job: Box::new(job),
            done,
        };

        if self.queue.send(envelope).is_err() {
            warn!(job = label, "Background worker gone, mutation dropped");
        }

        Completion { done: wait }
    }

    /// Block until every job submitted so far has run
    ///
    /// # Errors
    /// Returns [`Error::WorkerGone`] if the worker has stopped.
    pub fn flush(&self) -> Result<()> {
        self.submit("flush", || {}).wait()
    }
}

fn run_worker(jobs: &Receiver<Envelope>) {
    debug!("Background worker started");

    for Envelope { label, job, done } in jobs.iter() {
        if catch_unwind(AssertUnwindSafe(job)).is_err() {
            error!(job = label, "Background job panicked");
        }
        // Nobody waiting is the common case.
        let _ = done.send(());
    }

    debug!("Background worker stopped");
}
