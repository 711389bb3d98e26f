//! Fixed-size worker pool over an unbounded FIFO queue.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, PoisonError, mpsc};
use std::thread;
use std::time::Instant;

use tracing::{debug, error, info, warn};

use super::types::{JobError, ScheduledJob};

/// Executes one job to completion on a worker thread.
pub trait JobRunner: Send + Sync {
    fn run(&self, job: &ScheduledJob) -> Result<(), JobError>;
}

impl<F> JobRunner for F
where
    F: Fn(&ScheduledJob) -> Result<(), JobError> + Send + Sync,
{
    fn run(&self, job: &ScheduledJob) -> Result<(), JobError> {
        self(job)
    }
}

/// Anything jobs can be handed to for execution.
pub trait JobSink: Send + Sync {
    /// Never blocks; a job that cannot be accepted is logged and dropped.
    fn submit(&self, job: ScheduledJob);
}

impl<S> JobSink for Arc<S>
where
    S: JobSink + ?Sized,
{
    fn submit(&self, job: ScheduledJob) {
        (**self).submit(job)
    }
}

#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Number of worker threads
    pub workers: usize,
    /// Thread name prefix, also used in logs
    pub name: String,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            workers: 5,
            name: "job-worker".to_string(),
        }
    }
}

impl WorkerPoolConfig {
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

/// Pool runtime statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize)]
pub struct PoolStats {
    pub submitted: u64,
    pub processed: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub panicked: u64,
    /// Submissions refused after shutdown.
    pub dropped: u64,
    pub queued: u64,
    pub running: usize,
}

/// Bounded set of worker threads pulling jobs from one queue.
///
/// Jobs may be submitted before [`WorkerPool::start`]; they wait in the queue.
/// A job that errors or panics is logged and counted, and its worker moves on.
pub struct WorkerPool {
    config: WorkerPoolConfig,
    sender: Mutex<Option<mpsc::Sender<ScheduledJob>>>,
    receiver: Mutex<Option<mpsc::Receiver<ScheduledJob>>>,
    workers: Mutex<Vec<thread::JoinHandle<()>>>,
    stats: Arc<Mutex<PoolStats>>,
}

impl WorkerPool {
    pub fn new(config: WorkerPoolConfig) -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            config,
            sender: Mutex::new(Some(tx)),
            receiver: Mutex::new(Some(rx)),
            workers: Mutex::new(Vec::new()),
            stats: Arc::new(Mutex::new(PoolStats::default())),
        }
    }

    /// Spawn the workers. Calling it again is a no-op.
    pub fn start(&self, runner: Arc<dyn JobRunner>) -> Result<(), JobError> {
        let Some(rx) = lock(&self.receiver).take() else {
            warn!(pool = %self.config.name, "worker pool already started");
            return Ok(());
        };
        let rx = Arc::new(Mutex::new(rx));
        let count = self.config.workers.max(1);

        let mut workers = lock(&self.workers);
        for idx in 0..count {
            let rx = rx.clone();
            let runner = runner.clone();
            let stats = self.stats.clone();
            let name = format!("{}-{idx}", self.config.name);
            let handle = thread::Builder::new()
                .name(name.clone())
                .spawn(move || worker_loop(&name, &rx, runner.as_ref(), &stats))?;
            workers.push(handle);
        }

        info!(pool = %self.config.name, workers = count, "worker pool started");
        Ok(())
    }

    pub fn stats(&self) -> PoolStats {
        lock(&self.stats).clone()
    }

    /// Stop accepting jobs, let the workers drain the queue, and join them.
    pub fn shutdown(&self) {
        if lock(&self.sender).take().is_none() {
            return;
        }
        let workers: Vec<_> = lock(&self.workers).drain(..).collect();
        for handle in workers {
            if handle.join().is_err() {
                error!(pool = %self.config.name, "worker thread terminated abnormally");
            }
        }
        info!(pool = %self.config.name, stats = ?self.stats(), "worker pool stopped");
    }
}

impl JobSink for WorkerPool {
    fn submit(&self, job: ScheduledJob) {
        let sender = lock(&self.sender);
        let Some(tx) = sender.as_ref() else {
            lock(&self.stats).dropped += 1;
            warn!(
                pool = %self.config.name,
                job_id = %job.id,
                kind = job.kind.type_name(),
                "worker pool is shut down, job dropped"
            );
            return;
        };

        // Counted before sending so a fast worker never sees an uncounted job.
        {
            let mut s = lock(&self.stats);
            s.submitted += 1;
            s.queued += 1;
        }
        let id = job.id;
        if let Err(mpsc::SendError(job)) = tx.send(job) {
            let mut s = lock(&self.stats);
            s.submitted -= 1;
            s.queued -= 1;
            s.dropped += 1;
            warn!(pool = %self.config.name, job_id = %job.id, "queue closed, job dropped");
            return;
        }
        debug!(pool = %self.config.name, job_id = %id, "job queued");
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("config", &self.config)
            .field("stats", &self.stats())
            .finish()
    }
}

fn worker_loop(
    name: &str,
    rx: &Mutex<mpsc::Receiver<ScheduledJob>>,
    runner: &dyn JobRunner,
    stats: &Mutex<PoolStats>,
) {
    debug!(worker = name, "worker started");

    loop {
        // Only the receive holds the lock; the job runs without it.
        let next = lock(rx).recv();
        let Ok(job) = next else {
            break;
        };

        {
            let mut s = lock(stats);
            s.queued = s.queued.saturating_sub(1);
            s.running += 1;
        }

        let started = Instant::now();
        let outcome = catch_unwind(AssertUnwindSafe(|| runner.run(&job)));
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let mut s = lock(stats);
        s.running = s.running.saturating_sub(1);
        s.processed += 1;
        match outcome {
            Ok(Ok(())) => {
                s.succeeded += 1;
                debug!(worker = name, job_id = %job.id, elapsed_ms, "job completed");
            }
            Ok(Err(e)) => {
                s.failed += 1;
                error!(
                    worker = name,
                    job_id = %job.id,
                    kind = job.kind.type_name(),
                    error = %e,
                    "job failed"
                );
            }
            Err(panic) => {
                s.panicked += 1;
                error!(
                    worker = name,
                    job_id = %job.id,
                    kind = job.kind.type_name(),
                    panic = panic_message(panic.as_ref()),
                    "job panicked"
                );
            }
        }
    }

    debug!(worker = name, "worker stopped");
}

pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = panic.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.as_str()
    } else {
        "non-string panic payload"
    }
}

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
