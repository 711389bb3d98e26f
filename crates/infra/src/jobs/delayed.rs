//! One-shot timers that hand jobs to a [`JobSink`] once their delay elapses.
//!
//! A single timer thread sleeps until the earliest deadline (or until a new,
//! earlier one is armed). Timers live in memory only; a restart drops them.

use std::cmp::{Ordering, Reverse};
use std::collections::BinaryHeap;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, info, warn};

use super::pool::{JobSink, lock};
use super::types::{JobError, JobId, JobKind, ScheduledJob};

/// "Run this kind of job after this delay."
pub trait JobScheduler: Send + Sync {
    fn schedule(&self, kind: JobKind, delay: Duration) -> Result<JobId, JobError>;
}

impl<S> JobScheduler for Arc<S>
where
    S: JobScheduler + ?Sized,
{
    fn schedule(&self, kind: JobKind, delay: Duration) -> Result<JobId, JobError> {
        (**self).schedule(kind, delay)
    }
}

struct TimerEntry {
    due: Instant,
    seq: u64,
    job: ScheduledJob,
}

impl PartialEq for TimerEntry {
    fn eq(&self, other: &Self) -> bool {
        self.due == other.due && self.seq == other.seq
    }
}

impl Eq for TimerEntry {}

impl PartialOrd for TimerEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimerEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        self.due.cmp(&other.due).then(self.seq.cmp(&other.seq))
    }
}

#[derive(Default)]
struct TimerState {
    heap: BinaryHeap<Reverse<TimerEntry>>,
    seq: u64,
    shutdown: bool,
}

type Shared = Arc<(Mutex<TimerState>, Condvar)>;

/// Delayed job submitter backed by one timer thread.
pub struct DelayedJobSubmitter {
    shared: Shared,
    join: Mutex<Option<thread::JoinHandle<()>>>,
}

impl DelayedJobSubmitter {
    pub fn start(sink: Arc<dyn JobSink>) -> Result<Self, JobError> {
        let shared: Shared = Arc::new((Mutex::new(TimerState::default()), Condvar::new()));
        let timer_shared = shared.clone();
        let join = thread::Builder::new()
            .name("job-timer".to_string())
            .spawn(move || timer_loop(&timer_shared, sink.as_ref()))?;

        Ok(Self {
            shared,
            join: Mutex::new(Some(join)),
        })
    }

    /// Arm a timer; the job reaches the sink no earlier than `delay` from now.
    ///
    /// Delays that overflow the clock are rejected with [`JobError::DelayOutOfRange`].
    pub fn submit(&self, kind: JobKind, delay: Duration) -> Result<JobId, JobError> {
        let now = Utc::now();
        let due = Instant::now().checked_add(delay);
        let run_at = chrono::Duration::from_std(delay)
            .ok()
            .and_then(|d| now.checked_add_signed(d));
        let (Some(due), Some(run_at)) = (due, run_at) else {
            warn!(kind = kind.type_name(), delay_secs = delay.as_secs(), "delay out of range, job not armed");
            return Err(JobError::DelayOutOfRange(delay));
        };

        let (state, wake) = &*self.shared;
        let mut state = lock(state);
        if state.shutdown {
            warn!(kind = kind.type_name(), "delayed submitter is shut down, job not armed");
            return Err(JobError::ShutDown("delayed job submitter"));
        }

        let job = ScheduledJob {
            id: JobId::new(),
            run_at,
            created_at: now,
            kind,
        };
        let id = job.id;
        state.seq += 1;
        let seq = state.seq;
        state.heap.push(Reverse(TimerEntry { due, seq, job }));
        drop(state);
        wake.notify_one();

        let delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        debug!(job_id = %id, delay_ms, "timer armed");
        Ok(id)
    }

    /// Number of armed timers.
    pub fn pending(&self) -> usize {
        lock(&self.shared.0).heap.len()
    }

    /// Stop the timer thread; unfired timers are dropped.
    pub fn shutdown(&self) {
        {
            let mut state = lock(&self.shared.0);
            if state.shutdown {
                return;
            }
            state.shutdown = true;
        }
        self.shared.1.notify_all();
        if let Some(join) = lock(&self.join).take() {
            let _ = join.join();
        }
    }
}

impl JobScheduler for DelayedJobSubmitter {
    fn schedule(&self, kind: JobKind, delay: Duration) -> Result<JobId, JobError> {
        self.submit(kind, delay)
    }
}

impl Drop for DelayedJobSubmitter {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn timer_loop(shared: &(Mutex<TimerState>, Condvar), sink: &dyn JobSink) {
    let (state, wake) = shared;
    let mut guard = lock(state);

    loop {
        if guard.shutdown {
            let dropped = guard.heap.len();
            if dropped > 0 {
                info!(dropped, "timer thread stopping, unfired jobs dropped");
            }
            guard.heap.clear();
            return;
        }

        let now = Instant::now();
        let mut due = Vec::new();
        while guard
            .heap
            .peek()
            .is_some_and(|Reverse(entry)| entry.due <= now)
        {
            if let Some(Reverse(entry)) = guard.heap.pop() {
                due.push(entry.job);
            }
        }

        if !due.is_empty() {
            drop(guard);
            for job in due {
                debug!(job_id = %job.id, kind = job.kind.type_name(), "timer fired");
                sink.submit(job);
            }
            guard = lock(state);
            continue;
        }

        let next_due = guard.heap.peek().map(|Reverse(entry)| entry.due);
        guard = match next_due {
            Some(next) => {
                wake.wait_timeout(guard, next.saturating_duration_since(now))
                    .unwrap_or_else(PoisonError::into_inner)
                    .0
            }
            None => wake.wait(guard).unwrap_or_else(PoisonError::into_inner),
        };
    }
}

/// Scheduler that records requests instead of running them, for tests/dev.
#[derive(Debug, Default)]
pub struct RecordingScheduler {
    scheduled: Mutex<Vec<(JobId, JobKind, Duration)>>,
    refuse: bool,
}

impl RecordingScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scheduler that rejects everything as if shut down.
    pub fn refusing() -> Self {
        Self {
            refuse: true,
            ..Self::default()
        }
    }

    pub fn scheduled(&self) -> Vec<(JobKind, Duration)> {
        lock(&self.scheduled)
            .iter()
            .map(|(_, kind, delay)| (kind.clone(), *delay))
            .collect()
    }

    pub fn delays(&self) -> Vec<Duration> {
        lock(&self.scheduled).iter().map(|(_, _, d)| *d).collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.scheduled).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl JobScheduler for RecordingScheduler {
    fn schedule(&self, kind: JobKind, delay: Duration) -> Result<JobId, JobError> {
        if self.refuse {
            return Err(JobError::ShutDown("recording scheduler"));
        }
        let id = JobId::new();
        lock(&self.scheduled).push((id, kind, delay));
        Ok(id)
    }
}
