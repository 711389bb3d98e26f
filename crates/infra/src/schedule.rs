//! Cron dispatcher: named triggers firing dispatch functions on one thread.
//!
//! Dispatch functions run synchronously on the scheduling thread and are
//! expected to only enqueue work. Their errors and panics are logged and the
//! dispatcher carries on with the next firing.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::str::FromStr;
use std::sync::{Arc, Condvar, Mutex, PoisonError};
use std::thread;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use chrono_tz::Tz;
use tracing::{debug, error, info, warn};

use officedesk_core::local_time_to_utc;

use crate::jobs::pool::{lock, panic_message};

/// Longest uninterrupted sleep; bounds the effect of wall-clock jumps.
const MAX_SLEEP: Duration = Duration::from_secs(60);

pub type DispatchFn = Arc<dyn Fn() -> anyhow::Result<()> + Send + Sync>;

#[derive(Debug, thiserror::Error)]
pub enum CronError {
    #[error("invalid trigger: {0}")]
    InvalidTrigger(String),
    #[error("no trigger registered as `{0}`")]
    UnknownTrigger(String),
    #[error("dispatch `{id}` failed: {message}")]
    Dispatch { id: String, message: String },
    #[error("dispatch `{id}` panicked: {message}")]
    Panicked { id: String, message: String },
    #[error("failed to spawn scheduler thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// When a registration fires.
#[derive(Debug, Clone, PartialEq)]
pub enum TriggerSpec {
    /// Every day at a local wall-clock time.
    DailyAt { time: NaiveTime, timezone: Tz },
    /// Standard cron expression (with seconds field), evaluated in UTC.
    Cron(String),
}

#[derive(Debug, Clone)]
enum Trigger {
    /// Local time already converted to its UTC time of day.
    DailyUtc(NaiveTime),
    Cron(Box<::cron::Schedule>),
}

impl Trigger {
    fn from_spec(spec: &TriggerSpec, now: DateTime<Utc>) -> Result<Self, CronError> {
        match spec {
            TriggerSpec::DailyAt { time, timezone } => {
                let today: NaiveDate = now.with_timezone(timezone).date_naive();
                let utc = local_time_to_utc(*timezone, today, *time)
                    .map_err(|e| CronError::InvalidTrigger(e.to_string()))?;
                Ok(Trigger::DailyUtc(utc.time()))
            }
            TriggerSpec::Cron(expr) => ::cron::Schedule::from_str(expr)
                .map(|s| Trigger::Cron(Box::new(s)))
                .map_err(|e| CronError::InvalidTrigger(format!("`{expr}`: {e}"))),
        }
    }

    fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Trigger::DailyUtc(time) => {
                let today = after.date_naive().and_time(*time).and_utc();
                if today > after {
                    Some(today)
                } else {
                    Some(today + chrono::Duration::days(1))
                }
            }
            Trigger::Cron(schedule) => schedule.after(&after).next(),
        }
    }
}

struct Registration {
    trigger: Trigger,
    dispatch: DispatchFn,
    next_fire: Option<DateTime<Utc>>,
}

#[derive(Default)]
struct State {
    entries: HashMap<String, Registration>,
    shutdown: bool,
}

type Shared = Arc<(Mutex<State>, Condvar)>;

/// Named triggers with one scheduling thread.
pub struct CronDispatcher {
    shared: Shared,
    join: Mutex<Option<thread::JoinHandle<()>>>,
}

impl CronDispatcher {
    pub fn start() -> Result<Self, CronError> {
        let shared: Shared = Arc::new((Mutex::new(State::default()), Condvar::new()));
        let loop_shared = shared.clone();
        let join = thread::Builder::new()
            .name("cron-dispatcher".to_string())
            .spawn(move || scheduler_loop(&loop_shared))?;

        Ok(Self {
            shared,
            join: Mutex::new(Some(join)),
        })
    }

    /// Register (or replace) `id`. Returns the first firing instant.
    pub fn register<F>(
        &self,
        id: impl Into<String>,
        spec: TriggerSpec,
        dispatch: F,
    ) -> Result<Option<DateTime<Utc>>, CronError>
    where
        F: Fn() -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let id = id.into();
        let now = Utc::now();
        let trigger = Trigger::from_spec(&spec, now)?;
        let next_fire = trigger.next_after(now);

        let replaced = {
            let mut state = lock(&self.shared.0);
            state
                .entries
                .insert(
                    id.clone(),
                    Registration {
                        trigger,
                        dispatch: Arc::new(dispatch),
                        next_fire,
                    },
                )
                .is_some()
        };
        self.shared.1.notify_all();

        if replaced {
            info!(trigger = %id, spec = ?spec, next_fire = ?next_fire, "cron trigger replaced");
        } else {
            info!(trigger = %id, spec = ?spec, next_fire = ?next_fire, "cron trigger registered");
        }
        Ok(next_fire)
    }

    /// Run `id`'s dispatch function now, on the calling thread.
    pub fn fire_now(&self, id: &str) -> Result<(), CronError> {
        let dispatch = lock(&self.shared.0)
            .entries
            .get(id)
            .map(|r| r.dispatch.clone())
            .ok_or_else(|| CronError::UnknownTrigger(id.to_string()))?;
        run_dispatch(id, dispatch.as_ref())
    }

    pub fn next_fire(&self, id: &str) -> Option<DateTime<Utc>> {
        lock(&self.shared.0).entries.get(id).and_then(|r| r.next_fire)
    }

    pub fn ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = lock(&self.shared.0).entries.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Stop the scheduling thread. Registrations stop firing.
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
        info!("cron dispatcher stopped");
    }
}

impl Drop for CronDispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_dispatch(id: &str, dispatch: &(dyn Fn() -> anyhow::Result<()> + Send + Sync)) -> Result<(), CronError> {
    match catch_unwind(AssertUnwindSafe(dispatch)) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) => Err(CronError::Dispatch {
            id: id.to_string(),
            message: format!("{e:#}"),
        }),
        Err(panic) => Err(CronError::Panicked {
            id: id.to_string(),
            message: panic_message(panic.as_ref()).to_string(),
        }),
    }
}

fn scheduler_loop(shared: &(Mutex<State>, Condvar)) {
    let (state, wake) = shared;
    let mut guard = lock(state);
    info!("cron dispatcher started");

    loop {
        if guard.shutdown {
            return;
        }

        let now = Utc::now();
        let mut due: Vec<(String, DispatchFn)> = Vec::new();
        for (id, reg) in guard.entries.iter_mut() {
            if reg.next_fire.is_some_and(|at| at <= now) {
                due.push((id.clone(), reg.dispatch.clone()));
                reg.next_fire = reg.trigger.next_after(now);
            }
        }

        if !due.is_empty() {
            drop(guard);
            for (id, dispatch) in due {
                debug!(trigger = %id, "cron trigger firing");
                match run_dispatch(&id, dispatch.as_ref()) {
                    Ok(()) => debug!(trigger = %id, "cron dispatch finished"),
                    Err(e @ CronError::Panicked { .. }) => error!(trigger = %id, error = %e, "cron dispatch panicked"),
                    Err(e) => warn!(trigger = %id, error = %e, "cron dispatch failed"),
                }
            }
            guard = lock(state);
            continue;
        }

        let sleep = guard
            .entries
            .values()
            .filter_map(|r| r.next_fire)
            .min()
            .map(|at| (at - now).to_std().unwrap_or(Duration::ZERO))
            .unwrap_or(MAX_SLEEP)
            .min(MAX_SLEEP);
        guard = wake
            .wait_timeout(guard, sleep)
            .unwrap_or_else(PoisonError::into_inner)
            .0;
    }
}
