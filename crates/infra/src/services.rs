//! Process-wide service wiring.
//!
//! `Services::start` builds the pipeline once: worker pool, delayed submitter,
//! completion client, workflows, sweep, and the cron dispatcher with its two
//! daily registrations. Everything is shared by `Arc`; there is no global
//! scheduler.

use std::sync::Arc;

use chrono::Utc;
use tracing::info;

use officedesk_ai::{CompletionClient, CompletionLog, CompletionService, InMemoryCompletionLog};
use officedesk_reports::{PeriodTask, ReportRecord};

use crate::config::ServiceConfig;
use crate::jobs::{DelayedJobSubmitter, JobError, JobExecutor, PoolStats, WorkerPool, WorkerPoolConfig};
use crate::schedule::{CronDispatcher, CronError, TriggerSpec};
use crate::store::InMemoryKeyedStore;
use crate::workflows::{
    ReconciliationSweep, ReportStore, ReportWorkflow, SweepReport, TaskProgressWorkflow, TaskStore,
    WorkflowError,
};

/// Trigger id of the nightly reconciliation sweep.
pub const CHECK_DAILY_REPORT: &str = "check_daily_report";
/// Trigger id of the nightly task-progress run.
pub const DAILY_GENERATION: &str = "daily_generation";

#[derive(Debug, thiserror::Error)]
pub enum StartError {
    #[error(transparent)]
    Jobs(#[from] JobError),
    #[error(transparent)]
    Cron(#[from] CronError),
}

/// Storage the pipeline runs against.
#[derive(Clone)]
pub struct Backends {
    pub reports: ReportStore,
    pub tasks: TaskStore,
    pub completion_log: Arc<dyn CompletionLog>,
}

impl Backends {
    /// In-memory stores (tests/dev).
    pub fn in_memory() -> Self {
        Self {
            reports: Arc::new(InMemoryKeyedStore::<ReportRecord>::new()),
            tasks: Arc::new(InMemoryKeyedStore::<PeriodTask>::new()),
            completion_log: Arc::new(InMemoryCompletionLog::new()),
        }
    }
}

pub struct Services {
    config: ServiceConfig,
    backends: Backends,
    pool: Arc<WorkerPool>,
    delayed: Arc<DelayedJobSubmitter>,
    reports: Arc<ReportWorkflow>,
    progress: Arc<TaskProgressWorkflow>,
    sweep: Arc<ReconciliationSweep>,
    cron: CronDispatcher,
}

impl Services {
    pub fn start(config: ServiceConfig, completion: Arc<dyn CompletionService>) -> Result<Self, StartError> {
        Self::start_with(config, completion, Backends::in_memory())
    }

    pub fn start_with(
        config: ServiceConfig,
        completion: Arc<dyn CompletionService>,
        backends: Backends,
    ) -> Result<Self, StartError> {
        let pool = Arc::new(WorkerPool::new(WorkerPoolConfig::default().with_workers(config.workers)));
        let delayed = Arc::new(DelayedJobSubmitter::start(pool.clone())?);

        let client = Arc::new(CompletionClient::new(
            completion,
            backends.completion_log.clone(),
            config.retry_policy(),
        ));

        let reports = Arc::new(
            ReportWorkflow::new(
                backends.reports.clone(),
                backends.tasks.clone(),
                client.clone(),
                delayed.clone(),
            )
            .with_grace_delay(config.report_generate_delay)
            .with_exhausted_policy(config.exhausted_policy),
        );
        let progress = Arc::new(
            TaskProgressWorkflow::new(
                backends.tasks.clone(),
                backends.reports.clone(),
                client,
                delayed.clone(),
            )
            .with_stagger(config.sweep_stagger),
        );
        let sweep = Arc::new(
            ReconciliationSweep::new(backends.reports.clone(), reports.clone(), config.timezone)
                .with_stagger(config.sweep_stagger)
                .with_lookback_days(config.sweep_lookback_days),
        );

        pool.start(Arc::new(JobExecutor::new(reports.clone(), progress.clone())))?;

        let cron = CronDispatcher::start()?;
        let s = sweep.clone();
        cron.register(
            CHECK_DAILY_REPORT,
            TriggerSpec::DailyAt {
                time: config.check_report_time,
                timezone: config.timezone,
            },
            move || {
                s.run(Utc::now())?;
                Ok(())
            },
        )?;
        let p = progress.clone();
        cron.register(
            DAILY_GENERATION,
            TriggerSpec::DailyAt {
                time: config.daily_task_time,
                timezone: config.timezone,
            },
            move || {
                p.run_daily_task_generation(Utc::now())?;
                Ok(())
            },
        )?;

        info!(
            workers = config.workers,
            timezone = %config.timezone,
            exhausted_policy = ?config.exhausted_policy,
            "services started"
        );

        Ok(Self {
            config,
            backends,
            pool,
            delayed,
            reports,
            progress,
            sweep,
            cron,
        })
    }

    /// Reschedule generation for yesterday's unreviewed reports.
    pub fn run_reconciliation_sweep(&self) -> Result<SweepReport, WorkflowError> {
        self.sweep.run(Utc::now())
    }

    /// Schedule a progress job for each active task.
    pub fn run_daily_task_generation(&self) -> Result<usize, WorkflowError> {
        self.progress.run_daily_task_generation(Utc::now())
    }

    pub fn report_workflow(&self) -> &Arc<ReportWorkflow> {
        &self.reports
    }

    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    pub fn reports(&self) -> &ReportStore {
        &self.backends.reports
    }

    pub fn tasks(&self) -> &TaskStore {
        &self.backends.tasks
    }

    pub fn cron(&self) -> &CronDispatcher {
        &self.cron
    }

    pub fn pool_stats(&self) -> PoolStats {
        self.pool.stats()
    }

    pub fn pending_timers(&self) -> usize {
        self.delayed.pending()
    }

    /// Stop the cron thread, drop armed timers, then drain and join the workers.
    pub fn shutdown(&self) {
        self.cron.shutdown();
        self.delayed.shutdown();
        self.pool.shutdown();
        info!("services stopped");
    }
}
