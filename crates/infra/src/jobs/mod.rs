//! Deferred execution: a worker pool, one-shot delay timers, and the executor
//! that maps job kinds onto workflows.
//!
//! ## Components
//!
//! - `ScheduledJob`: a typed job kind plus its due instant
//! - `WorkerPool`: fixed-size pool over an unbounded FIFO queue
//! - `DelayedJobSubmitter`: in-memory timers feeding the pool
//! - `JobExecutor`: pattern-matches job kinds to workflow calls

pub mod delayed;
pub mod executor;
pub mod pool;
pub mod types;

pub use delayed::{DelayedJobSubmitter, JobScheduler, RecordingScheduler};
pub use executor::JobExecutor;
pub use pool::{JobRunner, JobSink, PoolStats, WorkerPool, WorkerPoolConfig};
pub use types::{JobError, JobId, JobKind, ScheduledJob};
