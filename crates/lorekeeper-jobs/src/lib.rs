//! Lorekeeper: Job Queue & Scheduler bounded context.
//!
//! Accepts units of work, drains them through a bounded worker pool,
//! supports delayed and continuation scheduling, retries failed creation
//! work with exponential backoff, and correlates interactive results with
//! job handles through a remove-on-read side-table.

pub mod application;
pub mod domain;

pub use application::executor::JobExecutor;
pub use application::queue::{JobQueue, JobQueueConfig};
pub use application::submitter::JobSubmitter;
pub use domain::job::{
    ContinuationPolicy, Delivery, Job, JobHandle, JobId, JobKind, JobResult, JobStage, JobView,
    PollResult, RetryPolicy, UnitOfWork,
};
