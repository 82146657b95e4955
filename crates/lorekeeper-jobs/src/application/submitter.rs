//! Submission port used by contexts that schedule follow-up work.

use std::time::Duration;

use crate::domain::job::{ContinuationPolicy, JobHandle, UnitOfWork};

/// Non-blocking job submission. Implemented by [`crate::JobQueue`]; other
/// contexts depend on this trait so every side effect is an observable job.
pub trait JobSubmitter: Send + Sync {
    /// Enqueues `work` at the back of the FIFO queue.
    fn submit(&self, work: UnitOfWork) -> JobHandle;

    /// Enqueues `work` once `after` has elapsed.
    fn schedule(&self, work: UnitOfWork, after: Duration) -> JobHandle;

    /// Enqueues `work` strictly after `predecessor` reaches a terminal state,
    /// if `policy` admits its outcome. A rejected continuation still
    /// terminates, with an error result.
    fn continue_with(
        &self,
        predecessor: &JobHandle,
        work: UnitOfWork,
        policy: ContinuationPolicy,
    ) -> JobHandle;
}
