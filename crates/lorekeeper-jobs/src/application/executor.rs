//! Executor port: what a worker does with a job.

use async_trait::async_trait;
use lorekeeper_core::error::GameError;

use crate::domain::job::Job;

/// Runs one attempt of a job end to end (render, complete, interpret, apply).
///
/// Any error returned here is caught at the job boundary and becomes the
/// job's error result (or a retry, if the job's policy allows it).
#[async_trait]
pub trait JobExecutor: Send + Sync {
    /// Executes `job`, returning the player-facing text on success.
    async fn execute(&self, job: &Job) -> Result<String, GameError>;
}
