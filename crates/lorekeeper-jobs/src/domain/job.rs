//! Job model: identifiers, kinds, units of work, handles and results.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use lorekeeper_core::ids::OwnerId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Unique job identifier. Never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(Uuid);

impl JobId {
    /// Generates a fresh, time-ordered id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Wraps an existing UUID (e.g. parsed from a request path).
    #[must_use]
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// The underlying UUID.
    #[must_use]
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// How a job's result is delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Delivery {
    /// A player is waiting; the result goes to the remove-on-read side-table.
    Interactive,
    /// Only side effects matter; the result is discarded once applied.
    Background,
}

/// Every kind of work the engine schedules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    /// A free-text player action awaiting a narrated reply.
    PlayerAction,
    /// The player ends the current encounter (e.g. flees).
    EndCombat,
    /// Flesh out a stubbed entity document.
    CreateEntity,
    /// Produce the stat block for an enemy.
    SynthesizeStatBlock,
    /// Start an encounter once its stat block exists.
    StartCombat,
    /// Summarize a resolved encounter and retire its record.
    SummarizeCombat,
    /// Refresh the owner's world summary.
    SyncWorldSummary,
}

impl JobKind {
    /// Stable snake-case name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            JobKind::PlayerAction => "player_action",
            JobKind::EndCombat => "end_combat",
            JobKind::CreateEntity => "create_entity",
            JobKind::SynthesizeStatBlock => "synthesize_stat_block",
            JobKind::StartCombat => "start_combat",
            JobKind::SummarizeCombat => "summarize_combat",
            JobKind::SyncWorldSummary => "sync_world_summary",
        }
    }

    /// Direct player actions are interactive; everything else is background.
    #[must_use]
    pub fn delivery(self) -> Delivery {
        match self {
            JobKind::PlayerAction | JobKind::EndCombat => Delivery::Interactive,
            _ => Delivery::Background,
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bounded retry with exponential backoff. `max_attempts` counts the first
/// attempt, so `1` means "never retry".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts allowed.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles for each one after.
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// A single attempt.
    #[must_use]
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::ZERO,
        }
    }

    /// Retries up to `max_attempts` total attempts.
    #[must_use]
    pub fn exponential(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Whether another attempt is allowed after `attempt` failed.
    #[must_use]
    pub fn allows_retry_after(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Delay before the attempt following `attempt` (1-based):
    /// `base_delay * 2^(attempt - 1)`.
    #[must_use]
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1_u32 << exponent)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::exponential(3, Duration::from_millis(500))
    }
}

/// What a caller hands the queue.
#[derive(Debug, Clone)]
pub struct UnitOfWork {
    /// The owner whose state this work touches.
    pub owner: OwnerId,
    /// What to do.
    pub kind: JobKind,
    /// Kind-specific parameters.
    pub payload: Value,
    /// Retry behaviour for retryable failures.
    pub retry: RetryPolicy,
}

impl UnitOfWork {
    /// A single-attempt unit of work.
    #[must_use]
    pub fn new(owner: OwnerId, kind: JobKind, payload: Value) -> Self {
        Self {
            owner,
            kind,
            payload,
            retry: RetryPolicy::none(),
        }
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// A submitted job.
#[derive(Debug, Clone)]
pub struct Job {
    /// Job identifier.
    pub id: JobId,
    /// Owner partition.
    pub owner: OwnerId,
    /// What to do.
    pub kind: JobKind,
    /// Kind-specific parameters.
    pub payload: Value,
    /// When it was submitted.
    pub submitted_at: DateTime<Utc>,
    /// 1-based attempt number.
    pub attempt: u32,
    /// Retry behaviour.
    pub retry: RetryPolicy,
}

impl Job {
    /// Materializes a unit of work as attempt 1 of a new job.
    #[must_use]
    pub fn from_work(work: UnitOfWork, submitted_at: DateTime<Utc>) -> Self {
        Self {
            id: JobId::new(),
            owner: work.owner,
            kind: work.kind,
            payload: work.payload,
            submitted_at,
            attempt: 1,
            retry: work.retry,
        }
    }

    /// The handle callers use to correlate results.
    #[must_use]
    pub fn handle(&self) -> JobHandle {
        JobHandle {
            id: self.id,
            owner: self.owner.clone(),
            kind: self.kind,
        }
    }

    /// Reads a string field from the payload.
    #[must_use]
    pub fn payload_str(&self, field: &str) -> Option<&str> {
        self.payload.get(field).and_then(Value::as_str)
    }
}

/// Correlates a caller with a submitted job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct JobHandle {
    /// Job identifier.
    pub id: JobId,
    /// Owner partition.
    pub owner: OwnerId,
    /// Job kind.
    pub kind: JobKind,
}

/// When a continuation may run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContinuationPolicy {
    /// Only if the predecessor succeeded; otherwise the continuation fails.
    OnSuccess,
    /// Whatever the predecessor's outcome.
    OnAnyOutcome,
}

impl ContinuationPolicy {
    /// Whether a predecessor outcome admits the continuation.
    #[must_use]
    pub fn admits(self, predecessor_succeeded: bool) -> bool {
        match self {
            ContinuationPolicy::OnSuccess => predecessor_succeeded,
            ContinuationPolicy::OnAnyOutcome => true,
        }
    }
}

/// Terminal result of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobResult {
    /// Success with the player-facing text.
    Done {
        /// Result text.
        text: String,
    },
    /// Failure with a bounded, user-safe message.
    Error {
        /// Error message.
        message: String,
    },
}

impl JobResult {
    /// Whether the job succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, JobResult::Done { .. })
    }
}

/// Answer to a poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollResult {
    /// Not terminal yet.
    Pending,
    /// Terminal; the side-table entry has been consumed.
    Ready(JobResult),
    /// Never submitted, already consumed, or a background job whose result
    /// was discarded.
    Unknown,
}

/// Where a non-terminal job currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStage {
    /// Waiting in the FIFO queue.
    Queued,
    /// Waiting for a schedule or retry delay to elapse.
    Delayed,
    /// Waiting for its predecessor to reach a terminal state.
    Parked,
    /// Being executed by a worker.
    Running,
}

/// Read-only view of a non-terminal job.
#[derive(Debug, Clone, Serialize)]
pub struct JobView {
    /// Job identifier.
    pub id: JobId,
    /// Owner partition.
    pub owner: OwnerId,
    /// Job kind.
    pub kind: JobKind,
    /// Kind-specific parameters.
    pub payload: Value,
    /// Current stage.
    pub stage: JobStage,
    /// Current attempt.
    pub attempt: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_per_attempt() {
        let policy = RetryPolicy::exponential(4, Duration::from_millis(100));

        assert_eq!(policy.backoff(1), Duration::from_millis(100));
        assert_eq!(policy.backoff(2), Duration::from_millis(200));
        assert_eq!(policy.backoff(3), Duration::from_millis(400));
    }

    #[test]
    fn test_retry_bound_counts_first_attempt() {
        let policy = RetryPolicy::exponential(3, Duration::from_millis(1));

        assert!(policy.allows_retry_after(1));
        assert!(policy.allows_retry_after(2));
        assert!(!policy.allows_retry_after(3));
        assert!(!RetryPolicy::none().allows_retry_after(1));
    }

    #[test]
    fn test_only_player_facing_kinds_are_interactive() {
        assert_eq!(JobKind::PlayerAction.delivery(), Delivery::Interactive);
        assert_eq!(JobKind::EndCombat.delivery(), Delivery::Interactive);
        assert_eq!(JobKind::CreateEntity.delivery(), Delivery::Background);
        assert_eq!(JobKind::SummarizeCombat.delivery(), Delivery::Background);
    }

    #[test]
    fn test_on_success_policy_rejects_failed_predecessor() {
        assert!(!ContinuationPolicy::OnSuccess.admits(false));
        assert!(ContinuationPolicy::OnSuccess.admits(true));
        assert!(ContinuationPolicy::OnAnyOutcome.admits(false));
    }

    #[test]
    fn test_job_result_serializes_with_status_tag() {
        let done = serde_json::to_value(JobResult::Done { text: "ok".into() }).unwrap();
        let error = serde_json::to_value(JobResult::Error {
            message: "bad".into(),
        })
        .unwrap();

        assert_eq!(done, serde_json::json!({"status": "done", "text": "ok"}));
        assert_eq!(error, serde_json::json!({"status": "error", "message": "bad"}));
    }
}
