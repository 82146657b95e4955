//! The job queue: one logical FIFO drained by a self-healing worker pool.
//!
//! Shared state (queue, job table, result side-table, settled-outcome
//! memory) lives behind a single mutex owned by the queue instance and is
//! only touched through the methods below, never across an await point.
//!
//! A worker never picks a job whose owner already has a job running, so at
//! most one job mutates a given owner's state at a time. Jobs of other owners
//! are picked past a blocked one; within an owner FIFO order holds.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use lorekeeper_core::clock::Clock;
use lorekeeper_core::error::GameError;
use lorekeeper_core::ids::OwnerId;
use rand::Rng;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::application::executor::JobExecutor;
use crate::application::submitter::JobSubmitter;
use crate::application::worker;
use crate::domain::job::{
    ContinuationPolicy, Delivery, Job, JobHandle, JobId, JobResult, JobStage, JobView, PollResult,
    UnitOfWork,
};

/// Tuning for a [`JobQueue`].
#[derive(Debug, Clone)]
pub struct JobQueueConfig {
    /// Number of workers draining the queue.
    pub workers: usize,
    /// Upper bound on the length of a job's error message.
    pub max_error_len: usize,
    /// Pause before a worker loop resumes after a systemic failure.
    pub restart_delay: Duration,
    /// How many settled outcomes (and unread interactive results) to remember.
    pub settled_capacity: usize,
}

impl Default for JobQueueConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            max_error_len: 300,
            restart_delay: Duration::from_secs(1),
            settled_capacity: 1024,
        }
    }
}

struct Tracked {
    job: Job,
    stage: JobStage,
    continuations: Vec<(JobId, ContinuationPolicy)>,
}

impl Tracked {
    fn new(job: Job, stage: JobStage) -> Self {
        Self {
            job,
            stage,
            continuations: Vec::new(),
        }
    }
}

#[derive(Default)]
struct QueueState {
    queue: VecDeque<JobId>,
    busy_owners: HashSet<OwnerId>,
    tracked: HashMap<JobId, Tracked>,
    results: HashMap<JobId, JobResult>,
    settled: HashMap<JobId, bool>,
    settled_order: VecDeque<JobId>,
}

impl QueueState {
    fn enqueue(&mut self, id: JobId) {
        if let Some(tracked) = self.tracked.get_mut(&id) {
            tracked.stage = JobStage::Queued;
            self.queue.push_back(id);
        }
    }

    fn remember_settled(&mut self, id: JobId, succeeded: bool, capacity: usize) {
        self.settled.insert(id, succeeded);
        self.settled_order.push_back(id);
        while self.settled_order.len() > capacity {
            if let Some(oldest) = self.settled_order.pop_front() {
                self.settled.remove(&oldest);
                if self.results.remove(&oldest).is_some() {
                    debug!(job_id = %oldest, "unread job result evicted");
                }
            }
        }
    }
}

pub(crate) struct Inner {
    pub(crate) config: JobQueueConfig,
    clock: Arc<dyn Clock>,
    executor: RwLock<Option<Arc<dyn JobExecutor>>>,
    state: Mutex<QueueState>,
    work_available: Notify,
    settled: Notify,
    pub(crate) running_workers: AtomicUsize,
    shutdown: AtomicBool,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn executor(&self) -> Option<Arc<dyn JobExecutor>> {
        self.executor
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn is_shut_down(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    fn wake_workers(self: &Arc<Self>) {
        self.work_available.notify_waiters();
        worker::ensure_workers(self);
    }

    /// Removes the first queued job whose owner is idle and marks it running.
    fn take_runnable(&self) -> Option<Job> {
        let mut state = self.lock();
        let position = state.queue.iter().position(|id| {
            state
                .tracked
                .get(id)
                .is_some_and(|tracked| !state.busy_owners.contains(&tracked.job.owner))
        })?;
        let id = state.queue.remove(position)?;
        let tracked = state.tracked.get_mut(&id)?;
        tracked.stage = JobStage::Running;
        let job = tracked.job.clone();
        state.busy_owners.insert(job.owner.clone());
        Some(job)
    }

    /// Waits for a runnable job. Returns `None` once the queue shuts down.
    pub(crate) async fn next_job(&self) -> Option<Job> {
        loop {
            let notified = self.work_available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.is_shut_down() {
                return None;
            }
            if let Some(job) = self.take_runnable() {
                return Some(job);
            }
            notified.await;
        }
    }

    fn enqueue_after(self: &Arc<Self>, id: JobId, delay: Duration) {
        let inner = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let mut state = inner.lock();
                if state
                    .tracked
                    .get(&id)
                    .is_some_and(|tracked| tracked.stage == JobStage::Delayed)
                {
                    state.enqueue(id);
                }
            }
            inner.wake_workers();
        });
    }

    /// Records the outcome of one attempt: either re-schedules a retry or
    /// settles the job and releases its continuations.
    pub(crate) fn complete(self: &Arc<Self>, job: &Job, outcome: Result<String, GameError>) {
        let mut state = self.lock();
        state.busy_owners.remove(&job.owner);

        if let Err(err) = &outcome {
            if err.is_retryable() && job.retry.allows_retry_after(job.attempt) {
                let delay = jittered(job.retry.backoff(job.attempt));
                if let Some(tracked) = state.tracked.get_mut(&job.id) {
                    tracked.job.attempt = job.attempt + 1;
                    tracked.stage = JobStage::Delayed;
                }
                drop(state);
                warn!(
                    job_id = %job.id,
                    owner = %job.owner,
                    kind = %job.kind,
                    attempt = job.attempt,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    error = %err,
                    "job attempt failed; retrying"
                );
                self.enqueue_after(job.id, delay);
                self.wake_workers();
                return;
            }
        }

        let result = match outcome {
            Ok(text) => {
                info!(job_id = %job.id, owner = %job.owner, kind = %job.kind, attempt = job.attempt, "job succeeded");
                JobResult::Done { text }
            }
            Err(err) => {
                if job.attempt > 1 {
                    warn!(job_id = %job.id, owner = %job.owner, kind = %job.kind, attempts = job.attempt, error = %err, "job failed after exhausting retries");
                } else {
                    warn!(job_id = %job.id, owner = %job.owner, kind = %job.kind, error = %err, "job failed");
                }
                JobResult::Error {
                    message: err.user_message(self.config.max_error_len),
                }
            }
        };
        self.settle_locked(&mut state, job.id, result);
        drop(state);

        self.settled.notify_waiters();
        self.wake_workers();
    }

    /// Makes `id` terminal and resolves its continuations, cascading
    /// failures through continuations whose policy rejects the outcome.
    fn settle_locked(&self, state: &mut QueueState, id: JobId, result: JobResult) {
        let mut worklist = vec![(id, result)];
        while let Some((id, result)) = worklist.pop() {
            let Some(tracked) = state.tracked.remove(&id) else {
                continue;
            };
            let succeeded = result.is_success();
            if tracked.job.kind.delivery() == Delivery::Interactive {
                state.results.insert(id, result);
            }
            state.remember_settled(id, succeeded, self.config.settled_capacity);

            for (next, policy) in tracked.continuations {
                if policy.admits(succeeded) {
                    debug!(job_id = %next, predecessor = %id, "continuation released");
                    state.enqueue(next);
                } else {
                    debug!(job_id = %next, predecessor = %id, "continuation rejected");
                    worklist.push((
                        next,
                        JobResult::Error {
                            message: format!("predecessor job {id} did not succeed"),
                        },
                    ));
                }
            }
        }
    }
}

fn jittered(delay: Duration) -> Duration {
    let spread = u64::try_from(delay.as_millis() / 10).unwrap_or(u64::MAX);
    if spread == 0 {
        return delay;
    }
    delay + Duration::from_millis(rand::rng().random_range(0..=spread))
}

/// Handle to a job queue. Cheap to clone; all clones share one queue.
#[derive(Clone)]
pub struct JobQueue {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for JobQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobQueue")
            .field("config", &self.inner.config)
            .finish_non_exhaustive()
    }
}

impl JobQueue {
    /// Creates an idle queue. Nothing runs until an executor is attached.
    #[must_use]
    pub fn new(config: JobQueueConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                clock,
                executor: RwLock::new(None),
                state: Mutex::new(QueueState::default()),
                work_available: Notify::new(),
                settled: Notify::new(),
                running_workers: AtomicUsize::new(0),
                shutdown: AtomicBool::new(false),
            }),
        }
    }

    /// Attaches the executor and starts the worker pool. Jobs submitted
    /// before this call start running now.
    ///
    /// # Errors
    ///
    /// Returns `GameError::Validation` if an executor is already attached or
    /// the queue has been shut down.
    pub fn attach_executor(&self, executor: Arc<dyn JobExecutor>) -> Result<(), GameError> {
        if self.inner.is_shut_down() {
            return Err(GameError::Validation("job queue is shut down".into()));
        }
        {
            let mut slot = self
                .inner
                .executor
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            if slot.is_some() {
                return Err(GameError::Validation("executor already attached".into()));
            }
            *slot = Some(executor);
        }
        info!(workers = self.inner.config.workers, "job queue executor attached");
        self.inner.wake_workers();
        Ok(())
    }

    /// Stops the worker pool. Running jobs finish; idle workers exit; queued
    /// jobs stay pending. Drops the executor so the queue can be freed.
    pub fn shutdown(&self) {
        self.inner.shutdown.store(true, Ordering::Release);
        self.inner
            .executor
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.inner.work_available.notify_waiters();
        info!("job queue shut down");
    }

    /// Polls for a job's result. A terminal interactive result is removed
    /// from the side-table by this call.
    #[must_use]
    pub fn poll_result(&self, handle: &JobHandle) -> PollResult {
        self.poll(handle.id)
    }

    /// Same as [`JobQueue::poll_result`], by job id alone.
    #[must_use]
    pub fn poll(&self, id: JobId) -> PollResult {
        let mut state = self.inner.lock();
        if let Some(result) = state.results.remove(&id) {
            return PollResult::Ready(result);
        }
        if state.tracked.contains_key(&id) {
            PollResult::Pending
        } else {
            PollResult::Unknown
        }
    }

    /// Waits up to `timeout` for a result. On timeout returns `Pending`; the
    /// job keeps running and may still mutate state.
    pub async fn await_result(&self, handle: &JobHandle, timeout: Duration) -> PollResult {
        self.await_id(handle.id, timeout).await
    }

    /// Same as [`JobQueue::await_result`], by job id alone.
    pub async fn await_id(&self, id: JobId, timeout: Duration) -> PollResult {
        let wait = async {
            loop {
                let notified = self.inner.settled.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();
                match self.poll(id) {
                    PollResult::Pending => notified.await,
                    other => return other,
                }
            }
        };
        tokio::time::timeout(timeout, wait)
            .await
            .unwrap_or(PollResult::Pending)
    }

    /// Waits up to `timeout` until no job is queued, delayed, parked or
    /// running. Returns whether the queue went idle.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let wait = async {
            loop {
                let notified = self.inner.settled.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();
                if self.inner.lock().tracked.is_empty() {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(timeout, wait).await.is_ok()
    }

    /// Whether the job has reached a terminal state and, if it is still
    /// remembered, whether it succeeded.
    #[must_use]
    pub fn settled_outcome(&self, id: JobId) -> Option<bool> {
        self.inner.lock().settled.get(&id).copied()
    }

    /// Non-terminal jobs of `owner`, in submission order.
    #[must_use]
    pub fn pending_jobs(&self, owner: &OwnerId) -> Vec<JobView> {
        let state = self.inner.lock();
        let mut views: Vec<JobView> = state
            .tracked
            .values()
            .filter(|tracked| &tracked.job.owner == owner)
            .map(|tracked| JobView {
                id: tracked.job.id,
                owner: tracked.job.owner.clone(),
                kind: tracked.job.kind,
                payload: tracked.job.payload.clone(),
                stage: tracked.stage,
                attempt: tracked.job.attempt,
            })
            .collect();
        views.sort_by_key(|view| view.id);
        views
    }

    /// Number of workers currently alive.
    #[must_use]
    pub fn worker_count(&self) -> usize {
        self.inner.running_workers.load(Ordering::SeqCst)
    }
}

impl JobSubmitter for JobQueue {
    fn submit(&self, work: UnitOfWork) -> JobHandle {
        let job = Job::from_work(work, self.inner.clock.now());
        let handle = job.handle();
        {
            let mut state = self.inner.lock();
            state
                .tracked
                .insert(job.id, Tracked::new(job, JobStage::Queued));
            state.queue.push_back(handle.id);
        }
        info!(job_id = %handle.id, owner = %handle.owner, kind = %handle.kind, "job submitted");
        self.inner.wake_workers();
        handle
    }

    fn schedule(&self, work: UnitOfWork, after: Duration) -> JobHandle {
        let job = Job::from_work(work, self.inner.clock.now());
        let handle = job.handle();
        self.inner
            .lock()
            .tracked
            .insert(job.id, Tracked::new(job, JobStage::Delayed));
        info!(
            job_id = %handle.id,
            owner = %handle.owner,
            kind = %handle.kind,
            after_ms = u64::try_from(after.as_millis()).unwrap_or(u64::MAX),
            "job scheduled"
        );
        self.inner.enqueue_after(handle.id, after);
        handle
    }

    fn continue_with(
        &self,
        predecessor: &JobHandle,
        work: UnitOfWork,
        policy: ContinuationPolicy,
    ) -> JobHandle {
        let job = Job::from_work(work, self.inner.clock.now());
        let handle = job.handle();
        {
            let mut state = self.inner.lock();
            state
                .tracked
                .insert(job.id, Tracked::new(job, JobStage::Parked));

            if let Some(parent) = state.tracked.get_mut(&predecessor.id) {
                parent.continuations.push((handle.id, policy));
                info!(job_id = %handle.id, predecessor = %predecessor.id, kind = %handle.kind, ?policy, "continuation parked");
                return handle;
            }

            // The predecessor already settled (or was never known).
            match state.settled.get(&predecessor.id).copied() {
                Some(succeeded) if policy.admits(succeeded) => state.enqueue(handle.id),
                None if policy == ContinuationPolicy::OnAnyOutcome => state.enqueue(handle.id),
                _ => self.inner.settle_locked(
                    &mut state,
                    handle.id,
                    JobResult::Error {
                        message: format!("predecessor job {} did not succeed", predecessor.id),
                    },
                ),
            }
        }
        info!(job_id = %handle.id, predecessor = %predecessor.id, kind = %handle.kind, ?policy, "continuation resolved immediately");
        self.inner.settled.notify_waiters();
        self.inner.wake_workers();
        handle
    }
}
