//! Worker loop and pool supervision.
//!
//! A worker that hits a systemic failure logs it, sleeps for the configured
//! restart delay and resumes. A worker that dies anyway is replaced the next
//! time work is submitted or settled, since every wake-up tops the pool back
//! up to the configured size.

use std::sync::Arc;
use std::sync::atomic::Ordering;

use lorekeeper_core::error::GameError;
use tokio::runtime::Handle;
use tracing::{debug, error, info, warn};

use crate::application::executor::JobExecutor;
use crate::application::queue::Inner;
use crate::domain::job::Job;

/// Spawns workers until the pool is at its configured size.
pub(crate) fn ensure_workers(inner: &Arc<Inner>) {
    if inner.is_shut_down() || inner.executor().is_none() {
        return;
    }
    let Ok(runtime) = Handle::try_current() else {
        warn!("no async runtime available; workers not started");
        return;
    };
    loop {
        let running = inner.running_workers.load(Ordering::SeqCst);
        if running >= inner.config.workers {
            return;
        }
        if inner
            .running_workers
            .compare_exchange(running, running + 1, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            let worker = running + 1;
            runtime.spawn(run_worker(Arc::clone(inner), worker));
            info!(worker, "worker started");
        }
    }
}

struct WorkerGuard {
    inner: Arc<Inner>,
    worker: usize,
}

impl Drop for WorkerGuard {
    fn drop(&mut self) {
        self.inner.running_workers.fetch_sub(1, Ordering::SeqCst);
        if std::thread::panicking() {
            error!(worker = self.worker, "worker crashed");
        } else {
            debug!(worker = self.worker, "worker stopped");
        }
    }
}

async fn run_worker(inner: Arc<Inner>, worker: usize) {
    let _guard = WorkerGuard {
        inner: Arc::clone(&inner),
        worker,
    };
    while !inner.is_shut_down() {
        if let Err(err) = drain_one(&inner).await {
            error!(worker, error = %err, "worker loop failed; resuming after delay");
            tokio::time::sleep(inner.config.restart_delay).await;
        }
    }
}

async fn drain_one(inner: &Arc<Inner>) -> Result<(), GameError> {
    let executor = inner
        .executor()
        .ok_or_else(|| GameError::Infrastructure("no executor attached".into()))?;
    let Some(job) = inner.next_job().await else {
        return Ok(());
    };
    debug!(job_id = %job.id, owner = %job.owner, kind = %job.kind, attempt = job.attempt, "job started");
    let outcome = execute_at_boundary(executor, job.clone()).await;
    inner.complete(&job, outcome);
    Ok(())
}

/// Runs one job in its own task so a panic becomes an error result instead
/// of taking the worker down.
async fn execute_at_boundary(executor: Arc<dyn JobExecutor>, job: Job) -> Result<String, GameError> {
    let job_id = job.id;
    let task = tokio::spawn(async move { executor.execute(&job).await });
    match task.await {
        Ok(outcome) => outcome,
        Err(join_error) if join_error.is_panic() => {
            error!(%job_id, "job panicked");
            Err(GameError::Infrastructure("job panicked".into()))
        }
        Err(_) => Err(GameError::Infrastructure("job was cancelled".into())),
    }
}
