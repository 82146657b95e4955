//! Shared application state and engine wiring.

use std::sync::Arc;
use std::time::Duration;

use lorekeeper_combat::CombatService;
use lorekeeper_consistency::ConsistencyValidator;
use lorekeeper_core::clock::Clock;
use lorekeeper_core::error::GameError;
use lorekeeper_core::notify::Notifier;
use lorekeeper_core::provider::{CompletionProvider, PromptRenderer};
use lorekeeper_core::store::DocumentStore;
use lorekeeper_interpreter::{EntityCreator, ResponseInterpreter};
use lorekeeper_jobs::{JobQueue, JobQueueConfig, JobSubmitter, RetryPolicy};
use lorekeeper_lifecycle::EntityLifecycleTracker;
use lorekeeper_pipeline::GamePipeline;

/// The collaborators the engine runs against.
#[derive(Clone)]
pub struct Collaborators {
    /// Document persistence.
    pub store: Arc<dyn DocumentStore>,
    /// Prompt templates.
    pub renderer: Arc<dyn PromptRenderer>,
    /// The language model.
    pub provider: Arc<dyn CompletionProvider>,
    /// Client push channel.
    pub notifier: Arc<dyn Notifier>,
    /// Time source.
    pub clock: Arc<dyn Clock>,
}

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// The job queue, with the pipeline attached.
    pub queue: JobQueue,
    /// Entity creation status.
    pub tracker: Arc<EntityLifecycleTracker>,
    /// Dangling-reference scan and repair.
    pub validator: Arc<ConsistencyValidator>,
    /// How long a poll waits for a result.
    pub poll_timeout: Duration,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("queue", &self.queue)
            .field("poll_timeout", &self.poll_timeout)
            .finish_non_exhaustive()
    }
}

impl AppState {
    /// Builds the engine over `collaborators` and starts the worker pool.
    ///
    /// # Errors
    ///
    /// Returns `GameError::Validation` if the pipeline cannot be attached to
    /// the queue.
    pub fn assemble(
        collaborators: Collaborators,
        queue_config: JobQueueConfig,
        creation_retry: RetryPolicy,
        poll_timeout: Duration,
    ) -> Result<Self, GameError> {
        let Collaborators {
            store,
            renderer,
            provider,
            notifier,
            clock,
        } = collaborators;

        let queue = JobQueue::new(queue_config, clock.clone());
        let jobs: Arc<dyn JobSubmitter> = Arc::new(queue.clone());
        let tracker = Arc::new(EntityLifecycleTracker::new(clock.clone()));

        let creator = Arc::new(
            EntityCreator::new(store.clone(), tracker.clone(), jobs.clone(), notifier.clone())
                .with_retry(creation_retry),
        );
        let combat = Arc::new(
            CombatService::new(store.clone(), jobs.clone(), notifier.clone(), clock.clone())
                .with_retry(creation_retry),
        );
        let interpreter = Arc::new(ResponseInterpreter::new(
            store.clone(),
            creator.clone(),
            combat.clone(),
            jobs,
        ));
        let validator = Arc::new(ConsistencyValidator::new(store.clone(), creator.clone()));
        let pipeline = GamePipeline::new(
            store,
            renderer,
            provider,
            interpreter,
            creator,
            combat,
            notifier,
            clock,
        );
        queue.attach_executor(Arc::new(pipeline))?;

        Ok(Self {
            queue,
            tracker,
            validator,
            poll_timeout,
        })
    }
}
