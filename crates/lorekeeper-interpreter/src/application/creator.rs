//! The shared entity-creation path.
//!
//! Used by the interpreter for `newEntities` and by the consistency
//! validator for remediation: register with the lifecycle tracker (skip if
//! already in flight), persist the stub synchronously so references resolve
//! at once, then submit a retried background job to flesh it out. An entity
//! whose finished document already exists is merged into instead.

use std::sync::Arc;

use lorekeeper_core::error::GameError;
use lorekeeper_core::ids::{EntityId, EntityType, OwnerId};
use lorekeeper_core::notify::{Notifier, events};
use lorekeeper_core::store::DocumentStore;
use lorekeeper_jobs::{JobHandle, JobKind, JobSubmitter, RetryPolicy, UnitOfWork};
use lorekeeper_lifecycle::{EntityLifecycleTracker, Registration, Status};
use serde_json::{Map, Value, json};
use tracing::{debug, info, warn};

/// A request to create one entity.
#[derive(Debug, Clone, PartialEq)]
pub struct CreationRequest {
    /// The entity id.
    pub id: EntityId,
    /// Its type.
    pub entity_type: EntityType,
    /// Minimal document persisted immediately.
    pub stub: Value,
    /// Prompt context for the creation job.
    pub context: Value,
}

impl CreationRequest {
    /// A request whose stub carries just the id, type and name.
    #[must_use]
    pub fn minimal(id: EntityId, entity_type: EntityType, name: &str, context: Value) -> Self {
        let stub = json!({ "id": id.as_str(), "type": entity_type.as_str(), "name": name });
        Self {
            id,
            entity_type,
            stub,
            context,
        }
    }
}

/// Outcome of [`EntityCreator::create`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Creation {
    /// The stub was written and a creation job submitted.
    Scheduled(JobHandle),
    /// A finished document already existed; the request was merge-patched
    /// into it and no job was submitted.
    Merged,
    /// Creation is already tracked with this status; nothing changed.
    AlreadyTracked(Status),
}

impl Creation {
    /// The submitted creation job, if one was scheduled.
    #[must_use]
    pub fn job(&self) -> Option<&JobHandle> {
        match self {
            Creation::Scheduled(handle) => Some(handle),
            Creation::Merged | Creation::AlreadyTracked(_) => None,
        }
    }
}

/// Creates entities through the tracker, the store and the job queue.
pub struct EntityCreator {
    store: Arc<dyn DocumentStore>,
    tracker: Arc<EntityLifecycleTracker>,
    jobs: Arc<dyn JobSubmitter>,
    notifier: Arc<dyn Notifier>,
    retry: RetryPolicy,
}

impl std::fmt::Debug for EntityCreator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityCreator")
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl EntityCreator {
    /// Creates the creation path with the default retry policy.
    #[must_use]
    pub fn new(
        store: Arc<dyn DocumentStore>,
        tracker: Arc<EntityLifecycleTracker>,
        jobs: Arc<dyn JobSubmitter>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            tracker,
            jobs,
            notifier,
            retry: RetryPolicy::default(),
        }
    }

    /// Overrides the retry policy of creation jobs.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// The lifecycle tracker this path registers with.
    #[must_use]
    pub fn tracker(&self) -> &EntityLifecycleTracker {
        &self.tracker
    }

    /// Registers, stubs and schedules creation of one entity.
    ///
    /// An entity still being created is left alone. One whose finished
    /// document already exists (the tracker may have evicted it, or it was
    /// written directly) gets the request merged in as a partial update, with
    /// no stub flag and no job. A leftover stub without a live creation is
    /// created again.
    ///
    /// # Errors
    ///
    /// Returns a store error if the existing document cannot be read or the
    /// request cannot be written; a freshly registered entity is then marked
    /// `error` so a later attempt may register it again.
    pub async fn create(
        &self,
        owner: &OwnerId,
        request: CreationRequest,
    ) -> Result<Creation, GameError> {
        let CreationRequest {
            id,
            entity_type,
            stub,
            context,
        } = request;

        let registered = match self.tracker.register(owner, &id, entity_type) {
            Registration::Registered => true,
            Registration::AlreadyTracked(status) if status.is_in_flight() => {
                debug!(owner = %owner, entity_id = %id, ?status, "creation skipped; already in flight");
                return Ok(Creation::AlreadyTracked(status));
            }
            Registration::AlreadyTracked(_) => false,
        };

        let existing = match self.store.get(owner, id.as_str()).await {
            Ok(existing) => existing,
            Err(err) => return Err(self.abandon(owner, &id, registered, err)),
        };

        if existing.as_ref().is_some_and(|doc| !is_stub(doc)) {
            let mut patch = normalized(stub, &id, entity_type);
            patch.remove("stub");
            if let Err(err) = self
                .store
                .merge_patch(owner, id.as_str(), &Value::Object(patch))
                .await
            {
                return Err(self.abandon(owner, &id, registered, err));
            }
            if registered {
                self.mark(owner, &id, Status::Complete, None);
            }
            info!(owner = %owner, entity_id = %id, "entity already exists; merged as update");
            return Ok(Creation::Merged);
        }

        if !registered {
            debug!(owner = %owner, entity_id = %id, "creation skipped; already tracked");
            return Ok(Creation::AlreadyTracked(Status::Complete));
        }

        let mut stub = normalized(stub, &id, entity_type);
        stub.insert("stub".into(), Value::Bool(true));

        if let Err(err) = self
            .store
            .merge_patch(owner, id.as_str(), &Value::Object(stub))
            .await
        {
            return Err(self.abandon(owner, &id, true, err));
        }

        let handle = self.jobs.submit(
            UnitOfWork::new(
                owner.clone(),
                JobKind::CreateEntity,
                json!({
                    "entityId": id.as_str(),
                    "entityType": entity_type.as_str(),
                    "context": context,
                }),
            )
            .with_retry(self.retry),
        );
        info!(owner = %owner, entity_id = %id, %entity_type, job_id = %handle.id, "entity stubbed; creation scheduled");
        Ok(Creation::Scheduled(handle))
    }

    /// Marks a creation job as running.
    pub fn begin(&self, owner: &OwnerId, id: &EntityId) {
        self.mark(owner, id, Status::Checking, None);
    }

    /// Merges the fleshed-out document over the stub, marks the entity
    /// `complete` and publishes `entity_created`.
    ///
    /// # Errors
    ///
    /// Returns a store error if the merge fails.
    pub async fn complete(
        &self,
        owner: &OwnerId,
        id: &EntityId,
        entity_type: EntityType,
        document: &Value,
    ) -> Result<Value, GameError> {
        let mut patch = normalized(document.clone(), id, entity_type);
        patch.insert("stub".into(), Value::Bool(false));

        let merged = self
            .store
            .merge_patch(owner, id.as_str(), &Value::Object(patch))
            .await?;
        self.mark(owner, id, Status::Complete, None);
        info!(owner = %owner, entity_id = %id, "entity created");
        self.notifier.publish(
            owner,
            events::ENTITY_CREATED,
            json!({ "entityId": id.as_str(), "entityType": entity_type.as_str() }),
        );
        Ok(merged)
    }

    /// Marks the entity `error` and publishes `entity_failed`. Logged, not
    /// escalated.
    pub fn fail(&self, owner: &OwnerId, id: &EntityId, message: &str) {
        warn!(owner = %owner, entity_id = %id, error = message, "entity creation failed");
        self.mark(owner, id, Status::Error, Some(message.to_owned()));
        self.notifier.publish(
            owner,
            events::ENTITY_FAILED,
            json!({ "entityId": id.as_str(), "message": message }),
        );
    }

    fn abandon(&self, owner: &OwnerId, id: &EntityId, registered: bool, err: GameError) -> GameError {
        if registered {
            self.mark(owner, id, Status::Error, Some(err.to_string()));
        }
        err
    }

    fn mark(&self, owner: &OwnerId, id: &EntityId, status: Status, message: Option<String>) {
        if let Err(err) = self.tracker.update_status(owner, id, status, message) {
            debug!(owner = %owner, entity_id = %id, ?status, error = %err, "lifecycle update skipped");
        }
    }
}

fn is_stub(document: &Value) -> bool {
    document.get("stub").and_then(Value::as_bool) == Some(true)
}

/// The document as an object with `id` and `type` set for `id`.
fn normalized(document: Value, id: &EntityId, entity_type: EntityType) -> Map<String, Value> {
    let mut map = match document {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    map.insert("id".into(), Value::String(id.as_str().to_owned()));
    map.insert("type".into(), Value::String(entity_type.as_str().to_owned()));
    map
}
