//! Consistency validator: scan and remediate.

use std::collections::HashSet;
use std::sync::Arc;

use lorekeeper_core::error::GameError;
use lorekeeper_core::ids::{EntityId, EntityType, OwnerId};
use lorekeeper_core::store::DocumentStore;
use lorekeeper_interpreter::{Creation, CreationRequest, EntityCreator};
use serde_json::json;
use tracing::{info, instrument, warn};

use crate::domain::references::{DanglingReference, collect_references};

/// Detects and repairs dangling references in an owner's document graph.
pub struct ConsistencyValidator {
    store: Arc<dyn DocumentStore>,
    creator: Arc<EntityCreator>,
}

impl std::fmt::Debug for ConsistencyValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsistencyValidator").finish_non_exhaustive()
    }
}

impl ConsistencyValidator {
    /// Creates a validator over `store` that repairs through `creator`.
    #[must_use]
    pub fn new(store: Arc<dyn DocumentStore>, creator: Arc<EntityCreator>) -> Self {
        Self { store, creator }
    }

    /// Walks every document of `owner` and returns the references that do
    /// not resolve to an existing entity document, ordered by id.
    ///
    /// # Errors
    ///
    /// Returns a store error if the documents cannot be listed.
    #[instrument(skip(self), fields(owner = %owner))]
    pub async fn scan(&self, owner: &OwnerId) -> Result<Vec<DanglingReference>, GameError> {
        let documents = self.store.list(owner, "").await?;

        let existing: HashSet<&str> = documents
            .iter()
            .map(|(id, _)| id.as_str())
            .filter(|id| EntityType::of_reference(id).is_some())
            .collect();

        let index = collect_references(documents.iter().map(|(id, doc)| (id.as_str(), doc)));

        let dangling = index.dangling(|id| existing.contains(id.as_str()));
        for reference in &dangling {
            let err = GameError::Consistency(format!("{} is referenced but missing", reference.id));
            warn!(error = %err, locations = reference.locations.len(), "dangling reference");
        }
        info!(
            documents = documents.len(),
            references = index.len(),
            dangling = dangling.len(),
            "consistency scan complete"
        );
        Ok(dangling)
    }

    /// Schedules creation for every dangling reference. References already
    /// tracked by the lifecycle tracker are skipped, so overlapping runs
    /// never schedule the same entity twice. Returns how many were scheduled.
    ///
    /// # Errors
    ///
    /// Returns a store error from the scan or from writing a stub.
    #[instrument(skip(self), fields(owner = %owner))]
    pub async fn remediate(&self, owner: &OwnerId) -> Result<usize, GameError> {
        let mut scheduled = 0;
        for reference in self.scan(owner).await? {
            let name = reference
                .name_hint
                .clone()
                .unwrap_or_else(|| reference.id.display_name());
            let request = CreationRequest::minimal(
                reference.id.clone(),
                reference.entity_type,
                &name,
                json!({
                    "reason": "dangling reference",
                    "referencedBy": reference.locations,
                }),
            );
            if let Creation::Scheduled(_) = self.creator.create(owner, request).await? {
                scheduled += 1;
            }
        }
        info!(scheduled, "remediation scheduled");
        Ok(scheduled)
    }

    /// Whether `id` currently resolves for `owner`, consulting the lifecycle
    /// tracker first: an entity still being created is not ready yet.
    ///
    /// # Errors
    ///
    /// Returns a store error.
    pub async fn is_ready(&self, owner: &OwnerId, id: &EntityId) -> Result<bool, GameError> {
        if self.creator.tracker().is_in_flight(owner, id) {
            return Ok(false);
        }
        Ok(self.store.get(owner, id.as_str()).await?.is_some())
    }
}
