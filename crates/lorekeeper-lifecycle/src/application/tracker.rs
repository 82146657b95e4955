//! In-process entity lifecycle tracker.
//!
//! Records live for the lifetime of the tracker instance, which is injected
//! wherever it is needed rather than held in a global. Terminal records are
//! evicted by [`EntityLifecycleTracker::evict_settled`].

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Duration;
use lorekeeper_core::clock::Clock;
use lorekeeper_core::error::GameError;
use lorekeeper_core::ids::{EntityId, EntityType, OwnerId};
use tracing::{debug, warn};

use crate::domain::status::{EntityStatus, Status};

type OwnerRecords = HashMap<EntityId, EntityStatus>;

/// Outcome of [`EntityLifecycleTracker::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// A new `pending` record was created.
    Registered,
    /// A record already exists with the given status; nothing changed.
    AlreadyTracked(Status),
}

/// Per-(owner, entity) creation status tracker.
pub struct EntityLifecycleTracker {
    clock: Arc<dyn Clock>,
    records: Mutex<HashMap<OwnerId, OwnerRecords>>,
}

impl std::fmt::Debug for EntityLifecycleTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityLifecycleTracker").finish_non_exhaustive()
    }
}

impl EntityLifecycleTracker {
    /// Creates an empty tracker.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            records: Mutex::new(HashMap::new()),
        }
    }

    // Every mutation is a single insert/update, so a poisoned map is still consistent.
    fn lock(&self) -> MutexGuard<'_, HashMap<OwnerId, OwnerRecords>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers `entity_id` as `pending`.
    ///
    /// A duplicate registration is rejected and logged, never an overwrite.
    /// The only exception is a record in `error`, which may be registered
    /// again so a failed entity can be retried.
    pub fn register(
        &self,
        owner: &OwnerId,
        entity_id: &EntityId,
        entity_type: EntityType,
    ) -> Registration {
        let now = self.clock.now();
        let mut records = self.lock();
        let owner_records = records.entry(owner.clone()).or_default();

        if let Some(existing) = owner_records.get(entity_id) {
            if existing.status != Status::Error {
                warn!(
                    owner = %owner,
                    entity_id = %entity_id,
                    status = ?existing.status,
                    "duplicate entity registration rejected"
                );
                return Registration::AlreadyTracked(existing.status);
            }
        }

        owner_records.insert(
            entity_id.clone(),
            EntityStatus::pending(owner.clone(), entity_id.clone(), entity_type, now),
        );
        debug!(owner = %owner, entity_id = %entity_id, %entity_type, "entity registered as pending");
        Registration::Registered
    }

    /// Moves a tracked entity to `status`.
    ///
    /// # Errors
    ///
    /// Returns `GameError::NotFound` if the entity was never registered and
    /// `GameError::Validation` if the transition would go backwards.
    pub fn update_status(
        &self,
        owner: &OwnerId,
        entity_id: &EntityId,
        status: Status,
        message: Option<String>,
    ) -> Result<(), GameError> {
        let now = self.clock.now();
        let mut records = self.lock();
        let record = records
            .get_mut(owner)
            .and_then(|owner_records| owner_records.get_mut(entity_id))
            .ok_or_else(|| GameError::not_found(owner, entity_id.as_str()))?;
        record.transition(status, message, now)?;
        debug!(owner = %owner, entity_id = %entity_id, ?status, "entity status updated");
        Ok(())
    }

    /// Returns the tracked status, if any.
    #[must_use]
    pub fn get_status(&self, owner: &OwnerId, entity_id: &EntityId) -> Option<EntityStatus> {
        self.lock()
            .get(owner)
            .and_then(|owner_records| owner_records.get(entity_id))
            .cloned()
    }

    /// Whether the entity's creation is still in flight. Untracked entities
    /// are not in flight.
    #[must_use]
    pub fn is_in_flight(&self, owner: &OwnerId, entity_id: &EntityId) -> bool {
        self.get_status(owner, entity_id)
            .is_some_and(|record| record.status.is_in_flight())
    }

    /// Whether the owner has any entity still being created.
    #[must_use]
    pub fn has_pending(&self, owner: &OwnerId) -> bool {
        self.lock().get(owner).is_some_and(|owner_records| {
            owner_records
                .values()
                .any(|record| record.status.is_in_flight())
        })
    }

    /// Lists the owner's in-flight entities, oldest first.
    #[must_use]
    pub fn list_pending(&self, owner: &OwnerId) -> Vec<EntityStatus> {
        let mut pending: Vec<EntityStatus> = self
            .lock()
            .get(owner)
            .map(|owner_records| {
                owner_records
                    .values()
                    .filter(|record| record.status.is_in_flight())
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        pending.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.entity_id.cmp(&b.entity_id))
        });
        pending
    }

    /// Drops terminal records that settled more than `older_than` ago.
    /// Returns how many were removed.
    pub fn evict_settled(&self, older_than: Duration) -> usize {
        let cutoff = self.clock.now() - older_than;
        let mut records = self.lock();
        let mut evicted = 0;
        for owner_records in records.values_mut() {
            let before = owner_records.len();
            owner_records.retain(|_, record| {
                !(record.status.is_terminal() && record.completed_at.is_some_and(|at| at <= cutoff))
            });
            evicted += before - owner_records.len();
        }
        records.retain(|_, owner_records| !owner_records.is_empty());
        if evicted > 0 {
            debug!(evicted, "evicted settled entity statuses");
        }
        evicted
    }

    /// Removes every record for `owner` (session teardown).
    pub fn forget_owner(&self, owner: &OwnerId) -> usize {
        self.lock()
            .remove(owner)
            .map_or(0, |owner_records| owner_records.len())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Duration;
    use lorekeeper_test_support::{FixedClock, fixed_now};

    use super::*;

    fn tracker() -> EntityLifecycleTracker {
        EntityLifecycleTracker::new(Arc::new(FixedClock(fixed_now())))
    }

    fn owner() -> OwnerId {
        OwnerId::new("player-1")
    }

    fn npc(id: &str) -> EntityId {
        EntityId::new(id)
    }

    #[test]
    fn test_register_creates_pending_record() {
        let tracker = tracker();

        let outcome = tracker.register(&owner(), &npc("npc_1"), EntityType::Npc);

        assert_eq!(outcome, Registration::Registered);
        let status = tracker.get_status(&owner(), &npc("npc_1")).unwrap();
        assert_eq!(status.status, Status::Pending);
        assert_eq!(status.created_at, fixed_now());
        assert!(tracker.has_pending(&owner()));
    }

    #[test]
    fn test_duplicate_register_is_rejected_not_overwritten() {
        let tracker = tracker();
        tracker.register(&owner(), &npc("npc_1"), EntityType::Npc);
        tracker
            .update_status(&owner(), &npc("npc_1"), Status::Checking, Some("working".into()))
            .unwrap();

        let outcome = tracker.register(&owner(), &npc("npc_1"), EntityType::Npc);

        assert_eq!(outcome, Registration::AlreadyTracked(Status::Checking));
        let status = tracker.get_status(&owner(), &npc("npc_1")).unwrap();
        assert_eq!(status.status, Status::Checking);
        assert_eq!(status.message.as_deref(), Some("working"));
    }

    #[test]
    fn test_errored_entity_may_be_registered_again() {
        let tracker = tracker();
        tracker.register(&owner(), &npc("npc_1"), EntityType::Npc);
        tracker
            .update_status(&owner(), &npc("npc_1"), Status::Error, None)
            .unwrap();

        let outcome = tracker.register(&owner(), &npc("npc_1"), EntityType::Npc);

        assert_eq!(outcome, Registration::Registered);
        assert!(tracker.is_in_flight(&owner(), &npc("npc_1")));
    }

    #[test]
    fn test_update_status_of_unknown_entity_is_not_found() {
        let tracker = tracker();

        let result = tracker.update_status(&owner(), &npc("npc_x"), Status::Complete, None);

        assert!(matches!(result, Err(GameError::NotFound { .. })));
    }

    #[test]
    fn test_complete_entities_are_not_pending() {
        let tracker = tracker();
        tracker.register(&owner(), &npc("npc_1"), EntityType::Npc);
        tracker.register(&owner(), &npc("npc_2"), EntityType::Npc);
        tracker
            .update_status(&owner(), &npc("npc_1"), Status::Complete, None)
            .unwrap();

        let pending = tracker.list_pending(&owner());

        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].entity_id, npc("npc_2"));
    }

    #[test]
    fn test_owners_are_partitioned() {
        let tracker = tracker();
        tracker.register(&owner(), &npc("npc_1"), EntityType::Npc);

        assert!(!tracker.has_pending(&OwnerId::new("player-2")));
        assert!(
            tracker
                .get_status(&OwnerId::new("player-2"), &npc("npc_1"))
                .is_none()
        );
    }

    #[test]
    fn test_evict_settled_drops_only_old_terminal_records() {
        let tracker = tracker();
        tracker.register(&owner(), &npc("npc_done"), EntityType::Npc);
        tracker.register(&owner(), &npc("npc_busy"), EntityType::Npc);
        tracker
            .update_status(&owner(), &npc("npc_done"), Status::Complete, None)
            .unwrap();

        let evicted = tracker.evict_settled(Duration::zero());

        assert_eq!(evicted, 1);
        assert!(tracker.get_status(&owner(), &npc("npc_done")).is_none());
        assert!(tracker.get_status(&owner(), &npc("npc_busy")).is_some());
    }

    #[test]
    fn test_forget_owner_tears_down_partition() {
        let tracker = tracker();
        tracker.register(&owner(), &npc("npc_1"), EntityType::Npc);
        tracker.register(&owner(), &npc("npc_2"), EntityType::Npc);

        assert_eq!(tracker.forget_owner(&owner()), 2);
        assert!(!tracker.has_pending(&owner()));
    }

    #[tokio::test]
    async fn test_concurrent_registrations_admit_exactly_one() {
        let tracker = Arc::new(tracker());
        let mut handles = Vec::new();
        for _ in 0..8 {
            let tracker = Arc::clone(&tracker);
            handles.push(tokio::spawn(async move {
                tracker.register(&owner(), &npc("npc_1"), EntityType::Npc)
            }));
        }

        let mut registered = 0;
        for handle in handles {
            if handle.await.unwrap() == Registration::Registered {
                registered += 1;
            }
        }

        assert_eq!(registered, 1);
    }
}
