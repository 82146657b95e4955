//! Entity creation status and its transition rules.

use chrono::{DateTime, Utc};
use lorekeeper_core::error::GameError;
use lorekeeper_core::ids::{EntityId, EntityType, OwnerId};
use serde::Serialize;

/// Creation status of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// Registered; a creation job is queued.
    Pending,
    /// A worker is currently fleshing the entity out.
    Checking,
    /// The entity document is complete.
    Complete,
    /// Creation failed after all attempts.
    Error,
}

impl Status {
    /// Whether no further transition is allowed.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Status::Complete | Status::Error)
    }

    /// Whether the entity is still being created.
    #[must_use]
    pub fn is_in_flight(self) -> bool {
        matches!(self, Status::Pending | Status::Checking)
    }

    /// Transitions only move forward: `pending -> checking -> complete|error`,
    /// with `pending -> complete|error` allowed directly. Re-asserting the
    /// current in-flight state is accepted as a no-op.
    #[must_use]
    pub fn can_become(self, next: Status) -> bool {
        match (self, next) {
            (Status::Pending, _) => true,
            (Status::Checking, Status::Checking | Status::Complete | Status::Error) => true,
            _ => false,
        }
    }
}

/// Tracked creation status of one entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityStatus {
    /// Owning player/session.
    pub owner: OwnerId,
    /// The entity being created.
    pub entity_id: EntityId,
    /// Its type.
    pub entity_type: EntityType,
    /// Current status.
    pub status: Status,
    /// When it was registered.
    pub created_at: DateTime<Utc>,
    /// When it reached a terminal status.
    pub completed_at: Option<DateTime<Utc>>,
    /// Optional detail, e.g. the failure message.
    pub message: Option<String>,
}

impl EntityStatus {
    /// A fresh `pending` record.
    #[must_use]
    pub fn pending(
        owner: OwnerId,
        entity_id: EntityId,
        entity_type: EntityType,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            owner,
            entity_id,
            entity_type,
            status: Status::Pending,
            created_at: now,
            completed_at: None,
            message: None,
        }
    }

    /// Moves to `next`, stamping `completed_at` on terminal statuses.
    ///
    /// # Errors
    ///
    /// Returns `GameError::Validation` for a backwards or post-terminal transition.
    pub fn transition(
        &mut self,
        next: Status,
        message: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<(), GameError> {
        if !self.status.can_become(next) {
            return Err(GameError::Validation(format!(
                "entity {} cannot move from {:?} to {next:?}",
                self.entity_id, self.status
            )));
        }
        self.status = next;
        if message.is_some() {
            self.message = message;
        }
        if next.is_terminal() {
            self.completed_at = Some(now);
        }
        Ok(())
    }
}
