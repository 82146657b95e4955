//! Notification channel port.

use serde_json::Value;

use crate::ids::OwnerId;

/// Event names pushed to clients.
pub mod events {
    /// A combat encounter became active.
    pub const COMBAT_STARTED: &str = "combat_started";
    /// A combat encounter resolved.
    pub const COMBAT_ENDED: &str = "combat_ended";
    /// A combat encounter could not be started.
    pub const COMBAT_START_FAILED: &str = "combat_start_failed";
    /// A background creation job fleshed out an entity.
    pub const ENTITY_CREATED: &str = "entity_created";
    /// A background creation job gave up on an entity.
    pub const ENTITY_FAILED: &str = "entity_failed";
    /// The world summary document was refreshed.
    pub const WORLD_SUMMARY_UPDATED: &str = "world_summary_updated";
}

/// Fire-and-forget push of state-change events. No delivery guarantee.
pub trait Notifier: Send + Sync {
    /// Publishes `event` for `owner`. Must not block or fail the caller.
    fn publish(&self, owner: &OwnerId, event: &str, payload: Value);
}
