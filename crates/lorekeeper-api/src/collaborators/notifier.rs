//! Notifier that emits events as structured log lines.

use lorekeeper_core::ids::OwnerId;
use lorekeeper_core::notify::Notifier;
use serde_json::Value;
use tracing::info;

/// Publishes every event as an `info!` record on the `lorekeeper::events`
/// target, where a log shipper or push gateway can pick it up.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn publish(&self, owner: &OwnerId, event: &str, payload: Value) {
        info!(target: "lorekeeper::events", owner = %owner, event, payload = %payload, "event published");
    }
}
