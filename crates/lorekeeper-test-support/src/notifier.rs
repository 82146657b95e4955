//! Recording notifier: captures published events for assertions.

use std::sync::Mutex;

use lorekeeper_core::ids::OwnerId;
use lorekeeper_core::notify::Notifier;
use serde_json::Value;

/// A notifier that records every published event in order.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    published: Mutex<Vec<(OwnerId, String, Value)>>,
}

impl RecordingNotifier {
    /// Creates an empty recorder.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a snapshot of all published events.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn published(&self) -> Vec<(OwnerId, String, Value)> {
        self.published.lock().unwrap().clone()
    }

    /// Returns just the event names, in publish order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn event_names(&self) -> Vec<String> {
        self.published
            .lock()
            .unwrap()
            .iter()
            .map(|(_, name, _)| name.clone())
            .collect()
    }
}

impl Notifier for RecordingNotifier {
    fn publish(&self, owner: &OwnerId, event: &str, payload: Value) {
        self.published
            .lock()
            .unwrap()
            .push((owner.clone(), event.to_owned(), payload));
    }
}
