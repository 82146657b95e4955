//! Shared test fakes and utilities for the Lorekeeper engine.

mod clock;
mod notifier;
mod provider;
mod store;

pub use clock::{FixedClock, fixed_now};
pub use notifier::RecordingNotifier;
pub use provider::{EchoPromptRenderer, ScriptedCompletionProvider};
pub use store::FailingDocumentStore;
