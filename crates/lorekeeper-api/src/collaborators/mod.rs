//! Production implementations of the engine's collaborator ports.

pub mod completion;
pub mod notifier;
pub mod prompts;

pub use completion::HttpCompletionProvider;
pub use notifier::TracingNotifier;
pub use prompts::TemplatePromptRenderer;
