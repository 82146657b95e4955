//! Language-model collaborator ports: prompt rendering and completion.

use async_trait::async_trait;
use serde_json::Value;

use crate::error::GameError;

/// Prompt templates the pipeline asks the renderer for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptTemplate {
    /// A dungeon-master turn answering a free-text player action.
    DungeonMasterTurn,
    /// A combat round answering a player action during an encounter.
    CombatTurn,
    /// Fleshing out a stubbed world entity.
    EntityCreation,
    /// Synthesizing a combat stat block for an enemy.
    StatBlock,
    /// Summarizing a finished encounter from its turn log.
    CombatSummary,
    /// Re-summarizing the owner's world after changes.
    WorldSummary,
}

impl PromptTemplate {
    /// Stable template name, used for lookups and logging.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            PromptTemplate::DungeonMasterTurn => "dm_turn",
            PromptTemplate::CombatTurn => "combat_turn",
            PromptTemplate::EntityCreation => "entity_creation",
            PromptTemplate::StatBlock => "stat_block",
            PromptTemplate::CombatSummary => "combat_summary",
            PromptTemplate::WorldSummary => "world_summary",
        }
    }
}

/// Renders prompt text from a template and a JSON context.
pub trait PromptRenderer: Send + Sync {
    /// Renders `template` with `context`.
    ///
    /// # Errors
    ///
    /// Returns `GameError::Validation` if the context lacks required fields.
    fn render(&self, template: PromptTemplate, context: &Value) -> Result<String, GameError>;
}

/// The language-model completion call, treated as opaque.
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// Returns the model output text for `prompt`.
    ///
    /// # Errors
    ///
    /// Returns `GameError::TransientProvider` when the call fails.
    async fn complete(&self, prompt: &str) -> Result<String, GameError>;
}
