//! Built-in prompt templates.

use lorekeeper_core::error::GameError;
use lorekeeper_core::provider::{PromptRenderer, PromptTemplate};
use lorekeeper_interpreter::{CLOSE_DELIMITER, OPEN_DELIMITER};
use serde_json::Value;

/// Renders each template as fixed instructions followed by the pretty-printed
/// JSON context. Fields a template cannot do without are checked first.
#[derive(Debug, Default, Clone, Copy)]
pub struct TemplatePromptRenderer;

fn required_fields(template: PromptTemplate) -> &'static [&'static str] {
    match template {
        PromptTemplate::DungeonMasterTurn => &["action"],
        PromptTemplate::CombatTurn => &["action", "enemy"],
        PromptTemplate::EntityCreation => &["entityId", "entityType"],
        PromptTemplate::StatBlock => &["enemyId"],
        PromptTemplate::CombatSummary => &["turnLog"],
        PromptTemplate::WorldSummary => &["entities"],
    }
}

fn instructions(template: PromptTemplate) -> String {
    match template {
        PromptTemplate::DungeonMasterTurn => format!(
            "You are the dungeon master of a text adventure. Narrate the outcome of the \
             player's action in the second person, in at most three paragraphs.\n\
             If the world changes, append a hidden block between {OPEN_DELIMITER} and \
             {CLOSE_DELIMITER} holding one JSON object with any of: \
             \"newEntities\" (objects with \"type\" of npc, location, quest, item or faction, \
             and a \"name\"), \"partialUpdates\" (entity id to a partial document) and \
             \"startCombat\" ({{\"enemyId\", \"openingText\"}}). Refer to entities by ids such \
             as npc_old_tom or loc_mill."
        ),
        PromptTemplate::CombatTurn => format!(
            "You are running one round of combat. Narrate the exchange briefly, then append \
             {OPEN_DELIMITER} {{\"userFacingText\", \"currentEnemySuccesses\", \
             \"playerConditions\", \"combatEnded\", \"playerVictory\"}} {CLOSE_DELIMITER}. \
             currentEnemySuccesses is the player's running total of successful exchanges; \
             playerConditions is the full list of conditions the player now suffers."
        ),
        PromptTemplate::EntityCreation => "Write the complete JSON document for this world \
             entity. Keep the given id, type and name; add a description and whatever fields \
             suit its type. Answer with the JSON object only."
            .to_owned(),
        PromptTemplate::StatBlock => "Write a combat stat block for this enemy as a JSON \
             object with \"name\", \"level\" (1 to 10), \"vulnerability\", \
             \"failureConsequence\" and \"tags\". Answer with the JSON object only."
            .to_owned(),
        PromptTemplate::CombatSummary => "Summarize this finished fight in two or three \
             sentences for the player's journal."
            .to_owned(),
        PromptTemplate::WorldSummary => "Summarize the state of this world in one paragraph \
             for the dungeon master's notes. Mention the most important people and places."
            .to_owned(),
    }
}

impl PromptRenderer for TemplatePromptRenderer {
    fn render(&self, template: PromptTemplate, context: &Value) -> Result<String, GameError> {
        for field in required_fields(template) {
            if context.get(field).is_none_or(Value::is_null) {
                return Err(GameError::Validation(format!(
                    "{} prompt needs `{field}`",
                    template.name()
                )));
            }
        }
        let context = serde_json::to_string_pretty(context)
            .map_err(|e| GameError::Infrastructure(format!("prompt context encoding failed: {e}")))?;
        Ok(format!("{}\n\nContext:\n{context}", instructions(template)))
    }
}
