//! Prompt contexts for each job kind.
//!
//! Pure functions from stored state to the JSON context handed to the prompt
//! renderer. Nothing here touches the store or the provider.

use lorekeeper_combat::{CombatOutcome, CombatState, StatBlock};
use lorekeeper_core::error::truncate_message;
use lorekeeper_core::ids::{EntityId, EntityType};
use serde_json::{Value, json};

/// Document id of the owner's world summary.
pub const WORLD_SUMMARY_ID: &str = "world:summary";

/// How many recent turn-log lines a combat prompt carries.
const RECENT_TURNS: usize = 6;

/// Upper bound on an entity description inside the world-summary prompt.
const DESCRIPTION_EXCERPT_LEN: usize = 200;

/// Context for a dungeon-master turn.
#[must_use]
pub fn player_turn(action: &str, world_summary: Option<&Value>) -> Value {
    let summary = world_summary
        .and_then(|doc| doc.get("summary"))
        .and_then(Value::as_str)
        .unwrap_or_default();
    json!({
        "action": action,
        "worldSummary": summary,
    })
}

/// Context for a combat round. `stats` is absent when the stat block has
/// gone missing; the turn is still narrated but will not be applied.
#[must_use]
pub fn combat_turn(action: &str, state: &CombatState, stats: Option<&StatBlock>) -> Value {
    let skip = state.turn_log.len().saturating_sub(RECENT_TURNS);
    let enemy = match stats {
        Some(stats) => json!({
            "id": stats.id,
            "name": stats.name,
            "level": stats.level,
            "vulnerability": stats.vulnerability,
            "failureConsequence": stats.failure_consequence,
        }),
        None => json!({ "id": state.enemy_ref }),
    };
    json!({
        "action": action,
        "combatId": state.combat_id,
        "enemy": enemy,
        "successCounter": state.success_counter,
        "requiredSuccesses": stats.map(|stats| stats.required_successes),
        "conditions": state.conditions,
        "recentTurns": &state.turn_log[skip..],
    })
}

/// Context for fleshing out a stubbed entity.
#[must_use]
pub fn entity_creation(
    id: &EntityId,
    entity_type: EntityType,
    stub: Option<&Value>,
    context: &Value,
) -> Value {
    json!({
        "entityId": id.as_str(),
        "entityType": entity_type.as_str(),
        "stub": stub.cloned().unwrap_or(Value::Null),
        "context": context,
    })
}

/// Context for synthesizing an enemy's stat block.
#[must_use]
pub fn stat_block(enemy_ref: &str, enemy: Option<&Value>) -> Value {
    let name = enemy
        .and_then(|doc| doc.get("name"))
        .and_then(Value::as_str)
        .map_or_else(|| EntityId::new(enemy_ref).display_name(), str::to_owned);
    json!({
        "enemyId": enemy_ref,
        "name": name,
        "document": enemy.cloned().unwrap_or(Value::Null),
    })
}

/// Context for summarizing a resolved encounter.
#[must_use]
pub fn combat_summary(state: &CombatState) -> Value {
    json!({
        "combatId": state.combat_id,
        "enemyId": state.enemy_ref,
        "outcome": state.outcome,
        "conditions": state.conditions,
        "turnLog": state.turn_log,
    })
}

/// Summary stored when the model never produced one.
#[must_use]
pub fn fallback_combat_summary(state: &CombatState) -> String {
    let enemy = EntityId::new(state.enemy_ref.as_str()).display_name();
    let ending = match state.outcome {
        Some(CombatOutcome::Victory) => "ended in victory",
        Some(CombatOutcome::Defeat) => "ended in defeat",
        Some(CombatOutcome::Fled) => "ended when the player fled",
        None => "ended",
    };
    format!(
        "The fight with {enemy} {ending} after {} turns.",
        state.turn_log.len()
    )
}

/// Context for re-summarizing the owner's world from its entity documents.
#[must_use]
pub fn world_summary(entities: &[(String, Value)]) -> Value {
    let listed: Vec<Value> = entities
        .iter()
        .map(|(id, doc)| {
            let description = doc
                .get("description")
                .and_then(Value::as_str)
                .map(|text| truncate_message(text, DESCRIPTION_EXCERPT_LEN));
            json!({
                "id": id,
                "type": doc.get("type").cloned().unwrap_or(Value::Null),
                "name": doc.get("name").cloned().unwrap_or(Value::Null),
                "description": description,
            })
        })
        .collect();
    json!({
        "entityCount": listed.len(),
        "entities": listed,
    })
}
