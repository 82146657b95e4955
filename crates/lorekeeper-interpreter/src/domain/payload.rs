//! The structured payload contract, decoded into a closed tagged union.
//!
//! The discriminator is structural: `userFacingText` marks a combat turn;
//! `newEntities`, `partialUpdates` or `startCombat` mark world changes; a
//! `type` naming a known entity type marks a single entity document. Anything
//! else is a `MalformedPayload` error and nothing is applied.

use lorekeeper_combat::CombatTurn;
use lorekeeper_core::error::GameError;
use lorekeeper_core::ids::{EntityId, EntityType};
use serde::Deserialize;
use serde_json::{Map, Value};

/// A decoded structured block.
#[derive(Debug, Clone, PartialEq)]
pub enum StructuredPayload {
    /// New entities, partial updates and an optional combat start.
    WorldChanges(WorldChanges),
    /// A single complete entity document.
    Entity(EntityDocument),
    /// One combat round.
    CombatTurn(CombatTurn),
}

/// Creation-list payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WorldChanges {
    /// Entities to stub now and flesh out in the background.
    pub new_entities: Vec<NewEntity>,
    /// `(entity id, patch)` pairs, merge-patched in order.
    pub partial_updates: Vec<(EntityId, Value)>,
    /// Begin an encounter with this enemy.
    pub start_combat: Option<StartCombat>,
}

impl WorldChanges {
    /// Whether there is nothing to apply.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.new_entities.is_empty() && self.partial_updates.is_empty() && self.start_combat.is_none()
    }
}

/// One entry of `newEntities`.
#[derive(Debug, Clone, PartialEq)]
pub struct NewEntity {
    /// Id, taken from the payload or derived from the name.
    pub id: EntityId,
    /// Entity type.
    pub entity_type: EntityType,
    /// The stub document as the model wrote it, with `id` and `type` normalized.
    pub document: Value,
}

/// A complete entity document.
#[derive(Debug, Clone, PartialEq)]
pub struct EntityDocument {
    /// Entity type.
    pub entity_type: EntityType,
    /// Id if the document names one with the right prefix (or a name to derive it from).
    pub id: Option<EntityId>,
    /// The document, with `type` normalized.
    pub document: Value,
}

/// `startCombat` request.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartCombat {
    /// The enemy's entity reference.
    pub enemy_id: String,
    /// First line of the turn log.
    #[serde(default)]
    pub opening_text: String,
}

const WORLD_KEYS: [&str; 3] = ["newEntities", "partialUpdates", "startCombat"];

fn malformed(message: impl Into<String>) -> GameError {
    GameError::MalformedPayload(message.into())
}

impl StructuredPayload {
    /// Decodes block text.
    ///
    /// # Errors
    ///
    /// Returns `GameError::MalformedPayload` if the text is not JSON or does
    /// not match any known payload shape.
    pub fn decode(block: &str) -> Result<Self, GameError> {
        let value: Value =
            serde_json::from_str(block).map_err(|e| malformed(format!("invalid JSON: {e}")))?;
        Self::from_value(value)
    }

    /// Decodes an already-parsed block.
    ///
    /// # Errors
    ///
    /// Returns `GameError::MalformedPayload` for an unknown shape or type.
    pub fn from_value(value: Value) -> Result<Self, GameError> {
        let Value::Object(object) = value else {
            return Err(malformed("payload must be a JSON object"));
        };

        if object.contains_key("userFacingText") {
            let turn = serde_json::from_value(Value::Object(object))
                .map_err(|e| malformed(format!("combat turn: {e}")))?;
            return Ok(Self::CombatTurn(turn));
        }
        if WORLD_KEYS.iter().any(|key| object.contains_key(*key)) {
            return decode_world_changes(object).map(Self::WorldChanges);
        }
        if object.contains_key("type") {
            let (entity_type, id, document) = decode_entity(object)?;
            return Ok(Self::Entity(EntityDocument {
                entity_type,
                id,
                document,
            }));
        }
        Err(malformed("unrecognized payload shape"))
    }
}

fn decode_world_changes(mut object: Map<String, Value>) -> Result<WorldChanges, GameError> {
    let mut changes = WorldChanges::default();

    match object.remove("newEntities") {
        None | Some(Value::Null) => {}
        Some(Value::Array(items)) => {
            for item in items {
                let Value::Object(entity) = item else {
                    return Err(malformed("newEntities entries must be objects"));
                };
                let (entity_type, id, document) = decode_entity(entity)?;
                let id = id.ok_or_else(|| malformed("new entity needs an id or a name"))?;
                changes.new_entities.push(NewEntity {
                    id,
                    entity_type,
                    document,
                });
            }
        }
        Some(_) => return Err(malformed("newEntities must be an array")),
    }

    match object.remove("partialUpdates") {
        None | Some(Value::Null) => {}
        Some(Value::Object(updates)) => {
            for (id, patch) in updates {
                if EntityType::of_reference(&id).is_none() {
                    return Err(malformed(format!("partial update target {id:?} is not an entity id")));
                }
                if !patch.is_object() {
                    return Err(malformed(format!("partial update for {id} must be an object")));
                }
                changes.partial_updates.push((EntityId::new(id), patch));
            }
        }
        Some(_) => return Err(malformed("partialUpdates must be an object")),
    }

    match object.remove("startCombat") {
        None | Some(Value::Null) => {}
        Some(start) => {
            let start: StartCombat = serde_json::from_value(start)
                .map_err(|e| malformed(format!("startCombat: {e}")))?;
            if EntityType::of_reference(&start.enemy_id).is_none() {
                return Err(malformed(format!(
                    "startCombat enemy {:?} is not an entity id",
                    start.enemy_id
                )));
            }
            changes.start_combat = Some(start);
        }
    }

    Ok(changes)
}

/// Reads `type`, `id` and `name` from an entity object and normalizes them.
fn decode_entity(
    mut object: Map<String, Value>,
) -> Result<(EntityType, Option<EntityId>, Value), GameError> {
    let type_name = object
        .get("type")
        .and_then(Value::as_str)
        .ok_or_else(|| malformed("entity is missing a string type"))?;
    let entity_type = EntityType::parse(type_name)
        .ok_or_else(|| malformed(format!("unknown payload type {type_name:?}")))?;

    let named_id = object
        .get("id")
        .and_then(Value::as_str)
        .filter(|id| EntityType::of_reference(id) == Some(entity_type))
        .map(EntityId::new);
    let id = named_id.or_else(|| {
        object
            .get("name")
            .and_then(Value::as_str)
            .filter(|name| !name.trim().is_empty())
            .map(|name| EntityId::from_name(entity_type, name))
    });

    object.insert("type".into(), Value::String(entity_type.as_str().to_owned()));
    if let Some(id) = &id {
        object.insert("id".into(), Value::String(id.as_str().to_owned()));
    }
    Ok((entity_type, id, Value::Object(object)))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_user_facing_text_decodes_as_combat_turn() {
        let payload = StructuredPayload::decode(
            r#"{"userFacingText": "You strike.", "currentEnemySuccesses": 1}"#,
        )
        .unwrap();

        match payload {
            StructuredPayload::CombatTurn(turn) => {
                assert_eq!(turn.current_enemy_successes, Some(1));
            }
            other => panic!("expected combat turn, got {other:?}"),
        }
    }

    #[test]
    fn test_world_changes_normalize_ids_and_types() {
        let payload = StructuredPayload::from_value(json!({
            "newEntities": [
                {"type": "NPC", "name": "Old Tom", "home": "loc_mill"},
                {"type": "loc", "id": "loc_mill", "name": "The Mill"}
            ],
            "partialUpdates": {"npc_bess": {"mood": "wary"}},
            "startCombat": {"enemyId": "npc_troll", "openingText": "It charges."}
        }))
        .unwrap();

        let StructuredPayload::WorldChanges(changes) = payload else {
            panic!("expected world changes");
        };
        assert_eq!(changes.new_entities[0].id, EntityId::new("npc_old_tom"));
        assert_eq!(changes.new_entities[0].document["type"], "npc");
        assert_eq!(changes.new_entities[1].entity_type, EntityType::Location);
        assert_eq!(changes.partial_updates[0].0, EntityId::new("npc_bess"));
        assert_eq!(changes.start_combat.unwrap().enemy_id, "npc_troll");
    }

    #[test]
    fn test_mismatched_id_prefix_is_rederived_from_name() {
        let payload = StructuredPayload::from_value(json!({
            "newEntities": [{"type": "item", "id": "npc_sword", "name": "Rusty Sword"}]
        }))
        .unwrap();

        let StructuredPayload::WorldChanges(changes) = payload else {
            panic!("expected world changes");
        };
        assert_eq!(changes.new_entities[0].id, EntityId::new("item_rusty_sword"));
    }

    #[test]
    fn test_typed_document_decodes_as_entity() {
        let payload =
            StructuredPayload::from_value(json!({"type": "faction", "name": "Millers Guild"}))
                .unwrap();

        let StructuredPayload::Entity(entity) = payload else {
            panic!("expected entity");
        };
        assert_eq!(entity.entity_type, EntityType::Faction);
        assert_eq!(entity.id, Some(EntityId::new("faction_millers_guild")));
    }

    #[test]
    fn test_unknown_type_is_malformed() {
        let result = StructuredPayload::from_value(json!({"type": "weather", "name": "Rain"}));

        match result {
            Err(GameError::MalformedPayload(message)) => assert!(message.contains("weather")),
            other => panic!("expected malformed payload, got {other:?}"),
        }
    }

    #[test]
    fn test_truncated_json_is_malformed() {
        let result = StructuredPayload::decode(r#"{"partialUpdates": {"npc_a": {"mo"#);

        assert!(matches!(result, Err(GameError::MalformedPayload(_))));
    }

    #[test]
    fn test_unrecognized_shape_is_malformed() {
        assert!(StructuredPayload::from_value(json!({"weather": "rain"})).is_err());
        assert!(StructuredPayload::from_value(json!(["npc_a"])).is_err());
    }

    #[test]
    fn test_partial_update_on_internal_document_is_rejected() {
        let result = StructuredPayload::from_value(json!({
            "partialUpdates": {"combat:123": {"active": false}}
        }));

        assert!(matches!(result, Err(GameError::MalformedPayload(_))));
    }

    #[test]
    fn test_new_entity_without_id_or_name_is_rejected() {
        let result = StructuredPayload::from_value(json!({"newEntities": [{"type": "npc"}]}));

        assert!(matches!(result, Err(GameError::MalformedPayload(_))));
    }
}
