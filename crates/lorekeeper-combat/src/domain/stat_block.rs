//! Enemy stat blocks.

use lorekeeper_core::error::GameError;
use lorekeeper_core::ids::EntityId;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Lowest enemy level.
pub const MIN_LEVEL: u8 = 1;
/// Highest enemy level.
pub const MAX_LEVEL: u8 = 10;

/// Document id prefix for stored stat blocks.
pub const STATS_PREFIX: &str = "stats:";

/// Successes needed to defeat an enemy of `level`: `ceil(level / 2)`.
#[must_use]
pub fn required_successes(level: u8) -> u32 {
    u32::from(level.clamp(MIN_LEVEL, MAX_LEVEL)).div_ceil(2)
}

/// The numeric and narrative profile of a combat opponent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatBlock {
    /// The enemy reference this block belongs to.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Level in `[1, 10]`.
    pub level: u8,
    /// Always `ceil(level / 2)`.
    pub required_successes: u32,
    /// What the enemy is weak against.
    #[serde(default)]
    pub vulnerability: String,
    /// What happens to the player on a failed exchange.
    #[serde(default)]
    pub failure_consequence: String,
    /// Free-form descriptors.
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct StatBlockDraft {
    name: Option<String>,
    level: Option<Value>,
    vulnerability: Option<String>,
    failure_consequence: Option<String>,
    tags: Vec<String>,
}

impl StatBlock {
    /// The document id a stat block for `enemy_ref` is stored under.
    #[must_use]
    pub fn document_id(enemy_ref: &str) -> String {
        format!("{STATS_PREFIX}{enemy_ref}")
    }

    /// Builds a stat block from model output, clamping the level into range
    /// and deriving the required successes from it. The level may arrive as
    /// an integer, a float or a numeric string; anything else counts as 1.
    ///
    /// # Errors
    ///
    /// Returns `GameError::MalformedPayload` if `raw` is not an object of the
    /// expected shape.
    pub fn from_model(enemy_ref: &str, raw: &Value) -> Result<Self, GameError> {
        let draft: StatBlockDraft = serde_json::from_value(raw.clone())
            .map_err(|e| GameError::MalformedPayload(format!("stat block: {e}")))?;

        let level = draft
            .level
            .as_ref()
            .and_then(lenient_level)
            .unwrap_or(1)
            .clamp(i64::from(MIN_LEVEL), i64::from(MAX_LEVEL));
        let level = u8::try_from(level).unwrap_or(MIN_LEVEL);

        let name = draft
            .name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| EntityId::new(enemy_ref).display_name());

        Ok(Self {
            id: enemy_ref.to_owned(),
            name,
            level,
            required_successes: required_successes(level),
            vulnerability: draft.vulnerability.unwrap_or_default(),
            failure_consequence: draft.failure_consequence.unwrap_or_default(),
            tags: draft.tags,
        })
    }

    /// Decodes a stored stat block, re-deriving the threshold from the level
    /// so a hand-edited document cannot drift.
    ///
    /// # Errors
    ///
    /// Returns `GameError::Infrastructure` if the document does not decode.
    pub fn from_document(document: Value) -> Result<Self, GameError> {
        let mut block: Self = serde_json::from_value(document)
            .map_err(|e| GameError::Infrastructure(format!("stat block decoding failed: {e}")))?;
        block.level = block.level.clamp(MIN_LEVEL, MAX_LEVEL);
        block.required_successes = required_successes(block.level);
        Ok(block)
    }

    /// Serializes for storage.
    ///
    /// # Errors
    ///
    /// Returns `GameError::Infrastructure` if serialization fails.
    pub fn to_document(&self) -> Result<Value, GameError> {
        serde_json::to_value(self)
            .map_err(|e| GameError::Infrastructure(format!("stat block encoding failed: {e}")))
    }
}

/// Reads a model-supplied level, rounding floats and parsing strings.
#[allow(clippy::cast_possible_truncation)]
fn lenient_level(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number
            .as_i64()
            .or_else(|| number.as_f64().filter(|f| f.is_finite()).map(|f| f.round() as i64)),
        Value::String(text) => {
            let text = text.trim();
            text.parse::<i64>()
                .ok()
                .or_else(|| text.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f.round() as i64))
        }
        _ => None,
    }
}
