//! The combat-turn payload the model returns during an encounter.

use serde::{Deserialize, Serialize};

/// Narrative used when a combat turn cannot be interpreted and the model
/// produced no usable prose either.
pub const COMBAT_CONTINUES: &str = "The fight goes on. Neither side gives ground.";

/// One interpreted combat round.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CombatTurn {
    /// Narrative line shown to the player and appended to the turn log.
    pub user_facing_text: String,
    /// Explicit end flag.
    #[serde(default)]
    pub combat_ended: Option<bool>,
    /// Explicit victory flag; only consulted when the combat ends explicitly.
    #[serde(default)]
    pub player_victory: Option<bool>,
    /// Absolute success counter after this round. Negative values clamp to zero.
    #[serde(default)]
    pub current_enemy_successes: Option<i64>,
    /// Full condition list after this round, replacing the previous one.
    #[serde(default)]
    pub player_conditions: Option<Vec<String>>,
}

impl CombatTurn {
    /// A turn carrying only narrative.
    #[must_use]
    pub fn narrative(text: impl Into<String>) -> Self {
        Self {
            user_facing_text: text.into(),
            combat_ended: None,
            player_victory: None,
            current_enemy_successes: None,
            player_conditions: None,
        }
    }
}

/// Whether a condition tag is severe: one of its words, split on anything
/// that is not alphanumeric, equals `severe` ignoring case.
#[must_use]
pub fn is_severe(tag: &str) -> bool {
    tag.split(|c: char| !c.is_alphanumeric())
        .any(|word| word.eq_ignore_ascii_case("severe"))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_severe_matches_whole_words_only() {
        assert!(is_severe("severe"));
        assert!(is_severe("Severe Bleeding"));
        assert!(is_severe("wound:SEVERE"));
        assert!(!is_severe("persevered"));
        assert!(!is_severe("bruised"));
    }

    #[test]
    fn test_decodes_camel_case_with_optional_fields() {
        let turn: CombatTurn = serde_json::from_value(json!({
            "userFacingText": "You parry.",
            "currentEnemySuccesses": 2
        }))
        .unwrap();

        assert_eq!(turn.user_facing_text, "You parry.");
        assert_eq!(turn.current_enemy_successes, Some(2));
        assert_eq!(turn.combat_ended, None);
        assert_eq!(turn.player_conditions, None);
    }
}
