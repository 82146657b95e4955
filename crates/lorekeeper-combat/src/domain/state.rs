//! The combat encounter state machine.
//!
//! `NoCombat -> Active -> Ending -> Resolved`. A turn is applied to a copy of
//! the state, so a rejected turn never leaves a half-applied record behind.

use chrono::{DateTime, Utc};
use lorekeeper_core::error::GameError;
use lorekeeper_core::ids::OwnerId;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::stat_block::StatBlock;
use super::turn::{CombatTurn, is_severe};

/// Document id prefix for combat records.
pub const COMBAT_PREFIX: &str = "combat:";

/// Conditions at or beyond this count defeat the player.
pub const MAX_CONDITIONS: usize = 4;

/// Encounter phase. "No combat" is the absence of an active record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombatPhase {
    /// Turns are being exchanged.
    Active,
    /// An end condition fired; resolution is pending.
    Ending,
    /// Over. The record stays until its summary is written.
    Resolved,
}

/// How an encounter ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CombatOutcome {
    /// The player won.
    Victory,
    /// The player lost.
    Defeat,
    /// The player ended it externally (e.g. fled).
    Fled,
}

/// Per-owner encounter state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CombatState {
    /// Encounter id.
    pub combat_id: Uuid,
    /// Owning player.
    pub owner_id: OwnerId,
    /// The enemy's entity reference.
    pub enemy_ref: String,
    /// Player successes so far. Never negative.
    pub success_counter: u32,
    /// Ordered condition tags on the player.
    pub conditions: Vec<String>,
    /// Ordered narrative lines.
    pub turn_log: Vec<String>,
    /// True until the encounter resolves.
    pub active: bool,
    /// Current phase.
    pub phase: CombatPhase,
    /// Set once an end condition fires.
    #[serde(default)]
    pub outcome: Option<CombatOutcome>,
    /// When the encounter started.
    pub started_at: DateTime<Utc>,
    /// When it resolved.
    #[serde(default)]
    pub ended_at: Option<DateTime<Utc>>,
}

impl CombatState {
    /// A freshly started encounter.
    #[must_use]
    pub fn start(
        combat_id: Uuid,
        owner_id: OwnerId,
        enemy_ref: String,
        opening_text: String,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            combat_id,
            owner_id,
            enemy_ref,
            success_counter: 0,
            conditions: Vec::new(),
            turn_log: vec![opening_text],
            active: true,
            phase: CombatPhase::Active,
            outcome: None,
            started_at: now,
            ended_at: None,
        }
    }

    /// The document id this record is stored under.
    #[must_use]
    pub fn document_id(&self) -> String {
        Self::document_id_for(self.combat_id)
    }

    /// The document id for a combat record.
    #[must_use]
    pub fn document_id_for(combat_id: Uuid) -> String {
        format!("{COMBAT_PREFIX}{combat_id}")
    }

    /// Number of severe conditions.
    #[must_use]
    pub fn severe_conditions(&self) -> usize {
        self.conditions.iter().filter(|tag| is_severe(tag)).count()
    }

    fn ensure_active(&self) -> Result<(), GameError> {
        if self.phase == CombatPhase::Active && self.active {
            Ok(())
        } else {
            Err(GameError::Validation(format!(
                "combat {} is not active",
                self.combat_id
            )))
        }
    }

    /// Applies one turn and evaluates the end rules, returning the new state.
    ///
    /// The auto-end rules take precedence over the payload's explicit flags,
    /// victory first:
    /// - `success_counter >= required_successes` ends in victory, with the
    ///   counter clamped to the threshold;
    /// - any severe condition, or [`MAX_CONDITIONS`] conditions, ends in defeat;
    /// - otherwise `combatEnded: true` ends with the payload's victory flag.
    ///
    /// # Errors
    ///
    /// Returns `GameError::Validation` if the encounter is not active.
    pub fn apply_turn(&self, turn: &CombatTurn, stats: &StatBlock) -> Result<Self, GameError> {
        self.ensure_active()?;
        let mut next = self.clone();

        let line = turn.user_facing_text.trim();
        if !line.is_empty() {
            next.turn_log.push(line.to_owned());
        }
        if let Some(successes) = turn.current_enemy_successes {
            next.success_counter = u32::try_from(successes.max(0)).unwrap_or(u32::MAX);
        }
        if let Some(conditions) = &turn.player_conditions {
            next.conditions = conditions
                .iter()
                .map(|tag| tag.trim())
                .filter(|tag| !tag.is_empty())
                .map(str::to_owned)
                .collect();
        }

        if next.success_counter >= stats.required_successes {
            next.success_counter = stats.required_successes;
            next.end(CombatOutcome::Victory);
        } else if next.severe_conditions() >= 1 || next.conditions.len() >= MAX_CONDITIONS {
            next.end(CombatOutcome::Defeat);
        } else if turn.combat_ended == Some(true) {
            let outcome = if turn.player_victory == Some(true) {
                CombatOutcome::Victory
            } else {
                CombatOutcome::Defeat
            };
            next.end(outcome);
        }
        Ok(next)
    }

    /// Ends the encounter unconditionally, bypassing the counter rules.
    ///
    /// # Errors
    ///
    /// Returns `GameError::Validation` if the encounter is not active.
    pub fn force_end(&self, outcome: CombatOutcome, line: Option<&str>) -> Result<Self, GameError> {
        self.ensure_active()?;
        let mut next = self.clone();
        if let Some(line) = line.map(str::trim).filter(|line| !line.is_empty()) {
            next.turn_log.push(line.to_owned());
        }
        next.end(outcome);
        Ok(next)
    }

    fn end(&mut self, outcome: CombatOutcome) {
        self.phase = CombatPhase::Ending;
        self.outcome = Some(outcome);
    }

    /// Whether an end condition fired and resolution is due.
    #[must_use]
    pub fn is_ending(&self) -> bool {
        self.phase == CombatPhase::Ending
    }

    /// `Ending -> Resolved`: the record goes inactive.
    ///
    /// # Errors
    ///
    /// Returns `GameError::Validation` unless the encounter is ending.
    pub fn resolve(&mut self, now: DateTime<Utc>) -> Result<(), GameError> {
        if self.phase != CombatPhase::Ending {
            return Err(GameError::Validation(format!(
                "combat {} cannot resolve from {:?}",
                self.combat_id, self.phase
            )));
        }
        self.phase = CombatPhase::Resolved;
        self.active = false;
        self.ended_at = Some(now);
        Ok(())
    }

    /// Decodes a stored record.
    ///
    /// # Errors
    ///
    /// Returns `GameError::Infrastructure` if the document does not decode.
    pub fn from_document(document: Value) -> Result<Self, GameError> {
        serde_json::from_value(document)
            .map_err(|e| GameError::Infrastructure(format!("combat record decoding failed: {e}")))
    }

    /// Serializes for storage.
    ///
    /// # Errors
    ///
    /// Returns `GameError::Infrastructure` if serialization fails.
    pub fn to_document(&self) -> Result<Value, GameError> {
        serde_json::to_value(self)
            .map_err(|e| GameError::Infrastructure(format!("combat record encoding failed: {e}")))
    }
}
