//! Lorekeeper: Combat bounded context.
//!
//! Stat blocks, the per-owner turn-based encounter state machine, and the
//! service that persists encounters and schedules their ancillary jobs
//! (stat-block synthesis, deferred start, post-combat summary).

pub mod application;
pub mod domain;

pub use application::service::{
    CombatService, CombatStart, SUMMARY_PREFIX, TurnReport, fallback_narrative,
};
pub use domain::stat_block::{STATS_PREFIX, StatBlock};
pub use domain::state::{COMBAT_PREFIX, CombatOutcome, CombatPhase, CombatState};
pub use domain::turn::{COMBAT_CONTINUES, CombatTurn};
