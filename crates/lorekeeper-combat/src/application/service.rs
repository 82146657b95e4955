//! Combat service: loads and persists encounters, applies turns, and
//! schedules the encounter's ancillary jobs through the job queue.

use std::sync::Arc;

use lorekeeper_core::clock::Clock;
use lorekeeper_core::error::GameError;
use lorekeeper_core::ids::OwnerId;
use lorekeeper_core::notify::{Notifier, events};
use lorekeeper_core::store::DocumentStore;
use lorekeeper_jobs::{ContinuationPolicy, JobHandle, JobKind, JobSubmitter, RetryPolicy, UnitOfWork};
use serde_json::{Value, json};
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::stat_block::StatBlock;
use crate::domain::state::{COMBAT_PREFIX, CombatOutcome, CombatState};
use crate::domain::turn::{COMBAT_CONTINUES, CombatTurn};

/// Document id prefix for post-combat summaries.
pub const SUMMARY_PREFIX: &str = "summary:combat:";

/// Result of [`CombatService::request_start`].
#[derive(Debug, Clone)]
pub enum CombatStart {
    /// The stat block existed; the encounter is active now.
    Started(CombatState),
    /// The stat block is being synthesized; a continuation starts the
    /// encounter once that job reaches a terminal state.
    Deferred {
        /// The stat-block synthesis job.
        stat_block_job: JobHandle,
        /// The continuation that starts combat.
        start_job: JobHandle,
    },
}

/// What a combat turn produced for the player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnReport {
    /// Text to show the player.
    pub narrative: String,
    /// Whether the encounter record was updated.
    pub applied: bool,
    /// Set when this turn resolved the encounter.
    pub outcome: Option<CombatOutcome>,
}

impl TurnReport {
    fn unapplied(narrative: String) -> Self {
        Self {
            narrative,
            applied: false,
            outcome: None,
        }
    }
}

/// Narrative for a combat turn whose payload could not be interpreted:
/// the model's prose if there is any, otherwise a canned line.
#[must_use]
pub fn fallback_narrative(narrative: &str) -> String {
    let narrative = narrative.trim();
    if narrative.is_empty() {
        COMBAT_CONTINUES.to_owned()
    } else {
        narrative.to_owned()
    }
}

/// Orchestrates the combat state machine against the document store.
pub struct CombatService {
    store: Arc<dyn DocumentStore>,
    jobs: Arc<dyn JobSubmitter>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    retry: RetryPolicy,
}

impl std::fmt::Debug for CombatService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CombatService")
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl CombatService {
    /// Creates a service. Its model-backed jobs use the default retry policy.
    #[must_use]
    pub fn new(
        store: Arc<dyn DocumentStore>,
        jobs: Arc<dyn JobSubmitter>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            jobs,
            notifier,
            clock,
            retry: RetryPolicy::default(),
        }
    }

    /// Overrides the retry policy for stat-block synthesis and combat
    /// summary jobs.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// The owner's active encounter, if any.
    ///
    /// # Errors
    ///
    /// Returns `GameError::Infrastructure` if the store fails or a record
    /// does not decode.
    pub async fn active_combat(&self, owner: &OwnerId) -> Result<Option<CombatState>, GameError> {
        for (_, document) in self.store.list(owner, COMBAT_PREFIX).await? {
            let state = CombatState::from_document(document)?;
            if state.active {
                return Ok(Some(state));
            }
        }
        Ok(None)
    }

    /// Loads an encounter record by id.
    ///
    /// # Errors
    ///
    /// Returns `GameError::NotFound` if the record does not exist.
    pub async fn load_combat(&self, owner: &OwnerId, combat_id: Uuid) -> Result<CombatState, GameError> {
        let id = CombatState::document_id_for(combat_id);
        let document = self
            .store
            .get(owner, &id)
            .await?
            .ok_or_else(|| GameError::not_found(owner, id))?;
        CombatState::from_document(document)
    }

    /// Loads the stat block for `enemy_ref`. `Ok(None)` means it has not
    /// been synthesized yet.
    ///
    /// # Errors
    ///
    /// Returns `GameError::Infrastructure` if the store fails or the block
    /// does not decode.
    pub async fn load_stat_block(
        &self,
        owner: &OwnerId,
        enemy_ref: &str,
    ) -> Result<Option<StatBlock>, GameError> {
        self.store
            .get(owner, &StatBlock::document_id(enemy_ref))
            .await?
            .map(StatBlock::from_document)
            .transpose()
    }

    /// Builds a stat block from model output and stores it.
    ///
    /// # Errors
    ///
    /// Returns `GameError::MalformedPayload` for an unusable model document,
    /// or a store error.
    pub async fn store_stat_block(
        &self,
        owner: &OwnerId,
        enemy_ref: &str,
        raw: &Value,
    ) -> Result<StatBlock, GameError> {
        let block = StatBlock::from_model(enemy_ref, raw)?;
        self.store
            .put(owner, &StatBlock::document_id(enemy_ref), block.to_document()?)
            .await?;
        info!(owner = %owner, enemy_ref, level = block.level, "stat block stored");
        Ok(block)
    }

    /// Starts an encounter with `enemy_ref`, synthesizing its stat block
    /// first if needed.
    ///
    /// # Errors
    ///
    /// Returns `GameError::Validation` if the owner already has an active
    /// encounter, or a store error.
    pub async fn request_start(
        &self,
        owner: &OwnerId,
        enemy_ref: &str,
        opening_text: &str,
    ) -> Result<CombatStart, GameError> {
        self.ensure_no_active(owner).await?;

        if self.load_stat_block(owner, enemy_ref).await?.is_some() {
            return self
                .start(owner, enemy_ref, opening_text)
                .await
                .map(CombatStart::Started);
        }

        let stat_block_job = self.jobs.submit(
            UnitOfWork::new(
                owner.clone(),
                JobKind::SynthesizeStatBlock,
                json!({ "enemyId": enemy_ref }),
            )
            .with_retry(self.retry),
        );
        let start_job = self.jobs.continue_with(
            &stat_block_job,
            UnitOfWork::new(
                owner.clone(),
                JobKind::StartCombat,
                json!({ "enemyId": enemy_ref, "openingText": opening_text }),
            ),
            ContinuationPolicy::OnAnyOutcome,
        );
        info!(owner = %owner, enemy_ref, stat_block_job = %stat_block_job.id, "combat start deferred until stat block exists");
        Ok(CombatStart::Deferred {
            stat_block_job,
            start_job,
        })
    }

    /// `NoCombat -> Active`. Requires the stat block to exist; a missing one
    /// publishes `combat_start_failed`.
    ///
    /// # Errors
    ///
    /// Returns `GameError::Validation` if an encounter is already active,
    /// `GameError::NotFound` if the stat block is missing, or a store error.
    pub async fn start(
        &self,
        owner: &OwnerId,
        enemy_ref: &str,
        opening_text: &str,
    ) -> Result<CombatState, GameError> {
        self.ensure_no_active(owner).await?;

        if self.load_stat_block(owner, enemy_ref).await?.is_none() {
            warn!(owner = %owner, enemy_ref, "combat start failed: no stat block");
            self.notifier.publish(
                owner,
                events::COMBAT_START_FAILED,
                json!({ "enemyId": enemy_ref, "reason": "stat block unavailable" }),
            );
            return Err(GameError::not_found(owner, StatBlock::document_id(enemy_ref)));
        }

        let state = CombatState::start(
            Uuid::now_v7(),
            owner.clone(),
            enemy_ref.to_owned(),
            opening_text.to_owned(),
            self.clock.now(),
        );
        self.store
            .put(owner, &state.document_id(), state.to_document()?)
            .await?;
        info!(owner = %owner, combat_id = %state.combat_id, enemy_ref, "combat started");
        self.notifier.publish(
            owner,
            events::COMBAT_STARTED,
            json!({ "combatId": state.combat_id, "enemyId": enemy_ref }),
        );
        Ok(state)
    }

    async fn ensure_no_active(&self, owner: &OwnerId) -> Result<(), GameError> {
        match self.active_combat(owner).await? {
            Some(active) => Err(GameError::Validation(format!(
                "combat {} is already active",
                active.combat_id
            ))),
            None => Ok(()),
        }
    }

    /// Applies one interpreted turn to the owner's active encounter.
    ///
    /// Fail-soft: with no active encounter or no loadable stat block the
    /// narrative is still returned and nothing is written.
    ///
    /// # Errors
    ///
    /// Returns a store error from loading or persisting the encounter.
    pub async fn apply_turn(&self, owner: &OwnerId, turn: &CombatTurn) -> Result<TurnReport, GameError> {
        let narrative = fallback_narrative(&turn.user_facing_text);

        let Some(state) = self.active_combat(owner).await? else {
            warn!(owner = %owner, "combat turn without an active combat; narrative only");
            return Ok(TurnReport::unapplied(narrative));
        };

        let stats = match self.load_stat_block(owner, &state.enemy_ref).await {
            Ok(Some(stats)) => stats,
            Ok(None) => {
                warn!(owner = %owner, combat_id = %state.combat_id, enemy_ref = %state.enemy_ref, "stat block missing mid-combat; turn not applied");
                return Ok(TurnReport::unapplied(narrative));
            }
            Err(err) => {
                warn!(owner = %owner, combat_id = %state.combat_id, error = %err, "stat block unreadable mid-combat; turn not applied");
                return Ok(TurnReport::unapplied(narrative));
            }
        };

        let next = state.apply_turn(turn, &stats)?;
        if next.is_ending() {
            let outcome = self.resolve(next).await?;
            return Ok(TurnReport {
                narrative,
                applied: true,
                outcome: Some(outcome),
            });
        }

        self.store
            .put(owner, &next.document_id(), next.to_document()?)
            .await?;
        info!(owner = %owner, combat_id = %next.combat_id, successes = next.success_counter, conditions = next.conditions.len(), "combat turn applied");
        Ok(TurnReport {
            narrative,
            applied: true,
            outcome: None,
        })
    }

    /// Ends the owner's encounter from outside the turn loop (e.g. the
    /// player flees), bypassing the counter rules.
    ///
    /// # Errors
    ///
    /// Returns `GameError::Validation` if there is no active encounter, or a
    /// store error.
    pub async fn end_externally(&self, owner: &OwnerId, line: Option<&str>) -> Result<TurnReport, GameError> {
        let state = self
            .active_combat(owner)
            .await?
            .ok_or_else(|| GameError::Validation("no active combat to end".into()))?;
        let next = state.force_end(CombatOutcome::Fled, line)?;
        let narrative = next
            .turn_log
            .last()
            .cloned()
            .unwrap_or_else(|| COMBAT_CONTINUES.to_owned());
        let outcome = self.resolve(next).await?;
        Ok(TurnReport {
            narrative,
            applied: true,
            outcome: Some(outcome),
        })
    }

    /// `Ending -> Resolved`: persists the inactive record, notifies, and
    /// schedules the retried summary job. The record stays until that job
    /// settles.
    async fn resolve(&self, mut state: CombatState) -> Result<CombatOutcome, GameError> {
        state.resolve(self.clock.now())?;
        let outcome = state.outcome.unwrap_or(CombatOutcome::Defeat);
        let owner = state.owner_id.clone();
        self.store
            .put(&owner, &state.document_id(), state.to_document()?)
            .await?;
        info!(owner = %owner, combat_id = %state.combat_id, ?outcome, "combat resolved");
        self.notifier.publish(
            &owner,
            events::COMBAT_ENDED,
            json!({ "combatId": state.combat_id, "outcome": outcome }),
        );
        self.jobs.submit(
            UnitOfWork::new(
                owner,
                JobKind::SummarizeCombat,
                json!({ "combatId": state.combat_id }),
            )
            .with_retry(self.retry),
        );
        Ok(outcome)
    }

    /// Stores the post-combat summary and retires the encounter record.
    ///
    /// # Errors
    ///
    /// Returns `GameError::NotFound` if the record is gone, or a store error.
    pub async fn finish_summary(
        &self,
        owner: &OwnerId,
        combat_id: Uuid,
        summary: &str,
    ) -> Result<(), GameError> {
        let state = self.load_combat(owner, combat_id).await?;
        let document = json!({
            "combatId": state.combat_id,
            "enemyRef": state.enemy_ref,
            "outcome": state.outcome,
            "turns": state.turn_log.len(),
            "summary": summary.trim(),
            "endedAt": state.ended_at,
        });
        self.store
            .put(owner, &format!("{SUMMARY_PREFIX}{combat_id}"), document)
            .await?;
        self.store.delete(owner, &state.document_id()).await?;
        info!(owner = %owner, combat_id = %combat_id, "combat summarized and record retired");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use lorekeeper_core::store::DocumentStore;
    use lorekeeper_document_store::InMemoryDocumentStore;
    use lorekeeper_jobs::{JobQueue, JobQueueConfig, JobStage};
    use lorekeeper_test_support::{FailingDocumentStore, FixedClock, RecordingNotifier, fixed_now};

    use super::*;
    use crate::domain::state::CombatPhase;

    struct Harness {
        store: Arc<InMemoryDocumentStore>,
        queue: JobQueue,
        notifier: Arc<RecordingNotifier>,
        service: CombatService,
    }

    fn harness() -> Harness {
        let store = Arc::new(InMemoryDocumentStore::new());
        let clock = Arc::new(FixedClock(fixed_now()));
        let queue = JobQueue::new(JobQueueConfig::default(), clock.clone());
        let notifier = Arc::new(RecordingNotifier::new());
        let service = CombatService::new(
            store.clone(),
            Arc::new(queue.clone()),
            notifier.clone(),
            clock,
        );
        Harness {
            store,
            queue,
            notifier,
            service,
        }
    }

    fn owner() -> OwnerId {
        OwnerId::new("player-1")
    }

    async fn seed_troll(h: &Harness, level: i64) {
        h.service
            .store_stat_block(&owner(), "npc_troll", &json!({"name": "Troll", "level": level}))
            .await
            .unwrap();
    }

    fn successes(n: i64) -> CombatTurn {
        CombatTurn {
            current_enemy_successes: Some(n),
            ..CombatTurn::narrative(format!("Exchange {n}."))
        }
    }

    #[tokio::test]
    async fn test_request_start_with_stat_block_starts_immediately() {
        let h = harness();
        seed_troll(&h, 5).await;

        let start = h
            .service
            .request_start(&owner(), "npc_troll", "The troll roars.")
            .await
            .unwrap();

        assert!(matches!(start, CombatStart::Started(_)));
        let active = h.service.active_combat(&owner()).await.unwrap().unwrap();
        assert_eq!(active.turn_log, vec!["The troll roars.".to_owned()]);
        assert_eq!(h.notifier.event_names(), vec![events::COMBAT_STARTED]);
    }

    #[tokio::test]
    async fn test_request_start_without_stat_block_chains_continuation() {
        let h = harness();

        let start = h
            .service
            .request_start(&owner(), "npc_troll", "The troll roars.")
            .await
            .unwrap();

        let CombatStart::Deferred {
            stat_block_job,
            start_job,
        } = start
        else {
            panic!("expected deferred start");
        };
        let pending = h.queue.pending_jobs(&owner());
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].id, stat_block_job.id);
        assert_eq!(pending[0].kind, JobKind::SynthesizeStatBlock);
        assert_eq!(pending[1].id, start_job.id);
        assert_eq!(pending[1].stage, JobStage::Parked);
        assert_eq!(pending[1].payload["openingText"], "The troll roars.");
        assert!(h.service.active_combat(&owner()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_second_start_is_rejected_while_active() {
        let h = harness();
        seed_troll(&h, 5).await;
        h.service.start(&owner(), "npc_troll", "Roar.").await.unwrap();

        let result = h.service.request_start(&owner(), "npc_troll", "Again.").await;

        assert!(matches!(result, Err(GameError::Validation(_))));
    }

    #[tokio::test]
    async fn test_start_without_stat_block_fails_and_notifies() {
        let h = harness();

        let result = h.service.start(&owner(), "npc_ghost", "Boo.").await;

        assert!(matches!(result, Err(GameError::NotFound { .. })));
        assert_eq!(h.notifier.event_names(), vec![events::COMBAT_START_FAILED]);
    }

    #[tokio::test]
    async fn test_reaching_required_successes_resolves_victory() {
        let h = harness();
        seed_troll(&h, 5).await;
        let started = h.service.start(&owner(), "npc_troll", "Roar.").await.unwrap();

        let first = h.service.apply_turn(&owner(), &successes(2)).await.unwrap();
        let second = h.service.apply_turn(&owner(), &successes(3)).await.unwrap();

        assert_eq!(first.outcome, None);
        assert_eq!(second.outcome, Some(CombatOutcome::Victory));
        let record = h.service.load_combat(&owner(), started.combat_id).await.unwrap();
        assert!(!record.active);
        assert_eq!(record.phase, CombatPhase::Resolved);
        assert_eq!(record.success_counter, 3);
        assert_eq!(
            h.notifier.event_names(),
            vec![events::COMBAT_STARTED, events::COMBAT_ENDED]
        );
        let (_, _, ended) = h.notifier.published().pop().unwrap();
        assert_eq!(ended["outcome"], "victory");
        let pending = h.queue.pending_jobs(&owner());
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].kind, JobKind::SummarizeCombat);
    }

    #[tokio::test]
    async fn test_fourth_condition_resolves_defeat_despite_combat_ended_false() {
        let h = harness();
        seed_troll(&h, 5).await;
        h.service.start(&owner(), "npc_troll", "Roar.").await.unwrap();
        let three = CombatTurn {
            player_conditions: Some(vec!["bruised".into(), "tired".into(), "dazed".into()]),
            ..CombatTurn::narrative("Ouch.")
        };
        h.service.apply_turn(&owner(), &three).await.unwrap();

        let four = CombatTurn {
            combat_ended: Some(false),
            player_conditions: Some(vec![
                "bruised".into(),
                "tired".into(),
                "dazed".into(),
                "winded".into(),
            ]),
            ..CombatTurn::narrative("You stagger.")
        };
        let report = h.service.apply_turn(&owner(), &four).await.unwrap();

        assert_eq!(report.outcome, Some(CombatOutcome::Defeat));
        assert!(h.service.active_combat(&owner()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_missing_stat_block_mid_turn_surfaces_narrative_without_mutation() {
        let h = harness();
        seed_troll(&h, 5).await;
        let started = h.service.start(&owner(), "npc_troll", "Roar.").await.unwrap();
        let before = h.store.get(&owner(), &started.document_id()).await.unwrap();
        h.store
            .delete(&owner(), &StatBlock::document_id("npc_troll"))
            .await
            .unwrap();

        let report = h.service.apply_turn(&owner(), &successes(3)).await.unwrap();

        assert_eq!(report.narrative, "Exchange 3.");
        assert!(!report.applied);
        let after = h.store.get(&owner(), &started.document_id()).await.unwrap();
        assert_eq!(before, after);
    }

    #[tokio::test]
    async fn test_turn_without_active_combat_returns_narrative() {
        let h = harness();

        let report = h
            .service
            .apply_turn(&owner(), &CombatTurn::narrative("  "))
            .await
            .unwrap();

        assert_eq!(report.narrative, COMBAT_CONTINUES);
        assert!(!report.applied);
    }

    #[tokio::test]
    async fn test_end_externally_flees_and_schedules_summary() {
        let h = harness();
        seed_troll(&h, 9).await;
        h.service.start(&owner(), "npc_troll", "Roar.").await.unwrap();

        let report = h
            .service
            .end_externally(&owner(), Some("You dive into the river."))
            .await
            .unwrap();

        assert_eq!(report.outcome, Some(CombatOutcome::Fled));
        assert_eq!(report.narrative, "You dive into the river.");
        assert_eq!(h.queue.pending_jobs(&owner())[0].kind, JobKind::SummarizeCombat);
    }

    #[tokio::test]
    async fn test_end_externally_without_combat_is_rejected() {
        let h = harness();

        let result = h.service.end_externally(&owner(), None).await;

        assert!(matches!(result, Err(GameError::Validation(_))));
    }

    #[tokio::test]
    async fn test_finish_summary_stores_summary_and_deletes_record() {
        let h = harness();
        seed_troll(&h, 1).await;
        let started = h.service.start(&owner(), "npc_troll", "Roar.").await.unwrap();
        h.service.apply_turn(&owner(), &successes(1)).await.unwrap();

        h.service
            .finish_summary(&owner(), started.combat_id, "You felled the troll.")
            .await
            .unwrap();

        let summary = h
            .store
            .get(&owner(), &format!("{SUMMARY_PREFIX}{}", started.combat_id))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(summary["summary"], "You felled the troll.");
        assert_eq!(summary["outcome"], "victory");
        assert!(
            h.store
                .get(&owner(), &started.document_id())
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_store_failure_propagates_from_active_lookup() {
        let queue = JobQueue::new(JobQueueConfig::default(), Arc::new(FixedClock(fixed_now())));
        let service = CombatService::new(
            Arc::new(FailingDocumentStore),
            Arc::new(queue),
            Arc::new(RecordingNotifier::new()),
            Arc::new(FixedClock(fixed_now())),
        );

        let result = service.active_combat(&owner()).await;

        assert!(matches!(result, Err(GameError::Infrastructure(_))));
    }
}
