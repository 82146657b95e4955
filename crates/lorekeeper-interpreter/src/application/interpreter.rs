//! Applies interpreted model output to the owner's state.

use std::sync::Arc;

use lorekeeper_combat::{CombatOutcome, CombatService, CombatStart, CombatTurn, fallback_narrative};
use lorekeeper_core::error::{GameError, truncate_message};
use lorekeeper_core::ids::{EntityId, EntityType, OwnerId};
use lorekeeper_core::store::DocumentStore;
use lorekeeper_jobs::{JobHandle, JobKind, JobSubmitter, UnitOfWork};
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::application::creator::{Creation, CreationRequest, EntityCreator};
use crate::domain::payload::{StructuredPayload, WorldChanges};
use crate::domain::split::{Split, extract_json, split};

const CONTEXT_EXCERPT_LEN: usize = 600;

/// What kind of turn produced the model output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnContext {
    /// A dungeon-master turn outside combat.
    Exploration,
    /// A round of an active encounter; only combat-turn payloads apply.
    Combat,
}

/// What an apply did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ApplyReport {
    /// Text for the player.
    pub narrative: String,
    /// Entities stubbed and scheduled for creation.
    pub created: Vec<EntityId>,
    /// Entities merge-patched, including announced entities that already
    /// existed.
    pub updated: Vec<EntityId>,
    /// A combat started, was scheduled to start, or resolved this turn.
    pub combat_transition: bool,
    /// Set when this turn resolved an encounter.
    pub combat_outcome: Option<CombatOutcome>,
    /// The world-summary resync submitted after a non-combat apply.
    pub world_sync: Option<JobHandle>,
    /// The structured block was present but rejected.
    pub malformed: bool,
}

impl ApplyReport {
    fn narrative_only(narrative: String) -> Self {
        Self {
            narrative,
            ..Self::default()
        }
    }

    fn record(&mut self, id: EntityId, creation: &Creation) {
        match creation {
            Creation::Scheduled(_) => self.created.push(id),
            Creation::Merged => self.updated.push(id),
            Creation::AlreadyTracked(_) => {}
        }
    }
}

/// Response interpreter.
pub struct ResponseInterpreter {
    store: Arc<dyn DocumentStore>,
    creator: Arc<EntityCreator>,
    combat: Arc<CombatService>,
    jobs: Arc<dyn JobSubmitter>,
}

impl std::fmt::Debug for ResponseInterpreter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseInterpreter").finish_non_exhaustive()
    }
}

impl ResponseInterpreter {
    /// Wires the interpreter to its collaborators.
    #[must_use]
    pub fn new(
        store: Arc<dyn DocumentStore>,
        creator: Arc<EntityCreator>,
        combat: Arc<CombatService>,
        jobs: Arc<dyn JobSubmitter>,
    ) -> Self {
        Self {
            store,
            creator,
            combat,
            jobs,
        }
    }

    /// Interprets the raw output of a player turn.
    ///
    /// A rejected block is logged and the narrative is still returned; no
    /// state is touched. During combat, a missing or rejected block yields
    /// the canned "combat continues" line if there is no prose.
    ///
    /// # Errors
    ///
    /// Returns store or queue-side errors from applying a valid payload.
    pub async fn interpret(
        &self,
        owner: &OwnerId,
        raw: &str,
        context: TurnContext,
    ) -> Result<ApplyReport, GameError> {
        let Split { narrative, block } = split(raw);
        let visible = match context {
            TurnContext::Combat => fallback_narrative(&narrative),
            TurnContext::Exploration => narrative.clone(),
        };

        let Some(block) = block else {
            return Ok(ApplyReport::narrative_only(visible));
        };

        let payload = match StructuredPayload::decode(&block) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(owner = %owner, ?context, error = %err, "structured block rejected; narrative only");
                return Ok(ApplyReport {
                    malformed: true,
                    ..ApplyReport::narrative_only(visible)
                });
            }
        };

        match (context, payload) {
            (TurnContext::Combat, StructuredPayload::CombatTurn(turn)) => {
                self.apply_combat_turn(owner, &turn, &narrative).await
            }
            (TurnContext::Combat, _) => {
                warn!(owner = %owner, "non-combat payload during combat ignored");
                Ok(ApplyReport {
                    malformed: true,
                    ..ApplyReport::narrative_only(visible)
                })
            }
            (TurnContext::Exploration, payload) => self.apply(owner, payload, narrative).await,
        }
    }

    /// Applies a decoded payload.
    ///
    /// # Errors
    ///
    /// Returns store errors; a combat start rejected by domain rules is
    /// logged instead.
    pub async fn apply(
        &self,
        owner: &OwnerId,
        payload: StructuredPayload,
        narrative: String,
    ) -> Result<ApplyReport, GameError> {
        match payload {
            StructuredPayload::CombatTurn(turn) => {
                self.apply_combat_turn(owner, &turn, &narrative).await
            }
            StructuredPayload::WorldChanges(changes) => {
                self.apply_world_changes(owner, changes, narrative).await
            }
            StructuredPayload::Entity(entity) => {
                let mut report = ApplyReport::narrative_only(narrative);
                match entity.id {
                    Some(id) => {
                        let request = CreationRequest {
                            id: id.clone(),
                            entity_type: entity.entity_type,
                            stub: entity.document,
                            context: creation_context(&report.narrative),
                        };
                        let creation = self.creator.create(owner, request).await?;
                        report.record(id, &creation);
                    }
                    None => warn!(owner = %owner, "entity payload without id or name ignored"),
                }
                self.finish_non_combat(owner, &mut report);
                Ok(report)
            }
        }
    }

    async fn apply_combat_turn(
        &self,
        owner: &OwnerId,
        turn: &CombatTurn,
        narrative: &str,
    ) -> Result<ApplyReport, GameError> {
        let turn_report = self.combat.apply_turn(owner, turn).await?;
        let text = if turn.user_facing_text.trim().is_empty() && !narrative.trim().is_empty() {
            narrative.trim().to_owned()
        } else {
            turn_report.narrative
        };
        Ok(ApplyReport {
            combat_transition: turn_report.outcome.is_some(),
            combat_outcome: turn_report.outcome,
            ..ApplyReport::narrative_only(text)
        })
    }

    async fn apply_world_changes(
        &self,
        owner: &OwnerId,
        changes: WorldChanges,
        narrative: String,
    ) -> Result<ApplyReport, GameError> {
        let mut report = ApplyReport::narrative_only(narrative);
        let applied_anything = !changes.is_empty();
        let context = creation_context(&report.narrative);

        for entity in changes.new_entities {
            let request = CreationRequest {
                id: entity.id.clone(),
                entity_type: entity.entity_type,
                stub: entity.document,
                context: context.clone(),
            };
            let creation = self.creator.create(owner, request).await?;
            report.record(entity.id, &creation);
        }

        for (id, patch) in changes.partial_updates {
            let known = self.store.get(owner, id.as_str()).await?.is_some()
                || self.creator.tracker().is_in_flight(owner, &id);
            if known {
                self.store.merge_patch(owner, id.as_str(), &patch).await?;
                report.updated.push(id);
                continue;
            }
            // An update to an entity nobody created goes through creation.
            let Some(entity_type) = id.entity_type() else {
                continue;
            };
            let request = CreationRequest {
                id: id.clone(),
                entity_type,
                stub: patch,
                context: context.clone(),
            };
            let creation = self.creator.create(owner, request).await?;
            report.record(id, &creation);
        }

        if let Some(start) = changes.start_combat {
            match self
                .combat
                .request_start(owner, &start.enemy_id, &start.opening_text)
                .await
            {
                Ok(CombatStart::Started(state)) => {
                    info!(owner = %owner, combat_id = %state.combat_id, "combat started from turn");
                    report.combat_transition = true;
                }
                Ok(CombatStart::Deferred { start_job, .. }) => {
                    info!(owner = %owner, job_id = %start_job.id, "combat start scheduled from turn");
                    report.combat_transition = true;
                }
                Err(GameError::Validation(reason)) => {
                    warn!(owner = %owner, enemy_ref = %start.enemy_id, reason = %reason, "combat start rejected");
                }
                Err(err) => return Err(err),
            }
        }

        if applied_anything {
            self.finish_non_combat(owner, &mut report);
        }
        Ok(report)
    }

    /// Triggers the world-summary resync unless this turn changed combat.
    fn finish_non_combat(&self, owner: &OwnerId, report: &mut ApplyReport) {
        if report.combat_transition {
            return;
        }
        let handle = self.jobs.submit(UnitOfWork::new(
            owner.clone(),
            JobKind::SyncWorldSummary,
            json!({}),
        ));
        report.world_sync = Some(handle);
    }

    /// Interprets the output of a creation job as the complete document for
    /// `id` and merges it over the stub.
    ///
    /// # Errors
    ///
    /// Returns `GameError::MalformedPayload` if the output holds no usable
    /// entity document (the job may be retried), or a store error.
    pub async fn complete_entity(
        &self,
        owner: &OwnerId,
        id: &EntityId,
        entity_type: EntityType,
        raw: &str,
    ) -> Result<ApplyReport, GameError> {
        let mut value = extract_json(raw)
            .ok_or_else(|| GameError::MalformedPayload(format!("no JSON document for {id}")))?;
        if let Value::Object(object) = &mut value {
            object
                .entry("type")
                .or_insert_with(|| Value::String(entity_type.as_str().to_owned()));
        }

        let StructuredPayload::Entity(entity) = StructuredPayload::from_value(value)? else {
            return Err(GameError::MalformedPayload(format!(
                "expected an entity document for {id}"
            )));
        };
        if entity.entity_type != entity_type {
            return Err(GameError::MalformedPayload(format!(
                "expected a {entity_type} document for {id}, got {}",
                entity.entity_type
            )));
        }

        self.creator
            .complete(owner, id, entity_type, &entity.document)
            .await?;
        let mut report = ApplyReport {
            updated: vec![id.clone()],
            ..ApplyReport::narrative_only(format!("{} is ready.", id.display_name()))
        };
        self.finish_non_combat(owner, &mut report);
        Ok(report)
    }
}

fn creation_context(narrative: &str) -> Value {
    json!({ "narrative": truncate_message(narrative, CONTEXT_EXCERPT_LEN) })
}

#[cfg(test)]
mod tests {
    use lorekeeper_combat::CombatState;
    use lorekeeper_document_store::InMemoryDocumentStore;
    use lorekeeper_jobs::{JobQueue, JobQueueConfig, JobStage};
    use lorekeeper_lifecycle::{EntityLifecycleTracker, Status};
    use lorekeeper_test_support::{FixedClock, RecordingNotifier, fixed_now};

    use super::*;

    struct Harness {
        store: Arc<InMemoryDocumentStore>,
        queue: JobQueue,
        tracker: Arc<EntityLifecycleTracker>,
        combat: Arc<CombatService>,
        interpreter: ResponseInterpreter,
    }

    fn harness() -> Harness {
        let store = Arc::new(InMemoryDocumentStore::new());
        let clock = Arc::new(FixedClock(fixed_now()));
        let queue = JobQueue::new(JobQueueConfig::default(), clock.clone());
        let jobs: Arc<dyn JobSubmitter> = Arc::new(queue.clone());
        let notifier = Arc::new(RecordingNotifier::new());
        let tracker = Arc::new(EntityLifecycleTracker::new(clock.clone()));
        let creator = Arc::new(EntityCreator::new(
            store.clone(),
            tracker.clone(),
            jobs.clone(),
            notifier.clone(),
        ));
        let combat = Arc::new(CombatService::new(
            store.clone(),
            jobs.clone(),
            notifier,
            clock,
        ));
        let interpreter = ResponseInterpreter::new(store.clone(), creator, combat.clone(), jobs);
        Harness {
            store,
            queue,
            tracker,
            combat,
            interpreter,
        }
    }

    fn owner() -> OwnerId {
        OwnerId::new("player-1")
    }

    fn kinds(h: &Harness) -> Vec<JobKind> {
        h.queue
            .pending_jobs(&owner())
            .into_iter()
            .map(|view| view.kind)
            .collect()
    }

    async fn start_combat(h: &Harness) -> CombatState {
        h.combat
            .store_stat_block(&owner(), "npc_troll", &json!({"level": 5}))
            .await
            .unwrap();
        h.combat.start(&owner(), "npc_troll", "Roar.").await.unwrap()
    }

    #[tokio::test]
    async fn test_plain_narrative_applies_nothing() {
        let h = harness();

        let report = h
            .interpreter
            .interpret(&owner(), "The road is quiet.", TurnContext::Exploration)
            .await
            .unwrap();

        assert_eq!(report.narrative, "The road is quiet.");
        assert!(report.world_sync.is_none());
        assert!(h.queue.pending_jobs(&owner()).is_empty());
    }

    #[tokio::test]
    async fn test_new_entities_are_stubbed_then_scheduled_and_world_synced() {
        let h = harness();
        let raw = r#"Tom greets you at the mill.
<<STATE>>{"newEntities": [{"type": "npc", "name": "Tom", "home": "loc_mill"}]}<</STATE>>"#;

        let report = h
            .interpreter
            .interpret(&owner(), raw, TurnContext::Exploration)
            .await
            .unwrap();

        assert_eq!(report.narrative, "Tom greets you at the mill.");
        assert_eq!(report.created, vec![EntityId::new("npc_tom")]);
        assert!(h.store.get(&owner(), "npc_tom").await.unwrap().is_some());
        assert_eq!(kinds(&h), vec![JobKind::CreateEntity, JobKind::SyncWorldSummary]);
        assert!(h.tracker.has_pending(&owner()));
    }

    #[tokio::test]
    async fn test_reannounced_finished_entity_is_merged_not_recreated() {
        let h = harness();
        h.store
            .put(
                &owner(),
                "npc_tom",
                json!({"id": "npc_tom", "type": "npc", "name": "Tom", "stub": false, "description": "A finished miller."}),
            )
            .await
            .unwrap();
        let raw = r#"Tom waves again.
<<STATE>>{"newEntities": [{"type": "npc", "name": "Tom", "description": "new guess"}]}<</STATE>>"#;

        let report = h
            .interpreter
            .interpret(&owner(), raw, TurnContext::Exploration)
            .await
            .unwrap();

        assert!(report.created.is_empty());
        assert_eq!(report.updated, vec![EntityId::new("npc_tom")]);
        let tom = h.store.get(&owner(), "npc_tom").await.unwrap().unwrap();
        assert_eq!(tom["stub"], false);
        assert_eq!(tom["description"], "new guess");
        assert_eq!(kinds(&h), vec![JobKind::SyncWorldSummary]);
        let status = h.tracker.get_status(&owner(), &EntityId::new("npc_tom")).unwrap();
        assert_eq!(status.status, Status::Complete);
    }

    #[tokio::test]
    async fn test_partial_update_merges_into_existing_document() {
        let h = harness();
        h.store
            .put(&owner(), "npc_bess", json!({"name": "Bess", "knows": ["npc_tom"], "mood": "calm"}))
            .await
            .unwrap();
        let raw = r#"Bess frowns.<<STATE>>{"partialUpdates": {"npc_bess": {"knows": ["npc_ann"], "mood": "wary", "name": null}}}<</STATE>>"#;

        let report = h
            .interpreter
            .interpret(&owner(), raw, TurnContext::Exploration)
            .await
            .unwrap();

        assert_eq!(report.updated, vec![EntityId::new("npc_bess")]);
        assert_eq!(
            h.store.get(&owner(), "npc_bess").await.unwrap().unwrap(),
            json!({"name": "Bess", "knows": ["npc_tom", "npc_ann"], "mood": "wary"})
        );
    }

    #[tokio::test]
    async fn test_partial_update_of_unknown_entity_goes_through_creation() {
        let h = harness();
        let raw = r#"<<STATE>>{"partialUpdates": {"loc_ruins": {"name": "Old Ruins"}}}<</STATE>>"#;

        let report = h
            .interpreter
            .interpret(&owner(), raw, TurnContext::Exploration)
            .await
            .unwrap();

        assert_eq!(report.created, vec![EntityId::new("loc_ruins")]);
        assert_eq!(
            h.tracker
                .get_status(&owner(), &EntityId::new("loc_ruins"))
                .unwrap()
                .status,
            Status::Pending
        );
    }

    #[tokio::test]
    async fn test_start_combat_skips_world_sync() {
        let h = harness();
        let raw = r#"A troll lunges!<<STATE>>{"startCombat": {"enemyId": "npc_troll", "openingText": "A troll lunges!"}}<</STATE>>"#;

        let report = h
            .interpreter
            .interpret(&owner(), raw, TurnContext::Exploration)
            .await
            .unwrap();

        assert!(report.combat_transition);
        assert!(report.world_sync.is_none());
        assert_eq!(
            kinds(&h),
            vec![JobKind::SynthesizeStatBlock, JobKind::StartCombat]
        );
        assert_eq!(h.queue.pending_jobs(&owner())[1].stage, JobStage::Parked);
    }

    #[tokio::test]
    async fn test_malformed_block_returns_narrative_and_mutates_nothing() {
        let h = harness();
        let raw = r#"The bridge sways.<<STATE>>{"newEntities": [{"type": "npc", "na"#;

        let report = h
            .interpreter
            .interpret(&owner(), raw, TurnContext::Exploration)
            .await
            .unwrap();

        assert!(report.malformed);
        assert_eq!(report.narrative, "The bridge sways.");
        assert!(h.store.list(&owner(), "").await.unwrap().is_empty());
        assert!(h.queue.pending_jobs(&owner()).is_empty());
    }

    #[tokio::test]
    async fn test_invalid_combat_block_leaves_combat_state_byte_identical() {
        let h = harness();
        let started = start_combat(&h).await;
        let before = h.store.get(&owner(), &started.document_id()).await.unwrap();
        let raw = r#"<<STATE>>{"userFacingText": "You swing", "currentEnemySuccesses": "#;

        let report = h
            .interpreter
            .interpret(&owner(), raw, TurnContext::Combat)
            .await
            .unwrap();

        assert!(report.malformed);
        assert!(!report.narrative.is_empty());
        let after = h.store.get(&owner(), &started.document_id()).await.unwrap();
        assert_eq!(
            serde_json::to_string(&before).unwrap(),
            serde_json::to_string(&after).unwrap()
        );
    }

    #[tokio::test]
    async fn test_combat_turn_is_routed_to_state_machine() {
        let h = harness();
        start_combat(&h).await;
        let raw = r#"<<STATE>>{"userFacingText": "The troll falls.", "currentEnemySuccesses": 3, "combatEnded": false}<</STATE>>"#;

        let report = h
            .interpreter
            .interpret(&owner(), raw, TurnContext::Combat)
            .await
            .unwrap();

        assert_eq!(report.narrative, "The troll falls.");
        assert_eq!(report.combat_outcome, Some(CombatOutcome::Victory));
        assert!(report.world_sync.is_none());
        assert_eq!(kinds(&h), vec![JobKind::SummarizeCombat]);
    }

    #[tokio::test]
    async fn test_world_changes_during_combat_are_ignored() {
        let h = harness();
        start_combat(&h).await;
        let raw = r#"Swing.<<STATE>>{"newEntities": [{"type": "npc", "name": "Imp"}]}<</STATE>>"#;

        let report = h
            .interpreter
            .interpret(&owner(), raw, TurnContext::Combat)
            .await
            .unwrap();

        assert!(report.created.is_empty());
        assert!(h.store.get(&owner(), "npc_imp").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_complete_entity_fills_in_defaults_and_merges() {
        let h = harness();
        let raw = r#"<<STATE>>{"newEntities": [{"type": "npc", "name": "Tom"}]}<</STATE>>"#;
        h.interpreter
            .interpret(&owner(), raw, TurnContext::Exploration)
            .await
            .unwrap();

        let report = h
            .interpreter
            .complete_entity(
                &owner(),
                &EntityId::new("npc_tom"),
                EntityType::Npc,
                "```json\n{\"description\": \"A tired miller.\"}\n```",
            )
            .await
            .unwrap();

        assert_eq!(report.updated, vec![EntityId::new("npc_tom")]);
        let document = h.store.get(&owner(), "npc_tom").await.unwrap().unwrap();
        assert_eq!(document["description"], "A tired miller.");
        assert_eq!(document["name"], "Tom");
        assert_eq!(document["stub"], false);
    }

    #[tokio::test]
    async fn test_complete_entity_rejects_non_json_output() {
        let h = harness();

        let result = h
            .interpreter
            .complete_entity(&owner(), &EntityId::new("npc_tom"), EntityType::Npc, "Sorry, no.")
            .await;

        assert!(matches!(result, Err(GameError::MalformedPayload(_))));
    }

    #[tokio::test]
    async fn test_complete_entity_rejects_wrong_type() {
        let h = harness();

        let result = h
            .interpreter
            .complete_entity(
                &owner(),
                &EntityId::new("npc_tom"),
                EntityType::Npc,
                r#"{"type": "item", "name": "Tom"}"#,
            )
            .await;

        assert!(matches!(result, Err(GameError::MalformedPayload(_))));
    }
}
