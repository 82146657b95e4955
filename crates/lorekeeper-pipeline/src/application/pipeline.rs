//! The per-job pipeline: render a prompt, call the model, interpret and
//! apply the output.

use std::sync::Arc;

use async_trait::async_trait;
use lorekeeper_combat::CombatService;
use lorekeeper_core::clock::Clock;
use lorekeeper_core::error::GameError;
use lorekeeper_core::ids::{EntityId, EntityType, OwnerId};
use lorekeeper_core::notify::{Notifier, events};
use lorekeeper_core::provider::{CompletionProvider, PromptRenderer, PromptTemplate};
use lorekeeper_core::store::DocumentStore;
use lorekeeper_interpreter::{EntityCreator, ResponseInterpreter, TurnContext, extract_json, split};
use lorekeeper_jobs::{Job, JobExecutor, JobKind};
use serde_json::{Value, json};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::domain::context::{self, WORLD_SUMMARY_ID};

const FAILURE_MESSAGE_LEN: usize = 300;

/// Executes every [`JobKind`] against the engine's collaborators.
pub struct GamePipeline {
    store: Arc<dyn DocumentStore>,
    renderer: Arc<dyn PromptRenderer>,
    provider: Arc<dyn CompletionProvider>,
    interpreter: Arc<ResponseInterpreter>,
    creator: Arc<EntityCreator>,
    combat: Arc<CombatService>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for GamePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GamePipeline").finish_non_exhaustive()
    }
}

impl GamePipeline {
    /// Wires the pipeline.
    #[must_use]
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn DocumentStore>,
        renderer: Arc<dyn PromptRenderer>,
        provider: Arc<dyn CompletionProvider>,
        interpreter: Arc<ResponseInterpreter>,
        creator: Arc<EntityCreator>,
        combat: Arc<CombatService>,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            store,
            renderer,
            provider,
            interpreter,
            creator,
            combat,
            notifier,
            clock,
        }
    }

    async fn ask(&self, template: PromptTemplate, context: &Value) -> Result<String, GameError> {
        let prompt = self.renderer.render(template, context)?;
        let raw = self.provider.complete(&prompt).await?;
        debug!(template = template.name(), chars = raw.len(), "completion received");
        Ok(raw)
    }

    async fn player_action(&self, job: &Job) -> Result<String, GameError> {
        let action = required_str(job, "action")?;

        if let Some(state) = self.combat.active_combat(&job.owner).await? {
            let stats = match self.combat.load_stat_block(&job.owner, &state.enemy_ref).await {
                Ok(stats) => stats,
                Err(err) => {
                    warn!(owner = %job.owner, enemy = %state.enemy_ref, error = %err, "stat block unreadable; prompting without it");
                    None
                }
            };
            let raw = self
                .ask(
                    PromptTemplate::CombatTurn,
                    &context::combat_turn(action, &state, stats.as_ref()),
                )
                .await?;
            let report = self
                .interpreter
                .interpret(&job.owner, &raw, TurnContext::Combat)
                .await?;
            return Ok(report.narrative);
        }

        let summary = self.store.get(&job.owner, WORLD_SUMMARY_ID).await?;
        let raw = self
            .ask(
                PromptTemplate::DungeonMasterTurn,
                &context::player_turn(action, summary.as_ref()),
            )
            .await?;
        let report = self
            .interpreter
            .interpret(&job.owner, &raw, TurnContext::Exploration)
            .await?;
        info!(
            owner = %job.owner,
            created = report.created.len(),
            updated = report.updated.len(),
            malformed = report.malformed,
            "player turn applied"
        );
        Ok(report.narrative)
    }

    async fn end_combat(&self, job: &Job) -> Result<String, GameError> {
        let report = self
            .combat
            .end_externally(&job.owner, job.payload_str("line"))
            .await?;
        Ok(report.narrative)
    }

    async fn create_entity(&self, job: &Job) -> Result<String, GameError> {
        let id = EntityId::new(required_str(job, "entityId")?);
        let entity_type = job
            .payload_str("entityType")
            .and_then(EntityType::parse)
            .or_else(|| id.entity_type())
            .ok_or_else(|| GameError::Validation(format!("{id} has no entity type")))?;

        self.creator.begin(&job.owner, &id);
        let result = self.flesh_out(job, &id, entity_type).await;
        if let Err(err) = &result {
            let retry_pending = err.is_retryable() && job.retry.allows_retry_after(job.attempt);
            if !retry_pending {
                self.creator
                    .fail(&job.owner, &id, &err.user_message(FAILURE_MESSAGE_LEN));
            }
        }
        result
    }

    async fn flesh_out(
        &self,
        job: &Job,
        id: &EntityId,
        entity_type: EntityType,
    ) -> Result<String, GameError> {
        let stub = self.store.get(&job.owner, id.as_str()).await?;
        let extra = job.payload.get("context").cloned().unwrap_or(Value::Null);
        let raw = self
            .ask(
                PromptTemplate::EntityCreation,
                &context::entity_creation(id, entity_type, stub.as_ref(), &extra),
            )
            .await?;
        let report = self
            .interpreter
            .complete_entity(&job.owner, id, entity_type, &raw)
            .await?;
        Ok(report.narrative)
    }

    async fn synthesize_stat_block(&self, job: &Job) -> Result<String, GameError> {
        let enemy_ref = required_str(job, "enemyId")?;
        let enemy = self.store.get(&job.owner, enemy_ref).await?;
        let raw = self
            .ask(
                PromptTemplate::StatBlock,
                &context::stat_block(enemy_ref, enemy.as_ref()),
            )
            .await?;
        let document = extract_json(&raw).ok_or_else(|| {
            GameError::MalformedPayload(format!("no stat block document for {enemy_ref}"))
        })?;
        let block = self
            .combat
            .store_stat_block(&job.owner, enemy_ref, &document)
            .await?;
        Ok(format!("{} (level {}) is ready to fight.", block.name, block.level))
    }

    async fn start_combat(&self, job: &Job) -> Result<String, GameError> {
        let enemy_ref = required_str(job, "enemyId")?;
        let opening = job.payload_str("openingText").unwrap_or_default();
        let state = self.combat.start(&job.owner, enemy_ref, opening).await?;
        Ok(state.turn_log.first().cloned().unwrap_or_default())
    }

    async fn summarize_combat(&self, job: &Job) -> Result<String, GameError> {
        let combat_id = required_str(job, "combatId")?;
        let combat_id = Uuid::parse_str(combat_id)
            .map_err(|e| GameError::Validation(format!("invalid combat id {combat_id:?}: {e}")))?;
        let state = self.combat.load_combat(&job.owner, combat_id).await?;
        let summary = match self
            .ask(PromptTemplate::CombatSummary, &context::combat_summary(&state))
            .await
        {
            Ok(raw) => split(&raw).narrative,
            Err(err) if err.is_retryable() && job.retry.allows_retry_after(job.attempt) => {
                return Err(err);
            }
            Err(err) => {
                warn!(owner = %job.owner, combat_id = %combat_id, error = %err, "combat summary failed; storing fallback");
                context::fallback_combat_summary(&state)
            }
        };
        self.combat
            .finish_summary(&job.owner, combat_id, &summary)
            .await?;
        Ok(summary)
    }

    async fn sync_world_summary(&self, owner: &OwnerId) -> Result<String, GameError> {
        let entities: Vec<(String, Value)> = self
            .store
            .list(owner, "")
            .await?
            .into_iter()
            .filter(|(id, _)| EntityType::of_reference(id).is_some())
            .collect();
        let raw = self
            .ask(PromptTemplate::WorldSummary, &context::world_summary(&entities))
            .await?;
        let summary = split(&raw).narrative;

        self.store
            .put(
                owner,
                WORLD_SUMMARY_ID,
                json!({
                    "summary": summary,
                    "entityCount": entities.len(),
                    "updatedAt": self.clock.now(),
                }),
            )
            .await?;
        info!(owner = %owner, entities = entities.len(), "world summary updated");
        self.notifier.publish(
            owner,
            events::WORLD_SUMMARY_UPDATED,
            json!({ "entityCount": entities.len() }),
        );
        Ok(summary)
    }
}

#[async_trait]
impl JobExecutor for GamePipeline {
    #[instrument(skip(self, job), fields(job_id = %job.id, owner = %job.owner, kind = %job.kind, attempt = job.attempt))]
    async fn execute(&self, job: &Job) -> Result<String, GameError> {
        match job.kind {
            JobKind::PlayerAction => self.player_action(job).await,
            JobKind::EndCombat => self.end_combat(job).await,
            JobKind::CreateEntity => self.create_entity(job).await,
            JobKind::SynthesizeStatBlock => self.synthesize_stat_block(job).await,
            JobKind::StartCombat => self.start_combat(job).await,
            JobKind::SummarizeCombat => self.summarize_combat(job).await,
            JobKind::SyncWorldSummary => self.sync_world_summary(&job.owner).await,
        }
    }
}

fn required_str<'a>(job: &'a Job, field: &str) -> Result<&'a str, GameError> {
    job.payload_str(field)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| GameError::Validation(format!("{} job needs a `{field}`", job.kind)))
}
