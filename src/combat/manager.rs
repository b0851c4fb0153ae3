//! Shared registry of live combat sessions
//!
//! Each session sits behind its own mutex, held from validation through
//! persistence and publishing. Operations on one session are therefore
//! applied, stored and broadcast in a single order, while different sessions
//! run in parallel. Sessions missing from memory are loaded from storage on
//! first use, and finished sessions are dropped from memory once their final
//! state is stored.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use super::{
    ActionResult, CharacterSheet, CombatAction, CombatEngine, CombatError, CombatSession,
    DiceEngine,
};
use crate::broadcast::{BroadcastHub, Event};
use crate::persistence::{ActionLogEntry, PersistenceGateway};
use crate::srd::{MonsterDataProvider, ProviderError};

type DiceFactory = Box<dyn Fn() -> DiceEngine + Send + Sync>;

/// Owns every in-memory combat session
pub struct CombatManager {
    sessions: RwLock<HashMap<String, Arc<Mutex<CombatEngine>>>>,
    store: Arc<dyn PersistenceGateway>,
    monsters: Arc<dyn MonsterDataProvider>,
    hub: BroadcastHub,
    dice: DiceFactory,
}

impl CombatManager {
    pub fn new(
        store: Arc<dyn PersistenceGateway>,
        monsters: Arc<dyn MonsterDataProvider>,
        hub: BroadcastHub,
    ) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            store,
            monsters,
            hub,
            dice: Box::new(DiceEngine::new),
        }
    }

    /// Replace how each session's dice are created
    pub fn with_dice(mut self, factory: impl Fn() -> DiceEngine + Send + Sync + 'static) -> Self {
        self.dice = Box::new(factory);
        self
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    pub fn hub(&self) -> &BroadcastHub {
        &self.hub
    }

    /// Start a new encounter, store it and announce it
    pub async fn initiate(
        &self,
        dm_user_id: &str,
        characters: Vec<CharacterSheet>,
        monster_ids: &[String],
        environment: &str,
    ) -> Result<CombatSession, CombatError> {
        let mut monsters = Vec::with_capacity(monster_ids.len());
        for index in monster_ids {
            let block = self
                .monsters
                .get_monster_stat_block(index)
                .await
                .map_err(|e| match e {
                    ProviderError::NotFound(_) => {
                        CombatError::Validation(format!("unknown monster '{}'", index))
                    }
                    other => CombatError::Provider(other),
                })?;
            monsters.push(block);
        }

        let id = uuid::Uuid::new_v4().to_string();
        let engine = CombatEngine::create(
            id.clone(),
            dm_user_id,
            characters,
            monsters,
            environment,
            (self.dice)(),
        )?;
        let session = engine.session().clone();

        self.store.create(&session).await?;
        self.sessions
            .write()
            .await
            .insert(id.clone(), Arc::new(Mutex::new(engine)));

        info!(combat = %id, dm = %dm_user_id, "Combat initiated");
        self.hub
            .publish(&id, Event::CombatInitiated(session.clone()));

        Ok(session)
    }

    /// Current snapshot of a session
    pub async fn get(&self, combat_id: &str) -> Result<CombatSession, CombatError> {
        let engine = self.engine(combat_id).await?;
        let engine = engine.lock().await;
        Ok(engine.session().clone())
    }

    /// Resolve an action, persist it and broadcast the outcome
    pub async fn execute_action(
        &self,
        combat_id: &str,
        action: CombatAction,
    ) -> Result<(ActionResult, CombatSession), CombatError> {
        let handle = self.engine(combat_id).await?;
        let mut engine = handle.lock().await;

        let result = engine.execute_action(&action)?;
        let session = engine.session().clone();

        self.store.save(&session).await?;
        self.store
            .append_action_log(combat_id, &action, &result.description)
            .await?;

        self.hub
            .publish(combat_id, Event::ActionResult(result.clone()));
        self.hub
            .publish(combat_id, Event::CombatUpdated(session.clone()));

        if session.status.is_terminal() {
            drop(engine);
            self.evict(combat_id, &handle).await;
            info!(combat = %combat_id, status = %session.status.as_str(), "Combat finished");
        }

        Ok((result, session))
    }

    /// Advance past the actor's turn, persist and broadcast
    pub async fn end_turn(
        &self,
        combat_id: &str,
        actor_id: &str,
    ) -> Result<CombatSession, CombatError> {
        let engine = self.engine(combat_id).await?;
        let mut engine = engine.lock().await;

        let new_round = engine.end_turn(actor_id)?;
        let session = engine.session().clone();

        self.store.save(&session).await?;
        if new_round {
            debug!(combat = %combat_id, round = session.round_number, "Round advanced");
        }

        self.hub
            .publish(combat_id, Event::CombatUpdated(session.clone()));

        Ok(session)
    }

    /// Stored actions for a session, oldest first
    pub async fn action_log(&self, combat_id: &str) -> Result<Vec<ActionLogEntry>, CombatError> {
        // Resolve the session first so unknown ids are NotFound, not empty
        self.engine(combat_id).await?;
        Ok(self.store.action_log(combat_id).await?)
    }

    /// Number of sessions held in memory
    pub async fn loaded_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Forget a session, unless it was already replaced by a reload
    async fn evict(&self, combat_id: &str, handle: &Arc<Mutex<CombatEngine>>) {
        let mut sessions = self.sessions.write().await;
        if sessions
            .get(combat_id)
            .is_some_and(|current| Arc::ptr_eq(current, handle))
        {
            sessions.remove(combat_id);
        }
    }

    async fn engine(&self, combat_id: &str) -> Result<Arc<Mutex<CombatEngine>>, CombatError> {
        if let Some(engine) = self.sessions.read().await.get(combat_id) {
            return Ok(engine.clone());
        }

        let session = self
            .store
            .load(combat_id)
            .await?
            .ok_or_else(|| CombatError::NotFound(format!("combat {}", combat_id)))?;

        debug!(combat = %combat_id, "Loaded combat from storage");

        // Another caller may have loaded it while we were reading
        let mut sessions = self.sessions.write().await;
        let engine = sessions
            .entry(combat_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(CombatEngine::restore(session, (self.dice)()))))
            .clone();
        Ok(engine)
    }
}
