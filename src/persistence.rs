//! Combat persistence
//!
//! `PersistenceGateway` is the storage seam the combat manager talks to.
//! `SqliteGateway` implements it over the `combats` and `combat_actions`
//! tables: scalar session fields get their own columns, nested structures
//! are stored as JSON text.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use thiserror::Error;
use tracing::debug;

use crate::combat::{CombatAction, CombatSession, Position};

/// Storage errors
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("Combat {0} not found")]
    NotFound(String),
    #[error("Corrupt stored data: {0}")]
    Corrupt(String),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// One stored action with the description of its outcome
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionLogEntry {
    pub id: String,
    pub combat_id: String,
    pub actor_id: String,
    pub action_type: String,
    pub target_ids: Vec<String>,
    pub spell_id: Option<String>,
    pub weapon_name: Option<String>,
    pub movement_path: Vec<Position>,
    pub extra_data: serde_json::Value,
    pub result_description: String,
    pub created_at: DateTime<Utc>,
}

/// Load/save combat sessions and append to their action log
#[async_trait]
pub trait PersistenceGateway: Send + Sync {
    /// Store a freshly created session
    async fn create(&self, session: &CombatSession) -> Result<(), PersistenceError>;

    async fn load(&self, id: &str) -> Result<Option<CombatSession>, PersistenceError>;

    /// Overwrite an existing session
    async fn save(&self, session: &CombatSession) -> Result<(), PersistenceError>;

    async fn append_action_log(
        &self,
        combat_id: &str,
        action: &CombatAction,
        result_description: &str,
    ) -> Result<(), PersistenceError>;

    /// Every logged action for a combat, oldest first
    async fn action_log(&self, combat_id: &str) -> Result<Vec<ActionLogEntry>, PersistenceError>;
}

fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::AutoSi, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, PersistenceError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| PersistenceError::Corrupt(format!("timestamp '{}': {}", raw, e)))
}

/// SQLite-backed gateway
#[derive(Clone)]
pub struct SqliteGateway {
    pool: SqlitePool,
}

impl SqliteGateway {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

/// Row type for the combats table
#[derive(sqlx::FromRow)]
struct CombatRow {
    id: String,
    dm_user_id: String,
    current_turn_index: i64,
    round_number: i64,
    status: String,
    initiative_json: String,
    initiative_scores_json: String,
    participants_json: String,
    battlefield_json: String,
    environment: String,
    created_at: String,
    updated_at: String,
}

impl CombatRow {
    fn into_session(self) -> Result<CombatSession, PersistenceError> {
        let status = self
            .status
            .parse()
            .map_err(|_| PersistenceError::Corrupt(format!("status '{}'", self.status)))?;

        Ok(CombatSession {
            id: self.id,
            dm_user_id: self.dm_user_id,
            initiative: serde_json::from_str(&self.initiative_json)?,
            initiative_scores: serde_json::from_str(&self.initiative_scores_json)?,
            participants: serde_json::from_str(&self.participants_json)?,
            current_turn_index: usize::try_from(self.current_turn_index).map_err(|_| {
                PersistenceError::Corrupt(format!("turn index {}", self.current_turn_index))
            })?,
            round_number: u32::try_from(self.round_number).map_err(|_| {
                PersistenceError::Corrupt(format!("round number {}", self.round_number))
            })?,
            status,
            environment: self.environment,
            battlefield: serde_json::from_str(&self.battlefield_json)?,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
        })
    }
}

/// Row type for the combat_actions table
#[derive(sqlx::FromRow)]
struct ActionRow {
    id: String,
    combat_id: String,
    actor_id: String,
    #[sqlx(rename = "type")]
    action_type: String,
    target_ids_json: String,
    spell_id: Option<String>,
    weapon_name: Option<String>,
    movement_path_json: String,
    extra_data_json: String,
    result_description: String,
    created_at: String,
}

impl ActionRow {
    fn into_entry(self) -> Result<ActionLogEntry, PersistenceError> {
        Ok(ActionLogEntry {
            id: self.id,
            combat_id: self.combat_id,
            actor_id: self.actor_id,
            action_type: self.action_type,
            target_ids: serde_json::from_str(&self.target_ids_json)?,
            spell_id: self.spell_id,
            weapon_name: self.weapon_name,
            movement_path: serde_json::from_str(&self.movement_path_json)?,
            extra_data: serde_json::from_str(&self.extra_data_json)?,
            result_description: self.result_description,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

#[async_trait]
impl PersistenceGateway for SqliteGateway {
    async fn create(&self, session: &CombatSession) -> Result<(), PersistenceError> {
        sqlx::query(
            r#"
            INSERT INTO combats (
                id, dm_user_id, current_turn_index, round_number, status,
                initiative_json, initiative_scores_json, participants_json,
                battlefield_json, environment, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&session.id)
        .bind(&session.dm_user_id)
        .bind(session.current_turn_index as i64)
        .bind(session.round_number as i64)
        .bind(session.status.as_str())
        .bind(serde_json::to_string(&session.initiative)?)
        .bind(serde_json::to_string(&session.initiative_scores)?)
        .bind(serde_json::to_string(&session.participants)?)
        .bind(serde_json::to_string(&session.battlefield)?)
        .bind(&session.environment)
        .bind(timestamp(&session.created_at))
        .bind(timestamp(&session.updated_at))
        .execute(&self.pool)
        .await?;

        debug!(combat = %session.id, "Combat stored");
        Ok(())
    }

    async fn load(&self, id: &str) -> Result<Option<CombatSession>, PersistenceError> {
        let row: Option<CombatRow> = sqlx::query_as(
            r#"
            SELECT id, dm_user_id, current_turn_index, round_number, status,
                   initiative_json, initiative_scores_json, participants_json,
                   battlefield_json, environment, created_at, updated_at
            FROM combats WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(CombatRow::into_session).transpose()
    }

    async fn save(&self, session: &CombatSession) -> Result<(), PersistenceError> {
        let result = sqlx::query(
            r#"
            UPDATE combats SET
                current_turn_index = ?, round_number = ?, status = ?,
                initiative_json = ?, initiative_scores_json = ?, participants_json = ?,
                battlefield_json = ?, environment = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(session.current_turn_index as i64)
        .bind(session.round_number as i64)
        .bind(session.status.as_str())
        .bind(serde_json::to_string(&session.initiative)?)
        .bind(serde_json::to_string(&session.initiative_scores)?)
        .bind(serde_json::to_string(&session.participants)?)
        .bind(serde_json::to_string(&session.battlefield)?)
        .bind(&session.environment)
        .bind(timestamp(&session.updated_at))
        .bind(&session.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(PersistenceError::NotFound(session.id.clone()));
        }
        Ok(())
    }

    async fn append_action_log(
        &self,
        combat_id: &str,
        action: &CombatAction,
        result_description: &str,
    ) -> Result<(), PersistenceError> {
        sqlx::query(
            r#"
            INSERT INTO combat_actions (
                id, combat_id, actor_id, type, target_ids_json, spell_id, weapon_name,
                movement_path_json, extra_data_json, result_description, seq, created_at
            ) VALUES (
                ?, ?, ?, ?, ?, ?, ?, ?, ?, ?,
                (SELECT COALESCE(MAX(seq), 0) + 1 FROM combat_actions WHERE combat_id = ?),
                ?
            )
            "#,
        )
        .bind(uuid::Uuid::new_v4().to_string())
        .bind(combat_id)
        .bind(&action.actor_id)
        .bind(action.action_type.as_str())
        .bind(serde_json::to_string(&action.target_ids)?)
        .bind(&action.spell_id)
        .bind(&action.weapon_name)
        .bind(serde_json::to_string(&action.movement_path)?)
        .bind(serde_json::to_string(&action.extra_data)?)
        .bind(result_description)
        .bind(combat_id)
        .bind(timestamp(&Utc::now()))
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn action_log(&self, combat_id: &str) -> Result<Vec<ActionLogEntry>, PersistenceError> {
        let rows: Vec<ActionRow> = sqlx::query_as(
            r#"
            SELECT id, combat_id, actor_id, type, target_ids_json, spell_id, weapon_name,
                   movement_path_json, extra_data_json, result_description, created_at
            FROM combat_actions WHERE combat_id = ? ORDER BY seq
            "#,
        )
        .bind(combat_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ActionRow::into_entry).collect()
    }
}
