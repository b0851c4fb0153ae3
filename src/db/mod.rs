//! Database module - SQLite storage for combat sessions and their action log

#[cfg(test)]
pub mod test_utils;

use anyhow::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use tracing::info;

/// Database handle wrapping SQLite connection pool
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Create a new database connection
    /// If path is None, uses in-memory database (for testing)
    pub async fn new(path: Option<&str>) -> Result<Self> {
        let conn_str = match path {
            Some(p) => format!("sqlite:{}?mode=rwc", p),
            None => "sqlite::memory:".to_string(),
        };

        let options = SqliteConnectOptions::from_str(&conn_str)?
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .foreign_keys(true);

        // Every in-memory connection is its own database: hold exactly one, forever
        let pool_options = match path {
            Some(_) => SqlitePoolOptions::new().max_connections(10),
            None => SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None),
        };

        let pool = pool_options.connect_with(options).await?;

        let db = Self { pool };
        db.run_migrations().await?;

        Ok(db)
    }

    /// Run database migrations
    async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations...");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS combats (
                id TEXT PRIMARY KEY,
                dm_user_id TEXT NOT NULL,
                current_turn_index INTEGER NOT NULL DEFAULT 0,
                round_number INTEGER NOT NULL DEFAULT 1,
                status TEXT NOT NULL DEFAULT 'active',
                initiative_json TEXT NOT NULL DEFAULT '[]',
                initiative_scores_json TEXT NOT NULL DEFAULT '[]',
                participants_json TEXT NOT NULL DEFAULT '[]',
                battlefield_json TEXT NOT NULL,
                environment TEXT NOT NULL DEFAULT '',
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Append-only action log
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS combat_actions (
                id TEXT PRIMARY KEY,
                combat_id TEXT NOT NULL REFERENCES combats(id),
                actor_id TEXT NOT NULL,
                type TEXT NOT NULL,
                target_ids_json TEXT NOT NULL DEFAULT '[]',
                spell_id TEXT,
                weapon_name TEXT,
                movement_path_json TEXT NOT NULL DEFAULT '[]',
                extra_data_json TEXT NOT NULL DEFAULT 'null',
                result_description TEXT NOT NULL,
                seq INTEGER NOT NULL,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_combats_dm ON combats(dm_user_id)")
            .execute(&self.pool)
            .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_combat_actions_combat ON combat_actions(combat_id, seq)",
        )
        .execute(&self.pool)
        .await?;

        info!("Database migrations complete");
        Ok(())
    }

    /// Get the connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Check if database is healthy
    pub async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
