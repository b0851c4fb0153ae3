//! Shared test helpers for storage-backed tests

use sqlx::SqlitePool;

use super::Database;
use crate::persistence::SqliteGateway;

/// In-memory pool with every migration applied
pub async fn test_pool() -> SqlitePool {
    let db = Database::new(None)
        .await
        .expect("Failed to create test database");
    db.pool().clone()
}

/// Gateway over a fresh in-memory database
pub async fn test_gateway() -> SqliteGateway {
    SqliteGateway::new(test_pool().await)
}
