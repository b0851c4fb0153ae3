//! combatd - turn-based combat service
//!
//! Runs D&D 5e encounters: initiative, grid movement, attacks and spells,
//! with every change persisted to SQLite and streamed to websocket observers.

pub mod api;
pub mod broadcast;
pub mod combat;
pub mod config;
pub mod db;
pub mod persistence;
pub mod srd;

pub use config::{Config, LogFormat};

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::info;

use api::AppState;
use broadcast::BroadcastHub;
use combat::CombatManager;
use db::Database;
use persistence::SqliteGateway;
use srd::{MonsterDataProvider, SrdClient};

/// The combatd server instance
pub struct Server {
    config: Config,
    db: Arc<Database>,
    combat: Arc<CombatManager>,
    hub: BroadcastHub,
    shutdown_tx: watch::Sender<bool>,
    shutdown_rx: watch::Receiver<bool>,
}

impl Server {
    /// Create a new server reading reference data from the SRD API
    pub async fn new(config: Config) -> Result<Self> {
        let srd = SrdClient::new(config.srd_base_url.clone(), config.srd_cache_ttl())?;
        Self::with_provider(config, Arc::new(srd)).await
    }

    /// Create a server with a custom reference data source
    pub async fn with_provider(
        config: Config,
        monsters: Arc<dyn MonsterDataProvider>,
    ) -> Result<Self> {
        let db = Arc::new(Database::new(config.db_path.as_deref()).await?);
        let store = Arc::new(SqliteGateway::new(db.pool().clone()));
        let hub = BroadcastHub::spawn(config.subscriber_buffer);
        let combat = CombatManager::new(store, monsters, hub.clone()).shared();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        Ok(Self {
            config,
            db,
            combat,
            hub,
            shutdown_tx,
            shutdown_rx,
        })
    }

    /// Get the database handle
    pub fn db(&self) -> Arc<Database> {
        self.db.clone()
    }

    pub fn combat(&self) -> Arc<CombatManager> {
        self.combat.clone()
    }

    /// Build the router
    fn router(&self) -> Router {
        api::router(AppState {
            db: self.db.clone(),
            combat: self.combat.clone(),
            hub: self.hub.clone(),
        })
    }

    /// Run the server until shutdown
    pub async fn run(&self) -> Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr).await?;
        let local_addr = listener.local_addr()?;
        info!("combatd listening on {}", local_addr);

        let router = self.router();
        let mut shutdown_rx = self.shutdown_rx.clone();

        axum::serve(listener, router)
            .with_graceful_shutdown(async move {
                shutdown_rx.changed().await.ok();
            })
            .await?;

        info!("combatd shutdown complete");
        Ok(())
    }

    /// Signal the server to shutdown
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    /// Get the configured bind address
    pub fn bind_addr(&self) -> SocketAddr {
        self.config.bind_addr
    }
}
