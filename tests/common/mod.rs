//! Common test utilities - CombatdTest harness for end-to-end testing

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use combatd::srd::StaticProvider;
use combatd::{Config, Server};
use futures_util::{SinkExt, StreamExt};
use reqwest::Client;
use serde_json::{json, Value};
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};

/// Test harness that spawns a real combatd server on a random port
pub struct CombatdTest {
    pub addr: SocketAddr,
    pub client: Client,
    server: Arc<Server>,
    _handle: JoinHandle<()>,
}

impl CombatdTest {
    /// Start a server backed by the built-in monster catalog
    pub async fn start() -> Result<Self> {
        // Find a random available port
        let listener = std::net::TcpListener::bind("127.0.0.1:0")?;
        let addr = listener.local_addr()?;
        drop(listener);

        let config = Config {
            bind_addr: addr,
            db_path: None, // In-memory for tests
            ..Config::default()
        };

        let server =
            Arc::new(Server::with_provider(config, Arc::new(StaticProvider::with_basics())).await?);
        let server_clone = server.clone();

        let handle = tokio::spawn(async move {
            if let Err(e) = server_clone.run().await {
                eprintln!("Server error: {}", e);
            }
        });

        let client = Client::builder().timeout(Duration::from_secs(5)).build()?;

        // Poll until server is ready (max 2 seconds)
        let mut ready = false;
        for _ in 0..20 {
            tokio::time::sleep(Duration::from_millis(100)).await;
            if client
                .get(format!("http://{}/health", addr))
                .send()
                .await
                .is_ok()
            {
                ready = true;
                break;
            }
        }

        if !ready {
            panic!("Server failed to start within 2 seconds");
        }

        Ok(Self {
            addr,
            client,
            server,
            _handle: handle,
        })
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// GET as `user`
    pub async fn get(&self, path: &str, user: &str) -> Result<reqwest::Response> {
        Ok(self
            .client
            .get(format!("{}{}", self.base_url(), path))
            .header("x-user-id", user)
            .send()
            .await?)
    }

    /// POST a JSON body as `user`
    pub async fn post<T: serde::Serialize + ?Sized>(
        &self,
        path: &str,
        user: &str,
        body: &T,
    ) -> Result<reqwest::Response> {
        Ok(self
            .client
            .post(format!("{}{}", self.base_url(), path))
            .header("x-user-id", user)
            .json(body)
            .send()
            .await?)
    }

    /// Start a fight between alice's hero and one goblin, with `dm` running it
    pub async fn create_goblin_fight(&self) -> Result<Value> {
        let body = json!({
            "characters": [hero_sheet("hero", "alice")],
            "monster_ids": ["goblin"],
            "environment": "dungeon",
        });
        let response = self.post("/api/v1/combat", "alice", &body).await?;
        anyhow::ensure!(
            response.status() == 201,
            "create failed with {}",
            response.status()
        );
        Ok(response.json().await?)
    }

    pub fn server(&self) -> Arc<Server> {
        self.server.clone()
    }

    /// WebSocket URL for one combat, naming the caller in the query
    pub fn ws_url(&self, combat_id: &str, user: &str) -> String {
        format!("ws://{}/api/v1/ws/combat/{}?user_id={}", self.addr, combat_id, user)
    }

    /// Subscribe to a combat's event feed
    pub async fn connect_ws(&self, combat_id: &str, user: &str) -> Result<WsClient> {
        let (ws_stream, _) = connect_async(self.ws_url(combat_id, user)).await?;
        let (write, read) = ws_stream.split();
        Ok(WsClient { write, read })
    }

    /// Shutdown the server gracefully
    pub fn shutdown(&self) {
        self.server.shutdown();
    }
}

impl Drop for CombatdTest {
    fn drop(&mut self) {
        self.server.shutdown();
    }
}

/// A level 1 fighter owned by `user`
pub fn hero_sheet(id: &str, user: &str) -> Value {
    json!({
        "id": id,
        "user_id": user,
        "name": "Hero",
        "race": "human",
        "class": "fighter",
        "level": 1,
        "strength": 16,
        "dexterity": 12,
        "hit_points": 12,
        "max_hit_points": 12,
        "armor_class": 16,
        "equipment": ["longsword"],
        "spells": []
    })
}

/// WebSocket client for testing
pub struct WsClient {
    write: futures_util::stream::SplitSink<
        tokio_tungstenite::WebSocketStream<
            tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
        >,
        Message,
    >,
    read: futures_util::stream::SplitStream<
        tokio_tungstenite::WebSocketStream<
            tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>,
        >,
    >,
}

impl WsClient {
    /// Receive the next message as JSON
    pub async fn recv_json(&mut self) -> Result<Value> {
        loop {
            match self.read.next().await {
                Some(Ok(Message::Text(text))) => {
                    return Ok(serde_json::from_str(&text)?);
                }
                Some(Ok(Message::Close(_))) | None => {
                    anyhow::bail!("WebSocket closed");
                }
                Some(Err(e)) => return Err(e.into()),
                _ => continue, // Skip binary/ping/pong frames
            }
        }
    }

    /// Receive with timeout
    pub async fn recv_json_timeout(&mut self, timeout: Duration) -> Result<Value> {
        match tokio::time::timeout(timeout, self.recv_json()).await {
            Ok(result) => result,
            Err(_) => anyhow::bail!("Timeout waiting for WebSocket message"),
        }
    }

    /// Skip messages until one of the given type arrives
    pub async fn recv_type(&mut self, kind: &str) -> Result<Value> {
        loop {
            let msg = self.recv_json_timeout(Duration::from_secs(2)).await?;
            if msg["type"] == kind {
                return Ok(msg);
            }
        }
    }

    /// Close the connection
    pub async fn close(&mut self) -> Result<()> {
        self.write.close().await?;
        Ok(())
    }
}
