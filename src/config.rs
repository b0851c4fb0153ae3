//! Server configuration
//!
//! Layered with figment: built-in defaults, then a TOML file, then the
//! environment. `SRD_API_BASE_URL` sets the SRD endpoint; everything else
//! uses `COMBATD_`-prefixed variables (e.g. `COMBATD_BIND_ADDR`).

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::broadcast::DEFAULT_SUBSCRIBER_BUFFER;
use crate::srd::{DEFAULT_CACHE_TTL, DEFAULT_SRD_BASE_URL};

/// Config file read when no path is given; missing is fine
pub const DEFAULT_CONFIG_FILE: &str = "combatd.toml";

/// Unprefixed variable for the SRD endpoint
pub const SRD_URL_ENV: &str = "SRD_API_BASE_URL";

/// Log line format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Server configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub bind_addr: SocketAddr,
    /// SQLite file; None = in-memory
    pub db_path: Option<String>,
    pub srd_base_url: String,
    pub srd_cache_ttl_secs: u64,
    /// Events buffered per websocket before it is dropped
    pub subscriber_buffer: usize,
    pub log_format: LogFormat,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            db_path: None,
            srd_base_url: DEFAULT_SRD_BASE_URL.to_string(),
            srd_cache_ttl_secs: DEFAULT_CACHE_TTL.as_secs(),
            subscriber_buffer: DEFAULT_SUBSCRIBER_BUFFER,
            log_format: LogFormat::Text,
        }
    }
}

impl Config {
    /// Load defaults, the TOML file and the environment, in that order
    pub fn load(path: Option<&Path>) -> Result<Self, figment::Error> {
        let file = path.unwrap_or_else(|| Path::new(DEFAULT_CONFIG_FILE));
        Self::from_figment(
            Figment::from(Serialized::defaults(Config::default()))
                .merge(Toml::file(file))
                .merge(Env::raw().only(&[SRD_URL_ENV]).map(|_| "srd_base_url".into()))
                .merge(Env::prefixed("COMBATD_")),
        )
    }

    pub fn from_figment(figment: Figment) -> Result<Self, figment::Error> {
        figment.extract()
    }

    pub fn srd_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.srd_cache_ttl_secs)
    }
}
