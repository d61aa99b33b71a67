//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Credentials are referenced by env-var name in the config and
//! resolved at runtime via `std::env::var`.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::time::Duration;
use url::Url;

use crate::types::FluxError;

/// Default reconnect delay after the live connection drops.
pub const DEFAULT_RECONNECT_DELAY_SECS: u64 = 3;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    #[serde(default)]
    pub connection: ConnectionConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub notifications: NotificationsConfig,
    #[serde(default)]
    pub news: NewsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    /// WebSocket endpoint, e.g. `ws://localhost:8765/ws`.
    pub ws_url: String,
    /// REST base, e.g. `http://localhost:8765`.
    pub api_base: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ConnectionConfig {
    #[serde(default = "default_reconnect_delay")]
    pub reconnect_delay_secs: u64,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self { reconnect_delay_secs: DEFAULT_RECONNECT_DELAY_SECS }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    /// Env var holding a ready-made access token.
    pub token_env: String,
    pub username_env: Option<String>,
    pub password_env: Option<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct NotificationsConfig {
    pub enabled: bool,
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct NewsConfig {
    pub sources: Vec<String>,
    pub count: u32,
}

impl Default for NewsConfig {
    fn default() -> Self {
        Self {
            sources: crate::api::news::DEFAULT_SOURCES.iter().map(|s| s.to_string()).collect(),
            count: crate::api::news::DEFAULT_COUNT,
        }
    }
}

fn default_request_timeout() -> u64 {
    15
}

fn default_reconnect_delay() -> u64 {
    DEFAULT_RECONNECT_DELAY_SECS
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        config.validate()?;
        Ok(config)
    }

    /// Check that both endpoints parse and use the expected schemes.
    pub fn validate(&self) -> Result<(), FluxError> {
        let ws = self.ws_endpoint()?;
        if !matches!(ws.scheme(), "ws" | "wss") {
            return Err(FluxError::Config(format!("ws_url must use ws:// or wss://, got {ws}")));
        }
        let api = self.api_base()?;
        if !matches!(api.scheme(), "http" | "https") {
            return Err(FluxError::Config(format!("api_base must use http:// or https://, got {api}")));
        }
        Ok(())
    }

    pub fn ws_endpoint(&self) -> Result<Url, FluxError> {
        Url::parse(&self.server.ws_url)
            .map_err(|e| FluxError::Config(format!("invalid ws_url {}: {e}", self.server.ws_url)))
    }

    pub fn api_base(&self) -> Result<Url, FluxError> {
        Url::parse(&self.server.api_base)
            .map_err(|e| FluxError::Config(format!("invalid api_base {}: {e}", self.server.api_base)))
    }

    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_secs(self.connection.reconnect_delay_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    /// Resolve an environment variable name to its value.
    /// Useful for loading secrets referenced in the config.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }
}
