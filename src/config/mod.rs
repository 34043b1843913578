//! Configuration module for the site backend.
//!
//! All configuration is loaded from environment variables with sensible defaults.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

/// Deployment id used when `IMPULSE_APP_ID` is not set.
pub const DEFAULT_DEPLOYMENT_ID: &str = "impulse-academy-default";

/// Passcode used when `IMPULSE_ADMIN_PASSCODE` is not set.
pub const DEFAULT_ADMIN_PASSCODE: &str = "admin123";

/// Idle lifetime of a UI session when `IMPULSE_SESSION_IDLE_SECS` is not set.
pub const DEFAULT_SESSION_IDLE_SECS: u64 = 30 * 60;

/// Errors raised while reading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid IMPULSE_BIND_ADDR format: {0}")]
    BindAddr(String),

    #[error("Invalid IMPULSE_SESSION_IDLE_SECS: {0}")]
    SessionIdle(String),

    #[error("Invalid IMPULSE_STORE_CONFIG: {0}")]
    StoreConnection(#[from] serde_json::Error),
}

/// Connection parameters for the document store, injected as one JSON blob.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StoreConnection {
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Custom tokens the auth service will accept.
    #[serde(default)]
    pub trusted_tokens: Vec<String>,
}

fn default_database_path() -> PathBuf {
    PathBuf::from("./data/site.sqlite")
}

fn default_max_connections() -> u32 {
    5
}

impl Default for StoreConnection {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            max_connections: default_max_connections(),
            trusted_tokens: Vec::new(),
        }
    }
}

impl StoreConnection {
    /// Parse the JSON blob describing the store connection.
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(raw)?)
    }
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Deployment/tenant identifier scoping every store path
    pub deployment_id: String,
    /// Store connection parameters
    pub store: StoreConnection,
    /// Pre-provisioned auth token, preferred over anonymous sign-in
    pub initial_auth_token: Option<String>,
    /// Passcode for the admin view (UI convenience only)
    pub admin_passcode: String,
    /// Address to bind the server to
    pub bind_addr: SocketAddr,
    /// UI sessions idle longer than this are evicted
    pub session_idle_ttl: Duration,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let deployment_id = env::var("IMPULSE_APP_ID")
            .ok()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_DEPLOYMENT_ID.to_string());

        let store = match env::var("IMPULSE_STORE_CONFIG") {
            Ok(raw) if !raw.trim().is_empty() => StoreConnection::parse(&raw)?,
            _ => StoreConnection::default(),
        };

        let initial_auth_token = env::var("IMPULSE_INITIAL_AUTH_TOKEN")
            .ok()
            .filter(|s| !s.is_empty());

        let admin_passcode = env::var("IMPULSE_ADMIN_PASSCODE")
            .unwrap_or_else(|_| DEFAULT_ADMIN_PASSCODE.to_string());

        let raw_addr =
            env::var("IMPULSE_BIND_ADDR").unwrap_or_else(|_| "127.0.0.1:8080".to_string());
        let bind_addr = raw_addr
            .parse()
            .map_err(|_| ConfigError::BindAddr(raw_addr.clone()))?;

        let session_idle_ttl = match env::var("IMPULSE_SESSION_IDLE_SECS") {
            Ok(raw) => raw
                .trim()
                .parse()
                .map(Duration::from_secs)
                .map_err(|_| ConfigError::SessionIdle(raw.clone()))?,
            Err(_) => Duration::from_secs(DEFAULT_SESSION_IDLE_SECS),
        };

        let log_level = env::var("IMPULSE_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            deployment_id,
            store,
            initial_auth_token,
            admin_passcode,
            bind_addr,
            session_idle_ttl,
            log_level,
        })
    }
}
