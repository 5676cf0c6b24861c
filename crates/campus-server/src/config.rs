//! Server configuration loading from file and environment variables.

use campus_db::{DbRuntimeSettings, RerunPolicy, MONITORED_TABLES};
use ed25519_dalek::SigningKey;
use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use thiserror::Error;

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server network settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Database settings.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Audit log settings.
    #[serde(default)]
    pub audit: AuditConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Document signing settings.
    #[serde(default)]
    pub signing: SigningConfig,
}

/// Network configuration for the HTTP server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file, or `:memory:`.
    #[serde(default = "default_db_path")]
    pub path: String,

    /// SQLite busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Maximum pooled connections. Forced to 1 for `:memory:`.
    #[serde(default = "default_pool_max_size")]
    pub pool_max_size: u32,

    /// Create the schema and load fixtures at startup.
    #[serde(default)]
    pub bootstrap: bool,

    /// What setup does when the schema already exists.
    #[serde(default)]
    pub rerun_policy: RerunPolicy,
}

/// Audit log configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AuditConfig {
    /// Tables whose mutations are recorded.
    #[serde(default = "default_monitored_tables")]
    pub monitored_tables: Vec<String>,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "campus_server=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

/// Document signing configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SigningConfig {
    /// Hex-encoded 32-byte Ed25519 secret key. A random key is generated at
    /// startup when unset, so signatures do not survive a restart.
    #[serde(default)]
    pub key_hex: Option<String>,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
}

fn default_port() -> u16 {
    3000
}

fn default_db_path() -> String {
    "campus.db".to_string()
}

fn default_busy_timeout_ms() -> u64 {
    DbRuntimeSettings::default().busy_timeout_ms
}

fn default_pool_max_size() -> u32 {
    4
}

fn default_monitored_tables() -> Vec<String> {
    MONITORED_TABLES.iter().map(|t| t.to_string()).collect()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
            pool_max_size: default_pool_max_size(),
            bootstrap: false,
            rerun_policy: RerunPolicy::default(),
        }
    }
}

impl DatabaseConfig {
    /// Returns the pool settings for this configuration.
    pub fn runtime_settings(&self) -> DbRuntimeSettings {
        let pool_max_size = if self.path == ":memory:" {
            1
        } else {
            self.pool_max_size.max(1)
        };
        DbRuntimeSettings {
            busy_timeout_ms: self.busy_timeout_ms,
            pool_max_size,
        }
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            monitored_tables: default_monitored_tables(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl SigningConfig {
    /// Decodes the configured key, or generates a fresh one when unset.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidSigningKey` if `key_hex` is not 64 hex
    /// characters.
    pub fn signing_key(&self) -> Result<SigningKey, ConfigError> {
        match &self.key_hex {
            Some(key_hex) => {
                let bytes = hex::decode(key_hex.trim())
                    .map_err(|e| ConfigError::InvalidSigningKey(e.to_string()))?;
                let secret: [u8; 32] = bytes.try_into().map_err(|_| {
                    ConfigError::InvalidSigningKey("expected 32 bytes".to_string())
                })?;
                Ok(SigningKey::from_bytes(&secret))
            }
            None => {
                tracing::warn!("no signing key configured, generating an ephemeral key");
                Ok(SigningKey::generate(&mut rand::rngs::OsRng))
            }
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// The configured signing key is not a valid Ed25519 secret key.
    #[error("invalid signing key: {0}")]
    InvalidSigningKey(String),
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `CAMPUS_HOST` overrides `server.host`
/// - `CAMPUS_PORT` overrides `server.port`
/// - `CAMPUS_DB_PATH` overrides `database.path`
/// - `CAMPUS_DB_BUSY_TIMEOUT_MS` overrides `database.busy_timeout_ms`
/// - `CAMPUS_DB_POOL_MAX_SIZE` overrides `database.pool_max_size`
/// - `CAMPUS_BOOTSTRAP` overrides `database.bootstrap` ("true" or "1")
/// - `CAMPUS_RERUN_POLICY` overrides `database.rerun_policy`
///   ("drop_existing" or "fail_if_exists")
/// - `CAMPUS_AUDIT_TABLES` overrides `audit.monitored_tables` (comma separated)
/// - `CAMPUS_LOG_LEVEL` overrides `logging.level`
/// - `CAMPUS_LOG_JSON` overrides `logging.json` ("true" or "1")
/// - `CAMPUS_SIGNING_KEY` overrides `signing.key_hex`
///
/// Unparseable numeric or enum overrides are ignored.
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    apply_env_overrides(&mut config, |key| std::env::var(key).ok());
    Ok(config)
}

fn is_truthy(value: &str) -> bool {
    value == "true" || value == "1"
}

/// Applies `CAMPUS_*` overrides read through `lookup`.
fn apply_env_overrides(config: &mut Config, lookup: impl Fn(&str) -> Option<String>) {
    if let Some(host) = lookup("CAMPUS_HOST") {
        if let Ok(parsed) = host.parse() {
            config.server.host = parsed;
        }
    }
    if let Some(port) = lookup("CAMPUS_PORT") {
        if let Ok(parsed) = port.parse() {
            config.server.port = parsed;
        }
    }
    if let Some(db_path) = lookup("CAMPUS_DB_PATH") {
        config.database.path = db_path;
    }
    if let Some(timeout) = lookup("CAMPUS_DB_BUSY_TIMEOUT_MS") {
        if let Ok(parsed) = timeout.parse() {
            config.database.busy_timeout_ms = parsed;
        }
    }
    if let Some(size) = lookup("CAMPUS_DB_POOL_MAX_SIZE") {
        if let Ok(parsed) = size.parse() {
            config.database.pool_max_size = parsed;
        }
    }
    if let Some(bootstrap) = lookup("CAMPUS_BOOTSTRAP") {
        config.database.bootstrap = is_truthy(&bootstrap);
    }
    if let Some(policy) = lookup("CAMPUS_RERUN_POLICY") {
        match policy.as_str() {
            "drop_existing" => config.database.rerun_policy = RerunPolicy::DropExisting,
            "fail_if_exists" => config.database.rerun_policy = RerunPolicy::FailIfExists,
            other => tracing::warn!(value = other, "ignoring unknown CAMPUS_RERUN_POLICY"),
        }
    }
    if let Some(tables) = lookup("CAMPUS_AUDIT_TABLES") {
        config.audit.monitored_tables = tables
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect();
    }
    if let Some(level) = lookup("CAMPUS_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Some(json) = lookup("CAMPUS_LOG_JSON") {
        config.logging.json = is_truthy(&json);
    }
    if let Some(key) = lookup("CAMPUS_SIGNING_KEY") {
        config.signing.key_hex = Some(key);
    }
}
