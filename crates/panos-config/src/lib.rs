//! Configuration for the PAN-OS router driver.
//!
//! One TOML file (plus `PANOS_` environment overrides) describes the
//! management endpoint, the names written into device configuration and
//! which router driver to run. This crate resolves credentials and turns
//! that file into a `panos_api::SessionConfig`, a `panos_core::PanoramaConnector`
//! and a ready `panos_core::RouterDriver`.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use panos_api::{Scheme, SessionConfig, TlsMode};
use panos_core::{
    ConnectorSettings, DriverKind, InMemoryReservationStore, PanoramaConnector, ReservationStore,
    RouterDriver,
};

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no credentials configured for host '{host}'")]
    NoCredentials { host: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        field: field.into(),
        reason: reason.into(),
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    /// "agent" or "device".
    #[serde(default)]
    pub driver: DriverKind,

    /// Management endpoint.
    #[serde(default)]
    pub connection: Connection,

    /// Names written into device configuration.
    #[serde(default)]
    pub device: ConnectorSettings,
}

/// The `[connection]` table.
#[derive(Debug, Deserialize, Serialize)]
pub struct Connection {
    /// Management node hostname or address.
    pub host: Option<String>,

    pub port: Option<u16>,

    /// API key (plaintext; prefer `api_key_env`).
    pub api_key: Option<String>,

    /// Environment variable name containing the API key.
    pub api_key_env: Option<String>,

    /// Administrator login, exchanged for a key on first use.
    pub username: Option<String>,
    pub password: Option<String>,

    /// Talk plain HTTP instead of HTTPS.
    #[serde(default)]
    pub use_http: bool,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Path to custom CA certificate.
    pub ca_cert: Option<PathBuf>,

    /// Accept any server certificate.
    #[serde(default)]
    pub insecure: bool,
}

impl Default for Connection {
    fn default() -> Self {
        Self {
            host: None,
            port: None,
            api_key: None,
            api_key_env: None,
            username: None,
            password: None,
            use_http: false,
            timeout: default_timeout(),
            ca_cert: None,
            insecure: false,
        }
    }
}

fn default_timeout() -> u64 {
    30
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("org", "panos-router", "panos-router").map_or_else(
        || PathBuf::from(".").join("panos-router.toml"),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the config from the platform config file and the environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load the config from `path` merged with `PANOS_` environment variables.
///
/// Nested keys use a double underscore: `PANOS_CONNECTION__HOST`,
/// `PANOS_DEVICE__DEVICE_GROUP`, `PANOS_DRIVER`. A missing file yields
/// the defaults.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    debug!(path = %path.display(), "loading config");
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("PANOS_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write it to `path`.
pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Credential resolution ───────────────────────────────────────────

/// Credentials from the `[connection]` table, in the builder's terms.
#[derive(Debug)]
pub enum ResolvedCredentials {
    ApiKey(SecretString),
    Login {
        username: String,
        password: SecretString,
    },
}

/// Resolve credentials: `api_key_env`, then `api_key`, then
/// `username` + `password`.
pub fn resolve_credentials(connection: &Connection) -> Result<ResolvedCredentials, ConfigError> {
    if let Some(val) = connection
        .api_key_env
        .as_deref()
        .and_then(|name| std::env::var(name).ok())
    {
        return Ok(ResolvedCredentials::ApiKey(SecretString::from(val)));
    }

    if let Some(ref key) = connection.api_key {
        return Ok(ResolvedCredentials::ApiKey(SecretString::from(key.clone())));
    }

    match (&connection.username, &connection.password) {
        (Some(username), Some(password)) => Ok(ResolvedCredentials::Login {
            username: username.clone(),
            password: SecretString::from(password.clone()),
        }),
        _ => Err(ConfigError::NoCredentials {
            host: connection.host.clone().unwrap_or_default(),
        }),
    }
}

// ── Translation ─────────────────────────────────────────────────────

/// Build the management-node `SessionConfig` from `[connection]`.
pub fn session_config(connection: &Connection) -> Result<SessionConfig, ConfigError> {
    let host = connection
        .host
        .as_deref()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| invalid("connection.host", "hostname is required"))?;

    if connection.port == Some(0) {
        return Err(invalid("connection.port", "port must be between 1 and 65535"));
    }
    let timeout = i64::try_from(connection.timeout)
        .ok()
        .filter(|t| *t > 0)
        .ok_or_else(|| invalid("connection.timeout", "timeout must be a positive number of seconds"))?;

    let tls = if connection.insecure {
        TlsMode::DangerAcceptInvalid
    } else if let Some(ref ca_path) = connection.ca_cert {
        TlsMode::CustomCa(ca_path.clone())
    } else {
        TlsMode::System
    };

    let mut builder = SessionConfig::builder(host)
        .scheme(if connection.use_http {
            Scheme::Http
        } else {
            Scheme::Https
        })
        .timeout_secs(timeout)
        .tls(tls);
    if let Some(port) = connection.port {
        builder = builder.port(i64::from(port));
    }
    builder = match resolve_credentials(connection)? {
        ResolvedCredentials::ApiKey(key) => builder.api_key(key),
        ResolvedCredentials::Login { username, password } => {
            builder.username(username).password(password)
        }
    };

    builder
        .build()
        .map_err(|e| invalid("connection", e.to_string()))
}

/// Build the device command facade for this config.
pub fn connector(cfg: &Config) -> Result<PanoramaConnector, ConfigError> {
    Ok(PanoramaConnector::new(
        session_config(&cfg.connection)?,
        cfg.device.clone(),
    ))
}

/// Build the configured router driver over `store`.
pub fn router_driver_with_store(
    cfg: &Config,
    store: Arc<dyn ReservationStore>,
) -> Result<RouterDriver, ConfigError> {
    if cfg.driver == DriverKind::Agent {
        return Ok(RouterDriver::Agent);
    }
    Ok(RouterDriver::from_kind(cfg.driver, connector(cfg)?, store))
}

/// Build the configured router driver with an in-memory reservation store.
pub fn router_driver(cfg: &Config) -> Result<RouterDriver, ConfigError> {
    router_driver_with_store(cfg, Arc::new(InMemoryReservationStore::new()))
}
