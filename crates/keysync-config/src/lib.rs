//! Shared configuration for the keysync CLI.
//!
//! TOML settings, platform paths, federated-token resolution (env +
//! keyring + plaintext), session persistence, and translation to
//! `keysync_core::ControllerConfig`. The core never reads files itself.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use keysync_core::{ControllerConfig, GroupId, ReconcileSettings, SessionState};

/// Keyring service name under which ID tokens are stored.
pub const KEYRING_SERVICE: &str = "keysync";

/// Environment variable consulted for the ID token when `token_env` is unset.
pub const DEFAULT_TOKEN_ENV: &str = "KEYSYNC_ID_TOKEN";

const ENV_PREFIX: &str = "KEYSYNC_";
const SESSION_FILE: &str = "session.toml";
const PROFILES_FILE: &str = "profiles.json";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no ID token available for account '{account}'")]
    NoCredentials { account: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct Config {
    /// Control-plane base URL.
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Profile group every imported key lands in.
    #[serde(default = "default_import_group")]
    pub import_group: u64,

    /// Name given to the account's primary key.
    #[serde(default = "default_auto_label")]
    pub auto_label: String,

    /// Name of the loopback placeholder profile.
    #[serde(default = "default_placeholder_name")]
    pub placeholder_name: String,

    /// Background status refresh in seconds. 0 disables it.
    #[serde(default)]
    pub status_interval: u64,

    /// Overrides the platform data directory (session and profiles).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<PathBuf>,

    #[serde(default)]
    pub tunnel: TunnelHooks,

    #[serde(default)]
    pub account: AccountConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            timeout: default_timeout(),
            import_group: default_import_group(),
            auto_label: default_auto_label(),
            placeholder_name: default_placeholder_name(),
            status_interval: 0,
            data_dir: None,
            tunnel: TunnelHooks::default(),
            account: AccountConfig::default(),
        }
    }
}

/// Shell commands that drive the local tunnel.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct TunnelHooks {
    /// Exit status 0 means the tunnel is running.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reload: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct AccountConfig {
    /// Federated ID token (plaintext, prefer keyring or env var).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub federated_token: Option<String>,

    /// Environment variable name containing the ID token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_env: Option<String>,
}

fn default_api_url() -> String {
    "http://127.0.0.1:8082/".into()
}
fn default_timeout() -> u64 {
    30
}
fn default_import_group() -> u64 {
    GroupId::DEFAULT.0
}
fn default_auto_label() -> String {
    ReconcileSettings::default().auto_label
}
fn default_placeholder_name() -> String {
    ReconcileSettings::default().placeholder_name
}

// ── Paths ───────────────────────────────────────────────────────────

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "keysync", "keysync")
}

fn home_fallback(parts: &[&str]) -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.extend(parts);
    p
}

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    project_dirs().map_or_else(
        || home_fallback(&[".config", "keysync", "config.toml"]),
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

/// Platform data directory for session state and profiles.
pub fn default_data_dir() -> PathBuf {
    project_dirs().map_or_else(
        || home_fallback(&[".local", "share", "keysync"]),
        |dirs| dirs.data_dir().to_path_buf(),
    )
}

impl Config {
    pub fn data_dir(&self) -> PathBuf {
        self.data_dir.clone().unwrap_or_else(default_data_dir)
    }

    pub fn session_path(&self) -> PathBuf {
        self.data_dir().join(SESSION_FILE)
    }

    pub fn profiles_path(&self) -> PathBuf {
        self.data_dir().join(PROFILES_FILE)
    }
}

// ── Config loading ──────────────────────────────────────────────────

fn figment_for(path: &Path) -> Figment {
    Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX).split("__"))
}

/// Load the full Config from the given file + environment. A missing
/// file contributes nothing.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    debug!(path = %path.display(), "loading config");
    Ok(figment_for(path).extract()?)
}

/// Load the full Config from the canonical path + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write it to `path`.
pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    let toml_str = toml::to_string_pretty(cfg)?;
    write_atomic(path, &toml_str)
}

// ── Session persistence ─────────────────────────────────────────────

/// Read persisted session state. A missing file is an empty session.
pub fn load_session(path: &Path) -> Result<SessionState, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(text) => toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        }),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(SessionState::default()),
        Err(e) => Err(e.into()),
    }
}

pub fn save_session(path: &Path, state: &SessionState) -> Result<(), ConfigError> {
    let toml_str = toml::to_string_pretty(state)?;
    write_atomic(path, &toml_str)
}

fn write_atomic(path: &Path, contents: &str) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, contents)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}

// ── Credential resolution ───────────────────────────────────────────

fn keyring_entry(account: &str) -> Result<keyring::Entry, keyring::Error> {
    keyring::Entry::new(KEYRING_SERVICE, &format!("{account}/id-token"))
}

impl Config {
    /// Resolve the federated ID token for `account`.
    pub fn resolve_federated_token(&self, account: &str) -> Result<SecretString, ConfigError> {
        // 1. Env var named by token_env
        let env_name = self
            .account
            .token_env
            .as_deref()
            .unwrap_or(DEFAULT_TOKEN_ENV);
        if let Ok(val) = std::env::var(env_name) {
            if !val.trim().is_empty() {
                return Ok(SecretString::from(val));
            }
        }

        // 2. System keyring
        if let Ok(entry) = keyring_entry(account) {
            if let Ok(secret) = entry.get_password() {
                return Ok(SecretString::from(secret));
            }
        }

        // 3. Plaintext in config
        if let Some(ref token) = self.account.federated_token {
            return Ok(SecretString::from(token.clone()));
        }

        Err(ConfigError::NoCredentials {
            account: account.into(),
        })
    }
}

/// Store an ID token in the system keyring for later silent re-entry.
pub fn store_federated_token(account: &str, token: &SecretString) -> Result<(), ConfigError> {
    keyring_entry(account)?.set_password(token.expose_secret())?;
    debug!(account, "stored ID token in keyring");
    Ok(())
}

/// Remove a stored ID token. Absence is not an error.
pub fn delete_federated_token(account: &str) -> Result<(), ConfigError> {
    match keyring_entry(account)?.delete_credential() {
        Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
        Err(e) => Err(e.into()),
    }
}

// ── Translation to core ─────────────────────────────────────────────

impl Config {
    /// Build the core's runtime `ControllerConfig`.
    pub fn to_controller_config(&self) -> Result<ControllerConfig, ConfigError> {
        let api_url: url::Url = self.api_url.parse().map_err(|_| ConfigError::Validation {
            field: "api_url".into(),
            reason: format!("invalid URL: {}", self.api_url),
        })?;

        if self.auto_label.trim().is_empty() {
            return Err(ConfigError::Validation {
                field: "auto_label".into(),
                reason: "must not be empty".into(),
            });
        }
        if self.placeholder_name.trim().is_empty() {
            return Err(ConfigError::Validation {
                field: "placeholder_name".into(),
                reason: "must not be empty".into(),
            });
        }

        Ok(ControllerConfig {
            api_url,
            timeout: Duration::from_secs(self.timeout),
            reconcile: ReconcileSettings {
                group: GroupId(self.import_group),
                auto_label: self.auto_label.clone(),
                placeholder_name: self.placeholder_name.clone(),
            },
            status_interval_secs: self.status_interval,
        })
    }
}
