//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` variants into user-facing errors with
//! actionable help text and stable exit codes.

use miette::Diagnostic;
use thiserror::Error;

use keysync_config::ConfigError;
use keysync_core::{CoreError, ReconcileError, StoreError};

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const CONFLICT: i32 = 6;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
    pub const KEY_PARSE: i32 = 9;
    pub const STORAGE: i32 = 10;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not reach the control-plane at {url}")]
    #[diagnostic(
        code(keysync::connection_failed),
        help(
            "Check your network connection and the configured api_url.\n\
             Reason: {reason}"
        )
    )]
    ConnectionFailed { url: String, reason: String },

    #[error("Request timed out")]
    #[diagnostic(
        code(keysync::timeout),
        help("Increase the timeout with --timeout or in the config file.")
    )]
    Timeout,

    // ── Authentication ───────────────────────────────────────────────
    #[error("Authentication failed: {message}")]
    #[diagnostic(
        code(keysync::auth_failed),
        help("Log in again with: keysync login google  (or: keysync login phone <NUMBER>)")
    )]
    AuthFailed { message: String },

    #[error("Not logged in")]
    #[diagnostic(
        code(keysync::not_logged_in),
        help("Log in first with: keysync login google  (or: keysync login phone <NUMBER>)")
    )]
    NotLoggedIn,

    #[error("No ID token available for account '{account}'")]
    #[diagnostic(
        code(keysync::no_token),
        help(
            "Pass one with: keysync login google --token <TOKEN>\n\
             Or set KEYSYNC_ID_TOKEN, or [account] federated_token in the config file."
        )
    )]
    NoToken { account: String },

    // ── Resources ────────────────────────────────────────────────────
    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(
        code(keysync::not_found),
        help("Run: keysync {list_command}")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
        list_command: String,
    },

    #[error("{resource_type} '{identifier}' {reason}")]
    #[diagnostic(code(keysync::conflict))]
    Conflict {
        resource_type: String,
        identifier: String,
        reason: String,
    },

    // ── Reconciliation ───────────────────────────────────────────────
    #[error("Key material could not be decoded")]
    #[diagnostic(
        code(keysync::key_parse),
        help(
            "Supported: vless://, vmess://, trojan://, ss://, tuic://, hysteria2:// links, \
             or a base64 subscription blob."
        )
    )]
    KeyParse,

    #[error("Profile storage failed: {message}")]
    #[diagnostic(
        code(keysync::storage),
        help(
            "{committed} profile(s) were saved before the failure; the active profile was \
             not changed. Check free space and permissions of the data directory, then retry."
        )
    )]
    Storage { message: String, committed: usize },

    // ── Control-plane ────────────────────────────────────────────────
    #[error("Rejected: {message}")]
    #[diagnostic(code(keysync::rejected))]
    Rejected { message: String },

    #[error("API error{}: {message}", .status.map(|s| format!(" ({s})")).unwrap_or_default())]
    #[diagnostic(code(keysync::api_error))]
    ApiError { status: Option<u16>, message: String },

    // ── Tunnel ───────────────────────────────────────────────────────
    #[error("Tunnel hook failed: {message}")]
    #[diagnostic(
        code(keysync::tunnel),
        help("Check the [tunnel] commands in the config file.")
    )]
    Tunnel { message: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(keysync::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Configuration error: {message}")]
    #[diagnostic(
        code(keysync::config),
        help("Inspect the file with: keysync config show")
    )]
    Config { message: String },

    #[error("Controller stopped before the request completed")]
    #[diagnostic(code(keysync::internal))]
    Internal,

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::Timeout => exit_code::TIMEOUT,
            Self::AuthFailed { .. } | Self::NotLoggedIn | Self::NoToken { .. } => exit_code::AUTH,
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::Conflict { .. } => exit_code::CONFLICT,
            Self::KeyParse => exit_code::KEY_PARSE,
            Self::Storage { .. } => exit_code::STORAGE,
            Self::Validation { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ConnectionFailed { url, reason } => {
                CliError::ConnectionFailed { url, reason }
            }
            CoreError::Timeout => CliError::Timeout,
            CoreError::AuthenticationFailed { message } => CliError::AuthFailed { message },
            CoreError::NotLoggedIn => CliError::NotLoggedIn,
            CoreError::NoStatusIdentity => CliError::NotFound {
                resource_type: "active profile".into(),
                identifier: "(none selected)".into(),
                list_command: "profiles list".into(),
            },
            CoreError::ControllerStopped => CliError::Internal,
            CoreError::NotFound {
                entity_type,
                identifier,
            } => CliError::NotFound {
                list_command: list_command_for(&entity_type).into(),
                resource_type: entity_type,
                identifier,
            },
            CoreError::Rejected { message } => CliError::Rejected { message },
            CoreError::Reconcile(e) => e.into(),
            CoreError::Store(e) => store_error(&e, 0),
            CoreError::Tunnel(e) => CliError::Tunnel {
                message: e.to_string(),
            },
            CoreError::Api { message, status } => CliError::ApiError { status, message },
        }
    }
}

impl From<ReconcileError> for CliError {
    fn from(err: ReconcileError) -> Self {
        match err {
            ReconcileError::KeyParse => CliError::KeyParse,
            ReconcileError::Storage { committed, source } => store_error(&source, committed.len()),
        }
    }
}

impl From<StoreError> for CliError {
    fn from(err: StoreError) -> Self {
        store_error(&err, 0)
    }
}

fn store_error(err: &StoreError, committed: usize) -> CliError {
    CliError::Storage {
        message: err.to_string(),
        committed,
    }
}

fn list_command_for(entity_type: &str) -> &'static str {
    match entity_type {
        "issued key" => "keys list",
        _ => "profiles list",
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            ConfigError::NoCredentials { account } => CliError::NoToken { account },
            ConfigError::Io(e) => CliError::Io(e),
            other => CliError::Config {
                message: other.to_string(),
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use keysync_core::ProfileId;

    #[test]
    fn reconcile_failures_have_distinct_exit_codes() {
        let parse: CliError = CoreError::Reconcile(ReconcileError::KeyParse).into();
        let storage: CliError = CoreError::Reconcile(ReconcileError::Storage {
            committed: vec![ProfileId(1), ProfileId(2)],
            source: StoreError::Unavailable {
                message: "disk full".into(),
            },
        })
        .into();

        assert_eq!(parse.exit_code(), exit_code::KEY_PARSE);
        assert_eq!(storage.exit_code(), exit_code::STORAGE);
        assert!(matches!(storage, CliError::Storage { committed: 2, .. }));
    }

    #[test]
    fn auth_errors_map_to_auth_exit_code() {
        let err: CliError = CoreError::AuthenticationFailed {
            message: "Invalid Google token".into(),
        }
        .into();
        assert_eq!(err.exit_code(), exit_code::AUTH);
        assert_eq!(CliError::from(CoreError::NotLoggedIn).exit_code(), exit_code::AUTH);
    }

    #[test]
    fn issued_key_not_found_points_at_keys_list() {
        let err: CliError = CoreError::NotFound {
            entity_type: "issued key".into(),
            identifier: "9".into(),
        }
        .into();
        let CliError::NotFound { list_command, .. } = &err else {
            panic!("expected not found");
        };
        assert_eq!(list_command, "keys list");
        assert_eq!(err.exit_code(), exit_code::NOT_FOUND);
    }

    #[test]
    fn config_validation_is_a_usage_error() {
        let err: CliError = ConfigError::Validation {
            field: "api_url".into(),
            reason: "invalid URL".into(),
        }
        .into();
        assert_eq!(err.exit_code(), exit_code::USAGE);
    }
}
