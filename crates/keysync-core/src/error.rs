// ── Core error types ──
//
// User-facing errors from keysync-core. Consumers never see HTTP status
// codes or JSON parse failures directly; the `From<keysync_api::Error>`
// impl translates transport-layer errors into domain variants.

use std::path::PathBuf;

use thiserror::Error;

use crate::model::ProfileId;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    #[error("Cannot reach control-plane at {url}: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Control-plane request timed out")]
    Timeout,

    // ── Session errors ───────────────────────────────────────────────
    #[error("Not logged in: no account identity in the current session")]
    NotLoggedIn,

    #[error("No active profile to query status for")]
    NoStatusIdentity,

    #[error("Controller is not running")]
    ControllerStopped,

    // ── Data errors ──────────────────────────────────────────────────
    #[error("Not found: {entity_type} {identifier}")]
    NotFound {
        entity_type: String,
        identifier: String,
    },

    #[error("Rejected by control-plane: {message}")]
    Rejected { message: String },

    // ── Reconciliation / collaborators ───────────────────────────────
    #[error(transparent)]
    Reconcile(#[from] ReconcileError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Tunnel(#[from] TunnelError),

    // ── API errors (wrapped, not exposed raw) ────────────────────────
    #[error("API error: {message}")]
    Api {
        message: String,
        /// HTTP status code (if applicable).
        status: Option<u16>,
    },
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<keysync_api::Error> for CoreError {
    fn from(err: keysync_api::Error) -> Self {
        match err {
            keysync_api::Error::Authentication { message } => {
                CoreError::AuthenticationFailed { message }
            }
            keysync_api::Error::Transport(ref e) => {
                if e.is_timeout() {
                    CoreError::Timeout
                } else if e.is_connect() {
                    CoreError::ConnectionFailed {
                        url: e
                            .url()
                            .map(|u| u.to_string())
                            .unwrap_or_else(|| "<unknown>".into()),
                        reason: e.to_string(),
                    }
                } else {
                    CoreError::Api {
                        message: e.to_string(),
                        status: e.status().map(|s| s.as_u16()),
                    }
                }
            }
            keysync_api::Error::InvalidUrl(e) => CoreError::ConnectionFailed {
                url: String::new(),
                reason: e.to_string(),
            },
            keysync_api::Error::NotFound { resource } => CoreError::NotFound {
                entity_type: "resource".into(),
                identifier: resource,
            },
            keysync_api::Error::Api { status, message } => CoreError::Api {
                message,
                status: Some(status),
            },
            keysync_api::Error::Deserialization { message, .. } => CoreError::Api {
                message: format!("unexpected response: {message}"),
                status: None,
            },
        }
    }
}

// ── Reconciliation ───────────────────────────────────────────────────

/// Terminal failure of one reconciliation pass.
///
/// The two variants demand different remediation: `KeyParse` means nothing
/// usable was issued, `Storage` means something was issued but could not
/// be saved in full.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("Key material could not be decoded into any proxy configuration")]
    KeyParse,

    #[error(
        "Storage failed after committing {} profile(s): {source}",
        .committed.len()
    )]
    Storage {
        /// Profiles created or updated before the failure. They stay committed.
        committed: Vec<ProfileId>,
        #[source]
        source: StoreError,
    },
}

impl ReconcileError {
    /// Profiles that were persisted before the pass failed.
    pub fn committed(&self) -> &[ProfileId] {
        match self {
            Self::KeyParse => &[],
            Self::Storage { committed, .. } => committed,
        }
    }
}

// ── Profile store ────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Profile {0} does not exist")]
    Missing(ProfileId),

    #[error("Profile store I/O failed at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Profile store document is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),

    #[error("Profile store unavailable: {message}")]
    Unavailable { message: String },
}

// ── Tunnel ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum TunnelError {
    #[error("No tunnel hook configured for `{action}`")]
    NotConfigured { action: &'static str },

    #[error("Tunnel hook `{action}` could not be launched: {source}")]
    Launch {
        action: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("Tunnel hook `{action}` exited with status {code}")]
    HookFailed { action: &'static str, code: i32 },
}
