// ── Session controller ──
//
// Owns the single active-profile pointer and the remembered identity
// used for silent re-entry. All mutation goes through this type; the
// state itself lives in a watch channel so consumers can observe it.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tracing::debug;

use crate::model::ProfileId;

/// How the remembered identity originally authenticated.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display, strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum LoginKind {
    Federated,
    Phone,
}

/// Process-wide session state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub active_profile_id: Option<ProfileId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_identity: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remembered_display_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remembered_contact: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub login_kind: Option<LoginKind>,
    /// Key the control-plane flagged as the account's primary at login.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_key_identity: Option<String>,
}

impl SessionState {
    /// The remembered identity, if a complete one is cached.
    pub fn remembered(&self) -> Option<RememberedIdentity> {
        Some(RememberedIdentity {
            owner_identity: self.owner_identity.clone()?,
            display_name: self.remembered_display_name.clone().unwrap_or_default(),
            contact: self.remembered_contact.clone().unwrap_or_default(),
            login_kind: self.login_kind?,
        })
    }
}

/// Identity details cached after a successful login.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RememberedIdentity {
    pub owner_identity: String,
    pub display_name: String,
    /// Email for federated logins, phone number for phone logins.
    pub contact: String,
    pub login_kind: LoginKind,
}

/// What a cold start should do with the cached identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResumePlan {
    /// Nothing usable is cached; ask the user to log in.
    FreshLogin,
    /// Phone identity: continue without a network round trip.
    Direct(RememberedIdentity),
    /// Federated identity: re-authenticate silently with the stored token.
    SilentFederated(RememberedIdentity),
}

/// Cheaply cloneable handle to the session state.
#[derive(Clone)]
pub struct SessionController {
    state: Arc<watch::Sender<SessionState>>,
}

impl SessionController {
    pub fn new(initial: SessionState) -> Self {
        let (state, _) = watch::channel(initial);
        Self {
            state: Arc::new(state),
        }
    }

    pub fn snapshot(&self) -> SessionState {
        self.state.borrow().clone()
    }

    // ── Active selection ─────────────────────────────────────────────

    /// The only place the active pointer changes.
    pub fn set_active(&self, id: ProfileId) {
        debug!(profile_id = %id, "active profile selected");
        self.state.send_modify(|s| s.active_profile_id = Some(id));
    }

    pub fn active(&self) -> Option<ProfileId> {
        self.state.borrow().active_profile_id
    }

    // ── Remembered identity ──────────────────────────────────────────

    /// Cache a login's identity together with its primary-key hint.
    pub fn remember(&self, identity: RememberedIdentity, primary_key_identity: Option<String>) {
        debug!(kind = %identity.login_kind, "remembering identity");
        self.state.send_modify(|s| {
            s.owner_identity = Some(identity.owner_identity);
            s.remembered_display_name = Some(identity.display_name);
            s.remembered_contact = Some(identity.contact);
            s.login_kind = Some(identity.login_kind);
            s.primary_key_identity = primary_key_identity;
        });
    }

    /// Drop the remembered identity; the active pointer is untouched.
    pub fn forget(&self) {
        self.state.send_modify(|s| {
            s.owner_identity = None;
            s.remembered_display_name = None;
            s.remembered_contact = None;
            s.login_kind = None;
            s.primary_key_identity = None;
        });
    }

    /// Clear everything, active pointer included.
    pub fn clear(&self) {
        self.state.send_replace(SessionState::default());
    }

    pub fn owner_identity(&self) -> Option<String> {
        self.state.borrow().owner_identity.clone()
    }

    pub fn primary_key_identity(&self) -> Option<String> {
        self.state.borrow().primary_key_identity.clone()
    }

    pub fn resume_plan(&self) -> ResumePlan {
        match self.state.borrow().remembered() {
            None => ResumePlan::FreshLogin,
            Some(identity) if identity.owner_identity.trim().is_empty() => ResumePlan::FreshLogin,
            Some(identity) => match identity.login_kind {
                LoginKind::Phone => ResumePlan::Direct(identity),
                LoginKind::Federated => ResumePlan::SilentFederated(identity),
            },
        }
    }

    // ── Observation ──────────────────────────────────────────────────

    pub fn watch(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Stream of session states, starting with the current one.
    pub fn stream(&self) -> WatchStream<SessionState> {
        WatchStream::new(self.state.subscribe())
    }
}

impl Default for SessionController {
    fn default() -> Self {
        Self::new(SessionState::default())
    }
}
