// ── Persisted profiles ──

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{GroupId, ProfileId};
use super::proxy::ProxyConfig;

/// A stored, identity-bearing wrapper around exactly one proxy config.
///
/// At most one profile per `(group_id, embedded identity)` exists when the
/// identity is non-empty; the reconciliation engine enforces this.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Profile {
    pub id: ProfileId,
    pub group_id: GroupId,
    /// Master account identity used for status and quota lookups.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner_identity: Option<String>,
    pub display_name: String,
    pub config: ProxyConfig,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Profile {
    pub fn embedded_identity(&self) -> Option<&str> {
        self.config.identity()
    }

    /// Identity to query quota with: the key's own id, else its owner.
    pub fn status_identity(&self) -> Option<&str> {
        self.embedded_identity().or_else(|| {
            self.owner_identity
                .as_deref()
                .filter(|owner| !owner.trim().is_empty())
        })
    }
}

/// Everything needed to create a profile; the store assigns id and times.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewProfile {
    pub group_id: GroupId,
    pub owner_identity: Option<String>,
    pub display_name: String,
    pub config: ProxyConfig,
}

impl NewProfile {
    pub(crate) fn into_profile(self, id: ProfileId, now: DateTime<Utc>) -> Profile {
        Profile {
            id,
            group_id: self.group_id,
            owner_identity: self.owner_identity,
            display_name: self.display_name,
            config: self.config,
            created_at: now,
            updated_at: now,
        }
    }
}
