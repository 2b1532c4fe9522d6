// ── Reconciliation engine ──
//
// One pass: parse → match → upsert → select → resync. Passes are
// serialized by `pass_lock`; the profile pool is listed fresh at the
// start of every pass and kept current as the pass writes to it, so two
// records with the same identity in one batch still collapse into one
// profile.
//
// Every credential-issuing path (login, manual key retrieval, payment)
// enters through `import_and_activate` so dedup and naming rules are
// identical everywhere.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::error::{ReconcileError, StoreError};
use crate::matcher;
use crate::model::{GroupId, NewProfile, Profile, ProfileId, ProxyConfig};
use crate::parser;
use crate::session::SessionController;
use crate::store::ProfileStore;
use crate::tunnel::{ResyncAction, TunnelCoordinator};

/// Naming and grouping knobs for reconciliation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileSettings {
    /// Group every imported profile lands in.
    pub group: GroupId,
    /// Fixed name given to the account's primary key.
    pub auto_label: String,
    /// Name of the loopback placeholder used when no keys were issued.
    pub placeholder_name: String,
}

impl Default for ReconcileSettings {
    fn default() -> Self {
        Self {
            group: GroupId::DEFAULT,
            auto_label: "Auto (primary)".into(),
            placeholder_name: "Subscriber".into(),
        }
    }
}

// ── Outcomes ─────────────────────────────────────────────────────────

/// What happened to one parsed record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum UpsertAction {
    Created,
    Updated,
    Unchanged,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AppliedProfile {
    pub profile_id: ProfileId,
    pub display_name: String,
    pub action: UpsertAction,
}

/// Why a pass fell back to the placeholder profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DegradedReason {
    /// The control-plane issued no key material.
    ZeroKeysIssued,
    /// No key material and no caller identity to own the placeholder.
    NoIdentityAvailable,
}

/// Successful end of a reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum ImportOutcome {
    Complete {
        applied: Vec<AppliedProfile>,
        active: ProfileId,
        resync: ResyncAction,
    },
    /// Nothing usable was issued; the session points at a placeholder.
    Degraded {
        reason: DegradedReason,
        active: ProfileId,
        placeholder_created: bool,
        resync: ResyncAction,
    },
}

impl ImportOutcome {
    pub fn active(&self) -> ProfileId {
        match self {
            Self::Complete { active, .. } | Self::Degraded { active, .. } => *active,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, Self::Degraded { .. })
    }
}

// ── Engine ───────────────────────────────────────────────────────────

pub struct ReconciliationEngine {
    store: Arc<dyn ProfileStore>,
    session: SessionController,
    tunnel: TunnelCoordinator,
    settings: ReconcileSettings,
    pass_lock: Mutex<()>,
}

impl ReconciliationEngine {
    pub fn new(
        store: Arc<dyn ProfileStore>,
        session: SessionController,
        tunnel: TunnelCoordinator,
        settings: ReconcileSettings,
    ) -> Self {
        Self {
            store,
            session,
            tunnel,
            settings,
            pass_lock: Mutex::new(()),
        }
    }

    pub fn settings(&self) -> &ReconcileSettings {
        &self.settings
    }

    pub fn store(&self) -> &Arc<dyn ProfileStore> {
        &self.store
    }

    /// Run one reconciliation pass.
    ///
    /// Missing or blank `key_material` means zero keys were issued and
    /// yields a degraded success. Present material that decodes to nothing
    /// is `ReconcileError::KeyParse`. A storage failure stops the batch;
    /// profiles written before it stay committed and are listed in the
    /// error, and neither selection nor resync happens.
    pub async fn import_and_activate(
        &self,
        key_material: Option<&str>,
        caller_identity: &str,
        primary_key_identity: Option<&str>,
    ) -> Result<ImportOutcome, ReconcileError> {
        let _pass = self.pass_lock.lock().await;

        // Parsing
        let Some(material) = key_material.filter(|m| !m.trim().is_empty()) else {
            return self.fall_back(caller_identity);
        };
        let records = parser::parse(material);
        if records.is_empty() {
            warn!(len = material.len(), "key material decoded to zero records");
            return Err(ReconcileError::KeyParse);
        }
        debug!(records = records.len(), group = %self.settings.group, "parsed key material");

        // Matching + upserting
        let mut pool = self.list_pool()?;
        let mut applied: Vec<AppliedProfile> = Vec::with_capacity(records.len());
        let mut last: Option<Profile> = None;

        for record in records {
            let (profile, action) = self
                .upsert(&mut pool, record, caller_identity, primary_key_identity)
                .map_err(|source| ReconcileError::Storage {
                    committed: applied.iter().map(|a| a.profile_id).collect(),
                    source,
                })?;
            applied.push(AppliedProfile {
                profile_id: profile.id,
                display_name: profile.display_name.clone(),
                action,
            });
            last = Some(profile);
        }

        // Selecting: last record wins
        let Some(active) = last else {
            return self.fall_back(caller_identity);
        };
        self.session.set_active(active.id);

        // Resyncing
        let resync = self.tunnel.resync(&active);

        info!(
            profiles = applied.len(),
            created = applied.iter().filter(|a| a.action == UpsertAction::Created).count(),
            active = %active.id,
            %resync,
            "reconciliation pass complete"
        );
        Ok(ImportOutcome::Complete {
            applied,
            active: active.id,
            resync,
        })
    }

    // ── Private helpers ──────────────────────────────────────────────

    fn list_pool(&self) -> Result<Vec<Profile>, ReconcileError> {
        self.store
            .list_by_group(self.settings.group)
            .map_err(|source| ReconcileError::Storage {
                committed: Vec::new(),
                source,
            })
    }

    /// Create or update the profile for one record, keeping `pool` current.
    fn upsert(
        &self,
        pool: &mut Vec<Profile>,
        record: ProxyConfig,
        caller_identity: &str,
        primary_key_identity: Option<&str>,
    ) -> Result<(Profile, UpsertAction), StoreError> {
        let name = matcher::target_name(&record, primary_key_identity, &self.settings.auto_label);

        if let Some(existing) = matcher::find_existing(&record, pool) {
            if existing.display_name == name && existing.config == record {
                debug!(profile_id = %existing.id, "profile already up to date");
                return Ok((existing.clone(), UpsertAction::Unchanged));
            }

            let mut changed = existing.clone();
            changed.display_name = name;
            changed.config = record;
            let updated = self.store.update(&changed)?;
            debug!(profile_id = %updated.id, name = %updated.display_name, "updated profile");

            if let Some(slot) = pool.iter_mut().find(|p| p.id == updated.id) {
                *slot = updated.clone();
            }
            return Ok((updated, UpsertAction::Updated));
        }

        let owner = record
            .identity()
            .map(str::to_owned)
            .or_else(|| non_blank(caller_identity));
        let created = self.store.create(NewProfile {
            group_id: self.settings.group,
            owner_identity: owner,
            display_name: name,
            config: record,
        })?;
        debug!(profile_id = %created.id, name = %created.display_name, "created profile");

        pool.push(created.clone());
        Ok((created, UpsertAction::Created))
    }

    /// Point the session at a deterministic placeholder owned by the caller.
    fn fall_back(&self, caller_identity: &str) -> Result<ImportOutcome, ReconcileError> {
        let owner = non_blank(caller_identity);
        let reason = if owner.is_some() {
            DegradedReason::ZeroKeysIssued
        } else {
            DegradedReason::NoIdentityAvailable
        };

        let placeholder = ProxyConfig::placeholder(&self.settings.placeholder_name);
        let pool = self.list_pool()?;
        let existing = pool
            .into_iter()
            .find(|p| p.config.is_placeholder() && p.owner_identity == owner);

        let (profile, placeholder_created) = match existing {
            Some(profile) => (profile, false),
            None => {
                let created = self
                    .store
                    .create(NewProfile {
                        group_id: self.settings.group,
                        owner_identity: owner,
                        display_name: self.settings.placeholder_name.clone(),
                        config: placeholder,
                    })
                    .map_err(|source| ReconcileError::Storage {
                        committed: Vec::new(),
                        source,
                    })?;
                (created, true)
            }
        };

        self.session.set_active(profile.id);
        let resync = self.tunnel.resync(&profile);

        warn!(
            %reason,
            active = %profile.id,
            placeholder_created,
            "no keys imported, using placeholder"
        );
        Ok(ImportOutcome::Degraded {
            reason,
            active: profile.id,
            placeholder_created,
            resync,
        })
    }
}

fn non_blank(s: &str) -> Option<String> {
    let s = s.trim();
    (!s.is_empty()).then(|| s.to_owned())
}
