#![allow(clippy::unwrap_used, dead_code)]
// Shared doubles for the engine scenario tests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use secrecy::{ExposeSecret, SecretString};

use keysync_api::{IssuedKey, PaymentReceipt, PaymentSlip, PlanCatalog, UserStatus};
use keysync_core::{
    AuthGateway, CoreError, GroupId, LoginGrant, MemoryProfileStore, NewProfile, Profile,
    ProfileId, ProfileStore, ReconcileSettings, ReconciliationEngine, SessionController,
    StoreError, Tunnel, TunnelCoordinator, TunnelError, TunnelRunState,
};

pub const AUTO_LABEL: &str = "Auto (primary)";

// ── Tunnel ──────────────────────────────────────────────────────────

/// Tunnel double that records every request it receives.
pub struct RecordingTunnel {
    state: Mutex<TunnelRunState>,
    calls: Mutex<Vec<String>>,
}

impl RecordingTunnel {
    pub fn new(state: TunnelRunState) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(state),
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn set_state(&self, state: TunnelRunState) {
        *self.state.lock().unwrap() = state;
    }
}

impl Tunnel for RecordingTunnel {
    fn state(&self) -> TunnelRunState {
        *self.state.lock().unwrap()
    }

    fn start(&self, profile: &Profile) -> Result<(), TunnelError> {
        self.calls.lock().unwrap().push(format!("start:{}", profile.id));
        Ok(())
    }

    fn reload(&self, profile: &Profile) -> Result<(), TunnelError> {
        self.calls.lock().unwrap().push(format!("reload:{}", profile.id));
        Ok(())
    }

    fn stop(&self) -> Result<(), TunnelError> {
        self.calls.lock().unwrap().push("stop".into());
        Ok(())
    }
}

// ── Store ───────────────────────────────────────────────────────────

/// In-memory store whose `create` fails once `allowed_creates` is used up.
pub struct FlakyStore {
    pub inner: MemoryProfileStore,
    allowed_creates: AtomicUsize,
}

impl FlakyStore {
    pub fn new(allowed_creates: usize) -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryProfileStore::new(),
            allowed_creates: AtomicUsize::new(allowed_creates),
        })
    }
}

impl ProfileStore for FlakyStore {
    fn create(&self, new: NewProfile) -> Result<Profile, StoreError> {
        let left = self.allowed_creates.load(Ordering::SeqCst);
        if left == 0 {
            return Err(StoreError::Unavailable {
                message: "disk full".into(),
            });
        }
        self.allowed_creates.store(left - 1, Ordering::SeqCst);
        self.inner.create(new)
    }

    fn update(&self, profile: &Profile) -> Result<Profile, StoreError> {
        self.inner.update(profile)
    }

    fn get_by_id(&self, id: ProfileId) -> Result<Option<Profile>, StoreError> {
        self.inner.get_by_id(id)
    }

    fn list_by_group(&self, group: GroupId) -> Result<Vec<Profile>, StoreError> {
        self.inner.list_by_group(group)
    }

    fn list_all(&self) -> Result<Vec<Profile>, StoreError> {
        self.inner.list_all()
    }

    fn delete(&self, id: ProfileId) -> Result<bool, StoreError> {
        self.inner.delete(id)
    }
}

// ── Engine harness ──────────────────────────────────────────────────

pub struct Harness {
    pub engine: ReconciliationEngine,
    pub store: Arc<MemoryProfileStore>,
    pub session: SessionController,
    pub tunnel: Arc<RecordingTunnel>,
}

pub fn harness(tunnel_state: TunnelRunState) -> Harness {
    let store = Arc::new(MemoryProfileStore::new());
    let session = SessionController::default();
    let tunnel = RecordingTunnel::new(tunnel_state);
    let engine = ReconciliationEngine::new(
        store.clone(),
        session.clone(),
        TunnelCoordinator::new(tunnel.clone()),
        ReconcileSettings::default(),
    );
    Harness {
        engine,
        store,
        session,
        tunnel,
    }
}

pub fn names(store: &MemoryProfileStore) -> Vec<String> {
    store
        .list_all()
        .unwrap()
        .into_iter()
        .map(|p| p.display_name)
        .collect()
}

// ── Gateway ─────────────────────────────────────────────────────────

/// Scripted control-plane.
#[derive(Default)]
pub struct FakeGateway {
    pub grant: Mutex<Option<LoginGrant>>,
    pub accepted_token: Mutex<Option<String>>,
    pub status: Mutex<Option<UserStatus>>,
    pub status_queries: Mutex<Vec<String>>,
    pub keys: Mutex<Vec<IssuedKey>>,
    pub receipt: Mutex<Option<PaymentReceipt>>,
    pub catalog: Mutex<Option<PlanCatalog>>,
}

impl FakeGateway {
    fn grant(&self) -> Result<LoginGrant, CoreError> {
        self.grant
            .lock()
            .unwrap()
            .clone()
            .ok_or(CoreError::AuthenticationFailed {
                message: "no grant scripted".into(),
            })
    }
}

impl AuthGateway for FakeGateway {
    async fn login_federated(&self, token: &SecretString) -> Result<LoginGrant, CoreError> {
        let accepted = self.accepted_token.lock().unwrap().clone();
        if accepted.as_deref() != Some(token.expose_secret()) {
            return Err(CoreError::AuthenticationFailed {
                message: "Invalid Google token".into(),
            });
        }
        self.grant()
    }

    async fn login_phone(&self, _phone: &str) -> Result<LoginGrant, CoreError> {
        self.grant()
    }

    async fn user_status(&self, identity: &str) -> Result<UserStatus, CoreError> {
        self.status_queries.lock().unwrap().push(identity.to_owned());
        self.status
            .lock()
            .unwrap()
            .clone()
            .ok_or(CoreError::NotFound {
                entity_type: "user".into(),
                identifier: identity.to_owned(),
            })
    }

    async fn issued_keys(&self, _owner: &str) -> Result<Vec<IssuedKey>, CoreError> {
        Ok(self.keys.lock().unwrap().clone())
    }

    async fn plan_catalog(&self) -> Result<PlanCatalog, CoreError> {
        self.catalog.lock().unwrap().clone().ok_or(CoreError::Api {
            message: "unavailable".into(),
            status: Some(503),
        })
    }

    async fn verify_payment(
        &self,
        _owner: &str,
        _protocol: &str,
        _slip: PaymentSlip,
    ) -> Result<PaymentReceipt, CoreError> {
        self.receipt.lock().unwrap().clone().ok_or(CoreError::Rejected {
            message: "no receipt scripted".into(),
        })
    }
}

pub fn issued_key(id: i64, link: &str) -> IssuedKey {
    IssuedKey {
        id,
        user_uuid: "master".into(),
        key_name: format!("Key{id}"),
        protocol: "vless".into(),
        server_address: "1.2.3.4".into(),
        server_port: 443,
        key_uuid: None,
        key_password: None,
        config_link: Some(link.into()),
        is_active: true,
        created_at: "2026-01-01".into(),
        expires_at: None,
    }
}

pub fn user_status(identity: &str, percentage: f64) -> UserStatus {
    UserStatus {
        uuid: identity.into(),
        is_active: true,
        expiry_date: "2026-12-31".into(),
        data_limit_gb: 50.0,
        daily_usage_bytes: 1024 * 1024 * 1024,
        protocol: "vless".into(),
        usage_percentage: percentage,
        in_grace_period: false,
        grace_remaining_hours: 0.0,
        warnings_sent: Vec::new(),
    }
}
