// ── Controller abstraction ──
//
// Facade over the whole engine: authentication flows, the single-worker
// reconciliation queue, status polling, account lifecycle and tunnel
// control. Every credential-issuing flow ends in a job on the queue, so
// passes run strictly one after another in the order they were started.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;
use serde::Serialize;
use tokio::sync::{Mutex, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use keysync_api::{
    ControlPlaneClient, IssuedKey, PaymentReceipt, PaymentSlip, PlanCatalog, TransportConfig,
};

use crate::config::ControllerConfig;
use crate::error::{CoreError, ReconcileError};
use crate::gateway::{AuthGateway, LoginGrant};
use crate::model::{Profile, ProfileId};
use crate::reconcile::{ImportOutcome, ReconciliationEngine};
use crate::session::{LoginKind, RememberedIdentity, ResumePlan, SessionController};
use crate::status::StatusReport;
use crate::store::ProfileStore;
use crate::tunnel::{ResyncAction, Tunnel, TunnelCoordinator, TunnelRunState};

const JOB_CHANNEL_SIZE: usize = 16;

// ── Job queue ────────────────────────────────────────────────────────

/// Work that touches the session, run by the single worker in queue order.
enum Job {
    Import(ImportJob),
    Logout {
        response_tx: oneshot::Sender<LogoutReport>,
    },
}

/// One queued reconciliation pass and where to send its result.
struct ImportJob {
    /// Identity a login caches right before its pass.
    remember: Option<RememberedIdentity>,
    key_material: Option<String>,
    caller_identity: String,
    primary_key_identity: Option<String>,
    response_tx: oneshot::Sender<Result<ImportOutcome, ReconcileError>>,
}

// ── Flow results ─────────────────────────────────────────────────────

/// Result of a login: who logged in and what the follow-up pass did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoginReport {
    pub identity: RememberedIdentity,
    pub outcome: ImportOutcome,
}

/// Result of a cold-start resume.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ResumeOutcome {
    /// No usable cached identity, or silent re-authentication failed.
    NeedsLogin,
    /// Cached identity accepted without a network round trip.
    Resumed { identity: RememberedIdentity },
    /// Silently re-authenticated with the stored federated token.
    Reauthenticated { report: LoginReport },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentReport {
    pub receipt: PaymentReceipt,
    pub outcome: ImportOutcome,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LogoutReport {
    pub tunnel_stopped: bool,
}

// ── Controller ───────────────────────────────────────────────────────

/// The main entry point for consumers.
///
/// Cheaply cloneable via `Arc<ControllerInner>`. Call [`start()`](Self::start)
/// before running any flow that imports keys.
pub struct Controller<G: AuthGateway = ControlPlaneClient> {
    inner: Arc<ControllerInner<G>>,
}

impl<G: AuthGateway> Clone for Controller<G> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

struct ControllerInner<G> {
    config: ControllerConfig,
    gateway: G,
    engine: ReconciliationEngine,
    session: SessionController,
    tunnel: TunnelCoordinator,
    store: Arc<dyn ProfileStore>,
    status: watch::Sender<Option<Arc<StatusReport>>>,
    job_tx: mpsc::Sender<Job>,
    job_rx: Mutex<Option<mpsc::Receiver<Job>>>,
    cancel: CancellationToken,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Controller<ControlPlaneClient> {
    /// Build a controller talking to the real control-plane.
    pub fn connect(
        config: ControllerConfig,
        store: Arc<dyn ProfileStore>,
        tunnel: Arc<dyn Tunnel>,
        session: SessionController,
    ) -> Result<Self, CoreError> {
        let transport = TransportConfig::default().with_timeout(config.timeout);
        let client = ControlPlaneClient::new(config.api_url.as_str(), &transport)?;
        Ok(Self::with_gateway(config, client, store, tunnel, session))
    }
}

impl<G: AuthGateway> Controller<G> {
    /// Create a controller over any gateway. Does NOT start background
    /// tasks; call [`start()`](Self::start).
    pub fn with_gateway(
        config: ControllerConfig,
        gateway: G,
        store: Arc<dyn ProfileStore>,
        tunnel: Arc<dyn Tunnel>,
        session: SessionController,
    ) -> Self {
        let tunnel = TunnelCoordinator::new(tunnel);
        let engine = ReconciliationEngine::new(
            Arc::clone(&store),
            session.clone(),
            tunnel.clone(),
            config.reconcile.clone(),
        );
        let (status, _) = watch::channel(None);
        let (job_tx, job_rx) = mpsc::channel(JOB_CHANNEL_SIZE);

        Self {
            inner: Arc::new(ControllerInner {
                config,
                gateway,
                engine,
                session,
                tunnel,
                store,
                status,
                job_tx,
                job_rx: Mutex::new(Some(job_rx)),
                cancel: CancellationToken::new(),
                task_handles: Mutex::new(Vec::new()),
            }),
        }
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.inner.config
    }

    pub fn session(&self) -> &SessionController {
        &self.inner.session
    }

    pub fn store(&self) -> &Arc<dyn ProfileStore> {
        &self.inner.store
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// Spawn the reconciliation worker and, if configured, the status poller.
    pub async fn start(&self) {
        let mut handles = self.inner.task_handles.lock().await;

        if let Some(rx) = self.inner.job_rx.lock().await.take() {
            let ctrl = self.clone();
            handles.push(tokio::spawn(reconcile_worker_task(ctrl, rx)));
        }

        let interval_secs = self.inner.config.status_interval_secs;
        if interval_secs > 0 {
            let ctrl = self.clone();
            let cancel = self.inner.cancel.clone();
            handles.push(tokio::spawn(status_poll_task(ctrl, interval_secs, cancel)));
        }
        debug!(tasks = handles.len(), "controller started");
    }

    /// Cancel background tasks and wait for them to finish. A pass already
    /// in flight runs to completion first.
    pub async fn shutdown(&self) {
        self.inner.cancel.cancel();
        let mut handles = self.inner.task_handles.lock().await;
        for handle in handles.drain(..) {
            let _ = handle.await;
        }
        debug!("controller shut down");
    }

    /// Start, run `f`, shut down.
    pub async fn oneshot<F, Fut, T>(self, f: F) -> Result<T, CoreError>
    where
        F: FnOnce(Controller<G>) -> Fut,
        Fut: Future<Output = Result<T, CoreError>>,
    {
        self.start().await;
        let result = f(self.clone()).await;
        self.shutdown().await;
        result
    }

    // ── Reconciliation ───────────────────────────────────────────────

    /// True between [`start()`](Self::start) and [`shutdown()`](Self::shutdown).
    async fn worker_running(&self) -> bool {
        !self.inner.cancel.is_cancelled() && self.inner.job_rx.lock().await.is_none()
    }

    /// Queue a reconciliation pass and wait for its outcome.
    pub async fn import(
        &self,
        key_material: Option<String>,
        caller_identity: &str,
        primary_key_identity: Option<String>,
    ) -> Result<ImportOutcome, CoreError> {
        self.enqueue_import(None, key_material, caller_identity, primary_key_identity).await
    }

    async fn enqueue_import(
        &self,
        remember: Option<RememberedIdentity>,
        key_material: Option<String>,
        caller_identity: &str,
        primary_key_identity: Option<String>,
    ) -> Result<ImportOutcome, CoreError> {
        if !self.worker_running().await {
            return Err(CoreError::ControllerStopped);
        }

        let (tx, rx) = oneshot::channel();
        let job = Job::Import(ImportJob {
            remember,
            key_material,
            caller_identity: caller_identity.to_owned(),
            primary_key_identity,
            response_tx: tx,
        });
        self.inner
            .job_tx
            .send(job)
            .await
            .map_err(|_| CoreError::ControllerStopped)?;

        Ok(rx.await.map_err(|_| CoreError::ControllerStopped)??)
    }

    /// Import key material on behalf of the current session, keeping the
    /// primary key the last login reported.
    pub async fn import_key(&self, key_material: &str) -> Result<ImportOutcome, CoreError> {
        let owner = self.inner.session.owner_identity().unwrap_or_default();
        let primary = self.inner.session.primary_key_identity();
        self.import(Some(key_material.to_owned()), &owner, primary).await
    }

    // ── Authentication ───────────────────────────────────────────────

    pub async fn login_federated(&self, token: &SecretString) -> Result<LoginReport, CoreError> {
        let grant = self.inner.gateway.login_federated(token).await?;
        let display_name = grant
            .email
            .clone()
            .unwrap_or_else(|| self.inner.config.reconcile.placeholder_name.clone());
        let contact = grant.email.clone().unwrap_or_default();
        self.complete_login(grant, display_name, contact, LoginKind::Federated).await
    }

    pub async fn login_phone(&self, phone: &str) -> Result<LoginReport, CoreError> {
        let grant = self.inner.gateway.login_phone(phone).await?;
        let display_name = self.inner.config.reconcile.placeholder_name.clone();
        self.complete_login(grant, display_name, phone.to_owned(), LoginKind::Phone).await
    }

    async fn complete_login(
        &self,
        grant: LoginGrant,
        display_name: String,
        contact: String,
        login_kind: LoginKind,
    ) -> Result<LoginReport, CoreError> {
        let identity = RememberedIdentity {
            owner_identity: grant.owner_identity.clone(),
            display_name,
            contact,
            login_kind,
        };
        info!(kind = %login_kind, "login accepted");

        let outcome = self
            .enqueue_import(
                Some(identity.clone()),
                grant.key_material,
                &grant.owner_identity,
                grant.primary_key_identity,
            )
            .await?;
        Ok(LoginReport { identity, outcome })
    }

    /// Decide how a cold start continues.
    ///
    /// A remembered phone identity resumes directly. A remembered federated
    /// identity re-authenticates with `token`; without a token, or if that
    /// fails, the caller must run a fresh login.
    pub async fn resume(&self, token: Option<&SecretString>) -> Result<ResumeOutcome, CoreError> {
        match self.inner.session.resume_plan() {
            ResumePlan::FreshLogin => Ok(ResumeOutcome::NeedsLogin),
            ResumePlan::Direct(identity) => {
                debug!("resuming remembered phone identity");
                Ok(ResumeOutcome::Resumed { identity })
            }
            ResumePlan::SilentFederated(_) => {
                let Some(token) = token else {
                    debug!("no stored federated token, fresh login required");
                    return Ok(ResumeOutcome::NeedsLogin);
                };
                match self.login_federated(token).await {
                    Ok(report) => Ok(ResumeOutcome::Reauthenticated { report }),
                    Err(CoreError::AuthenticationFailed { message }) => {
                        warn!(%message, "silent re-authentication rejected");
                        Ok(ResumeOutcome::NeedsLogin)
                    }
                    Err(e) => Err(e),
                }
            }
        }
    }

    // ── Account lifecycle ────────────────────────────────────────────

    /// Stop the tunnel if it can be stopped, then clear the whole session.
    ///
    /// Runs on the worker after every pass queued before it.
    pub async fn logout(&self) -> LogoutReport {
        if self.worker_running().await {
            let (tx, rx) = oneshot::channel();
            if self
                .inner
                .job_tx
                .send(Job::Logout { response_tx: tx })
                .await
                .is_ok()
            {
                if let Ok(report) = rx.await {
                    return report;
                }
            }
        }
        // No worker, so no pass can be in flight.
        self.end_session()
    }

    fn end_session(&self) -> LogoutReport {
        let tunnel_stopped = match self.inner.tunnel.stop_if_running() {
            Ok(stopped) => stopped,
            Err(e) => {
                warn!(error = %e, "tunnel stop failed during logout (non-fatal)");
                false
            }
        };
        self.inner.session.clear();
        info!(tunnel_stopped, "logged out");
        LogoutReport { tunnel_stopped }
    }

    /// Forget the remembered identity ahead of a new login. The active
    /// profile stays selected until the next pass replaces it.
    pub fn switch_account(&self) {
        self.inner.session.forget();
        info!("remembered identity cleared for account switch");
    }

    fn require_owner(&self) -> Result<String, CoreError> {
        self.inner
            .session
            .owner_identity()
            .filter(|owner| !owner.trim().is_empty())
            .ok_or(CoreError::NotLoggedIn)
    }

    // ── Keys & payment ───────────────────────────────────────────────

    /// Keys the control-plane has issued to the logged-in account.
    pub async fn issued_keys(&self) -> Result<Vec<IssuedKey>, CoreError> {
        let owner = self.require_owner()?;
        self.inner.gateway.issued_keys(&owner).await
    }

    /// Fetch one issued key by id and reconcile it.
    pub async fn import_issued_key(&self, key_id: i64) -> Result<ImportOutcome, CoreError> {
        let owner = self.require_owner()?;
        let key = self
            .inner
            .gateway
            .issued_keys(&owner)
            .await?
            .into_iter()
            .find(|k| k.id == key_id)
            .ok_or_else(|| CoreError::NotFound {
                entity_type: "issued key".into(),
                identifier: key_id.to_string(),
            })?;

        let primary = self.inner.session.primary_key_identity();
        self.import(Some(key.import_text().to_owned()), &owner, primary).await
    }

    pub async fn plans(&self) -> Result<PlanCatalog, CoreError> {
        self.inner.gateway.plan_catalog().await
    }

    /// Upload a payment slip and reconcile the key it buys.
    pub async fn verify_payment(
        &self,
        slip: PaymentSlip,
        protocol: &str,
    ) -> Result<PaymentReport, CoreError> {
        let owner = self.require_owner()?;
        let receipt = self
            .inner
            .gateway
            .verify_payment(&owner, protocol, slip)
            .await?;
        if !receipt.success {
            return Err(CoreError::Rejected {
                message: receipt.message,
            });
        }
        info!(
            transaction = %receipt.transaction_id,
            protocol = %receipt.protocol,
            "payment verified"
        );

        let primary = self.inner.session.primary_key_identity();
        let outcome = self.import(Some(receipt.key.clone()), &owner, primary).await?;
        Ok(PaymentReport { receipt, outcome })
    }

    // ── Status ───────────────────────────────────────────────────────

    /// Query status for the active profile and publish it to watchers.
    pub async fn status(&self) -> Result<StatusReport, CoreError> {
        let profile = self.active_profile()?.ok_or(CoreError::NoStatusIdentity)?;
        let identity = profile
            .status_identity()
            .ok_or(CoreError::NoStatusIdentity)?
            .to_owned();

        let status = self.inner.gateway.user_status(&identity).await?;
        let report = StatusReport::from_status(identity, status);
        self.inner.status.send_replace(Some(Arc::new(report.clone())));
        Ok(report)
    }

    /// Latest status report, updated by [`status()`](Self::status) and the poller.
    pub fn status_watch(&self) -> watch::Receiver<Option<Arc<StatusReport>>> {
        self.inner.status.subscribe()
    }

    // ── Profiles ─────────────────────────────────────────────────────

    pub fn profiles(&self) -> Result<Vec<Profile>, CoreError> {
        Ok(self.inner.store.list_all()?)
    }

    pub fn profile(&self, id: ProfileId) -> Result<Profile, CoreError> {
        self.inner
            .store
            .get_by_id(id)?
            .ok_or_else(|| profile_not_found(id))
    }

    pub fn active_profile(&self) -> Result<Option<Profile>, CoreError> {
        match self.inner.session.active() {
            Some(id) => Ok(self.inner.store.get_by_id(id)?),
            None => Ok(None),
        }
    }

    /// Make `id` the active profile and point the tunnel at it.
    pub fn select_profile(&self, id: ProfileId) -> Result<ResyncAction, CoreError> {
        let profile = self.profile(id)?;
        self.inner.session.set_active(profile.id);
        Ok(self.inner.tunnel.resync(&profile))
    }

    /// Delete a profile at the user's request. The active profile cannot
    /// be deleted.
    pub fn delete_profile(&self, id: ProfileId) -> Result<(), CoreError> {
        if self.inner.session.active() == Some(id) {
            return Err(CoreError::Rejected {
                message: format!("profile {id} is active; select another profile first"),
            });
        }
        if self.inner.store.delete(id)? {
            info!(profile_id = %id, "profile deleted");
            Ok(())
        } else {
            Err(profile_not_found(id))
        }
    }

    // ── Tunnel control ───────────────────────────────────────────────

    pub fn tunnel_state(&self) -> TunnelRunState {
        self.inner.tunnel.state()
    }

    pub fn tunnel_start(&self) -> Result<(), CoreError> {
        let profile = self.require_active_profile()?;
        Ok(self.inner.tunnel.start(&profile)?)
    }

    pub fn tunnel_stop(&self) -> Result<(), CoreError> {
        Ok(self.inner.tunnel.stop()?)
    }

    /// Reload or start the tunnel on the active profile.
    pub fn tunnel_resync(&self) -> Result<ResyncAction, CoreError> {
        let profile = self.require_active_profile()?;
        Ok(self.inner.tunnel.resync(&profile))
    }

    fn require_active_profile(&self) -> Result<Profile, CoreError> {
        self.active_profile()?.ok_or_else(|| CoreError::NotFound {
            entity_type: "active profile".into(),
            identifier: "(none selected)".into(),
        })
    }
}

// ── Background tasks ─────────────────────────────────────────────────

/// Run queued jobs one at a time, in arrival order.
async fn reconcile_worker_task<G: AuthGateway>(
    controller: Controller<G>,
    mut rx: mpsc::Receiver<Job>,
) {
    let cancel = controller.inner.cancel.clone();

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            job = rx.recv() => {
                let Some(job) = job else { break };
                match job {
                    Job::Import(job) => {
                        let result = run_import(&controller, &job).await;
                        let _ = job.response_tx.send(result);
                    }
                    Job::Logout { response_tx } => {
                        let _ = response_tx.send(controller.end_session());
                    }
                }
            }
        }
    }
}

async fn run_import<G: AuthGateway>(
    controller: &Controller<G>,
    job: &ImportJob,
) -> Result<ImportOutcome, ReconcileError> {
    if let Some(identity) = &job.remember {
        controller
            .inner
            .session
            .remember(identity.clone(), job.primary_key_identity.clone());
    }
    controller
        .inner
        .engine
        .import_and_activate(
            job.key_material.as_deref(),
            &job.caller_identity,
            job.primary_key_identity.as_deref(),
        )
        .await
}

/// Periodically refresh the status report.
async fn status_poll_task<G: AuthGateway>(
    controller: Controller<G>,
    interval_secs: u64,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            _ = interval.tick() => {
                match controller.status().await {
                    Ok(report) => debug!(band = %report.band, "status refreshed"),
                    Err(CoreError::NoStatusIdentity) => {}
                    Err(e) => warn!(error = %e, "periodic status refresh failed"),
                }
            }
        }
    }
}

// ── Helpers ──────────────────────────────────────────────────────────

fn profile_not_found(id: ProfileId) -> CoreError {
    CoreError::NotFound {
        entity_type: "profile".into(),
        identifier: id.to_string(),
    }
}
