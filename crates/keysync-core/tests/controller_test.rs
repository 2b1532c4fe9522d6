#![allow(clippy::unwrap_used)]
// Controller flows driven through a scripted gateway.

mod common;

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;
use secrecy::SecretString;
use url::Url;

use common::{AUTO_LABEL, FakeGateway, RecordingTunnel, issued_key, user_status};
use keysync_api::{PaymentReceipt, PaymentSlip};
use keysync_core::{
    Controller, ControllerConfig, CoreError, LoginGrant, LoginKind, MemoryProfileStore,
    ProfileStore, ResumeOutcome, SessionController, SessionState, TunnelRunState,
};

struct Rig {
    controller: Controller<FakeGateway>,
    store: Arc<MemoryProfileStore>,
    tunnel: Arc<RecordingTunnel>,
}

async fn rig(gateway: FakeGateway, session: SessionState, tunnel_state: TunnelRunState) -> Rig {
    let store = Arc::new(MemoryProfileStore::new());
    let tunnel = RecordingTunnel::new(tunnel_state);
    let config = ControllerConfig::new(Url::parse("http://127.0.0.1:8082").unwrap());
    let controller = Controller::with_gateway(
        config,
        gateway,
        store.clone(),
        tunnel.clone(),
        SessionController::new(session),
    );
    controller.start().await;
    Rig {
        controller,
        store,
        tunnel,
    }
}

fn gateway_with_grant(grant: LoginGrant) -> FakeGateway {
    let gateway = FakeGateway::default();
    *gateway.grant.lock().unwrap() = Some(grant);
    *gateway.accepted_token.lock().unwrap() = Some("good-token".into());
    gateway
}

fn grant(key_material: Option<&str>, primary: Option<&str>) -> LoginGrant {
    LoginGrant {
        owner_identity: "master".into(),
        email: Some("user@example.com".into()),
        key_material: key_material.map(str::to_owned),
        primary_key_identity: primary.map(str::to_owned),
    }
}

fn federated_session() -> SessionState {
    SessionState {
        owner_identity: Some("master".into()),
        remembered_display_name: Some("user@example.com".into()),
        remembered_contact: Some("user@example.com".into()),
        login_kind: Some(LoginKind::Federated),
        ..SessionState::default()
    }
}

fn token(value: &str) -> SecretString {
    SecretString::from(value.to_owned())
}

const KEY_A: &str = "vless://U1@1.1.1.1:443#Alpha";
const KEY_B: &str = "vless://U2@2.2.2.2:443#Beta";

// ── Login ───────────────────────────────────────────────────────────

#[tokio::test]
async fn federated_login_imports_and_labels_primary() {
    let material = format!("{KEY_A}\n{KEY_B}");
    let gw = gateway_with_grant(grant(Some(&material), Some("U1")));
    let rig = rig(gw, SessionState::default(), TunnelRunState::Stopped).await;

    let report = rig.controller.login_federated(&token("good-token")).await.unwrap();

    assert_eq!(report.identity.owner_identity, "master");
    assert_eq!(report.identity.display_name, "user@example.com");
    assert_eq!(report.identity.login_kind, LoginKind::Federated);
    assert!(!report.outcome.is_degraded());

    let names: Vec<_> = rig
        .store
        .list_all()
        .unwrap()
        .into_iter()
        .map(|p| p.display_name)
        .collect();
    assert_eq!(names, vec![AUTO_LABEL.to_owned(), "Beta".to_owned()]);

    let session = rig.controller.session().snapshot();
    assert_eq!(session.owner_identity.as_deref(), Some("master"));
    assert_eq!(session.active_profile_id, Some(report.outcome.active()));
    rig.controller.shutdown().await;
}

#[tokio::test]
async fn rejected_federated_token_leaves_session_untouched() {
    let gw = gateway_with_grant(grant(Some(KEY_A), None));
    let rig = rig(gw, SessionState::default(), TunnelRunState::Stopped).await;

    let err = rig
        .controller
        .login_federated(&token("stale"))
        .await
        .unwrap_err();

    assert!(matches!(err, CoreError::AuthenticationFailed { .. }));
    assert_eq!(rig.controller.session().snapshot(), SessionState::default());
    assert!(rig.store.is_empty());
    rig.controller.shutdown().await;
}

#[tokio::test]
async fn phone_login_without_keys_falls_back_to_placeholder() {
    let gw = gateway_with_grant(LoginGrant {
        owner_identity: "master".into(),
        email: None,
        key_material: None,
        primary_key_identity: None,
    });
    let rig = rig(gw, SessionState::default(), TunnelRunState::Stopped).await;

    let report = rig.controller.login_phone("+95 9 555 0100").await.unwrap();

    assert!(report.outcome.is_degraded());
    assert_eq!(report.identity.display_name, "Subscriber");
    assert_eq!(report.identity.contact, "+95 9 555 0100");
    let placeholder = rig.controller.profile(report.outcome.active()).unwrap();
    assert!(placeholder.config.is_placeholder());
    assert_eq!(placeholder.owner_identity.as_deref(), Some("master"));
    assert_eq!(
        rig.tunnel.calls(),
        vec![format!("start:{}", placeholder.id)]
    );
    rig.controller.shutdown().await;
}

// ── Resume ──────────────────────────────────────────────────────────

#[tokio::test]
async fn resume_without_cached_identity_needs_login() {
    let rig = rig(
        FakeGateway::default(),
        SessionState::default(),
        TunnelRunState::Stopped,
    )
    .await;
    let outcome = rig.controller.resume(Some(&token("good-token"))).await.unwrap();
    assert_eq!(outcome, ResumeOutcome::NeedsLogin);
}

#[tokio::test]
async fn resume_phone_identity_is_direct() {
    let session = SessionState {
        owner_identity: Some("master".into()),
        remembered_contact: Some("+95 9 555 0100".into()),
        login_kind: Some(LoginKind::Phone),
        ..SessionState::default()
    };
    let rig = rig(FakeGateway::default(), session, TunnelRunState::Stopped).await;

    let outcome = rig.controller.resume(None).await.unwrap();

    let ResumeOutcome::Resumed { identity } = outcome else {
        panic!("expected direct resume, got {outcome:?}");
    };
    assert_eq!(identity.owner_identity, "master");
    assert!(rig.store.is_empty());
}

#[tokio::test]
async fn resume_federated_identity_reauthenticates() {
    let gw = gateway_with_grant(grant(Some(KEY_A), None));
    let rig = rig(gw, federated_session(), TunnelRunState::Running).await;

    let outcome = rig.controller.resume(Some(&token("good-token"))).await.unwrap();

    assert!(matches!(outcome, ResumeOutcome::Reauthenticated { .. }));
    assert_eq!(rig.store.len(), 1);
    assert!(rig.tunnel.calls()[0].starts_with("reload:"));
}

#[tokio::test]
async fn resume_federated_without_token_needs_login() {
    let gw = gateway_with_grant(grant(Some(KEY_A), None));
    let rig = rig(gw, federated_session(), TunnelRunState::Stopped).await;

    let outcome = rig.controller.resume(None).await.unwrap();
    assert_eq!(outcome, ResumeOutcome::NeedsLogin);
}

#[tokio::test]
async fn resume_federated_with_rejected_token_needs_login() {
    let gw = gateway_with_grant(grant(Some(KEY_A), None));
    let rig = rig(gw, federated_session(), TunnelRunState::Stopped).await;

    let outcome = rig.controller.resume(Some(&token("revoked"))).await.unwrap();

    assert_eq!(outcome, ResumeOutcome::NeedsLogin);
    assert!(rig.store.is_empty());
}

// ── Issued keys ─────────────────────────────────────────────────────

#[tokio::test]
async fn issued_keys_require_login() {
    let rig = rig(
        FakeGateway::default(),
        SessionState::default(),
        TunnelRunState::Stopped,
    )
    .await;
    let err = rig.controller.issued_keys().await.unwrap_err();
    assert!(matches!(err, CoreError::NotLoggedIn));
}

#[tokio::test]
async fn import_issued_key_reconciles_that_key_only() {
    let gw = FakeGateway::default();
    *gw.keys.lock().unwrap() = vec![issued_key(7, KEY_A), issued_key(8, KEY_B)];
    let rig = rig(gw, federated_session(), TunnelRunState::Stopped).await;

    let outcome = rig.controller.import_issued_key(8).await.unwrap();

    let active = rig.controller.profile(outcome.active()).unwrap();
    assert_eq!(active.embedded_identity(), Some("U2"));
    assert_eq!(active.display_name, "Beta");
    assert_eq!(rig.store.len(), 1);

    let again = rig.controller.import_issued_key(8).await.unwrap();
    assert_eq!(again.active(), outcome.active());
    assert_eq!(rig.store.len(), 1);
    rig.controller.shutdown().await;
}

#[tokio::test]
async fn manual_retrieval_keeps_primary_label_from_login() {
    let gw = gateway_with_grant(grant(Some(KEY_A), Some("U1")));
    *gw.keys.lock().unwrap() = vec![issued_key(7, KEY_A)];
    let rig = rig(gw, SessionState::default(), TunnelRunState::Stopped).await;

    let login = rig.controller.login_federated(&token("good-token")).await.unwrap();
    let primary = login.outcome.active();
    assert_eq!(rig.controller.profile(primary).unwrap().display_name, AUTO_LABEL);
    assert_eq!(
        rig.controller.session().primary_key_identity().as_deref(),
        Some("U1")
    );

    let outcome = rig.controller.import_issued_key(7).await.unwrap();
    assert_eq!(outcome.active(), primary);
    assert_eq!(rig.controller.profile(primary).unwrap().display_name, AUTO_LABEL);

    rig.controller.import_key(KEY_A).await.unwrap();
    assert_eq!(rig.controller.profile(primary).unwrap().display_name, AUTO_LABEL);
    assert_eq!(rig.store.len(), 1);
    rig.controller.shutdown().await;
}

#[tokio::test]
async fn import_unknown_issued_key_is_not_found() {
    let gw = FakeGateway::default();
    *gw.keys.lock().unwrap() = vec![issued_key(7, KEY_A)];
    let rig = rig(gw, federated_session(), TunnelRunState::Stopped).await;

    let err = rig.controller.import_issued_key(99).await.unwrap_err();
    assert!(matches!(err, CoreError::NotFound { .. }));
}

// ── Payment ─────────────────────────────────────────────────────────

fn slip() -> PaymentSlip {
    PaymentSlip {
        file_name: "slip.jpg".into(),
        mime_type: "image/jpeg".into(),
        bytes: vec![0xFF, 0xD8, 0xFF],
    }
}

fn receipt(success: bool, key: &str) -> PaymentReceipt {
    PaymentReceipt {
        success,
        message: if success { "ok".into() } else { "slip unreadable".into() },
        key: key.into(),
        protocol: "vless".into(),
        transaction_id: "TX-1".into(),
    }
}

#[tokio::test]
async fn verified_payment_imports_purchased_key() {
    let gw = FakeGateway::default();
    *gw.receipt.lock().unwrap() = Some(receipt(true, KEY_B));
    let rig = rig(gw, federated_session(), TunnelRunState::Stopped).await;

    let report = rig.controller.verify_payment(slip(), "vless").await.unwrap();

    assert_eq!(report.receipt.transaction_id, "TX-1");
    let active = rig.controller.active_profile().unwrap().unwrap();
    assert_eq!(active.id, report.outcome.active());
    assert_eq!(active.display_name, "Beta");
    rig.controller.shutdown().await;
}

#[tokio::test]
async fn purchased_primary_key_keeps_auto_label() {
    let gw = gateway_with_grant(grant(Some(KEY_A), Some("U1")));
    *gw.receipt.lock().unwrap() = Some(receipt(true, KEY_A));
    let rig = rig(gw, SessionState::default(), TunnelRunState::Stopped).await;

    rig.controller.login_federated(&token("good-token")).await.unwrap();
    let report = rig.controller.verify_payment(slip(), "vless").await.unwrap();

    let active = rig.controller.profile(report.outcome.active()).unwrap();
    assert_eq!(active.display_name, AUTO_LABEL);
    assert_eq!(rig.store.len(), 1);
    rig.controller.shutdown().await;
}

#[tokio::test]
async fn rejected_payment_changes_nothing() {
    let gw = FakeGateway::default();
    *gw.receipt.lock().unwrap() = Some(receipt(false, ""));
    let rig = rig(gw, federated_session(), TunnelRunState::Stopped).await;

    let err = rig.controller.verify_payment(slip(), "vless").await.unwrap_err();

    assert!(matches!(err, CoreError::Rejected { ref message } if message == "slip unreadable"));
    assert!(rig.store.is_empty());
    assert_eq!(rig.controller.session().active(), None);
}

// ── Status ──────────────────────────────────────────────────────────

#[tokio::test]
async fn status_queries_the_active_key_identity() {
    let gw = gateway_with_grant(grant(Some(KEY_A), None));
    *gw.status.lock().unwrap() = Some(user_status("U1", 70.4));
    let rig = rig(gw, SessionState::default(), TunnelRunState::Stopped).await;
    rig.controller.login_federated(&token("good-token")).await.unwrap();

    let mut watch = rig.controller.status_watch();
    let report = rig.controller.status().await.unwrap();

    assert_eq!(report.identity, "U1");
    assert_eq!(report.usage_percentage, 70);
    assert!(watch.has_changed().unwrap());
    let published = watch.borrow_and_update().clone().unwrap();
    assert_eq!(published.identity, "U1");
    rig.controller.shutdown().await;
}

#[tokio::test]
async fn placeholder_status_uses_owner_identity() {
    let gw = gateway_with_grant(grant(None, None));
    *gw.status.lock().unwrap() = Some(user_status("master", 0.0));
    let rig = rig(gw, SessionState::default(), TunnelRunState::Stopped).await;
    rig.controller.login_phone("+95 9 555 0100").await.unwrap();

    let report = rig.controller.status().await.unwrap();
    assert_eq!(report.identity, "master");
    rig.controller.shutdown().await;
}

#[tokio::test]
async fn status_without_active_profile_fails() {
    let rig = rig(
        FakeGateway::default(),
        SessionState::default(),
        TunnelRunState::Stopped,
    )
    .await;
    let err = rig.controller.status().await.unwrap_err();
    assert!(matches!(err, CoreError::NoStatusIdentity));
}

// ── Account lifecycle ───────────────────────────────────────────────

#[tokio::test]
async fn logout_stops_running_tunnel_and_clears_session() {
    let gw = gateway_with_grant(grant(Some(KEY_A), None));
    let rig = rig(gw, SessionState::default(), TunnelRunState::Running).await;
    rig.controller.login_federated(&token("good-token")).await.unwrap();

    let report = rig.controller.logout().await;

    assert!(report.tunnel_stopped);
    assert_eq!(rig.tunnel.calls().last().map(String::as_str), Some("stop"));
    assert_eq!(rig.controller.session().snapshot(), SessionState::default());
    assert_eq!(rig.store.len(), 1);
    rig.controller.shutdown().await;
}

#[tokio::test]
async fn logout_with_stopped_tunnel_does_not_stop_it() {
    let rig = rig(
        FakeGateway::default(),
        federated_session(),
        TunnelRunState::Stopped,
    )
    .await;
    let report = rig.controller.logout().await;
    assert!(!report.tunnel_stopped);
    assert!(rig.tunnel.calls().is_empty());
}

#[tokio::test]
async fn switch_account_keeps_active_profile() {
    let gw = gateway_with_grant(grant(Some(KEY_A), None));
    let rig = rig(gw, SessionState::default(), TunnelRunState::Stopped).await;
    let report = rig.controller.login_federated(&token("good-token")).await.unwrap();

    rig.controller.switch_account();

    let session = rig.controller.session().snapshot();
    assert_eq!(session.owner_identity, None);
    assert_eq!(session.active_profile_id, Some(report.outcome.active()));
    rig.controller.shutdown().await;
}

// ── Profiles ────────────────────────────────────────────────────────

#[tokio::test]
async fn active_profile_cannot_be_deleted() {
    let gw = gateway_with_grant(grant(Some(&format!("{KEY_A} {KEY_B}")), None));
    let rig = rig(gw, SessionState::default(), TunnelRunState::Stopped).await;
    let report = rig.controller.login_federated(&token("good-token")).await.unwrap();
    let active = report.outcome.active();

    let err = rig.controller.delete_profile(active).unwrap_err();
    assert!(matches!(err, CoreError::Rejected { .. }));

    let other = rig
        .controller
        .profiles()
        .unwrap()
        .into_iter()
        .find(|p| p.id != active)
        .unwrap();
    rig.controller.delete_profile(other.id).unwrap();
    assert_eq!(rig.store.len(), 1);
    rig.controller.shutdown().await;
}

#[tokio::test]
async fn select_profile_moves_active_and_resyncs() {
    let gw = gateway_with_grant(grant(Some(&format!("{KEY_A} {KEY_B}")), None));
    let rig = rig(gw, SessionState::default(), TunnelRunState::Running).await;
    let report = rig.controller.login_federated(&token("good-token")).await.unwrap();
    let other = rig
        .controller
        .profiles()
        .unwrap()
        .into_iter()
        .find(|p| p.id != report.outcome.active())
        .unwrap();

    rig.controller.select_profile(other.id).unwrap();

    assert_eq!(rig.controller.session().active(), Some(other.id));
    assert_eq!(
        rig.tunnel.calls().last().cloned(),
        Some(format!("reload:{}", other.id))
    );
    rig.controller.shutdown().await;
}

// ── Lifecycle ───────────────────────────────────────────────────────

#[tokio::test]
async fn import_after_shutdown_is_refused() {
    let rig = rig(
        FakeGateway::default(),
        federated_session(),
        TunnelRunState::Stopped,
    )
    .await;
    rig.controller.shutdown().await;

    let err = rig.controller.import_key(KEY_A).await.unwrap_err();
    assert!(matches!(err, CoreError::ControllerStopped));
}

#[tokio::test]
async fn flows_before_start_fail_instead_of_waiting() {
    let store = Arc::new(MemoryProfileStore::new());
    let tunnel = RecordingTunnel::new(TunnelRunState::Running);
    let config = ControllerConfig::new(Url::parse("http://127.0.0.1:8082").unwrap());
    let controller = Controller::with_gateway(
        config,
        gateway_with_grant(grant(Some(KEY_A), None)),
        store.clone(),
        tunnel.clone(),
        SessionController::new(federated_session()),
    );

    let err = tokio::time::timeout(Duration::from_secs(5), controller.import_key(KEY_A))
        .await
        .expect("import must not wait for a worker that never started")
        .unwrap_err();
    assert!(matches!(err, CoreError::ControllerStopped));

    let err = tokio::time::timeout(
        Duration::from_secs(5),
        controller.login_federated(&token("good-token")),
    )
    .await
    .expect("login must not wait for a worker that never started")
    .unwrap_err();
    assert!(matches!(err, CoreError::ControllerStopped));
    assert_eq!(controller.session().snapshot(), federated_session());
    assert!(store.is_empty());

    // Logout needs no worker.
    let report = tokio::time::timeout(Duration::from_secs(5), controller.logout())
        .await
        .unwrap();
    assert!(report.tunnel_stopped);
    assert_eq!(controller.session().snapshot(), SessionState::default());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn logout_is_ordered_with_queued_passes() {
    let gw = gateway_with_grant(grant(Some(KEY_A), Some("U1")));
    let rig = rig(gw, SessionState::default(), TunnelRunState::Stopped).await;

    for _ in 0..25 {
        let login = {
            let controller = rig.controller.clone();
            tokio::spawn(async move { controller.login_federated(&token("good-token")).await })
        };
        let logout = {
            let controller = rig.controller.clone();
            tokio::spawn(async move { controller.logout().await })
        };
        login.await.unwrap().unwrap();
        logout.await.unwrap();

        // Either the login's pass ran last, or the logout did.
        let session = rig.controller.session().snapshot();
        assert_eq!(
            session.active_profile_id.is_some(),
            session.owner_identity.is_some(),
            "{session:?}"
        );
        assert_eq!(
            session.primary_key_identity.is_some(),
            session.owner_identity.is_some()
        );
    }
    assert_eq!(rig.store.len(), 1);
    rig.controller.shutdown().await;
}
