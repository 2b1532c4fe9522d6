//! Credential reconciliation and session lifecycle engine.
//!
//! Turns machine-issued key material into locally runnable tunnel profiles
//! and keeps one active selection consistent across every credential
//! event:
//!
//! - **[`parser`]** decodes key material (share links or a base64
//!   subscription blob) into [`ProxyConfig`] records. Pure, never fails
//!   past its boundary.
//!
//! - **[`matcher`]** finds the stored profile that represents the same
//!   remote credential by embedded identity, and applies the primary-key
//!   naming policy.
//!
//! - **[`ReconciliationEngine`]** runs one pass: parse → match → upsert →
//!   select → resync, with a deterministic placeholder when nothing was
//!   issued.
//!
//! - **[`SessionController`]** owns the active-profile pointer and the
//!   remembered identity used for silent re-entry.
//!
//! - **[`TunnelCoordinator`]** reloads a running tunnel or starts a stopped
//!   one after every successful pass.
//!
//! - **[`Controller`]** is the facade the CLI drives: login flows, the
//!   single-worker reconciliation queue, key retrieval, payment, status
//!   polling and account lifecycle.

pub mod config;
pub mod controller;
pub mod error;
pub mod gateway;
pub mod matcher;
pub mod model;
pub mod parser;
pub mod reconcile;
pub mod session;
pub mod status;
pub mod store;
pub mod tunnel;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::ControllerConfig;
pub use controller::{Controller, LoginReport, LogoutReport, PaymentReport, ResumeOutcome};
pub use error::{CoreError, ReconcileError, StoreError, TunnelError};
pub use gateway::{AuthGateway, LoginGrant};
pub use model::{GroupId, NewProfile, Profile, ProfileId, ProxyConfig, ProxyKind};
pub use reconcile::{
    AppliedProfile, DegradedReason, ImportOutcome, ReconcileSettings, ReconciliationEngine,
    UpsertAction,
};
pub use session::{LoginKind, RememberedIdentity, ResumePlan, SessionController, SessionState};
pub use status::{StatusReport, UsageBand};
pub use store::{FileProfileStore, MemoryProfileStore, ProfileStore};
pub use tunnel::{DetachedTunnel, ResyncAction, Tunnel, TunnelCoordinator, TunnelRunState};

// Control-plane types surfaced through the controller.
pub use keysync_api::{IssuedKey, PaymentReceipt, PaymentSlip, PlanCatalog};
