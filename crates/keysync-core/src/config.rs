// ── Runtime controller configuration ──
//
// Describes *how* to reach the control-plane and how to reconcile keys.
// Never touches disk: the CLI builds a `ControllerConfig` and hands it in.

use std::time::Duration;

use url::Url;

use crate::reconcile::ReconcileSettings;

#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Control-plane base URL (e.g. `http://203.0.113.7:8082`).
    pub api_url: Url,
    /// Request timeout.
    pub timeout: Duration,
    pub reconcile: ReconcileSettings,
    /// How often to poll status in the background (seconds). 0 = never.
    pub status_interval_secs: u64,
}

impl ControllerConfig {
    pub fn new(api_url: Url) -> Self {
        Self {
            api_url,
            timeout: Duration::from_secs(30),
            reconcile: ReconcileSettings::default(),
            status_interval_secs: 0,
        }
    }
}
