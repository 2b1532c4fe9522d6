// ── Tunnel lifecycle coordination ──
//
// The tunnel itself is an external collaborator. The coordinator only
// reads its run state and issues start / stop / reload requests; the
// eventual outcome is observed through the tunnel's own state, never
// awaited here.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::TunnelError;
use crate::model::Profile;

/// Run state as reported by the tunnel collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum TunnelRunState {
    Stopped,
    Starting,
    Running,
    Stopping,
}

/// The local tunnel service.
///
/// Requests are fire-and-forget: `Ok` means the request was issued, not
/// that the tunnel reached the target state.
pub trait Tunnel: Send + Sync {
    fn state(&self) -> TunnelRunState;

    fn start(&self, profile: &Profile) -> Result<(), TunnelError>;

    /// Re-read `profile` in place without a full stop/start.
    fn reload(&self, profile: &Profile) -> Result<(), TunnelError>;

    fn stop(&self) -> Result<(), TunnelError>;
}

/// What `resync` asked the tunnel to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ResyncAction {
    Reload,
    Start,
}

#[derive(Clone)]
pub struct TunnelCoordinator {
    tunnel: Arc<dyn Tunnel>,
}

impl TunnelCoordinator {
    pub fn new(tunnel: Arc<dyn Tunnel>) -> Self {
        Self { tunnel }
    }

    pub fn state(&self) -> TunnelRunState {
        self.tunnel.state()
    }

    /// Point the tunnel at `active`.
    ///
    /// Reloads a running tunnel, starts anything else. `Starting` and
    /// `Stopping` count as stopped so a reload never races the tunnel's
    /// own startup. A request that cannot be issued is logged, not
    /// propagated.
    pub fn resync(&self, active: &Profile) -> ResyncAction {
        let state = self.tunnel.state();
        let (action, result) = if state == TunnelRunState::Running {
            (ResyncAction::Reload, self.tunnel.reload(active))
        } else {
            (ResyncAction::Start, self.tunnel.start(active))
        };

        match result {
            Ok(()) => info!(%state, %action, profile_id = %active.id, "tunnel resync issued"),
            Err(e) => warn!(%state, %action, error = %e, "tunnel resync request failed"),
        }
        action
    }

    pub fn start(&self, active: &Profile) -> Result<(), TunnelError> {
        self.tunnel.start(active)
    }

    pub fn stop(&self) -> Result<(), TunnelError> {
        self.tunnel.stop()
    }

    /// Stop the tunnel unless it is already stopped or stopping.
    /// Returns `true` if a stop was issued.
    pub fn stop_if_running(&self) -> Result<bool, TunnelError> {
        match self.tunnel.state() {
            TunnelRunState::Running | TunnelRunState::Starting => {
                self.tunnel.stop()?;
                info!("tunnel stop issued");
                Ok(true)
            }
            TunnelRunState::Stopped | TunnelRunState::Stopping => Ok(false),
        }
    }
}

/// A tunnel that is never running and accepts every request.
///
/// Used when no tunnel integration is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct DetachedTunnel;

impl Tunnel for DetachedTunnel {
    fn state(&self) -> TunnelRunState {
        TunnelRunState::Stopped
    }

    fn start(&self, _profile: &Profile) -> Result<(), TunnelError> {
        Ok(())
    }

    fn reload(&self, _profile: &Profile) -> Result<(), TunnelError> {
        Ok(())
    }

    fn stop(&self) -> Result<(), TunnelError> {
        Ok(())
    }
}
