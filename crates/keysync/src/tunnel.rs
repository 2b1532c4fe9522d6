//! Shell-hook tunnel integration.
//!
//! Maps the core's tunnel requests onto the `[tunnel]` commands from the
//! config file. Start and reload are spawned without waiting; stop and
//! status run to completion.

use std::process::{Command, Stdio};

use tracing::{debug, warn};

use keysync_config::TunnelHooks;
use keysync_core::{Profile, Tunnel, TunnelError, TunnelRunState};

pub struct CommandTunnel {
    hooks: TunnelHooks,
}

impl CommandTunnel {
    pub fn new(hooks: TunnelHooks) -> Self {
        Self { hooks }
    }

    /// True when at least one hook is configured.
    pub fn is_configured(hooks: &TunnelHooks) -> bool {
        hooks.status.is_some()
            || hooks.start.is_some()
            || hooks.stop.is_some()
            || hooks.reload.is_some()
    }

    fn hook(&self, action: &'static str) -> Result<&str, TunnelError> {
        let hook = match action {
            "status" => &self.hooks.status,
            "start" => &self.hooks.start,
            "stop" => &self.hooks.stop,
            _ => &self.hooks.reload,
        };
        hook.as_deref()
            .filter(|cmd| !cmd.trim().is_empty())
            .ok_or(TunnelError::NotConfigured { action })
    }

    fn spawn_with_profile(
        &self,
        action: &'static str,
        profile: &Profile,
    ) -> Result<(), TunnelError> {
        let cmd = self.hook(action)?;
        shell(cmd)
            .env("KEYSYNC_PROFILE_ID", profile.id.to_string())
            .env("KEYSYNC_PROFILE_NAME", &profile.display_name)
            .env("KEYSYNC_LINK", &profile.config.raw_link)
            .stdin(Stdio::null())
            .spawn()
            .map_err(|source| TunnelError::Launch { action, source })?;
        debug!(action, profile_id = %profile.id, "tunnel hook spawned");
        Ok(())
    }
}

impl Tunnel for CommandTunnel {
    fn state(&self) -> TunnelRunState {
        let Ok(cmd) = self.hook("status") else {
            return TunnelRunState::Stopped;
        };
        match shell(cmd)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
        {
            Ok(status) if status.success() => TunnelRunState::Running,
            Ok(_) => TunnelRunState::Stopped,
            Err(e) => {
                warn!(error = %e, "tunnel status hook could not be launched");
                TunnelRunState::Stopped
            }
        }
    }

    fn start(&self, profile: &Profile) -> Result<(), TunnelError> {
        self.spawn_with_profile("start", profile)
    }

    fn reload(&self, profile: &Profile) -> Result<(), TunnelError> {
        self.spawn_with_profile("reload", profile)
    }

    fn stop(&self) -> Result<(), TunnelError> {
        let action = "stop";
        let cmd = self.hook(action)?;
        let status = shell(cmd)
            .stdin(Stdio::null())
            .status()
            .map_err(|source| TunnelError::Launch { action, source })?;
        if status.success() {
            Ok(())
        } else {
            Err(TunnelError::HookFailed {
                action,
                code: status.code().unwrap_or(-1),
            })
        }
    }
}

#[cfg(unix)]
fn shell(cmd: &str) -> Command {
    let mut command = Command::new("sh");
    command.arg("-c").arg(cmd);
    command
}

#[cfg(windows)]
fn shell(cmd: &str) -> Command {
    let mut command = Command::new("cmd");
    command.arg("/C").arg(cmd);
    command
}

#[cfg(all(test, unix))]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::time::Duration;

    use chrono::Utc;
    use keysync_core::{GroupId, ProfileId, ProxyConfig};

    use super::*;

    fn profile() -> Profile {
        let now = Utc::now();
        Profile {
            id: ProfileId(3),
            group_id: GroupId::DEFAULT,
            owner_identity: Some("master".into()),
            display_name: "Subscriber".into(),
            config: ProxyConfig::placeholder("Subscriber"),
            created_at: now,
            updated_at: now,
        }
    }

    fn hooks(status: Option<&str>, start: Option<&str>, stop: Option<&str>) -> TunnelHooks {
        TunnelHooks {
            status: status.map(str::to_owned),
            start: start.map(str::to_owned),
            stop: stop.map(str::to_owned),
            reload: None,
        }
    }

    #[test]
    fn status_exit_code_decides_run_state() {
        assert_eq!(
            CommandTunnel::new(hooks(Some("true"), None, None)).state(),
            TunnelRunState::Running
        );
        assert_eq!(
            CommandTunnel::new(hooks(Some("false"), None, None)).state(),
            TunnelRunState::Stopped
        );
        assert_eq!(
            CommandTunnel::new(TunnelHooks::default()).state(),
            TunnelRunState::Stopped
        );
    }

    #[test]
    fn missing_hook_is_not_configured() {
        let tunnel = CommandTunnel::new(TunnelHooks::default());
        assert!(matches!(
            tunnel.reload(&profile()),
            Err(TunnelError::NotConfigured { action: "reload" })
        ));
    }

    #[test]
    fn failing_stop_reports_exit_code() {
        let tunnel = CommandTunnel::new(hooks(None, None, Some("exit 3")));
        assert!(matches!(
            tunnel.stop(),
            Err(TunnelError::HookFailed { action: "stop", code: 3 })
        ));
    }

    #[test]
    fn start_hook_sees_profile_environment() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("env.txt");
        let cmd = format!(
            "printf '%s|%s' \"$KEYSYNC_PROFILE_ID\" \"$KEYSYNC_PROFILE_NAME\" > {}",
            out.display()
        );
        let tunnel = CommandTunnel::new(hooks(None, Some(&cmd), None));

        tunnel.start(&profile()).unwrap();

        let mut written = String::new();
        for _ in 0..50 {
            written = std::fs::read_to_string(&out).unwrap_or_default();
            if !written.is_empty() {
                break;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
        assert_eq!(written, "3|Subscriber");
    }
}
