//! CLI-side config loading: the shared `keysync-config` crate plus
//! `GlobalOpts` overrides.

use std::path::PathBuf;

use keysync_config::Config;

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// Config file in effect: `--config` / `KEYSYNC_CONFIG`, else the platform path.
pub fn config_path(global: &GlobalOpts) -> PathBuf {
    global
        .config
        .clone()
        .unwrap_or_else(keysync_config::config_path)
}

/// Load file + env config, then apply flag overrides (flag > env > file).
pub fn load(global: &GlobalOpts) -> Result<Config, CliError> {
    let mut cfg = keysync_config::load_config_from(&config_path(global))?;

    if let Some(ref url) = global.api_url {
        cfg.api_url.clone_from(url);
    }
    if let Some(timeout) = global.timeout {
        if timeout == 0 {
            return Err(CliError::Validation {
                field: "timeout".into(),
                reason: "must be at least 1 second".into(),
            });
        }
        cfg.timeout = timeout;
    }

    Ok(cfg)
}
