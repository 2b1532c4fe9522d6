//! Config subcommand handlers.

use keysync_config::Config;

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::config;
use crate::error::CliError;
use crate::output;

const MASK: &str = "****";

/// Copy of `cfg` with secrets replaced by a mask.
fn redacted(cfg: &Config) -> Config {
    let mut shown = cfg.clone();
    if shown.account.federated_token.is_some() {
        shown.account.federated_token = Some(MASK.into());
    }
    shown
}

pub fn handle(args: ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Show => {
            let cfg = redacted(&config::load(global)?);
            let out = output::render_single(
                &global.output,
                &cfg,
                |c| toml::to_string_pretty(c).unwrap_or_default(),
                |c| c.api_url.clone(),
            );
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ConfigCommand::Path => {
            output::print_output(&config::config_path(global).display().to_string(), false);
            Ok(())
        }

        ConfigCommand::Init { force } => {
            let path = config::config_path(global);
            if path.exists() && !force {
                return Err(CliError::Conflict {
                    resource_type: "config file".into(),
                    identifier: path.display().to_string(),
                    reason: "already exists; pass --force to overwrite".into(),
                });
            }
            keysync_config::save_config_to(&Config::default(), &path)?;
            if !global.quiet {
                eprintln!("Wrote {}", path.display());
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_is_masked() {
        let mut cfg = Config::default();
        cfg.account.federated_token = Some("secret-token".into());
        assert_eq!(redacted(&cfg).account.federated_token.as_deref(), Some(MASK));
        assert_eq!(redacted(&Config::default()).account.federated_token, None);
    }
}
