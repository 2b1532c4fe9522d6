mod cli;
mod commands;
mod config;
mod error;
mod output;
mod tunnel;

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use keysync_core::{
    Controller, DetachedTunnel, FileProfileStore, ProfileStore, SessionController, Tunnel,
};

use crate::cli::{Cli, Command};
use crate::error::CliError;
use crate::tunnel::CommandTunnel;

/// Status refresh used by `status --watch` when neither the flag nor the
/// config sets one.
const DEFAULT_WATCH_INTERVAL_SECS: u64 = 30;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    init_tracing(cli.global.verbose);

    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

fn init_tracing(verbosity: u8) {
    let filter = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(cli: Cli) -> Result<(), CliError> {
    match cli.command {
        // Config commands don't touch the session or the control-plane
        Command::Config(args) => commands::config_cmd::handle(args, &cli.global),

        Command::Completions(args) => {
            use clap::CommandFactory;
            use clap_complete::generate;

            let mut cmd = Cli::command();
            generate(args.shell, &mut cmd, "keysync", &mut std::io::stdout());
            Ok(())
        }

        cmd => {
            let cfg = config::load(&cli.global)?;
            let mut controller_config = cfg.to_controller_config()?;
            controller_config.status_interval_secs = match &cmd {
                Command::Status(args) if args.watch => args
                    .interval
                    .filter(|secs| *secs > 0)
                    .or(Some(cfg.status_interval).filter(|secs| *secs > 0))
                    .unwrap_or(DEFAULT_WATCH_INTERVAL_SECS),
                _ => 0,
            };

            let session_path = cfg.session_path();
            let initial = keysync_config::load_session(&session_path)?;
            let session = SessionController::new(initial.clone());

            let store: Arc<dyn ProfileStore> =
                Arc::new(FileProfileStore::open(cfg.profiles_path())?);
            let tunnel: Arc<dyn Tunnel> = if CommandTunnel::is_configured(&cfg.tunnel) {
                Arc::new(CommandTunnel::new(cfg.tunnel.clone()))
            } else {
                Arc::new(DetachedTunnel)
            };

            let controller =
                Controller::connect(controller_config, store, tunnel, session.clone())?;
            controller.start().await;

            tracing::debug!(command = ?cmd, "dispatching command");
            let result = commands::dispatch(cmd, &controller, &cfg, &cli.global).await;
            controller.shutdown().await;

            let current = session.snapshot();
            if current != initial {
                keysync_config::save_session(&session_path, &current)?;
                tracing::debug!(path = %session_path.display(), "session saved");
            }
            result
        }
    }
}
