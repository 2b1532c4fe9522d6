//! Command dispatch: bridges CLI args -> controller flows -> output formatting.

pub mod account;
pub mod config_cmd;
pub mod keys;
pub mod profiles;
pub mod status;
pub mod tunnel;
pub mod util;

use keysync_config::Config;
use keysync_core::Controller;

use crate::cli::{Command, GlobalOpts};
use crate::error::CliError;

/// Dispatch a session-bound command to the appropriate handler.
pub async fn dispatch(
    cmd: Command,
    controller: &Controller,
    cfg: &Config,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match cmd {
        Command::Login(args) => account::login(controller, args, global).await,
        Command::Resume => account::resume(controller, cfg, global).await,
        Command::Import(args) => keys::import(controller, args, global).await,
        Command::Keys(args) => keys::keys(controller, args, global).await,
        Command::Plans => keys::plans(controller, global).await,
        Command::Pay(args) => keys::pay(controller, args, global).await,
        Command::Status(args) => status::handle(controller, args, global).await,
        Command::Profiles(args) => profiles::handle(controller, args, global),
        Command::Session(args) => {
            account::session(controller, &args, global);
            Ok(())
        }
        Command::Logout => account::logout(controller, global).await,
        Command::SwitchAccount => {
            account::switch_account(controller, global);
            Ok(())
        }
        Command::Tunnel(args) => tunnel::handle(controller, &args, global),
        // Config and Completions are handled before dispatch
        Command::Config(_) | Command::Completions(_) => Err(CliError::Validation {
            field: "command".into(),
            reason: "not a session command".into(),
        }),
    }
}
