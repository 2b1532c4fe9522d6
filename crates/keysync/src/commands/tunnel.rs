//! Tunnel command handlers.

use serde::Serialize;

use keysync_core::{Controller, TunnelRunState};

use crate::cli::{GlobalOpts, TunnelArgs, TunnelCommand};
use crate::error::CliError;
use crate::output;

#[derive(Serialize)]
struct StateView {
    state: TunnelRunState,
}

pub fn handle(
    controller: &Controller,
    args: &TunnelArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match args.command {
        TunnelCommand::State => {
            let view = StateView {
                state: controller.tunnel_state(),
            };
            let out = output::render_single(
                &global.output,
                &view,
                |v| v.state.to_string(),
                |v| v.state.to_string(),
            );
            output::print_output(&out, global.quiet);
        }
        TunnelCommand::Start => {
            controller.tunnel_start()?;
            if !global.quiet {
                eprintln!("Tunnel start requested");
            }
        }
        TunnelCommand::Stop => {
            controller.tunnel_stop()?;
            if !global.quiet {
                eprintln!("Tunnel stopped");
            }
        }
        TunnelCommand::Resync => {
            let action = controller.tunnel_resync()?;
            if !global.quiet {
                eprintln!("Tunnel {action} requested");
            }
        }
    }
    Ok(())
}
