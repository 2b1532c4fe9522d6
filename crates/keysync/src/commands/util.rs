//! Shared helpers for command handlers.

use std::fmt::Write as _;
use std::io::{IsTerminal, Read};
use std::path::Path;

use keysync_core::{Controller, ImportOutcome, PaymentSlip, ProfileId};

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output;

/// Prompt for confirmation, auto-approving if `--yes` was passed.
pub fn confirm(message: &str, yes_flag: bool) -> Result<bool, CliError> {
    if yes_flag {
        return Ok(true);
    }
    if !std::io::stdin().is_terminal() {
        return Err(CliError::Validation {
            field: "confirmation".into(),
            reason: "not a terminal; pass --yes to confirm".into(),
        });
    }
    dialoguer::Confirm::new()
        .with_prompt(message)
        .default(false)
        .interact()
        .map_err(|e| CliError::Io(std::io::Error::other(e)))
}

/// Key material from the argument, or from stdin when it is `-`.
pub fn read_key_material(arg: &str) -> Result<String, CliError> {
    if arg != "-" {
        return Ok(arg.to_owned());
    }
    let mut buf = String::new();
    std::io::stdin().read_to_string(&mut buf)?;
    Ok(buf)
}

pub fn parse_profile_id(raw: &str) -> Result<ProfileId, CliError> {
    raw.parse().map_err(|_| CliError::Validation {
        field: "profile id".into(),
        reason: format!("expected a number, got '{raw}'"),
    })
}

/// Read a payment slip image, guessing its MIME type from the extension.
pub fn read_slip(path: &Path) -> Result<PaymentSlip, CliError> {
    let bytes = std::fs::read(path)?;
    let file_name = path
        .file_name()
        .map_or_else(|| "slip".into(), |n| n.to_string_lossy().into_owned());
    let ext = path
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    let mime_type = match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "webp" => "image/webp",
        "heic" => "image/heic",
        _ => "application/octet-stream",
    };
    Ok(PaymentSlip {
        file_name,
        mime_type: mime_type.into(),
        bytes,
    })
}

// ── Import outcome rendering ─────────────────────────────────────────

/// Human-readable summary of a reconciliation pass.
pub fn describe_outcome(
    controller: &Controller,
    outcome: &ImportOutcome,
    color: bool,
) -> String {
    let mut out = String::new();
    let active = outcome.active();
    let active_name = controller
        .profile(active)
        .map(|p| p.display_name)
        .unwrap_or_default();

    match outcome {
        ImportOutcome::Complete {
            applied, resync, ..
        } => {
            for entry in applied {
                let _ = writeln!(
                    out,
                    "  {:<9} #{} {}",
                    entry.action, entry.profile_id, entry.display_name
                );
            }
            let _ = write!(out, "Active: #{active} {active_name} (tunnel {resync})");
        }
        ImportOutcome::Degraded {
            reason,
            placeholder_created,
            resync,
            ..
        } => {
            let note = if *placeholder_created {
                "created"
            } else {
                "reused"
            };
            let warning = format!("No keys imported ({reason}); placeholder {note}");
            let _ = writeln!(out, "{}", output::paint_warning(&warning, color));
            let _ = write!(out, "Active: #{active} {active_name} (tunnel {resync})");
        }
    }
    out
}

pub fn print_outcome(controller: &Controller, outcome: &ImportOutcome, global: &GlobalOpts) {
    let color = output::should_color(&global.color);
    let out = output::render_single(
        &global.output,
        outcome,
        |o| describe_outcome(controller, o, color),
        |o| o.active().to_string(),
    );
    output::print_output(&out, global.quiet);
}
