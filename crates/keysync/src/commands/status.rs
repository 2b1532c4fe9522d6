//! Subscription status handler.

use std::fmt::Write as _;

use keysync_core::{Controller, StatusReport};

use crate::cli::{GlobalOpts, StatusArgs};
use crate::error::CliError;
use crate::output;

pub async fn handle(
    controller: &Controller,
    args: StatusArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    // Surface lookup errors up front; the poller only logs them.
    let report = controller.status().await?;
    print_report(&report, global);

    if !args.watch {
        return Ok(());
    }

    let mut rx = controller.status_watch();
    rx.mark_unchanged();
    loop {
        tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let latest = rx.borrow_and_update().clone();
                if let Some(report) = latest {
                    print_report(&report, global);
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }
    Ok(())
}

fn print_report(report: &StatusReport, global: &GlobalOpts) {
    let color = output::should_color(&global.color);
    let out = output::render_single(
        &global.output,
        report,
        |r| describe(r, color),
        |r| r.usage_percentage.to_string(),
    );
    output::print_output(&out, global.quiet);
}

fn describe(r: &StatusReport, color: bool) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Account:   {}", r.identity);
    let _ = writeln!(
        out,
        "State:     {}",
        if r.active { "active" } else { "inactive" }
    );
    let _ = writeln!(out, "Expires:   {}", r.expiry_date);
    let _ = writeln!(out, "Protocol:  {}", r.protocol_label);
    let usage = format!(
        "{:.2} / {:.0} GB ({}%, {})",
        r.used_gb, r.data_limit_gb, r.usage_percentage, r.band
    );
    let _ = write!(out, "Usage:     {}", output::paint_band(&usage, r.band, color));
    if r.in_grace_period {
        let _ = write!(
            out,
            "\n{}",
            output::paint_warning(
                &format!("Grace period: {}h remaining", r.grace_remaining_hours),
                color
            )
        );
    }
    if !r.warnings_sent.is_empty() {
        let _ = write!(out, "\nWarnings:  {}", r.warnings_sent.join(", "));
    }
    out
}
