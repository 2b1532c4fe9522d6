//! Key import, issued-key retrieval, plans and payment handlers.

use std::fmt::Write as _;

use tabled::Tabled;

use keysync_core::{Controller, IssuedKey, PaymentReport, PlanCatalog};

use crate::cli::{GlobalOpts, ImportArgs, KeysArgs, KeysCommand, PayArgs};
use crate::error::CliError;
use crate::output;

use super::util;

// ── Table rows ──────────────────────────────────────────────────────

#[derive(Tabled)]
struct IssuedKeyRow {
    #[tabled(rename = "ID")]
    id: i64,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Protocol")]
    protocol: String,
    #[tabled(rename = "Server")]
    server: String,
    #[tabled(rename = "Active")]
    active: &'static str,
    #[tabled(rename = "Expires")]
    expires: String,
}

impl From<&IssuedKey> for IssuedKeyRow {
    fn from(k: &IssuedKey) -> Self {
        Self {
            id: k.id,
            name: k.key_name.clone(),
            protocol: k.protocol.clone(),
            server: format!("{}:{}", k.server_address, k.server_port),
            active: if k.is_active { "yes" } else { "no" },
            expires: k.expires_at.clone().unwrap_or_default(),
        }
    }
}

// ── Handlers ────────────────────────────────────────────────────────

pub async fn import(
    controller: &Controller,
    args: ImportArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let material = util::read_key_material(&args.key)?;
    let outcome = controller.import_key(&material).await?;
    util::print_outcome(controller, &outcome, global);
    Ok(())
}

pub async fn keys(
    controller: &Controller,
    args: KeysArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    match args.command {
        KeysCommand::List => {
            let keys = controller.issued_keys().await?;
            let out = output::render_list(
                &global.output,
                &keys,
                |k| IssuedKeyRow::from(k),
                |k| k.id.to_string(),
            );
            output::print_output(&out, global.quiet);
            Ok(())
        }
        KeysCommand::Import { id } => {
            let outcome = controller.import_issued_key(id).await?;
            util::print_outcome(controller, &outcome, global);
            Ok(())
        }
    }
}

pub async fn plans(controller: &Controller, global: &GlobalOpts) -> Result<(), CliError> {
    let catalog = controller.plans().await?;
    let out = output::render_single(&global.output, &catalog, describe_plans, |c| {
        c.protocols
            .iter()
            .map(|p| p.code.clone())
            .collect::<Vec<_>>()
            .join("\n")
    });
    output::print_output(&out, global.quiet);
    Ok(())
}

fn describe_plans(catalog: &PlanCatalog) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Price:   {}", catalog.payment.price);
    let _ = writeln!(out, "KBZPay:  {}", catalog.payment.kbz);
    let _ = writeln!(out, "WavePay: {}", catalog.payment.wave);
    let _ = writeln!(out, "Support: {}", catalog.support.contact);
    let _ = writeln!(out);
    let _ = write!(out, "Protocols:");
    for plan in &catalog.protocols {
        let _ = write!(out, "\n  {:<14} {}", plan.code, plan.name);
    }
    out
}

pub async fn pay(
    controller: &Controller,
    args: PayArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let slip = util::read_slip(&args.slip)?;
    let report = controller.verify_payment(slip, &args.protocol).await?;

    let color = output::should_color(&global.color);
    let out = output::render_single(
        &global.output,
        &report,
        |r: &PaymentReport| {
            format!(
                "Payment verified (transaction {})\n{}",
                r.receipt.transaction_id,
                util::describe_outcome(controller, &r.outcome, color)
            )
        },
        |r| r.receipt.transaction_id.clone(),
    );
    output::print_output(&out, global.quiet);
    Ok(())
}
