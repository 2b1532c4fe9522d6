//! Login, resume, logout and session handlers.

use std::fmt::Write as _;

use secrecy::SecretString;
use tracing::warn;

use keysync_config::Config;
use keysync_core::{Controller, LoginReport, ResumeOutcome, ResumePlan, SessionState};

use crate::cli::{GlobalOpts, LoginArgs, LoginCommand, SessionArgs, SessionCommand};
use crate::error::CliError;
use crate::output;

use super::util;

// ── Login ───────────────────────────────────────────────────────────

pub async fn login(
    controller: &Controller,
    args: LoginArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let report = match args.command {
        LoginCommand::Google { token, no_remember } => {
            let token = match token {
                Some(t) => SecretString::from(t),
                None => prompt_token()?,
            };
            let report = controller.login_federated(&token).await?;
            if !no_remember {
                if let Err(e) =
                    keysync_config::store_federated_token(&report.identity.owner_identity, &token)
                {
                    warn!(error = %e, "could not store ID token; `resume` will need it again");
                }
            }
            report
        }
        LoginCommand::Phone { number } => controller.login_phone(&number).await?,
    };

    print_login(controller, &report, global);
    Ok(())
}

fn prompt_token() -> Result<SecretString, CliError> {
    rpassword::prompt_password("Google ID token: ")
        .ok()
        .filter(|t| !t.trim().is_empty())
        .map(SecretString::from)
        .ok_or_else(|| CliError::Validation {
            field: "token".into(),
            reason: "no ID token given; pass --token or set KEYSYNC_ID_TOKEN".into(),
        })
}

fn print_login(controller: &Controller, report: &LoginReport, global: &GlobalOpts) {
    let color = output::should_color(&global.color);
    let out = output::render_single(
        &global.output,
        report,
        |r| {
            format!(
                "Logged in as {} ({})\n{}",
                r.identity.display_name,
                r.identity.login_kind,
                util::describe_outcome(controller, &r.outcome, color)
            )
        },
        |r| r.identity.owner_identity.clone(),
    );
    output::print_output(&out, global.quiet);
}

// ── Resume ──────────────────────────────────────────────────────────

pub async fn resume(
    controller: &Controller,
    cfg: &Config,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let token = match controller.session().resume_plan() {
        ResumePlan::SilentFederated(identity) => {
            match cfg.resolve_federated_token(&identity.owner_identity) {
                Ok(token) => Some(token),
                Err(e) => {
                    warn!(error = %e, "no stored ID token for silent re-entry");
                    None
                }
            }
        }
        ResumePlan::Direct(_) | ResumePlan::FreshLogin => None,
    };

    let outcome = controller.resume(token.as_ref()).await?;
    if outcome == ResumeOutcome::NeedsLogin {
        return Err(CliError::NotLoggedIn);
    }

    let color = output::should_color(&global.color);
    let out = output::render_single(
        &global.output,
        &outcome,
        |o| match o {
            ResumeOutcome::Resumed { identity } => {
                format!("Resumed session for {}", identity.display_name)
            }
            ResumeOutcome::Reauthenticated { report } => format!(
                "Re-authenticated as {}\n{}",
                report.identity.display_name,
                util::describe_outcome(controller, &report.outcome, color)
            ),
            ResumeOutcome::NeedsLogin => String::new(),
        },
        |o| match o {
            ResumeOutcome::Resumed { identity } => identity.owner_identity.clone(),
            ResumeOutcome::Reauthenticated { report } => report.identity.owner_identity.clone(),
            ResumeOutcome::NeedsLogin => String::new(),
        },
    );
    output::print_output(&out, global.quiet);
    Ok(())
}

// ── Logout / switch ─────────────────────────────────────────────────

pub async fn logout(controller: &Controller, global: &GlobalOpts) -> Result<(), CliError> {
    let owner = controller.session().owner_identity();
    let report = controller.logout().await;

    if let Some(owner) = owner {
        if let Err(e) = keysync_config::delete_federated_token(&owner) {
            warn!(error = %e, "could not remove stored ID token");
        }
    }

    if !global.quiet {
        if report.tunnel_stopped {
            eprintln!("Logged out (tunnel stopped)");
        } else {
            eprintln!("Logged out");
        }
    }
    Ok(())
}

pub fn switch_account(controller: &Controller, global: &GlobalOpts) {
    controller.switch_account();
    if !global.quiet {
        eprintln!("Remembered identity cleared. Log in with the other account next.");
    }
}

// ── Session ─────────────────────────────────────────────────────────

pub fn session(controller: &Controller, args: &SessionArgs, global: &GlobalOpts) {
    match args.command {
        SessionCommand::Show => {
            let state = controller.session().snapshot();
            let out = output::render_single(
                &global.output,
                &state,
                describe_session,
                |s| s.owner_identity.clone().unwrap_or_default(),
            );
            output::print_output(&out, global.quiet);
        }
    }
}

fn describe_session(state: &SessionState) -> String {
    let dash = || "-".to_owned();
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Active profile: {}",
        state
            .active_profile_id
            .map_or_else(dash, |id| format!("#{id}"))
    );
    let _ = writeln!(
        out,
        "Account:        {}",
        state.owner_identity.clone().unwrap_or_else(dash)
    );
    let _ = writeln!(
        out,
        "Name:           {}",
        state.remembered_display_name.clone().unwrap_or_else(dash)
    );
    let _ = writeln!(
        out,
        "Contact:        {}",
        state.remembered_contact.clone().unwrap_or_else(dash)
    );
    let _ = writeln!(
        out,
        "Primary key:    {}",
        state.primary_key_identity.clone().unwrap_or_else(dash)
    );
    let _ = write!(
        out,
        "Login:          {}",
        state.login_kind.map_or_else(dash, |k| k.to_string())
    );
    out
}
