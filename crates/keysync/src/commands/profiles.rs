//! Profile command handlers.

use std::fmt::Write as _;

use tabled::Tabled;

use keysync_core::{Controller, Profile, ProfileId};

use crate::cli::{GlobalOpts, ProfilesArgs, ProfilesCommand};
use crate::error::CliError;
use crate::output;

use super::util;

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct ProfileRow {
    #[tabled(rename = "")]
    marker: &'static str,
    #[tabled(rename = "ID")]
    id: u64,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Protocol")]
    protocol: &'static str,
    #[tabled(rename = "Endpoint")]
    endpoint: String,
    #[tabled(rename = "Identity")]
    identity: String,
}

impl ProfileRow {
    fn new(p: &Profile, active: Option<ProfileId>) -> Self {
        Self {
            marker: if active == Some(p.id) { "*" } else { "" },
            id: p.id.0,
            name: p.display_name.clone(),
            protocol: p.config.protocol(),
            endpoint: p.config.endpoint(),
            identity: p.embedded_identity().unwrap_or("-").to_owned(),
        }
    }
}

fn describe(p: &Profile, active: bool) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "Profile #{}{}",
        p.id,
        if active { " (active)" } else { "" }
    );
    let _ = writeln!(out, "  Name:      {}", p.display_name);
    let _ = writeln!(out, "  Group:     {}", p.group_id);
    let _ = writeln!(out, "  Protocol:  {}", p.config.protocol());
    let _ = writeln!(out, "  Endpoint:  {}", p.config.endpoint());
    let _ = writeln!(
        out,
        "  Identity:  {}",
        p.embedded_identity().unwrap_or("-")
    );
    let _ = writeln!(
        out,
        "  Owner:     {}",
        p.owner_identity.as_deref().unwrap_or("-")
    );
    if p.config.is_placeholder() {
        let _ = writeln!(out, "  Placeholder: yes");
    }
    let _ = writeln!(
        out,
        "  Created:   {}",
        p.created_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    let _ = write!(
        out,
        "  Updated:   {}",
        p.updated_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    out
}

// ── Handler ─────────────────────────────────────────────────────────

pub fn handle(
    controller: &Controller,
    args: ProfilesArgs,
    global: &GlobalOpts,
) -> Result<(), CliError> {
    let active = controller.session().active();

    match args.command {
        ProfilesCommand::List => {
            let profiles = controller.profiles()?;
            let out = output::render_list(
                &global.output,
                &profiles,
                |p| ProfileRow::new(p, active),
                |p| p.id.to_string(),
            );
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ProfilesCommand::Show { id } => {
            let id = util::parse_profile_id(&id)?;
            let profile = controller.profile(id)?;
            let out = output::render_single(
                &global.output,
                &profile,
                |p| describe(p, active == Some(p.id)),
                |p| p.config.raw_link.clone(),
            );
            output::print_output(&out, global.quiet);
            Ok(())
        }

        ProfilesCommand::Select { id } => {
            let id = util::parse_profile_id(&id)?;
            let action = controller.select_profile(id)?;
            if !global.quiet {
                eprintln!("Profile #{id} is now active (tunnel {action})");
            }
            Ok(())
        }

        ProfilesCommand::Delete { id } => {
            let id = util::parse_profile_id(&id)?;
            if active == Some(id) {
                return Err(CliError::Conflict {
                    resource_type: "profile".into(),
                    identifier: id.to_string(),
                    reason: "is active; select another profile before deleting it".into(),
                });
            }
            let profile = controller.profile(id)?;
            if !util::confirm(
                &format!("Delete profile #{id} '{}'?", profile.display_name),
                global.yes,
            )? {
                return Ok(());
            }
            controller.delete_profile(id)?;
            if !global.quiet {
                eprintln!("Profile #{id} deleted");
            }
            Ok(())
        }
    }
}
