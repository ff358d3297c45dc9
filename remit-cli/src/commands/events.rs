//! `remit events` - read the security event log (admin)

use anyhow::{bail, Context, Result};
use remit_core::services::{LogEntry, SecurityEvent};
use uuid::Uuid;

use super::{get_context, require_session};
use crate::output;

pub async fn run(
    token: Option<&str>,
    user: Option<&str>,
    event: Option<&str>,
    limit: usize,
    json: bool,
) -> Result<()> {
    let ctx = get_context()?;
    let claims = require_session(&ctx, token)?;
    if !claims.is_admin() {
        bail!("Administrator role required");
    }

    let entries = match (user, event) {
        (Some(_), Some(_)) => bail!("Use either --user or --event, not both"),
        (Some(login), None) => {
            let id = match Uuid::parse_str(login) {
                Ok(id) => id,
                Err(_) => ctx.auth.find_user(&claims, login).await?.id,
            };
            ctx.events.for_user(id, limit)?
        }
        (None, Some(name)) => {
            let event = SecurityEvent::parse(name).with_context(|| {
                let known: Vec<&str> = SecurityEvent::ALL.iter().map(|e| e.as_str()).collect();
                format!("Unknown event '{}'. Expected one of: {}", name, known.join(", "))
            })?;
            ctx.events.by_event(event, limit)?
        }
        (None, None) => ctx.events.recent(limit)?,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }
    if entries.is_empty() {
        output::info("No events recorded");
        return Ok(());
    }
    print_entries(&entries);
    Ok(())
}

fn print_entries(entries: &[LogEntry]) {
    let mut table = output::create_table();
    table.set_header(vec!["Time", "Event", "User", "Subject", "Detail"]);
    for entry in entries {
        table.add_row(vec![
            output::format_millis(entry.timestamp),
            entry.event.clone(),
            entry.user_id.clone().unwrap_or_default(),
            entry.subject_id.clone().unwrap_or_default(),
            entry.detail.clone().unwrap_or_default(),
        ]);
    }
    println!("{table}");
}
