//! Key management - generate secrets and re-encrypt under the active key

use anyhow::Result;
use colored::Colorize;
use remit_core::adapters::generate_secret;

use super::{get_context, require_session};
use crate::output;

/// Print fresh secrets as shell exports
pub fn keygen() -> Result<()> {
    println!("export JWT_SECRET={}", generate_secret());
    println!("export ENCRYPTION_KEY={}", generate_secret());
    eprintln!(
        "{}",
        "Store these outside the data directory. Changing ENCRYPTION_KEY requires \
         listing the previous key in REMIT_RETIRED_KEYS and running `remit rotate-keys`."
            .dimmed()
    );
    Ok(())
}

pub async fn rotate(token: Option<&str>, json: bool) -> Result<()> {
    let ctx = get_context()?;
    let claims = require_session(&ctx, token)?;
    let users = ctx.auth.rotate_keys(&claims).await?;
    let payments = ctx.payments.rotate_keys(&claims).await?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "keyId": ctx.cipher.active_key_id(),
                "users": users,
                "payments": payments,
            }))?
        );
        return Ok(());
    }

    output::success(&format!("Active key: {}", ctx.cipher.active_key_id()));
    println!("  Users:    {}/{} re-encrypted", users.rotated, users.scanned);
    println!("  Payments: {}/{} re-encrypted", payments.rotated, payments.scanned);
    Ok(())
}
