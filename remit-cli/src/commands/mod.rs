//! CLI command implementations

pub mod account;
pub mod check;
pub mod events;
pub mod keys;
pub mod payments;

use std::io::{BufRead, Write};
use std::path::PathBuf;

use anyhow::{Context, Result};
use dialoguer::Password;
use remit_core::{Claims, RemitContext};

/// File holding the token of the last `remit login --save`
pub const SESSION_FILE: &str = "session.jwt";

/// Get the remit directory from environment or default
pub fn get_remit_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("REMIT_DIR") {
        return Ok(PathBuf::from(dir));
    }
    dirs::home_dir()
        .map(|home| home.join(".remit"))
        .context("Could not find home directory; set REMIT_DIR")
}

/// Open the remit context for the data directory
pub fn get_context() -> Result<RemitContext> {
    let remit_dir = get_remit_dir()?;
    std::fs::create_dir_all(&remit_dir)
        .with_context(|| format!("Failed to create remit directory: {:?}", remit_dir))?;
    RemitContext::new(&remit_dir).context("Failed to initialize remit context")
}

/// Resolve the caller's session: `--token` / `REMIT_TOKEN`, else the saved session file
pub fn require_session(ctx: &RemitContext, token: Option<&str>) -> Result<Claims> {
    let token = match token {
        Some(t) => t.trim().to_string(),
        None => {
            let path = get_remit_dir()?.join(SESSION_FILE);
            std::fs::read_to_string(&path)
                .map(|t| t.trim().to_string())
                .map_err(|_| anyhow::anyhow!("Not logged in. Run `remit login --save` or pass --token"))?
        }
    };
    Ok(ctx.auth.verify_session(&token)?)
}

/// Persist a token for later commands, readable only by the owner
pub fn save_session(token: &str) -> Result<PathBuf> {
    let path = get_remit_dir()?.join(SESSION_FILE);
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options
        .open(&path)
        .with_context(|| format!("Failed to write {:?}", path))?;
    file.write_all(token.as_bytes())?;
    Ok(path)
}

/// Remove the saved session, if any
pub fn clear_session() -> Result<bool> {
    let path = get_remit_dir()?.join(SESSION_FILE);
    match std::fs::remove_file(&path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e.into()),
    }
}

/// Read a password from piped stdin, or prompt without echo
pub fn read_password(prompt: &str, confirm: bool) -> Result<String> {
    if atty::isnt(atty::Stream::Stdin) {
        let mut line = String::new();
        std::io::stdin().lock().read_line(&mut line)?;
        return Ok(line.trim_end_matches(&['\r', '\n'][..]).to_string());
    }
    let mut input = Password::new().with_prompt(prompt);
    if confirm {
        input = input.with_confirmation("Confirm password", "Passwords do not match");
    }
    Ok(input.interact()?)
}
