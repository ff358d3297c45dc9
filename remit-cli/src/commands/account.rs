//! Account commands - register, login, session and lockout administration

use anyhow::{Context, Result};
use colored::Colorize;
use remit_core::services::{
    ChangePasswordRequest, LoginRequest, RegisterRequest, UpdateProfileRequest,
};
use remit_core::{Role, UserProfile};

use super::{clear_session, get_context, read_password, require_session, save_session};
use crate::output;

pub struct RegisterArgs {
    pub username: String,
    pub email: String,
    pub full_name: Option<String>,
    pub id_number: Option<String>,
    pub account_number: Option<String>,
    pub admin: bool,
    pub json: bool,
}

pub async fn register(args: RegisterArgs) -> Result<()> {
    let ctx = get_context()?;
    let password = read_password("Password", true)?;
    let req = RegisterRequest {
        username: args.username,
        email: args.email,
        password,
        full_name: args.full_name,
        id_number: args.id_number,
        account_number: args.account_number,
    };
    let role = if args.admin { Role::Admin } else { Role::Customer };
    let profile = ctx.auth.register_as(&req, role).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&profile)?);
    } else {
        output::success(&format!("Registered {} ({})", profile.username, profile.role.as_str()));
    }
    Ok(())
}

pub async fn login(login: String, account_number: Option<String>, save: bool, json: bool) -> Result<()> {
    let ctx = get_context()?;
    let password = read_password("Password", false)?;
    let session = ctx
        .auth
        .login(&LoginRequest {
            login,
            password,
            account_number,
        })
        .await?;

    let saved = if save { Some(save_session(&session.token)?) } else { None };

    if json {
        println!("{}", serde_json::to_string_pretty(&session)?);
        return Ok(());
    }
    output::success(&format!("Logged in as {}", session.user.username));
    if let Some(expires) = session.expires_at {
        println!("  Expires: {}", expires.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    match saved {
        Some(path) => println!("  Session saved to {}", path.display()),
        None => println!("{}", session.token),
    }
    Ok(())
}

pub async fn whoami(token: Option<&str>, json: bool) -> Result<()> {
    let ctx = get_context()?;
    let claims = require_session(&ctx, token)?;
    let profile = ctx.auth.current_user(&claims).await?;
    let lockout = ctx.auth.lockout_status(&claims, profile.id).await?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&serde_json::json!({
                "user": profile,
                "lockout": lockout,
                "expiresAt": claims.expires_at(),
            }))?
        );
        return Ok(());
    }

    print_profile(&profile);
    println!("  Attempts left: {}", lockout.attempts_remaining);
    if let Some(expires) = claims.expires_at() {
        println!("  Session ends:  {}", expires.format("%Y-%m-%d %H:%M:%S UTC"));
    }
    Ok(())
}

pub fn logout() -> Result<()> {
    let removed = clear_session()?;
    let ctx = get_context()?;
    let cookie = ctx.auth.logout();
    if removed {
        output::success("Logged out");
    } else {
        output::info("No saved session");
    }
    tracing::debug!(cookie = %cookie, "session cookie cleared");
    Ok(())
}

pub async fn delete_account(token: Option<&str>, force: bool) -> Result<()> {
    let ctx = get_context()?;
    let claims = require_session(&ctx, token)?;

    if !force {
        use dialoguer::Confirm;
        if !Confirm::new()
            .with_prompt(format!("Delete account {}? This cannot be undone", claims.username))
            .default(false)
            .interact()?
        {
            println!("Cancelled.");
            return Ok(());
        }
    }

    let id = claims.user_id().context("Session token has no valid subject")?;
    ctx.auth.delete_user(&claims, id).await?;
    clear_session()?;
    output::success("Account deleted");
    Ok(())
}

pub async fn unlock(token: Option<&str>, login: &str, json: bool) -> Result<()> {
    let ctx = get_context()?;
    let claims = require_session(&ctx, token)?;
    let user = ctx.auth.find_user(&claims, login).await?;
    ctx.auth.unlock(&claims, user.id).await?;

    if json {
        println!("{}", serde_json::json!({"unlocked": user.id}));
    } else {
        output::success(&format!("Unlocked {}", user.username));
    }
    Ok(())
}

pub async fn update_profile(
    token: Option<&str>,
    req: UpdateProfileRequest,
    json: bool,
) -> Result<()> {
    let ctx = get_context()?;
    let claims = require_session(&ctx, token)?;
    let profile = ctx.auth.update_profile(&claims, &req).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&profile)?);
    } else {
        output::success("Profile updated");
        print_profile(&profile);
    }
    Ok(())
}

pub async fn change_password(token: Option<&str>) -> Result<()> {
    let ctx = get_context()?;
    let claims = require_session(&ctx, token)?;
    let current_password = read_password("Current password", false)?;
    let new_password = read_password("New password", true)?;
    ctx.auth
        .change_password(
            &claims,
            &ChangePasswordRequest {
                current_password,
                new_password,
            },
        )
        .await?;
    output::success("Password changed");
    Ok(())
}

fn print_profile(profile: &UserProfile) {
    println!("{}", profile.username.bold());
    println!("  Id:            {}", profile.id);
    println!("  Email:         {}", profile.email);
    println!("  Role:          {}", profile.role.as_str());
    println!(
        "  Name:          {}",
        profile.full_name.as_deref().unwrap_or("-")
    );
    println!(
        "  Account:       {}",
        profile.account_number.as_deref().unwrap_or("-")
    );
    if let Some(last) = profile.last_login_at {
        println!("  Last login:    {}", last.format("%Y-%m-%d %H:%M:%S UTC"));
    }
}
