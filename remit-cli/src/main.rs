//! Remit CLI - operator console for the payments portal

use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::{account, check, events, keys, payments};
use remit_core::services::{UpdateBeneficiaryRequest, UpdateProfileRequest};

/// Remit - international payments portal
#[derive(Parser)]
#[command(name = "remit", version, about, long_about = None)]
struct Cli {
    /// Session token (defaults to the saved session)
    #[arg(long, global = true, env = "REMIT_TOKEN", hide_env_values = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create an account (password is prompted or read from stdin)
    Register {
        username: String,
        email: String,
        #[arg(long)]
        full_name: Option<String>,
        /// National identity number
        #[arg(long)]
        id_number: Option<String>,
        /// Account number used as second login factor
        #[arg(long)]
        account_number: Option<String>,
        /// Create an administrator
        #[arg(long)]
        admin: bool,
        #[arg(long)]
        json: bool,
    },

    /// Log in with username or email
    Login {
        login: String,
        #[arg(long)]
        account_number: Option<String>,
        /// Keep the token for later commands
        #[arg(long)]
        save: bool,
        #[arg(long)]
        json: bool,
    },

    /// Drop the saved session
    Logout,

    /// Show the current account
    Whoami {
        #[arg(long)]
        json: bool,
    },

    /// Update profile fields
    Profile {
        #[arg(long)]
        full_name: Option<String>,
        #[arg(long)]
        id_number: Option<String>,
        #[arg(long)]
        account_number: Option<String>,
        #[arg(long)]
        json: bool,
    },

    /// Change the account password
    ChangePassword,

    /// Delete the current account
    DeleteAccount {
        /// Skip confirmation prompt
        #[arg(long, short)]
        force: bool,
    },

    /// Clear a lockout (admin)
    Unlock {
        /// Username or email
        login: String,
        #[arg(long)]
        json: bool,
    },

    /// Submit a payment
    Pay {
        amount: String,
        currency: String,
        #[arg(long)]
        beneficiary_name: String,
        /// IBAN or account number
        #[arg(long)]
        beneficiary_account: String,
        #[arg(long)]
        swift: String,
        /// ISO 3166 alpha-2 country code
        #[arg(long)]
        country: String,
        #[arg(long)]
        reference: Option<String>,
        #[arg(long)]
        json: bool,
    },

    /// List payments
    Payments {
        /// Every customer's payments (admin)
        #[arg(long)]
        all: bool,
        #[arg(long)]
        status: Option<String>,
        #[arg(long)]
        json: bool,
    },

    /// Show one payment
    Payment {
        id: String,
        #[arg(long)]
        json: bool,
    },

    /// Move a payment to a new status (admin)
    PaymentStatus {
        id: String,
        status: String,
        /// Allow a change outside the normal lifecycle
        #[arg(long)]
        force: bool,
        #[arg(long)]
        json: bool,
    },

    /// Cancel a pending payment
    Cancel { id: String },

    /// Replace beneficiary details of a pending payment
    Beneficiary {
        id: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        account: String,
        #[arg(long)]
        swift: String,
    },

    /// Delete a payment
    DeletePayment {
        id: String,
        #[arg(long, short)]
        force: bool,
    },

    /// Read the security event log (admin)
    Events {
        /// Username, email or user id
        #[arg(long)]
        user: Option<String>,
        /// Event name, e.g. login_failed
        #[arg(long)]
        event: Option<String>,
        #[arg(long, default_value_t = 50)]
        limit: usize,
        #[arg(long)]
        json: bool,
    },

    /// Validate a single value
    Check {
        #[arg(value_enum)]
        kind: check::CheckKind,
        value: String,
    },

    /// Generate JWT and encryption secrets
    Keygen,

    /// Re-encrypt stored fields under the active key (admin)
    RotateKeys {
        #[arg(long)]
        json: bool,
    },
}

fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            output::error(&format!("Failed to start runtime: {}", e));
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            output::error(&describe(&e));
            ExitCode::FAILURE
        }
    }
}

/// Diagnostics go to stderr; `RUST_LOG` overrides the default level
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

/// Core errors are shown with their public message; internals only outside production
fn describe(err: &anyhow::Error) -> String {
    let expose = std::env::var("NODE_ENV").map_or(true, |env| env != "production");
    match err.downcast_ref::<remit_core::Error>() {
        Some(core) => format!("Error ({}): {}", core.status_code(), core.public_message(expose)),
        None => format!("Error: {:#}", err),
    }
}

async fn run(cli: Cli) -> Result<()> {
    let token = cli.token.as_deref();
    match cli.command {
        Commands::Register {
            username,
            email,
            full_name,
            id_number,
            account_number,
            admin,
            json,
        } => {
            account::register(account::RegisterArgs {
                username,
                email,
                full_name,
                id_number,
                account_number,
                admin,
                json,
            })
            .await
        }
        Commands::Login {
            login,
            account_number,
            save,
            json,
        } => account::login(login, account_number, save, json).await,
        Commands::Logout => account::logout(),
        Commands::Whoami { json } => account::whoami(token, json).await,
        Commands::Profile {
            full_name,
            id_number,
            account_number,
            json,
        } => {
            let req = UpdateProfileRequest {
                full_name,
                id_number,
                account_number,
            };
            account::update_profile(token, req, json).await
        }
        Commands::ChangePassword => account::change_password(token).await,
        Commands::DeleteAccount { force } => account::delete_account(token, force).await,
        Commands::Unlock { login, json } => account::unlock(token, &login, json).await,
        Commands::Pay {
            amount,
            currency,
            beneficiary_name,
            beneficiary_account,
            swift,
            country,
            reference,
            json,
        } => {
            payments::pay(
                token,
                payments::PayArgs {
                    amount,
                    currency,
                    beneficiary_name,
                    beneficiary_account,
                    swift_code: swift,
                    beneficiary_country: country,
                    reference,
                    json,
                },
            )
            .await
        }
        Commands::Payments { all, status, json } => payments::list(token, all, status, json).await,
        Commands::Payment { id, json } => payments::show(token, &id, json).await,
        Commands::PaymentStatus {
            id,
            status,
            force,
            json,
        } => payments::set_status(token, &id, &status, force, json).await,
        Commands::Cancel { id } => payments::cancel(token, &id).await,
        Commands::Beneficiary {
            id,
            name,
            account,
            swift,
        } => {
            let req = UpdateBeneficiaryRequest {
                beneficiary_name: name,
                beneficiary_account: account,
                swift_code: swift,
            };
            payments::update_beneficiary(token, &id, req).await
        }
        Commands::DeletePayment { id, force } => payments::delete(token, &id, force).await,
        Commands::Events {
            user,
            event,
            limit,
            json,
        } => events::run(token, user.as_deref(), event.as_deref(), limit, json).await,
        Commands::Check { kind, value } => check::run(kind, &value),
        Commands::Keygen => keys::keygen(),
        Commands::RotateKeys { json } => keys::rotate(token, json).await,
    }
}
