//! Payment commands

use anyhow::{bail, Context, Result};
use colored::Colorize;
use comfy_table::Cell;
use remit_core::services::{CreatePaymentRequest, StatusChange, UpdateBeneficiaryRequest};
use remit_core::{Payment, PaymentStatus};
use uuid::Uuid;

use super::{get_context, require_session};
use crate::output;

pub struct PayArgs {
    pub amount: String,
    pub currency: String,
    pub beneficiary_name: String,
    pub beneficiary_account: String,
    pub swift_code: String,
    pub beneficiary_country: String,
    pub reference: Option<String>,
    pub json: bool,
}

pub async fn pay(token: Option<&str>, args: PayArgs) -> Result<()> {
    let ctx = get_context()?;
    let claims = require_session(&ctx, token)?;
    let req = CreatePaymentRequest {
        amount: args.amount,
        currency: args.currency,
        beneficiary_name: args.beneficiary_name,
        beneficiary_account: args.beneficiary_account,
        swift_code: args.swift_code,
        beneficiary_country: args.beneficiary_country,
        reference: args.reference,
    };
    let payment = ctx.payments.submit(&claims, &req).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&payment)?);
    } else {
        output::success(&format!(
            "Submitted {} {} payment {}",
            payment.amount, payment.currency, payment.id
        ));
    }
    Ok(())
}

pub async fn list(
    token: Option<&str>,
    all: bool,
    status: Option<String>,
    json: bool,
) -> Result<()> {
    let ctx = get_context()?;
    let claims = require_session(&ctx, token)?;
    let status = status.as_deref().map(parse_status).transpose()?;

    let mut payments = if all {
        ctx.payments.list_all(&claims, status).await?
    } else {
        ctx.payments.list_for_user(&claims).await?
    };
    if !all {
        if let Some(status) = status {
            payments.retain(|p| p.status == status);
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&payments)?);
        return Ok(());
    }
    if payments.is_empty() {
        output::info("No payments found");
        return Ok(());
    }

    let mut table = output::create_table();
    table.set_header(vec![
        "Id", "Created", "Amount", "Beneficiary", "Country", "Status",
    ]);
    for payment in &payments {
        table.add_row(vec![
            Cell::new(short_id(payment.id)),
            Cell::new(output::format_time(payment.created_at)),
            Cell::new(format!("{} {}", payment.amount, payment.currency)),
            Cell::new(payment.beneficiary_name.as_deref().unwrap_or("<unreadable>")),
            Cell::new(&payment.beneficiary_country),
            output::status_cell(payment.status),
        ]);
    }
    println!("{table}");
    println!("{} payment(s)", payments.len());
    Ok(())
}

pub async fn show(token: Option<&str>, id: &str, json: bool) -> Result<()> {
    let ctx = get_context()?;
    let claims = require_session(&ctx, token)?;
    let payment = ctx.payments.get(&claims, parse_id(id)?).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&payment)?);
    } else {
        print_payment(&payment);
    }
    Ok(())
}

pub async fn set_status(
    token: Option<&str>,
    id: &str,
    status: &str,
    force: bool,
    json: bool,
) -> Result<()> {
    let ctx = get_context()?;
    let claims = require_session(&ctx, token)?;
    let target = parse_status(status)?;
    let change = if force {
        StatusChange::forced(target)
    } else {
        StatusChange::to(target)
    };
    let payment = ctx.payments.update_status(&claims, parse_id(id)?, change).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&payment)?);
    } else {
        output::success(&format!("Payment {} is now {}", payment.id, payment.status));
    }
    Ok(())
}

pub async fn cancel(token: Option<&str>, id: &str) -> Result<()> {
    let ctx = get_context()?;
    let claims = require_session(&ctx, token)?;
    let payment = ctx.payments.cancel(&claims, parse_id(id)?).await?;
    output::success(&format!("Payment {} cancelled", payment.id));
    Ok(())
}

pub async fn update_beneficiary(
    token: Option<&str>,
    id: &str,
    req: UpdateBeneficiaryRequest,
) -> Result<()> {
    let ctx = get_context()?;
    let claims = require_session(&ctx, token)?;
    let payment = ctx
        .payments
        .update_beneficiary(&claims, parse_id(id)?, &req)
        .await?;
    output::success(&format!("Beneficiary updated on payment {}", payment.id));
    Ok(())
}

pub async fn delete(token: Option<&str>, id: &str, force: bool) -> Result<()> {
    let ctx = get_context()?;
    let claims = require_session(&ctx, token)?;
    let id = parse_id(id)?;

    if !force {
        use dialoguer::Confirm;
        if !Confirm::new()
            .with_prompt(format!("Delete payment {}?", id))
            .default(false)
            .interact()?
        {
            println!("Cancelled.");
            return Ok(());
        }
    }

    ctx.payments.delete(&claims, id).await?;
    output::success(&format!("Payment {} deleted", id));
    Ok(())
}

fn parse_id(id: &str) -> Result<Uuid> {
    Uuid::parse_str(id.trim()).with_context(|| format!("Invalid payment id: {}", id))
}

fn parse_status(value: &str) -> Result<PaymentStatus> {
    match PaymentStatus::parse(value) {
        Some(status) => Ok(status),
        None => {
            let known: Vec<&str> = PaymentStatus::ALL.iter().map(|s| s.as_str()).collect();
            bail!("Unknown status '{}'. Expected one of: {}", value, known.join(", "))
        }
    }
}

fn short_id(id: Uuid) -> String {
    id.to_string().chars().take(8).collect()
}

fn print_payment(payment: &Payment) {
    println!("{}", format!("Payment {}", payment.id).bold());
    println!("  Status:      {}", payment.status);
    println!("  Amount:      {} {}", payment.amount, payment.currency);
    println!("  Provider:    {}", payment.provider);
    println!(
        "  Beneficiary: {}",
        payment.beneficiary_name.as_deref().unwrap_or("<unreadable>")
    );
    println!(
        "  Account:     {}",
        payment.beneficiary_account.as_deref().unwrap_or("<unreadable>")
    );
    println!(
        "  SWIFT:       {}",
        payment.swift_code.as_deref().unwrap_or("<unreadable>")
    );
    println!("  Country:     {}", payment.beneficiary_country);
    if let Some(reference) = &payment.reference {
        println!("  Reference:   {}", reference);
    }
    println!("  Created:     {}", output::format_time(payment.created_at));
    println!("  Updated:     {}", output::format_time(payment.updated_at));
}
