//! `remit check` - run a single field validator without touching the database

use anyhow::{bail, Result};
use clap::ValueEnum;
use remit_core::validation::{banking, format, sanitize, PasswordPolicy};

use crate::output;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum CheckKind {
    Email,
    Username,
    FullName,
    Phone,
    Url,
    Date,
    Password,
    Swift,
    Iban,
    IdNumber,
    AccountNumber,
    Beneficiary,
    Country,
    Currency,
    Amount,
}

impl CheckKind {
    fn passes(&self, value: &str) -> std::result::Result<(), String> {
        let ok = match self {
            CheckKind::Email => format::is_valid_email(&sanitize::sanitize_email(value)),
            CheckKind::Username => format::is_valid_username(value),
            CheckKind::FullName => format::is_valid_full_name(value),
            CheckKind::Phone => format::is_valid_phone(value),
            CheckKind::Url => format::is_valid_url(value),
            CheckKind::Date => format::is_valid_date(value),
            CheckKind::Password => {
                return PasswordPolicy::default()
                    .check(value)
                    .map_err(|issue| issue.to_string())
            }
            CheckKind::Swift => {
                banking::is_valid_swift(&sanitize::sanitize_swift(value))
            }
            CheckKind::Iban => banking::is_valid_iban(&sanitize::sanitize_iban(value)),
            CheckKind::IdNumber => banking::is_valid_id_number(value),
            CheckKind::AccountNumber => banking::is_valid_account_number(
                &sanitize::sanitize_account_number(value),
            ),
            CheckKind::Beneficiary => banking::is_valid_beneficiary_account(
                &sanitize::sanitize_beneficiary_account(value),
            ),
            CheckKind::Country => {
                banking::is_supported_country(&sanitize::sanitize_code(value))
            }
            CheckKind::Currency => {
                banking::is_supported_currency(&sanitize::sanitize_code(value))
            }
            CheckKind::Amount => banking::parse_amount(value).is_some_and(banking::is_valid_amount),
        };
        if ok {
            Ok(())
        } else {
            let name = self
                .to_possible_value()
                .map(|v| v.get_name().to_string())
                .unwrap_or_default();
            Err(format!("not a valid {}", name))
        }
    }
}

pub fn run(kind: CheckKind, value: &str) -> Result<()> {
    match kind.passes(value) {
        Ok(()) => {
            output::success("valid");
            Ok(())
        }
        Err(reason) => bail!("invalid: {}", reason),
    }
}
