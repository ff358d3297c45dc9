//! Already-parsed request bodies accepted by the auth and payment services
//!
//! Every request is sanitized first, then validated. Services only ever see
//! the sanitized form.

use rust_decimal::Decimal;
use serde::Deserialize;

use crate::validation::banking::{
    is_supported_country, is_supported_currency, is_valid_account_number,
    is_valid_beneficiary_account, is_valid_id_number, is_valid_swift, parse_amount,
};
use crate::validation::format::{is_valid_email, is_valid_full_name, is_valid_username};
use crate::validation::password::MAX_PASSWORD_BYTES;
use crate::validation::sanitize::{
    sanitize_account_number, sanitize_beneficiary_account, sanitize_code, sanitize_email,
    sanitize_name, sanitize_swift, sanitize_text, sanitize_username,
};
use crate::validation::{ensure, require, PasswordPolicy, Validate, ValidationError};

/// Longest free-text payment reference, after escaping
pub const MAX_REFERENCE_LEN: usize = 140;

fn sanitize_opt(value: &Option<String>, f: fn(&str) -> String) -> Option<String> {
    value.as_deref().map(f).filter(|v| !v.is_empty())
}

fn check_password_bytes(password: &str, field: &str) -> Result<(), ValidationError> {
    require(Some(password), field)?;
    ensure(
        password.len() <= MAX_PASSWORD_BYTES,
        field,
        "must be at most 72 bytes",
    )
}

fn check_optional_pii(
    full_name: Option<&str>,
    id_number: Option<&str>,
    account_number: Option<&str>,
) -> Result<(), ValidationError> {
    if let Some(name) = full_name {
        ensure(is_valid_full_name(name), "fullName", "must be 2-100 letters")?;
    }
    if let Some(id) = id_number {
        ensure(is_valid_id_number(id), "idNumber", "must be a valid 13-digit ID number")?;
    }
    if let Some(account) = account_number {
        ensure(
            is_valid_account_number(account),
            "accountNumber",
            "must be 6-17 digits",
        )?;
    }
    Ok(())
}

#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub id_number: Option<String>,
    #[serde(default)]
    pub account_number: Option<String>,
}

impl RegisterRequest {
    /// Normalized copy; the password is never altered
    pub fn sanitized(&self) -> Self {
        Self {
            username: sanitize_username(&self.username),
            email: sanitize_email(&self.email),
            password: self.password.clone(),
            full_name: sanitize_opt(&self.full_name, sanitize_name),
            id_number: sanitize_opt(&self.id_number, sanitize_account_number),
            account_number: sanitize_opt(&self.account_number, sanitize_account_number),
        }
    }
}

impl Validate for RegisterRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        ensure(
            is_valid_username(&self.username),
            "username",
            "must be 3-30 characters of a-z, 0-9, '_' or '.', starting with a letter",
        )?;
        ensure(is_valid_email(&self.email), "email", "must be a valid email address")?;
        PasswordPolicy::default()
            .check_with_context(&self.password, Some(&self.username), Some(&self.email))
            .map_err(|issue| ValidationError::new("password", issue.to_string()))?;
        check_optional_pii(
            self.full_name.as_deref(),
            self.id_number.as_deref(),
            self.account_number.as_deref(),
        )
    }
}

#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    /// Username or email address
    pub login: String,
    pub password: String,
    /// Optional second factor: must match the account number on file
    #[serde(default)]
    pub account_number: Option<String>,
}

impl LoginRequest {
    pub fn sanitized(&self) -> Self {
        Self {
            login: self.login.trim().to_lowercase(),
            password: self.password.clone(),
            account_number: sanitize_opt(&self.account_number, sanitize_account_number),
        }
    }
}

impl Validate for LoginRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        require(Some(&self.login), "login")?;
        ensure(self.login.len() <= 254, "login", "is too long")?;
        check_password_bytes(&self.password, "password")?;
        if let Some(account) = self.account_number.as_deref() {
            ensure(
                is_valid_account_number(account),
                "accountNumber",
                "must be 6-17 digits",
            )?;
        }
        Ok(())
    }
}

/// Replace PII fields. `None` leaves a field unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub id_number: Option<String>,
    #[serde(default)]
    pub account_number: Option<String>,
}

impl UpdateProfileRequest {
    pub fn sanitized(&self) -> Self {
        Self {
            full_name: sanitize_opt(&self.full_name, sanitize_name),
            id_number: sanitize_opt(&self.id_number, sanitize_account_number),
            account_number: sanitize_opt(&self.account_number, sanitize_account_number),
        }
    }
}

impl Validate for UpdateProfileRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        check_optional_pii(
            self.full_name.as_deref(),
            self.id_number.as_deref(),
            self.account_number.as_deref(),
        )
    }
}

#[derive(Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

impl Validate for ChangePasswordRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        check_password_bytes(&self.current_password, "currentPassword")?;
        ensure(
            self.new_password != self.current_password,
            "newPassword",
            "must differ from the current password",
        )?;
        // Username/email context is applied by the service, which knows the user
        PasswordPolicy::default()
            .check(&self.new_password)
            .map_err(|issue| ValidationError::new("newPassword", issue.to_string()))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatePaymentRequest {
    /// Decimal string as submitted, e.g. `"1250.50"`
    pub amount: String,
    pub currency: String,
    pub beneficiary_name: String,
    pub beneficiary_account: String,
    pub swift_code: String,
    pub beneficiary_country: String,
    #[serde(default)]
    pub reference: Option<String>,
}

impl CreatePaymentRequest {
    pub fn sanitized(&self) -> Self {
        Self {
            amount: self.amount.trim().to_string(),
            currency: sanitize_code(&self.currency),
            beneficiary_name: sanitize_name(&self.beneficiary_name),
            beneficiary_account: sanitize_beneficiary_account(&self.beneficiary_account),
            swift_code: sanitize_swift(&self.swift_code),
            beneficiary_country: sanitize_code(&self.beneficiary_country),
            reference: sanitize_opt(&self.reference, sanitize_text),
        }
    }

    /// Parsed amount, when valid
    pub fn parsed_amount(&self) -> Option<Decimal> {
        parse_amount(&self.amount)
    }
}

impl Validate for CreatePaymentRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        ensure(
            self.parsed_amount().is_some(),
            "amount",
            "must be a positive amount below 1,000,000,000 with at most 2 decimal places",
        )?;
        ensure(
            is_supported_currency(&self.currency),
            "currency",
            "is not a supported currency",
        )?;
        validate_beneficiary(
            &self.beneficiary_name,
            &self.beneficiary_account,
            &self.swift_code,
        )?;
        ensure(
            is_supported_country(&self.beneficiary_country),
            "beneficiaryCountry",
            "is not a supported country",
        )?;
        if let Some(reference) = self.reference.as_deref() {
            ensure(
                reference.chars().count() <= MAX_REFERENCE_LEN,
                "reference",
                "is too long",
            )?;
        }
        Ok(())
    }
}

/// New beneficiary details for a payment that is still pending
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBeneficiaryRequest {
    pub beneficiary_name: String,
    pub beneficiary_account: String,
    pub swift_code: String,
}

impl UpdateBeneficiaryRequest {
    pub fn sanitized(&self) -> Self {
        Self {
            beneficiary_name: sanitize_name(&self.beneficiary_name),
            beneficiary_account: sanitize_beneficiary_account(&self.beneficiary_account),
            swift_code: sanitize_swift(&self.swift_code),
        }
    }
}

impl Validate for UpdateBeneficiaryRequest {
    fn validate(&self) -> Result<(), ValidationError> {
        validate_beneficiary(
            &self.beneficiary_name,
            &self.beneficiary_account,
            &self.swift_code,
        )
    }
}

fn validate_beneficiary(name: &str, account: &str, swift: &str) -> Result<(), ValidationError> {
    ensure(
        is_valid_full_name(name),
        "beneficiaryName",
        "must be 2-100 letters",
    )?;
    ensure(
        is_valid_beneficiary_account(account),
        "beneficiaryAccount",
        "must be a valid IBAN or a 6-17 digit account number",
    )?;
    ensure(
        is_valid_swift(swift),
        "swiftCode",
        "must be an 8 or 11 character SWIFT/BIC code",
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn register() -> RegisterRequest {
        RegisterRequest {
            username: "  Thandi ".to_string(),
            email: " Thandi@Example.com".to_string(),
            password: "Str0ng!Passw0rd#".to_string(),
            full_name: Some("  Thandi   Nkosi ".to_string()),
            id_number: Some("800101 5009 087".to_string()),
            account_number: Some("6200-1234-567".to_string()),
        }
    }

    fn payment() -> CreatePaymentRequest {
        CreatePaymentRequest {
            amount: "1250.50".to_string(),
            currency: "usd".to_string(),
            beneficiary_name: "John Smith".to_string(),
            beneficiary_account: "gb82 west 1234 5698 7654 32".to_string(),
            swift_code: "nwbk-gb-2l".to_string(),
            beneficiary_country: "gb".to_string(),
            reference: Some("Invoice <42>".to_string()),
        }
    }

    #[test]
    fn test_register_sanitize_then_validate() {
        let req = register().sanitized();
        assert_eq!(req.username, "thandi");
        assert_eq!(req.email, "thandi@example.com");
        assert_eq!(req.full_name.as_deref(), Some("Thandi Nkosi"));
        assert_eq!(req.id_number.as_deref(), Some("8001015009087"));
        assert_eq!(req.account_number.as_deref(), Some("62001234567"));
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_register_reports_first_bad_field() {
        let mut req = register().sanitized();
        req.id_number = Some("8001015009088".to_string());
        assert_eq!(req.validate().unwrap_err().field, "idNumber");

        let mut req = register().sanitized();
        req.password = "weak".to_string();
        assert_eq!(req.validate().unwrap_err().field, "password");

        let mut req = register().sanitized();
        req.email = "not-an-email".to_string();
        assert_eq!(req.validate().unwrap_err().field, "email");
    }

    #[test]
    fn test_register_from_json() {
        let req: RegisterRequest = serde_json::from_str(
            r#"{"username":"sipho","email":"sipho@example.com","password":"Str0ng!Passw0rd#","fullName":"Sipho Dlamini"}"#,
        )
        .unwrap();
        assert!(req.sanitized().validate().is_ok());
        assert!(req.id_number.is_none());
    }

    #[test]
    fn test_login_validation() {
        let req = LoginRequest {
            login: " Thandi ".to_string(),
            password: "x".to_string(),
            account_number: None,
        }
        .sanitized();
        assert_eq!(req.login, "thandi");
        assert!(req.validate().is_ok());

        let long = LoginRequest {
            login: "thandi".to_string(),
            password: "a".repeat(73),
            account_number: None,
        };
        assert_eq!(long.validate().unwrap_err().field, "password");
    }

    #[test]
    fn test_payment_sanitize_then_validate() {
        let req = payment().sanitized();
        assert_eq!(req.currency, "USD");
        assert_eq!(req.beneficiary_account, "GB82WEST12345698765432");
        assert_eq!(req.swift_code, "NWBKGB2L");
        assert_eq!(req.beneficiary_country, "GB");
        assert_eq!(req.reference.as_deref(), Some("Invoice &lt;42&gt;"));
        assert_eq!(req.parsed_amount(), Some(Decimal::new(125050, 2)));
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_payment_rejections() {
        let mut req = payment().sanitized();
        req.amount = "-1".to_string();
        assert_eq!(req.validate().unwrap_err().field, "amount");

        let mut req = payment().sanitized();
        req.currency = "XYZ".to_string();
        assert_eq!(req.validate().unwrap_err().field, "currency");

        let mut req = payment().sanitized();
        req.swift_code = "NWBK".to_string();
        assert_eq!(req.validate().unwrap_err().field, "swiftCode");

        let mut req = payment().sanitized();
        req.beneficiary_account = "GB82WEST12345698765433".to_string();
        assert_eq!(req.validate().unwrap_err().field, "beneficiaryAccount");

        let mut req = payment().sanitized();
        req.beneficiary_country = "XX".to_string();
        assert_eq!(req.validate().unwrap_err().field, "beneficiaryCountry");
    }

    #[test]
    fn test_change_password_rules() {
        let same = ChangePasswordRequest {
            current_password: "Str0ng!Passw0rd#".to_string(),
            new_password: "Str0ng!Passw0rd#".to_string(),
        };
        assert_eq!(same.validate().unwrap_err().field, "newPassword");

        let ok = ChangePasswordRequest {
            current_password: "Str0ng!Passw0rd#".to_string(),
            new_password: "Kx9!mQ2#vL7@pZ".to_string(),
        };
        assert!(ok.validate().is_ok());
    }
}
