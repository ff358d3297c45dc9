//! Banking identifiers, amounts and the country/currency whitelists
//!
//! All checks expect already-sanitized input (see `validation::sanitize`).

use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use rust_decimal::Decimal;

/// Amounts must stay strictly below this
pub const MAX_AMOUNT: Decimal = Decimal::from_parts(1_000_000_000, 0, 0, false, 0);

static SWIFT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Z]{6}[A-Z0-9]{2}([A-Z0-9]{3})?$").expect("swift pattern compiles")
});

static IBAN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Z]{2}[0-9]{2}[A-Z0-9]{11,30}$").expect("iban pattern compiles")
});

static ACCOUNT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]{6,17}$").expect("account pattern compiles"));

static AMOUNT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[0-9]{1,10}(\.[0-9]{1,2})?$").expect("amount pattern compiles")
});

/// ISO 3166 alpha-2 codes accepted as beneficiary countries
pub const SUPPORTED_COUNTRIES: &[&str] = &[
    "AE", "AT", "AU", "BE", "BR", "BW", "CA", "CH", "CN", "DE", "DK", "ES", "FI", "FR", "GB",
    "HK", "IE", "IN", "IT", "JP", "KE", "LS", "LU", "MU", "MX", "MZ", "NA", "NG", "NL", "NO",
    "NZ", "PL", "PT", "SA", "SE", "SG", "SZ", "TR", "US", "ZA", "ZM", "ZW",
];

/// ISO 4217 codes accepted as payment currencies
pub const SUPPORTED_CURRENCIES: &[&str] = &[
    "AED", "AUD", "BRL", "BWP", "CAD", "CHF", "CNY", "DKK", "EUR", "GBP", "HKD", "INR", "JPY",
    "KES", "MUR", "MXN", "NAD", "NGN", "NOK", "NZD", "PLN", "SAR", "SEK", "SGD", "TRY", "USD",
    "ZAR",
];

/// Registered IBAN lengths
const IBAN_LENGTHS: &[(&str, usize)] = &[
    ("AD", 24), ("AE", 23), ("AT", 20), ("BE", 16), ("BG", 22), ("BH", 22), ("BR", 29),
    ("CH", 21), ("CY", 28), ("CZ", 24), ("DE", 22), ("DK", 18), ("EE", 20), ("ES", 24),
    ("FI", 18), ("FR", 27), ("GB", 22), ("GI", 23), ("GR", 27), ("HR", 21), ("HU", 28),
    ("IE", 22), ("IL", 23), ("IS", 26), ("IT", 27), ("KW", 30), ("LI", 21), ("LT", 20),
    ("LU", 20), ("LV", 21), ("MC", 27), ("MT", 31), ("MU", 30), ("NL", 18), ("NO", 15),
    ("PK", 24), ("PL", 28), ("PT", 25), ("QA", 29), ("RO", 24), ("SA", 24), ("SE", 24),
    ("SI", 19), ("SK", 24), ("SM", 27), ("TR", 26),
];

/// 8 or 11 character BIC, uppercase
pub fn is_valid_swift(value: &str) -> bool {
    SWIFT_RE.is_match(value)
}

/// Registered IBAN length for a country, when known
pub fn iban_length(country: &str) -> Option<usize> {
    IBAN_LENGTHS
        .iter()
        .find(|(code, _)| *code == country)
        .map(|(_, len)| *len)
}

/// Structure, country length and mod-97 checksum
pub fn is_valid_iban(value: &str) -> bool {
    if !IBAN_RE.is_match(value) {
        return false;
    }
    if let Some(expected) = iban_length(&value[..2]) {
        if value.len() != expected {
            return false;
        }
    }
    iban_mod97(value) == Some(1)
}

/// Remainder of the rearranged IBAN modulo 97.
///
/// First four characters move to the end, letters map to 10-35, and the
/// resulting digit string is folded one digit at a time so nothing
/// overflows.
fn iban_mod97(value: &str) -> Option<u32> {
    let (head, tail) = value.split_at(4);
    let mut remainder: u32 = 0;
    for c in tail.chars().chain(head.chars()) {
        let n = c.to_digit(36)?;
        if n >= 10 {
            remainder = (remainder * 10 + n / 10) % 97;
            remainder = (remainder * 10 + n % 10) % 97;
        } else {
            remainder = (remainder * 10 + n) % 97;
        }
    }
    Some(remainder)
}

/// 13-digit national ID number with a Luhn check digit.
///
/// Of the first twelve digits, those at odd 0-based indices (the 2nd, 4th,
/// ... 12th counting from the left) are doubled; the 13th is the check digit.
pub fn is_valid_id_number(value: &str) -> bool {
    if value.len() != 13 || !value.bytes().all(|b| b.is_ascii_digit()) {
        return false;
    }
    let digits: Vec<u32> = value.bytes().map(|b| u32::from(b - b'0')).collect();
    let sum: u32 = digits[..12]
        .iter()
        .enumerate()
        .map(|(i, &d)| {
            if i % 2 == 1 {
                let doubled = d * 2;
                if doubled > 9 {
                    doubled - 9
                } else {
                    doubled
                }
            } else {
                d
            }
        })
        .sum();
    (10 - sum % 10) % 10 == digits[12]
}

/// 6-17 digits
pub fn is_valid_account_number(value: &str) -> bool {
    ACCOUNT_RE.is_match(value)
}

/// Beneficiary account: an IBAN or a plain account number
pub fn is_valid_beneficiary_account(value: &str) -> bool {
    let starts_with_letters = value.bytes().take(2).all(|b| b.is_ascii_uppercase());
    if value.len() >= 2 && starts_with_letters {
        is_valid_iban(value)
    } else {
        is_valid_account_number(value)
    }
}

pub fn is_supported_country(value: &str) -> bool {
    SUPPORTED_COUNTRIES.contains(&value)
}

pub fn is_supported_currency(value: &str) -> bool {
    SUPPORTED_CURRENCIES.contains(&value)
}

/// Parse a payment amount: plain decimal notation, at most two decimal
/// places, greater than zero and below [`MAX_AMOUNT`].
pub fn parse_amount(value: &str) -> Option<Decimal> {
    let value = value.trim();
    if !AMOUNT_RE.is_match(value) {
        return None;
    }
    let amount = Decimal::from_str(value).ok()?;
    is_valid_amount(amount).then_some(amount)
}

/// Range and precision check for an already-parsed amount
pub fn is_valid_amount(amount: Decimal) -> bool {
    amount > Decimal::ZERO && amount < MAX_AMOUNT && amount.normalize().scale() <= 2
}
