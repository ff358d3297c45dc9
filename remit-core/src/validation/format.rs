//! General-purpose format checks

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use url::Url;

const MAX_EMAIL_LEN: usize = 254;
const MAX_EMAIL_LOCAL_LEN: usize = 64;

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9](?:[A-Za-z0-9\-]*[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9\-]*[A-Za-z0-9])?)*\.[A-Za-z]{2,}$",
    )
    .expect("email pattern compiles")
});

static USERNAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9_.]{2,29}$").expect("username pattern compiles"));

static FULL_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[\p{L} '.\-]+$").expect("name pattern compiles"));

static PHONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+?[0-9]{7,15}$").expect("phone pattern compiles"));

static DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]{4}-[0-9]{2}-[0-9]{2}$").expect("date pattern compiles"));

/// RFC-ish email address check
pub fn is_valid_email(value: &str) -> bool {
    if value.len() > MAX_EMAIL_LEN || value.contains("..") {
        return false;
    }
    match value.split_once('@') {
        Some((local, _)) if local.len() <= MAX_EMAIL_LOCAL_LEN => {
            !local.starts_with('.') && !local.ends_with('.') && EMAIL_RE.is_match(value)
        }
        _ => false,
    }
}

/// 3-30 characters of `[a-z0-9_.]`, starting with a letter
pub fn is_valid_username(value: &str) -> bool {
    USERNAME_RE.is_match(value)
}

/// Letters (any script), spaces, apostrophes, hyphens and dots; 2-100 characters
pub fn is_valid_full_name(value: &str) -> bool {
    let len = value.chars().count();
    (2..=100).contains(&len)
        && FULL_NAME_RE.is_match(value)
        && value.chars().any(|c| c.is_alphabetic())
}

/// E.164-ish: optional `+`, then 7-15 digits. Spaces, dashes and
/// parentheses are ignored.
pub fn is_valid_phone(value: &str) -> bool {
    let compact: String = value
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '(' | ')'))
        .collect();
    PHONE_RE.is_match(&compact)
}

/// Absolute http or https URL with a host
pub fn is_valid_url(value: &str) -> bool {
    match Url::parse(value) {
        Ok(url) => matches!(url.scheme(), "http" | "https") && url.host_str().is_some(),
        Err(_) => false,
    }
}

/// Parse a strict `YYYY-MM-DD` calendar date
pub fn parse_date(value: &str) -> Option<NaiveDate> {
    if !DATE_RE.is_match(value) {
        return None;
    }
    NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()
}

pub fn is_valid_date(value: &str) -> bool {
    parse_date(value).is_some()
}

/// A real date no later than `today`
pub fn is_valid_birth_date(value: &str, today: NaiveDate) -> bool {
    parse_date(value).map_or(false, |d| d <= today)
}
