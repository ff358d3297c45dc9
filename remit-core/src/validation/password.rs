//! Password strength policy

use std::fmt;

/// Upper bound on password bytes so nothing past the bcrypt input limit is silently ignored
pub const MAX_PASSWORD_BYTES: usize = 72;

/// Password composition rules applied at registration and password change
#[derive(Debug, Clone)]
pub struct PasswordPolicy {
    /// Minimum length in characters
    pub min_length: usize,
    /// Maximum length in bytes
    pub max_bytes: usize,
    pub require_character_classes: bool,
    /// Reject runs like `aaa` or `abc`/`321`
    pub reject_runs: bool,
    pub check_common_passwords: bool,
    pub disallow_username_in_password: bool,
    pub disallow_email_in_password: bool,
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            min_length: 12,
            max_bytes: MAX_PASSWORD_BYTES,
            require_character_classes: true,
            reject_runs: true,
            check_common_passwords: true,
            disallow_username_in_password: true,
            disallow_email_in_password: true,
        }
    }
}

/// Why a password was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordIssue {
    TooShort { min: usize },
    TooLong { max: usize },
    MissingLowercase,
    MissingUppercase,
    MissingDigit,
    MissingSpecial,
    RepeatedCharacters,
    SequentialCharacters,
    TooCommon,
    ContainsUsername,
    ContainsEmail,
}

impl fmt::Display for PasswordIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooShort { min } => write!(f, "must be at least {} characters", min),
            Self::TooLong { max } => write!(f, "must be at most {} bytes", max),
            Self::MissingLowercase => write!(f, "must contain a lowercase letter"),
            Self::MissingUppercase => write!(f, "must contain an uppercase letter"),
            Self::MissingDigit => write!(f, "must contain a digit"),
            Self::MissingSpecial => write!(f, "must contain a special character"),
            Self::RepeatedCharacters => {
                write!(f, "must not repeat a character three or more times in a row")
            }
            Self::SequentialCharacters => write!(f, "must not contain sequences like abc or 321"),
            Self::TooCommon => write!(f, "is too common"),
            Self::ContainsUsername => write!(f, "must not contain your username"),
            Self::ContainsEmail => write!(f, "must not contain your email address"),
        }
    }
}

impl std::error::Error for PasswordIssue {}

impl PasswordPolicy {
    /// Check a password without user context
    pub fn check(&self, password: &str) -> Result<(), PasswordIssue> {
        self.check_with_context(password, None, None)
    }

    /// Check a password, also rejecting ones built from the username or
    /// the email local part
    pub fn check_with_context(
        &self,
        password: &str,
        username: Option<&str>,
        email: Option<&str>,
    ) -> Result<(), PasswordIssue> {
        if password.chars().count() < self.min_length {
            return Err(PasswordIssue::TooShort {
                min: self.min_length,
            });
        }
        if password.len() > self.max_bytes {
            return Err(PasswordIssue::TooLong {
                max: self.max_bytes,
            });
        }

        if self.require_character_classes {
            if !password.chars().any(|c| c.is_lowercase()) {
                return Err(PasswordIssue::MissingLowercase);
            }
            if !password.chars().any(|c| c.is_uppercase()) {
                return Err(PasswordIssue::MissingUppercase);
            }
            if !password.chars().any(|c| c.is_ascii_digit()) {
                return Err(PasswordIssue::MissingDigit);
            }
            if !password
                .chars()
                .any(|c| !c.is_alphanumeric() && !c.is_whitespace())
            {
                return Err(PasswordIssue::MissingSpecial);
            }
        }

        if self.reject_runs {
            if has_repeated_run(password) {
                return Err(PasswordIssue::RepeatedCharacters);
            }
            if has_sequential_run(password) {
                return Err(PasswordIssue::SequentialCharacters);
            }
        }

        if self.check_common_passwords && is_common_password(password) {
            return Err(PasswordIssue::TooCommon);
        }

        let lower = password.to_lowercase();
        if self.disallow_username_in_password {
            if let Some(name) = username.map(str::to_lowercase) {
                if name.len() >= 3 && lower.contains(&name) {
                    return Err(PasswordIssue::ContainsUsername);
                }
            }
        }
        if self.disallow_email_in_password {
            if let Some(local) = email.and_then(|e| e.split('@').next()).map(str::to_lowercase) {
                if local.len() >= 3 && lower.contains(&local) {
                    return Err(PasswordIssue::ContainsEmail);
                }
            }
        }

        Ok(())
    }
}

/// Default-policy shorthand
pub fn is_strong_password(password: &str) -> bool {
    PasswordPolicy::default().check(password).is_ok()
}

/// Three identical characters in a row
fn has_repeated_run(password: &str) -> bool {
    let chars: Vec<char> = password.chars().collect();
    chars.windows(3).any(|w| w[0] == w[1] && w[1] == w[2])
}

/// Three consecutive ascending or descending letters or digits (case-insensitive)
fn has_sequential_run(password: &str) -> bool {
    let codes: Vec<Option<u32>> = password
        .chars()
        .map(|c| c.is_ascii_alphanumeric().then(|| c.to_ascii_lowercase() as u32))
        .collect();
    codes.windows(3).any(|w| match (w[0], w[1], w[2]) {
        (Some(a), Some(b), Some(c)) => {
            let same_class = [a, b, c].iter().all(|x| (b'0' as u32..=b'9' as u32).contains(x))
                || [a, b, c].iter().all(|x| (b'a' as u32..=b'z' as u32).contains(x));
            same_class && ((b == a + 1 && c == b + 1) || (a == b + 1 && b == c + 1))
        }
        _ => false,
    })
}

fn is_common_password(password: &str) -> bool {
    let lower = password.to_lowercase();
    if COMMON_PASSWORDS.contains(&lower.as_str()) {
        return true;
    }
    // A common base dressed up with trailing digits or symbols ("Password123!")
    let base = lower.trim_end_matches(|c: char| !c.is_alphabetic());
    base.len() >= 4 && COMMON_PASSWORDS.contains(&base)
}

static COMMON_PASSWORDS: &[&str] = &[
    "123456", "password", "12345678", "qwerty", "123456789", "12345", "1234", "111111",
    "1234567", "dragon", "123123", "baseball", "abc123", "football", "monkey", "letmein",
    "shadow", "master", "qwertyuiop", "mustang", "1234567890", "michael", "superman",
    "1qaz2wsx", "trustno1", "jordan", "jennifer", "zxcvbnm", "asdfgh", "hunter", "soccer",
    "harley", "batman", "tigger", "sunshine", "iloveyou", "charlie", "starwars", "computer",
    "freedom", "princess", "summer", "welcome", "login", "admin", "administrator", "changeme",
    "secret", "passw0rd", "p@ssw0rd", "p@ssword", "qwerty123", "password1", "password123",
    "letmein1", "welcome1", "default", "guest", "money", "banking", "payment", "springbok",
];
