//! Type-aware sanitizers
//!
//! Each sanitizer normalizes one kind of field before it is validated.
//! Free text is HTML-escaped; structured fields are reduced to their
//! canonical alphabet instead.

/// Keep only digits
pub fn sanitize_account_number(value: &str) -> String {
    value.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Uppercase, alphanumerics only
pub fn sanitize_swift(value: &str) -> String {
    value
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// Uppercase, whitespace removed
pub fn sanitize_iban(value: &str) -> String {
    value
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// IBANs keep their letters; plain account numbers drop everything but digits
pub fn sanitize_beneficiary_account(value: &str) -> String {
    let compact = sanitize_iban(value);
    if compact.chars().take(2).all(|c| c.is_ascii_alphabetic()) && compact.len() >= 2 {
        compact
    } else {
        sanitize_account_number(&compact)
    }
}

pub fn sanitize_email(value: &str) -> String {
    value.trim().to_lowercase()
}

pub fn sanitize_username(value: &str) -> String {
    value.trim().to_lowercase()
}

/// Uppercase two- or three-letter codes (country, currency)
pub fn sanitize_code(value: &str) -> String {
    value.trim().to_ascii_uppercase()
}

/// Trim, drop control characters, collapse internal whitespace
pub fn sanitize_name(value: &str) -> String {
    value
        .chars()
        .filter(|c| !c.is_control())
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Free text: NUL bytes and other control characters (except newline and
/// tab) removed, trimmed, then HTML-escaped
pub fn sanitize_text(value: &str) -> String {
    let cleaned: String = strip_null_bytes(value)
        .chars()
        .filter(|c| !c.is_control() || matches!(c, '\n' | '\t'))
        .collect();
    escape_html(cleaned.trim())
}

/// Escape HTML special characters for safe display
pub fn escape_html(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => result.push_str("&amp;"),
            '<' => result.push_str("&lt;"),
            '>' => result.push_str("&gt;"),
            '"' => result.push_str("&quot;"),
            '\'' => result.push_str("&#x27;"),
            '/' => result.push_str("&#x2F;"),
            _ => result.push(c),
        }
    }
    result
}

pub fn strip_null_bytes(input: &str) -> String {
    input.replace('\0', "")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_account_number() {
        assert_eq!(sanitize_account_number(" 6200-1234 567 "), "62001234567");
    }

    #[test]
    fn test_swift_and_iban() {
        assert_eq!(sanitize_swift(" deut-deff 500"), "DEUTDEFF500");
        assert_eq!(sanitize_iban("gb82 west 1234 5698 7654 32"), "GB82WEST12345698765432");
        assert_eq!(
            sanitize_beneficiary_account("gb82 WEST 1234 5698 7654 32"),
            "GB82WEST12345698765432"
        );
        assert_eq!(sanitize_beneficiary_account("62 0012-345"), "620012345");
    }

    #[test]
    fn test_identity_fields() {
        assert_eq!(sanitize_email("  Thandi@Example.COM "), "thandi@example.com");
        assert_eq!(sanitize_username(" Thandi "), "thandi");
        assert_eq!(sanitize_code(" za "), "ZA");
    }

    #[test]
    fn test_name_collapses_whitespace() {
        assert_eq!(sanitize_name("  Thandi \t  Nkosi\u{0007} "), "Thandi Nkosi");
    }

    #[test]
    fn test_text_is_escaped() {
        assert_eq!(
            sanitize_text(" <script>alert('x')</script>\0 "),
            "&lt;script&gt;alert(&#x27;x&#x27;)&lt;&#x2F;script&gt;"
        );
        assert_eq!(sanitize_text("Invoice 42 & co"), "Invoice 42 &amp; co");
    }
}
