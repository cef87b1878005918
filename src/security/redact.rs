//! Privacy-mode redaction of model output.
//!
//! Rules run in a fixed order: email, phone, card, API key. Each placeholder
//! contains no digits, `@` or key prefixes, so a later rule can never
//! re-match text an earlier rule already replaced.

use std::sync::LazyLock;

use regex::Regex;

pub const EMAIL_PLACEHOLDER: &str = "[REDACTED EMAIL]";
pub const PHONE_PLACEHOLDER: &str = "[REDACTED PHONE]";
pub const CARD_PLACEHOLDER: &str = "[REDACTED CARD]";
pub const API_KEY_PLACEHOLDER: &str = "[REDACTED KEY]";

static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").expect("Invalid email regex")
});

// Optional +country code, then 3-3-4 digits. Word boundaries on both ends
// keep it from biting into longer digit runs such as card numbers.
static PHONE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:\+\d{1,3}[\s.-]?)?(?:\(\d{3}\)\s?|\b\d{3}[\s.-]?)\d{3}[\s.-]?\d{4}\b")
        .expect("Invalid phone regex")
});

// 13–16 digits, optionally grouped with spaces or dashes.
static CARD_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:\d[ -]?){12,15}\d\b").expect("Invalid card regex")
});

static API_KEY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(?:sk|pk|rk)[-_][A-Za-z0-9_-]{16,}|\bAIza[0-9A-Za-z_-]{35}|\bgh[pousr]_[A-Za-z0-9]{36,}|\bxox[abpr]-[A-Za-z0-9-]{10,}",
    )
    .expect("Invalid API key regex")
});

/// Applies the redaction rules in order.
#[derive(Debug, Clone, Copy, Default)]
pub struct Redactor;

impl Redactor {
    pub fn new() -> Self {
        Self
    }

    /// Replace every sensitive match in `text` with its placeholder.
    ///
    /// ```rust
    /// use voice_session::security::Redactor;
    ///
    /// let out = Redactor::new().redact("mail a@b.io, card 4111 1111 1111 1111");
    /// assert_eq!(out, "mail [REDACTED EMAIL], card [REDACTED CARD]");
    /// ```
    pub fn redact(&self, text: &str) -> String {
        let rules: [(&Regex, &str); 4] = [
            (&EMAIL_RE, EMAIL_PLACEHOLDER),
            (&PHONE_RE, PHONE_PLACEHOLDER),
            (&CARD_RE, CARD_PLACEHOLDER),
            (&API_KEY_RE, API_KEY_PLACEHOLDER),
        ];

        let mut out = text.to_string();
        for (re, placeholder) in rules {
            if re.is_match(&out) {
                out = re.replace_all(&out, placeholder).into_owned();
            }
        }
        out
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn redact(s: &str) -> String {
        Redactor::new().redact(s)
    }

    #[test]
    fn email_and_sixteen_digit_number_in_one_pass() {
        let out = redact("Write to jane.doe@example.com using card 1234567812345678 today");
        assert_eq!(
            out,
            "Write to [REDACTED EMAIL] using card [REDACTED CARD] today"
        );
    }

    #[test]
    fn phone_formats() {
        for phone in ["555-123-4567", "(555) 123-4567", "+1 555 123 4567", "5551234567"] {
            let out = redact(&format!("call {phone} now"));
            assert_eq!(out, "call [REDACTED PHONE] now", "input: {phone}");
        }
    }

    #[test]
    fn grouped_card_numbers() {
        assert_eq!(redact("4111-1111-1111-1111"), CARD_PLACEHOLDER);
        assert_eq!(redact("4111 1111 1111 1111"), CARD_PLACEHOLDER);
    }

    #[test]
    fn api_keys() {
        let key = "sk-abcdefghijklmnopqrstuvwx";
        assert_eq!(redact(&format!("key is {key}")), "key is [REDACTED KEY]");
        let google = format!("AIza{}", "A".repeat(35));
        assert_eq!(redact(&google), API_KEY_PLACEHOLDER);
    }

    #[test]
    fn placeholders_are_not_rematched() {
        let once = redact("a@b.io 555-123-4567 4111111111111111 sk-abcdefghijklmnopqrstu");
        assert_eq!(
            once,
            "[REDACTED EMAIL] [REDACTED PHONE] [REDACTED CARD] [REDACTED KEY]"
        );
        assert_eq!(redact(&once), once);
    }

    #[test]
    fn email_digits_are_not_treated_as_phone() {
        assert_eq!(redact("5551234567@example.com"), EMAIL_PLACEHOLDER);
    }

    #[test]
    fn clean_text_untouched() {
        let text = "The meeting is at 10:30 in room 42.";
        assert_eq!(redact(text), text);
    }
}
