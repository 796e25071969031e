//! Size capping and PII redaction for captured tool payloads

use regex::Regex;
use std::sync::LazyLock;

pub const REDACTION_MARKER: &str = "[REDACTED]";
pub const TRUNCATION_MARKER: &str = "...[truncated]";

// =============================================================================
// REDACTION PATTERNS
// =============================================================================

static EMAIL_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}").unwrap());

static SSN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b\d{3}-\d{2}-\d{4}\b").unwrap());

static CARD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b\d{4}[-\s]?\d{4}[-\s]?\d{4}[-\s]?\d{4}\b").unwrap());

static PHONE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\+\d{1,3}[-.\s]?)?\(?\b\d{3}\)?[-.\s]\d{3}[-.\s]\d{4}\b").unwrap()
});

/// Replaces email, SSN-like, card-like and phone-like substrings. Cards run
/// before phones so a card number is never half-matched as a phone.
pub fn redact_pii(text: &str) -> String {
    [&*EMAIL_RE, &*SSN_RE, &*CARD_RE, &*PHONE_RE]
        .iter()
        .fold(text.to_string(), |acc, re| {
            re.replace_all(&acc, REDACTION_MARKER).into_owned()
        })
}

/// Cuts `text` to at most `max_bytes` (on a char boundary) and appends the
/// truncation marker when anything was removed.
pub fn truncate(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }
    let mut cut = max_bytes;
    while cut > 0 && !text.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}{}", &text[..cut], TRUNCATION_MARKER)
}

/// Redacts (when enabled) then truncates.
pub fn sanitize(text: &str, max_bytes: usize, redact: bool) -> String {
    if redact {
        truncate(&redact_pii(text), max_bytes)
    } else {
        truncate(text, max_bytes)
    }
}
