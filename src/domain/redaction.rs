//! Redaction rules for identifiers and secrets around medical records.
//!
//! - Ledger access tokens and 32-byte hex keys (`0x` + 64 hex)
//! - Account addresses (`0x` + 40 hex)
//! - SSN, email, phone and insurance-number patterns
//! - Bearer tokens, labelled secrets and PEM key blocks
//!
//! Used on the clinical context before it reaches a language model, and by
//! the log writer in `adapters::sanitize`.

use regex::{Regex, RegexSet};
use std::sync::OnceLock;

static PII_PATTERNS: OnceLock<PiiPatterns> = OnceLock::new();

/// Default input cap for [`redact`].
pub const DEFAULT_MAX_BYTES: usize = 16 * 1024;

struct PiiPattern {
    regex: Regex,
    replacement: &'static str,
}

struct PiiPatterns {
    fast_set: RegexSet,
    fast_patterns: Vec<PiiPattern>,
    pem_pattern: Regex,
}

fn truncate_to_char_boundary(input: &str, max_bytes: usize) -> (&str, bool) {
    if input.len() <= max_bytes {
        return (input, false);
    }

    let mut end = max_bytes;
    while end > 0 && !input.is_char_boundary(end) {
        end -= 1;
    }
    (&input[..end], true)
}

/// Pattern order matters: replacements run in this order, so longer hex
/// forms are consumed before the address rule can see a prefix of them.
const FAST_RULES: &[(&str, &str)] = &[
    (r"\b0x[0-9a-fA-F]{64}\b", "[REDACTED-TOKEN]"),
    (r"\b0x[0-9a-fA-F]{40}\b", "[REDACTED-ADDRESS]"),
    (r"\b\d{3}-\d{2}-\d{4}\b", "[REDACTED-SSN]"),
    (
        r"(?i)\b(?:insurance|policy|member)[ _-]?(?:no\.?|number|num|id|#)\s*[:#]?\s*[A-Z0-9-]{5,20}\b",
        "[REDACTED-INSURANCE]",
    ),
    (
        r"(?i)\b[a-z0-9](?:[a-z0-9._%+-]{0,62}[a-z0-9])?@(?:[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?\.)+[a-z]{2,}\b",
        "[REDACTED-EMAIL]",
    ),
    (
        r"\b(?:\+?1[-.\s]?)?\(?[0-9]{3}\)?[-.\s]?[0-9]{3}[-.\s]?[0-9]{4}\b",
        "[REDACTED-PHONE]",
    ),
    (r"(?i)\bbearer\s+[A-Za-z0-9._~+/-]{16,}=*", "Bearer [REDACTED-SECRET]"),
    (
        r"\beyJ[a-zA-Z0-9_-]{10,}\.[a-zA-Z0-9_-]{10,}\.[a-zA-Z0-9_-]{10,}\b",
        "[REDACTED-JWT]",
    ),
    (
        r"(?i)\b(?:api[_-]?key|access[_-]?token|secret|password|private[_-]?key|patient[_-]?key|token|key)\b\s*[:=]\s*[A-Za-z0-9+/_-]{16,}={0,2}",
        "[REDACTED-SECRET]",
    ),
    (r"\b[0-9a-fA-F]{64}\b", "[REDACTED-KEY]"),
];

fn get_patterns() -> &'static PiiPatterns {
    PII_PATTERNS.get_or_init(|| {
        // The rules are constants; a compile failure is a programming error.
        let fast_set =
            RegexSet::new(FAST_RULES.iter().map(|(p, _)| *p)).expect("Valid regex set");
        let fast_patterns = FAST_RULES
            .iter()
            .map(|(pattern, replacement)| PiiPattern {
                regex: Regex::new(pattern).expect("Valid regex"),
                replacement,
            })
            .collect();

        // Kept out of the set: a bounded dot-all pattern inflates the combined program.
        let pem_pattern = Regex::new(
            r"(?s)-----BEGIN [A-Z0-9 ]{0,40}PRIVATE KEY-----[\s\S]{0,8192}-----END [A-Z0-9 ]{0,40}PRIVATE KEY-----",
        )
        .expect("Valid regex");

        PiiPatterns {
            fast_set,
            fast_patterns,
            pem_pattern,
        }
    })
}

/// Replace identifier and secret patterns, capped at [`DEFAULT_MAX_BYTES`].
#[must_use]
pub fn redact(input: &str) -> String {
    redact_with_limit(input, DEFAULT_MAX_BYTES)
}

/// Replace identifier and secret patterns in the first `max_bytes` of
/// `input`; anything past the cap is dropped and marked `[TRUNCATED]`.
#[must_use]
pub fn redact_with_limit(input: &str, max_bytes: usize) -> String {
    let patterns = get_patterns();
    let (prefix, truncated) = truncate_to_char_boundary(input, max_bytes);

    let matched: Vec<usize> = patterns.fast_set.matches(prefix).into_iter().collect();
    let mut result = prefix.to_string();
    for idx in matched {
        let pattern = &patterns.fast_patterns[idx];
        result = pattern
            .regex
            .replace_all(&result, pattern.replacement)
            .into_owned();
    }

    if result.contains("-----BEGIN ") {
        result = patterns
            .pem_pattern
            .replace_all(&result, "[REDACTED-PEM-PRIVATE-KEY]")
            .into_owned();
    }

    if truncated {
        result.push_str(" [TRUNCATED]");
    }
    result
}

/// Whether the first `max_bytes` of `input` hold a redactable pattern.
#[must_use]
pub fn contains_pii(input: &str, max_bytes: usize) -> bool {
    let patterns = get_patterns();
    let (prefix, _) = truncate_to_char_boundary(input, max_bytes);
    patterns.fast_set.is_match(prefix)
        || (prefix.contains("-----BEGIN ") && patterns.pem_pattern.is_match(prefix))
}
