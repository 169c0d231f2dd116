//! # Text Processing Utilities
//!
//! Redaction helpers applied to anything that may be logged or persisted alongside a
//! command execution. Rendered commands are never stored, but the raw caller arguments
//! are, and those regularly carry credentials as `KEY:VALUE` or `KEY=VALUE` pairs.

use once_cell::sync::Lazy;
use regex::Regex;

const REDACTED: &str = "[REDACTED]";

const SECRET_KEYWORDS: &[&str] = &[
    "ACCESS_KEY",
    "API_KEY",
    "API_TOKEN",
    "AUTHORIZATION",
    "AUTH_TOKEN",
    "CLIENT_SECRET",
    "CONNECTION_STRING",
    "CREDENTIAL",
    "DATABASE_URL",
    "DB_URL",
    "JWT",
    "PASSPHRASE",
    "PASSWD",
    "PASSWORD",
    "PRIVATE_KEY",
    "PWD",
    "SECRET",
    "SESSION",
    "TOKEN",
];

static REDACT_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(build_redact_patterns);

fn build_redact_patterns() -> Vec<Regex> {
    let keywords = SECRET_KEYWORDS.join("|");
    let assignment = format!(r"(?i)((?:^|\s|--)[A-Za-z0-9_.-]*?(?:{keywords})[A-Za-z0-9_.-]*\s*[:=]\s*)([^\s]+)");
    [
        assignment.as_str(),
        r"(?i)(authorization:\s+)([^\s]+(?:\s+[^\s]+)*)",
        r"(?i)((?:^|\b)Bearer\s+)([A-Za-z0-9\-._~+/]+=*)",
        r"(?i)(://[^:/@\s]+:)([^@\s]+)(@)",
    ]
    .iter()
    .filter_map(|pattern| Regex::new(pattern).ok())
    .collect()
}

/// Redacts values that look like secrets in a string.
///
/// ```rust
/// use hiproc_util::text_processing::redact_sensitive;
///
/// assert_eq!(redact_sensitive("API_TOKEN:abc123 -p"), "API_TOKEN:[REDACTED] -p");
/// assert_eq!(redact_sensitive("postgres://app:hunter2@db/prod"), "postgres://app:[REDACTED]@db/prod");
/// ```
pub fn redact_sensitive(input: &str) -> String {
    let mut redacted = input.to_string();
    for pattern in REDACT_PATTERNS.iter() {
        redacted = pattern
            .replace_all(&redacted, |captures: &regex::Captures| {
                let prefix = captures.get(1).map(|m| m.as_str()).unwrap_or("");
                let suffix = captures.get(3).map(|m| m.as_str()).unwrap_or("");
                format!("{prefix}{REDACTED}{suffix}")
            })
            .to_string();
    }
    redacted
}

/// Redacts and joins caller arguments for persistence. Returns `None` for an empty list.
pub fn redact_arguments(arguments: &[String]) -> Option<String> {
    if arguments.is_empty() {
        return None;
    }
    Some(arguments.iter().map(|argument| redact_sensitive(argument)).collect::<Vec<_>>().join(" "))
}
