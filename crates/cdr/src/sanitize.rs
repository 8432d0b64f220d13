//! Helpers for sanitizing data before it enters logs and tracing spans.
//!
//! Session tokens and notification addresses must never reach log output.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::path::Path;

/// Returns only the filename component of a path (no directory).
pub fn redact_path(path: &Path) -> String {
    path.file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("<unknown>")
        .to_string()
}

/// Masks the local part of an email address: `jdoe@example.org` -> `j***@example.org`.
pub fn redact_email(address: &str) -> String {
    match address.trim().split_once('@') {
        Some((local, domain)) => {
            let first: String = local.chars().take(1).collect();
            format!("{}***@{}", first, domain)
        }
        None => "***".to_string(),
    }
}

/// Redacts a list of recipients for log output.
pub fn redact_recipients(recipients: &[String]) -> String {
    recipients
        .iter()
        .map(|r| redact_email(r))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Short deterministic hash of a session token for correlating log lines.
pub fn hash_session(token: &str) -> String {
    let mut hasher = DefaultHasher::new();
    token.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}
