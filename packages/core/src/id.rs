//! CWE identifier parsing.
//!
//! Upstream data and user input spell the same weakness many ways: `CWE-79`,
//! `cwe-079`, `CWE 79`, or just `79`. [`normalize_id`] folds all of them into
//! the canonical form `CWE-<n>`, where `<n>` has no leading zeros.
//!
//! Accepted forms, after trimming surrounding whitespace:
//!
//! | Input | Canonical |
//! |-------|-----------|
//! | `CWE-79`, `cwe-79` | `CWE-79` |
//! | `CWE 79`, `CWE   79` | `CWE-79` |
//! | `CWE - 79`, `CWE- 79`, `CWE -79` | `CWE-79` |
//! | `79`, `0079` | `CWE-79` |
//!
//! Anything else is rejected with [`Error::InvalidId`].

use std::cmp::Ordering;
use std::sync::LazyLock;

use regex::Regex;

use crate::error::{Error, Result};

/// Prefix of every canonical ID.
pub const PREFIX: &str = "CWE-";

/// `^(?:cwe(?: +| ?- ?))?([0-9]+)$`, case-insensitive prefix.
static ACCEPTED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:(?i:cwe)(?: +| ?- ?))?([0-9]+)$").expect("invalid CWE id regex")
});

/// `^CWE-(0|[1-9][0-9]*)$`
static CANONICAL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^CWE-(0|[1-9][0-9]*)$").expect("invalid canonical id regex")
});

/// Convert any accepted spelling of a CWE ID to its canonical form.
///
/// Normalization is idempotent: feeding a canonical ID back in returns it
/// unchanged.
///
/// ```rust
/// assert_eq!(cwe::normalize_id(" cwe-079 ").unwrap(), "CWE-79");
/// assert_eq!(cwe::normalize_id("0").unwrap(), "CWE-0");
/// assert!(cwe::normalize_id("abc").is_err());
/// ```
pub fn normalize_id(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    let digits = ACCEPTED_RE
        .captures(trimmed)
        .and_then(|c| c.get(1))
        .ok_or_else(|| Error::InvalidId(raw.to_string()))?
        .as_str();

    let stripped = digits.trim_start_matches('0');
    let number = if stripped.is_empty() { "0" } else { stripped };
    Ok(format!("{PREFIX}{number}"))
}

/// Whether `id` is already in canonical form.
pub fn is_canonical(id: &str) -> bool {
    CANONICAL_RE.is_match(id)
}

/// The decimal digits of a canonical ID (`"CWE-89"` → `"89"`).
///
/// Used to build upstream URL paths. Fails if `id` is not canonical.
pub fn numeric_part(id: &str) -> Result<&str> {
    CANONICAL_RE
        .captures(id)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .ok_or_else(|| Error::InvalidId(id.to_string()))
}

/// The integer value of a canonical ID.
pub fn numeric_value(id: &str) -> Result<u64> {
    numeric_part(id)?
        .parse::<u64>()
        .map_err(|_| Error::InvalidId(id.to_string()))
}

/// Order IDs by their numeric value, so `CWE-20` sorts before `CWE-100`.
///
/// Non-canonical IDs sort after canonical ones, lexically among themselves.
pub fn compare_ids(a: &str, b: &str) -> Ordering {
    match (numeric_value(a), numeric_value(b)) {
        (Ok(x), Ok(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}

// --- tests -------------------------------------------------------------------
