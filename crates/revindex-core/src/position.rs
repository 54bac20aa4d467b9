//! Commit position extraction from commit message footers
//!
//! Two footer forms carry a position:
//! - `Cr-Commit-Position: refs/heads/main@{#1234}` (current form)
//! - `git-svn-id: svn://svn.example.org/repo/trunk@1234 <uuid>` (legacy form)
//!
//! The current form always wins when its key is present, even if the value
//! turns out to be malformed.

use regex::Regex;
use std::sync::OnceLock;

use crate::error::CoreError;
use crate::models::CommitPosition;

/// Footer key of the current position form
pub const POSITION_FOOTER: &str = "Cr-Commit-Position";

/// Footer key of the legacy (svn mirror) position form
pub const LEGACY_POSITION_FOOTER: &str = "git-svn-id";

fn position_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\S+)@\{#(\d+)\}$").ok()).as_ref()
}

fn legacy_position_regex() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(\S+)@(\d+)(?:\s+\S+)*$").ok()).as_ref()
}

/// Parses the commit position out of a commit message.
///
/// Only the last footer with a given key is considered.
pub fn parse_position(message: &str) -> Result<CommitPosition, CoreError> {
    let footers = parse_footers(message);

    if let Some(value) = last_footer(&footers, POSITION_FOOTER) {
        return match_position(position_regex(), POSITION_FOOTER, value);
    }
    if let Some(value) = last_footer(&footers, LEGACY_POSITION_FOOTER) {
        return match_position(legacy_position_regex(), LEGACY_POSITION_FOOTER, value);
    }
    Err(CoreError::NoPositionFooter)
}

/// Splits the footer block of a message into `(key, value)` pairs, in
/// message order.
///
/// The footer block is the last paragraph, after the final blank line; the
/// subject paragraph never holds footers. Within it, any line shaped like
/// `key: value` counts, where the key is a single token made of
/// alphanumerics, `-` and `_`.
pub fn parse_footers(message: &str) -> Vec<(&str, &str)> {
    let lines: Vec<&str> = message.trim_end().lines().collect();
    let Some(blank) = lines.iter().rposition(|line| line.trim().is_empty()) else {
        return Vec::new();
    };

    lines[blank + 1..]
        .iter()
        .filter_map(|&line| {
            let (key, value) = line.split_once(':')?;
            let key = key.trim();
            let valid_key = !key.is_empty()
                && key
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
            valid_key.then(|| (key, value.trim()))
        })
        .collect()
}

fn last_footer<'a>(footers: &[(&str, &'a str)], key: &str) -> Option<&'a str> {
    footers
        .iter()
        .rev()
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .map(|(_, v)| *v)
}

fn match_position(re: Option<&Regex>, key: &str, value: &str) -> Result<CommitPosition, CoreError> {
    let invalid = || CoreError::InvalidPositionFooter {
        key: key.to_string(),
        value: value.to_string(),
    };

    let caps = re.and_then(|re| re.captures(value)).ok_or_else(invalid)?;
    let number = caps[2].parse::<u64>().map_err(|_| invalid())?;

    Ok(CommitPosition {
        name: caps[1].to_string(),
        number,
    })
}
