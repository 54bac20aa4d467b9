//! Formatting utilities for log output

use chrono::{DateTime, Utc};
use std::time::Duration;

/// Groups the digits of `n` in threes, e.g. "1,234,567"
pub(crate) fn format_number(n: usize) -> String {
    let digits = n.to_string();
    let groups: Vec<&str> = digits
        .as_bytes()
        .rchunks(3)
        .rev()
        .map(|group| std::str::from_utf8(group).unwrap_or_default())
        .collect();
    groups.join(",")
}

/// Formats a duration in human-readable format
pub(crate) fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();

    if secs == 0 {
        format!("{}ms", d.as_millis())
    } else if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}

/// Formats a Unix timestamp in milliseconds; 0 means "never"
pub(crate) fn format_unix_millis(ms: i64) -> String {
    if ms == 0 {
        return "never".to_string();
    }
    DateTime::<Utc>::from_timestamp_millis(ms)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| "unknown".to_string())
}
