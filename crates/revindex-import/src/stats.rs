//! Statistics for walks, imports and ref updates

use crate::formatting::{format_duration, format_number};
use std::time::Duration;

/// Statistics of walking a single ref
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WalkStats {
    /// Log pages requested from the origin
    pub log_calls: usize,

    /// Commits not yet indexed when the walk reached them
    pub discovered: usize,

    /// Documents actually created by the store
    pub created: usize,
}

/// Full import statistics
#[derive(Debug, Clone, Default)]
pub struct ImportStats {
    pub refs_walked: usize,
    pub refs_skipped: usize,
    pub log_calls: usize,
    pub commits_discovered: usize,
    pub commits_created: usize,
    pub elapsed_time: Duration,
}

impl ImportStats {
    pub(crate) fn add_walk(&mut self, walk: &WalkStats) {
        self.refs_walked += 1;
        self.log_calls += walk.log_calls;
        self.commits_discovered += walk.discovered;
        self.commits_created += walk.created;
    }
}

impl std::fmt::Display for ImportStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Refs: {} walked, {} skipped | Commits: {} created ({} discovered) | Log pages: {} | Time: {}",
            format_number(self.refs_walked),
            format_number(self.refs_skipped),
            format_number(self.commits_created),
            format_number(self.commits_discovered),
            format_number(self.log_calls),
            format_duration(self.elapsed_time)
        )
    }
}

/// Statistics of processing one ref-update event
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateStats {
    pub refs_walked: usize,
    pub refs_skipped: usize,
    pub log_calls: usize,
    pub commits_created: usize,
}

impl UpdateStats {
    pub(crate) fn add_walk(&mut self, walk: &WalkStats) {
        self.refs_walked += 1;
        self.log_calls += walk.log_calls;
        self.commits_created += walk.created;
    }
}

impl std::fmt::Display for UpdateStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Refs: {} walked, {} skipped | Commits: {} created | Log pages: {}",
            self.refs_walked,
            self.refs_skipped,
            format_number(self.commits_created),
            self.log_calls
        )
    }
}
