//! Origin repository read API

use anyhow::Result;
use async_trait::async_trait;
use revindex_core::RawCommit;
use std::collections::BTreeMap;

/// One page of a log listing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LogPage {
    /// Commits in walk order, newest first
    pub commits: Vec<RawCommit>,

    /// Cursor of the next page; `None` or empty when the walk is exhausted
    pub next_page_token: Option<String>,
}

/// Read access to the repositories of one origin host.
///
/// Both calls are reads and may be retried freely.
#[async_trait]
pub trait Origin: Send + Sync {
    /// Lists refs under `refs_path` with the commit each one points to.
    /// A ref without a target commit maps to an empty string.
    async fn resolve_refs(&self, project: &str, refs_path: &str) -> Result<BTreeMap<String, String>>;

    /// Lists commits reachable from `committish`, one page at a time
    async fn log(
        &self,
        project: &str,
        committish: &str,
        page_token: Option<&str>,
        page_size: usize,
    ) -> Result<LogPage>;
}
