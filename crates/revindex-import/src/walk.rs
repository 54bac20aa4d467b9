//! Paginated backward walk of one ref
//!
//! Shared by the full importer and the ref-update processor. A walk stops at
//! the first commit in the caller's `seen` set. With `trust_store` set it
//! also stops at the first commit already stored, which is only sound once a
//! full scan has completed: pages land tip first, so an interrupted walk
//! leaves stored commits above unstored history. Each page of new commits is
//! written in the background while the next page is fetched; at most one
//! write is in flight.

use revindex_core::{CommitKey, IndexedCommit, RawCommit, RepositoryRef};
use revindex_db::IndexDb;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::IndexError;
use crate::origin::Origin;
use crate::stats::WalkStats;

type PendingWrite = JoinHandle<anyhow::Result<usize>>;

pub(crate) struct RefWalker<'a> {
    pub origin: &'a dyn Origin,
    pub db: &'a Arc<IndexDb>,
    pub repo: &'a RepositoryRef,
    pub page_size: usize,
    pub trust_store: bool,
}

impl RefWalker<'_> {
    /// Walks backward from `tip`, storing every commit not seen before.
    pub(crate) async fn walk(
        &self,
        tip: &str,
        seen: &mut HashSet<CommitKey>,
        cancel: &CancellationToken,
    ) -> Result<WalkStats, IndexError> {
        let mut stats = WalkStats::default();
        let mut page_token: Option<String> = None;
        let mut pending: Option<PendingWrite> = None;

        loop {
            if cancel.is_cancelled() {
                finish_write(pending, &mut stats).await?;
                return Err(IndexError::Cancelled);
            }

            let page = self
                .origin
                .log(&self.repo.name, tip, page_token.as_deref(), self.page_size)
                .await;
            let page = match page {
                Ok(page) => page,
                Err(e) => {
                    finish_write(pending, &mut stats).await?;
                    return Err(IndexError::Origin(e));
                }
            };
            stats.log_calls += 1;

            let (batch, reached_known) = match self.collect_new(&page.commits, seen).await {
                Ok(collected) => collected,
                Err(e) => {
                    finish_write(pending, &mut stats).await?;
                    return Err(e);
                }
            };

            finish_write(pending.take(), &mut stats).await?;

            if !batch.is_empty() {
                if cancel.is_cancelled() {
                    return Err(IndexError::Cancelled);
                }
                log::debug!(
                    "{}: storing {} commits below {}",
                    self.repo,
                    batch.len(),
                    batch[0].commit_hash
                );
                stats.discovered += batch.len();
                let db = Arc::clone(self.db);
                pending = Some(tokio::task::spawn_blocking(move || db.put_commits(&batch)));
            }

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) if !reached_known => page_token = Some(token),
                _ => break,
            }
        }

        finish_write(pending, &mut stats).await?;
        Ok(stats)
    }

    /// Converts a page into documents up to the first already-known commit.
    /// Returns the new documents and whether a known commit was reached.
    async fn collect_new(
        &self,
        commits: &[RawCommit],
        seen: &mut HashSet<CommitKey>,
    ) -> Result<(Vec<IndexedCommit>, bool), IndexError> {
        let mut batch = Vec::with_capacity(commits.len());
        let mut reached_known = false;

        for raw in commits {
            let commit = IndexedCommit::from_raw(self.repo, raw);
            if !seen.insert(commit.key()) {
                reached_known = true;
                break;
            }
            batch.push(commit);
        }

        if self.trust_store && !batch.is_empty() {
            let ids: Vec<String> = batch.iter().map(|c| c.id.clone()).collect();
            let db = Arc::clone(self.db);
            let unstored = tokio::task::spawn_blocking(move || db.count_unstored_prefix(&ids))
                .await?
                .map_err(IndexError::Store)?;
            if unstored < batch.len() {
                batch.truncate(unstored);
                reached_known = true;
            }
        }

        Ok((batch, reached_known))
    }
}

async fn finish_write(pending: Option<PendingWrite>, stats: &mut WalkStats) -> Result<(), IndexError> {
    if let Some(handle) = pending {
        stats.created += handle.await?.map_err(IndexError::Store)?;
    }
    Ok(())
}
