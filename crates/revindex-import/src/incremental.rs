//! Incremental indexing from ref-update notifications
//!
//! Runs without the full-scan lease. Each ref update is walked on its own
//! with a fresh `seen` set, since nothing is known about the other refs of
//! the repository. A failing ref does not stop the remaining ones, but it
//! may have stored a tip above unstored history, so it makes the next full
//! scan due.

use revindex_core::{CommitKey, RefUpdateEvent, RepositoryRef};
use revindex_db::{IndexDb, LeaseWrite};
use std::collections::HashSet;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::catalog::RepoCatalog;
use crate::error::{RefFailure, UpdateError};
use crate::origin::Origin;
use crate::stats::UpdateStats;
use crate::walk::RefWalker;

pub struct UpdateProcessor {
    host: String,
    catalog: Arc<RepoCatalog>,
    origin: Arc<dyn Origin>,
    db: Arc<IndexDb>,
    page_size: usize,
}

impl UpdateProcessor {
    /// Creates a processor for notifications of repositories on `host`
    pub fn new(
        host: impl Into<String>,
        catalog: Arc<RepoCatalog>,
        origin: Arc<dyn Origin>,
        db: Arc<IndexDb>,
        page_size: usize,
    ) -> Self {
        Self {
            host: host.into(),
            catalog,
            origin,
            db,
            page_size: page_size.max(1),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Indexes the commits introduced by `event`.
    ///
    /// Events for unknown or opted-out repositories, and events without ref
    /// updates, succeed without doing anything.
    pub async fn process(&self, event: &RefUpdateEvent) -> Result<UpdateStats, UpdateError> {
        let mut stats = UpdateStats::default();

        let Some(repo) = self.catalog.get(&self.host, &event.repo_name) else {
            log::debug!("Ignoring update of unknown repository {}/{}", self.host, event.repo_name);
            return Ok(stats);
        };
        if !repo.should_index() {
            log::debug!("Ignoring update of {}: indexing disabled", repo);
            return Ok(stats);
        }
        if event.ref_updates.is_empty() {
            log::debug!("Ignoring event without ref updates for {}", repo);
            return Ok(stats);
        }

        let walker = RefWalker {
            origin: self.origin.as_ref(),
            db: &self.db,
            repo: &repo,
            page_size: self.page_size,
            trust_store: self.has_completed_scan(&repo).await,
        };
        let cancel = CancellationToken::new();
        let mut failures = Vec::new();

        for (ref_name, update) in &event.ref_updates {
            if !repo.is_ref_indexed(ref_name) {
                log::debug!("{}: ref {} excluded", repo, ref_name);
                stats.refs_skipped += 1;
                continue;
            }
            if update.is_deletion() {
                log::debug!("{}: ref {} deleted", repo, ref_name);
                stats.refs_skipped += 1;
                continue;
            }

            let mut seen: HashSet<CommitKey> = HashSet::new();
            match walker.walk(&update.new_hash, &mut seen, &cancel).await {
                Ok(walked) => {
                    log::debug!(
                        "{}: {} {} -> {}, {} new commits",
                        repo,
                        ref_name,
                        update.old_hash,
                        update.new_hash,
                        walked.created
                    );
                    stats.add_walk(&walked);
                }
                Err(e) => {
                    log::warn!("{}: failed to index {}: {}", repo, ref_name, e);
                    failures.push(RefFailure {
                        ref_name: ref_name.clone(),
                        error: e,
                    });
                }
            }
        }

        if failures.is_empty() {
            log::info!("Updated {}: {}", repo, stats);
            Ok(stats)
        } else {
            self.require_full_scan(&repo).await;
            Err(UpdateError {
                repository: repo.to_string(),
                failures,
                partial: stats,
            })
        }
    }

    /// Stored commits only bound a walk once a full scan has completed
    async fn has_completed_scan(&self, repo: &RepositoryRef) -> bool {
        let db = Arc::clone(&self.db);
        let key = repo.key();
        match tokio::task::spawn_blocking(move || db.lease_state(&key)).await {
            Ok(Ok(state)) => state.is_some_and(|s| s.has_completed_scan()),
            Ok(Err(e)) => {
                log::warn!("{}: failed to read lease state: {:#}", repo, e);
                false
            }
            Err(e) => {
                log::warn!("{}: failed to read lease state: {}", repo, e);
                false
            }
        }
    }

    /// Forgets the last completed scan of `repo`, so the controller walks it
    /// again in full and redelivered events ignore the store stop.
    async fn require_full_scan(&self, repo: &RepositoryRef) {
        let db = Arc::clone(&self.db);
        let key = repo.key();
        let reset = tokio::task::spawn_blocking(move || {
            db.update_lease(&key, |current| match current {
                Some(state) if state.has_completed_scan() => {
                    (LeaseWrite::Put(state.require_full_scan()), true)
                }
                _ => (LeaseWrite::Keep, false),
            })
        })
        .await;

        match reset {
            Ok(Ok(true)) => log::info!("{}: full scan required after failed update", repo),
            Ok(Ok(false)) => {}
            Ok(Err(e)) => log::warn!("{}: failed to require a full scan: {:#}", repo, e),
            Err(e) => log::warn!("{}: failed to require a full scan: {}", repo, e),
        }
    }
}
