//! Full-repository import

use revindex_core::{is_zero_hash, CommitKey, RepositoryRef};
use revindex_db::IndexDb;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::error::IndexError;
use crate::lease::{LeaseCoordinator, Leased};
use crate::origin::Origin;
use crate::stats::ImportStats;
use crate::walk::RefWalker;

/// How a full import request ended
#[derive(Debug)]
pub enum ImportOutcome {
    /// The repository opted out of indexing
    Disabled,

    /// Another owner holds a fresh lease, or no scan is due yet
    NotRequired,

    Completed(ImportStats),
}

/// Walks every configured ref of a repository under its full-scan lease
pub struct RepoImporter {
    origin: Arc<dyn Origin>,
    db: Arc<IndexDb>,
    leases: LeaseCoordinator,
    page_size: usize,
}

impl RepoImporter {
    pub fn new(
        origin: Arc<dyn Origin>,
        db: Arc<IndexDb>,
        leases: LeaseCoordinator,
        page_size: usize,
    ) -> Self {
        Self {
            origin,
            db,
            leases,
            page_size: page_size.max(1),
        }
    }

    pub fn leases(&self) -> &LeaseCoordinator {
        &self.leases
    }

    /// Imports `repo` if its full scan is due
    pub async fn run(&self, repo: &RepositoryRef) -> Result<ImportOutcome, IndexError> {
        self.run_with_cancel(repo, &CancellationToken::new()).await
    }

    /// Like [`RepoImporter::run`], stopping at the next page boundary once
    /// `cancel` fires
    pub async fn run_with_cancel(
        &self,
        repo: &RepositoryRef,
        cancel: &CancellationToken,
    ) -> Result<ImportOutcome, IndexError> {
        if !repo.should_index() {
            log::info!("Skipping {}: indexing disabled", repo);
            return Ok(ImportOutcome::Disabled);
        }

        let start_time = Instant::now();
        let leased = self
            .leases
            .run_with_lease(repo, cancel, |lease, token| {
                self.import_refs(repo, lease.state().has_completed_scan(), token)
            })
            .await?;

        match leased {
            Leased::NotRequired => Ok(ImportOutcome::NotRequired),
            Leased::Completed(mut stats) => {
                stats.elapsed_time = start_time.elapsed();
                log::info!("✅ Imported {}: {}", repo, stats);
                Ok(ImportOutcome::Completed(stats))
            }
        }
    }

    /// Resolves the refs to scan, dropping refs without a target commit
    async fn resolve_refs(&self, repo: &RepositoryRef) -> Result<BTreeMap<String, String>, IndexError> {
        let mut refs = BTreeMap::new();

        for refs_path in repo.refs_paths() {
            let resolved = self
                .origin
                .resolve_refs(&repo.name, refs_path)
                .await
                .map_err(IndexError::Origin)?;

            for (name, tip) in resolved {
                if is_zero_hash(&tip) {
                    log::warn!("{}: ref {} has no target commit, skipping", repo, name);
                    continue;
                }
                refs.insert(name, tip);
            }
        }

        Ok(refs)
    }

    /// Walks every ref. Until a scan has completed, stored commits may sit
    /// above gaps left by an interrupted run, so only `seen` stops a walk.
    async fn import_refs(
        &self,
        repo: &RepositoryRef,
        completed_before: bool,
        cancel: CancellationToken,
    ) -> Result<ImportStats, IndexError> {
        let refs = self.resolve_refs(repo).await?;
        log::info!(
            "Importing {}: {} refs{}",
            repo,
            refs.len(),
            if completed_before { "" } else { " (first complete scan)" }
        );

        let walker = RefWalker {
            origin: self.origin.as_ref(),
            db: &self.db,
            repo,
            page_size: self.page_size,
            trust_store: completed_before,
        };

        // One identity per distinct commit of the run, across all refs.
        let mut seen: HashSet<CommitKey> = HashSet::new();
        let mut stats = ImportStats::default();

        for (ref_name, tip) in &refs {
            if !repo.is_ref_indexed(ref_name) {
                log::debug!("{}: ref {} excluded", repo, ref_name);
                stats.refs_skipped += 1;
                continue;
            }
            if cancel.is_cancelled() {
                return Err(IndexError::Cancelled);
            }

            let walked = walker.walk(tip, &mut seen, &cancel).await?;
            log::debug!(
                "{}: {} walked, {} new commits in {} pages",
                repo,
                ref_name,
                walked.discovered,
                walked.log_calls
            );
            stats.add_walk(&walked);
        }

        Ok(stats)
    }
}
