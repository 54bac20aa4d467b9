//! Import queue
//!
//! Requests are buffered in a bounded queue and drained by one sequential
//! worker. Outcomes are logged; callers are never notified.

use revindex_core::RepositoryRef;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::catalog::RepoCatalog;
use crate::error::{ControllerError, IndexError};
use crate::importer::{ImportOutcome, RepoImporter};

pub struct ImportController {
    importer: Arc<RepoImporter>,
    tx: mpsc::Sender<RepositoryRef>,
    rx: Mutex<mpsc::Receiver<RepositoryRef>>,
}

impl ImportController {
    pub fn new(importer: Arc<RepoImporter>, capacity: usize) -> Self {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        Self {
            importer,
            tx,
            rx: Mutex::new(rx),
        }
    }

    /// Queues a full import of `repo` without waiting for it
    pub fn index(&self, repo: RepositoryRef) -> Result<(), ControllerError> {
        self.tx.try_send(repo).map_err(|e| match e {
            mpsc::error::TrySendError::Full(repo) => {
                log::warn!("Import queue full, dropping {}", repo);
                ControllerError::QueueFull(repo.key())
            }
            mpsc::error::TrySendError::Closed(_) => ControllerError::Closed,
        })
    }

    /// Queues every indexable repository of the catalog. Returns how many
    /// were queued.
    pub fn sweep(&self, catalog: &RepoCatalog) -> usize {
        let mut queued = 0;
        for repo in catalog.repositories() {
            if !repo.should_index() {
                continue;
            }
            match self.index(repo) {
                Ok(()) => queued += 1,
                Err(ControllerError::QueueFull(_)) => continue,
                Err(ControllerError::Closed) => break,
            }
        }
        log::info!("🔄 Sweep queued {}/{} repositories", queued, catalog.len());
        queued
    }

    /// Drains the queue until `cancel` fires. Imports run one at a time;
    /// a failed import never stops the worker.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut rx = self.rx.lock().await;
        log::info!("Import worker started");

        loop {
            let repo = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                next = rx.recv() => match next {
                    Some(repo) => repo,
                    None => break,
                },
            };

            match self.importer.run_with_cancel(&repo, &cancel).await {
                Ok(ImportOutcome::Completed(_)) => {}
                Ok(ImportOutcome::NotRequired) => log::debug!("Import of {} not required", repo),
                Ok(ImportOutcome::Disabled) => log::info!("Import of {} disabled", repo),
                Err(IndexError::LeaseLost(key)) => log::info!("Import of {} abandoned: lease lost", key),
                Err(IndexError::Cancelled) => log::info!("Import of {} cancelled", repo),
                Err(e) => log::error!("❌ Import of {} failed: {}", repo, e),
            }
        }

        log::info!("Import worker stopped");
    }

    /// Sweeps the catalog every `interval` until `cancel` fires
    pub async fn run_sweeper(&self, catalog: Arc<RepoCatalog>, interval: Duration, cancel: CancellationToken) {
        let mut tick = tokio::time::interval(interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = tick.tick() => {
                    self.sweep(&catalog);
                }
            }
        }
    }
}
