//! Full-scan lease coordination
//!
//! A lease is a per-repository document in the shared store. Acquisition,
//! renewal and release are single-document transactions; renewal compares
//! the whole stored state with the copy captured by this owner, so any
//! foreign write is detected as a lost lease.

use anyhow::Result;
use revindex_core::{RepositoryLeaseState, RepositoryRef, ScanPolicy};
use revindex_db::{IndexDb, LeaseWrite};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::error::IndexError;
use crate::formatting::format_unix_millis;

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Lease parameters of one worker process
#[derive(Debug, Clone)]
pub struct LeaseSettings {
    /// Identity written into lease documents
    pub owner: String,
    pub policy: ScanPolicy,
    pub renew_interval: Duration,
}

/// A granted lease: the state this owner last wrote
#[derive(Debug, Clone)]
pub struct Lease {
    repo_key: String,
    state: RepositoryLeaseState,
}

impl Lease {
    pub fn repo_key(&self) -> &str {
        &self.repo_key
    }

    pub fn state(&self) -> &RepositoryLeaseState {
        &self.state
    }
}

#[derive(Debug)]
pub enum Acquisition {
    Granted(Lease),
    NotRequired,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Renewal {
    Renewed,
    LostLease,
}

/// Result of running work under a lease
#[derive(Debug)]
pub enum Leased<T> {
    Completed(T),
    NotRequired,
}

/// What the renewal task hands back when it stops
struct RenewalReport {
    lease: Lease,
    lost: bool,
}

#[derive(Clone)]
pub struct LeaseCoordinator {
    db: Arc<IndexDb>,
    settings: Arc<LeaseSettings>,
}

impl LeaseCoordinator {
    pub fn new(db: Arc<IndexDb>, settings: LeaseSettings) -> Self {
        Self {
            db,
            settings: Arc::new(settings),
        }
    }

    pub fn owner(&self) -> &str {
        &self.settings.owner
    }

    /// Reads the persisted lease state of a repository
    pub fn state(&self, repo: &RepositoryRef) -> Result<Option<RepositoryLeaseState>> {
        self.db.lease_state(&repo.key())
    }

    /// Takes the full-scan lease of `repo` if a scan is due.
    pub fn acquire(&self, repo: &RepositoryRef) -> Result<Acquisition> {
        let now = now_ms();
        let owner = self.settings.owner.as_str();
        let policy = self.settings.policy;
        let key = repo.key();

        let granted = self.db.update_lease(&key, |current| {
            let state = current.cloned().unwrap_or_default();
            if !state.is_scan_required(now, &policy) {
                return (LeaseWrite::Keep, Err(state));
            }
            let next = state.start_lease(owner, now);
            (LeaseWrite::Put(next.clone()), Ok(next))
        })?;

        match granted {
            Ok(state) => {
                log::info!("Acquired full-scan lease on {} (generation {})", key, state.generation);
                Ok(Acquisition::Granted(Lease {
                    repo_key: key,
                    state,
                }))
            }
            Err(state) => {
                log::debug!(
                    "Full scan of {} not required (owner {:?}, leased {}, last completed {})",
                    key,
                    state.owner,
                    format_unix_millis(state.lease_start_ms),
                    format_unix_millis(state.last_completed_ms)
                );
                Ok(Acquisition::NotRequired)
            }
        }
    }

    /// Extends a held lease, unless someone else wrote the document since.
    pub fn renew(&self, lease: &mut Lease) -> Result<Renewal> {
        let now = now_ms();
        let held = &lease.state;

        let renewed = self.db.update_lease(&lease.repo_key, |current| match current {
            Some(state) if state == held => {
                let next = state.heartbeat(now);
                (LeaseWrite::Put(next.clone()), Some(next))
            }
            _ => (LeaseWrite::Keep, None),
        })?;

        match renewed {
            Some(state) => {
                lease.state = state;
                Ok(Renewal::Renewed)
            }
            None => Ok(Renewal::LostLease),
        }
    }

    /// Ends a lease. A successful run records its completion time. A failed
    /// run deletes the document, completion included, so the next attempt
    /// is due at once and walks every ref to the root. A lease already taken
    /// over by another owner is left untouched.
    pub fn release(&self, lease: Lease, success: bool) -> Result<()> {
        let now = now_ms();
        let held = &lease.state;

        let released = self.db.update_lease(&lease.repo_key, |current| match current {
            Some(state) if state == held => {
                if success {
                    (LeaseWrite::Put(state.complete(now)), true)
                } else {
                    (LeaseWrite::Delete, true)
                }
            }
            _ => (LeaseWrite::Keep, false),
        })?;

        if released {
            log::debug!("Released lease on {} (success: {})", lease.repo_key, success);
        } else {
            log::warn!("Lease on {} changed hands before release", lease.repo_key);
        }
        Ok(())
    }

    /// Runs `work` while holding the full-scan lease of `repo`.
    ///
    /// The lease is renewed in the background every `renew_interval`. When a
    /// renewal finds the lease taken over, the token passed to `work` is
    /// cancelled and the run ends with [`IndexError::LeaseLost`]. `parent`
    /// cancellation also reaches `work` through the same token. `work` also
    /// sees the granted lease, to tell whether a full scan ever completed.
    pub async fn run_with_lease<T, F, Fut>(
        &self,
        repo: &RepositoryRef,
        parent: &CancellationToken,
        work: F,
    ) -> Result<Leased<T>, IndexError>
    where
        F: FnOnce(&Lease, CancellationToken) -> Fut,
        Fut: Future<Output = Result<T, IndexError>>,
    {
        let target = repo.clone();
        let acquired = self
            .blocking(move |leases| leases.acquire(&target))
            .await
            .map_err(IndexError::Store)?;
        let lease = match acquired {
            Acquisition::Granted(lease) => lease,
            Acquisition::NotRequired => return Ok(Leased::NotRequired),
        };

        let cancel = parent.child_token();
        let work = work(&lease, cancel.clone());
        let (stop_tx, stop_rx) = oneshot::channel();
        let renewal = tokio::spawn(self.clone().renew_until_stopped(lease, cancel, stop_rx));

        let result = work.await;

        let _ = stop_tx.send(());
        let RenewalReport { lease, lost } = renewal.await?;

        if lost {
            return Err(IndexError::LeaseLost(lease.repo_key));
        }

        let success = result.is_ok();
        let released = self.blocking(move |leases| leases.release(lease, success)).await;

        match result {
            Ok(value) => {
                released.map_err(IndexError::Store)?;
                Ok(Leased::Completed(value))
            }
            Err(e) => {
                if let Err(release_err) = released {
                    log::warn!("Failed to release lease on {}: {:#}", repo, release_err);
                }
                Err(e)
            }
        }
    }

    /// Runs a store transaction off the async runtime
    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&LeaseCoordinator) -> Result<T> + Send + 'static,
    {
        let leases = self.clone();
        tokio::task::spawn_blocking(move || f(&leases)).await?
    }

    async fn renew_until_stopped(
        self,
        mut lease: Lease,
        cancel: CancellationToken,
        mut stop: oneshot::Receiver<()>,
    ) -> RenewalReport {
        let mut tick = tokio::time::interval(self.settings.renew_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately.
        tick.tick().await;

        loop {
            tokio::select! {
                biased;
                _ = &mut stop => return RenewalReport { lease, lost: false },
                _ = tick.tick() => {
                    let renewed = self.renew_blocking(&lease).await;
                    match renewed {
                        Ok((renewed, Renewal::Renewed)) => {
                            lease = renewed;
                            log::debug!("Renewed lease on {} (generation {})", lease.repo_key, lease.state.generation);
                        }
                        Ok((_, Renewal::LostLease)) => {
                            log::warn!("Lost lease on {}, stopping import", lease.repo_key);
                            cancel.cancel();
                            return RenewalReport { lease, lost: true };
                        }
                        Err(e) => {
                            log::warn!("Failed to renew lease on {}: {:#}", lease.repo_key, e);
                        }
                    }
                }
            }
        }
    }

    async fn renew_blocking(&self, lease: &Lease) -> Result<(Lease, Renewal)> {
        let mut held = lease.clone();
        self.blocking(move |leases| {
            let renewal = leases.renew(&mut held)?;
            Ok((held, renewal))
        })
        .await
    }
}
