//! Persisted full-scan lease state of a repository

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// When a full scan of a repository is due
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanPolicy {
    /// A lease not renewed within this window is considered abandoned
    pub lease_duration: Duration,

    /// Re-scan this long after the last completed run; `None` scans only
    /// until the first run completes
    pub rescan_interval: Option<Duration>,
}

/// Lease document, one per repository
///
/// `lease_start_ms` is non-zero exactly while some owner believes it is
/// running a full scan. Timestamps are Unix epoch milliseconds, 0 = unset.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RepositoryLeaseState {
    pub owner: String,
    pub lease_start_ms: i64,
    pub last_completed_ms: i64,

    /// Bumped by every acquisition and renewal, so that any foreign write
    /// changes the document
    pub generation: u64,
}

impl RepositoryLeaseState {
    pub fn is_leased(&self) -> bool {
        self.lease_start_ms != 0
    }

    /// Lease held and renewed within `lease_duration`
    pub fn is_lease_fresh(&self, now_ms: i64, lease_duration: Duration) -> bool {
        self.is_leased() && now_ms.saturating_sub(self.lease_start_ms) < duration_ms(lease_duration)
    }

    pub fn is_scan_required(&self, now_ms: i64, policy: &ScanPolicy) -> bool {
        if self.is_lease_fresh(now_ms, policy.lease_duration) {
            return false;
        }
        if self.last_completed_ms == 0 {
            return true;
        }
        match policy.rescan_interval {
            Some(interval) => {
                now_ms.saturating_sub(self.last_completed_ms) >= duration_ms(interval)
            }
            None => false,
        }
    }

    /// State after `owner` takes the lease at `now_ms`
    pub fn start_lease(&self, owner: &str, now_ms: i64) -> Self {
        Self {
            owner: owner.to_string(),
            lease_start_ms: now_ms,
            last_completed_ms: self.last_completed_ms,
            generation: self.generation.wrapping_add(1),
        }
    }

    /// State after the current owner renews at `now_ms`
    pub fn heartbeat(&self, now_ms: i64) -> Self {
        Self {
            lease_start_ms: now_ms,
            generation: self.generation.wrapping_add(1),
            ..self.clone()
        }
    }

    /// State after a successful run finishing at `now_ms`
    pub fn complete(&self, now_ms: i64) -> Self {
        Self {
            owner: String::new(),
            lease_start_ms: 0,
            last_completed_ms: now_ms,
            generation: self.generation,
        }
    }

    /// Some run walked every ref to the root. Until then an already-stored
    /// commit says nothing about its ancestors.
    pub fn has_completed_scan(&self) -> bool {
        self.last_completed_ms != 0
    }

    /// State after a partial write left a gap in stored history: the next
    /// full scan is due and must not stop at stored commits
    pub fn require_full_scan(&self) -> Self {
        Self {
            last_completed_ms: 0,
            generation: self.generation.wrapping_add(1),
            ..self.clone()
        }
    }
}

fn duration_ms(d: Duration) -> i64 {
    i64::try_from(d.as_millis()).unwrap_or(i64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINUTE: i64 = 60_000;

    fn policy(rescan: Option<Duration>) -> ScanPolicy {
        ScanPolicy {
            lease_duration: Duration::from_secs(600),
            rescan_interval: rescan,
        }
    }

    #[test]
    fn test_fresh_state_requires_scan() {
        let state = RepositoryLeaseState::default();
        assert!(state.is_scan_required(1_000 * MINUTE, &policy(None)));
    }

    #[test]
    fn test_fresh_lease_blocks_scan() {
        let state = RepositoryLeaseState::default().start_lease("a", 100 * MINUTE);
        assert!(state.is_leased());
        assert!(!state.is_scan_required(105 * MINUTE, &policy(None)));
    }

    #[test]
    fn test_stale_lease_allows_takeover() {
        let state = RepositoryLeaseState::default().start_lease("a", 100 * MINUTE);
        assert!(state.is_scan_required(111 * MINUTE, &policy(None)));
    }

    #[test]
    fn test_completed_scan_respects_rescan_interval() {
        let state = RepositoryLeaseState::default()
            .start_lease("a", 100 * MINUTE)
            .complete(110 * MINUTE);
        assert!(!state.is_leased());

        assert!(!state.is_scan_required(10_000 * MINUTE, &policy(None)));

        let hourly = policy(Some(Duration::from_secs(3600)));
        assert!(!state.is_scan_required(130 * MINUTE, &hourly));
        assert!(state.is_scan_required(170 * MINUTE, &hourly));
    }

    #[test]
    fn test_heartbeat_changes_generation() {
        let state = RepositoryLeaseState::default().start_lease("a", MINUTE);
        let renewed = state.heartbeat(2 * MINUTE);
        assert_ne!(state, renewed);
        assert_eq!(renewed.owner, "a");
        assert_eq!(renewed.generation, state.generation + 1);
    }

    #[test]
    fn test_require_full_scan_forgets_completion() {
        let completed = RepositoryLeaseState::default()
            .start_lease("a", MINUTE)
            .complete(2 * MINUTE);
        assert!(completed.has_completed_scan());

        let due = completed.require_full_scan();
        assert!(!due.has_completed_scan());
        assert_ne!(due, completed);
        assert!(due.is_scan_required(3 * MINUTE, &policy(None)));
    }
}
