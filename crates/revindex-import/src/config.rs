//! Indexer configuration

use revindex_core::ScanPolicy;
use serde::Deserialize;
use std::time::Duration;

use crate::lease::LeaseSettings;

/// Tunables of the indexing core. Every field has a default, so an empty
/// document deserializes to [`IndexerConfig::default`].
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct IndexerConfig {
    /// Lease owner identity of this process
    pub owner: String,

    /// Number of commits requested per log page
    pub page_size: usize,

    /// A lease not renewed within this many seconds may be taken over
    pub lease_duration_secs: u64,

    /// Renewal period; a third of the lease duration when unset
    pub lease_renew_interval_secs: Option<u64>,

    /// Re-run full scans this long after the last completed one
    pub rescan_interval_secs: Option<u64>,

    /// Capacity of the import queue
    pub queue_capacity: usize,

    /// Period of the catalog sweep
    pub sweep_interval_secs: u64,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            owner: default_owner(),
            page_size: 1000,
            lease_duration_secs: 600,
            lease_renew_interval_secs: None,
            rescan_interval_secs: None,
            queue_capacity: 4096,
            sweep_interval_secs: 3600,
        }
    }
}

impl IndexerConfig {
    pub fn lease_duration(&self) -> Duration {
        Duration::from_secs(self.lease_duration_secs)
    }

    pub fn lease_renew_interval(&self) -> Duration {
        let secs = self
            .lease_renew_interval_secs
            .unwrap_or(self.lease_duration_secs / 3);
        Duration::from_secs(secs.max(1))
    }

    pub fn scan_policy(&self) -> ScanPolicy {
        ScanPolicy {
            lease_duration: self.lease_duration(),
            rescan_interval: self.rescan_interval_secs.map(Duration::from_secs),
        }
    }

    pub fn lease_settings(&self) -> LeaseSettings {
        LeaseSettings {
            owner: self.owner.clone(),
            policy: self.scan_policy(),
            renew_interval: self.lease_renew_interval(),
        }
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs.max(1))
    }
}

/// "<hostname>-<pid>", falling back to "localhost" without `$HOSTNAME`
pub fn default_owner() -> String {
    let host = std::env::var("HOSTNAME")
        .ok()
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "localhost".to_string());
    format!("{}-{}", host, std::process::id())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config: IndexerConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.page_size, 1000);
        assert_eq!(config.lease_renew_interval(), Duration::from_secs(200));
        assert_eq!(config.scan_policy().rescan_interval, None);
        assert!(config.owner.ends_with(&std::process::id().to_string()));
    }

    #[test]
    fn test_explicit_intervals() {
        let config: IndexerConfig = serde_json::from_str(
            r#"{"owner": "worker-1", "lease_duration_secs": 60, "lease_renew_interval_secs": 5, "rescan_interval_secs": 86400}"#,
        )
        .unwrap();
        let settings = config.lease_settings();
        assert_eq!(settings.owner, "worker-1");
        assert_eq!(settings.renew_interval, Duration::from_secs(5));
        assert_eq!(settings.policy.lease_duration, Duration::from_secs(60));
        assert_eq!(settings.policy.rescan_interval, Some(Duration::from_secs(86400)));
    }
}
