//! Shared fixtures: an in-memory origin and store helpers

#![allow(dead_code)]

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use revindex_core::{refs::ref_matches, RawCommit, RepositoryRef, ScanPolicy};
use revindex_db::IndexDb;
use revindex_import::{LeaseCoordinator, LeaseSettings, LogPage, Origin, RepoImporter};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

pub const HOST: &str = "chromium.googlesource.com";
pub const PROJECT: &str = "chromium/src";

pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub fn repo() -> RepositoryRef {
    RepositoryRef::new(HOST, PROJECT)
}

/// Deterministic, never-zero commit hash
pub fn sha(n: u64) -> String {
    format!("{:040x}", 0x1000 + n)
}

pub fn open_db(tmp: &TempDir) -> Arc<IndexDb> {
    Arc::new(IndexDb::open(tmp.path()).unwrap())
}

pub fn settings(owner: &str, rescan: Option<Duration>) -> LeaseSettings {
    LeaseSettings {
        owner: owner.to_string(),
        policy: ScanPolicy {
            lease_duration: Duration::from_secs(600),
            rescan_interval: rescan,
        },
        renew_interval: Duration::from_secs(200),
    }
}

pub fn importer(origin: &Arc<FakeOrigin>, db: &Arc<IndexDb>, rescan: Option<Duration>, page_size: usize) -> RepoImporter {
    let leases = LeaseCoordinator::new(Arc::clone(db), settings("worker-1", rescan));
    RepoImporter::new(origin.clone(), Arc::clone(db), leases, page_size)
}

pub fn lease_settings(owner: &str, renew_interval: Duration) -> LeaseSettings {
    LeaseSettings {
        renew_interval,
        ..settings(owner, None)
    }
}

type LogHook = Box<dyn Fn(usize) + Send>;

/// In-memory origin. `log` lists commits depth-first from the requested tip,
/// following parents in order, and pages with a decimal offset token.
#[derive(Default)]
pub struct FakeOrigin {
    commits: Mutex<HashMap<String, RawCommit>>,
    refs: Mutex<BTreeMap<String, String>>,
    failing: Mutex<HashSet<String>>,
    fail_paged: AtomicBool,
    log_delay: Mutex<Duration>,
    on_log: Mutex<Option<LogHook>>,
    pub log_calls: AtomicUsize,
    pub refs_calls: AtomicUsize,
}

impl FakeOrigin {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn add_commit(&self, hash: &str, parents: &[&str], message: &str) {
        self.commits.lock().unwrap().insert(
            hash.to_string(),
            RawCommit {
                hash: hash.to_string(),
                parents: parents.iter().map(|p| p.to_string()).collect(),
                message: message.to_string(),
            },
        );
    }

    /// Appends `len` commits numbered `first..first + len` on top of
    /// `parent`. Each carries a `refs/heads/main` position equal to its
    /// number. Returns the hashes, oldest first.
    pub fn add_chain(&self, first: u64, len: u64, parent: Option<&str>) -> Vec<String> {
        let mut hashes = Vec::with_capacity(len as usize);
        let mut prev = parent.map(str::to_string);
        for n in first..first + len {
            let hash = sha(n);
            let message = format!("Commit {}\n\nCr-Commit-Position: refs/heads/main@{{#{}}}", n, n);
            let parents: Vec<&str> = prev.iter().map(String::as_str).collect();
            self.add_commit(&hash, &parents, &message);
            prev = Some(hash.clone());
            hashes.push(hash);
        }
        hashes
    }

    pub fn set_ref(&self, name: &str, tip: &str) {
        self.refs.lock().unwrap().insert(name.to_string(), tip.to_string());
    }

    pub fn fail_log(&self, committish: &str) {
        self.failing.lock().unwrap().insert(committish.to_string());
    }

    /// Fails every `log` request past the first page
    pub fn fail_paged_requests(&self) {
        self.fail_paged.store(true, Ordering::SeqCst);
    }

    pub fn heal(&self) {
        self.failing.lock().unwrap().clear();
        self.fail_paged.store(false, Ordering::SeqCst);
    }

    /// Every `log` request waits `delay` before answering
    pub fn set_log_delay(&self, delay: Duration) {
        *self.log_delay.lock().unwrap() = delay;
    }

    /// Runs `hook` with the 1-based call number at the start of every `log`
    pub fn on_log<F: Fn(usize) + Send + 'static>(&self, hook: F) {
        *self.on_log.lock().unwrap() = Some(Box::new(hook));
    }

    pub fn log_calls(&self) -> usize {
        self.log_calls.load(Ordering::SeqCst)
    }

    fn history(&self, tip: &str) -> Result<Vec<RawCommit>> {
        let commits = self.commits.lock().unwrap();
        if !commits.contains_key(tip) {
            return Err(anyhow!("unknown revision {}", tip));
        }

        let mut order = Vec::new();
        let mut visited = HashSet::new();
        let mut stack = vec![tip.to_string()];
        while let Some(hash) = stack.pop() {
            if !visited.insert(hash.clone()) {
                continue;
            }
            let Some(commit) = commits.get(&hash) else {
                continue;
            };
            for parent in commit.parents.iter().rev() {
                stack.push(parent.clone());
            }
            order.push(commit.clone());
        }
        Ok(order)
    }
}

#[async_trait]
impl Origin for FakeOrigin {
    async fn resolve_refs(&self, _project: &str, refs_path: &str) -> Result<BTreeMap<String, String>> {
        self.refs_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .refs
            .lock()
            .unwrap()
            .iter()
            .filter(|(name, _)| ref_matches(refs_path, name))
            .map(|(name, tip)| (name.clone(), tip.clone()))
            .collect())
    }

    async fn log(&self, _project: &str, committish: &str, page_token: Option<&str>, page_size: usize) -> Result<LogPage> {
        let call = self.log_calls.fetch_add(1, Ordering::SeqCst) + 1;
        {
            let hook = self.on_log.lock().unwrap();
            if let Some(hook) = hook.as_ref() {
                hook(call);
            }
        }
        let delay = *self.log_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if self.failing.lock().unwrap().contains(committish) {
            return Err(anyhow!("origin unavailable"));
        }
        if page_token.is_some() && self.fail_paged.load(Ordering::SeqCst) {
            return Err(anyhow!("origin unavailable past the first page"));
        }

        let history = self.history(committish)?;
        let offset = page_token.map(str::parse::<usize>).transpose()?.unwrap_or(0);
        let end = (offset + page_size).min(history.len());
        let commits = history.get(offset..end).unwrap_or_default().to_vec();
        let next_page_token = (end < history.len()).then(|| end.to_string());

        Ok(LogPage {
            commits,
            next_page_token,
        })
    }
}
