//! Core data models for the commit index

use data_encoding::HEXLOWER;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fmt;

use crate::position::parse_position;
use crate::refs::{ref_matches, DEFAULT_REFS_PATH};

/// Whether a repository takes part in indexing at all
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum IndexingPolicy {
    #[default]
    Index,
    DoNotIndex,
}

/// A crawlable repository as configured in the catalog
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RepositoryRef {
    /// Origin host (e.g., "chromium.googlesource.com")
    pub host: String,

    /// Repository name on the host (e.g., "chromium/src")
    pub name: String,

    /// Ref paths to scan; empty means `refs/heads`
    #[serde(default)]
    pub refs: Vec<String>,

    /// Ref paths never indexed, even when also included
    #[serde(default)]
    pub exclude_refs: Vec<String>,

    #[serde(default)]
    pub policy: IndexingPolicy,
}

impl RepositoryRef {
    /// Creates an indexable repository scanning the default refs path
    pub fn new(host: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            name: name.into(),
            refs: Vec::new(),
            exclude_refs: Vec::new(),
            policy: IndexingPolicy::Index,
        }
    }

    pub fn with_refs<I, S>(mut self, refs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.refs = refs.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_exclude_refs<I, S>(mut self, refs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude_refs = refs.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_policy(mut self, policy: IndexingPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Generates a key for lease documents
    /// Format: "host/name"
    pub fn key(&self) -> String {
        format!("{}/{}", self.host, self.name)
    }

    pub fn should_index(&self) -> bool {
        self.policy == IndexingPolicy::Index
    }

    /// Ref paths whose refs are resolved during a full scan
    pub fn refs_paths(&self) -> Vec<&str> {
        if self.refs.is_empty() {
            vec![DEFAULT_REFS_PATH]
        } else {
            self.refs.iter().map(String::as_str).collect()
        }
    }

    /// Checks a ref against the include and exclude lists.
    /// Exclusion wins over inclusion.
    pub fn is_ref_indexed(&self, ref_name: &str) -> bool {
        if self.exclude_refs.iter().any(|p| ref_matches(p, ref_name)) {
            return false;
        }
        self.refs_paths().into_iter().any(|p| ref_matches(p, ref_name))
    }
}

impl fmt::Display for RepositoryRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.host, self.name)
    }
}

/// A commit as returned by the origin's log API
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RawCommit {
    pub hash: String,
    pub parents: Vec<String>,
    pub message: String,
}

/// Position of a commit on its branch, parsed from a message footer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommitPosition {
    /// Ref path, or svn URL for legacy positions
    pub name: String,
    pub number: u64,
}

/// Fixed-size commit identity; one per distinct `(host, repository, hash)`
pub type CommitKey = [u8; 32];

/// Computes the identity of a commit within a repository
pub fn commit_key(host: &str, repository: &str, hash: &str) -> CommitKey {
    let mut hasher = Sha256::new();
    hasher.update(host.as_bytes());
    hasher.update(b"\n");
    hasher.update(repository.as_bytes());
    hasher.update(b"\n");
    hasher.update(hash.as_bytes());
    hasher.finalize().into()
}

/// Document id of a commit: hex encoding of its [`CommitKey`]
pub fn commit_id(host: &str, repository: &str, hash: &str) -> String {
    HEXLOWER.encode(&commit_key(host, repository, hash))
}

/// Commit entry in the database
///
/// Created once per distinct `(host, repository, hash)` and never updated.
/// `position_ref`/`position_number` are either both empty/zero or both set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IndexedCommit {
    pub id: String,
    pub host: String,
    pub repository: String,
    pub commit_hash: String,
    pub commit_message: String,
    pub position_ref: String,
    pub position_number: u64,
}

impl IndexedCommit {
    /// Builds the document for a commit of `repo`, annotating its position.
    ///
    /// A missing or malformed position footer is logged and leaves the
    /// position fields empty.
    pub fn from_raw(repo: &RepositoryRef, raw: &RawCommit) -> Self {
        let (position_ref, position_number) = match parse_position(&raw.message) {
            Ok(pos) => (pos.name, pos.number),
            Err(e) => {
                log::debug!("{} {}: {}", repo, raw.hash, e);
                (String::new(), 0)
            }
        };

        Self {
            id: commit_id(&repo.host, &repo.name, &raw.hash),
            host: repo.host.clone(),
            repository: repo.name.clone(),
            commit_hash: raw.hash.clone(),
            commit_message: raw.message.clone(),
            position_ref,
            position_number,
        }
    }

    pub fn key(&self) -> CommitKey {
        commit_key(&self.host, &self.repository, &self.commit_hash)
    }

    pub fn position(&self) -> Option<CommitPosition> {
        if self.position_ref.is_empty() {
            return None;
        }
        Some(CommitPosition {
            name: self.position_ref.clone(),
            number: self.position_number,
        })
    }
}

impl fmt::Display for IndexedCommit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let short = self.commit_hash.get(..12).unwrap_or(&self.commit_hash);
        write!(f, "{}/{} @ {}", self.host, self.repository, short)?;
        if let Some(pos) = self.position() {
            write!(f, " ({}@{{#{}}})", pos.name, pos.number)?;
        }
        Ok(())
    }
}

/// Kind of ref movement carried by a notification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum UpdateType {
    Update,
    Create,
    Delete,
    FastForward,
}

/// One ref movement from `old_hash` to `new_hash`
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RefUpdate {
    pub old_hash: String,
    pub new_hash: String,
    pub update_type: UpdateType,
}

impl RefUpdate {
    /// A ref update whose new target is absent removes the ref
    pub fn is_deletion(&self) -> bool {
        self.update_type == UpdateType::Delete || is_zero_hash(&self.new_hash)
    }
}

/// Ref movements pushed to one repository
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RefUpdateEvent {
    pub repo_name: String,
    pub ref_updates: BTreeMap<String, RefUpdate>,
}

/// Empty and all-zero hashes both mean "no commit"
pub fn is_zero_hash(hash: &str) -> bool {
    hash.chars().all(|c| c == '0')
}
