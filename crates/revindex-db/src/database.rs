//! Commit document storage and lookups

use anyhow::{anyhow, Context, Result};
use revindex_core::IndexedCommit;
use serde::{Deserialize, Serialize};
use sled::transaction::ConflictableTransactionError;
use sled::{Db, Transactional};
use std::path::Path;

// ---------------------------------------------------------------------------
// Compact binary storage format
// ---------------------------------------------------------------------------

/// Internal representation stored in sled. The document id is the tree key,
/// so it is not repeated in the value.
#[derive(Serialize, Deserialize)]
struct StoredCommit {
    host: String,
    repository: String,
    commit_hash: String,
    commit_message: String,
    position_ref: String,
    position_number: u64,
}

/// Serialize an `IndexedCommit` into compact binary bytes.
fn pack(commit: &IndexedCommit) -> Result<Vec<u8>> {
    let stored = StoredCommit {
        host: commit.host.clone(),
        repository: commit.repository.clone(),
        commit_hash: commit.commit_hash.clone(),
        commit_message: commit.commit_message.clone(),
        position_ref: commit.position_ref.clone(),
        position_number: commit.position_number,
    };
    bincode::serialize(&stored).context("Failed to serialize IndexedCommit")
}

/// Deserialize an `IndexedCommit` stored under `id`.
fn unpack(id: &[u8], bytes: &[u8]) -> Result<IndexedCommit> {
    let stored: StoredCommit =
        bincode::deserialize(bytes).context("Failed to deserialize IndexedCommit")?;
    Ok(IndexedCommit {
        id: String::from_utf8_lossy(id).into_owned(),
        host: stored.host,
        repository: stored.repository,
        commit_hash: stored.commit_hash,
        commit_message: stored.commit_message,
        position_ref: stored.position_ref,
        position_number: stored.position_number,
    })
}

/// Secondary index key: "hash\0id"
fn hash_key(hash: &str, id: &str) -> Vec<u8> {
    let mut key = hash_prefix(hash);
    key.extend_from_slice(id.as_bytes());
    key
}

fn hash_prefix(hash: &str) -> Vec<u8> {
    let mut key = hash.as_bytes().to_vec();
    key.push(0);
    key
}

/// Secondary index key: "position_ref\0<number, big endian>id"
fn position_key(position_ref: &str, number: u64, id: &str) -> Vec<u8> {
    let mut key = position_prefix(position_ref, number);
    key.extend_from_slice(id.as_bytes());
    key
}

fn position_prefix(position_ref: &str, number: u64) -> Vec<u8> {
    let mut key = position_ref.as_bytes().to_vec();
    key.push(0);
    key.extend_from_slice(&number.to_be_bytes());
    key
}

/// A commit ready to be written: every key and value precomputed so the
/// transaction body cannot fail on encoding.
struct CommitRow {
    id: String,
    value: Vec<u8>,
    hash_key: Vec<u8>,
    position_key: Option<Vec<u8>>,
}

/// Main structure managing the database
pub struct IndexDb {
    /// Commit documents (key: commit id)
    pub(crate) commits: sled::Tree,

    /// Lookup by commit hash across repositories
    pub(crate) commits_by_hash: sled::Tree,

    /// Lookup by commit position
    pub(crate) commits_by_position: sled::Tree,

    /// Full-scan lease documents (key: "host/name")
    pub(crate) leases: sled::Tree,

    /// Sled database instance
    db: Db,
}

impl IndexDb {
    /// Opens or creates a new database at the specified location
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let db = sled::open(path.as_ref())
            .with_context(|| format!("Failed to open database at {:?}", path.as_ref()))?;

        let commits = db.open_tree("commits").context("Failed to open commits tree")?;
        let commits_by_hash = db
            .open_tree("commits_by_hash")
            .context("Failed to open commits_by_hash tree")?;
        let commits_by_position = db
            .open_tree("commits_by_position")
            .context("Failed to open commits_by_position tree")?;
        let leases = db.open_tree("leases").context("Failed to open leases tree")?;

        Ok(Self {
            commits,
            commits_by_hash,
            commits_by_position,
            leases,
            db,
        })
    }

    /// Stores a batch of commits atomically, skipping ids that already exist.
    ///
    /// Returns the number of newly created documents. Re-storing a commit is
    /// a no-op, so batches may be retried freely.
    pub fn put_commits(&self, commits: &[IndexedCommit]) -> Result<usize> {
        if commits.is_empty() {
            return Ok(0);
        }

        let rows = commits
            .iter()
            .map(|c| {
                Ok(CommitRow {
                    id: c.id.clone(),
                    value: pack(c)?,
                    hash_key: hash_key(&c.commit_hash, &c.id),
                    position_key: (!c.position_ref.is_empty())
                        .then(|| position_key(&c.position_ref, c.position_number, &c.id)),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let created = (&self.commits, &self.commits_by_hash, &self.commits_by_position)
            .transaction(|(commits, by_hash, by_position)| {
                let mut created = 0;
                for row in &rows {
                    if commits.get(row.id.as_bytes())?.is_some() {
                        continue;
                    }
                    commits.insert(row.id.as_bytes(), row.value.clone())?;
                    by_hash.insert(row.hash_key.clone(), Vec::<u8>::new())?;
                    if let Some(key) = &row.position_key {
                        by_position.insert(key.clone(), Vec::<u8>::new())?;
                    }
                    created += 1;
                }
                Ok::<usize, ConflictableTransactionError<String>>(created)
            })
            .map_err(|e| anyhow!("Failed to store commit batch: {}", e))?;

        log::debug!("Stored {} of {} commits", created, commits.len());
        Ok(created)
    }

    /// Checks whether a commit document exists
    pub fn commit_exists(&self, id: &str) -> Result<bool> {
        self.commits
            .contains_key(id.as_bytes())
            .context("Failed to read commits tree")
    }

    /// Number of leading `ids` that are not stored yet, reading no further
    /// than the first stored one
    pub fn count_unstored_prefix<S: AsRef<str>>(&self, ids: &[S]) -> Result<usize> {
        for (i, id) in ids.iter().enumerate() {
            if self.commit_exists(id.as_ref())? {
                return Ok(i);
            }
        }
        Ok(ids.len())
    }

    /// Retrieves a commit by document id
    pub fn get_commit(&self, id: &str) -> Result<Option<IndexedCommit>> {
        match self.commits.get(id.as_bytes())? {
            Some(bytes) => Ok(Some(unpack(id.as_bytes(), &bytes)?)),
            None => Ok(None),
        }
    }

    /// Retrieves every indexed copy of a commit hash, one per repository
    pub fn find_by_hash(&self, hash: &str) -> Result<Vec<IndexedCommit>> {
        let prefix = hash_prefix(hash);
        self.resolve_index(&self.commits_by_hash, &prefix)
    }

    /// Retrieves the commits carrying position `number` on `position_ref`
    pub fn find_by_position(&self, position_ref: &str, number: u64) -> Result<Vec<IndexedCommit>> {
        let prefix = position_prefix(position_ref, number);
        self.resolve_index(&self.commits_by_position, &prefix)
    }

    fn resolve_index(&self, index: &sled::Tree, prefix: &[u8]) -> Result<Vec<IndexedCommit>> {
        let mut results = Vec::new();

        for item in index.scan_prefix(prefix).keys() {
            let key = item.context("Failed to read from database")?;
            let id = &key[prefix.len()..];
            match self.commits.get(id)? {
                Some(bytes) => results.push(unpack(id, &bytes)?),
                None => log::warn!(
                    "Dangling index entry for commit {}",
                    String::from_utf8_lossy(id)
                ),
            }
        }

        Ok(results)
    }

    /// Returns the number of stored commits
    pub fn commit_count(&self) -> usize {
        self.commits.len()
    }

    /// Flushes all pending operations to disk
    pub fn flush(&self) -> Result<()> {
        self.db.flush().context("Failed to flush database")?;
        Ok(())
    }
}
