//! Tests for database functionality

use anyhow::Result;
use revindex_core::{IndexedCommit, RawCommit, RepositoryLeaseState, RepositoryRef};
use revindex_db::{IndexDb, LeaseWrite};
use std::sync::{Arc, Barrier};
use tempfile::TempDir;

// ── fixtures ─────────────────────────────────────────────────────────────────

const SHA1: &str = "abc1234567890abcdef01234567890abcdef0123";
const SHA2: &str = "def1234567890abcdef01234567890abcdef0456";

fn repo(name: &str) -> RepositoryRef {
    RepositoryRef::new("chromium.googlesource.com", name)
}

fn commit(repo_name: &str, sha: &str, message: &str) -> IndexedCommit {
    IndexedCommit::from_raw(
        &repo(repo_name),
        &RawCommit {
            hash: sha.to_string(),
            parents: vec![],
            message: message.to_string(),
        },
    )
}

// ── commits ──────────────────────────────────────────────────────────────────

#[test]
fn test_put_and_get_commit() -> Result<()> {
    let tmp = TempDir::new()?;
    let db = IndexDb::open(tmp.path())?;

    let c = commit("chromium/src", SHA1, "Subject\n\nCr-Commit-Position: refs/heads/main@{#7}");
    assert_eq!(db.put_commits(&[c.clone()])?, 1);

    assert!(db.commit_exists(&c.id)?);
    assert_eq!(db.get_commit(&c.id)?, Some(c));
    assert_eq!(db.commit_count(), 1);
    Ok(())
}

#[test]
fn test_get_nonexistent_returns_none() -> Result<()> {
    let tmp = TempDir::new()?;
    let db = IndexDb::open(tmp.path())?;
    assert_eq!(db.get_commit("missing")?, None);
    assert!(!db.commit_exists("missing")?);
    Ok(())
}

#[test]
fn test_put_commits_is_idempotent() -> Result<()> {
    let tmp = TempDir::new()?;
    let db = IndexDb::open(tmp.path())?;

    let batch = vec![commit("a", SHA1, "one"), commit("a", SHA2, "two")];
    assert_eq!(db.put_commits(&batch)?, 2);
    assert_eq!(db.put_commits(&batch)?, 0);
    assert_eq!(db.put_commits(&[])?, 0);
    assert_eq!(db.commit_count(), 2);
    Ok(())
}

#[test]
fn test_count_unstored_prefix() -> Result<()> {
    let tmp = TempDir::new()?;
    let db = IndexDb::open(tmp.path())?;
    let stored = commit("chromium/src", SHA2, "Stored");
    db.put_commits(std::slice::from_ref(&stored))?;

    let ids = ["missing-1".to_string(), "missing-2".to_string(), stored.id.clone(), "missing-3".to_string()];
    assert_eq!(db.count_unstored_prefix(&ids)?, 2);
    assert_eq!(db.count_unstored_prefix(&ids[3..])?, 1);
    assert_eq!(db.count_unstored_prefix::<String>(&[])?, 0);
    Ok(())
}

#[test]
fn test_same_hash_in_two_repositories() -> Result<()> {
    let tmp = TempDir::new()?;
    let db = IndexDb::open(tmp.path())?;

    db.put_commits(&[commit("a", SHA1, "x"), commit("mirror/a", SHA1, "x")])?;
    db.put_commits(&[commit("b", SHA2, "y")])?;

    let found = db.find_by_hash(SHA1)?;
    assert_eq!(found.len(), 2);
    let mut repos: Vec<_> = found.iter().map(|c| c.repository.as_str()).collect();
    repos.sort();
    assert_eq!(repos, vec!["a", "mirror/a"]);
    Ok(())
}

#[test]
fn test_find_by_position() -> Result<()> {
    let tmp = TempDir::new()?;
    let db = IndexDb::open(tmp.path())?;

    db.put_commits(&[
        commit("a", SHA1, "One\n\nCr-Commit-Position: refs/heads/main@{#7}"),
        commit("a", SHA2, "Two\n\nCr-Commit-Position: refs/heads/main@{#8}"),
    ])?;

    let found = db.find_by_position("refs/heads/main", 8)?;
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].commit_hash, SHA2);
    assert!(db.find_by_position("refs/heads/main", 9)?.is_empty());
    assert!(db.find_by_position("refs/heads/other", 7)?.is_empty());
    Ok(())
}

#[test]
fn test_reopen_keeps_commits() -> Result<()> {
    let tmp = TempDir::new()?;
    {
        let db = IndexDb::open(tmp.path())?;
        db.put_commits(&[commit("a", SHA1, "x")])?;
        db.flush()?;
    }
    let db = IndexDb::open(tmp.path())?;
    assert_eq!(db.find_by_hash(SHA1)?.len(), 1);
    Ok(())
}

// ── leases ───────────────────────────────────────────────────────────────────

#[test]
fn test_update_lease_put_and_delete() -> Result<()> {
    let tmp = TempDir::new()?;
    let db = IndexDb::open(tmp.path())?;
    let key = repo("a").key();

    assert_eq!(db.lease_state(&key)?, None);

    let state = RepositoryLeaseState::default().start_lease("owner-1", 1_000);
    let written = db.update_lease(&key, |current| {
        assert!(current.is_none());
        (LeaseWrite::Put(state.clone()), true)
    })?;
    assert!(written);
    assert_eq!(db.lease_state(&key)?, Some(state.clone()));

    let seen = db.update_lease(&key, |current| (LeaseWrite::Keep, current.cloned()))?;
    assert_eq!(seen, Some(state));

    db.update_lease(&key, |_| (LeaseWrite::Delete, ()))?;
    assert_eq!(db.lease_state(&key)?, None);
    assert_eq!(db.lease_count(), 0);
    Ok(())
}

#[test]
fn test_concurrent_lease_updates_are_serialized() -> Result<()> {
    let tmp = TempDir::new()?;
    let db = Arc::new(IndexDb::open(tmp.path())?);
    let key = repo("a").key();
    let barrier = Arc::new(Barrier::new(8));

    let handles: Vec<_> = (0..8)
        .map(|i| {
            let db = db.clone();
            let key = key.clone();
            let barrier = barrier.clone();
            std::thread::spawn(move || {
                barrier.wait();
                db.update_lease(&key, |current| match current {
                    Some(_) => (LeaseWrite::Keep, false),
                    None => (
                        LeaseWrite::Put(
                            RepositoryLeaseState::default().start_lease(&format!("owner-{}", i), 1),
                        ),
                        true,
                    ),
                })
            })
        })
        .collect();

    let mut granted = 0;
    for handle in handles {
        if handle.join().expect("thread panicked")? {
            granted += 1;
        }
    }
    assert_eq!(granted, 1);
    Ok(())
}
