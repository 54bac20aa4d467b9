//! Revindex Core - Shared data models for the commit index
//!
//! This crate defines the core data structures used throughout the project,
//! including `IndexedCommit`, `RepositoryRef` and `RepositoryLeaseState`, the
//! commit position parser and the ref include/exclude policy.

mod error;
mod lease;
mod models;
pub mod position;
pub mod refs;

pub use error::CoreError;
pub use lease::{RepositoryLeaseState, ScanPolicy};
pub use models::{
    commit_id, commit_key, is_zero_hash, CommitKey, CommitPosition, IndexedCommit,
    IndexingPolicy, RawCommit, RefUpdate, RefUpdateEvent, RepositoryRef, UpdateType,
};
pub use position::parse_position;
