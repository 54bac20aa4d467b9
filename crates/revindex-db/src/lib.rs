//! Revindex DB - Persisted document store for the commit index
//!
//! This crate manages the local sled database:
//! - commit documents, written append-only and keyed by commit id, with
//!   lookups by hash and by commit position
//! - per-repository full-scan lease documents, mutated through
//!   single-document transactions

mod database;
mod leases;

pub use database::IndexDb;
pub use leases::LeaseWrite;
