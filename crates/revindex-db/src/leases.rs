//! Lease document storage
//!
//! Every mutation is a single-document read-modify-write transaction. sled
//! retries the closure when the document changed between read and commit,
//! so the decision is always taken against the latest state.

use anyhow::{anyhow, Context, Result};
use revindex_core::RepositoryLeaseState;
use sled::transaction::{ConflictableTransactionError, TransactionError};

use crate::database::IndexDb;

/// What a lease transaction writes back
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LeaseWrite {
    Keep,
    Put(RepositoryLeaseState),
    Delete,
}

fn decode(bytes: &[u8]) -> Result<RepositoryLeaseState, serde_json::Error> {
    serde_json::from_slice(bytes)
}

impl IndexDb {
    /// Reads the lease document of a repository
    pub fn lease_state(&self, key: &str) -> Result<Option<RepositoryLeaseState>> {
        match self.leases.get(key.as_bytes())? {
            Some(bytes) => Ok(Some(
                decode(&bytes).with_context(|| format!("Corrupted lease state for {}", key))?,
            )),
            None => Ok(None),
        }
    }

    /// Runs `f` against the current lease document inside a transaction and
    /// applies the write it returns.
    ///
    /// `f` may run more than once when another writer races the transaction.
    pub fn update_lease<T, F>(&self, key: &str, f: F) -> Result<T>
    where
        F: Fn(Option<&RepositoryLeaseState>) -> (LeaseWrite, T),
    {
        let result: Result<T, TransactionError<String>> = self.leases.transaction(|tx| {
            let current = match tx.get(key.as_bytes())? {
                Some(bytes) => Some(decode(&bytes).map_err(|e| {
                    ConflictableTransactionError::Abort(format!(
                        "Corrupted lease state for {}: {}",
                        key, e
                    ))
                })?),
                None => None,
            };

            let (write, out) = f(current.as_ref());
            match write {
                LeaseWrite::Keep => {}
                LeaseWrite::Put(state) => {
                    let bytes = serde_json::to_vec(&state).map_err(|e| {
                        ConflictableTransactionError::Abort(format!(
                            "Failed to serialize lease state: {}",
                            e
                        ))
                    })?;
                    tx.insert(key.as_bytes(), bytes)?;
                }
                LeaseWrite::Delete => {
                    tx.remove(key.as_bytes())?;
                }
            }
            Ok(out)
        });

        result.map_err(|e| match e {
            TransactionError::Abort(msg) => anyhow!(msg),
            TransactionError::Storage(e) => {
                anyhow::Error::from(e).context("Lease transaction failed")
            }
        })
    }

    /// Overwrites the lease document unconditionally
    pub fn put_lease_state(&self, key: &str, state: &RepositoryLeaseState) -> Result<()> {
        let bytes = serde_json::to_vec(state).context("Failed to serialize lease state")?;
        self.leases
            .insert(key.as_bytes(), bytes)
            .context("Failed to write lease state")?;
        Ok(())
    }

    /// Returns the number of lease documents
    pub fn lease_count(&self) -> usize {
        self.leases.len()
    }
}
