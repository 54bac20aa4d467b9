//! Revindex Import - Indexing engine for the commit index
//!
//! This crate is responsible for:
//! - Coordinating full-repository scans across workers through leases
//! - Walking every configured ref of a repository and storing its commits
//! - Indexing the delta of ref-update notifications
//! - Queueing and sweeping full imports

pub mod catalog;
pub mod config;
pub mod controller;
pub mod error;
pub mod formatting;
pub mod git_origin;
pub mod importer;
pub mod incremental;
pub mod lease;
pub mod notification;
pub mod origin;
pub mod stats;
mod walk;

pub use catalog::RepoCatalog;
pub use config::IndexerConfig;
pub use controller::ImportController;
pub use error::{ControllerError, HandleError, IndexError, RefFailure, UpdateError};
pub use git_origin::GitOrigin;
pub use importer::{ImportOutcome, RepoImporter};
pub use incremental::UpdateProcessor;
pub use lease::{Acquisition, Lease, LeaseCoordinator, LeaseSettings, Leased, Renewal};
pub use notification::{handle_message, parse_notification};
pub use origin::{LogPage, Origin};
pub use stats::{ImportStats, UpdateStats, WalkStats};
