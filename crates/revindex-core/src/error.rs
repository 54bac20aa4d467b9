//! Error types for revindex-core

/// Errors specific to revindex-core
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CoreError {
    #[error("No commit position footer")]
    NoPositionFooter,

    #[error("Invalid commit position footer {key}: {value:?}")]
    InvalidPositionFooter { key: String, value: String },
}
