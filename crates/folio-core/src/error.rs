//! Typed failure taxonomy for the retrieval pipeline.
//!
//! Partition-scoped failures (`Load`, `Persist`, `Retrieval`) name the
//! partition they belong to and are collected into reports alongside any
//! partial success; they never abort work on the remaining partitions.
//! `Config` failures surface before any I/O takes place.

use thiserror::Error;

/// Errors produced by the chunking and retrieval pipeline.
#[derive(Debug, Error)]
pub enum Error {
    /// Invalid chunker or store configuration, rejected before any I/O.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// A persisted partition could not be restored. Fatal for that
    /// partition only; other partitions keep loading.
    #[error("failed to load partition '{partition}': {reason}")]
    Load { partition: String, reason: String },

    /// A partition index could not be written. Reported per partition;
    /// partitions already written are not rolled back.
    #[error("failed to persist partition '{partition}': {reason}")]
    Persist { partition: String, reason: String },

    /// One partition's index query failed. Recoverable by skipping that
    /// partition.
    #[error("retrieval failed in partition '{partition}': {reason}")]
    Retrieval { partition: String, reason: String },

    /// The embedding provider failed. Fatal for the calling operation.
    #[error("embedding failed: {0}")]
    Embedding(String),

    /// Answer generation failed. Distinct from an empty answer, which is
    /// a successful result.
    #[error("answer generation failed: {0}")]
    Generation(String),

    /// Filesystem failure outside any single partition (base directory
    /// creation or enumeration).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Shorthand for [`Error::Config`].
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
