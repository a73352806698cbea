//! Error types for kvcache

use thiserror::Error;

/// Result type alias for cache store operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors reported by [`CacheStore`](crate::CacheStore)
#[derive(Debug, Error)]
pub enum Error {
    /// The table name failed validation
    #[error("Invalid table name: {0}")]
    InvalidTableName(#[source] kvtable::Error),

    /// No connection to the backing table could be established, or the
    /// table was never initialized
    #[error("Storage unavailable for table '{table}': {source}")]
    StorageUnavailable {
        /// Table name
        table: String,
        /// Underlying cause
        #[source]
        source: kvtable::Error,
    },

    /// Creating the backing table failed
    #[error("Schema error for table '{table}': {source}")]
    SchemaError {
        /// Table name
        table: String,
        /// Underlying cause
        #[source]
        source: kvtable::Error,
    },

    /// A backing upsert or delete failed after the hot cache was already
    /// updated. The two layers disagree on `key` until it is rewritten or
    /// invalidated.
    #[error("Write to table '{table}' failed for key {key:?}: {source}")]
    WriteFailure {
        /// Table name
        table: String,
        /// Affected key
        key: String,
        /// Underlying cause
        #[source]
        source: kvtable::Error,
    },

    /// A backing lookup failed for a reason other than a missing row
    #[error("Read from table '{table}' failed for key {key:?}: {source}")]
    ReadFailure {
        /// Table name
        table: String,
        /// Affected key
        key: String,
        /// Underlying cause
        #[source]
        source: kvtable::Error,
    },

    /// Releasing a backing connection failed
    #[error("Failed to close table '{table}': {source}")]
    CloseFailure {
        /// Table name
        table: String,
        /// Underlying cause
        #[source]
        source: kvtable::Error,
    },
}
