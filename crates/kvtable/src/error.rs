//! Error types for kvtable

use std::io;

use thiserror::Error;

/// Result type alias for kvtable operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for backing table operations
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (data directory, database files)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Error reported by the SQLite engine
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Table name rejected by the identifier grammar
    #[error("Invalid table name {name:?}: {reason}")]
    InvalidName {
        /// The rejected input
        name: String,
        /// Why it was rejected
        reason: String,
    },

    /// The table has not been created yet
    #[error("No such table: {0}")]
    NoSuchTable(String),
}
