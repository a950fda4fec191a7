//! Error types for the posrank library.
//!
//! All fallible operations return [`RankError`] through the crate-wide
//! [`Result`] alias.
//!
//! # Examples
//!
//! ```
//! use posrank::error::{RankError, Result};
//!
//! fn example_operation() -> Result<()> {
//!     Err(RankError::config("max_top must be at least 1"))
//! }
//!
//! match example_operation() {
//!     Ok(_) => println!("Success"),
//!     Err(e) => eprintln!("Error: {}", e),
//! }
//! ```

use std::io;

use thiserror::Error;

/// The main error type for ranking operations.
#[derive(Error, Debug)]
pub enum RankError {
    /// I/O errors (fixture and config files).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Invalid configuration values.
    #[error("Config error: {0}")]
    Config(String),

    /// Malformed query input (bad term references, bad boolean expression).
    #[error("Query error: {0}")]
    Query(String),

    /// A query term accumulated too many sublists.
    #[error("Query too big: term {term} needs {sublists} sublists, limit is {limit}")]
    QueryTooBig {
        term: usize,
        sublists: usize,
        limit: usize,
    },

    /// A posting list could not be decoded.
    #[error("Corrupt posting list: {0}")]
    CorruptPostingList(String),

    /// A working buffer could not be allocated.
    #[error("Out of memory: {0}")]
    OutOfMemory(String),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error for other cases
    #[error("Error: {0}")]
    Other(String),
}

/// Result type alias for operations that may fail with RankError.
pub type Result<T> = std::result::Result<T, RankError>;

impl RankError {
    /// Create a new config error.
    pub fn config<S: Into<String>>(msg: S) -> Self {
        RankError::Config(msg.into())
    }

    /// Create a new query error.
    pub fn query<S: Into<String>>(msg: S) -> Self {
        RankError::Query(msg.into())
    }

    /// Create a new corrupt posting list error.
    pub fn corrupt<S: Into<String>>(msg: S) -> Self {
        RankError::CorruptPostingList(msg.into())
    }

    /// Create a new out of memory error.
    pub fn out_of_memory<S: Into<String>>(msg: S) -> Self {
        RankError::OutOfMemory(msg.into())
    }

    /// Create a new generic error.
    pub fn other<S: Into<String>>(msg: S) -> Self {
        RankError::Other(msg.into())
    }
}

impl From<std::collections::TryReserveError> for RankError {
    fn from(err: std::collections::TryReserveError) -> Self {
        RankError::OutOfMemory(err.to_string())
    }
}
