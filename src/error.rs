//! Custom error types for Tally
//!
//! This module defines the error hierarchy for the ledger core using thiserror
//! for ergonomic error definitions.

use thiserror::Error;

/// The main error type for Tally operations
#[derive(Error, Debug)]
pub enum TallyError {
    /// Configuration errors (bad key length, unknown cache name, ...)
    #[error("Configuration error: {0}")]
    Config(String),

    /// The envelope bytes cannot possibly decrypt (shorter than the IV)
    #[error("Corrupt envelope: {0}")]
    CorruptEnvelope(String),

    /// The decrypted payload is not a usable database
    #[error("Corrupt store: {0}")]
    CorruptStore(String),

    /// A write affected a row count other than one
    #[error("Consistency error: could not write entity {id}")]
    Consistency { id: String },

    /// An edit-table row references an id absent from the snapshot
    #[error("Import validation error: unknown id {id}")]
    ImportValidation { id: String },

    /// A cache fetch closure failed; nothing was cached
    #[error("Fetch error: {0}")]
    Fetch(String),

    /// Relational engine errors
    #[error("Storage error: {0}")]
    Storage(String),

    /// File I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// Edit-table read/write errors
    #[error("CSV error: {0}")]
    Csv(String),
}

impl TallyError {
    /// Check if this is a consistency error
    pub fn is_consistency(&self) -> bool {
        matches!(self, Self::Consistency { .. })
    }

    /// Check if this is an import validation error
    pub fn is_import_validation(&self) -> bool {
        matches!(self, Self::ImportValidation { .. })
    }
}

// Implement From traits for common error types

impl From<std::io::Error> for TallyError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<rusqlite::Error> for TallyError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

impl From<csv::Error> for TallyError {
    fn from(err: csv::Error) -> Self {
        Self::Csv(err.to_string())
    }
}

/// Result type alias for Tally operations
pub type TallyResult<T> = Result<T, TallyError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TallyError::Config("bad key".into());
        assert_eq!(err.to_string(), "Configuration error: bad key");
    }

    #[test]
    fn test_consistency_error_names_id() {
        let err = TallyError::Consistency { id: "ab12cd34ef".into() };
        assert_eq!(
            err.to_string(),
            "Consistency error: could not write entity ab12cd34ef"
        );
        assert!(err.is_consistency());
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let tally_err: TallyError = io_err.into();
        assert!(matches!(tally_err, TallyError::Io(_)));
    }
}
