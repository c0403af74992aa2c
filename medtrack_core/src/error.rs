//! Error types for the medtrack_core library.

use std::io;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for medtrack_core operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// IO error occurred
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// TOML parsing error
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    /// Configuration validation error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed schedule definition, rejected before persistence
    #[error("Invalid schedule: {0}")]
    InvalidSchedule(String),

    /// Status recorded against a key not derivable from the schedule
    #[error("Unknown occurrence: {0}")]
    UnknownOccurrence(String),

    /// Duplicate terminal status write for an occurrence key
    #[error("Already recorded: {0}")]
    AlreadyRecorded(String),

    /// Adherence ledger error
    #[error("Ledger error: {0}")]
    Ledger(String),

    /// Dosing text could not be understood
    #[error("Parse error: {0}")]
    Parse(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}
