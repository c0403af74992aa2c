#![forbid(unsafe_code)]

//! Core domain model and business logic for the medtrack system.
//!
//! This crate provides:
//! - Domain types (medications, schedules, occurrences, adherence records)
//! - Occurrence generation over query windows
//! - The adherence ledger and missed-sweep
//! - Dosing-text parsing
//! - Persistence (append log, CSV archive, registry)

pub mod types;
pub mod error;
pub mod schedule;
pub mod occurrence;
pub mod adherence;
pub mod parser;
pub mod config;
pub mod logging;
pub mod wal;
pub mod csv_rollup;
pub mod history;
pub mod registry;

// Re-export commonly used types
pub use error::{Error, Result};
pub use types::*;
pub use schedule::ScheduleDraft;
pub use occurrence::{occurrences_between, Occurrences};
pub use adherence::{AdherenceLedger, AdherenceStats};
pub use parser::{parse_dosing, DoseClock, ParsedDosing};
pub use config::Config;
pub use wal::{JsonlSink, RecordSink};
pub use history::load_records;
pub use registry::Registry;
