//! # Factstore - Typed Fact Database
//!
//! Persistence and query layer for a deduction engine.
//!
//! Factstore provides:
//! - A predicate type registry that governs what may be stored
//! - Deduplicating fact ingestion into SQLite
//! - Conjunctive template queries solved by a variable-binding join

pub mod types;
pub mod registry;
pub mod storage;
pub mod query;
pub mod store;
pub mod config;
pub mod ui;

// Re-exports for convenient access
pub use types::{Context, Fact, FactTemplate, HType, Predicate, Slot, Value};
pub use registry::TypeRegistry;
pub use storage::{FactBackend, SqliteBackend};
pub use store::{FactStore, IngestReport, StoreStats};

/// Result type alias for Factstore operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for Factstore operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Predicate {predicate} is already registered with a different signature")]
    SchemaConflict { predicate: String },

    #[error("Unknown predicate: {0}")]
    UnknownPredicate(String),

    #[error("Type mismatch in {predicate} at position {position}: expected {expected}, found {found}")]
    TypeMismatch {
        predicate: String,
        position: usize,
        expected: HType,
        found: String,
    },

    #[error("Arity mismatch for {predicate}: expected {expected} arguments, found {found}")]
    ArityMismatch {
        predicate: String,
        expected: usize,
        found: usize,
    },

    #[error("Variable {variable} unifies incompatible types {first} and {second}")]
    VariableTypeConflict {
        variable: String,
        first: HType,
        second: HType,
    },

    #[error("Invalid predicate: {0}")]
    InvalidPredicate(String),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True for errors caused by a malformed fact or template rather than
    /// by the backing store.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::UnknownPredicate(_)
                | Error::TypeMismatch { .. }
                | Error::ArityMismatch { .. }
                | Error::VariableTypeConflict { .. }
        )
    }
}
