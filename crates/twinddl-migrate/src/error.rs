//! Error types for the migration system.

use std::path::PathBuf;

use twinddl_core::CompileError;

use crate::executor::ExecutorError;

/// Errors that can occur during migration operations.
#[derive(Debug, thiserror::Error)]
pub enum MigrateError {
    /// The ledger table could not be created.
    #[error("Failed to create the migration ledger: {0}")]
    LedgerCreate(#[source] ExecutorError),

    /// A migration's up-routine or ledger write failed.
    #[error("Failed to apply migration '{name}': {source}")]
    MigrationApply {
        /// Migration name.
        name: String,
        /// Underlying executor failure.
        #[source]
        source: ExecutorError,
    },

    /// A migration's down-routine or ledger delete failed.
    #[error("Failed to revert migration '{name}': {source}")]
    MigrationRevert {
        /// Migration name.
        name: String,
        /// Underlying executor failure.
        #[source]
        source: ExecutorError,
    },

    /// The ledger records a migration whose file is gone.
    #[error("Migration '{name}' is recorded as applied but {path} does not exist")]
    MissingMigrationFile {
        /// Migration name.
        name: String,
        /// Where the file was expected.
        path: PathBuf,
    },

    /// Failed to parse a migration file.
    #[error("Failed to parse migration file '{path}': {message}")]
    ParseError {
        /// Path to the migration file.
        path: PathBuf,
        /// Error message.
        message: String,
    },

    /// A migration file was written by an incompatible version.
    #[error("Unsupported migration format '{format}' in {path}")]
    UnsupportedFormat {
        /// Path to the migration file.
        path: PathBuf,
        /// The format tag found in the file.
        format: String,
    },

    /// Migration file already exists.
    #[error("Migration file already exists: {0}")]
    MigrationExists(PathBuf),

    /// Migration names are restricted to letters, digits and `_`.
    #[error("Invalid migration name '{0}': use letters, digits and underscores")]
    InvalidName(String),

    /// A schema change cannot be compiled for one of the dialects.
    #[error("Compile error: {0}")]
    Compile(#[from] CompileError),

    /// An executor call outside a migration failed.
    #[error("Executor error: {0}")]
    Executor(#[from] ExecutorError),

    /// IO error (reading/writing migration files).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
