//! Error types for DDL compilation.

use crate::dialect::Dialect;

/// Errors that can occur while compiling a snapshot or diff.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompileError {
    /// The requested change has no legal representation in the target
    /// dialect and no safe fallback exists.
    #[error("{dialect} cannot express {construct} (table '{table}')")]
    Unsupported {
        /// Target dialect.
        dialect: Dialect,
        /// Table being compiled.
        table: String,
        /// Description of the construct.
        construct: String,
    },
}

/// Result type for compile operations.
pub type Result<T> = std::result::Result<T, CompileError>;
