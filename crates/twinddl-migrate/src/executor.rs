//! The executor contract.
//!
//! The runner never talks to a database directly: every statement, batch
//! and query goes through an [`Executor`]. [`PgExecutor`](crate::PgExecutor)
//! is the bundled PostgreSQL implementation and
//! [`RecordingExecutor`](crate::RecordingExecutor) an in-memory one for
//! dry runs. Spanner deployments implement the trait over their client.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// A boxed, `Send` future.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// A statement parameter or result cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// SQL NULL.
    Null,
    /// Boolean.
    Bool(bool),
    /// 64-bit integer.
    Int(i64),
    /// 64-bit float.
    Float(f64),
    /// Text.
    Text(String),
    /// UTC timestamp.
    Timestamp(DateTime<Utc>),
}

impl Value {
    /// Returns the text payload, if any.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Returns the timestamp payload, accepting RFC 3339 text as well.
    #[must_use]
    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Timestamp(ts) => Some(*ts),
            Self::Text(s) => DateTime::parse_from_rfc3339(s)
                .ok()
                .map(|dt| dt.with_timezone(&Utc)),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Timestamp(value)
    }
}

/// One result row, keyed by column name.
pub type Row = BTreeMap<String, Value>;

/// Classification of an executor failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorErrorKind {
    /// The object being created already exists.
    AlreadyExists,
    /// The object being read does not exist.
    NotFound,
    /// Anything else.
    Other,
}

/// A failure reported by an [`Executor`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ExecutorError {
    /// Failure class.
    pub kind: ExecutorErrorKind,
    /// Driver message.
    pub message: String,
}

impl ExecutorError {
    /// Creates an error of the given kind.
    #[must_use]
    pub fn new(kind: ExecutorErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Creates an [`ExecutorErrorKind::AlreadyExists`] error.
    #[must_use]
    pub fn already_exists(message: impl Into<String>) -> Self {
        Self::new(ExecutorErrorKind::AlreadyExists, message)
    }

    /// Creates an [`ExecutorErrorKind::NotFound`] error.
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ExecutorErrorKind::NotFound, message)
    }

    /// Creates an [`ExecutorErrorKind::Other`] error.
    #[must_use]
    pub fn other(message: impl Into<String>) -> Self {
        Self::new(ExecutorErrorKind::Other, message)
    }

    /// Returns `true` for [`ExecutorErrorKind::AlreadyExists`].
    #[must_use]
    pub fn is_already_exists(&self) -> bool {
        self.kind == ExecutorErrorKind::AlreadyExists
    }

    /// Returns `true` for [`ExecutorErrorKind::NotFound`].
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        self.kind == ExecutorErrorKind::NotFound
    }
}

impl fmt::Display for ExecutorErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::AlreadyExists => "already exists",
            Self::NotFound => "not found",
            Self::Other => "other",
        })
    }
}

/// Work run inside [`Executor::transaction`] against the scoped executor.
pub type TransactionWork = Box<
    dyn for<'t> FnOnce(&'t mut dyn Executor) -> BoxFuture<'t, Result<(), ExecutorError>> + Send,
>;

/// Boxes a closure as [`TransactionWork`].
///
/// ```rust,ignore
/// executor
///     .transaction(transaction_work(move |tx| {
///         Box::pin(async move {
///             tx.execute("DELETE FROM sessions", &[]).await?;
///             Ok(())
///         })
///     }))
///     .await?;
/// ```
#[must_use]
pub fn transaction_work<F>(work: F) -> TransactionWork
where
    F: for<'t> FnOnce(&'t mut dyn Executor) -> BoxFuture<'t, Result<(), ExecutorError>>
        + Send
        + 'static,
{
    Box::new(work)
}

/// Runs SQL against a target database.
#[async_trait]
pub trait Executor: Send {
    /// Opens the connection.
    async fn connect(&mut self) -> Result<(), ExecutorError>;

    /// Closes the connection.
    async fn disconnect(&mut self) -> Result<(), ExecutorError>;

    /// Runs one statement and returns the affected row count.
    async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64, ExecutorError>;

    /// Runs a group of statements atomically.
    async fn execute_batch(&mut self, statements: &[String]) -> Result<(), ExecutorError>;

    /// Runs a read statement.
    async fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>, ExecutorError>;

    /// Runs `work` in a transaction: commit when it returns `Ok`, roll back
    /// when it returns `Err`.
    async fn transaction(&mut self, work: TransactionWork) -> Result<(), ExecutorError>;
}
