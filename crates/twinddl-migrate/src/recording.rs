//! In-memory executor.
//!
//! [`RecordingExecutor`] logs every statement it receives instead of
//! running it, and keeps the migration ledger in memory so that the runner
//! behaves as it would against a fresh target. The CLI uses it for
//! `--dry-run`; tests use it to observe exactly what the runner sends.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::executor::{Executor, ExecutorError, Row, TransactionWork, Value};
use crate::history::LEDGER_TABLE;

#[derive(Debug, Clone, PartialEq)]
struct LedgerRow {
    name: String,
    dialect: String,
    applied_at: DateTime<Utc>,
}

/// Executor that records statements and emulates the ledger table.
#[derive(Debug, Default)]
pub struct RecordingExecutor {
    connected: bool,
    log: Vec<String>,
    ledger: Option<Vec<LedgerRow>>,
    fail_on: Option<String>,
}

impl RecordingExecutor {
    /// Creates an executor against an empty target.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every statement containing `fragment` fail.
    #[must_use]
    pub fn fail_on(mut self, fragment: impl Into<String>) -> Self {
        self.fail_on = Some(fragment.into());
        self
    }

    /// Stops failing statements.
    pub fn clear_failure(&mut self) {
        self.fail_on = None;
    }

    /// Every statement received, including `BEGIN`, `COMMIT` and
    /// `ROLLBACK` markers for transactions.
    #[must_use]
    pub fn log(&self) -> &[String] {
        &self.log
    }

    /// Statements received that do not touch the ledger or delimit a
    /// transaction.
    #[must_use]
    pub fn schema_statements(&self) -> Vec<&str> {
        self.log
            .iter()
            .map(String::as_str)
            .filter(|s| !s.contains(LEDGER_TABLE) && !matches!(*s, "BEGIN" | "COMMIT" | "ROLLBACK"))
            .collect()
    }

    /// Returns `true` once the ledger table has been created.
    #[must_use]
    pub const fn ledger_exists(&self) -> bool {
        self.ledger.is_some()
    }

    /// Returns `true` between `connect` and `disconnect`.
    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.connected
    }

    fn run(&mut self, sql: &str, params: &[Value]) -> Result<u64, ExecutorError> {
        debug!(sql = %sql, "Recording SQL");
        self.log.push(sql.to_string());

        if let Some(fragment) = &self.fail_on
            && sql.contains(fragment.as_str())
        {
            return Err(ExecutorError::other(format!("injected failure: {sql}")));
        }

        if !sql.contains(LEDGER_TABLE) {
            return Ok(0);
        }

        if sql.starts_with("CREATE TABLE") {
            if self.ledger.is_some() {
                return Err(ExecutorError::already_exists(format!(
                    "table {LEDGER_TABLE} already exists"
                )));
            }
            self.ledger = Some(Vec::new());
            return Ok(0);
        }

        let ledger = self
            .ledger
            .as_mut()
            .ok_or_else(|| ExecutorError::not_found(format!("table {LEDGER_TABLE} not found")))?;

        if sql.starts_with("INSERT") {
            let row = match params {
                [name, dialect, applied_at] => LedgerRow {
                    name: text(name)?,
                    dialect: text(dialect)?,
                    applied_at: applied_at
                        .as_timestamp()
                        .ok_or_else(|| ExecutorError::other("appliedAt must be a timestamp"))?,
                },
                _ => return Err(ExecutorError::other("ledger insert takes three parameters")),
            };
            if ledger
                .iter()
                .any(|r| r.name == row.name && r.dialect == row.dialect)
            {
                return Err(ExecutorError::already_exists(format!(
                    "ledger row ({}, {}) already exists",
                    row.name, row.dialect
                )));
            }
            ledger.push(row);
            Ok(1)
        } else if sql.starts_with("DELETE") {
            let [name, dialect] = params else {
                return Err(ExecutorError::other("ledger delete takes two parameters"));
            };
            let (name, dialect) = (text(name)?, text(dialect)?);
            let before = ledger.len();
            ledger.retain(|r| !(r.name == name && r.dialect == dialect));
            u64::try_from(before - ledger.len()).map_err(|e| ExecutorError::other(e.to_string()))
        } else {
            Ok(0)
        }
    }
}

fn text(value: &Value) -> Result<String, ExecutorError> {
    value
        .as_str()
        .map(str::to_string)
        .ok_or_else(|| ExecutorError::other(format!("expected text, got {value:?}")))
}

#[async_trait]
impl Executor for RecordingExecutor {
    async fn connect(&mut self) -> Result<(), ExecutorError> {
        self.connected = true;
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), ExecutorError> {
        self.connected = false;
        Ok(())
    }

    async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64, ExecutorError> {
        self.run(sql, params)
    }

    async fn execute_batch(&mut self, statements: &[String]) -> Result<(), ExecutorError> {
        let saved = self.ledger.clone();
        for sql in statements {
            if let Err(err) = self.run(sql, &[]) {
                self.ledger = saved;
                return Err(err);
            }
        }
        Ok(())
    }

    async fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>, ExecutorError> {
        debug!(sql = %sql, "Recording query");
        self.log.push(sql.to_string());

        if !sql.contains(LEDGER_TABLE) {
            return Ok(Vec::new());
        }
        let ledger = self
            .ledger
            .as_ref()
            .ok_or_else(|| ExecutorError::not_found(format!("table {LEDGER_TABLE} not found")))?;
        let dialect = params.first().and_then(Value::as_str);

        let mut rows: Vec<&LedgerRow> = ledger
            .iter()
            .filter(|r| dialect.is_none_or(|d| r.dialect == d))
            .collect();
        rows.sort_by(|a, b| (a.applied_at, &a.name).cmp(&(b.applied_at, &b.name)));

        Ok(rows
            .into_iter()
            .map(|r| {
                Row::from([
                    ("name".to_string(), Value::from(r.name.as_str())),
                    ("dialect".to_string(), Value::from(r.dialect.as_str())),
                    ("appliedAt".to_string(), Value::from(r.applied_at)),
                ])
            })
            .collect())
    }

    async fn transaction(&mut self, work: TransactionWork) -> Result<(), ExecutorError> {
        let saved = self.ledger.clone();
        self.log.push("BEGIN".to_string());

        let result = work(&mut *self).await;

        if result.is_ok() {
            self.log.push("COMMIT".to_string());
        } else {
            self.ledger = saved;
            self.log.push("ROLLBACK".to_string());
        }
        result
    }
}
