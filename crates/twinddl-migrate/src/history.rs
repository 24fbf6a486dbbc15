//! Migration ledger.
//!
//! This module manages the `schema_migrations` table that records which
//! migrations have been applied, per dialect. A migration is applied for a
//! dialect exactly when a row with its `(name, dialect)` key exists.

use chrono::{DateTime, Utc};
use tracing::{debug, info};
use twinddl_core::Dialect;

use crate::error::{MigrateError, Result};
use crate::executor::{Executor, ExecutorError, Row, Value};

/// Name of the ledger table.
pub const LEDGER_TABLE: &str = "schema_migrations";

/// A record of an applied migration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppliedMigration {
    /// Migration name.
    pub name: String,
    /// Dialect it was applied for.
    pub dialect: Dialect,
    /// When the migration was applied.
    pub applied_at: DateTime<Utc>,
}

/// Reads and writes the ledger for one dialect.
#[derive(Debug, Clone, Copy)]
pub struct MigrationLedger {
    dialect: Dialect,
}

impl MigrationLedger {
    /// Creates a ledger for `dialect`.
    #[must_use]
    pub const fn new(dialect: Dialect) -> Self {
        Self { dialect }
    }

    /// Returns the dialect.
    #[must_use]
    pub const fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// SQL creating the ledger table.
    ///
    /// No `IF NOT EXISTS`: [`ensure_table`](Self::ensure_table) treats the
    /// "already exists" failure as success instead.
    #[must_use]
    pub fn create_table_sql(&self) -> String {
        let applied_at = self.applied_at_column();
        match self.dialect {
            Dialect::Postgres => format!(
                "CREATE TABLE {LEDGER_TABLE} (name VARCHAR(255) NOT NULL, dialect VARCHAR(64) NOT NULL, {applied_at} TIMESTAMPTZ NOT NULL, PRIMARY KEY (name, dialect))"
            ),
            Dialect::Spanner => format!(
                "CREATE TABLE {LEDGER_TABLE} (name STRING(255) NOT NULL, dialect STRING(64) NOT NULL, {applied_at} TIMESTAMP NOT NULL) PRIMARY KEY (name, dialect)"
            ),
        }
    }

    /// SQL inserting one ledger row; parameters are name, dialect, time.
    #[must_use]
    pub fn insert_sql(&self) -> String {
        format!(
            "INSERT INTO {LEDGER_TABLE} (name, dialect, {}) VALUES ({}, {}, {})",
            self.applied_at_column(),
            self.placeholder(1),
            self.placeholder(2),
            self.placeholder(3)
        )
    }

    /// SQL deleting one ledger row; parameters are name, dialect.
    #[must_use]
    pub fn delete_sql(&self) -> String {
        format!(
            "DELETE FROM {LEDGER_TABLE} WHERE name = {} AND dialect = {}",
            self.placeholder(1),
            self.placeholder(2)
        )
    }

    /// SQL listing applied migrations; the parameter is the dialect.
    #[must_use]
    pub fn select_sql(&self) -> String {
        let applied_at = self.applied_at_column();
        format!(
            "SELECT name, dialect, {applied_at} FROM {LEDGER_TABLE} WHERE dialect = {} ORDER BY {applied_at}, name",
            self.placeholder(1)
        )
    }

    /// Ensures the ledger table exists.
    ///
    /// An "already exists" failure counts as success; any other failure is
    /// [`MigrateError::LedgerCreate`].
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::LedgerCreate`] if the table cannot be created.
    pub async fn ensure_table(&self, executor: &mut dyn Executor) -> Result<()> {
        let sql = self.create_table_sql();
        let result = match self.dialect {
            Dialect::Postgres => executor.execute(&sql, &[]).await.map(|_| ()),
            Dialect::Spanner => executor.execute_batch(&[sql]).await,
        };

        match result {
            Ok(()) => {
                info!(dialect = %self.dialect, "Created migration ledger");
                Ok(())
            }
            Err(err) if err.is_already_exists() => {
                debug!(dialect = %self.dialect, "Migration ledger already exists");
                Ok(())
            }
            Err(err) => Err(MigrateError::LedgerCreate(err)),
        }
    }

    /// Records a migration as applied now.
    ///
    /// # Errors
    ///
    /// Returns the executor error if the insert fails.
    pub async fn record_applied(
        &self,
        executor: &mut dyn Executor,
        name: &str,
    ) -> std::result::Result<(), ExecutorError> {
        let params = [
            Value::from(name),
            Value::from(self.dialect.as_str()),
            Value::from(Utc::now()),
        ];
        executor.execute(&self.insert_sql(), &params).await?;
        Ok(())
    }

    /// Removes a migration record (for rollback).
    ///
    /// # Errors
    ///
    /// Returns the executor error if the delete fails.
    pub async fn record_unapplied(
        &self,
        executor: &mut dyn Executor,
        name: &str,
    ) -> std::result::Result<(), ExecutorError> {
        let params = [Value::from(name), Value::from(self.dialect.as_str())];
        executor.execute(&self.delete_sql(), &params).await?;
        Ok(())
    }

    /// Gets all migrations applied for this dialect, oldest first, ties
    /// broken by name.
    ///
    /// A missing ledger table means nothing has been applied yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails or a row cannot be decoded.
    pub async fn get_applied(&self, executor: &mut dyn Executor) -> Result<Vec<AppliedMigration>> {
        let rows = match executor
            .query(&self.select_sql(), &[Value::from(self.dialect.as_str())])
            .await
        {
            Ok(rows) => rows,
            Err(err) if err.is_not_found() => {
                info!(dialect = %self.dialect, "Migration ledger not found; nothing applied yet");
                return Ok(Vec::new());
            }
            Err(err) => return Err(err.into()),
        };

        rows.iter().map(|row| self.decode(row)).collect()
    }

    /// Gets the names of all migrations applied for this dialect, in
    /// application order.
    ///
    /// # Errors
    ///
    /// Same as [`get_applied`](Self::get_applied).
    pub async fn applied_names(&self, executor: &mut dyn Executor) -> Result<Vec<String>> {
        Ok(self
            .get_applied(executor)
            .await?
            .into_iter()
            .map(|m| m.name)
            .collect())
    }

    fn decode(&self, row: &Row) -> Result<AppliedMigration> {
        let name = row
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| ExecutorError::other("ledger row without a name"))?;
        let applied_at = row
            .get("appliedAt")
            .and_then(Value::as_timestamp)
            .ok_or_else(|| ExecutorError::other(format!("ledger row '{name}' without appliedAt")))?;

        Ok(AppliedMigration {
            name: name.to_string(),
            dialect: self.dialect,
            applied_at,
        })
    }

    fn applied_at_column(&self) -> String {
        self.dialect.compiler().quote_identifier("appliedAt")
    }

    fn placeholder(&self, index: usize) -> String {
        match self.dialect {
            Dialect::Postgres => format!("${index}"),
            Dialect::Spanner => format!("@p{index}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::RecordingExecutor;

    #[test]
    fn ledger_sql_per_dialect() {
        let pg = MigrationLedger::new(Dialect::Postgres);
        assert_eq!(
            pg.create_table_sql(),
            "CREATE TABLE schema_migrations (name VARCHAR(255) NOT NULL, dialect VARCHAR(64) NOT NULL, \"appliedAt\" TIMESTAMPTZ NOT NULL, PRIMARY KEY (name, dialect))"
        );
        assert_eq!(
            pg.select_sql(),
            "SELECT name, dialect, \"appliedAt\" FROM schema_migrations WHERE dialect = $1 ORDER BY \"appliedAt\", name"
        );

        let sp = MigrationLedger::new(Dialect::Spanner);
        assert!(sp.create_table_sql().ends_with(") PRIMARY KEY (name, dialect)"));
        assert_eq!(
            sp.insert_sql(),
            "INSERT INTO schema_migrations (name, dialect, appliedAt) VALUES (@p1, @p2, @p3)"
        );
        assert_eq!(
            sp.delete_sql(),
            "DELETE FROM schema_migrations WHERE name = @p1 AND dialect = @p2"
        );
    }

    #[tokio::test]
    async fn test_ensure_table_is_idempotent() {
        let mut executor = RecordingExecutor::new();
        let ledger = MigrationLedger::new(Dialect::Postgres);

        ledger.ensure_table(&mut executor).await.unwrap();
        ledger.ensure_table(&mut executor).await.unwrap();
        assert!(executor.ledger_exists());
    }

    #[tokio::test]
    async fn test_ensure_table_surfaces_other_failures() {
        let mut executor = RecordingExecutor::new().fail_on("CREATE TABLE schema_migrations");
        let ledger = MigrationLedger::new(Dialect::Spanner);

        let err = ledger.ensure_table(&mut executor).await.unwrap_err();
        assert!(matches!(err, MigrateError::LedgerCreate(_)));
    }

    #[tokio::test]
    async fn test_missing_ledger_means_nothing_applied() {
        let mut executor = RecordingExecutor::new();
        let ledger = MigrationLedger::new(Dialect::Postgres);
        assert!(ledger.get_applied(&mut executor).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_record_and_list_per_dialect() {
        let mut executor = RecordingExecutor::new();
        let pg = MigrationLedger::new(Dialect::Postgres);
        let sp = MigrationLedger::new(Dialect::Spanner);
        pg.ensure_table(&mut executor).await.unwrap();

        pg.record_applied(&mut executor, "0001_init").await.unwrap();
        pg.record_applied(&mut executor, "0002_users").await.unwrap();
        sp.record_applied(&mut executor, "0001_init").await.unwrap();

        assert_eq!(
            pg.applied_names(&mut executor).await.unwrap(),
            vec!["0001_init", "0002_users"]
        );
        assert_eq!(sp.applied_names(&mut executor).await.unwrap(), vec!["0001_init"]);

        pg.record_unapplied(&mut executor, "0002_users").await.unwrap();
        assert_eq!(pg.applied_names(&mut executor).await.unwrap(), vec!["0001_init"]);
        assert_eq!(sp.applied_names(&mut executor).await.unwrap(), vec!["0001_init"]);
    }
}
