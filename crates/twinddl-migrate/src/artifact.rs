//! Running and loading migration artifacts.

use std::path::Path;

use async_trait::async_trait;
use tracing::debug;
use twinddl_core::{Dialect, MigrationArtifact, Routine};

use crate::error::{MigrateError, Result};
use crate::executor::{Executor, ExecutorError, transaction_work};

/// The up and down routines of a migration artifact.
///
/// Each call resolves once every statement of the routine has executed,
/// in order.
#[async_trait]
pub trait ArtifactRoutines {
    /// Applies the migration for `dialect`.
    async fn up(
        &self,
        executor: &mut dyn Executor,
        dialect: Dialect,
    ) -> std::result::Result<(), ExecutorError>;

    /// Reverts the migration for `dialect`.
    async fn down(
        &self,
        executor: &mut dyn Executor,
        dialect: Dialect,
    ) -> std::result::Result<(), ExecutorError>;
}

#[async_trait]
impl ArtifactRoutines for MigrationArtifact {
    async fn up(
        &self,
        executor: &mut dyn Executor,
        dialect: Dialect,
    ) -> std::result::Result<(), ExecutorError> {
        run_routine(executor, &self.routines(dialect).up).await
    }

    async fn down(
        &self,
        executor: &mut dyn Executor,
        dialect: Dialect,
    ) -> std::result::Result<(), ExecutorError> {
        run_routine(executor, &self.routines(dialect).down).await
    }
}

/// Executes a routine.
///
/// Statement routines run inside one transaction; batch routines submit
/// each batch through [`Executor::execute_batch`].
///
/// # Errors
///
/// Returns the first executor error; a failed statement routine is
/// rolled back.
pub async fn run_routine(
    executor: &mut dyn Executor,
    routine: &Routine,
) -> std::result::Result<(), ExecutorError> {
    match routine {
        Routine::Statements(statements) => {
            if statements.is_empty() {
                return Ok(());
            }
            let statements = statements.clone();
            executor
                .transaction(transaction_work(move |tx| {
                    Box::pin(async move {
                        for sql in &statements {
                            debug!(sql = %sql, "Executing SQL");
                            tx.execute(sql, &[]).await?;
                        }
                        Ok(())
                    })
                }))
                .await
        }
        Routine::Batches(batches) => {
            for batch in batches.iter().filter(|b| !b.is_empty()) {
                debug!(statements = batch.len(), "Executing batch");
                executor.execute_batch(batch).await?;
            }
            Ok(())
        }
    }
}

/// Reads and validates a migration artifact file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed, or its format
/// is not supported.
pub async fn load_artifact(path: &Path) -> Result<MigrationArtifact> {
    let json = tokio::fs::read_to_string(path).await?;
    let artifact = MigrationArtifact::from_json(&json).map_err(|e| MigrateError::ParseError {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    if !artifact.is_supported_format() {
        return Err(MigrateError::UnsupportedFormat {
            path: path.to_path_buf(),
            format: artifact.format,
        });
    }

    Ok(artifact)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::RecordingExecutor;
    use twinddl_core::prelude::*;

    fn artifact() -> MigrationArtifact {
        let current = SchemaSnapshot::new().with_table(
            TableSnapshot::new("users").with_column(
                ColumnSnapshot::new("id", ColumnType::BigInt, DialectTypes::new("BIGINT", "INT64"))
                    .primary_key(),
            ),
        );
        match synthesize("create_users", &SchemaSnapshot::new(), &current).unwrap() {
            Synthesis::Migration(artifact) => *artifact,
            Synthesis::NoChanges => panic!("expected a migration"),
        }
    }

    #[tokio::test]
    async fn postgres_routines_run_in_a_transaction() {
        let artifact = artifact();
        let mut executor = RecordingExecutor::new();

        artifact.up(&mut executor, Dialect::Postgres).await.unwrap();
        artifact.down(&mut executor, Dialect::Postgres).await.unwrap();

        let log = executor.log();
        assert_eq!(log[0], "BEGIN");
        assert!(log[1].starts_with("CREATE TABLE users"));
        assert_eq!(log[2..], ["COMMIT", "BEGIN", "DROP TABLE users", "COMMIT"]);
    }

    #[tokio::test]
    async fn spanner_routines_run_as_batches() {
        let artifact = artifact();
        let mut executor = RecordingExecutor::new();

        artifact.up(&mut executor, Dialect::Spanner).await.unwrap();
        artifact.down(&mut executor, Dialect::Spanner).await.unwrap();

        let log = executor.log();
        assert_eq!(log.len(), 2);
        assert!(log[0].ends_with("PRIMARY KEY (id)"));
        assert_eq!(log[1], "DROP TABLE users");
    }

    #[tokio::test]
    async fn failing_statement_stops_the_routine() {
        let artifact = artifact();
        let mut executor = RecordingExecutor::new().fail_on("CREATE TABLE users");

        let err = artifact.up(&mut executor, Dialect::Postgres).await.unwrap_err();
        assert!(err.message.contains("injected failure"));
        assert_eq!(executor.log().last().map(String::as_str), Some("ROLLBACK"));
    }

    #[tokio::test]
    async fn load_rejects_unknown_formats() {
        let dir = tempfile::tempdir().unwrap();
        let mut artifact = artifact();
        artifact.format = "twinddl-migration/999".to_string();
        let path = dir.path().join("0001_create_users.json");
        std::fs::write(&path, artifact.to_json_pretty().unwrap()).unwrap();

        let err = load_artifact(&path).await.unwrap_err();
        assert!(matches!(err, MigrateError::UnsupportedFormat { format, .. } if format == "twinddl-migration/999"));
    }

    #[tokio::test]
    async fn load_reports_parse_errors_with_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("0001_broken.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = load_artifact(&path).await.unwrap_err();
        assert!(matches!(err, MigrateError::ParseError { path: p, .. } if p == path));
    }
}
