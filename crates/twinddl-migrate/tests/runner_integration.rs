//! End-to-end runner and writer tests over a temporary migrations directory
//! and the in-memory recording executor.

use std::path::Path;

use pretty_assertions::assert_eq;
use tempfile::TempDir;
use twinddl_core::prelude::*;
use twinddl_migrate::prelude::*;

fn bigint(name: &str) -> ColumnSnapshot {
    ColumnSnapshot::new(name, ColumnType::BigInt, DialectTypes::new("BIGINT", "INT64"))
}

fn table(name: &str) -> TableSnapshot {
    TableSnapshot::new(name).with_column(bigint("id").primary_key())
}

fn write_artifact(dir: &Path, file_stem: &str, baseline: &SchemaSnapshot, current: &SchemaSnapshot) {
    let Synthesis::Migration(artifact) = synthesize(file_stem, baseline, current).unwrap() else {
        panic!("expected a migration");
    };
    std::fs::write(
        dir.join(format!("{file_stem}.json")),
        artifact.to_json_pretty().unwrap(),
    )
    .unwrap();
}

/// `0001` creates table `a`, `0002` creates table `b`.
fn two_migrations() -> TempDir {
    let dir = TempDir::new().unwrap();
    let v1 = SchemaSnapshot::new().with_table(table("a"));
    let v2 = v1.clone().with_table(table("b"));
    write_artifact(dir.path(), "0001", &SchemaSnapshot::new(), &v1);
    write_artifact(dir.path(), "0002", &v1, &v2);
    dir
}

fn count(log: &[String], needle: &str) -> usize {
    log.iter().filter(|s| s.starts_with(needle)).count()
}

#[tokio::test]
async fn applies_pending_in_order() {
    let dir = two_migrations();
    let mut runner = MigrationRunner::new(RecordingExecutor::new(), Dialect::Postgres, dir.path());

    let applied = runner.run_pending().await.unwrap();
    assert_eq!(applied, vec!["0001", "0002"]);
    assert_eq!(runner.applied_names().await.unwrap(), vec!["0001", "0002"]);

    let schema = runner.executor().schema_statements();
    assert_eq!(schema.len(), 2);
    assert!(schema[0].starts_with("CREATE TABLE a"));
    assert!(schema[1].starts_with("CREATE TABLE b"));

    // A second run finds nothing to do.
    assert!(runner.run_pending().await.unwrap().is_empty());
    assert_eq!(runner.executor().schema_statements().len(), 2);
}

#[tokio::test]
async fn reverts_only_the_latest() {
    let dir = two_migrations();
    let mut runner = MigrationRunner::new(RecordingExecutor::new(), Dialect::Postgres, dir.path());
    runner.run_pending().await.unwrap();

    let reverted = runner.revert_last().await.unwrap();
    assert_eq!(reverted.as_deref(), Some("0002"));
    assert_eq!(runner.applied_names().await.unwrap(), vec!["0001"]);
    assert_eq!(count(runner.executor().log(), "DROP TABLE b"), 1);
    assert_eq!(count(runner.executor().log(), "DROP TABLE a"), 0);
}

#[tokio::test]
async fn revert_with_nothing_applied_is_a_no_op() {
    let dir = two_migrations();
    let mut runner = MigrationRunner::new(RecordingExecutor::new(), Dialect::Postgres, dir.path());
    runner.ensure_ledger().await.unwrap();

    assert_eq!(runner.revert_last().await.unwrap(), None);
    assert!(runner.executor().schema_statements().is_empty());
}

#[tokio::test]
async fn failure_keeps_earlier_migrations_applied() {
    let dir = two_migrations();
    let executor = RecordingExecutor::new().fail_on("CREATE TABLE b");
    let mut runner = MigrationRunner::new(executor, Dialect::Postgres, dir.path());

    let err = runner.run_pending().await.unwrap_err();
    match err {
        MigrateError::MigrationApply { name, .. } => assert_eq!(name, "0002"),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(runner.applied_names().await.unwrap(), vec!["0001"]);
    assert!(runner.executor().log().iter().any(|s| s == "ROLLBACK"));

    // Fixing the cause and rerunning picks up where the run stopped.
    runner.executor_mut().clear_failure();
    assert_eq!(runner.run_pending().await.unwrap(), vec!["0002"]);
    assert_eq!(count(runner.executor().log(), "CREATE TABLE a"), 1);
}

#[tokio::test]
async fn revert_requires_the_artifact_file() {
    let dir = two_migrations();
    let mut runner = MigrationRunner::new(RecordingExecutor::new(), Dialect::Postgres, dir.path());
    runner.run_pending().await.unwrap();

    std::fs::remove_file(dir.path().join("0002.json")).unwrap();
    let err = runner.revert_last().await.unwrap_err();
    assert!(matches!(err, MigrateError::MissingMigrationFile { ref name, .. } if name == "0002"));
    assert_eq!(runner.applied_names().await.unwrap(), vec!["0001", "0002"]);
}

#[tokio::test]
async fn status_merges_disk_and_ledger() {
    let dir = two_migrations();
    let mut runner = MigrationRunner::new(RecordingExecutor::new(), Dialect::Postgres, dir.path());

    // No ledger yet: everything pending.
    let statuses = runner.status().await.unwrap();
    assert_eq!(statuses.len(), 2);
    assert!(statuses.iter().all(|s| !s.is_applied() && s.on_disk));

    runner.run_pending().await.unwrap();
    runner.revert_last().await.unwrap();

    let statuses = runner.status().await.unwrap();
    let summary: Vec<(&str, bool)> = statuses
        .iter()
        .map(|s| (s.name.as_str(), s.is_applied()))
        .collect();
    assert_eq!(summary, vec![("0001", true), ("0002", false)]);
}

#[tokio::test]
async fn ledger_is_per_dialect() {
    let dir = two_migrations();
    let mut runner = MigrationRunner::new(RecordingExecutor::new(), Dialect::Postgres, dir.path());
    runner.run_pending().await.unwrap();

    let executor = runner.into_executor();
    let mut spanner = MigrationRunner::new(executor, Dialect::Spanner, dir.path());
    assert!(spanner.applied_names().await.unwrap().is_empty());
    assert_eq!(spanner.pending().await.unwrap().len(), 2);
}

#[tokio::test]
async fn spanner_runs_batches_without_transactions() {
    let dir = two_migrations();
    let mut runner = MigrationRunner::new(RecordingExecutor::new(), Dialect::Spanner, dir.path());

    assert_eq!(runner.run_pending().await.unwrap(), vec!["0001", "0002"]);
    let log = runner.executor().log();
    assert!(!log.iter().any(|s| s == "BEGIN"));
    let schema = runner.executor().schema_statements();
    assert!(schema[0].starts_with("CREATE TABLE a"));
    assert!(schema[0].ends_with("PRIMARY KEY (id)"));
}

#[tokio::test]
async fn ignores_non_migration_files() {
    let dir = two_migrations();
    std::fs::write(dir.path().join("schema.snapshot.json"), "{}").unwrap();
    std::fs::write(dir.path().join("README.md"), "notes").unwrap();

    let runner = MigrationRunner::new(RecordingExecutor::new(), Dialect::Postgres, dir.path());
    let names: Vec<String> = runner
        .discover()
        .await
        .unwrap()
        .into_iter()
        .map(|f| f.name)
        .collect();
    assert_eq!(names, vec!["0001", "0002"]);
}

#[tokio::test]
async fn skips_unsupported_artifact_formats() {
    let dir = two_migrations();
    let path = dir.path().join("0002.json");
    let json = std::fs::read_to_string(&path)
        .unwrap()
        .replace(ARTIFACT_FORMAT, "twinddl-migration/99");
    std::fs::write(&path, json).unwrap();

    let mut runner = MigrationRunner::new(RecordingExecutor::new(), Dialect::Postgres, dir.path());
    assert_eq!(runner.run_pending().await.unwrap(), vec!["0001"]);
    assert_eq!(count(runner.executor().log(), "CREATE TABLE b"), 0);
}

#[tokio::test]
async fn missing_directory_has_no_migrations() {
    let dir = TempDir::new().unwrap();
    let mut runner = MigrationRunner::new(
        RecordingExecutor::new(),
        Dialect::Postgres,
        dir.path().join("absent"),
    );
    assert!(runner.run_pending().await.unwrap().is_empty());
    assert!(runner.executor().ledger_exists());
}

#[tokio::test]
async fn create_writes_artifact_and_advances_baseline() {
    let dir = TempDir::new().unwrap();
    let config = MigrateConfig::new(dir.path());
    let baseline_path = config.baseline_path.clone();
    let writer = MigrationWriter::new(config);
    let schema = SchemaSnapshot::new().with_table(table("a"));

    let outcome = writer.create("create_a", &schema).await.unwrap();
    let CreateOutcome::Created { path, actions, .. } = outcome else {
        panic!("expected a migration");
    };
    assert_eq!(actions, 1);
    assert!(path.file_name().unwrap().to_str().unwrap().ends_with("_create_a.json"));

    let artifact = load_artifact(&path).await.unwrap();
    assert_eq!(artifact.name, "create_a");
    assert_eq!(load_baseline(&baseline_path).await.unwrap(), schema);

    // The written artifact applies through the runner.
    let mut runner = MigrationRunner::new(RecordingExecutor::new(), Dialect::Postgres, dir.path());
    assert_eq!(runner.run_pending().await.unwrap().len(), 1);
}

#[tokio::test]
async fn create_without_changes_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let config = MigrateConfig::new(dir.path());
    let baseline_path = config.baseline_path.clone();
    let schema = SchemaSnapshot::new().with_table(table("a"));
    save_baseline(&baseline_path, &schema).await.unwrap();
    let before = std::fs::read_to_string(&baseline_path).unwrap();

    let outcome = MigrationWriter::new(config).create("noop", &schema).await.unwrap();
    assert_eq!(outcome, CreateOutcome::NoChanges);

    let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
    assert_eq!(entries.len(), 1);
    assert_eq!(std::fs::read_to_string(&baseline_path).unwrap(), before);
}

#[tokio::test]
async fn create_rejects_bad_names() {
    let dir = TempDir::new().unwrap();
    let writer = MigrationWriter::new(MigrateConfig::new(dir.path()));
    let err = writer
        .create("add users", &SchemaSnapshot::new())
        .await
        .unwrap_err();
    assert!(matches!(err, MigrateError::InvalidName(_)));
}
