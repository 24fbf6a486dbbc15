//! Migration runner.
//!
//! Applies pending migrations in file-name order and reverts the most
//! recently applied one, recording each step in the ledger. Migrations run
//! strictly one at a time: migration N+1 starts only after N's routine and
//! its ledger write have both completed. A failure stops the run; earlier
//! migrations of the same run stay applied and recorded.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use twinddl_core::Dialect;

use crate::artifact::{ArtifactRoutines, load_artifact};
use crate::error::{MigrateError, Result};
use crate::executor::Executor;
use crate::history::MigrationLedger;

/// A migration artifact found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationFile {
    /// Ledger name: the file stem, e.g. `20250101120000_create_users`.
    pub name: String,
    /// Path to the artifact.
    pub path: PathBuf,
}

/// One line of `migrate status`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrationStatus {
    /// Migration name.
    pub name: String,
    /// When it was applied, if it was.
    pub applied_at: Option<DateTime<Utc>>,
    /// `false` when the ledger lists a migration with no file on disk.
    pub on_disk: bool,
}

impl MigrationStatus {
    /// Returns `true` if the migration is applied.
    #[must_use]
    pub const fn is_applied(&self) -> bool {
        self.applied_at.is_some()
    }
}

/// Returns the migration name for an artifact file name, or `None` if the
/// file is not a migration artifact.
///
/// Artifacts are `.json` files whose stem starts with a run of digits,
/// optionally followed by `_` and a name: `0001.json`,
/// `20250101120000_create_users.json`.
#[must_use]
pub fn migration_name(file_name: &str) -> Option<&str> {
    let stem = file_name.strip_suffix(".json")?;
    let digits = stem.chars().take_while(char::is_ascii_digit).count();
    if digits == 0 {
        return None;
    }
    match stem[digits..].chars().next() {
        None | Some('_') => Some(stem),
        Some(_) => None,
    }
}

/// Applies and reverts migrations for one dialect through an executor.
pub struct MigrationRunner<E: Executor> {
    executor: E,
    dialect: Dialect,
    migrations_dir: PathBuf,
    ledger: MigrationLedger,
}

impl<E: Executor> MigrationRunner<E> {
    /// Creates a runner reading artifacts from `migrations_dir`.
    #[must_use]
    pub fn new(executor: E, dialect: Dialect, migrations_dir: impl Into<PathBuf>) -> Self {
        Self {
            executor,
            dialect,
            migrations_dir: migrations_dir.into(),
            ledger: MigrationLedger::new(dialect),
        }
    }

    /// Returns the dialect.
    #[must_use]
    pub const fn dialect(&self) -> Dialect {
        self.dialect
    }

    /// Returns the executor.
    #[must_use]
    pub const fn executor(&self) -> &E {
        &self.executor
    }

    /// Returns the executor mutably.
    pub fn executor_mut(&mut self) -> &mut E {
        &mut self.executor
    }

    /// Consumes the runner and returns its executor.
    #[must_use]
    pub fn into_executor(self) -> E {
        self.executor
    }

    /// Returns the migrations directory.
    #[must_use]
    pub fn migrations_dir(&self) -> &Path {
        &self.migrations_dir
    }

    /// Ensures the ledger table exists.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::LedgerCreate`] if the table cannot be created.
    pub async fn ensure_ledger(&mut self) -> Result<()> {
        self.ledger.ensure_table(&mut self.executor).await
    }

    /// Names of the migrations applied for this dialect, in application
    /// order.
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger cannot be read.
    pub async fn applied_names(&mut self) -> Result<Vec<String>> {
        self.ledger.applied_names(&mut self.executor).await
    }

    /// Lists migration artifacts in the migrations directory, sorted by
    /// name. A missing directory has no migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be read.
    pub async fn discover(&self) -> Result<Vec<MigrationFile>> {
        let mut files = Vec::new();

        if !tokio::fs::try_exists(&self.migrations_dir).await? {
            debug!(dir = %self.migrations_dir.display(), "Migrations directory does not exist");
            return Ok(files);
        }

        let mut entries = tokio::fs::read_dir(&self.migrations_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str().and_then(migration_name) else {
                continue;
            };
            files.push(MigrationFile {
                name: name.to_string(),
                path: entry.path(),
            });
        }

        // Timestamp prefixes make lexicographic order chronological.
        files.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(files)
    }

    /// Migrations on disk that are not applied for this dialect, in order.
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger or the directory cannot be read.
    pub async fn pending(&mut self) -> Result<Vec<MigrationFile>> {
        let applied = self.applied_names().await?;
        Ok(self
            .discover()
            .await?
            .into_iter()
            .filter(|f| !applied.contains(&f.name))
            .collect())
    }

    /// Applies every pending migration, in order, and returns the names
    /// applied.
    ///
    /// Artifacts in an unsupported format are skipped. Stops at the first
    /// failure with [`MigrateError::MigrationApply`]; migrations applied
    /// before it remain applied.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::MigrationApply`] for the first failing
    /// migration, or the ledger and filesystem errors that precede it.
    pub async fn run_pending(&mut self) -> Result<Vec<String>> {
        self.ensure_ledger().await?;

        let pending = self.pending().await?;
        if pending.is_empty() {
            info!(dialect = %self.dialect, "No pending migrations");
            return Ok(Vec::new());
        }

        let mut applied = Vec::with_capacity(pending.len());
        for file in pending {
            let artifact = match load_artifact(&file.path).await {
                Ok(artifact) => artifact,
                Err(MigrateError::UnsupportedFormat { format, .. }) => {
                    warn!(name = %file.name, format = %format, "Skipping artifact with unsupported format");
                    continue;
                }
                Err(err) => return Err(err),
            };
            info!(dialect = %self.dialect, name = %file.name, "Applying migration");

            let apply_failed = |source| MigrateError::MigrationApply {
                name: file.name.clone(),
                source,
            };
            artifact
                .up(&mut self.executor, self.dialect)
                .await
                .map_err(apply_failed)?;
            self.ledger
                .record_applied(&mut self.executor, &file.name)
                .await
                .map_err(apply_failed)?;

            applied.push(file.name);
        }

        info!(dialect = %self.dialect, count = applied.len(), "Applied migrations");
        Ok(applied)
    }

    /// Reverts the most recently applied migration and returns its name,
    /// or `None` if nothing is applied.
    ///
    /// # Errors
    ///
    /// Returns [`MigrateError::MissingMigrationFile`] if the artifact is
    /// gone and [`MigrateError::MigrationRevert`] if reverting fails.
    pub async fn revert_last(&mut self) -> Result<Option<String>> {
        let Some(name) = self.applied_names().await?.pop() else {
            info!(dialect = %self.dialect, "No migrations to revert");
            return Ok(None);
        };

        let path = self.migrations_dir.join(format!("{name}.json"));
        if !tokio::fs::try_exists(&path).await? {
            return Err(MigrateError::MissingMigrationFile { name, path });
        }
        let artifact = load_artifact(&path).await?;
        info!(dialect = %self.dialect, name = %name, "Reverting migration");

        let revert_failed = |source| MigrateError::MigrationRevert {
            name: name.clone(),
            source,
        };
        artifact
            .down(&mut self.executor, self.dialect)
            .await
            .map_err(revert_failed)?;
        self.ledger
            .record_unapplied(&mut self.executor, &name)
            .await
            .map_err(revert_failed)?;

        Ok(Some(name))
    }

    /// Every migration on disk or in the ledger, in name order, with its
    /// applied time.
    ///
    /// # Errors
    ///
    /// Returns an error if the ledger or the directory cannot be read.
    pub async fn status(&mut self) -> Result<Vec<MigrationStatus>> {
        let mut applied = self.ledger.get_applied(&mut self.executor).await?;
        let mut statuses: Vec<MigrationStatus> = self
            .discover()
            .await?
            .into_iter()
            .map(|file| {
                let applied_at = applied
                    .iter()
                    .position(|m| m.name == file.name)
                    .map(|i| applied.remove(i).applied_at);
                MigrationStatus {
                    name: file.name,
                    applied_at,
                    on_disk: true,
                }
            })
            .collect();

        statuses.extend(applied.into_iter().map(|m| MigrationStatus {
            name: m.name,
            applied_at: Some(m.applied_at),
            on_disk: false,
        }));
        statuses.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(statuses)
    }
}
