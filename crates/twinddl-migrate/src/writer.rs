//! Migration file generation.
//!
//! `migrate create` diffs the current schema against the baseline, writes
//! one artifact and advances the baseline. When nothing changed neither
//! file is touched.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use tracing::{info, warn};
use twinddl_core::{SchemaSnapshot, Synthesis, synthesize};

use crate::baseline::{load_baseline, save_baseline};
use crate::config::MigrateConfig;
use crate::error::{MigrateError, Result};

/// Timestamp format prefixed to artifact file names.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Generates the ledger name of a migration: `<timestamp>_<name>`.
#[must_use]
pub fn generate_migration_name(timestamp: DateTime<Utc>, name: &str) -> String {
    format!("{}_{name}", timestamp.format(TIMESTAMP_FORMAT))
}

/// Checks that `name` is non-empty and made of ASCII letters, digits and
/// underscores.
///
/// # Errors
///
/// Returns [`MigrateError::InvalidName`] for any other name.
pub fn validate_name(name: &str) -> Result<()> {
    if !name.is_empty() && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(())
    } else {
        Err(MigrateError::InvalidName(name.to_string()))
    }
}

/// Result of [`MigrationWriter::create`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreateOutcome {
    /// Baseline and schema are identical; nothing was written.
    NoChanges,
    /// A new artifact was written and the baseline advanced.
    Created {
        /// Path of the written artifact.
        path: PathBuf,
        /// Number of table actions in the up direction.
        actions: usize,
        /// Number of compile diagnostics recorded in the artifact.
        diagnostics: usize,
    },
}

/// Writes migration artifacts into a project's migrations directory.
#[derive(Debug, Clone)]
pub struct MigrationWriter {
    config: MigrateConfig,
}

impl MigrationWriter {
    /// Creates a writer for the given layout.
    #[must_use]
    pub const fn new(config: MigrateConfig) -> Self {
        Self { config }
    }

    /// Diffs `current` against the baseline and writes a migration
    /// named `name`, stamped with the current time.
    ///
    /// # Errors
    ///
    /// Same as [`create_at`](Self::create_at).
    pub async fn create(&self, name: &str, current: &SchemaSnapshot) -> Result<CreateOutcome> {
        self.create_at(name, current, Utc::now()).await
    }

    /// Like [`create`](Self::create) with an explicit timestamp.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is invalid, the baseline cannot be
    /// read, a dialect cannot compile the change or a file cannot be written.
    pub async fn create_at(
        &self,
        name: &str,
        current: &SchemaSnapshot,
        timestamp: DateTime<Utc>,
    ) -> Result<CreateOutcome> {
        validate_name(name)?;

        let baseline = load_baseline(&self.config.baseline_path).await?;
        let artifact = match synthesize(name, &baseline, current)? {
            Synthesis::NoChanges => {
                info!(name = %name, "No changes detected; nothing written");
                return Ok(CreateOutcome::NoChanges);
            }
            Synthesis::Migration(artifact) => artifact,
        };

        for diagnostic in &artifact.diagnostics {
            warn!(
                dialect = %diagnostic.dialect,
                table = %diagnostic.table,
                "{}",
                diagnostic.message
            );
        }

        tokio::fs::create_dir_all(&self.config.migrations_dir).await?;
        let path = self
            .config
            .migrations_dir
            .join(format!("{}.json", generate_migration_name(timestamp, name)));
        if tokio::fs::try_exists(&path).await? {
            return Err(MigrateError::MigrationExists(path));
        }

        let mut json = artifact.to_json_pretty()?;
        json.push('\n');
        tokio::fs::write(&path, json).await?;
        info!(path = %path.display(), "Created migration");

        save_baseline(&self.config.baseline_path, current).await?;

        Ok(CreateOutcome::Created {
            path,
            actions: artifact.up_diff.len(),
            diagnostics: artifact.diagnostics.len(),
        })
    }
}
