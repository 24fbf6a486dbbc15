//! Migration artifact synthesis.
//!
//! A migration is the diff between the persisted baseline and the current
//! schema, compiled in both directions for every dialect.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::diff::{SchemaDiff, diff};
use crate::dialect::{Diagnostic, Dialect, Routine};
use crate::error::Result;
use crate::snapshot::SchemaSnapshot;

/// Format tag written into every artifact.
pub const ARTIFACT_FORMAT: &str = "twinddl-migration/1";

/// Up and down routines for one dialect.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DialectRoutines {
    /// Applies the migration.
    pub up: Routine,
    /// Reverts the migration.
    pub down: Routine,
}

/// A self-contained migration, persisted as JSON.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationArtifact {
    /// Artifact format tag, see [`ARTIFACT_FORMAT`].
    pub format: String,
    /// Migration name as given by the user.
    pub name: String,
    /// Baseline to current.
    pub up_diff: SchemaDiff,
    /// Current to baseline.
    pub down_diff: SchemaDiff,
    /// PostgreSQL routines.
    pub postgres: DialectRoutines,
    /// Spanner routines.
    pub spanner: DialectRoutines,
    /// Compile findings from every direction and dialect.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub diagnostics: Vec<Diagnostic>,
}

impl MigrationArtifact {
    /// Returns the routines for `dialect`.
    #[must_use]
    pub const fn routines(&self, dialect: Dialect) -> &DialectRoutines {
        match dialect {
            Dialect::Postgres => &self.postgres,
            Dialect::Spanner => &self.spanner,
        }
    }

    /// Returns `true` if this artifact's format is understood.
    #[must_use]
    pub fn is_supported_format(&self) -> bool {
        self.format == ARTIFACT_FORMAT
    }

    /// File name for this artifact given a timestamp prefix
    /// (`YYYYMMDDHHMMSS`).
    #[must_use]
    pub fn file_name(&self, timestamp: &str) -> String {
        format!("{timestamp}_{}.json", self.name)
    }

    /// Parses an artifact from JSON.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error if the document is malformed.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Serializes the artifact as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns the `serde_json` error if serialization fails.
    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Result of [`synthesize`].
#[derive(Debug, Clone, PartialEq)]
pub enum Synthesis {
    /// Baseline and current schema are identical.
    NoChanges,
    /// A new migration.
    Migration(Box<MigrationArtifact>),
}

/// Builds a migration from `baseline` to `current`.
///
/// Returns [`Synthesis::NoChanges`] when both directions are empty; the
/// caller must then neither write a file nor advance the baseline.
///
/// # Errors
///
/// Returns a [`CompileError`](crate::CompileError) if either direction
/// cannot be expressed in one of the dialects.
pub fn synthesize(
    name: &str,
    baseline: &SchemaSnapshot,
    current: &SchemaSnapshot,
) -> Result<Synthesis> {
    let up_diff = diff(baseline, current);
    let down_diff = diff(current, baseline);

    if up_diff.is_empty() && down_diff.is_empty() {
        info!(name = %name, "No schema changes detected");
        return Ok(Synthesis::NoChanges);
    }

    let mut diagnostics = Vec::new();
    let mut compile = |dialect: Dialect| -> Result<DialectRoutines> {
        let compiler = dialect.compiler();
        let up = compiler.compile_diff(&up_diff)?;
        let down = compiler.compile_diff(&down_diff)?;
        debug!(
            dialect = %dialect,
            up = up.batches.len(),
            down = down.batches.len(),
            "Compiled migration routines"
        );
        diagnostics.extend(up.diagnostics.iter().cloned());
        diagnostics.extend(down.diagnostics.iter().cloned());
        Ok(DialectRoutines {
            up: up.into_routine(),
            down: down.into_routine(),
        })
    };

    let postgres = compile(Dialect::Postgres)?;
    let spanner = compile(Dialect::Spanner)?;

    info!(
        name = %name,
        actions = up_diff.len(),
        diagnostics = diagnostics.len(),
        "Synthesized migration"
    );

    Ok(Synthesis::Migration(Box::new(MigrationArtifact {
        format: ARTIFACT_FORMAT.to_string(),
        name: name.to_string(),
        up_diff,
        down_diff,
        postgres,
        spanner,
        diagnostics,
    })))
}
