//! Filesystem layout of a migration project.

use std::path::{Path, PathBuf};

/// Default migrations directory.
pub const DEFAULT_MIGRATIONS_DIR: &str = "migrations";

/// File name of the baseline snapshot inside the migrations directory.
pub const BASELINE_FILE_NAME: &str = "schema.snapshot.json";

/// Where migration artifacts and the baseline snapshot live.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MigrateConfig {
    /// Directory holding `<timestamp>_<name>.json` artifacts.
    pub migrations_dir: PathBuf,
    /// Path of the persisted baseline snapshot.
    pub baseline_path: PathBuf,
}

impl Default for MigrateConfig {
    fn default() -> Self {
        Self::new(DEFAULT_MIGRATIONS_DIR)
    }
}

impl MigrateConfig {
    /// Uses `migrations_dir` with the baseline stored inside it.
    #[must_use]
    pub fn new(migrations_dir: impl Into<PathBuf>) -> Self {
        let migrations_dir = migrations_dir.into();
        let baseline_path = migrations_dir.join(BASELINE_FILE_NAME);
        Self {
            migrations_dir,
            baseline_path,
        }
    }

    /// Overrides the baseline path.
    #[must_use]
    pub fn baseline_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.baseline_path = path.into();
        self
    }

    /// Returns the migrations directory.
    #[must_use]
    pub fn migrations_dir(&self) -> &Path {
        &self.migrations_dir
    }
}
