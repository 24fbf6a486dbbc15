//! Persisted baseline snapshot.
//!
//! The baseline is the schema as of the last generated migration. A
//! missing file is an empty baseline.

use std::io::ErrorKind;
use std::path::Path;

use tracing::{debug, info};
use twinddl_core::SchemaSnapshot;

use crate::error::{MigrateError, Result};

/// Reads the baseline, or an empty snapshot if the file does not exist.
///
/// # Errors
///
/// Returns [`MigrateError::ParseError`] for a malformed file and
/// [`MigrateError::Io`] if it cannot be read.
pub async fn load_baseline(path: &Path) -> Result<SchemaSnapshot> {
    match tokio::fs::read_to_string(path).await {
        Ok(json) => SchemaSnapshot::from_json(&json).map_err(|e| MigrateError::ParseError {
            path: path.to_path_buf(),
            message: e.to_string(),
        }),
        Err(err) if err.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "No baseline yet; starting from an empty schema");
            Ok(SchemaSnapshot::new())
        }
        Err(err) => Err(err.into()),
    }
}

/// Writes `snapshot` as the new baseline, creating parent directories.
///
/// # Errors
///
/// Returns an error if the file cannot be serialized or written.
pub async fn save_baseline(path: &Path, snapshot: &SchemaSnapshot) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut json = snapshot.to_json_pretty()?;
    json.push('\n');
    tokio::fs::write(path, json).await?;
    info!(path = %path.display(), tables = snapshot.tables.len(), "Advanced baseline");
    Ok(())
}
