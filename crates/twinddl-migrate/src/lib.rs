//! Migrations for twinddl schemas on PostgreSQL and Cloud Spanner.
//!
//! `twinddl-migrate` turns schema snapshots into migration artifacts and
//! applies them to a live database:
//! - `migrate create` diffs the current schema against a persisted
//!   baseline and writes one JSON artifact holding up and down routines for
//!   both dialects
//! - the runner applies pending artifacts in file-name order and reverts
//!   the latest one, tracking each step in the `schema_migrations` ledger
//! - all database access goes through the [`Executor`] trait
//!
//! # Architecture
//!
//! - **Executor** - The database contract (`execute`, `execute_batch`,
//!   `query`, `transaction`), with a PostgreSQL implementation and an
//!   in-memory recording one
//! - **Ledger** - Reads and writes `schema_migrations`
//! - **Runner** - Discovers, applies and reverts migrations
//! - **Writer** - Generates artifacts and advances the baseline
//!
//! # Example
//!
//! ```rust,no_run
//! use twinddl_migrate::prelude::*;
//!
//! # async fn run() -> twinddl_migrate::Result<()> {
//! let mut executor = PgExecutor::new("postgres://localhost/app");
//! executor.connect().await?;
//!
//! let mut runner = MigrationRunner::new(executor, Dialect::Postgres, "migrations");
//! for name in runner.run_pending().await? {
//!     println!("applied {name}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # CLI Usage
//!
//! ```bash
//! # Print DDL for a schema
//! twinddl ddl --schema schema.json --dialect spanner
//!
//! # Generate a migration from schema changes
//! twinddl migrate create add_users --schema schema.json
//!
//! # Apply pending migrations
//! DATABASE_URL=postgres://localhost/app twinddl migrate latest --dialect postgres
//!
//! # Show migration status
//! twinddl migrate status --dialect postgres
//!
//! # Roll back the last migration
//! twinddl migrate down --dialect postgres
//! ```

pub mod artifact;
pub mod baseline;
pub mod config;
pub mod error;
pub mod executor;
pub mod history;
pub mod postgres;
pub mod recording;
pub mod runner;
pub mod writer;

pub use error::{MigrateError, Result};
pub use executor::{Executor, ExecutorError, ExecutorErrorKind, Row, Value};
pub use postgres::PgExecutor;
pub use recording::RecordingExecutor;

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::artifact::{ArtifactRoutines, load_artifact, run_routine};
    pub use crate::baseline::{load_baseline, save_baseline};
    pub use crate::config::MigrateConfig;
    pub use crate::error::{MigrateError, Result};
    pub use crate::executor::{
        BoxFuture, Executor, ExecutorError, ExecutorErrorKind, Row, TransactionWork, Value,
        transaction_work,
    };
    pub use crate::history::{AppliedMigration, LEDGER_TABLE, MigrationLedger};
    pub use crate::postgres::PgExecutor;
    pub use crate::recording::RecordingExecutor;
    pub use crate::runner::{MigrationFile, MigrationRunner, MigrationStatus, migration_name};
    pub use crate::writer::{CreateOutcome, MigrationWriter, generate_migration_name};
    pub use twinddl_core::{Dialect, MigrationArtifact, SchemaSnapshot};
}
