//! # twinddl-core
//!
//! One relational schema, two SQL engines.
//!
//! This crate provides:
//! - A canonical, JSON-serializable snapshot of a schema
//! - A pure diff between two snapshots
//! - DDL compilers for PostgreSQL and Cloud Spanner
//! - Synthesis of reversible migration artifacts for both dialects
//!
//! Nothing here performs I/O; executing the output is the job of
//! `twinddl-migrate`.
//!
//! ## Compiling a schema
//!
//! ```rust
//! use twinddl_core::prelude::*;
//!
//! let schema = SchemaSnapshot::new().with_table(
//!     TableSnapshot::new("users")
//!         .with_column(
//!             ColumnSnapshot::new("id", ColumnType::BigInt, DialectTypes::new("BIGINT", "INT64"))
//!                 .primary_key(),
//!         )
//!         .with_column(
//!             ColumnSnapshot::new(
//!                 "email",
//!                 ColumnType::String,
//!                 DialectTypes::new("VARCHAR(255)", "STRING(255)"),
//!             )
//!             .not_null()
//!             .unique(),
//!         ),
//! );
//!
//! let spanner = Dialect::Spanner.compiler().compile_schema(&schema).unwrap();
//! assert_eq!(
//!     spanner.statements()[1],
//!     "CREATE UNIQUE INDEX users_email_key ON users (email)"
//! );
//! ```
//!
//! ## Synthesizing a migration
//!
//! ```rust
//! use twinddl_core::prelude::*;
//!
//! let baseline = SchemaSnapshot::new();
//! let current = baseline.clone().with_table(TableSnapshot::new("events"));
//!
//! match synthesize("create_events", &baseline, &current).unwrap() {
//!     Synthesis::Migration(artifact) => {
//!         let down = &artifact.routines(Dialect::Postgres).down;
//!         assert_eq!(down.statements(), vec!["DROP TABLE events"]);
//!     }
//!     Synthesis::NoChanges => unreachable!(),
//! }
//! ```

pub mod dialect;
pub mod diff;
pub mod error;
pub mod snapshot;
pub mod synthesize;

pub use dialect::{
    CompiledDdl, DdlCompiler, Diagnostic, Dialect, PostgresCompiler, Routine, SpannerCompiler,
};
pub use diff::{SchemaDiff, diff};
pub use error::{CompileError, Result};
pub use snapshot::{SNAPSHOT_VERSION, SchemaSnapshot, TableSnapshot};
pub use synthesize::{ARTIFACT_FORMAT, DialectRoutines, MigrationArtifact, Synthesis, synthesize};

/// Prelude for convenient imports.
pub mod prelude {
    pub use crate::dialect::{
        CompiledDdl, DdlCompiler, Diagnostic, Dialect, PostgresCompiler, Routine, SpannerCompiler,
    };
    pub use crate::diff::{
        ColumnDiff, ColumnFieldChange, IndexDiff, InterleaveDiff, KeyColumnsChange, PrimaryKeyDiff,
        SchemaDiff, TableChange, TableDiff, diff, diff_table,
    };
    pub use crate::error::{CompileError, Result};
    pub use crate::snapshot::{
        ColumnSnapshot, ColumnType, DefaultValue, DialectTypes, ForeignKeyAction,
        ForeignKeySnapshot, IndexSnapshot, InterleaveOnDelete, InterleaveSnapshot,
        PrimaryKeySnapshot, SchemaSnapshot, TableSnapshot,
    };
    pub use crate::synthesize::{
        ARTIFACT_FORMAT, DialectRoutines, MigrationArtifact, Synthesis, synthesize,
    };
}
