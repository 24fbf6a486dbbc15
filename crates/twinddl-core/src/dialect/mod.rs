//! Dialect-specific DDL compilation.
//!
//! PostgreSQL and Spanner disagree on constraint placement, supported
//! referential actions, default-value syntax and nesting. Each dialect
//! implements [`DdlCompiler`]; the shared walk over a [`SchemaDiff`] lives
//! in the trait's default methods and the dialects fill in the statements.

mod postgres;
mod spanner;

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::warn;

pub use postgres::PostgresCompiler;
pub use spanner::SpannerCompiler;

use crate::diff::{ColumnDiff, ColumnFieldChange, IndexDiff, SchemaDiff, TableChange, TableDiff, diff};
use crate::error::{CompileError, Result};
use crate::snapshot::{
    ColumnSnapshot, DefaultValue, DialectTypes, IndexSnapshot, SchemaSnapshot, TableSnapshot,
};

/// A supported SQL target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// PostgreSQL.
    Postgres,
    /// Cloud Spanner (GoogleSQL).
    Spanner,
}

impl Dialect {
    /// Every supported dialect.
    pub const ALL: [Self; 2] = [Self::Postgres, Self::Spanner];

    /// Returns the dialect tag stored in the ledger.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Postgres => "postgres",
            Self::Spanner => "spanner",
        }
    }

    /// Returns the compiler for this dialect.
    #[must_use]
    pub fn compiler(self) -> &'static dyn DdlCompiler {
        match self {
            Self::Postgres => &PostgresCompiler,
            Self::Spanner => &SpannerCompiler,
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dialect {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Ok(Self::Postgres),
            "spanner" => Ok(Self::Spanner),
            other => Err(format!("unknown dialect '{other}' (expected postgres or spanner)")),
        }
    }
}

/// A non-fatal compile finding, e.g. a downgraded referential action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Dialect that produced the finding.
    pub dialect: Dialect,
    /// Table the finding is about.
    pub table: String,
    /// Human-readable description.
    pub message: String,
}

/// Ordered statements grouped the way the dialect submits them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "steps", rename_all = "camelCase")]
pub enum Routine {
    /// Individual statements run in order inside one transaction.
    Statements(Vec<String>),
    /// Atomic statement batches run in order.
    Batches(Vec<Vec<String>>),
}

impl Routine {
    /// Returns `true` if the routine does nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Statements(s) => s.is_empty(),
            Self::Batches(b) => b.iter().all(Vec::is_empty),
        }
    }

    /// All statements in execution order.
    #[must_use]
    pub fn statements(&self) -> Vec<&str> {
        match self {
            Self::Statements(s) => s.iter().map(String::as_str).collect(),
            Self::Batches(b) => b.iter().flatten().map(String::as_str).collect(),
        }
    }
}

/// Output of a compile: one statement group per table action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledDdl {
    /// Target dialect.
    pub dialect: Dialect,
    /// Statement groups, in execution order.
    pub batches: Vec<Vec<String>>,
    /// Non-fatal findings.
    pub diagnostics: Vec<Diagnostic>,
}

impl CompiledDdl {
    /// All statements, flattened.
    #[must_use]
    pub fn statements(&self) -> Vec<String> {
        self.batches.iter().flatten().cloned().collect()
    }

    /// Returns `true` if no statement was produced.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    /// Groups the output the way the dialect submits schema changes:
    /// PostgreSQL runs individual statements under transactional DDL,
    /// Spanner submits atomic batches.
    #[must_use]
    pub fn into_routine(self) -> Routine {
        match self.dialect {
            Dialect::Postgres => Routine::Statements(self.batches.into_iter().flatten().collect()),
            Dialect::Spanner => Routine::Batches(self.batches),
        }
    }

    /// Renders the statements as a `;`-terminated script.
    #[must_use]
    pub fn to_script(&self) -> String {
        let mut script = String::new();
        for stmt in self.batches.iter().flatten() {
            script.push_str(stmt);
            script.push_str(";\n");
        }
        script
    }
}

/// Returns `true` if `name` is a plain identifier that needs no quoting
/// apart from reserved-word checks.
#[must_use]
pub fn is_bare_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Dialect-specific DDL generation.
///
/// Dialects implement the statement-level hooks; the walk over tables and
/// diffs is shared.
pub trait DdlCompiler: Send + Sync {
    /// The dialect this compiler targets.
    fn dialect(&self) -> Dialect;

    /// Reserved words (uppercase) that must be quoted.
    fn reserved_words(&self) -> &'static [&'static str];

    /// Wraps an identifier in the dialect's delimiters.
    fn delimit(&self, name: &str) -> String;

    /// Selects this dialect's physical type.
    fn physical_type<'a>(&self, types: &'a DialectTypes) -> &'a str;

    /// Renders a literal default.
    fn render_literal(&self, value: &serde_json::Value) -> String;

    /// Renders an expression default, translating dialect-sensitive
    /// expressions.
    fn render_expression(&self, expr: &str) -> String;

    /// Generates the statements creating `table`, including the indexes
    /// that must follow it.
    fn create_table(&self, table: &TableSnapshot, diags: &mut Vec<Diagnostic>) -> Result<Vec<String>>;

    /// Generates the statements dropping `previous`.
    fn drop_table(&self, previous: &TableSnapshot) -> Vec<String>;

    /// Generates the statements adding a column.
    fn add_column(
        &self,
        table: &str,
        column: &ColumnSnapshot,
        diags: &mut Vec<Diagnostic>,
    ) -> Result<Vec<String>>;

    /// Generates the statements dropping a column.
    fn drop_column(&self, table: &str, previous: &ColumnSnapshot) -> Result<Vec<String>>;

    /// Generates one statement per changed column property. `key_column`
    /// is set when the column belongs to the table's primary key.
    fn alter_column(
        &self,
        change: &TableChange,
        column: &ColumnSnapshot,
        key_column: bool,
        fields: &[ColumnFieldChange],
        diags: &mut Vec<Diagnostic>,
    ) -> Result<Vec<String>>;

    /// Generates the statements for composite primary key and interleave
    /// changes.
    fn alter_table_constraints(&self, change: &TableChange) -> Result<Vec<String>>;

    /// Returns `true` if `name` must be quoted in this dialect.
    fn needs_quoting(&self, name: &str) -> bool {
        !is_bare_identifier(name)
            || self
                .reserved_words()
                .contains(&name.to_ascii_uppercase().as_str())
    }

    /// Quotes an identifier when required.
    fn quote_identifier(&self, name: &str) -> String {
        if self.needs_quoting(name) {
            self.delimit(name)
        } else {
            name.to_string()
        }
    }

    /// Quotes and joins a column list.
    fn column_list(&self, columns: &[String]) -> String {
        columns
            .iter()
            .map(|c| self.quote_identifier(c))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Renders a default, or `None` when it has no DDL representation
    /// (client-generated values).
    fn render_default(&self, default: &DefaultValue) -> Option<String> {
        match default {
            DefaultValue::Literal(value) => Some(self.render_literal(value)),
            DefaultValue::Expression(expr) => Some(self.render_expression(expr)),
            DefaultValue::ClientGenerated => None,
        }
    }

    /// Generates `CREATE [UNIQUE] INDEX`.
    fn create_index(&self, table: &str, index: &IndexSnapshot) -> String {
        format!(
            "CREATE {}INDEX {} ON {} ({})",
            if index.unique { "UNIQUE " } else { "" },
            self.quote_identifier(&index.resolved_name(table)),
            self.quote_identifier(table),
            self.column_list(&index.columns)
        )
    }

    /// Generates `DROP INDEX`.
    fn drop_index(&self, table: &str, index: &IndexSnapshot) -> String {
        format!(
            "DROP INDEX {}",
            self.quote_identifier(&index.resolved_name(table))
        )
    }

    /// Records a non-fatal finding.
    fn diagnose(&self, diags: &mut Vec<Diagnostic>, table: &str, message: String) {
        warn!(dialect = %self.dialect(), table = %table, "{message}");
        diags.push(Diagnostic {
            dialect: self.dialect(),
            table: table.to_string(),
            message,
        });
    }

    /// Builds an unsupported-construct error.
    fn unsupported(&self, table: &str, construct: &str) -> CompileError {
        CompileError::Unsupported {
            dialect: self.dialect(),
            table: table.to_string(),
            construct: construct.to_string(),
        }
    }

    /// Fails when two of the table's indexes resolve to the same name, or
    /// one resolves to the name of a `unique` column's constraint.
    fn check_index_names(&self, table: &TableSnapshot) -> Result<()> {
        let mut seen = BTreeSet::new();
        for index in &table.indexes {
            let name = index.resolved_name(&table.name);
            if !seen.insert(name.clone()) {
                return Err(self.unsupported(&table.name, &format!("duplicate index '{name}'")));
            }
            if let Some(column) = table
                .columns
                .values()
                .find(|c| c.unique && unique_constraint_name(&table.name, &c.name) == name)
            {
                return Err(self.unsupported(
                    &table.name,
                    &format!(
                        "index '{name}' duplicating the unique constraint of column '{}'",
                        column.name
                    ),
                ));
            }
        }
        Ok(())
    }

    /// Generates the statements altering an existing table.
    ///
    /// Order: index drops, column additions, column changes, column
    /// removals, index creations, then key and interleave clauses. Index
    /// changes are always drop-and-recreate.
    fn alter_table(&self, change: &TableChange, diags: &mut Vec<Diagnostic>) -> Result<Vec<String>> {
        let table = change.name.as_str();
        let mut statements = Vec::new();

        for index in &change.indexes {
            match index {
                IndexDiff::Remove { index } | IndexDiff::Change { from: index, .. } => {
                    statements.push(self.drop_index(table, index));
                }
                IndexDiff::Add { .. } => {}
            }
        }

        for column in &change.columns {
            if let ColumnDiff::Add { column } = column {
                statements.extend(self.add_column(table, column, diags)?);
            }
        }

        for column in &change.columns {
            if let ColumnDiff::Change {
                column,
                key_column,
                changes,
                ..
            } = column
            {
                statements.extend(self.alter_column(change, column, *key_column, changes, diags)?);
            }
        }

        for column in &change.columns {
            if let ColumnDiff::Remove { previous, .. } = column {
                statements.extend(self.drop_column(table, previous)?);
            }
        }

        for index in &change.indexes {
            match index {
                IndexDiff::Add { index } | IndexDiff::Change { to: index, .. } => {
                    statements.push(self.create_index(table, index));
                }
                IndexDiff::Remove { .. } => {}
            }
        }

        statements.extend(self.alter_table_constraints(change)?);

        Ok(statements)
    }

    /// Compiles a diff into one statement group per table action.
    fn compile_diff(&self, diff: &SchemaDiff) -> Result<CompiledDdl> {
        let mut batches = Vec::new();
        let mut diagnostics = Vec::new();

        for action in &diff.actions {
            let statements = match action {
                TableDiff::Add { table } => self.create_table(table, &mut diagnostics)?,
                TableDiff::Change(change) => self.alter_table(change, &mut diagnostics)?,
                TableDiff::Remove { previous, .. } => self.drop_table(previous),
            };
            if !statements.is_empty() {
                batches.push(statements);
            }
        }

        Ok(CompiledDdl {
            dialect: self.dialect(),
            batches,
            diagnostics,
        })
    }

    /// Compiles a single table as a fresh creation.
    fn compile_table(&self, table: &TableSnapshot) -> Result<CompiledDdl> {
        let mut diagnostics = Vec::new();
        let statements = self.create_table(table, &mut diagnostics)?;
        Ok(CompiledDdl {
            dialect: self.dialect(),
            batches: vec![statements],
            diagnostics,
        })
    }

    /// Compiles a whole schema against an empty baseline.
    fn compile_schema(&self, schema: &SchemaSnapshot) -> Result<CompiledDdl> {
        let empty = SchemaSnapshot {
            version: schema.version.clone(),
            tables: BTreeMap::new(),
        };
        self.compile_diff(&diff(&empty, schema))
    }
}

/// Name of the uniqueness constraint (or index) backing a `unique` column.
#[must_use]
pub fn unique_constraint_name(table: &str, column: &str) -> String {
    format!("{table}_{column}_key")
}

/// Normalizes a current-time expression, returning `None` for any other
/// expression.
pub(crate) fn current_time_function(expr: &str) -> Option<&'static str> {
    let normalized = expr.trim().to_ascii_uppercase();
    match normalized.as_str() {
        "CURRENT_TIMESTAMP" | "CURRENT_TIMESTAMP()" | "NOW()" => Some("CURRENT_TIMESTAMP"),
        "CURRENT_DATE" | "CURRENT_DATE()" => Some("CURRENT_DATE"),
        _ => None,
    }
}

/// Single-quotes a string literal, doubling embedded quotes.
#[must_use]
pub fn quote_string(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
