//! Cloud Spanner (GoogleSQL) DDL compiler.
//!
//! Spanner has no inline constraints: primary keys follow the closing
//! parenthesis, uniqueness is a separate index and foreign keys are table
//! constraints. Only `CASCADE` and `NO ACTION` are accepted as delete
//! actions. Keys and interleaving are fixed at creation time.

use serde_json::Value;

use super::{
    DdlCompiler, Diagnostic, Dialect, current_time_function, quote_string, unique_constraint_name,
};
use crate::diff::{ColumnFieldChange, InterleaveDiff, TableChange};
use crate::error::Result;
use crate::snapshot::{
    ColumnSnapshot, DialectTypes, ForeignKeyAction, ForeignKeySnapshot, IndexSnapshot,
    TableSnapshot,
};

const RESERVED: &[&str] = &[
    "ALL", "AND", "ANY", "ARRAY", "AS", "ASC", "ASSERT_ROWS_MODIFIED", "AT", "BETWEEN", "BY",
    "CASE", "CAST", "COLLATE", "CONTAINS", "CREATE", "CROSS", "CUBE", "CURRENT", "DEFAULT",
    "DEFINE", "DESC", "DISTINCT", "ELSE", "END", "ENUM", "ESCAPE", "EXCEPT", "EXCLUDE", "EXISTS",
    "EXTRACT", "FALSE", "FETCH", "FOLLOWING", "FOR", "FROM", "FULL", "GROUP", "GROUPING",
    "GROUPS", "HASH", "HAVING", "IF", "IGNORE", "IN", "INNER", "INTERSECT", "INTERVAL", "INTO",
    "IS", "JOIN", "LATERAL", "LEFT", "LIKE", "LIMIT", "LOOKUP", "MERGE", "NATURAL", "NEW", "NO",
    "NOT", "NULL", "NULLS", "OF", "ON", "OR", "ORDER", "OUTER", "OVER", "PARTITION", "PRECEDING",
    "PROTO", "RANGE", "RECURSIVE", "RESPECT", "RIGHT", "ROLLUP", "ROWS", "SELECT", "SET", "SOME",
    "STRUCT", "TABLESAMPLE", "THEN", "TO", "TREAT", "TRUE", "UNBOUNDED", "UNION", "UNNEST",
    "USING", "WHEN", "WHERE", "WINDOW", "WITH", "WITHIN",
];

/// Cloud Spanner compiler.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpannerCompiler;

impl SpannerCompiler {
    /// Creates a new Spanner compiler.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn column_definition(&self, col: &ColumnSnapshot, not_null: bool) -> String {
        let mut sql = format!(
            "{} {}",
            self.quote_identifier(&col.name),
            col.dialect_types.spanner
        );
        if not_null {
            sql.push_str(" NOT NULL");
        }
        if let Some(default) = col.default.as_ref().and_then(|d| self.render_default(d)) {
            sql.push_str(&format!(" DEFAULT ({default})"));
        }
        sql
    }

    /// Maps a requested delete action onto the two Spanner supports.
    fn delete_action(
        &self,
        table: &str,
        column: &str,
        action: Option<ForeignKeyAction>,
        diags: &mut Vec<Diagnostic>,
    ) -> Option<&'static str> {
        match action? {
            ForeignKeyAction::Cascade => Some("CASCADE"),
            ForeignKeyAction::NoAction => Some("NO ACTION"),
            other => {
                self.diagnose(
                    diags,
                    table,
                    format!(
                        "ON DELETE {} on {table}.{column} is not supported; using NO ACTION",
                        other.as_sql()
                    ),
                );
                Some("NO ACTION")
            }
        }
    }

    fn foreign_key_constraint(
        &self,
        table: &str,
        column: &str,
        fk: &ForeignKeySnapshot,
        diags: &mut Vec<Diagnostic>,
    ) -> String {
        let mut sql = format!(
            "CONSTRAINT {} FOREIGN KEY ({}) REFERENCES {} ({})",
            self.quote_identifier(&fk.constraint_name(table, column)),
            self.quote_identifier(column),
            self.quote_identifier(&fk.table),
            self.quote_identifier(&fk.column)
        );
        if let Some(action) = self.delete_action(table, column, fk.on_delete, diags) {
            sql.push_str(" ON DELETE ");
            sql.push_str(action);
        }
        sql
    }

    fn unique_index(&self, table: &str, column: &str) -> String {
        self.create_index(
            table,
            &IndexSnapshot::new([column])
                .named(unique_constraint_name(table, column))
                .unique(),
        )
    }

    fn drop_unique_index(&self, table: &str, column: &str) -> String {
        format!(
            "DROP INDEX {}",
            self.quote_identifier(&unique_constraint_name(table, column))
        )
    }

    fn drop_constraint(&self, table: &str, name: &str) -> String {
        self.alter(table, &format!("DROP CONSTRAINT {}", self.quote_identifier(name)))
    }

    fn alter(&self, table: &str, clause: &str) -> String {
        format!("ALTER TABLE {} {clause}", self.quote_identifier(table))
    }
}

impl DdlCompiler for SpannerCompiler {
    fn dialect(&self) -> Dialect {
        Dialect::Spanner
    }

    fn reserved_words(&self) -> &'static [&'static str] {
        RESERVED
    }

    fn delimit(&self, name: &str) -> String {
        format!("`{}`", name.replace('`', "\\`"))
    }

    fn physical_type<'a>(&self, types: &'a DialectTypes) -> &'a str {
        &types.spanner
    }

    fn render_literal(&self, value: &Value) -> String {
        match value {
            Value::Null => "NULL".to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => n.to_string(),
            Value::String(s) => quote_string(s),
            Value::Array(_) | Value::Object(_) => format!("JSON {}", quote_string(&value.to_string())),
        }
    }

    fn render_expression(&self, expr: &str) -> String {
        current_time_function(expr).map_or_else(|| expr.to_string(), |f| format!("{f}()"))
    }

    fn create_table(&self, table: &TableSnapshot, diags: &mut Vec<Diagnostic>) -> Result<Vec<String>> {
        self.check_index_names(table)?;
        let pk_columns = table.effective_primary_key();

        let mut defs: Vec<String> = table
            .columns
            .values()
            .map(|c| {
                let not_null = !c.nullable || c.primary_key || pk_columns.contains(&c.name);
                format!("    {}", self.column_definition(c, not_null))
            })
            .collect();

        for col in table.columns.values() {
            if let Some(fk) = &col.foreign_key {
                defs.push(format!(
                    "    {}",
                    self.foreign_key_constraint(&table.name, &col.name, fk, diags)
                ));
            }
        }

        let mut create = format!(
            "CREATE TABLE {} (\n{}\n) PRIMARY KEY ({})",
            self.quote_identifier(&table.name),
            defs.join(",\n"),
            self.column_list(&pk_columns)
        );
        if let Some(interleave) = &table.interleave {
            create.push_str(&format!(
                ",\n  INTERLEAVE IN PARENT {} ON DELETE {}",
                self.quote_identifier(&interleave.parent),
                interleave.on_delete.as_sql()
            ));
        }

        let mut statements = vec![create];
        statements.extend(
            table
                .columns
                .values()
                .filter(|c| c.unique)
                .map(|c| self.unique_index(&table.name, &c.name)),
        );
        statements.extend(table.indexes.iter().map(|i| self.create_index(&table.name, i)));
        Ok(statements)
    }

    fn drop_table(&self, previous: &TableSnapshot) -> Vec<String> {
        let table = previous.name.as_str();
        let mut statements: Vec<String> = previous
            .indexes
            .iter()
            .map(|i| self.drop_index(table, i))
            .collect();
        for col in previous.columns.values() {
            if col.unique {
                statements.push(self.drop_unique_index(table, &col.name));
            }
        }
        for col in previous.columns.values() {
            if let Some(fk) = &col.foreign_key {
                statements.push(self.drop_constraint(table, &fk.constraint_name(table, &col.name)));
            }
        }
        statements.push(format!("DROP TABLE {}", self.quote_identifier(table)));
        statements
    }

    fn add_column(
        &self,
        table: &str,
        column: &ColumnSnapshot,
        diags: &mut Vec<Diagnostic>,
    ) -> Result<Vec<String>> {
        if column.primary_key {
            return Err(self.unsupported(
                table,
                &format!("adding primary key column '{}' to an existing table", column.name),
            ));
        }

        let mut statements = vec![self.alter(
            table,
            &format!("ADD COLUMN {}", self.column_definition(column, !column.nullable)),
        )];
        if column.unique {
            statements.push(self.unique_index(table, &column.name));
        }
        if let Some(fk) = &column.foreign_key {
            let constraint = self.foreign_key_constraint(table, &column.name, fk, diags);
            statements.push(self.alter(table, &format!("ADD {constraint}")));
        }
        Ok(statements)
    }

    fn drop_column(&self, table: &str, previous: &ColumnSnapshot) -> Result<Vec<String>> {
        if previous.primary_key {
            return Err(self.unsupported(
                table,
                &format!("dropping primary key column '{}'", previous.name),
            ));
        }

        let mut statements = Vec::new();
        if previous.unique {
            statements.push(self.drop_unique_index(table, &previous.name));
        }
        if let Some(fk) = &previous.foreign_key {
            statements.push(self.drop_constraint(table, &fk.constraint_name(table, &previous.name)));
        }
        statements.push(self.alter(
            table,
            &format!("DROP COLUMN {}", self.quote_identifier(&previous.name)),
        ));
        Ok(statements)
    }

    fn alter_column(
        &self,
        change: &TableChange,
        column: &ColumnSnapshot,
        key_column: bool,
        fields: &[ColumnFieldChange],
        diags: &mut Vec<Diagnostic>,
    ) -> Result<Vec<String>> {
        let table = change.name.as_str();
        let name = self.quote_identifier(&column.name);
        let physical = &column.dialect_types.spanner;

        // ALTER COLUMN restates the whole column; until the nullability
        // statement runs the column keeps its previous nullability. Key
        // columns are always NOT NULL.
        let nullability_changes = fields
            .iter()
            .any(|f| matches!(f, ColumnFieldChange::Nullable { .. }));
        let nullable_before = if nullability_changes {
            !column.nullable
        } else {
            column.nullable
        };
        let restate = |nullable: bool| {
            let suffix = if nullable && !key_column { "" } else { " NOT NULL" };
            self.alter(table, &format!("ALTER COLUMN {name} {physical}{suffix}"))
        };

        let mut statements = Vec::new();
        for field in fields {
            match field {
                ColumnFieldChange::Type { .. } => statements.push(restate(nullable_before)),
                ColumnFieldChange::Nullable { nullable } => statements.push(restate(*nullable)),
                ColumnFieldChange::Default { from, to } => {
                    let new = to.as_ref().and_then(|d| self.render_default(d));
                    let old = from.as_ref().and_then(|d| self.render_default(d));
                    match (old, new) {
                        (_, Some(value)) => statements.push(self.alter(
                            table,
                            &format!("ALTER COLUMN {name} SET DEFAULT ({value})"),
                        )),
                        (Some(_), None) => statements
                            .push(self.alter(table, &format!("ALTER COLUMN {name} DROP DEFAULT"))),
                        (None, None) => {}
                    }
                }
                ColumnFieldChange::PrimaryKey { .. } => {
                    return Err(self.unsupported(
                        table,
                        &format!("changing the primary key flag of column '{}'", column.name),
                    ));
                }
                ColumnFieldChange::Unique { unique: true } => {
                    statements.push(self.unique_index(table, &column.name));
                }
                ColumnFieldChange::Unique { unique: false } => {
                    statements.push(self.drop_unique_index(table, &column.name));
                }
                ColumnFieldChange::ForeignKey { from, to } => {
                    if let Some(old) = from {
                        statements
                            .push(self.drop_constraint(table, &old.constraint_name(table, &column.name)));
                    }
                    if let Some(new) = to {
                        let constraint = self.foreign_key_constraint(table, &column.name, new, diags);
                        statements.push(self.alter(table, &format!("ADD {constraint}")));
                    }
                }
            }
        }
        Ok(statements)
    }

    fn alter_table_constraints(&self, change: &TableChange) -> Result<Vec<String>> {
        let table = change.name.as_str();

        if change.primary_key.is_some() {
            return Err(self.unsupported(table, "changing the primary key of an existing table"));
        }

        match &change.interleave {
            None => Ok(Vec::new()),
            Some(InterleaveDiff::Set { from: Some(old), to }) if old.parent == to.parent => {
                Ok(vec![self.alter(
                    table,
                    &format!("SET ON DELETE {}", to.on_delete.as_sql()),
                )])
            }
            Some(InterleaveDiff::Set { to, .. }) => Err(self.unsupported(
                table,
                &format!("interleaving an existing table in '{}'", to.parent),
            )),
            Some(InterleaveDiff::Remove { previous }) => Err(self.unsupported(
                table,
                &format!("removing interleave in '{}'", previous.parent),
            )),
        }
    }
}
