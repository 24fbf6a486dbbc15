//! PostgreSQL DDL compiler.

use serde_json::Value;
use tracing::debug;

use super::{
    DdlCompiler, Diagnostic, Dialect, current_time_function, quote_string, unique_constraint_name,
};
use crate::diff::{ColumnFieldChange, PrimaryKeyDiff, TableChange};
use crate::error::Result;
use crate::snapshot::{ColumnSnapshot, DialectTypes, ForeignKeySnapshot, TableSnapshot};

/// Reserved key words that cannot be used as bare identifiers.
const RESERVED: &[&str] = &[
    "ALL", "ANALYSE", "ANALYZE", "AND", "ANY", "ARRAY", "AS", "ASC", "ASYMMETRIC",
    "AUTHORIZATION", "BINARY", "BOTH", "CASE", "CAST", "CHECK", "COLLATE", "COLLATION", "COLUMN",
    "CONCURRENTLY", "CONSTRAINT", "CREATE", "CROSS", "CURRENT_CATALOG", "CURRENT_DATE",
    "CURRENT_ROLE", "CURRENT_SCHEMA", "CURRENT_TIME", "CURRENT_TIMESTAMP", "CURRENT_USER",
    "DEFAULT", "DEFERRABLE", "DESC", "DISTINCT", "DO", "ELSE", "END", "EXCEPT", "FALSE", "FETCH",
    "FOR", "FOREIGN", "FREEZE", "FROM", "FULL", "GRANT", "GROUP", "HAVING", "ILIKE", "IN",
    "INITIALLY", "INNER", "INTERSECT", "INTO", "IS", "ISNULL", "JOIN", "LATERAL", "LEADING",
    "LEFT", "LIKE", "LIMIT", "LOCALTIME", "LOCALTIMESTAMP", "NATURAL", "NOT", "NOTNULL", "NULL",
    "OFFSET", "ON", "ONLY", "OR", "ORDER", "OUTER", "OVERLAPS", "PLACING", "PRIMARY",
    "REFERENCES", "RETURNING", "RIGHT", "SELECT", "SESSION_USER", "SIMILAR", "SOME", "SYMMETRIC",
    "SYSTEM_USER", "TABLE", "TABLESAMPLE", "THEN", "TO", "TRAILING", "TRUE", "UNION", "UNIQUE",
    "USER", "USING", "VARIADIC", "VERBOSE", "WHEN", "WHERE", "WINDOW", "WITH",
];

/// PostgreSQL compiler.
///
/// Single-column primary keys are declared inline on the column and
/// repeated as a trailing table-level clause; foreign keys are declared
/// inline with the full `ON DELETE` vocabulary; uniqueness is inline on
/// create and a named constraint on alter. Interleaving has no
/// representation and is skipped.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresCompiler;

impl PostgresCompiler {
    /// Creates a new PostgreSQL compiler.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Generates a column definition. `inline_pk` is set when the column
    /// is the table's single-column primary key.
    fn column_definition(&self, table: &str, col: &ColumnSnapshot, inline_pk: bool) -> String {
        let mut sql = format!(
            "{} {}",
            self.quote_identifier(&col.name),
            col.dialect_types.postgres
        );

        if inline_pk {
            sql.push_str(" PRIMARY KEY");
        } else {
            if !col.nullable {
                sql.push_str(" NOT NULL");
            }
            if col.unique {
                sql.push_str(" UNIQUE");
            }
        }

        if let Some(default) = col.default.as_ref().and_then(|d| self.render_default(d)) {
            sql.push_str(" DEFAULT ");
            sql.push_str(&default);
        }

        if let Some(fk) = &col.foreign_key {
            if let Some(name) = &fk.name {
                sql.push_str(" CONSTRAINT ");
                sql.push_str(&self.quote_identifier(name));
            }
            sql.push(' ');
            sql.push_str(&self.references(fk));
        }

        debug!(table = %table, column = %col.name, "Compiled column definition");
        sql
    }

    fn references(&self, fk: &ForeignKeySnapshot) -> String {
        let mut sql = format!(
            "REFERENCES {} ({})",
            self.quote_identifier(&fk.table),
            self.quote_identifier(&fk.column)
        );
        if let Some(action) = fk.on_delete {
            sql.push_str(" ON DELETE ");
            sql.push_str(action.as_sql());
        }
        sql
    }

    fn alter(&self, table: &str, clause: &str) -> String {
        format!("ALTER TABLE {} {clause}", self.quote_identifier(table))
    }

    fn default_pkey_name(table: &str) -> String {
        format!("{table}_pkey")
    }
}

impl DdlCompiler for PostgresCompiler {
    fn dialect(&self) -> Dialect {
        Dialect::Postgres
    }

    fn reserved_words(&self) -> &'static [&'static str] {
        RESERVED
    }

    fn delimit(&self, name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    // Unquoted identifiers fold to lower case.
    fn needs_quoting(&self, name: &str) -> bool {
        !super::is_bare_identifier(name)
            || name.chars().any(|c| c.is_ascii_uppercase())
            || RESERVED.contains(&name.to_ascii_uppercase().as_str())
    }

    fn physical_type<'a>(&self, types: &'a DialectTypes) -> &'a str {
        &types.postgres
    }

    fn render_literal(&self, value: &Value) -> String {
        match value {
            Value::Null => "NULL".to_string(),
            Value::Bool(true) => "TRUE".to_string(),
            Value::Bool(false) => "FALSE".to_string(),
            Value::Number(n) => n.to_string(),
            Value::String(s) => quote_string(s),
            Value::Array(_) | Value::Object(_) => format!("{}::jsonb", quote_string(&value.to_string())),
        }
    }

    fn render_expression(&self, expr: &str) -> String {
        current_time_function(expr).map_or_else(|| expr.to_string(), str::to_string)
    }

    fn create_table(&self, table: &TableSnapshot, _diags: &mut Vec<Diagnostic>) -> Result<Vec<String>> {
        self.check_index_names(table)?;
        let flagged: Vec<&ColumnSnapshot> =
            table.columns.values().filter(|c| c.primary_key).collect();
        let inline_pk = match (&table.primary_key, flagged.as_slice()) {
            (None, [single]) => Some(single.name.as_str()),
            _ => None,
        };

        let mut defs: Vec<String> = table
            .columns
            .values()
            .map(|c| {
                format!(
                    "    {}",
                    self.column_definition(&table.name, c, inline_pk == Some(c.name.as_str()))
                )
            })
            .collect();

        let pk_columns = table.effective_primary_key();
        if !pk_columns.is_empty() {
            let mut clause = String::from("    ");
            if let Some(name) = table.primary_key.as_ref().and_then(|pk| pk.name.as_ref()) {
                clause.push_str(&format!("CONSTRAINT {} ", self.quote_identifier(name)));
            }
            clause.push_str(&format!("PRIMARY KEY ({})", self.column_list(&pk_columns)));
            defs.push(clause);
        }

        if table.interleave.is_some() {
            debug!(table = %table.name, "Interleave has no PostgreSQL representation; skipped");
        }

        let mut statements = vec![format!(
            "CREATE TABLE {} (\n{}\n)",
            self.quote_identifier(&table.name),
            defs.join(",\n")
        )];
        statements.extend(table.indexes.iter().map(|i| self.create_index(&table.name, i)));
        Ok(statements)
    }

    fn drop_table(&self, previous: &TableSnapshot) -> Vec<String> {
        vec![format!("DROP TABLE {}", self.quote_identifier(&previous.name))]
    }

    fn add_column(
        &self,
        table: &str,
        column: &ColumnSnapshot,
        _diags: &mut Vec<Diagnostic>,
    ) -> Result<Vec<String>> {
        // The key is re-declared by `alter_table_constraints`.
        let def = self.column_definition(table, column, false);
        Ok(vec![self.alter(table, &format!("ADD COLUMN {def}"))])
    }

    fn drop_column(&self, table: &str, previous: &ColumnSnapshot) -> Result<Vec<String>> {
        Ok(vec![self.alter(
            table,
            &format!("DROP COLUMN {}", self.quote_identifier(&previous.name)),
        )])
    }

    fn alter_column(
        &self,
        change: &TableChange,
        column: &ColumnSnapshot,
        _key_column: bool,
        fields: &[ColumnFieldChange],
        _diags: &mut Vec<Diagnostic>,
    ) -> Result<Vec<String>> {
        let table = change.name.as_str();
        let name = self.quote_identifier(&column.name);
        let mut statements = Vec::new();

        for field in fields {
            match field {
                ColumnFieldChange::Type { dialect_types, .. } => {
                    statements.push(self.alter(
                        table,
                        &format!("ALTER COLUMN {name} TYPE {}", dialect_types.postgres),
                    ));
                }
                ColumnFieldChange::Nullable { nullable } => {
                    let action = if *nullable { "DROP NOT NULL" } else { "SET NOT NULL" };
                    statements.push(self.alter(table, &format!("ALTER COLUMN {name} {action}")));
                }
                ColumnFieldChange::Default { from, to } => {
                    let new = to.as_ref().and_then(|d| self.render_default(d));
                    let old = from.as_ref().and_then(|d| self.render_default(d));
                    match (old, new) {
                        (_, Some(value)) => statements.push(
                            self.alter(table, &format!("ALTER COLUMN {name} SET DEFAULT {value}")),
                        ),
                        (Some(_), None) => statements
                            .push(self.alter(table, &format!("ALTER COLUMN {name} DROP DEFAULT"))),
                        (None, None) => {}
                    }
                }
                // Key changes are compiled once per table.
                ColumnFieldChange::PrimaryKey { .. } => {}
                ColumnFieldChange::Unique { unique } => {
                    let constraint =
                        self.quote_identifier(&unique_constraint_name(table, &column.name));
                    let clause = if *unique {
                        format!("ADD CONSTRAINT {constraint} UNIQUE ({name})")
                    } else {
                        format!("DROP CONSTRAINT {constraint}")
                    };
                    statements.push(self.alter(table, &clause));
                }
                ColumnFieldChange::ForeignKey { from, to } => {
                    if let Some(old) = from {
                        let constraint = old.constraint_name(table, &column.name);
                        statements.push(self.alter(
                            table,
                            &format!("DROP CONSTRAINT {}", self.quote_identifier(&constraint)),
                        ));
                    }
                    if let Some(new) = to {
                        let constraint = new.constraint_name(table, &column.name);
                        statements.push(self.alter(
                            table,
                            &format!(
                                "ADD CONSTRAINT {} FOREIGN KEY ({name}) {}",
                                self.quote_identifier(&constraint),
                                self.references(new)
                            ),
                        ));
                    }
                }
            }
        }

        Ok(statements)
    }

    fn alter_table_constraints(&self, change: &TableChange) -> Result<Vec<String>> {
        let table = change.name.as_str();
        let mut statements = Vec::new();

        let (old_key, new_key) = change
            .key_columns
            .as_ref()
            .map_or((&[][..], &[][..]), |k| (k.from.as_slice(), k.to.as_slice()));
        // Dropping a key column drops the key constraint with it.
        let key_dropped = change
            .removed_columns()
            .any(|c| old_key.iter().any(|k| k == c));
        let drop_key = |name: Option<&String>| {
            let name = name.cloned().unwrap_or_else(|| Self::default_pkey_name(table));
            self.alter(
                table,
                &format!("DROP CONSTRAINT {}", self.quote_identifier(&name)),
            )
        };

        match &change.primary_key {
            Some(PrimaryKeyDiff::Set { from, to }) => {
                if !key_dropped && (from.is_some() || !old_key.is_empty()) {
                    statements.push(drop_key(from.as_ref().and_then(|pk| pk.name.as_ref())));
                }
                let mut clause = String::from("ADD ");
                if let Some(name) = &to.name {
                    clause.push_str(&format!("CONSTRAINT {} ", self.quote_identifier(name)));
                }
                clause.push_str(&format!("PRIMARY KEY ({})", self.column_list(&to.columns)));
                statements.push(self.alter(table, &clause));
            }
            Some(PrimaryKeyDiff::Remove { name }) => {
                if !key_dropped {
                    statements.push(drop_key(name.as_ref()));
                }
                if !new_key.is_empty() {
                    statements.push(self.alter(
                        table,
                        &format!("ADD PRIMARY KEY ({})", self.column_list(new_key)),
                    ));
                }
            }
            None if change.key_columns.is_some() => {
                if !key_dropped && !old_key.is_empty() {
                    statements.push(drop_key(None));
                }
                if !new_key.is_empty() {
                    statements.push(self.alter(
                        table,
                        &format!("ADD PRIMARY KEY ({})", self.column_list(new_key)),
                    ));
                }
            }
            None => {}
        }

        if change.interleave.is_some() {
            debug!(table = %table, "Interleave change has no PostgreSQL representation; skipped");
        }

        Ok(statements)
    }
}
