//! Schema diff engine.
//!
//! Compares a `from` (baseline) and `to` (desired) [`SchemaSnapshot`]
//! and produces the ordered list of structural changes between them.
//! Diffing is a pure function of its two inputs: identical pairs always
//! yield identical (and identically serialized) output, which matters
//! because diffs are embedded in persisted migration artifacts.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::snapshot::{
    ColumnSnapshot, ColumnType, DefaultValue, DialectTypes, ForeignKeySnapshot, IndexSnapshot,
    InterleaveSnapshot, PrimaryKeySnapshot, SchemaSnapshot, TableSnapshot,
};

/// A table-level change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum TableDiff {
    /// Create a table.
    Add {
        /// The table to create.
        table: TableSnapshot,
    },
    /// Drop a table.
    Remove {
        /// Name of the dropped table.
        name: String,
        /// The table as it was before removal.
        previous: TableSnapshot,
    },
    /// Alter an existing table.
    Change(TableChange),
}

impl TableDiff {
    /// Name of the table this action applies to.
    #[must_use]
    pub fn table_name(&self) -> &str {
        match self {
            Self::Add { table } => &table.name,
            Self::Remove { name, .. } => name,
            Self::Change(change) => &change.name,
        }
    }
}

/// All changes to one existing table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableChange {
    /// Table name.
    pub name: String,
    /// Column additions, changes and removals.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub columns: Vec<ColumnDiff>,
    /// Index additions, changes and removals.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub indexes: Vec<IndexDiff>,
    /// Composite primary key change.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_key: Option<PrimaryKeyDiff>,
    /// Interleave change.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interleave: Option<InterleaveDiff>,
    /// Effective key columns before and after, set when the key changed
    /// through column flags or the composite key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_columns: Option<KeyColumnsChange>,
}

/// The effective primary key of a table on both sides of a change: the
/// composite key if declared, else the flagged columns in name order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyColumnsChange {
    /// Key columns before the change.
    pub from: Vec<String>,
    /// Key columns after the change.
    pub to: Vec<String>,
}

impl TableChange {
    /// Returns `true` if nothing changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
            && self.indexes.is_empty()
            && self.primary_key.is_none()
            && self.interleave.is_none()
            && self.key_columns.is_none()
    }

    /// Names of the columns this change removes.
    pub fn removed_columns(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().filter_map(|c| match c {
            ColumnDiff::Remove { name, .. } => Some(name.as_str()),
            _ => None,
        })
    }
}

/// A column-level change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum ColumnDiff {
    /// Add a column.
    Add {
        /// The new column.
        column: ColumnSnapshot,
    },
    /// Drop a column.
    Remove {
        /// Name of the dropped column.
        name: String,
        /// The column as it was before removal.
        previous: ColumnSnapshot,
    },
    /// Alter a column.
    Change {
        /// Column name.
        name: String,
        /// The column's target state.
        column: ColumnSnapshot,
        /// Whether the column belongs to the table's target primary key.
        #[serde(default, rename = "keyColumn", skip_serializing_if = "std::ops::Not::not")]
        key_column: bool,
        /// The individual properties that changed, in a fixed order.
        changes: Vec<ColumnFieldChange>,
    },
}

/// One changed property of a column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "field", rename_all = "camelCase")]
pub enum ColumnFieldChange {
    /// New type.
    #[serde(rename_all = "camelCase")]
    Type {
        /// New abstract type.
        column_type: ColumnType,
        /// New physical types.
        dialect_types: DialectTypes,
    },
    /// New nullability.
    Nullable {
        /// Whether NULL is now allowed.
        nullable: bool,
    },
    /// New default.
    Default {
        /// Previous default.
        from: Option<DefaultValue>,
        /// New default.
        to: Option<DefaultValue>,
    },
    /// New primary-key flag.
    #[serde(rename_all = "camelCase")]
    PrimaryKey {
        /// Whether the column is now a primary key.
        primary_key: bool,
    },
    /// New uniqueness flag.
    Unique {
        /// Whether the column is now unique.
        unique: bool,
    },
    /// New foreign key reference.
    ForeignKey {
        /// Previous reference.
        from: Option<ForeignKeySnapshot>,
        /// New reference.
        to: Option<ForeignKeySnapshot>,
    },
}

/// An index-level change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum IndexDiff {
    /// Create an index.
    Add {
        /// The new index.
        index: IndexSnapshot,
    },
    /// Drop an index.
    Remove {
        /// The dropped index.
        index: IndexSnapshot,
    },
    /// Same identity, different definition.
    Change {
        /// Previous definition.
        from: IndexSnapshot,
        /// New definition.
        to: IndexSnapshot,
    },
}

/// A composite primary key change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum PrimaryKeyDiff {
    /// Set (add or replace) the composite key.
    Set {
        /// Previous key, if any.
        from: Option<PrimaryKeySnapshot>,
        /// New key.
        to: PrimaryKeySnapshot,
    },
    /// Remove the composite key.
    Remove {
        /// Name of the removed constraint, if it had one.
        name: Option<String>,
    },
}

/// An interleave change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum InterleaveDiff {
    /// Set (add or replace) the interleave relation.
    Set {
        /// Previous relation, if any.
        from: Option<InterleaveSnapshot>,
        /// New relation.
        to: InterleaveSnapshot,
    },
    /// Remove the interleave relation.
    Remove {
        /// The removed relation.
        previous: InterleaveSnapshot,
    },
}

/// Result of comparing two schema snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaDiff {
    /// Format version of the `from` snapshot.
    pub from_version: String,
    /// Format version of the `to` snapshot.
    pub to_version: String,
    /// Table actions, in execution order.
    pub actions: Vec<TableDiff>,
}

impl SchemaDiff {
    /// Returns `true` if there are no changes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    /// Number of table actions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.actions.len()
    }

    /// Returns `true` if the compared snapshots had different formats.
    #[must_use]
    pub fn version_mismatch(&self) -> bool {
        self.from_version != self.to_version
    }
}

// ================================================================
// Schema-level diff
// ================================================================

/// Compares two snapshots and returns the changes needed to go from
/// `from` to `to`.
///
/// Action order: created tables (dependencies first), altered tables
/// (by name), dropped tables (dependents first).
#[must_use]
pub fn diff(from: &SchemaSnapshot, to: &SchemaSnapshot) -> SchemaDiff {
    if from.version != to.version {
        warn!(
            from_version = %from.version,
            to_version = %to.version,
            "Comparing snapshots with different format versions"
        );
    }

    let from_names: BTreeSet<&str> = from.tables.keys().map(String::as_str).collect();
    let to_names: BTreeSet<&str> = to.tables.keys().map(String::as_str).collect();

    let added: Vec<&TableSnapshot> = to_names
        .difference(&from_names)
        .map(|name| &to.tables[*name])
        .collect();
    let removed: Vec<&TableSnapshot> = from_names
        .difference(&to_names)
        .map(|name| &from.tables[*name])
        .collect();

    let mut actions = Vec::new();

    for table in creation_order(&added) {
        actions.push(TableDiff::Add {
            table: table.clone(),
        });
    }

    for &name in from_names.intersection(&to_names) {
        if let Some(change) = diff_table(&from.tables[name], &to.tables[name]) {
            actions.push(TableDiff::Change(change));
        }
    }

    let mut removal = creation_order(&removed);
    removal.reverse();
    for table in removal {
        actions.push(TableDiff::Remove {
            name: table.name.clone(),
            previous: table.clone(),
        });
    }

    SchemaDiff {
        from_version: from.version.clone(),
        to_version: to.version.clone(),
        actions,
    }
}

/// Orders tables so that interleave parents and foreign key targets come
/// before the tables depending on them. Only dependencies inside `tables`
/// count. Ties (and cycles) resolve by name.
fn creation_order<'a>(tables: &[&'a TableSnapshot]) -> Vec<&'a TableSnapshot> {
    let mut remaining: BTreeMap<&str, &'a TableSnapshot> =
        tables.iter().map(|t| (t.name.as_str(), *t)).collect();
    let mut ordered = Vec::with_capacity(remaining.len());

    while !remaining.is_empty() {
        let ready = remaining
            .iter()
            .find(|(_, table)| {
                table
                    .dependencies()
                    .iter()
                    .all(|dep| !remaining.contains_key(dep))
            })
            .map(|(name, _)| *name);
        // A cycle: fall back to name order.
        let next = ready.unwrap_or_else(|| remaining.keys().next().copied().unwrap_or_default());
        if let Some(table) = remaining.remove(next) {
            ordered.push(table);
        }
    }

    ordered
}

// ================================================================
// Table-level diff
// ================================================================

/// Compares two versions of one table. Returns `None` when nothing
/// changed.
#[must_use]
pub fn diff_table(from: &TableSnapshot, to: &TableSnapshot) -> Option<TableChange> {
    let primary_key = diff_primary_key(from.primary_key.as_ref(), to.primary_key.as_ref());
    let (old_key, new_key) = (from.effective_primary_key(), to.effective_primary_key());
    let key_columns = (primary_key.is_some() || old_key != new_key).then(|| KeyColumnsChange {
        from: old_key,
        to: new_key,
    });

    let change = TableChange {
        name: to.name.clone(),
        columns: diff_columns(from, to),
        indexes: diff_indexes(from, to),
        primary_key,
        interleave: diff_interleave(from.interleave.as_ref(), to.interleave.as_ref()),
        key_columns,
    };
    (!change.is_empty()).then_some(change)
}

fn diff_columns(from: &TableSnapshot, to: &TableSnapshot) -> Vec<ColumnDiff> {
    let key = to.effective_primary_key();
    let mut diffs = Vec::new();

    for (name, column) in &to.columns {
        if !from.columns.contains_key(name) {
            diffs.push(ColumnDiff::Add {
                column: column.clone(),
            });
        }
    }

    for (name, old) in &from.columns {
        if let Some(new) = to.columns.get(name) {
            let changes = diff_column(old, new);
            if !changes.is_empty() {
                diffs.push(ColumnDiff::Change {
                    name: name.clone(),
                    column: new.clone(),
                    key_column: key.contains(name),
                    changes,
                });
            }
        }
    }

    for (name, old) in &from.columns {
        if !to.columns.contains_key(name) {
            diffs.push(ColumnDiff::Remove {
                name: name.clone(),
                previous: old.clone(),
            });
        }
    }

    diffs
}

/// Field-by-field comparison of one column.
fn diff_column(old: &ColumnSnapshot, new: &ColumnSnapshot) -> Vec<ColumnFieldChange> {
    let mut changes = Vec::new();

    if old.column_type != new.column_type || old.dialect_types != new.dialect_types {
        changes.push(ColumnFieldChange::Type {
            column_type: new.column_type,
            dialect_types: new.dialect_types.clone(),
        });
    }

    if old.nullable != new.nullable {
        changes.push(ColumnFieldChange::Nullable {
            nullable: new.nullable,
        });
    }

    if !defaults_equivalent(old.default.as_ref(), new.default.as_ref()) {
        changes.push(ColumnFieldChange::Default {
            from: old.default.clone(),
            to: new.default.clone(),
        });
    }

    if old.primary_key != new.primary_key {
        changes.push(ColumnFieldChange::PrimaryKey {
            primary_key: new.primary_key,
        });
    }

    if old.unique != new.unique {
        changes.push(ColumnFieldChange::Unique { unique: new.unique });
    }

    if old.foreign_key != new.foreign_key {
        changes.push(ColumnFieldChange::ForeignKey {
            from: old.foreign_key.clone(),
            to: new.foreign_key.clone(),
        });
    }

    changes
}

fn defaults_equivalent(a: Option<&DefaultValue>, b: Option<&DefaultValue>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => a.equivalent(b),
        _ => false,
    }
}

// ================================================================
// Index / key / interleave helpers
// ================================================================

/// Indexes keyed by identity. A repeated identity keeps the last
/// definition.
fn indexes_by_identity(table: &TableSnapshot) -> BTreeMap<String, &IndexSnapshot> {
    let mut indexes = BTreeMap::new();
    for index in &table.indexes {
        if let Some(shadowed) = indexes.insert(index.identity(), index) {
            warn!(
                table = %table.name,
                index = %shadowed.identity(),
                "Duplicate index identity; only the last definition is compared"
            );
        }
    }
    indexes
}

fn diff_indexes(from: &TableSnapshot, to: &TableSnapshot) -> Vec<IndexDiff> {
    let old = indexes_by_identity(from);
    let new = indexes_by_identity(to);

    let mut diffs = Vec::new();

    for (key, index) in &old {
        if !new.contains_key(key) {
            diffs.push(IndexDiff::Remove {
                index: (*index).clone(),
            });
        }
    }

    for (key, before) in &old {
        if let Some(after) = new.get(key)
            && (before.unique != after.unique || before.columns != after.columns)
        {
            diffs.push(IndexDiff::Change {
                from: (*before).clone(),
                to: (*after).clone(),
            });
        }
    }

    for (key, index) in &new {
        if !old.contains_key(key) {
            diffs.push(IndexDiff::Add {
                index: (*index).clone(),
            });
        }
    }

    diffs
}

fn diff_primary_key(
    from: Option<&PrimaryKeySnapshot>,
    to: Option<&PrimaryKeySnapshot>,
) -> Option<PrimaryKeyDiff> {
    match (from, to) {
        (from, Some(to)) if from != Some(to) => Some(PrimaryKeyDiff::Set {
            from: from.cloned(),
            to: to.clone(),
        }),
        (Some(from), None) => Some(PrimaryKeyDiff::Remove {
            name: from.name.clone(),
        }),
        _ => None,
    }
}

fn diff_interleave(
    from: Option<&InterleaveSnapshot>,
    to: Option<&InterleaveSnapshot>,
) -> Option<InterleaveDiff> {
    match (from, to) {
        (from, Some(to)) if from != Some(to) => Some(InterleaveDiff::Set {
            from: from.cloned(),
            to: to.clone(),
        }),
        (Some(from), None) => Some(InterleaveDiff::Remove {
            previous: from.clone(),
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::{ForeignKeyAction, InterleaveOnDelete};

    // ============================================================
    // Helpers
    // ============================================================

    fn int(name: &str) -> ColumnSnapshot {
        ColumnSnapshot::new(
            name,
            ColumnType::BigInt,
            DialectTypes::new("BIGINT", "INT64"),
        )
    }

    fn varchar(name: &str) -> ColumnSnapshot {
        ColumnSnapshot::new(
            name,
            ColumnType::String,
            DialectTypes::new("VARCHAR(255)", "STRING(255)"),
        )
    }

    fn users() -> TableSnapshot {
        TableSnapshot::new("users").with_column(int("id").primary_key())
    }

    fn schema(tables: Vec<TableSnapshot>) -> SchemaSnapshot {
        let mut s = SchemaSnapshot::new();
        for t in tables {
            s.add_table(t);
        }
        s
    }

    // ============================================================
    // Schema level
    // ============================================================

    #[test]
    fn identical_snapshots_produce_empty_diff() {
        let s = schema(vec![
            users().with_index(IndexSnapshot::new(["id"]).unique()),
            TableSnapshot::new("posts")
                .with_column(int("id").primary_key())
                .with_column(int("user_id").references(ForeignKeySnapshot::new("users", "id"))),
        ]);
        let d = diff(&s, &s);
        assert!(d.is_empty());
        assert!(!d.version_mismatch());
    }

    #[test]
    fn disjoint_tables_are_antisymmetric() {
        let from = schema(vec![users()]);
        let to = schema(vec![
            users(),
            TableSnapshot::new("a").with_column(int("id")),
            TableSnapshot::new("b").with_column(int("id")),
        ]);

        let up = diff(&from, &to);
        let added: Vec<&str> = up
            .actions
            .iter()
            .filter(|a| matches!(a, TableDiff::Add { .. }))
            .map(TableDiff::table_name)
            .collect();
        assert_eq!(added, vec!["a", "b"]);
        assert_eq!(up.len(), 2);

        let down = diff(&to, &from);
        let removed: Vec<&str> = down
            .actions
            .iter()
            .filter(|a| matches!(a, TableDiff::Remove { .. }))
            .map(TableDiff::table_name)
            .collect();
        assert_eq!(removed.len(), 2);
        assert!(removed.contains(&"a") && removed.contains(&"b"));
        assert_eq!(down.len(), 2);
    }

    #[test]
    fn added_column_yields_single_table_change() {
        let from = schema(vec![users()]);
        let email = varchar("email").not_null();
        let to = schema(vec![users().with_column(email.clone())]);

        let d = diff(&from, &to);
        assert_eq!(d.len(), 1);
        match &d.actions[0] {
            TableDiff::Change(change) => {
                assert_eq!(change.name, "users");
                assert_eq!(change.columns, vec![ColumnDiff::Add { column: email }]);
                assert!(change.indexes.is_empty());
                assert!(change.primary_key.is_none());
                assert!(change.interleave.is_none());
            }
            other => panic!("expected change, got {other:?}"),
        }
    }

    #[test]
    fn parents_created_before_children_and_dropped_after() {
        let singers = TableSnapshot::new("singers").with_column(int("id").primary_key());
        let albums = TableSnapshot::new("albums")
            .with_column(int("id"))
            .interleaved_in("singers", InterleaveOnDelete::Cascade);
        let tracks = TableSnapshot::new("aa_tracks")
            .with_column(int("album_id").references(ForeignKeySnapshot::new("albums", "id")));

        let empty = SchemaSnapshot::new();
        let full = schema(vec![singers, albums, tracks]);

        let up = diff(&empty, &full);
        let order: Vec<&str> = up.actions.iter().map(TableDiff::table_name).collect();
        assert_eq!(order, vec!["singers", "albums", "aa_tracks"]);

        let down = diff(&full, &empty);
        let order: Vec<&str> = down.actions.iter().map(TableDiff::table_name).collect();
        assert_eq!(order, vec!["aa_tracks", "albums", "singers"]);
    }

    #[test]
    fn version_mismatch_is_reported_not_coerced() {
        let mut old = schema(vec![users()]);
        old.version = "0".to_string();
        let new = schema(vec![users()]);
        let d = diff(&old, &new);
        assert!(d.version_mismatch());
        assert!(d.is_empty());
        assert_eq!(d.from_version, "0");
        assert_eq!(d.to_version, "1");
    }

    #[test]
    fn diff_is_deterministic() {
        let from = schema(vec![users(), TableSnapshot::new("z").with_column(int("a"))]);
        let to = schema(vec![
            users().with_column(varchar("name")),
            TableSnapshot::new("m").with_column(int("a")),
            TableSnapshot::new("b").with_column(int("a")),
        ]);
        let first = serde_json::to_string(&diff(&from, &to)).unwrap();
        for _ in 0..5 {
            assert_eq!(serde_json::to_string(&diff(&from, &to)).unwrap(), first);
        }
    }

    // ============================================================
    // Column level
    // ============================================================

    #[test]
    fn column_property_changes_are_separate() {
        let old = users().with_column(varchar("email"));
        let new = users().with_column(
            ColumnSnapshot::new("email", ColumnType::Text, DialectTypes::new("TEXT", "STRING(MAX)"))
                .not_null()
                .unique()
                .default(DefaultValue::literal("none")),
        );
        let change = diff_table(&old, &new).unwrap();
        let ColumnDiff::Change { changes, .. } = &change.columns[0] else {
            panic!("expected column change");
        };
        assert_eq!(changes.len(), 4);
        assert!(matches!(changes[0], ColumnFieldChange::Type { column_type: ColumnType::Text, .. }));
        assert_eq!(changes[1], ColumnFieldChange::Nullable { nullable: false });
        assert!(matches!(changes[2], ColumnFieldChange::Default { from: None, .. }));
        assert_eq!(changes[3], ColumnFieldChange::Unique { unique: true });
    }

    #[test]
    fn expression_defaults_never_diff() {
        let old = users().with_column(varchar("at").default(DefaultValue::expression("now()")));
        let new = users().with_column(
            varchar("at").default(DefaultValue::expression("CURRENT_TIMESTAMP")),
        );
        assert!(diff_table(&old, &new).is_none());
    }

    #[test]
    fn literal_default_change_is_detected() {
        let old = users().with_column(varchar("state").default(DefaultValue::literal("new")));
        let new = users().with_column(varchar("state").default(DefaultValue::literal("open")));
        let change = diff_table(&old, &new).unwrap();
        assert!(matches!(
            &change.columns[0],
            ColumnDiff::Change { changes, .. }
                if matches!(changes[0], ColumnFieldChange::Default { .. })
        ));
    }

    #[test]
    fn client_generated_to_expression_is_a_change() {
        let old = users().with_column(varchar("token").default(DefaultValue::ClientGenerated));
        let new = users().with_column(varchar("token").default(DefaultValue::expression("gen()")));
        assert!(diff_table(&old, &new).is_some());
    }

    #[test]
    fn foreign_key_on_delete_change_is_detected() {
        let fk = ForeignKeySnapshot::new("users", "id");
        let old = TableSnapshot::new("posts").with_column(int("user_id").references(fk.clone()));
        let new = TableSnapshot::new("posts")
            .with_column(int("user_id").references(fk.on_delete(ForeignKeyAction::Cascade)));
        let change = diff_table(&old, &new).unwrap();
        assert!(matches!(
            &change.columns[0],
            ColumnDiff::Change { changes, .. }
                if matches!(changes[0], ColumnFieldChange::ForeignKey { .. })
        ));
    }

    #[test]
    fn removed_column_carries_previous_state() {
        let old = users().with_column(varchar("email").unique());
        let new = users();
        let change = diff_table(&old, &new).unwrap();
        assert_eq!(
            change.columns,
            vec![ColumnDiff::Remove {
                name: "email".to_string(),
                previous: varchar("email").unique(),
            }]
        );
    }

    // ============================================================
    // Indexes, keys, interleave
    // ============================================================

    #[test]
    fn indexes_match_by_identity() {
        let old = users()
            .with_index(IndexSnapshot::new(["a"]).named("by_a"))
            .with_index(IndexSnapshot::new(["b"]))
            .with_index(IndexSnapshot::new(["c"]));
        let new = users()
            .with_index(IndexSnapshot::new(["a", "b"]).named("by_a"))
            .with_index(IndexSnapshot::new(["b"]))
            .with_index(IndexSnapshot::new(["d"]));

        let change = diff_table(&old, &new).unwrap();
        assert_eq!(
            change.indexes,
            vec![
                IndexDiff::Remove {
                    index: IndexSnapshot::new(["c"])
                },
                IndexDiff::Change {
                    from: IndexSnapshot::new(["a"]).named("by_a"),
                    to: IndexSnapshot::new(["a", "b"]).named("by_a"),
                },
                IndexDiff::Add {
                    index: IndexSnapshot::new(["d"])
                },
            ]
        );
    }

    #[test]
    fn unique_flag_change_on_named_index() {
        let old = users().with_index(IndexSnapshot::new(["id"]).named("ix"));
        let new = users().with_index(IndexSnapshot::new(["id"]).named("ix").unique());
        let change = diff_table(&old, &new).unwrap();
        assert!(matches!(change.indexes[0], IndexDiff::Change { .. }));
    }

    #[test]
    fn primary_key_set_and_remove() {
        let base = TableSnapshot::new("t").with_column(int("a")).with_column(int("b"));
        let keyed = base
            .clone()
            .with_primary_key(PrimaryKeySnapshot::new(["a", "b"]).named("t_pk"));

        let added = diff_table(&base, &keyed).unwrap();
        assert_eq!(
            added.primary_key,
            Some(PrimaryKeyDiff::Set {
                from: None,
                to: PrimaryKeySnapshot::new(["a", "b"]).named("t_pk"),
            })
        );

        let removed = diff_table(&keyed, &base).unwrap();
        assert_eq!(
            removed.primary_key,
            Some(PrimaryKeyDiff::Remove {
                name: Some("t_pk".to_string())
            })
        );

        let reordered = base.with_primary_key(PrimaryKeySnapshot::new(["b", "a"]).named("t_pk"));
        assert!(matches!(
            diff_table(&keyed, &reordered).unwrap().primary_key,
            Some(PrimaryKeyDiff::Set { from: Some(_), .. })
        ));
    }

    #[test]
    fn primary_key_optional_name_absence_is_equal() {
        let explicit: PrimaryKeySnapshot =
            serde_json::from_str(r#"{"name": null, "columns": ["a"]}"#).unwrap();
        let implicit: PrimaryKeySnapshot = serde_json::from_str(r#"{"columns": ["a"]}"#).unwrap();
        let old = TableSnapshot::new("t").with_primary_key(explicit);
        let new = TableSnapshot::new("t").with_primary_key(implicit);
        assert!(diff_table(&old, &new).is_none());
    }

    #[test]
    fn interleave_mode_change_is_a_set() {
        let old = TableSnapshot::new("albums").interleaved_in("singers", InterleaveOnDelete::Cascade);
        let new = TableSnapshot::new("albums").interleaved_in("singers", InterleaveOnDelete::NoAction);
        let change = diff_table(&old, &new).unwrap();
        assert!(matches!(
            change.interleave,
            Some(InterleaveDiff::Set { from: Some(_), .. })
        ));

        let plain = TableSnapshot::new("albums");
        assert!(matches!(
            diff_table(&old, &plain).unwrap().interleave,
            Some(InterleaveDiff::Remove { .. })
        ));
    }

    #[test]
    fn repeated_index_identity_keeps_last_definition() {
        let table = users()
            .with_column(varchar("email"))
            .with_index(IndexSnapshot::new(["email"]))
            .with_index(IndexSnapshot::new(["email"]).unique());
        let indexes = indexes_by_identity(&table);
        assert_eq!(indexes.len(), 1);
        assert!(indexes["email"].unique);

        // Compared against the surviving definition only.
        let plain = users()
            .with_column(varchar("email"))
            .with_index(IndexSnapshot::new(["email"]).unique());
        assert!(diff_table(&table, &plain).is_none());
    }

    #[test]
    fn key_flag_move_records_effective_keys() {
        let old = TableSnapshot::new("t")
            .with_column(int("a").not_null())
            .with_column(int("b").primary_key());
        let new = TableSnapshot::new("t")
            .with_column(int("a").primary_key())
            .with_column(int("b").not_null());

        let change = diff_table(&old, &new).unwrap();
        assert_eq!(
            change.key_columns,
            Some(KeyColumnsChange {
                from: vec!["b".into()],
                to: vec!["a".into()],
            })
        );
        assert!(change.primary_key.is_none());

        let key_flags: Vec<(String, bool)> = change
            .columns
            .iter()
            .filter_map(|c| match c {
                ColumnDiff::Change {
                    column, key_column, ..
                } => Some((column.name.clone(), *key_column)),
                _ => None,
            })
            .collect();
        assert_eq!(key_flags, vec![("a".into(), true), ("b".into(), false)]);
    }

    #[test]
    fn unchanged_key_leaves_key_columns_unset() {
        let old = users();
        let new = users().with_column(varchar("email"));
        assert!(diff_table(&old, &new).unwrap().key_columns.is_none());
    }
}
