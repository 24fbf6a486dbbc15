#![allow(dead_code)]

use twinddl_core::prelude::*;

pub fn bigint(name: &str) -> ColumnSnapshot {
    ColumnSnapshot::new(name, ColumnType::BigInt, DialectTypes::new("BIGINT", "INT64"))
}

pub fn varchar(name: &str) -> ColumnSnapshot {
    ColumnSnapshot::new(
        name,
        ColumnType::String,
        DialectTypes::new("VARCHAR(255)", "STRING(255)"),
    )
}

pub fn timestamp(name: &str) -> ColumnSnapshot {
    ColumnSnapshot::new(
        name,
        ColumnType::Timestamp,
        DialectTypes::new("TIMESTAMPTZ", "TIMESTAMP"),
    )
}

pub fn users_v1() -> TableSnapshot {
    TableSnapshot::new("users").with_column(bigint("id").primary_key())
}

pub fn users_v2() -> TableSnapshot {
    users_v1().with_column(varchar("email").not_null())
}

/// A three-table blog schema: users, posts referencing users, and
/// comments interleaved in posts.
pub fn blog_schema() -> SchemaSnapshot {
    SchemaSnapshot::new()
        .with_table(
            users_v2().with_column(
                timestamp("created_at")
                    .not_null()
                    .default(DefaultValue::expression("CURRENT_TIMESTAMP")),
            ),
        )
        .with_table(
            TableSnapshot::new("posts")
                .with_column(bigint("id").primary_key())
                .with_column(varchar("title").not_null())
                .with_column(bigint("author_id").not_null().references(
                    ForeignKeySnapshot::new("users", "id").on_delete(ForeignKeyAction::Cascade),
                ))
                .with_index(IndexSnapshot::new(["author_id"])),
        )
        .with_table(
            TableSnapshot::new("comments")
                .with_column(bigint("post_id"))
                .with_column(bigint("comment_id"))
                .with_column(varchar("body"))
                .with_primary_key(PrimaryKeySnapshot::new(["post_id", "comment_id"]))
                .interleaved_in("posts", InterleaveOnDelete::Cascade),
        )
}

pub fn table_names(diff: &SchemaDiff) -> Vec<&str> {
    diff.actions.iter().map(TableDiff::table_name).collect()
}
