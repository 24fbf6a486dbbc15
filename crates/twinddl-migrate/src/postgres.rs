//! PostgreSQL executor over a `sqlx` pool.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::postgres::{PgArguments, PgPool, PgPoolOptions, PgRow};
use sqlx::query::Query;
use sqlx::{Column, PgConnection, Postgres, Row as _, Transaction, TypeInfo};
use tracing::{debug, info};

use crate::executor::{Executor, ExecutorError, ExecutorErrorKind, Row, TransactionWork, Value};

/// SQLSTATE codes meaning the object already exists (`duplicate_table`,
/// `duplicate_object`).
const ALREADY_EXISTS: &[&str] = &["42P07", "42710"];

/// SQLSTATE code for `undefined_table`.
const UNDEFINED_TABLE: &str = "42P01";

/// Maps a driver error onto an [`ExecutorError`].
fn classify(err: &sqlx::Error) -> ExecutorError {
    let kind = match err {
        sqlx::Error::Database(db) => match db.code().as_deref() {
            Some(code) if ALREADY_EXISTS.contains(&code) => ExecutorErrorKind::AlreadyExists,
            Some(UNDEFINED_TABLE) => ExecutorErrorKind::NotFound,
            _ => ExecutorErrorKind::Other,
        },
        _ => ExecutorErrorKind::Other,
    };
    ExecutorError::new(kind, err.to_string())
}

fn bind_params<'q>(
    mut query: Query<'q, Postgres, PgArguments>,
    params: &'q [Value],
) -> Query<'q, Postgres, PgArguments> {
    for param in params {
        query = match param {
            Value::Null => query.bind(None::<String>),
            Value::Bool(b) => query.bind(*b),
            Value::Int(i) => query.bind(*i),
            Value::Float(f) => query.bind(*f),
            Value::Text(s) => query.bind(s.as_str()),
            Value::Timestamp(ts) => query.bind(*ts),
        };
    }
    query
}

fn decode_cell(row: &PgRow, index: usize) -> Result<Value, sqlx::Error> {
    let type_name = row.column(index).type_info().name().to_string();
    let value = match type_name.as_str() {
        "BOOL" => row.try_get::<Option<bool>, _>(index)?.map(Value::Bool),
        "INT2" => row
            .try_get::<Option<i16>, _>(index)?
            .map(|v| Value::Int(v.into())),
        "INT4" => row
            .try_get::<Option<i32>, _>(index)?
            .map(|v| Value::Int(v.into())),
        "INT8" => row.try_get::<Option<i64>, _>(index)?.map(Value::Int),
        "FLOAT4" => row
            .try_get::<Option<f32>, _>(index)?
            .map(|v| Value::Float(v.into())),
        "FLOAT8" => row.try_get::<Option<f64>, _>(index)?.map(Value::Float),
        "TIMESTAMPTZ" => row
            .try_get::<Option<DateTime<Utc>>, _>(index)?
            .map(Value::Timestamp),
        "TIMESTAMP" => row
            .try_get::<Option<NaiveDateTime>, _>(index)?
            .map(|v| Value::Timestamp(v.and_utc())),
        _ => row.try_get::<Option<String>, _>(index)?.map(Value::Text),
    };
    Ok(value.unwrap_or(Value::Null))
}

fn decode_row(row: &PgRow) -> Result<Row, ExecutorError> {
    row.columns()
        .iter()
        .map(|column| {
            decode_cell(row, column.ordinal())
                .map(|value| (column.name().to_string(), value))
                .map_err(|e| classify(&e))
        })
        .collect()
}

async fn execute_on(
    conn: &mut PgConnection,
    sql: &str,
    params: &[Value],
) -> Result<u64, ExecutorError> {
    debug!(sql = %sql, "Executing SQL");
    bind_params(sqlx::query(sql), params)
        .execute(conn)
        .await
        .map(|r| r.rows_affected())
        .map_err(|e| classify(&e))
}

async fn query_on(
    conn: &mut PgConnection,
    sql: &str,
    params: &[Value],
) -> Result<Vec<Row>, ExecutorError> {
    debug!(sql = %sql, "Running query");
    let rows = bind_params(sqlx::query(sql), params)
        .fetch_all(conn)
        .await
        .map_err(|e| classify(&e))?;
    rows.iter().map(decode_row).collect()
}

/// Executor backed by a PostgreSQL connection pool.
///
/// `execute_batch` runs its statements in one transaction, relying on
/// PostgreSQL's transactional DDL.
pub struct PgExecutor {
    url: Option<String>,
    pool: Option<PgPool>,
}

impl PgExecutor {
    /// Creates an executor that connects to `url` on [`Executor::connect`].
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: Some(url.into()),
            pool: None,
        }
    }

    /// Wraps an existing pool; `connect` is then a no-op.
    #[must_use]
    pub const fn from_pool(pool: PgPool) -> Self {
        Self {
            url: None,
            pool: Some(pool),
        }
    }

    fn pool(&self) -> Result<&PgPool, ExecutorError> {
        self.pool
            .as_ref()
            .ok_or_else(|| ExecutorError::other("PostgreSQL executor is not connected"))
    }

    async fn begin(&self) -> Result<Transaction<'static, Postgres>, ExecutorError> {
        self.pool()?.begin().await.map_err(|e| classify(&e))
    }
}

#[async_trait]
impl Executor for PgExecutor {
    async fn connect(&mut self) -> Result<(), ExecutorError> {
        if self.pool.is_some() {
            return Ok(());
        }
        let url = self
            .url
            .as_deref()
            .ok_or_else(|| ExecutorError::other("no database URL configured"))?;
        let pool = PgPoolOptions::new()
            .max_connections(5)
            .connect(url)
            .await
            .map_err(|e| classify(&e))?;
        info!("Connected to PostgreSQL");
        self.pool = Some(pool);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), ExecutorError> {
        if let Some(pool) = self.pool.take() {
            pool.close().await;
            debug!("Disconnected from PostgreSQL");
        }
        Ok(())
    }

    async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64, ExecutorError> {
        let mut conn = self.pool()?.acquire().await.map_err(|e| classify(&e))?;
        execute_on(&mut conn, sql, params).await
    }

    async fn execute_batch(&mut self, statements: &[String]) -> Result<(), ExecutorError> {
        let mut tx = self.begin().await?;
        for sql in statements {
            // Dropping the transaction rolls it back.
            execute_on(&mut tx, sql, &[]).await?;
        }
        tx.commit().await.map_err(|e| classify(&e))
    }

    async fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>, ExecutorError> {
        let mut conn = self.pool()?.acquire().await.map_err(|e| classify(&e))?;
        query_on(&mut conn, sql, params).await
    }

    async fn transaction(&mut self, work: TransactionWork) -> Result<(), ExecutorError> {
        let mut scoped = PgTransactionExecutor {
            tx: self.begin().await?,
        };
        match work(&mut scoped).await {
            Ok(()) => scoped.tx.commit().await.map_err(|e| classify(&e)),
            Err(err) => {
                scoped.tx.rollback().await.map_err(|e| classify(&e))?;
                Err(err)
            }
        }
    }
}

/// The executor handed to transaction work; every call runs on the open
/// transaction.
struct PgTransactionExecutor {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl Executor for PgTransactionExecutor {
    async fn connect(&mut self) -> Result<(), ExecutorError> {
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), ExecutorError> {
        Ok(())
    }

    async fn execute(&mut self, sql: &str, params: &[Value]) -> Result<u64, ExecutorError> {
        execute_on(&mut self.tx, sql, params).await
    }

    async fn execute_batch(&mut self, statements: &[String]) -> Result<(), ExecutorError> {
        for sql in statements {
            execute_on(&mut self.tx, sql, &[]).await?;
        }
        Ok(())
    }

    async fn query(&mut self, sql: &str, params: &[Value]) -> Result<Vec<Row>, ExecutorError> {
        query_on(&mut self.tx, sql, params).await
    }

    // Nested work joins the open transaction.
    async fn transaction(&mut self, work: TransactionWork) -> Result<(), ExecutorError> {
        work(self).await
    }
}
