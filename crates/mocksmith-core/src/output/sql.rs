//! # SQL Persistence
//!
//! Inserts generated rows into a live PostgreSQL or SQLite database. Each
//! `insert` call runs in its own transaction: a failing row rolls back the
//! whole sub-batch and nothing from it reaches the session.
//!
//! Integer primary keys that are still unassigned are left out of the
//! statement so the column's identity or rowid fills them, and the assigned
//! values are read back with `RETURNING`.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::Row;

use crate::error::{MockSmithError, Result};
use crate::generate::value::{RowSnapshot, Value};
use crate::output::repository::{is_unassigned_key, RowRepository};
use crate::schema::descriptor::EntityDescriptor;
use crate::schema::introspect::{database_type_from_url, SchemaIntrospector};
use crate::schema::postgres::PostgresIntrospector;
use crate::schema::sqlite::SqliteIntrospector;
use crate::schema::types::{DatabaseType, SchemaModel};

enum Pool {
    Postgres(PgPool),
    Sqlite(SqlitePool),
}

pub struct SqlRepository {
    pool: Pool,
    pg_schema: String,
}

impl SqlRepository {
    /// Connect to the database named by `db_url`.
    pub async fn connect(db_url: &str) -> Result<Self> {
        let pool = match database_type_from_url(db_url)? {
            DatabaseType::PostgreSQL => Pool::Postgres(
                PgPoolOptions::new()
                    .max_connections(5)
                    .connect(db_url)
                    .await
                    .map_err(|e| connection_error(db_url, e))?,
            ),
            DatabaseType::SQLite => Pool::Sqlite(
                SqlitePoolOptions::new()
                    .max_connections(1)
                    .connect(db_url)
                    .await
                    .map_err(|e| connection_error(db_url, e))?,
            ),
        };
        Ok(Self::with_pool(pool))
    }

    pub fn from_postgres(pool: PgPool) -> Self {
        Self::with_pool(Pool::Postgres(pool))
    }

    pub fn from_sqlite(pool: SqlitePool) -> Self {
        Self::with_pool(Pool::Sqlite(pool))
    }

    fn with_pool(pool: Pool) -> Self {
        Self {
            pool,
            pg_schema: "public".to_string(),
        }
    }

    /// PostgreSQL schema to introspect. Ignored for SQLite.
    pub fn with_pg_schema(mut self, schema: impl Into<String>) -> Self {
        self.pg_schema = schema.into();
        self
    }

    pub fn database_type(&self) -> DatabaseType {
        match self.pool {
            Pool::Postgres(_) => DatabaseType::PostgreSQL,
            Pool::Sqlite(_) => DatabaseType::SQLite,
        }
    }

    /// Read the schema model of the connected database.
    pub async fn introspect(&self) -> Result<SchemaModel> {
        match &self.pool {
            Pool::Postgres(pool) => {
                PostgresIntrospector::with_schema(pool.clone(), self.pg_schema.clone())
                    .introspect()
                    .await
            }
            Pool::Sqlite(pool) => SqliteIntrospector::new(pool.clone()).introspect().await,
        }
    }
}

/// Insert `rows` one statement at a time inside a single transaction,
/// filling store-assigned keys from `RETURNING`.
async fn insert_in_transaction<DB>(
    pool: &sqlx::Pool<DB>,
    db_type: DatabaseType,
    entity: &EntityDescriptor,
    rows: Vec<RowSnapshot>,
) -> Result<Vec<RowSnapshot>>
where
    DB: sqlx::Database,
    for<'c> &'c mut DB::Connection: sqlx::Executor<'c, Database = DB>,
    for<'q> DB::Arguments<'q>: sqlx::IntoArguments<'q, DB>,
    for<'r> i64: sqlx::Decode<'r, DB> + sqlx::Type<DB>,
    usize: sqlx::ColumnIndex<DB::Row>,
{
    let mut tx = pool.begin().await.map_err(|e| begin_error(entity, e))?;

    let mut inserted = Vec::with_capacity(rows.len());
    for (row_index, mut row) in rows.into_iter().enumerate() {
        let statement = build_insert(entity, &row, &db_type);
        let returned = sqlx::query::<DB>(&statement.sql)
            .fetch_optional(&mut *tx)
            .await
            .map_err(|e| insert_error(entity, row_index, &statement.sql, e))?;

        if let Some(returned) = returned {
            for (position, column) in statement.assigned.iter().enumerate() {
                let id: i64 = returned
                    .try_get(position)
                    .map_err(|e| insert_error(entity, row_index, &statement.sql, e))?;
                row.insert(column.clone(), Value::Int(id));
            }
        }
        inserted.push(row);
    }

    tx.commit()
        .await
        .map_err(|e| commit_error(entity, inserted.len(), e))?;
    Ok(inserted)
}

#[async_trait]
impl RowRepository for SqlRepository {
    async fn insert(
        &self,
        entity: &EntityDescriptor,
        rows: Vec<RowSnapshot>,
    ) -> Result<Vec<RowSnapshot>> {
        if rows.is_empty() {
            return Ok(rows);
        }
        tracing::debug!("Inserting {} rows into {}", rows.len(), entity.display_name);
        match &self.pool {
            Pool::Postgres(pool) => {
                insert_in_transaction(pool, DatabaseType::PostgreSQL, entity, rows).await
            }
            Pool::Sqlite(pool) => {
                insert_in_transaction(pool, DatabaseType::SQLite, entity, rows).await
            }
        }
    }
}

/// One INSERT statement and the identity columns it returns, in order.
struct InsertStatement {
    sql: String,
    assigned: Vec<String>,
}

fn build_insert(
    entity: &EntityDescriptor,
    row: &RowSnapshot,
    db_type: &DatabaseType,
) -> InsertStatement {
    let assigned: Vec<String> = entity
        .integer_primary_keys()
        .filter(|pk| is_unassigned_key(row.get(&pk.name)))
        .map(|pk| pk.name.clone())
        .collect();

    let (columns, values): (Vec<String>, Vec<String>) = row
        .iter()
        .filter(|(column, _)| !assigned.contains(column))
        .map(|(column, value)| (quote_identifier(column), value.to_sql_literal(db_type)))
        .unzip();

    let table = quote_identifier(&entity.display_name);
    let mut sql = if columns.is_empty() {
        format!("INSERT INTO {} DEFAULT VALUES", table)
    } else {
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table,
            columns.join(", "),
            values.join(", ")
        )
    };

    if !assigned.is_empty() {
        let returning: Vec<String> = assigned
            .iter()
            .map(|column| match db_type {
                // int2/int4 identities do not decode as i64 without the cast
                DatabaseType::PostgreSQL => format!("{}::bigint", quote_identifier(column)),
                DatabaseType::SQLite => quote_identifier(column),
            })
            .collect();
        sql.push_str(" RETURNING ");
        sql.push_str(&returning.join(", "));
    }

    InsertStatement { sql, assigned }
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Truncate SQL for error messages, on a character boundary.
fn truncate_sql(sql: &str, max_len: usize) -> String {
    match sql.char_indices().nth(max_len) {
        Some((end, _)) => format!("{}...", &sql[..end]),
        None => sql.to_string(),
    }
}

/// Mask the password in a connection URL before it is shown to the user.
pub fn sanitize_url(db_url: &str) -> String {
    if let Ok(mut parsed) = url::Url::parse(db_url) {
        if parsed.password().is_some() {
            let _ = parsed.set_password(Some("****"));
        }
        return parsed.to_string();
    }
    // SQLite paths are not always valid URLs
    db_url.to_string()
}

fn connection_error(db_url: &str, source: sqlx::Error) -> MockSmithError {
    MockSmithError::Connection {
        message: "Failed to connect to database".to_string(),
        connection_hint: sanitize_url(db_url),
        source,
    }
}

fn begin_error(entity: &EntityDescriptor, source: sqlx::Error) -> MockSmithError {
    MockSmithError::InsertFailed {
        table: entity.display_name.clone(),
        row_index: 0,
        message: "Failed to begin transaction".to_string(),
        sql_preview: "BEGIN".to_string(),
        source,
    }
}

fn commit_error(
    entity: &EntityDescriptor,
    row_index: usize,
    source: sqlx::Error,
) -> MockSmithError {
    MockSmithError::InsertFailed {
        table: entity.display_name.clone(),
        row_index,
        message: "Failed to commit transaction".to_string(),
        sql_preview: "COMMIT".to_string(),
        source,
    }
}

fn insert_error(
    entity: &EntityDescriptor,
    row_index: usize,
    sql: &str,
    source: sqlx::Error,
) -> MockSmithError {
    MockSmithError::InsertFailed {
        table: entity.display_name.clone(),
        row_index,
        message: "INSERT failed".to_string(),
        sql_preview: truncate_sql(sql, 200),
        source,
    }
}
