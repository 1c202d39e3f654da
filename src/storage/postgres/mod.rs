//! PostgreSQL database backend.
//!
//! Columns use native UUID and TIMESTAMPTZ types. JSON-encoded members are
//! addressed by casting the stored text to `jsonb`.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use sea_query::{
    IndexCreateStatement, InsertStatement, PostgresQueryBuilder, TableAlterStatement,
    TableCreateStatement,
};
use sea_query_binder::{SqlxBinder, SqlxValues};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgRow};
use sqlx::{Connection, PgConnection, PgPool, Row};
use tracing::info;
use uuid::Uuid;

use crate::interfaces::event_store::Result;
use crate::mapping::ColumnType;
use crate::storage::codec::ColumnValue;
use crate::storage::sql::{JsonMode, SqlDatabase, SqlDialect, SqlEventStore};

/// Duplicate column, duplicate table, and the unique violation raised when
/// two sessions race on `CREATE TABLE IF NOT EXISTS`.
const ALREADY_EXISTS_CODES: [&str; 3] = ["42701", "42P07", "23505"];

const DUPLICATE_DATABASE: &str = "42P04";

/// PostgreSQL database marker type.
pub struct Postgres;

/// PostgreSQL event store.
pub type PostgresEventStore = SqlEventStore<Postgres>;

impl SqlDialect for Postgres {
    fn json_extract(source: &str, path: &[String], mode: JsonMode) -> String {
        let op = match mode {
            JsonMode::Value => "#>",
            JsonMode::Text => "#>>",
        };
        format!("({}::jsonb {} '{}')", source, op, text_array(path))
    }

    fn json_operand(param: &str) -> String {
        format!("to_jsonb({})", param)
    }

    fn json_timestamp(text: &str) -> String {
        format!("({})::timestamptz", text)
    }
}

/// Text-array literal `{a,b,0}` for a `#>` path.
fn text_array(segments: &[String]) -> String {
    let elements: Vec<String> = segments
        .iter()
        .map(|segment| {
            let plain = !segment.is_empty()
                && !segment
                    .chars()
                    .any(|c| matches!(c, ',' | '{' | '}' | '"' | '\\') || c.is_whitespace());
            if plain {
                segment.clone()
            } else {
                format!("\"{}\"", segment.replace('\\', "\\\\").replace('"', "\\\""))
            }
        })
        .collect();
    format!("{{{}}}", elements.join(",")).replace('\'', "''")
}

impl SqlDatabase for Postgres {
    type Pool = PgPool;
    type Row = PgRow;

    const TABLE_EXISTS_SQL: &'static str = "SELECT table_name::text FROM information_schema.tables \
         WHERE table_schema = current_schema() AND table_name = $1";

    const TABLE_COLUMNS_SQL: &'static str =
        "SELECT column_name::text FROM information_schema.columns \
         WHERE table_schema = current_schema() AND table_name = $1 ORDER BY ordinal_position";

    fn sql_type(column_type: ColumnType) -> &'static str {
        match column_type {
            ColumnType::Uuid => "UUID",
            ColumnType::Timestamp => "TIMESTAMPTZ",
            ColumnType::Bool => "BOOLEAN",
            ColumnType::TinyInt | ColumnType::SmallInt => "SMALLINT",
            ColumnType::Int => "INTEGER",
            ColumnType::BigInt => "BIGINT",
            ColumnType::Real => "REAL",
            ColumnType::Double => "DOUBLE PRECISION",
            ColumnType::Text => "TEXT",
            ColumnType::Binary => "BYTEA",
        }
    }

    fn build_table_create(stmt: TableCreateStatement) -> String {
        stmt.to_string(PostgresQueryBuilder)
    }

    fn build_table_alter(stmt: TableAlterStatement) -> String {
        stmt.to_string(PostgresQueryBuilder)
    }

    fn build_index_create(stmt: IndexCreateStatement) -> String {
        stmt.to_string(PostgresQueryBuilder)
    }

    fn build_insert(stmt: InsertStatement) -> (String, SqlxValues) {
        stmt.build_sqlx(PostgresQueryBuilder)
    }

    fn read_column(row: &PgRow, index: usize, column_type: ColumnType) -> Result<ColumnValue> {
        let value = match column_type {
            ColumnType::Uuid => row.try_get::<Option<Uuid>, _>(index)?.map(ColumnValue::Uuid),
            ColumnType::Timestamp => row
                .try_get::<Option<DateTime<Utc>>, _>(index)?
                .map(ColumnValue::Timestamp),
            ColumnType::Bool => row.try_get::<Option<bool>, _>(index)?.map(ColumnValue::Bool),
            ColumnType::TinyInt | ColumnType::SmallInt => row
                .try_get::<Option<i16>, _>(index)?
                .map(|v| ColumnValue::Int(i64::from(v))),
            ColumnType::Int => row
                .try_get::<Option<i32>, _>(index)?
                .map(|v| ColumnValue::Int(i64::from(v))),
            ColumnType::BigInt => row.try_get::<Option<i64>, _>(index)?.map(ColumnValue::Int),
            ColumnType::Real => row
                .try_get::<Option<f32>, _>(index)?
                .map(|v| ColumnValue::Float(f64::from(v))),
            ColumnType::Double => row.try_get::<Option<f64>, _>(index)?.map(ColumnValue::Float),
            ColumnType::Text => row.try_get::<Option<String>, _>(index)?.map(ColumnValue::Text),
            ColumnType::Binary => row
                .try_get::<Option<Vec<u8>>, _>(index)?
                .map(ColumnValue::Bytes),
        };
        Ok(value.unwrap_or(ColumnValue::Null))
    }

    fn is_already_exists(err: &sqlx::Error) -> bool {
        match err {
            sqlx::Error::Database(db) => db
                .code()
                .is_some_and(|code| ALREADY_EXISTS_CODES.iter().any(|c| *c == code)),
            _ => false,
        }
    }
}

/// Open a pool for `uri`, creating the target database first if needed.
pub async fn connect(uri: &str) -> Result<PgPool> {
    let options = PgConnectOptions::from_str(uri)?;
    create_database_if_missing(&options).await?;
    Ok(PgPoolOptions::new().connect_with(options).await?)
}

/// Create the database named in `options` through the `postgres` maintenance
/// database. A concurrent creator is not an error.
pub async fn create_database_if_missing(options: &PgConnectOptions) -> Result<()> {
    let Some(database) = options.get_database() else {
        return Ok(());
    };
    if database == "postgres" {
        return Ok(());
    }

    let admin = options.clone().database("postgres");
    let mut conn = PgConnection::connect_with(&admin).await?;

    let exists: Option<i32> = sqlx::query_scalar("SELECT 1 FROM pg_database WHERE datname = $1")
        .bind(database)
        .fetch_optional(&mut conn)
        .await?;

    if exists.is_none() {
        let sql = format!("CREATE DATABASE {}", Postgres::quote(database));
        match sqlx::query(&sql).execute(&mut conn).await {
            Ok(_) => info!(database = %database, "Created database"),
            Err(sqlx::Error::Database(e)) if e.code().as_deref() == Some(DUPLICATE_DATABASE) => {}
            Err(e) => return Err(e.into()),
        }
    }

    conn.close().await?;
    Ok(())
}
