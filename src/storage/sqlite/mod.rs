//! SQLite database backend.
//!
//! UUIDs and timestamps are stored as text. Timestamps use one fixed-width
//! format so text comparison orders them chronologically.

use std::str::FromStr;

use sea_query::{
    IndexCreateStatement, InsertStatement, SqliteQueryBuilder, TableAlterStatement,
    TableCreateStatement, Value,
};
use sea_query_binder::{SqlxBinder, SqlxValues};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use tracing::debug;

use crate::interfaces::event_store::Result;
use crate::mapping::ColumnType;
use crate::storage::codec::ColumnValue;
use crate::storage::sql::{JsonMode, SqlDatabase, SqlDialect, SqlEventStore};

/// Text form of stored timestamps.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";

/// SQLite database marker type.
pub struct Sqlite;

/// SQLite event store.
pub type SqliteEventStore = SqlEventStore<Sqlite>;

impl SqlDialect for Sqlite {
    fn json_extract(source: &str, path: &[String], _mode: JsonMode) -> String {
        // json_extract already unquotes strings, so both modes are the same.
        format!("json_extract({}, '{}')", source, json_path(path))
    }

    fn json_timestamp(text: &str) -> String {
        normalized_timestamp(text)
    }

    fn timestamp_operand(param: &str) -> String {
        normalized_timestamp(param)
    }
}

/// `YYYY-MM-DDTHH:MM:SS.nnnnnnnnn` for an RFC 3339 text value.
///
/// UTC values (`Z` suffix, any number of fraction digits) keep full
/// precision. Values with an offset go through `strftime`, which converts to
/// UTC at millisecond precision.
fn normalized_timestamp(text: &str) -> String {
    format!(
        "(CASE WHEN {t} LIKE '%Z' \
         THEN substr({t}, 1, 19) || '.' || substr(rtrim(substr({t}, 21), 'Z') || '000000000', 1, 9) \
         ELSE strftime('%Y-%m-%dT%H:%M:%f', {t}) || '000000' END)",
        t = text
    )
}

/// `$.a.b[0]` for the segments `a`, `b`, `0`.
fn json_path(segments: &[String]) -> String {
    let mut path = String::from("$");
    for segment in segments {
        if !segment.is_empty() && segment.chars().all(|c| c.is_ascii_digit()) {
            path.push_str(&format!("[{}]", segment));
        } else if segment.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            path.push('.');
            path.push_str(segment);
        } else {
            path.push_str(&format!(".\"{}\"", segment.replace('"', "\\\"")));
        }
    }
    path.replace('\'', "''")
}

impl SqlDatabase for Sqlite {
    type Pool = SqlitePool;
    type Row = SqliteRow;

    const TABLE_EXISTS_SQL: &'static str =
        "SELECT name FROM sqlite_master WHERE type = 'table' AND name = $1";

    const TABLE_COLUMNS_SQL: &'static str = "SELECT name FROM pragma_table_info($1)";

    fn sql_type(column_type: ColumnType) -> &'static str {
        match column_type {
            ColumnType::Uuid | ColumnType::Timestamp | ColumnType::Text => "TEXT",
            ColumnType::Bool => "BOOLEAN",
            ColumnType::TinyInt | ColumnType::SmallInt => "SMALLINT",
            ColumnType::Int => "INTEGER",
            ColumnType::BigInt => "BIGINT",
            ColumnType::Real => "REAL",
            ColumnType::Double => "DOUBLE PRECISION",
            ColumnType::Binary => "BLOB",
        }
    }

    fn build_table_create(stmt: TableCreateStatement) -> String {
        stmt.to_string(SqliteQueryBuilder)
    }

    fn build_table_alter(stmt: TableAlterStatement) -> String {
        stmt.to_string(SqliteQueryBuilder)
    }

    fn build_index_create(stmt: IndexCreateStatement) -> String {
        stmt.to_string(SqliteQueryBuilder)
    }

    fn build_insert(stmt: InsertStatement) -> (String, SqlxValues) {
        stmt.build_sqlx(SqliteQueryBuilder)
    }

    fn bind_value(value: Value) -> Value {
        match value {
            Value::Uuid(uuid) => Value::String(uuid.map(|u| Box::new(u.to_string()))),
            Value::ChronoDateTimeUtc(time) => Value::String(
                time.map(|t| Box::new(t.format(TIMESTAMP_FORMAT).to_string())),
            ),
            other => other,
        }
    }

    fn read_column(row: &SqliteRow, index: usize, column_type: ColumnType) -> Result<ColumnValue> {
        let value = match column_type {
            ColumnType::Uuid | ColumnType::Timestamp | ColumnType::Text => row
                .try_get::<Option<String>, _>(index)?
                .map(ColumnValue::Text),
            ColumnType::Bool => row.try_get::<Option<bool>, _>(index)?.map(ColumnValue::Bool),
            ColumnType::TinyInt | ColumnType::SmallInt | ColumnType::Int | ColumnType::BigInt => {
                row.try_get::<Option<i64>, _>(index)?.map(ColumnValue::Int)
            }
            ColumnType::Real | ColumnType::Double => {
                row.try_get::<Option<f64>, _>(index)?.map(ColumnValue::Float)
            }
            ColumnType::Binary => row
                .try_get::<Option<Vec<u8>>, _>(index)?
                .map(ColumnValue::Bytes),
        };
        Ok(value.unwrap_or(ColumnValue::Null))
    }

    fn is_already_exists(err: &sqlx::Error) -> bool {
        match err {
            sqlx::Error::Database(db) => {
                let message = db.message().to_ascii_lowercase();
                message.contains("already exists") || message.contains("duplicate column")
            }
            _ => false,
        }
    }
}

/// Open a pool for `uri`.
///
/// Accepts `sqlite:` URLs or a bare file path; missing files and parent
/// directories are created. In-memory databases get a single connection
/// that is never recycled, since each connection would otherwise see its
/// own empty database.
pub async fn connect(uri: &str) -> Result<SqlitePool> {
    let url = if uri.starts_with("sqlite:") {
        uri.to_string()
    } else {
        if let Some(parent) = std::path::Path::new(uri).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        format!("sqlite:{}", uri)
    };

    let in_memory = url.contains(":memory:") || url.contains("mode=memory");
    let options = SqliteConnectOptions::from_str(&url)?.create_if_missing(true);

    let mut pool = SqlitePoolOptions::new();
    if in_memory {
        pool = pool.max_connections(1).idle_timeout(None).max_lifetime(None);
    }

    debug!(url = %url, in_memory, "Opening SQLite pool");
    Ok(pool.connect_with(options).await?)
}
