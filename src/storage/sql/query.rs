//! SQL database abstraction traits.

use sea_query::{
    IndexCreateStatement, InsertStatement, TableAlterStatement, TableCreateStatement, Value, Values,
};
use sea_query_binder::SqlxValues;

use crate::interfaces::event_store::Result;
use crate::mapping::ColumnType;
use crate::predicate::{Binding, Literal, PredicateError};
use crate::storage::codec::ColumnValue;

/// How extracted JSON is returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonMode {
    /// Native JSON (or SQL scalar) value, for comparisons.
    Value,
    /// Unquoted text, for LIKE and NULL checks.
    Text,
}

/// SQL text hooks used by the predicate compiler.
pub trait SqlDialect {
    fn quote(ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }

    /// Extract `path` from the JSON document in `source`.
    fn json_extract(source: &str, path: &[String], mode: JsonMode) -> String;

    /// Wrap a placeholder compared against extracted JSON.
    fn json_operand(param: &str) -> String {
        param.to_string()
    }

    /// Chronologically comparable form of a timestamp held as JSON text.
    ///
    /// `text` is a text-mode extraction.
    fn json_timestamp(text: &str) -> String {
        text.to_string()
    }

    /// Bound timestamp placeholder compared against [`Self::json_timestamp`].
    fn timestamp_operand(param: &str) -> String {
        param.to_string()
    }

    /// Server-side gunzip of `source`, if the database has one.
    ///
    /// Without it, conditions on compressed payloads are evaluated after
    /// decoding instead.
    fn decompress(source: &str) -> Option<String> {
        let _ = source;
        None
    }
}

/// Trait for SQL database backends.
///
/// This trait abstracts over different SQL databases (PostgreSQL, SQLite)
/// by providing the pool type, DDL rendering, value binding and row reading.
pub trait SqlDatabase: SqlDialect + Send + Sync + 'static {
    /// The connection pool type for this database.
    type Pool: Clone + Send + Sync;

    /// The row type returned by queries.
    type Row: sqlx::Row;

    /// Returns one row when table `$1` exists.
    const TABLE_EXISTS_SQL: &'static str;

    /// Returns the name of each column of table `$1`.
    const TABLE_COLUMNS_SQL: &'static str;

    /// Concrete SQL type for a column.
    fn sql_type(column_type: ColumnType) -> &'static str;

    fn build_table_create(stmt: TableCreateStatement) -> String;

    fn build_table_alter(stmt: TableAlterStatement) -> String;

    fn build_index_create(stmt: IndexCreateStatement) -> String;

    /// Build a parameterized INSERT with its bound values.
    fn build_insert(stmt: InsertStatement) -> (String, SqlxValues);

    /// Adjust a value to the form this backend stores it in.
    fn bind_value(value: Value) -> Value {
        value
    }

    /// Read column `index` of `row`, decoded as `column_type`.
    fn read_column(row: &Self::Row, index: usize, column_type: ColumnType) -> Result<ColumnValue>;

    /// Whether a DDL error means the object was created concurrently.
    fn is_already_exists(err: &sqlx::Error) -> bool;
}

/// Convert predicate bindings to driver values, in placeholder order.
pub fn bind_values<DB: SqlDatabase>(bindings: &[Binding]) -> Result<SqlxValues> {
    let values = bindings
        .iter()
        .map(|binding| literal_value(&binding.value).map(DB::bind_value))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(SqlxValues(Values(values)))
}

fn literal_value(literal: &Literal) -> std::result::Result<Value, PredicateError> {
    let value = match literal {
        Literal::Null => Value::String(None),
        Literal::Bool(v) => Value::from(*v),
        Literal::Int(v) => Value::from(*v),
        Literal::Float(v) => Value::from(*v),
        Literal::String(v) => Value::from(v.clone()),
        Literal::Uuid(v) => Value::from(*v),
        Literal::DateTime(v) => Value::from(*v),
        Literal::List(_) => {
            return Err(PredicateError::TypeMismatch(
                "a list cannot be bound as one parameter".to_string(),
            ))
        }
    };
    Ok(value)
}

/// Rewrite `@N` placeholders to the `$N` form both drivers accept.
///
/// Quoted identifiers and string literals are left untouched.
pub fn to_positional(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut quote: Option<char> = None;
    let mut chars = sql.chars().peekable();

    while let Some(c) = chars.next() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => {}
            None if c == '\'' || c == '"' => quote = Some(c),
            None if c == '@' && chars.peek().is_some_and(|n| n.is_ascii_digit()) => {
                out.push('$');
                continue;
            }
            None => {}
        }
        out.push(c);
    }
    out
}
