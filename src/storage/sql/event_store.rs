//! Unified SQL EventStore implementation.
//!
//! Uses a macro to generate implementations for each SQL backend,
//! eliminating code duplication while maintaining type safety.

use std::marker::PhantomData;
use std::sync::Arc;

use crate::event::EventType;
use crate::interfaces::EventDispatcher;
use crate::storage::schema::EVENTS_TABLE;
use crate::storage::StoreOptions;

use super::SqlDatabase;

/// SQL-based implementation of EventStore.
///
/// This generic implementation works with any SQL database that implements
/// the `SqlDatabase` trait (PostgreSQL, SQLite). Each operation holds one
/// pooled connection for its duration.
pub struct SqlEventStore<DB: SqlDatabase> {
    pool: DB::Pool,
    options: StoreOptions,
    dispatcher: Option<Arc<dyn EventDispatcher>>,
    _marker: PhantomData<DB>,
}

impl<DB: SqlDatabase> SqlEventStore<DB> {
    /// Create a new SQL event store with the given pool.
    pub fn new(pool: DB::Pool, options: StoreOptions) -> Self {
        Self {
            pool,
            options,
            dispatcher: None,
            _marker: PhantomData,
        }
    }

    /// Notify `dispatcher` after every successful save.
    pub fn with_dispatcher(mut self, dispatcher: Arc<dyn EventDispatcher>) -> Self {
        self.dispatcher = Some(dispatcher);
        self
    }

    /// Get the underlying pool.
    pub fn pool(&self) -> &DB::Pool {
        &self.pool
    }

    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    /// Table holding events of `event_type`.
    pub fn table_name(&self, event_type: EventType) -> &'static str {
        if self.options.single_table {
            EVENTS_TABLE
        } else {
            event_type.name()
        }
    }
}

/// Macro to implement EventStore for a specific SQL backend.
///
/// `$conn` is the backend's connection type, borrowed from a pooled
/// connection for the duration of one operation.
macro_rules! impl_event_store {
    ($db_type:ty, $conn:ty, $feature:literal) => {
        #[cfg(feature = $feature)]
        impl SqlEventStore<$db_type> {
            /// Create the table for `event` or add its missing columns.
            pub async fn ensure_table(
                &self,
                event: &dyn crate::event::AnyEvent,
            ) -> crate::storage::Result<crate::storage::schema::SchemaChange> {
                let table = self.table_name(event.event_type());
                let mut conn = self.pool.acquire().await?;
                self.ensure_with(&mut conn, table, event).await
            }

            /// Live shape of `table`, `None` if it does not exist.
            ///
            /// Columns are only read when `with_columns` is set.
            async fn table_shape(
                conn: &mut $conn,
                table: &str,
                with_columns: bool,
            ) -> crate::storage::Result<Option<crate::mapping::TableShape>> {
                let exists: Option<String> =
                    sqlx::query_scalar(<$db_type as SqlDatabase>::TABLE_EXISTS_SQL)
                        .bind(table)
                        .fetch_optional(&mut *conn)
                        .await?;

                if exists.is_none() {
                    return Ok(None);
                }
                if !with_columns {
                    return Ok(Some(crate::mapping::TableShape::default()));
                }

                let columns: Vec<String> =
                    sqlx::query_scalar(<$db_type as SqlDatabase>::TABLE_COLUMNS_SQL)
                        .bind(table)
                        .fetch_all(&mut *conn)
                        .await?;

                Ok(Some(crate::mapping::TableShape::new(columns)))
            }

            async fn ensure_with(
                &self,
                conn: &mut $conn,
                table: &str,
                event: &dyn crate::event::AnyEvent,
            ) -> crate::storage::Result<crate::storage::schema::SchemaChange> {
                use tracing::{debug, info};

                use crate::storage::schema::{plan_schema, SchemaChange};

                let migrates = self.options.auto_migrate && !self.options.single_table;
                let live = Self::table_shape(conn, table, migrates).await?;
                let plan = plan_schema::<$db_type>(table, live.as_ref(), event, &self.options)?;

                for statement in &plan.statements {
                    match sqlx::query(statement).execute(&mut *conn).await {
                        Ok(_) => {}
                        // Another writer created it first.
                        Err(e) if <$db_type as SqlDatabase>::is_already_exists(&e) => {
                            debug!(table = %table, error = %e, "Schema object already exists");
                        }
                        Err(e) => return Err(e.into()),
                    }
                }

                match &plan.change {
                    SchemaChange::Created => info!(table = %table, "Created event table"),
                    SchemaChange::Migrated(columns) => {
                        info!(table = %table, columns = ?columns, "Added columns to event table")
                    }
                    SchemaChange::Unchanged => {}
                }

                Ok(plan.change)
            }

            async fn select(
                &self,
                conn: &mut $conn,
                table: &str,
                event_type: crate::event::EventType,
                predicate: &crate::predicate::Expr,
            ) -> crate::storage::Result<Vec<Box<dyn crate::event::AnyEvent>>> {
                use sqlx::{Column, Row};
                use tracing::debug;

                use crate::storage::codec::RowLayout;
                use crate::storage::sql::{bind_values, plan_select, to_positional};

                let plan = plan_select::<$db_type>(table, event_type, predicate, &self.options)?;
                let sql = to_positional(&plan.sql);
                debug!(table = %table, sql = %sql, "Selecting events");

                let values = bind_values::<$db_type>(&plan.bindings)?;
                let rows = sqlx::query_with(&sql, values).fetch_all(&mut *conn).await?;

                let layout = RowLayout::new(event_type, &self.options);
                let mut events = Vec::with_capacity(rows.len());

                for row in &rows {
                    let mut raw = Vec::with_capacity(row.columns().len());
                    for (index, column) in row.columns().iter().enumerate() {
                        let Some(column_type) = layout.column_type(column.name())? else {
                            continue;
                        };
                        let value =
                            <$db_type as SqlDatabase>::read_column(row, index, column_type)?;
                        raw.push((column.name().to_string(), value));
                    }

                    let Some(event) = layout.decode(raw)? else {
                        continue;
                    };

                    if let Some(residual) = &plan.residual {
                        let json = event.to_json()?;
                        let matched = match json.as_object() {
                            Some(object) => crate::predicate::evaluate(residual, object)?,
                            None => false,
                        };
                        if !matched {
                            continue;
                        }
                    }

                    events.push(event);
                }

                Ok(events)
            }
        }

        #[cfg(feature = $feature)]
        #[async_trait::async_trait]
        impl crate::storage::EventStore for SqlEventStore<$db_type> {
            async fn save(
                &self,
                event: &dyn crate::event::AnyEvent,
            ) -> crate::storage::Result<()> {
                use sea_query::{Alias, Query, SimpleExpr};
                use tracing::debug;

                use crate::event::EventRegistry;
                use crate::storage::codec::parameters;
                use crate::storage::StorageError;

                let event_type = event.event_type();
                if event_type.name().trim().is_empty() {
                    return Err(StorageError::InvalidArgument(format!(
                        "event type {} has a blank name",
                        event_type.type_name()
                    )));
                }
                if self.options.single_table
                    && !EventRegistry::global().contains(event_type.type_name())
                {
                    return Err(StorageError::UnregisteredEventType(
                        event_type.type_name().to_string(),
                    ));
                }

                let table = self.table_name(event_type);
                let mut conn = self.pool.acquire().await?;
                self.ensure_with(&mut conn, table, event).await?;

                let params = parameters(event, &self.options)?;
                let stmt = Query::insert()
                    .into_table(Alias::new(table))
                    .columns(params.iter().map(|p| Alias::new(p.column.as_str())))
                    .values(params.into_iter().map(|p| {
                        SimpleExpr::from(<$db_type as SqlDatabase>::bind_value(p.value))
                    }))?
                    .to_owned();

                let (sql, values) = <$db_type as SqlDatabase>::build_insert(stmt);
                sqlx::query_with(&sql, values).execute(&mut *conn).await?;
                drop(conn);

                debug!(table = %table, id = %event.header().id, "Saved event");

                if let Some(dispatcher) = &self.dispatcher {
                    dispatcher.dispatch(event).await?;
                }
                Ok(())
            }

            async fn find_by_type(
                &self,
                event_type: crate::event::EventType,
                predicate: &crate::predicate::Expr,
            ) -> crate::storage::Result<Vec<Box<dyn crate::event::AnyEvent>>> {
                let table = self.table_name(event_type);
                let mut conn = self.pool.acquire().await?;

                if Self::table_shape(&mut conn, table, false).await?.is_none() {
                    return Ok(Vec::new());
                }

                self.select(&mut conn, table, event_type, predicate).await
            }

            async fn retrieve_events(
                &self,
                aggregate_id: uuid::Uuid,
                point_in_time: chrono::DateTime<chrono::Utc>,
                mappings: &[crate::event::EventMapping],
                timeline_id: Option<uuid::Uuid>,
            ) -> crate::storage::Result<Vec<Box<dyn crate::event::AnyEvent>>> {
                use tracing::debug;

                use crate::storage::sql::history_predicate;

                // Group by event type, first-seen order.
                let mut groups: Vec<(crate::event::EventType, Vec<&str>)> = Vec::new();
                for mapping in mappings {
                    let property = mapping.aggregate_id_property.as_str();
                    match groups.iter_mut().find(|(t, _)| *t == mapping.event_type) {
                        Some((_, properties)) => properties.push(property),
                        None => groups.push((mapping.event_type, vec![property])),
                    }
                }

                let mut conn = self.pool.acquire().await?;
                let mut events = Vec::new();

                for (event_type, properties) in groups {
                    let table = self.table_name(event_type);
                    if Self::table_shape(&mut conn, table, false).await?.is_none() {
                        debug!(table = %table, "No table for event type, skipping");
                        continue;
                    }

                    let Some(predicate) =
                        history_predicate(aggregate_id, point_in_time, &properties, timeline_id)
                    else {
                        continue;
                    };

                    events.extend(self.select(&mut conn, table, event_type, &predicate).await?);
                }

                events.sort_by_key(|event| event.header().time_stamp);
                Ok(events)
            }
        }
    };
}

impl_event_store!(crate::storage::sqlite::Sqlite, sqlx::SqliteConnection, "sqlite");
impl_event_store!(crate::storage::postgres::Postgres, sqlx::PgConnection, "postgres");
