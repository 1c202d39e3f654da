//! Table creation and additive migration.
//!
//! Planning is pure: given whether the table exists and its live columns,
//! [`plan_schema`] returns the DDL to run. The store executes it.

use sea_query::{Alias, ColumnDef, DynIden, Iden, Index, IntoIden, Table};
use serde_json::{Map, Value as Json};

use crate::event::{AnyEvent, BASE_PROPERTIES, ID, TIMELINE_ID, TIME_STAMP};
use crate::interfaces::event_store::{Result, StorageError};
use crate::mapping::{describe, ColumnType, Property, TableShape};
use crate::storage::sql::SqlDatabase;
use crate::storage::StoreOptions;

/// Shared table name in single-table layout.
pub const EVENTS_TABLE: &str = "Events";
/// Discriminator column in single-table layout.
pub const TYPE_COLUMN: &str = "Type";
/// Serialized payload column in single-table layout.
pub const PAYLOAD_COLUMN: &str = "Event";

/// Shared events table schema.
#[derive(Iden)]
pub enum Events {
    #[iden = "Events"]
    Table,
    #[iden = "Id"]
    Id,
    #[iden = "TimelineId"]
    TimelineId,
    #[iden = "TimeStamp"]
    TimeStamp,
    #[iden = "Type"]
    Type,
    #[iden = "Event"]
    Event,
}

/// Columns that get a secondary index.
pub const INDEXED_COLUMNS: [&str; 3] = [ID, TIMELINE_ID, TIME_STAMP];

/// Outcome of ensuring a table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaChange {
    Created,
    Migrated(Vec<String>),
    Unchanged,
}

/// DDL statements to bring a table in line with an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaPlan {
    pub change: SchemaChange,
    pub statements: Vec<String>,
}

/// Plan the DDL for storing `event` in `table`.
///
/// `live` is `None` when the table does not exist. Existing tables only
/// ever grow, and only in one-table-per-type layout with auto-migration on.
pub fn plan_schema<DB: SqlDatabase>(
    table: &str,
    live: Option<&TableShape>,
    event: &dyn AnyEvent,
    options: &StoreOptions,
) -> Result<SchemaPlan> {
    let sample = event.to_json()?;
    let sample = sample.as_object().ok_or_else(|| StorageError::Encode {
        type_name: event.event_type().type_name().to_string(),
        property: String::new(),
        reason: "event does not serialize to a JSON object".to_string(),
    })?;

    let Some(live) = live else {
        return Ok(SchemaPlan {
            change: SchemaChange::Created,
            statements: create_statements::<DB>(table, event, sample, options),
        });
    };

    if options.single_table || !options.auto_migrate {
        return Ok(SchemaPlan {
            change: SchemaChange::Unchanged,
            statements: Vec::new(),
        });
    }

    let missing: Vec<Property> = event
        .event_type()
        .shape()
        .into_iter()
        .filter(|p| !live.has_column(p.name))
        .collect();

    if missing.is_empty() {
        return Ok(SchemaPlan {
            change: SchemaChange::Unchanged,
            statements: Vec::new(),
        });
    }

    let statements = missing
        .iter()
        .map(|property| {
            let column_type =
                describe(property, is_null(sample, property), options.compression).column_type;
            let mut column =
                column_def::<DB>(Alias::new(property.name).into_iden(), column_type, true);
            let stmt = Table::alter()
                .table(Alias::new(table))
                .add_column(&mut column)
                .to_owned();
            DB::build_table_alter(stmt)
        })
        .collect();

    Ok(SchemaPlan {
        change: SchemaChange::Migrated(missing.iter().map(|p| p.name.to_string()).collect()),
        statements,
    })
}

fn create_statements<DB: SqlDatabase>(
    table: &str,
    event: &dyn AnyEvent,
    sample: &Map<String, Json>,
    options: &StoreOptions,
) -> Vec<String> {
    let table_iden = if options.single_table {
        Events::Table.into_iden()
    } else {
        Alias::new(table).into_iden()
    };
    let mut create = Table::create();
    create.table(table_iden.clone()).if_not_exists();

    if options.single_table {
        for (iden, property) in [Events::Id, Events::TimelineId, Events::TimeStamp]
            .into_iter()
            .zip(BASE_PROPERTIES.iter())
        {
            let descriptor = describe(property, is_null(sample, property), options.compression);
            create.col(&mut column_def::<DB>(
                iden.into_iden(),
                descriptor.column_type,
                descriptor.nullable,
            ));
        }
        let payload_type = if options.compression {
            ColumnType::Binary
        } else {
            ColumnType::Text
        };
        create.col(&mut column_def::<DB>(
            Events::Type.into_iden(),
            ColumnType::Text,
            false,
        ));
        create.col(&mut column_def::<DB>(
            Events::Event.into_iden(),
            payload_type,
            false,
        ));
    } else {
        for property in event.event_type().shape() {
            let descriptor = describe(&property, is_null(sample, &property), options.compression);
            create.col(&mut column_def::<DB>(
                Alias::new(property.name).into_iden(),
                descriptor.column_type,
                descriptor.nullable,
            ));
        }
    }

    let mut statements = vec![DB::build_table_create(create)];
    for column in INDEXED_COLUMNS {
        let index = Index::create()
            .if_not_exists()
            .name(format!("IX_{}_{}", table, column))
            .table(table_iden.clone())
            .col(Alias::new(column))
            .to_owned();
        statements.push(DB::build_index_create(index));
    }
    statements
}

fn column_def<DB: SqlDatabase>(
    name: DynIden,
    column_type: ColumnType,
    nullable: bool,
) -> ColumnDef {
    let mut def = ColumnDef::new(name);
    def.custom(sql_type::<DB>(column_type));
    if nullable {
        def.null();
    } else {
        def.not_null();
    }
    def
}

fn sql_type<DB: SqlDatabase>(column_type: ColumnType) -> Alias {
    Alias::new(DB::sql_type(column_type))
}

fn is_null(sample: &Map<String, Json>, property: &Property) -> bool {
    sample
        .iter()
        .find(|(key, _)| property.matches(key))
        .map_or(true, |(_, value)| value.is_null())
}
