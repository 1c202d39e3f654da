//! Row codec: events to column parameters and result rows back to events.

use chrono::{DateTime, Utc};
use sea_query::Value;
use serde_json::{Map, Value as Json};
use tracing::warn;
use uuid::Uuid;

use crate::event::{AnyEvent, EventRegistry, EventType, BASE_PROPERTIES};
use crate::interfaces::event_store::{Result, StorageError};
use crate::mapping::{describe, ColumnType, Property, PropertyKind};
use crate::storage::compression;
use crate::storage::schema::{PAYLOAD_COLUMN, TYPE_COLUMN};
use crate::storage::StoreOptions;

/// One column value of a result row, as read from the driver.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    Uuid(Uuid),
    Timestamp(DateTime<Utc>),
}

/// A row as `(column name, value)` pairs, in select order.
pub type RawRow = Vec<(String, ColumnValue)>;

/// One INSERT parameter.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterDatum {
    pub column: String,
    pub value: Value,
    pub column_type: ColumnType,
}

/// Typed SQL NULL for a column.
pub fn null_value(column_type: ColumnType) -> Value {
    match column_type {
        ColumnType::Uuid => Value::Uuid(None),
        ColumnType::Timestamp => Value::ChronoDateTimeUtc(None),
        ColumnType::Bool => Value::Bool(None),
        ColumnType::TinyInt | ColumnType::SmallInt => Value::SmallInt(None),
        ColumnType::Int => Value::Int(None),
        ColumnType::BigInt => Value::BigInt(None),
        ColumnType::Real => Value::Float(None),
        ColumnType::Double => Value::Double(None),
        ColumnType::Text => Value::String(None),
        ColumnType::Binary => Value::Bytes(None),
    }
}

/// Build the INSERT parameters for `event`.
///
/// Shared-table layout stores only the base columns plus the type identity
/// and the whole event as one payload.
pub fn parameters(event: &dyn AnyEvent, options: &StoreOptions) -> Result<Vec<ParameterDatum>> {
    let event_type = event.event_type();
    let json = event.to_json()?;
    let object = as_object(&json, event_type)?;

    let shape = if options.single_table {
        BASE_PROPERTIES.to_vec()
    } else {
        event_type.shape()
    };

    let mut params = Vec::with_capacity(shape.len() + 2);
    for property in &shape {
        let value = lookup(object, property.name);
        let descriptor = describe(property, value.is_none(), options.compression);
        let encoded = match value {
            None => null_value(descriptor.column_type),
            Some(value) => encode_value(property, value, options.compression)
                .map_err(|reason| StorageError::Encode {
                    type_name: event_type.type_name().to_string(),
                    property: property.name.to_string(),
                    reason,
                })?,
        };
        params.push(ParameterDatum {
            column: property.name.to_string(),
            value: encoded,
            column_type: descriptor.column_type,
        });
    }

    if options.single_table {
        params.push(ParameterDatum {
            column: TYPE_COLUMN.to_string(),
            value: Value::from(event_type.type_name().to_string()),
            column_type: ColumnType::Text,
        });
        params.push(payload_parameter(&json, options.compression)?);
    }

    Ok(params)
}

fn payload_parameter(json: &Json, compression: bool) -> Result<ParameterDatum> {
    let text = serde_json::to_string(json)?;
    let (value, column_type) = if compression {
        (Value::from(compression::compress(text.as_bytes())?), ColumnType::Binary)
    } else {
        (Value::from(text), ColumnType::Text)
    };
    Ok(ParameterDatum {
        column: PAYLOAD_COLUMN.to_string(),
        value,
        column_type,
    })
}

fn encode_value(
    property: &Property,
    value: &Json,
    compression: bool,
) -> std::result::Result<Value, String> {
    let mismatch = || format!("unexpected JSON value {}", value);

    let encoded = match property.kind {
        PropertyKind::Uuid => {
            let text = value.as_str().ok_or_else(mismatch)?;
            Value::from(Uuid::parse_str(text).map_err(|e| e.to_string())?)
        }
        PropertyKind::DateTime => {
            let text = value.as_str().ok_or_else(mismatch)?;
            let parsed = DateTime::parse_from_rfc3339(text).map_err(|e| e.to_string())?;
            Value::from(parsed.with_timezone(&Utc))
        }
        PropertyKind::Bool => Value::from(value.as_bool().ok_or_else(mismatch)?),
        PropertyKind::I8 | PropertyKind::U8 | PropertyKind::I16 => {
            let n = value.as_i64().ok_or_else(mismatch)?;
            Value::SmallInt(Some(i16::try_from(n).map_err(|e| e.to_string())?))
        }
        PropertyKind::U16 | PropertyKind::I32 => {
            let n = value.as_i64().ok_or_else(mismatch)?;
            Value::Int(Some(i32::try_from(n).map_err(|e| e.to_string())?))
        }
        PropertyKind::U32 | PropertyKind::I64 => {
            Value::BigInt(Some(value.as_i64().ok_or_else(mismatch)?))
        }
        // Same bits, signed column.
        PropertyKind::U64 => Value::BigInt(Some(value.as_u64().ok_or_else(mismatch)? as i64)),
        PropertyKind::F32 => Value::Float(Some(value.as_f64().ok_or_else(mismatch)? as f32)),
        PropertyKind::F64 => Value::Double(Some(value.as_f64().ok_or_else(mismatch)?)),
        PropertyKind::String => Value::from(value.as_str().ok_or_else(mismatch)?.to_string()),
        PropertyKind::Bytes => {
            let bytes = serde_json::from_value::<Vec<u8>>(value.clone()).map_err(|e| e.to_string())?;
            Value::from(bytes)
        }
        PropertyKind::Enum(_) => {
            let ordinal = match value {
                Json::String(name) => property
                    .ordinal_of(name)
                    .ok_or_else(|| format!("{} is not a declared variant", name))?,
                // Out-of-range ordinals read back as raw numbers; store them as-is.
                Json::Number(n) => n
                    .as_i64()
                    .and_then(|n| i32::try_from(n).ok())
                    .ok_or_else(mismatch)?,
                _ => return Err(mismatch()),
            };
            Value::Int(Some(ordinal))
        }
        PropertyKind::Json => {
            let text = serde_json::to_string(value).map_err(|e| e.to_string())?;
            if compression {
                Value::from(compression::compress(text.as_bytes()).map_err(|e| e.to_string())?)
            } else {
                Value::from(text)
            }
        }
    };
    Ok(encoded)
}

/// How result rows of one query are read and decoded.
#[derive(Debug, Clone)]
pub enum RowLayout {
    /// One table per event type, one column per property.
    Typed {
        event_type: EventType,
        shape: Vec<Property>,
        compression: bool,
    },
    /// Shared table: discriminator plus payload.
    Polymorphic { compression: bool },
}

impl RowLayout {
    pub fn new(event_type: EventType, options: &StoreOptions) -> Self {
        if options.single_table {
            RowLayout::Polymorphic {
                compression: options.compression,
            }
        } else {
            RowLayout::Typed {
                event_type,
                shape: event_type.shape(),
                compression: options.compression,
            }
        }
    }

    /// Column type to read `column` as; `None` skips the column.
    pub fn column_type(&self, column: &str) -> Result<Option<ColumnType>> {
        match self {
            RowLayout::Typed {
                event_type,
                shape,
                compression,
            } => {
                let property = shape.iter().find(|p| p.matches(column)).ok_or_else(|| {
                    StorageError::MissingMember {
                        type_name: event_type.type_name().to_string(),
                        column: column.to_string(),
                    }
                })?;
                Ok(Some(describe(property, false, *compression).column_type))
            }
            RowLayout::Polymorphic { compression } => {
                if column.eq_ignore_ascii_case(TYPE_COLUMN) {
                    Ok(Some(ColumnType::Text))
                } else if column.eq_ignore_ascii_case(PAYLOAD_COLUMN) {
                    Ok(Some(if *compression {
                        ColumnType::Binary
                    } else {
                        ColumnType::Text
                    }))
                } else {
                    Ok(None)
                }
            }
        }
    }

    /// Decode one row.
    ///
    /// Shared-table rows that cannot be decoded are skipped (`Ok(None)`);
    /// typed rows fail the query.
    pub fn decode(&self, row: RawRow) -> Result<Option<Box<dyn AnyEvent>>> {
        match self {
            RowLayout::Typed {
                event_type,
                shape,
                compression,
            } => decode_typed(*event_type, shape, row, *compression).map(Some),
            RowLayout::Polymorphic { compression } => Ok(decode_polymorphic(row, *compression)),
        }
    }
}

fn decode_typed(
    event_type: EventType,
    shape: &[Property],
    row: RawRow,
    compression: bool,
) -> Result<Box<dyn AnyEvent>> {
    let mut object = Map::with_capacity(shape.len());

    for (column, value) in row {
        let property = shape.iter().find(|p| p.matches(&column)).ok_or_else(|| {
            StorageError::MissingMember {
                type_name: event_type.type_name().to_string(),
                column: column.clone(),
            }
        })?;
        let json = column_json(property, value, compression).map_err(|reason| {
            StorageError::Decode {
                type_name: event_type.type_name().to_string(),
                column: column.clone(),
                reason,
            }
        })?;
        put(&mut object, property, json);
    }

    // Properties newer than the table read as their blank default.
    for property in shape {
        if !object.contains_key(property.name) {
            let blank = if property.optional {
                Json::Null
            } else {
                property.blank_default()
            };
            put(&mut object, property, blank);
        }
    }

    Ok(event_type.decode(Json::Object(object))?)
}

/// A NULL JSON document is left out so the field's serde default applies.
fn put(object: &mut Map<String, Json>, property: &Property, json: Json) {
    if json.is_null() && property.kind == PropertyKind::Json {
        return;
    }
    object.insert(property.name.to_string(), json);
}

fn column_json(
    property: &Property,
    value: ColumnValue,
    compression: bool,
) -> std::result::Result<Json, String> {
    let mismatch = |value: &ColumnValue| format!("unexpected {:?} for {:?}", value, property.kind);

    let json = match (property.kind, value) {
        (_, ColumnValue::Null) if property.optional => Json::Null,
        (_, ColumnValue::Null) => property.blank_default(),
        (PropertyKind::Uuid, ColumnValue::Uuid(u)) => Json::String(u.to_string()),
        (PropertyKind::Uuid, ColumnValue::Text(s)) => Json::String(s),
        (PropertyKind::DateTime, ColumnValue::Timestamp(t)) => Json::String(t.to_rfc3339()),
        (PropertyKind::DateTime, ColumnValue::Text(s)) => Json::String(s),
        (PropertyKind::Bool, ColumnValue::Bool(b)) => Json::Bool(b),
        (PropertyKind::Bool, ColumnValue::Int(i)) => Json::Bool(i != 0),
        (PropertyKind::U64, ColumnValue::Int(i)) => Json::from(i as u64),
        (
            PropertyKind::I8
            | PropertyKind::U8
            | PropertyKind::I16
            | PropertyKind::U16
            | PropertyKind::I32
            | PropertyKind::U32
            | PropertyKind::I64,
            ColumnValue::Int(i),
        ) => Json::from(i),
        (PropertyKind::F32 | PropertyKind::F64, ColumnValue::Float(f)) => Json::from(f),
        (PropertyKind::F32 | PropertyKind::F64, ColumnValue::Int(i)) => Json::from(i as f64),
        (PropertyKind::String, ColumnValue::Text(s)) => Json::String(s),
        (PropertyKind::Bytes, ColumnValue::Bytes(b)) => Json::from(b),
        (PropertyKind::Enum(variants), ColumnValue::Int(i)) => enum_json(variants, i),
        (PropertyKind::Enum(variants), ColumnValue::Text(s)) => match s.trim().parse::<i64>() {
            Ok(i) => enum_json(variants, i),
            Err(_) => Json::String(s),
        },
        (PropertyKind::Json, ColumnValue::Text(s)) => parse_lenient(s),
        (PropertyKind::Json, ColumnValue::Bytes(b)) => {
            let bytes = if compression {
                compression::decompress(&b).map_err(|e| e.to_string())?
            } else {
                b
            };
            parse_lenient(String::from_utf8(bytes).map_err(|e| e.to_string())?)
        }
        (_, other) => return Err(mismatch(&other)),
    };
    Ok(json)
}

/// Variant name for an ordinal; unknown ordinals pass through as numbers.
fn enum_json(variants: &[&str], ordinal: i64) -> Json {
    usize::try_from(ordinal)
        .ok()
        .and_then(|i| variants.get(i))
        .map(|name| Json::String((*name).to_string()))
        .unwrap_or_else(|| Json::from(ordinal))
}

/// Stored JSON text back to a value; text that is not JSON stays a string.
fn parse_lenient(text: String) -> Json {
    match serde_json::from_str(text.trim()) {
        Ok(value) => value,
        Err(_) => Json::String(text),
    }
}

fn decode_polymorphic(row: RawRow, compression: bool) -> Option<Box<dyn AnyEvent>> {
    let mut type_name = None;
    let mut payload = None;
    for (column, value) in row {
        if column.eq_ignore_ascii_case(TYPE_COLUMN) {
            type_name = Some(value);
        } else if column.eq_ignore_ascii_case(PAYLOAD_COLUMN) {
            payload = Some(value);
        }
    }

    let type_name = match type_name {
        Some(ColumnValue::Text(name)) if !name.trim().is_empty() => name,
        other => {
            warn!(discriminator = ?other, "Skipping event row without a type");
            return None;
        }
    };

    let Some(event_type) = EventRegistry::global().resolve(&type_name) else {
        warn!(type_name = %type_name, "Skipping event row of unregistered type");
        return None;
    };

    let bytes = match payload {
        Some(ColumnValue::Text(text)) => text.into_bytes(),
        Some(ColumnValue::Bytes(bytes)) if compression => match compression::decompress(&bytes) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(type_name = %type_name, error = %e, "Skipping event row with corrupt payload");
                return None;
            }
        },
        Some(ColumnValue::Bytes(bytes)) => bytes,
        _ => {
            warn!(type_name = %type_name, "Skipping event row without payload");
            return None;
        }
    };

    let decoded = serde_json::from_slice::<Json>(&bytes).and_then(|json| event_type.decode(json));
    match decoded {
        Ok(event) => Some(event),
        Err(e) => {
            warn!(type_name = %type_name, error = %e, "Skipping malformed event row");
            None
        }
    }
}

fn as_object(json: &Json, event_type: EventType) -> Result<&Map<String, Json>> {
    json.as_object().ok_or_else(|| StorageError::Encode {
        type_name: event_type.type_name().to_string(),
        property: String::new(),
        reason: "event does not serialize to a JSON object".to_string(),
    })
}

/// Present, non-null value of a property.
fn lookup<'a>(object: &'a Map<String, Json>, name: &str) -> Option<&'a Json> {
    object
        .get(name)
        .or_else(|| {
            object
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .map(|(_, value)| value)
        })
        .filter(|value| !value.is_null())
}
