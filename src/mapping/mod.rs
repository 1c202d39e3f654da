//! Property-to-column type mapping.
//!
//! Every stored property of an event carries a [`PropertyKind`] tag. The tag
//! decides the column type, whether the value is stored JSON-encoded, and the
//! blank default used when a non-optional column reads back as NULL.

use std::fmt;

use serde_json::Value as Json;

/// Logical column type, rendered to a concrete SQL type by each backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ColumnType {
    Uuid,
    Timestamp,
    Bool,
    TinyInt,
    SmallInt,
    Int,
    BigInt,
    Real,
    Double,
    Text,
    Binary,
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ColumnType::Uuid => "uuid",
            ColumnType::Timestamp => "timestamp",
            ColumnType::Bool => "bool",
            ColumnType::TinyInt => "tinyint",
            ColumnType::SmallInt => "smallint",
            ColumnType::Int => "int",
            ColumnType::BigInt => "bigint",
            ColumnType::Real => "real",
            ColumnType::Double => "double",
            ColumnType::Text => "text",
            ColumnType::Binary => "binary",
        };
        f.write_str(name)
    }
}

/// Static type tag of an event property.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyKind {
    Uuid,
    DateTime,
    Bool,
    I8,
    U8,
    I16,
    U16,
    I32,
    U32,
    I64,
    /// Stored in a signed 64-bit column by bit pattern; values above
    /// `i64::MAX` read back intact but order as negative numbers in SQL.
    U64,
    F32,
    F64,
    String,
    Bytes,
    /// Unit-variant enum, serialized by name and stored by ordinal.
    Enum(&'static [&'static str]),
    /// Nested structures, sequences and maps, stored as one JSON document.
    ///
    /// A NULL document decodes as an absent field, so such fields should
    /// carry `#[serde(default)]`.
    Json,
}

/// One stored property of an event type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Property {
    pub name: &'static str,
    pub kind: PropertyKind,
    /// Statically nullable (`Option<T>` fields).
    pub optional: bool,
}

impl Property {
    pub const fn new(name: &'static str, kind: PropertyKind) -> Self {
        Self {
            name,
            kind,
            optional: false,
        }
    }

    pub const fn optional(name: &'static str, kind: PropertyKind) -> Self {
        Self {
            name,
            kind,
            optional: true,
        }
    }

    pub fn matches(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }

    /// Ordinal of an enum variant name.
    pub fn ordinal_of(&self, variant: &str) -> Option<i32> {
        match self.kind {
            PropertyKind::Enum(variants) => variants
                .iter()
                .position(|v| *v == variant)
                .and_then(|i| i32::try_from(i).ok()),
            _ => None,
        }
    }

    /// Value a NULL column reads back as for a non-optional property.
    pub fn blank_default(&self) -> Json {
        match self.kind {
            PropertyKind::Uuid => Json::String(uuid::Uuid::nil().to_string()),
            PropertyKind::DateTime => {
                Json::String(chrono::DateTime::<chrono::Utc>::default().to_rfc3339())
            }
            PropertyKind::Bool => Json::Bool(false),
            PropertyKind::I8
            | PropertyKind::U8
            | PropertyKind::I16
            | PropertyKind::U16
            | PropertyKind::I32
            | PropertyKind::U32
            | PropertyKind::I64
            | PropertyKind::U64 => Json::from(0),
            PropertyKind::F32 | PropertyKind::F64 => Json::from(0.0),
            PropertyKind::String => Json::String(String::new()),
            PropertyKind::Bytes => Json::Array(Vec::new()),
            PropertyKind::Enum(variants) => variants
                .first()
                .map(|v| Json::String((*v).to_string()))
                .unwrap_or(Json::Null),
            PropertyKind::Json => Json::Null,
        }
    }
}

/// Storage descriptor derived for one property value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypeDescriptor {
    pub column_type: ColumnType,
    pub nullable: bool,
    pub json_encoded: bool,
}

/// Derive the storage descriptor of a property.
///
/// A column is nullable when the property is optional or the value at hand is
/// null. JSON-encoded properties become binary under compression.
pub fn describe(property: &Property, value_is_null: bool, compression: bool) -> TypeDescriptor {
    let (column_type, json_encoded) = match property.kind {
        PropertyKind::Uuid => (ColumnType::Uuid, false),
        PropertyKind::DateTime => (ColumnType::Timestamp, false),
        PropertyKind::Bool => (ColumnType::Bool, false),
        PropertyKind::I8 | PropertyKind::U8 => (ColumnType::TinyInt, false),
        PropertyKind::I16 => (ColumnType::SmallInt, false),
        // Unsigned kinds take the next signed width that holds every value.
        PropertyKind::U16 | PropertyKind::I32 | PropertyKind::Enum(_) => (ColumnType::Int, false),
        PropertyKind::U32 | PropertyKind::I64 | PropertyKind::U64 => (ColumnType::BigInt, false),
        PropertyKind::F32 => (ColumnType::Real, false),
        PropertyKind::F64 => (ColumnType::Double, false),
        PropertyKind::String => (ColumnType::Text, false),
        PropertyKind::Bytes => (ColumnType::Binary, false),
        PropertyKind::Json if compression => (ColumnType::Binary, true),
        PropertyKind::Json => (ColumnType::Text, true),
    };

    TypeDescriptor {
        column_type,
        nullable: property.optional || value_is_null,
        json_encoded,
    }
}

/// Live column names of a table as read from database metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableShape {
    columns: Vec<String>,
}

impl TableShape {
    pub fn new(columns: Vec<String>) -> Self {
        Self { columns }
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|column| column.eq_ignore_ascii_case(name))
    }
}
