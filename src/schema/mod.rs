//! Schema snapshot consumed by the compiler.
//!
//! The snapshot is owned by the surrounding metadata store; the compiler only
//! reads it. Collections are keyed by name, relations are kept in the order
//! the store produced them because relation lookup is first-match.

mod builder;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub use builder::{CollectionBuilder, FieldBuilder, SchemaBuilder};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SchemaOverview {
    pub collections: BTreeMap<String, CollectionOverview>,
    #[serde(default)]
    pub relations: Vec<Relation>,
}

impl SchemaOverview {
    pub fn from_json(value: serde_json::Value) -> Result<Self> {
        serde_json::from_value(value).map_err(|err| Error::InvalidFilter(err.to_string()))
    }

    pub fn collection(&self, name: &str) -> Result<&CollectionOverview> {
        self.collections
            .get(name)
            .ok_or_else(|| Error::CollectionNotFound(name.to_string()))
    }

    pub fn primary_key(&self, collection: &str) -> Result<&str> {
        Ok(self.collection(collection)?.primary.as_str())
    }

    pub fn field(&self, collection: &str, field: &str) -> Option<&FieldOverview> {
        self.collections.get(collection)?.fields.get(field)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CollectionOverview {
    pub collection: String,
    pub primary: String,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldOverview>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FieldOverview {
    pub field: String,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    #[serde(default)]
    pub special: Vec<String>,
    #[serde(default)]
    pub nullable: bool,
}

impl FieldOverview {
    pub fn is_concealed(&self) -> bool {
        self.special.iter().any(|s| s == "conceal")
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum FieldType {
    #[serde(rename = "string")]
    String,
    #[serde(rename = "text")]
    Text,
    #[serde(rename = "integer")]
    Integer,
    #[serde(rename = "bigInteger")]
    BigInteger,
    #[serde(rename = "float")]
    Float,
    #[serde(rename = "decimal")]
    Decimal,
    #[serde(rename = "boolean")]
    Boolean,
    #[serde(rename = "date")]
    Date,
    #[serde(rename = "dateTime")]
    DateTime,
    #[serde(rename = "time")]
    Time,
    #[serde(rename = "timestamp")]
    Timestamp,
    #[serde(rename = "json")]
    Json,
    #[serde(rename = "csv")]
    Csv,
    #[serde(rename = "uuid")]
    Uuid,
    #[serde(rename = "hash")]
    Hash,
    #[serde(
        rename = "geometry",
        alias = "geometry.Point",
        alias = "geometry.LineString",
        alias = "geometry.Polygon",
        alias = "geometry.MultiPoint",
        alias = "geometry.MultiLineString",
        alias = "geometry.MultiPolygon"
    )]
    Geometry,
    #[serde(rename = "binary")]
    Binary,
    #[serde(rename = "alias")]
    Alias,
    #[serde(rename = "unknown")]
    Unknown,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Text => "text",
            FieldType::Integer => "integer",
            FieldType::BigInteger => "bigInteger",
            FieldType::Float => "float",
            FieldType::Decimal => "decimal",
            FieldType::Boolean => "boolean",
            FieldType::Date => "date",
            FieldType::DateTime => "dateTime",
            FieldType::Time => "time",
            FieldType::Timestamp => "timestamp",
            FieldType::Json => "json",
            FieldType::Csv => "csv",
            FieldType::Uuid => "uuid",
            FieldType::Hash => "hash",
            FieldType::Geometry => "geometry",
            FieldType::Binary => "binary",
            FieldType::Alias => "alias",
            FieldType::Unknown => "unknown",
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            FieldType::Integer | FieldType::BigInteger | FieldType::Float | FieldType::Decimal
        )
    }

    pub fn is_temporal(&self) -> bool {
        matches!(
            self,
            FieldType::Date | FieldType::DateTime | FieldType::Time | FieldType::Timestamp
        )
    }
}

/// A relation as stored by the metadata layer. The "many" side owns the
/// foreign key (`collection.field`); the "one" side is described in `meta`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Relation {
    pub collection: String,
    pub field: String,
    pub related_collection: Option<String>,
    #[serde(default)]
    pub schema: Option<RelationSchema>,
    #[serde(default)]
    pub meta: Option<RelationMeta>,
}

impl Relation {
    pub fn one_field(&self) -> Option<&str> {
        self.meta.as_ref()?.one_field.as_deref()
    }

    pub fn junction_field(&self) -> Option<&str> {
        self.meta.as_ref()?.junction_field.as_deref()
    }

    pub fn one_collection_field(&self) -> Option<&str> {
        self.meta.as_ref()?.one_collection_field.as_deref()
    }

    pub fn one_allowed_collections(&self) -> Option<&[String]> {
        self.meta.as_ref()?.one_allowed_collections.as_deref()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RelationSchema {
    pub table: String,
    pub column: String,
    pub foreign_key_table: Option<String>,
    pub foreign_key_column: Option<String>,
    #[serde(default)]
    pub constraint_name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct RelationMeta {
    pub many_collection: String,
    pub many_field: String,
    #[serde(default)]
    pub one_collection: Option<String>,
    #[serde(default)]
    pub one_field: Option<String>,
    #[serde(default)]
    pub one_collection_field: Option<String>,
    #[serde(default)]
    pub one_allowed_collections: Option<Vec<String>>,
    #[serde(default)]
    pub junction_field: Option<String>,
    #[serde(default)]
    pub sort_field: Option<String>,
}
