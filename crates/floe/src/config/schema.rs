//! Input schemas for the catalog and event datasets.
//!
//! Both datasets are read with an explicit Arrow schema unless the job config
//! asks for inference. A fixed schema keeps column types stable across runs
//! and turns fields absent from a record into nulls instead of missing
//! columns.

use datafusion::arrow::datatypes::{DataType, Field, Schema, SchemaRef, TimeUnit};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Schema field configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct FieldConfig {
    /// Field name, matched case-sensitively against the JSON keys.
    pub name: String,
    /// Field type.
    #[serde(rename = "type")]
    pub field_type: FieldType,
    /// Whether the field is nullable.
    #[serde(default = "default_nullable")]
    pub nullable: bool,
}

fn default_nullable() -> bool {
    true
}

/// Supported field types.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Int32,
    Int64,
    Float64,
    Boolean,
    Timestamp,
}

impl FieldType {
    /// Convert to Arrow DataType.
    pub fn to_arrow_type(self) -> DataType {
        match self {
            FieldType::String => DataType::Utf8,
            FieldType::Int32 => DataType::Int32,
            FieldType::Int64 => DataType::Int64,
            FieldType::Float64 => DataType::Float64,
            FieldType::Boolean => DataType::Boolean,
            FieldType::Timestamp => DataType::Timestamp(TimeUnit::Millisecond, None),
        }
    }
}

/// Per-dataset schema configuration.
///
/// Empty (the default) selects the built-in schema for the dataset.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SchemaConfig {
    /// Let the engine infer the schema from the files instead.
    #[serde(default)]
    pub infer: bool,
    /// Explicit list of fields.
    #[serde(default)]
    pub fields: Vec<FieldConfig>,
}

impl SchemaConfig {
    /// Resolve to the schema to read with, or `None` to infer.
    pub fn resolve(&self, builtin: fn() -> SchemaRef) -> Option<SchemaRef> {
        if self.infer {
            None
        } else if self.fields.is_empty() {
            Some(builtin())
        } else {
            let fields: Vec<Field> = self
                .fields
                .iter()
                .map(|f| Field::new(&f.name, f.field_type.to_arrow_type(), f.nullable))
                .collect();
            Some(Arc::new(Schema::new(fields)))
        }
    }
}

/// Built-in schema of a catalog record.
pub fn catalog_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("num_songs", DataType::Int64, true),
        Field::new("artist_id", DataType::Utf8, true),
        Field::new("artist_latitude", DataType::Float64, true),
        Field::new("artist_longitude", DataType::Float64, true),
        Field::new("artist_location", DataType::Utf8, true),
        Field::new("artist_name", DataType::Utf8, true),
        Field::new("song_id", DataType::Utf8, true),
        Field::new("title", DataType::Utf8, true),
        Field::new("duration", DataType::Float64, true),
        Field::new("year", DataType::Int64, true),
    ]))
}

/// Built-in schema of an event record.
pub fn event_schema() -> SchemaRef {
    Arc::new(Schema::new(vec![
        Field::new("artist", DataType::Utf8, true),
        Field::new("auth", DataType::Utf8, true),
        Field::new("firstName", DataType::Utf8, true),
        Field::new("gender", DataType::Utf8, true),
        Field::new("itemInSession", DataType::Int64, true),
        Field::new("lastName", DataType::Utf8, true),
        Field::new("length", DataType::Float64, true),
        Field::new("level", DataType::Utf8, true),
        Field::new("location", DataType::Utf8, true),
        Field::new("method", DataType::Utf8, true),
        Field::new("page", DataType::Utf8, true),
        Field::new("registration", DataType::Float64, true),
        Field::new("sessionId", DataType::Int64, true),
        Field::new("song", DataType::Utf8, true),
        Field::new("status", DataType::Int64, true),
        // Epoch millis; quoted values decode as well.
        Field::new("ts", DataType::Int64, true),
        Field::new("userAgent", DataType::Utf8, true),
        Field::new("userId", DataType::Utf8, true),
    ]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_resolves_to_builtin() {
        let schema = SchemaConfig::default().resolve(catalog_schema).unwrap();
        assert_eq!(schema.field_with_name("song_id").unwrap().data_type(), &DataType::Utf8);
        assert_eq!(schema.field_with_name("year").unwrap().data_type(), &DataType::Int64);
    }

    #[test]
    fn test_infer_resolves_to_none() {
        let config = SchemaConfig {
            infer: true,
            fields: vec![],
        };
        assert!(config.resolve(event_schema).is_none());
    }

    #[test]
    fn test_explicit_fields() {
        let yaml = r#"
fields:
  - name: userId
    type: string
  - name: ts
    type: int64
    nullable: false
"#;
        let config: SchemaConfig = serde_yaml::from_str(yaml).unwrap();
        let schema = config.resolve(event_schema).unwrap();

        assert_eq!(schema.fields().len(), 2);
        let ts = schema.field_with_name("ts").unwrap();
        assert_eq!(ts.data_type(), &DataType::Int64);
        assert!(!ts.is_nullable());
    }

    #[test]
    fn test_event_schema_keeps_camel_case_names() {
        let schema = event_schema();
        for name in ["userId", "firstName", "lastName", "sessionId", "userAgent"] {
            assert!(schema.field_with_name(name).is_ok(), "{name}");
        }
    }
}
