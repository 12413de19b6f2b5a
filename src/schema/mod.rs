/*
 * Copyright 2025 The Hologres Authors
 *
 * Licensed under the Apache License, Version 2.0 (the "License");
 * you may not use this file except in compliance with the License.
 * You may obtain a copy of the License at
 *
 *     http://www.apache.org/licenses/LICENSE-2.0
 *
 * Unless required by applicable law or agreed to in writing, software
 * distributed under the License is distributed on an "AS IS" BASIS,
 * WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 * See the License for the specific language governing permissions and
 * limitations under the License.
 */

//! Columnar schemas and the fixed type maps.
//!
//! Three translations live here, all deliberately lossy in the reverse
//! direction:
//! - column type tag -> SQL column type (DDL)
//! - `information_schema` type string -> column type tag (open_table)
//! - column type tag <-> cloud API wire string

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::core::error::{Error, Result};
use crate::core::types::{Row, Value};

/// Type tag for one column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataType {
    Boolean,
    Int64,
    Float64,
    Utf8,
    Timestamp,
    /// Numeric sequence used for similarity search. `dim` pins the length
    /// statically; search against a column with `dim: None` is rejected at
    /// lowering time.
    Vector { dim: Option<usize> },
}

impl DataType {
    /// SQL column type used in DDL.
    pub fn sql_type(&self) -> &'static str {
        match self {
            DataType::Boolean => "BOOLEAN",
            DataType::Int64 => "BIGINT",
            DataType::Float64 => "DOUBLE PRECISION",
            DataType::Utf8 => "TEXT",
            DataType::Timestamp => "TIMESTAMPTZ",
            DataType::Vector { .. } => "REAL[]",
        }
    }

    /// Map an `information_schema.columns.data_type` string back to a type
    /// tag. Unmapped source types fall back to `Utf8`; the loss is
    /// intentional, catalog reflection cannot recover client-side tags.
    pub fn from_catalog(data_type: &str) -> DataType {
        let lower = data_type.to_ascii_lowercase();
        if lower == "boolean" {
            DataType::Boolean
        } else if lower == "bigint" || lower == "integer" || lower == "smallint" {
            DataType::Int64
        } else if lower == "double precision" || lower == "real" || lower == "numeric" {
            DataType::Float64
        } else if lower.starts_with("timestamp") {
            DataType::Timestamp
        } else if lower == "array" {
            DataType::Vector { dim: None }
        } else {
            DataType::Utf8
        }
    }

    /// Wire string for the cloud API. Vector types carry the pinned
    /// dimension when known (`list<float32,384>`).
    pub fn wire_name(&self) -> String {
        match self {
            DataType::Boolean => "bool".to_string(),
            DataType::Int64 => "int64".to_string(),
            DataType::Float64 => "float64".to_string(),
            DataType::Utf8 => "string".to_string(),
            DataType::Timestamp => "timestamp".to_string(),
            DataType::Vector { dim: Some(d) } => format!("list<float32,{}>", d),
            DataType::Vector { dim: None } => "list<float32>".to_string(),
        }
    }

    /// Parse a wire string. Dimensionless vector forms are accepted;
    /// unknown tags fall back to `Utf8`.
    pub fn from_wire(name: &str) -> DataType {
        match name {
            "bool" => DataType::Boolean,
            "int64" => DataType::Int64,
            "float64" => DataType::Float64,
            "string" => DataType::Utf8,
            "timestamp" => DataType::Timestamp,
            other => {
                if let Some(inner) = other.strip_prefix("list<").and_then(|s| s.strip_suffix('>')) {
                    let dim = inner
                        .split(',')
                        .nth(1)
                        .and_then(|d| d.trim().parse::<usize>().ok());
                    DataType::Vector { dim }
                } else {
                    DataType::Utf8
                }
            }
        }
    }

    /// Infer a type tag from a cell. Nulls carry no type.
    pub fn of_value(value: &Value) -> Option<DataType> {
        match value {
            Value::Null => None,
            Value::Bool(_) => Some(DataType::Boolean),
            Value::Int(_) => Some(DataType::Int64),
            Value::Float(_) => Some(DataType::Float64),
            Value::Text(_) => Some(DataType::Utf8),
            Value::Timestamp(_) => Some(DataType::Timestamp),
            Value::Vector(v) => Some(DataType::Vector { dim: Some(v.len()) }),
        }
    }

    pub fn is_vector(&self) -> bool {
        matches!(self, DataType::Vector { .. })
    }
}

/// One named, typed column with a nullability flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    name: String,
    data_type: DataType,
    nullable: bool,
}

impl Field {
    pub fn new(name: impl Into<String>, data_type: DataType, nullable: bool) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable,
        }
    }

    /// Shorthand for a nullable vector field with a pinned dimension.
    pub fn vector(name: impl Into<String>, dim: usize) -> Self {
        Self::new(name, DataType::Vector { dim: Some(dim) }, true)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn data_type(&self) -> &DataType {
        &self.data_type
    }

    pub fn nullable(&self) -> bool {
        self.nullable
    }
}

/// Ordered sequence of uniquely named fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Schema {
    fields: Vec<Field>,
}

impl Schema {
    /// Build a schema, rejecting duplicate field names.
    pub fn try_new(fields: Vec<Field>) -> Result<Self> {
        let mut seen = HashSet::new();
        for field in &fields {
            if !seen.insert(field.name.as_str()) {
                return Err(Error::Schema(format!(
                    "duplicate field name '{}'",
                    field.name
                )));
            }
        }
        Ok(Self { fields })
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    /// All vector-typed fields, in schema order.
    pub fn vector_fields(&self) -> Vec<&Field> {
        self.fields
            .iter()
            .filter(|f| f.data_type.is_vector())
            .collect()
    }

    /// The vector column a search targets when the caller names none.
    /// Defined only when the schema has exactly one vector field.
    pub fn default_vector_field(&self) -> Option<&Field> {
        let vectors = self.vector_fields();
        if vectors.len() == 1 {
            Some(vectors[0])
        } else {
            None
        }
    }

    pub fn without_field(&self, name: &str) -> Schema {
        Schema {
            fields: self
                .fields
                .iter()
                .filter(|f| f.name != name)
                .cloned()
                .collect(),
        }
    }

    /// Infer a schema from row records as the permissive union of every
    /// field seen across all rows, name-sorted for determinism. Each
    /// field's type comes from its first non-null cell; Int widens to
    /// Float when both appear. Empty input cannot be inferred.
    pub fn infer_from_rows(rows: &[Row]) -> Result<Schema> {
        if rows.is_empty() {
            return Err(Error::Schema(
                "cannot infer a schema from empty input".to_string(),
            ));
        }
        let mut types: HashMap<String, Option<DataType>> = HashMap::new();
        for row in rows {
            for (name, value) in row {
                let entry = types.entry(name.clone()).or_insert(None);
                match (entry.as_ref(), DataType::of_value(value)) {
                    (None, observed) => *entry = observed,
                    (Some(DataType::Int64), Some(DataType::Float64)) => {
                        *entry = Some(DataType::Float64)
                    }
                    _ => {}
                }
            }
        }
        let mut names: Vec<String> = types.keys().cloned().collect();
        names.sort();
        let fields = names
            .into_iter()
            .map(|name| {
                let data_type = types
                    .remove(&name)
                    .flatten()
                    .unwrap_or(DataType::Utf8);
                Field::new(name, data_type, true)
            })
            .collect();
        Schema::try_new(fields)
    }

    /// Infer a schema from a column map, preserving the given column order.
    pub fn infer_from_columns(columns: &[(String, Vec<Value>)]) -> Result<Schema> {
        if columns.is_empty() {
            return Err(Error::Schema(
                "cannot infer a schema from empty input".to_string(),
            ));
        }
        let fields = columns
            .iter()
            .map(|(name, cells)| {
                let data_type = cells
                    .iter()
                    .find_map(DataType::of_value)
                    .unwrap_or(DataType::Utf8);
                Field::new(name.clone(), data_type, true)
            })
            .collect();
        Schema::try_new(fields)
    }
}

/// Serialized schema shape used by the cloud API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireSchema {
    pub fields: Vec<WireField>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WireField {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default = "nullable_default")]
    pub nullable: bool,
}

fn nullable_default() -> bool {
    true
}

impl From<&Schema> for WireSchema {
    fn from(schema: &Schema) -> Self {
        WireSchema {
            fields: schema
                .fields()
                .iter()
                .map(|f| WireField {
                    name: f.name().to_string(),
                    type_name: f.data_type().wire_name(),
                    nullable: f.nullable(),
                })
                .collect(),
        }
    }
}

impl TryFrom<&WireSchema> for Schema {
    type Error = Error;

    fn try_from(wire: &WireSchema) -> Result<Schema> {
        let fields = wire
            .fields
            .iter()
            .map(|f| Field::new(f.name.clone(), DataType::from_wire(&f.type_name), f.nullable))
            .collect();
        Schema::try_new(fields)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_names_are_rejected() {
        let result = Schema::try_new(vec![
            Field::new("a", DataType::Int64, true),
            Field::new("a", DataType::Utf8, true),
        ]);
        assert!(matches!(result, Err(Error::Schema(_))));
    }

    #[test]
    fn sql_type_map() {
        assert_eq!(DataType::Int64.sql_type(), "BIGINT");
        assert_eq!(DataType::Utf8.sql_type(), "TEXT");
        assert_eq!(DataType::Vector { dim: Some(4) }.sql_type(), "REAL[]");
    }

    #[test]
    fn catalog_map_is_lossy_toward_utf8() {
        assert_eq!(DataType::from_catalog("bigint"), DataType::Int64);
        assert_eq!(DataType::from_catalog("double precision"), DataType::Float64);
        assert_eq!(DataType::from_catalog("ARRAY"), DataType::Vector { dim: None });
        assert_eq!(DataType::from_catalog("tsvector"), DataType::Utf8);
        assert_eq!(DataType::from_catalog("uuid"), DataType::Utf8);
    }

    #[test]
    fn wire_round_trip_keeps_vector_dim() {
        let dt = DataType::Vector { dim: Some(384) };
        assert_eq!(dt.wire_name(), "list<float32,384>");
        assert_eq!(DataType::from_wire("list<float32,384>"), dt);
        // Dimensionless legacy form still parses.
        assert_eq!(
            DataType::from_wire("list<float32>"),
            DataType::Vector { dim: None }
        );
        assert_eq!(DataType::from_wire("mystery"), DataType::Utf8);
    }

    #[test]
    fn infer_from_rows_reproduces_vector_dim() {
        let rows = vec![
            Row::from([
                ("id".to_string(), Value::Int(1)),
                ("embedding".to_string(), Value::Vector(vec![0.0; 8])),
            ]),
            Row::from([
                ("id".to_string(), Value::Int(2)),
                ("embedding".to_string(), Value::Vector(vec![1.0; 8])),
            ]),
        ];
        let schema = Schema::infer_from_rows(&rows).unwrap();
        let field = schema.field("embedding").unwrap();
        assert_eq!(field.data_type(), &DataType::Vector { dim: Some(8) });
        assert!(schema.field("id").is_some());
    }

    #[test]
    fn infer_widens_int_to_float() {
        let rows = vec![
            Row::from([("x".to_string(), Value::Int(1))]),
            Row::from([("x".to_string(), Value::Float(2.5))]),
        ];
        let schema = Schema::infer_from_rows(&rows).unwrap();
        assert_eq!(schema.field("x").unwrap().data_type(), &DataType::Float64);
    }

    #[test]
    fn infer_from_empty_fails() {
        assert!(matches!(
            Schema::infer_from_rows(&[]),
            Err(Error::Schema(_))
        ));
    }

    #[test]
    fn wire_schema_round_trip() {
        let schema = Schema::try_new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("text", DataType::Utf8, true),
            Field::vector("embedding", 16),
        ])
        .unwrap();
        let wire = WireSchema::from(&schema);
        let back = Schema::try_from(&wire).unwrap();
        assert_eq!(back, schema);
    }
}
