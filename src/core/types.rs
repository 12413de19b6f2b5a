//! In-memory tabular values.
//!
//! Cells are [`Value`]s, rows are name-keyed maps, and [`RecordBatch`] is the
//! single columnar representation every input shape is normalized into
//! before insertion or after materialization.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::error::{Error, Result};
use crate::schema::{DataType, Schema};

/// A row addressed by column name.
pub type Row = HashMap<String, Value>;

/// One cell of tabular data.
///
/// `Timestamp` is declared after `Text` on purpose: untagged deserialization
/// keeps arbitrary strings as `Text`, and schema-aware coercion upgrades
/// them where a field is timestamp-typed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Timestamp(DateTime<Utc>),
    Vector(Vec<f32>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_vector(&self) -> Option<&[f32]> {
        match self {
            Value::Vector(v) => Some(v),
            _ => None,
        }
    }

    /// Convert a raw JSON value into a cell. Arrays of numbers become
    /// vectors; any other array or object is kept as its JSON text.
    pub fn from_json(json: serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    Value::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => Value::Text(s),
            serde_json::Value::Array(items) => {
                let mut floats = Vec::with_capacity(items.len());
                for item in &items {
                    match item.as_f64() {
                        Some(f) => floats.push(f as f32),
                        None => {
                            return Value::Text(
                                serde_json::Value::Array(items.clone()).to_string(),
                            )
                        }
                    }
                }
                Value::Vector(floats)
            }
            other @ serde_json::Value::Object(_) => Value::Text(other.to_string()),
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Float(f) => serde_json::Value::from(*f),
            Value::Text(s) => serde_json::Value::String(s.clone()),
            Value::Timestamp(ts) => serde_json::Value::String(ts.to_rfc3339()),
            Value::Vector(v) => {
                serde_json::Value::Array(v.iter().map(|f| serde_json::Value::from(*f as f64)).collect())
            }
        }
    }

    /// Coerce a wire-decoded cell to the type a schema field declares.
    /// Values that already match, and values with no coercion rule, pass
    /// through unchanged.
    pub fn coerce(self, data_type: &DataType) -> Value {
        match (self, data_type) {
            (Value::Text(s), DataType::Vector { .. }) => {
                match serde_json::from_str::<Vec<f32>>(&s) {
                    Ok(v) => Value::Vector(v),
                    Err(_) => Value::Text(s),
                }
            }
            (Value::Text(s), DataType::Timestamp) => match DateTime::parse_from_rfc3339(&s) {
                Ok(ts) => Value::Timestamp(ts.with_timezone(&Utc)),
                Err(_) => Value::Text(s),
            },
            (Value::Int(i), DataType::Float64) => Value::Float(i as f64),
            (other, _) => other,
        }
    }

    /// Render the cell as a SQL literal. Strings are quoted with embedded
    /// quotes doubled; vectors render as `ARRAY[..]::real[]`.
    pub fn sql_literal(&self) -> String {
        match self {
            Value::Null => "NULL".to_string(),
            Value::Bool(true) => "TRUE".to_string(),
            Value::Bool(false) => "FALSE".to_string(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => {
                if f.fract() == 0.0 && f.is_finite() {
                    format!("{:.1}", f)
                } else {
                    f.to_string()
                }
            }
            Value::Text(s) => format!("'{}'", s.replace('\'', "''")),
            Value::Timestamp(ts) => format!("'{}'::timestamptz", ts.to_rfc3339()),
            Value::Vector(v) => {
                if v.is_empty() {
                    "'{}'::real[]".to_string()
                } else {
                    let elems: Vec<String> = v.iter().map(|f| f.to_string()).collect();
                    format!("ARRAY[{}]::real[]", elems.join(","))
                }
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<Vec<f32>> for Value {
    fn from(v: Vec<f32>) -> Self {
        Value::Vector(v)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(ts: DateTime<Utc>) -> Self {
        Value::Timestamp(ts)
    }
}

/// Named, typed columns of equal length.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordBatch {
    schema: Schema,
    columns: Vec<Vec<Value>>,
}

impl RecordBatch {
    /// Build a batch from a schema and column-major data. Column count must
    /// match the schema and all columns must have the same length.
    pub fn try_new(schema: Schema, columns: Vec<Vec<Value>>) -> Result<Self> {
        if columns.len() != schema.fields().len() {
            return Err(Error::Schema(format!(
                "expected {} columns, got {}",
                schema.fields().len(),
                columns.len()
            )));
        }
        if let Some(first) = columns.first() {
            let len = first.len();
            if columns.iter().any(|c| c.len() != len) {
                return Err(Error::Schema(
                    "columns must all have the same length".to_string(),
                ));
            }
        }
        Ok(Self { schema, columns })
    }

    pub fn empty(schema: Schema) -> Self {
        let columns = schema.fields().iter().map(|_| Vec::new()).collect();
        Self { schema, columns }
    }

    /// Normalize row-oriented records into a batch. When no schema is given
    /// it is inferred as the union of fields seen across all rows; an empty
    /// input cannot be inferred and fails with a schema error.
    pub fn from_rows(rows: &[Row], schema: Option<&Schema>) -> Result<Self> {
        let schema = match schema {
            Some(s) => s.clone(),
            None => Schema::infer_from_rows(rows)?,
        };
        let mut columns: Vec<Vec<Value>> = schema.fields().iter().map(|_| Vec::new()).collect();
        for row in rows {
            for (i, field) in schema.fields().iter().enumerate() {
                columns[i].push(row.get(field.name()).cloned().unwrap_or(Value::Null));
            }
        }
        Ok(Self { schema, columns })
    }

    /// Normalize a column map into a batch, inferring each field's type
    /// from its first non-null cell.
    pub fn from_columns(columns: Vec<(String, Vec<Value>)>) -> Result<Self> {
        if columns.is_empty() {
            return Err(Error::Schema(
                "cannot infer a schema from empty input".to_string(),
            ));
        }
        let len = columns[0].1.len();
        if columns.iter().any(|(_, c)| c.len() != len) {
            return Err(Error::Schema(
                "columns must all have the same length".to_string(),
            ));
        }
        let schema = Schema::infer_from_columns(&columns)?;
        let data = columns.into_iter().map(|(_, c)| c).collect();
        Ok(Self {
            schema,
            columns: data,
        })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn num_rows(&self) -> usize {
        self.columns.first().map(|c| c.len()).unwrap_or(0)
    }

    pub fn num_columns(&self) -> usize {
        self.columns.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.schema
            .fields()
            .iter()
            .position(|f| f.name() == name)
    }

    pub fn column(&self, name: &str) -> Option<&[Value]> {
        self.column_index(name).map(|i| self.columns[i].as_slice())
    }

    pub fn value(&self, column: usize, row: usize) -> &Value {
        &self.columns[column][row]
    }

    pub(crate) fn set_value(&mut self, column: usize, row: usize, value: Value) {
        self.columns[column][row] = value;
    }

    /// A new batch containing only the given row indices, in order.
    pub fn take_rows(&self, indices: &[usize]) -> RecordBatch {
        let columns = self
            .columns
            .iter()
            .map(|c| indices.iter().map(|&i| c[i].clone()).collect())
            .collect();
        RecordBatch {
            schema: self.schema.clone(),
            columns,
        }
    }

    /// A new batch without the named column. No-op when the column is absent.
    pub fn drop_column(&self, name: &str) -> RecordBatch {
        match self.column_index(name) {
            None => self.clone(),
            Some(idx) => {
                let schema = self.schema.without_field(name);
                let columns = self
                    .columns
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| *i != idx)
                    .map(|(_, c)| c.clone())
                    .collect();
                RecordBatch { schema, columns }
            }
        }
    }

    pub fn to_rows(&self) -> Vec<Row> {
        let mut rows = Vec::with_capacity(self.num_rows());
        for r in 0..self.num_rows() {
            let mut row = Row::with_capacity(self.num_columns());
            for (c, field) in self.schema.fields().iter().enumerate() {
                row.insert(field.name().to_string(), self.columns[c][r].clone());
            }
            rows.push(row);
        }
        rows
    }
}

/// Heterogeneous tabular input accepted by `add` and `create_table`.
///
/// Every shape is normalized into a [`RecordBatch`] before anything touches
/// the wire.
#[derive(Debug, Clone)]
pub enum TableData {
    Batch(RecordBatch),
    Rows(Vec<Row>),
    Columns(Vec<(String, Vec<Value>)>),
    /// A JSON array of objects (row records) or object of arrays (columns).
    Json(serde_json::Value),
}

impl TableData {
    /// Normalize into a single columnar batch. `schema` aligns row-oriented
    /// input with an existing table's column order when known.
    pub fn into_batch(self, schema: Option<&Schema>) -> Result<RecordBatch> {
        match self {
            TableData::Batch(batch) => Ok(batch),
            TableData::Rows(rows) => RecordBatch::from_rows(&rows, schema),
            TableData::Columns(columns) => RecordBatch::from_columns(columns),
            TableData::Json(json) => match json {
                serde_json::Value::Array(items) => {
                    let mut rows = Vec::with_capacity(items.len());
                    for item in items {
                        match item {
                            serde_json::Value::Object(map) => {
                                let row = map
                                    .into_iter()
                                    .map(|(k, v)| (k, Value::from_json(v)))
                                    .collect();
                                rows.push(row);
                            }
                            other => {
                                return Err(Error::Schema(format!(
                                    "row records must be JSON objects, got {}",
                                    other
                                )))
                            }
                        }
                    }
                    RecordBatch::from_rows(&rows, schema)
                }
                serde_json::Value::Object(map) => {
                    let mut columns = Vec::with_capacity(map.len());
                    for (name, col) in map {
                        match col {
                            serde_json::Value::Array(items) => {
                                let cells = items.into_iter().map(Value::from_json).collect();
                                columns.push((name, cells));
                            }
                            other => {
                                return Err(Error::Schema(format!(
                                    "column '{}' must be a JSON array, got {}",
                                    name, other
                                )))
                            }
                        }
                    }
                    RecordBatch::from_columns(columns)
                }
                other => Err(Error::Schema(format!(
                    "cannot build tabular data from {}",
                    other
                ))),
            },
        }
    }
}

impl From<RecordBatch> for TableData {
    fn from(batch: RecordBatch) -> Self {
        TableData::Batch(batch)
    }
}

impl From<Vec<Row>> for TableData {
    fn from(rows: Vec<Row>) -> Self {
        TableData::Rows(rows)
    }
}

impl From<Vec<(String, Vec<Value>)>> for TableData {
    fn from(columns: Vec<(String, Vec<Value>)>) -> Self {
        TableData::Columns(columns)
    }
}

impl From<serde_json::Value> for TableData {
    fn from(json: serde_json::Value) -> Self {
        TableData::Json(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sql_literals() {
        assert_eq!(Value::Null.sql_literal(), "NULL");
        assert_eq!(Value::Bool(true).sql_literal(), "TRUE");
        assert_eq!(Value::Int(42).sql_literal(), "42");
        assert_eq!(Value::Float(1.5).sql_literal(), "1.5");
        assert_eq!(Value::Float(2.0).sql_literal(), "2.0");
        assert_eq!(
            Value::Text("it's".to_string()).sql_literal(),
            "'it''s'"
        );
        assert_eq!(
            Value::Vector(vec![1.0, 2.5]).sql_literal(),
            "ARRAY[1,2.5]::real[]"
        );
        assert_eq!(Value::Vector(vec![]).sql_literal(), "'{}'::real[]");
    }

    #[test]
    fn json_round_trip() {
        let v = Value::from_json(serde_json::json!([1.0, 2.0, 3.0]));
        assert_eq!(v, Value::Vector(vec![1.0, 2.0, 3.0]));
        let v = Value::from_json(serde_json::json!("plain"));
        assert_eq!(v, Value::Text("plain".to_string()));
        let v = Value::from_json(serde_json::json!(7));
        assert_eq!(v, Value::Int(7));
        assert_eq!(Value::Int(7).to_json(), serde_json::json!(7));
    }

    #[test]
    fn coerce_vector_from_json_text() {
        let v = Value::Text("[0.5,1.5]".to_string());
        let coerced = v.coerce(&DataType::Vector { dim: Some(2) });
        assert_eq!(coerced, Value::Vector(vec![0.5, 1.5]));
    }

    #[test]
    fn batch_from_rows_unions_fields() {
        let rows = vec![
            Row::from([("a".to_string(), Value::Int(1))]),
            Row::from([
                ("a".to_string(), Value::Int(2)),
                ("b".to_string(), Value::Text("x".to_string())),
            ]),
        ];
        let batch = RecordBatch::from_rows(&rows, None).unwrap();
        assert_eq!(batch.num_rows(), 2);
        assert_eq!(batch.num_columns(), 2);
        assert_eq!(batch.column("b").unwrap()[0], Value::Null);
    }

    #[test]
    fn batch_rejects_ragged_columns() {
        let cols = vec![
            ("a".to_string(), vec![Value::Int(1), Value::Int(2)]),
            ("b".to_string(), vec![Value::Int(3)]),
        ];
        assert!(matches!(
            RecordBatch::from_columns(cols),
            Err(Error::Schema(_))
        ));
    }

    #[test]
    fn take_and_drop() {
        let cols = vec![
            ("a".to_string(), vec![Value::Int(1), Value::Int(2), Value::Int(3)]),
            ("b".to_string(), vec![Value::Int(4), Value::Int(5), Value::Int(6)]),
        ];
        let batch = RecordBatch::from_columns(cols).unwrap();
        let taken = batch.take_rows(&[0, 2]);
        assert_eq!(taken.num_rows(), 2);
        assert_eq!(taken.column("a").unwrap()[1], Value::Int(3));
        let dropped = batch.drop_column("b");
        assert_eq!(dropped.num_columns(), 1);
        assert!(dropped.column("b").is_none());
    }
}
