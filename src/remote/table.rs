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

//! Cloud table backend.
//!
//! Vectors cross the wire as JSON-encoded arrays embedded in string
//! fields; decoding coerces them back through the table schema.

use std::sync::Arc;

use async_trait::async_trait;

use crate::core::error::{Error, Result};
use crate::core::types::{RecordBatch, TableData, Value};
use crate::index::{
    default_index_name, FtsIndexOptions, IndexInfo, IndexKind, IndexOptions, IndexRequest,
};
use crate::query::{Query, QueryExecutor, QueryRequest, DISTANCE_COLUMN};
use crate::remote::client::{DeleteRequest, RestClient, UpdateRequest};
use crate::schema::{DataType, Field, Schema};
use crate::table::{
    require_delete_filter, require_update_values, sanitize_vectors, AddMode, AddOptions, Table,
};

/// A table stored behind the cloud HTTP API.
#[derive(Clone)]
pub struct RemoteTable {
    inner: Arc<RemoteTableInner>,
}

struct RemoteTableInner {
    client: Arc<RestClient>,
    database: String,
    name: String,
    schema: Schema,
}

impl RemoteTable {
    pub(crate) fn new(
        client: Arc<RestClient>,
        database: &str,
        name: &str,
        schema: Schema,
    ) -> Self {
        Self {
            inner: Arc::new(RemoteTableInner {
                client,
                database: database.to_string(),
                name: name.to_string(),
                schema,
            }),
        }
    }
}

/// Encode one cell for the wire. Vectors become JSON array text inside a
/// string field; everything else is its plain JSON form.
fn wire_cell(value: &Value) -> serde_json::Value {
    match value {
        Value::Vector(v) => {
            let elems: Vec<String> = v.iter().map(|f| f.to_string()).collect();
            serde_json::Value::String(format!("[{}]", elems.join(",")))
        }
        other => other.to_json(),
    }
}

/// Decode response rows into a batch, coercing each cell through the table
/// schema where the column is known. The distance pseudo-column and other
/// unknown columns take their types from the data.
fn decode_response_rows(
    rows: &[serde_json::Map<String, serde_json::Value>],
    schema: &Schema,
) -> Result<RecordBatch> {
    let first = match rows.first() {
        Some(first) => first,
        None => return Ok(RecordBatch::empty(schema.clone())),
    };
    let names: Vec<String> = first.keys().cloned().collect();

    let mut columns: Vec<Vec<Value>> = names.iter().map(|_| Vec::new()).collect();
    for row in rows {
        for (i, name) in names.iter().enumerate() {
            let raw = row.get(name).cloned().unwrap_or(serde_json::Value::Null);
            let mut value = Value::from_json(raw);
            if let Some(field) = schema.field(name) {
                value = value.coerce(field.data_type());
            } else if name == DISTANCE_COLUMN {
                value = value.coerce(&DataType::Float64);
            }
            columns[i].push(value);
        }
    }

    let fields = names
        .iter()
        .enumerate()
        .map(|(i, name)| {
            let data_type = match schema.field(name) {
                Some(field) => field.data_type().clone(),
                None => columns[i]
                    .iter()
                    .find_map(DataType::of_value)
                    .unwrap_or(DataType::Utf8),
            };
            Field::new(name.clone(), data_type, true)
        })
        .collect();
    RecordBatch::try_new(Schema::try_new(fields)?, columns)
}

#[async_trait]
impl Table for RemoteTable {
    fn name(&self) -> &str {
        &self.inner.name
    }

    fn schema(&self) -> &Schema {
        &self.inner.schema
    }

    async fn count_rows(&self, filter: Option<&str>) -> Result<usize> {
        let request = QueryRequest {
            filter: filter.map(str::to_string),
            count: true,
            ..Default::default()
        };
        let response = self
            .inner
            .client
            .query(&self.inner.database, &self.inner.name, &request)
            .await?;
        response
            .count
            .map(|c| c as usize)
            .ok_or_else(|| Error::Backend("count missing from query response".to_string()))
    }

    async fn to_batch(&self) -> Result<RecordBatch> {
        let response = self
            .inner
            .client
            .query(
                &self.inner.database,
                &self.inner.name,
                &QueryRequest::default(),
            )
            .await?;
        decode_response_rows(&response.rows, &self.inner.schema)
    }

    async fn add(&self, data: TableData, options: AddOptions) -> Result<()> {
        let batch = data.into_batch(Some(&self.inner.schema))?;
        let batch = sanitize_vectors(batch, &self.inner.schema, &options)?;
        let mode = match options.mode {
            AddMode::Append => "append",
            AddMode::Overwrite => "overwrite",
        };
        let mut rows = Vec::with_capacity(batch.num_rows());
        for row in 0..batch.num_rows() {
            let mut record = serde_json::Map::new();
            for (column, field) in batch.schema().fields().iter().enumerate() {
                record.insert(
                    field.name().to_string(),
                    wire_cell(batch.value(column, row)),
                );
            }
            rows.push(record);
        }
        tracing::debug!(
            table = %self.inner.name,
            rows = rows.len(),
            mode,
            "inserting rows via cloud API"
        );
        self.inner
            .client
            .insert_rows(&self.inner.database, &self.inner.name, rows, mode)
            .await
    }

    fn query(&self) -> Query {
        Query::new(
            self.inner.clone(),
            &self.inner.name,
            self.inner.schema.clone(),
        )
    }

    async fn create_index(&self, column: &str, options: IndexOptions) -> Result<()> {
        let columns = vec![column.to_string()];
        let is_vector = self
            .inner
            .schema
            .field(column)
            .map(|f| f.data_type().is_vector())
            .unwrap_or(false);
        let kind = if is_vector {
            IndexKind::Vector
        } else {
            IndexKind::Btree
        };
        let name = options
            .name
            .clone()
            .unwrap_or_else(|| default_index_name(&self.inner.name, &columns, kind));
        let mut tuning = serde_json::Map::new();
        if let Some(metric) = options.metric {
            tuning.insert(
                "metric".to_string(),
                serde_json::Value::String(metric.to_string()),
            );
        }
        if let Some(partitions) = options.num_partitions {
            tuning.insert("num_partitions".to_string(), serde_json::Value::from(partitions));
        }
        let request = IndexRequest {
            name,
            columns,
            kind,
            replace: options.replace,
            options: tuning,
        };
        self.inner
            .client
            .create_index(&self.inner.database, &self.inner.name, &request)
            .await
    }

    async fn create_fts_index(
        &self,
        columns: &[String],
        options: FtsIndexOptions,
    ) -> Result<()> {
        if columns.is_empty() {
            return Err(Error::Config(
                "full-text index requires at least one column".to_string(),
            ));
        }
        let name = options
            .name
            .clone()
            .unwrap_or_else(|| default_index_name(&self.inner.name, columns, IndexKind::Fts));
        let replace = options.replace;
        let mut tuning = match serde_json::to_value(&options)? {
            serde_json::Value::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        tuning.remove("name");
        tuning.remove("replace");
        let request = IndexRequest {
            name,
            columns: columns.to_vec(),
            kind: IndexKind::Fts,
            replace,
            options: tuning,
        };
        self.inner
            .client
            .create_index(&self.inner.database, &self.inner.name, &request)
            .await
    }

    async fn list_indexes(&self) -> Result<Vec<IndexInfo>> {
        // Best-effort: endpoints without index introspection report none.
        match self
            .inner
            .client
            .list_indexes(&self.inner.database, &self.inner.name)
            .await
        {
            Ok(indexes) => Ok(indexes),
            Err(e) => {
                tracing::debug!(table = %self.inner.name, error = %e, "index listing unavailable");
                Ok(Vec::new())
            }
        }
    }

    async fn update(
        &self,
        filter: Option<&str>,
        values: Vec<(String, Value)>,
        values_sql: Vec<(String, String)>,
    ) -> Result<()> {
        require_update_values(&values, &values_sql)?;
        let mut rendered = serde_json::Map::new();
        for (column, value) in &values {
            rendered.insert(column.clone(), wire_cell(value));
        }
        let mut rendered_sql = serde_json::Map::new();
        for (column, expr) in &values_sql {
            rendered_sql.insert(column.clone(), serde_json::Value::String(expr.clone()));
        }
        let request = UpdateRequest {
            filter: filter.map(str::to_string),
            values: rendered,
            values_sql: rendered_sql,
        };
        self.inner
            .client
            .update(&self.inner.database, &self.inner.name, &request)
            .await
    }

    async fn delete(&self, filter: &str) -> Result<()> {
        require_delete_filter(filter)?;
        let request = DeleteRequest {
            filter: filter.to_string(),
        };
        self.inner
            .client
            .delete(&self.inner.database, &self.inner.name, &request)
            .await
    }
}

#[async_trait]
impl QueryExecutor for RemoteTableInner {
    async fn execute(&self, query: &Query) -> Result<RecordBatch> {
        let request = query.to_request()?;
        tracing::debug!(table = %self.name, "executing query via cloud API");
        let response = self.client.query(&self.database, &self.name, &request).await?;
        decode_response_rows(&response.rows, &self.schema)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vectors_cross_the_wire_as_json_text() {
        let cell = wire_cell(&Value::Vector(vec![1.0, 2.5]));
        assert_eq!(cell, serde_json::Value::String("[1,2.5]".to_string()));
        let cell = wire_cell(&Value::Int(3));
        assert_eq!(cell, serde_json::json!(3));
    }

    #[test]
    fn decode_coerces_vectors_and_distance() {
        let schema = Schema::try_new(vec![
            Field::new("id", DataType::Int64, false),
            Field::vector("embedding", 2),
        ])
        .unwrap();
        let rows = vec![serde_json::json!({
            "id": 1,
            "embedding": "[0.5,1.5]",
            "_distance": 0.25,
        })];
        let rows: Vec<serde_json::Map<String, serde_json::Value>> = rows
            .into_iter()
            .map(|v| v.as_object().unwrap().clone())
            .collect();
        let batch = decode_response_rows(&rows, &schema).unwrap();
        assert_eq!(
            batch.column("embedding").unwrap()[0],
            Value::Vector(vec![0.5, 1.5])
        );
        assert_eq!(batch.column("_distance").unwrap()[0], Value::Float(0.25));
    }

    #[test]
    fn decode_empty_uses_table_schema() {
        let schema = Schema::try_new(vec![Field::new("id", DataType::Int64, false)]).unwrap();
        let batch = decode_response_rows(&[], &schema).unwrap();
        assert_eq!(batch.num_rows(), 0);
        assert_eq!(batch.schema(), &schema);
    }
}
