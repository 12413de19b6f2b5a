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

//! Wire-protocol table backend.
//!
//! Operations lower to SQL text executed on the connection's shared pool.
//! Vectors live in native `real[]` columns; the distance functions run
//! inside the database engine.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::{Column, Row as SqlxRow, TypeInfo};

use crate::core::error::{Error, Result};
use crate::core::types::{RecordBatch, TableData, Value};
use crate::index::{
    default_index_name, FtsIndexOptions, IndexInfo, IndexKind, IndexOptions,
};
use crate::query::{Query, QueryExecutor};
use crate::schema::{DataType, Field, Schema};
use crate::table::{
    require_delete_filter, require_update_values, sanitize_vectors, AddMode, AddOptions, Table,
};

/// Rows per INSERT statement when adding data.
const INSERT_CHUNK_ROWS: usize = 500;

/// A table reached over the PostgreSQL wire protocol.
#[derive(Clone)]
pub struct LocalTable {
    inner: Arc<LocalTableInner>,
}

struct LocalTableInner {
    pool: PgPool,
    name: String,
    schema: Schema,
}

impl LocalTable {
    pub(crate) fn new(pool: PgPool, name: impl Into<String>, schema: Schema) -> Self {
        Self {
            inner: Arc::new(LocalTableInner {
                pool,
                name: name.into(),
                schema,
            }),
        }
    }

    /// Issue the CREATE TABLE DDL for this table's schema.
    pub(crate) async fn create_physical(&self) -> Result<()> {
        let columns: Vec<String> = self
            .inner
            .schema
            .fields()
            .iter()
            .map(|field| {
                let mut column = format!("{} {}", field.name(), field.data_type().sql_type());
                if !field.nullable() {
                    column.push_str(" NOT NULL");
                }
                column
            })
            .collect();
        let ddl = format!("CREATE TABLE {} ({})", self.inner.name, columns.join(", "));
        tracing::debug!(table = %self.inner.name, %ddl, "creating table");
        sqlx::query(&ddl).execute(&self.inner.pool).await?;
        Ok(())
    }

    async fn insert_batch(&self, batch: &RecordBatch) -> Result<()> {
        if batch.num_rows() == 0 {
            return Ok(());
        }
        let column_names: Vec<&str> = batch
            .schema()
            .fields()
            .iter()
            .map(|f| f.name())
            .collect();
        let mut row = 0;
        while row < batch.num_rows() {
            let end = (row + INSERT_CHUNK_ROWS).min(batch.num_rows());
            let mut tuples = Vec::with_capacity(end - row);
            for r in row..end {
                let cells: Vec<String> = (0..batch.num_columns())
                    .map(|c| batch.value(c, r).sql_literal())
                    .collect();
                tuples.push(format!("({})", cells.join(", ")));
            }
            let sql = format!(
                "INSERT INTO {} ({}) VALUES {}",
                self.inner.name,
                column_names.join(", "),
                tuples.join(", ")
            );
            sqlx::query(&sql).execute(&self.inner.pool).await?;
            row = end;
        }
        Ok(())
    }
}

#[async_trait]
impl Table for LocalTable {
    fn name(&self) -> &str {
        &self.inner.name
    }

    fn schema(&self) -> &Schema {
        &self.inner.schema
    }

    async fn count_rows(&self, filter: Option<&str>) -> Result<usize> {
        let mut sql = format!("SELECT COUNT(*) FROM {}", self.inner.name);
        if let Some(filter) = filter {
            sql.push_str(" WHERE ");
            sql.push_str(filter);
        }
        let row = sqlx::query(&sql).fetch_one(&self.inner.pool).await?;
        let count: i64 = row.try_get(0)?;
        Ok(count as usize)
    }

    async fn to_batch(&self) -> Result<RecordBatch> {
        let sql = format!("SELECT * FROM {}", self.inner.name);
        let rows = sqlx::query(&sql).fetch_all(&self.inner.pool).await?;
        decode_rows(&rows, &self.inner.schema)
    }

    async fn add(&self, data: TableData, options: AddOptions) -> Result<()> {
        let batch = data.into_batch(Some(&self.inner.schema))?;
        let batch = sanitize_vectors(batch, &self.inner.schema, &options)?;
        if options.mode == AddMode::Overwrite {
            let sql = format!("DELETE FROM {}", self.inner.name);
            sqlx::query(&sql).execute(&self.inner.pool).await?;
        }
        tracing::debug!(
            table = %self.inner.name,
            rows = batch.num_rows(),
            "inserting batch"
        );
        self.insert_batch(&batch).await
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
            .unwrap_or_else(|| default_index_name(&self.inner.name, &columns, kind));
        if options.replace {
            let drop = format!("DROP INDEX IF EXISTS {}", name);
            sqlx::query(&drop).execute(&self.inner.pool).await?;
        }
        // Array columns get a GIN index; everything else a plain B-tree.
        let ddl = if is_vector {
            format!(
                "CREATE INDEX {} ON {} USING GIN ({})",
                name, self.inner.name, column
            )
        } else {
            format!("CREATE INDEX {} ON {} ({})", name, self.inner.name, column)
        };
        tracing::debug!(index = %name, %ddl, "creating index");
        sqlx::query(&ddl).execute(&self.inner.pool).await?;
        Ok(())
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
        if options.replace {
            let drop = format!("DROP INDEX IF EXISTS {}", name);
            sqlx::query(&drop).execute(&self.inner.pool).await?;
        }
        let expr = columns
            .iter()
            .map(|c| format!("COALESCE({}, '')", c))
            .collect::<Vec<_>>()
            .join(" || ' ' || ");
        let ddl = format!(
            "CREATE INDEX {} ON {} USING GIN (to_tsvector('{}', {}))",
            name, self.inner.name, options.language, expr
        );
        tracing::debug!(index = %name, %ddl, "creating full-text index");
        sqlx::query(&ddl).execute(&self.inner.pool).await?;
        Ok(())
    }

    async fn list_indexes(&self) -> Result<Vec<IndexInfo>> {
        let sql = "SELECT indexname, indexdef FROM pg_indexes WHERE tablename = $1";
        let rows = sqlx::query(sql)
            .bind(&self.inner.name)
            .fetch_all(&self.inner.pool)
            .await?;
        let mut indexes = Vec::with_capacity(rows.len());
        for row in rows {
            let name: String = row.try_get(0)?;
            let definition: String = row.try_get(1)?;
            let mut details = std::collections::HashMap::new();
            details.insert(
                "definition".to_string(),
                serde_json::Value::String(definition),
            );
            indexes.push(IndexInfo { name, details });
        }
        Ok(indexes)
    }

    async fn update(
        &self,
        filter: Option<&str>,
        values: Vec<(String, Value)>,
        values_sql: Vec<(String, String)>,
    ) -> Result<()> {
        require_update_values(&values, &values_sql)?;
        let mut assignments: Vec<String> = values
            .iter()
            .map(|(column, value)| format!("{} = {}", column, value.sql_literal()))
            .collect();
        assignments.extend(
            values_sql
                .iter()
                .map(|(column, expr)| format!("{} = {}", column, expr)),
        );
        let mut sql = format!(
            "UPDATE {} SET {}",
            self.inner.name,
            assignments.join(", ")
        );
        if let Some(filter) = filter {
            sql.push_str(" WHERE ");
            sql.push_str(filter);
        }
        tracing::debug!(table = %self.inner.name, %sql, "updating rows");
        sqlx::query(&sql).execute(&self.inner.pool).await?;
        Ok(())
    }

    async fn delete(&self, filter: &str) -> Result<()> {
        require_delete_filter(filter)?;
        let sql = format!("DELETE FROM {} WHERE {}", self.inner.name, filter);
        tracing::debug!(table = %self.inner.name, %sql, "deleting rows");
        sqlx::query(&sql).execute(&self.inner.pool).await?;
        Ok(())
    }
}

#[async_trait]
impl QueryExecutor for LocalTableInner {
    async fn execute(&self, query: &Query) -> Result<RecordBatch> {
        let sql = query.to_sql()?;
        tracing::debug!(table = %self.name, %sql, "executing query");
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        decode_rows(&rows, &self.schema)
    }
}

/// Decode driver rows into a batch. The result schema is reconstructed
/// from the result set's own columns through the fixed type map, so
/// projections and the distance pseudo-column come out typed; an empty
/// result falls back to the table schema.
fn decode_rows(rows: &[PgRow], fallback: &Schema) -> Result<RecordBatch> {
    let first = match rows.first() {
        Some(first) => first,
        None => return Ok(RecordBatch::empty(fallback.clone())),
    };

    let mut fields = Vec::with_capacity(first.columns().len());
    for column in first.columns() {
        let type_name = column.type_info().name().to_string();
        fields.push((column.name().to_string(), type_name));
    }

    let schema = Schema::try_new(
        fields
            .iter()
            .map(|(name, type_name)| {
                Field::new(name.clone(), wire_type_to_data_type(type_name), true)
            })
            .collect(),
    )?;

    let mut columns: Vec<Vec<Value>> = fields.iter().map(|_| Vec::new()).collect();
    for row in rows {
        for (i, (_, type_name)) in fields.iter().enumerate() {
            columns[i].push(decode_cell(row, i, type_name)?);
        }
    }
    RecordBatch::try_new(schema, columns)
}

fn wire_type_to_data_type(type_name: &str) -> DataType {
    match type_name {
        "BOOL" => DataType::Boolean,
        "INT2" | "INT4" | "INT8" => DataType::Int64,
        "FLOAT4" | "FLOAT8" => DataType::Float64,
        "TIMESTAMP" | "TIMESTAMPTZ" => DataType::Timestamp,
        "FLOAT4[]" | "REAL[]" => DataType::Vector { dim: None },
        _ => DataType::Utf8,
    }
}

fn decode_cell(row: &PgRow, index: usize, type_name: &str) -> Result<Value> {
    let value = match type_name {
        "BOOL" => row.try_get::<Option<bool>, _>(index)?.map(Value::Bool),
        "INT2" => row
            .try_get::<Option<i16>, _>(index)?
            .map(|v| Value::Int(v as i64)),
        "INT4" => row
            .try_get::<Option<i32>, _>(index)?
            .map(|v| Value::Int(v as i64)),
        "INT8" => row.try_get::<Option<i64>, _>(index)?.map(Value::Int),
        "FLOAT4" => row
            .try_get::<Option<f32>, _>(index)?
            .map(|v| Value::Float(v as f64)),
        "FLOAT8" => row.try_get::<Option<f64>, _>(index)?.map(Value::Float),
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => {
            row.try_get::<Option<String>, _>(index)?.map(Value::Text)
        }
        "TIMESTAMPTZ" => row
            .try_get::<Option<DateTime<Utc>>, _>(index)?
            .map(Value::Timestamp),
        "TIMESTAMP" => row
            .try_get::<Option<chrono::NaiveDateTime>, _>(index)?
            .map(|naive| Value::Timestamp(DateTime::from_naive_utc_and_offset(naive, Utc))),
        "FLOAT4[]" | "REAL[]" => row
            .try_get::<Option<Vec<f32>>, _>(index)?
            .map(Value::Vector),
        other => {
            tracing::debug!(column_type = %other, "unmapped result type decoded as null");
            None
        }
    };
    Ok(value.unwrap_or(Value::Null))
}
