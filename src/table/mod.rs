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

//! The table capability set, implemented once per backend.
//!
//! Both the wire-protocol and the cloud backend expose the same operations
//! behind the [`Table`] trait. Vector cells in incoming data are validated
//! here, before anything is sent over the wire, under the policy the caller
//! picks in [`AddOptions`].

pub mod local;

use async_trait::async_trait;

use crate::core::error::{Error, Result};
use crate::core::types::{RecordBatch, Row, TableData, Value};
use crate::index::{FtsIndexOptions, IndexInfo, IndexOptions};
use crate::query::{FullTextQuery, Query};
use crate::schema::Schema;

/// Whether `add` keeps or replaces existing rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AddMode {
    #[default]
    Append,
    Overwrite,
}

/// Policy for rows whose vector cells fail validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OnBadVectors {
    /// Reject the whole batch before any row is inserted.
    #[default]
    Error,
    /// Remove only the offending rows.
    Drop,
    /// Replace the offending vector with the fill value repeated to the
    /// expected dimension. The dimension must be pinned by the schema or
    /// observable from a valid vector in the same column; otherwise the
    /// call fails with a configuration error.
    Fill,
}

/// Options for `add` and the data path of `create_table`.
#[derive(Debug, Clone, Copy)]
pub struct AddOptions {
    pub mode: AddMode,
    pub on_bad_vectors: OnBadVectors,
    pub fill_value: f32,
}

impl Default for AddOptions {
    fn default() -> Self {
        Self {
            mode: AddMode::Append,
            on_bad_vectors: OnBadVectors::Error,
            fill_value: 0.0,
        }
    }
}

/// One table in a Hologres database.
#[async_trait]
pub trait Table: Send + Sync {
    fn name(&self) -> &str;

    fn schema(&self) -> &Schema;

    /// Number of rows, optionally restricted by a filter predicate
    /// (trusted caller input, inserted verbatim).
    async fn count_rows(&self, filter: Option<&str>) -> Result<usize>;

    /// Fetch the whole table as a columnar batch.
    async fn to_batch(&self) -> Result<RecordBatch>;

    /// Fetch the whole table as row records.
    async fn to_rows(&self) -> Result<Vec<Row>> {
        Ok(self.to_batch().await?.to_rows())
    }

    /// Insert data after normalizing it to a columnar batch and applying
    /// the bad-vector policy.
    async fn add(&self, data: TableData, options: AddOptions) -> Result<()>;

    /// Start a query over this table with no search configured.
    fn query(&self) -> Query;

    /// Start a vector similarity search.
    fn search(&self, vector: Vec<f32>) -> Query {
        self.query().with_vector(vector)
    }

    /// Start a full-text search. Requires a full-text index to exist; a
    /// missing index surfaces lazily as a backend error at execution.
    fn full_text_search(&self, query: FullTextQuery) -> Query {
        self.query().with_full_text(query)
    }

    /// Request an index on one column. Fire-and-forget: the backend
    /// accepting the request does not mean the index finished building.
    async fn create_index(&self, column: &str, options: IndexOptions) -> Result<()>;

    /// Request a full-text index over one or more text columns.
    async fn create_fts_index(&self, columns: &[String], options: FtsIndexOptions) -> Result<()>;

    /// Best-effort index listing; backends without introspection support
    /// report an empty list instead of failing.
    async fn list_indexes(&self) -> Result<Vec<IndexInfo>>;

    /// Update rows matching `filter`. `values` are rendered as literals;
    /// `values_sql` expressions are trusted caller input inserted verbatim.
    /// At least one of the two must be non-empty.
    async fn update(
        &self,
        filter: Option<&str>,
        values: Vec<(String, Value)>,
        values_sql: Vec<(String, String)>,
    ) -> Result<()>;

    /// Delete rows matching the non-empty filter predicate.
    async fn delete(&self, filter: &str) -> Result<()>;
}

pub(crate) fn require_update_values(
    values: &[(String, Value)],
    values_sql: &[(String, String)],
) -> Result<()> {
    if values.is_empty() && values_sql.is_empty() {
        return Err(Error::Config(
            "update requires values or values_sql".to_string(),
        ));
    }
    Ok(())
}

pub(crate) fn require_delete_filter(filter: &str) -> Result<()> {
    if filter.trim().is_empty() {
        return Err(Error::Config(
            "delete requires a non-empty filter predicate".to_string(),
        ));
    }
    Ok(())
}

/// Validate every vector cell of `batch` against the table schema and
/// apply the bad-vector policy. Runs entirely client-side, before any
/// network round trip.
pub(crate) fn sanitize_vectors(
    batch: RecordBatch,
    table_schema: &Schema,
    options: &AddOptions,
) -> Result<RecordBatch> {
    let mut batch = batch;
    let mut dropped: Vec<usize> = Vec::new();

    let vector_columns: Vec<(usize, String, Option<usize>, bool)> = table_schema
        .vector_fields()
        .iter()
        .filter_map(|field| {
            batch.column_index(field.name()).map(|idx| {
                let dim = match field.data_type() {
                    crate::schema::DataType::Vector { dim } => *dim,
                    _ => None,
                };
                (idx, field.name().to_string(), dim, field.nullable())
            })
        })
        .collect();

    for (col_idx, col_name, schema_dim, nullable) in vector_columns {
        // The expected dimension comes from the schema when pinned, else
        // from the first valid vector observed in this column.
        let mut expected = schema_dim;
        let mut bad_rows: Vec<usize> = Vec::new();

        for row in 0..batch.num_rows() {
            match batch.value(col_idx, row) {
                Value::Null if nullable => {}
                Value::Vector(v) if v.iter().all(|f| f.is_finite()) => match expected {
                    None => expected = Some(v.len()),
                    Some(dim) if v.len() == dim => {}
                    Some(_) => bad_rows.push(row),
                },
                _ => bad_rows.push(row),
            }
        }

        if bad_rows.is_empty() {
            continue;
        }
        match options.on_bad_vectors {
            OnBadVectors::Error => {
                return Err(Error::Validation(format!(
                    "row {} of column '{}' holds a malformed vector",
                    bad_rows[0], col_name
                )));
            }
            OnBadVectors::Drop => {
                dropped.extend(bad_rows);
            }
            OnBadVectors::Fill => {
                let dim = expected.ok_or_else(|| {
                    Error::Config(format!(
                        "cannot fill bad vectors in column '{}': no fixed dimension \
                         is pinned by the schema or observable from valid data",
                        col_name
                    ))
                })?;
                for row in bad_rows {
                    batch.set_value(col_idx, row, Value::Vector(vec![options.fill_value; dim]));
                }
            }
        }
    }

    if dropped.is_empty() {
        return Ok(batch);
    }
    dropped.sort_unstable();
    dropped.dedup();
    let keep: Vec<usize> = (0..batch.num_rows())
        .filter(|row| dropped.binary_search(row).is_err())
        .collect();
    Ok(batch.take_rows(&keep))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Row;
    use crate::schema::{DataType, Field, Schema};

    fn vector_schema(dim: Option<usize>) -> Schema {
        Schema::try_new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("embedding", DataType::Vector { dim }, true),
        ])
        .unwrap()
    }

    /// Five rows; row index 2 has a vector of the wrong dimension.
    fn batch_with_bad_row() -> RecordBatch {
        let rows: Vec<Row> = (0..5)
            .map(|i| {
                let vector = if i == 2 {
                    Value::Vector(vec![9.0; 2])
                } else {
                    Value::Vector(vec![i as f32; 4])
                };
                Row::from([
                    ("id".to_string(), Value::Int(i)),
                    ("embedding".to_string(), vector),
                ])
            })
            .collect();
        RecordBatch::from_rows(&rows, Some(&vector_schema(Some(4)))).unwrap()
    }

    #[test]
    fn error_policy_rejects_whole_batch() {
        let options = AddOptions::default();
        let result = sanitize_vectors(batch_with_bad_row(), &vector_schema(Some(4)), &options);
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[test]
    fn drop_policy_removes_only_offending_row() {
        let options = AddOptions {
            on_bad_vectors: OnBadVectors::Drop,
            ..Default::default()
        };
        let batch =
            sanitize_vectors(batch_with_bad_row(), &vector_schema(Some(4)), &options).unwrap();
        assert_eq!(batch.num_rows(), 4);
        let ids: Vec<&Value> = batch.column("id").unwrap().iter().collect();
        assert!(!ids.contains(&&Value::Int(2)));
    }

    #[test]
    fn fill_policy_replaces_with_constant_vector() {
        let options = AddOptions {
            on_bad_vectors: OnBadVectors::Fill,
            fill_value: 7.5,
            ..Default::default()
        };
        let batch =
            sanitize_vectors(batch_with_bad_row(), &vector_schema(Some(4)), &options).unwrap();
        assert_eq!(batch.num_rows(), 5);
        assert_eq!(
            batch.column("embedding").unwrap()[2],
            Value::Vector(vec![7.5; 4])
        );
    }

    #[test]
    fn fill_infers_dimension_from_first_valid_vector() {
        let options = AddOptions {
            on_bad_vectors: OnBadVectors::Fill,
            fill_value: 0.0,
            ..Default::default()
        };
        // Schema leaves the dimension open; the first valid vector pins it.
        let batch =
            sanitize_vectors(batch_with_bad_row(), &vector_schema(None), &options).unwrap();
        assert_eq!(
            batch.column("embedding").unwrap()[2],
            Value::Vector(vec![0.0; 4])
        );
    }

    #[test]
    fn fill_without_any_dimension_is_config_error() {
        let rows = vec![Row::from([
            ("id".to_string(), Value::Int(0)),
            ("embedding".to_string(), Value::Vector(vec![f32::NAN; 3])),
        ])];
        let schema = vector_schema(None);
        let batch = RecordBatch::from_rows(&rows, Some(&schema)).unwrap();
        let options = AddOptions {
            on_bad_vectors: OnBadVectors::Fill,
            ..Default::default()
        };
        let result = sanitize_vectors(batch, &schema, &options);
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[test]
    fn non_finite_vectors_are_bad() {
        let rows = vec![
            Row::from([
                ("id".to_string(), Value::Int(0)),
                ("embedding".to_string(), Value::Vector(vec![1.0, 2.0])),
            ]),
            Row::from([
                ("id".to_string(), Value::Int(1)),
                (
                    "embedding".to_string(),
                    Value::Vector(vec![f32::INFINITY, 0.0]),
                ),
            ]),
        ];
        let schema = vector_schema(Some(2));
        let batch = RecordBatch::from_rows(&rows, Some(&schema)).unwrap();
        let options = AddOptions {
            on_bad_vectors: OnBadVectors::Drop,
            ..Default::default()
        };
        let sanitized = sanitize_vectors(batch, &schema, &options).unwrap();
        assert_eq!(sanitized.num_rows(), 1);
    }

    #[test]
    fn nulls_pass_through_nullable_vector_columns() {
        let rows = vec![Row::from([
            ("id".to_string(), Value::Int(0)),
            ("embedding".to_string(), Value::Null),
        ])];
        let schema = vector_schema(Some(2));
        let batch = RecordBatch::from_rows(&rows, Some(&schema)).unwrap();
        let sanitized = sanitize_vectors(batch, &schema, &AddOptions::default()).unwrap();
        assert_eq!(sanitized.num_rows(), 1);
    }

    #[test]
    fn update_requires_values() {
        assert!(require_update_values(&[], &[]).is_err());
        assert!(require_update_values(&[("a".to_string(), Value::Int(1))], &[]).is_ok());
        assert!(
            require_update_values(&[], &[("a".to_string(), "a + 1".to_string())]).is_ok()
        );
    }

    #[test]
    fn delete_requires_predicate() {
        assert!(require_delete_filter("").is_err());
        assert!(require_delete_filter("   ").is_err());
        assert!(require_delete_filter("id = 1").is_ok());
    }
}
