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

//! Query building and lowering.
//!
//! A [`Query`] is an immutable snapshot of search parameters bound to one
//! table. Every refinement returns a new value; the receiver is never
//! mutated, so two chains built from the same base cannot see each other's
//! refinements. Nothing executes until a materialization call, which lowers
//! the snapshot either to SQL text (wire-protocol backend) or to a
//! [`QueryRequest`] payload (cloud backend) and runs it through the table's
//! executor.

pub mod fts;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::error::{Error, Result};
use crate::core::types::{RecordBatch, Row, Value};
use crate::schema::{DataType, Schema};

pub use fts::{FullTextQuery, Occur};

/// Name of the projected distance pseudo-column on vector searches.
pub const DISTANCE_COLUMN: &str = "_distance";

/// Text-search configuration used when lowering full-text expressions.
pub const DEFAULT_FTS_LANGUAGE: &str = "english";

/// Distance function used to rank rows against a query vector. Results are
/// always ordered ascending by distance, so similarity metrics are negated
/// at lowering time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    L2,
    Cosine,
    Dot,
}

impl Default for Metric {
    fn default() -> Self {
        Metric::L2
    }
}

impl std::str::FromStr for Metric {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "l2" | "euclidean" => Ok(Metric::L2),
            "cosine" => Ok(Metric::Cosine),
            "dot" => Ok(Metric::Dot),
            other => Err(Error::Config(format!("unknown metric '{}'", other))),
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Metric::L2 => write!(f, "l2"),
            Metric::Cosine => write!(f, "cosine"),
            Metric::Dot => write!(f, "dot"),
        }
    }
}

/// Backend hook that runs a lowered query and returns tabular data.
#[async_trait]
pub trait QueryExecutor: Send + Sync {
    async fn execute(&self, query: &Query) -> Result<RecordBatch>;
}

/// Structured query payload for the cloud API.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub columns: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vector_column: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric: Option<Metric>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nprobes: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refine_factor: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub full_text: Option<FullTextQuery>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order_by: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub count: bool,
}

/// Immutable query snapshot bound to one table.
#[derive(Clone)]
pub struct Query {
    pub(crate) executor: Arc<dyn QueryExecutor>,
    pub(crate) table: String,
    pub(crate) schema: Schema,
    pub(crate) vector: Option<Vec<f32>>,
    pub(crate) vector_column: Option<String>,
    pub(crate) full_text: Option<FullTextQuery>,
    pub(crate) filters: Vec<String>,
    pub(crate) projection: Option<Vec<String>>,
    pub(crate) order: Option<String>,
    pub(crate) limit: Option<usize>,
    pub(crate) offset: Option<usize>,
    pub(crate) metric: Metric,
    pub(crate) nprobes: Option<usize>,
    pub(crate) refine_factor: Option<usize>,
}

impl fmt::Debug for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Query")
            .field("table", &self.table)
            .field("vector", &self.vector)
            .field("vector_column", &self.vector_column)
            .field("full_text", &self.full_text)
            .field("filters", &self.filters)
            .field("projection", &self.projection)
            .field("order", &self.order)
            .field("limit", &self.limit)
            .field("offset", &self.offset)
            .field("metric", &self.metric)
            .field("nprobes", &self.nprobes)
            .field("refine_factor", &self.refine_factor)
            .finish()
    }
}

impl Query {
    pub(crate) fn new(executor: Arc<dyn QueryExecutor>, table: &str, schema: Schema) -> Self {
        Self {
            executor,
            table: table.to_string(),
            schema,
            vector: None,
            vector_column: None,
            full_text: None,
            filters: Vec::new(),
            projection: None,
            order: None,
            limit: None,
            offset: None,
            metric: Metric::default(),
            nprobes: None,
            refine_factor: None,
        }
    }

    pub(crate) fn with_vector(mut self, vector: Vec<f32>) -> Self {
        self.vector = Some(vector);
        self
    }

    pub(crate) fn with_full_text(mut self, query: FullTextQuery) -> Self {
        self.full_text = Some(query);
        self
    }

    /// Cap the number of returned rows.
    pub fn limit(&self, limit: usize) -> Query {
        let mut next = self.clone();
        next.limit = Some(limit);
        next
    }

    /// Skip the first `offset` rows.
    pub fn offset(&self, offset: usize) -> Query {
        let mut next = self.clone();
        next.offset = Some(offset);
        next
    }

    /// Add a filter predicate. Repeated calls conjoin with AND in call
    /// order. The predicate text is trusted caller input and is inserted
    /// into the lowered request verbatim, with no escaping.
    pub fn filter(&self, predicate: impl Into<String>) -> Query {
        let mut next = self.clone();
        next.filters.push(predicate.into());
        next
    }

    /// Project a subset of columns. On a vector search the distance
    /// pseudo-column is still computed for ordering and dropped from the
    /// output when not listed here.
    pub fn select<I, S>(&self, columns: I) -> Query
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut next = self.clone();
        next.projection = Some(columns.into_iter().map(Into::into).collect());
        next
    }

    /// Explicit ordering expression. Overrides the default
    /// distance-ascending order of vector searches.
    pub fn order_by(&self, expr: impl Into<String>) -> Query {
        let mut next = self.clone();
        next.order = Some(expr.into());
        next
    }

    /// Target a specific vector column instead of the schema's single one.
    pub fn column(&self, name: impl Into<String>) -> Query {
        let mut next = self.clone();
        next.vector_column = Some(name.into());
        next
    }

    pub fn metric(&self, metric: Metric) -> Query {
        let mut next = self.clone();
        next.metric = metric;
        next
    }

    /// Probe count hint, honored by the cloud backend's index.
    pub fn nprobes(&self, nprobes: usize) -> Query {
        let mut next = self.clone();
        next.nprobes = Some(nprobes);
        next
    }

    /// Re-rank factor hint, honored by the cloud backend's index.
    pub fn refine_factor(&self, refine_factor: usize) -> Query {
        let mut next = self.clone();
        next.refine_factor = Some(refine_factor);
        next
    }

    /// Resolve and validate the vector search target, if any: the column
    /// must exist, be vector-typed with a statically known dimension, and
    /// match the query vector's length element-for-element of finite data.
    fn resolve_vector(&self) -> Result<Option<(String, usize)>> {
        let vector = match &self.vector {
            Some(v) => v,
            None => return Ok(None),
        };
        if vector.iter().any(|f| !f.is_finite()) {
            return Err(Error::Validation(
                "query vector contains non-finite values".to_string(),
            ));
        }
        let column = match &self.vector_column {
            Some(name) => name.clone(),
            None => self
                .schema
                .default_vector_field()
                .map(|f| f.name().to_string())
                .ok_or_else(|| {
                    Error::Config(format!(
                        "table '{}' has no unambiguous vector column; name one explicitly",
                        self.table
                    ))
                })?,
        };
        let field = self.schema.field(&column).ok_or_else(|| {
            Error::Config(format!(
                "vector column '{}' does not exist on table '{}'",
                column, self.table
            ))
        })?;
        let dim = match field.data_type() {
            DataType::Vector { dim: Some(d) } => *d,
            DataType::Vector { dim: None } => {
                return Err(Error::Validation(format!(
                    "vector column '{}' has no statically known dimension",
                    column
                )))
            }
            other => {
                return Err(Error::Config(format!(
                    "column '{}' is not a vector column (type {:?})",
                    column, other
                )))
            }
        };
        if vector.len() != dim {
            return Err(Error::Validation(format!(
                "query vector has {} dimensions, column '{}' expects {}",
                vector.len(),
                column,
                dim
            )));
        }
        Ok(Some((column, dim)))
    }

    fn distance_expr(&self, column: &str) -> String {
        let literal = Value::Vector(self.vector.clone().unwrap_or_default()).sql_literal();
        match self.metric {
            Metric::L2 => format!("array_distance({}, {})", column, literal),
            Metric::Cosine => format!("cosine_distance({}, {})", column, literal),
            // Higher dot product means closer; negate to keep ascending order.
            Metric::Dot => format!("-dot_product({}, {})", column, literal),
        }
    }

    fn combined_filter(&self) -> Option<String> {
        let mut predicates: Vec<String> =
            self.filters.iter().map(|f| format!("({})", f)).collect();
        if let Some(fts) = &self.full_text {
            predicates.push(fts.to_sql(DEFAULT_FTS_LANGUAGE));
        }
        if predicates.is_empty() {
            None
        } else {
            Some(predicates.join(" AND "))
        }
    }

    /// Lower to a textual SQL query, clauses assembled in the fixed order
    /// SELECT, FROM, WHERE, ORDER BY, LIMIT, OFFSET.
    pub fn to_sql(&self) -> Result<String> {
        let vector_target = self.resolve_vector()?;

        let mut select = match &self.projection {
            Some(columns) => columns.join(", "),
            None => "*".to_string(),
        };
        if let Some((column, _)) = &vector_target {
            select = format!(
                "{}, {} AS {}",
                select,
                self.distance_expr(column),
                DISTANCE_COLUMN
            );
        }

        let mut sql = format!("SELECT {} FROM {}", select, self.table);
        if let Some(filter) = self.combined_filter() {
            sql.push_str(" WHERE ");
            sql.push_str(&filter);
        }
        match (&self.order, &vector_target) {
            (Some(order), _) => {
                sql.push_str(" ORDER BY ");
                sql.push_str(order);
            }
            (None, Some(_)) => {
                sql.push_str(" ORDER BY ");
                sql.push_str(DISTANCE_COLUMN);
                sql.push_str(" ASC");
            }
            (None, None) => {}
        }
        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }
        if let Some(offset) = self.offset {
            sql.push_str(&format!(" OFFSET {}", offset));
        }
        Ok(sql)
    }

    /// Lower to the structured payload the cloud API consumes. The same
    /// validation as the SQL path applies.
    pub fn to_request(&self) -> Result<QueryRequest> {
        let vector_target = self.resolve_vector()?;
        Ok(QueryRequest {
            filter: self.combined_filter(),
            columns: self.projection.clone(),
            limit: self.limit,
            offset: self.offset,
            vector: self.vector.clone(),
            vector_column: vector_target.map(|(column, _)| column),
            metric: self.vector.as_ref().map(|_| self.metric),
            nprobes: self.nprobes,
            refine_factor: self.refine_factor,
            full_text: self.full_text.clone(),
            order_by: self.order.clone(),
            count: false,
        })
    }

    /// Execute and return columnar data. Pure with respect to this value;
    /// two calls may observe different database states.
    pub async fn to_batch(&self) -> Result<RecordBatch> {
        let batch = self.executor.execute(self).await?;
        if let Some(projection) = &self.projection {
            let wants_distance = projection.iter().any(|c| c == DISTANCE_COLUMN);
            if !wants_distance && batch.column(DISTANCE_COLUMN).is_some() {
                return Ok(batch.drop_column(DISTANCE_COLUMN));
            }
        }
        Ok(batch)
    }

    /// Execute and return row records.
    pub async fn to_rows(&self) -> Result<Vec<Row>> {
        Ok(self.to_batch().await?.to_rows())
    }
}
