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

//! Blocking facade over the async API.
//!
//! Every operation submits the corresponding async core operation to one
//! shared dedicated runtime and blocks on the handle; no business logic is
//! duplicated here. Independent calls run concurrently on the runtime's
//! worker pool, including calls against the same table.
//!
//! Must not be used from inside an async context; block-on-runtime panics
//! there by design of the underlying runtime.

use once_cell::sync::Lazy;
use tokio::runtime::Runtime;

use crate::core::config::ClientConfig;
use crate::core::error::Result;
use crate::core::types::{RecordBatch, Row, TableData, Value};
use crate::index::{FtsIndexOptions, IndexInfo, IndexOptions};
use crate::query::{FullTextQuery, Metric};
use crate::schema::Schema;
use crate::table::AddOptions;

static RUNTIME: Lazy<Runtime> = Lazy::new(|| {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("hologres-blocking")
        .build()
        .expect("failed to start the blocking runtime")
});

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    RUNTIME.block_on(future)
}

/// Blocking counterpart of [`crate::connect`].
pub fn connect(uri: impl Into<String>) -> ConnectBuilder {
    ConnectBuilder {
        inner: crate::connection::connect(uri),
    }
}

/// Blocking counterpart of [`crate::ConnectBuilder`].
pub struct ConnectBuilder {
    inner: crate::connection::ConnectBuilder,
}

impl ConnectBuilder {
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.inner = self.inner.username(username);
        self
    }

    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.inner = self.inner.password(password);
        self
    }

    pub fn database(mut self, database: impl Into<String>) -> Self {
        self.inner = self.inner.database(database);
        self
    }

    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.inner = self.inner.host(host);
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.inner = self.inner.port(port);
        self
    }

    pub fn api_key(mut self, api_key: impl Into<String>) -> Self {
        self.inner = self.inner.api_key(api_key);
        self
    }

    pub fn region(mut self, region: impl Into<String>) -> Self {
        self.inner = self.inner.region(region);
        self
    }

    pub fn host_override(mut self, host_override: impl Into<String>) -> Self {
        self.inner = self.inner.host_override(host_override);
        self
    }

    pub fn client_config(mut self, config: ClientConfig) -> Self {
        self.inner = self.inner.client_config(config);
        self
    }

    pub fn pool_size(mut self, pool_size: u32) -> Self {
        self.inner = self.inner.pool_size(pool_size);
        self
    }

    pub fn execute(self) -> Result<Connection> {
        let inner = block_on(self.inner.execute())?;
        Ok(Connection { inner })
    }
}

/// Blocking counterpart of [`crate::Connection`].
pub struct Connection {
    inner: Box<dyn crate::connection::Connection>,
}

impl Connection {
    pub fn uri(&self) -> &str {
        self.inner.uri()
    }

    pub fn table_names(&self, limit: Option<usize>) -> Result<Vec<String>> {
        block_on(self.inner.table_names(limit))
    }

    pub fn create_table(
        &self,
        name: &str,
        data: Option<TableData>,
        options: crate::connection::CreateTableOptions,
    ) -> Result<Table> {
        let inner = block_on(self.inner.create_table(name, data, options))?;
        Ok(Table { inner })
    }

    pub fn open_table(&self, name: &str) -> Result<Table> {
        let inner = block_on(self.inner.open_table(name))?;
        Ok(Table { inner })
    }

    pub fn drop_table(&self, name: &str) -> Result<()> {
        block_on(self.inner.drop_table(name))
    }

    pub fn rename_table(&self, old_name: &str, new_name: &str) -> Result<()> {
        block_on(self.inner.rename_table(old_name, new_name))
    }

    pub fn close(&self) -> Result<()> {
        block_on(self.inner.close())
    }
}

/// Blocking counterpart of [`crate::Table`].
pub struct Table {
    inner: Box<dyn crate::table::Table>,
}

impl Table {
    pub fn name(&self) -> &str {
        self.inner.name()
    }

    pub fn schema(&self) -> &Schema {
        self.inner.schema()
    }

    pub fn count_rows(&self, filter: Option<&str>) -> Result<usize> {
        block_on(self.inner.count_rows(filter))
    }

    pub fn to_batch(&self) -> Result<RecordBatch> {
        block_on(self.inner.to_batch())
    }

    pub fn to_rows(&self) -> Result<Vec<Row>> {
        block_on(self.inner.to_rows())
    }

    pub fn add(&self, data: TableData, options: AddOptions) -> Result<()> {
        block_on(self.inner.add(data, options))
    }

    pub fn query(&self) -> Query {
        Query {
            inner: self.inner.query(),
        }
    }

    pub fn search(&self, vector: Vec<f32>) -> Query {
        Query {
            inner: self.inner.search(vector),
        }
    }

    pub fn full_text_search(&self, query: FullTextQuery) -> Query {
        Query {
            inner: self.inner.full_text_search(query),
        }
    }

    pub fn create_index(&self, column: &str, options: IndexOptions) -> Result<()> {
        block_on(self.inner.create_index(column, options))
    }

    pub fn create_fts_index(&self, columns: &[String], options: FtsIndexOptions) -> Result<()> {
        block_on(self.inner.create_fts_index(columns, options))
    }

    pub fn list_indexes(&self) -> Result<Vec<IndexInfo>> {
        block_on(self.inner.list_indexes())
    }

    pub fn update(
        &self,
        filter: Option<&str>,
        values: Vec<(String, Value)>,
        values_sql: Vec<(String, String)>,
    ) -> Result<()> {
        block_on(self.inner.update(filter, values, values_sql))
    }

    pub fn delete(&self, filter: &str) -> Result<()> {
        block_on(self.inner.delete(filter))
    }
}

/// Blocking counterpart of [`crate::Query`]. Chain methods are pure and
/// never touch the runtime; only materialization blocks.
#[derive(Clone)]
pub struct Query {
    inner: crate::query::Query,
}

impl Query {
    pub fn limit(&self, limit: usize) -> Query {
        Query {
            inner: self.inner.limit(limit),
        }
    }

    pub fn offset(&self, offset: usize) -> Query {
        Query {
            inner: self.inner.offset(offset),
        }
    }

    pub fn filter(&self, predicate: impl Into<String>) -> Query {
        Query {
            inner: self.inner.filter(predicate),
        }
    }

    pub fn select<I, S>(&self, columns: I) -> Query
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Query {
            inner: self.inner.select(columns),
        }
    }

    pub fn order_by(&self, expr: impl Into<String>) -> Query {
        Query {
            inner: self.inner.order_by(expr),
        }
    }

    pub fn column(&self, name: impl Into<String>) -> Query {
        Query {
            inner: self.inner.column(name),
        }
    }

    pub fn metric(&self, metric: Metric) -> Query {
        Query {
            inner: self.inner.metric(metric),
        }
    }

    pub fn nprobes(&self, nprobes: usize) -> Query {
        Query {
            inner: self.inner.nprobes(nprobes),
        }
    }

    pub fn refine_factor(&self, refine_factor: usize) -> Query {
        Query {
            inner: self.inner.refine_factor(refine_factor),
        }
    }

    pub fn to_batch(&self) -> Result<RecordBatch> {
        block_on(self.inner.to_batch())
    }

    pub fn to_rows(&self) -> Result<Vec<Row>> {
        block_on(self.inner.to_rows())
    }
}
