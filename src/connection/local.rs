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

//! Wire-protocol connection backend.
//!
//! One connection owns one `PgPool`, shared by every table derived from it.
//! Schemas of opened tables are reconstructed from catalog metadata through
//! the fixed, lossy type map.

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row as SqlxRow;

use crate::connection::{Connection, CreateMode, CreateTableOptions};
use crate::core::error::{Error, Result};
use crate::core::types::TableData;
use crate::schema::{DataType, Field, Schema};
use crate::table::local::LocalTable;
use crate::table::{AddMode, AddOptions, Table};

/// A connection speaking the PostgreSQL wire protocol.
pub struct LocalConnection {
    pool: PgPool,
    uri: String,
}

impl LocalConnection {
    /// Open a pooled connection. `uri` is the caller-facing identifier;
    /// `connection_string` is the resolved endpoint.
    pub(crate) async fn connect(
        uri: String,
        connection_string: String,
        pool_size: u32,
    ) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(pool_size)
            .connect(&connection_string)
            .await?;
        tracing::info!(uri = %uri, pool_size, "connected to Hologres over the wire protocol");
        Ok(Self { pool, uri })
    }

    async fn fetch_schema(&self, name: &str) -> Result<Schema> {
        let sql = "SELECT column_name, data_type, is_nullable \
                   FROM information_schema.columns \
                   WHERE table_name = $1 AND table_schema = 'public' \
                   ORDER BY ordinal_position";
        let rows = sqlx::query(sql).bind(name).fetch_all(&self.pool).await?;
        let mut fields = Vec::with_capacity(rows.len());
        for row in rows {
            let column_name: String = row.try_get(0)?;
            let data_type: String = row.try_get(1)?;
            let is_nullable: String = row.try_get(2)?;
            fields.push(Field::new(
                column_name,
                DataType::from_catalog(&data_type),
                is_nullable.eq_ignore_ascii_case("yes"),
            ));
        }
        Schema::try_new(fields)
    }
}

#[async_trait]
impl Connection for LocalConnection {
    fn uri(&self) -> &str {
        &self.uri
    }

    async fn table_names(&self, limit: Option<usize>) -> Result<Vec<String>> {
        let mut sql = "SELECT table_name FROM information_schema.tables \
                       WHERE table_schema = 'public' AND table_type = 'BASE TABLE' \
                       ORDER BY table_name"
            .to_string();
        if let Some(limit) = limit {
            sql.push_str(&format!(" LIMIT {}", limit));
        }
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter()
            .map(|row| row.try_get::<String, _>(0).map_err(Error::from))
            .collect()
    }

    async fn create_table(
        &self,
        name: &str,
        data: Option<TableData>,
        options: CreateTableOptions,
    ) -> Result<Box<dyn Table>> {
        let exists = self.table_names(None).await?.contains(&name.to_string());
        if exists {
            match options.mode {
                CreateMode::Create => {
                    if !options.exist_ok {
                        return Err(Error::AlreadyExists(format!(
                            "table '{}' already exists",
                            name
                        )));
                    }
                    return self.open_table(name).await;
                }
                CreateMode::Overwrite => {
                    self.drop_table(name).await?;
                }
                CreateMode::Append => {
                    let table = self.open_table(name).await?;
                    if let Some(data) = data {
                        table
                            .add(
                                data,
                                AddOptions {
                                    mode: AddMode::Append,
                                    on_bad_vectors: options.on_bad_vectors,
                                    fill_value: options.fill_value,
                                },
                            )
                            .await?;
                    }
                    return Ok(table);
                }
            }
        }

        // Normalize once so schema inference and the initial insert share
        // the same batch.
        let batch = match data {
            Some(data) => Some(data.into_batch(options.schema.as_ref())?),
            None => None,
        };
        let schema = match (options.schema, &batch) {
            (Some(schema), _) => schema,
            (None, Some(batch)) => batch.schema().clone(),
            (None, None) => {
                return Err(Error::Config(
                    "either schema or data must be provided".to_string(),
                ))
            }
        };

        let table = LocalTable::new(self.pool.clone(), name, schema);
        table.create_physical().await?;
        if let Some(batch) = batch {
            table
                .add(
                    TableData::Batch(batch),
                    AddOptions {
                        mode: AddMode::Append,
                        on_bad_vectors: options.on_bad_vectors,
                        fill_value: options.fill_value,
                    },
                )
                .await?;
        }
        Ok(Box::new(table))
    }

    async fn open_table(&self, name: &str) -> Result<Box<dyn Table>> {
        if !self.table_names(None).await?.contains(&name.to_string()) {
            return Err(Error::NotFound(format!("table '{}' does not exist", name)));
        }
        let schema = self.fetch_schema(name).await?;
        Ok(Box::new(LocalTable::new(self.pool.clone(), name, schema)))
    }

    async fn drop_table(&self, name: &str) -> Result<()> {
        let sql = format!("DROP TABLE IF EXISTS {}", name);
        sqlx::query(&sql).execute(&self.pool).await?;
        Ok(())
    }

    async fn rename_table(&self, old_name: &str, new_name: &str) -> Result<()> {
        let sql = format!("ALTER TABLE {} RENAME TO {}", old_name, new_name);
        sqlx::query(&sql).execute(&self.pool).await?;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.pool.close().await;
        tracing::info!(uri = %self.uri, "closed wire-protocol connection");
        Ok(())
    }
}
