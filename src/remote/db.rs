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

//! Cloud connection backend.

use std::sync::Arc;

use async_trait::async_trait;

use crate::connection::{Connection, CreateMode, CreateTableOptions};
use crate::core::config::ClientConfig;
use crate::core::error::{Error, Result};
use crate::core::types::TableData;
use crate::remote::client::RestClient;
use crate::remote::table::RemoteTable;
use crate::schema::{Schema, WireSchema};
use crate::table::{AddMode, AddOptions, Table};

/// A connection to one database behind the cloud HTTP API.
pub struct RemoteConnection {
    client: Arc<RestClient>,
    database: String,
    uri: String,
}

impl RemoteConnection {
    pub(crate) fn new(
        uri: String,
        database: String,
        api_key: String,
        region: String,
        host_override: Option<String>,
        config: ClientConfig,
    ) -> Result<Self> {
        let client = RestClient::new(&api_key, &region, host_override, config)?;
        tracing::info!(uri = %uri, database = %database, region = %region, "connected to Hologres cloud");
        Ok(Self {
            client: Arc::new(client),
            database,
            uri,
        })
    }
}

#[async_trait]
impl Connection for RemoteConnection {
    fn uri(&self) -> &str {
        &self.uri
    }

    async fn table_names(&self, limit: Option<usize>) -> Result<Vec<String>> {
        let mut names: Vec<String> = self
            .client
            .list_tables(&self.database)
            .await?
            .into_iter()
            .map(|t| t.name)
            .collect();
        if let Some(limit) = limit {
            names.truncate(limit);
        }
        Ok(names)
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

        self.client
            .create_table(&self.database, name, &WireSchema::from(&schema))
            .await?;
        let table = RemoteTable::new(self.client.clone(), &self.database, name, schema);
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
        let description = self.client.get_table(&self.database, name).await?;
        let schema = Schema::try_from(&description.schema)?;
        Ok(Box::new(RemoteTable::new(
            self.client.clone(),
            &self.database,
            name,
            schema,
        )))
    }

    async fn drop_table(&self, name: &str) -> Result<()> {
        self.client.drop_table(&self.database, name).await
    }

    async fn rename_table(&self, _old_name: &str, _new_name: &str) -> Result<()> {
        Err(Error::NotImplemented(
            "table rename is not supported on the cloud backend".to_string(),
        ))
    }

    async fn close(&self) -> Result<()> {
        // The HTTP session is released when the client drops; nothing is
        // held open server-side.
        tracing::info!(uri = %self.uri, "closed cloud connection");
        Ok(())
    }
}
