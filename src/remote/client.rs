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

//! HTTP client for the Hologres cloud API.
//!
//! Every request carries a bearer token and the configured user-agent.
//! Network errors and non-2xx responses are retried with exponential
//! backoff, uniformly across verbs; callers performing non-idempotent
//! mutations can observe duplicate side effects when the server committed
//! an attempt the client saw fail.

use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Method;
use serde::Deserialize;
use url::Url;

use crate::core::config::{backoff_delay, ClientConfig};
use crate::core::error::{Error, Result};
use crate::index::{IndexInfo, IndexRequest};
use crate::query::QueryRequest;
use crate::schema::WireSchema;

/// One table as reported by the tables listing.
#[derive(Debug, Clone, Deserialize)]
pub struct TableSummary {
    pub name: String,
}

/// Full table description returned by the table endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct TableDescription {
    pub name: String,
    pub schema: WireSchema,
}

/// Response to a query request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryResponse {
    #[serde(default)]
    pub rows: Vec<serde_json::Map<String, serde_json::Value>>,
    #[serde(default)]
    pub count: Option<u64>,
}

/// Structured mutation payloads.
#[derive(Debug, Clone, serde::Serialize)]
pub struct UpdateRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    #[serde(skip_serializing_if = "serde_json::Map::is_empty")]
    pub values: serde_json::Map<String, serde_json::Value>,
    #[serde(skip_serializing_if = "serde_json::Map::is_empty")]
    pub values_sql: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct DeleteRequest {
    pub filter: String,
}

/// HTTP client bound to one cloud endpoint.
pub struct RestClient {
    http: reqwest::Client,
    base_url: Url,
    config: ClientConfig,
}

impl RestClient {
    pub fn new(
        api_key: &str,
        region: &str,
        host_override: Option<String>,
        config: ClientConfig,
    ) -> Result<Self> {
        let base = host_override
            .unwrap_or_else(|| format!("https://hologres.{}.aliyuncs.com", region));
        let base_url = Url::parse(&base)?;

        let mut headers = HeaderMap::new();
        let bearer = HeaderValue::from_str(&format!("Bearer {}", api_key))
            .map_err(|_| Error::Config("api_key contains invalid header characters".to_string()))?;
        headers.insert(AUTHORIZATION, bearer);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs_f64(config.timeout_secs))
            .pool_max_idle_per_host(config.max_connections)
            .danger_accept_invalid_certs(!config.verify_ssl)
            .build()?;

        Ok(Self {
            http,
            base_url,
            config,
        })
    }

    /// Issue one request with retry. `max_retries` bounds the extra
    /// attempts; zero means exactly one attempt.
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<serde_json::Value> {
        let url = self.base_url.join(path)?;
        let mut last_err = None;
        for attempt in 0..=self.config.max_retries {
            let mut request = self.http.request(method.clone(), url.clone());
            if let Some(body) = body {
                request = request.json(body);
            }
            let err = match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    let text = response.text().await.unwrap_or_default();
                    if status.is_success() {
                        if text.is_empty() {
                            return Ok(serde_json::Value::Null);
                        }
                        return Ok(serde_json::from_str(&text)?);
                    }
                    Error::Backend(format!("HTTP {}: {}", status.as_u16(), text))
                }
                Err(e) => Error::Backend(e.to_string()),
            };
            if attempt < self.config.max_retries {
                let delay = backoff_delay(self.config.retry_delay_secs, attempt as u32);
                tracing::warn!(
                    %method,
                    %url,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "cloud API request failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            last_err = Some(err);
        }
        Err(last_err.unwrap_or_else(|| Error::Backend("request failed".to_string())))
    }

    pub async fn list_databases(&self) -> Result<Vec<serde_json::Value>> {
        let response = self.request(Method::GET, "/api/v1/databases", None).await?;
        Ok(serde_json::from_value(response)?)
    }

    pub async fn list_tables(&self, database: &str) -> Result<Vec<TableSummary>> {
        let path = format!("/api/v1/databases/{}/tables", database);
        let response = self.request(Method::GET, &path, None).await?;
        Ok(serde_json::from_value(response)?)
    }

    pub async fn get_table(&self, database: &str, table: &str) -> Result<TableDescription> {
        let path = format!("/api/v1/databases/{}/tables/{}", database, table);
        let response = self.request(Method::GET, &path, None).await?;
        Ok(serde_json::from_value(response)?)
    }

    pub async fn create_table(
        &self,
        database: &str,
        table: &str,
        schema: &WireSchema,
    ) -> Result<()> {
        let path = format!("/api/v1/databases/{}/tables", database);
        let body = serde_json::json!({
            "name": table,
            "schema": schema,
        });
        self.request(Method::POST, &path, Some(&body)).await?;
        Ok(())
    }

    pub async fn drop_table(&self, database: &str, table: &str) -> Result<()> {
        let path = format!("/api/v1/databases/{}/tables/{}", database, table);
        self.request(Method::DELETE, &path, None).await?;
        Ok(())
    }

    pub async fn insert_rows(
        &self,
        database: &str,
        table: &str,
        rows: Vec<serde_json::Map<String, serde_json::Value>>,
        mode: &str,
    ) -> Result<()> {
        let path = format!("/api/v1/databases/{}/tables/{}/data", database, table);
        let body = serde_json::json!({
            "data": rows,
            "mode": mode,
        });
        self.request(Method::POST, &path, Some(&body)).await?;
        Ok(())
    }

    pub async fn query(
        &self,
        database: &str,
        table: &str,
        request: &QueryRequest,
    ) -> Result<QueryResponse> {
        let path = format!("/api/v1/databases/{}/tables/{}/query", database, table);
        let body = serde_json::to_value(request)?;
        let response = self.request(Method::POST, &path, Some(&body)).await?;
        Ok(serde_json::from_value(response)?)
    }

    pub async fn update(
        &self,
        database: &str,
        table: &str,
        request: &UpdateRequest,
    ) -> Result<()> {
        let path = format!("/api/v1/databases/{}/tables/{}/update", database, table);
        let body = serde_json::to_value(request)?;
        self.request(Method::POST, &path, Some(&body)).await?;
        Ok(())
    }

    pub async fn delete(&self, database: &str, table: &str, request: &DeleteRequest) -> Result<()> {
        let path = format!("/api/v1/databases/{}/tables/{}/delete", database, table);
        let body = serde_json::to_value(request)?;
        self.request(Method::POST, &path, Some(&body)).await?;
        Ok(())
    }

    pub async fn create_index(
        &self,
        database: &str,
        table: &str,
        request: &IndexRequest,
    ) -> Result<()> {
        let path = format!("/api/v1/databases/{}/tables/{}/indexes", database, table);
        let body = serde_json::to_value(request)?;
        self.request(Method::POST, &path, Some(&body)).await?;
        Ok(())
    }

    pub async fn list_indexes(&self, database: &str, table: &str) -> Result<Vec<IndexInfo>> {
        let path = format!("/api/v1/databases/{}/tables/{}/indexes", database, table);
        let response = self.request(Method::GET, &path, None).await?;
        Ok(serde_json::from_value(response)?)
    }
}
