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

//! Pluggable text-to-vector embedding functions.
//!
//! Implementations typically call an external model service, so the module
//! ships a retry wrapper with the same exponential backoff the HTTP client
//! uses, plus a process-global registry for lookup by name.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use parking_lot::RwLock;

use crate::core::config::backoff_delay;
use crate::core::error::{Error, Result};

/// A text embedding model.
#[async_trait]
pub trait EmbeddingFunction: Send + Sync {
    /// Embed one query string.
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>>;

    /// Embed a batch of source documents.
    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Output dimension, when the model pins one.
    fn ndims(&self) -> Option<usize> {
        None
    }
}

/// Wraps an embedding function with retry-on-failure semantics.
pub struct WithRetry<F> {
    inner: F,
    max_retries: usize,
    retry_delay_secs: f64,
}

impl<F: EmbeddingFunction> WithRetry<F> {
    pub fn new(inner: F, max_retries: usize, retry_delay_secs: f64) -> Self {
        Self {
            inner,
            max_retries,
            retry_delay_secs,
        }
    }
}

#[async_trait]
impl<F: EmbeddingFunction> EmbeddingFunction for WithRetry<F> {
    async fn embed_query(&self, text: &str) -> Result<Vec<f32>> {
        let mut last_err = None;
        for attempt in 0..=self.max_retries {
            match self.inner.embed_query(text).await {
                Ok(vector) => return Ok(vector),
                Err(e) => {
                    if attempt < self.max_retries {
                        let delay = backoff_delay(self.retry_delay_secs, attempt as u32);
                        tracing::warn!(attempt, error = %e, "embedding query failed, retrying");
                        tokio::time::sleep(delay).await;
                    }
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| Error::Backend("embedding failed".to_string())))
    }

    async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let mut last_err = None;
        for attempt in 0..=self.max_retries {
            match self.inner.embed_documents(texts).await {
                Ok(vectors) => return Ok(vectors),
                Err(e) => {
                    if attempt < self.max_retries {
                        let delay = backoff_delay(self.retry_delay_secs, attempt as u32);
                        tracing::warn!(attempt, error = %e, "embedding batch failed, retrying");
                        tokio::time::sleep(delay).await;
                    }
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| Error::Backend("embedding failed".to_string())))
    }

    fn ndims(&self) -> Option<usize> {
        self.inner.ndims()
    }
}

/// Well-formedness check for a batch of embeddings: non-empty, equal
/// dimension, all values finite.
pub fn validate_embeddings(embeddings: &[Vec<f32>]) -> bool {
    let first_dim = match embeddings.first() {
        Some(v) => v.len(),
        None => return false,
    };
    embeddings
        .iter()
        .all(|v| v.len() == first_dim && v.iter().all(|f| f.is_finite()))
}

/// Scale each embedding to unit length. Zero vectors pass through.
pub fn normalize_embeddings(embeddings: Vec<Vec<f32>>) -> Vec<Vec<f32>> {
    embeddings
        .into_iter()
        .map(|v| {
            let norm = v.iter().map(|f| f * f).sum::<f32>().sqrt();
            if norm > 0.0 {
                v.into_iter().map(|f| f / norm).collect()
            } else {
                v
            }
        })
        .collect()
}

/// Named registry of embedding functions.
pub struct EmbeddingRegistry {
    functions: RwLock<HashMap<String, Arc<dyn EmbeddingFunction>>>,
}

impl EmbeddingRegistry {
    pub fn new() -> Self {
        Self {
            functions: RwLock::new(HashMap::new()),
        }
    }

    /// Register a function under a name, replacing any previous entry.
    pub fn register(&self, name: impl Into<String>, function: Arc<dyn EmbeddingFunction>) {
        self.functions.write().insert(name.into(), function);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn EmbeddingFunction>> {
        self.functions.read().get(name).cloned()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.functions.read().keys().cloned().collect();
        names.sort();
        names
    }
}

impl Default for EmbeddingRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// The process-global registry.
pub fn registry() -> &'static EmbeddingRegistry {
    static REGISTRY: Lazy<EmbeddingRegistry> = Lazy::new(EmbeddingRegistry::new);
    &REGISTRY
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Flaky {
        calls: AtomicUsize,
        fail_first: usize,
    }

    #[async_trait]
    impl EmbeddingFunction for Flaky {
        async fn embed_query(&self, _text: &str) -> Result<Vec<f32>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_first {
                Err(Error::Backend("model unavailable".to_string()))
            } else {
                Ok(vec![1.0, 0.0])
            }
        }

        async fn embed_documents(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            let mut out = Vec::new();
            for text in texts {
                out.push(self.embed_query(text).await?);
            }
            Ok(out)
        }

        fn ndims(&self) -> Option<usize> {
            Some(2)
        }
    }

    #[tokio::test]
    async fn retry_recovers_after_transient_failures() {
        let flaky = Flaky {
            calls: AtomicUsize::new(0),
            fail_first: 2,
        };
        let wrapped = WithRetry::new(flaky, 3, 0.01);
        let vector = wrapped.embed_query("hello").await.unwrap();
        assert_eq!(vector, vec![1.0, 0.0]);
        assert_eq!(wrapped.inner.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn zero_retries_fail_on_first_error() {
        let flaky = Flaky {
            calls: AtomicUsize::new(0),
            fail_first: 1,
        };
        let wrapped = WithRetry::new(flaky, 0, 0.01);
        assert!(wrapped.embed_query("hello").await.is_err());
        assert_eq!(wrapped.inner.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn registry_lookup() {
        let registry = EmbeddingRegistry::new();
        registry.register(
            "flaky",
            Arc::new(Flaky {
                calls: AtomicUsize::new(0),
                fail_first: 0,
            }),
        );
        assert!(registry.get("flaky").is_some());
        assert!(registry.get("absent").is_none());
        assert_eq!(registry.names(), vec!["flaky".to_string()]);
        assert_eq!(registry.get("flaky").unwrap().ndims(), Some(2));
    }

    #[test]
    fn validation_catches_ragged_and_non_finite() {
        assert!(validate_embeddings(&[vec![1.0, 2.0], vec![3.0, 4.0]]));
        assert!(!validate_embeddings(&[]));
        assert!(!validate_embeddings(&[vec![1.0, 2.0], vec![3.0]]));
        assert!(!validate_embeddings(&[vec![1.0, f32::INFINITY]]));
    }

    #[test]
    fn normalization_produces_unit_vectors() {
        let normalized = normalize_embeddings(vec![vec![3.0, 4.0], vec![0.0, 0.0]]);
        let norm: f32 = normalized[0].iter().map(|f| f * f).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
        assert_eq!(normalized[1], vec![0.0, 0.0]);
    }
}
