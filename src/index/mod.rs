//! Index descriptors.
//!
//! An index request carries a name, target columns, a kind tag, and
//! kind-specific tuning options. Creation is fire-and-forget on both
//! backends: success means the request was accepted, not that the index
//! finished building.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::query::Metric;

/// Kind tag for an index request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum IndexKind {
    /// Ordered scan index (B-tree).
    Btree,
    /// Vector similarity index.
    Vector,
    /// Full-text search index.
    Fts,
}

/// Options for scalar and vector indexes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IndexOptions {
    /// Index name; derived from table and column when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Drop an existing index of the same name first.
    #[serde(default)]
    pub replace: bool,
    /// Distance metric the index is tuned for (vector indexes only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metric: Option<Metric>,
    /// Partition count hint (vector indexes only).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_partitions: Option<u32>,
}

/// Options for full-text indexes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FtsIndexOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub replace: bool,
    pub base_tokenizer: String,
    pub language: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_token_length: Option<u32>,
    pub lower_case: bool,
    pub stem: bool,
    pub remove_stop_words: bool,
    pub ascii_folding: bool,
    pub with_position: bool,
}

impl Default for FtsIndexOptions {
    fn default() -> Self {
        Self {
            name: None,
            replace: false,
            base_tokenizer: "simple".to_string(),
            language: "english".to_string(),
            max_token_length: None,
            lower_case: true,
            stem: false,
            remove_stop_words: false,
            ascii_folding: false,
            with_position: true,
        }
    }
}

/// JSON body sent to the cloud indexes endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexRequest {
    pub name: String,
    pub columns: Vec<String>,
    #[serde(rename = "type")]
    pub kind: IndexKind,
    #[serde(default)]
    pub replace: bool,
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub options: serde_json::Map<String, serde_json::Value>,
}

/// One index as reported by a backend listing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexInfo {
    pub name: String,
    #[serde(flatten)]
    pub details: HashMap<String, serde_json::Value>,
}

/// Derived index name when the caller supplies none.
pub(crate) fn default_index_name(table: &str, columns: &[String], kind: IndexKind) -> String {
    let joined = columns.join("_");
    match kind {
        IndexKind::Fts => format!("fts_idx_{}_{}", table, joined),
        _ => format!("idx_{}_{}", table, joined),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_names() {
        assert_eq!(
            default_index_name("docs", &["embedding".to_string()], IndexKind::Vector),
            "idx_docs_embedding"
        );
        assert_eq!(
            default_index_name(
                "docs",
                &["title".to_string(), "body".to_string()],
                IndexKind::Fts
            ),
            "fts_idx_docs_title_body"
        );
    }

    #[test]
    fn request_serializes_kind_tag() {
        let request = IndexRequest {
            name: "idx_docs_embedding".to_string(),
            columns: vec!["embedding".to_string()],
            kind: IndexKind::Vector,
            replace: true,
            options: serde_json::Map::new(),
        };
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["type"], "VECTOR");
        assert_eq!(json["replace"], true);
    }
}
