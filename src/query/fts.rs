//! Full-text query expressions.
//!
//! Lowered to `tsvector`/`tsquery` SQL for the wire-protocol backend and to
//! a JSON payload for the cloud API. Queries compose with `&` and `|`.

use serde::{Deserialize, Serialize};

/// How a clause participates in a boolean full-text query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Occur {
    Must,
    Should,
    MustNot,
}

/// A full-text search expression.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FullTextQuery {
    /// Match rows containing the words of `text`, in any order.
    Match {
        text: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        field: Option<String>,
    },
    /// Match rows containing the exact phrase.
    Phrase {
        phrase: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        field: Option<String>,
    },
    /// Boolean combination of sub-queries.
    Boolean { clauses: Vec<(Occur, FullTextQuery)> },
}

impl FullTextQuery {
    pub fn match_text(text: impl Into<String>) -> Self {
        FullTextQuery::Match {
            text: text.into(),
            field: None,
        }
    }

    pub fn phrase(phrase: impl Into<String>) -> Self {
        FullTextQuery::Phrase {
            phrase: phrase.into(),
            field: None,
        }
    }

    /// Restrict the expression to one field. Boolean queries push the field
    /// down into each clause.
    pub fn on_field(self, field: impl Into<String>) -> Self {
        let field = field.into();
        match self {
            FullTextQuery::Match { text, .. } => FullTextQuery::Match {
                text,
                field: Some(field),
            },
            FullTextQuery::Phrase { phrase, .. } => FullTextQuery::Phrase {
                phrase,
                field: Some(field),
            },
            FullTextQuery::Boolean { clauses } => FullTextQuery::Boolean {
                clauses: clauses
                    .into_iter()
                    .map(|(occur, q)| (occur, q.on_field(field.clone())))
                    .collect(),
            },
        }
    }

    /// Lower to a `tsvector @@ tsquery` SQL expression against the given
    /// text-search configuration. Search text is embedded as a quoted
    /// literal; structural SQL around it is fixed.
    pub fn to_sql(&self, language: &str) -> String {
        match self {
            FullTextQuery::Match { text, field } => format!(
                "to_tsvector('{}', {}) @@ plainto_tsquery('{}', '{}')",
                language,
                field.as_deref().unwrap_or("*"),
                language,
                escape(text),
            ),
            FullTextQuery::Phrase { phrase, field } => format!(
                "to_tsvector('{}', {}) @@ phraseto_tsquery('{}', '{}')",
                language,
                field.as_deref().unwrap_or("*"),
                language,
                escape(phrase),
            ),
            FullTextQuery::Boolean { clauses } => {
                let mut must = Vec::new();
                let mut should = Vec::new();
                let mut must_not = Vec::new();
                for (occur, query) in clauses {
                    let sql = query.to_sql(language);
                    match occur {
                        Occur::Must => must.push(sql),
                        Occur::Should => should.push(sql),
                        Occur::MustNot => must_not.push(format!("NOT ({})", sql)),
                    }
                }
                let mut parts = Vec::new();
                if !must.is_empty() {
                    parts.push(must.join(" AND "));
                }
                if !should.is_empty() {
                    parts.push(format!("({})", should.join(" OR ")));
                }
                parts.extend(must_not);
                parts.join(" AND ")
            }
        }
    }
}

fn escape(text: &str) -> String {
    text.replace('\'', "''")
}

impl std::ops::BitAnd for FullTextQuery {
    type Output = FullTextQuery;

    fn bitand(self, other: FullTextQuery) -> FullTextQuery {
        FullTextQuery::Boolean {
            clauses: vec![(Occur::Must, self), (Occur::Must, other)],
        }
    }
}

impl std::ops::BitOr for FullTextQuery {
    type Output = FullTextQuery;

    fn bitor(self, other: FullTextQuery) -> FullTextQuery {
        FullTextQuery::Boolean {
            clauses: vec![(Occur::Should, self), (Occur::Should, other)],
        }
    }
}
