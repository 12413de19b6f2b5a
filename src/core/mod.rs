//! Shared foundation: errors, configuration, URIs, and tabular values.

pub mod config;
pub mod error;
pub mod types;
pub mod uri;

pub use config::{ClientConfig, EnvConfig, DEFAULT_USER_AGENT, ENV_PREFIX};
pub use error::{Error, Result};
pub use types::{RecordBatch, Row, TableData, Value};
pub use uri::{parse_uri, sanitize_uri, DatabaseUri};
