use thiserror::Error;

/// Errors surfaced by the Hologres client.
///
/// Validation-style variants (`Config`, `Validation`, `Schema`) are raised
/// before any network round trip; `Backend` carries the driver or HTTP
/// message through unmodified.
#[derive(Error, Debug)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("invalid vector data: {0}")]
    Validation(String),

    #[error("schema error: {0}")]
    Schema(String),

    #[error("backend error: {0}")]
    Backend(String),

    #[error("not implemented: {0}")]
    NotImplemented(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<sqlx::Error> for Error {
    fn from(e: sqlx::Error) -> Self {
        Error::Backend(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Backend(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Backend(e.to_string())
    }
}

impl From<url::ParseError> for Error {
    fn from(e: url::ParseError) -> Self {
        Error::Config(format!("invalid URI: {}", e))
    }
}
