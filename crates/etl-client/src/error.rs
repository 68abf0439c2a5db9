//! Error types for the ETL client
//!
//! Every failure a caller can act on has its own variant: configuration that
//! is missing, queries that are malformed, and each kind of service refusal
//! together with the status and body the service answered with.

use std::fmt;
use thiserror::Error;

/// Result type alias for ETL client operations
pub type Result<T> = std::result::Result<T, EtlError>;

/// Error type for ETL client operations
#[derive(Error, Debug)]
pub enum EtlError {
    /// A required construction or call parameter is missing
    #[error("{0}")]
    Config(String),

    /// A query or setting is malformed
    #[error("{0}")]
    Validation(String),

    /// The auth service did not issue a token
    #[error("Failed to get auth token ({scope}) ({status}): {body}")]
    Auth {
        scope: String,
        status: u16,
        body: String,
    },

    /// A read request was answered with a status outside [200, 204]
    #[error(transparent)]
    Fetch(Box<FetchError>),

    /// A batch update was refused after the token refresh retry
    #[error("Error in batch {action_type} operation ({status}): {body}")]
    Write {
        action_type: String,
        status: u16,
        body: String,
    },

    /// A record of a device batch could not be sent
    #[error("send_batch_http error. Index where the error occurred: {index}\nError detail: {source}")]
    SendBatch {
        index: usize,
        #[source]
        source: Box<EtlError>,
    },

    /// Object storage operation failed
    #[error("Object storage error: {0}")]
    Storage(String),

    /// Transport failure (connection refused, timeout, ...)
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("File operation failed: {0}")]
    Io(#[from] std::io::Error),
}

impl EtlError {
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Configuration error naming every missing field of `owner` at once.
    ///
    /// `["<<user>>", "<<password>>"]` becomes
    /// `You must define <<user>> and <<password>> in AuthManager`.
    pub fn missing_fields(fields: &[&str], owner: &str) -> Self {
        let listed = match fields {
            [] => String::new(),
            [single] => (*single).to_string(),
            [init @ .., last] => format!("{} and {}", init.join(", "), last),
        };
        Self::Config(format!("You must define {} in {}", listed, owner))
    }

    /// HTTP status carried by the error, if the service answered at all.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Auth { status, .. } | Self::Write { status, .. } => Some(*status),
            Self::Fetch(err) => Some(err.status),
            Self::SendBatch { source, .. } => source.status(),
            Self::Http(err) => err.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

impl From<FetchError> for EtlError {
    fn from(err: FetchError) -> Self {
        Self::Fetch(Box::new(err))
    }
}

/// Body of a response that is being reported as an error.
///
/// A body that cannot be read is described instead of dropped.
pub(crate) async fn error_body(response: reqwest::Response) -> String {
    match response.text().await {
        Ok(text) => text,
        Err(err) => format!("<unreadable body: {}>", err),
    }
}

/// All parameters of a failed HTTP request together with the response.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchError {
    pub method: String,
    pub url: String,
    pub params: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: Option<String>,
    pub status: u16,
    pub response: String,
}

impl std::error::Error for FetchError {}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Failed to {} {} (headers: {:?}, params: {:?}, body: {:?}): [{}] {}",
            self.method, self.url, self.headers, self.params, self.body, self.status, self.response
        )
    }
}
