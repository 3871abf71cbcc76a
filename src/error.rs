//! Error taxonomy shared by the ingestion, storage and read paths.

use actix_web::{HttpResponse, ResponseError, http::StatusCode};
use serde_json::json;

/// Transport failure or non-success response from an upstream feed.
#[derive(thiserror::Error, Debug)]
pub enum FetchError {
    #[error("invalid url {url}: {message}")]
    Url { url: String, message: String },

    #[error("request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("{url} returned status {status}")]
    Status { url: String, status: u16 },
}

/// Malformed payload from an upstream feed.
#[derive(thiserror::Error, Debug)]
#[error("malformed {format} payload from {origin}: {message}")]
pub struct ParseError {
    pub format: &'static str,
    pub origin: String,
    pub message: String,
}

impl ParseError {
    pub fn new(format: &'static str, origin: impl Into<String>, message: impl ToString) -> Self {
        Self {
            format,
            origin: origin.into(),
            message: message.to_string(),
        }
    }
}

/// Failure of a single source adapter.
#[derive(thiserror::Error, Debug)]
pub enum SourceError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error("missing credential: {0}")]
    Credential(&'static str),
}

/// Persistence failure. A failed append may leave a cycle partially written.
#[derive(thiserror::Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Record encoding error: {0}")]
    Encoding(#[from] serde_json::Error),

    #[error("Stored value is invalid: {0}")]
    Corrupt(String),

    #[error("Database connection lock poisoned")]
    Poisoned,

    #[error("Database worker failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Failure of an ingestion cycle. Under the abort policy nothing has been written
/// when a source failure is returned.
#[derive(thiserror::Error, Debug)]
pub enum IngestError {
    #[error("source {name} failed: {error}")]
    Source {
        name: &'static str,
        #[source]
        error: SourceError,
    },

    #[error("source {name} task failed: {error}")]
    Task {
        name: &'static str,
        #[source]
        error: tokio::task::JoinError,
    },

    #[error("every source failed")]
    AllSourcesFailed,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Failure of the latest-cycle read protocol.
#[derive(thiserror::Error, Debug)]
pub enum ReadError {
    #[error("no records found for the requested object types")]
    EmptyResult,

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Failure of a punctuality aggregation run. Nothing is written when this is returned
/// before the first ledger update.
#[derive(thiserror::Error, Debug)]
pub enum AggregateError {
    #[error("snapshot carries no cycle timestamp")]
    MissingTimestamp,

    #[error("snapshot mixes cycles {expected} and {found}")]
    MixedTimestamps { expected: i64, found: i64 },

    #[error(transparent)]
    Read(#[from] ReadError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Invalid runtime configuration.
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("{name} has invalid value {value:?}: {message}")]
    Invalid {
        name: &'static str,
        value: String,
        message: String,
    },
}

/// Errors surfaced by the HTTP read API.
#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("unknown object type: {0}")]
    BadObjectType(String),

    #[error(transparent)]
    Read(#[from] ReadError),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadObjectType(_) => StatusCode::BAD_REQUEST,
            ApiError::Read(ReadError::EmptyResult) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        if status.is_server_error() {
            tracing::error!(error = %self, "Read request failed");
        }
        HttpResponse::build(status).json(json!({ "error": self.to_string() }))
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
