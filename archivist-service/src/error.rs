use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

/// Main service error type
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Document not found: {document_id}")]
    DocumentNotFound { document_id: String },

    #[error("{0}")]
    Llm(#[from] LlmError),

    #[error("Database error")]
    Database(#[from] DatabaseError),

    #[error("Document processing failed")]
    Processing(#[from] ProcessingError),

    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },
}

/// Model endpoint errors.
///
/// `RateLimited` and `Unavailable` are the transient kinds; the invoker
/// retries them with linear backoff. Everything else fails the call
/// immediately.
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("Connection failed to model endpoint at {url}")]
    Connection {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Model endpoint rate limited the request: {message}")]
    RateLimited { message: String },

    #[error("Model endpoint unavailable (status {status}): {message}")]
    Unavailable { status: u16, message: String },

    #[error("Generation failed (status {status}): {message}")]
    Generation { status: u16, message: String },

    #[error("Invalid response from model endpoint")]
    InvalidResponse {
        #[source]
        source: serde_json::Error,
    },

    #[error("Model invocation gave up after {attempts} attempts")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        source: Box<LlmError>,
    },

    #[error("Model invocation cancelled")]
    Cancelled,
}

impl LlmError {
    /// Whether a retry is likely to succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LlmError::RateLimited { .. } | LlmError::Unavailable { .. }
        )
    }
}

/// Database errors
#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Database connection failed")]
    Connection(#[source] rusqlite::Error),

    #[error("Query failed")]
    Query(#[source] rusqlite::Error),

    #[error("Migration failed: {message}")]
    Migration { message: String },
}

/// Document processing errors
#[derive(Error, Debug)]
pub enum ProcessingError {
    #[error("Document {document_id} has no stored content")]
    MissingContent { document_id: String },

    #[error("Job queue is closed")]
    QueueClosed,

    #[error("IO error")]
    Io(#[source] std::io::Error),
}

/// API error response body
#[derive(Serialize)]
pub struct ErrorResponse {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl ServiceError {
    fn status_code(&self) -> StatusCode {
        match self {
            ServiceError::DocumentNotFound { .. } => StatusCode::NOT_FOUND,
            ServiceError::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
            ServiceError::Processing(ProcessingError::QueueClosed) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            ServiceError::DocumentNotFound { .. } => "document_not_found",
            ServiceError::Llm(LlmError::Connection { .. }) => "model_connection",
            ServiceError::Llm(LlmError::RateLimited { .. }) => "model_rate_limited",
            ServiceError::Llm(LlmError::Unavailable { .. }) => "model_unavailable",
            ServiceError::Llm(LlmError::Generation { .. }) => "model_generation",
            ServiceError::Llm(LlmError::InvalidResponse { .. }) => "model_invalid_response",
            ServiceError::Llm(LlmError::RetriesExhausted { .. }) => "model_retries_exhausted",
            ServiceError::Llm(LlmError::Cancelled) => "model_cancelled",
            ServiceError::Database(_) => "database_error",
            ServiceError::Processing(ProcessingError::MissingContent { .. }) => "missing_content",
            ServiceError::Processing(ProcessingError::QueueClosed) => "queue_closed",
            ServiceError::Processing(ProcessingError::Io(_)) => "io_error",
            ServiceError::InvalidRequest { .. } => "invalid_request",
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.error_code().to_string();

        let response = ErrorResponse {
            message: self.to_string(),
            code: Some(code),
        };

        (status, Json(response)).into_response()
    }
}

/// Result type alias for service operations
pub type ServiceResult<T> = Result<T, ServiceError>;
