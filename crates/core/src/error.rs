use actix_web::{HttpResponse, ResponseError};

pub type Result<T> = std::result::Result<T, RelayError>;

/// Error taxonomy for the message relay.
///
/// `BackendUnavailable` is transient: it is logged, flips readiness to
/// false, and is retried on the next probe. It is never fatal, neither at
/// startup nor at runtime.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Connection not found: {0}")]
    NotFound(String),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Configuration error: {message}")]
    ConfigurationError {
        message: String,
        key: Option<String>,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl From<anyhow::Error> for RelayError {
    fn from(err: anyhow::Error) -> Self {
        RelayError::Internal(err.to_string())
    }
}

impl From<sqlx::Error> for RelayError {
    fn from(err: sqlx::Error) -> Self {
        RelayError::BackendUnavailable(err.to_string())
    }
}

impl From<redis::RedisError> for RelayError {
    fn from(err: redis::RedisError) -> Self {
        RelayError::BackendUnavailable(err.to_string())
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(err: serde_json::Error) -> Self {
        RelayError::Internal(format!("serialization error: {}", err))
    }
}

impl ResponseError for RelayError {
    fn status_code(&self) -> actix_web::http::StatusCode {
        use actix_web::http::StatusCode;
        match self {
            RelayError::BackendUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            RelayError::NotFound(_) => StatusCode::NOT_FOUND,
            RelayError::InvalidMessage(_) => StatusCode::BAD_REQUEST,
            RelayError::ConfigurationError { .. } | RelayError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        match self {
            RelayError::BackendUnavailable(_) => {
                HttpResponse::ServiceUnavailable().json(serde_json::json!({
                    "error": "backend_unavailable",
                    "error_description": self.to_string()
                }))
            }
            RelayError::NotFound(id) => HttpResponse::NotFound().json(serde_json::json!({
                "error": "not_found",
                "error_description": format!("No connection registered for id {}", id)
            })),
            RelayError::InvalidMessage(reason) => {
                HttpResponse::BadRequest().json(serde_json::json!({
                    "error": "invalid_message",
                    "error_description": reason
                }))
            }
            RelayError::ConfigurationError { message, .. } => {
                HttpResponse::InternalServerError().json(serde_json::json!({
                    "error": "configuration_error",
                    "error_description": message
                }))
            }
            RelayError::Internal(_) => HttpResponse::InternalServerError().json(
                serde_json::json!({
                    "error": "internal_error",
                    "error_description": "Internal server error"
                }),
            ),
        }
    }
}
