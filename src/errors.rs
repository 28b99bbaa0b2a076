use crate::services::{
    ai_gateway::GatewayError, content_service::DeliveryError, storage_service::StorageError,
};
use axum::{
    Json,
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

/// A lightweight wrapper for general errors that keeps the message local.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
    /// Extra explanation shown to the client, e.g. the upstream error body.
    pub details: Option<String>,
    /// AI provider the error originated from.
    pub provider: Option<String>,
    pub headers: HeaderMap,
}

impl AppError {
    /// Create a new AppError with a specific status and message.
    pub fn new(status: StatusCode, msg: impl Into<String>) -> Self {
        Self {
            status,
            message: msg.into(),
            details: None,
            provider: None,
            headers: HeaderMap::new(),
        }
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, msg)
    }

    /// Shortcut for 404 Not Found
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, msg)
    }

    /// Shortcut for 400 Bad Request
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, msg)
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut body = json!({
            "error": self.message,
            "status": self.status.as_u16()
        });
        if let Some(details) = self.details {
            body["details"] = json!(details);
        }
        if let Some(provider) = self.provider {
            body["provider"] = json!(provider);
        }

        (self.status, self.headers, Json(body)).into_response()
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(_) => AppError::not_found("file not found"),
            StorageError::TooLarge { limit } => AppError::new(
                StatusCode::PAYLOAD_TOO_LARGE,
                format!("file too large (limit {} bytes)", limit),
            ),
            StorageError::Io(err) => {
                tracing::error!("storage I/O failure: {}", err);
                AppError::internal("storage failure")
            }
        }
    }
}

impl From<DeliveryError> for AppError {
    fn from(err: DeliveryError) -> Self {
        match err {
            DeliveryError::NotFound(_) => AppError::not_found("file not found"),
            DeliveryError::MalformedRange(msg) => AppError::bad_request(msg),
            DeliveryError::UnsatisfiableRange { length } => AppError::new(
                StatusCode::RANGE_NOT_SATISFIABLE,
                "requested range not satisfiable",
            )
            .with_header(
                header::CONTENT_RANGE,
                HeaderValue::from_str(&format!("bytes */{}", length))
                    .unwrap_or_else(|_| HeaderValue::from_static("bytes */*")),
            ),
            DeliveryError::Io(err) => {
                tracing::error!("content I/O failure: {}", err);
                AppError::internal("failed to read file")
            }
        }
    }
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        let status = match &err {
            GatewayError::InsufficientBalance { .. } => StatusCode::PAYMENT_REQUIRED,
            GatewayError::InvalidApiKey { .. } => StatusCode::UNAUTHORIZED,
            GatewayError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            GatewayError::Upstream { .. } | GatewayError::Transport(_) => StatusCode::BAD_GATEWAY,
            GatewayError::UnknownProvider(_) | GatewayError::MissingApiKey(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let mut app = AppError::new(status, err.to_string());
        app.details = err.details().map(str::to_string);
        app.provider = err.provider().map(str::to_string);
        app
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsatisfiable_range_carries_content_range() {
        let err = AppError::from(DeliveryError::UnsatisfiableRange { length: 42 });
        assert_eq!(err.status, StatusCode::RANGE_NOT_SATISFIABLE);
        assert_eq!(err.headers[header::CONTENT_RANGE], "bytes */42");
    }

    #[test]
    fn gateway_errors_keep_details_and_provider() {
        let err = AppError::from(GatewayError::InsufficientBalance {
            provider: "deepseek".into(),
            details: "no credit".into(),
        });
        assert_eq!(err.status, StatusCode::PAYMENT_REQUIRED);
        assert_eq!(err.details.as_deref(), Some("no credit"));
        assert_eq!(err.provider.as_deref(), Some("deepseek"));
    }
}
