//! Domain-specific error types for the visaplex gateway

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// Main error type for the gateway pipeline and its host layer
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Method not allowed: {method}")]
    MethodNotAllowed { method: String },

    #[error("Upstream error: status {status}")]
    Upstream { status: u16, detail: String },

    #[error("Transport error: {reason}")]
    Transport { reason: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Serialization error: {message}")]
    Serialization { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl GatewayError {
    /// The only validation failure the ingress step produces.
    pub fn missing_question() -> Self {
        GatewayError::Validation {
            message: "Missing question".to_string(),
        }
    }

    /// HTTP status this error maps to at the host boundary.
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::Validation { .. } => StatusCode::BAD_REQUEST,
            GatewayError::MethodNotAllowed { .. } => StatusCode::METHOD_NOT_ALLOWED,
            GatewayError::Upstream { .. } => StatusCode::BAD_GATEWAY,
            GatewayError::Transport { .. }
            | GatewayError::Config { .. }
            | GatewayError::Serialization { .. }
            | GatewayError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Caller-facing JSON body. Internal detail never leaves through here,
    /// except the bounded upstream excerpt.
    pub fn body(&self) -> serde_json::Value {
        match self {
            GatewayError::Validation { .. } => json!({ "error": "Missing question" }),
            GatewayError::MethodNotAllowed { .. } => json!({ "error": "Method not allowed" }),
            GatewayError::Upstream { detail, .. } => {
                json!({ "error": "Upstream error", "detail": detail })
            }
            _ => json!({ "error": "Server error" }),
        }
    }
}

impl From<anyhow::Error> for GatewayError {
    fn from(err: anyhow::Error) -> Self {
        GatewayError::Internal {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        GatewayError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        GatewayError::Transport {
            reason: format!("HTTP request failed: {}", err),
        }
    }
}

impl From<regex::Error> for GatewayError {
    fn from(err: regex::Error) -> Self {
        GatewayError::Config {
            message: format!("Invalid pattern: {}", err),
        }
    }
}

impl From<toml::de::Error> for GatewayError {
    fn from(err: toml::de::Error) -> Self {
        GatewayError::Config {
            message: err.to_string(),
        }
    }
}

/// Convert GatewayError to an HTTP response
impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        match &self {
            GatewayError::Validation { .. } | GatewayError::MethodNotAllowed { .. } => {
                tracing::debug!("Rejected request: {}", self);
            }
            GatewayError::Upstream { status, .. } => {
                tracing::warn!("Upstream returned status {}", status);
            }
            other => {
                tracing::error!("Request failed: {}", other);
            }
        }
        (status, Json(self.body())).into_response()
    }
}

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_taxonomy() {
        assert_eq!(
            GatewayError::missing_question().status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            GatewayError::MethodNotAllowed {
                method: "GET".into()
            }
            .status_code(),
            StatusCode::METHOD_NOT_ALLOWED
        );
        assert_eq!(
            GatewayError::Upstream {
                status: 429,
                detail: "slow down".into()
            }
            .status_code(),
            StatusCode::BAD_GATEWAY
        );
        assert_eq!(
            GatewayError::Transport {
                reason: "refused".into()
            }
            .status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn server_errors_hide_internal_detail() {
        let err = GatewayError::Internal {
            message: "secret stack detail".into(),
        };
        let body = err.body();
        assert_eq!(body, json!({ "error": "Server error" }));
        assert!(!body.to_string().contains("secret"));
    }

    #[test]
    fn upstream_body_carries_detail() {
        let err = GatewayError::Upstream {
            status: 401,
            detail: "invalid key".into(),
        };
        assert_eq!(
            err.body(),
            json!({ "error": "Upstream error", "detail": "invalid key" })
        );
    }
}
