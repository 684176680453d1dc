use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderValue, Response, StatusCode};
use http_body_util::Full;
use serde_json::json;
use thiserror::Error;

use crate::path::PathError;
use crate::signing::SigningError;

/// Failures while forwarding an allowed request. Access outcomes are redirects
/// and never show up here.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("Upstream request failed: {0}")]
    Upstream(String),

    #[error("Body too large: {size} bytes exceeds limit of {limit} bytes")]
    BodyTooLarge { size: usize, limit: usize },

    #[error("Request timeout")]
    Timeout,

    #[error("Context signing failed: {0}")]
    Signing(#[from] SigningError),

    #[error("Invalid header value: {0}")]
    InvalidHeader(String),

    #[error("Invalid request path: {0}")]
    InvalidPath(#[from] PathError),
}

impl ProxyError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ProxyError::Upstream(_) => StatusCode::BAD_GATEWAY,
            ProxyError::BodyTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ProxyError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            ProxyError::InvalidPath(_) => StatusCode::BAD_REQUEST,
            ProxyError::Signing(_) | ProxyError::InvalidHeader(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn to_response(&self, request_id: Option<&str>) -> Response<Full<Bytes>> {
        let (error_code, message) = match self {
            ProxyError::Upstream(e) => ("UPSTREAM_ERROR", e.to_string()),
            ProxyError::BodyTooLarge { size, limit } => (
                "BODY_TOO_LARGE",
                format!("Request body size {} exceeds limit {}", size, limit),
            ),
            ProxyError::Timeout => ("TIMEOUT", "Request timeout".to_string()),
            ProxyError::Signing(e) => ("SIGNING_ERROR", e.to_string()),
            ProxyError::InvalidHeader(e) => ("INVALID_HEADER", e.to_string()),
            ProxyError::InvalidPath(e) => ("INVALID_PATH", e.to_string()),
        };

        let body_json = json!({
            "error": error_code,
            "message": message,
            "request_id": request_id,
        });

        let mut response = Response::new(Full::new(Bytes::from(body_json.to_string())));
        *response.status_mut() = self.status_code();
        response
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        response
    }
}
