//! Error codes and JSON error responses for the wake endpoint

use http_body_util::Full;
use hyper::body::Bytes;
use hyper::{Response, StatusCode};
use serde::Serialize;

/// Error codes surfaced by the wake endpoint
#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum WakeErrorCode {
    /// Missing Host header in request
    MissingHostHeader,
    /// No eligible container routes the requested hostname
    UnknownHost,
    /// The container runtime could not be consulted
    RuntimeUnavailable,
    /// Internal controller error
    InternalError,
}

impl WakeErrorCode {
    /// Default HTTP status for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            WakeErrorCode::MissingHostHeader => StatusCode::BAD_REQUEST,
            WakeErrorCode::UnknownHost => StatusCode::NOT_FOUND,
            WakeErrorCode::RuntimeUnavailable => StatusCode::BAD_GATEWAY,
            WakeErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Code string carried in the X-Wakegate-Error header
    pub fn as_header_value(&self) -> &'static str {
        match self {
            WakeErrorCode::MissingHostHeader => "MISSING_HOST_HEADER",
            WakeErrorCode::UnknownHost => "UNKNOWN_HOST",
            WakeErrorCode::RuntimeUnavailable => "RUNTIME_UNAVAILABLE",
            WakeErrorCode::InternalError => "INTERNAL_ERROR",
        }
    }
}

/// JSON error response body
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub code: WakeErrorCode,
    pub message: String,
    pub status: u16,
}

impl ErrorResponse {
    pub fn new(code: WakeErrorCode, message: impl Into<String>) -> Self {
        Self {
            status: code.status_code().as_u16(),
            code,
            message: message.into(),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(
                r#"{{"code":"{}","message":"{}","status":{}}}"#,
                self.code.as_header_value(),
                self.message.replace('\"', "\\\""),
                self.status
            )
        })
    }
}

/// Create a JSON error response with the X-Wakegate-Error header set
pub fn json_error_response(code: WakeErrorCode, message: impl Into<String>) -> Response<Full<Bytes>> {
    let error = ErrorResponse::new(code, message);
    let status = code.status_code();
    let body = error.to_json();

    Response::builder()
        .status(status)
        .header("Content-Type", "application/json")
        .header("X-Wakegate-Error", code.as_header_value())
        .body(Full::new(Bytes::from(body)))
        .expect("valid response with StatusCode enum and static headers")
}
