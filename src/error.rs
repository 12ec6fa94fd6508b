use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::{Value, json};
use thiserror::Error;

/// The uniform failure unit crossing the gateway boundary: an HTTP status
/// plus a JSON body. Every failure path terminates in exactly one of these;
/// no other error shape ever reaches the transport layer.
#[derive(Debug, Clone, PartialEq)]
pub struct ProxyError {
    pub status: StatusCode,
    pub body: Value,
}

impl ProxyError {
    pub fn new(status: StatusCode, body: Value) -> Self {
        Self { status, body }
    }

    pub fn message(status: StatusCode, message: &str) -> Self {
        Self::new(status, json!({ "message": message }))
    }

    /// Local fast-fail for protected routes: no credential means no
    /// downstream call is made at all.
    pub fn missing_authorization() -> Self {
        Self::message(StatusCode::UNAUTHORIZED, "Missing Authorization header")
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

/// Downstream failure classified once, at the point of the call, by the
/// downstream client. `Http` means the downstream answered with a non-2xx
/// status; the other variants mean no usable response was obtained.
#[derive(Debug, Error)]
pub enum DownstreamFailure {
    #[error("downstream responded with {status}")]
    Http {
        status: StatusCode,
        body: Option<Value>,
    },
    #[error("downstream call failed: {source}")]
    Transport {
        #[from]
        source: reqwest::Error,
    },
    #[error("downstream returned a malformed body: {source}")]
    Decode {
        #[from]
        source: serde_json::Error,
    },
}

/// Total mapping from any downstream failure to a `ProxyError`.
///
/// Statuses from downstreams that did respond pass through unchanged, body
/// included; only failures with no response at all invent a status (502).
/// The generic fallback message is all a client ever sees of a connectivity
/// failure; the cause goes to the log instead.
pub fn normalize(failure: DownstreamFailure, fallback: &str) -> ProxyError {
    match failure {
        DownstreamFailure::Http { status, body } => {
            ProxyError::new(status, normalize_body(body, fallback))
        }
        DownstreamFailure::Transport { source } => {
            tracing::warn!(error = %source, "downstream unreachable or timed out");
            ProxyError::message(StatusCode::BAD_GATEWAY, fallback)
        }
        DownstreamFailure::Decode { source } => {
            tracing::warn!(error = %source, "downstream body could not be decoded");
            ProxyError::message(StatusCode::BAD_GATEWAY, fallback)
        }
    }
}

/// Structured bodies pass through unchanged, bare strings are wrapped, and
/// anything else is replaced by the fallback message.
fn normalize_body(body: Option<Value>, fallback: &str) -> Value {
    match body {
        Some(Value::Object(fields)) => Value::Object(fields),
        Some(Value::String(text)) => json!({ "message": text }),
        _ => json!({ "message": fallback }),
    }
}
