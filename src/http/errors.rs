//! HTTP error shaping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};
use thiserror::Error;

use crate::mcp_bridge::types::{error_codes, JsonRpcError};
use crate::mcp_bridge::BridgeError;

/// Errors returned by the REST-style routes.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The inbound body was not acceptable.
    #[error("{0}")]
    BadRequest(String),

    /// The bridge failed to produce a result.
    #[error(transparent)]
    Bridge(#[from] BridgeError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Bridge(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = match &self {
            ApiError::BadRequest(message) => json!({ "error": message }),
            ApiError::Bridge(e) => json!({
                "error": e.to_string(),
                "kind": e.kind(),
                "category": e.category().as_str(),
            }),
        };
        (self.status(), Json(body)).into_response()
    }
}

/// A JSON-RPC error reply for the passthrough route.
#[derive(Debug)]
pub struct RpcFailure {
    pub status: StatusCode,
    pub id: Value,
    pub error: JsonRpcError,
}

impl RpcFailure {
    pub fn parse_error(reason: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, Value::Null, error_codes::PARSE_ERROR, reason)
    }

    pub fn invalid_request(id: Value, reason: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, id, error_codes::INVALID_REQUEST, reason)
    }

    fn new(status: StatusCode, id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            status,
            id,
            error: JsonRpcError {
                code,
                message: message.into(),
                data: None,
            },
        }
    }

    /// Map a bridge failure onto a JSON-RPC error, keeping the server's own
    /// code when it sent one.
    pub fn from_bridge(id: Value, err: BridgeError) -> Self {
        let message = err.to_string();
        let (code, data) = match err {
            BridgeError::ServerError { code, data, .. } => (code, data),
            BridgeError::ProtocolError { .. } => (error_codes::INTERNAL_ERROR, None),
            _ => (error_codes::SERVER_ERROR, None),
        };
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            id,
            error: JsonRpcError {
                code,
                message,
                data,
            },
        }
    }
}

impl IntoResponse for RpcFailure {
    fn into_response(self) -> Response {
        let body = json!({
            "jsonrpc": "2.0",
            "id": self.id,
            "error": self.error,
        });
        (self.status, Json(body)).into_response()
    }
}
