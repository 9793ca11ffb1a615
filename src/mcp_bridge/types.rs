//! Shared types for the bridge.
//!
//! JSON-RPC 2.0 message types and the process state machine.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// ─── JSON-RPC 2.0 ───────────────────────────────────────────────────────────

/// Id reserved for the `initialize` handshake. Call ids start at 1.
pub const HANDSHAKE_ID: u64 = 0;

/// MCP protocol revision announced in the handshake.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

/// JSON-RPC request id: numeric or string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(u64),
    String(String),
}

impl RequestId {
    /// Read an id from a decoded message.
    ///
    /// Strings holding an unsigned integer normalize to `Number` so that a
    /// server echoing `"7"` still correlates with request 7.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_u64().map(RequestId::Number),
            Value::String(s) => match s.parse::<u64>() {
                Ok(n) => Some(RequestId::Number(n)),
                Err(_) => Some(RequestId::String(s.clone())),
            },
            _ => None,
        }
    }

    pub fn is_handshake(&self) -> bool {
        matches!(self, RequestId::Number(HANDSHAKE_ID))
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestId::Number(n) => write!(f, "{n}"),
            RequestId::String(s) => write!(f, "{s}"),
        }
    }
}

/// JSON-RPC 2.0 request message.
///
/// `id` is serialized last so each line reads `{jsonrpc, method, params, id}`.
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
    pub id: RequestId,
}

impl JsonRpcRequest {
    pub fn new(id: RequestId, method: &str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params,
            id,
        }
    }
}

/// JSON-RPC 2.0 notification (a request without an id).
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcNotification {
    pub jsonrpc: String,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcNotification {
    pub fn new(method: &str, params: Option<Value>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params,
        }
    }
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    /// Interpret whatever a server put in its `error` field.
    ///
    /// Conformant servers send `{code, message}`; some send a bare string.
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::String(message) => Self {
                code: error_codes::SERVER_ERROR,
                message: message.clone(),
                data: None,
            },
            Value::Object(obj) => Self {
                code: obj
                    .get("code")
                    .and_then(Value::as_i64)
                    .unwrap_or(error_codes::SERVER_ERROR),
                message: obj
                    .get("message")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| value.to_string()),
                data: obj.get("data").cloned(),
            },
            other => Self {
                code: error_codes::SERVER_ERROR,
                message: other.to_string(),
                data: None,
            },
        }
    }
}

// ─── Process State ──────────────────────────────────────────────────────────

/// Lifecycle of the single child process.
///
/// `NotStarted → Starting` on spawn, `Starting → Ready` when the handshake
/// response arrives, `* → Exited` when the process goes away. `Exited →
/// Starting` on the next explicit start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessState {
    NotStarted,
    Starting,
    Ready,
    Exited,
}

impl ProcessState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessState::NotStarted => "not_started",
            ProcessState::Starting => "starting",
            ProcessState::Ready => "ready",
            ProcessState::Exited => "exited",
        }
    }
}

// ─── Standard Error Codes ───────────────────────────────────────────────────

/// Well-known JSON-RPC error codes.
pub mod error_codes {
    /// Invalid JSON was received.
    pub const PARSE_ERROR: i64 = -32700;
    /// The JSON sent is not a valid Request object.
    pub const INVALID_REQUEST: i64 = -32600;
    /// Invalid method parameters.
    pub const INVALID_PARAMS: i64 = -32602;
    /// Internal JSON-RPC error.
    pub const INTERNAL_ERROR: i64 = -32603;
    /// Generic server-side failure (implementation-defined range).
    pub const SERVER_ERROR: i64 = -32000;
}

// ─── Tests ───────────────────────────────────────────────────────────────────
