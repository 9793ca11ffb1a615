//! Bridge error types.
//!
//! Every failure a caller can observe from the child process or the
//! correlator is one of these variants. The HTTP layer decides how each one
//! is shaped on the wire.

use thiserror::Error;

/// Broad classification used in logs and HTTP error bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// The child could not be reached: not spawned, not ready, timed out, gone.
    Transport,
    /// One side produced something that is not valid JSON-RPC.
    Protocol,
    /// The child answered with an explicit `error` field.
    Application,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::Transport => "transport",
            ErrorCategory::Protocol => "protocol",
            ErrorCategory::Application => "application",
        }
    }
}

/// Errors that can occur while talking to the MCP server process.
#[derive(Debug, Error)]
pub enum BridgeError {
    /// The server process failed to start.
    #[error("failed to spawn '{command}': {reason}")]
    SpawnFailed { command: String, reason: String },

    /// The handshake did not complete within the readiness poll bound.
    #[error("MCP server not ready after {attempts} readiness checks ({waited_ms}ms)")]
    NotReady { attempts: u32, waited_ms: u64 },

    /// No response arrived for a request in time.
    #[error("request '{method}' timed out after {timeout_ms}ms")]
    Timeout { method: String, timeout_ms: u64 },

    /// The server process exited before the request completed.
    #[error("MCP server process exited: {reason}")]
    ProcessExited { reason: String },

    /// Writing to or reading from the process pipes failed.
    #[error("transport error: {reason}")]
    TransportError { reason: String },

    /// A message could not be encoded or decoded as JSON-RPC.
    #[error("protocol error: {reason}")]
    ProtocolError { reason: String },

    /// Server returned a JSON-RPC error response.
    #[error("server error [{code}]: {message}")]
    ServerError {
        code: i64,
        message: String,
        data: Option<serde_json::Value>,
    },
}

impl BridgeError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            BridgeError::ProtocolError { .. } => ErrorCategory::Protocol,
            BridgeError::ServerError { .. } => ErrorCategory::Application,
            _ => ErrorCategory::Transport,
        }
    }

    /// Short machine-readable name of the variant.
    pub fn kind(&self) -> &'static str {
        match self {
            BridgeError::SpawnFailed { .. } => "spawn_failed",
            BridgeError::NotReady { .. } => "not_ready",
            BridgeError::Timeout { .. } => "timeout",
            BridgeError::ProcessExited { .. } => "process_exited",
            BridgeError::TransportError { .. } => "transport_error",
            BridgeError::ProtocolError { .. } => "protocol_error",
            BridgeError::ServerError { .. } => "server_error",
        }
    }
}

impl From<serde_json::Error> for BridgeError {
    fn from(e: serde_json::Error) -> Self {
        BridgeError::ProtocolError {
            reason: e.to_string(),
        }
    }
}
