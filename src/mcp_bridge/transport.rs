//! Line-delimited JSON-RPC over the child's stdin.
//!
//! Writing is done here; reading lives in the lifecycle supervisor, which
//! publishes every decoded stdout line as an event.

use serde::Serialize;
use serde_json::Value;
use tokio::io::AsyncWriteExt;
use tokio::process::ChildStdin;
use tokio::sync::Mutex;

use super::errors::BridgeError;
use super::types::{JsonRpcError, JsonRpcNotification, JsonRpcRequest, RequestId};

// ─── Writer ──────────────────────────────────────────────────────────────────

/// Serialized writer over a child process's stdin.
///
/// Closing drops the pipe even while other tasks still hold the transport,
/// so the child sees EOF.
pub struct StdinTransport {
    writer: Mutex<Option<ChildStdin>>,
}

impl StdinTransport {
    pub fn new(stdin: ChildStdin) -> Self {
        Self {
            writer: Mutex::new(Some(stdin)),
        }
    }

    /// Write one JSON-RPC request line.
    pub async fn send_request(&self, request: &JsonRpcRequest) -> Result<(), BridgeError> {
        self.write_line(request).await
    }

    /// Write one JSON-RPC notification line.
    pub async fn send_notification(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<(), BridgeError> {
        self.write_line(&JsonRpcNotification::new(method, params))
            .await
    }

    /// Close stdin. Later writes fail with `TransportError`.
    pub async fn close(&self) {
        if let Some(mut stdin) = self.writer.lock().await.take() {
            let _ = stdin.shutdown().await;
        }
    }

    async fn write_line<T: Serialize>(&self, message: &T) -> Result<(), BridgeError> {
        let mut json = serde_json::to_string(message)?;
        json.push('\n');

        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or_else(|| BridgeError::TransportError {
            reason: "stdin is closed".into(),
        })?;
        writer
            .write_all(json.as_bytes())
            .await
            .map_err(|e| BridgeError::TransportError {
                reason: format!("failed to write to stdin: {e}"),
            })?;
        writer
            .flush()
            .await
            .map_err(|e| BridgeError::TransportError {
                reason: format!("failed to flush stdin: {e}"),
            })
    }
}

// ─── Response Helpers ────────────────────────────────────────────────────────

/// The correlation id of a decoded response, if it has a usable one.
///
/// Anything carrying a `method` is a request or notification from the
/// server, never a response, even when its `id` collides with ours.
pub fn response_id(message: &Value) -> Option<RequestId> {
    if message.get("method").is_some() {
        return None;
    }
    message.get("id").and_then(RequestId::from_value)
}

/// Turn a response payload into the caller's outcome.
///
/// An `error` field wins; otherwise `result` is returned, or the whole
/// payload when the server sent no `result` field at all.
pub fn extract_result(mut message: Value) -> Result<Value, BridgeError> {
    if let Some(error) = message.get("error").filter(|e| !e.is_null()) {
        let err = JsonRpcError::from_value(error);
        return Err(BridgeError::ServerError {
            code: err.code,
            message: err.message,
            data: err.data,
        });
    }

    match message.as_object_mut().and_then(|obj| obj.remove("result")) {
        Some(result) => Ok(result),
        None => Ok(message),
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
