//! Route handlers.

use std::any::Any;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Request, State};
use axum::http::{header, Method, StatusCode, Uri};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::Utc;
use serde_json::{json, Map, Value};

use super::errors::{ApiError, RpcFailure};
use super::state::AppState;

pub const SERVICE_NAME: &str = env!("CARGO_PKG_NAME");
pub const SERVICE_VERSION: &str = env!("CARGO_PKG_VERSION");

type SharedState = State<Arc<AppState>>;

// ─── Liveness ────────────────────────────────────────────────────────────

/// Never touches the bridge, so it stays fast while the child is busy.
pub async fn health(State(state): SharedState) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": SERVICE_NAME,
        "version": SERVICE_VERSION,
        "timestamp": Utc::now().to_rfc3339(),
        "uptimeSec": state.uptime_secs(),
    }))
}

pub async fn status(State(state): SharedState) -> Json<Value> {
    let process = state.bridge.snapshot();
    Json(json!({
        "status": "ok",
        "service": SERVICE_NAME,
        "version": SERVICE_VERSION,
        "startedAt": state.started_at().to_rfc3339(),
        "uptimeSec": state.uptime_secs(),
        "credentialConfigured": process.credential_configured,
        "process": process,
        "bridge": state.bridge.stats(),
        "requests": state.stats.snapshot(),
    }))
}

pub async fn api_index() -> Json<Value> {
    Json(json!({
        "service": SERVICE_NAME,
        "version": SERVICE_VERSION,
        "endpoints": [
            { "method": "GET", "path": "/health", "description": "Liveness check" },
            { "method": "GET", "path": "/status", "description": "Process and bridge counters" },
            { "method": "GET", "path": "/api/tools", "description": "List the MCP server's tools" },
            { "method": "POST", "path": "/api/call", "description": "Invoke a tool: {\"name\": ..., \"arguments\": {...}}" },
            { "method": "POST", "path": "/mcp", "description": "Raw JSON-RPC passthrough" },
        ],
    }))
}

// ─── Tools ───────────────────────────────────────────────────────────────

pub async fn list_tools(State(state): SharedState) -> Result<Json<Value>, ApiError> {
    state.stats.record_tool_call();
    let result = state
        .bridge
        .call_cached("tools/list", Some(Value::Object(Map::new())))
        .await?;
    Ok(Json(result))
}

pub async fn call_tool(State(state): SharedState, body: Bytes) -> Result<Json<Value>, ApiError> {
    let params = parse_tool_call(&body)?;
    state.stats.record_tool_call();
    let result = state.bridge.call_cached("tools/call", Some(params)).await?;
    Ok(Json(result))
}

/// The body must be an object naming the tool; it is forwarded unchanged as
/// the `tools/call` params.
fn parse_tool_call(body: &[u8]) -> Result<Value, ApiError> {
    let value: Value = serde_json::from_slice(body)
        .map_err(|e| ApiError::BadRequest(format!("invalid JSON body: {e}")))?;

    if !value.is_object() {
        return Err(ApiError::BadRequest(
            "request body must be a JSON object".into(),
        ));
    }
    let named = value
        .get("name")
        .and_then(Value::as_str)
        .is_some_and(|name| !name.is_empty());
    if !named {
        return Err(ApiError::BadRequest(
            "request body must include a string \"name\"".into(),
        ));
    }
    Ok(value)
}

// ─── JSON-RPC passthrough ────────────────────────────────────────────────

pub async fn json_rpc(State(state): SharedState, body: Bytes) -> Response {
    match handle_json_rpc(&state, &body).await {
        Ok(response) => response,
        Err(failure) => {
            tracing::debug!(code = failure.error.code, message = %failure.error.message, "JSON-RPC request failed");
            failure.into_response()
        }
    }
}

async fn handle_json_rpc(state: &AppState, body: &[u8]) -> Result<Response, RpcFailure> {
    let message: Value = serde_json::from_slice(body)
        .map_err(|e| RpcFailure::parse_error(format!("Parse error: {e}")))?;

    let Value::Object(mut message) = message else {
        return Err(RpcFailure::invalid_request(
            Value::Null,
            "request must be a JSON object",
        ));
    };

    let id = message.remove("id");
    let Some(Value::String(method)) = message.remove("method") else {
        return Err(RpcFailure::invalid_request(
            id.unwrap_or(Value::Null),
            "request must include a string \"method\"",
        ));
    };
    let params = message.remove("params");

    let Some(id) = id else {
        state
            .bridge
            .notify(&method, params)
            .await
            .map_err(|e| RpcFailure::from_bridge(Value::Null, e))?;
        return Ok(StatusCode::ACCEPTED.into_response());
    };

    // The bridge already ran initialize against the child; replay its answer.
    let result = if method == "initialize" {
        state
            .bridge
            .ensure_ready()
            .await
            .map_err(|e| RpcFailure::from_bridge(id.clone(), e))?;
        state.bridge.server_info().unwrap_or_else(|| json!({}))
    } else {
        if method == "tools/call" {
            state.stats.record_tool_call();
        }
        state
            .bridge
            .call_cached(&method, params)
            .await
            .map_err(|e| RpcFailure::from_bridge(id.clone(), e))?
    };

    Ok(Json(json!({
        "jsonrpc": "2.0",
        "id": id,
        "result": result,
    }))
    .into_response())
}

// ─── Fallbacks and middleware ────────────────────────────────────────────

pub async fn not_found(uri: Uri) -> (StatusCode, Json<Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "error": "Not found", "path": uri.path() })),
    )
}

/// Count every request, and every error response.
pub async fn track_requests(State(state): SharedState, request: Request, next: Next) -> Response {
    state.stats.record_request();
    let response = next.run(request).await;
    if response.status().is_client_error() || response.status().is_server_error() {
        state.stats.record_error();
    }
    response
}

/// Answer any OPTIONS request with 204, preflight headers or not.
pub async fn preflight(request: Request, next: Next) -> Response {
    if request.method() != Method::OPTIONS {
        return next.run(request).await;
    }

    (
        StatusCode::NO_CONTENT,
        [
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
            (header::ACCESS_CONTROL_ALLOW_METHODS, "GET, POST, OPTIONS"),
            (header::ACCESS_CONTROL_ALLOW_HEADERS, "Content-Type, Authorization"),
        ],
    )
        .into_response()
}

pub fn handle_panic(panic: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };
    tracing::error!(panic = %detail, "request handler panicked");

    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "error": "Internal server error" })),
    )
        .into_response()
}
