//! Shared state for HTTP handlers.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::mcp_bridge::McpBridge;

/// Inbound request counters.
#[derive(Debug, Default)]
pub struct RequestStats {
    total: AtomicU64,
    tool_calls: AtomicU64,
    errors: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestStatsSnapshot {
    pub total: u64,
    pub tool_calls: u64,
    pub errors: u64,
}

impl RequestStats {
    pub fn record_request(&self) {
        self.total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_tool_call(&self) {
        self.tool_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> RequestStatsSnapshot {
        RequestStatsSnapshot {
            total: self.total.load(Ordering::Relaxed),
            tool_calls: self.tool_calls.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// Everything a handler can reach.
pub struct AppState {
    pub bridge: McpBridge,
    pub stats: RequestStats,
    started_at: Instant,
    started_at_wall: DateTime<Utc>,
}

impl AppState {
    pub fn new(bridge: McpBridge) -> Self {
        Self {
            bridge,
            stats: RequestStats::default(),
            started_at: Instant::now(),
            started_at_wall: Utc::now(),
        }
    }

    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at_wall
    }
}
