//! MCP Bridge: JSON-RPC over stdio to a single MCP server child process.
//!
//! This module handles:
//! - Spawning the server with the CRM credential injected, and stopping it
//! - The `initialize` handshake and the process state machine
//! - Correlating responses to requests by id, with per-request timeouts
//! - Caching successful results for a fixed time
//!
//! Restarting a crashed server is left to the next call: the slot is cleared
//! on exit and the following `start()` spawns a fresh process.

pub mod cache;
pub mod client;
pub mod correlator;
pub mod errors;
pub mod lifecycle;
pub mod transport;
pub mod types;

#[cfg(test)]
pub(crate) mod test_support;

// Re-exports for convenience
pub use client::{BridgeStats, McpBridge, ProcessSnapshot};
pub use errors::{BridgeError, ErrorCategory};
pub use types::{ProcessState, RequestId};
