//! MCP Bridge: the handle the HTTP layer talks to.
//!
//! Owns the single child process slot, the process state machine, the
//! pending request table and the response cache. A dispatcher task consumes
//! supervisor events: it completes the handshake, resolves pending requests
//! by id, and tears down state when the process exits.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::{Duration, Instant};

use serde::Serialize;
use serde_json::{json, Value};
use tokio::sync::{mpsc, watch, Mutex};

use super::cache::{cache_key, ResponseCache};
use super::correlator::PendingRequests;
use super::errors::BridgeError;
use super::lifecycle::{self, EventSender, ProcessEvent, ProcessEventKind, ProcessHandle};
use super::transport::{extract_result, response_id, StdinTransport};
use super::types::{JsonRpcRequest, ProcessState, RequestId, HANDSHAKE_ID, PROTOCOL_VERSION};
use crate::config::{BridgeConfig, ProcessConfig, TimeoutConfig};

// ─── Stats ───────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
struct BridgeCounters {
    calls: AtomicU64,
    cache_hits: AtomicU64,
    round_trips: AtomicU64,
    failures: AtomicU64,
    timeouts: AtomicU64,
    spawns: AtomicU64,
}

/// Point-in-time copy of the bridge counters.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BridgeStats {
    pub calls: u64,
    pub cache_hits: u64,
    pub round_trips: u64,
    pub failures: u64,
    pub timeouts: u64,
    pub spawns: u64,
}

/// Process and correlator state for `/status`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessSnapshot {
    pub state: ProcessState,
    pub pid: Option<u32>,
    pub generation: u64,
    pub pending_requests: usize,
    pub cache_entries: usize,
    pub credential_configured: bool,
    pub command: String,
}

// ─── Shared State ────────────────────────────────────────────────────────────

/// State shared between the bridge and its dispatcher task.
struct Shared {
    handle: Mutex<Option<ProcessHandle>>,
    state: watch::Sender<ProcessState>,
    generation: AtomicU64,
    pending: PendingRequests,
    /// Result of the last successful `initialize`.
    server_info: StdMutex<Option<Value>>,
}

impl Shared {
    fn current_generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    fn set_state(&self, next: ProcessState) {
        let previous = self.state.send_replace(next);
        if previous != next {
            tracing::info!(from = previous.as_str(), to = next.as_str(), "process state changed");
        }
    }

    async fn transport(&self) -> Option<Arc<StdinTransport>> {
        self.handle.lock().await.as_ref().map(ProcessHandle::transport)
    }
}

// ─── McpBridge ───────────────────────────────────────────────────────────────

/// Cloneable handle to the bridge. All clones share one child process.
#[derive(Clone)]
pub struct McpBridge {
    shared: Arc<Shared>,
    events: EventSender,
    process: Arc<ProcessConfig>,
    timeouts: Arc<TimeoutConfig>,
    cache: Arc<ResponseCache>,
    next_id: Arc<AtomicU64>,
    counters: Arc<BridgeCounters>,
}

impl McpBridge {
    /// Create the bridge and its dispatcher task. Must run inside a tokio
    /// runtime. No process is spawned until `start()` or the first call.
    pub fn new(config: &BridgeConfig) -> Self {
        let (state, _) = watch::channel(ProcessState::NotStarted);
        let shared = Arc::new(Shared {
            handle: Mutex::new(None),
            state,
            generation: AtomicU64::new(0),
            pending: PendingRequests::new(),
            server_info: StdMutex::new(None),
        });

        let (events, events_rx) = mpsc::unbounded_channel();
        tokio::spawn(dispatch_events(Arc::clone(&shared), events_rx));

        Self {
            shared,
            events,
            process: Arc::new(config.process.clone()),
            timeouts: Arc::new(config.timeouts.clone()),
            cache: Arc::new(ResponseCache::new(config.cache.ttl())),
            next_id: Arc::new(AtomicU64::new(HANDSHAKE_ID + 1)),
            counters: Arc::new(BridgeCounters::default()),
        }
    }

    // ─── Lifecycle ───────────────────────────────────────────────────────

    /// Spawn the child process unless one is already tracked.
    pub async fn start(&self) -> Result<(), BridgeError> {
        let mut slot = self.shared.handle.lock().await;
        if slot.is_some() {
            return Ok(());
        }

        let generation = self.shared.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.shared.set_state(ProcessState::Starting);

        let handle = match lifecycle::spawn_process(
            &self.process,
            generation,
            self.timeouts.shutdown_timeout(),
            self.events.clone(),
        ) {
            Ok(handle) => handle,
            Err(e) => {
                tracing::error!(generation, error = %e, "failed to start MCP server");
                self.shared.set_state(ProcessState::Exited);
                return Err(e);
            }
        };

        self.counters.spawns.fetch_add(1, Ordering::Relaxed);
        let transport = handle.transport();
        *slot = Some(handle);
        drop(slot);

        self.arm_handshake(generation, transport);
        Ok(())
    }

    /// Send `initialize` after the handshake delay, unless the process has
    /// become ready or been replaced in the meantime.
    fn arm_handshake(&self, generation: u64, transport: Arc<StdinTransport>) {
        let shared = Arc::clone(&self.shared);
        let delay = self.timeouts.handshake_delay();

        tokio::spawn(async move {
            tokio::time::sleep(delay).await;

            if shared.current_generation() != generation
                || *shared.state.borrow() != ProcessState::Starting
            {
                return;
            }

            let request = JsonRpcRequest::new(
                RequestId::Number(HANDSHAKE_ID),
                "initialize",
                Some(json!({
                    "protocolVersion": PROTOCOL_VERSION,
                    "capabilities": {},
                    "clientInfo": {
                        "name": env!("CARGO_PKG_NAME"),
                        "version": env!("CARGO_PKG_VERSION"),
                    },
                })),
            );

            tracing::debug!(generation, "sending initialize handshake");
            if let Err(e) = transport.send_request(&request).await {
                tracing::warn!(generation, error = %e, "failed to send initialize handshake");
            }
        });
    }

    /// Stop the child process, if any, and wait for it to be gone.
    pub async fn shutdown(&self) {
        let handle = self.shared.handle.lock().await.take();
        let Some(handle) = handle else {
            return;
        };

        tracing::info!(generation = handle.generation, "stopping MCP server");
        handle.terminate().await;

        let mut state = self.subscribe_state();
        let bound = self.timeouts.shutdown_timeout() + Duration::from_secs(1);
        if tokio::time::timeout(bound, state.wait_for(|s| *s == ProcessState::Exited))
            .await
            .is_err()
        {
            tracing::warn!("MCP server did not report exit during shutdown");
        }
    }

    /// Poll until the process is ready, starting it if needed.
    pub async fn ensure_ready(&self) -> Result<(), BridgeError> {
        if self.state() == ProcessState::Ready {
            return Ok(());
        }

        self.start().await?;

        let interval = self.timeouts.ready_poll_interval();
        let attempts = self.timeouts.ready_poll_attempts;
        let started = Instant::now();

        for _ in 0..attempts {
            match self.state() {
                ProcessState::Ready => return Ok(()),
                ProcessState::Exited => {
                    return Err(BridgeError::ProcessExited {
                        reason: "process exited before becoming ready".into(),
                    })
                }
                ProcessState::NotStarted | ProcessState::Starting => {
                    tokio::time::sleep(interval).await
                }
            }
        }

        match self.state() {
            ProcessState::Ready => Ok(()),
            _ => Err(BridgeError::NotReady {
                attempts,
                waited_ms: started.elapsed().as_millis() as u64,
            }),
        }
    }

    // ─── Calls ───────────────────────────────────────────────────────────

    /// Send one JSON-RPC request and wait for its response.
    pub async fn call(&self, method: &str, params: Option<Value>) -> Result<Value, BridgeError> {
        self.counters.calls.fetch_add(1, Ordering::Relaxed);
        let outcome = self.round_trip(method, params).await;
        self.record_outcome(method, &outcome);
        outcome
    }

    /// Like `call`, but served from the cache while a fresh entry exists.
    /// Only successful results are stored.
    pub async fn call_cached(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<Value, BridgeError> {
        let key = cache_key(method, params.as_ref());
        if let Some(hit) = self.cache.get(&key) {
            self.counters.calls.fetch_add(1, Ordering::Relaxed);
            self.counters.cache_hits.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(method, "served from cache");
            return Ok(hit);
        }

        let result = self.call(method, params).await?;
        self.cache.put(key, result.clone());
        Ok(result)
    }

    /// Forward a notification; no response is expected.
    pub async fn notify(&self, method: &str, params: Option<Value>) -> Result<(), BridgeError> {
        self.ensure_ready().await?;
        let transport = self
            .shared
            .transport()
            .await
            .ok_or_else(|| BridgeError::ProcessExited {
                reason: "process is no longer running".into(),
            })?;
        transport.send_notification(method, params).await
    }

    async fn round_trip(&self, method: &str, params: Option<Value>) -> Result<Value, BridgeError> {
        self.ensure_ready().await?;

        let id = RequestId::Number(self.next_id.fetch_add(1, Ordering::SeqCst));
        let request = JsonRpcRequest::new(id.clone(), method, params);

        // Register before writing so a fast response cannot be missed.
        let receiver = self.shared.pending.register(id.clone(), method)?;

        let Some(transport) = self.shared.transport().await else {
            self.shared.pending.cancel(&id);
            return Err(BridgeError::ProcessExited {
                reason: "process is no longer running".into(),
            });
        };

        if let Err(e) = transport.send_request(&request).await {
            self.shared.pending.cancel(&id);
            return Err(e);
        }
        self.counters.round_trips.fetch_add(1, Ordering::Relaxed);
        tracing::debug!(id = %id, method, "request sent");

        self.shared
            .pending
            .wait(&id, method, receiver, self.timeouts.request_timeout())
            .await
    }

    fn record_outcome(&self, method: &str, outcome: &Result<Value, BridgeError>) {
        let Err(e) = outcome else {
            return;
        };
        self.counters.failures.fetch_add(1, Ordering::Relaxed);
        if matches!(e, BridgeError::Timeout { .. }) {
            self.counters.timeouts.fetch_add(1, Ordering::Relaxed);
        }
        tracing::warn!(
            method,
            kind = e.kind(),
            category = e.category().as_str(),
            error = %e,
            "MCP call failed"
        );
    }

    // ─── Status ──────────────────────────────────────────────────────────

    pub fn state(&self) -> ProcessState {
        *self.shared.state.borrow()
    }

    /// Watch state transitions.
    pub fn subscribe_state(&self) -> watch::Receiver<ProcessState> {
        self.shared.state.subscribe()
    }

    /// The `initialize` result of the current process, once ready.
    pub fn server_info(&self) -> Option<Value> {
        self.shared
            .server_info
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn stats(&self) -> BridgeStats {
        let c = &self.counters;
        BridgeStats {
            calls: c.calls.load(Ordering::Relaxed),
            cache_hits: c.cache_hits.load(Ordering::Relaxed),
            round_trips: c.round_trips.load(Ordering::Relaxed),
            failures: c.failures.load(Ordering::Relaxed),
            timeouts: c.timeouts.load(Ordering::Relaxed),
            spawns: c.spawns.load(Ordering::Relaxed),
        }
    }

    /// Never waits: a busy handle slot just reports no pid.
    pub fn snapshot(&self) -> ProcessSnapshot {
        let pid = self
            .shared
            .handle
            .try_lock()
            .ok()
            .and_then(|slot| slot.as_ref().and_then(|h| h.pid));

        ProcessSnapshot {
            state: self.state(),
            pid,
            generation: self.shared.current_generation(),
            pending_requests: self.shared.pending.len(),
            cache_entries: self.cache.len(),
            credential_configured: self.process.has_credential(),
            command: self.process.display_command(),
        }
    }
}

// ─── Dispatcher ──────────────────────────────────────────────────────────────

/// Consume supervisor events until every sender is gone.
async fn dispatch_events(shared: Arc<Shared>, mut events: mpsc::UnboundedReceiver<ProcessEvent>) {
    while let Some(event) = events.recv().await {
        let current = shared.current_generation();
        if event.generation != current {
            tracing::debug!(
                event_generation = event.generation,
                current_generation = current,
                "dropping event from a previous process"
            );
            continue;
        }

        match event.kind {
            ProcessEventKind::Message(message) => {
                handle_message(&shared, event.generation, message).await
            }
            ProcessEventKind::Exited { reason } => {
                handle_exit(&shared, event.generation, &reason).await
            }
        }
    }
}

async fn handle_message(shared: &Shared, generation: u64, message: Value) {
    let Some(id) = response_id(&message) else {
        match message.get("method").and_then(Value::as_str) {
            Some(method) => {
                tracing::debug!(generation, method, "ignoring message initiated by the server")
            }
            None => tracing::debug!(generation, "ignoring message without a usable id"),
        }
        return;
    };

    if id.is_handshake() {
        handle_handshake_response(shared, generation, message).await;
        return;
    }

    let outcome = extract_result(message);
    if !shared.pending.complete(&id, outcome) {
        tracing::debug!(generation, id = %id, "no pending request for response id");
    }
}

async fn handle_handshake_response(shared: &Shared, generation: u64, message: Value) {
    // Holding the slot keeps a concurrent start() from replacing the process
    // while the state is updated.
    let slot = shared.handle.lock().await;
    let Some(handle) = slot.as_ref().filter(|h| h.generation == generation) else {
        tracing::debug!(generation, "handshake response for a process no longer tracked");
        return;
    };
    if *shared.state.borrow() != ProcessState::Starting {
        tracing::debug!(generation, "ignoring duplicate handshake response");
        return;
    }

    let result = match extract_result(message) {
        Ok(result) => result,
        Err(e) => {
            tracing::warn!(generation, error = %e, "initialize handshake rejected");
            return;
        }
    };

    if let Err(e) = handle
        .transport()
        .send_notification("notifications/initialized", None)
        .await
    {
        tracing::warn!(generation, error = %e, "failed to send initialized notification");
    }

    let server = result.get("serverInfo").cloned().unwrap_or_default();
    tracing::info!(generation, server = %server, "MCP server ready");
    *shared
        .server_info
        .lock()
        .unwrap_or_else(PoisonError::into_inner) = Some(result);
    shared.set_state(ProcessState::Ready);
}

async fn handle_exit(shared: &Shared, generation: u64, reason: &str) {
    let mut slot = shared.handle.lock().await;
    if shared.current_generation() != generation {
        return;
    }
    if slot.as_ref().is_some_and(|h| h.generation == generation) {
        *slot = None;
    }
    *shared
        .server_info
        .lock()
        .unwrap_or_else(PoisonError::into_inner) = None;
    shared.set_state(ProcessState::Exited);
    drop(slot);

    let rejected = shared.pending.fail_all(reason);
    if rejected > 0 {
        tracing::warn!(generation, rejected, "rejected pending requests after process exit");
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::mcp_bridge::test_support::{mock_config, MockServer};

    #[tokio::test]
    async fn test_new_bridge_is_idle() {
        let bridge = McpBridge::new(&mock_config(MockServer::Echo, None));
        assert_eq!(bridge.state(), ProcessState::NotStarted);
        assert_eq!(bridge.snapshot().generation, 0);
        assert_eq!(bridge.stats().spawns, 0);
    }

    #[tokio::test]
    async fn test_call_starts_process_and_returns_result() {
        let bridge = McpBridge::new(&mock_config(MockServer::Echo, None));

        let result = bridge.call("tools/list", Some(json!({}))).await.unwrap();

        assert_eq!(result["tools"][0]["name"], "search_contacts");
        assert_eq!(bridge.state(), ProcessState::Ready);
        assert!(bridge.server_info().is_some());
        assert_eq!(bridge.stats().round_trips, 1);
        assert_eq!(bridge.snapshot().pending_requests, 0);
        bridge.shutdown().await;
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let bridge = McpBridge::new(&mock_config(MockServer::Echo, None));
        let (a, b) = tokio::join!(bridge.start(), bridge.start());
        a.unwrap();
        b.unwrap();
        bridge.start().await.unwrap();

        assert_eq!(bridge.stats().spawns, 1);
        assert_eq!(bridge.snapshot().generation, 1);
        bridge.shutdown().await;
    }

    #[tokio::test]
    async fn test_cached_calls_hit_child_once() {
        let dir = tempfile::tempdir().unwrap();
        let counter = dir.path().join("invocations");
        let bridge = McpBridge::new(&mock_config(MockServer::Echo, Some(&counter)));

        let first = bridge.call_cached("tools/list", Some(json!({}))).await.unwrap();
        let second = bridge.call_cached("tools/list", Some(json!({}))).await.unwrap();

        assert_eq!(first, second);
        let invocations = std::fs::read_to_string(&counter).unwrap();
        assert_eq!(invocations.lines().count(), 1);
        assert_eq!(bridge.stats().cache_hits, 1);
        bridge.shutdown().await;
    }

    #[tokio::test]
    async fn test_server_error_is_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        let counter = dir.path().join("invocations");
        let bridge = McpBridge::new(&mock_config(MockServer::Echo, Some(&counter)));
        let params = json!({"name": "fail", "arguments": {}});

        for _ in 0..2 {
            let err = bridge
                .call_cached("tools/call", Some(params.clone()))
                .await
                .unwrap_err();
            match err {
                BridgeError::ServerError { message, .. } => assert_eq!(message, "Unknown tool"),
                other => panic!("expected ServerError, got {other:?}"),
            }
        }

        let invocations = std::fs::read_to_string(&counter).unwrap();
        assert_eq!(invocations.lines().count(), 2);
        bridge.shutdown().await;
    }

    #[tokio::test]
    async fn test_stray_response_ids_are_ignored() {
        let bridge = McpBridge::new(&mock_config(MockServer::StrayIdsFirst, None));

        let result = bridge.call("tools/list", Some(json!({}))).await.unwrap();

        assert_eq!(result["tools"][0]["name"], "search_contacts");
        bridge.shutdown().await;
    }

    #[tokio::test]
    async fn test_server_requests_are_not_taken_as_responses() {
        let bridge = McpBridge::new(&mock_config(MockServer::ServerRequestFirst, None));

        let first = bridge.call_cached("tools/list", Some(json!({}))).await.unwrap();
        assert_eq!(first["tools"][0]["name"], "search_contacts");
        assert!(first.get("method").is_none());

        // The handshake also waited for the real initialize answer.
        let info = bridge.server_info().unwrap();
        assert_eq!(info["serverInfo"]["name"], "mock-crm");

        let cached = bridge.call_cached("tools/list", Some(json!({}))).await.unwrap();
        assert_eq!(cached, first);
        bridge.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_with_pending_call_exits_cleanly() {
        let mut config = mock_config(MockServer::SilentAfterHandshake, None);
        config.timeouts.shutdown_timeout_ms = 2_000;
        config.timeouts.request_timeout_ms = 30_000;
        let bridge = McpBridge::new(&config);

        bridge.start().await.unwrap();
        let mut state = bridge.subscribe_state();
        tokio::time::timeout(
            Duration::from_secs(5),
            state.wait_for(|s| *s == ProcessState::Ready),
        )
        .await
        .unwrap()
        .unwrap();

        let in_flight = {
            let bridge = bridge.clone();
            tokio::spawn(async move { bridge.call("tools/list", Some(json!({}))).await })
        };
        while bridge.snapshot().pending_requests == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let started = Instant::now();
        bridge.shutdown().await;
        assert!(
            started.elapsed() < Duration::from_millis(1_500),
            "shutdown took {:?}",
            started.elapsed()
        );

        match in_flight.await.unwrap().unwrap_err() {
            BridgeError::ProcessExited { reason } => {
                assert!(!reason.contains("signal"), "child was killed: {reason}")
            }
            other => panic!("expected ProcessExited, got {other:?}"),
        }
        assert_eq!(bridge.state(), ProcessState::Exited);
    }

    #[tokio::test]
    async fn test_missing_response_times_out() {
        let mut config = mock_config(MockServer::SilentAfterHandshake, None);
        config.timeouts.request_timeout_ms = 200;
        let bridge = McpBridge::new(&config);

        let started = Instant::now();
        let err = bridge.call("tools/list", Some(json!({}))).await.unwrap_err();

        assert!(matches!(err, BridgeError::Timeout { timeout_ms: 200, .. }));
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(bridge.snapshot().pending_requests, 0);
        assert_eq!(bridge.stats().timeouts, 1);
        bridge.shutdown().await;
    }

    #[tokio::test]
    async fn test_immediate_exit_fails_call_with_process_exit() {
        let config = mock_config(MockServer::ExitImmediately, None);
        let bound = config.timeouts.request_timeout();
        let bridge = McpBridge::new(&config);

        let started = Instant::now();
        let err = bridge.call("tools/list", Some(json!({}))).await.unwrap_err();

        assert!(matches!(err, BridgeError::ProcessExited { .. }), "got {err:?}");
        assert!(err.to_string().contains("exited"));
        assert!(started.elapsed() < bound);
        assert_eq!(bridge.state(), ProcessState::Exited);
    }

    #[tokio::test]
    async fn test_exit_mid_flight_rejects_pending() {
        let bridge = McpBridge::new(&mock_config(MockServer::ExitOnToolCall, None));

        let err = bridge
            .call("tools/call", Some(json!({"name": "search_contacts", "arguments": {}})))
            .await
            .unwrap_err();

        assert!(matches!(err, BridgeError::ProcessExited { .. }), "got {err:?}");
        assert_eq!(bridge.snapshot().pending_requests, 0);

        // The slot was cleared, so the next call spawns a fresh process.
        let result = bridge.call("tools/list", Some(json!({}))).await.unwrap();
        assert_eq!(result["tools"][0]["name"], "search_contacts");
        assert_eq!(bridge.snapshot().generation, 2);
        bridge.shutdown().await;
    }

    #[tokio::test]
    async fn test_never_ready_child_reports_not_ready() {
        let mut config = mock_config(MockServer::NeverReady, None);
        config.timeouts.ready_poll_interval_ms = 10;
        config.timeouts.ready_poll_attempts = 5;
        let bridge = McpBridge::new(&config);

        let err = bridge.call("tools/list", None).await.unwrap_err();

        assert!(matches!(err, BridgeError::NotReady { attempts: 5, .. }), "got {err:?}");
        assert_eq!(bridge.state(), ProcessState::Starting);
        bridge.shutdown().await;
        assert_eq!(bridge.state(), ProcessState::Exited);
    }

    #[tokio::test]
    async fn test_spawn_failure_surfaces_and_allows_retry() {
        let mut config = mock_config(MockServer::Echo, None);
        config.process.command = "/nonexistent/crm-mcp".into();
        let bridge = McpBridge::new(&config);

        let err = bridge.call("tools/list", None).await.unwrap_err();
        assert!(matches!(err, BridgeError::SpawnFailed { .. }));
        assert_eq!(bridge.state(), ProcessState::Exited);

        let err = bridge.call("tools/list", None).await.unwrap_err();
        assert!(matches!(err, BridgeError::SpawnFailed { .. }));
        assert_eq!(bridge.stats().failures, 2);
    }

    #[tokio::test]
    async fn test_concurrent_calls_each_resolve_once() {
        let bridge = McpBridge::new(&mock_config(MockServer::Echo, None));
        bridge.start().await.unwrap();

        let calls: Vec<_> = (0..8)
            .map(|i| {
                let bridge = bridge.clone();
                tokio::spawn(async move {
                    bridge
                        .call("tools/call", Some(json!({"name": "echo", "arguments": {"n": i}})))
                        .await
                })
            })
            .collect();

        for call in calls {
            let result = call.await.unwrap().unwrap();
            assert_eq!(result["content"][0]["text"], "ok");
        }
        assert_eq!(bridge.snapshot().pending_requests, 0);
        bridge.shutdown().await;
    }
}
