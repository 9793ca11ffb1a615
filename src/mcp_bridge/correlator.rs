//! Pending request table.
//!
//! Maps request ids to the one-shot channel of the caller waiting for the
//! answer. An entry is resolved by whoever removes it first: the dispatcher
//! on a matching response, the caller on timeout, or the exit handler.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde_json::Value;
use tokio::sync::oneshot;

use super::errors::BridgeError;
use super::types::RequestId;

/// What a waiting caller eventually receives.
pub type Outcome = Result<Value, BridgeError>;

struct PendingRequest {
    sender: oneshot::Sender<Outcome>,
    method: String,
    created_at: Instant,
}

/// Id → waiter map with unique keys.
#[derive(Default)]
pub struct PendingRequests {
    entries: Mutex<HashMap<RequestId, PendingRequest>>,
}

impl PendingRequests {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<RequestId, PendingRequest>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register a waiter for `id`.
    ///
    /// Fails if `id` is already pending; the existing entry is left alone.
    pub fn register(
        &self,
        id: RequestId,
        method: &str,
    ) -> Result<oneshot::Receiver<Outcome>, BridgeError> {
        let mut entries = self.entries();
        if entries.contains_key(&id) {
            return Err(BridgeError::ProtocolError {
                reason: format!("request id {id} is already pending"),
            });
        }

        let (sender, receiver) = oneshot::channel();
        entries.insert(
            id,
            PendingRequest {
                sender,
                method: method.to_string(),
                created_at: Instant::now(),
            },
        );
        Ok(receiver)
    }

    /// Resolve the entry for `id`. Returns `false` if nothing was pending.
    pub fn complete(&self, id: &RequestId, outcome: Outcome) -> bool {
        let Some(entry) = self.entries().remove(id) else {
            return false;
        };

        tracing::debug!(
            id = %id,
            method = %entry.method,
            elapsed_ms = entry.created_at.elapsed().as_millis() as u64,
            ok = outcome.is_ok(),
            "resolved pending request"
        );
        // The caller may already have given up; nothing to do then.
        let _ = entry.sender.send(outcome);
        true
    }

    /// Drop the entry for `id` without resolving it.
    pub fn cancel(&self, id: &RequestId) -> bool {
        self.entries().remove(id).is_some()
    }

    /// Reject every pending entry with `ProcessExited`. Returns how many.
    pub fn fail_all(&self, reason: &str) -> usize {
        let drained: Vec<(RequestId, PendingRequest)> = self.entries().drain().collect();
        let count = drained.len();

        for (id, entry) in drained {
            tracing::debug!(id = %id, method = %entry.method, "rejecting pending request");
            let _ = entry.sender.send(Err(BridgeError::ProcessExited {
                reason: reason.to_string(),
            }));
        }
        count
    }

    /// Wait for the response to `id`, giving up after `timeout`.
    ///
    /// On timeout the entry is removed. If the dispatcher removed it first,
    /// its outcome is delivered instead of the timeout.
    pub async fn wait(
        &self,
        id: &RequestId,
        method: &str,
        mut receiver: oneshot::Receiver<Outcome>,
        timeout: Duration,
    ) -> Outcome {
        match tokio::time::timeout(timeout, &mut receiver).await {
            Ok(outcome) => outcome.unwrap_or_else(|_| Err(channel_closed())),
            Err(_) => self.expire(id, method, receiver, timeout).await,
        }
    }

    /// The deadline passed. Remove the entry and report a timeout, unless
    /// someone else already removed it; their outcome then wins.
    async fn expire(
        &self,
        id: &RequestId,
        method: &str,
        receiver: oneshot::Receiver<Outcome>,
        timeout: Duration,
    ) -> Outcome {
        if self.cancel(id) {
            return Err(BridgeError::Timeout {
                method: method.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            });
        }
        receiver.await.unwrap_or_else(|_| Err(channel_closed()))
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }
}

fn channel_closed() -> BridgeError {
    BridgeError::ProcessExited {
        reason: "response channel closed".into(),
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn id(n: u64) -> RequestId {
        RequestId::Number(n)
    }

    #[tokio::test]
    async fn test_complete_delivers_outcome() {
        let pending = PendingRequests::new();
        let rx = pending.register(id(1), "tools/list").unwrap();

        assert!(pending.complete(&id(1), Ok(json!({"tools": []}))));
        assert_eq!(rx.await.unwrap().unwrap(), json!({"tools": []}));
        assert!(pending.is_empty());
    }

    #[test]
    fn test_duplicate_id_is_rejected() {
        let pending = PendingRequests::new();
        let _rx = pending.register(id(1), "a").unwrap();
        assert!(pending.register(id(1), "b").is_err());
        assert_eq!(pending.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_id_leaves_others_untouched() {
        let pending = PendingRequests::new();
        let mut rx1 = pending.register(id(1), "a").unwrap();
        let _rx2 = pending.register(id(2), "b").unwrap();

        assert!(!pending.complete(&id(99), Ok(json!(null))));
        assert!(!pending.complete(&RequestId::String("x".into()), Ok(json!(null))));
        assert_eq!(pending.len(), 2);
        assert!(rx1.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_out_of_order_responses() {
        let pending = PendingRequests::new();
        let rx1 = pending.register(id(1), "a").unwrap();
        let rx2 = pending.register(id(2), "b").unwrap();

        assert!(pending.complete(&id(2), Ok(json!("second"))));
        assert!(pending.complete(&id(1), Ok(json!("first"))));

        assert_eq!(rx1.await.unwrap().unwrap(), json!("first"));
        assert_eq!(rx2.await.unwrap().unwrap(), json!("second"));
    }

    #[tokio::test]
    async fn test_second_resolution_is_noop() {
        let pending = PendingRequests::new();
        let rx = pending.register(id(5), "a").unwrap();

        assert!(pending.complete(&id(5), Ok(json!(1))));
        assert!(!pending.complete(&id(5), Ok(json!(2))));
        assert_eq!(rx.await.unwrap().unwrap(), json!(1));
    }

    #[tokio::test]
    async fn test_fail_all_rejects_with_process_exited() {
        let pending = PendingRequests::new();
        let rx1 = pending.register(id(1), "a").unwrap();
        let rx2 = pending.register(id(2), "b").unwrap();

        assert_eq!(pending.fail_all("exit status: 1"), 2);
        assert!(pending.is_empty());

        for rx in [rx1, rx2] {
            let err = rx.await.unwrap().unwrap_err();
            assert!(matches!(err, BridgeError::ProcessExited { .. }));
        }
    }

    #[tokio::test]
    async fn test_wait_times_out_and_removes_entry() {
        let pending = PendingRequests::new();
        let rx = pending.register(id(3), "tools/call").unwrap();

        let err = pending
            .wait(&id(3), "tools/call", rx, Duration::from_millis(20))
            .await
            .unwrap_err();

        assert!(matches!(err, BridgeError::Timeout { timeout_ms: 20, .. }));
        assert!(pending.is_empty());
        // A late response is now a no-op.
        assert!(!pending.complete(&id(3), Ok(json!(null))));
    }

    #[tokio::test]
    async fn test_wait_returns_response_before_timeout() {
        let pending = std::sync::Arc::new(PendingRequests::new());
        let rx = pending.register(id(4), "tools/list").unwrap();

        let responder = pending.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            responder.complete(&id(4), Ok(json!({"ok": true})));
        });

        let result = pending
            .wait(&id(4), "tools/list", rx, Duration::from_secs(2))
            .await
            .unwrap();
        assert_eq!(result, json!({"ok": true}));
    }

    #[tokio::test]
    async fn test_expire_after_response_already_sent() {
        let pending = PendingRequests::new();
        let rx = pending.register(id(6), "tools/list").unwrap();
        assert!(pending.complete(&id(6), Ok(json!("answer"))));

        let outcome = pending
            .expire(&id(6), "tools/list", rx, Duration::from_millis(10))
            .await;
        assert_eq!(outcome.unwrap(), json!("answer"));
    }

    #[tokio::test]
    async fn test_expire_waits_for_response_in_flight() {
        let pending = PendingRequests::new();
        let rx = pending.register(id(7), "tools/call").unwrap();

        // The dispatcher has removed the entry but not sent yet.
        let entry = pending.entries().remove(&id(7)).unwrap();
        let sender = tokio::spawn(async move {
            tokio::task::yield_now().await;
            let _ = entry.sender.send(Ok(json!("late but won")));
        });

        let outcome = pending
            .expire(&id(7), "tools/call", rx, Duration::from_millis(10))
            .await;
        assert_eq!(outcome.unwrap(), json!("late but won"));
        sender.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_response_at_deadline_resolves_exactly_once() {
        let timeout = Duration::from_millis(100);
        let pending = std::sync::Arc::new(PendingRequests::new());
        let rx = pending.register(id(8), "tools/list").unwrap();

        let responder = pending.clone();
        let completion = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            responder.complete(&id(8), Ok(json!("on time")))
        });

        let outcome = pending.wait(&id(8), "tools/list", rx, timeout).await;
        let completed = completion.await.unwrap();

        match outcome {
            Ok(value) => {
                assert!(completed);
                assert_eq!(value, json!("on time"));
            }
            Err(BridgeError::Timeout { .. }) => assert!(!completed),
            Err(other) => panic!("unexpected outcome {other:?}"),
        }
        assert!(pending.is_empty());
    }
}
