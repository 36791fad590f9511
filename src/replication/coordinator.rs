//! Replication coordinator: keyed wait for peer acknowledgements
//!
//! Tracks in-flight mutations awaiting acks from every other member.
//! `start_operation` must run before the broadcast goes out, otherwise an
//! ack can arrive before the wait entry exists. `await_completion` blocks
//! only the calling path; the entry is removed unconditionally once the
//! wait resolves (success, partial failure or timeout), so acks arriving
//! after that are discarded.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;
use uuid::Uuid;

struct PendingOperation {
    expected: usize,
    succeeded: Mutex<HashSet<String>>,
    failed: Mutex<HashSet<String>>,
    done: Notify,
}

impl PendingOperation {
    fn new(expected: usize) -> Self {
        Self {
            expected,
            succeeded: Mutex::new(HashSet::new()),
            failed: Mutex::new(HashSet::new()),
            done: Notify::new(),
        }
    }

    fn register_ack(&self, sender_id: &str, success: bool) {
        if success {
            self.succeeded.lock().unwrap().insert(sender_id.to_string());
        } else {
            self.failed.lock().unwrap().insert(sender_id.to_string());
        }
        if self.ack_count() >= self.expected {
            self.done.notify_waiters();
        }
    }

    fn ack_count(&self) -> usize {
        self.succeeded.lock().unwrap().len() + self.failed.lock().unwrap().len()
    }

    fn all_success(&self) -> bool {
        self.failed.lock().unwrap().is_empty()
            && self.succeeded.lock().unwrap().len() >= self.expected
    }
}

#[derive(Default)]
pub struct ReplicationCoordinator {
    pending: Mutex<HashMap<Uuid, Arc<PendingOperation>>>,
}

impl ReplicationCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a wait entry for an operation expecting `expected_acks`
    /// acknowledgements. Must return before the broadcast is sent.
    pub fn start_operation(&self, operation_id: Uuid, expected_acks: usize) {
        let state = Arc::new(PendingOperation::new(expected_acks));
        self.pending.lock().unwrap().insert(operation_id, state);
    }

    /// Record one peer's acknowledgement. Acks for unknown (already
    /// resolved) operations are discarded.
    pub fn register_ack(&self, operation_id: Uuid, sender_id: &str, success: bool) {
        let state = self.pending.lock().unwrap().get(&operation_id).cloned();
        match state {
            Some(state) => state.register_ack(sender_id, success),
            None => tracing::debug!(
                "Discarding ack for resolved operation {} from {}",
                operation_id,
                sender_id
            ),
        }
    }

    /// Wait until every expected ack arrived or `timeout` elapses. Returns
    /// true only when the full count was reached and every ack reported
    /// success. The entry is removed whatever the outcome.
    pub async fn await_completion(&self, operation_id: Uuid, timeout: Duration) -> bool {
        let state = self.pending.lock().unwrap().get(&operation_id).cloned();
        let Some(state) = state else {
            return false;
        };

        let wait = async {
            loop {
                let notified = state.done.notified();
                if state.ack_count() >= state.expected {
                    return;
                }
                notified.await;
            }
        };

        let completed = tokio::time::timeout(timeout, wait).await.is_ok();
        self.pending.lock().unwrap().remove(&operation_id);
        completed && state.all_success()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().unwrap().len()
    }
}
