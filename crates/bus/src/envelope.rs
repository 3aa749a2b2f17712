use std::time::Duration;

use {
    relay_protocol::{TaskError, TaskRequest, TaskResult},
    tokio::sync::oneshot,
    tracing::warn,
    uuid::Uuid,
};

/// A task request paired with the caller that submitted it.
#[derive(Debug, Clone)]
pub struct Envelope {
    /// Correlation id, only used for logging.
    pub id: Uuid,
    pub request: TaskRequest,
    /// Credential the caller authenticated with.
    pub identity: String,
}

impl Envelope {
    pub fn new(request: TaskRequest, identity: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            request,
            identity: identity.into(),
        }
    }

    pub fn task(&self) -> &str {
        &self.request.task
    }
}

// ── Response slot ────────────────────────────────────────────────────────────

/// Write half of a single-assignment result channel. Resolving consumes the
/// slot, so it can be written at most once.
#[derive(Debug)]
pub struct ResponseSlot {
    envelope_id: Uuid,
    task: String,
    tx: oneshot::Sender<TaskResult>,
}

/// Read half, held by the requester.
#[derive(Debug)]
pub struct SlotReceiver {
    rx: oneshot::Receiver<TaskResult>,
}

/// Create a fresh slot for `envelope`.
pub fn response_slot(envelope: &Envelope) -> (ResponseSlot, SlotReceiver) {
    let (tx, rx) = oneshot::channel();
    let slot = ResponseSlot {
        envelope_id: envelope.id,
        task: envelope.request.task.clone(),
        tx,
    };
    (slot, SlotReceiver { rx })
}

impl ResponseSlot {
    /// Deliver the outcome. Returns `false` when the requester stopped
    /// waiting; the outcome is then dropped.
    pub fn resolve(self, outcome: TaskResult) -> bool {
        match self.tx.send(outcome) {
            Ok(()) => true,
            Err(outcome) => {
                warn!(
                    envelope_id = %self.envelope_id,
                    task = %self.task,
                    ok = outcome.is_ok(),
                    "late result discarded, requester no longer waiting"
                );
                false
            },
        }
    }

    /// True once the requester has given up.
    pub fn is_abandoned(&self) -> bool {
        self.tx.is_closed()
    }
}

impl SlotReceiver {
    /// Wait for the outcome, at most `timeout`.
    ///
    /// A slot dropped unresolved (worker shut down) yields `WorkerUnavailable`.
    pub async fn wait(self, timeout: Duration) -> TaskResult {
        match tokio::time::timeout(timeout, self.rx).await {
            Ok(Ok(outcome)) => outcome,
            Ok(Err(_)) => Err(TaskError::WorkerUnavailable),
            Err(_) => Err(TaskError::Timeout(timeout)),
        }
    }
}
