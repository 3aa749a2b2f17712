use std::time::Duration;

use {
    relay_protocol::{TaskError, TaskResult},
    tokio::sync::mpsc,
    tracing::debug,
};

use crate::envelope::{Envelope, ResponseSlot, SlotReceiver, response_slot};

/// Unit of work drained by the worker loop.
#[derive(Debug)]
pub enum Job {
    /// A task request from the gateway and the slot its caller waits on.
    Task(Envelope, ResponseSlot),
    /// A chat message to deliver through the session.
    Reply(Reply),
}

/// Text to send to a chat, e.g. the answer to a bot command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub chat_id: i64,
    pub text: String,
}

/// Create the command bus: unbounded, FIFO, one consumer.
pub fn channel() -> (BusSender, BusReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (BusSender { tx }, BusReceiver { rx })
}

/// Producer handle, cloned into every request handler and the poller.
#[derive(Debug, Clone)]
pub struct BusSender {
    tx: mpsc::UnboundedSender<Job>,
}

impl BusSender {
    /// Queue `envelope` behind everything already queued. Never blocks; fails
    /// only when the worker loop has gone away.
    pub fn enqueue(&self, envelope: Envelope) -> Result<SlotReceiver, TaskError> {
        let (slot, receiver) = response_slot(&envelope);
        debug!(envelope_id = %envelope.id, task = envelope.task(), "enqueue task");
        self.tx
            .send(Job::Task(envelope, slot))
            .map_err(|_| TaskError::WorkerUnavailable)?;
        Ok(receiver)
    }

    /// Enqueue and wait for the outcome, at most `timeout`. On timeout the
    /// task stays queued or running; its eventual result is discarded.
    pub async fn submit(&self, envelope: Envelope, timeout: Duration) -> TaskResult {
        self.enqueue(envelope)?.wait(timeout).await
    }

    /// Queue a chat message. It is sent by the worker in turn, never
    /// alongside a running task.
    pub fn reply(&self, chat_id: i64, text: impl Into<String>) -> Result<(), TaskError> {
        debug!(chat_id, "enqueue reply");
        self.tx
            .send(Job::Reply(Reply {
                chat_id,
                text: text.into(),
            }))
            .map_err(|_| TaskError::WorkerUnavailable)
    }
}

/// Consumer handle, owned by the worker loop.
#[derive(Debug)]
pub struct BusReceiver {
    rx: mpsc::UnboundedReceiver<Job>,
}

impl BusReceiver {
    /// Next job in enqueue order, or `None` once every sender is gone.
    pub async fn dequeue(&mut self) -> Option<Job> {
        self.rx.recv().await
    }
}
