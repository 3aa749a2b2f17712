use std::{any::Any, panic::AssertUnwindSafe, sync::Arc, time::Instant};

use {
    futures::FutureExt,
    relay_auth::AccessControl,
    relay_channels::ChannelOutbound,
    relay_protocol::{TaskError, TaskResult},
    relay_tasks::TaskRegistry,
    tokio_util::sync::CancellationToken,
    tracing::{debug, error, info, warn},
};

use crate::{
    envelope::{Envelope, ResponseSlot},
    queue::{BusReceiver, Job, Reply},
};

/// The single consumer of the command bus and sole user of the chat session.
///
/// Jobs are processed one at a time, to completion, in enqueue order. Task
/// handlers and chat replies therefore never touch the session concurrently,
/// so handlers can use it without locking.
pub struct Worker {
    registry: TaskRegistry,
    access: Arc<AccessControl>,
    session: Arc<dyn ChannelOutbound>,
}

impl Worker {
    pub fn new(
        registry: TaskRegistry,
        access: Arc<AccessControl>,
        session: Arc<dyn ChannelOutbound>,
    ) -> Self {
        Self {
            registry,
            access,
            session,
        }
    }

    /// Consume jobs until `shutdown` fires or every sender is dropped.
    ///
    /// Shutdown is only observed between jobs: a running handler is allowed
    /// to finish. Envelopes still queued are dropped with the receiver, which
    /// their requesters observe as `WorkerUnavailable`.
    pub async fn run(self, mut receiver: BusReceiver, shutdown: CancellationToken) {
        info!(
            tasks = self.registry.len(),
            session = self.session.id(),
            "worker loop started"
        );
        loop {
            let next = tokio::select! {
                biased;
                () = shutdown.cancelled() => {
                    info!("worker loop stopping");
                    break;
                },
                next = receiver.dequeue() => next,
            };
            match next {
                Some(Job::Task(envelope, slot)) => self.process(envelope, slot).await,
                Some(Job::Reply(reply)) => self.deliver(reply).await,
                None => {
                    info!("command bus closed, worker loop exiting");
                    break;
                },
            }
        }
    }

    /// Run one envelope and resolve its slot. Every path resolves exactly once.
    pub async fn process(&self, envelope: Envelope, slot: ResponseSlot) {
        if slot.is_abandoned() {
            debug!(envelope_id = %envelope.id, task = envelope.task(), "requester already gone");
        }
        let outcome = self.execute(&envelope).await;
        slot.resolve(outcome);
    }

    /// Send a queued chat message. Failures are logged; nobody waits on them.
    pub async fn deliver(&self, reply: Reply) {
        let send = AssertUnwindSafe(self.session.send_text(reply.chat_id, &reply.text));
        match send.catch_unwind().await {
            Ok(Ok(())) => debug!(chat_id = reply.chat_id, "reply sent"),
            Ok(Err(e)) => {
                let msg = format!("{e:#}");
                error!(chat_id = reply.chat_id, error = %msg, "failed to send reply");
            },
            Err(payload) => {
                let msg = panic_message(payload.as_ref());
                error!(chat_id = reply.chat_id, panic = %msg, "reply panicked");
            },
        }
    }

    async fn execute(&self, envelope: &Envelope) -> TaskResult {
        let task = envelope.task();

        if !self.access.check_api_access(&envelope.identity, task) {
            warn!(envelope_id = %envelope.id, task, "unauthorized task request");
            return Err(TaskError::Unauthorized(task.to_string()));
        }

        let Some(handler) = self.registry.get(task) else {
            warn!(envelope_id = %envelope.id, task, "task not found");
            return Err(TaskError::TaskNotFound(task.to_string()));
        };

        let started = Instant::now();
        let run = AssertUnwindSafe(handler.execute(&envelope.request.args)).catch_unwind();
        match run.await {
            Ok(Ok(response)) => {
                info!(
                    envelope_id = %envelope.id,
                    task,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "task completed"
                );
                Ok(response)
            },
            Ok(Err(e)) => {
                let msg = format!("{e:#}");
                error!(envelope_id = %envelope.id, task, error = %msg, "task failed");
                Err(TaskError::Failed(msg))
            },
            Err(payload) => {
                let msg = panic_message(payload.as_ref());
                error!(envelope_id = %envelope.id, task, panic = %msg, "task panicked");
                Err(TaskError::Failed(format!("task panicked: {msg}")))
            },
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
