//! Worker loop behaviour: ordering, exclusivity, error containment, chat
//! replies and shutdown.

use std::{
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use {
    async_trait::async_trait,
    relay_auth::{AccessControl, CredentialStore, Namespace},
    relay_bus::{BusSender, Envelope, Worker, channel},
    relay_channels::{RecordingOutbound, SentMessage},
    relay_config::RoleTables,
    relay_protocol::{Args, TaskError, TaskRequest, TaskResponse},
    relay_tasks::{TaskHandler, TaskRegistry},
    tokio::task::JoinHandle,
    tokio_util::sync::CancellationToken,
};

const ADMIN: &str = "admin-key";
const LIMITED: &str = "limited-key";
const WAIT: Duration = Duration::from_secs(5);

// ── Test handlers ────────────────────────────────────────────────────────────

/// Records the `seq` argument of every call, in execution order.
struct Record {
    seen: Arc<Mutex<Vec<u64>>>,
}

#[async_trait]
impl TaskHandler for Record {
    fn name(&self) -> &str {
        "record"
    }

    async fn execute(&self, args: &Args) -> anyhow::Result<TaskResponse> {
        let seq = args
            .get("seq")
            .and_then(|v| v.as_u64())
            .ok_or_else(|| anyhow::anyhow!("missing seq"))?;
        self.seen.lock().unwrap().push(seq);
        Ok(TaskResponse::message("recorded").with_data("seq", seq))
    }
}

/// Sleeps while tracking how many executions overlap.
struct Slow {
    current: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    calls: Arc<AtomicUsize>,
    delay: Duration,
}

#[async_trait]
impl TaskHandler for Slow {
    fn name(&self) -> &str {
        "slow"
    }

    async fn execute(&self, _args: &Args) -> anyhow::Result<TaskResponse> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        self.current.fetch_sub(1, Ordering::SeqCst);
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(TaskResponse::message("done"))
    }
}

struct Fails;

#[async_trait]
impl TaskHandler for Fails {
    fn name(&self) -> &str {
        "fails"
    }

    async fn execute(&self, _args: &Args) -> anyhow::Result<TaskResponse> {
        anyhow::bail!("session expired")
    }
}

struct Panics;

#[async_trait]
impl TaskHandler for Panics {
    fn name(&self) -> &str {
        "panics"
    }

    async fn execute(&self, _args: &Args) -> anyhow::Result<TaskResponse> {
        panic!("handler blew up")
    }
}

// ── Harness ──────────────────────────────────────────────────────────────────

struct Harness {
    bus: BusSender,
    shutdown: CancellationToken,
    worker: JoinHandle<()>,
    seen: Arc<Mutex<Vec<u64>>>,
    current: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    slow_calls: Arc<AtomicUsize>,
    session: Arc<RecordingOutbound>,
}

fn access() -> Arc<AccessControl> {
    let mut roles = RoleTables::default();
    roles.api_roles.insert("ops".into(), vec!["*".into()]);
    roles
        .api_roles
        .insert("limited".into(), vec!["record".into()]);
    let creds = CredentialStore::new()
        .with_binding(Namespace::Api, ADMIN, "ops")
        .with_binding(Namespace::Api, LIMITED, "limited");
    Arc::new(AccessControl::new(creds, roles))
}

fn start(slow_delay: Duration) -> Harness {
    start_with_session(slow_delay, RecordingOutbound::new())
}

fn start_with_session(slow_delay: Duration, session: RecordingOutbound) -> Harness {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let current = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let slow_calls = Arc::new(AtomicUsize::new(0));

    let registry = TaskRegistry::from_handlers([
        Box::new(Record {
            seen: Arc::clone(&seen),
        }) as Box<dyn TaskHandler>,
        Box::new(Slow {
            current: Arc::clone(&current),
            peak: Arc::clone(&peak),
            calls: Arc::clone(&slow_calls),
            delay: slow_delay,
        }),
        Box::new(Fails),
        Box::new(Panics),
    ])
    .unwrap();

    let session = Arc::new(session);
    let (bus, receiver) = channel();
    let shutdown = CancellationToken::new();
    let worker = tokio::spawn(
        Worker::new(registry, access(), session.clone()).run(receiver, shutdown.clone()),
    );

    Harness {
        bus,
        shutdown,
        worker,
        seen,
        current,
        peak,
        slow_calls,
        session,
    }
}

fn envelope(task: &str, identity: &str) -> Envelope {
    Envelope::new(TaskRequest::new(task), identity)
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn processes_envelopes_in_enqueue_order() {
    let h = start(Duration::from_millis(1));
    let enqueued = Arc::new(Mutex::new(Vec::new()));

    let mut producers = Vec::new();
    for seq in 0..50u64 {
        let bus = h.bus.clone();
        let enqueued = Arc::clone(&enqueued);
        producers.push(tokio::spawn(async move {
            let env = Envelope::new(TaskRequest::new("record").with_arg("seq", seq), ADMIN);
            // Record the order in which envelopes actually entered the queue.
            let receiver = {
                let mut order = enqueued.lock().unwrap();
                let receiver = bus.enqueue(env).unwrap();
                order.push(seq);
                receiver
            };
            receiver.wait(WAIT).await
        }));
    }
    for p in producers {
        assert!(p.await.unwrap().is_ok());
    }

    let enqueued = enqueued.lock().unwrap().clone();
    assert_eq!(*h.seen.lock().unwrap(), enqueued);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn never_runs_two_handlers_at_once() {
    let h = start(Duration::from_millis(10));

    let mut producers = Vec::new();
    for _ in 0..10 {
        let bus = h.bus.clone();
        producers.push(tokio::spawn(async move {
            bus.submit(envelope("slow", ADMIN), WAIT).await
        }));
    }
    for p in producers {
        assert!(p.await.unwrap().is_ok());
    }

    assert_eq!(h.peak.load(Ordering::SeqCst), 1);
    assert_eq!(h.current.load(Ordering::SeqCst), 0);
    assert_eq!(h.slow_calls.load(Ordering::SeqCst), 10);
}

#[tokio::test]
async fn unknown_task_is_not_found_and_runs_nothing() {
    let h = start(Duration::from_millis(1));

    let out = h.bus.submit(envelope("delete_everything", ADMIN), WAIT).await;
    assert_eq!(out, Err(TaskError::TaskNotFound("delete_everything".into())));
    assert!(h.seen.lock().unwrap().is_empty());
    assert_eq!(h.slow_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unauthorized_task_has_no_side_effect() {
    let h = start(Duration::from_millis(1));

    let out = h.bus.submit(envelope("slow", LIMITED), WAIT).await;
    assert_eq!(out, Err(TaskError::Unauthorized("slow".into())));
    assert_eq!(h.slow_calls.load(Ordering::SeqCst), 0);

    // Unregistered names the role does not cover are rejected before lookup.
    let out = h.bus.submit(envelope("delete_everything", LIMITED), WAIT).await;
    assert_eq!(
        out,
        Err(TaskError::Unauthorized("delete_everything".into()))
    );
}

#[tokio::test]
async fn unregistered_identity_is_unauthorized() {
    let h = start(Duration::from_millis(1));
    let env = Envelope::new(TaskRequest::new("record").with_arg("seq", 1), "key999");
    let out = h.bus.submit(env, WAIT).await;
    assert_eq!(out, Err(TaskError::Unauthorized("record".into())));
    assert!(h.seen.lock().unwrap().is_empty());
}

#[tokio::test]
async fn timeout_leaves_task_running_and_late_result_is_harmless() {
    let h = start(Duration::from_millis(200));

    let timeout = Duration::from_millis(20);
    let out = h.bus.submit(envelope("slow", ADMIN), timeout).await;
    assert_eq!(out, Err(TaskError::Timeout(timeout)));

    // The worker finishes the abandoned task and keeps serving.
    let env = Envelope::new(TaskRequest::new("record").with_arg("seq", 7), ADMIN);
    let out = h.bus.submit(env, WAIT).await.unwrap();
    assert_eq!(out.data["seq"], 7);
    assert_eq!(h.slow_calls.load(Ordering::SeqCst), 1);
    assert!(!h.worker.is_finished());
}

#[tokio::test]
async fn handler_error_becomes_failed() {
    let h = start(Duration::from_millis(1));

    let out = h.bus.submit(envelope("fails", ADMIN), WAIT).await;
    assert_eq!(out, Err(TaskError::Failed("session expired".into())));

    // Missing argument is a handler error too.
    let out = h.bus.submit(envelope("record", ADMIN), WAIT).await;
    assert_eq!(out, Err(TaskError::Failed("missing seq".into())));
}

#[tokio::test]
async fn handler_panic_does_not_stop_the_worker() {
    let h = start(Duration::from_millis(1));

    let out = h.bus.submit(envelope("panics", ADMIN), WAIT).await;
    match out {
        Err(TaskError::Failed(msg)) => assert!(msg.contains("handler blew up")),
        other => panic!("unexpected outcome: {other:?}"),
    }

    let env = Envelope::new(TaskRequest::new("record").with_arg("seq", 1), ADMIN);
    assert!(h.bus.submit(env, WAIT).await.is_ok());
    assert!(!h.worker.is_finished());
}

#[tokio::test]
async fn shutdown_stops_the_loop_and_abandons_the_queue() {
    let h = start(Duration::from_millis(1));

    h.shutdown.cancel();
    h.worker.await.unwrap();

    let out = h.bus.submit(envelope("record", ADMIN), WAIT).await;
    assert_eq!(out, Err(TaskError::WorkerUnavailable));
}

#[tokio::test]
async fn shutdown_lets_the_running_handler_finish() {
    let h = start(Duration::from_millis(100));

    let bus = h.bus.clone();
    let running = tokio::spawn(async move { bus.submit(envelope("slow", ADMIN), WAIT).await });
    // Queued behind the slow task; abandoned by the shutdown.
    tokio::time::sleep(Duration::from_millis(20)).await;
    let queued = h.bus.enqueue(envelope("slow", ADMIN)).unwrap();

    h.shutdown.cancel();

    assert!(running.await.unwrap().is_ok());
    assert_eq!(queued.wait(WAIT).await, Err(TaskError::WorkerUnavailable));
    h.worker.await.unwrap();
    assert_eq!(h.slow_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn reply_waits_behind_the_running_handler() {
    let h = start(Duration::from_millis(200));

    let bus = h.bus.clone();
    let running = tokio::spawn(async move { bus.submit(envelope("slow", ADMIN), WAIT).await });
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(h.current.load(Ordering::SeqCst), 1);

    h.bus.reply(4242, "Hello! I'm your bot.").unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    // Still inside the handler: the session has not been touched.
    assert!(h.session.sent().is_empty());

    assert!(running.await.unwrap().is_ok());
    // Anything queued after the reply runs only once the reply went out.
    let env = Envelope::new(TaskRequest::new("record").with_arg("seq", 1), ADMIN);
    assert!(h.bus.submit(env, WAIT).await.is_ok());
    assert_eq!(h.session.sent(), vec![SentMessage {
        chat_id: 4242,
        text: "Hello! I'm your bot.".into(),
    }]);
}

#[tokio::test]
async fn failed_reply_does_not_stop_the_worker() {
    let h = start_with_session(Duration::from_millis(1), RecordingOutbound::failing("chat gone"));

    h.bus.reply(1, "hi").unwrap();
    let env = Envelope::new(TaskRequest::new("record").with_arg("seq", 3), ADMIN);
    let out = h.bus.submit(env, WAIT).await.unwrap();
    assert_eq!(out.data["seq"], 3);
    assert!(h.session.sent().is_empty());
    assert!(!h.worker.is_finished());
}
