//! Wire types shared by the gateway and the worker.
//!
//! The HTTP surface speaks JSON:
//! - request:  `{"task": "<name>", "args": {...}}`
//! - response: `{"status": "success"|"error", "task": {...}|null, "error": "..."|null}`

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Arguments passed to a task handler.
pub type Args = serde_json::Map<String, serde_json::Value>;

/// Default bound on how long the gateway waits for the worker.
pub const DEFAULT_TASK_TIMEOUT_SECS: u64 = 5;

pub const DEFAULT_BIND: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 5000;

/// Permission token granting every action within a namespace.
pub const WILDCARD: &str = "*";

// ── Requests ─────────────────────────────────────────────────────────────────

/// A named unit of work submitted through the gateway.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRequest {
    pub task: String,
    #[serde(default)]
    pub args: Args,
}

impl TaskRequest {
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            task: task.into(),
            args: Args::new(),
        }
    }

    pub fn with_arg(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.args.insert(key.into(), value.into());
        self
    }
}

// ── Responses ────────────────────────────────────────────────────────────────

/// Result payload produced by a task handler.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskResponse {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub data: Args,
}

impl TaskResponse {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            data: Args::new(),
        }
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResponseStatus {
    Success,
    Error,
}

/// Body returned by `POST /enqueue_task`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse {
    pub status: ResponseStatus,
    pub task: Option<TaskResponse>,
    pub error: Option<String>,
}

impl ApiResponse {
    pub fn success(task: TaskResponse) -> Self {
        Self {
            status: ResponseStatus::Success,
            task: Some(task),
            error: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: ResponseStatus::Error,
            task: None,
            error: Some(message.into()),
        }
    }
}

// ── Errors ───────────────────────────────────────────────────────────────────

/// Per-request failure. Every variant is contained in the request that
/// produced it; none of them stops the worker.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaskError {
    /// Bearer credential is not registered.
    #[error("not authenticated")]
    AuthenticationFailure,

    #[error("task not found: {0}")]
    TaskNotFound(String),

    /// Caller is authenticated but its role does not permit the task.
    #[error("unauthorized access for task: {0}")]
    Unauthorized(String),

    /// The bounded wait elapsed. The task itself keeps running.
    #[error("task timed out after {0:?}")]
    Timeout(Duration),

    /// The handler returned an error or panicked.
    #[error("{0}")]
    Failed(String),

    /// The worker loop is gone and can no longer answer.
    #[error("worker unavailable")]
    WorkerUnavailable,
}

/// Outcome written into a response slot.
pub type TaskResult = Result<TaskResponse, TaskError>;
