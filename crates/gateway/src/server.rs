use std::sync::Arc;

use {
    axum::{
        Router,
        extract::State,
        http::StatusCode,
        response::{IntoResponse, Json},
        routing::{get, post},
    },
    relay_auth::Namespace,
    relay_bus::Envelope,
    relay_protocol::{ApiResponse, TaskError, TaskRequest, TaskResult},
    tokio::net::TcpListener,
    tokio_util::sync::CancellationToken,
    tower_http::{
        cors::{Any, CorsLayer},
        trace::TraceLayer,
    },
    tracing::{info, warn},
};

use crate::{auth::ApiCaller, state::GatewayState};

// ── Server startup ───────────────────────────────────────────────────────────

/// Build the gateway router (shared between production startup and tests).
pub fn build_gateway_app(state: Arc<GatewayState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/ping", get(ping_handler))
        .route("/enqueue_task", post(enqueue_task_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

/// Bind `bind:port`, print the startup banner and serve until `shutdown`.
pub async fn start_gateway(
    state: Arc<GatewayState>,
    bind: &str,
    port: u16,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let listener = TcpListener::bind((bind, port)).await?;
    let addr = listener.local_addr()?;

    // Startup banner.
    let credentials = state.access.credentials();
    let lines = [
        format!("relay gateway v{}", state.version),
        format!("listening on {addr}"),
        format!(
            "{} tasks registered: {}",
            state.tasks.len(),
            state.tasks.join(", ")
        ),
        format!(
            "credentials: {} api, {} telegram",
            credentials.count(Namespace::Api),
            credentials.count(Namespace::Telegram)
        ),
        format!("task timeout: {:?}", state.task_timeout),
    ];
    let width = lines.iter().map(|l| l.chars().count()).max().unwrap_or(0) + 4;
    info!("┌{}┐", "─".repeat(width));
    for line in &lines {
        info!("│  {:<w$}│", line, w = width - 2);
    }
    info!("└{}┘", "─".repeat(width));

    serve_gateway(listener, state, shutdown).await?;
    Ok(())
}

/// Serve on an already bound listener. In-flight requests are drained once
/// `shutdown` fires.
pub async fn serve_gateway(
    listener: TcpListener,
    state: Arc<GatewayState>,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let app = build_gateway_app(state);
    axum::serve(listener, app)
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;
    info!("gateway stopped");
    Ok(())
}

// ── Handlers ─────────────────────────────────────────────────────────────────

async fn ping_handler() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

async fn enqueue_task_handler(
    State(state): State<Arc<GatewayState>>,
    ApiCaller(key): ApiCaller,
    Json(request): Json<TaskRequest>,
) -> impl IntoResponse {
    let envelope = Envelope::new(request, key);
    let envelope_id = envelope.id;
    let task = envelope.task().to_string();

    let outcome = state.bus.submit(envelope, state.task_timeout).await;
    if let Err(e) = &outcome {
        warn!(%envelope_id, task = %task, error = %e, "task request failed");
    }

    let (status, body) = into_api_response(outcome);
    (status, Json(body))
}

/// Map a task outcome onto the HTTP status and body returned to the caller.
pub fn into_api_response(outcome: TaskResult) -> (StatusCode, ApiResponse) {
    match outcome {
        Ok(response) => (StatusCode::OK, ApiResponse::success(response)),
        Err(e) => (status_for(&e), ApiResponse::error(e.to_string())),
    }
}

pub fn status_for(error: &TaskError) -> StatusCode {
    match error {
        TaskError::AuthenticationFailure => StatusCode::UNAUTHORIZED,
        TaskError::TaskNotFound(_) => StatusCode::NOT_FOUND,
        TaskError::Unauthorized(_) => StatusCode::FORBIDDEN,
        TaskError::Timeout(_) | TaskError::Failed(_) | TaskError::WorkerUnavailable => {
            StatusCode::INTERNAL_SERVER_ERROR
        },
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        relay_protocol::{ResponseStatus, TaskResponse},
        rstest::rstest,
        std::time::Duration,
    };

    #[rstest]
    #[case(TaskError::AuthenticationFailure, StatusCode::UNAUTHORIZED)]
    #[case(TaskError::TaskNotFound("x".into()), StatusCode::NOT_FOUND)]
    #[case(TaskError::Unauthorized("x".into()), StatusCode::FORBIDDEN)]
    #[case(TaskError::Timeout(Duration::from_secs(5)), StatusCode::INTERNAL_SERVER_ERROR)]
    #[case(TaskError::Failed("boom".into()), StatusCode::INTERNAL_SERVER_ERROR)]
    #[case(TaskError::WorkerUnavailable, StatusCode::INTERNAL_SERVER_ERROR)]
    fn error_statuses(#[case] error: TaskError, #[case] want: StatusCode) {
        assert_eq!(status_for(&error), want);
    }

    #[test]
    fn success_body() {
        let (status, body) = into_api_response(Ok(TaskResponse::message("Message sent")));
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.status, ResponseStatus::Success);
        assert_eq!(body.error, None);
        assert_eq!(
            body.task.and_then(|t| t.message).as_deref(),
            Some("Message sent")
        );
    }

    #[test]
    fn timeout_body_names_the_duration() {
        let (status, body) = into_api_response(Err(TaskError::Timeout(Duration::from_secs(5))));
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.status, ResponseStatus::Error);
        assert_eq!(body.task, None);
        assert_eq!(body.error.as_deref(), Some("task timed out after 5s"));
    }
}
