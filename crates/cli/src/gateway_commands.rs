use std::sync::Arc;

use {
    anyhow::{Context, Result},
    relay_auth::{AccessControl, CredentialStore},
    relay_bus::Worker,
    relay_config::RelayConfig,
    relay_gateway::{GatewayState, start_gateway},
    relay_tasks::TaskRegistry,
    relay_telegram::{CommandRouter, TelegramBot},
    tokio::signal,
    tokio_util::sync::CancellationToken,
    tracing::{error, info, warn},
};

/// Wire the session, worker, poller and HTTP server together and run until a
/// shutdown signal arrives.
pub async fn run(config: RelayConfig, bind: Option<String>, port: Option<u16>) -> Result<()> {
    let task_timeout = config.server.task_timeout()?;
    let credentials = CredentialStore::from_env();
    let access = Arc::new(AccessControl::new(
        credentials,
        config.permissions.roles.clone(),
    ));

    let bot = TelegramBot::connect(&config.telegram)
        .await
        .context("failed to start telegram session")?;
    let registry = TaskRegistry::from_provider(&bot).context("invalid task registration")?;
    let tasks = registry.names();

    let shutdown = CancellationToken::new();
    let (bus, receiver) = relay_bus::channel();
    let worker = tokio::spawn(
        Worker::new(registry, Arc::clone(&access), bot.session())
            .run(receiver, shutdown.clone()),
    );

    let router = CommandRouter::new(
        Arc::clone(&access),
        bot.username().map(str::to_string),
    );
    let poller = bot.start_polling(router, bus.clone(), shutdown.clone());

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        signal_token.cancel();
    });

    let state = GatewayState::new(access, bus, task_timeout, tasks);
    let bind = bind.unwrap_or(config.server.bind);
    let port = port.unwrap_or(config.server.port);
    let served = start_gateway(state, &bind, port, shutdown.clone()).await;

    // A server error ends the process too.
    shutdown.cancel();
    if let Err(e) = worker.await {
        error!(error = %e, "worker loop panicked");
    }
    if let Err(e) = poller.await {
        error!(error = %e, "telegram poller panicked");
    }
    info!("relay stopped");
    served
}

/// Wait for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            },
            Err(e) => {
                warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            info!("received Ctrl+C, shutting down");
        },
        () = terminate => {
            info!("received SIGTERM, shutting down");
        },
    }
}
