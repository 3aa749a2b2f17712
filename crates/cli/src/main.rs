mod doctor_commands;
mod gateway_commands;
mod keys_commands;
mod task_commands;

use std::path::{Path, PathBuf};

use {
    anyhow::Context,
    clap::{Parser, Subcommand},
    relay_config::RelayConfig,
    tracing::info,
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

#[derive(Parser)]
#[command(name = "relay", about = "Relay, a task gateway for a Telegram bot session")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,

    /// Config file (default: relay.{toml,yaml,yml,json} in the working
    /// directory, then ~/.config/relay/).
    #[arg(long, global = true, env = "RELAY_CONFIG")]
    config: Option<PathBuf>,

    /// Env file holding credential bindings (default: .env if present).
    #[arg(long, global = true)]
    env_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the Telegram session, the worker and the HTTP gateway.
    Gateway {
        /// Override `server.bind`.
        #[arg(long)]
        bind: Option<String>,
        /// Override `server.port`.
        #[arg(long)]
        port: Option<u16>,
    },
    /// API key management.
    Keys {
        #[command(subcommand)]
        action: keys_commands::KeysAction,
    },
    /// Submit a task to a running gateway and print the result.
    Task(task_commands::TaskArgs),
    /// Validate config, permissions, credentials and tasks without connecting.
    Doctor,
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    if cli.json_logs {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                fmt::layer()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

/// Load the env file first so `${VAR}` placeholders and credential bindings
/// can come from it, then the config.
fn load_environment(config: Option<&Path>, env_file: Option<&Path>) -> anyhow::Result<RelayConfig> {
    match env_file {
        Some(path) => {
            dotenvy::from_path(path)
                .with_context(|| format!("failed to load env file {}", path.display()))?;
        },
        None => {
            dotenvy::dotenv().ok();
        },
    }

    match config {
        Some(path) => relay_config::load_config(path),
        None => relay_config::discover_and_load(),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_telemetry(&cli);

    let Cli {
        command,
        config,
        env_file,
        ..
    } = cli;

    match command {
        Commands::Keys { action } => keys_commands::handle_keys(action),
        Commands::Gateway { bind, port } => {
            info!(version = env!("CARGO_PKG_VERSION"), "relay starting");
            let config = load_environment(config.as_deref(), env_file.as_deref())?;
            gateway_commands::run(config, bind, port).await
        },
        Commands::Task(args) => {
            let config = load_environment(config.as_deref(), env_file.as_deref())?;
            task_commands::run(&config, args).await
        },
        Commands::Doctor => {
            let config = load_environment(config.as_deref(), env_file.as_deref())?;
            doctor_commands::run(&config)
        },
    }
}
