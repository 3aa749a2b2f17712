use std::time::Duration;

use {
    anyhow::{Context, Result},
    relay_config::RelayConfig,
    relay_gateway::GatewayClient,
    relay_protocol::TaskRequest,
    serde_json::Value,
};

/// Env var holding the API key used by `relay task`.
pub const API_KEY_ENV: &str = "RELAY_API_KEY";

#[derive(clap::Args)]
pub struct TaskArgs {
    /// Task name, e.g. `send_message_admin`.
    pub name: String,
    /// Task argument as KEY=VALUE. VALUE is read as JSON when it parses,
    /// as a plain string otherwise. Repeatable.
    #[arg(long = "arg", value_name = "KEY=VALUE", value_parser = parse_arg)]
    pub args: Vec<(String, Value)>,
    /// Gateway base URL (default: http://<server.bind>:<server.port>).
    #[arg(long, env = "RELAY_URL")]
    pub url: Option<String>,
    /// API key (default: $RELAY_API_KEY, which may come from the env file).
    #[arg(long)]
    pub api_key: Option<String>,
    /// Client-side bound on the whole request, in seconds.
    #[arg(long, default_value_t = 10)]
    pub timeout_secs: u64,
}

/// Submit one task to a running gateway and print its result as JSON.
pub async fn run(config: &RelayConfig, args: TaskArgs) -> Result<()> {
    let url = args
        .url
        .unwrap_or_else(|| format!("http://{}:{}", config.server.bind, config.server.port));
    let api_key = args
        .api_key
        .or_else(|| std::env::var(API_KEY_ENV).ok())
        .with_context(|| format!("no API key: pass --api-key or set {API_KEY_ENV}"))?;

    let client =
        GatewayClient::with_timeout(&url, api_key, Duration::from_secs(args.timeout_secs))?;
    let mut request = TaskRequest::new(args.name);
    request.args.extend(args.args);

    let response = client.enqueue_task(&request).await?;
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

fn parse_arg(raw: &str) -> Result<(String, Value), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{raw}'"))?;
    if key.is_empty() {
        return Err(format!("empty key in '{raw}'"));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::String(value.to_string()));
    Ok((key.to_string(), value))
}

#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest, serde_json::json};

    #[rstest]
    #[case("text=hello", "text", json!("hello"))]
    #[case("text=hello world", "text", json!("hello world"))]
    #[case("count=3", "count", json!(3))]
    #[case("flag=true", "flag", json!(true))]
    #[case("text=\"42\"", "text", json!("42"))]
    #[case("expr=a=b", "expr", json!("a=b"))]
    #[case("empty=", "empty", json!(""))]
    fn parses_key_value_args(#[case] raw: &str, #[case] key: &str, #[case] want: Value) {
        assert_eq!(parse_arg(raw).unwrap(), (key.to_string(), want));
    }

    #[rstest]
    #[case("novalue")]
    #[case("=x")]
    fn rejects_malformed_args(#[case] raw: &str) {
        assert!(parse_arg(raw).is_err());
    }
}
