//! Config schema: HTTP server, telegram session, role tables.

use std::{collections::HashMap, path::PathBuf, time::Duration};

use {
    relay_protocol::{DEFAULT_BIND, DEFAULT_PORT, DEFAULT_TASK_TIMEOUT_SECS},
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

/// Role name → permitted action names.
pub type RoleTable = HashMap<String, Vec<String>>;

/// Root configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub server: ServerConfig,
    pub telegram: TelegramConfig,
    pub permissions: PermissionsConfig,
}

/// Gateway HTTP listener.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub port: u16,
    /// How long a request waits for the worker before answering with a timeout.
    pub task_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: DEFAULT_BIND.into(),
            port: DEFAULT_PORT,
            task_timeout_secs: DEFAULT_TASK_TIMEOUT_SECS,
        }
    }
}

impl ServerConfig {
    /// The bounded wait for task results. Zero is rejected: every request
    /// would time out before the worker could answer.
    pub fn task_timeout(&self) -> anyhow::Result<Duration> {
        anyhow::ensure!(
            self.task_timeout_secs > 0,
            "server.task_timeout_secs must be at least 1, every task would time out"
        );
        Ok(Duration::from_secs(self.task_timeout_secs))
    }
}

/// Telegram bot session owned by the worker.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    /// Bot token from @BotFather.
    pub token: Secret<String>,

    /// Chat that receives `send_message_admin`.
    pub admin_chat_id: Option<i64>,

    /// Long-polling timeout passed to `getUpdates`.
    pub poll_timeout_secs: u32,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            token: Secret::new(String::new()),
            admin_chat_id: None,
            poll_timeout_secs: 30,
        }
    }
}

impl std::fmt::Debug for TelegramConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramConfig")
            .field("token", &"[REDACTED]")
            .field("admin_chat_id", &self.admin_chat_id)
            .field("poll_timeout_secs", &self.poll_timeout_secs)
            .finish()
    }
}

impl TelegramConfig {
    /// False when the token is empty or still an unresolved `${VAR}` placeholder.
    pub fn token_configured(&self) -> bool {
        let token = self.token.expose_secret().trim();
        !token.is_empty() && !token.starts_with("${")
    }
}

/// Where role definitions come from.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PermissionsConfig {
    /// Separate role file. When set, it replaces the inline tables; a
    /// relative path is resolved against the config file's directory.
    pub file: Option<PathBuf>,

    #[serde(flatten)]
    pub roles: RoleTables,
}

/// Two independent permission namespaces.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoleTables {
    /// Roles for API callers, keyed by role name, listing task names.
    pub api_roles: RoleTable,
    /// Roles for chat users, keyed by role name, listing bot commands.
    pub tg_roles: RoleTable,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let cfg = RelayConfig::default();
        assert_eq!(cfg.server.port, 5000);
        assert_eq!(cfg.server.task_timeout().unwrap(), Duration::from_secs(5));
        assert!(!cfg.telegram.token_configured());
        assert!(cfg.permissions.roles.api_roles.is_empty());
    }

    #[test]
    fn zero_task_timeout_is_rejected() {
        let server = ServerConfig {
            task_timeout_secs: 0,
            ..Default::default()
        };
        let err = server.task_timeout().unwrap_err();
        assert!(err.to_string().contains("task_timeout_secs"));
    }

    #[test]
    fn unresolved_placeholder_is_not_a_token() {
        let cfg = TelegramConfig {
            token: Secret::new("${TELEGRAM_BOT_TOKEN}".into()),
            ..Default::default()
        };
        assert!(!cfg.token_configured());
    }

    #[test]
    fn debug_redacts_token() {
        let cfg = TelegramConfig {
            token: Secret::new("123:secret".into()),
            ..Default::default()
        };
        let out = format!("{cfg:?}");
        assert!(!out.contains("123:secret"));
        assert!(out.contains("REDACTED"));
    }

    #[test]
    fn inline_roles_from_toml() {
        let cfg: RelayConfig = toml::from_str(
            r#"
            [permissions.api_roles]
            tgbot = ["send_message_admin"]

            [permissions.tg_roles]
            admin = ["*"]
            "#,
        )
        .unwrap();
        assert_eq!(cfg.permissions.roles.api_roles["tgbot"], vec![
            "send_message_admin"
        ]);
        assert_eq!(cfg.permissions.roles.tg_roles["admin"], vec!["*"]);
        assert!(cfg.permissions.file.is_none());
    }
}
