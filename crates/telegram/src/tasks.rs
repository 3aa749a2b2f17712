use std::sync::Arc;

use {
    anyhow::Context,
    async_trait::async_trait,
    relay_channels::ChannelOutbound,
    relay_protocol::{Args, TaskResponse},
    relay_tasks::{TaskHandler, TaskProvider, parse_args},
    serde::Deserialize,
    tracing::info,
};

/// Tasks that act through the chat session.
pub struct TelegramTasks {
    outbound: Arc<dyn ChannelOutbound>,
    admin_chat_id: Option<i64>,
}

impl TelegramTasks {
    pub fn new(outbound: Arc<dyn ChannelOutbound>, admin_chat_id: Option<i64>) -> Self {
        Self {
            outbound,
            admin_chat_id,
        }
    }
}

impl TaskProvider for TelegramTasks {
    fn task_handlers(&self) -> Vec<Box<dyn TaskHandler>> {
        vec![Box::new(SendMessageAdmin {
            outbound: Arc::clone(&self.outbound),
            admin_chat_id: self.admin_chat_id,
        })]
    }
}

// ── send_message_admin ───────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct SendMessageArgs {
    text: String,
}

/// Forward `args.text` to the administrator chat.
pub struct SendMessageAdmin {
    outbound: Arc<dyn ChannelOutbound>,
    admin_chat_id: Option<i64>,
}

#[async_trait]
impl TaskHandler for SendMessageAdmin {
    fn name(&self) -> &str {
        "send_message_admin"
    }

    fn description(&self) -> &str {
        "Send a text message to the administrator chat"
    }

    async fn execute(&self, args: &Args) -> anyhow::Result<TaskResponse> {
        let SendMessageArgs { text } = parse_args(args)?;
        let chat_id = self
            .admin_chat_id
            .context("admin chat id is not configured")?;
        self.outbound
            .send_text(chat_id, &text)
            .await
            .with_context(|| format!("failed to send message via {}", self.outbound.id()))?;
        info!(chat_id, len = text.len(), "admin message sent");
        Ok(TaskResponse::message("Message sent"))
    }
}
