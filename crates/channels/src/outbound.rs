use std::sync::Mutex;

use {anyhow::Result, async_trait::async_trait};

/// Send messages to a channel.
#[async_trait]
pub trait ChannelOutbound: Send + Sync {
    /// Channel identifier (e.g. "telegram").
    fn id(&self) -> &str;

    async fn send_text(&self, chat_id: i64, text: &str) -> Result<()>;
}

/// A message captured by [`RecordingOutbound`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub chat_id: i64,
    pub text: String,
}

/// In-memory outbound that records every message instead of sending it.
/// Used by `relay doctor` dry runs and by tests.
#[derive(Debug, Default)]
pub struct RecordingOutbound {
    sent: Mutex<Vec<SentMessage>>,
    fail_with: Option<String>,
}

impl RecordingOutbound {
    pub fn new() -> Self {
        Self::default()
    }

    /// Outbound whose sends always fail with `message`.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail_with: Some(message.into()),
        }
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl ChannelOutbound for RecordingOutbound {
    fn id(&self) -> &str {
        "recording"
    }

    async fn send_text(&self, chat_id: i64, text: &str) -> Result<()> {
        if let Some(message) = &self.fail_with {
            anyhow::bail!("{message}");
        }
        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(SentMessage {
                chat_id,
                text: text.to_string(),
            });
        Ok(())
    }
}
