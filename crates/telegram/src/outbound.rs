use std::{future::Future, time::Duration};

use {
    async_trait::async_trait,
    relay_channels::ChannelOutbound,
    teloxide::{RequestError, prelude::*},
    tracing::{debug, warn},
};

/// Telegram caps a single message at 4096 UTF-16 units; stay well inside it.
pub const TELEGRAM_MAX_MESSAGE_LEN: usize = 4000;

const TELEGRAM_RETRY_AFTER_MAX_RETRIES: usize = 4;

/// Outbound message sender for Telegram.
#[derive(Clone)]
pub struct TelegramOutbound {
    bot: Bot,
}

impl TelegramOutbound {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    async fn run_with_retry<T, F, Fut>(
        &self,
        chat_id: i64,
        operation: &'static str,
        mut request: F,
    ) -> Result<T, RequestError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RequestError>>,
    {
        let mut retries = 0usize;

        loop {
            match request().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    let Some(wait) = retry_after_duration(&err) else {
                        return Err(err);
                    };

                    if retries >= TELEGRAM_RETRY_AFTER_MAX_RETRIES {
                        warn!(
                            chat_id,
                            operation,
                            retries,
                            retry_after_secs = wait.as_secs(),
                            "telegram rate limit persisted after retries"
                        );
                        return Err(err);
                    }

                    retries += 1;
                    warn!(
                        chat_id,
                        operation,
                        retries,
                        retry_after_secs = wait.as_secs(),
                        "telegram rate limited, waiting before retry"
                    );
                    tokio::time::sleep(wait).await;
                },
            }
        }
    }
}

#[async_trait]
impl ChannelOutbound for TelegramOutbound {
    fn id(&self) -> &str {
        "telegram"
    }

    async fn send_text(&self, chat_id: i64, text: &str) -> anyhow::Result<()> {
        for chunk in chunk_message(text, TELEGRAM_MAX_MESSAGE_LEN) {
            self.run_with_retry(chat_id, "send message", || {
                self.bot.send_message(ChatId(chat_id), chunk).send()
            })
            .await?;
        }
        debug!(chat_id, len = text.len(), "telegram message sent");
        Ok(())
    }
}

fn retry_after_duration(error: &RequestError) -> Option<Duration> {
    match error {
        RequestError::RetryAfter(wait) => Some(wait.duration()),
        _ => None,
    }
}

/// Split `text` into pieces of at most `max` characters, preferring to break
/// after a newline. Empty input yields a single empty chunk.
pub fn chunk_message(text: &str, max: usize) -> Vec<&str> {
    let mut chunks = Vec::new();
    let mut rest = text;
    while rest.chars().count() > max {
        let hard = rest
            .char_indices()
            .nth(max)
            .map_or(rest.len(), |(idx, _)| idx);
        let split = rest[..hard]
            .rfind('\n')
            .map_or(hard, |idx| idx + 1);
        let (head, tail) = rest.split_at(split);
        chunks.push(head);
        rest = tail;
    }
    chunks.push(rest);
    chunks
}

#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    #[test]
    fn retry_after_duration_extracts_wait() {
        let err = RequestError::RetryAfter(teloxide::types::Seconds::from_seconds(42));
        assert_eq!(retry_after_duration(&err), Some(Duration::from_secs(42)));
    }

    #[test]
    fn retry_after_duration_ignores_other_errors() {
        let err = RequestError::Io(std::io::Error::other("boom"));
        assert_eq!(retry_after_duration(&err), None);
    }

    #[rstest]
    #[case("", 10, vec![""])]
    #[case("short", 10, vec!["short"])]
    #[case("abcdefghij", 10, vec!["abcdefghij"])]
    #[case("abcdefghijkl", 5, vec!["abcde", "fghij", "kl"])]
    #[case("one\ntwo three", 8, vec!["one\n", "two thre", "e"])]
    fn chunks_respect_limit(#[case] text: &str, #[case] max: usize, #[case] want: Vec<&str>) {
        assert_eq!(chunk_message(text, max), want);
    }

    #[test]
    fn chunks_split_on_char_boundaries() {
        let text = "ééééé";
        let chunks = chunk_message(text, 2);
        assert_eq!(chunks, vec!["éé", "éé", "é"]);
        assert_eq!(chunks.concat(), text);
    }
}
