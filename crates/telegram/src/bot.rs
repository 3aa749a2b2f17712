use std::{sync::Arc, time::Duration};

use {
    relay_bus::BusSender,
    relay_channels::ChannelOutbound,
    relay_config::TelegramConfig,
    relay_tasks::{TaskHandler, TaskProvider},
    secrecy::ExposeSecret,
    teloxide::{
        ApiError, RequestError,
        prelude::*,
        types::{AllowedUpdate, UpdateKind},
    },
    tokio::task::JoinHandle,
    tokio_util::sync::CancellationToken,
    tracing::{debug, error, info, warn},
};

use crate::{
    commands::{CommandRouter, bot_commands},
    error::{Error, Result},
    outbound::TelegramOutbound,
    tasks::TelegramTasks,
};

/// Pause after a failed `getUpdates` before polling again.
const POLL_ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// Telegram connection. Sending goes through [`TelegramBot::session`], which
/// belongs to the worker; the poller only receives updates.
pub struct TelegramBot {
    bot: Bot,
    username: Option<String>,
    admin_chat_id: Option<i64>,
    poll_timeout_secs: u32,
    outbound: Arc<TelegramOutbound>,
}

impl TelegramBot {
    /// Verify the token, clear any webhook and register the command menu.
    pub async fn connect(config: &TelegramConfig) -> Result<Self> {
        if !config.token_configured() {
            return Err(Error::message("telegram bot token is not configured"));
        }

        // The HTTP client must outlive the long-poll timeout, or requests are
        // aborted before Telegram answers.
        let client = teloxide::net::default_reqwest_settings()
            .timeout(Duration::from_secs(u64::from(config.poll_timeout_secs) + 15))
            .build()?;
        let bot = Bot::with_client(config.token.expose_secret(), client);

        let me = bot.get_me().await?;
        let username = me.username.clone();

        bot.delete_webhook().send().await?;

        if let Err(e) = bot.set_my_commands(bot_commands()).send().await {
            warn!("failed to register bot commands: {e}");
        }

        if config.admin_chat_id.is_none() {
            warn!("telegram.admin_chat_id is not set, send_message_admin will fail");
        }

        info!(username = ?username, "telegram bot connected (webhook cleared)");

        Ok(Self {
            outbound: Arc::new(TelegramOutbound::new(bot.clone())),
            bot,
            username,
            admin_chat_id: config.admin_chat_id,
            poll_timeout_secs: config.poll_timeout_secs,
        })
    }

    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    /// The sending half of the session, handed to the worker.
    pub fn session(&self) -> Arc<dyn ChannelOutbound> {
        self.outbound.clone()
    }

    /// Spawn the long-polling loop. Command replies are queued on `bus` and
    /// sent by the worker. Runs until `cancel` fires or another instance takes
    /// over the token.
    pub fn start_polling(
        &self,
        router: CommandRouter,
        bus: BusSender,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        let bot = self.bot.clone();
        let poll_timeout = self.poll_timeout_secs;

        tokio::spawn(async move {
            info!("starting telegram polling loop");
            let mut offset: i32 = 0;

            loop {
                let result = tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    result = bot
                        .get_updates()
                        .offset(offset)
                        .timeout(poll_timeout)
                        .allowed_updates(vec![AllowedUpdate::Message])
                        .send() => result,
                };

                match result {
                    Ok(updates) => {
                        debug!(count = updates.len(), "got telegram updates");
                        for update in updates {
                            offset = update.id.as_offset();
                            match update.kind {
                                UpdateKind::Message(msg) => {
                                    route_message(
                                        &router,
                                        &bus,
                                        msg.chat.id.0,
                                        msg.from.as_ref().map(|user| user.id.0),
                                        msg.text(),
                                    );
                                },
                                other => {
                                    debug!("ignoring non-message update: {other:?}");
                                },
                            }
                        }
                    },
                    Err(RequestError::Api(ApiError::TerminatedByOtherGetUpdates)) => {
                        error!(
                            "telegram polling disabled: another instance is already running with this token"
                        );
                        break;
                    },
                    Err(e) => {
                        warn!(error = %e, "telegram getUpdates failed");
                        tokio::select! {
                            () = cancel.cancelled() => break,
                            () = tokio::time::sleep(POLL_ERROR_BACKOFF) => {},
                        }
                    },
                }
            }

            info!("telegram polling stopped");
        })
    }
}

impl TaskProvider for TelegramBot {
    fn task_handlers(&self) -> Vec<Box<dyn TaskHandler>> {
        TelegramTasks::new(self.session(), self.admin_chat_id).task_handlers()
    }
}

/// Answer a command message by queueing the reply for the worker.
fn route_message(
    router: &CommandRouter,
    bus: &BusSender,
    chat_id: i64,
    user_id: Option<u64>,
    text: Option<&str>,
) {
    let (Some(text), Some(user_id)) = (text, user_id) else {
        debug!(chat_id, "ignoring message without text or sender");
        return;
    };
    let Some(reply) = router.handle(&user_id.to_string(), text) else {
        return;
    };
    if let Err(e) = bus.reply(chat_id, reply) {
        error!(chat_id, error = %e, "command reply dropped");
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::commands::{DENIED_REPLY, START_REPLY},
        relay_auth::{AccessControl, CredentialStore, Namespace},
        relay_bus::{Job, Reply, channel},
        relay_config::RoleTables,
    };

    fn router() -> CommandRouter {
        let mut roles = RoleTables::default();
        roles.tg_roles.insert("admin".into(), vec!["*".into()]);
        let creds = CredentialStore::new().with_binding(Namespace::Telegram, "1001", "admin");
        CommandRouter::new(Arc::new(AccessControl::new(creds, roles)), None)
    }

    #[tokio::test]
    async fn command_replies_are_queued_for_the_worker() {
        let (bus, mut rx) = channel();
        let router = router();

        route_message(&router, &bus, 77, Some(1001), Some("/start"));
        route_message(&router, &bus, 78, Some(2002), Some("/help"));
        drop(bus);

        let mut replies = Vec::new();
        while let Some(job) = rx.dequeue().await {
            match job {
                Job::Reply(reply) => replies.push(reply),
                Job::Task(..) => panic!("commands never enqueue tasks"),
            }
        }
        assert_eq!(replies, vec![
            Reply {
                chat_id: 77,
                text: START_REPLY.into(),
            },
            Reply {
                chat_id: 78,
                text: DENIED_REPLY.into(),
            },
        ]);
    }

    #[tokio::test]
    async fn non_commands_queue_nothing() {
        let (bus, mut rx) = channel();
        let router = router();

        route_message(&router, &bus, 77, Some(1001), Some("good morning"));
        route_message(&router, &bus, 77, None, Some("/start"));
        route_message(&router, &bus, 77, Some(1001), None);
        drop(bus);

        assert!(rx.dequeue().await.is_none());
    }

    #[test]
    fn reply_after_worker_exit_is_dropped_quietly() {
        let (bus, rx) = channel();
        drop(rx);
        route_message(&router(), &bus, 77, Some(1001), Some("/start"));
    }
}
