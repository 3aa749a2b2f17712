use std::sync::Arc;

use {
    relay_auth::{AccessControl, Namespace, access::grants},
    teloxide::types::BotCommand,
    tracing::{debug, info},
};

pub const DENIED_REPLY: &str = "You are not authorized to use this command.";
pub const START_REPLY: &str = "Hello! I'm your bot.";

/// Interactive commands, in the order `/help` lists them.
pub const COMMANDS: &[(&str, &str)] = &[
    ("start", "Say hello"),
    ("help", "List the commands you can use"),
];

/// Slash command menu registered with Telegram on startup.
pub fn bot_commands() -> Vec<BotCommand> {
    COMMANDS
        .iter()
        .map(|(name, description)| BotCommand::new(*name, *description))
        .collect()
}

/// Extract the command name from a message such as `/help` or
/// `/help@relay_bot extra`. Commands addressed to a different bot are
/// ignored.
pub fn parse_command<'a>(text: &'a str, bot_username: Option<&str>) -> Option<&'a str> {
    let first = text.trim_start().split_whitespace().next()?;
    let command = first.strip_prefix('/')?;
    let (name, mention) = match command.split_once('@') {
        Some((name, mention)) => (name, Some(mention)),
        None => (command, None),
    };
    if let (Some(mention), Some(me)) = (mention, bot_username)
        && !mention.eq_ignore_ascii_case(me)
    {
        return None;
    }
    (!name.is_empty()).then_some(name)
}

/// Answers bot commands, each checked against the Telegram role table.
pub struct CommandRouter {
    access: Arc<AccessControl>,
    bot_username: Option<String>,
}

impl CommandRouter {
    pub fn new(access: Arc<AccessControl>, bot_username: Option<String>) -> Self {
        Self {
            access,
            bot_username,
        }
    }

    /// Reply text for a message from `user_id`, or `None` when the message is
    /// not a known command and should be ignored.
    pub fn handle(&self, user_id: &str, text: &str) -> Option<String> {
        let command = parse_command(text, self.bot_username.as_deref())?;
        if !COMMANDS.iter().any(|(name, _)| *name == command) {
            debug!(command, "ignoring unknown command");
            return None;
        }
        info!(command, user_id, "command triggered");

        if !self.access.check_command_access(user_id, command) {
            return Some(DENIED_REPLY.to_string());
        }

        let reply = match command {
            "help" => self.help_text(user_id),
            _ => START_REPLY.to_string(),
        };
        Some(reply)
    }

    /// Commands `user_id` may run.
    pub fn allowed_commands(&self, user_id: &str) -> Vec<&'static str> {
        let Some(permitted) = self
            .access
            .credentials()
            .resolve(Namespace::Telegram, user_id)
            .and_then(|role| self.access.permitted(Namespace::Telegram, role))
        else {
            return Vec::new();
        };
        COMMANDS
            .iter()
            .map(|(name, _)| *name)
            .filter(|name| grants(permitted, name))
            .collect()
    }

    fn help_text(&self, user_id: &str) -> String {
        let mut text = String::from("Available Commands:");
        for name in self.allowed_commands(user_id) {
            text.push_str("\n/");
            text.push_str(name);
        }
        text
    }
}
