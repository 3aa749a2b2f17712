//! Telegram session for relay.
//!
//! Owns the teloxide `Bot`, exposes the tasks that act through it, answers
//! the interactive bot commands and runs the long-polling loop.

pub mod bot;
pub mod commands;
pub mod error;
pub mod outbound;
pub mod tasks;

pub use {
    bot::TelegramBot,
    commands::CommandRouter,
    error::{Error, Result},
    outbound::TelegramOutbound,
    tasks::{SendMessageAdmin, TelegramTasks},
};
