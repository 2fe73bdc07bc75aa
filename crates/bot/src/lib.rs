//! Telegram bot interface.
//!
//! This crate provides the operator chat interface for leadsweep:
//! - **Transport** (`runner::BotTransport`) - long-poll connection to
//!   the Telegram Bot API (no public URL needed)
//! - **Commands** (`commands`) - `/merge` to trigger a processing
//!   cycle on demand
//! - **Runner** (`runner`) - poll loop with reconnect backoff,
//!   dispatching commands to a service trait
//! - **Notifier** (`notifier`) - the workflow's outbound channel into
//!   the operator chat
//!
//! # Getting Started
//!
//! 1. Create a bot with @BotFather and grab the token
//! 2. Add the bot to the operator chat and note the chat id
//! 3. Set `LEADSWEEP_TELEGRAM_BOT_TOKEN` and `LEADSWEEP_TELEGRAM_CHAT_ID`

pub mod commands;
pub mod notifier;
pub mod runner;
pub mod telegram;

pub use notifier::ChatNotifier;
pub use runner::{BotRunner, BotTransport, MergeCommandService, ReconnectPolicy};
pub use telegram::TelegramTransport;
