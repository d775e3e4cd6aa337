//! Command layer: turns inbound chat messages into store operations and
//! replies.
//!
//! # Rules
//!
//! Checked in this order for every recognized command:
//!
//! 1. The chat must be on the allow-list, otherwise the bot "sleeps"
//! 2. Arguments must parse (date present, positive participant count)
//! 3. `/signup` only accepts dates from the configured set
//! 4. Commands acting on the sender's own reservations need a username
//!
//! Plain text and unknown commands get no reply at all.

pub mod parser;
pub mod replies;

use std::sync::Arc;

use crate::config::BotConfig;
use crate::managers::{ReservationStore, StoreError};
use crate::persistence::{ChatId, ReservationRecord};

pub use parser::{parse_command, Command, CommandError};

/// The parts of an inbound message the command layer needs.
#[derive(Debug, Clone, Copy)]
pub struct IncomingMessage<'a> {
    pub chat_id: ChatId,
    /// Sender's username, without `@`. Users may not have one.
    pub username: Option<&'a str>,
    pub text: &'a str,
}

/// Dispatches commands against a shared [`ReservationStore`].
pub struct CommandHandler {
    store: Arc<ReservationStore>,
    config: Arc<BotConfig>,
    bot_username: Option<String>,
}

impl CommandHandler {
    pub fn new(store: Arc<ReservationStore>, config: Arc<BotConfig>) -> Self {
        Self {
            store,
            config,
            bot_username: None,
        }
    }

    /// Only answer `/cmd@name` when `name` is this bot.
    pub fn with_bot_username(mut self, username: impl Into<String>) -> Self {
        self.bot_username = Some(username.into());
        self
    }

    pub fn store(&self) -> &Arc<ReservationStore> {
        &self.store
    }

    /// Handle one message, returning the reply to send (if any).
    pub fn handle(&self, message: &IncomingMessage<'_>) -> Option<String> {
        let parsed = parse_command(message.text, self.bot_username.as_deref())?;

        if !self.config.is_chat_allowed(message.chat_id) {
            log::info!("Ignoring command from chat {} (not allowed)", message.chat_id);
            return Some(replies::BOT_ASLEEP.to_string());
        }

        let command = match parsed {
            Ok(command) => command,
            Err(e) => {
                log::debug!("Chat {}: bad command: {e}", message.chat_id);
                return Some(replies::invalid_command(&e));
            }
        };

        log::info!(
            "Chat {}: /{} from {}",
            message.chat_id,
            command.name(),
            message.username.unwrap_or("<no username>")
        );

        let reply = match self.execute(message, command) {
            Ok(reply) => reply,
            Err(e) => {
                log::error!("Chat {}: command failed: {e}", message.chat_id);
                replies::STORAGE_FAILURE.to_string()
            }
        };

        Some(reply)
    }

    fn execute(&self, message: &IncomingMessage<'_>, command: Command) -> Result<String, StoreError> {
        let chat_id = message.chat_id;
        let username = message.username.filter(|u| !u.trim().is_empty());

        match command {
            Command::Signup {
                date,
                num_participants,
            } => {
                if !self.config.is_date_available(&date) {
                    return Ok(replies::date_unavailable(
                        &date,
                        &self.config.available_dates,
                    ));
                }
                let Some(username) = username else {
                    return Ok(replies::NO_USERNAME.to_string());
                };
                self.store.upsert(
                    chat_id,
                    ReservationRecord::new(username, date.as_str(), num_participants),
                )?;
                Ok(replies::signed_up(username, &date, num_participants))
            }
            Command::CheckMe => {
                let Some(username) = username else {
                    return Ok(replies::NO_USERNAME.to_string());
                };
                let records = self.store.find_by_username(chat_id, username)?;
                Ok(replies::my_reservations(&records))
            }
            Command::CheckDate { date } => {
                let records = self.store.find_by_date(chat_id, &date)?;
                Ok(replies::date_reservations(&records))
            }
            Command::Cancel { date } => {
                let Some(username) = username else {
                    return Ok(replies::NO_USERNAME.to_string());
                };
                match self.store.remove(chat_id, username, &date)? {
                    0 => Ok(replies::nothing_to_cancel(username, &date)),
                    _ => Ok(replies::cancelled(username, &date)),
                }
            }
        }
    }
}
