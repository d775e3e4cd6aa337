//! Polling loop: fetch updates, run commands, send replies.

use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use signup_core::logging::{log_line, LogHandle, INBOUND, OUTBOUND};
use signup_core::{CommandHandler, IncomingMessage};

use crate::telegram::{TelegramClient, Update};

const INITIAL_BACKOFF: Duration = Duration::from_secs(1);
const MAX_BACKOFF: Duration = Duration::from_secs(30);
const SLEEP_STEP: Duration = Duration::from_millis(250);

/// A reply ready to be sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingMessage {
    pub chat_id: i64,
    pub text: String,
    pub reply_to: Option<i64>,
}

/// Run one update through the command layer.
///
/// Updates without text, and messages from other bots, are skipped.
pub fn process_update(
    handler: &CommandHandler,
    update: &Update,
    transcript: &LogHandle,
) -> Option<OutgoingMessage> {
    let message = update.message.as_ref()?;
    let text = message.text.as_deref()?;

    if message.from.as_ref().map(|u| u.is_bot).unwrap_or(false) {
        return None;
    }

    let username = message.from.as_ref().and_then(|u| u.username.as_deref());
    let reply = handler.handle(&IncomingMessage {
        chat_id: message.chat.id,
        username,
        text,
    })?;

    log_line(
        transcript,
        INBOUND,
        &format!("{} @{}: {}", message.chat.id, username.unwrap_or("-"), text),
    );
    log_line(
        transcript,
        OUTBOUND,
        &format!("{}: {}", message.chat.id, reply),
    );

    Some(OutgoingMessage {
        chat_id: message.chat.id,
        text: reply,
        reply_to: Some(message.message_id),
    })
}

/// Long-poll until `shutdown` is set.
///
/// Transport errors are logged and retried with exponential back-off; a
/// failed send is logged and the loop moves on.
pub fn run_polling(
    client: &TelegramClient,
    handler: &CommandHandler,
    transcript: &LogHandle,
    poll_timeout_secs: u64,
    shutdown: &AtomicBool,
) {
    let mut offset: Option<i64> = None;
    let mut backoff = INITIAL_BACKOFF;

    log::info!("Polling for updates");

    while !shutdown.load(Ordering::SeqCst) {
        let updates = match client.get_updates(offset, poll_timeout_secs) {
            Ok(updates) => {
                backoff = INITIAL_BACKOFF;
                updates
            }
            Err(e) => {
                log::warn!("Polling failed, retrying in {}s: {}", backoff.as_secs(), e);
                sleep_unless_shutdown(backoff, shutdown);
                backoff = (backoff * 2).min(MAX_BACKOFF);
                continue;
            }
        };

        for update in &updates {
            offset = Some(update.update_id + 1);

            let Some(outgoing) = process_update(handler, update, transcript) else {
                continue;
            };
            if let Err(e) =
                client.send_message(outgoing.chat_id, &outgoing.text, outgoing.reply_to)
            {
                log::error!("Failed to reply in chat {}: {}", outgoing.chat_id, e);
            }
        }
    }

    log::info!("Polling stopped");
}

fn sleep_unless_shutdown(total: Duration, shutdown: &AtomicBool) {
    let mut slept = Duration::ZERO;
    while slept < total && !shutdown.load(Ordering::SeqCst) {
        thread::sleep(SLEEP_STEP);
        slept += SLEEP_STEP;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use signup_core::logging::open_log_file;
    use signup_core::{BotConfig, ReservationStore, StoreOptions};
    use std::sync::Arc;
    use tempfile::tempdir;

    fn handler_at(dir: &std::path::Path) -> CommandHandler {
        let store = Arc::new(ReservationStore::new(dir, StoreOptions::default()));
        CommandHandler::new(store, Arc::new(BotConfig::default()))
    }

    fn update(json: &str) -> Update {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn command_message_produces_reply_to_sender() {
        let dir = tempdir().unwrap();
        let handler = handler_at(dir.path());
        let transcript = open_log_file(Some(dir.path()), "transcript");

        let out = process_update(
            &handler,
            &update(
                r#"{"update_id": 1, "message": {"message_id": 9,
                    "chat": {"id": -762022584},
                    "from": {"id": 5, "is_bot": false, "username": "bob"},
                    "text": "/signup 12.8 2"}}"#,
            ),
            &transcript,
        );

        assert_eq!(
            out,
            Some(OutgoingMessage {
                chat_id: -762022584,
                text: "@bob записан на 12.8, 2 человек".to_string(),
                reply_to: Some(9),
            })
        );
        let log = std::fs::read_to_string(dir.path().join("transcript.log")).unwrap();
        assert!(log.contains("IN: -762022584 @bob: /signup 12.8 2"));
    }

    #[test]
    fn non_text_and_bot_messages_are_skipped() {
        let dir = tempdir().unwrap();
        let handler = handler_at(dir.path());
        let transcript = open_log_file(None, "transcript");

        let no_message = update(r#"{"update_id": 1}"#);
        let no_text = update(
            r#"{"update_id": 2, "message": {"message_id": 1, "chat": {"id": -762022584}}}"#,
        );
        let from_bot = update(
            r#"{"update_id": 3, "message": {"message_id": 2, "chat": {"id": -762022584},
                "from": {"id": 6, "is_bot": true, "username": "otherbot"},
                "text": "/checkme"}}"#,
        );

        assert!(process_update(&handler, &no_message, &transcript).is_none());
        assert!(process_update(&handler, &no_text, &transcript).is_none());
        assert!(process_update(&handler, &from_bot, &transcript).is_none());
    }

    #[test]
    fn sleep_returns_immediately_on_shutdown() {
        let shutdown = AtomicBool::new(true);
        let start = std::time::Instant::now();

        sleep_unless_shutdown(Duration::from_secs(30), &shutdown);

        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
