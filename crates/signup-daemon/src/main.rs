//! signup-bot: Telegram signup sheet daemon.
//!
//! Reads `TELEGRAM_TOKEN` from the environment, long-polls for commands and
//! keeps per-chat reservation ledgers under the configured data directory.
//! On Ctrl-C the poller is stopped and the store flushed before exit.

mod bot;
mod telegram;

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use signup_core::config::{token_from_env, BotConfig, ConfigError};
use signup_core::logging::open_log_file;
use signup_core::{CommandHandler, ReservationStore, StoreError};
use tokio::task::JoinHandle;

use crate::telegram::TelegramClient;

/// How long to wait for an in-flight poll after Ctrl-C, beyond its own timeout.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

#[derive(Parser, Debug)]
#[command(name = "signup-bot", about = "Telegram bot keeping a per-chat signup sheet")]
struct Args {
    /// JSON config file (defaults are used when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the data directory
    #[arg(long)]
    data_dir: Option<String>,

    /// Only write ledgers at shutdown
    #[arg(long)]
    deferred_flush: bool,

    /// Append a conversation transcript to this directory
    #[arg(long)]
    transcript_dir: Option<String>,
}

impl Args {
    /// Load the config file (if any) and apply command-line overrides.
    fn resolve_config(&self) -> Result<BotConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => BotConfig::load(path)?,
            None => BotConfig::default(),
        };

        if let Some(dir) = &self.data_dir {
            config.data_dir = dir.clone();
        }
        if self.deferred_flush {
            config.deferred_flush = true;
        }
        if let Some(dir) = &self.transcript_dir {
            config.transcript_dir = Some(dir.clone());
        }

        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let config = Arc::new(args.resolve_config()?);
    let token = token_from_env()?;

    let store = Arc::new(ReservationStore::new(
        config.ledger_dir(),
        config.store_options(),
    ));
    log::info!(
        "Ledgers in {} ({} chat(s) on disk, {} persistence)",
        store.root().display(),
        store.chat_ids()?.len(),
        if store.is_deferred() { "deferred" } else { "immediate" }
    );

    let shutdown = Arc::new(AtomicBool::new(false));
    let poll_timeout = config.poll_timeout_secs;

    let mut poller = {
        let store = Arc::clone(&store);
        let config = Arc::clone(&config);
        let shutdown = Arc::clone(&shutdown);
        tokio::task::spawn_blocking(move || {
            let client = TelegramClient::new(&token);
            let mut handler = CommandHandler::new(store, Arc::clone(&config));
            match client.get_me() {
                Ok(me) => {
                    log::info!(
                        "Connected as @{} ({})",
                        me.username.as_deref().unwrap_or("?"),
                        me.id
                    );
                    if let Some(username) = me.username {
                        handler = handler.with_bot_username(username);
                    }
                }
                Err(e) => log::warn!("getMe failed, answering all /cmd@bot mentions: {}", e),
            }

            let transcript_dir = config.transcript_dir();
            let transcript = open_log_file(transcript_dir.as_deref(), "transcript");
            bot::run_polling(&client, &handler, &transcript, poll_timeout, &shutdown);
        })
    };

    tokio::select! {
        result = &mut poller => {
            if let Err(e) = result {
                log::error!("Poller exited unexpectedly: {}", e);
            }
            store.flush()?;
        }
        _ = tokio::signal::ctrl_c() => {
            log::info!("Shutting down");
            shutdown.store(true, Ordering::SeqCst);
            let grace = Duration::from_secs(poll_timeout) + SHUTDOWN_GRACE;
            stop_and_flush(&store, &mut poller, grace).await?;
        }
    }

    log::info!("Store flushed, bye");
    Ok(())
}

/// Wait up to `grace` for the poller, then flush.
///
/// A poller that overruns may still commit changes, so after the first
/// flush it is awaited to completion and the store flushed again.
async fn stop_and_flush(
    store: &ReservationStore,
    poller: &mut JoinHandle<()>,
    grace: Duration,
) -> Result<(), StoreError> {
    let result = match tokio::time::timeout(grace, &mut *poller).await {
        Ok(result) => result,
        Err(_) => {
            log::warn!(
                "Poller did not stop within {}s, flushing now and again once it exits",
                grace.as_secs()
            );
            store.flush()?;
            poller.await
        }
    };

    if let Err(e) = result {
        log::error!("Poller exited unexpectedly: {}", e);
    }
    store.flush()
}
