//! Persistence layer for per-chat reservation ledgers.
//!
//! # Overview
//!
//! This module handles all file I/O for the bot's persistent state. Each
//! chat the bot serves gets one ledger file holding every reservation made
//! in that chat.
//!
//! # File Locations
//!
//! ```text
//! {data_dir}/
//! └── chat_data/
//!     ├── <chat-id>.json           # One ledger per chat
//!     ├── <chat-id>.json.corrupt   # Unreadable ledger moved aside
//!     ├── <chat-id>.json.corrupt.1 # ...and any later one for the same chat
//!     └── ...
//! ```
//!
//! # Design Principles
//!
//! ## Atomic Writes
//!
//! All save operations use write-then-rename to prevent corruption:
//!
//! 1. Write to `file.json.tmp` and sync it
//! 2. Rename to `file.json` (atomic on Unix)
//!
//! ## Lazy Loading
//!
//! Ledgers are loaded on first access to a chat, not at startup.
//!
//! # Usage
//!
//! ```ignore
//! use signup_core::persistence::{load_ledger, save_ledger};
//!
//! let ledger = load_ledger(dir, chat_id)?.unwrap_or_else(|| ChatLedger::empty(chat_id));
//! save_ledger(dir, &ledger)?;
//! ```

pub mod ledger;
pub mod types;

pub use ledger::{
    delete_ledger, ledger_exists, list_chat_ids, load_ledger, load_ledger_file, quarantine_ledger,
    save_ledger, LedgerFileError,
};
pub use types::*;
