//! # signup-core
//!
//! Core logic for the signup bot: a per-chat reservation ledger and the
//! chat commands that read and change it.
//!
//! This crate is transport-agnostic and can be used by:
//! - the long-polling daemon (`signup-daemon`)
//! - tests and tooling that work on the data directory directly
//!
//! ## Key Concepts
//!
//! - **Chat**: An isolated scope; each chat has its own ledger
//! - **Ledger**: All reservations of one chat, keyed by reservation identity
//! - **Reservation**: One user's signup for one date, with a participant count

pub mod commands;
pub mod config;
pub mod logging;
pub mod managers;
pub mod paths;
pub mod persistence;

// Re-export commonly used types
pub use commands::{CommandHandler, IncomingMessage};
pub use config::BotConfig;
pub use managers::{ReservationStore, StoreError, StoreOptions};
pub use persistence::{ChatId, ChatLedger, ReservationId, ReservationRecord};
