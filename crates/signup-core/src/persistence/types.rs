//! Persistence data types.
//!
//! # Data Model Overview
//!
//! Each chat's reservations are persisted as one JSON file:
//!
//! ```text
//! data/
//! └── chat_data/
//!     ├── -762022584.json        # Ledger for one chat
//!     ├── -762022584.json.tmp    # Only present mid-write
//!     └── ...
//! ```
//!
//! # Design Principles
//!
//! - **Lazy loading**: A chat's ledger is read on first access
//! - **Atomic writes**: Write to temp file, then rename
//! - **Stable identities**: Reservation IDs are persisted with the record

use std::collections::BTreeMap;
use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ledger::LedgerFileError;

/// Chat identifier as delivered by the transport (negative for groups).
pub type ChatId = i64;

// ============================================================================
// Reservation Types
// ============================================================================

/// Opaque identity of a single reservation within a chat.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReservationId(pub String);

impl ReservationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for ReservationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ReservationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One user's signup for one date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationRecord {
    /// Assigned by the store on first upsert.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<ReservationId>,

    /// Username of the person who signed up (without the leading `@`).
    pub username: String,

    /// Date label, e.g. `"12.8"`.
    pub date: String,

    /// How many people the reservation covers.
    #[serde(default = "default_num_participants")]
    pub num_participants: u32,

    /// Seconds since the Unix epoch, with sub-second precision.
    pub timestamp: f64,
}

fn default_num_participants() -> u32 {
    1
}

impl ReservationRecord {
    /// Create an unsaved record stamped with the current time.
    pub fn new(username: impl Into<String>, date: impl Into<String>, num_participants: u32) -> Self {
        Self {
            id: None,
            username: username.into(),
            date: date.into(),
            num_participants,
            timestamp: now_timestamp(),
        }
    }

    /// Override the timestamp (mostly useful for imports and tests).
    pub fn with_timestamp(mut self, timestamp: f64) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// True if this record belongs to `username` for `date`.
    pub fn matches(&self, username: &str, date: &str) -> bool {
        self.username == username && self.date == date
    }
}

/// Current time as floating-point seconds since the Unix epoch.
pub fn now_timestamp() -> f64 {
    Utc::now().timestamp_micros() as f64 / 1_000_000.0
}

// ============================================================================
// Ledger Types
// ============================================================================

/// All reservations of a single chat, keyed by reservation identity.
///
/// Records stored in a ledger always carry `id: Some(key)`.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatLedger {
    pub chat_id: ChatId,
    pub reservations: BTreeMap<ReservationId, ReservationRecord>,
}

impl ChatLedger {
    /// An empty ledger for `chat_id`.
    pub fn empty(chat_id: ChatId) -> Self {
        Self {
            chat_id,
            reservations: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.reservations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reservations.is_empty()
    }

    pub fn get(&self, id: &ReservationId) -> Option<&ReservationRecord> {
        self.reservations.get(id)
    }

    /// Records sorted ascending by timestamp, ties broken by identity.
    pub fn sorted(&self) -> Vec<&ReservationRecord> {
        let mut records: Vec<_> = self.reservations.values().collect();
        records.sort_by(|a, b| {
            a.timestamp
                .total_cmp(&b.timestamp)
                .then_with(|| a.id.cmp(&b.id))
        });
        records
    }

    /// Insert `record` under `id`, replacing whatever was there.
    pub(crate) fn insert(&mut self, id: ReservationId, mut record: ReservationRecord) {
        record.id = Some(id.clone());
        self.reservations.insert(id, record);
    }

    /// Remove every record for `(username, date)`, returning how many went.
    pub(crate) fn remove_matching(&mut self, username: &str, date: &str) -> usize {
        let before = self.reservations.len();
        self.reservations.retain(|_, r| !r.matches(username, date));
        before - self.reservations.len()
    }
}

/// Serialized shape of a ledger file (`{chat_id}.json`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerFile {
    pub chat_id: ChatId,

    #[serde(default)]
    pub reservations: Vec<ReservationRecord>,
}

impl From<&ChatLedger> for LedgerFile {
    fn from(ledger: &ChatLedger) -> Self {
        Self {
            chat_id: ledger.chat_id,
            reservations: ledger.sorted().into_iter().cloned().collect(),
        }
    }
}

impl LedgerFile {
    /// Records that were saved without an identity (hand-edited files).
    pub fn missing_ids(&self) -> usize {
        self.reservations.iter().filter(|r| r.id.is_none()).count()
    }
}

impl TryFrom<LedgerFile> for ChatLedger {
    type Error = LedgerFileError;

    /// Records without an identity get a fresh one; a repeated identity
    /// makes the whole file invalid.
    fn try_from(file: LedgerFile) -> Result<Self, Self::Error> {
        let mut ledger = ChatLedger::empty(file.chat_id);
        for record in file.reservations {
            let id = record.id.clone().unwrap_or_default();
            if ledger.reservations.contains_key(&id) {
                return Err(LedgerFileError::DuplicateId(id));
            }
            ledger.insert(id, record);
        }
        Ok(ledger)
    }
}

// ============================================================================
// TESTS
// ============================================================================
