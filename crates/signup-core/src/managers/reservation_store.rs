//! Reservation store (per-chat ledgers cached in memory, persisted as JSON).
//!
//! Ledgers are loaded lazily on first access and kept resident. Every
//! mutation is applied to a copy of the ledger, persisted, and only then
//! committed, so a failed write never leaves memory ahead of disk.
//!
//! With `deferred_flush` enabled, mutations commit in memory only and are
//! written on [`ReservationStore::flush`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;

use crate::persistence::ledger::{
    delete_ledger, list_chat_ids, load_ledger_file, quarantine_ledger, save_ledger,
    LedgerFileError,
};
use crate::persistence::types::{ChatId, ChatLedger, ReservationId, ReservationRecord};

/// Errors surfaced to callers of the store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// The record was rejected before any state changed.
    #[error("Invalid reservation: {0}")]
    InvalidArgument(String),

    /// The ledger file exists but could not be read (not a parse problem).
    #[error("Failed to read chat {chat_id}: {source}")]
    LoadFailure {
        chat_id: ChatId,
        #[source]
        source: LedgerFileError,
    },

    /// Writing to disk failed; the operation did not take effect.
    #[error("Failed to persist chat {chat_id}: {source}")]
    PersistenceFailure {
        chat_id: ChatId,
        #[source]
        source: LedgerFileError,
    },
}

/// How a chat's ledger came to be resident.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// Nothing on disk; started empty.
    Fresh,
    /// Read from disk.
    Loaded,
    /// On-disk data was unreadable and was replaced by an empty ledger.
    UnrecoverableChatData,
}

/// Options for [`ReservationStore`].
#[derive(Debug, Clone, Default)]
pub struct StoreOptions {
    /// Only write to disk on explicit `flush()`.
    pub deferred_flush: bool,
}

/// Resident state for one chat.
struct LedgerSlot {
    ledger: ChatLedger,
    /// What is known to be on disk. `None` means no file.
    persisted: Option<ChatLedger>,
    /// `None` until the first access loads the ledger.
    outcome: Option<LoadOutcome>,
    /// Set by `drop_chat`; holders of a stale slot must look it up again.
    dropped: bool,
}

impl LedgerSlot {
    fn new(chat_id: ChatId) -> Self {
        Self {
            ledger: ChatLedger::empty(chat_id),
            persisted: None,
            outcome: None,
            dropped: false,
        }
    }

    /// True if writing `ledger` would not change what's on disk.
    fn matches_disk(&self, ledger: &ChatLedger) -> bool {
        match &self.persisted {
            Some(persisted) => persisted == ledger,
            None => ledger.is_empty(),
        }
    }

    fn is_dirty(&self) -> bool {
        self.outcome.is_some() && !self.matches_disk(&self.ledger)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Process-wide persistence facade for reservation ledgers.
///
/// Thread-safe: the slot map is guarded by one mutex that is only held for
/// lookups, and each chat has its own mutex held across load-mutate-persist.
pub struct ReservationStore {
    root: PathBuf,
    options: StoreOptions,
    /// Resident chats: chat_id -> Arc<Mutex<LedgerSlot>>
    slots: Mutex<HashMap<ChatId, Arc<Mutex<LedgerSlot>>>>,
}

impl ReservationStore {
    /// Create a store persisting ledgers under `root`.
    ///
    /// Nothing is read until a chat is first accessed.
    pub fn new(root: impl Into<PathBuf>, options: StoreOptions) -> Self {
        Self {
            root: root.into(),
            options,
            slots: Mutex::new(HashMap::new()),
        }
    }

    /// Directory holding the ledger files.
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn is_deferred(&self) -> bool {
        self.options.deferred_flush
    }

    // ------------------------------------------------------------------------
    // Read operations
    // ------------------------------------------------------------------------

    /// Snapshot of the chat's ledger. Empty if the chat has no data.
    pub fn get_ledger(&self, chat_id: ChatId) -> Result<ChatLedger, StoreError> {
        self.with_slot(chat_id, |slot| Ok(slot.ledger.clone()))
    }

    /// All records in the chat matching `predicate`, oldest first.
    pub fn find<P>(&self, chat_id: ChatId, predicate: P) -> Result<Vec<ReservationRecord>, StoreError>
    where
        P: Fn(&ReservationRecord) -> bool,
    {
        self.with_slot(chat_id, |slot| {
            Ok(slot
                .ledger
                .sorted()
                .into_iter()
                .filter(|r| predicate(*r))
                .cloned()
                .collect())
        })
    }

    /// Reservations made by `username`, oldest first.
    pub fn find_by_username(
        &self,
        chat_id: ChatId,
        username: &str,
    ) -> Result<Vec<ReservationRecord>, StoreError> {
        self.find(chat_id, |r| r.username == username)
    }

    /// Reservations for `date`, oldest first.
    pub fn find_by_date(
        &self,
        chat_id: ChatId,
        date: &str,
    ) -> Result<Vec<ReservationRecord>, StoreError> {
        self.find(chat_id, |r| r.date == date)
    }

    /// How the chat's ledger was obtained, if it is resident.
    pub fn load_outcome(&self, chat_id: ChatId) -> Option<LoadOutcome> {
        let slot = lock(&self.slots).get(&chat_id).cloned()?;
        let outcome = lock(&slot).outcome;
        outcome
    }

    /// Chats that are resident or have a ledger on disk.
    pub fn chat_ids(&self) -> Result<Vec<ChatId>, LedgerFileError> {
        let mut ids = list_chat_ids(&self.root)?;
        ids.extend(lock(&self.slots).keys().copied());
        ids.sort_unstable();
        ids.dedup();
        Ok(ids)
    }

    // ------------------------------------------------------------------------
    // Write operations
    // ------------------------------------------------------------------------

    /// Insert `record`, replacing any reservation for the same
    /// `(username, date)`. Returns the identity the record was stored under.
    ///
    /// A caller-supplied id already held by a different `(username, date)`
    /// is rejected with `InvalidArgument`.
    pub fn upsert(
        &self,
        chat_id: ChatId,
        mut record: ReservationRecord,
    ) -> Result<ReservationId, StoreError> {
        validate(&record)?;

        let id = record.id.take().unwrap_or_default();
        self.mutate(chat_id, |ledger| {
            if let Some(held) = ledger.get(&id) {
                if !held.matches(&record.username, &record.date) {
                    return Err(StoreError::InvalidArgument(format!(
                        "id {id} already belongs to {} for {}",
                        held.username, held.date
                    )));
                }
            }
            ledger.remove_matching(&record.username, &record.date);
            ledger.insert(id.clone(), record);
            Ok(())
        })?;

        log::debug!("Chat {chat_id}: stored reservation {id}");
        Ok(id)
    }

    /// Delete every reservation of `username` for `date`.
    ///
    /// Returns the number removed; zero matches is not an error.
    pub fn remove(&self, chat_id: ChatId, username: &str, date: &str) -> Result<usize, StoreError> {
        let mut removed = 0;
        self.mutate(chat_id, |ledger| {
            removed = ledger.remove_matching(username, date);
            Ok(())
        })?;

        if removed > 0 {
            log::debug!("Chat {chat_id}: removed {removed} reservation(s) of {username} for {date}");
        }
        Ok(removed)
    }

    /// Forget a chat entirely, in memory and on disk.
    pub fn drop_chat(&self, chat_id: ChatId) -> Result<(), StoreError> {
        // Map lock stays held so no new slot for this chat appears mid-delete.
        let mut slots = lock(&self.slots);

        if let Some(slot) = slots.remove(&chat_id) {
            lock(&slot).dropped = true;
        }

        delete_ledger(&self.root, chat_id)
            .map_err(|source| StoreError::PersistenceFailure { chat_id, source })?;

        log::info!("Chat {chat_id}: dropped");
        Ok(())
    }

    /// Write every resident ledger that differs from what is on disk.
    ///
    /// All chats are attempted; the first failure is returned.
    pub fn flush(&self) -> Result<(), StoreError> {
        let slots: Vec<Arc<Mutex<LedgerSlot>>> = lock(&self.slots).values().cloned().collect();

        let mut first_error = None;
        let mut written = 0;

        for slot in slots {
            let mut slot = lock(&slot);
            if slot.dropped || !slot.is_dirty() {
                continue;
            }
            let ledger = slot.ledger.clone();
            match self.persist(&mut slot, ledger) {
                Ok(()) => written += 1,
                Err(e) => {
                    first_error.get_or_insert(e);
                }
            }
        }

        if written > 0 {
            log::info!("Flushed {written} chat ledger(s)");
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    /// Run `f` on the chat's slot, loading the ledger first if needed.
    fn with_slot<R>(
        &self,
        chat_id: ChatId,
        f: impl FnOnce(&mut LedgerSlot) -> Result<R, StoreError>,
    ) -> Result<R, StoreError> {
        loop {
            let slot = Arc::clone(
                lock(&self.slots)
                    .entry(chat_id)
                    .or_insert_with(|| Arc::new(Mutex::new(LedgerSlot::new(chat_id)))),
            );

            let mut guard = lock(&slot);
            if guard.dropped {
                continue;
            }
            if guard.outcome.is_none() {
                self.load_into(&mut *guard, chat_id)?;
            }
            return f(&mut *guard);
        }
    }

    /// Apply `change` to a copy of the ledger, persist it, then commit.
    ///
    /// If `change` fails the copy is discarded.
    fn mutate(
        &self,
        chat_id: ChatId,
        change: impl FnOnce(&mut ChatLedger) -> Result<(), StoreError>,
    ) -> Result<(), StoreError> {
        self.with_slot(chat_id, |slot| {
            let mut next = slot.ledger.clone();
            change(&mut next)?;

            if self.options.deferred_flush {
                slot.ledger = next;
                return Ok(());
            }

            self.persist(slot, next)
        })
    }

    /// Write `ledger` unless it matches what's on disk, then make it resident.
    fn persist(&self, slot: &mut LedgerSlot, ledger: ChatLedger) -> Result<(), StoreError> {
        if !slot.matches_disk(&ledger) {
            save_ledger(&self.root, &ledger).map_err(|source| {
                let chat_id = ledger.chat_id;
                log::error!("Chat {chat_id}: failed to save ledger: {source}");
                StoreError::PersistenceFailure { chat_id, source }
            })?;
            slot.persisted = Some(ledger.clone());
        }

        slot.ledger = ledger;
        Ok(())
    }

    fn load_into(&self, slot: &mut LedgerSlot, chat_id: ChatId) -> Result<(), StoreError> {
        let loaded = load_ledger_file(&self.root, chat_id).and_then(|file| match file {
            Some(file) => {
                let assigned = file.missing_ids();
                Ok(Some((ChatLedger::try_from(file)?, assigned)))
            }
            None => Ok(None),
        });

        match loaded {
            Ok(Some((ledger, assigned))) => {
                log::debug!("Chat {chat_id}: loaded {} reservation(s)", ledger.len());
                slot.ledger = ledger.clone();
                slot.persisted = Some(ledger);
                slot.outcome = Some(LoadOutcome::Loaded);
                if assigned > 0 {
                    self.write_back_assigned_ids(slot, chat_id, assigned);
                }
            }
            Ok(None) => {
                slot.ledger = ChatLedger::empty(chat_id);
                slot.persisted = None;
                slot.outcome = Some(LoadOutcome::Fresh);
            }
            Err(LedgerFileError::Io(e)) => {
                log::error!("Chat {chat_id}: failed to read ledger: {e}");
                return Err(StoreError::LoadFailure {
                    chat_id,
                    source: LedgerFileError::Io(e),
                });
            }
            Err(e) => {
                log::warn!("Chat {chat_id}: unrecoverable ledger data, starting empty: {e}");
                match quarantine_ledger(&self.root, chat_id) {
                    Ok(Some(path)) => {
                        log::warn!("Chat {chat_id}: moved bad file to {}", path.display())
                    }
                    Ok(None) => {}
                    Err(e) => log::error!("Chat {chat_id}: could not quarantine ledger: {e}"),
                }
                slot.ledger = ChatLedger::empty(chat_id);
                slot.persisted = None;
                slot.outcome = Some(LoadOutcome::UnrecoverableChatData);
            }
        }
        Ok(())
    }

    /// Records loaded without an id were given one in memory; the file must
    /// carry the same ids or they change on every restart.
    fn write_back_assigned_ids(&self, slot: &mut LedgerSlot, chat_id: ChatId, assigned: usize) {
        log::info!("Chat {chat_id}: assigned ids to {assigned} stored reservation(s)");

        // The file on disk no longer matches memory
        slot.persisted = None;

        if self.options.deferred_flush {
            return;
        }
        let ledger = slot.ledger.clone();
        if let Err(e) = self.persist(slot, ledger) {
            // Still dirty; the next mutation or flush retries the write
            log::warn!("Chat {chat_id}: could not write back assigned ids: {e}");
        }
    }
}

fn validate(record: &ReservationRecord) -> Result<(), StoreError> {
    if record.username.trim().is_empty() {
        return Err(StoreError::InvalidArgument("username is empty".to_string()));
    }
    if record.date.trim().is_empty() {
        return Err(StoreError::InvalidArgument("date is empty".to_string()));
    }
    if record.num_participants == 0 {
        return Err(StoreError::InvalidArgument(
            "num_participants must be at least 1".to_string(),
        ));
    }
    if !record.timestamp.is_finite() {
        return Err(StoreError::InvalidArgument(
            "timestamp must be finite".to_string(),
        ));
    }
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================
