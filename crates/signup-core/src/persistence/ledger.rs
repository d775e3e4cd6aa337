//! Ledger file persistence operations.
//!
//! # File Structure
//!
//! Each chat's ledger is saved to:
//! ```text
//! {data_dir}/chat_data/{chat_id}.json
//! ```
//!
//! # Design Notes
//!
//! - **Atomic writes**: Write to temp file, sync, then rename
//! - **Quarantine**: Unreadable files are moved aside, never overwritten

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use thiserror::Error;

use super::types::{ChatId, ChatLedger, LedgerFile, ReservationId};

/// Error type for ledger file operations.
#[derive(Error, Debug)]
pub enum LedgerFileError {
    /// IO error (permission denied, disk full, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The file claims to belong to a different chat
    #[error("Ledger file for chat {expected} contains chat {found}")]
    ChatIdMismatch { expected: ChatId, found: ChatId },

    /// Two records in one file share an identity
    #[error("Reservation id {0} appears more than once")]
    DuplicateId(ReservationId),
}

fn ledger_path(dir: &Path, chat_id: ChatId) -> PathBuf {
    dir.join(format!("{chat_id}.json"))
}

fn temp_path(dir: &Path, chat_id: ChatId) -> PathBuf {
    dir.join(format!("{chat_id}.json.tmp"))
}

/// First free `{chat_id}.json.corrupt[.N]` so earlier evidence is kept.
fn quarantine_path(dir: &Path, chat_id: ChatId) -> PathBuf {
    let first = dir.join(format!("{chat_id}.json.corrupt"));
    if !first.exists() {
        return first;
    }
    (1..)
        .map(|n| dir.join(format!("{chat_id}.json.corrupt.{n}")))
        .find(|path| !path.exists())
        .unwrap_or(first)
}

/// Save a ledger to disk.
///
/// # Atomic Write Strategy
///
/// 1. Write to `{chat_id}.json.tmp` and sync it
/// 2. Rename to `{chat_id}.json`
///
/// A crash before the rename leaves the previous file untouched.
pub fn save_ledger(dir: &Path, ledger: &ChatLedger) -> Result<(), LedgerFileError> {
    fs::create_dir_all(dir)?;

    let file_path = ledger_path(dir, ledger.chat_id);
    let temp_path = temp_path(dir, ledger.chat_id);

    let json = serde_json::to_string_pretty(&LedgerFile::from(ledger))?;

    let mut file = fs::File::create(&temp_path)?;
    file.write_all(json.as_bytes())?;
    file.sync_all()?;
    drop(file);

    fs::rename(&temp_path, &file_path)?;

    Ok(())
}

/// Read the raw ledger file for `chat_id`.
///
/// Returns `Ok(None)` if nothing has been saved for this chat yet. Bytes that
/// aren't valid JSON (including bad UTF-8) are a `Json` error, not `Io`.
pub fn load_ledger_file(dir: &Path, chat_id: ChatId) -> Result<Option<LedgerFile>, LedgerFileError> {
    let file_path = ledger_path(dir, chat_id);

    if !file_path.exists() {
        return Ok(None);
    }

    let bytes = fs::read(&file_path)?;
    let file: LedgerFile = serde_json::from_slice(&bytes)?;

    if file.chat_id != chat_id {
        return Err(LedgerFileError::ChatIdMismatch {
            expected: chat_id,
            found: file.chat_id,
        });
    }

    Ok(Some(file))
}

/// Load a ledger from disk.
///
/// Returns `Ok(None)` if nothing has been saved for this chat yet.
pub fn load_ledger(dir: &Path, chat_id: ChatId) -> Result<Option<ChatLedger>, LedgerFileError> {
    load_ledger_file(dir, chat_id)?
        .map(ChatLedger::try_from)
        .transpose()
}

/// Delete a ledger from disk.
///
/// `Ok(())` if deleted or it didn't exist. A stale temp file is removed too.
pub fn delete_ledger(dir: &Path, chat_id: ChatId) -> Result<(), LedgerFileError> {
    for path in [ledger_path(dir, chat_id), temp_path(dir, chat_id)] {
        if path.exists() {
            fs::remove_file(&path)?;
        }
    }

    Ok(())
}

/// Move an unreadable ledger file aside to `{chat_id}.json.corrupt`.
///
/// If that name is taken by an earlier quarantine, `.1`, `.2`, ... is
/// appended instead.
///
/// Returns the new location, or `None` if there was no file to move.
pub fn quarantine_ledger(dir: &Path, chat_id: ChatId) -> Result<Option<PathBuf>, LedgerFileError> {
    let file_path = ledger_path(dir, chat_id);

    if !file_path.exists() {
        return Ok(None);
    }

    let target = quarantine_path(dir, chat_id);
    fs::rename(&file_path, &target)?;

    Ok(Some(target))
}

/// Check if a ledger file exists.
pub fn ledger_exists(dir: &Path, chat_id: ChatId) -> bool {
    ledger_path(dir, chat_id).exists()
}

/// List all chat IDs with a ledger file in `dir`.
///
/// Temp and quarantined files are skipped, as is anything whose stem
/// isn't an integer.
pub fn list_chat_ids(dir: &Path) -> Result<Vec<ChatId>, LedgerFileError> {
    let mut ids = Vec::new();

    if !dir.exists() {
        return Ok(ids);
    }

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();

        if path.extension().map(|e| e == "json").unwrap_or(false) {
            if let Some(id) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<ChatId>().ok())
            {
                ids.push(id);
            }
        }
    }

    ids.sort_unstable();
    Ok(ids)
}

// ============================================================================
// TESTS
// ============================================================================
