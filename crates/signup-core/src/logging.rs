//! Conversation transcript logging.
//!
//! Appends one timestamped line per inbound command and outbound reply to
//! `{log_dir}/{log_id}.log`. Diagnostics go through the `log` facade; this
//! file is only the bot's conversation record.

use std::{
    fs::{File, OpenOptions},
    io::Write,
    path::Path,
    sync::{Arc, Mutex},
};

use chrono::{SecondsFormat, Utc};

/// Thread-safe handle to an append-only log file.
pub type LogHandle = Arc<Mutex<Option<File>>>;

/// Direction marker for inbound messages.
pub const INBOUND: &str = "IN";
/// Direction marker for outbound replies.
pub const OUTBOUND: &str = "OUT";

/// Current UTC time as ISO 8601 with milliseconds (e.g. 2026-02-04T10:15:30.123Z).
fn utc_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Write a timestamped line to the log file (if present).
///
/// Newlines in `data` are escaped so each message stays on one line.
pub fn log_line(handle: &LogHandle, direction: &str, data: &str) {
    if let Ok(mut guard) = handle.lock() {
        if let Some(ref mut file) = *guard {
            let ts = utc_timestamp();
            let data = data.replace('\n', "\\n");
            let _ = writeln!(file, "[{}] {}: {}", ts, direction, data);
            let _ = file.flush();
        }
    }
}

/// Open (or create) a log file at `{log_dir}/{log_id}.log` and return a shared handle.
///
/// With no directory, or if the file can't be opened, the handle is inert.
pub fn open_log_file(log_dir: Option<&Path>, log_id: &str) -> LogHandle {
    let file = log_dir.and_then(|dir| {
        let path = dir.join(format!("{}.log", log_id));
        std::fs::create_dir_all(dir).ok()?;
        match OpenOptions::new().create(true).append(true).open(&path) {
            Ok(file) => Some(file),
            Err(e) => {
                log::warn!("Cannot open transcript {}: {}", path.display(), e);
                None
            }
        }
    });
    Arc::new(Mutex::new(file))
}
