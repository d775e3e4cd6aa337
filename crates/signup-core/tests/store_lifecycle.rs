//! End-to-end store behavior across process restarts.

use std::fs;
use std::sync::Arc;

use signup_core::managers::LoadOutcome;
use signup_core::persistence::load_ledger;
use signup_core::{
    BotConfig, CommandHandler, IncomingMessage, ReservationRecord, ReservationStore, StoreOptions,
};
use tempfile::tempdir;

const CHAT: i64 = -762022584;

#[test]
fn bob_signs_up_changes_his_mind_and_cancels() {
    let dir = tempdir().unwrap();
    let store = ReservationStore::new(dir.path(), StoreOptions::default());

    let first = store
        .upsert(CHAT, ReservationRecord::new("bob", "12.8", 2))
        .unwrap();
    let mine = store.find_by_username(CHAT, "bob").unwrap();
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].date, "12.8");
    assert_eq!(mine[0].num_participants, 2);
    assert_eq!(mine[0].id.as_ref(), Some(&first));

    let second = store
        .upsert(CHAT, ReservationRecord::new("bob", "12.8", 5))
        .unwrap();
    let mine = store.find_by_username(CHAT, "bob").unwrap();
    assert_eq!(mine.len(), 1);
    assert_eq!(mine[0].num_participants, 5);
    assert_eq!(mine[0].id.as_ref(), Some(&second));

    assert_eq!(store.remove(CHAT, "bob", "12.8").unwrap(), 1);
    assert!(store.find_by_username(CHAT, "bob").unwrap().is_empty());
}

#[test]
fn ledger_survives_restart_field_for_field() {
    let dir = tempdir().unwrap();

    let before = {
        let store = ReservationStore::new(dir.path(), StoreOptions { deferred_flush: true });
        store
            .upsert(
                CHAT,
                ReservationRecord::new("bob", "12.8", 2).with_timestamp(1_691_836_800.123_456),
            )
            .unwrap();
        store
            .upsert(
                CHAT,
                ReservationRecord::new("ann", "19.8", 7).with_timestamp(1_691_836_800.1),
            )
            .unwrap();
        store.flush().unwrap();
        store.get_ledger(CHAT).unwrap()
    };

    let store = ReservationStore::new(dir.path(), StoreOptions::default());
    let after = store.get_ledger(CHAT).unwrap();

    assert_eq!(after, before);
    let names: Vec<_> = store
        .find(CHAT, |_| true)
        .unwrap()
        .into_iter()
        .map(|r| r.username)
        .collect();
    assert_eq!(names, vec!["ann", "bob"]);
}

#[test]
fn crash_between_temp_write_and_rename_keeps_old_ledger() {
    let dir = tempdir().unwrap();
    {
        let store = ReservationStore::new(dir.path(), StoreOptions::default());
        store
            .upsert(CHAT, ReservationRecord::new("bob", "12.8", 2))
            .unwrap();
    }

    // A half-written temp file is what a crash before the rename leaves behind
    fs::write(
        dir.path().join(format!("{CHAT}.json.tmp")),
        "{\"chatId\": -762022584, \"reservations\": [{\"user",
    )
    .unwrap();

    let store = ReservationStore::new(dir.path(), StoreOptions::default());
    let mine = store.find_by_username(CHAT, "bob").unwrap();

    assert_eq!(mine.len(), 1);
    assert_eq!(store.load_outcome(CHAT), Some(LoadOutcome::Loaded));

    // The next save replaces the stale temp file
    store
        .upsert(CHAT, ReservationRecord::new("ann", "19.8", 1))
        .unwrap();
    assert!(!dir.path().join(format!("{CHAT}.json.tmp")).exists());
    assert_eq!(load_ledger(dir.path(), CHAT).unwrap().unwrap().len(), 2);
}

#[test]
fn deferred_store_flushes_what_commands_changed() {
    let dir = tempdir().unwrap();
    let config = BotConfig {
        deferred_flush: true,
        ..BotConfig::default()
    };
    let store = Arc::new(ReservationStore::new(dir.path(), config.store_options()));
    let handler = CommandHandler::new(Arc::clone(&store), Arc::new(config));

    for (user, text) in [("bob", "/signup 12.8 2"), ("ann", "/signup 19.8")] {
        handler.handle(&IncomingMessage {
            chat_id: CHAT,
            username: Some(user),
            text,
        });
    }
    assert!(load_ledger(dir.path(), CHAT).unwrap().is_none());

    store.flush().unwrap();

    let on_disk = load_ledger(dir.path(), CHAT).unwrap().unwrap();
    assert_eq!(on_disk, store.get_ledger(CHAT).unwrap());
    assert_eq!(on_disk.len(), 2);
}
