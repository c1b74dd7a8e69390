//! Every backend must honor the same checkpoint store contract.

use chrono::{TimeZone, Utc};
use std::sync::Arc;
use tidemark_store::{
    Checkpoint, CheckpointStore, CheckpointValue, FileStore, InMemoryStore, SqliteConfig,
    SqliteStore, StoreError, StreamName,
};

fn backends(dir: &std::path::Path) -> Vec<(&'static str, Arc<dyn CheckpointStore>)> {
    vec![
        ("memory", Arc::new(InMemoryStore::new())),
        ("file", Arc::new(FileStore::open(&dir.join("files")).unwrap())),
        (
            "sqlite",
            Arc::new(SqliteStore::open(&SqliteConfig::new(dir.join("state.db"))).unwrap()),
        ),
    ]
}

#[test]
fn value_and_offset_round_trip_together() {
    let dir = tempfile::tempdir().unwrap();
    let ts = Utc.with_ymd_and_hms(2022, 12, 31, 23, 59, 59).unwrap();
    let values = [
        None,
        Some(CheckpointValue::Integer(-5)),
        Some(CheckpointValue::Text("cursor-19".into())),
        Some(CheckpointValue::Timestamp(ts)),
    ];

    for (label, store) in backends(dir.path()) {
        for (i, value) in values.iter().enumerate() {
            let stream = StreamName::new(format!("stream_{i}"));
            let mut cp = Checkpoint::new(stream.clone(), value.clone(), i as u64 * 100);
            store.save(&mut cp).unwrap();

            let loaded = store.load(&stream).unwrap().unwrap();
            assert_eq!(loaded.value(), value.as_ref(), "{label}");
            assert_eq!(loaded.offset(), i as u64 * 100, "{label}");
            assert!(loaded.modified().is_some(), "{label}");
        }
    }
}

#[test]
fn create_never_overwrites_progress() {
    let dir = tempfile::tempdir().unwrap();

    for (label, store) in backends(dir.path()) {
        let stream = StreamName::new("orders");
        let mut cp = Checkpoint::new(stream.clone(), Some(10.into()), 0);
        store.create(&cp).unwrap();

        cp.set_position(Some(99.into()), 0);
        store.save(&mut cp).unwrap();

        let restart = Checkpoint::new(stream.clone(), Some(0.into()), 0);
        let err = store.create(&restart).unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(_)), "{label}");
        assert!(!err.is_transient(), "{label}");

        let loaded = store.load(&stream).unwrap().unwrap();
        assert_eq!(loaded.value(), Some(&CheckpointValue::Integer(99)), "{label}");
    }
}

#[test]
fn streams_are_independent() {
    let dir = tempfile::tempdir().unwrap();

    for (label, store) in backends(dir.path()) {
        let mut a = Checkpoint::new(StreamName::new("a"), Some(1.into()), 0);
        let mut b = Checkpoint::new(StreamName::new("b"), Some(2.into()), 7);
        store.save(&mut a).unwrap();
        store.save(&mut b).unwrap();

        assert!(store.delete(&StreamName::new("a")).unwrap(), "{label}");
        assert!(store.load(&StreamName::new("a")).unwrap().is_none(), "{label}");

        let b = store.load(&StreamName::new("b")).unwrap().unwrap();
        assert_eq!(b.offset(), 7, "{label}");
        assert_eq!(store.streams().unwrap(), vec![StreamName::new("b")], "{label}");
    }
}
