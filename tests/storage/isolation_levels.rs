//! Isolation Level Tests
//!
//! What a reader sees of another transaction's uncommitted and committed
//! writes, per level.

use crate::common::*;
use interleave::{IsolationLevel, Predicate, TransactionScope, TransactionalStore};

fn bump(store: &interleave::MemoryStore, name: &str, delta: i64) {
    let mut writer = store.begin(IsolationLevel::ReadCommitted).unwrap();
    writer.adjust_balance(name, delta).unwrap();
    writer.commit().unwrap();
}

#[test]
fn uncommitted_write_visibility_per_level() {
    let store = quick_store();
    seed(&store, &[("a", 0)]);

    let mut writer = store.begin(IsolationLevel::ReadCommitted).unwrap();
    writer.adjust_balance("a", 100).unwrap();

    for (level, expected) in [
        (IsolationLevel::ReadUncommitted, 100),
        (IsolationLevel::ReadCommitted, 0),
        (IsolationLevel::RepeatableRead, 0),
    ] {
        let mut reader = store.begin(level).unwrap();
        assert_eq!(reader.read_balance("a").unwrap(), expected, "{level}");
        reader.commit().unwrap();
    }

    writer.abort("done");
    assert_eq!(committed_balance(&store, "a"), 0);
}

#[test]
fn read_committed_sees_each_commit() {
    let store = quick_store();
    seed(&store, &[("a", 0)]);

    let mut reader = store.begin(IsolationLevel::ReadCommitted).unwrap();
    assert_eq!(reader.read_balance("a").unwrap(), 0);
    bump(&store, "a", 5);
    assert_eq!(reader.read_balance("a").unwrap(), 5);
    bump(&store, "a", 5);
    assert_eq!(reader.read_balance("a").unwrap(), 10);
}

#[test]
fn snapshot_levels_keep_begin_state() {
    for level in [IsolationLevel::RepeatableRead, IsolationLevel::Serializable] {
        let store = quick_store();
        seed(&store, &[("a", 0), ("b", 0)]);

        let mut reader = store.begin(level).unwrap();
        bump(&store, "b", 7);

        // Never read before the commit, still served from the begin snapshot
        assert_eq!(reader.read_balance("b").unwrap(), 0, "{level}");
        assert_eq!(
            reader.count_where(&Predicate::balance_gt(0)).unwrap(),
            0,
            "{level}"
        );
        reader.commit().unwrap();
    }
}

#[test]
fn rows_created_after_snapshot_are_invisible() {
    let store = quick_store();
    seed(&store, &[("a", 0)]);

    let mut reader = store.begin(IsolationLevel::RepeatableRead).unwrap();
    seed(&store, &[("late", 3)]);

    let names: Vec<_> = reader
        .list_accounts()
        .unwrap()
        .into_iter()
        .map(|e| e.name)
        .collect();
    assert_eq!(names, vec!["a"]);
    assert!(reader.find_account("late").is_err());
}

#[test]
fn writes_are_current_reads_even_at_repeatable_read() {
    let store = quick_store();
    seed(&store, &[("a", 0)]);

    let mut reader = store.begin(IsolationLevel::RepeatableRead).unwrap();
    assert_eq!(reader.read_balance("a").unwrap(), 0);
    bump(&store, "a", 10);

    // The write starts from the latest committed value, not the snapshot
    reader.adjust_balance("a", 1).unwrap();
    assert_eq!(reader.read_balance("a").unwrap(), 11);
    reader.abort("inspect only");
}

#[test]
fn unsupported_level_rejected_at_begin() {
    let store = interleave::MemoryStore::with_config(
        interleave::StoreConfig::default()
            .with_supported_levels(vec![IsolationLevel::ReadCommitted]),
    );
    assert!(!store.supports(IsolationLevel::Serializable));
    let err = store.begin(IsolationLevel::Serializable).unwrap_err();
    assert!(err.is_unsupported_level());
}
