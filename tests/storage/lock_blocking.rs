//! Lock Blocking Tests
//!
//! Writers block on other transactions' locks until release or the lock
//! wait timeout.

use crate::common::*;
use interleave::{
    IsolationLevel, MemoryStore, Predicate, StoreConfig, StoreError, TransactionScope,
    TransactionalStore,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Start `op` on another thread and report whether it finished
fn spawn_tracked<F>(op: F) -> (Arc<AtomicBool>, thread::JoinHandle<Result<(), StoreError>>)
where
    F: FnOnce() -> Result<(), StoreError> + Send + 'static,
{
    let done = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&done);
    let handle = thread::spawn(move || {
        let result = op();
        flag.store(true, Ordering::SeqCst);
        result
    });
    (done, handle)
}

#[test]
fn serializable_read_blocks_writer_until_commit() {
    let store = MemoryStore::new();
    seed(&store, &[("a", 0)]);

    let mut reader = store.begin(IsolationLevel::Serializable).unwrap();
    reader.read_balance("a").unwrap();

    let writer_store = store.clone();
    let (done, handle) = spawn_tracked(move || {
        let mut writer = writer_store.begin(IsolationLevel::ReadCommitted)?;
        writer.adjust_balance("a", 1)?;
        writer.commit().map(|_| ())
    });

    thread::sleep(Duration::from_millis(50));
    assert!(!done.load(Ordering::SeqCst));

    reader.commit().unwrap();
    handle.join().unwrap().unwrap();
    assert_eq!(committed_balance(&store, "a"), 1);
}

#[test]
fn exclusive_lock_wait_times_out() {
    let store = quick_store();
    seed(&store, &[("a", 0)]);

    let mut holder = store.begin(IsolationLevel::ReadCommitted).unwrap();
    holder.adjust_balance("a", 1).unwrap();

    let mut waiter = store.begin(IsolationLevel::ReadCommitted).unwrap();
    let started = Instant::now();
    let err = waiter.adjust_balance("a", 1).unwrap_err();
    assert!(started.elapsed() >= Duration::from_millis(100));
    match err {
        StoreError::LockWaitTimeout { account, waited_ms } => {
            assert_eq!(account, "a");
            assert!(waited_ms >= 100);
        }
        other => panic!("unexpected error: {other}"),
    }

    holder.commit().unwrap();
    waiter.adjust_balance("a", 1).unwrap();
    waiter.commit().unwrap();
    assert_eq!(committed_balance(&store, "a"), 2);
}

#[test]
fn predicate_lock_blocks_insert() {
    let store = MemoryStore::new();
    seed(&store, &[("a", 0)]);

    let mut reader = store.begin(IsolationLevel::Serializable).unwrap();
    assert_eq!(reader.count_where(&Predicate::balance_gt(0)).unwrap(), 0);

    let writer_store = store.clone();
    let (done, handle) = spawn_tracked(move || {
        let mut writer = writer_store.begin(IsolationLevel::ReadCommitted)?;
        writer.create_account("b")?;
        writer.commit().map(|_| ())
    });

    thread::sleep(Duration::from_millis(50));
    assert!(!done.load(Ordering::SeqCst));

    assert_eq!(reader.count_where(&Predicate::balance_gt(0)).unwrap(), 0);
    reader.abort("done reading");
    handle.join().unwrap().unwrap();
    assert_eq!(committed_names(&store), vec!["a", "b"]);
}

#[test]
fn read_committed_reads_never_block() {
    let store = quick_store();
    seed(&store, &[("a", 0)]);

    let mut writer = store.begin(IsolationLevel::ReadCommitted).unwrap();
    writer.adjust_balance("a", 5).unwrap();

    let mut reader = store.begin(IsolationLevel::ReadCommitted).unwrap();
    let started = Instant::now();
    assert_eq!(reader.read_balance("a").unwrap(), 0);
    assert_eq!(reader.count_where(&Predicate::balance_gt(0)).unwrap(), 0);
    assert!(started.elapsed() < Duration::from_millis(100));
}

#[test]
fn dropped_scope_releases_locks() {
    let store = quick_store();
    seed(&store, &[("a", 0)]);
    {
        let mut scope = store.begin(IsolationLevel::Serializable).unwrap();
        scope.read_balance("a").unwrap();
        scope.adjust_balance("a", 3).unwrap();
        assert!(store.has_active_locks());
    }
    assert!(!store.has_active_locks());
    assert_eq!(committed_balance(&store, "a"), 0);
}

#[test]
fn writer_whose_target_was_renamed_keeps_only_the_new_row() {
    let store = MemoryStore::with_config(
        StoreConfig::default().with_lock_wait_timeout(Duration::from_millis(500)),
    );
    seed(&store, &[("account1", 0), ("account2", 0)]);

    let mut renamer = store.begin(IsolationLevel::ReadCommitted).unwrap();
    renamer.rename_account("account1", "account3").unwrap();
    renamer.rename_account("account2", "account1").unwrap();

    let writer_store = store.clone();
    let writer = thread::spawn(move || {
        let mut writer = writer_store.begin(IsolationLevel::ReadCommitted).unwrap();
        let written = writer.adjust_balance("account1", 5);
        (writer, written)
    });

    thread::sleep(Duration::from_millis(50));
    renamer.commit().unwrap();

    let (mut writer, written) = writer.join().unwrap();
    let written = written.unwrap();
    assert_eq!(written.name, "account1");
    assert_eq!(written.balance, 5);
    assert_eq!(writer.held_locks(), 1);

    // The row the writer first waited on is free again
    let mut other = store.begin(IsolationLevel::ReadCommitted).unwrap();
    let started = Instant::now();
    other.adjust_balance("account3", 1).unwrap();
    assert!(started.elapsed() < Duration::from_millis(500));
    other.commit().unwrap();

    writer.commit().unwrap();
    assert_eq!(committed_balance(&store, "account1"), 5);
    assert_eq!(committed_balance(&store, "account3"), 1);
    assert!(!store.has_active_locks());
}
