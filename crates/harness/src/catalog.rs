//! Canned anomaly scenarios
//!
//! Each function builds one classic read phenomenon (or its prevention) as a
//! two-worker scenario. Every cross-worker ordering is a barrier edge; the
//! only bounded wait is in [`phantom_read_prevented_serializable`], where
//! the writer is blocked by the reader's predicate lock and cannot signal
//! until the reader has finished.
//!
//! Writers that commit announce it with a `signal` step *after* `commit`,
//! so readers never observe a change before it is committed.

use crate::error::HarnessResult;
use crate::observation::Observation;
use crate::scenario::Scenario;
use crate::step::OnTimeout;
use crate::worker::WorkerSpec;
use interleave_core::{IsolationLevel, Predicate};

/// Balance every writer deposits
pub const DEPOSIT: i64 = 100;

const UPDATED: &str = "updated";
const READ: &str = "read";

/// Writer that deposits, lets the reader look, then rolls back
fn rolled_back_deposit(level: IsolationLevel, account: &str) -> WorkerSpec {
    WorkerSpec::new("writer", level)
        .adjust(account, DEPOSIT)
        .signal(UPDATED)
        .wait(READ)
        .abort("transaction rollback")
        .expect_abort()
}

/// Writer that waits for the reader's first read, deposits and commits
fn committed_deposit(level: IsolationLevel, account: &str) -> WorkerSpec {
    WorkerSpec::new("writer", level)
        .wait(READ)
        .adjust(account, DEPOSIT)
        .commit()
        .signal(UPDATED)
}

/// Reader that reads once after the writer's uncommitted deposit
fn read_once(level: IsolationLevel, account: &str, expected: i64) -> WorkerSpec {
    WorkerSpec::new("reader", level)
        .wait(UPDATED)
        .read(account, "balance")
        .assert(
            "read during concurrent update",
            "balance",
            Observation::Balance(expected),
        )
        .signal(READ)
}

/// Reader that reads before and after the writer's committed deposit
fn read_twice(
    reader: WorkerSpec,
    account: &str,
    first: i64,
    second: i64,
    invalidate: bool,
) -> WorkerSpec {
    let reader = reader
        .read(account, "first")
        .assert("before concurrent update", "first", Observation::Balance(first))
        .signal(READ)
        .wait(UPDATED);
    let reader = if invalidate {
        reader.invalidate_local_view()
    } else {
        reader
    };
    reader
        .read(account, "second")
        .assert("after concurrent commit", "second", Observation::Balance(second))
}

/// Reader that counts positive balances before and after the writer's deposit
fn count_twice(level: IsolationLevel, first: usize, second: usize) -> WorkerSpec {
    let positive = Predicate::balance_gt(0);
    WorkerSpec::new("reader", level)
        .count(positive, "first")
        .assert("before concurrent update", "first", Observation::Count(first))
        .signal(READ)
        .wait(UPDATED)
        .count(positive, "second")
        .assert("after concurrent update", "second", Observation::Count(second))
}

/// Scenario A: a read-uncommitted reader sees an uncommitted deposit
pub fn dirty_read_permitted() -> HarnessResult<Scenario> {
    let level = IsolationLevel::ReadUncommitted;
    Scenario::builder("dirty read permitted")
        .description("read-uncommitted reader observes a deposit that is later rolled back")
        .seed("accountA")
        .barrier(UPDATED, 1)
        .barrier(READ, 1)
        .worker(rolled_back_deposit(level, "accountA"))
        .worker(read_once(level, "accountA", DEPOSIT))
        .build()
}

/// Scenario B: a read-committed reader does not see an uncommitted deposit
pub fn dirty_read_prevented() -> HarnessResult<Scenario> {
    let level = IsolationLevel::ReadCommitted;
    Scenario::builder("dirty read prevented")
        .description("read-committed reader ignores a deposit that is later rolled back")
        .seed("accountB")
        .barrier(UPDATED, 1)
        .barrier(READ, 1)
        .worker(rolled_back_deposit(level, "accountB"))
        .worker(read_once(level, "accountB", 0))
        .build()
}

/// Scenario C: a read-committed reader sees a committed change on re-read
///
/// The reader goes through a session cache and invalidates it before the
/// second read, so the change it sees comes from the store.
pub fn nonrepeatable_read() -> HarnessResult<Scenario> {
    let level = IsolationLevel::ReadCommitted;
    let reader = WorkerSpec::new("reader", level).with_session_cache();
    Scenario::builder("non-repeatable read")
        .description("read-committed reader re-reads a row after a concurrent commit")
        .seed("accountC")
        .barrier(READ, 1)
        .barrier(UPDATED, 1)
        .worker(read_twice(reader, "accountC", 0, DEPOSIT, true))
        .worker(committed_deposit(level, "accountC"))
        .build()
}

/// Scenario D: a repeatable-read reader re-reads its snapshot
pub fn nonrepeatable_read_prevented() -> HarnessResult<Scenario> {
    let level = IsolationLevel::RepeatableRead;
    let reader = WorkerSpec::new("reader", level);
    Scenario::builder("non-repeatable read prevented")
        .description("repeatable-read reader keeps its snapshot across a concurrent commit")
        .seed("accountD")
        .barrier(READ, 1)
        .barrier(UPDATED, 1)
        .worker(read_twice(reader, "accountD", 0, 0, true))
        .worker(committed_deposit(level, "accountD"))
        .build()
}

/// Scenario E: a read-committed count picks up a row that starts matching
pub fn phantom_read() -> HarnessResult<Scenario> {
    let level = IsolationLevel::ReadCommitted;
    Scenario::builder("phantom read")
        .description("read-committed count changes after a concurrent commit")
        .seed("accountE")
        .barrier(READ, 1)
        .barrier(UPDATED, 1)
        .worker(count_twice(level, 0, 1))
        .worker(committed_deposit(level, "accountE"))
        .build()
}

/// A repeatable-read count is served from the snapshot
pub fn phantom_read_prevented_repeatable_read() -> HarnessResult<Scenario> {
    let level = IsolationLevel::RepeatableRead;
    Scenario::builder("phantom read prevented at repeatable read")
        .description("repeatable-read count ignores a concurrent commit")
        .seed("accountF")
        .barrier(READ, 1)
        .barrier(UPDATED, 1)
        .worker(count_twice(level, 0, 0))
        .worker(committed_deposit(level, "accountF"))
        .build()
}

/// Scenario E, serializable: the writer blocks on the reader's predicate lock
///
/// The reader cannot wait for the writer's commit, which only happens after
/// the reader ends, so its wait is bounded and it proceeds on timeout.
pub fn phantom_read_prevented_serializable() -> HarnessResult<Scenario> {
    let level = IsolationLevel::Serializable;
    let positive = Predicate::balance_gt(0);
    let reader = WorkerSpec::new("reader", level)
        .count(positive, "first")
        .assert("before concurrent update", "first", Observation::Count(0))
        .signal(READ)
        .wait_bounded(UPDATED, OnTimeout::Proceed)
        .count(positive, "second")
        .assert("while update is blocked", "second", Observation::Count(0));

    Scenario::builder("phantom read prevented at serializable")
        .description("serializable count holds a predicate lock that blocks the writer")
        .seed("accountF")
        .barrier(READ, 1)
        .barrier(UPDATED, 1)
        .worker(reader)
        .worker(committed_deposit(level, "accountF"))
        .build()
}

/// A read-committed reader behind a session cache re-reads its cached copy
pub fn application_level_repeatable_read() -> HarnessResult<Scenario> {
    let level = IsolationLevel::ReadCommitted;
    let reader = WorkerSpec::new("reader", level).with_session_cache();
    Scenario::builder("application-level repeatable read")
        .description("session cache hides a concurrent commit from a read-committed reader")
        .seed("accountG")
        .barrier(READ, 1)
        .barrier(UPDATED, 1)
        .worker(read_twice(reader, "accountG", 0, 0, false))
        .worker(committed_deposit(level, "accountG"))
        .build()
}

fn rename_swap(level: IsolationLevel, reader_cached: bool, expected: [&str; 2]) -> WorkerSpec {
    let reader = WorkerSpec::new("reader", level);
    let reader = if reader_cached {
        reader.with_session_cache()
    } else {
        reader
    };
    reader
        .read("account1", "account1")
        .signal(READ)
        .wait(UPDATED)
        .list("names")
        .assert("listing after rename swap", "names", Observation::names(expected))
}

fn renamer(level: IsolationLevel) -> WorkerSpec {
    WorkerSpec::new("renamer", level)
        .wait(READ)
        .rename("account1", "account3")
        .rename("account2", "account1")
        .commit()
        .signal(UPDATED)
}

/// A cached identity goes stale across a concurrent rename swap
///
/// The listing returns the cached `account1` for the first row and the
/// freshly renamed `account1` for the second.
pub fn stale_identity() -> HarnessResult<Scenario> {
    let level = IsolationLevel::ReadCommitted;
    Scenario::builder("stale identity")
        .description("read-committed reader with a session cache lists a duplicated name")
        .seed("account1")
        .seed("account2")
        .barrier(READ, 1)
        .barrier(UPDATED, 1)
        .worker(rename_swap(level, true, ["account1", "account1"]))
        .worker(renamer(level))
        .build()
}

/// The same rename swap is invisible to a repeatable-read reader
pub fn stale_identity_prevented() -> HarnessResult<Scenario> {
    let level = IsolationLevel::RepeatableRead;
    Scenario::builder("stale identity prevented")
        .description("repeatable-read reader lists the names of its snapshot")
        .seed("account1")
        .seed("account2")
        .barrier(READ, 1)
        .barrier(UPDATED, 1)
        .worker(rename_swap(level, true, ["account1", "account2"]))
        .worker(renamer(level))
        .build()
}

/// Two repeatable-read read-modify-writes of one row: the second committer aborts
pub fn lost_update_prevented() -> HarnessResult<Scenario> {
    let level = IsolationLevel::RepeatableRead;
    let first = WorkerSpec::new("first", level)
        .read("accountH", "seen")
        .assert("initial balance", "seen", Observation::Balance(0))
        .signal("both read")
        .wait("both read")
        .adjust("accountH", DEPOSIT)
        .commit()
        .signal("first committed");
    let second = WorkerSpec::new("second", level)
        .read("accountH", "seen")
        .assert("initial balance", "seen", Observation::Balance(0))
        .signal("both read")
        .wait("both read")
        .wait("first committed")
        .adjust("accountH", 50)
        .commit()
        .expect_abort();

    Scenario::builder("lost update prevented")
        .description("first committer wins; the second read-modify-write fails validation")
        .seed("accountH")
        .barrier("both read", 2)
        .barrier("first committed", 1)
        .worker(first)
        .worker(second)
        .build()
}

/// Every canned scenario
pub fn all() -> HarnessResult<Vec<Scenario>> {
    Ok(vec![
        dirty_read_permitted()?,
        dirty_read_prevented()?,
        nonrepeatable_read()?,
        nonrepeatable_read_prevented()?,
        phantom_read()?,
        phantom_read_prevented_repeatable_read()?,
        phantom_read_prevented_serializable()?,
        application_level_repeatable_read()?,
        stale_identity()?,
        stale_identity_prevented()?,
        lost_update_prevented()?,
    ])
}
