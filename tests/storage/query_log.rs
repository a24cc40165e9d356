//! Query Log Tests

use crate::common::*;
use interleave::{
    catalog, IsolationLevel, MemoryStore, Predicate, StoreConfig, TransactionScope,
    TransactionalStore,
};

fn logged_store() -> MemoryStore {
    MemoryStore::with_config(StoreConfig::default().with_query_log(true))
}

#[test]
fn statements_logged_per_operation() {
    let store = logged_store();
    seed(&store, &[("a", 0), ("b", 0)]);
    let seeded = store.query_log().len();

    let mut scope = store.begin(IsolationLevel::Serializable).unwrap();
    scope.find_account("a").unwrap();
    scope.count_where(&Predicate::balance_gt(0)).unwrap();
    scope.list_accounts().unwrap();
    scope.rename_account("b", "c").unwrap();
    scope.abort("inspect only");

    let statements: Vec<_> = store
        .query_log()
        .into_iter()
        .skip(seeded)
        .map(|e| e.statement)
        .collect();
    assert_eq!(
        statements,
        vec![
            "SET TRANSACTION ISOLATION LEVEL SERIALIZABLE; BEGIN",
            "SELECT * FROM account WHERE name = 'a'",
            "SELECT COUNT(*) FROM account WHERE balance > 0",
            "SELECT * FROM account ORDER BY id",
            "UPDATE account SET name = 'c' WHERE name = 'b'",
            "ROLLBACK",
        ]
    );
}

#[test]
fn sequence_numbers_follow_execution_order() {
    let store = logged_store();
    seed(&store, &[("a", 0)]);

    let mut first = store.begin(IsolationLevel::ReadUncommitted).unwrap();
    let mut second = store.begin(IsolationLevel::RepeatableRead).unwrap();
    first.read_balance("a").unwrap();
    second.read_balance("a").unwrap();
    first.commit().unwrap();
    second.commit().unwrap();

    let log = store.query_log();
    let seqs: Vec<_> = log.iter().map(|e| e.seq).collect();
    assert_eq!(seqs, (0..log.len() as u64).collect::<Vec<_>>());

    let tail: Vec<_> = log[log.len() - 6..]
        .iter()
        .map(|e| (e.txn_id, e.statement.as_str()))
        .collect();
    let (a, b) = (first.txn_id(), second.txn_id());
    assert_eq!(
        tail,
        vec![
            (a, "SET TRANSACTION ISOLATION LEVEL READ UNCOMMITTED; BEGIN"),
            (b, "SET TRANSACTION ISOLATION LEVEL REPEATABLE READ; BEGIN"),
            (a, "SELECT * FROM account WHERE name = 'a'"),
            (b, "SELECT * FROM account WHERE name = 'a'"),
            (a, "COMMIT"),
            (b, "COMMIT"),
        ]
    );
    assert_eq!(log[log.len() - 1].isolation, IsolationLevel::RepeatableRead);
}

#[test]
fn scenario_run_leaves_interleaving_in_log() {
    let store = logged_store();
    let scenario = catalog::dirty_read_permitted().unwrap();
    let report = interleave::Runner::default().run(&scenario, &store).unwrap();
    assert!(report.passed, "{report}");

    let statements: Vec<_> = store.query_log().into_iter().map(|e| e.statement).collect();
    let update = statements
        .iter()
        .position(|s| s == "UPDATE account SET balance = balance + 100 WHERE name = 'accountA'")
        .unwrap();
    let select = statements
        .iter()
        .rposition(|s| s == "SELECT * FROM account WHERE name = 'accountA'")
        .unwrap();
    let rollback = statements.iter().position(|s| s == "ROLLBACK").unwrap();
    assert!(update < select && select < rollback);
}

#[test]
fn disabled_log_stays_empty() {
    let store = quick_store();
    seed(&store, &[("a", 0)]);
    let mut scope = store.begin(IsolationLevel::ReadCommitted).unwrap();
    scope.adjust_balance("a", 1).unwrap();
    scope.commit().unwrap();

    assert!(!store.query_log_enabled());
    assert!(store.query_log().is_empty());
}
