//! MemoryScope: one transaction against a [`MemoryStore`](crate::MemoryStore)
//!
//! Every operation:
//! 1. checks the scope is still active
//! 2. logs its statement (if the query log is on)
//! 3. takes the store's state lock, acquiring row or predicate locks as the
//!    isolation level demands
//! 4. reads through a [`ReadView`] or writes an intent, and records what it
//!    touched in the [`TransactionContext`] for commit validation
//!
//! Dropping a scope that was neither committed nor aborted aborts it.

use crate::locks::LockRequest;
use crate::store::Shared;
use crate::versions::ReadView;
use interleave_concurrency::TransactionContext;
use interleave_core::{
    Balance, IsolationLevel, LedgerEntry, Predicate, StoreError, StoreResult, TransactionScope,
    TxnId,
};
use std::sync::Arc;

/// Reason recorded when a scope is dropped while still open
const DROPPED: &str = "scope dropped without commit";

/// A transaction scope of the in-memory store
#[derive(Debug)]
pub struct MemoryScope {
    shared: Arc<Shared>,
    ctx: TransactionContext,
}

impl MemoryScope {
    pub(crate) fn new(shared: Arc<Shared>, ctx: TransactionContext) -> Self {
        Self { shared, ctx }
    }

    /// Validation bookkeeping of this scope
    pub fn context(&self) -> &TransactionContext {
        &self.ctx
    }

    /// Number of locks this scope currently holds
    pub fn held_locks(&self) -> usize {
        self.shared.state.lock().locks.held_by(self.ctx.txn_id)
    }

    fn view(&self) -> ReadView {
        ReadView::new(self.ctx.txn_id, self.ctx.isolation, self.ctx.start_version)
    }

    fn log<F: FnOnce() -> String>(&self, statement: F) {
        self.shared.log(self.ctx.txn_id, self.ctx.isolation, statement);
    }

    /// Lock the row a write targets and return its current state
    ///
    /// If the name moved to another row while we waited, the lock on the
    /// old row is given back unless this scope held it already.
    fn lock_for_write(&mut self, name: &str) -> StoreResult<LedgerEntry> {
        let shared = Arc::clone(&self.shared);
        let mut state = shared.state.lock();
        let view = self.view();
        let txn = self.ctx.txn_id;

        loop {
            let target = state
                .rows
                .find_current(&view, name)
                .ok_or_else(|| StoreError::AccountNotFound(name.to_string()))?;
            let request = LockRequest::Exclusive(target.id);
            let held_before = state.locks.holds_exclusive(txn, target.id);
            shared.acquire(&mut state, txn, request, name)?;

            // The row may have been renamed or rewritten while we waited
            match state.rows.find_current(&view, name) {
                Some(current) if current.id == target.id => return Ok(current),
                _ => {
                    tracing::trace!(txn_id = txn, lock = %request, name, "write target moved");
                    if !held_before {
                        shared.release_one(&mut state, txn, request);
                    }
                }
            }
        }
    }

    /// Write a new intent for a row this scope holds exclusively
    fn write_intent(
        &mut self,
        row: &LedgerEntry,
        name: String,
        balance: Balance,
    ) -> StoreResult<LedgerEntry> {
        let shared = Arc::clone(&self.shared);
        let mut state = shared.state.lock();
        let base_version = state
            .rows
            .get(row.id)
            .map_or(0, |r| r.committed_version());
        state
            .rows
            .put_intent(self.ctx.txn_id, row.id, name.clone(), balance)?;
        self.ctx.record_write(row.id, base_version);
        Ok(LedgerEntry {
            name,
            balance,
            ..row.clone()
        })
    }

    /// Discard intents and release locks
    fn rollback(&mut self, reason: &str) {
        {
            let mut state = self.shared.state.lock();
            state.rows.discard(self.ctx.txn_id);
            self.shared.release(&mut state, self.ctx.txn_id);
        }
        self.shared.manager.abort(&mut self.ctx, reason);
    }
}

fn signed(delta: Balance) -> String {
    if delta < 0 {
        format!("- {}", delta.unsigned_abs())
    } else {
        format!("+ {}", delta)
    }
}

impl TransactionScope for MemoryScope {
    fn txn_id(&self) -> TxnId {
        self.ctx.txn_id
    }

    fn isolation_level(&self) -> IsolationLevel {
        self.ctx.isolation
    }

    fn is_closed(&self) -> bool {
        self.ctx.is_closed()
    }

    fn create_account(&mut self, name: &str) -> StoreResult<LedgerEntry> {
        self.ctx.ensure_active()?;
        self.log(|| format!("INSERT INTO account (name, balance) VALUES ('{}', 0)", name));

        let shared = Arc::clone(&self.shared);
        let mut state = shared.state.lock();
        let txn = self.ctx.txn_id;

        if state.rows.name_taken(txn, name, None) {
            return Err(StoreError::DuplicateAccount(name.to_string()));
        }
        shared.acquire(&mut state, txn, LockRequest::Insert, "*")?;
        // Re-check: another scope may have created it while we waited
        if state.rows.name_taken(txn, name, None) {
            return Err(StoreError::DuplicateAccount(name.to_string()));
        }

        let entry = state.rows.create(txn, name);
        // A fresh id has no other holders, so this never waits
        shared.acquire(&mut state, txn, LockRequest::Exclusive(entry.id), name)?;
        self.ctx.record_write(entry.id, 0);
        Ok(entry)
    }

    fn find_account(&mut self, name: &str) -> StoreResult<LedgerEntry> {
        self.ctx.ensure_active()?;
        self.log(|| format!("SELECT * FROM account WHERE name = '{}'", name));

        let shared = Arc::clone(&self.shared);
        let mut state = shared.state.lock();
        let view = self.view();

        let entry = state
            .rows
            .find_by_name(&view, name)
            .ok_or_else(|| StoreError::AccountNotFound(name.to_string()))?;

        if self.ctx.isolation.takes_read_locks() {
            shared.acquire(
                &mut state,
                self.ctx.txn_id,
                LockRequest::Shared(entry.id),
                name,
            )?;
        }

        let read_version = state
            .rows
            .get(entry.id)
            .and_then(|row| view.committed(row))
            .map_or(0, |v| v.commit_version);
        self.ctx.record_read(entry.id, read_version);
        Ok(entry)
    }

    fn adjust_balance(&mut self, name: &str, delta: Balance) -> StoreResult<LedgerEntry> {
        self.ctx.ensure_active()?;
        self.log(|| {
            format!(
                "UPDATE account SET balance = balance {} WHERE name = '{}'",
                signed(delta),
                name
            )
        });

        let current = self.lock_for_write(name)?;
        let balance = current
            .balance
            .checked_add(delta)
            .ok_or_else(|| StoreError::BalanceOverflow(name.to_string()))?;
        let new_name = current.name.clone();
        self.write_intent(&current, new_name, balance)
    }

    fn rename_account(&mut self, from: &str, to: &str) -> StoreResult<LedgerEntry> {
        self.ctx.ensure_active()?;
        self.log(|| format!("UPDATE account SET name = '{}' WHERE name = '{}'", to, from));

        let current = self.lock_for_write(from)?;
        if from == to {
            return Ok(current);
        }
        {
            let state = self.shared.state.lock();
            if state.rows.name_taken(self.ctx.txn_id, to, Some(current.id)) {
                return Err(StoreError::DuplicateAccount(to.to_string()));
            }
        }
        self.write_intent(&current, to.to_string(), current.balance)
    }

    fn count_where(&mut self, predicate: &Predicate) -> StoreResult<usize> {
        self.ctx.ensure_active()?;
        self.log(|| format!("SELECT COUNT(*) FROM account WHERE {}", predicate));

        let shared = Arc::clone(&self.shared);
        let mut state = shared.state.lock();
        let view = self.view();

        if self.ctx.isolation.takes_read_locks() {
            shared.acquire(&mut state, self.ctx.txn_id, LockRequest::Predicate, "*")?;
            let matched = state.rows.committed_matches_in(&view, predicate);
            self.ctx.record_predicate_read(*predicate, matched);
        }

        Ok(state
            .rows
            .scan(&view)
            .iter()
            .filter(|entry| predicate.matches(entry.balance))
            .count())
    }

    fn list_accounts(&mut self) -> StoreResult<Vec<LedgerEntry>> {
        self.ctx.ensure_active()?;
        self.log(|| "SELECT * FROM account ORDER BY id".to_string());

        let shared = Arc::clone(&self.shared);
        let mut state = shared.state.lock();
        let view = self.view();

        if self.ctx.isolation.takes_read_locks() {
            shared.acquire(&mut state, self.ctx.txn_id, LockRequest::Predicate, "*")?;
            let any = Predicate::any();
            let matched = state.rows.committed_matches_in(&view, &any);
            self.ctx.record_predicate_read(any, matched);
        }

        Ok(state.rows.scan(&view))
    }

    fn commit(&mut self) -> StoreResult<u64> {
        self.ctx.ensure_active()?;
        self.log(|| "COMMIT".to_string());

        let shared = Arc::clone(&self.shared);
        let mut state = shared.state.lock();
        let txn = self.ctx.txn_id;

        match shared.manager.commit(&mut self.ctx, &state.rows) {
            Ok(commit_version) => {
                let published = state.rows.publish(txn, commit_version);
                shared.release(&mut state, txn);
                tracing::debug!(txn_id = txn, commit_version, published, "scope committed");
                Ok(commit_version)
            }
            Err(e) => {
                state.rows.discard(txn);
                shared.release(&mut state, txn);
                Err(e.into())
            }
        }
    }

    fn abort(&mut self, reason: &str) {
        if !self.ctx.can_rollback() {
            return;
        }
        self.log(|| "ROLLBACK".to_string());
        self.rollback(reason);
    }
}

impl Drop for MemoryScope {
    fn drop(&mut self) {
        if self.ctx.can_rollback() {
            tracing::debug!(txn_id = self.ctx.txn_id, "{}", DROPPED);
            self.abort(DROPPED);
        }
    }
}
