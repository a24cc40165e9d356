//! Session cache: a scope-local identity map
//!
//! `SessionCachedStore` wraps any store. Its scopes remember every account
//! they have fetched, keyed by `AccountId`. Reads still go to the store, but
//! a row whose id is already known is answered with the remembered copy,
//! stale or not. This gives repeatable reads at the application level on
//! top of a read-committed store, and also reproduces its well-known
//! downside: a listing can mix remembered and fresh rows.
//!
//! Rules:
//! - `find_account`, `read_balance`, `list_accounts`, `create_account`
//!   go through the identity map
//! - `adjust_balance` and `rename_account` evict the row they wrote, by id,
//!   so the scope always sees its own writes even when its remembered copy
//!   carries a name the row no longer has
//! - `count_where` is a scalar query and never cached
//! - `invalidate_local_view` clears the map

use interleave_core::{
    AccountId, Balance, IsolationLevel, LedgerEntry, Predicate, StoreResult, TransactionScope,
    TransactionalStore, TxnId,
};
use std::collections::HashMap;

/// Store wrapper whose scopes carry a session cache
#[derive(Debug, Clone, Default)]
pub struct SessionCachedStore<S> {
    inner: S,
}

impl<S: TransactionalStore> SessionCachedStore<S> {
    /// Wrap a store
    pub fn new(inner: S) -> Self {
        Self { inner }
    }

    /// The wrapped store
    pub fn inner(&self) -> &S {
        &self.inner
    }
}

impl<S: TransactionalStore> TransactionalStore for SessionCachedStore<S> {
    type Scope = CachedScope<S::Scope>;

    fn begin(&self, level: IsolationLevel) -> StoreResult<Self::Scope> {
        Ok(CachedScope::new(self.inner.begin(level)?))
    }

    fn supports(&self, level: IsolationLevel) -> bool {
        self.inner.supports(level)
    }
}

/// Hit/miss counters of one cached scope
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Rows answered from the identity map
    pub hits: u64,
    /// Rows added to the identity map
    pub misses: u64,
    /// Entries removed by writes
    pub evictions: u64,
    /// `invalidate_local_view` calls
    pub invalidations: u64,
}

/// Scope wrapper holding the identity map
#[derive(Debug)]
pub struct CachedScope<T> {
    inner: T,
    identity: HashMap<AccountId, LedgerEntry>,
    stats: CacheStats,
}

impl<T: TransactionScope> CachedScope<T> {
    /// Wrap a scope with an empty identity map
    pub fn new(inner: T) -> Self {
        Self {
            inner,
            identity: HashMap::new(),
            stats: CacheStats::default(),
        }
    }

    /// The wrapped scope
    pub fn inner(&self) -> &T {
        &self.inner
    }

    /// Number of remembered accounts
    pub fn cached_len(&self) -> usize {
        self.identity.len()
    }

    /// Cache counters
    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Remembered copy of `entry` if its id is known, else remember it
    fn resolve(&mut self, entry: LedgerEntry) -> LedgerEntry {
        if let Some(cached) = self.identity.get(&entry.id) {
            self.stats.hits += 1;
            return cached.clone();
        }
        self.stats.misses += 1;
        self.identity.insert(entry.id, entry.clone());
        entry
    }

    fn evict(&mut self, id: AccountId) {
        if self.identity.remove(&id).is_some() {
            self.stats.evictions += 1;
        }
    }
}

impl<T: TransactionScope> TransactionScope for CachedScope<T> {
    fn txn_id(&self) -> TxnId {
        self.inner.txn_id()
    }

    fn isolation_level(&self) -> IsolationLevel {
        self.inner.isolation_level()
    }

    fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    fn create_account(&mut self, name: &str) -> StoreResult<LedgerEntry> {
        let entry = self.inner.create_account(name)?;
        Ok(self.resolve(entry))
    }

    fn find_account(&mut self, name: &str) -> StoreResult<LedgerEntry> {
        let entry = self.inner.find_account(name)?;
        Ok(self.resolve(entry))
    }

    fn adjust_balance(&mut self, name: &str, delta: Balance) -> StoreResult<LedgerEntry> {
        let written = self.inner.adjust_balance(name, delta)?;
        self.evict(written.id);
        Ok(written)
    }

    fn rename_account(&mut self, from: &str, to: &str) -> StoreResult<LedgerEntry> {
        let written = self.inner.rename_account(from, to)?;
        self.evict(written.id);
        Ok(written)
    }

    fn count_where(&mut self, predicate: &Predicate) -> StoreResult<usize> {
        self.inner.count_where(predicate)
    }

    fn list_accounts(&mut self) -> StoreResult<Vec<LedgerEntry>> {
        let entries = self.inner.list_accounts()?;
        Ok(entries.into_iter().map(|e| self.resolve(e)).collect())
    }

    fn invalidate_local_view(&mut self) {
        self.identity.clear();
        self.stats.invalidations += 1;
        self.inner.invalidate_local_view();
    }

    fn commit(&mut self) -> StoreResult<u64> {
        let result = self.inner.commit();
        self.identity.clear();
        result
    }

    fn abort(&mut self, reason: &str) {
        self.inner.abort(reason);
        self.identity.clear();
    }
}
