//! In-memory account store
//!
//! Optimistic concurrency: each transaction remembers the row versions it
//! read, and commit fails with a conflict if any of them changed in the
//! meantime. Validation and write-back happen under one lock, which makes
//! committed transactions serializable.
//!
//! Faults can be injected to exercise the retry loop.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, MutexGuard};

use chrono::Utc;
use rust_decimal::Decimal;

use crate::domain::{Account, AccountRef, StoreError};
use crate::ports::{AccountStore, StoreTransaction};

#[derive(Debug)]
struct Row {
    account: Account,
    version: u64,
}

#[derive(Debug, Default)]
struct Faults {
    begins: u32,
    commits: u32,
}

/// Thread-safe in-memory store with serializable transactions
#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: Mutex<HashMap<AccountRef, Row>>,
    faults: Mutex<Faults>,
    begun: AtomicU32,
    committed: AtomicU32,
    rolled_back: AtomicU32,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Provision an account, replacing any existing one with the same ref
    pub fn insert(&self, account: Account) {
        let mut rows = self.lock_rows();
        rows.insert(
            account.account_ref.clone(),
            Row {
                account,
                version: 0,
            },
        );
    }

    /// Committed balance of an account
    pub fn balance_of(&self, account: &AccountRef) -> Option<Decimal> {
        self.lock_rows().get(account).map(|row| row.account.balance)
    }

    /// Make the next `count` calls to `begin` fail with a connection error
    pub fn fail_next_begins(&self, count: u32) {
        self.lock_faults().begins = count;
    }

    /// Make the next `count` commits fail with a conflict
    pub fn fail_next_commits(&self, count: u32) {
        self.lock_faults().commits = count;
    }

    /// Number of `begin` calls, failed ones included
    pub fn transactions_begun(&self) -> u32 {
        self.begun.load(Ordering::SeqCst)
    }

    pub fn commits(&self) -> u32 {
        self.committed.load(Ordering::SeqCst)
    }

    /// Explicit rollbacks, dropped transactions and failed commits
    pub fn rollbacks(&self) -> u32 {
        self.rolled_back.load(Ordering::SeqCst)
    }

    fn lock_rows(&self) -> MutexGuard<'_, HashMap<AccountRef, Row>> {
        self.rows.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_faults(&self) -> MutexGuard<'_, Faults> {
        self.faults.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Consume one injected fault from the counter picked by `select`
    fn take_fault(&self, select: impl FnOnce(&mut Faults) -> &mut u32) -> bool {
        let mut faults = self.lock_faults();
        let remaining = select(&mut faults);
        if *remaining > 0 {
            *remaining -= 1;
            true
        } else {
            false
        }
    }
}

impl AccountStore for MemoryStore {
    type Transaction<'a> = MemoryTransaction<'a>;

    fn begin(&self) -> Result<MemoryTransaction<'_>, StoreError> {
        self.begun.fetch_add(1, Ordering::SeqCst);
        if self.take_fault(|f| &mut f.begins) {
            return Err(StoreError::Connection("injected connection failure".into()));
        }
        Ok(MemoryTransaction {
            store: self,
            reads: HashMap::new(),
            writes: HashMap::new(),
            finished: false,
        })
    }
}

/// Transaction over a [`MemoryStore`]
pub struct MemoryTransaction<'a> {
    store: &'a MemoryStore,
    /// Version seen at first read; `None` when the row did not exist
    reads: HashMap<AccountRef, Option<u64>>,
    writes: HashMap<AccountRef, Decimal>,
    finished: bool,
}

impl MemoryTransaction<'_> {
    fn finish(&mut self, committed: bool) {
        self.finished = true;
        let counter = if committed {
            &self.store.committed
        } else {
            &self.store.rolled_back
        };
        counter.fetch_add(1, Ordering::SeqCst);
    }
}

impl StoreTransaction for MemoryTransaction<'_> {
    fn get_account(&mut self, account: &AccountRef) -> Result<Option<Account>, StoreError> {
        let store = self.store;
        let rows = store.lock_rows();
        let row = rows.get(account);
        self.reads
            .entry(account.clone())
            .or_insert_with(|| row.map(|r| r.version));

        Ok(row.map(|r| {
            let mut found = r.account.clone();
            if let Some(balance) = self.writes.get(account) {
                found.balance = *balance;
            }
            found
        }))
    }

    fn update_balance(&mut self, account: &AccountRef, balance: Decimal) -> Result<(), StoreError> {
        if balance < Decimal::ZERO {
            return Err(StoreError::Backend(format!(
                "CHECK constraint failed: balance >= 0 for {}",
                account
            )));
        }
        if !self.reads.contains_key(account) && self.get_account(account)?.is_none() {
            return Err(StoreError::Backend(format!("no such account: {}", account)));
        }
        self.writes.insert(account.clone(), balance);
        Ok(())
    }

    fn commit(mut self) -> Result<(), StoreError> {
        if self.store.take_fault(|f| &mut f.commits) {
            self.finish(false);
            return Err(StoreError::Conflict("injected conflict".into()));
        }

        let store = self.store;
        let mut rows = store.lock_rows();
        let stale = self
            .reads
            .iter()
            .find(|(account, seen)| rows.get(*account).map(|r| r.version) != **seen);
        if let Some((account, _)) = stale {
            let message = format!("row for {} changed since it was read", account);
            drop(rows);
            self.finish(false);
            return Err(StoreError::Conflict(message));
        }

        let now = Utc::now();
        for (account, balance) in &self.writes {
            if let Some(row) = rows.get_mut(account) {
                row.account.balance = *balance;
                row.account.updated_at = now;
                row.version += 1;
            }
        }
        drop(rows);
        self.finish(true);
        Ok(())
    }

    fn rollback(mut self) -> Result<(), StoreError> {
        self.finish(false);
        Ok(())
    }
}

impl Drop for MemoryTransaction<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.finish(false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn store_with(accounts: &[(&str, Decimal)]) -> MemoryStore {
        let store = MemoryStore::new();
        for (reference, balance) in accounts {
            store.insert(Account::new(AccountRef::from(*reference), *balance, "hash"));
        }
        store
    }

    #[test]
    fn test_uncommitted_writes_are_invisible() {
        let store = store_with(&[("A", dec!(100))]);
        let a = AccountRef::from("A");

        let mut tx = store.begin().unwrap();
        tx.update_balance(&a, dec!(40)).unwrap();
        assert_eq!(tx.get_account(&a).unwrap().unwrap().balance, dec!(40));
        assert_eq!(store.balance_of(&a), Some(dec!(100)));

        tx.commit().unwrap();
        assert_eq!(store.balance_of(&a), Some(dec!(40)));
    }

    #[test]
    fn test_drop_rolls_back() {
        let store = store_with(&[("A", dec!(100))]);
        let a = AccountRef::from("A");
        {
            let mut tx = store.begin().unwrap();
            tx.update_balance(&a, dec!(1)).unwrap();
        }
        assert_eq!(store.balance_of(&a), Some(dec!(100)));
        assert_eq!(store.rollbacks(), 1);
        assert_eq!(store.commits(), 0);
    }

    #[test]
    fn test_stale_read_conflicts_on_commit() {
        let store = store_with(&[("A", dec!(100))]);
        let a = AccountRef::from("A");

        let mut first = store.begin().unwrap();
        let mut second = store.begin().unwrap();
        first.get_account(&a).unwrap();
        second.get_account(&a).unwrap();

        first.update_balance(&a, dec!(30)).unwrap();
        second.update_balance(&a, dec!(30)).unwrap();

        first.commit().unwrap();
        assert!(matches!(second.commit(), Err(StoreError::Conflict(_))));
        assert_eq!(store.balance_of(&a), Some(dec!(30)));
    }

    #[test]
    fn test_negative_balance_rejected() {
        let store = store_with(&[("A", dec!(1))]);
        let mut tx = store.begin().unwrap();
        assert!(tx.update_balance(&AccountRef::from("A"), dec!(-0.01)).is_err());
    }

    #[test]
    fn test_injected_faults_are_consumed() {
        let store = store_with(&[("A", dec!(1))]);
        store.fail_next_begins(1);
        assert!(matches!(store.begin(), Err(StoreError::Connection(_))));
        assert!(store.begin().is_ok());

        store.fail_next_commits(1);
        let tx = store.begin().unwrap();
        assert!(matches!(tx.commit(), Err(StoreError::Conflict(_))));
        let tx = store.begin().unwrap();
        assert!(tx.commit().is_ok());
        assert_eq!(store.transactions_begun(), 4);
    }
}
