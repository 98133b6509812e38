//! Store port - transactional account storage

use rust_decimal::Decimal;

use crate::domain::{Account, AccountRef, StoreError};

/// Shared store holding account balances.
///
/// Implementations must give each transaction serializable-or-better
/// isolation over the rows it reads and writes: when two transactions race
/// on the same account, at least one of them must fail (typically with
/// [`StoreError::Conflict`]) instead of both committing.
pub trait AccountStore: Send + Sync {
    type Transaction<'a>: StoreTransaction
    where
        Self: 'a;

    /// Open a new scoped transaction
    fn begin(&self) -> Result<Self::Transaction<'_>, StoreError>;

    /// Read a single account outside of any transfer
    fn find_account(&self, account: &AccountRef) -> Result<Option<Account>, StoreError> {
        let mut tx = self.begin()?;
        let found = tx.get_account(account)?;
        tx.rollback()?;
        Ok(found)
    }
}

/// A scoped unit of work against the store.
///
/// Every implementation rolls back in `Drop` when neither `commit` nor
/// `rollback` was called, so early returns and panics never leak an open
/// transaction.
pub trait StoreTransaction {
    fn get_account(&mut self, account: &AccountRef) -> Result<Option<Account>, StoreError>;

    fn update_balance(&mut self, account: &AccountRef, balance: Decimal) -> Result<(), StoreError>;

    fn commit(self) -> Result<(), StoreError>;

    fn rollback(self) -> Result<(), StoreError>;
}
