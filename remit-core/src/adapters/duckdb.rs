//! DuckDB repository implementation

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Mutex;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use duckdb::{params, Connection};
use rust_decimal::Decimal;

use crate::domain::{Account, AccountRef, StoreError};
use crate::ports::{AccountStore, StoreTransaction};
use crate::services::{MigrationResult, MigrationService};

/// Maximum number of retries when database file is locked
const MAX_RETRIES: u32 = 5;

/// Initial retry delay in milliseconds (doubles each retry: 50, 100, 200, 400, 800ms)
const INITIAL_RETRY_DELAY_MS: u64 = 50;

const SELECT_ACCOUNT: &str = "SELECT account_ref, CAST(balance AS VARCHAR), secret_hash, created_at, updated_at
     FROM sys_accounts WHERE account_ref = ?";

/// Check if an error message indicates a file locking issue that should be retried
fn is_retryable_error(err_msg: &str) -> bool {
    let lower = err_msg.to_lowercase();
    // Windows error messages
    lower.contains("being used by another process")
        || lower.contains("cannot access the file")
        // Unix/macOS error messages
        || lower.contains("resource temporarily unavailable")
        || lower.contains("database is locked")
        || lower.contains("file is already open")
}

/// Check if an error message is DuckDB reporting a concurrent write on the same rows
fn is_conflict_error(err_msg: &str) -> bool {
    err_msg.to_lowercase().contains("conflict")
}

/// Map a DuckDB error onto the store error taxonomy
fn classify(err: duckdb::Error) -> StoreError {
    let msg = err.to_string();
    if is_conflict_error(&msg) {
        StoreError::Conflict(msg)
    } else if is_retryable_error(&msg) {
        StoreError::Busy(msg)
    } else {
        StoreError::Backend(msg)
    }
}

/// DuckDB repository implementation
///
/// Holds one root connection. Every store transaction runs on its own clone
/// of that connection, so concurrent transfers get independent transaction
/// contexts and DuckDB's MVCC conflict detection applies between them.
pub struct DuckDbRepository {
    conn: Mutex<Connection>,
    db_path: Option<PathBuf>,
}

impl DuckDbRepository {
    /// Open (or create) a database file
    ///
    /// Includes retry logic with exponential backoff for file locking errors,
    /// which can occur when another process holds the database file.
    pub fn new(db_path: &Path) -> Result<Self> {
        let mut last_error = None;

        for attempt in 0..MAX_RETRIES {
            match Self::try_open_connection(db_path) {
                Ok(conn) => {
                    return Ok(Self {
                        conn: Mutex::new(conn),
                        db_path: Some(db_path.to_path_buf()),
                    });
                }
                Err(e) => {
                    let err_msg = e.to_string();
                    if is_retryable_error(&err_msg) && attempt < MAX_RETRIES - 1 {
                        // Exponential backoff: 50ms, 100ms, 200ms, 400ms
                        let delay =
                            Duration::from_millis(INITIAL_RETRY_DELAY_MS * 2u64.pow(attempt));
                        tracing::warn!(
                            delay_ms = delay.as_millis() as u64,
                            attempt = attempt + 1,
                            max_attempts = MAX_RETRIES,
                            error = %err_msg,
                            "database busy, retrying open"
                        );
                        thread::sleep(delay);
                        last_error = Some(e);
                        continue;
                    }
                    // Non-retryable error or max retries reached
                    return Err(e);
                }
            }
        }

        // Should only reach here if all retries failed
        Err(last_error
            .unwrap_or_else(|| anyhow!("Failed to open database after {} retries", MAX_RETRIES)))
    }

    /// Open a private in-memory database (tests, dry runs)
    pub fn in_memory() -> Result<Self> {
        let config = duckdb::Config::default().enable_autoload_extension(false)?;
        let conn = Connection::open_in_memory_with_flags(config)?;
        Ok(Self {
            conn: Mutex::new(conn),
            db_path: None,
        })
    }

    /// Attempt to open a database connection (called by new() with retry logic)
    fn try_open_connection(db_path: &Path) -> Result<Connection> {
        // Extension autoloading stays off; nothing here needs extensions
        let config = duckdb::Config::default().enable_autoload_extension(false)?;
        let conn = Connection::open_with_flags(db_path, config)?;
        Ok(conn)
    }

    /// Path of the database file, `None` for in-memory databases
    pub fn db_path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    /// Run database migrations using the MigrationService
    ///
    /// Returns the migration result showing what was applied.
    pub fn run_migrations(&self) -> Result<MigrationResult> {
        let conn = self.lock()?;
        let migration_service = MigrationService::new(&conn);
        migration_service.run_pending()
    }

    /// Ensure database schema exists (runs pending migrations)
    pub fn ensure_schema(&self) -> Result<()> {
        self.run_migrations()?;
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|e| anyhow!("Lock poisoned: {}", e))
    }

    // === Account provisioning ===

    /// Insert a new account. Fails if the reference is already taken.
    pub fn insert_account(&self, account: &Account) -> Result<()> {
        account.validate().map_err(|e| anyhow!(e))?;
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO sys_accounts (account_ref, balance, secret_hash, created_at, updated_at)
             VALUES (?, CAST(? AS DECIMAL(18,4)), ?, ?, ?)",
            params![
                account.account_ref.as_str(),
                account.balance.to_string(),
                account.secret_hash,
                account.created_at.to_rfc3339(),
                account.updated_at.to_rfc3339(),
            ],
        )
        .with_context(|| format!("Failed to create account {}", account.account_ref))?;
        Ok(())
    }

    pub fn get_accounts(&self) -> Result<Vec<Account>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT account_ref, CAST(balance AS VARCHAR), secret_hash, created_at, updated_at
             FROM sys_accounts ORDER BY account_ref",
        )?;

        let mut rows = stmt.query([])?;
        let mut accounts = Vec::new();
        while let Some(row) = rows.next()? {
            accounts.push(row_to_account(row)?);
        }
        Ok(accounts)
    }

    pub fn get_account(&self, account: &AccountRef) -> Result<Option<Account>> {
        Ok(self.find_account(account)?)
    }
}

impl AccountStore for DuckDbRepository {
    type Transaction<'a> = DuckDbTransaction;

    fn begin(&self) -> Result<DuckDbTransaction, StoreError> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| StoreError::Backend(format!("Lock poisoned: {}", e)))?
            .try_clone()
            .map_err(|e| StoreError::Connection(e.to_string()))?;
        conn.execute_batch("BEGIN TRANSACTION").map_err(classify)?;
        Ok(DuckDbTransaction {
            conn,
            finished: false,
        })
    }
}

/// A transaction on a dedicated DuckDB connection
pub struct DuckDbTransaction {
    conn: Connection,
    finished: bool,
}

impl StoreTransaction for DuckDbTransaction {
    fn get_account(&mut self, account: &AccountRef) -> Result<Option<Account>, StoreError> {
        let mut stmt = self.conn.prepare(SELECT_ACCOUNT).map_err(classify)?;
        let mut rows = stmt.query(params![account.as_str()]).map_err(classify)?;
        match rows.next().map_err(classify)? {
            Some(row) => Ok(Some(row_to_account(row)?)),
            None => Ok(None),
        }
    }

    fn update_balance(&mut self, account: &AccountRef, balance: Decimal) -> Result<(), StoreError> {
        let updated = self
            .conn
            .execute(
                "UPDATE sys_accounts SET balance = CAST(? AS DECIMAL(18,4)), updated_at = ?
                 WHERE account_ref = ?",
                params![balance.to_string(), Utc::now().to_rfc3339(), account.as_str()],
            )
            .map_err(classify)?;
        if updated != 1 {
            return Err(StoreError::Backend(format!(
                "expected to update 1 row for {}, updated {}",
                account, updated
            )));
        }
        Ok(())
    }

    fn commit(mut self) -> Result<(), StoreError> {
        self.finished = true;
        if let Err(e) = self.conn.execute_batch("COMMIT") {
            // A failed commit leaves the transaction aborted
            let _ = self.conn.execute_batch("ROLLBACK");
            return Err(classify(e));
        }
        Ok(())
    }

    fn rollback(mut self) -> Result<(), StoreError> {
        self.finished = true;
        self.conn.execute_batch("ROLLBACK").map_err(classify)
    }
}

impl Drop for DuckDbTransaction {
    fn drop(&mut self) {
        if !self.finished {
            let _ = self.conn.execute_batch("ROLLBACK");
        }
    }
}

fn row_to_account(row: &duckdb::Row) -> Result<Account, StoreError> {
    // Columns: 0 account_ref, 1 balance (as text), 2 secret_hash, 3 created_at, 4 updated_at
    let reference: String = row.get(0).map_err(classify)?;
    let balance_str: String = row.get(1).map_err(classify)?;
    let created_str: String = row.get(3).map_err(classify)?;
    let updated_str: String = row.get(4).map_err(classify)?;

    let balance = Decimal::from_str(&balance_str)
        .map_err(|e| StoreError::Backend(format!("bad balance for {}: {}", reference, e)))?;

    Ok(Account {
        account_ref: AccountRef::new(reference),
        balance,
        secret_hash: row.get(2).map_err(classify)?,
        created_at: parse_timestamp(&created_str),
        updated_at: parse_timestamp(&updated_str),
    })
}

// Helper functions

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn repo_with(accounts: &[(&str, Decimal)]) -> DuckDbRepository {
        let repo = DuckDbRepository::in_memory().unwrap();
        repo.ensure_schema().unwrap();
        for (reference, balance) in accounts {
            repo.insert_account(&Account::new(AccountRef::from(*reference), *balance, "hash"))
                .unwrap();
        }
        repo
    }

    #[test]
    fn test_is_retryable_error() {
        assert!(is_retryable_error("IO Error: database is locked"));
        assert!(is_retryable_error(
            "The process cannot access the file because it is being used by another process"
        ));
        assert!(!is_retryable_error("Invalid password"));
        assert!(!is_retryable_error("Permission denied"));
    }

    #[test]
    fn test_is_conflict_error() {
        assert!(is_conflict_error("TransactionContext Error: Conflict on update!"));
        assert!(is_conflict_error("Catalog write-write conflict on alter"));
        assert!(!is_conflict_error("Constraint Error: CHECK constraint failed"));
    }

    #[test]
    fn test_balances_round_trip_exactly() {
        let repo = repo_with(&[("A", dec!(1234.5678))]);
        let account = repo.get_account(&AccountRef::from("A")).unwrap().unwrap();
        assert_eq!(account.balance, dec!(1234.5678));
        assert_eq!(account.secret_hash, "hash");
    }

    #[test]
    fn test_missing_account_reads_none() {
        let repo = repo_with(&[]);
        assert!(repo.get_account(&AccountRef::from("nope")).unwrap().is_none());
    }

    #[test]
    fn test_duplicate_account_rejected() {
        let repo = repo_with(&[("A", dec!(1))]);
        let again = Account::new(AccountRef::from("A"), dec!(2), "hash");
        assert!(repo.insert_account(&again).is_err());
    }

    #[test]
    fn test_commit_persists_and_drop_rolls_back() {
        let repo = repo_with(&[("A", dec!(100))]);
        let a = AccountRef::from("A");

        {
            let mut tx = repo.begin().unwrap();
            tx.update_balance(&a, dec!(1)).unwrap();
            // dropped without commit
        }
        assert_eq!(repo.get_account(&a).unwrap().unwrap().balance, dec!(100));

        let mut tx = repo.begin().unwrap();
        tx.update_balance(&a, dec!(70)).unwrap();
        tx.commit().unwrap();
        assert_eq!(repo.get_account(&a).unwrap().unwrap().balance, dec!(70));
    }

    #[test]
    fn test_check_constraint_blocks_negative_balance() {
        let repo = repo_with(&[("A", dec!(10))]);
        let mut tx = repo.begin().unwrap();
        let result = tx.update_balance(&AccountRef::from("A"), dec!(-20));
        assert!(result.is_err());
    }

    #[test]
    fn test_update_of_unknown_account_fails() {
        let repo = repo_with(&[]);
        let mut tx = repo.begin().unwrap();
        let result = tx.update_balance(&AccountRef::from("ghost"), dec!(5));
        assert!(matches!(result, Err(StoreError::Backend(_))));
    }

    #[test]
    fn test_concurrent_updates_conflict() {
        let repo = repo_with(&[("A", dec!(100))]);
        let a = AccountRef::from("A");

        let mut first = repo.begin().unwrap();
        let mut second = repo.begin().unwrap();
        first.get_account(&a).unwrap();
        second.get_account(&a).unwrap();

        first.update_balance(&a, dec!(30)).unwrap();
        let second_result = second
            .update_balance(&a, dec!(30))
            .and_then(|_| second.commit());
        first.commit().unwrap();

        assert!(matches!(second_result, Err(StoreError::Conflict(_))));
        assert_eq!(repo.get_account(&a).unwrap().unwrap().balance, dec!(30));
    }
}
