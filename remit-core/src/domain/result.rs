//! Result and error types for the core library

use rust_decimal::Decimal;
use thiserror::Error;

use super::account::AccountRef;

/// Failure reported by a store adapter.
///
/// The transfer engine treats every variant as transient: the same attempt
/// may succeed once the store has settled.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Another transaction touched the same rows (write/serialization conflict)
    #[error("transaction conflict: {0}")]
    Conflict(String),

    /// Database locked or temporarily unavailable
    #[error("store busy: {0}")]
    Busy(String),

    /// Could not reach or open the store
    #[error("connection failed: {0}")]
    Connection(String),

    /// The caller's deadline passed before the attempt could commit
    #[error("deadline elapsed before commit")]
    DeadlineElapsed,

    #[error("store error: {0}")]
    Backend(String),
}

/// How a [`TransferError`] must be treated by callers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Intrinsic to the request; retrying cannot help. Nothing was written.
    Business,
    /// The retry budget ran out. The outcome is indeterminate: re-query
    /// balances instead of assuming a rollback.
    Exhausted,
}

/// Terminal outcome of a failed transfer
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    #[error("Account not found: {0}")]
    AccountNotFound(AccountRef),

    #[error("Insufficient balance")]
    InsufficientBalance {
        account: AccountRef,
        available: Decimal,
        requested: Decimal,
    },

    #[error("Invalid amount: {0} (must be positive with at most 4 decimal places)")]
    InvalidAmount(Decimal),

    #[error("Sender and receiver are the same account: {0}")]
    SameAccount(AccountRef),

    #[error("Transaction failed after {attempts} attempts: {last_error}")]
    Exhausted { attempts: u32, last_error: StoreError },

    #[error("Transaction deadline exceeded after {attempts} attempts")]
    DeadlineExceeded { attempts: u32 },
}

impl TransferError {
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::AccountNotFound(_)
            | Self::InsufficientBalance { .. }
            | Self::InvalidAmount(_)
            | Self::SameAccount(_) => ErrorClass::Business,
            Self::Exhausted { .. } | Self::DeadlineExceeded { .. } => ErrorClass::Exhausted,
        }
    }

    /// True when balances may or may not have changed
    pub fn is_indeterminate(&self) -> bool {
        self.class() == ErrorClass::Exhausted
    }

    /// Attempts spent before giving up (business failures stop at the first)
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Exhausted { attempts, .. } | Self::DeadlineExceeded { attempts } => *attempts,
            Self::InvalidAmount(_) | Self::SameAccount(_) => 0,
            _ => 1,
        }
    }
}

/// Core library result type
pub type Result<T> = std::result::Result<T, TransferError>;

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_business_errors_are_not_indeterminate() {
        let errors = [
            TransferError::AccountNotFound(AccountRef::from("X")),
            TransferError::InsufficientBalance {
                account: AccountRef::from("A"),
                available: dec!(10),
                requested: dec!(30),
            },
            TransferError::InvalidAmount(dec!(0)),
            TransferError::SameAccount(AccountRef::from("A")),
        ];
        for error in errors {
            assert_eq!(error.class(), ErrorClass::Business);
            assert!(!error.is_indeterminate());
        }
    }

    #[test]
    fn test_exhaustion_is_indeterminate() {
        let exhausted = TransferError::Exhausted {
            attempts: 5,
            last_error: StoreError::Conflict("write-write".into()),
        };
        assert_eq!(exhausted.class(), ErrorClass::Exhausted);
        assert!(exhausted.is_indeterminate());
        assert_eq!(exhausted.attempts(), 5);
        assert!(TransferError::DeadlineExceeded { attempts: 2 }.is_indeterminate());
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(
            TransferError::AccountNotFound(AccountRef::from("0042")).to_string(),
            "Account not found: 0042"
        );
        let exhausted = TransferError::Exhausted {
            attempts: 3,
            last_error: StoreError::Busy("database is locked".into()),
        };
        assert_eq!(
            exhausted.to_string(),
            "Transaction failed after 3 attempts: store busy: database is locked"
        );
    }
}
