//! Core domain entities
//!
//! Pure data structures with validation logic - no I/O.

mod account;
pub mod result;
mod transfer;

pub use account::{Account, AccountRef, BALANCE_SCALE};
pub use result::{ErrorClass, StoreError, TransferError};
pub use transfer::{
    RetryPolicy, TransferReceipt, TransferRequest, DEFAULT_BASE_DELAY_MS, DEFAULT_MAX_ATTEMPTS,
};
