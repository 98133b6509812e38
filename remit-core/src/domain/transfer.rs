//! Transfer request, receipt and retry policy

use std::time::Duration;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::account::{AccountRef, BALANCE_SCALE};
use super::result::TransferError;

/// Default number of attempts before a transfer is reported as exhausted
pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;

/// Default base delay; attempt `n` waits `base * 2^n` (200ms, 400ms, 800ms, ...)
pub const DEFAULT_BASE_DELAY_MS: u64 = 100;

/// A request to move `amount` from `sender` to `receiver`. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferRequest {
    pub sender: AccountRef,
    pub receiver: AccountRef,
    pub amount: Decimal,
}

impl TransferRequest {
    pub fn new(sender: AccountRef, receiver: AccountRef, amount: Decimal) -> Self {
        Self {
            sender,
            receiver,
            amount,
        }
    }

    /// Checks that can be made without touching the store.
    ///
    /// Self-transfers are rejected outright: they would either be a no-op
    /// or double-count the balance depending on write order.
    pub fn validate(&self) -> Result<(), TransferError> {
        if self.amount <= Decimal::ZERO || self.amount.normalize().scale() > BALANCE_SCALE {
            return Err(TransferError::InvalidAmount(self.amount));
        }
        if self.sender == self.receiver {
            return Err(TransferError::SameAccount(self.sender.clone()));
        }
        Ok(())
    }
}

/// Proof of a committed transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferReceipt {
    pub sender: AccountRef,
    pub receiver: AccountRef,
    pub amount: Decimal,
    /// Number of attempts used, including the one that committed
    pub attempts: u32,
    pub sender_balance: Decimal,
    pub receiver_balance: Decimal,
}

/// Bounds on the retry loop
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    /// Overall budget for one transfer call, measured from its start
    pub timeout: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: Duration::from_millis(DEFAULT_BASE_DELAY_MS),
            timeout: None,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Delay to wait after `failed_attempts` attempts have failed.
    ///
    /// `base * 2^failed_attempts`, saturating instead of overflowing.
    pub fn delay_for(&self, failed_attempts: u32) -> Duration {
        self.base_delay
            .saturating_mul(2u32.saturating_pow(failed_attempts))
    }
}
