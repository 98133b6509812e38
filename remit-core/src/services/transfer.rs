//! Transfer engine - atomic debit/credit with bounded retry
//!
//! One call to [`TransferEngine::transfer`] runs up to `max_attempts`
//! attempts. Each attempt opens its own store transaction, checks both
//! accounts and the sender's balance, writes both balances and commits.
//!
//! - Business failures (missing account, insufficient balance) end the call
//!   on the first attempt and never write anything.
//! - Store failures (conflicts, busy database, lost connection) roll the
//!   attempt back and retry after `base_delay * 2^attempt`.
//! - No transaction is held open across the backoff sleep.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rust_decimal::Decimal;

use crate::adapters::clock::SystemClock;
use crate::domain::{
    RetryPolicy, StoreError, TransferError, TransferReceipt, TransferRequest,
};
use crate::ports::{AccountStore, Clock, StoreTransaction};

/// Why a single attempt did not commit
#[derive(Debug)]
enum AttemptError {
    /// Terminal, returned to the caller unchanged
    Rejected(TransferError),
    /// Worth another attempt
    Transient(StoreError),
}

impl From<StoreError> for AttemptError {
    fn from(e: StoreError) -> Self {
        Self::Transient(e)
    }
}

impl From<TransferError> for AttemptError {
    fn from(e: TransferError) -> Self {
        Self::Rejected(e)
    }
}

/// Balances written by a committed attempt
struct Committed {
    sender_balance: Decimal,
    receiver_balance: Decimal,
}

/// Transfer engine over any [`AccountStore`]
pub struct TransferEngine<S: AccountStore> {
    store: Arc<S>,
    clock: Arc<dyn Clock>,
    policy: RetryPolicy,
}

impl<S: AccountStore> TransferEngine<S> {
    /// Engine on the wall clock with the given retry policy
    pub fn new(store: Arc<S>, policy: RetryPolicy) -> Self {
        Self::with_clock(store, Arc::new(SystemClock), policy)
    }

    pub fn with_clock(store: Arc<S>, clock: Arc<dyn Clock>, policy: RetryPolicy) -> Self {
        Self {
            store,
            clock,
            policy,
        }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Move `request.amount` from sender to receiver.
    ///
    /// Applies the policy timeout, if any, as the deadline.
    pub fn transfer(&self, request: &TransferRequest) -> Result<TransferReceipt, TransferError> {
        let deadline = self.policy.timeout.map(|t| self.clock.now() + t);
        self.run(request, deadline)
    }

    /// Like [`transfer`](Self::transfer) with an explicit deadline.
    ///
    /// An attempt still running at the deadline is rolled back instead of
    /// committed, and no retry starts whose backoff would end past it.
    pub fn transfer_until(
        &self,
        request: &TransferRequest,
        deadline: Instant,
    ) -> Result<TransferReceipt, TransferError> {
        self.run(request, Some(deadline))
    }

    fn run(
        &self,
        request: &TransferRequest,
        deadline: Option<Instant>,
    ) -> Result<TransferReceipt, TransferError> {
        request.validate()?;

        let max_attempts = self.policy.max_attempts.max(1);
        if self.past(deadline, Duration::ZERO) {
            return Err(TransferError::DeadlineExceeded { attempts: 0 });
        }

        let mut attempt = 0;
        loop {
            attempt += 1;
            tracing::debug!(
                sender = %request.sender,
                receiver = %request.receiver,
                attempt,
                max_attempts,
                "starting transfer attempt"
            );

            let error = match self.attempt(request, deadline) {
                Ok(committed) => {
                    tracing::info!(
                        sender = %request.sender,
                        receiver = %request.receiver,
                        attempts = attempt,
                        "transfer committed"
                    );
                    return Ok(TransferReceipt {
                        sender: request.sender.clone(),
                        receiver: request.receiver.clone(),
                        amount: request.amount,
                        attempts: attempt,
                        sender_balance: committed.sender_balance,
                        receiver_balance: committed.receiver_balance,
                    });
                }
                Err(AttemptError::Rejected(e)) => {
                    tracing::info!(
                        sender = %request.sender,
                        receiver = %request.receiver,
                        error = %e,
                        "transfer rejected"
                    );
                    return Err(e);
                }
                Err(AttemptError::Transient(e)) => e,
            };

            if attempt >= max_attempts {
                tracing::error!(
                    attempts = attempt,
                    error = %error,
                    "transfer failed after maximum retries"
                );
                return Err(TransferError::Exhausted {
                    attempts: attempt,
                    last_error: error,
                });
            }

            let delay = self.policy.delay_for(attempt);
            if self.past(deadline, delay) {
                tracing::warn!(attempts = attempt, error = %error, "transfer deadline exceeded");
                return Err(TransferError::DeadlineExceeded { attempts: attempt });
            }

            tracing::warn!(
                attempt,
                max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %error,
                "transfer attempt failed, retrying"
            );
            self.clock.sleep(delay);
        }
    }

    /// One transactional attempt. The transaction is released on every
    /// path: committed on success, rolled back by `Drop` otherwise.
    fn attempt(
        &self,
        request: &TransferRequest,
        deadline: Option<Instant>,
    ) -> Result<Committed, AttemptError> {
        let mut tx = self.store.begin()?;

        let sender = tx
            .get_account(&request.sender)?
            .ok_or_else(|| TransferError::AccountNotFound(request.sender.clone()))?;
        let receiver = tx
            .get_account(&request.receiver)?
            .ok_or_else(|| TransferError::AccountNotFound(request.receiver.clone()))?;

        if !sender.can_debit(request.amount) {
            return Err(TransferError::InsufficientBalance {
                account: request.sender.clone(),
                available: sender.balance,
                requested: request.amount,
            }
            .into());
        }

        let sender_balance = sender.balance - request.amount;
        let receiver_balance = receiver.balance + request.amount;
        tx.update_balance(&request.sender, sender_balance)?;
        tx.update_balance(&request.receiver, receiver_balance)?;

        if self.past(deadline, Duration::ZERO) {
            tx.rollback()?;
            return Err(StoreError::DeadlineElapsed.into());
        }

        tx.commit()?;
        Ok(Committed {
            sender_balance,
            receiver_balance,
        })
    }

    /// True when `deadline` is set and will have passed after waiting `wait`
    fn past(&self, deadline: Option<Instant>, wait: Duration) -> bool {
        match deadline {
            Some(deadline) => self
                .clock
                .now()
                .checked_add(wait)
                .map_or(true, |at| at >= deadline),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::clock::ManualClock;
    use crate::adapters::memory::MemoryStore;
    use crate::domain::{Account, AccountRef};
    use rust_decimal_macros::dec;

    fn setup(accounts: &[(&str, Decimal)]) -> (Arc<MemoryStore>, Arc<ManualClock>) {
        let store = Arc::new(MemoryStore::new());
        for (reference, balance) in accounts {
            store.insert(Account::new(AccountRef::from(*reference), *balance, "hash"));
        }
        (store, Arc::new(ManualClock::new()))
    }

    fn engine(store: &Arc<MemoryStore>, clock: &Arc<ManualClock>) -> TransferEngine<MemoryStore> {
        TransferEngine::with_clock(Arc::clone(store), clock.clone(), RetryPolicy::default())
    }

    fn request(from: &str, to: &str, amount: Decimal) -> TransferRequest {
        TransferRequest::new(AccountRef::from(from), AccountRef::from(to), amount)
    }

    #[test]
    fn test_transfer_moves_funds() {
        let (store, clock) = setup(&[("A", dec!(100)), ("B", dec!(50))]);
        let receipt = engine(&store, &clock)
            .transfer(&request("A", "B", dec!(30)))
            .unwrap();

        assert_eq!(receipt.attempts, 1);
        assert_eq!(receipt.sender_balance, dec!(70));
        assert_eq!(receipt.receiver_balance, dec!(80));
        assert_eq!(store.balance_of(&AccountRef::from("A")), Some(dec!(70)));
        assert_eq!(store.balance_of(&AccountRef::from("B")), Some(dec!(80)));
        assert!(clock.sleeps().is_empty());
    }

    #[test]
    fn test_insufficient_balance_is_not_retried() {
        let (store, clock) = setup(&[("A", dec!(10)), ("B", dec!(50))]);
        let result = engine(&store, &clock).transfer(&request("A", "B", dec!(30)));

        assert_eq!(
            result,
            Err(TransferError::InsufficientBalance {
                account: AccountRef::from("A"),
                available: dec!(10),
                requested: dec!(30),
            })
        );
        assert_eq!(store.transactions_begun(), 1);
        assert_eq!(store.commits(), 0);
        assert_eq!(store.balance_of(&AccountRef::from("A")), Some(dec!(10)));
        assert_eq!(store.balance_of(&AccountRef::from("B")), Some(dec!(50)));
        assert!(clock.sleeps().is_empty());
    }

    #[test]
    fn test_missing_sender_is_not_retried() {
        let (store, clock) = setup(&[("B", dec!(50))]);
        let result = engine(&store, &clock).transfer(&request("ghost", "B", dec!(1)));

        assert_eq!(
            result,
            Err(TransferError::AccountNotFound(AccountRef::from("ghost")))
        );
        assert_eq!(store.transactions_begun(), 1);
        assert_eq!(store.commits(), 0);
    }

    #[test]
    fn test_missing_receiver_is_not_retried() {
        let (store, clock) = setup(&[("A", dec!(50))]);
        let result = engine(&store, &clock).transfer(&request("A", "ghost", dec!(1)));

        assert_eq!(
            result,
            Err(TransferError::AccountNotFound(AccountRef::from("ghost")))
        );
        assert_eq!(store.transactions_begun(), 1);
        assert_eq!(store.balance_of(&AccountRef::from("A")), Some(dec!(50)));
    }

    #[test]
    fn test_validation_never_touches_store() {
        let (store, clock) = setup(&[("A", dec!(50))]);
        let engine = engine(&store, &clock);

        assert!(matches!(
            engine.transfer(&request("A", "A", dec!(1))),
            Err(TransferError::SameAccount(_))
        ));
        assert!(matches!(
            engine.transfer(&request("A", "B", dec!(0))),
            Err(TransferError::InvalidAmount(_))
        ));
        assert_eq!(store.transactions_begun(), 0);
    }

    #[test]
    fn test_transient_conflicts_are_retried_with_backoff() {
        let (store, clock) = setup(&[("A", dec!(100)), ("B", dec!(50))]);
        store.fail_next_commits(2);

        let receipt = engine(&store, &clock)
            .transfer(&request("A", "B", dec!(30)))
            .unwrap();

        assert_eq!(receipt.attempts, 3);
        assert_eq!(store.transactions_begun(), 3);
        assert_eq!(store.commits(), 1);
        assert_eq!(
            clock.sleeps(),
            vec![Duration::from_millis(200), Duration::from_millis(400)]
        );
        assert_eq!(store.balance_of(&AccountRef::from("A")), Some(dec!(70)));
        assert_eq!(store.balance_of(&AccountRef::from("B")), Some(dec!(80)));
    }

    #[test]
    fn test_connection_failures_are_transient() {
        let (store, clock) = setup(&[("A", dec!(100)), ("B", dec!(0))]);
        store.fail_next_begins(1);

        let receipt = engine(&store, &clock)
            .transfer(&request("A", "B", dec!(100)))
            .unwrap();
        assert_eq!(receipt.attempts, 2);
        assert_eq!(receipt.sender_balance, dec!(0));
    }

    #[test]
    fn test_exhaustion_after_max_attempts() {
        let (store, clock) = setup(&[("A", dec!(100)), ("B", dec!(50))]);
        store.fail_next_commits(u32::MAX);

        let result = engine(&store, &clock).transfer(&request("A", "B", dec!(30)));

        match result {
            Err(TransferError::Exhausted {
                attempts,
                last_error,
            }) => {
                assert_eq!(attempts, 5);
                assert!(matches!(last_error, StoreError::Conflict(_)));
            }
            other => panic!("expected exhaustion, got {:?}", other),
        }
        assert_eq!(store.transactions_begun(), 5);
        assert_eq!(store.commits(), 0);
        // no sleep after the final attempt
        assert_eq!(
            clock.sleeps(),
            vec![
                Duration::from_millis(200),
                Duration::from_millis(400),
                Duration::from_millis(800),
                Duration::from_millis(1600),
            ]
        );
        assert_eq!(store.balance_of(&AccountRef::from("A")), Some(dec!(100)));
    }

    #[test]
    fn test_single_attempt_policy() {
        let (store, clock) = setup(&[("A", dec!(100)), ("B", dec!(50))]);
        store.fail_next_commits(1);
        let engine = TransferEngine::with_clock(
            Arc::clone(&store),
            clock.clone(),
            RetryPolicy::new(1, Duration::from_millis(10)),
        );

        let result = engine.transfer(&request("A", "B", dec!(1)));
        assert!(matches!(
            result,
            Err(TransferError::Exhausted { attempts: 1, .. })
        ));
        assert!(clock.sleeps().is_empty());
    }

    #[test]
    fn test_deadline_stops_retries() {
        let (store, clock) = setup(&[("A", dec!(100)), ("B", dec!(50))]);
        store.fail_next_commits(u32::MAX);
        let engine = engine(&store, &clock);

        // 200ms fits, the following 400ms backoff would overrun
        let deadline = clock.now() + Duration::from_millis(500);
        let result = engine.transfer_until(&request("A", "B", dec!(1)), deadline);

        assert_eq!(result, Err(TransferError::DeadlineExceeded { attempts: 2 }));
        assert_eq!(clock.sleeps(), vec![Duration::from_millis(200)]);
        assert_eq!(store.commits(), 0);
    }

    #[test]
    fn test_elapsed_deadline_fails_before_any_attempt() {
        let (store, clock) = setup(&[("A", dec!(100)), ("B", dec!(50))]);
        let engine = engine(&store, &clock);
        let deadline = clock.now();
        clock.advance(Duration::from_millis(1));

        let result = engine.transfer_until(&request("A", "B", dec!(1)), deadline);
        assert_eq!(result, Err(TransferError::DeadlineExceeded { attempts: 0 }));
        assert_eq!(store.transactions_begun(), 0);
    }

    /// Advances by a fixed step on every read
    struct SteppingClock {
        start: Instant,
        step: Duration,
        reads: std::sync::Mutex<u32>,
    }

    impl Clock for SteppingClock {
        fn now(&self) -> Instant {
            let mut reads = self.reads.lock().unwrap();
            *reads += 1;
            self.start + self.step * *reads
        }

        fn sleep(&self, _duration: Duration) {}
    }

    #[test]
    fn test_deadline_inside_attempt_rolls_back() {
        let (store, _) = setup(&[("A", dec!(100)), ("B", dec!(50))]);
        let clock = Arc::new(SteppingClock {
            start: Instant::now(),
            step: Duration::from_millis(60),
            reads: std::sync::Mutex::new(0),
        });
        let engine = TransferEngine::with_clock(Arc::clone(&store), clock.clone(), RetryPolicy::default());

        // passes the entry check at 60ms, the pre-commit check at 120ms does not
        let deadline = clock.start + Duration::from_millis(100);
        let result = engine.transfer_until(&request("A", "B", dec!(30)), deadline);

        assert_eq!(result, Err(TransferError::DeadlineExceeded { attempts: 1 }));
        assert_eq!(store.transactions_begun(), 1);
        assert_eq!(store.commits(), 0);
        assert_eq!(store.rollbacks(), 1);
        assert_eq!(store.balance_of(&AccountRef::from("A")), Some(dec!(100)));
        assert_eq!(store.balance_of(&AccountRef::from("B")), Some(dec!(50)));
    }

    #[test]
    fn test_policy_timeout_applies() {
        let (store, clock) = setup(&[("A", dec!(100)), ("B", dec!(50))]);
        store.fail_next_commits(u32::MAX);
        let engine = TransferEngine::with_clock(
            Arc::clone(&store),
            clock.clone(),
            RetryPolicy::default().with_timeout(Duration::from_millis(100)),
        );

        let result = engine.transfer(&request("A", "B", dec!(1)));
        assert_eq!(result, Err(TransferError::DeadlineExceeded { attempts: 1 }));
    }
}
