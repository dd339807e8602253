//! Transaction Executor
//!
//! Submits one logical operation to the ledger and drives it to a final state.
//!
//! Flow per attempt:
//! 1. **Pending**: the operation (sign + send) races the timeout.
//! 2. **Confirming**: the returned signature is awaited at the configured commitment,
//!    also bounded by the timeout.
//! 3. **Success** or a classified failure. Retryable failures wait
//!    `min(1000 * 2^attempt, 10000)` ms plus up to 10% jitter, then try again.
//!
//! Transactions that landed and failed are never resubmitted. Cancellation stops waiting
//! at the next suspension point and returns the executor to idle; a request that already
//! reached the node may still land.

use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::signature::Signature;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::error::{EscrowError, LedgerError};
use crate::ledger::LedgerClient;

pub mod cancel;
pub mod state;

pub use cancel::CancellationToken;
pub use state::{Progress, TransactionState, TransactionStatus};

const BACKOFF_BASE_MS: u64 = 1_000;
const MAX_BACKOFF_MS: u64 = 10_000;
const JITTER_RATIO: f64 = 0.1;

/// Timeout, retry and confirmation policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutorConfig {
    /// Bound on each submission and each confirmation wait
    pub timeout: Duration,
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Commitment level awaited after submission
    pub commitment: CommitmentConfig,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(60_000),
            max_retries: 2,
            commitment: CommitmentConfig::confirmed(),
        }
    }
}

/// How an execution ended when it did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionOutcome {
    Confirmed(Signature),
    /// Stopped by [`TransactionExecutor::cancel`] or by a newer execution
    Cancelled,
}

impl ExecutionOutcome {
    pub fn signature(&self) -> Option<Signature> {
        match self {
            ExecutionOutcome::Confirmed(signature) => Some(*signature),
            ExecutionOutcome::Cancelled => None,
        }
    }
}

enum AttemptResult {
    Confirmed(Signature),
    Cancelled,
    Failed(EscrowError),
}

/// Bookkeeping for the execution currently allowed to publish state.
struct ActiveExecution {
    generation: u64,
    token: Option<CancellationToken>,
}

/// Releases the in-flight slot if an execution future is dropped before it finishes.
struct ExecutionGuard<'a> {
    executor: &'a TransactionExecutor,
    generation: u64,
}

impl Drop for ExecutionGuard<'_> {
    fn drop(&mut self) {
        let mut active = self.executor.lock_active();
        if active.generation != self.generation {
            return;
        }
        if let Some(token) = active.token.take() {
            token.cancel();
            active.generation += 1;
            self.executor.state_tx.send_replace(TransactionState::idle());
            warn!("Transaction abandoned before completion, returning to idle");
        }
    }
}

/// Backoff before retry number `attempt + 1`, without jitter.
pub fn base_backoff(attempt: u32) -> Duration {
    let factor = 1u64.checked_shl(attempt).unwrap_or(u64::MAX);
    Duration::from_millis(BACKOFF_BASE_MS.saturating_mul(factor).min(MAX_BACKOFF_MS))
}

/// Backoff with fresh uniform jitter in `[0, 10%)`.
pub fn backoff_delay(attempt: u32) -> Duration {
    use rand::Rng;
    let base = base_backoff(attempt);
    let jitter = rand::thread_rng().gen_range(0.0..JITTER_RATIO);
    base + base.mul_f64(jitter)
}

/// Runs ledger operations with timeout, confirmation, retry, and cancellation.
///
/// One execution is in flight at a time; starting another cancels the previous one.
pub struct TransactionExecutor {
    ledger: Arc<dyn LedgerClient>,
    config: ExecutorConfig,
    state_tx: watch::Sender<TransactionState>,
    active: Mutex<ActiveExecution>,
}

impl TransactionExecutor {
    pub fn new(ledger: Arc<dyn LedgerClient>, config: ExecutorConfig) -> Self {
        let (state_tx, _) = watch::channel(TransactionState::idle());
        Self {
            ledger,
            config,
            state_tx,
            active: Mutex::new(ActiveExecution {
                generation: 0,
                token: None,
            }),
        }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Current state snapshot.
    pub fn state(&self) -> TransactionState {
        self.state_tx.borrow().clone()
    }

    /// Receiver that observes every state transition.
    pub fn subscribe(&self) -> watch::Receiver<TransactionState> {
        self.state_tx.subscribe()
    }

    /// Cancels the in-flight execution, if any, and returns to idle.
    pub fn cancel(&self) {
        let mut active = self.lock_active();
        if let Some(token) = active.token.take() {
            token.cancel();
            active.generation += 1;
            self.state_tx.send_replace(TransactionState::idle());
            info!("Transaction cancelled");
        }
    }

    /// Clears a finished success or error state. No-op while an execution is in flight.
    pub fn reset(&self) {
        let active = self.lock_active();
        if active.token.is_none() {
            self.state_tx.send_replace(TransactionState::idle());
        }
    }

    /// Executes `operation` until it is confirmed, fails terminally, or is cancelled.
    ///
    /// `operation` signs and submits one transaction and is called again for every
    /// retry, so it must build a fresh transaction each time. Dropping the returned
    /// future counts as cancellation.
    ///
    /// # Returns
    ///
    /// * `Ok(ExecutionOutcome::Confirmed)` - Transaction confirmed
    /// * `Ok(ExecutionOutcome::Cancelled)` - Cancelled before completion
    /// * `Err(EscrowError)` - Terminal failure; state holds its user message
    pub async fn execute<F, Fut>(&self, mut operation: F) -> Result<ExecutionOutcome, EscrowError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Signature, LedgerError>>,
    {
        let (generation, token) = self.begin();
        let _guard = ExecutionGuard {
            executor: self,
            generation,
        };
        let max_attempts = self.config.max_retries.saturating_add(1);
        let mut attempt: u32 = 0;

        loop {
            if token.is_cancelled() {
                return Ok(ExecutionOutcome::Cancelled);
            }

            let current_attempt = attempt + 1;
            self.publish(generation, TransactionState::pending(current_attempt, max_attempts));
            debug!("Executing transaction (attempt {}/{})", current_attempt, max_attempts);

            match self
                .run_attempt(generation, &token, &mut operation, current_attempt, max_attempts)
                .await
            {
                AttemptResult::Confirmed(signature) => {
                    info!("Transaction confirmed: {}", signature);
                    self.finish(generation, TransactionState::success(signature));
                    return Ok(ExecutionOutcome::Confirmed(signature));
                }
                AttemptResult::Cancelled => return Ok(ExecutionOutcome::Cancelled),
                AttemptResult::Failed(err) => {
                    if attempt >= self.config.max_retries || !err.is_retryable() {
                        let message = err.user_message();
                        error!(
                            "Transaction failed after {} attempt(s): {}",
                            current_attempt, err
                        );
                        self.finish(generation, TransactionState::error(message));
                        return Err(err);
                    }

                    let delay = backoff_delay(attempt);
                    warn!(
                        "Attempt {}/{} failed ({}), retrying in {}ms",
                        current_attempt,
                        max_attempts,
                        err,
                        delay.as_millis()
                    );
                    tokio::select! {
                        biased;
                        _ = token.cancelled() => return Ok(ExecutionOutcome::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
            }
        }
    }

    async fn run_attempt<F, Fut>(
        &self,
        generation: u64,
        token: &CancellationToken,
        operation: &mut F,
        current_attempt: u32,
        max_attempts: u32,
    ) -> AttemptResult
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<Signature, LedgerError>>,
    {
        let submission = tokio::select! {
            biased;
            _ = token.cancelled() => return AttemptResult::Cancelled,
            result = tokio::time::timeout(self.config.timeout, operation()) => result,
        };
        let signature = match submission {
            Ok(Ok(signature)) => signature,
            Ok(Err(err)) => return AttemptResult::Failed(EscrowError::Submission(err)),
            Err(_) => return AttemptResult::Failed(EscrowError::TransactionTimeout),
        };

        if token.is_cancelled() {
            return AttemptResult::Cancelled;
        }
        self.publish(generation, TransactionState::confirming(current_attempt, max_attempts));
        debug!("Transaction submitted: {}, awaiting confirmation", signature);

        let confirmation = tokio::select! {
            biased;
            _ = token.cancelled() => return AttemptResult::Cancelled,
            result = tokio::time::timeout(self.config.timeout, self.confirm(&signature)) => result,
        };
        match confirmation {
            Ok(Ok(None)) => AttemptResult::Confirmed(signature),
            Ok(Ok(Some(tx_err))) => AttemptResult::Failed(EscrowError::ExecutionFailed {
                signature,
                details: tx_err.to_string(),
            }),
            Ok(Err(err)) => AttemptResult::Failed(EscrowError::Submission(err)),
            Err(_) => AttemptResult::Failed(EscrowError::TransactionTimeout),
        }
    }

    async fn confirm(
        &self,
        signature: &Signature,
    ) -> Result<Option<solana_sdk::transaction::TransactionError>, LedgerError> {
        let block = self.ledger.get_latest_block().await?;
        self.ledger
            .confirm_transaction(signature, &block, self.config.commitment)
            .await
    }

    /// Registers a new execution, cancelling whichever one was in flight.
    fn begin(&self) -> (u64, CancellationToken) {
        let mut active = self.lock_active();
        if let Some(previous) = active.token.take() {
            previous.cancel();
            info!("Cancelling previous transaction");
        }
        active.generation += 1;
        let token = CancellationToken::new();
        active.token = Some(token.clone());
        (active.generation, token)
    }

    /// Publishes `state` only if `generation` is still the active execution.
    fn publish(&self, generation: u64, state: TransactionState) {
        let active = self.lock_active();
        if active.generation == generation {
            self.state_tx.send_replace(state);
        }
    }

    /// Publishes a final state and releases the in-flight slot.
    fn finish(&self, generation: u64, state: TransactionState) {
        let mut active = self.lock_active();
        if active.generation == generation {
            active.token = None;
            self.state_tx.send_replace(state);
        }
    }

    fn lock_active(&self) -> MutexGuard<'_, ActiveExecution> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
