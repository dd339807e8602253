//! Observable transaction state.

use solana_sdk::signature::Signature;

/// Lifecycle of one execution: idle → pending → confirming → success | error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    Idle,
    Pending,
    Confirming,
    Success,
    Error,
}

/// Attempt counter shown while a transaction is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Progress {
    /// 1-based attempt number
    pub current_attempt: u32,
    pub max_attempts: u32,
}

/// Snapshot published by the executor on every transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionState {
    pub status: TransactionStatus,
    pub progress: Option<Progress>,
    pub signature: Option<Signature>,
    pub error: Option<String>,
}

impl Default for TransactionState {
    fn default() -> Self {
        Self::idle()
    }
}

impl TransactionState {
    pub fn idle() -> Self {
        Self {
            status: TransactionStatus::Idle,
            progress: None,
            signature: None,
            error: None,
        }
    }

    pub fn pending(current_attempt: u32, max_attempts: u32) -> Self {
        Self {
            status: TransactionStatus::Pending,
            progress: Some(Progress {
                current_attempt,
                max_attempts,
            }),
            ..Self::idle()
        }
    }

    pub fn confirming(current_attempt: u32, max_attempts: u32) -> Self {
        Self {
            status: TransactionStatus::Confirming,
            ..Self::pending(current_attempt, max_attempts)
        }
    }

    pub fn success(signature: Signature) -> Self {
        Self {
            status: TransactionStatus::Success,
            signature: Some(signature),
            ..Self::idle()
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: TransactionStatus::Error,
            error: Some(message.into()),
            ..Self::idle()
        }
    }

    /// Pending or confirming.
    pub fn is_loading(&self) -> bool {
        matches!(
            self.status,
            TransactionStatus::Pending | TransactionStatus::Confirming
        )
    }

    pub fn is_idle(&self) -> bool {
        self.status == TransactionStatus::Idle
    }

    pub fn is_pending(&self) -> bool {
        self.status == TransactionStatus::Pending
    }

    pub fn is_confirming(&self) -> bool {
        self.status == TransactionStatus::Confirming
    }

    pub fn is_success(&self) -> bool {
        self.status == TransactionStatus::Success
    }

    pub fn is_error(&self) -> bool {
        self.status == TransactionStatus::Error
    }
}
