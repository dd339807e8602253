//! Local Validation
//!
//! Checks that run before anything is submitted: escrow parameters, user-supplied
//! strings, and token balances. Balance checks only mirror what the escrow program
//! enforces on its own; they exist to avoid paying for transactions that must fail.

use solana_sdk::pubkey::Pubkey;
use tracing::debug;

use crate::error::EscrowError;
use crate::ledger::{LedgerClient, TokenAccountInfo};

/// Largest integer every wallet and UI can represent exactly (2^53 - 1).
pub const MAX_SAFE_INTEGER: u64 = 9_007_199_254_740_991;

// ============================================================================
// ESCROW PARAMETERS
// ============================================================================

/// Numeric parameters of a Make operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EscrowParams {
    pub seed: u64,
    pub deposit_amount: u64,
    pub receive_amount: u64,
}

impl EscrowParams {
    /// Rejects seeds above the safe bound and amounts that are zero or above it.
    pub fn validate(&self) -> Result<(), EscrowError> {
        if self.seed > MAX_SAFE_INTEGER {
            return Err(EscrowError::validation("Seed must be a valid positive number"));
        }
        if self.deposit_amount == 0 {
            return Err(EscrowError::validation("Deposit amount must be greater than 0"));
        }
        if self.deposit_amount > MAX_SAFE_INTEGER {
            return Err(EscrowError::validation("Deposit amount is too large"));
        }
        if self.receive_amount == 0 {
            return Err(EscrowError::validation("Receive amount must be greater than 0"));
        }
        if self.receive_amount > MAX_SAFE_INTEGER {
            return Err(EscrowError::validation("Receive amount is too large"));
        }
        Ok(())
    }
}

// ============================================================================
// STRING INPUTS
// ============================================================================

/// Parses a user-entered token amount: required, positive, whole.
pub fn parse_amount(value: &str) -> Result<u64, EscrowError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(EscrowError::validation("Amount is required"));
    }
    let amount: u64 = trimmed
        .parse()
        .map_err(|_| EscrowError::validation("Amount must be a positive whole number"))?;
    if amount == 0 || amount > MAX_SAFE_INTEGER {
        return Err(EscrowError::validation("Amount must be a positive number"));
    }
    Ok(amount)
}

/// Parses a user-entered seed: required, non-negative integer.
pub fn parse_seed(value: &str) -> Result<u64, EscrowError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(EscrowError::validation("Seed is required"));
    }
    let seed: u64 = trimmed
        .parse()
        .map_err(|_| EscrowError::validation("Seed must be a non-negative integer"))?;
    if seed > MAX_SAFE_INTEGER {
        return Err(EscrowError::validation("Seed must be a non-negative integer"));
    }
    Ok(seed)
}

// ============================================================================
// TOKEN BALANCES
// ============================================================================

/// Checks that a token account holds at least `required_amount`.
///
/// # Arguments
///
/// * `ledger` - Read-only ledger access
/// * `account` - Token account to inspect
/// * `required_amount` - Minimum balance
/// * `mint` - Expected mint (reported when the account is missing)
///
/// # Returns
///
/// * `Ok(TokenAccountInfo)` - Account holds enough
/// * `Err(EscrowError::InsufficientBalance)` - Account holds less
/// * `Err(EscrowError::AccountNotFound)` - Account missing or unreadable
pub async fn validate_balance(
    ledger: &dyn LedgerClient,
    account: &Pubkey,
    required_amount: u64,
    mint: &Pubkey,
) -> Result<TokenAccountInfo, EscrowError> {
    let info = match ledger.get_token_account(account).await {
        Ok(Some(info)) => info,
        Ok(None) => return Err(EscrowError::AccountNotFound { mint: *mint }),
        Err(e) => {
            debug!("Token account {} unreadable: {}", account, e);
            return Err(EscrowError::AccountNotFound { mint: *mint });
        }
    };

    if info.amount < required_amount {
        return Err(EscrowError::InsufficientBalance {
            required: required_amount,
            available: info.amount,
        });
    }

    Ok(info)
}
