//! Error Types
//!
//! Structured failures for the escrow client. Local checks (parameters, balances,
//! authorization) produce their own variants and never reach the ledger. Everything the
//! ledger or the wallet reports is carried by [`LedgerError`] and classified by the
//! transaction executor as retryable or terminal.

use solana_client::client_error::{ClientError, ClientErrorKind};
use solana_client::rpc_request::{RpcError, RpcResponseErrorData};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::signer::SignerError;
use thiserror::Error;

// ============================================================================
// ERROR CODES
// ============================================================================

/// Wallet refused to sign (user pressed reject).
pub const USER_REJECTED_CODE: i64 = 4001;

/// Wallet not connected or signing device unavailable.
pub const WALLET_UNAVAILABLE_CODE: i64 = 4100;

/// JSON-RPC internal error, reported by most RPC nodes for transport trouble.
pub const NETWORK_ERROR_CODE: i64 = -32603;

/// Message fragments that mark a failure as permanent.
const NON_RETRYABLE_KEYWORDS: [&str; 4] = ["insufficient", "invalid", "unauthorized", "rejected"];

// ============================================================================
// LEDGER ERROR
// ============================================================================

/// Failure reported while talking to the ledger or the signing wallet.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct LedgerError {
    /// Numeric code from the RPC node or wallet, if any
    pub code: Option<i64>,
    /// Raw message
    pub message: String,
    /// Program logs captured from a failed preflight simulation
    pub logs: Vec<String>,
}

impl LedgerError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
            logs: Vec::new(),
        }
    }

    pub fn with_code(code: i64, message: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            ..Self::new(message)
        }
    }

    pub fn with_logs(mut self, logs: Vec<String>) -> Self {
        self.logs = logs;
        self
    }

    /// Returns false for wallet refusals and for messages naming a permanent condition.
    pub fn is_retryable(&self) -> bool {
        if matches!(
            self.code,
            Some(USER_REJECTED_CODE) | Some(WALLET_UNAVAILABLE_CODE)
        ) {
            return false;
        }
        let message = self.message.to_lowercase();
        !NON_RETRYABLE_KEYWORDS
            .iter()
            .any(|keyword| message.contains(keyword))
    }

    /// First program log line that explains the failure.
    pub fn program_log(&self) -> Option<&str> {
        self.logs
            .iter()
            .find(|log| log.contains("Program log:") || log.contains("Error:"))
            .map(String::as_str)
    }

    /// Reduces the failure to one actionable sentence.
    ///
    /// Program logs win over codes, codes win over message keywords.
    pub fn user_message(&self) -> String {
        if let Some(log) = self.program_log() {
            return format!("Program error: {}", log.trim_start_matches("Program log: "));
        }

        match self.code {
            Some(USER_REJECTED_CODE) => return "Transaction rejected by user".to_string(),
            Some(WALLET_UNAVAILABLE_CODE) => return "Wallet not connected".to_string(),
            Some(NETWORK_ERROR_CODE) => {
                return "Network error. Please check your connection.".to_string()
            }
            _ => {}
        }

        let message = self.message.to_lowercase();
        if message.contains("blockhash") || message.contains("expired") {
            "Transaction expired. Please try again.".to_string()
        } else if message.contains("insufficient") {
            "Insufficient funds for transaction".to_string()
        } else if message.contains("timeout") || message.contains("timed out") {
            "Transaction timed out. Please try again.".to_string()
        } else if message.contains("simulation failed") {
            "Transaction simulation failed. Please check your inputs.".to_string()
        } else if message.contains("account not found") {
            "Required account not found. Please ensure all tokens are properly initialized."
                .to_string()
        } else if self.message.trim().is_empty() {
            "Transaction failed unexpectedly".to_string()
        } else {
            self.message.clone()
        }
    }

    /// Maps a signer failure onto the wallet error codes.
    pub fn from_signer_error(err: &SignerError) -> Self {
        let code = match err {
            SignerError::UserCancel(_) => Some(USER_REJECTED_CODE),
            SignerError::Connection(_) | SignerError::NoDeviceFound => {
                Some(WALLET_UNAVAILABLE_CODE)
            }
            _ => None,
        };
        Self {
            code,
            ..Self::new(err.to_string())
        }
    }
}

impl From<ClientError> for LedgerError {
    fn from(err: ClientError) -> Self {
        match err.kind() {
            ClientErrorKind::RpcError(RpcError::RpcResponseError {
                code,
                message,
                data,
            }) => {
                let logs = match data {
                    RpcResponseErrorData::SendTransactionPreflightFailure(result) => {
                        result.logs.clone().unwrap_or_default()
                    }
                    _ => Vec::new(),
                };
                LedgerError::with_code(*code, message.clone()).with_logs(logs)
            }
            ClientErrorKind::SigningError(signer_err) => LedgerError::from_signer_error(signer_err),
            _ => LedgerError::new(err.to_string()),
        }
    }
}

impl From<SignerError> for LedgerError {
    fn from(err: SignerError) -> Self {
        LedgerError::from_signer_error(&err)
    }
}

// ============================================================================
// ESCROW ERROR
// ============================================================================

/// Every way an escrow operation can fail.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EscrowError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Insufficient token balance. Required: {required}, Available: {available}")]
    InsufficientBalance { required: u64, available: u64 },

    #[error("Token account for {mint} not found. Please create it first in your wallet.")]
    AccountNotFound { mint: Pubkey },

    #[error("Escrow {address} not found - it may have been completed or refunded")]
    EscrowNotFound { address: Pubkey },

    #[error("Only the escrow maker can refund (maker: {maker}, caller: {caller})")]
    Unauthorized { maker: Pubkey, caller: Pubkey },

    #[error("Invalid account data for {address}: {reason}")]
    InvalidAccountData { address: Pubkey, reason: String },

    #[error("Failed to serialize {what}: {reason}")]
    Serialization { what: &'static str, reason: String },

    #[error("Transaction timeout")]
    TransactionTimeout,

    #[error("Submission failed: {0}")]
    Submission(#[from] LedgerError),

    #[error("Transaction {signature} failed: {details}")]
    ExecutionFailed { signature: Signature, details: String },
}

impl EscrowError {
    pub fn validation(message: impl Into<String>) -> Self {
        EscrowError::Validation(message.into())
    }

    pub fn serialization(what: &'static str, err: std::io::Error) -> Self {
        EscrowError::Serialization {
            what,
            reason: err.to_string(),
        }
    }

    /// Whether the executor may submit again after this failure.
    ///
    /// Executed-and-failed transactions are never resubmitted.
    pub fn is_retryable(&self) -> bool {
        match self {
            EscrowError::TransactionTimeout => true,
            EscrowError::Submission(err) => err.is_retryable(),
            _ => false,
        }
    }

    /// Single human-readable message for display.
    pub fn user_message(&self) -> String {
        match self {
            EscrowError::Submission(err) => err.user_message(),
            EscrowError::TransactionTimeout => "Transaction timed out. Please try again.".to_string(),
            EscrowError::ExecutionFailed { details, .. } => format!("Transaction failed: {}", details),
            EscrowError::Validation(message) => message.clone(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test that wallet refusal codes are terminal
    /// Why: Asking the user again after an explicit reject is never wanted
    #[test]
    fn test_wallet_codes_not_retryable() {
        assert!(!LedgerError::with_code(USER_REJECTED_CODE, "User rejected the request").is_retryable());
        assert!(!LedgerError::with_code(WALLET_UNAVAILABLE_CODE, "not connected").is_retryable());
        assert!(LedgerError::with_code(NETWORK_ERROR_CODE, "connection reset").is_retryable());
    }

    /// Test that keyword classification is case-insensitive
    #[test]
    fn test_keywords_not_retryable() {
        assert!(!LedgerError::new("Attempt to debit an account but found no record of a prior credit: Insufficient funds").is_retryable());
        assert!(!LedgerError::new("Invalid param: could not find account").is_retryable());
        assert!(LedgerError::new("Blockhash not found").is_retryable());
    }

    /// Test that program logs take priority in the user message
    /// Why: The program's own explanation is more useful than the transport message
    #[test]
    fn test_user_message_prefers_program_log() {
        let err = LedgerError::with_code(-32002, "Transaction simulation failed")
            .with_logs(vec![
                "Program 8hMr invoke [1]".to_string(),
                "Program log: Error: insufficient funds".to_string(),
            ]);
        assert_eq!(err.user_message(), "Program error: Error: insufficient funds");
    }

    #[test]
    fn test_user_message_classification() {
        assert_eq!(
            LedgerError::with_code(USER_REJECTED_CODE, "x").user_message(),
            "Transaction rejected by user"
        );
        assert_eq!(
            LedgerError::new("Blockhash not found").user_message(),
            "Transaction expired. Please try again."
        );
        assert_eq!(
            LedgerError::new("Transaction simulation failed: Error processing Instruction 0")
                .user_message(),
            "Transaction simulation failed. Please check your inputs."
        );
        assert_eq!(LedgerError::new("").user_message(), "Transaction failed unexpectedly");
        assert_eq!(LedgerError::new("node is behind").user_message(), "node is behind");
    }

    /// Test that signer failures map onto wallet codes
    #[test]
    fn test_signer_error_codes() {
        let rejected = LedgerError::from(SignerError::UserCancel("declined".to_string()));
        assert_eq!(rejected.code, Some(USER_REJECTED_CODE));
        let missing = LedgerError::from(SignerError::NoDeviceFound);
        assert_eq!(missing.code, Some(WALLET_UNAVAILABLE_CODE));
    }

    #[test]
    fn test_escrow_error_retryable() {
        assert!(EscrowError::TransactionTimeout.is_retryable());
        assert!(!EscrowError::ExecutionFailed {
            signature: Signature::default(),
            details: "custom program error: 0x1".to_string(),
        }
        .is_retryable());
        assert!(!EscrowError::validation("bad seed").is_retryable());
    }
}
