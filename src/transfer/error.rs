//! Transfer Error Types
//!
//! Every way a transfer, balance read or history read can fail. Publish failures
//! are deliberately NOT here: they never fail a transfer (see
//! [`PublishError`](super::publisher::PublishError)).

use thiserror::Error;

use crate::core_types::{AccountId, Amount};

/// SQLSTATE codes PostgreSQL uses for serialization failures and detected deadlocks.
const SERIALIZATION_FAILURE: &str = "40001";
const DEADLOCK_DETECTED: &str = "40P01";

/// Transfer error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    // === Validation Errors (no store access happened) ===
    #[error("Invalid account id: {0} (must be greater than 0)")]
    InvalidAccount(AccountId),

    #[error("Invalid amount: {amount} (must satisfy 0 < amount < {max})")]
    InvalidAmount { amount: Amount, max: Amount },

    #[error("Source and target account cannot be the same")]
    SameAccount,

    // === Business Errors (unit-of-work rolled back) ===
    #[error("Account not found: {0}")]
    AccountNotFound(AccountId),

    #[error("Insufficient funds: available {available}, requested {requested}")]
    InsufficientFunds { available: Amount, requested: Amount },

    #[error("Balance of account {0} would overflow")]
    BalanceOverflow(AccountId),

    // === Retryable Errors ===
    #[error("Commit conflict: {0}")]
    Conflict(String),

    #[error("Transfer cancelled before commit")]
    Cancelled,

    // === System Errors ===
    #[error("Internal error: {0}")]
    Internal(String),
}

impl TransferError {
    /// Get the error code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            TransferError::InvalidAccount(_) => "INVALID_ACCOUNT",
            TransferError::InvalidAmount { .. } => "INVALID_AMOUNT",
            TransferError::SameAccount => "SAME_ACCOUNT",
            TransferError::AccountNotFound(_) => "ACCOUNT_NOT_FOUND",
            TransferError::InsufficientFunds { .. } => "INSUFFICIENT_FUNDS",
            TransferError::BalanceOverflow(_) => "BALANCE_OVERFLOW",
            TransferError::Conflict(_) => "CONFLICT",
            TransferError::Cancelled => "CANCELLED",
            TransferError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Numeric code used in the `{code, msg, data}` response envelope
    pub fn api_code(&self) -> i32 {
        match self {
            TransferError::InvalidAccount(_) => 1001,
            TransferError::InvalidAmount { .. } => 1002,
            TransferError::SameAccount => 1003,
            TransferError::InsufficientFunds { .. } => 1004,
            TransferError::BalanceOverflow(_) => 1005,
            TransferError::AccountNotFound(_) => 4001,
            TransferError::Conflict(_) => 4091,
            TransferError::Cancelled => 4081,
            TransferError::Internal(_) => 5000,
        }
    }

    /// Get HTTP status code suggestion
    pub fn http_status(&self) -> u16 {
        match self {
            TransferError::InvalidAccount(_)
            | TransferError::InvalidAmount { .. }
            | TransferError::SameAccount => 400,
            TransferError::AccountNotFound(_) => 404,
            TransferError::Cancelled => 408,
            TransferError::Conflict(_) => 409,
            TransferError::InsufficientFunds { .. } | TransferError::BalanceOverflow(_) => 422,
            TransferError::Internal(_) => 500,
        }
    }

    /// Whether the caller may safely re-issue the whole transfer.
    ///
    /// Only errors that guarantee nothing was persisted qualify: a commit
    /// conflict reported by the store, or cancellation before commit. A lost
    /// connection during commit is `Internal` because its outcome is unknown.
    pub fn is_retryable(&self) -> bool {
        matches!(self, TransferError::Conflict(_) | TransferError::Cancelled)
    }

    /// True for errors detected before the store was touched.
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            TransferError::InvalidAccount(_)
                | TransferError::InvalidAmount { .. }
                | TransferError::SameAccount
        )
    }
}

impl From<sqlx::Error> for TransferError {
    fn from(e: sqlx::Error) -> Self {
        if let sqlx::Error::Database(ref db_err) = e
            && let Some(code) = db_err.code()
            && (code == SERIALIZATION_FAILURE || code == DEADLOCK_DETECTED)
        {
            return TransferError::Conflict(db_err.message().to_string());
        }
        TransferError::Internal(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        assert_eq!(TransferError::SameAccount.code(), "SAME_ACCOUNT");
        assert_eq!(
            TransferError::InsufficientFunds {
                available: 10,
                requested: 50
            }
            .code(),
            "INSUFFICIENT_FUNDS"
        );
        assert_eq!(TransferError::AccountNotFound(7).code(), "ACCOUNT_NOT_FOUND");
    }

    #[test]
    fn test_http_status() {
        assert_eq!(TransferError::InvalidAccount(0).http_status(), 400);
        assert_eq!(
            TransferError::InvalidAmount { amount: 0, max: 10 }.http_status(),
            400
        );
        assert_eq!(TransferError::AccountNotFound(3).http_status(), 404);
        assert_eq!(TransferError::Conflict("x".into()).http_status(), 409);
        assert_eq!(
            TransferError::InsufficientFunds {
                available: 0,
                requested: 1
            }
            .http_status(),
            422
        );
        assert_eq!(TransferError::Internal("db".into()).http_status(), 500);
    }

    #[test]
    fn test_retryable() {
        assert!(TransferError::Conflict("serialization".into()).is_retryable());
        assert!(TransferError::Cancelled.is_retryable());
        assert!(!TransferError::SameAccount.is_retryable());
        assert!(!TransferError::Internal("boom".into()).is_retryable());
    }

    #[test]
    fn test_input_errors() {
        assert!(TransferError::SameAccount.is_input_error());
        assert!(TransferError::InvalidAccount(-1).is_input_error());
        assert!(!TransferError::AccountNotFound(1).is_input_error());
    }

    #[test]
    fn test_display() {
        let err = TransferError::InsufficientFunds {
            available: 10,
            requested: 50,
        };
        assert_eq!(
            err.to_string(),
            "Insufficient funds: available 10, requested 50"
        );
    }

    #[test]
    fn test_non_database_sqlx_error_is_internal() {
        let err: TransferError = sqlx::Error::RowNotFound.into();
        assert_eq!(err.code(), "INTERNAL_ERROR");
    }
}
