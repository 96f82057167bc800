//! Input validation for transfer requests
//!
//! Pure functions: no I/O, no locks. The engine runs them before it opens a
//! unit-of-work, so a rejected request never reaches the store.

use super::error::TransferError;
use crate::core_types::{AccountId, Amount};

/// Validate an account identifier
///
/// # Validation Rules
/// - Must be strictly positive
///
/// # Examples
/// ```
/// use transfer_engine::transfer::validation::validate_account_id;
///
/// assert!(validate_account_id(42).is_ok());
/// assert!(validate_account_id(0).is_err());
/// ```
pub fn validate_account_id(id: AccountId) -> Result<(), TransferError> {
    if id <= 0 {
        return Err(TransferError::InvalidAccount(id));
    }
    Ok(())
}

/// Validate a transfer amount against the configured ceiling
///
/// # Validation Rules
/// - `0 < amount < max_amount` (the ceiling itself is rejected)
pub fn validate_amount(amount: Amount, max_amount: Amount) -> Result<(), TransferError> {
    if amount <= 0 || amount >= max_amount {
        return Err(TransferError::InvalidAmount {
            amount,
            max: max_amount,
        });
    }
    Ok(())
}

/// Full pre-store check for a transfer, in the order the engine reports failures:
/// same account, then `from`, then `to`, then amount.
pub fn validate_transfer(
    from: AccountId,
    to: AccountId,
    amount: Amount,
    max_amount: Amount,
) -> Result<(), TransferError> {
    if from == to {
        return Err(TransferError::SameAccount);
    }
    validate_account_id(from)?;
    validate_account_id(to)?;
    validate_amount(amount, max_amount)
}
