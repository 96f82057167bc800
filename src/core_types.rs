//! Core types used throughout the system
//!
//! Type aliases that give the raw integers stored in `accounts_tb` and
//! `transactions_tb` a name. Signed on purpose: they map 1:1 onto PostgreSQL
//! `BIGINT`, and the validator rejects the non-positive range explicitly.

/// Account ID - globally unique, stable, never reused.
///
/// # Constraints:
/// - **Positive**: `id > 0`, anything else is rejected before store access
/// - **Totally ordered**: the ordering defines the canonical lock order
pub type AccountId = i64;

/// Transaction ID - assigned by the store on insert, strictly increasing.
pub type TransactionId = i64;

/// Amount in minor units (no fractional part).
pub type Amount = i64;

/// Default exclusive upper bound for a single transfer amount.
pub const MAX_AMOUNT: Amount = 1_000_000_000;
