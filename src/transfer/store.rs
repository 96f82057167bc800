//! Account Store
//!
//! Persistence seam consumed by the engine. Implementations:
//! - [`InMemoryAccountStore`](super::memory::InMemoryAccountStore): per-row async locks
//! - [`PgAccountStore`](super::postgres::PgAccountStore): `SELECT ... FOR UPDATE`
//!
//! # Unit-of-work contract
//!
//! A [`UnitOfWork`] is all-or-nothing. Dropping one that was neither committed
//! nor rolled back MUST roll it back and release its row locks. The engine relies
//! on this for panics and for futures cancelled mid-transfer.

use async_trait::async_trait;

use super::error::TransferError;
use super::types::{Account, TransactionRecord};
use crate::core_types::{AccountId, Amount};

/// Store-level operations outside any unit-of-work
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// Get store name for logging
    fn name(&self) -> &'static str;

    /// Open a unit-of-work
    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, TransferError>;

    /// Committed balance, read without taking a row lock
    async fn get_balance(&self, id: AccountId) -> Result<Amount, TransferError>;

    /// Records where `id` is the sender, ordered by transaction id
    async fn list_transactions_from(
        &self,
        id: AccountId,
    ) -> Result<Vec<TransactionRecord>, TransferError>;

    /// Connectivity probe for the health endpoint
    async fn health_check(&self) -> Result<(), TransferError> {
        Ok(())
    }
}

/// Operations scoped to one unit-of-work
#[async_trait]
pub trait UnitOfWork: Send {
    /// Take the exclusive row lock on `id` and return the row.
    ///
    /// Blocks while another unit-of-work holds the lock. `Ok(None)` if the
    /// account does not exist.
    async fn lock_account_for_update(
        &mut self,
        id: AccountId,
    ) -> Result<Option<Account>, TransferError>;

    /// Stage a new balance for an account locked by this unit-of-work.
    ///
    /// Negative balances are rejected.
    async fn update_balance(
        &mut self,
        id: AccountId,
        new_balance: Amount,
    ) -> Result<(), TransferError>;

    /// Insert the history row; the store assigns id and timestamp.
    async fn insert_transaction(
        &mut self,
        from: AccountId,
        to: AccountId,
        amount: Amount,
    ) -> Result<TransactionRecord, TransferError>;

    /// Make every staged write visible at once, then release the locks.
    ///
    /// `TransferError::Conflict` if the store refused the commit; nothing persists.
    async fn commit(self: Box<Self>) -> Result<(), TransferError>;

    /// Discard every staged write and release the locks.
    async fn rollback(self: Box<Self>) -> Result<(), TransferError>;
}


#[cfg(test)]
pub use mock::FaultyStore;
