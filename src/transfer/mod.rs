//! Account Transfers
//!
//! Moves money between two accounts as one atomic unit of work, records a
//! [`TransactionRecord`], then publishes a [`TransferEvent`].
//!
//! # Flow
//!
//! ```text
//! VALIDATING → LOCK_ACQUIRED → BALANCE_CHECKED → COMMITTED → EVENT_PUBLISHED
//!      ↓             ↓                ↓               ↘
//!   ABORTED       ABORTED          ABORTED          PUBLISH_FAILED
//! ```
//!
//! # Safety Invariants
//!
//! 1. **Canonical Lock Order**: rows are locked lower account id first
//! 2. **All-or-Nothing**: both balance updates and the record commit together
//! 3. **Drop Means Rollback**: an abandoned unit-of-work releases its locks
//! 4. **Commit Before Publish**: a failed notification never undoes a transfer

pub mod engine;
pub mod error;
pub mod memory;
pub mod postgres;
pub mod publisher;
pub mod state;
pub mod store;
pub mod types;
pub mod validation;


// Re-exports for convenience
pub use engine::{EngineConfig, TransferEngine, lock_order};
pub use error::TransferError;
pub use memory::InMemoryAccountStore;
pub use postgres::PgAccountStore;
pub use publisher::{
    ChannelPublisher, EventPublisher, HttpPublisher, LogPublisher, PublishError, RetryPolicy,
};
pub use state::TransferState;
pub use store::{AccountStore, UnitOfWork};
pub use types::{Account, PublishStatus, TransactionRecord, TransferEvent, TransferReceipt};
