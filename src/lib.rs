//! Transfer Engine - atomic account-to-account transfers
//!
//! # Modules
//!
//! - [`core_types`] - Core type definitions (AccountId, Amount, etc.)
//! - [`transfer`] - Engine, stores, publishers, errors
//! - [`db`] - PostgreSQL pool and schema
//! - [`gateway`] - HTTP surface
//! - [`config`] - YAML configuration
//! - [`logging`] - tracing subscriber setup
//! - [`bootstrap`] - config-driven wiring

// Core types - must be first!
pub mod core_types;

pub mod bootstrap;
pub mod config;
pub mod db;
pub mod gateway;
pub mod logging;
pub mod transfer;

// Convenient re-exports at crate root
pub use core_types::{AccountId, Amount, MAX_AMOUNT, TransactionId};
pub use transfer::{
    AccountStore, EventPublisher, InMemoryAccountStore, PublishStatus, TransactionRecord,
    TransferEngine, TransferError, TransferReceipt,
};
