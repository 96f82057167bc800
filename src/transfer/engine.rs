//! Transfer Engine
//!
//! Orchestrates one transfer:
//!
//! ```text
//! validate -> begin -> lock(min id) -> lock(max id) -> check funds
//!          -> update balances -> insert record -> commit -> publish event
//! ```
//!
//! Both rows are always locked lower id first, so two transfers touching the
//! same pair can never wait on each other in a cycle. Everything up to commit
//! happens inside one unit-of-work; any failure before commit rolls it back
//! and leaves balances and history untouched. Publishing runs after commit and
//! cannot fail the transfer.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use super::error::TransferError;
use super::publisher::{EventPublisher, RetryPolicy, publish_with_retry};
use super::state::{TransferProgress, TransferState};
use super::store::{AccountStore, UnitOfWork};
use super::types::{PublishStatus, TransactionRecord, TransferEvent, TransferReceipt};
use super::validation::{validate_account_id, validate_transfer};
use crate::config::{AppConfig, PublishMode};
use crate::core_types::{AccountId, Amount, MAX_AMOUNT};

/// Engine tuning knobs
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Exclusive upper bound on a single transfer amount
    pub max_amount: Amount,
    /// Bound on the pre-commit phase (lock waits and writes)
    pub unit_of_work_timeout: Option<Duration>,
    pub publish_mode: PublishMode,
    pub retry: RetryPolicy,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_amount: MAX_AMOUNT,
            unit_of_work_timeout: None,
            publish_mode: PublishMode::Inline,
            retry: RetryPolicy::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_app_config(config: &AppConfig) -> Self {
        let publisher = &config.publisher;
        Self {
            max_amount: config.engine.max_amount,
            unit_of_work_timeout: config
                .engine
                .unit_of_work_timeout_ms
                .map(Duration::from_millis),
            publish_mode: config.engine.publish_mode,
            retry: RetryPolicy {
                max_attempts: publisher.max_attempts,
                min_delay: Duration::from_millis(publisher.min_delay_ms),
                max_delay: Duration::from_millis(publisher.max_delay_ms),
                backoff: publisher.backoff,
                jitter: publisher.jitter,
            },
        }
    }
}

/// Canonical lock order for a pair of accounts: lower id first.
pub fn lock_order(a: AccountId, b: AccountId) -> (AccountId, AccountId) {
    if a <= b { (a, b) } else { (b, a) }
}

pub struct TransferEngine {
    store: Arc<dyn AccountStore>,
    publisher: Arc<dyn EventPublisher>,
    config: EngineConfig,
}

impl TransferEngine {
    pub fn new(
        store: Arc<dyn AccountStore>,
        publisher: Arc<dyn EventPublisher>,
        config: EngineConfig,
    ) -> Self {
        info!(
            store = store.name(),
            publisher = publisher.name(),
            max_amount = config.max_amount,
            publish_mode = ?config.publish_mode,
            "Transfer engine initialized"
        );
        Self {
            store,
            publisher,
            config,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn AccountStore> {
        &self.store
    }

    /// Move `amount` from `from` to `to` atomically.
    ///
    /// Returns the committed record together with the notification outcome.
    /// A failed notification is reported on the receipt, not as an error.
    pub async fn transfer(
        &self,
        from: AccountId,
        to: AccountId,
        amount: Amount,
    ) -> Result<TransferReceipt, TransferError> {
        self.execute(from, to, amount, self.config.unit_of_work_timeout)
            .await
    }

    /// Same as [`transfer`](Self::transfer) with an explicit bound on the
    /// pre-commit phase. Exceeding it rolls back and yields `Cancelled`.
    pub async fn transfer_with_timeout(
        &self,
        from: AccountId,
        to: AccountId,
        amount: Amount,
        timeout: Duration,
    ) -> Result<TransferReceipt, TransferError> {
        self.execute(from, to, amount, Some(timeout)).await
    }

    /// Transactions sent by `user_id`, ordered by transaction id
    pub async fn list_transactions(
        &self,
        user_id: AccountId,
    ) -> Result<Vec<TransactionRecord>, TransferError> {
        validate_account_id(user_id)?;
        self.store.list_transactions_from(user_id).await
    }

    /// Committed balance of `user_id`
    pub async fn get_balance(&self, user_id: AccountId) -> Result<Amount, TransferError> {
        validate_account_id(user_id)?;
        self.store.get_balance(user_id).await
    }

    pub async fn health_check(&self) -> Result<(), TransferError> {
        self.store.health_check().await
    }

    async fn execute(
        &self,
        from: AccountId,
        to: AccountId,
        amount: Amount,
        timeout: Option<Duration>,
    ) -> Result<TransferReceipt, TransferError> {
        let mut progress = TransferProgress::new();

        if let Err(e) = validate_transfer(from, to, amount, self.config.max_amount) {
            progress.abort();
            debug!(from, to, amount, error = %e, "Transfer rejected");
            return Err(e);
        }

        let prepared = match timeout {
            Some(limit) => {
                match tokio::time::timeout(limit, self.prepare(from, to, amount, &mut progress))
                    .await
                {
                    Ok(result) => result,
                    Err(_) => {
                        warn!(
                            from,
                            to,
                            amount,
                            timeout_ms = limit.as_millis() as u64,
                            "Transfer timed out before commit, rolled back"
                        );
                        Err(TransferError::Cancelled)
                    }
                }
            }
            None => self.prepare(from, to, amount, &mut progress).await,
        };

        let (uow, record) = match prepared {
            Ok(prepared) => prepared,
            Err(e) => {
                progress.abort();
                return Err(e);
            }
        };

        if let Err(e) = uow.commit().await {
            progress.abort();
            warn!(
                from, to, amount,
                error = %e,
                retryable = e.is_retryable(),
                "Commit failed"
            );
            return Err(e);
        }
        Self::settle(&mut progress, TransferState::Committed);

        info!(
            transaction_id = record.id,
            from, to, amount, "Transfer committed"
        );

        let publish = self.notify(&record).await;
        match &publish {
            PublishStatus::Published { .. } => {
                Self::settle(&mut progress, TransferState::EventPublished)
            }
            PublishStatus::Failed { .. } => {
                Self::settle(&mut progress, TransferState::PublishFailed)
            }
            PublishStatus::Dispatched => {}
        }

        Ok(TransferReceipt {
            transaction_id: record.id,
            from: record.from,
            to: record.to,
            amount: record.amount,
            created_at: record.created_at,
            publish,
            state: progress.state(),
        })
    }

    /// Run everything up to (not including) commit.
    ///
    /// On error the unit-of-work is rolled back here. If this future is
    /// dropped instead, dropping the unit-of-work rolls it back.
    async fn prepare(
        &self,
        from: AccountId,
        to: AccountId,
        amount: Amount,
        progress: &mut TransferProgress,
    ) -> Result<(Box<dyn UnitOfWork>, TransactionRecord), TransferError> {
        let mut uow = self.store.begin().await?;

        let applied = Self::apply(uow.as_mut(), from, to, amount, progress).await;
        match applied {
            Ok(record) => Ok((uow, record)),
            Err(e) => {
                if let Err(rollback_err) = uow.rollback().await {
                    warn!(from, to, error = %rollback_err, "Rollback failed");
                }
                debug!(from, to, amount, error = %e, "Transfer rolled back");
                Err(e)
            }
        }
    }

    async fn apply(
        uow: &mut dyn UnitOfWork,
        from: AccountId,
        to: AccountId,
        amount: Amount,
        progress: &mut TransferProgress,
    ) -> Result<TransactionRecord, TransferError> {
        let (first, second) = lock_order(from, to);
        let first_row = uow
            .lock_account_for_update(first)
            .await?
            .ok_or(TransferError::AccountNotFound(first))?;
        let second_row = uow
            .lock_account_for_update(second)
            .await?
            .ok_or(TransferError::AccountNotFound(second))?;
        progress.advance(TransferState::LockAcquired)?;

        let (source, target) = if first_row.id == from {
            (first_row, second_row)
        } else {
            (second_row, first_row)
        };

        if source.balance < amount {
            return Err(TransferError::InsufficientFunds {
                available: source.balance,
                requested: amount,
            });
        }
        let target_balance = target
            .balance
            .checked_add(amount)
            .ok_or(TransferError::BalanceOverflow(to))?;
        progress.advance(TransferState::BalanceChecked)?;

        uow.update_balance(from, source.balance - amount).await?;
        uow.update_balance(to, target_balance).await?;
        uow.insert_transaction(from, to, amount).await
    }

    /// Post-commit state changes cannot fail the transfer.
    fn settle(progress: &mut TransferProgress, next: TransferState) {
        if let Err(e) = progress.advance(next) {
            error!(error = %e, "Unexpected post-commit state transition");
        }
    }

    async fn notify(&self, record: &TransactionRecord) -> PublishStatus {
        let payload = match TransferEvent::from_record(record).to_bytes() {
            Ok(payload) => payload,
            Err(e) => {
                warn!(transaction_id = record.id, error = %e, "Failed to encode transfer event");
                return PublishStatus::Failed {
                    attempts: 0,
                    error: format!("event encoding failed: {}", e),
                };
            }
        };

        match self.config.publish_mode {
            PublishMode::Inline => {
                let status =
                    publish_with_retry(self.publisher.as_ref(), &payload, &self.config.retry)
                        .await;
                if let PublishStatus::Failed { attempts, error } = &status {
                    warn!(
                        transaction_id = record.id,
                        attempts,
                        error = %error,
                        "Transfer committed but notification was not delivered"
                    );
                }
                status
            }
            PublishMode::Background => {
                let publisher = self.publisher.clone();
                let policy = self.config.retry.clone();
                let transaction_id = record.id;
                tokio::spawn(async move {
                    let status = publish_with_retry(publisher.as_ref(), &payload, &policy).await;
                    if let PublishStatus::Failed { attempts, error } = status {
                        warn!(
                            transaction_id,
                            attempts,
                            error = %error,
                            "Background notification was not delivered"
                        );
                    }
                });
                PublishStatus::Dispatched
            }
        }
    }
}
