//! PostgreSQL Account Store
//!
//! Row locks are `SELECT ... FOR UPDATE` inside a database transaction. The
//! transaction is held by [`PgUnitOfWork`]; sqlx rolls it back when dropped
//! uncommitted, which gives the unit-of-work its drop-means-rollback contract.

use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::debug;

use super::error::TransferError;
use super::store::{AccountStore, UnitOfWork};
use super::types::{Account, TransactionRecord};
use crate::config::IsolationLevel;
use crate::core_types::{AccountId, Amount};

#[derive(sqlx::FromRow)]
struct AccountRow {
    id: i64,
    balance: i64,
}

#[derive(sqlx::FromRow)]
struct TransactionRow {
    id: i64,
    from_account: i64,
    to_account: i64,
    amount: i64,
    created_at: chrono::DateTime<chrono::Utc>,
}

impl From<TransactionRow> for TransactionRecord {
    fn from(row: TransactionRow) -> Self {
        TransactionRecord {
            id: row.id,
            from: row.from_account,
            to: row.to_account,
            amount: row.amount,
            created_at: row.created_at,
        }
    }
}

/// PostgreSQL-backed account store
pub struct PgAccountStore {
    pool: PgPool,
    isolation: IsolationLevel,
}

impl PgAccountStore {
    /// Create a new PgAccountStore with the given connection pool
    pub fn new(pool: PgPool) -> Self {
        Self::with_isolation(pool, IsolationLevel::ReadCommitted)
    }

    pub fn with_isolation(pool: PgPool, isolation: IsolationLevel) -> Self {
        Self { pool, isolation }
    }
}

#[async_trait]
impl AccountStore for PgAccountStore {
    fn name(&self) -> &'static str {
        "postgres"
    }

    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, TransferError> {
        let mut tx = self.pool.begin().await?;
        if self.isolation == IsolationLevel::Serializable {
            sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
                .execute(&mut *tx)
                .await?;
        }
        Ok(Box::new(PgUnitOfWork { tx }))
    }

    async fn get_balance(&self, id: AccountId) -> Result<Amount, TransferError> {
        sqlx::query_scalar::<_, i64>("SELECT balance FROM accounts_tb WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(TransferError::AccountNotFound(id))
    }

    async fn list_transactions_from(
        &self,
        id: AccountId,
    ) -> Result<Vec<TransactionRecord>, TransferError> {
        let rows: Vec<TransactionRow> = sqlx::query_as(
            r#"
            SELECT id, from_account, to_account, amount, created_at
            FROM transactions_tb
            WHERE from_account = $1
            ORDER BY id ASC
            "#,
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(TransactionRecord::from).collect())
    }

    async fn health_check(&self) -> Result<(), TransferError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

/// Unit-of-work over one PostgreSQL transaction
pub struct PgUnitOfWork {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl UnitOfWork for PgUnitOfWork {
    async fn lock_account_for_update(
        &mut self,
        id: AccountId,
    ) -> Result<Option<Account>, TransferError> {
        let row: Option<AccountRow> =
            sqlx::query_as("SELECT id, balance FROM accounts_tb WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *self.tx)
                .await?;

        Ok(row.map(|r| Account {
            id: r.id,
            balance: r.balance,
        }))
    }

    async fn update_balance(
        &mut self,
        id: AccountId,
        new_balance: Amount,
    ) -> Result<(), TransferError> {
        if new_balance < 0 {
            return Err(TransferError::Internal(format!(
                "Balance check violated for account {}: {}",
                id, new_balance
            )));
        }

        let result = sqlx::query("UPDATE accounts_tb SET balance = $1 WHERE id = $2")
            .bind(new_balance)
            .bind(id)
            .execute(&mut *self.tx)
            .await?;

        if result.rows_affected() != 1 {
            return Err(TransferError::Internal(format!(
                "Balance update touched {} rows for account {}",
                result.rows_affected(),
                id
            )));
        }
        Ok(())
    }

    async fn insert_transaction(
        &mut self,
        from: AccountId,
        to: AccountId,
        amount: Amount,
    ) -> Result<TransactionRecord, TransferError> {
        let row: TransactionRow = sqlx::query_as(
            r#"
            INSERT INTO transactions_tb (from_account, to_account, amount, created_at)
            VALUES ($1, $2, $3, NOW())
            RETURNING id, from_account, to_account, amount, created_at
            "#,
        )
        .bind(from)
        .bind(to)
        .bind(amount)
        .fetch_one(&mut *self.tx)
        .await?;

        Ok(row.into())
    }

    async fn commit(self: Box<Self>) -> Result<(), TransferError> {
        self.tx.commit().await.map_err(commit_error)
    }

    async fn rollback(self: Box<Self>) -> Result<(), TransferError> {
        self.tx.rollback().await?;
        debug!("Unit-of-work rolled back");
        Ok(())
    }
}

/// Map a failed COMMIT.
///
/// Only serialization failures and deadlocks are known to have persisted
/// nothing. A broken connection may have lost the server's reply after the
/// commit landed, so it stays `Internal` and is never reported as retryable.
fn commit_error(e: sqlx::Error) -> TransferError {
    TransferError::from(e)
}
