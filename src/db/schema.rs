//! Account and transaction tables
//!
//! Idempotent DDL so a fresh database can be brought up from the binary.

use sqlx::PgPool;

use crate::core_types::{AccountId, Amount};

const CREATE_ACCOUNTS: &str = r#"
CREATE TABLE IF NOT EXISTS accounts_tb (
    id          BIGINT PRIMARY KEY CHECK (id > 0),
    balance     BIGINT NOT NULL CHECK (balance >= 0),
    created_at  TIMESTAMPTZ NOT NULL DEFAULT NOW()
)
"#;

const CREATE_TRANSACTIONS: &str = r#"
CREATE TABLE IF NOT EXISTS transactions_tb (
    id            BIGSERIAL PRIMARY KEY,
    from_account  BIGINT NOT NULL REFERENCES accounts_tb(id),
    to_account    BIGINT NOT NULL REFERENCES accounts_tb(id),
    amount        BIGINT NOT NULL CHECK (amount > 0),
    created_at    TIMESTAMPTZ NOT NULL DEFAULT NOW(),
    CHECK (from_account <> to_account)
)
"#;

const CREATE_HISTORY_INDEX: &str = r#"
CREATE INDEX IF NOT EXISTS idx_transactions_from
    ON transactions_tb (from_account, id)
"#;

/// Create tables and indexes if missing
pub async fn init_schema(pool: &PgPool) -> Result<(), sqlx::Error> {
    for ddl in [CREATE_ACCOUNTS, CREATE_TRANSACTIONS, CREATE_HISTORY_INDEX] {
        sqlx::query(ddl).execute(pool).await?;
    }
    tracing::info!("Transfer schema ready");
    Ok(())
}

/// Insert an account or reset its balance (seeding only)
pub async fn upsert_account(
    pool: &PgPool,
    id: AccountId,
    balance: Amount,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO accounts_tb (id, balance) VALUES ($1, $2)
        ON CONFLICT (id) DO UPDATE SET balance = EXCLUDED.balance
        "#,
    )
    .bind(id)
    .bind(balance)
    .execute(pool)
    .await?;
    Ok(())
}
