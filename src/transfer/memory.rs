//! In-memory Account Store
//!
//! Each account row owns an async mutex that plays the role of a database row
//! lock. A unit-of-work holds the owned guards until commit/rollback/drop and
//! keeps its writes staged; commit publishes them while the locks are still held.
//!
//! The committed balance lives in an atomic next to the lock. Commit stores the
//! staged balances and appends the records while holding the write side of the
//! transaction log, and every reader takes the read side, so a half-applied
//! commit is never observable. Readers never wait on row locks.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::OwnedMutexGuard;
use tracing::debug;

use super::error::TransferError;
use super::store::{AccountStore, UnitOfWork};
use super::types::{Account, TransactionRecord};
use crate::core_types::{AccountId, Amount, TransactionId};

struct AccountRow {
    lock: Arc<tokio::sync::Mutex<()>>,
    balance: AtomicI64,
}

#[derive(Default)]
struct Inner {
    accounts: DashMap<AccountId, Arc<AccountRow>>,
    /// Also the commit barrier for balances
    transactions: RwLock<Vec<TransactionRecord>>,
    last_tx_id: AtomicI64,
}

/// Process-local store for standalone mode and tests
#[derive(Clone, Default)]
pub struct InMemoryAccountStore {
    inner: Arc<Inner>,
}

impl InMemoryAccountStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a store pre-populated with `(id, balance)` rows
    pub fn with_accounts(accounts: impl IntoIterator<Item = (AccountId, Amount)>) -> Self {
        let store = Self::new();
        for (id, balance) in accounts {
            store.insert_row(id, balance);
        }
        store
    }

    /// Create an account. Account lifecycle is owned outside the engine; this
    /// exists for seeding.
    pub fn open_account(&self, id: AccountId, balance: Amount) -> Result<(), TransferError> {
        if id <= 0 {
            return Err(TransferError::InvalidAccount(id));
        }
        if balance < 0 {
            return Err(TransferError::Internal(format!(
                "Initial balance of account {} must not be negative",
                id
            )));
        }
        if self.inner.accounts.contains_key(&id) {
            return Err(TransferError::Internal(format!(
                "Account {} already exists",
                id
            )));
        }
        self.insert_row(id, balance);
        Ok(())
    }

    fn insert_row(&self, id: AccountId, balance: Amount) {
        self.inner.accounts.insert(
            id,
            Arc::new(AccountRow {
                lock: Arc::new(tokio::sync::Mutex::new(())),
                balance: AtomicI64::new(balance),
            }),
        );
    }

    /// Committed balances of every account, ordered by id
    pub fn snapshot(&self) -> Vec<Account> {
        // Commit validates before it writes, so a poisoned log holds no partial state
        let _barrier = self
            .inner
            .transactions
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        let mut accounts: Vec<Account> = self
            .inner
            .accounts
            .iter()
            .map(|entry| Account {
                id: *entry.key(),
                balance: entry.value().balance.load(Ordering::SeqCst),
            })
            .collect();
        accounts.sort_by_key(|a| a.id);
        accounts
    }

    /// Sum of all committed balances (wide, so it cannot overflow)
    pub fn total_balance(&self) -> i128 {
        self.snapshot().iter().map(|a| a.balance as i128).sum()
    }

    /// Number of committed transaction records
    pub fn transaction_count(&self) -> Result<usize, TransferError> {
        Ok(self.records()?.len())
    }

    fn records(&self) -> Result<RwLockReadGuard<'_, Vec<TransactionRecord>>, TransferError> {
        self.inner
            .transactions
            .read()
            .map_err(|_| TransferError::Internal("Transaction log lock poisoned".to_string()))
    }
}

#[async_trait]
impl AccountStore for InMemoryAccountStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn begin(&self) -> Result<Box<dyn UnitOfWork>, TransferError> {
        Ok(Box::new(MemoryUnitOfWork {
            inner: self.inner.clone(),
            locked: HashMap::new(),
            staged_balances: HashMap::new(),
            staged_records: Vec::new(),
            finished: false,
        }))
    }

    async fn get_balance(&self, id: AccountId) -> Result<Amount, TransferError> {
        let _barrier = self.records()?;
        self.inner
            .accounts
            .get(&id)
            .map(|row| row.balance.load(Ordering::SeqCst))
            .ok_or(TransferError::AccountNotFound(id))
    }

    async fn list_transactions_from(
        &self,
        id: AccountId,
    ) -> Result<Vec<TransactionRecord>, TransferError> {
        let mut out: Vec<TransactionRecord> = self
            .records()?
            .iter()
            .filter(|r| r.from == id)
            .cloned()
            .collect();
        // Commit order can differ from id order under concurrency
        out.sort_by_key(|r| r.id);
        Ok(out)
    }
}

/// Unit-of-work over [`InMemoryAccountStore`]
pub struct MemoryUnitOfWork {
    inner: Arc<Inner>,
    locked: HashMap<AccountId, (Arc<AccountRow>, OwnedMutexGuard<()>)>,
    staged_balances: HashMap<AccountId, Amount>,
    staged_records: Vec<TransactionRecord>,
    finished: bool,
}

impl MemoryUnitOfWork {
    fn current_balance(&self, id: AccountId, row: &AccountRow) -> Amount {
        self.staged_balances
            .get(&id)
            .copied()
            .unwrap_or_else(|| row.balance.load(Ordering::SeqCst))
    }
}

#[async_trait]
impl UnitOfWork for MemoryUnitOfWork {
    async fn lock_account_for_update(
        &mut self,
        id: AccountId,
    ) -> Result<Option<Account>, TransferError> {
        if let Some((row, _)) = self.locked.get(&id) {
            return Ok(Some(Account {
                id,
                balance: self.current_balance(id, row),
            }));
        }

        // Clone the row out so no map shard guard is held across the await
        let row = match self.inner.accounts.get(&id) {
            Some(entry) => entry.value().clone(),
            None => return Ok(None),
        };

        let guard = row.lock.clone().lock_owned().await;
        let balance = row.balance.load(Ordering::SeqCst);
        self.locked.insert(id, (row, guard));

        Ok(Some(Account { id, balance }))
    }

    async fn update_balance(
        &mut self,
        id: AccountId,
        new_balance: Amount,
    ) -> Result<(), TransferError> {
        if !self.locked.contains_key(&id) {
            return Err(TransferError::Internal(format!(
                "Account {} updated without holding its row lock",
                id
            )));
        }
        if new_balance < 0 {
            return Err(TransferError::Internal(format!(
                "Balance check violated for account {}: {}",
                id, new_balance
            )));
        }
        self.staged_balances.insert(id, new_balance);
        Ok(())
    }

    async fn insert_transaction(
        &mut self,
        from: AccountId,
        to: AccountId,
        amount: Amount,
    ) -> Result<TransactionRecord, TransferError> {
        if from == to {
            return Err(TransferError::Internal(
                "Transaction row with from == to".to_string(),
            ));
        }
        if amount <= 0 {
            return Err(TransferError::Internal(format!(
                "Transaction row with non-positive amount {}",
                amount
            )));
        }

        // Ids are consumed even if this unit-of-work later rolls back
        let id: TransactionId = self.inner.last_tx_id.fetch_add(1, Ordering::SeqCst) + 1;
        let record = TransactionRecord {
            id,
            from,
            to,
            amount,
            created_at: Utc::now(),
        };
        self.staged_records.push(record.clone());
        Ok(record)
    }

    async fn commit(self: Box<Self>) -> Result<(), TransferError> {
        let mut this = self;
        if let Some(id) = this
            .staged_balances
            .keys()
            .find(|id| !this.locked.contains_key(*id))
        {
            return Err(TransferError::Internal(format!(
                "Staged balance for unlocked account {}",
                id
            )));
        }

        let staged = std::mem::take(&mut this.staged_balances);
        let records = std::mem::take(&mut this.staged_records);
        {
            let mut log = this.inner.transactions.write().map_err(|_| {
                TransferError::Internal("Transaction log lock poisoned".to_string())
            })?;
            for (id, balance) in staged {
                if let Some((row, _)) = this.locked.get(&id) {
                    row.balance.store(balance, Ordering::SeqCst);
                }
            }
            log.extend(records);
        }

        this.finished = true;
        // Row locks are released when `this` drops here
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), TransferError> {
        let mut this = self;
        this.staged_balances.clear();
        this.staged_records.clear();
        this.finished = true;
        Ok(())
    }
}

impl Drop for MemoryUnitOfWork {
    fn drop(&mut self) {
        if !self.finished && (!self.locked.is_empty() || !self.staged_records.is_empty()) {
            debug!(
                locked = self.locked.len(),
                staged = self.staged_balances.len(),
                "Unit-of-work dropped without commit, rolling back"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_commit_applies_staged_writes() {
        let store = InMemoryAccountStore::with_accounts([(1, 100), (2, 50)]);
        let mut uow = store.begin().await.unwrap();
        uow.lock_account_for_update(1).await.unwrap();
        uow.lock_account_for_update(2).await.unwrap();
        uow.update_balance(1, 70).await.unwrap();
        uow.update_balance(2, 80).await.unwrap();
        let rec = uow.insert_transaction(1, 2, 30).await.unwrap();

        // Not visible before commit
        assert_eq!(store.get_balance(1).await.unwrap(), 100);
        assert!(store.list_transactions_from(1).await.unwrap().is_empty());

        uow.commit().await.unwrap();
        assert_eq!(store.get_balance(1).await.unwrap(), 70);
        assert_eq!(store.get_balance(2).await.unwrap(), 80);
        assert_eq!(store.list_transactions_from(1).await.unwrap(), vec![rec]);
    }

    #[tokio::test]
    async fn test_rollback_discards_writes() {
        let store = InMemoryAccountStore::with_accounts([(1, 100), (2, 50)]);
        let mut uow = store.begin().await.unwrap();
        uow.lock_account_for_update(1).await.unwrap();
        uow.update_balance(1, 0).await.unwrap();
        uow.insert_transaction(1, 2, 100).await.unwrap();
        uow.rollback().await.unwrap();

        assert_eq!(store.get_balance(1).await.unwrap(), 100);
        assert_eq!(store.transaction_count().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_drop_releases_lock() {
        let store = InMemoryAccountStore::with_accounts([(1, 100)]);
        {
            let mut uow = store.begin().await.unwrap();
            uow.lock_account_for_update(1).await.unwrap();
            uow.update_balance(1, 1).await.unwrap();
        }
        let mut uow = store.begin().await.unwrap();
        let acc = tokio::time::timeout(Duration::from_secs(1), uow.lock_account_for_update(1))
            .await
            .expect("lock should be free after drop")
            .unwrap();
        assert_eq!(acc, Some(Account { id: 1, balance: 100 }));
    }

    #[tokio::test]
    async fn test_lock_is_exclusive() {
        let store = InMemoryAccountStore::with_accounts([(1, 100)]);
        let mut holder = store.begin().await.unwrap();
        holder.lock_account_for_update(1).await.unwrap();

        let mut waiter = store.begin().await.unwrap();
        let blocked =
            tokio::time::timeout(Duration::from_millis(50), waiter.lock_account_for_update(1))
                .await;
        assert!(blocked.is_err(), "second lock must wait for the holder");

        holder.rollback().await.unwrap();
        let acc = tokio::time::timeout(Duration::from_secs(1), waiter.lock_account_for_update(1))
            .await
            .unwrap()
            .unwrap();
        assert!(acc.is_some());
    }

    #[tokio::test]
    async fn test_get_balance_does_not_wait_on_lock() {
        let store = InMemoryAccountStore::with_accounts([(1, 100)]);
        let mut holder = store.begin().await.unwrap();
        holder.lock_account_for_update(1).await.unwrap();
        assert_eq!(store.get_balance(1).await.unwrap(), 100);
    }

    #[tokio::test]
    async fn test_relock_in_same_unit_sees_staged_value() {
        let store = InMemoryAccountStore::with_accounts([(1, 100)]);
        let mut uow = store.begin().await.unwrap();
        uow.lock_account_for_update(1).await.unwrap();
        uow.update_balance(1, 40).await.unwrap();
        let again = uow.lock_account_for_update(1).await.unwrap();
        assert_eq!(again.map(|a| a.balance), Some(40));
    }

    #[tokio::test]
    async fn test_missing_account() {
        let store = InMemoryAccountStore::new();
        let mut uow = store.begin().await.unwrap();
        assert_eq!(uow.lock_account_for_update(9).await.unwrap(), None);
        assert_eq!(
            store.get_balance(9).await,
            Err(TransferError::AccountNotFound(9))
        );
    }

    #[tokio::test]
    async fn test_update_requires_lock_and_non_negative() {
        let store = InMemoryAccountStore::with_accounts([(1, 100)]);
        let mut uow = store.begin().await.unwrap();
        assert!(uow.update_balance(1, 10).await.is_err());
        uow.lock_account_for_update(1).await.unwrap();
        assert!(uow.update_balance(1, -1).await.is_err());
    }

    #[tokio::test]
    async fn test_transaction_ids_increase() {
        let store = InMemoryAccountStore::with_accounts([(1, 100), (2, 0)]);
        let mut uow = store.begin().await.unwrap();
        let a = uow.insert_transaction(1, 2, 1).await.unwrap();
        let b = uow.insert_transaction(1, 2, 1).await.unwrap();
        assert!(b.id > a.id);
    }

    async fn move_one(store: &InMemoryAccountStore, from: AccountId, to: AccountId) {
        let mut uow = store.begin().await.unwrap();
        let (first, second) = if from < to { (from, to) } else { (to, from) };
        uow.lock_account_for_update(first).await.unwrap();
        uow.lock_account_for_update(second).await.unwrap();
        let a = uow.lock_account_for_update(from).await.unwrap().unwrap().balance;
        let b = uow.lock_account_for_update(to).await.unwrap().unwrap().balance;
        uow.update_balance(from, a - 1).await.unwrap();
        uow.update_balance(to, b + 1).await.unwrap();
        uow.insert_transaction(from, to, 1).await.unwrap();
        uow.commit().await.unwrap();
    }

    /// Readers sampling during commits never see a debit without its credit
    #[tokio::test(flavor = "multi_thread", worker_threads = 3)]
    async fn test_readers_never_see_half_applied_commit() {
        let store = InMemoryAccountStore::with_accounts([(1, 1_000_000), (2, 1_000_000)]);
        let rounds = 5_000;

        let writers: Vec<_> = [(1, 2), (2, 1)]
            .into_iter()
            .map(|(from, to)| {
                let store = store.clone();
                tokio::spawn(async move {
                    for _ in 0..rounds {
                        move_one(&store, from, to).await;
                    }
                })
            })
            .collect();

        let mut inconsistent = 0;
        while !writers.iter().all(|w| w.is_finished()) {
            let accounts = store.snapshot();
            if accounts.iter().map(|a| a.balance as i128).sum::<i128>() != 2_000_000 {
                inconsistent += 1;
            }
            tokio::task::yield_now().await;
        }
        for w in writers {
            w.await.unwrap();
        }

        assert_eq!(inconsistent, 0);
        assert_eq!(store.total_balance(), 2_000_000);
        assert_eq!(store.transaction_count().unwrap(), 2 * rounds as usize);
    }

    #[test]
    fn test_open_account_rules() {
        let store = InMemoryAccountStore::new();
        store.open_account(1, 10).unwrap();
        assert!(store.open_account(1, 10).is_err());
        assert!(store.open_account(0, 10).is_err());
        assert!(store.open_account(2, -1).is_err());
        assert_eq!(store.total_balance(), 10);
    }
}
