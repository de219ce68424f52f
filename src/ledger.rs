//! Balance ledger and transaction log collaborators.
//!
//! The matching core never touches balances directly. It opens a [`Session`]
//! from a [`Store`], mutates balances and appends records through the
//! session, then commits or rolls back the whole placement at once.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;
use tracing::warn;

use crate::{
    instrument::Asset,
    journal::{JournalError, TransactionJournal},
    orders::AccountId,
    trade::TransactionRecord,
};

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no ledger for account {0}")]
    AccountNotFound(AccountId),
    #[error("insufficient {asset} for account {account}: required {required}, available {available}")]
    InsufficientFunds {
        account: AccountId,
        asset: Asset,
        required: Decimal,
        available: Decimal,
    },
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error(transparent)]
    Journal(#[from] JournalError),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Per-account, per-currency balances.
#[async_trait]
pub trait Ledger: Send {
    async fn has_account(&mut self, account: AccountId) -> StoreResult<bool>;

    /// Current balance; an account or currency with no entry reads as zero.
    async fn balance(&mut self, account: AccountId, asset: &Asset) -> StoreResult<Decimal>;

    /// Applies a signed delta. Fails with `AccountNotFound` for unknown
    /// accounts and `InsufficientFunds` when the result would be negative.
    async fn adjust_balance(
        &mut self,
        account: AccountId,
        asset: &Asset,
        delta: Decimal,
    ) -> StoreResult<()>;
}

/// Append-only log of settled economic events.
#[async_trait]
pub trait TransactionLog: Send {
    async fn append(&mut self, record: TransactionRecord) -> StoreResult<()>;
}

/// A unit of work over the ledger and the transaction log.
#[async_trait]
pub trait Session: Ledger + TransactionLog {
    async fn commit(&mut self) -> StoreResult<()>;
    async fn rollback(&mut self) -> StoreResult<()>;
}

#[async_trait]
pub trait Store: Send + Sync + 'static {
    type Session: Session;
    async fn begin(&self) -> StoreResult<Self::Session>;
}

#[derive(Debug, Default)]
struct LedgerState {
    accounts: HashMap<AccountId, HashMap<Asset, Decimal>>,
    records: Vec<TransactionRecord>,
}

impl LedgerState {
    fn balance(&self, account: AccountId, asset: &Asset) -> Decimal {
        self.accounts
            .get(&account)
            .and_then(|balances| balances.get(asset))
            .copied()
            .unwrap_or_default()
    }
}

/// In-process ledger. Committed records are mirrored to an optional
/// [`TransactionJournal`].
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<LedgerState>>,
    journal: Option<Arc<TransactionJournal>>,
}

fn lock(state: &Mutex<LedgerState>) -> StoreResult<MutexGuard<'_, LedgerState>> {
    state
        .lock()
        .map_err(|_| StoreError::Unavailable("ledger lock poisoned".into()))
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_journal(journal: TransactionJournal) -> Self {
        MemoryStore {
            state: Arc::default(),
            journal: Some(Arc::new(journal)),
        }
    }

    pub fn journal(&self) -> Option<&TransactionJournal> {
        self.journal.as_deref()
    }

    /// Creates an empty ledger for `account`; a no-op if it already exists.
    pub fn open_account(&self, account: AccountId) -> StoreResult<()> {
        lock(&self.state)?.accounts.entry(account).or_default();
        Ok(())
    }

    /// Drops the ledger of `account`, returning its balances. Resting orders
    /// of a closed account fail settlement with a missing-ledger error.
    pub fn close_account(&self, account: AccountId) -> StoreResult<HashMap<Asset, Decimal>> {
        lock(&self.state)?
            .accounts
            .remove(&account)
            .ok_or(StoreError::AccountNotFound(account))
    }

    /// Credits `amount` outside of any session, opening the account if needed.
    pub fn deposit(&self, account: AccountId, asset: Asset, amount: Decimal) -> StoreResult<()> {
        let mut state = lock(&self.state)?;
        *state
            .accounts
            .entry(account)
            .or_default()
            .entry(asset)
            .or_default() += amount;
        Ok(())
    }

    /// Committed balance of `account`.
    pub fn balance_of(&self, account: AccountId, asset: &Asset) -> StoreResult<Decimal> {
        Ok(lock(&self.state)?.balance(account, asset))
    }

    /// Every committed record, oldest first.
    pub fn records(&self) -> StoreResult<Vec<TransactionRecord>> {
        Ok(lock(&self.state)?.records.clone())
    }
}

#[async_trait]
impl Store for MemoryStore {
    type Session = MemorySession;

    async fn begin(&self) -> StoreResult<MemorySession> {
        Ok(MemorySession {
            store: self.clone(),
            deltas: Vec::new(),
            records: Vec::new(),
        })
    }
}

/// Staged changes against a [`MemoryStore`]. Reads see the committed state
/// plus this session's own deltas; nothing is visible to others until commit.
pub struct MemorySession {
    store: MemoryStore,
    deltas: Vec<(AccountId, Asset, Decimal)>,
    records: Vec<TransactionRecord>,
}

impl MemorySession {
    fn staged(&self, account: AccountId, asset: &Asset) -> Decimal {
        self.deltas
            .iter()
            .filter(|(a, s, _)| *a == account && s == asset)
            .map(|(_, _, d)| *d)
            .sum()
    }

    pub fn pending_records(&self) -> &[TransactionRecord] {
        &self.records
    }
}

#[async_trait]
impl Ledger for MemorySession {
    async fn has_account(&mut self, account: AccountId) -> StoreResult<bool> {
        Ok(lock(&self.store.state)?.accounts.contains_key(&account))
    }

    async fn balance(&mut self, account: AccountId, asset: &Asset) -> StoreResult<Decimal> {
        let committed = lock(&self.store.state)?.balance(account, asset);
        Ok(committed + self.staged(account, asset))
    }

    async fn adjust_balance(
        &mut self,
        account: AccountId,
        asset: &Asset,
        delta: Decimal,
    ) -> StoreResult<()> {
        let committed = {
            let state = lock(&self.store.state)?;
            if !state.accounts.contains_key(&account) {
                return Err(StoreError::AccountNotFound(account));
            }
            state.balance(account, asset)
        };
        let available = committed + self.staged(account, asset);
        if available + delta < Decimal::ZERO {
            return Err(StoreError::InsufficientFunds {
                account,
                asset: asset.clone(),
                required: -delta,
                available,
            });
        }
        self.deltas.push((account, asset.clone(), delta));
        Ok(())
    }
}

#[async_trait]
impl TransactionLog for MemorySession {
    async fn append(&mut self, record: TransactionRecord) -> StoreResult<()> {
        self.records.push(record);
        Ok(())
    }
}

#[async_trait]
impl Session for MemorySession {
    /// Re-validates every delta against the current committed state, writes
    /// the records to the journal, then applies everything under one lock.
    async fn commit(&mut self) -> StoreResult<()> {
        let mut state = lock(&self.store.state)?;

        let mut next: HashMap<(AccountId, Asset), Decimal> = HashMap::new();
        for (account, asset, delta) in &self.deltas {
            if !state.accounts.contains_key(account) {
                return Err(StoreError::AccountNotFound(*account));
            }
            let balance = next
                .entry((*account, asset.clone()))
                .or_insert_with(|| state.balance(*account, asset));
            if *balance + *delta < Decimal::ZERO {
                return Err(StoreError::InsufficientFunds {
                    account: *account,
                    asset: asset.clone(),
                    required: -*delta,
                    available: *balance,
                });
            }
            *balance += *delta;
        }

        if let Some(journal) = &self.store.journal {
            journal.append_batch(&self.records)?;
        }

        for ((account, asset), balance) in next {
            state
                .accounts
                .entry(account)
                .or_default()
                .insert(asset, balance);
        }
        state.records.append(&mut self.records);
        self.deltas.clear();
        Ok(())
    }

    async fn rollback(&mut self) -> StoreResult<()> {
        if !self.deltas.is_empty() || !self.records.is_empty() {
            warn!(
                deltas = self.deltas.len(),
                records = self.records.len(),
                "discarding staged ledger changes"
            );
        }
        self.deltas.clear();
        self.records.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn usd() -> Asset {
        "USD".parse().unwrap()
    }

    #[tokio::test]
    async fn absent_balance_reads_as_zero() {
        let store = MemoryStore::new();
        store.open_account(1).unwrap();
        let mut tx = store.begin().await.unwrap();

        assert_eq!(tx.balance(1, &usd()).await.unwrap(), Decimal::ZERO);
        assert_eq!(tx.balance(99, &usd()).await.unwrap(), Decimal::ZERO);
        assert!(!tx.has_account(99).await.unwrap());
    }

    #[tokio::test]
    async fn session_changes_are_invisible_until_commit() {
        let store = MemoryStore::new();
        store.deposit(1, usd(), dec!(100)).unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.adjust_balance(1, &usd(), dec!(-40)).await.unwrap();
        assert_eq!(tx.balance(1, &usd()).await.unwrap(), dec!(60));
        assert_eq!(store.balance_of(1, &usd()).unwrap(), dec!(100));

        tx.commit().await.unwrap();
        assert_eq!(store.balance_of(1, &usd()).unwrap(), dec!(60));
    }

    #[tokio::test]
    async fn rollback_discards_everything() {
        let store = MemoryStore::new();
        store.deposit(1, usd(), dec!(100)).unwrap();

        let mut tx = store.begin().await.unwrap();
        tx.adjust_balance(1, &usd(), dec!(-100)).await.unwrap();
        tx.rollback().await.unwrap();
        tx.commit().await.unwrap();

        assert_eq!(store.balance_of(1, &usd()).unwrap(), dec!(100));
        assert!(store.records().unwrap().is_empty());
    }

    #[tokio::test]
    async fn adjust_rejects_overdraft_and_unknown_account() {
        let store = MemoryStore::new();
        store.deposit(1, usd(), dec!(10)).unwrap();
        let mut tx = store.begin().await.unwrap();

        let err = tx.adjust_balance(1, &usd(), dec!(-10.01)).await.unwrap_err();
        assert!(matches!(err, StoreError::InsufficientFunds { .. }));

        let err = tx.adjust_balance(2, &usd(), dec!(1)).await.unwrap_err();
        assert!(matches!(err, StoreError::AccountNotFound(2)));
    }

    #[tokio::test]
    async fn commit_revalidates_against_concurrent_spend() {
        let store = MemoryStore::new();
        store.deposit(1, usd(), dec!(10)).unwrap();

        let mut first = store.begin().await.unwrap();
        let mut second = store.begin().await.unwrap();
        first.adjust_balance(1, &usd(), dec!(-8)).await.unwrap();
        second.adjust_balance(1, &usd(), dec!(-8)).await.unwrap();

        first.commit().await.unwrap();
        assert!(matches!(
            second.commit().await,
            Err(StoreError::InsufficientFunds { .. })
        ));
        assert_eq!(store.balance_of(1, &usd()).unwrap(), dec!(2));
    }
}
