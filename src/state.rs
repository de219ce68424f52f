use crate::{
    config::ExchangeConfig, engine::Exchange, journal::TransactionJournal, ledger::MemoryStore,
};
use std::{path::Path, sync::Arc};
use tracing::info;

#[derive(Clone)]
pub struct AppState {
    pub exchange: Arc<Exchange<MemoryStore>>,
}

impl AppState {
    /// Default markets, no seeded accounts, journal under `data_dir`.
    pub async fn new(data_dir: impl AsRef<Path>) -> anyhow::Result<Self> {
        Self::with_config(&ExchangeConfig::default(), data_dir).await
    }

    pub async fn with_config(
        config: &ExchangeConfig,
        data_dir: impl AsRef<Path>,
    ) -> anyhow::Result<Self> {
        let journal = TransactionJournal::open(data_dir)?;
        let store = MemoryStore::with_journal(journal);
        for seed in &config.accounts {
            store.open_account(seed.id)?;
            for (asset, amount) in &seed.balances {
                store.deposit(seed.id, asset.clone(), *amount)?;
            }
        }
        info!(accounts = config.accounts.len(), "ledger seeded");

        let exchange = Exchange::from_config(config, store)?;
        Ok(Self {
            exchange: Arc::new(exchange),
        })
    }
}
