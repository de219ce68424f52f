use std::{collections::BTreeMap, path::Path};

use anyhow::Context;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{
    instrument::{Asset, InstrumentError, Markets},
    orders::AccountId,
    trade::FillPricing,
};

/// Startup configuration. Every field has a default, so an empty JSON
/// object is a valid config.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeConfig {
    /// Currencies pairs may be built from.
    pub currencies: Vec<String>,
    /// Tradable pairs as `BASE-QUOTE` codes.
    pub pairs: Vec<String>,
    /// Upper bound on levels returned by a book snapshot.
    pub max_depth: usize,
    pub fill_pricing: FillPricing,
    /// Accounts opened (and funded) in the in-memory ledger at startup.
    pub accounts: Vec<AccountSeed>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountSeed {
    pub id: AccountId,
    #[serde(default)]
    pub balances: BTreeMap<Asset, Decimal>,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        ExchangeConfig {
            currencies: ["BTC", "ETH", "USD"].map(String::from).to_vec(),
            pairs: ["BTC-USD", "ETH-USD", "ETH-BTC"].map(String::from).to_vec(),
            max_depth: 50,
            fill_pricing: FillPricing::Maker,
            accounts: Vec::new(),
        }
    }
}

impl ExchangeConfig {
    /// Reads a JSON config file.
    pub fn load(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn markets(&self) -> Result<Markets, InstrumentError> {
        Markets::new(&self.currencies, &self.pairs)
    }
}
