use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
    str::FromStr,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while building the set of tradable markets.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum InstrumentError {
    #[error("invalid currency symbol: `{0}`")]
    InvalidAsset(String),
    #[error("malformed pair code: `{0}` (expected BASE-QUOTE)")]
    MalformedPair(String),
    #[error("base and quote must differ: `{0}`")]
    SameCurrency(String),
    #[error("inactive currency `{asset}` in pair `{pair}`")]
    InactiveCurrency { pair: String, asset: String },
    #[error("unsupported symbol: `{0}`")]
    Unsupported(String),
}

/// A currency symbol such as `BTC` or `USD`, stored upper-case.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Asset(String);

impl Asset {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for Asset {
    type Err = InstrumentError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.is_empty() || !s.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(InstrumentError::InvalidAsset(s.to_string()));
        }
        Ok(Asset(s.to_ascii_uppercase()))
    }
}

impl TryFrom<String> for Asset {
    type Error = InstrumentError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Asset> for String {
    fn from(a: Asset) -> Self {
        a.0
    }
}

impl fmt::Display for Asset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

//A Trading pair: base/quote
#[derive(Serialize, Deserialize, Debug, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
#[serde(try_from = "String", into = "String")]
pub struct Pair {
    /// The asset you buy or sell
    pub base: Asset,
    /// The asset you pay or receive
    pub quote: Asset,
}

impl Pair {
    pub fn new(base: Asset, quote: Asset) -> Result<Self, InstrumentError> {
        if base == quote {
            return Err(InstrumentError::SameCurrency(format!("{base}-{quote}")));
        }
        Ok(Pair { base, quote })
    }

    /// Returns the usual string code, e.g "BTC-USD"
    pub fn code(&self) -> String {
        format!("{}-{}", self.base, self.quote)
    }
}

/// Parses the `BASE-QUOTE` form only; whether the pair is tradable is decided
/// by [`Markets::resolve`].
impl FromStr for Pair {
    type Err = InstrumentError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (base, quote) = s
            .split_once('-')
            .ok_or_else(|| InstrumentError::MalformedPair(s.to_string()))?;
        Pair::new(base.parse()?, quote.parse()?)
    }
}

impl TryFrom<String> for Pair {
    type Error = InstrumentError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        s.parse()
    }
}

impl From<Pair> for String {
    fn from(p: Pair) -> Self {
        p.code()
    }
}

impl fmt::Display for Pair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.base, self.quote)
    }
}

/// The active currencies and the pairs configured over them. Built once at
/// startup and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct Markets {
    currencies: BTreeSet<Asset>,
    pairs: BTreeMap<String, Pair>,
}

impl Markets {
    pub fn new<C, P>(currencies: C, pairs: P) -> Result<Self, InstrumentError>
    where
        C: IntoIterator,
        C::Item: AsRef<str>,
        P: IntoIterator,
        P::Item: AsRef<str>,
    {
        let currencies = currencies
            .into_iter()
            .map(|c| c.as_ref().parse::<Asset>())
            .collect::<Result<BTreeSet<_>, _>>()?;

        let mut by_code = BTreeMap::new();
        for code in pairs {
            let pair: Pair = code.as_ref().parse()?;
            for asset in [&pair.base, &pair.quote] {
                if !currencies.contains(asset) {
                    return Err(InstrumentError::InactiveCurrency {
                        pair: pair.code(),
                        asset: asset.to_string(),
                    });
                }
            }
            by_code.insert(pair.code(), pair);
        }
        Ok(Markets {
            currencies,
            pairs: by_code,
        })
    }

    /// Looks up a tradable pair by its code, e.g. `"BTC-USD"`.
    pub fn resolve(&self, code: &str) -> Result<Pair, InstrumentError> {
        let parsed: Pair = code.parse()?;
        self.pairs
            .get(&parsed.code())
            .cloned()
            .ok_or_else(|| InstrumentError::Unsupported(code.to_string()))
    }

    pub fn supported(&self) -> impl Iterator<Item = &Pair> {
        self.pairs.values()
    }

    pub fn is_active(&self, asset: &Asset) -> bool {
        self.currencies.contains(asset)
    }
}
