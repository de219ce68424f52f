use rust_decimal::Decimal;
use thiserror::Error;
use uuid::Uuid;

use crate::{
    instrument::{Asset, InstrumentError},
    ledger::StoreError,
    orders::AccountId,
};

#[derive(Error, Debug)]
pub enum ExchangeError {
    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Instrument(#[from] InstrumentError),

    #[error("insufficient {asset} for account {account}: required {required}, available {available}")]
    InsufficientFunds {
        account: AccountId,
        asset: Asset,
        required: Decimal,
        available: Decimal,
    },

    #[error("no ledger for account {0}")]
    MissingLedger(AccountId),

    #[error("order {0} not found")]
    OrderNotFound(Uuid),

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for ExchangeError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::AccountNotFound(account) => ExchangeError::MissingLedger(account),
            StoreError::InsufficientFunds {
                account,
                asset,
                required,
                available,
            } => ExchangeError::InsufficientFunds {
                account,
                asset,
                required,
                available,
            },
            other => ExchangeError::Store(other),
        }
    }
}

pub type ExchangeResult<T> = Result<T, ExchangeError>;
