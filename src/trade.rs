use std::time::SystemTime;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    instrument::Pair,
    orders::{AccountId, Side},
};

/// A fill is one matched quantity between the best bid and the best ask.
///
/// # Terminology
/// - **Maker**: The order that was already resting in the order book (providing liquidity).
/// - **Taker**: The order whose arrival made the book cross.
///
/// A fill is never stored; it drives settlement and the two
/// [`TransactionRecord`]s settlement appends.
#[derive(Debug, Clone, PartialEq)]
pub struct Fill {
    pub pair: Pair,
    pub buy_order_id: Uuid,
    pub sell_order_id: Uuid,
    pub buyer: AccountId,
    pub seller: AccountId,
    pub quantity: Decimal,
    pub price: Decimal,
    pub taker_side: Side,
}

/// Which price a fill executes at.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FillPricing {
    /// The resting order's price.
    #[default]
    Maker,
    /// Always the best ask's price, whichever side was resting.
    Ask,
}

/// `quantity × price` when it is exactly representable.
///
/// `Decimal` keeps at most 28 fractional digits and silently rounds a product
/// that needs more, so a product whose scale shrank, or that came out as
/// zero, is rejected along with one that overflows.
pub fn exact_notional(quantity: Decimal, price: Decimal) -> Option<Decimal> {
    let (quantity, price) = (quantity.normalize(), price.normalize());
    let notional = quantity.checked_mul(price)?;
    let exact = notional.scale() == quantity.scale() + price.scale();
    (exact && !notional.is_zero()).then_some(notional)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TxStatus {
    Completed,
}

/// One side of a settled fill, as appended to the transaction log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub id: Uuid,
    pub owner: AccountId,
    pub counterparty: AccountId,
    pub pair: Pair,
    pub side: Side,
    pub quantity: Decimal,
    pub price: Decimal,
    pub status: TxStatus,
    pub timestamp: SystemTime,
}

impl TransactionRecord {
    /// The buyer's and the seller's record for `fill`, in that order.
    pub fn for_fill(fill: &Fill, timestamp: SystemTime) -> [TransactionRecord; 2] {
        let record = |owner, counterparty, side| TransactionRecord {
            id: Uuid::new_v4(),
            owner,
            counterparty,
            pair: fill.pair.clone(),
            side,
            quantity: fill.quantity,
            price: fill.price,
            status: TxStatus::Completed,
            timestamp,
        };
        [
            record(fill.buyer, fill.seller, Side::Buy),
            record(fill.seller, fill.buyer, Side::Sell),
        ]
    }
}
