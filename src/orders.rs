use std::time::SystemTime;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identifier of the account that owns an order or a ledger.
pub type AccountId = u64;

/// Represents which side of the market the order is on.
///
/// # Intuition
/// - `Buy` (Bid): The trader wants to purchase the base asset. Bids are ranked from **highest to lowest price**
///   because a higher price means more willingness to buy.
/// - `Sell` (Ask): The trader wants to sell the base asset. Asks are ranked from **lowest to highest price**
///   because a lower price means more willingness to sell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Side {
    Buy,  // Bid
    Sell, // Ask
}

/// A resting limit order.
///
/// - `quantity` is the **remaining** base amount; it only ever decreases.
/// - `seq` is assigned by the book on insertion and gives time priority.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Order {
    pub id: Uuid,
    pub owner: AccountId,
    pub side: Side,
    pub price: Decimal,
    pub quantity: Decimal,
    pub seq: u64,
    pub timestamp: SystemTime,
}

impl Order {
    /// A fresh limit order; `seq` is filled in when the book accepts it.
    pub fn limit(owner: AccountId, side: Side, price: Decimal, quantity: Decimal) -> Self {
        Order {
            id: Uuid::new_v4(),
            owner,
            side,
            price,
            quantity,
            seq: 0,
            timestamp: SystemTime::now(),
        }
    }

    pub fn is_filled(&self) -> bool {
        self.quantity.is_zero()
    }
}
