//! Order placement: the single mutating entry point of the matching core.
//!
//! A placement validates the request, checks (but does not reserve) the
//! owner's balance, inserts the order and matches the book to completion.
//! Everything after validation runs while holding the pair's book lock and
//! inside one store [`Session`]: the cascade either commits as a whole or
//! leaves book, balances and log exactly as they were. The book is changed
//! in place and only the orders a placement touches are kept for undoing.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::{
    config::ExchangeConfig,
    errors::{ExchangeError, ExchangeResult},
    instrument::{Markets, Pair},
    ledger::{Ledger, Session, Store},
    orderbook::{BookSnapshot, OrderBook},
    orders::{AccountId, Order, Side},
    registry::OrderBookRegistry,
    settlement::execute_trade,
    trade::{FillPricing, exact_notional},
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewOrder {
    pub symbol: String,
    pub side: Side,
    pub price: Decimal,
    pub quantity: Decimal,
    pub owner: AccountId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderAck {
    pub accepted: bool,
    pub order_id: Uuid,
}

pub struct Exchange<S: Store> {
    markets: Markets,
    books: OrderBookRegistry,
    store: S,
    pricing: FillPricing,
    max_depth: usize,
}

impl<S: Store> Exchange<S> {
    pub fn new(markets: Markets, store: S) -> Self {
        Exchange {
            markets,
            books: OrderBookRegistry::new(),
            store,
            pricing: FillPricing::default(),
            max_depth: ExchangeConfig::default().max_depth,
        }
    }

    pub fn from_config(config: &ExchangeConfig, store: S) -> ExchangeResult<Self> {
        Ok(Exchange::new(config.markets()?, store)
            .with_pricing(config.fill_pricing)
            .with_max_depth(config.max_depth))
    }

    pub fn with_pricing(mut self, pricing: FillPricing) -> Self {
        self.pricing = pricing;
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn markets(&self) -> &Markets {
        &self.markets
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Validates and places a limit order, matching it against the book.
    ///
    /// Fills are not reported back; callers observe them through the book
    /// snapshot and the ledger.
    pub async fn place_order(&self, req: NewOrder) -> ExchangeResult<OrderAck> {
        let pair = self.markets.resolve(&req.symbol)?;
        if req.quantity <= Decimal::ZERO {
            return Err(ExchangeError::Validation("quantity must be > 0".into()));
        }
        if req.price <= Decimal::ZERO {
            return Err(ExchangeError::Validation("price must be > 0".into()));
        }
        let notional = exact_notional(req.quantity, req.price).ok_or_else(|| {
            ExchangeError::Validation("order notional is not exactly representable".into())
        })?;

        let handle = self.books.get_or_create(&pair);
        let mut book = handle.lock().await;
        let mut session = self.store.begin().await?;

        let order = Order::limit(req.owner, req.side, req.price, req.quantity);
        let order_id = order.id;
        match self
            .insert_and_match(&mut session, &mut book, &pair, order, notional)
            .await
        {
            Ok(fills) => {
                info!(%order_id, pair = %pair, side = ?req.side, fills, "order placed");
                Ok(OrderAck {
                    accepted: true,
                    order_id,
                })
            }
            Err(err) => {
                match &err {
                    ExchangeError::MissingLedger(account) => error!(
                        %order_id,
                        pair = %pair,
                        account,
                        "placement hit an account with no ledger"
                    ),
                    _ => warn!(%order_id, pair = %pair, error = %err, "placement rolled back"),
                }
                if let Err(rollback_err) = session.rollback().await {
                    warn!(error = %rollback_err, "rollback failed");
                }
                Err(err)
            }
        }
    }

    /// Runs the balance pre-check, then inserts, matches, settles every fill
    /// and commits the session. The book changes are undone on any error
    /// before the commit succeeds, including the future being dropped.
    async fn insert_and_match(
        &self,
        session: &mut S::Session,
        book: &mut OrderBook,
        pair: &Pair,
        order: Order,
        notional: Decimal,
    ) -> ExchangeResult<usize> {
        let (asset, required) = match order.side {
            Side::Buy => (&pair.quote, notional),
            Side::Sell => (&pair.base, order.quantity),
        };
        let available = session.balance(order.owner, asset).await?;
        if available < required {
            return Err(ExchangeError::InsufficientFunds {
                account: order.owner,
                asset: asset.clone(),
                required,
                available,
            });
        }

        let mut pending = book.begin();
        pending.insert(order);
        let fills = pending.match_all(self.pricing);
        for fill in &fills {
            execute_trade(&mut *session, fill).await?;
        }
        session.commit().await?;
        pending.commit();
        Ok(fills.len())
    }

    /// Removes a resting order. Only its owner may cancel it.
    pub async fn cancel_order(
        &self,
        symbol: &str,
        order_id: Uuid,
        owner: AccountId,
    ) -> ExchangeResult<Order> {
        let pair = self.markets.resolve(symbol)?;
        let handle = self.books.get_or_create(&pair);
        let mut book = handle.lock().await;

        match book.get(order_id) {
            Some(order) if order.owner == owner => {}
            _ => return Err(ExchangeError::OrderNotFound(order_id)),
        }
        let cancelled = book
            .cancel(order_id)
            .ok_or(ExchangeError::OrderNotFound(order_id))?;
        info!(%order_id, pair = %pair, "order cancelled");
        Ok(cancelled)
    }

    /// Top `depth` levels of each side, capped at the configured maximum.
    pub async fn order_book_snapshot(
        &self,
        symbol: &str,
        depth: usize,
    ) -> ExchangeResult<BookSnapshot> {
        let pair = self.markets.resolve(symbol)?;
        let handle = self.books.get_or_create(&pair);
        let book = handle.lock().await;
        Ok(book.snapshot(depth.min(self.max_depth)))
    }

    /// Runs `f` against the live book of `symbol` under its lock.
    pub async fn inspect_book<T>(
        &self,
        symbol: &str,
        f: impl FnOnce(&OrderBook) -> T,
    ) -> ExchangeResult<T> {
        let pair = self.markets.resolve(symbol)?;
        let handle = self.books.get_or_create(&pair);
        let book = handle.lock().await;
        Ok(f(&book))
    }
}
