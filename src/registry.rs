use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock},
};

use tokio::sync::Mutex;

use crate::{instrument::Pair, orderbook::OrderBook};

/// Owns one [`OrderBook`] per pair, each behind its own async mutex so that
/// insert → match → settle on a pair runs as one exclusive section while
/// other pairs proceed independently.
#[derive(Default)]
pub struct OrderBookRegistry {
    books: RwLock<HashMap<Pair, Arc<Mutex<OrderBook>>>>,
}

impl OrderBookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the book for `pair`, creating an empty one on first access.
    pub fn get_or_create(&self, pair: &Pair) -> Arc<Mutex<OrderBook>> {
        if let Some(book) = self
            .books
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(pair)
        {
            return Arc::clone(book);
        }
        let mut books = self.books.write().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(
            books
                .entry(pair.clone())
                .or_insert_with(|| Arc::new(Mutex::new(OrderBook::new(pair.clone())))),
        )
    }

    pub fn len(&self) -> usize {
        self.books.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
