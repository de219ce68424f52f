use crate::{
    instrument::Pair,
    orders::{Order, Side},
    trade::{Fill, FillPricing},
};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet, VecDeque};
use tracing::debug;
use uuid::Uuid;

/// An [`OrderBook`] stores the **open** orders of one trading pair in two
/// [`BTreeMap`]s:
/// - `bids` (buy orders)
/// - `asks` (sell orders)
///
/// Each price level (key) has a FIFO queue of orders stored in a [`VecDeque`]
/// to maintain **price-time** priority.
#[derive(Debug, Clone)]
pub struct OrderBook {
    pair: Pair,
    /// Buy orders, keyed by price in ascending order.
    ///
    /// The best bid is the **last** key.
    bids: BTreeMap<Decimal, VecDeque<Order>>,

    /// Sell orders, keyed by price in ascending order.
    ///
    /// The best ask is the **first** key.
    asks: BTreeMap<Decimal, VecDeque<Order>>,

    next_seq: u64,
}

/// Top-of-book view, one `(price, total quantity)` entry per level,
/// best level first.
#[derive(Debug, Clone, Default, PartialEq, Serialize, serde::Deserialize)]
pub struct BookSnapshot {
    pub bids: Vec<(Decimal, Decimal)>,
    pub asks: Vec<(Decimal, Decimal)>,
}

impl OrderBook {
    /// Creates a new, empty [`OrderBook`], with no active bids or asks.
    pub fn new(pair: Pair) -> Self {
        Self {
            pair,
            bids: BTreeMap::new(),
            asks: BTreeMap::new(),
            next_seq: 0,
        }
    }

    fn side_mut(&mut self, side: Side) -> &mut BTreeMap<Decimal, VecDeque<Order>> {
        match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        }
    }

    /// Adds a limit order behind every order already resting at its price.
    pub fn insert(&mut self, mut order: Order) {
        self.next_seq += 1;
        order.seq = self.next_seq;
        self.side_mut(order.side)
            .entry(order.price)
            .or_default()
            .push_back(order);
    }

    /// The order at the head of `side`, if any.
    pub fn peek_best(&self, side: Side) -> Option<&Order> {
        let level = match side {
            Side::Buy => self.bids.last_key_value(),
            Side::Sell => self.asks.first_key_value(),
        };
        level.and_then(|(_, queue)| queue.front())
    }

    fn best_mut(&mut self, side: Side) -> Option<&mut Order> {
        let level = match side {
            Side::Buy => self.bids.last_entry(),
            Side::Sell => self.asks.first_entry(),
        };
        level.and_then(|entry| entry.into_mut().front_mut())
    }

    /// Pops the head of `side` when its remaining quantity has reached zero,
    /// pruning the price level once it is empty.
    pub fn remove_if_filled(&mut self, side: Side) -> Option<Order> {
        let mut level = match side {
            Side::Buy => self.bids.last_entry()?,
            Side::Sell => self.asks.first_entry()?,
        };
        if !level.get().front().is_some_and(Order::is_filled) {
            return None;
        }
        let filled = level.get_mut().pop_front();
        if level.get().is_empty() {
            level.remove();
        }
        filled
    }

    /// True while the best bid is priced at or above the best ask.
    pub fn is_crossed(&self) -> bool {
        match (self.peek_best(Side::Buy), self.peek_best(Side::Sell)) {
            (Some(bid), Some(ask)) => bid.price >= ask.price,
            _ => false,
        }
    }

    /// Executes a single fill between the best bid and the best ask, if they
    /// cross. Both orders are decremented and removed once exhausted.
    ///
    /// The fill quantity is `min(bid, ask)` so neither order is overfilled.
    /// The price follows `pricing`: the earlier (resting) order's price for
    /// [`FillPricing::Maker`], the ask's price for [`FillPricing::Ask`].
    pub fn match_next(&mut self, pricing: FillPricing) -> Option<Fill> {
        if !self.is_crossed() {
            return None;
        }
        let bid = self.peek_best(Side::Buy)?;
        let ask = self.peek_best(Side::Sell)?;

        let quantity = bid.quantity.min(ask.quantity);
        let taker_side = if bid.seq > ask.seq { Side::Buy } else { Side::Sell };
        let price = match (pricing, taker_side) {
            (FillPricing::Ask, _) | (FillPricing::Maker, Side::Buy) => ask.price,
            (FillPricing::Maker, Side::Sell) => bid.price,
        };
        let fill = Fill {
            pair: self.pair.clone(),
            buy_order_id: bid.id,
            sell_order_id: ask.id,
            buyer: bid.owner,
            seller: ask.owner,
            quantity,
            price,
            taker_side,
        };

        for side in [Side::Buy, Side::Sell] {
            if let Some(order) = self.best_mut(side) {
                order.quantity -= quantity;
            }
            self.remove_if_filled(side);
        }
        debug!(pair = %self.pair, %quantity, %price, "fill");
        Some(fill)
    }

    /// Runs [`OrderBook::match_next`] until the book no longer crosses.
    pub fn match_all(&mut self, pricing: FillPricing) -> Vec<Fill> {
        std::iter::from_fn(|| self.match_next(pricing)).collect()
    }

    /// Removes a resting order by id.
    pub fn cancel(&mut self, order_id: Uuid) -> Option<Order> {
        for side in [Side::Buy, Side::Sell] {
            let book_side = self.side_mut(side);
            let found = book_side.iter_mut().find_map(|(price, queue)| {
                let pos = queue.iter().position(|o| o.id == order_id)?;
                Some((*price, queue.remove(pos)))
            });
            if let Some((price, order)) = found {
                //prune the price level if needed
                if book_side.get(&price).is_some_and(VecDeque::is_empty) {
                    book_side.remove(&price);
                }
                return order;
            }
        }
        None
    }

    pub fn get(&self, order_id: Uuid) -> Option<&Order> {
        self.orders(Side::Buy)
            .chain(self.orders(Side::Sell))
            .find(|o| o.id == order_id)
    }

    /// Every resting order on `side`, best first.
    pub fn orders(&self, side: Side) -> Box<dyn Iterator<Item = &Order> + '_> {
        match side {
            Side::Buy => Box::new(self.bids.values().rev().flatten()),
            Side::Sell => Box::new(self.asks.values().flatten()),
        }
    }

    pub fn len(&self) -> usize {
        self.bids.values().chain(self.asks.values()).map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.bids.is_empty() && self.asks.is_empty()
    }

    /// The best `depth` price levels of each side with their aggregate quantity.
    pub fn snapshot(&self, depth: usize) -> BookSnapshot {
        let aggregate = |(price, queue): (&Decimal, &VecDeque<Order>)| {
            (*price, queue.iter().map(|o| o.quantity).sum::<Decimal>())
        };
        BookSnapshot {
            bids: self.bids.iter().rev().take(depth).map(aggregate).collect(),
            asks: self.asks.iter().take(depth).map(aggregate).collect(),
        }
    }
    /// Starts a batch of changes that is undone unless committed.
    pub fn begin(&mut self) -> BookTransaction<'_> {
        BookTransaction {
            next_seq: self.next_seq,
            book: self,
            inserted: Vec::new(),
            touched: Vec::new(),
            seen: HashSet::new(),
            committed: false,
        }
    }

    fn restore(&mut self, inserted: &[Uuid], touched: Vec<Order>, next_seq: u64) {
        for id in inserted {
            self.cancel(*id);
        }
        // makers leave a level from the front only, so replaying in reverse
        // puts every removed order back ahead of the ones that survived
        for original in touched.into_iter().rev() {
            let level = self.side_mut(original.side).entry(original.price).or_default();
            match level.iter_mut().find(|o| o.id == original.id) {
                Some(current) => *current = original,
                None => level.push_front(original),
            }
        }
        self.next_seq = next_seq;
    }
}

/// Inserts and matches against an [`OrderBook`], keeping the original state
/// of every order it touches. Dropping it without [`BookTransaction::commit`]
/// puts the book back the way it was, so the cost of undoing follows the
/// number of fills and not the depth of the book.
pub struct BookTransaction<'a> {
    book: &'a mut OrderBook,
    next_seq: u64,
    inserted: Vec<Uuid>,
    touched: Vec<Order>,
    seen: HashSet<Uuid>,
    committed: bool,
}

impl BookTransaction<'_> {
    pub fn insert(&mut self, order: Order) {
        self.inserted.push(order.id);
        self.seen.insert(order.id);
        self.book.insert(order);
    }

    /// Matches until the book no longer crosses, remembering each head order
    /// before its first fill.
    pub fn match_all(&mut self, pricing: FillPricing) -> Vec<Fill> {
        let mut fills = Vec::new();
        while self.book.is_crossed() {
            self.remember(Side::Buy);
            self.remember(Side::Sell);
            let Some(fill) = self.book.match_next(pricing) else {
                break;
            };
            fills.push(fill);
        }
        fills
    }

    fn remember(&mut self, side: Side) {
        if let Some(order) = self.book.peek_best(side) {
            if self.seen.insert(order.id) {
                self.touched.push(order.clone());
            }
        }
    }

    /// Keeps every change made through this transaction.
    pub fn commit(mut self) {
        self.committed = true;
    }
}

impl Drop for BookTransaction<'_> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        debug!(
            pair = %self.book.pair,
            restored = self.touched.len(),
            "undoing book changes"
        );
        let touched = std::mem::take(&mut self.touched);
        self.book.restore(&self.inserted, touched, self.next_seq);
    }
}

//tests
#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn pair() -> Pair {
        "BTC-USD".parse().unwrap()
    }

    fn sample_limit_order(owner: u64, side: Side, price: Decimal, quantity: Decimal) -> Order {
        Order::limit(owner, side, price, quantity)
    }

    /// A crossing buy walks two ask levels and rests nothing once satisfied.
    #[test]
    fn test_buy_sweeps_multiple_levels() {
        let mut ob = OrderBook::new(pair());

        ob.insert(sample_limit_order(1, Side::Sell, dec!(101), dec!(5)));
        ob.insert(sample_limit_order(2, Side::Sell, dec!(102), dec!(3)));
        ob.insert(sample_limit_order(3, Side::Buy, dec!(102), dec!(6)));
        let fills = ob.match_all(FillPricing::Maker);

        assert_eq!(fills.len(), 2);
        assert_eq!(fills[0].quantity, dec!(5));
        assert_eq!(fills[0].price, dec!(101));
        assert_eq!(fills[1].quantity, dec!(1));
        assert_eq!(fills[1].price, dec!(102));

        let remaining = ob.peek_best(Side::Sell).unwrap();
        assert_eq!(remaining.quantity, dec!(2));
        assert!(ob.peek_best(Side::Buy).is_none());
    }

    /// Tests a sell that partially fills against a smaller bid and rests.
    #[test]
    fn test_partial_fill_sell_rests_remainder() {
        let mut ob = OrderBook::new(pair());

        ob.insert(sample_limit_order(1, Side::Buy, dec!(100), dec!(4)));
        ob.insert(sample_limit_order(2, Side::Sell, dec!(99), dec!(10)));
        let fills = ob.match_all(FillPricing::Maker);

        assert_eq!(fills.len(), 1);
        assert_eq!(fills[0].quantity, dec!(4));
        assert_eq!(fills[0].price, dec!(100));
        assert_eq!(fills[0].taker_side, Side::Sell);
        assert!(ob.peek_best(Side::Buy).is_none());
        assert_eq!(ob.peek_best(Side::Sell).unwrap().quantity, dec!(6));
    }

    #[test]
    fn test_no_match_when_not_crossing() {
        let mut ob = OrderBook::new(pair());

        ob.insert(sample_limit_order(1, Side::Sell, dec!(25000), dec!(1)));
        ob.insert(sample_limit_order(2, Side::Buy, dec!(24000), dec!(1)));

        assert!(ob.match_all(FillPricing::Maker).is_empty());
        assert_eq!(ob.len(), 2);
    }

    /// Orders at exactly the touch price execute.
    #[test]
    fn test_exact_match_at_equal_price() {
        let mut ob = OrderBook::new(pair());

        ob.insert(sample_limit_order(1, Side::Sell, dec!(100), dec!(5)));
        ob.insert(sample_limit_order(2, Side::Buy, dec!(100), dec!(5)));
        let fills = ob.match_all(FillPricing::Maker);

        assert_eq!(fills.len(), 1);
        assert_eq!(fills[0].quantity, dec!(5));
        assert!(ob.is_empty());
    }

    /// Tests that FIFO order is respected for multiple orders at the same price.
    #[test]
    fn test_queue_fairness_fifo_fill_order() {
        let mut ob = OrderBook::new(pair());

        let first = sample_limit_order(1, Side::Sell, dec!(100), dec!(4));
        let second = sample_limit_order(2, Side::Sell, dec!(100), dec!(6));
        let (first_id, second_id) = (first.id, second.id);
        ob.insert(first);
        ob.insert(second);
        ob.insert(sample_limit_order(3, Side::Buy, dec!(100), dec!(9)));
        let fills = ob.match_all(FillPricing::Maker);

        assert_eq!(fills.len(), 2);
        assert_eq!(fills[0].sell_order_id, first_id);
        assert_eq!(fills[0].quantity, dec!(4));
        assert_eq!(fills[1].sell_order_id, second_id);
        assert_eq!(fills[1].quantity, dec!(5));

        assert_eq!(ob.peek_best(Side::Sell).unwrap().quantity, dec!(1));
    }

    /// A crossing buy executes at the resting ask's price.
    #[test]
    fn test_crossing_buy_takes_resting_price() {
        let mut ob = OrderBook::new(pair());

        ob.insert(sample_limit_order(1, Side::Sell, dec!(105), dec!(5)));
        ob.insert(sample_limit_order(2, Side::Buy, dec!(110), dec!(3)));
        let fills = ob.match_all(FillPricing::Maker);

        assert_eq!(fills.len(), 1);
        assert_eq!(fills[0].price, dec!(105));
        assert_eq!(fills[0].quantity, dec!(3));
        assert_eq!(ob.peek_best(Side::Sell).unwrap().quantity, dec!(2));
        assert!(ob.peek_best(Side::Buy).is_none());
    }

    /// A crossing sell executes at the resting bid unless the ask rule is chosen.
    #[test]
    fn test_crossing_sell_price_depends_on_rule() {
        for (pricing, expected) in [(FillPricing::Maker, dec!(100)), (FillPricing::Ask, dec!(90))] {
            let mut ob = OrderBook::new(pair());
            ob.insert(sample_limit_order(1, Side::Buy, dec!(100), dec!(5)));
            ob.insert(sample_limit_order(2, Side::Sell, dec!(90), dec!(4)));

            let fills = ob.match_all(pricing);
            assert_eq!(fills.len(), 1);
            assert_eq!(fills[0].price, expected);
            assert_eq!(ob.peek_best(Side::Buy).unwrap().quantity, dec!(1));
            assert!(ob.peek_best(Side::Sell).is_none());
        }
    }

    /// Decimal quantities leave no dust after a full fill.
    #[test]
    fn test_fractional_fills_leave_no_dust() {
        let mut ob = OrderBook::new(pair());

        ob.insert(sample_limit_order(1, Side::Sell, dec!(1), dec!(0.1)));
        ob.insert(sample_limit_order(2, Side::Sell, dec!(1), dec!(0.2)));
        ob.insert(sample_limit_order(3, Side::Buy, dec!(1), dec!(0.3)));
        ob.match_all(FillPricing::Maker);

        assert!(ob.is_empty());
    }

    #[test]
    fn test_remove_if_filled_keeps_live_head() {
        let mut ob = OrderBook::new(pair());
        ob.insert(sample_limit_order(1, Side::Buy, dec!(10), dec!(1)));

        assert!(ob.remove_if_filled(Side::Buy).is_none());
        assert!(ob.remove_if_filled(Side::Sell).is_none());
        assert_eq!(ob.len(), 1);
    }

    #[test]
    fn test_cancel_existing_order() {
        let mut ob = OrderBook::new(pair());
        let order = sample_limit_order(42, Side::Buy, dec!(101), dec!(10));
        let id = order.id;
        ob.insert(order);

        let cancelled = ob.cancel(id).unwrap();

        assert_eq!(cancelled.owner, 42);
        assert!(ob.is_empty());
    }

    #[test]
    fn test_cancel_nonexistent_order() {
        let mut ob = OrderBook::new(pair());
        ob.insert(sample_limit_order(1, Side::Sell, dec!(99), dec!(5)));

        assert!(ob.cancel(Uuid::new_v4()).is_none());
        assert_eq!(ob.len(), 1);
    }

    #[test]
    fn test_snapshot_aggregates_levels_best_first() {
        let mut ob = OrderBook::new(pair());
        ob.insert(sample_limit_order(1, Side::Buy, dec!(99), dec!(1)));
        ob.insert(sample_limit_order(2, Side::Buy, dec!(99), dec!(2)));
        ob.insert(sample_limit_order(3, Side::Buy, dec!(98), dec!(1)));
        ob.insert(sample_limit_order(4, Side::Sell, dec!(101), dec!(4)));
        ob.insert(sample_limit_order(5, Side::Sell, dec!(102), dec!(1)));

        let snap = ob.snapshot(1);
        assert_eq!(snap.bids, vec![(dec!(99), dec!(3))]);
        assert_eq!(snap.asks, vec![(dec!(101), dec!(4))]);

        let full = ob.snapshot(10);
        assert_eq!(full.bids.len(), 2);
        assert_eq!(full.asks[1], (dec!(102), dec!(1)));
    }

    fn resting(ob: &OrderBook) -> (Vec<Order>, Vec<Order>) {
        (
            ob.orders(Side::Buy).cloned().collect(),
            ob.orders(Side::Sell).cloned().collect(),
        )
    }

    /// Dropping an uncommitted transaction restores filled, partially filled
    /// and untouched orders in their original FIFO positions.
    #[test]
    fn test_dropped_transaction_restores_book() {
        let mut ob = OrderBook::new(pair());
        ob.insert(sample_limit_order(1, Side::Sell, dec!(100), dec!(1)));
        ob.insert(sample_limit_order(2, Side::Sell, dec!(100), dec!(2)));
        ob.insert(sample_limit_order(3, Side::Sell, dec!(101), dec!(1)));
        ob.insert(sample_limit_order(4, Side::Sell, dec!(105), dec!(1)));
        ob.insert(sample_limit_order(5, Side::Buy, dec!(90), dec!(1)));
        let before = resting(&ob);

        {
            let mut tx = ob.begin();
            tx.insert(sample_limit_order(6, Side::Buy, dec!(101), dec!(3.5)));
            let fills = tx.match_all(FillPricing::Maker);
            assert_eq!(fills.len(), 3);
        }

        assert_eq!(resting(&ob), before);

        // sequence numbers pick up where they were before the undo
        ob.insert(sample_limit_order(7, Side::Buy, dec!(80), dec!(1)));
        assert_eq!(ob.peek_best(Side::Buy).map(|o| o.owner), Some(5));
        assert_eq!(ob.orders(Side::Buy).last().map(|o| o.seq), Some(6));
    }

    #[test]
    fn test_dropped_transaction_removes_resting_remainder() {
        let mut ob = OrderBook::new(pair());
        ob.insert(sample_limit_order(1, Side::Sell, dec!(100), dec!(1)));
        let before = resting(&ob);

        {
            let mut tx = ob.begin();
            tx.insert(sample_limit_order(2, Side::Buy, dec!(100), dec!(4)));
            tx.match_all(FillPricing::Maker);
        }

        assert_eq!(resting(&ob), before);
        assert_eq!(ob.len(), 1);
    }

    #[test]
    fn test_committed_transaction_keeps_fills() {
        let mut ob = OrderBook::new(pair());
        ob.insert(sample_limit_order(1, Side::Sell, dec!(100), dec!(1)));

        let mut tx = ob.begin();
        tx.insert(sample_limit_order(2, Side::Buy, dec!(100), dec!(4)));
        assert_eq!(tx.match_all(FillPricing::Maker).len(), 1);
        tx.commit();

        assert!(ob.peek_best(Side::Sell).is_none());
        assert_eq!(ob.peek_best(Side::Buy).map(|o| o.quantity), Some(dec!(3)));
    }
}
