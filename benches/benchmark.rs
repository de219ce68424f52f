use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use rust_decimal::Decimal;
use spot_exchange_engine::engine::{Exchange, NewOrder};
use spot_exchange_engine::instrument::Markets;
use spot_exchange_engine::ledger::MemoryStore;
use spot_exchange_engine::orderbook::OrderBook;
use spot_exchange_engine::orders::{AccountId, Order, Side};
use spot_exchange_engine::trade::FillPricing;
use tokio::runtime::Runtime;

fn setup_order_book(depth: u64, orders_per_level: u64) -> OrderBook {
    let mut ob = OrderBook::new("BTC-USD".parse().unwrap());
    //populate both sides without crossing: bids below `depth`, asks above it
    for level in 1..=depth {
        for i in 0..orders_per_level {
            ob.insert(Order::limit(
                i,
                Side::Sell,
                Decimal::from(depth + level),
                Decimal::ONE,
            ));
            ob.insert(Order::limit(
                i,
                Side::Buy,
                Decimal::from(level),
                Decimal::ONE,
            ));
        }
    }
    ob
}

fn bench_match_order(c: &mut Criterion) {
    let depth = 100;
    let orders_per_level = 10;
    let ob = setup_order_book(depth, orders_per_level);

    c.bench_function("sweep half the asks with one buy", |b| {
        b.iter_batched(
            || ob.clone(),
            |mut ob| {
                ob.insert(Order::limit(
                    0,
                    Side::Buy,
                    Decimal::from(depth * 2),
                    Decimal::from(depth * orders_per_level / 2),
                ));
                ob.match_all(FillPricing::Maker)
            },
            BatchSize::SmallInput,
        )
    });

    c.bench_function("insert one resting order", |b| {
        b.iter_batched(
            || ob.clone(),
            |mut ob| {
                ob.insert(Order::limit(0, Side::Sell, Decimal::from(depth * 3), Decimal::ONE));
                ob.match_all(FillPricing::Maker)
            },
            BatchSize::SmallInput,
        )
    });
}

fn new_order(owner: AccountId, side: Side, price: u64) -> NewOrder {
    NewOrder {
        symbol: "BTC-USD".into(),
        side,
        price: Decimal::from(price),
        quantity: Decimal::ONE,
        owner,
    }
}

/// An exchange whose BTC-USD book rests `depth` levels of `orders_per_level`
/// orders on each side, with bids at or below `depth` and asks at or above
/// `depth + 2`.
fn setup_exchange(rt: &Runtime, depth: u64, orders_per_level: u64) -> Exchange<MemoryStore> {
    let markets = Markets::new(["BTC", "USD"], ["BTC-USD"]).unwrap();
    let store = MemoryStore::new();
    store.deposit(1, "USD".parse().unwrap(), Decimal::from(u32::MAX)).unwrap();
    store.deposit(2, "BTC".parse().unwrap(), Decimal::from(u32::MAX)).unwrap();
    let ex = Exchange::new(markets, store);
    rt.block_on(async {
        for level in 1..=depth {
            for _ in 0..orders_per_level {
                ex.place_order(new_order(1, Side::Buy, level)).await.unwrap();
                ex.place_order(new_order(2, Side::Sell, depth + 1 + level))
                    .await
                    .unwrap();
            }
        }
    });
    ex
}

fn bench_place_order(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let depth = 100;
    let ex = setup_exchange(&rt, depth, 10);

    c.bench_function("place a resting order on a deep book", |b| {
        b.iter(|| rt.block_on(ex.place_order(new_order(1, Side::Buy, 1))).unwrap())
    });

    // an ask inside the spread, then a bid that takes it: one fill each round
    c.bench_function("place and fill inside the spread of a deep book", |b| {
        b.iter(|| {
            rt.block_on(async {
                ex.place_order(new_order(2, Side::Sell, depth + 1)).await.unwrap();
                ex.place_order(new_order(1, Side::Buy, depth + 1)).await.unwrap()
            })
        })
    });
}

criterion_group!(benches, bench_match_order, bench_place_order);
criterion_main!(benches);
