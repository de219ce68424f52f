use std::time::SystemTime;

use tracing::{error, info};

use crate::{
    errors::{ExchangeError, ExchangeResult},
    ledger::{Ledger, TransactionLog},
    trade::{Fill, TransactionRecord, exact_notional},
};

/// Applies one fill to both parties' ledgers and appends the buyer's and the
/// seller's transaction record.
///
/// Runs inside the caller's session: nothing here is final until the session
/// commits, and any error must make the caller roll the session back. A fill
/// is settled exactly once; there is no retry.
pub async fn execute_trade<L>(ledger: &mut L, fill: &Fill) -> ExchangeResult<()>
where
    L: Ledger + TransactionLog + ?Sized,
{
    for account in [fill.buyer, fill.seller] {
        if !ledger.has_account(account).await? {
            error!(account, pair = %fill.pair, "order references an account with no ledger");
            return Err(ExchangeError::MissingLedger(account));
        }
    }

    let base = &fill.pair.base;
    let quote = &fill.pair.quote;
    let notional = exact_notional(fill.quantity, fill.price).ok_or_else(|| {
        ExchangeError::Validation(format!(
            "fill notional {} x {} is not exactly representable",
            fill.quantity, fill.price
        ))
    })?;

    ledger.adjust_balance(fill.buyer, quote, -notional).await?;
    ledger.adjust_balance(fill.buyer, base, fill.quantity).await?;
    ledger.adjust_balance(fill.seller, base, -fill.quantity).await?;
    ledger.adjust_balance(fill.seller, quote, notional).await?;

    let [buy, sell] = TransactionRecord::for_fill(fill, SystemTime::now());
    ledger.append(buy).await?;
    ledger.append(sell).await?;

    info!(
        pair = %fill.pair,
        buyer = fill.buyer,
        seller = fill.seller,
        quantity = %fill.quantity,
        price = %fill.price,
        "settled"
    );
    Ok(())
}
