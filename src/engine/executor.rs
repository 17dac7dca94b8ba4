//! Trade executor.
//!
//! Submits buy and sell orders through the token-market seam, waits for
//! mining, and appends a `buy`/`sell` record for each confirmed trade.
//! One attempt per call: failures are returned to the caller, never retried.

use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{Address, U256};
use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::ledger::{BuyOrder, SellOrder, TokenMarket};
use crate::storage::TransactionStore;
use crate::types::{format_eth, RecordKind, TradeFill, TransactionRecord};

pub struct TradeExecutor {
    market: Arc<dyn TokenMarket>,
    store: Arc<dyn TransactionStore>,
    confirmation_timeout: Duration,
}

impl TradeExecutor {
    pub fn new(
        market: Arc<dyn TokenMarket>,
        store: Arc<dyn TransactionStore>,
        confirmation_timeout: Duration,
    ) -> Self {
        Self {
            market,
            store,
            confirmation_timeout,
        }
    }

    /// Buy `token` for `value` wei.
    ///
    /// Suspends twice: once for the broadcast, once for the confirmation.
    pub async fn buy(&self, token: Address, value: U256) -> Result<TradeFill> {
        let order = BuyOrder::for_wallet(self.market.wallet(), value);
        info!(token = %token, value = %format_eth(value), "Submitting buy");

        let tx_hash = self
            .market
            .submit_buy(token, &order)
            .await
            .with_context(|| format!("Buy of {token} was not accepted"))?;
        info!(tx = %tx_hash, token = %token, "Buy sent");

        let fill = self
            .market
            .await_confirmation(tx_hash, self.confirmation_timeout)
            .await
            .with_context(|| format!("Buy {tx_hash} did not confirm"))?;
        info!(
            tx = %fill.tx_hash,
            block = fill.block_number,
            gas_paid = %format_eth(fill.gas_paid()),
            "Buy confirmed"
        );

        self.record(TransactionRecord::trade(RecordKind::Buy, &fill, value, token))
            .await;
        Ok(fill)
    }

    /// Sell `amount` tokens of `token`.
    pub async fn sell(&self, token: Address, amount: U256) -> Result<TradeFill> {
        let order = SellOrder::for_wallet(self.market.wallet(), amount);
        info!(token = %token, amount = %format_eth(amount), "Submitting sell");

        let tx_hash = self
            .market
            .submit_sell(token, &order)
            .await
            .with_context(|| format!("Sell of {token} was not accepted"))?;
        info!(tx = %tx_hash, token = %token, "Sell sent");

        let fill = self
            .market
            .await_confirmation(tx_hash, self.confirmation_timeout)
            .await
            .with_context(|| format!("Sell {tx_hash} did not confirm"))?;
        info!(
            tx = %fill.tx_hash,
            block = fill.block_number,
            gas_paid = %format_eth(fill.gas_paid()),
            "Sell confirmed"
        );

        self.record(TransactionRecord::trade(RecordKind::Sell, &fill, amount, token))
            .await;
        Ok(fill)
    }

    /// Sell the whole wallet balance of `token`. `None` when there is nothing to sell.
    pub async fn sell_all(&self, token: Address) -> Result<Option<TradeFill>> {
        let balance = self
            .market
            .balance_of(token, self.market.wallet())
            .await
            .with_context(|| format!("Failed to read balance of {token}"))?;
        info!(token = %token, balance = %format_eth(balance), "Token balance");

        if balance.is_zero() {
            info!(token = %token, "No tokens to sell");
            return Ok(None);
        }
        self.sell(token, balance).await.map(Some)
    }

    async fn record(&self, record: TransactionRecord) {
        if let Err(e) = self.store.insert(&record).await {
            warn!(tx = %record.tx_hash, kind = %record.kind, error = %e, "Failed to persist trade record");
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
