//! Chain access.
//!
//! Defines the two seams the engine talks through:
//! - `LedgerClient`: block, receipt, transaction and log reads plus the
//!   new-head subscription
//! - `TokenMarket`: contract calls against a Wow token (buy, sell, reads)
//!
//! `alloy_ledger::AlloyLedger` implements both over a WebSocket node.

pub mod alloy_ledger;

use std::time::Duration;

use alloy::primitives::{Address, B256, U160, U256};
use anyhow::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::types::{LogEntry, LogQuery, MarketType, ObservedBlock, ObservedTx, ReceiptLogs, TradeFill};

/// Read access to the chain.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait LedgerClient: Send + Sync {
    /// Stream of new block heights, in the order the node announces them.
    async fn subscribe_heights(&self) -> Result<BoxStream<'static, u64>>;

    /// Fetch a block with its full transaction list.
    /// Returns `None` if the node does not know the height (yet).
    async fn block_with_transactions(&self, height: u64) -> Result<Option<ObservedBlock>>;

    /// Fetch the receipt logs of a mined transaction.
    async fn transaction_receipt(&self, hash: B256) -> Result<Option<ReceiptLogs>>;

    /// Look up a single transaction.
    async fn transaction(&self, hash: B256) -> Result<Option<ObservedTx>>;

    /// Historical log query.
    async fn logs(&self, query: &LogQuery) -> Result<Vec<LogEntry>>;
}

/// Contract-call surface of a Wow token.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TokenMarket: Send + Sync {
    /// Address of the signing wallet.
    fn wallet(&self) -> Address;

    /// Broadcast a buy. Returns once the node has accepted the transaction.
    async fn submit_buy(&self, token: Address, order: &BuyOrder) -> Result<B256>;

    /// Broadcast a sell. Returns once the node has accepted the transaction.
    async fn submit_sell(&self, token: Address, order: &SellOrder) -> Result<B256>;

    /// Wait until `tx_hash` is mined. Reverts are reported as errors.
    async fn await_confirmation(&self, tx_hash: B256, timeout: Duration) -> Result<TradeFill>;

    async fn balance_of(&self, token: Address, owner: Address) -> Result<U256>;

    async fn token_name(&self, token: Address) -> Result<String>;

    async fn market_type(&self, token: Address) -> Result<MarketType>;

    /// ETH received for selling `amount` tokens on the bonding curve.
    async fn sell_quote(&self, token: Address, amount: U256) -> Result<U256>;
}

// ---------------------------------------------------------------------------
// Orders
// ---------------------------------------------------------------------------

/// Arguments of `buy(...)` plus the attached value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuyOrder {
    pub recipient: Address,
    pub refund_recipient: Address,
    pub order_referrer: Address,
    pub comment: String,
    pub expected_market_type: u8,
    pub min_order_size: U256,
    pub sqrt_price_limit_x96: U160,
    /// ETH attached to the call.
    pub value: U256,
}

impl BuyOrder {
    /// Market buy for `value` wei, every role pointing at our own wallet.
    pub fn for_wallet(wallet: Address, value: U256) -> Self {
        Self {
            recipient: wallet,
            refund_recipient: wallet,
            order_referrer: wallet,
            comment: String::new(),
            expected_market_type: 0,
            min_order_size: value,
            sqrt_price_limit_x96: U160::ZERO,
            value,
        }
    }
}

/// Arguments of `sell(...)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SellOrder {
    pub tokens_to_sell: U256,
    pub recipient: Address,
    pub order_referrer: Address,
    pub comment: String,
    pub expected_market_type: u8,
    pub min_payout_size: U256,
    pub sqrt_price_limit_x96: U160,
}

impl SellOrder {
    /// Sell `amount` tokens to our own wallet with no payout floor.
    pub fn for_wallet(wallet: Address, amount: U256) -> Self {
        Self {
            tokens_to_sell: amount,
            recipient: wallet,
            order_referrer: wallet,
            comment: String::new(),
            expected_market_type: 0,
            min_payout_size: U256::ZERO,
            sqrt_price_limit_x96: U160::ZERO,
        }
    }
}
