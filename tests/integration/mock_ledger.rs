//! Mock chain for integration testing.
//!
//! Provides a deterministic `LedgerClient` + `TokenMarket` implementation
//! that serves scripted blocks and receipts, announces a fixed list of
//! heights (or a caller-supplied stream of them), and records every buy it
//! is asked to submit. All in-memory with no external dependencies.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use alloy::primitives::{Address, Bytes, B256, U256};
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};

use wowsniper::engine::correlator::TRANSFER_EVENT_SIGNATURE;
use wowsniper::ledger::{BuyOrder, LedgerClient, SellOrder, TokenMarket};
use wowsniper::types::*;

/// A scripted chain.
///
/// Blocks, receipts and failing tokens are fully controllable from test code.
pub struct MockChain {
    wallet: Address,
    heights: Vec<u64>,
    subscription: Mutex<Option<BoxStream<'static, u64>>>,
    blocks: Mutex<HashMap<u64, ObservedBlock>>,
    receipts: Mutex<HashMap<B256, ReceiptLogs>>,
    reverting_tokens: Mutex<HashSet<Address>>,
    block_requests: Mutex<Vec<u64>>,
    buys: Mutex<Vec<(Address, BuyOrder)>>,
}

impl MockChain {
    /// A chain that will announce `heights`, in order, to a subscriber.
    pub fn new(wallet: Address, heights: Vec<u64>) -> Self {
        Self {
            wallet,
            heights,
            subscription: Mutex::new(None),
            blocks: Mutex::new(HashMap::new()),
            receipts: Mutex::new(HashMap::new()),
            reverting_tokens: Mutex::new(HashSet::new()),
            block_requests: Mutex::new(Vec::new()),
            buys: Mutex::new(Vec::new()),
        }
    }

    /// Announce heights from `stream` instead of the fixed list.
    pub fn set_subscription(&self, stream: BoxStream<'static, u64>) {
        *self.subscription.lock().unwrap() = Some(stream);
    }

    /// Add a block. Heights without a block are served empty.
    pub fn add_block(&self, number: u64, transactions: Vec<ObservedTx>) {
        self.blocks
            .lock()
            .unwrap()
            .insert(number, ObservedBlock { number, timestamp: 0, transactions });
    }

    /// Give `tx` a receipt with one Transfer log per token, in order.
    pub fn add_transfer_receipt(&self, tx: B256, block: u64, tokens: &[Address]) {
        let logs = tokens
            .iter()
            .map(|token| LogEntry {
                address: *token,
                topics: vec![TRANSFER_EVENT_SIGNATURE, B256::ZERO, B256::ZERO],
                transaction_hash: Some(tx),
                block_number: Some(block),
            })
            .collect();
        self.add_receipt(tx, logs);
    }

    pub fn add_receipt(&self, tx: B256, logs: Vec<LogEntry>) {
        self.receipts.lock().unwrap().insert(tx, ReceiptLogs { logs });
    }

    /// Buys of `token` will be rejected by the node.
    pub fn revert_buys_of(&self, token: Address) {
        self.reverting_tokens.lock().unwrap().insert(token);
    }

    /// Every buy submitted so far, including rejected ones.
    pub fn buys(&self) -> Vec<(Address, BuyOrder)> {
        self.buys.lock().unwrap().clone()
    }

    /// Heights requested through `block_with_transactions`, in order.
    pub fn block_requests(&self) -> Vec<u64> {
        self.block_requests.lock().unwrap().clone()
    }
}

/// A transaction from a fixed sender.
pub fn tx(byte: u8, to: Address, value: U256) -> ObservedTx {
    ObservedTx {
        hash: B256::repeat_byte(byte),
        from: Address::repeat_byte(0xee),
        to: Some(to),
        value,
        input: Bytes::new(),
    }
}

#[async_trait]
impl LedgerClient for MockChain {
    async fn subscribe_heights(&self) -> Result<BoxStream<'static, u64>> {
        if let Some(stream) = self.subscription.lock().unwrap().take() {
            return Ok(stream);
        }
        Ok(stream::iter(self.heights.clone()).boxed())
    }

    async fn block_with_transactions(&self, height: u64) -> Result<Option<ObservedBlock>> {
        self.block_requests.lock().unwrap().push(height);
        let block = self
            .blocks
            .lock()
            .unwrap()
            .get(&height)
            .cloned()
            .unwrap_or(ObservedBlock {
                number: height,
                timestamp: 0,
                transactions: Vec::new(),
            });
        Ok(Some(block))
    }

    async fn transaction_receipt(&self, hash: B256) -> Result<Option<ReceiptLogs>> {
        Ok(self.receipts.lock().unwrap().get(&hash).cloned())
    }

    async fn transaction(&self, hash: B256) -> Result<Option<ObservedTx>> {
        let blocks = self.blocks.lock().unwrap();
        Ok(blocks
            .values()
            .flat_map(|b| b.transactions.iter())
            .find(|tx| tx.hash == hash)
            .cloned())
    }

    async fn logs(&self, _query: &LogQuery) -> Result<Vec<LogEntry>> {
        Ok(Vec::new())
    }
}

#[async_trait]
impl TokenMarket for MockChain {
    fn wallet(&self) -> Address {
        self.wallet
    }

    async fn submit_buy(&self, token: Address, order: &BuyOrder) -> Result<B256> {
        let mut buys = self.buys.lock().unwrap();
        buys.push((token, order.clone()));
        if self.reverting_tokens.lock().unwrap().contains(&token) {
            return Err(anyhow!("execution reverted: MarketGraduated"));
        }
        Ok(B256::with_last_byte(0xb0 + buys.len() as u8))
    }

    async fn submit_sell(&self, token: Address, _order: &SellOrder) -> Result<B256> {
        Err(anyhow!("sell of {token} not scripted"))
    }

    async fn await_confirmation(&self, tx_hash: B256, _timeout: Duration) -> Result<TradeFill> {
        let mined_in = self.heights.iter().max().copied().unwrap_or_default() + 1;
        Ok(TradeFill {
            tx_hash,
            block_number: mined_in,
            gas_used: 120_000,
            effective_gas_price: 1_000_000,
        })
    }

    async fn balance_of(&self, _token: Address, _owner: Address) -> Result<U256> {
        Ok(U256::ZERO)
    }

    async fn token_name(&self, _token: Address) -> Result<String> {
        Ok("Mock".to_string())
    }

    async fn market_type(&self, _token: Address) -> Result<MarketType> {
        Ok(MarketType::BondingCurve)
    }

    async fn sell_quote(&self, _token: Address, _amount: U256) -> Result<U256> {
        Ok(U256::ZERO)
    }
}
