//! Alloy-backed ledger over a WebSocket node (Alchemy on Base).
//!
//! One `DynProvider` carries the wallet filler, so the same connection
//! serves reads, the head subscription, and signed contract calls.

use std::time::Duration;

use alloy::{
    consensus::Transaction as ConsensusTx,
    eips::BlockNumberOrTag,
    network::{EthereumWallet, ReceiptResponse, TransactionResponse},
    primitives::{Address, B256, U256},
    providers::{DynProvider, PendingTransactionBuilder, Provider, ProviderBuilder, WsConnect},
    rpc::types::{Filter, Log, Transaction},
    signers::local::PrivateKeySigner,
    sol,
    sol_types::SolCall,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use tracing::{debug, info};

use crate::ledger::{BuyOrder, LedgerClient, SellOrder, TokenMarket};
use crate::types::{
    LogEntry, LogQuery, MarketType, ObservedBlock, ObservedTx, ReceiptLogs, SniperError, TradeFill,
    TradeSide,
};

sol! {
    #[sol(rpc)]
    interface IWowToken {
        function name() external view returns (string);
        function balanceOf(address owner) external view returns (uint256);
        function marketType() external view returns (uint8);
        function getTokenSellQuote(uint256 amount) external view returns (uint256);

        function buy(
            address recipient,
            address refundRecipient,
            address orderReferrer,
            string comment,
            uint8 expectedMarketType,
            uint256 minOrderSize,
            uint160 sqrtPriceLimitX96
        ) external payable returns (uint256);

        function sell(
            uint256 tokensToSell,
            address recipient,
            address orderReferrer,
            string comment,
            uint8 expectedMarketType,
            uint256 minPayoutSize,
            uint160 sqrtPriceLimitX96
        ) external returns (uint256);
    }
}

/// Build the Alchemy WebSocket endpoint for a network slug ("base-mainnet").
pub fn alchemy_ws_url(network: &str, api_key: &str) -> String {
    format!("wss://{network}.g.alchemy.com/v2/{api_key}")
}

/// Which Wow entry point `input` calls, judged by its 4-byte selector.
pub fn decode_trade_call(input: &[u8]) -> Option<TradeSide> {
    let selector = input.get(..4)?;
    if selector == IWowToken::buyCall::SELECTOR {
        Some(TradeSide::Buy)
    } else if selector == IWowToken::sellCall::SELECTOR {
        Some(TradeSide::Sell)
    } else {
        None
    }
}

pub struct AlloyLedger {
    provider: DynProvider,
    wallet: Address,
}

impl AlloyLedger {
    /// Connect to `ws_url` with `signer` attached for contract calls.
    pub async fn connect(ws_url: &str, signer: PrivateKeySigner) -> Result<Self> {
        let wallet = signer.address();
        let provider = ProviderBuilder::new()
            .wallet(EthereumWallet::from(signer))
            .connect_ws(WsConnect::new(ws_url))
            .await
            .context("Failed to connect to node WebSocket")?
            .erased();

        info!(wallet = %wallet, "Connected to node");
        Ok(Self { provider, wallet })
    }

    fn token(&self, address: Address) -> IWowToken::IWowTokenInstance<DynProvider> {
        IWowToken::new(address, self.provider.clone())
    }
}

fn observed_tx(tx: &Transaction) -> ObservedTx {
    ObservedTx {
        hash: TransactionResponse::tx_hash(tx),
        from: TransactionResponse::from(tx),
        to: ConsensusTx::to(tx),
        value: ConsensusTx::value(tx),
        input: ConsensusTx::input(tx).clone(),
    }
}

fn log_entry(log: &Log) -> LogEntry {
    LogEntry {
        address: log.address(),
        topics: log.topics().to_vec(),
        transaction_hash: log.transaction_hash,
        block_number: log.block_number,
    }
}

fn filter_for(query: &LogQuery) -> Filter {
    let mut filter = Filter::new().from_block(query.from_block);
    filter = match query.to_block {
        Some(to) => filter.to_block(to),
        None => filter.to_block(BlockNumberOrTag::Latest),
    };
    if let Some(address) = query.address {
        filter = filter.address(address);
    }
    for (position, topic) in query.topics.iter().enumerate() {
        let Some(topic) = topic else { continue };
        filter = match position {
            0 => filter.event_signature(*topic),
            1 => filter.topic1(*topic),
            2 => filter.topic2(*topic),
            3 => filter.topic3(*topic),
            _ => filter,
        };
    }
    filter
}

#[async_trait]
impl LedgerClient for AlloyLedger {
    async fn subscribe_heights(&self) -> Result<BoxStream<'static, u64>> {
        let subscription = self
            .provider
            .subscribe_blocks()
            .await
            .map_err(|e| SniperError::ledger("eth_subscribe(newHeads)", e))?;
        Ok(subscription.into_stream().map(|header| header.number).boxed())
    }

    async fn block_with_transactions(&self, height: u64) -> Result<Option<ObservedBlock>> {
        let block = self
            .provider
            .get_block_by_number(BlockNumberOrTag::Number(height))
            .full()
            .await
            .map_err(|e| SniperError::ledger("eth_getBlockByNumber", e))?;

        let Some(block) = block else {
            return Ok(None);
        };
        let transactions = block
            .transactions
            .as_transactions()
            .map(|txs| txs.iter().map(observed_tx).collect())
            .unwrap_or_default();

        Ok(Some(ObservedBlock {
            number: block.header.number,
            timestamp: block.header.timestamp,
            transactions,
        }))
    }

    async fn transaction_receipt(&self, hash: B256) -> Result<Option<ReceiptLogs>> {
        let receipt = self
            .provider
            .get_transaction_receipt(hash)
            .await
            .map_err(|e| SniperError::ledger("eth_getTransactionReceipt", e))?;

        Ok(receipt.map(|r| ReceiptLogs {
            logs: r.inner.logs().iter().map(log_entry).collect(),
        }))
    }

    async fn transaction(&self, hash: B256) -> Result<Option<ObservedTx>> {
        let tx = self
            .provider
            .get_transaction_by_hash(hash)
            .await
            .map_err(|e| SniperError::ledger("eth_getTransactionByHash", e))?;
        Ok(tx.as_ref().map(observed_tx))
    }

    async fn logs(&self, query: &LogQuery) -> Result<Vec<LogEntry>> {
        let logs = self
            .provider
            .get_logs(&filter_for(query))
            .await
            .map_err(|e| SniperError::ledger("eth_getLogs", e))?;
        debug!(count = logs.len(), from_block = query.from_block, "Fetched logs");
        Ok(logs.iter().map(log_entry).collect())
    }
}

#[async_trait]
impl TokenMarket for AlloyLedger {
    fn wallet(&self) -> Address {
        self.wallet
    }

    async fn submit_buy(&self, token: Address, order: &BuyOrder) -> Result<B256> {
        let pending = self
            .token(token)
            .buy(
                order.recipient,
                order.refund_recipient,
                order.order_referrer,
                order.comment.clone(),
                order.expected_market_type,
                order.min_order_size,
                order.sqrt_price_limit_x96,
            )
            .value(order.value)
            .send()
            .await
            .map_err(|e| SniperError::Trade { token, message: e.to_string() })?;
        Ok(*pending.tx_hash())
    }

    async fn submit_sell(&self, token: Address, order: &SellOrder) -> Result<B256> {
        let pending = self
            .token(token)
            .sell(
                order.tokens_to_sell,
                order.recipient,
                order.order_referrer,
                order.comment.clone(),
                order.expected_market_type,
                order.min_payout_size,
                order.sqrt_price_limit_x96,
            )
            .send()
            .await
            .map_err(|e| SniperError::Trade { token, message: e.to_string() })?;
        Ok(*pending.tx_hash())
    }

    async fn await_confirmation(&self, tx_hash: B256, timeout: Duration) -> Result<TradeFill> {
        let receipt = PendingTransactionBuilder::new(self.provider.root().clone(), tx_hash)
            .with_timeout(Some(timeout))
            .get_receipt()
            .await
            .map_err(|e| SniperError::ledger("wait_for_receipt", e))?;

        if !ReceiptResponse::status(&receipt) {
            return Err(SniperError::ledger("wait_for_receipt", format!("transaction {tx_hash} reverted")).into());
        }

        Ok(TradeFill {
            tx_hash,
            block_number: receipt.block_number.unwrap_or_default(),
            gas_used: receipt.gas_used,
            effective_gas_price: receipt.effective_gas_price,
        })
    }

    async fn balance_of(&self, token: Address, owner: Address) -> Result<U256> {
        let balance = self
            .token(token)
            .balanceOf(owner)
            .call()
            .await
            .map_err(|e| SniperError::ledger("balanceOf", e))?;
        Ok(balance)
    }

    async fn token_name(&self, token: Address) -> Result<String> {
        let name = self
            .token(token)
            .name()
            .call()
            .await
            .map_err(|e| SniperError::ledger("name", e))?;
        Ok(name)
    }

    async fn market_type(&self, token: Address) -> Result<MarketType> {
        let raw = self
            .token(token)
            .marketType()
            .call()
            .await
            .map_err(|e| SniperError::ledger("marketType", e))?;
        Ok(MarketType::from_raw(raw))
    }

    async fn sell_quote(&self, token: Address, amount: U256) -> Result<U256> {
        let quote = self
            .token(token)
            .getTokenSellQuote(amount)
            .call()
            .await
            .map_err(|e| SniperError::ledger("getTokenSellQuote", e))?;
        Ok(quote)
    }
}
