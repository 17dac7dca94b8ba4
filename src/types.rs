//! Shared types for the WOWSNIPER monitor.
//!
//! These types form the data model used across all modules. They are
//! deliberately independent of the node client so the engine can be driven
//! by the live ledger or by an in-memory mock.

use alloy::primitives::{
    utils::{format_ether, parse_ether},
    Address, Bytes, B256, U256,
};
use serde::{Deserialize, Serialize};
use std::fmt;

/// One ether in wei.
pub const WEI_PER_ETH: u128 = 1_000_000_000_000_000_000;

// ---------------------------------------------------------------------------
// Chain data
// ---------------------------------------------------------------------------

/// A mined block with its full transaction list, in mined order.
#[derive(Debug, Clone, Default)]
pub struct ObservedBlock {
    pub number: u64,
    /// Seconds since the Unix epoch.
    pub timestamp: u64,
    pub transactions: Vec<ObservedTx>,
}

/// A mined transaction as seen by the monitor.
#[derive(Debug, Clone)]
pub struct ObservedTx {
    pub hash: B256,
    pub from: Address,
    /// `None` for contract creations.
    pub to: Option<Address>,
    /// Attached value in wei.
    pub value: U256,
    pub input: Bytes,
}

impl ObservedTx {
    /// Whether this transaction was sent to `target`.
    pub fn is_addressed_to(&self, target: Address) -> bool {
        self.to == Some(target)
    }
}

/// A single log emitted during a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    /// Emitting contract.
    pub address: Address,
    /// Topic hashes; the first identifies the event type.
    pub topics: Vec<B256>,
    pub transaction_hash: Option<B256>,
    pub block_number: Option<u64>,
}

impl LogEntry {
    /// First topic, if any.
    pub fn signature(&self) -> Option<B256> {
        self.topics.first().copied()
    }
}

/// The parts of a transaction receipt the engine cares about.
#[derive(Debug, Clone, Default)]
pub struct ReceiptLogs {
    /// Logs in emission order.
    pub logs: Vec<LogEntry>,
}

/// Historical log query, mirroring `eth_getLogs`.
#[derive(Debug, Clone)]
pub struct LogQuery {
    pub from_block: u64,
    /// `None` means latest.
    pub to_block: Option<u64>,
    pub address: Option<Address>,
    /// Positional topic filters; `None` is a wildcard.
    pub topics: Vec<Option<B256>>,
}

// ---------------------------------------------------------------------------
// Trades
// ---------------------------------------------------------------------------

/// A confirmed buy or sell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TradeFill {
    pub tx_hash: B256,
    pub block_number: u64,
    pub gas_used: u64,
    pub effective_gas_price: u128,
}

impl TradeFill {
    /// Total gas paid in wei.
    pub fn gas_paid(&self) -> U256 {
        U256::from(self.gas_used) * U256::from(self.effective_gas_price)
    }
}

impl fmt::Display for TradeFill {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} in block {} (gas paid {} ETH)",
            self.tx_hash,
            self.block_number,
            format_eth(self.gas_paid()),
        )
    }
}

/// Which Wow entry point a transaction called.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TradeSide {
    Buy,
    Sell,
}

impl fmt::Display for TradeSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeSide::Buy => write!(f, "BUY"),
            TradeSide::Sell => write!(f, "SELL"),
        }
    }
}

/// Pricing regime of a Wow token, as reported by `marketType()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MarketType {
    BondingCurve,
    UniswapPool,
}

impl MarketType {
    /// Map the on-chain enum value (0 = bonding curve).
    pub fn from_raw(raw: u8) -> Self {
        if raw == 0 {
            MarketType::BondingCurve
        } else {
            MarketType::UniswapPool
        }
    }
}

impl fmt::Display for MarketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarketType::BondingCurve => write!(f, "BONDING_CURVE"),
            MarketType::UniswapPool => write!(f, "UNISWAP_POOL"),
        }
    }
}

// ---------------------------------------------------------------------------
// Persisted records
// ---------------------------------------------------------------------------

/// Classification tag of a persisted transaction record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    Info,
    Buy,
    Sell,
}

impl RecordKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordKind::Info => "info",
            RecordKind::Buy => "buy",
            RecordKind::Sell => "sell",
        }
    }
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RecordKind {
    type Err = SniperError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "info" => Ok(RecordKind::Info),
            "buy" => Ok(RecordKind::Buy),
            "sell" => Ok(RecordKind::Sell),
            other => Err(SniperError::Storage(format!("unknown record type: {other}"))),
        }
    }
}

/// A row of the `transactions` table. Never mutated after insert.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
    pub block_number: u64,
    /// Amount in ether, as decimal text.
    pub tx_amount: String,
    pub tx_hash: String,
    pub token_address: Option<String>,
    pub kind: RecordKind,
}

impl TransactionRecord {
    /// An `info` record for a transaction seen at the tracked contract.
    pub fn observed(block_number: u64, tx: &ObservedTx) -> Self {
        Self {
            block_number,
            tx_amount: format_eth(tx.value),
            tx_hash: tx.hash.to_string(),
            token_address: None,
            kind: RecordKind::Info,
        }
    }

    /// A `buy` or `sell` record for one of our own confirmed trades.
    pub fn trade(kind: RecordKind, fill: &TradeFill, amount: U256, token: Address) -> Self {
        Self {
            block_number: fill.block_number,
            tx_amount: format_eth(amount),
            tx_hash: fill.tx_hash.to_string(),
            token_address: Some(token.to_string()),
            kind,
        }
    }
}

/// A record read back from the store, with its row id.
#[derive(Debug, Clone, Serialize)]
pub struct StoredRecord {
    pub id: i64,
    #[serde(flatten)]
    pub record: TransactionRecord,
}

// ---------------------------------------------------------------------------
// Amount helpers
// ---------------------------------------------------------------------------

/// Format a wei amount as ether with trailing zeros trimmed ("0.5", "2.0").
pub fn format_eth(wei: U256) -> String {
    let full = format_ether(wei);
    match full.trim_end_matches('0') {
        trimmed if trimmed.ends_with('.') => format!("{trimmed}0"),
        trimmed => trimmed.to_string(),
    }
}

/// Parse a decimal ether string ("0.00012") into wei.
pub fn parse_eth(amount: &str) -> Result<U256, SniperError> {
    parse_ether(amount.trim())
        .map_err(|e| SniperError::Config(format!("invalid ether amount '{amount}': {e}")))
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain-specific error types for WOWSNIPER.
#[derive(Debug, thiserror::Error)]
pub enum SniperError {
    #[error("Ledger error ({operation}): {message}")]
    Ledger { operation: String, message: String },

    #[error("Trade error ({token}): {message}")]
    Trade { token: Address, message: String },

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl SniperError {
    pub fn ledger(operation: &str, err: impl fmt::Display) -> Self {
        SniperError::Ledger {
            operation: operation.to_string(),
            message: err.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
