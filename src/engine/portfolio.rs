//! Portfolio reporting for the `info` command.
//!
//! Reconstructs how much ETH the wallet spent on each token from its own
//! Transfer history, then values the current balance on the bonding curve.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;

use alloy::primitives::{Address, B256, U256};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tracing::{debug, error, info};

use crate::engine::correlator::TRANSFER_EVENT_SIGNATURE;
use crate::ledger::alloy_ledger::decode_trade_call;
use crate::ledger::{LedgerClient, TokenMarket};
use crate::types::{format_eth, LogQuery, MarketType, TradeSide};

/// Most recent Transfer-emitting transaction on a token.
#[derive(Debug, Clone, PartialEq)]
pub struct LastActivity {
    pub tx_hash: B256,
    /// `None` when the call was not a Wow `buy`/`sell` (a plain transfer,
    /// a router swap).
    pub side: Option<TradeSide>,
    pub at: Option<DateTime<Utc>>,
}

impl fmt::Display for LastActivity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.side {
            Some(side) => write!(f, "[{side}]")?,
            None => write!(f, "[OTHER]")?,
        }
        match self.at {
            Some(at) => write!(f, " {}", at.format("%Y-%m-%d %H:%M:%S UTC")),
            None => write!(f, " {}", self.tx_hash),
        }
    }
}

/// Snapshot of one held token.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenPosition {
    pub token: Address,
    pub name: String,
    pub balance: U256,
    pub market_type: MarketType,
    /// ETH spent buying this token, in wei.
    pub spent: U256,
    /// Bonding-curve sell quote for the whole balance, in wei.
    pub worth: Option<U256>,
    pub diff_pct: Option<Decimal>,
    /// Filled in separately by `last_activity`.
    pub last_activity: Option<LastActivity>,
}

impl fmt::Display for TokenPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.name)?;
        writeln!(f, "  Address {}", self.token)?;
        writeln!(f, "  Balance {}", format_eth(self.balance))?;
        writeln!(f, "  Type    {}", self.market_type)?;
        if let Some(last) = &self.last_activity {
            writeln!(f, "  Lastx   {last}")?;
        }
        write!(f, "  Spent   {} ETH", format_eth(self.spent))?;
        match (self.worth, self.diff_pct) {
            (Some(worth), diff) => {
                write!(f, "\n  Worth   {} ETH", format_eth(worth))?;
                if let Some(diff) = diff {
                    write!(f, "\n  Diff    {}%", diff.normalize())?;
                }
            }
            (None, _) if self.balance.is_zero() => write!(f, "\n  No tokens to calculate worth")?,
            (None, _) => write!(f, "\n  Worth   n/a ({})", self.market_type)?,
        }
        Ok(())
    }
}

/// ETH the wallet spent on each of `contracts` since `from_block`.
///
/// Every contract is present in the result, zero when nothing was spent.
/// A failed lookup is logged and yields an empty map.
pub async fn total_spent(
    ledger: &dyn LedgerClient,
    wallet: Address,
    contracts: &[Address],
    from_block: u64,
) -> HashMap<Address, U256> {
    match spent_by_contract(ledger, wallet, contracts, from_block).await {
        Ok(spent) => spent,
        Err(e) => {
            error!(wallet = %wallet, error = %format!("{e:#}"), "Failed to compute total spent");
            HashMap::new()
        }
    }
}

async fn spent_by_contract(
    ledger: &dyn LedgerClient,
    wallet: Address,
    contracts: &[Address],
    from_block: u64,
) -> Result<HashMap<Address, U256>> {
    let query = LogQuery {
        from_block,
        to_block: None,
        address: None,
        topics: vec![Some(TRANSFER_EVENT_SIGNATURE), None, Some(wallet.into_word())],
    };
    let logs = ledger.logs(&query).await.context("Transfer log query failed")?;

    // A buy can emit several transfers to us; count its value once.
    let mut seen = HashSet::new();
    let hashes: Vec<B256> = logs
        .iter()
        .filter_map(|log| log.transaction_hash)
        .filter(|hash| seen.insert(*hash))
        .collect();
    debug!(logs = logs.len(), transactions = hashes.len(), "Inbound transfers found");

    let transactions = try_join_all(hashes.iter().map(|hash| ledger.transaction(*hash)))
        .await
        .context("Failed to fetch transfer transactions")?;

    let mut spent: HashMap<Address, U256> =
        contracts.iter().map(|contract| (*contract, U256::ZERO)).collect();
    for tx in transactions.into_iter().flatten() {
        let Some(to) = tx.to else { continue };
        if let Some(total) = spent.get_mut(&to) {
            *total += tx.value;
        }
    }
    Ok(spent)
}

/// Read balance, name and market of `token` and value it against `spent`.
pub async fn position(market: &dyn TokenMarket, token: Address, spent: U256) -> Result<TokenPosition> {
    let (name, balance, market_type) = tokio::try_join!(
        market.token_name(token),
        market.balance_of(token, market.wallet()),
        market.market_type(token),
    )
    .with_context(|| format!("Failed to read token {token}"))?;

    let worth = if !balance.is_zero() && market_type == MarketType::BondingCurve {
        Some(
            market
                .sell_quote(token, balance)
                .await
                .with_context(|| format!("Failed to quote {token}"))?,
        )
    } else {
        None
    };
    let diff_pct = worth.and_then(|worth| diff_pct(spent, worth));

    info!(token = %token, name = %name, balance = %format_eth(balance), market = %market_type, "Position read");
    Ok(TokenPosition {
        token,
        name,
        balance,
        market_type,
        spent,
        worth,
        diff_pct,
        last_activity: None,
    })
}

/// The latest Transfer on `token` since `from_block`: which entry point the
/// transaction called and when its block was mined.
///
/// `None` when the token has no transfers in range.
pub async fn last_activity(
    ledger: &dyn LedgerClient,
    token: Address,
    from_block: u64,
) -> Result<Option<LastActivity>> {
    let query = LogQuery {
        from_block,
        to_block: None,
        address: Some(token),
        topics: vec![Some(TRANSFER_EVENT_SIGNATURE)],
    };
    let logs = ledger
        .logs(&query)
        .await
        .with_context(|| format!("Transfer log query failed for {token}"))?;
    let latest = logs
        .iter()
        .rev()
        .find_map(|log| log.transaction_hash.map(|hash| (hash, log.block_number)));
    let Some((tx_hash, mined_in)) = latest else {
        return Ok(None);
    };

    let side = ledger
        .transaction(tx_hash)
        .await
        .with_context(|| format!("Failed to fetch transaction {tx_hash}"))?
        .and_then(|tx| decode_trade_call(&tx.input));

    let at = match mined_in {
        Some(height) => ledger
            .block_with_transactions(height)
            .await
            .with_context(|| format!("Failed to fetch block {height}"))?
            .and_then(|block| i64::try_from(block.timestamp).ok())
            .and_then(|secs| DateTime::from_timestamp(secs, 0)),
        None => None,
    };

    debug!(token = %token, tx = %tx_hash, side = ?side, "Last activity found");
    Ok(Some(LastActivity { tx_hash, side, at }))
}

/// Percentage gain of `worth` over `spent`, two decimal places.
/// `None` when nothing was spent.
pub fn diff_pct(spent: U256, worth: U256) -> Option<Decimal> {
    if spent.is_zero() {
        return None;
    }
    let spent = to_decimal(spent)?;
    let worth = to_decimal(worth)?;
    Some(((worth - spent) * dec!(100) / spent).round_dp(2))
}

/// Wei to ether as a `Decimal`; `None` past `Decimal`'s range.
fn to_decimal(wei: U256) -> Option<Decimal> {
    Decimal::from_str(&format_eth(wei)).ok()
}
