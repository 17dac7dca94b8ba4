//! Block monitor: the subscribe → filter → record → correlate → buy loop.
//!
//! New heights from the node subscription are pushed into a bounded queue
//! and consumed by a single worker, so blocks are handled one at a time in
//! arrival order and two slow blocks can never race each other into a
//! duplicate buy. Inside a block, transactions are handled sequentially,
//! each behind its own error boundary.

use std::collections::{HashSet, VecDeque};
use std::future::Future;
use std::sync::Arc;

use alloy::primitives::{Address, B256};
use anyhow::{Context, Result};
use futures::StreamExt;
use serde::Serialize;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, error, info, warn};

use crate::config::Policy;
use crate::engine::correlator::find_transfer_token;
use crate::engine::executor::TradeExecutor;
use crate::ledger::LedgerClient;
use crate::storage::TransactionStore;
use crate::types::{format_eth, ObservedTx, TradeFill, TransactionRecord};

/// How many tracked transaction hashes are remembered for re-delivery checks.
const SEEN_CAPACITY: usize = 10_000;

// ---------------------------------------------------------------------------
// Stats & outcomes
// ---------------------------------------------------------------------------

/// Running counters, shared with the status API.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MonitorStats {
    pub last_height: Option<u64>,
    pub blocks_processed: u64,
    pub blocks_failed: u64,
    pub blocks_backfilled: u64,
    pub heights_skipped: u64,
    pub txs_matched: u64,
    pub txs_failed: u64,
    pub records_written: u64,
    pub record_failures: u64,
    pub below_threshold: u64,
    pub no_token: u64,
    pub buys_disabled: u64,
    pub buys_attempted: u64,
    pub buys_succeeded: u64,
    pub buys_failed: u64,
}

pub type SharedStats = Arc<RwLock<MonitorStats>>;

/// What happened to one transaction addressed to the tracked contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxOutcome {
    /// Already handled when this height was delivered before.
    AlreadySeen,
    ZeroValue,
    BelowThreshold,
    /// Qualifying value, but the node returned no receipt.
    NoReceipt,
    /// Qualifying value, no Transfer log to take a token from.
    NoToken,
    /// Token found, buying switched off.
    BuyDisabled { token: Address },
    Bought { token: Address, fill: TradeFill },
    BuyFailed { token: Address },
}

/// Per-block tally returned by `process_block`.
#[derive(Debug, Clone, Default)]
pub struct BlockSummary {
    pub height: u64,
    pub transactions: usize,
    pub outcomes: Vec<(B256, TxOutcome)>,
    pub failed: usize,
}

// ---------------------------------------------------------------------------
// Re-delivery guard
// ---------------------------------------------------------------------------

/// Bounded FIFO set of transaction hashes.
struct SeenTransactions {
    order: VecDeque<B256>,
    set: HashSet<B256>,
    capacity: usize,
}

impl SeenTransactions {
    fn new(capacity: usize) -> Self {
        Self {
            order: VecDeque::with_capacity(capacity),
            set: HashSet::with_capacity(capacity),
            capacity,
        }
    }

    /// Returns false if `hash` was already present.
    fn insert(&mut self, hash: B256) -> bool {
        if !self.set.insert(hash) {
            return false;
        }
        self.order.push_back(hash);
        if self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.set.remove(&oldest);
            }
        }
        true
    }
}

// ---------------------------------------------------------------------------
// Monitor
// ---------------------------------------------------------------------------

pub struct Monitor {
    ledger: Arc<dyn LedgerClient>,
    store: Arc<dyn TransactionStore>,
    executor: Arc<TradeExecutor>,
    policy: Policy,
    stats: SharedStats,
    seen: SeenTransactions,
}

impl Monitor {
    pub fn new(
        ledger: Arc<dyn LedgerClient>,
        store: Arc<dyn TransactionStore>,
        executor: Arc<TradeExecutor>,
        policy: Policy,
    ) -> Self {
        Self {
            ledger,
            store,
            executor,
            policy,
            stats: Arc::new(RwLock::new(MonitorStats::default())),
            seen: SeenTransactions::new(SEEN_CAPACITY),
        }
    }

    /// Handle for reading counters while the monitor runs.
    pub fn stats(&self) -> SharedStats {
        Arc::clone(&self.stats)
    }

    /// Subscribe to new heads and process blocks until `shutdown` resolves
    /// or the subscription ends. Heights already queued are drained before
    /// returning.
    pub async fn run_until<F>(self, capacity: usize, shutdown: F) -> Result<MonitorStats>
    where
        F: Future<Output = ()>,
    {
        let ledger = Arc::clone(&self.ledger);
        let (queue, heights) = mpsc::channel(capacity.max(1));
        let worker = tokio::spawn(self.run(heights));

        let fed = forward_heights(ledger.as_ref(), queue, shutdown).await;
        let stats = worker.await.context("Monitor worker panicked")?;
        fed?;
        Ok(stats)
    }

    /// Consume heights until the queue closes.
    pub async fn run(mut self, mut heights: mpsc::Receiver<u64>) -> MonitorStats {
        info!(
            contract = %self.policy.tracked_contract,
            min_value = %format_eth(self.policy.min_value),
            buy_value = %format_eth(self.policy.buy_value),
            buy_enabled = self.policy.buy_enabled,
            "Monitor started"
        );

        while let Some(height) = heights.recv().await {
            self.on_height(height).await;
        }

        let stats = self.stats.read().await.clone();
        info!(
            blocks = stats.blocks_processed,
            matched = stats.txs_matched,
            buys = stats.buys_succeeded,
            "Block queue drained, monitor stopped"
        );
        stats
    }

    /// Process a newly announced height, filling in any missed heights first.
    pub async fn on_height(&mut self, height: u64) {
        let last = self.stats.read().await.last_height;

        if let Some(last) = last {
            if height > last + 1 {
                let missed = height - last - 1;
                let from = if missed > self.policy.max_backfill {
                    let skipped = missed - self.policy.max_backfill;
                    warn!(last, height, skipped, "Height gap larger than backfill limit");
                    self.stats.write().await.heights_skipped += skipped;
                    height - self.policy.max_backfill
                } else {
                    last + 1
                };
                for missed_height in from..height {
                    info!(block = missed_height, "Backfilling missed block");
                    self.process_block(missed_height).await;
                    self.stats.write().await.blocks_backfilled += 1;
                }
            } else if height <= last {
                debug!(block = height, last, "Height re-delivered");
            }
        }

        self.process_block(height).await;

        let mut stats = self.stats.write().await;
        stats.last_height = Some(stats.last_height.map_or(height, |l| l.max(height)));
    }

    /// Fetch one block and run every transaction through the policy.
    /// Never fails: fetch errors abandon the block, transaction errors
    /// abandon only that transaction.
    pub async fn process_block(&mut self, height: u64) -> BlockSummary {
        info!(block = height, "New block detected");
        let mut summary = BlockSummary {
            height,
            ..Default::default()
        };

        let block = match self.ledger.block_with_transactions(height).await {
            Ok(Some(block)) => block,
            Ok(None) => {
                warn!(block = height, "Block not found");
                self.stats.write().await.blocks_failed += 1;
                return summary;
            }
            Err(e) => {
                error!(block = height, error = %e, "Failed to fetch block");
                self.stats.write().await.blocks_failed += 1;
                return summary;
            }
        };
        summary.transactions = block.transactions.len();

        for tx in &block.transactions {
            if !tx.is_addressed_to(self.policy.tracked_contract) {
                continue;
            }

            let outcome = if self.seen.insert(tx.hash) {
                self.stats.write().await.txs_matched += 1;
                match self.process_transaction(height, tx).await {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        warn!(block = height, tx = %tx.hash, error = %format!("{e:#}"), "Transaction abandoned");
                        self.stats.write().await.txs_failed += 1;
                        summary.failed += 1;
                        continue;
                    }
                }
            } else {
                debug!(block = height, tx = %tx.hash, "Transaction already handled");
                TxOutcome::AlreadySeen
            };
            summary.outcomes.push((tx.hash, outcome));
        }

        self.stats.write().await.blocks_processed += 1;
        summary
    }

    async fn process_transaction(&self, height: u64, tx: &ObservedTx) -> Result<TxOutcome> {
        info!(block = height, tx = %tx.hash, from = %tx.from, "Transaction to contract detected");

        if tx.value.is_zero() {
            debug!(block = height, tx = %tx.hash, "Transaction amount is 0.0 ETH, skipping");
            return Ok(TxOutcome::ZeroValue);
        }

        let amount = format_eth(tx.value);
        info!(block = height, tx = %tx.hash, amount = %amount, "Transaction amount");

        // Recorded before correlation so every paying transaction is kept,
        // whatever happens next.
        match self.store.insert(&TransactionRecord::observed(height, tx)).await {
            Ok(_) => self.stats.write().await.records_written += 1,
            Err(e) => {
                warn!(block = height, tx = %tx.hash, error = %e, "Failed to persist transaction record");
                self.stats.write().await.record_failures += 1;
            }
        }

        if tx.value < self.policy.min_value {
            info!(
                block = height,
                tx = %tx.hash,
                amount = %amount,
                threshold = %format_eth(self.policy.min_value),
                "Transaction amount below threshold, skipping"
            );
            self.stats.write().await.below_threshold += 1;
            return Ok(TxOutcome::BelowThreshold);
        }

        info!(block = height, tx = %tx.hash, amount = %amount, "Transaction amount meets threshold");

        let receipt = self
            .ledger
            .transaction_receipt(tx.hash)
            .await
            .with_context(|| format!("Failed to fetch receipt for {}", tx.hash))?;
        let Some(receipt) = receipt else {
            warn!(block = height, tx = %tx.hash, "Receipt not available");
            return Ok(TxOutcome::NoReceipt);
        };

        let Some(token) = find_transfer_token(&receipt.logs) else {
            info!(block = height, tx = %tx.hash, amount = %amount, "Qualifying transaction has no transfer event");
            self.stats.write().await.no_token += 1;
            return Ok(TxOutcome::NoToken);
        };
        info!(block = height, tx = %tx.hash, token = %token, "Transfer event found");

        if !self.policy.buy_enabled {
            info!(block = height, token = %token, "Buying disabled, not buying");
            self.stats.write().await.buys_disabled += 1;
            return Ok(TxOutcome::BuyDisabled { token });
        }

        self.stats.write().await.buys_attempted += 1;
        match self.executor.buy(token, self.policy.buy_value).await {
            Ok(fill) => {
                info!(block = height, token = %token, buy_tx = %fill.tx_hash, "Bought token");
                self.stats.write().await.buys_succeeded += 1;
                Ok(TxOutcome::Bought { token, fill })
            }
            Err(e) => {
                error!(block = height, token = %token, error = %format!("{e:#}"), "Buy failed");
                self.stats.write().await.buys_failed += 1;
                Ok(TxOutcome::BuyFailed { token })
            }
        }
    }
}

/// Push subscription heights into `queue` until `shutdown` resolves or the
/// subscription ends. Dropping `queue` on return lets the worker drain.
///
/// Shutdown wins over a pending head and over a full queue, so a stalled
/// worker never holds up Ctrl+C.
pub async fn forward_heights<F>(
    ledger: &dyn LedgerClient,
    queue: mpsc::Sender<u64>,
    shutdown: F,
) -> Result<()>
where
    F: Future<Output = ()>,
{
    let mut heads = ledger
        .subscribe_heights()
        .await
        .context("Failed to subscribe to new blocks")?;
    info!("Subscribed to new blocks");

    tokio::pin!(shutdown);
    loop {
        let height = tokio::select! {
            biased;
            _ = &mut shutdown => {
                info!("Shutdown requested, no longer accepting blocks");
                break;
            }
            next = heads.next() => match next {
                Some(height) => height,
                None => {
                    warn!("Block subscription ended");
                    break;
                }
            },
        };

        tokio::select! {
            biased;
            _ = &mut shutdown => {
                warn!(block = height, "Shutdown requested before block was queued, dropping block");
                break;
            }
            sent = queue.send(height) => {
                if sent.is_err() {
                    warn!("Block queue closed, stopping feed");
                    break;
                }
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
