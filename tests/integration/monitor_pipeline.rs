//! End-to-end runs of the monitor against the mock chain and a real
//! SQLite store.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use alloy::primitives::{address, Address, U256};
use futures::stream::{self, StreamExt};
use tokio::sync::oneshot;

use wowsniper::config::Policy;
use wowsniper::engine::executor::TradeExecutor;
use wowsniper::engine::monitor::{Monitor, MonitorStats};
use wowsniper::storage::{SqliteStore, TransactionStore};
use wowsniper::types::{RecordKind, StoredRecord, WEI_PER_ETH};

use crate::mock_ledger::{tx, MockChain};

const CONTRACT: Address = address!("997020e5f59ccb79c74d527be492cc610cb9fa2b");
const WALLET: Address = address!("00000000000000000000000000000000000000f1");
const TOKEN_A: Address = address!("aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa");
const TOKEN_B: Address = address!("bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb");

fn min_value() -> U256 {
    U256::from(WEI_PER_ETH / 2)
}

fn buy_value() -> U256 {
    U256::from(120_000_000_000_000u128)
}

fn policy(buy_enabled: bool) -> Policy {
    Policy {
        tracked_contract: CONTRACT,
        min_value: min_value(),
        buy_value: buy_value(),
        buy_enabled,
        max_backfill: 16,
        confirmation_timeout: Duration::from_secs(5),
    }
}

fn temp_db() -> PathBuf {
    let mut p = std::env::temp_dir();
    p.push(format!("wowsniper_it_{}.db", uuid::Uuid::new_v4()));
    p
}

/// Run the monitor over every height the chain announces and return the
/// final stats with the stored records, oldest first.
async fn run(chain: Arc<MockChain>, policy: Policy) -> (MonitorStats, Vec<StoredRecord>) {
    let path = temp_db();
    let store = Arc::new(SqliteStore::open(&path).await.unwrap());

    let executor = Arc::new(TradeExecutor::new(
        chain.clone(),
        store.clone(),
        policy.confirmation_timeout,
    ));
    let monitor = Monitor::new(chain.clone(), store.clone(), executor, policy);
    let stats = monitor
        .run_until(8, std::future::pending::<()>())
        .await
        .unwrap();

    let mut records = store.recent(100).await.unwrap();
    records.reverse();

    store.close().await;
    let _ = std::fs::remove_file(&path);
    (stats, records)
}

fn kinds(records: &[StoredRecord]) -> Vec<RecordKind> {
    records.iter().map(|r| r.record.kind).collect()
}

#[tokio::test]
async fn test_qualifying_transaction_triggers_single_buy() {
    let chain = Arc::new(MockChain::new(WALLET, vec![100]));
    let qualifying = tx(0x01, CONTRACT, min_value() * U256::from(2u64));
    chain.add_transfer_receipt(qualifying.hash, 100, &[TOKEN_A]);
    chain.add_block(100, vec![qualifying.clone()]);

    let (stats, records) = run(chain.clone(), policy(true)).await;

    let buys = chain.buys();
    assert_eq!(buys.len(), 1);
    assert_eq!(buys[0].0, TOKEN_A);
    assert_eq!(buys[0].1.value, buy_value());
    assert_eq!(buys[0].1.recipient, WALLET);

    assert_eq!(kinds(&records), vec![RecordKind::Info, RecordKind::Buy]);
    assert_eq!(records[0].record.block_number, 100);
    assert_eq!(records[0].record.tx_amount, "1.0");
    assert_eq!(records[0].record.tx_hash, qualifying.hash.to_string());
    assert!(records[0].record.token_address.is_none());
    assert_eq!(records[1].record.tx_amount, "0.00012");
    assert_eq!(records[1].record.token_address, Some(TOKEN_A.to_string()));
    assert_eq!(records[1].record.block_number, 101);

    assert_eq!(stats.last_height, Some(100));
    assert_eq!(stats.buys_succeeded, 1);
}

#[tokio::test]
async fn test_filtering_by_recipient_value_and_threshold() {
    let chain = Arc::new(MockChain::new(WALLET, vec![200]));
    let elsewhere = tx(0x01, Address::repeat_byte(0x42), U256::from(5 * WEI_PER_ETH));
    let zero = tx(0x02, CONTRACT, U256::ZERO);
    let small = tx(0x03, CONTRACT, U256::from(WEI_PER_ETH / 100));
    let no_transfer = tx(0x04, CONTRACT, U256::from(WEI_PER_ETH));
    chain.add_transfer_receipt(small.hash, 200, &[TOKEN_A]);
    chain.add_receipt(no_transfer.hash, Vec::new());
    chain.add_block(200, vec![elsewhere, zero, small.clone(), no_transfer.clone()]);

    let (stats, records) = run(chain.clone(), policy(true)).await;

    assert!(chain.buys().is_empty());
    assert_eq!(kinds(&records), vec![RecordKind::Info, RecordKind::Info]);
    assert_eq!(records[0].record.tx_hash, small.hash.to_string());
    assert_eq!(records[0].record.tx_amount, "0.01");
    assert_eq!(records[1].record.tx_hash, no_transfer.hash.to_string());

    assert_eq!(stats.txs_matched, 3);
    assert_eq!(stats.below_threshold, 1);
    assert_eq!(stats.no_token, 1);
}

#[tokio::test]
async fn test_threshold_is_inclusive() {
    let chain = Arc::new(MockChain::new(WALLET, vec![300]));
    let exact = tx(0x05, CONTRACT, min_value());
    chain.add_transfer_receipt(exact.hash, 300, &[TOKEN_B]);
    chain.add_block(300, vec![exact]);

    let (_, records) = run(chain.clone(), policy(true)).await;

    assert_eq!(chain.buys().len(), 1);
    assert_eq!(kinds(&records), vec![RecordKind::Info, RecordKind::Buy]);
}

#[tokio::test]
async fn test_first_of_several_transfer_logs_wins() {
    let chain = Arc::new(MockChain::new(WALLET, vec![400]));
    let qualifying = tx(0x06, CONTRACT, U256::from(WEI_PER_ETH));
    chain.add_transfer_receipt(qualifying.hash, 400, &[TOKEN_B, TOKEN_A]);
    chain.add_block(400, vec![qualifying]);

    run(chain.clone(), policy(true)).await;

    let buys = chain.buys();
    assert_eq!(buys.len(), 1);
    assert_eq!(buys[0].0, TOKEN_B);
}

#[tokio::test]
async fn test_failed_buy_does_not_stop_next_transaction() {
    let chain = Arc::new(MockChain::new(WALLET, vec![500]));
    let first = tx(0x07, CONTRACT, U256::from(WEI_PER_ETH));
    let second = tx(0x08, CONTRACT, U256::from(WEI_PER_ETH));
    chain.add_transfer_receipt(first.hash, 500, &[TOKEN_A]);
    chain.add_transfer_receipt(second.hash, 500, &[TOKEN_B]);
    chain.revert_buys_of(TOKEN_A);
    chain.add_block(500, vec![first, second]);

    let (stats, records) = run(chain.clone(), policy(true)).await;

    let tokens: Vec<_> = chain.buys().iter().map(|(t, _)| *t).collect();
    assert_eq!(tokens, vec![TOKEN_A, TOKEN_B]);
    assert_eq!(
        kinds(&records),
        vec![RecordKind::Info, RecordKind::Info, RecordKind::Buy]
    );
    assert_eq!(records[2].record.token_address, Some(TOKEN_B.to_string()));
    assert_eq!(stats.buys_failed, 1);
    assert_eq!(stats.buys_succeeded, 1);
}

#[tokio::test]
async fn test_buy_disabled_only_records() {
    let chain = Arc::new(MockChain::new(WALLET, vec![600]));
    let qualifying = tx(0x09, CONTRACT, U256::from(3 * WEI_PER_ETH));
    chain.add_transfer_receipt(qualifying.hash, 600, &[TOKEN_A]);
    chain.add_block(600, vec![qualifying]);

    let (stats, records) = run(chain.clone(), policy(false)).await;

    assert!(chain.buys().is_empty());
    assert_eq!(kinds(&records), vec![RecordKind::Info]);
    assert_eq!(stats.buys_disabled, 1);
    assert_eq!(stats.buys_attempted, 0);
}

#[tokio::test]
async fn test_redelivered_height_is_not_bought_twice() {
    let chain = Arc::new(MockChain::new(WALLET, vec![700, 700]));
    let qualifying = tx(0x0a, CONTRACT, U256::from(WEI_PER_ETH));
    chain.add_transfer_receipt(qualifying.hash, 700, &[TOKEN_A]);
    chain.add_block(700, vec![qualifying]);

    let (stats, records) = run(chain.clone(), policy(true)).await;

    assert_eq!(chain.buys().len(), 1);
    assert_eq!(kinds(&records), vec![RecordKind::Info, RecordKind::Buy]);
    assert_eq!(stats.blocks_processed, 2);
    assert_eq!(stats.txs_matched, 1);
}

#[tokio::test]
async fn test_missed_heights_are_backfilled_in_order() {
    let chain = Arc::new(MockChain::new(WALLET, vec![800, 803]));
    let missed = tx(0x0b, CONTRACT, U256::from(WEI_PER_ETH));
    chain.add_transfer_receipt(missed.hash, 802, &[TOKEN_A]);
    chain.add_block(802, vec![missed]);

    let (stats, records) = run(chain.clone(), policy(true)).await;

    assert_eq!(chain.block_requests(), vec![800, 801, 802, 803]);
    assert_eq!(stats.blocks_backfilled, 2);
    assert_eq!(stats.last_height, Some(803));
    assert_eq!(chain.buys().len(), 1);
    assert_eq!(records[0].record.block_number, 802);
}

#[tokio::test]
async fn test_empty_subscription_returns_empty_stats() {
    let chain = Arc::new(MockChain::new(WALLET, Vec::new()));
    let (stats, records) = run(chain.clone(), policy(true)).await;

    assert!(records.is_empty());
    assert_eq!(stats.blocks_processed, 0);
    assert_eq!(stats.last_height, None);
    assert!(chain.block_requests().is_empty());
}

#[tokio::test]
async fn test_shutdown_drains_queued_heights_and_ignores_later_ones() {
    let chain = Arc::new(MockChain::new(WALLET, Vec::new()));
    let qualifying = tx(0x0c, CONTRACT, U256::from(WEI_PER_ETH));
    chain.add_transfer_receipt(qualifying.hash, 101, &[TOKEN_A]);
    chain.add_block(101, vec![qualifying]);

    // 102 is only announced once shutdown has fired; after that the
    // subscription stays open forever.
    let (late_tx, late_rx) = oneshot::channel::<()>();
    chain.set_subscription(
        stream::iter(vec![100, 101])
            .chain(stream::once(async move {
                let _ = late_rx.await;
                102
            }))
            .chain(stream::pending())
            .boxed(),
    );

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let watcher = {
        let chain = chain.clone();
        tokio::spawn(async move {
            while chain.block_requests().len() < 2 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            let _ = stop_tx.send(());
            let _ = late_tx.send(());
        })
    };

    let path = temp_db();
    let store = Arc::new(SqliteStore::open(&path).await.unwrap());
    let executor = Arc::new(TradeExecutor::new(chain.clone(), store.clone(), Duration::from_secs(5)));
    let monitor = Monitor::new(chain.clone(), store.clone(), executor, policy(true));

    let shutdown = async {
        let _ = stop_rx.await;
    };
    let stats = tokio::time::timeout(Duration::from_secs(5), monitor.run_until(8, shutdown))
        .await
        .expect("monitor did not stop after shutdown")
        .unwrap();
    watcher.await.unwrap();

    assert_eq!(chain.block_requests(), vec![100, 101]);
    assert_eq!(stats.blocks_processed, 2);
    assert_eq!(stats.last_height, Some(101));
    assert_eq!(chain.buys().len(), 1);

    let mut records = store.recent(10).await.unwrap();
    records.reverse();
    assert_eq!(kinds(&records), vec![RecordKind::Info, RecordKind::Buy]);

    store.close().await;
    let _ = std::fs::remove_file(&path);
}
