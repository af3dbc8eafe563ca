//! End-to-end maturation scenarios against a scripted node: orphan
//! classification, late-fork re-maturation with height rewrite, and the
//! fee split on a matured era-v2 block.

mod common;

use num_bigint::BigUint;
use std::sync::Arc;

use common::{block_at, MockNode};
use sero_pool::address::encode_base58;
use sero_pool::config::{Config, UnlockerConfig};
use sero_pool::constants::chain;
use sero_pool::storage::{LedgerStore, MemoryLedger, Shares};
use sero_pool::types::BlockData;
use sero_pool::unlocker::BlockUnlocker;

fn unlocker_config() -> UnlockerConfig {
    // depth 120 / immature depth 30 / pool fee 1%
    Config::default().unlocker
}

fn candidate(round_height: u64, nonce: &str, difficulty: u64) -> BlockData {
    BlockData {
        round_height,
        height: round_height,
        nonce: nonce.to_string(),
        hash: String::new(),
        timestamp: 0,
        difficulty,
        total_shares: 100,
        orphan: false,
        reward: BigUint::from(0u8),
        extra_reward: None,
    }
}

#[tokio::test]
async fn candidate_without_canonical_match_is_orphaned() {
    let store = MemoryLedger::shared();
    store.put_candidate(candidate(1000, "0xabc", 1_000)).await;

    // Every block in the probe window 984..=1015 carries a foreign nonce.
    let node = MockNode::with_state(|state| {
        state.pending_height = 1100;
        MockNode::fill_canonical(state, 984, 1015);
    });

    let mut unlocker =
        BlockUnlocker::new(&unlocker_config(), store.clone(), node.clone()).unwrap();
    unlocker.unlock_pending_blocks().await;

    assert!(!unlocker.halted());
    let orphans = store.pending_orphan_blocks().await;
    assert_eq!(orphans.len(), 1);
    assert!(orphans[0].orphan);
    assert_eq!(orphans[0].nonce, "0xabc");
    assert_eq!(store.candidate_count().await, 0);
    assert!(store.immature_blocks_all().await.is_empty());
}

#[tokio::test]
async fn immature_block_rematures_at_shifted_height_via_hash() {
    let store = MemoryLedger::shared();

    // An immature record from a previous pass: hash already canonical,
    // height recorded as 1000.
    let mut immature = candidate(1000, "0xn1", 1_000);
    immature.hash = "0xdeadbeef".to_string();
    store
        .write_immature_block(&immature, &Default::default())
        .await
        .unwrap();
    let shares: Shares = [("miner1".to_string(), 100u64)].into_iter().collect();
    store.put_round_shares(1000, "0xn1", shares).await;

    // A late fork moved the block to height 1002; hash match is
    // case-insensitive, the nonce there no longer matches.
    let node = MockNode::with_state(|state| {
        state.pending_height = 1200;
        MockNode::fill_canonical(state, 984, 1015);
        state
            .blocks
            .insert(1002, block_at(1002, "0xother", "0xDEADBEEF"));
    });

    let mut unlocker =
        BlockUnlocker::new(&unlocker_config(), store.clone(), node.clone()).unwrap();
    unlocker.unlock_and_credit_miners().await;
    assert!(!unlocker.halted());

    let matured = store.matured_blocks().await;
    assert_eq!(matured.len(), 1);
    assert_eq!(matured[0].height, 1002, "authoritative height rewritten");
    assert_eq!(matured[0].hash, "0xDEADBEEF");
    assert!(store.immature_blocks_all().await.is_empty());

    // difficulty 1000 sits below the first breakpoint: 10^18 Wei revenue,
    // 1% pool fee, floor to Shannon.
    assert_eq!(store.get_balance("miner1").await.unwrap(), 989_999_999);
}

#[tokio::test]
async fn matured_era_v2_block_splits_fee_between_miner_and_pool() {
    let pool_fee_address = encode_base58(&[9u8; 64]);
    let config = UnlockerConfig {
        pool_fee_address: pool_fee_address.clone(),
        ..unlocker_config()
    };

    let store = MemoryLedger::shared();
    let height = chain::HALVE_HEIGHT - 1;
    store
        .put_candidate(candidate(height, "0xr2", 1_000_000_000))
        .await;
    let shares: Shares = [("miner1".to_string(), 100u64)].into_iter().collect();
    store.put_round_shares(height, "0xr2", shares).await;

    let node = MockNode::with_state(|state| {
        state.pending_height = height + 40;
        MockNode::fill_canonical(state, height - 16, height + 15);
        state
            .blocks
            .insert(height, block_at(height, "0xr2", "0xfacefeed"));
    });

    let mut unlocker = BlockUnlocker::new(&config, store.clone(), node.clone()).unwrap();
    unlocker.unlock_pending_blocks().await;
    assert!(!unlocker.halted());

    // Revenue is the L1..L2 segment value 16_470_200_000_000_000_000 Wei
    // with no halving; the 1% fee is charged through the exact binary
    // expansion of 0.01 and both awards floor to Shannon.
    assert_eq!(
        store.immature_credit(height, "0xr2", "miner1").await,
        16_305_497_999
    );
    assert_eq!(
        store.immature_credit(height, "0xr2", &pool_fee_address).await,
        164_702_000
    );
    assert_eq!(store.candidate_count().await, 0);
    assert_eq!(store.immature_blocks_all().await.len(), 1);

    // Nothing is spendable until the matured pass.
    assert_eq!(store.get_balance("miner1").await.unwrap(), 0);
}

#[tokio::test]
async fn config_bounds_are_fatal_at_construction() {
    let store = MemoryLedger::shared();
    let node = Arc::new(MockNode::new());

    let mut config = unlocker_config();
    config.depth = 31; // < 2 * MIN_DEPTH
    assert!(BlockUnlocker::new(&config, store.clone(), node.clone()).is_err());

    let mut config = unlocker_config();
    config.immature_depth = 15;
    assert!(BlockUnlocker::new(&config, store.clone(), node.clone()).is_err());

    let mut config = unlocker_config();
    config.pool_fee = 101.0;
    assert!(BlockUnlocker::new(&config, store.clone(), node.clone()).is_err());

    let mut config = unlocker_config();
    config.pool_fee_address = "not/base58".to_string();
    assert!(BlockUnlocker::new(&config, store.clone(), node).is_err());
}

#[tokio::test]
async fn missing_node_block_in_window_halts_the_pass() {
    let store = MemoryLedger::shared();
    store.put_candidate(candidate(1000, "0xabc", 1_000)).await;

    // A hole at height 990 inside the probe window.
    let node = MockNode::with_state(|state| {
        state.pending_height = 1100;
        MockNode::fill_canonical(state, 984, 1015);
        state.blocks.remove(&990);
    });

    let mut unlocker =
        BlockUnlocker::new(&unlocker_config(), store.clone(), node.clone()).unwrap();
    unlocker.unlock_pending_blocks().await;

    assert!(unlocker.halted());
    // Nothing was classified; the candidate survives for the next restart.
    assert_eq!(store.candidate_count().await, 1);
    assert!(store.pending_orphan_blocks().await.is_empty());

    // A halted unlocker stays halted.
    unlocker.unlock_pending_blocks().await;
    assert_eq!(store.candidate_count().await, 1);
}
