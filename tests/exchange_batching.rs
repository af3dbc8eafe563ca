//! Batched exchange-mode scenarios: the eight-payee batch cap, the
//! generate-then-commit compensation path, sync gates, and the payee
//! address filter.

mod common;

use common::MockNode;
use sero_pool::address::encode_base58;
use sero_pool::config::{Config, PayoutsConfig};
use sero_pool::node::{NodeRpc, PkSynced};
use sero_pool::payouts::PayoutsProcessor;
use sero_pool::storage::{LedgerStore, MemoryLedger};
use sero_pool::units;

fn exchange_config() -> PayoutsConfig {
    PayoutsConfig {
        enabled: true,
        exchange: true,
        address: encode_base58(&[1u8; 64]),
        threshold: 500,
        ..Config::default().payouts
    }
}

fn synced_at(height: u64) -> PkSynced {
    PkSynced {
        confirm_block: 3,
        current_block: height,
        highest_block: height,
        pk_block: height,
    }
}

fn login(tag: u8) -> String {
    encode_base58(&[tag; 64])
}

#[tokio::test(start_paused = true)]
async fn twenty_payees_split_into_batches_of_eight() {
    let store = MemoryLedger::shared();
    let logins: Vec<String> = (0..20).map(|i| login(i + 100)).collect();
    for l in &logins {
        store.set_balance(l, 1_000).await;
    }

    let node = MockNode::with_state(|state| {
        state.pk_synced = synced_at(5_000);
        state.balance = units::shannon_to_wei(1_000_000);
        state.max_available = units::shannon_to_wei(1_000_000);
    });

    let mut processor =
        PayoutsProcessor::new(&exchange_config(), store.clone(), node.clone()).unwrap();
    processor.exchange_process().await;
    assert!(!processor.halted());

    {
        let state = node.state.lock().unwrap();
        assert_eq!(state.batches, vec![8, 8, 4]);
        assert_eq!(state.gen_calls, 3);
        assert_eq!(state.commit_calls, 3);
        assert_eq!(state.clear_calls, 0);
    }

    assert_eq!(store.payments().await.len(), 20);
    for l in &logins {
        assert_eq!(store.get_balance(l).await.unwrap(), 0);
    }
    assert!(store.is_payouts_locked().await.unwrap().is_none());
    assert!(store
        .get_pending_exchange_payments()
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test(start_paused = true)]
async fn commit_failure_clears_exchange_once_and_leaves_resolvable_debits() {
    let store = MemoryLedger::shared();
    let (a, b) = (login(30), login(31));
    store.set_balance(&a, 1_000).await;
    store.set_balance(&b, 2_000).await;

    let node = MockNode::with_state(|state| {
        state.pk_synced = synced_at(5_000);
        state.balance = units::shannon_to_wei(1_000_000);
        state.max_available = units::shannon_to_wei(1_000_000);
        state.fail_commit = true;
    });

    let mut processor =
        PayoutsProcessor::new(&exchange_config(), store.clone(), node.clone()).unwrap();
    processor.exchange_process().await;

    assert!(processor.halted());
    {
        let state = node.state.lock().unwrap();
        assert_eq!(state.clear_calls, 1, "ClearExchange compensates exactly once");
        assert_eq!(state.commit_calls, 1);
    }

    // Nothing was recorded as paid; the tx-bound debits are the pending
    // exchange entries the resolver matches by hash.
    assert!(store.payments().await.is_empty());
    assert_eq!(store.get_balance(&a).await.unwrap(), 0);
    assert_eq!(store.get_balance(&b).await.unwrap(), 0);
    let pending = store.get_pending_exchange_payments().await.unwrap();
    assert_eq!(pending.len(), 2);
    for p in &pending {
        assert_eq!(p.tx_hash.as_deref(), Some("0xgen0001"));
    }
    let lock = store.is_payouts_locked().await.unwrap().unwrap();
    assert_eq!(lock.holder, "exchange_paying");
    assert_eq!(lock.amount, 3_000);

    let mut resolver =
        PayoutsProcessor::new(&exchange_config(), store.clone(), node.clone()).unwrap();
    resolver.resolve_exchange_payouts().await;
    assert_eq!(store.get_balance(&a).await.unwrap(), 1_000);
    assert_eq!(store.get_balance(&b).await.unwrap(), 2_000);
    assert!(store
        .get_pending_exchange_payments()
        .await
        .unwrap()
        .is_empty());
    assert!(store.is_payouts_locked().await.unwrap().is_none());
}

#[tokio::test(start_paused = true)]
async fn gen_failure_clears_exchange_without_halting() {
    let store = MemoryLedger::shared();
    let a = login(40);
    store.set_balance(&a, 1_000).await;

    let node = MockNode::with_state(|state| {
        state.pk_synced = synced_at(5_000);
        state.balance = units::shannon_to_wei(1_000_000);
        state.max_available = units::shannon_to_wei(1_000_000);
        state.fail_gen = true;
    });

    let mut processor =
        PayoutsProcessor::new(&exchange_config(), store.clone(), node.clone()).unwrap();
    processor.exchange_process().await;

    // A failed generation strands nothing: no lock, no debit, next tick
    // simply retries.
    assert!(!processor.halted());
    assert_eq!(node.state.lock().unwrap().clear_calls, 1);
    assert_eq!(store.get_balance(&a).await.unwrap(), 1_000);
    assert!(store.is_payouts_locked().await.unwrap().is_none());
}

#[tokio::test(start_paused = true)]
async fn sync_gates_refuse_to_pay() {
    let store = MemoryLedger::shared();
    let a = login(50);
    store.set_balance(&a, 1_000).await;

    // Chain still syncing: highest behind current.
    let node = MockNode::with_state(|state| {
        state.pk_synced = PkSynced {
            confirm_block: 3,
            current_block: 5_000,
            highest_block: 4_999,
            pk_block: 5_000,
        };
        state.max_available = units::shannon_to_wei(1_000_000);
    });
    let mut processor =
        PayoutsProcessor::new(&exchange_config(), store.clone(), node.clone()).unwrap();
    processor.exchange_process().await;
    assert_eq!(node.state.lock().unwrap().gen_calls, 0);

    // Balance view lagging by more than 128 blocks.
    let node = MockNode::with_state(|state| {
        state.pk_synced = PkSynced {
            confirm_block: 3,
            current_block: 5_000,
            highest_block: 5_000,
            pk_block: 4_000,
        };
        state.max_available = units::shannon_to_wei(1_000_000);
    });
    let mut processor =
        PayoutsProcessor::new(&exchange_config(), store.clone(), node.clone()).unwrap();
    processor.exchange_process().await;
    assert_eq!(node.state.lock().unwrap().gen_calls, 0);
    assert_eq!(store.get_balance(&a).await.unwrap(), 1_000);
}

#[tokio::test(start_paused = true)]
async fn malformed_payee_addresses_are_skipped_not_fatal() {
    let store = MemoryLedger::shared();
    let good = login(60);
    store.set_balance(&good, 1_000).await;
    // 32 bytes decodes but is not a legal account width.
    let bad = encode_base58(&[7u8; 32]);
    store.set_balance(&bad, 9_000).await;

    let node = MockNode::with_state(|state| {
        state.pk_synced = synced_at(5_000);
        state.balance = units::shannon_to_wei(1_000_000);
        state.max_available = units::shannon_to_wei(1_000_000);
    });

    let mut processor =
        PayoutsProcessor::new(&exchange_config(), store.clone(), node.clone()).unwrap();
    processor.exchange_process().await;

    assert!(!processor.halted());
    assert_eq!(store.get_balance(&good).await.unwrap(), 0);
    assert_eq!(store.get_balance(&bad).await.unwrap(), 9_000, "skipped payee untouched");
    assert_eq!(store.payments().await.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn stale_lock_refuses_startup_in_exchange_mode() {
    let store = MemoryLedger::shared();
    store.lock_payouts("exchange_paying", 123).await.unwrap();

    let node = MockNode::with_state(|state| {
        state.pk_synced = synced_at(5_000);
    });

    // No pending exchange entries, but the lock survived a crash: run()
    // must refuse and leave the state for the operator.
    let processor =
        PayoutsProcessor::new(&exchange_config(), store.clone(), node.clone()).unwrap();
    processor.run().await;
    assert!(store.is_payouts_locked().await.unwrap().is_some());
}

#[tokio::test]
async fn can_tx_categorises_sync_states() {
    let node = MockNode::with_state(|state| {
        state.pk_synced = PkSynced {
            confirm_block: 10,
            current_block: 5_000,
            highest_block: 5_000,
            pk_block: 4_900,
        };
    });

    // Fully synced, last tx long buried.
    assert!(node.can_tx("addr", 4_000).await.is_ok());

    // Confirmation window not yet elapsed: current <= last + confirm.
    let err = node.can_tx("addr", 4_995).await.unwrap_err();
    assert!(err.to_string().contains("account is confirming"));

    // Balance view behind the last tx.
    let err = node.can_tx("addr", 4_950).await.unwrap_err();
    assert!(err.to_string().contains("balance is confirming"));

    // Out of sync entirely.
    let node = MockNode::with_state(|state| {
        state.pk_synced = PkSynced {
            confirm_block: 10,
            current_block: 5_000,
            highest_block: 6_000,
            pk_block: 5_000,
        };
    });
    let err = node.can_tx("addr", 0).await.unwrap_err();
    assert!(err.to_string().contains("syncing"));
}
