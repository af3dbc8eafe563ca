//! Scripted node for end-to-end pipeline tests.
//!
//! Holds a canonical-chain snapshot plus payout bookkeeping behind one
//! mutex; every trait call reads or mutates that state synchronously, so
//! the confirmation-wait loops run instantly under paused tokio time.

// Each test binary uses a different slice of this module.
#![allow(dead_code)]

use async_trait::async_trait;
use num_bigint::BigUint;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Mutex;

use sero_pool::error::RpcError;
use sero_pool::node::{BlockReply, BlockTip, NodeRpc, PkSynced, TxReceipt};

#[derive(Default)]
pub struct MockState {
    pub blocks: HashMap<u64, BlockReply>,
    pub pending_height: u64,
    pub head: u64,
    pub receipts: HashMap<String, TxReceipt>,
    pub peer_count: u64,
    pub unlocked: bool,
    pub balance: BigUint,
    pub max_available: BigUint,
    pub pk_synced: PkSynced,
    /// Single-mode sends: `(to, value_hex)` per issued transaction.
    pub sent: Vec<(String, String)>,
    /// Exchange-mode batch sizes in generation order.
    pub batches: Vec<usize>,
    pub gen_calls: usize,
    pub commit_calls: usize,
    pub clear_calls: usize,
    pub fail_send: bool,
    pub fail_gen: bool,
    pub fail_commit: bool,
    /// Block receipts claim to be mined in.
    pub receipt_block: u64,
    tx_counter: usize,
}

#[derive(Default)]
pub struct MockNode {
    pub state: Mutex<MockState>,
}

pub fn block_at(height: u64, nonce: &str, hash: &str) -> BlockReply {
    BlockReply {
        number: format!("0x{height:x}"),
        hash: hash.to_string(),
        nonce: nonce.to_string(),
        ..Default::default()
    }
}

fn mined_receipt(tx_hash: &str, block: u64) -> TxReceipt {
    TxReceipt {
        tx_hash: tx_hash.to_string(),
        block_number: format!("0x{block:x}"),
        block_hash: "0xb10c".to_string(),
        gas_used: "0x0".to_string(),
        status: "0x1".to_string(),
    }
}

impl MockNode {
    pub fn new() -> Self {
        let node = Self::default();
        {
            let mut state = node.state.lock().unwrap();
            state.peer_count = 25;
            state.unlocked = true;
            state.receipt_block = 100;
            state.head = 10_000;
        }
        node
    }

    pub fn with_state(f: impl FnOnce(&mut MockState)) -> std::sync::Arc<Self> {
        let node = Self::new();
        f(&mut node.state.lock().unwrap());
        std::sync::Arc::new(node)
    }

    /// Populates a run of canonical blocks `[from, to]` whose nonces match
    /// nothing the pool claims.
    pub fn fill_canonical(state: &mut MockState, from: u64, to: u64) {
        for height in from..=to {
            state.blocks.insert(
                height,
                block_at(height, &format!("0xcafe{height:x}"), &format!("0xhash{height:x}")),
            );
        }
    }
}

#[async_trait]
impl NodeRpc for MockNode {
    async fn get_work(&self) -> Result<Vec<String>, RpcError> {
        Ok(vec!["0x0".into(), "0x0".into(), "0x0".into()])
    }

    async fn get_block_number(&self) -> Result<u64, RpcError> {
        Ok(self.state.lock().unwrap().head)
    }

    async fn get_pending_block(&self) -> Result<Option<BlockTip>, RpcError> {
        let state = self.state.lock().unwrap();
        Ok(Some(BlockTip {
            number: format!("0x{:x}", state.pending_height),
            difficulty: "0x1".to_string(),
        }))
    }

    async fn get_block_by_height(&self, height: u64) -> Result<Option<BlockReply>, RpcError> {
        Ok(self.state.lock().unwrap().blocks.get(&height).cloned())
    }

    async fn get_block_by_hash(&self, hash: &str) -> Result<Option<BlockReply>, RpcError> {
        let state = self.state.lock().unwrap();
        Ok(state
            .blocks
            .values()
            .find(|b| b.hash.eq_ignore_ascii_case(hash))
            .cloned())
    }

    async fn get_uncle_by_block_number_and_index(
        &self,
        _height: u64,
        _index: u64,
    ) -> Result<Option<BlockReply>, RpcError> {
        Ok(None)
    }

    async fn get_tx_receipt(&self, hash: &str) -> Result<Option<TxReceipt>, RpcError> {
        Ok(self.state.lock().unwrap().receipts.get(hash).cloned())
    }

    async fn submit_block(&self, _params: &[String]) -> Result<bool, RpcError> {
        Ok(true)
    }

    async fn get_balance(&self, _address: &str) -> Result<BigUint, RpcError> {
        Ok(self.state.lock().unwrap().balance.clone())
    }

    async fn address_unlocked(&self, _address: &str) -> Result<bool, RpcError> {
        Ok(self.state.lock().unwrap().unlocked)
    }

    async fn get_peer_count(&self) -> Result<u64, RpcError> {
        Ok(self.state.lock().unwrap().peer_count)
    }

    async fn send_transaction(
        &self,
        _from: &str,
        to: &str,
        _gas: &str,
        _gas_price: &str,
        value: &str,
        _auto_gas: bool,
    ) -> Result<String, RpcError> {
        let mut state = self.state.lock().unwrap();
        if state.fail_send {
            return Err(RpcError::Node("injected send failure".into()));
        }
        state.tx_counter += 1;
        let tx_hash = format!("0xsend{:04x}", state.tx_counter);
        let block = state.receipt_block;
        state.receipts.insert(tx_hash.clone(), mined_receipt(&tx_hash, block));
        state.sent.push((to.to_string(), value.to_string()));
        Ok(tx_hash)
    }

    async fn get_max_available(&self, _address: &str) -> Result<BigUint, RpcError> {
        Ok(self.state.lock().unwrap().max_available.clone())
    }

    async fn clear_exchange(&self, _address: &str) -> Result<(), RpcError> {
        self.state.lock().unwrap().clear_calls += 1;
        Ok(())
    }

    async fn gen_tx_with_sign(
        &self,
        _from: &str,
        _gas: u64,
        _gas_price: u64,
        pays: &[(String, BigUint)],
    ) -> Result<(Value, String), RpcError> {
        let mut state = self.state.lock().unwrap();
        state.gen_calls += 1;
        if state.fail_gen {
            return Err(RpcError::Node("injected gen failure".into()));
        }
        state.batches.push(pays.len());
        let tx_hash = format!("0xgen{:04x}", state.gen_calls);
        Ok((json!({ "Hash": tx_hash }), tx_hash))
    }

    async fn commit_tx(&self, raw: &Value, tx_hash: &str) -> Result<(), RpcError> {
        let mut state = self.state.lock().unwrap();
        state.commit_calls += 1;
        if state.fail_commit {
            return Err(RpcError::Node("injected commit failure".into()));
        }
        assert_eq!(raw["Hash"].as_str(), Some(tx_hash));
        let block = state.receipt_block;
        state.receipts.insert(tx_hash.to_string(), mined_receipt(tx_hash, block));
        Ok(())
    }

    async fn get_pk_synced(&self, _address: &str) -> Result<PkSynced, RpcError> {
        Ok(self.state.lock().unwrap().pk_synced)
    }
}
