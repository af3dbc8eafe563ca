//! Durable pool state.
//!
//! The `LedgerStore` trait is the contract between the maturation pipeline,
//! the payout engine and whatever backend an operator runs. Two backends
//! ship here: an in-memory ledger used by tests and dry runs, and a sled
//! ledger for production.
//!
//! Writes that anchor crash recovery (the payouts lock and the pending
//! exchange entries) are flushed synchronously in the sled backend;
//! `bg_save` is a compaction nicety on top, never the durability point.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::types::{BlockData, Payment, PayoutsLock, PendingPayment};

/// `login -> share count` snapshot of one closed round.
pub type Shares = HashMap<String, u64>;
/// `login -> Shannon` credits computed for one block.
pub type Rewards = HashMap<String, u64>;

#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn get_candidates(&self, max_height: u64) -> Result<Vec<BlockData>, StoreError>;
    async fn get_immature_blocks(&self, max_height: u64) -> Result<Vec<BlockData>, StoreError>;

    async fn write_pending_orphans(&self, blocks: &[BlockData]) -> Result<(), StoreError>;
    async fn write_orphan(&self, block: &BlockData) -> Result<(), StoreError>;
    async fn write_immature_block(
        &self,
        block: &BlockData,
        rewards: &Rewards,
    ) -> Result<(), StoreError>;
    async fn write_matured_block(
        &self,
        block: &BlockData,
        rewards: &Rewards,
    ) -> Result<(), StoreError>;

    async fn get_round_shares(&self, round_height: u64, nonce: &str)
        -> Result<Shares, StoreError>;

    async fn get_payees(&self) -> Result<Vec<String>, StoreError>;
    async fn get_balance(&self, login: &str) -> Result<u64, StoreError>;

    async fn lock_payouts(&self, holder: &str, amount: u64) -> Result<(), StoreError>;
    async fn unlock_payouts(&self) -> Result<(), StoreError>;
    async fn is_payouts_locked(&self) -> Result<Option<PayoutsLock>, StoreError>;

    async fn update_balance(&self, login: &str, amount: u64) -> Result<(), StoreError>;
    async fn update_balance_with_tx(
        &self,
        login: &str,
        amount: u64,
        tx_hash: &str,
    ) -> Result<(), StoreError>;

    async fn write_payment(
        &self,
        login: &str,
        tx_hash: &str,
        amount: u64,
    ) -> Result<(), StoreError>;
    async fn write_exchange_payment(
        &self,
        login: &str,
        tx_hash: &str,
        amount: u64,
    ) -> Result<(), StoreError>;

    async fn get_pending_payments(&self) -> Result<Vec<PendingPayment>, StoreError>;
    async fn get_pending_exchange_payments(&self) -> Result<Vec<PendingPayment>, StoreError>;

    async fn rollback_balance(&self, address: &str, amount: u64) -> Result<(), StoreError>;
    async fn rollback_exchange_balance(
        &self,
        address: &str,
        amount: u64,
        tx_hash: &str,
    ) -> Result<(), StoreError>;

    async fn bg_save(&self) -> Result<String, StoreError>;
}

fn round_key(round_height: u64, nonce: &str) -> String {
    format!("{}:{}", round_height, nonce.to_lowercase())
}

// ---------------------------------------------------------------------------
// In-memory backend
// ---------------------------------------------------------------------------

#[derive(Default)]
struct LedgerState {
    candidates: Vec<BlockData>,
    immature: Vec<BlockData>,
    matured: Vec<BlockData>,
    pending_orphans: Vec<BlockData>,
    orphans: Vec<BlockData>,
    round_shares: HashMap<String, Shares>,
    balances: HashMap<String, u64>,
    /// Immature credits per round, reversed or promoted when the round
    /// finally matures or orphans.
    immature_credits: HashMap<String, Rewards>,
    lock: Option<PayoutsLock>,
    pending_exchange: Vec<PendingPayment>,
    payments: Vec<Payment>,
}

pub struct MemoryLedger {
    state: RwLock<LedgerState>,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(LedgerState::default()),
        }
    }

    pub fn shared() -> Arc<Self> {
        Arc::new(Self::new())
    }

    /// Share-pipeline surface: record a freshly claimed block.
    pub async fn put_candidate(&self, block: BlockData) {
        self.state.write().await.candidates.push(block);
    }

    /// Share-pipeline surface: close a round's share snapshot.
    pub async fn put_round_shares(&self, round_height: u64, nonce: &str, shares: Shares) {
        self.state
            .write()
            .await
            .round_shares
            .insert(round_key(round_height, nonce), shares);
    }

    pub async fn set_balance(&self, login: &str, amount: u64) {
        self.state
            .write()
            .await
            .balances
            .insert(login.to_string(), amount);
    }

    pub async fn payments(&self) -> Vec<Payment> {
        self.state.read().await.payments.clone()
    }

    pub async fn matured_blocks(&self) -> Vec<BlockData> {
        self.state.read().await.matured.clone()
    }

    pub async fn immature_blocks_all(&self) -> Vec<BlockData> {
        self.state.read().await.immature.clone()
    }

    pub async fn orphaned_blocks(&self) -> Vec<BlockData> {
        self.state.read().await.orphans.clone()
    }

    pub async fn pending_orphan_blocks(&self) -> Vec<BlockData> {
        self.state.read().await.pending_orphans.clone()
    }

    pub async fn candidate_count(&self) -> usize {
        self.state.read().await.candidates.len()
    }

    pub async fn immature_credit(&self, round_height: u64, nonce: &str, login: &str) -> u64 {
        self.state
            .read()
            .await
            .immature_credits
            .get(&round_key(round_height, nonce))
            .and_then(|r| r.get(login))
            .copied()
            .unwrap_or(0)
    }
}

impl Default for MemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

fn debit(balances: &mut HashMap<String, u64>, login: &str, amount: u64) -> Result<(), StoreError> {
    let balance = balances.get(login).copied().unwrap_or(0);
    if balance < amount {
        return Err(StoreError::InsufficientBalance {
            login: login.to_string(),
            balance,
            amount,
        });
    }
    balances.insert(login.to_string(), balance - amount);
    Ok(())
}

fn remove_block(list: &mut Vec<BlockData>, key: &str) {
    list.retain(|b| b.round_key().to_lowercase() != key);
}

#[async_trait]
impl LedgerStore for MemoryLedger {
    async fn get_candidates(&self, max_height: u64) -> Result<Vec<BlockData>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .candidates
            .iter()
            .filter(|b| b.height <= max_height)
            .cloned()
            .collect())
    }

    async fn get_immature_blocks(&self, max_height: u64) -> Result<Vec<BlockData>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .immature
            .iter()
            .filter(|b| b.height <= max_height)
            .cloned()
            .collect())
    }

    async fn write_pending_orphans(&self, blocks: &[BlockData]) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        for block in blocks {
            let key = round_key(block.round_height, &block.nonce);
            remove_block(&mut state.candidates, &key);
            state.round_shares.remove(&key);
            state.pending_orphans.push(block.clone());
        }
        Ok(())
    }

    async fn write_orphan(&self, block: &BlockData) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let key = round_key(block.round_height, &block.nonce);
        remove_block(&mut state.immature, &key);
        state.immature_credits.remove(&key);
        state.round_shares.remove(&key);
        state.orphans.push(block.clone());
        Ok(())
    }

    async fn write_immature_block(
        &self,
        block: &BlockData,
        rewards: &Rewards,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let key = round_key(block.round_height, &block.nonce);
        remove_block(&mut state.candidates, &key);
        state.immature.push(block.clone());
        state.immature_credits.insert(key, rewards.clone());
        Ok(())
    }

    async fn write_matured_block(
        &self,
        block: &BlockData,
        rewards: &Rewards,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        let key = round_key(block.round_height, &block.nonce);
        remove_block(&mut state.immature, &key);
        state.immature_credits.remove(&key);
        for (login, amount) in rewards {
            *state.balances.entry(login.clone()).or_insert(0) += amount;
        }
        state.matured.push(block.clone());
        Ok(())
    }

    async fn get_round_shares(
        &self,
        round_height: u64,
        nonce: &str,
    ) -> Result<Shares, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .round_shares
            .get(&round_key(round_height, nonce))
            .cloned()
            .unwrap_or_default())
    }

    async fn get_payees(&self) -> Result<Vec<String>, StoreError> {
        let state = self.state.read().await;
        let mut payees: Vec<String> = state.balances.keys().cloned().collect();
        payees.sort();
        Ok(payees)
    }

    async fn get_balance(&self, login: &str) -> Result<u64, StoreError> {
        let state = self.state.read().await;
        Ok(state.balances.get(login).copied().unwrap_or(0))
    }

    async fn lock_payouts(&self, holder: &str, amount: u64) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if let Some(lock) = &state.lock {
            return Err(StoreError::AlreadyLocked {
                holder: lock.holder.clone(),
            });
        }
        state.lock = Some(PayoutsLock {
            holder: holder.to_string(),
            amount,
            timestamp: Utc::now().timestamp(),
        });
        Ok(())
    }

    async fn unlock_payouts(&self) -> Result<(), StoreError> {
        self.state.write().await.lock = None;
        Ok(())
    }

    async fn is_payouts_locked(&self) -> Result<Option<PayoutsLock>, StoreError> {
        Ok(self.state.read().await.lock.clone())
    }

    async fn update_balance(&self, login: &str, amount: u64) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        debit(&mut state.balances, login, amount)
    }

    async fn update_balance_with_tx(
        &self,
        login: &str,
        amount: u64,
        tx_hash: &str,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        debit(&mut state.balances, login, amount)?;
        state.pending_exchange.push(PendingPayment {
            address: login.to_string(),
            amount,
            timestamp: Utc::now().timestamp(),
            tx_hash: Some(tx_hash.to_string()),
        });
        Ok(())
    }

    async fn write_payment(
        &self,
        login: &str,
        tx_hash: &str,
        amount: u64,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        state.payments.push(Payment {
            login: login.to_string(),
            tx_hash: tx_hash.to_string(),
            amount,
            timestamp: Utc::now().timestamp(),
        });
        // The recorded payment releases the pending slot.
        state.lock = None;
        Ok(())
    }

    async fn write_exchange_payment(
        &self,
        login: &str,
        tx_hash: &str,
        amount: u64,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if let Some(pos) = state.pending_exchange.iter().position(|p| {
            p.address == login && p.amount == amount && p.tx_hash.as_deref() == Some(tx_hash)
        }) {
            state.pending_exchange.remove(pos);
        }
        state.payments.push(Payment {
            login: login.to_string(),
            tx_hash: tx_hash.to_string(),
            amount,
            timestamp: Utc::now().timestamp(),
        });
        Ok(())
    }

    async fn get_pending_payments(&self) -> Result<Vec<PendingPayment>, StoreError> {
        let state = self.state.read().await;
        Ok(state
            .lock
            .iter()
            .map(|lock| PendingPayment {
                address: lock.holder.clone(),
                amount: lock.amount,
                timestamp: lock.timestamp,
                tx_hash: None,
            })
            .collect())
    }

    async fn get_pending_exchange_payments(&self) -> Result<Vec<PendingPayment>, StoreError> {
        Ok(self.state.read().await.pending_exchange.clone())
    }

    async fn rollback_balance(&self, address: &str, amount: u64) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        *state.balances.entry(address.to_string()).or_insert(0) += amount;
        Ok(())
    }

    async fn rollback_exchange_balance(
        &self,
        address: &str,
        amount: u64,
        tx_hash: &str,
    ) -> Result<(), StoreError> {
        let mut state = self.state.write().await;
        if let Some(pos) = state.pending_exchange.iter().position(|p| {
            p.address == address && p.amount == amount && p.tx_hash.as_deref() == Some(tx_hash)
        }) {
            state.pending_exchange.remove(pos);
        }
        *state.balances.entry(address.to_string()).or_insert(0) += amount;
        Ok(())
    }

    async fn bg_save(&self) -> Result<String, StoreError> {
        Ok("memory backend, nothing to save".to_string())
    }
}

// ---------------------------------------------------------------------------
// Sled backend
// ---------------------------------------------------------------------------

pub struct SledLedger {
    db: sled::Db,
    candidates: sled::Tree,
    immature: sled::Tree,
    matured: sled::Tree,
    pending_orphans: sled::Tree,
    orphans: sled::Tree,
    round_shares: sled::Tree,
    balances: sled::Tree,
    immature_credits: sled::Tree,
    pending_exchange: sled::Tree,
    payments: sled::Tree,
    meta: sled::Tree,
}

const LOCK_KEY: &[u8] = b"payouts_lock";

fn op<E: std::fmt::Display>(e: E) -> StoreError {
    StoreError::DatabaseOp(e.to_string())
}

fn ser<T: serde::Serialize>(value: &T) -> Result<Vec<u8>, StoreError> {
    bincode::serialize(value).map_err(|e| StoreError::Serialization(e.to_string()))
}

fn de<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, StoreError> {
    bincode::deserialize(bytes).map_err(|e| StoreError::Serialization(e.to_string()))
}

impl SledLedger {
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let db = sled::open(path).map_err(|source| StoreError::DatabaseOpen {
            name: path.to_string(),
            source,
        })?;
        let tree = |name: &str| -> Result<sled::Tree, StoreError> {
            db.open_tree(name).map_err(|source| StoreError::DatabaseOpen {
                name: name.to_string(),
                source,
            })
        };
        Ok(Self {
            candidates: tree("candidates")?,
            immature: tree("immature")?,
            matured: tree("matured")?,
            pending_orphans: tree("pending_orphans")?,
            orphans: tree("orphans")?,
            round_shares: tree("round_shares")?,
            balances: tree("balances")?,
            immature_credits: tree("immature_credits")?,
            pending_exchange: tree("pending_exchange")?,
            payments: tree("payments")?,
            meta: tree("meta")?,
            db,
        })
    }

    /// Share-pipeline surface: record a freshly claimed block.
    pub fn put_candidate(&self, block: &BlockData) -> Result<(), StoreError> {
        let key = round_key(block.round_height, &block.nonce);
        self.candidates
            .insert(key.as_bytes(), ser(block)?)
            .map_err(op)?;
        Ok(())
    }

    /// Share-pipeline surface: close a round's share snapshot.
    pub fn put_round_shares(
        &self,
        round_height: u64,
        nonce: &str,
        shares: &Shares,
    ) -> Result<(), StoreError> {
        let key = round_key(round_height, nonce);
        self.round_shares
            .insert(key.as_bytes(), ser(shares)?)
            .map_err(op)?;
        Ok(())
    }

    fn blocks_below(tree: &sled::Tree, max_height: u64) -> Result<Vec<BlockData>, StoreError> {
        let mut out = Vec::new();
        for item in tree.iter() {
            let (_, value) = item.map_err(op)?;
            let block: BlockData = de(&value)?;
            if block.height <= max_height {
                out.push(block);
            }
        }
        out.sort_by_key(|b| b.height);
        Ok(out)
    }

    fn read_balance(&self, login: &str) -> Result<u64, StoreError> {
        Ok(match self.balances.get(login.as_bytes()).map_err(op)? {
            Some(bytes) => de(&bytes)?,
            None => 0,
        })
    }

    fn store_balance(&self, login: &str, amount: u64) -> Result<(), StoreError> {
        self.balances
            .insert(login.as_bytes(), ser(&amount)?)
            .map_err(op)?;
        Ok(())
    }

    fn debit_balance(&self, login: &str, amount: u64) -> Result<(), StoreError> {
        let balance = self.read_balance(login)?;
        if balance < amount {
            return Err(StoreError::InsufficientBalance {
                login: login.to_string(),
                balance,
                amount,
            });
        }
        self.store_balance(login, balance - amount)
    }

    fn credit_balance(&self, login: &str, amount: u64) -> Result<(), StoreError> {
        let balance = self.read_balance(login)?;
        self.store_balance(login, balance + amount)
    }

    fn append_payment(&self, payment: &Payment) -> Result<(), StoreError> {
        let key = format!(
            "{}:{}:{}",
            payment.timestamp, payment.login, payment.tx_hash
        );
        self.payments
            .insert(key.as_bytes(), ser(payment)?)
            .map_err(op)?;
        Ok(())
    }

    fn pending_exchange_key(address: &str, tx_hash: &str) -> String {
        format!("{address}:{tx_hash}")
    }

    /// Recovery anchors hit the disk before the caller proceeds.
    fn flush(&self) -> Result<(), StoreError> {
        self.db.flush().map_err(op)?;
        Ok(())
    }
}

#[async_trait]
impl LedgerStore for SledLedger {
    async fn get_candidates(&self, max_height: u64) -> Result<Vec<BlockData>, StoreError> {
        Self::blocks_below(&self.candidates, max_height)
    }

    async fn get_immature_blocks(&self, max_height: u64) -> Result<Vec<BlockData>, StoreError> {
        Self::blocks_below(&self.immature, max_height)
    }

    async fn write_pending_orphans(&self, blocks: &[BlockData]) -> Result<(), StoreError> {
        for block in blocks {
            let key = round_key(block.round_height, &block.nonce);
            self.candidates.remove(key.as_bytes()).map_err(op)?;
            self.round_shares.remove(key.as_bytes()).map_err(op)?;
            self.pending_orphans
                .insert(key.as_bytes(), ser(block)?)
                .map_err(op)?;
        }
        Ok(())
    }

    async fn write_orphan(&self, block: &BlockData) -> Result<(), StoreError> {
        let key = round_key(block.round_height, &block.nonce);
        self.immature.remove(key.as_bytes()).map_err(op)?;
        self.immature_credits.remove(key.as_bytes()).map_err(op)?;
        self.round_shares.remove(key.as_bytes()).map_err(op)?;
        self.orphans.insert(key.as_bytes(), ser(block)?).map_err(op)?;
        Ok(())
    }

    async fn write_immature_block(
        &self,
        block: &BlockData,
        rewards: &Rewards,
    ) -> Result<(), StoreError> {
        let key = round_key(block.round_height, &block.nonce);
        self.candidates.remove(key.as_bytes()).map_err(op)?;
        self.immature.insert(key.as_bytes(), ser(block)?).map_err(op)?;
        self.immature_credits
            .insert(key.as_bytes(), ser(rewards)?)
            .map_err(op)?;
        Ok(())
    }

    async fn write_matured_block(
        &self,
        block: &BlockData,
        rewards: &Rewards,
    ) -> Result<(), StoreError> {
        let key = round_key(block.round_height, &block.nonce);
        self.immature.remove(key.as_bytes()).map_err(op)?;
        self.immature_credits.remove(key.as_bytes()).map_err(op)?;
        for (login, amount) in rewards {
            self.credit_balance(login, *amount)?;
        }
        self.matured.insert(key.as_bytes(), ser(block)?).map_err(op)?;
        self.flush()
    }

    async fn get_round_shares(
        &self,
        round_height: u64,
        nonce: &str,
    ) -> Result<Shares, StoreError> {
        let key = round_key(round_height, nonce);
        Ok(match self.round_shares.get(key.as_bytes()).map_err(op)? {
            Some(bytes) => de(&bytes)?,
            None => Shares::default(),
        })
    }

    async fn get_payees(&self) -> Result<Vec<String>, StoreError> {
        let mut payees = Vec::new();
        for item in self.balances.iter() {
            let (key, _) = item.map_err(op)?;
            payees.push(String::from_utf8_lossy(&key).to_string());
        }
        payees.sort();
        Ok(payees)
    }

    async fn get_balance(&self, login: &str) -> Result<u64, StoreError> {
        self.read_balance(login)
    }

    async fn lock_payouts(&self, holder: &str, amount: u64) -> Result<(), StoreError> {
        if let Some(bytes) = self.meta.get(LOCK_KEY).map_err(op)? {
            let lock: PayoutsLock = de(&bytes)?;
            return Err(StoreError::AlreadyLocked { holder: lock.holder });
        }
        let lock = PayoutsLock {
            holder: holder.to_string(),
            amount,
            timestamp: Utc::now().timestamp(),
        };
        self.meta.insert(LOCK_KEY, ser(&lock)?).map_err(op)?;
        self.flush()
    }

    async fn unlock_payouts(&self) -> Result<(), StoreError> {
        self.meta.remove(LOCK_KEY).map_err(op)?;
        self.flush()
    }

    async fn is_payouts_locked(&self) -> Result<Option<PayoutsLock>, StoreError> {
        Ok(match self.meta.get(LOCK_KEY).map_err(op)? {
            Some(bytes) => Some(de(&bytes)?),
            None => None,
        })
    }

    async fn update_balance(&self, login: &str, amount: u64) -> Result<(), StoreError> {
        self.debit_balance(login, amount)?;
        self.flush()
    }

    async fn update_balance_with_tx(
        &self,
        login: &str,
        amount: u64,
        tx_hash: &str,
    ) -> Result<(), StoreError> {
        self.debit_balance(login, amount)?;
        let pending = PendingPayment {
            address: login.to_string(),
            amount,
            timestamp: Utc::now().timestamp(),
            tx_hash: Some(tx_hash.to_string()),
        };
        self.pending_exchange
            .insert(
                Self::pending_exchange_key(login, tx_hash).as_bytes(),
                ser(&pending)?,
            )
            .map_err(op)?;
        self.flush()
    }

    async fn write_payment(
        &self,
        login: &str,
        tx_hash: &str,
        amount: u64,
    ) -> Result<(), StoreError> {
        self.append_payment(&Payment {
            login: login.to_string(),
            tx_hash: tx_hash.to_string(),
            amount,
            timestamp: Utc::now().timestamp(),
        })?;
        self.meta.remove(LOCK_KEY).map_err(op)?;
        self.flush()
    }

    async fn write_exchange_payment(
        &self,
        login: &str,
        tx_hash: &str,
        amount: u64,
    ) -> Result<(), StoreError> {
        self.pending_exchange
            .remove(Self::pending_exchange_key(login, tx_hash).as_bytes())
            .map_err(op)?;
        self.append_payment(&Payment {
            login: login.to_string(),
            tx_hash: tx_hash.to_string(),
            amount,
            timestamp: Utc::now().timestamp(),
        })?;
        self.flush()
    }

    async fn get_pending_payments(&self) -> Result<Vec<PendingPayment>, StoreError> {
        Ok(match self.meta.get(LOCK_KEY).map_err(op)? {
            Some(bytes) => {
                let lock: PayoutsLock = de(&bytes)?;
                vec![PendingPayment {
                    address: lock.holder,
                    amount: lock.amount,
                    timestamp: lock.timestamp,
                    tx_hash: None,
                }]
            }
            None => Vec::new(),
        })
    }

    async fn get_pending_exchange_payments(&self) -> Result<Vec<PendingPayment>, StoreError> {
        let mut out = Vec::new();
        for item in self.pending_exchange.iter() {
            let (_, value) = item.map_err(op)?;
            out.push(de(&value)?);
        }
        Ok(out)
    }

    async fn rollback_balance(&self, address: &str, amount: u64) -> Result<(), StoreError> {
        self.credit_balance(address, amount)?;
        self.flush()
    }

    async fn rollback_exchange_balance(
        &self,
        address: &str,
        amount: u64,
        tx_hash: &str,
    ) -> Result<(), StoreError> {
        self.pending_exchange
            .remove(Self::pending_exchange_key(address, tx_hash).as_bytes())
            .map_err(op)?;
        self.credit_balance(address, amount)?;
        self.flush()
    }

    async fn bg_save(&self) -> Result<String, StoreError> {
        let bytes = self.db.flush().map_err(op)?;
        Ok(format!("{bytes} bytes flushed"))
    }
}
