//! Payout engine.
//!
//! Sweeps balances that crossed the configured threshold and pays miners
//! on-chain, either one transaction per payee or in exchange-mode batches of
//! up to eight backed by the node's generate-then-commit flow.
//!
//! The crash contract: a pending payment is recorded before every send, the
//! payouts lock is held across the debit-and-send critical section, and a
//! failure anywhere latches `halt` and leaves both in place. The operator
//! restarts with `RESOLVE_PAYOUT=1` to roll the debits back.

use num_bigint::BigUint;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::address;
use crate::config::PayoutsConfig;
use crate::constants::depth::{CONFIRM_BLOCKS, PK_LAG_LIMIT};
use crate::constants::payouts::{
    EXCHANGE_GAS, EXCHANGE_GAS_PRICE, EXCHANGE_HEAD_POLL_SECS, EXCHANGE_LOCK_HOLDER,
    FUNDS_RETRY_SECS, HEAD_POLL_SECS, MAX_BATCH_SIZE, RECEIPT_POLL_SECS,
};
use crate::error::{PoolError, Result};
use crate::node::NodeRpc;
use crate::storage::LedgerStore;
use crate::types::PendingPayment;
use crate::units;

const RESOLVE_ENV: &str = "RESOLVE_PAYOUT";

pub struct PayoutsProcessor {
    config: PayoutsConfig,
    store: Arc<dyn LedgerStore>,
    node: Arc<dyn NodeRpc>,
    halt: bool,
    last_fail: Option<PoolError>,
}

#[derive(Clone, Debug)]
struct PayInfo {
    miner: String,
    amount_wei: BigUint,
    amount_shannon: u64,
}

impl PayoutsProcessor {
    pub fn new(
        config: &PayoutsConfig,
        store: Arc<dyn LedgerStore>,
        node: Arc<dyn NodeRpc>,
    ) -> Result<Self> {
        if !address::is_valid_address(&config.address) {
            return Err(PoolError::Config(format!(
                "invalid payout source address {:?}",
                config.address
            )));
        }
        Ok(Self {
            config: config.clone(),
            store,
            node,
            halt: false,
            last_fail: None,
        })
    }

    /// Startup ladder: resolver mode, refuse on leftover pending payments or
    /// a stale lock, otherwise pay immediately and then on every interval.
    pub fn start(self) {
        tokio::spawn(self.run());
    }

    pub async fn run(mut self) {
        info!("Starting payouts");

        if must_resolve_payout() {
            info!("Running with env {RESOLVE_ENV}=1, now trying to resolve locked payouts");
            if self.config.exchange {
                self.resolve_exchange_payouts().await;
            } else {
                self.resolve_payouts().await;
            }
            info!("Now restart the payouts module with {RESOLVE_ENV}=0 for a normal run");
            return;
        }

        match self.pending_for_mode().await {
            Ok(payments) if !payments.is_empty() => {
                error!(
                    "Previous payout failed, you have to resolve it. List of failed payments:\n{}",
                    format_pending_payments(&payments)
                );
                return;
            }
            Ok(_) => {}
            Err(err) => {
                error!("Unable to start payouts: {err}");
                return;
            }
        }

        match self.store.is_payouts_locked().await {
            Ok(Some(lock)) => {
                let err = PoolError::StaleLock { holder: lock.holder };
                error!("Unable to start payouts: {err}");
                return;
            }
            Ok(None) => {}
            Err(err) => {
                error!("Unable to start payouts: {err}");
                return;
            }
        }

        let interval = Duration::from_secs(self.config.interval_secs);
        info!("Set payouts interval to {:?}", interval);
        loop {
            if self.config.exchange {
                self.exchange_process().await;
            } else {
                self.process().await;
            }
            sleep(interval).await;
        }
    }

    async fn pending_for_mode(&self) -> std::result::Result<Vec<PendingPayment>, crate::error::StoreError> {
        if self.config.exchange {
            self.store.get_pending_exchange_payments().await
        } else {
            self.store.get_pending_payments().await
        }
    }

    pub fn halted(&self) -> bool {
        self.halt
    }

    fn critical(&mut self, context: &str, err: PoolError) {
        error!("{context}: {err}");
        self.halt = true;
        self.last_fail = Some(err);
    }

    // -----------------------------------------------------------------
    // Single-recipient mode
    // -----------------------------------------------------------------

    /// One transaction per payee, confirmation-gated between payees.
    pub async fn process(&mut self) {
        if self.halt {
            if let Some(err) = &self.last_fail {
                error!("Payments suspended due to last critical error: {err}");
            }
            return;
        }

        let mut must_pay = 0u64;
        let mut miners_paid = 0u64;
        let mut total_amount = 0u64;

        let payees = match self.store.get_payees().await {
            Ok(p) => p,
            Err(err) => {
                error!("Error while retrieving payees from backend: {err}");
                return;
            }
        };

        for login in payees {
            let amount = match self.store.get_balance(&login).await {
                Ok(a) => a,
                Err(err) => {
                    error!("Error while retrieving balance for {login}: {err}");
                    return;
                }
            };
            if !self.reached_threshold(amount) {
                continue;
            }
            let amount_wei = units::shannon_to_wei(amount);
            must_pay += 1;

            // Require active peers and an unlocked account before touching
            // any balance.
            if !self.check_peers().await {
                break;
            }
            if !self.unlocked_account().await {
                break;
            }

            let pool_balance = match self.node.get_balance(&self.config.address).await {
                Ok(b) => b,
                Err(err) => {
                    self.critical("Failed to read pool balance", err.into());
                    break;
                }
            };
            if pool_balance < amount_wei {
                let err = PoolError::Consistency(format!(
                    "not enough balance for payment, need {} Wei, pool has {} Wei",
                    amount_wei, pool_balance
                ));
                self.critical("Insufficient funds", err);
                break;
            }

            // Critical section: lock -> debit -> send -> record. A failure
            // at any step leaves the pending payment and the lock behind for
            // RESOLVE_PAYOUT.
            if let Err(err) = self.store.lock_payouts(&login, amount).await {
                self.critical(&format!("Failed to lock payment for {login}"), err.into());
                break;
            }
            info!("Locked payment for {login}, {amount} Shannon");

            if let Err(err) = self.store.update_balance(&login, amount).await {
                self.critical(
                    &format!("Failed to update balance for {login}, {amount} Shannon"),
                    err.into(),
                );
                break;
            }

            let value = units::to_hex(&amount_wei);
            let tx_hash = match self
                .node
                .send_transaction(
                    &self.config.address,
                    &login,
                    &self.config.gas_hex(),
                    &self.config.gas_price_hex(),
                    &value,
                    self.config.auto_gas,
                )
                .await
            {
                Ok(hash) => hash,
                Err(err) => {
                    self.critical(
                        &format!(
                            "Failed to send payment to {login}, {amount} Shannon. \
                             Check the outgoing tx for {login} in the block explorer"
                        ),
                        err.into(),
                    );
                    break;
                }
            };

            if let Err(err) = self.store.write_payment(&login, &tx_hash, amount).await {
                self.critical(
                    &format!("Failed to log payment data for {login}, {amount} Shannon, tx {tx_hash}"),
                    err.into(),
                );
                break;
            }

            miners_paid += 1;
            total_amount += amount;
            info!("Paid {amount} Shannon to {login}, TxHash: {tx_hash}");

            self.wait_for_confirmation(&tx_hash, &login, CONFIRM_BLOCKS, HEAD_POLL_SECS)
                .await;
        }

        if must_pay > 0 {
            info!("Paid total {total_amount} Shannon to {miners_paid} of {must_pay} payees");
        } else {
            info!("No payees that have reached payout threshold");
        }

        if miners_paid > 0 && self.config.bgsave {
            self.bg_save().await;
        }
    }

    // -----------------------------------------------------------------
    // Batched exchange mode
    // -----------------------------------------------------------------

    /// Greedy batches of up to eight payees over the generate-then-commit
    /// flow. `exchange_clearUsedFlag` is the compensating action for every
    /// abort between a generated and a committed transaction: the generated
    /// payload reserves unspent roots on the node, and stranding them would
    /// wedge the account.
    pub async fn exchange_process(&mut self) {
        if self.halt {
            if let Some(err) = &self.last_fail {
                error!("Payments suspended due to last critical error: {err}");
            }
            return;
        }

        let sync = match self.node.get_pk_synced(&self.config.address).await {
            Ok(s) => s,
            Err(err) => {
                error!("Failed to read account sync state: {err}");
                return;
            }
        };
        if sync.highest_block < sync.current_block {
            warn!(
                "Payments suspended due to block syncing: {} {}",
                sync.current_block, sync.highest_block
            );
            return;
        }
        if sync.pk_block + PK_LAG_LIMIT < sync.current_block {
            warn!(
                "Payments suspended due to balance syncing: {} {}",
                sync.current_block, sync.pk_block
            );
            return;
        }

        let payees = match self.store.get_payees().await {
            Ok(p) => p,
            Err(err) => {
                error!("Error while retrieving payees from backend: {err}");
                return;
            }
        };

        let mut eligible: Vec<PayInfo> = Vec::new();
        let mut total_amount = 0u64;
        for login in payees {
            if !address::is_valid_address(&login) {
                warn!("Skipping payee with invalid address {login:?}");
                continue;
            }
            let amount = match self.store.get_balance(&login).await {
                Ok(a) => a,
                Err(err) => {
                    error!("Error while retrieving balance for {login}: {err}");
                    return;
                }
            };
            if !self.reached_threshold(amount) {
                continue;
            }
            total_amount += amount;
            eligible.push(PayInfo {
                miner: login,
                amount_wei: units::shannon_to_wei(amount),
                amount_shannon: amount,
            });
        }
        if eligible.is_empty() {
            info!("No payees that have reached payout threshold");
            return;
        }

        let mut pool_available = match self.node.get_max_available(&self.config.address).await {
            Ok(b) => b,
            Err(err) => {
                error!("Failed to read pool available balance: {err}");
                return;
            }
        };

        let must_pay = eligible.len();
        let mut miners_paid = 0usize;
        let mut batch: Vec<PayInfo> = Vec::new();
        let mut batch_shannon = 0u64;

        while miners_paid < must_pay {
            let next = &eligible[miners_paid];
            if pool_available > next.amount_wei && batch.len() < MAX_BATCH_SIZE {
                pool_available -= &next.amount_wei;
                batch_shannon += next.amount_shannon;
                batch.push(next.clone());
                miners_paid += 1;
                if miners_paid < must_pay {
                    continue;
                }
            }

            if batch.is_empty() {
                // Spendable outputs are still confirming; wait them out.
                sleep(Duration::from_secs(FUNDS_RETRY_SECS)).await;
                match self.node.get_max_available(&self.config.address).await {
                    Ok(b) => pool_available = b,
                    Err(err) => warn!("Failed to read pool available balance: {err}"),
                }
                continue;
            }

            if !self.pay_batch(&batch, batch_shannon, sync.confirm_block).await {
                return;
            }
            info!(
                "Batch paid total {batch_shannon} Shannon to {} of {must_pay} payees",
                batch.len()
            );

            batch.clear();
            batch_shannon = 0;
            match self.node.get_max_available(&self.config.address).await {
                Ok(b) => pool_available = b,
                Err(err) => warn!("Failed to read pool available balance: {err}"),
            }
        }

        info!("Paid total {total_amount} Shannon to {miners_paid} of {must_pay} payees");

        if miners_paid > 0 && self.config.bgsave {
            self.bg_save().await;
        }
    }

    /// One batch through the critical section. Returns false when the run
    /// must stop.
    async fn pay_batch(&mut self, batch: &[PayInfo], batch_shannon: u64, confirm_block: u64) -> bool {
        if !self.unlocked_account().await {
            return false;
        }

        // The whole batch must be coverable before anything is signed.
        let batch_total_wei: BigUint = batch.iter().map(|p| p.amount_wei.clone()).sum();
        match self.node.get_balance(&self.config.address).await {
            Ok(balance) if balance < batch_total_wei => {
                let err = PoolError::Consistency(format!(
                    "not enough balance for batch, need {} Wei, pool has {} Wei",
                    batch_total_wei, balance
                ));
                self.critical("Insufficient funds", err);
                return false;
            }
            Ok(_) => {}
            Err(err) => {
                self.critical("Failed to read pool balance", err.into());
                return false;
            }
        }

        let pays: Vec<(String, BigUint)> = batch
            .iter()
            .map(|p| (p.miner.clone(), p.amount_wei.clone()))
            .collect();

        let (raw, tx_hash) = match self
            .node
            .gen_tx_with_sign(&self.config.address, EXCHANGE_GAS, EXCHANGE_GAS_PRICE, &pays)
            .await
        {
            Ok(generated) => generated,
            Err(err) => {
                error!("Failed to generate signed tx for {} payees: {err}", batch.len());
                self.clear_exchange().await;
                return false;
            }
        };

        if let Err(err) = self
            .store
            .lock_payouts(EXCHANGE_LOCK_HOLDER, batch_shannon)
            .await
        {
            self.clear_exchange().await;
            self.critical("Failed to lock batch payment", err.into());
            return false;
        }
        info!("Locked payment for {} payees, {batch_shannon} Shannon", batch.len());

        for entry in batch {
            if let Err(err) = self
                .store
                .update_balance_with_tx(&entry.miner, entry.amount_shannon, &tx_hash)
                .await
            {
                self.clear_exchange().await;
                self.critical(
                    &format!(
                        "Failed to debit {} ({} Shannon) against tx {tx_hash}",
                        entry.miner, entry.amount_shannon
                    ),
                    err.into(),
                );
                return false;
            }
        }

        if let Err(err) = self.node.commit_tx(&raw, &tx_hash).await {
            self.clear_exchange().await;
            self.critical(&format!("Failed to commit tx {tx_hash}"), err.into());
            return false;
        }

        for entry in batch {
            if let Err(err) = self
                .store
                .write_exchange_payment(&entry.miner, &tx_hash, entry.amount_shannon)
                .await
            {
                self.critical(
                    &format!(
                        "Failed to log payment data for {}, {} Shannon, tx {tx_hash}",
                        entry.miner, entry.amount_shannon
                    ),
                    err.into(),
                );
                return false;
            }
            info!(
                "Paid {} Shannon to {} with TxHash: {tx_hash}",
                entry.amount_shannon, entry.miner
            );
        }

        if let Err(err) = self.store.unlock_payouts().await {
            self.critical("Failed to unlock payouts", err.into());
            return false;
        }

        self.wait_for_confirmation(&tx_hash, "batch", confirm_block, EXCHANGE_HEAD_POLL_SECS)
            .await;
        true
    }

    async fn clear_exchange(&self) {
        if let Err(err) = self.node.clear_exchange(&self.config.address).await {
            error!("Failed to clear exchange used-root flags: {err}");
        }
    }

    // -----------------------------------------------------------------
    // Shared gates and waits
    // -----------------------------------------------------------------

    /// Polls the receipt until the tx is mined, then the head until it is
    /// buried `confirm_blocks` deep. Unbounded on purpose: if the tx never
    /// confirms the operator has to look anyway, and the next tick must
    /// still observe this state.
    async fn wait_for_confirmation(
        &self,
        tx_hash: &str,
        payee: &str,
        confirm_blocks: u64,
        head_poll_secs: u64,
    ) {
        loop {
            info!("Waiting for tx confirmation: {tx_hash}");
            sleep(Duration::from_secs(RECEIPT_POLL_SECS)).await;
            let receipt = match self.node.get_tx_receipt(tx_hash).await {
                Ok(r) => r,
                Err(err) => {
                    warn!("Failed to get tx receipt for {tx_hash}: {err}");
                    continue;
                }
            };
            let Some(receipt) = receipt else { continue };
            if !receipt.confirmed() {
                continue;
            }

            if receipt.successful() {
                info!("Payout tx successful for {payee}: {tx_hash}");
            } else {
                error!("Payout tx FAILED for {payee}: {tx_hash}. Receiver throws on incoming tx");
            }

            let tx_block = match units::parse_hex_u64(&receipt.block_number) {
                Ok(n) => n,
                Err(err) => {
                    warn!("Bad block number in receipt for {tx_hash}: {err}");
                    continue;
                }
            };
            let mut current = self.node.get_block_number().await.unwrap_or(0);
            while current < tx_block + confirm_blocks {
                sleep(Duration::from_secs(head_poll_secs)).await;
                current = self.node.get_block_number().await.unwrap_or(current);
                info!(
                    "{tx_hash} waiting for balance confirmation: tx block {tx_block}, current block {current}"
                );
            }
            return;
        }
    }

    async fn unlocked_account(&self) -> bool {
        match self.node.address_unlocked(&self.config.address).await {
            Ok(unlocked) => {
                if !unlocked {
                    warn!("Unable to process payouts: the payout account is locked");
                }
                unlocked
            }
            Err(err) => {
                error!("Unable to process payouts: {err}");
                false
            }
        }
    }

    async fn check_peers(&self) -> bool {
        match self.node.get_peer_count().await {
            Ok(n) if n < self.config.require_peers => {
                warn!(
                    "Unable to process payouts, node has {n} peers, required {}",
                    self.config.require_peers
                );
                false
            }
            Ok(_) => true,
            Err(err) => {
                error!("Unable to process payouts, failed to retrieve peer count: {err}");
                false
            }
        }
    }

    /// Strict: a balance exactly at the threshold is not swept.
    fn reached_threshold(&self, amount: u64) -> bool {
        amount > self.config.threshold
    }

    async fn bg_save(&self) {
        match self.store.bg_save().await {
            Ok(result) => info!("Saving backend state to disk: {result}"),
            Err(err) => error!("Failed to perform background save on backend: {err}"),
        }
    }

    // -----------------------------------------------------------------
    // Resolvers
    // -----------------------------------------------------------------

    /// Credits every single-mode pending payment back and unlocks. Stops at
    /// the first failure and leaves the remainder for the next invocation.
    pub async fn resolve_payouts(&mut self) {
        let payments = match self.store.get_pending_payments().await {
            Ok(p) => p,
            Err(err) => {
                error!("Failed to read pending payments: {err}");
                return;
            }
        };

        if payments.is_empty() {
            info!("No pending payments to resolve");
        } else {
            info!(
                "Will credit back following balances:\n{}",
                format_pending_payments(&payments)
            );
            for payment in &payments {
                if let Err(err) = self
                    .store
                    .rollback_balance(&payment.address, payment.amount)
                    .await
                {
                    error!(
                        "Failed to credit {} Shannon back to {}: {err}",
                        payment.amount, payment.address
                    );
                    return;
                }
                info!(
                    "Credited {} Shannon back to {}",
                    payment.amount, payment.address
                );
            }
            if let Err(err) = self.store.unlock_payouts().await {
                error!("Failed to unlock payouts: {err}");
                return;
            }
        }

        if self.config.bgsave {
            self.bg_save().await;
        }
        info!("Payouts unlocked");
    }

    /// Exchange variant: the rollback also clears the per-payee tx binding
    /// so the debit can be retried under a fresh transaction.
    pub async fn resolve_exchange_payouts(&mut self) {
        let payments = match self.store.get_pending_exchange_payments().await {
            Ok(p) => p,
            Err(err) => {
                error!("Failed to read pending exchange payments: {err}");
                return;
            }
        };

        if payments.is_empty() {
            info!("No pending payments to resolve");
        } else {
            info!(
                "Will credit back following balances:\n{}",
                format_pending_payments(&payments)
            );
            for payment in &payments {
                let tx_hash = payment.tx_hash.as_deref().unwrap_or_default();
                if let Err(err) = self
                    .store
                    .rollback_exchange_balance(&payment.address, payment.amount, tx_hash)
                    .await
                {
                    error!(
                        "Failed to credit {} Shannon back to {}: {err}",
                        payment.amount, payment.address
                    );
                    return;
                }
                info!(
                    "Credited {} Shannon back to {}",
                    payment.amount, payment.address
                );
            }
            if let Err(err) = self.store.unlock_payouts().await {
                error!("Failed to unlock payouts: {err}");
                return;
            }
        }

        if self.config.bgsave {
            self.bg_save().await;
        }
        info!("Payouts unlocked");
    }
}

fn must_resolve_payout() -> bool {
    match std::env::var(RESOLVE_ENV) {
        Ok(value) => matches!(value.trim(), "1" | "t" | "T" | "true" | "TRUE" | "True"),
        Err(_) => false,
    }
}

fn format_pending_payments(list: &[PendingPayment]) -> String {
    list.iter()
        .map(|p| format!("\t{p}"))
        .collect::<Vec<_>>()
        .join("\n")
}
