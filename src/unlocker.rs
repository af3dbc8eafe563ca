//! Block maturation pipeline.
//!
//! Periodically reconciles the candidates recorded by the share pipeline
//! against the canonical chain, promotes them to immature and then matured,
//! and credits miner balances. Any failure mid-pass latches `halt`: the
//! failures that land here (node disagreement, store loss) need a human, and
//! the next restart rediscovers the same candidates.

use num_bigint::BigInt;
use num_rational::BigRational;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{error, info, warn};

use crate::address;
use crate::config::UnlockerConfig;
use crate::constants::depth::MIN_DEPTH;
use crate::error::{PoolError, Result};
use crate::node::{BlockReply, NodeRpc};
use crate::reward::block_reward;
use crate::storage::{LedgerStore, Rewards, Shares};
use crate::types::{BlockData, UnlockResult};
use crate::units;

pub struct BlockUnlocker {
    config: UnlockerConfig,
    store: Arc<dyn LedgerStore>,
    node: Arc<dyn NodeRpc>,
    halt: bool,
    last_fail: Option<PoolError>,
}

impl BlockUnlocker {
    pub fn new(
        config: &UnlockerConfig,
        store: Arc<dyn LedgerStore>,
        node: Arc<dyn NodeRpc>,
    ) -> Result<Self> {
        if !(0.0..=100.0).contains(&config.pool_fee) {
            return Err(PoolError::Config(format!(
                "pool fee must be within [0, 100], got {}",
                config.pool_fee
            )));
        }
        if !config.pool_fee_address.is_empty() && !address::is_valid_address(&config.pool_fee_address)
        {
            return Err(PoolError::Config(format!(
                "invalid pool fee address {}",
                config.pool_fee_address
            )));
        }
        if config.depth < MIN_DEPTH * 2 {
            return Err(PoolError::Config(format!(
                "block maturity depth can't be < {}, got {}",
                MIN_DEPTH * 2,
                config.depth
            )));
        }
        if config.immature_depth < MIN_DEPTH {
            return Err(PoolError::Config(format!(
                "immature depth can't be < {}, got {}",
                MIN_DEPTH, config.immature_depth
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

    /// Runs one unlocking round immediately, then on every interval tick.
    pub fn start(mut self) {
        let interval = Duration::from_secs(self.config.interval_secs);
        info!("Starting block unlocker, interval {:?}", interval);
        tokio::spawn(async move {
            loop {
                self.unlock_pending_blocks().await;
                self.unlock_and_credit_miners().await;
                sleep(interval).await;
            }
        });
    }

    pub fn halted(&self) -> bool {
        self.halt
    }

    fn critical(&mut self, context: &str, err: PoolError) {
        error!("{context}: {err}");
        self.halt = true;
        self.last_fail = Some(err);
    }

    /// First pass: promote deep-enough candidates to immature records and
    /// stash per-miner pending credits.
    pub async fn unlock_pending_blocks(&mut self) {
        if self.halt {
            if let Some(err) = &self.last_fail {
                error!("Unlocking suspended due to last critical error: {err}");
            }
            return;
        }
        if let Err(err) = self.immature_pass().await {
            self.critical("Failed to unlock pending blocks", err);
        }
    }

    /// Second pass: re-reconcile immature records past the full maturity
    /// depth and credit spendable balances.
    pub async fn unlock_and_credit_miners(&mut self) {
        if self.halt {
            if let Some(err) = &self.last_fail {
                error!("Unlocking suspended due to last critical error: {err}");
            }
            return;
        }
        if let Err(err) = self.matured_pass().await {
            self.critical("Failed to credit miners", err);
        }
    }

    async fn current_height(&self) -> Result<u64> {
        let tip = self
            .node
            .get_pending_block()
            .await?
            .ok_or_else(|| PoolError::Parse("node returned no pending block".into()))?;
        units::parse_hex_u64(&tip.number)
    }

    async fn immature_pass(&self) -> Result<()> {
        let current_height = self.current_height().await?;

        let candidates = self
            .store
            .get_candidates(current_height.saturating_sub(self.config.immature_depth))
            .await?;
        if candidates.is_empty() {
            info!("No block candidates to unlock");
            return Ok(());
        }

        let result = self.unlock_candidates(candidates).await?;
        info!(
            "Immature {} blocks, {} uncles, {} orphans",
            result.blocks, result.uncles, result.orphans
        );

        self.store
            .write_pending_orphans(&result.orphaned_blocks)
            .await?;
        info!("Inserted {} orphaned blocks to backend", result.orphans);

        let mut session = SessionTotals::default();
        for block in &result.matured_blocks {
            let (revenue, miners_profit, pool_profit, rewards) =
                self.calculate_rewards(block).await?;
            self.store.write_immature_block(block, &rewards).await?;
            session.add(&revenue, &miners_profit, &pool_profit);
            log_round("IMMATURE", block, &revenue, &miners_profit, &pool_profit, &rewards);
        }
        session.log("IMMATURE SESSION");
        Ok(())
    }

    async fn matured_pass(&self) -> Result<()> {
        let current_height = self.current_height().await?;

        let immature = self
            .store
            .get_immature_blocks(current_height.saturating_sub(self.config.depth))
            .await?;
        if immature.is_empty() {
            info!("No immature blocks to credit miners");
            return Ok(());
        }

        let result = self.unlock_candidates(immature).await?;
        info!(
            "Unlocked {} blocks, {} uncles, {} orphans",
            result.blocks, result.uncles, result.orphans
        );

        for block in &result.orphaned_blocks {
            self.store.write_orphan(block).await?;
        }
        info!("Inserted {} orphaned blocks to backend", result.orphans);

        let mut session = SessionTotals::default();
        for block in &result.matured_blocks {
            let (revenue, miners_profit, pool_profit, rewards) =
                self.calculate_rewards(block).await?;
            self.store.write_matured_block(block, &rewards).await?;
            session.add(&revenue, &miners_profit, &pool_profit);
            log_round("MATURED", block, &revenue, &miners_profit, &pool_profit, &rewards);
        }
        session.log("MATURE SESSION");
        Ok(())
    }

    /// The pool's recorded height is only a reference: shares are stamped
    /// against the pool's tip of the moment, which drifts from canonical
    /// near forks. Probe a window of half-width `MIN_DEPTH` around it; the
    /// first matching block wins and rewrites the authoritative height. No
    /// match in the window means the block is lost.
    async fn unlock_candidates(&self, candidates: Vec<BlockData>) -> Result<UnlockResult> {
        let mut result = UnlockResult::default();

        for mut candidate in candidates {
            let mut orphan = true;

            for offset in -(MIN_DEPTH as i64)..MIN_DEPTH as i64 {
                let height = candidate.height as i64 + offset;
                if height < 0 {
                    continue;
                }

                let block = self
                    .node
                    .get_block_by_height(height as u64)
                    .await?
                    .ok_or_else(|| {
                        PoolError::Consistency(format!(
                            "missing block {height} on node, wrong node height"
                        ))
                    })?;

                if match_candidate(&block, &candidate) {
                    orphan = false;
                    result.blocks += 1;
                    self.handle_block(&block, &mut candidate).await?;
                    info!(
                        "Mature block {} with {} tx, hash: {}",
                        candidate.height,
                        block.transactions.len(),
                        &candidate.hash[..candidate.hash.len().min(10)]
                    );
                    result.matured_blocks.push(candidate.clone());
                    break;
                }
            }

            if orphan {
                result.orphans += 1;
                candidate.orphan = true;
                warn!("Orphaned block {}:{}", candidate.round_height, candidate.nonce);
                result.orphaned_blocks.push(candidate);
            }
        }
        Ok(result)
    }

    /// Rewrites the candidate as matured: authoritative height, canonical
    /// hash, and the full reward with fee revenue applied.
    async fn handle_block(&self, block: &BlockReply, candidate: &mut BlockData) -> Result<()> {
        let correct_height = units::parse_hex_u64(&block.number)?;
        candidate.height = correct_height;

        let mut reward = block_reward(correct_height, candidate.difficulty);

        let fee_revenue = self.tx_fee_revenue(block).await?;
        if self.config.keep_tx_fees {
            candidate.extra_reward = Some(fee_revenue);
        } else {
            reward += fee_revenue;
        }

        candidate.orphan = false;
        candidate.hash = block.hash.clone();
        candidate.reward = reward;
        Ok(())
    }

    /// Sums `gasUsed * gasPrice` over every mined transaction's receipt.
    async fn tx_fee_revenue(&self, block: &BlockReply) -> Result<num_bigint::BigUint> {
        let mut amount = num_bigint::BigUint::from(0u8);
        for tx in &block.transactions {
            if let Some(receipt) = self.node.get_tx_receipt(&tx.hash).await? {
                let gas_used = units::parse_hex_big(&receipt.gas_used)?;
                let gas_price = units::parse_hex_big(&tx.gas_price)?;
                amount += gas_used * gas_price;
            }
        }
        Ok(amount)
    }

    /// Splits one matured block's revenue into pool and miner profits and
    /// allocates per-miner Shannon credits by share count.
    async fn calculate_rewards(
        &self,
        block: &BlockData,
    ) -> Result<(BigRational, BigRational, BigRational, Rewards)> {
        let mut revenue = BigRational::from_integer(BigInt::from(block.reward.clone()));
        let (miners_profit, mut pool_profit) = charge_fee(&revenue, self.config.pool_fee);

        let shares = self
            .store
            .get_round_shares(block.round_height, &block.nonce)
            .await?;
        let mut rewards = rewards_for_shares(&shares, block.total_shares, &miners_profit)?;

        if let Some(extra) = &block.extra_reward {
            let extra = BigRational::from_integer(BigInt::from(extra.clone()));
            pool_profit += &extra;
            revenue += &extra;
        }

        if !self.config.pool_fee_address.is_empty() {
            *rewards
                .entry(self.config.pool_fee_address.clone())
                .or_insert(0) += units::wei_to_shannon(&pool_profit);
        }

        Ok((revenue, miners_profit, pool_profit, rewards))
    }
}

fn match_candidate(block: &BlockReply, candidate: &BlockData) -> bool {
    // An immature record already carries the canonical hash
    if !candidate.hash.is_empty() && block.hash.eq_ignore_ascii_case(&candidate.hash) {
        return true;
    }
    if !block.nonce.is_empty() {
        return block.nonce.eq_ignore_ascii_case(&candidate.nonce);
    }
    // Parity-style engines expose the nonce as the second seal field
    if block.seal_fields.len() == 2 {
        return candidate.nonce.eq_ignore_ascii_case(&block.seal_fields[1]);
    }
    false
}

/// Returns `(value - fee, fee)` for a percentage fee.
fn charge_fee(value: &BigRational, fee_percent: f64) -> (BigRational, BigRational) {
    let ratio = BigRational::from_float(fee_percent / 100.0)
        .unwrap_or_else(|| BigRational::from_integer(BigInt::from(0)));
    let fee = value * ratio;
    (value - &fee, fee)
}

fn rewards_for_shares(
    shares: &Shares,
    total_shares: u64,
    reward: &BigRational,
) -> Result<Rewards> {
    let mut rewards = Rewards::new();
    if shares.is_empty() {
        return Ok(rewards);
    }
    if total_shares == 0 {
        return Err(PoolError::Consistency(
            "round has shares but zero total share count".into(),
        ));
    }
    for (login, n) in shares {
        let percent = BigRational::new(BigInt::from(*n), BigInt::from(total_shares));
        let worker_reward = reward * percent;
        *rewards.entry(login.clone()).or_insert(0) += units::wei_to_shannon(&worker_reward);
    }
    Ok(rewards)
}

#[derive(Default)]
struct SessionTotals {
    revenue: Option<BigRational>,
    miners_profit: Option<BigRational>,
    pool_profit: Option<BigRational>,
}

impl SessionTotals {
    fn add(&mut self, revenue: &BigRational, miners: &BigRational, pool: &BigRational) {
        let acc = |slot: &mut Option<BigRational>, v: &BigRational| {
            *slot = Some(match slot.take() {
                Some(cur) => cur + v,
                None => v.clone(),
            });
        };
        acc(&mut self.revenue, revenue);
        acc(&mut self.miners_profit, miners);
        acc(&mut self.pool_profit, pool);
    }

    fn log(&self, label: &str) {
        if let (Some(revenue), Some(miners), Some(pool)) =
            (&self.revenue, &self.miners_profit, &self.pool_profit)
        {
            info!(
                "{label}: revenue {}, miners profit {}, pool profit: {}",
                units::format_ether(revenue),
                units::format_ether(miners),
                units::format_ether(pool)
            );
        }
    }
}

fn log_round(
    label: &str,
    block: &BlockData,
    revenue: &BigRational,
    miners_profit: &BigRational,
    pool_profit: &BigRational,
    rewards: &Rewards,
) {
    let mut entries = vec![format!(
        "{label} {}: revenue {}, miners profit {}, pool profit: {}",
        block.round_key(),
        units::format_ether(revenue),
        units::format_ether(miners_profit),
        units::format_ether(pool_profit)
    )];
    for (login, reward) in rewards {
        entries.push(format!(
            "\tREWARD {}: {}: {} Shannon",
            block.round_key(),
            login,
            reward
        ));
    }
    info!("{}", entries.join("\n"));
}
