use chrono::{TimeZone, Utc};
use num_bigint::BigUint;
use serde::{Deserialize, Serialize};
use std::fmt;

/// One claimed block moving through the maturation pipeline.
///
/// `round_height` is the pool's height at discovery and is only a reference
/// point; `height` becomes authoritative once the reconciler matches the
/// claim against a canonical block. The record is written exactly twice by
/// the unlocker: once immature, once matured (or orphaned).
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct BlockData {
    pub round_height: u64,
    pub height: u64,
    pub nonce: String,
    pub hash: String,
    pub timestamp: i64,
    pub difficulty: u64,
    pub total_shares: u64,
    pub orphan: bool,
    /// Base subsidy in Wei, set at maturation.
    pub reward: BigUint,
    /// Transaction-fee revenue kept by the pool when `keep_tx_fees` is on.
    pub extra_reward: Option<BigUint>,
}

impl BlockData {
    /// Key of the share round this block closes.
    pub fn round_key(&self) -> String {
        format!("{}:{}", self.round_height, self.nonce)
    }
}

/// A payout that has been locked (and possibly debited) but not yet
/// confirmed on-chain. Survives a crash so the operator can reconcile.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PendingPayment {
    pub address: String,
    /// Shannon.
    pub amount: u64,
    /// Unix seconds at lock time.
    pub timestamp: i64,
    /// Bound transaction hash; only exchange-mode entries carry one.
    pub tx_hash: Option<String>,
}

impl fmt::Display for PendingPayment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let when = Utc
            .timestamp_opt(self.timestamp, 0)
            .single()
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| self.timestamp.to_string());
        write!(
            f,
            "Address: {}, Amount: {} Shannon, {}",
            self.address, self.amount, when
        )
    }
}

/// Process-wide payout mutex persisted in the store. While held, no second
/// payout run may start; after a crash it doubles as the recovery marker.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct PayoutsLock {
    pub holder: String,
    /// Shannon locked for the in-flight payout.
    pub amount: u64,
    pub timestamp: i64,
}

/// A confirmed, recorded disbursement.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub struct Payment {
    pub login: String,
    pub tx_hash: String,
    /// Shannon.
    pub amount: u64,
    pub timestamp: i64,
}

/// Outcome of one reconciliation sweep over candidates or immature blocks.
#[derive(Debug, Default)]
pub struct UnlockResult {
    pub blocks: usize,
    pub uncles: usize,
    pub orphans: usize,
    pub matured_blocks: Vec<BlockData>,
    pub orphaned_blocks: Vec<BlockData>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(round_height: u64, nonce: &str) -> BlockData {
        BlockData {
            round_height,
            height: round_height,
            nonce: nonce.to_string(),
            hash: String::new(),
            timestamp: 0,
            difficulty: 1,
            total_shares: 1,
            orphan: false,
            reward: BigUint::from(0u8),
            extra_reward: None,
        }
    }

    #[test]
    fn round_key_uses_reference_height() {
        let mut b = block(1000, "0xabc");
        b.height = 1002; // authoritative rewrite must not change the round key
        assert_eq!(b.round_key(), "1000:0xabc");
    }

    #[test]
    fn pending_payment_display() {
        let p = PendingPayment {
            address: "2mB5…".to_string(),
            amount: 540,
            timestamp: 0,
            tx_hash: None,
        };
        let s = p.to_string();
        assert!(s.contains("540 Shannon"));
        assert!(s.contains("1970"));
    }
}
