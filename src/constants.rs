//! Protocol constants for the SERO chain as seen by the pool back-office.
//!
//! Centralizes the subsidy-schedule parameters and maturity depths so the
//! unlocker and payer never carry loose magic numbers.

/// Subsidy schedule parameters.
pub mod chain {
    /// Block height activating the era-v3 reward curve.
    pub const SIP3_HEIGHT: u64 = 3_460_000;

    /// First halving height. The divisor doubles every `HALVE_INTERVAL`
    /// blocks after it.
    pub const HALVE_HEIGHT: u64 = 3_057_600;
    pub const HALVE_INTERVAL: u64 = 8_294_400;

    /// Era-v2 base subsidy in Shannon: multiplied up to Wei in the schedule.
    pub const ORI_REWARD_SHANNON: u64 = 66_773_505_743;

    /// Difficulty breakpoints of the era-v2 piecewise ratio.
    pub const DIFFICULTY_L1: u64 = 340_000_000;
    pub const DIFFICULTY_L2: u64 = 1_700_000_000;
    pub const DIFFICULTY_L3: u64 = 4_000_000_000;
    pub const DIFFICULTY_L4: u64 = 17_000_000_000;

    /// Per-segment slope coefficients of the era-v2 ratio.
    pub const SLOPE_L1_L2: u64 = 16_470_000_000;
    pub const SLOPE_L2_L3: u64 = 2_170_000_000;
    pub const SLOPE_L3_L4: u64 = 2_590_000_000;

    /// Era-v3 linear curve: `reward = ARG_A * (difficulty / 10^9) + ARG_B`,
    /// clamped to `[176, 445] * 10^17` Wei before halving.
    pub const REWARD_V3_ARG_A: u64 = 985_347_985_347_985;
    pub const REWARD_V3_ARG_B: u64 = 16_910_256_410_256_400_000;
    pub const REWARD_V3_LOW: u64 = 176;
    pub const REWARD_V3_HIGH: u64 = 445;

    /// Base unit of the piecewise ratio, 10^17 Wei.
    pub const RATIO_BASE_POW10: u32 = 17;
}

/// Maturity and confirmation depths.
pub mod depth {
    /// Half-width of the candidate search window, and the floor for the
    /// configured immature depth.
    pub const MIN_DEPTH: u64 = 16;

    /// Blocks on top of a payout tx before the next payee is processed
    /// (single-recipient mode).
    pub const CONFIRM_BLOCKS: u64 = 16;

    /// Exchange mode refuses to pay while the local balance view trails the
    /// chain head by more than this many blocks.
    pub const PK_LAG_LIMIT: u64 = 128;
}

/// Payout engine tuning.
pub mod payouts {
    /// Hard cap on payees per exchange-mode transaction.
    pub const MAX_BATCH_SIZE: usize = 8;

    /// Gas settings for exchange-mode generated transactions.
    pub const EXCHANGE_GAS: u64 = 25_000;
    pub const EXCHANGE_GAS_PRICE: u64 = 1_000_000_000;

    /// Lock holder recorded while a batched payout is in flight.
    pub const EXCHANGE_LOCK_HOLDER: &str = "exchange_paying";

    /// Poll cadences of the confirmation waits, in seconds.
    pub const RECEIPT_POLL_SECS: u64 = 5;
    pub const HEAD_POLL_SECS: u64 = 13;
    pub const EXCHANGE_HEAD_POLL_SECS: u64 = 5;

    /// Back-off while the exchange batcher waits for spendable funds.
    pub const FUNDS_RETRY_SECS: u64 = 15;
}

/// Currency symbol used on the node's token-map interfaces.
pub const CURRENCY: &str = "SERO";
