//! Block subsidy schedule.
//!
//! Pure function of `(height, difficulty)`, piecewise over two protocol eras
//! split at the SIP3 activation height. All arithmetic is exact big-integer;
//! divisions truncate toward zero. Transaction-fee revenue is layered on top
//! by the unlocker, never here.

use num_bigint::BigUint;

use crate::constants::chain;

fn ratio_base() -> BigUint {
    BigUint::from(10u8).pow(chain::RATIO_BASE_POW10)
}

/// Era-v2 base subsidy in Wei before halving.
fn ori_reward() -> BigUint {
    BigUint::from(chain::ORI_REWARD_SHANNON) * BigUint::from(1_000_000_000u64)
}

/// `2^i` with `i = (height - HALVE_HEIGHT) / HALVE_INTERVAL + 1`.
/// Callers only invoke this for `height >= HALVE_HEIGHT`.
fn halving_divisor(height: u64) -> BigUint {
    let i = (height - chain::HALVE_HEIGHT) / chain::HALVE_INTERVAL + 1;
    BigUint::from(2u8).pow(i as u32)
}

/// Base reward in Wei for a block mined at `height` with `difficulty`.
pub fn block_reward(height: u64, difficulty: u64) -> BigUint {
    if height >= chain::SIP3_HEIGHT {
        reward_v3(height, difficulty)
    } else {
        reward_v2(height, difficulty)
    }
}

fn reward_v2(height: u64, difficulty: u64) -> BigUint {
    let mut reward_std = ori_reward();
    if height >= chain::HALVE_HEIGHT {
        reward_std /= halving_divisor(height);
    }

    let base = ratio_base();
    let diff = BigUint::from(difficulty);

    if difficulty < chain::DIFFICULTY_L1 {
        BigUint::from(10u8) * base
    } else if difficulty < chain::DIFFICULTY_L2 {
        let ratio = BigUint::from(56u8) * base
            + BigUint::from(chain::SLOPE_L1_L2) * (diff - BigUint::from(chain::DIFFICULTY_L1));
        reward_std * ratio / ori_reward()
    } else if difficulty < chain::DIFFICULTY_L3 {
        let ratio = BigUint::from(280u16) * base
            + BigUint::from(chain::SLOPE_L2_L3) * (diff - BigUint::from(chain::DIFFICULTY_L2));
        reward_std * ratio / ori_reward()
    } else if difficulty < chain::DIFFICULTY_L4 {
        let ratio = BigUint::from(330u16) * base
            + BigUint::from(chain::SLOPE_L3_L4) * (diff - BigUint::from(chain::DIFFICULTY_L3));
        reward_std * ratio / ori_reward()
    } else {
        reward_std
    }
}

fn reward_v3(height: u64, difficulty: u64) -> BigUint {
    let diff_giga = difficulty / 1_000_000_000;
    let mut reward =
        BigUint::from(chain::REWARD_V3_ARG_A) * BigUint::from(diff_giga) + BigUint::from(chain::REWARD_V3_ARG_B);

    let low = BigUint::from(chain::REWARD_V3_LOW) * ratio_base();
    let high = BigUint::from(chain::REWARD_V3_HIGH) * ratio_base();
    if reward < low {
        reward = low;
    } else if reward > high {
        reward = high;
    }

    // SIP3 activates past the first halving height, so the divisor is >= 2.
    reward / halving_divisor(height)
}
