//! Currency unit conversions.
//!
//! Balances are stored in Shannon (10^9 Wei); reward math runs in Wei with
//! exact rational intermediates. Conversions truncate toward zero.

use num_bigint::{BigInt, BigUint};
use num_rational::BigRational;
use num_traits::ToPrimitive;

use crate::error::PoolError;

pub fn shannon() -> BigUint {
    BigUint::from(1_000_000_000u64)
}

pub fn ether() -> BigUint {
    BigUint::from(10u8).pow(18)
}

/// Truncating Wei -> Shannon conversion of an exact rational amount.
pub fn wei_to_shannon(wei: &BigRational) -> u64 {
    let divisor = BigRational::from_integer(BigInt::from(shannon()));
    (wei / divisor).to_integer().to_u64().unwrap_or(0)
}

pub fn shannon_to_wei(amount: u64) -> BigUint {
    BigUint::from(amount) * shannon()
}

/// Parses a `0x`-prefixed hex quantity into a u64.
pub fn parse_hex_u64(s: &str) -> Result<u64, PoolError> {
    let digits = s.strip_prefix("0x").unwrap_or(s);
    u64::from_str_radix(digits, 16)
        .map_err(|e| PoolError::Parse(format!("bad hex quantity {s:?}: {e}")))
}

/// Parses a `0x`-prefixed hex quantity of arbitrary width.
pub fn parse_hex_big(s: &str) -> Result<BigUint, PoolError> {
    let digits = s.strip_prefix("0x").unwrap_or(s);
    BigUint::parse_bytes(digits.as_bytes(), 16)
        .ok_or_else(|| PoolError::Parse(format!("bad hex quantity {s:?}")))
}

pub fn to_hex(n: &BigUint) -> String {
    format!("0x{:x}", n)
}

/// Detects the zero-hash sentinel some nodes return instead of an error
/// from `sero_sendTransaction` ("0x000…0", "0x0", bare zeros).
pub fn is_zero_hash(s: &str) -> bool {
    let t = s.strip_prefix('0').unwrap_or(s);
    let t = t.strip_prefix('x').unwrap_or(t);
    !t.is_empty() && t.bytes().all(|b| b == b'0')
}

/// Renders a Wei-denominated rational as whole coins with 8 decimals, for
/// the session summary log lines.
pub fn format_ether(amount: &BigRational) -> String {
    let scale = BigInt::from(100_000_000u64);
    let coins = amount / BigRational::from_integer(BigInt::from(ether()));
    let scaled = (coins * BigRational::from_integer(scale.clone())).round();
    let cents = scaled.to_integer();
    let whole = &cents / &scale;
    let frac = &cents % &scale;
    format!("{}.{:08}", whole, frac.to_u64().unwrap_or(0))
}
