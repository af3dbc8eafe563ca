//! SERO account addresses.
//!
//! Pool interfaces speak base58; the exchange RPC family wants `0x`-hex.
//! This module is the single adapter between the two. Cryptographic validity
//! of a key (the superzk curve check) is the node's concern; the pool only
//! verifies base58 shape and the two legal payload widths.

use num_bigint::BigUint;
use thiserror::Error;

/// 64 bytes: a bare public key (PK).
pub const PK_LEN: usize = 64;
/// 96 bytes: a diversified address (PKr).
pub const PKR_LEN: usize = 96;

const BASE58_ALPHABET: &[u8] = b"123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AddressError {
    #[error("invalid base58 character {0:?}")]
    InvalidBase58(char),
    #[error("invalid address payload length {0}, expected 64 or 96 bytes")]
    InvalidLength(usize),
    #[error("invalid hex address: {0}")]
    InvalidHex(String),
}

pub fn encode_base58(data: &[u8]) -> String {
    let mut num = BigUint::from_bytes_be(data);
    let base = BigUint::from(58u32);
    let zero = BigUint::from(0u32);
    let mut result = String::new();

    while num > zero {
        let remainder = &num % &base;
        num /= &base;
        let digits = remainder.to_u32_digits();
        let idx = if digits.is_empty() { 0 } else { digits[0] } as usize;
        result.insert(0, BASE58_ALPHABET[idx] as char);
    }

    // Leading zero bytes map to leading '1's
    for &byte in data {
        if byte == 0 {
            result.insert(0, '1');
        } else {
            break;
        }
    }

    result
}

pub fn decode_base58(s: &str) -> Result<Vec<u8>, AddressError> {
    let mut num = BigUint::from(0u32);
    let base = BigUint::from(58u32);

    for ch in s.chars() {
        let idx = BASE58_ALPHABET
            .iter()
            .position(|&c| c == ch as u8)
            .ok_or(AddressError::InvalidBase58(ch))?;
        num = num * &base + idx;
    }

    let mut bytes = num.to_bytes_be();
    if bytes == [0] {
        bytes.clear();
    }

    let leading_ones = s.chars().take_while(|&c| c == '1').count();
    let mut result = vec![0u8; leading_ones];
    result.append(&mut bytes);

    Ok(result)
}

/// Decodes an address and checks it is one of the two legal payload widths.
pub fn decode_address(s: &str) -> Result<Vec<u8>, AddressError> {
    let out = decode_base58(s)?;
    match out.len() {
        PK_LEN | PKR_LEN => Ok(out),
        n => Err(AddressError::InvalidLength(n)),
    }
}

pub fn is_valid_address(s: &str) -> bool {
    decode_address(s).is_ok()
}

/// base58 -> `0x`-hex, used only at the exchange RPC boundary.
pub fn base58_to_hex(s: &str) -> Result<String, AddressError> {
    Ok(format!("0x{}", hex::encode(decode_address(s)?)))
}

/// `0x`-hex -> base58, for logging replies that carry hex addresses.
pub fn hex_to_base58(s: &str) -> Result<String, AddressError> {
    let digits = s.strip_prefix("0x").unwrap_or(s);
    let bytes = hex::decode(digits).map_err(|e| AddressError::InvalidHex(e.to_string()))?;
    Ok(encode_base58(&bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(payload: &[u8]) {
        let encoded = encode_base58(payload);
        let decoded = decode_base58(&encoded).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn base58_round_trip_pk_and_pkr() {
        let mut pk = [0u8; PK_LEN];
        let mut pkr = [0u8; PKR_LEN];
        for (i, b) in pk.iter_mut().enumerate() {
            *b = (i * 7 + 3) as u8;
        }
        for (i, b) in pkr.iter_mut().enumerate() {
            *b = (i * 11 + 5) as u8;
        }
        round_trip(&pk);
        round_trip(&pkr);
    }

    #[test]
    fn base58_preserves_leading_zeros() {
        let mut payload = [0u8; PK_LEN];
        payload[3] = 0xff;
        let encoded = encode_base58(&payload);
        assert!(encoded.starts_with("111"));
        assert_eq!(decode_base58(&encoded).unwrap(), payload);
    }

    #[test]
    fn hex_adapter_round_trip() {
        let payload: Vec<u8> = (0..PKR_LEN as u8).collect();
        let b58 = encode_base58(&payload);
        let hex = base58_to_hex(&b58).unwrap();
        assert!(hex.starts_with("0x"));
        assert_eq!(hex.len(), 2 + PKR_LEN * 2);
        assert_eq!(hex_to_base58(&hex).unwrap(), b58);
    }

    #[test]
    fn rejects_bad_lengths_and_characters() {
        // 32 bytes decodes fine but is not a legal account width
        let short = encode_base58(&[0xaau8; 32]);
        assert_eq!(
            decode_address(&short).unwrap_err(),
            AddressError::InvalidLength(32)
        );
        assert!(!is_valid_address(&short));

        // '0', 'O', 'I', 'l' are outside the alphabet
        assert!(matches!(
            decode_base58("0OIl"),
            Err(AddressError::InvalidBase58('0'))
        ));
    }
}
