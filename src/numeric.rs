// Copyright (C) 2019  Braiins Systems s.r.o.
//
// This file is part of Braiins Open-Source Initiative (BOSI).
//
// BOSI is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.
//
// Please, keep in mind that we may also license BOSI or any part thereof
// under a proprietary license. For more information on the terms and conditions
// of such proprietary license or if you have any other questions, please
// contact us at opensource@braiins.com.

//! Hex/big-integer/target conversions (component C1).
//!
//! Big integers are `num_bigint::BigUint` rather than a fixed-width hash type: the
//! quantities here (network targets, difficulties) are compared and divided but never
//! hashed or byte-packed as a protocol message, so an arbitrary-precision integer is
//! the natural representation and avoids a fixed-width overflow class of bugs.

use lazy_static::lazy_static;
use num_bigint::BigUint;
use num_rational::BigRational;
use num_traits::{ToPrimitive, Zero};

use crate::error::{PoolError, Result};

lazy_static! {
    /// Canonical Ethash reference target `0x00000000ffff0000...0000`, the denominator
    /// used by `make_target`.
    pub static ref DIFF1: BigUint = BigUint::parse_bytes(
        b"00000000ffff0000000000000000000000000000000000000000000000000000",
        16,
    )
    .expect("BUG: DIFF1 literal is malformed");

    static ref POW_256: BigUint = BigUint::from(1u8) << 256u32;
}

/// `2^32`, the unit by which a float difficulty is turned into an accounting integer.
pub const POW_2X32: u64 = 1u64 << 32;

fn strip_0x(s: &str) -> &str {
    s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s)
}

/// Decode a `0x`-prefixed (or bare) hex string into bytes.
pub fn decode_hex(s: &str) -> Result<Vec<u8>> {
    hex::decode(strip_0x(s)).map_err(|e| PoolError::Numeric(format!("invalid hex: {}", e)))
}

/// Same as [`decode_hex`], but panics on malformed input. Only ever called on a
/// string that a regex has already validated as well-formed hex — per §7, a failure
/// here indicates a logic error, not bad user input.
pub fn must_decode_hex(s: &str) -> Vec<u8> {
    decode_hex(s).expect("BUG: regex-validated hex string failed to decode")
}

/// `target = 2^256 / bytes_as_bigint`, the network difficulty implied by a raw target.
pub fn target_hex_to_diff(target_hex: &str) -> Result<BigUint> {
    let bytes = decode_hex(target_hex)?;
    let target = BigUint::from_bytes_be(&bytes);
    if target.is_zero() {
        return Err(PoolError::Numeric("zero target has no difficulty".into()));
    }
    Ok(&*POW_256 / target)
}

/// `Diff1 / diff`, computed via exact rational arithmetic and truncated to an integer
/// quotient. Never goes through a `f64 -> bigint` shortcut, which would lose bits at
/// high difficulty (see design notes).
pub fn make_target(diff: f64) -> Result<BigUint> {
    if !diff.is_finite() || diff <= 0.0 {
        return Err(PoolError::Numeric(format!("invalid difficulty: {}", diff)));
    }
    let diff_rational = BigRational::from_float(diff)
        .ok_or_else(|| PoolError::Numeric(format!("cannot represent difficulty {}", diff)))?;
    let diff1_rational = BigRational::from_integer(DIFF1.clone().into());
    let quotient = diff1_rational / diff_rational;
    let truncated = quotient.to_integer();
    truncated
        .to_biguint()
        .ok_or_else(|| PoolError::Numeric("target computation went negative".into()))
}

/// `make_target(diff)` formatted as lowercase hex, padded to 64 characters, with the
/// `0x` prefix used on the wire for targets.
pub fn target_hex_for_diff(diff: f64) -> Result<String> {
    Ok(format_target_hex(&make_target(diff)?))
}

/// Format a big integer target as `0x`-prefixed hex, zero-padded to 64 hex digits.
pub fn format_target_hex(target: &BigUint) -> String {
    format!("0x{:0>64}", target.to_str_radix(16))
}

/// Format a block height as minimal `0x`-prefixed hex (no padding).
pub fn format_height_hex(height: u64) -> String {
    format!("0x{:x}", height)
}

/// Parse a `0x`-prefixed hex height back into a `u64`.
pub fn parse_height_hex(height_hex: &str) -> Result<u64> {
    u64::from_str_radix(strip_0x(height_hex), 16)
        .map_err(|e| PoolError::Numeric(format!("invalid height hex: {}", e)))
}

/// `floor(diff * 2^32)`, the integer "share-weighted difficulty" passed to the
/// backend for accounting. `diff` is always positive, so truncation equals floor.
pub fn share_weighted_diff(diff: f64) -> u64 {
    (diff * POW_2X32 as f64) as u64
}

/// `network_diff / 2^32`, the integer form of the network difficulty recorded
/// alongside a block candidate.
pub fn network_diff_int(network_diff: &BigUint) -> u64 {
    (network_diff >> 32u32).to_u64().unwrap_or(u64::MAX)
}

lazy_static! {
    static ref ADDRESS_RE: regex::Regex =
        regex::Regex::new(r"^0x[0-9a-fA-F]{40}$").expect("BUG: malformed address regex");
}

/// `^0x[0-9a-fA-F]{40}$` and not all-zero after stripping `0x`.
pub fn is_valid_hex_address(s: &str) -> bool {
    if !ADDRESS_RE.is_match(s) {
        return false;
    }
    !strip_0x(s).bytes().all(|b| b == b'0')
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn diff1_round_trips_through_make_target() {
        // make_target(1) == Diff1 exactly.
        let target = make_target(1.0).unwrap();
        assert_eq!(target, *DIFF1);
    }

    #[test]
    fn target_hex_to_diff_round_trips() {
        for diff in [1u64, 1 << 16, 1 << 32] {
            let target = &*POW_256 / BigUint::from(diff);
            let hex = format_target_hex(&target);
            let recovered = target_hex_to_diff(&hex).unwrap();
            assert_eq!(recovered, BigUint::from(diff));
        }
    }

    #[test]
    fn target_hex_to_diff_accepts_unprefixed_and_prefixed() {
        let a = target_hex_to_diff("0xff").unwrap();
        let b = target_hex_to_diff("ff").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn make_target_rejects_non_positive_difficulty() {
        assert!(make_target(0.0).is_err());
        assert!(make_target(-1.0).is_err());
    }

    #[test]
    fn format_target_hex_is_64_chars_padded() {
        let target = BigUint::from(0xffu32);
        let hex = format_target_hex(&target);
        assert_eq!(hex.len(), 2 + 64);
        assert!(hex.ends_with("ff"));
    }

    #[test]
    fn valid_hex_address_shape() {
        assert!(is_valid_hex_address(
            "0x1234567890abcdef1234567890abcdef12345678"
        ));
        assert!(!is_valid_hex_address(
            "0x0000000000000000000000000000000000000000"
        ));
        assert!(!is_valid_hex_address("not-an-address"));
        assert!(!is_valid_hex_address("0x123")); // too short
    }

    #[test]
    fn share_weighted_diff_truncates() {
        assert_eq!(share_weighted_diff(1.0), POW_2X32);
        assert_eq!(share_weighted_diff(0.5), POW_2X32 / 2);
    }

    #[test]
    fn height_hex_round_trips() {
        let height = 123_456u64;
        let hex = format_height_hex(height);
        assert_eq!(parse_height_hex(&hex).unwrap(), height);
    }
}
