//! Parsing of EVM addresses, hashes and ABI words at the JSON-RPC boundary.

use alloy_primitives::{Address, B256, U256, hex};
use std::str::FromStr;

/// Parse a `0x`-prefixed 20-byte address. Checksum casing is not enforced.
pub fn parse_address(address: &str) -> Option<Address> {
    let trimmed = address.trim();
    if !has_hex_prefix(trimmed) {
        return None;
    }
    Address::from_str(trimmed).ok()
}

/// Parse a `0x`-prefixed 32-byte hash or ABI word.
pub fn parse_word(word: &str) -> Option<B256> {
    let trimmed = word.trim();
    if !has_hex_prefix(trimmed) {
        return None;
    }
    B256::from_str(trimmed).ok()
}

pub fn is_valid_tx_hash(hash: &str) -> bool {
    parse_word(hash).is_some()
}

fn has_hex_prefix(value: &str) -> bool {
    value.starts_with("0x")
}

/// Whether a hex string names `address`. Malformed strings match nothing.
pub fn is_address(value: &str, address: Address) -> bool {
    parse_address(value) == Some(address)
}

/// Decode a big-endian 256-bit word.
pub fn decode_word(word: &str) -> Option<U256> {
    parse_word(word).map(|word| U256::from_be_bytes(word.0))
}

/// The first 32-byte word of ABI data.
pub fn first_data_word(data: &str) -> Option<U256> {
    let bytes = hex::decode(data.trim()).ok()?;
    bytes.get(..32).map(U256::from_be_slice)
}

/// Encode `value` as a 0x-prefixed 32-byte topic.
pub fn encode_word(value: U256) -> String {
    hex::encode_prefixed(value.to_be_bytes::<32>())
}
