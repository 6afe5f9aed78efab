//! Hex encoding at the RPC boundary
//!
//! Block numbers and log indexes cross the wire as `0x`-prefixed hex
//! quantities. All arithmetic happens on `u64`; conversion happens here.

use sha3::{Digest, Keccak256};

use super::error::SourceError;

/// Length of a 32-byte word rendered as `0x` + 64 hex digits
pub const WORD_HEX_LEN: usize = 66;

/// Encode a number as an RPC hex quantity
pub fn to_hex_quantity(value: u64) -> String {
    format!("0x{:x}", value)
}

/// Decode an RPC hex quantity
pub fn parse_hex_quantity(raw: &str) -> Result<u64, SourceError> {
    let digits = raw
        .strip_prefix("0x")
        .ok_or_else(|| SourceError::Decode(format!("quantity without 0x prefix: {}", raw)))?;
    if digits.is_empty() {
        return Err(SourceError::Decode("empty quantity".to_string()));
    }
    u64::from_str_radix(digits, 16)
        .map_err(|e| SourceError::Decode(format!("invalid quantity {}: {}", raw, e)))
}

/// Whether `raw` is a well-formed 32-byte hex word
pub fn is_word(raw: &str) -> bool {
    raw.len() == WORD_HEX_LEN
        && raw.starts_with("0x")
        && raw[2..].bytes().all(|b| b.is_ascii_hexdigit())
}

/// Extract an address from a 32-byte topic (low-order 20 bytes)
pub fn address_from_topic(topic: &str) -> Option<String> {
    if !is_word(topic) {
        return None;
    }
    Some(format!("0x{}", topic[26..].to_ascii_lowercase()))
}

/// Keccak-256 hash of arbitrary bytes
pub fn keccak256(data: impl AsRef<[u8]>) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(data.as_ref());
    hasher.finalize().into()
}

/// Topic hash of an event or function signature, as `0x` hex
pub fn signature_hash(signature: &str) -> String {
    format!("0x{}", hex::encode(keccak256(signature.as_bytes())))
}
