//! Minimal ABI codec for the present snapshot read
//!
//! Only what `getPresent(bytes32)` needs: the call encoding and a decoder for
//! its return values
//!
//! ```text
//! (address sender, address[] recipients, (address,uint256)[] content,
//!  string title, string description, uint8 status, uint256 expiryTime)
//! ```
//!
//! Dynamic values are reached through offsets measured from the start of the
//! return data.

use primitive_types::U256;
use thiserror::Error;

use super::quantity::keccak256;
use crate::store::{Asset, PresentDetails, PresentId};

const WORD: usize = 32;
const HEAD_WORDS: usize = 7;

/// Errors decoding ABI return data
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AbiError {
    #[error("Invalid hex: {0}")]
    Hex(String),

    #[error("Return data too short: needed {needed} bytes, have {have}")]
    OutOfBounds { needed: usize, have: usize },

    #[error("Offset or length does not fit in memory: {0}")]
    Overflow(String),

    #[error("Invalid present id: {0}")]
    InvalidId(String),
}

/// Calldata for `getPresent(id)`
pub fn encode_get_present(id: &PresentId) -> Result<String, AbiError> {
    let body = id.as_str().trim_start_matches("0x");
    if body.len() != 64 {
        return Err(AbiError::InvalidId(id.to_string()));
    }
    hex::decode(body).map_err(|e| AbiError::Hex(e.to_string()))?;

    let selector = &keccak256(b"getPresent(bytes32)")[..4];
    Ok(format!("0x{}{}", hex::encode(selector), body))
}

/// Decode the return data of `getPresent`
///
/// Returns `Ok(None)` for empty return data or a zero sender, which is how the
/// contract reports an unknown id.
pub fn decode_present_details(raw: &str) -> Result<Option<PresentDetails>, AbiError> {
    let data = hex::decode(raw.trim_start_matches("0x")).map_err(|e| AbiError::Hex(e.to_string()))?;
    if data.is_empty() {
        return Ok(None);
    }
    ensure_len(&data, HEAD_WORDS * WORD)?;

    let sender_word = word_at(&data, 0)?;
    if sender_word.iter().all(|b| *b == 0) {
        return Ok(None);
    }
    let sender = address(sender_word);

    let recipients = read_address_array(&data, read_offset(&data, WORD)?)?;
    let assets = read_asset_array(&data, read_offset(&data, 2 * WORD)?)?;
    let message = read_string(&data, read_offset(&data, 3 * WORD)?)?;
    let metadata = read_string(&data, read_offset(&data, 4 * WORD)?)?;
    let status = word_at(&data, 5 * WORD)?[WORD - 1];
    let expiry = U256::from_big_endian(word_at(&data, 6 * WORD)?);
    let expiry_time = if expiry > U256::from(u64::MAX) {
        u64::MAX
    } else {
        expiry.as_u64()
    };

    Ok(Some(PresentDetails {
        sender,
        recipients,
        assets,
        message,
        metadata,
        status,
        expiry_time,
    }))
}

fn ensure_len(data: &[u8], needed: usize) -> Result<(), AbiError> {
    if data.len() < needed {
        return Err(AbiError::OutOfBounds {
            needed,
            have: data.len(),
        });
    }
    Ok(())
}

fn word_at(data: &[u8], offset: usize) -> Result<&[u8], AbiError> {
    let end = offset
        .checked_add(WORD)
        .ok_or_else(|| AbiError::Overflow(offset.to_string()))?;
    ensure_len(data, end)?;
    Ok(&data[offset..end])
}

fn read_offset(data: &[u8], at: usize) -> Result<usize, AbiError> {
    let value = U256::from_big_endian(word_at(data, at)?);
    if value > U256::from(u32::MAX) {
        return Err(AbiError::Overflow(value.to_string()));
    }
    Ok(value.as_usize())
}

fn address(word: &[u8]) -> String {
    format!("0x{}", hex::encode(&word[12..]))
}

fn read_address_array(data: &[u8], offset: usize) -> Result<Vec<String>, AbiError> {
    let len = read_offset(data, offset)?;
    (0..len)
        .map(|i| word_at(data, offset + WORD + i * WORD).map(address))
        .collect()
}

fn read_asset_array(data: &[u8], offset: usize) -> Result<Vec<Asset>, AbiError> {
    let len = read_offset(data, offset)?;
    (0..len)
        .map(|i| {
            let base = offset + WORD + i * 2 * WORD;
            let token = address(word_at(data, base)?);
            let amount = U256::from_big_endian(word_at(data, base + WORD)?);
            Ok(Asset::new(token, amount))
        })
        .collect()
}

fn read_string(data: &[u8], offset: usize) -> Result<String, AbiError> {
    let len = read_offset(data, offset)?;
    let start = offset + WORD;
    ensure_len(data, start + len)?;
    Ok(String::from_utf8_lossy(&data[start..start + len]).into_owned())
}
