//! Address string codec.
//!
//! Accounts are addressed by hex strings over their 20-byte key hash. The
//! production address format (checksummed bech32) lives outside this crate;
//! this codec is the minimal round-trip the engine itself needs.

use crate::error::{StateError, StateResult};
use crate::types::{PKHash, PKHASH_SIZE};

/// Decodes an address string into its 20-byte key hash.
pub fn address_to_pkhash(address: &str) -> StateResult<PKHash> {
    let bytes = hex::decode(address)
        .map_err(|e| StateError::serialization(format!("invalid address {address}: {e}")))?;
    if bytes.len() != PKHASH_SIZE {
        return Err(StateError::serialization(format!(
            "invalid address {address}: expected {PKHASH_SIZE} bytes, got {}",
            bytes.len()
        )));
    }
    PKHash::from_slice(&bytes)
}

/// Encodes a key hash back into its address string.
pub fn pkhash_to_address(pk_hash: &PKHash) -> String {
    hex::encode(pk_hash.as_bytes())
}
