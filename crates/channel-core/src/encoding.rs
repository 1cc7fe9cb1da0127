//! canonical byte layouts (spec §4.A)
//!
//! tight concatenation, no separators or length prefixes — these preimages
//! are a wire format shared with off-chain signing tooling (`demo`) and must
//! match byte-for-byte regardless of which hash function ends up wrapping
//! them.

use alloc::vec::Vec;

use crate::types::{Address, Balance, ChannelId, Nonce};

/// preimage for the channel id: token(20) || partyA(20) || partyB(20) || block_number(32, BE)
pub fn channel_id_preimage(token: Address, party_a: Address, party_b: Address, block_number: u64) -> Vec<u8> {
    let mut buf = Vec::with_capacity(20 + 20 + 20 + 32);
    buf.extend_from_slice(token.as_bytes());
    buf.extend_from_slice(party_a.as_bytes());
    buf.extend_from_slice(party_b.as_bytes());
    let mut block_be = [0u8; 32];
    block_be[24..32].copy_from_slice(&block_number.to_be_bytes());
    buf.extend_from_slice(&block_be);
    buf
}

/// preimage for a receipt digest: channel_id(32) || balanceA(32, BE) || balanceB(32, BE) || nonce(32, BE)
pub fn receipt_digest_preimage(channel_id: ChannelId, balance_a: Balance, balance_b: Balance, nonce: Nonce) -> Vec<u8> {
    let mut buf = Vec::with_capacity(32 * 4);
    buf.extend_from_slice(channel_id.as_bytes());
    let mut tmp = [0u8; 32];
    balance_a.to_big_endian(&mut tmp);
    buf.extend_from_slice(&tmp);
    balance_b.to_big_endian(&mut tmp);
    buf.extend_from_slice(&tmp);
    nonce.to_big_endian(&mut tmp);
    buf.extend_from_slice(&tmp);
    buf
}

/// the fixed ASCII banner that off-chain signing tools prefix before hashing
pub const ETH_SIGNED_MESSAGE_BANNER: &[u8] = b"\x19Ethereum Signed Message:\n32";

/// preimage for the "prefixed digest" (spec §4.B step 1): banner || digest(32)
pub fn prefixed_digest_preimage(digest: [u8; 32]) -> [u8; 29 + 32] {
    let mut buf = [0u8; 29 + 32];
    buf[..29].copy_from_slice(ETH_SIGNED_MESSAGE_BANNER);
    buf[29..].copy_from_slice(&digest);
    buf
}
