//! host-side implementations of `channel-core`'s `Hasher`/`Ecrecover` seams
//!
//! on-chain (`channel-contract`) gets the same two behaviors from PolkaVM
//! hostcalls; this crate exists so tests, `channel-sim`, and the `demo` CLI
//! can run the identical settlement logic off-chain without a runtime.

use channel_core::{Address, Ecrecover, Hasher, Signature65};
use k256::ecdsa::{RecoveryId, Signature, SigningKey, VerifyingKey};
use sha3::{Digest, Keccak256};

#[derive(Clone, Copy, Debug, Default)]
pub struct Keccak256Hasher;

impl Hasher for Keccak256Hasher {
    fn keccak256(&self, input: &[u8]) -> [u8; 32] {
        let mut hasher = Keccak256::new();
        hasher.update(input);
        hasher.finalize().into()
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct EcdsaEcrecover;

impl Ecrecover for EcdsaEcrecover {
    fn ecrecover(&self, prefixed_digest: [u8; 32], sig: &Signature65) -> Option<Address> {
        let signature = Signature::from_scalars(sig.r, sig.s).ok()?;
        // reject non-canonical (high-s) signatures: a valid recid/low-s pair
        // is the only form this protocol accepts, matching the on-chain
        // hostcall's own rejection of malleable signatures.
        if signature.s().is_high().into() {
            return None;
        }
        let recid = RecoveryId::from_byte(normalize_v(sig.v))?;
        let verifying_key = VerifyingKey::recover_from_prehash(&prefixed_digest, &signature, recid).ok()?;
        Some(public_key_to_address(&verifying_key))
    }
}

fn normalize_v(v: u8) -> u8 {
    match v {
        27 | 28 => v - 27,
        other => other & 1,
    }
}

/// Ethereum-style address derivation: keccak256 of the uncompressed public
/// key (sans the 0x04 tag byte), low 20 bytes.
pub fn public_key_to_address(key: &VerifyingKey) -> Address {
    let encoded = key.to_encoded_point(false);
    let mut hasher = Keccak256::new();
    hasher.update(&encoded.as_bytes()[1..]);
    let digest: [u8; 32] = hasher.finalize().into();
    Address::from_slice(&digest[12..32])
}

/// sign a prefixed digest with a raw secp256k1 private key, for off-chain
/// tooling (the `demo` CLI and integration tests). Not used on-chain.
pub fn sign_prehash(signing_key: &SigningKey, prefixed_digest: [u8; 32]) -> Signature65 {
    let (signature, recid) = signing_key
        .sign_prehash_recoverable(&prefixed_digest)
        .expect("secp256k1 signing over a fixed-size digest cannot fail");
    let r: [u8; 32] = signature.r().to_bytes().into();
    let s: [u8; 32] = signature.s().to_bytes().into();
    Signature65 { r, s, v: recid.to_byte() + 27 }
}
