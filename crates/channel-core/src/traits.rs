//! environment seams (spec §4, Design Note)
//!
//! `settlement` is generic over these traits so the identical guard-checking
//! and arithmetic runs unchanged whether backed by PolkaVM hostcalls
//! (`channel-contract`) or an in-memory double (`channel-sim`).

use crate::types::{Address, Balance, Channel, ChannelEvent, ChannelId, Signature65, Timestamp};

/// keccak256, the only hash this protocol uses.
pub trait Hasher {
    fn keccak256(&self, input: &[u8]) -> [u8; 32];
}

/// secp256k1 ECDSA signature recovery over a 32-byte digest.
///
/// implementors receive the *already-prefixed* digest (banner applied) and
/// must return the signing address, or `None` if recovery fails or the
/// signature is not in low-s canonical form.
pub trait Ecrecover {
    fn ecrecover(&self, prefixed_digest: [u8; 32], sig: &Signature65) -> Option<Address>;
}

/// the token ledger a channel escrows against.
///
/// `pull` moves funds from `from` into the contract's custody (open/join);
/// `push` pays them back out on close/redeem. Both are expected to fail
/// closed: an error return means no balance moved.
pub trait TokenLedger {
    type Error;

    fn pull(&mut self, token: Address, from: Address, amount: Balance) -> Result<(), Self::Error>;
    fn push(&mut self, token: Address, to: Address, amount: Balance) -> Result<(), Self::Error>;
}

/// channel persistence. a single record per id, keyed by `ChannelId`.
pub trait ChannelStore {
    fn get(&self, id: ChannelId) -> Option<Channel>;
    fn exists(&self, id: ChannelId) -> bool {
        self.get(id).is_some()
    }
    fn put(&mut self, channel: Channel);
}

/// lifecycle event emission, fire-and-forget from the core's perspective.
pub trait EventSink {
    fn emit(&mut self, event: ChannelEvent);
}

/// the current block/wall time, abstracted so the same guard logic runs
/// against a hostcall-backed block number or a simulated clock in tests.
pub trait Clock {
    fn now(&self) -> Timestamp;
}

/// apply the Ethereum "personal sign" prefix to a bare digest, then hash,
/// then recover — the full pipeline described in spec §4.B.
pub fn recover_signer<H: Hasher, E: Ecrecover>(
    hasher: &H,
    ecrecover: &E,
    digest: [u8; 32],
    sig: &Signature65,
) -> Option<Address> {
    let preimage = crate::encoding::prefixed_digest_preimage(digest);
    let prefixed = hasher.keccak256(&preimage);
    ecrecover.ecrecover(prefixed, sig)
}
