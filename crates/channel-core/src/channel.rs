//! channel construction helpers
//!
//! the pure data model lives in [`crate::types::Channel`]; this module holds
//! the logic for deriving a fresh record from an `open` call, kept separate
//! from [`crate::settlement`] so it can be unit tested without a trait
//! environment.

use crate::encoding::channel_id_preimage;
use crate::error::Error;
use crate::traits::Hasher;
use crate::types::{Address, Balance, Channel, ChannelId, ChannelStatus, Timestamp};

/// derive the deterministic id for a would-be channel, per spec §4.A.
pub fn derive_channel_id<H: Hasher>(
    hasher: &H,
    token: Address,
    party_a: Address,
    party_b: Address,
    block_number: u64,
) -> ChannelId {
    let preimage = channel_id_preimage(token, party_a, party_b, block_number);
    ChannelId::from(hasher.keccak256(&preimage))
}

/// build the initial record for a new channel. Does not check for an id
/// collision against the store — that is `settlement::open`'s job, since it
/// needs the store to do it.
pub fn new_channel(
    id: ChannelId,
    token: Address,
    party_a: Address,
    party_b: Address,
    deposit_a: Balance,
    challenge_period: Timestamp,
) -> Result<Channel, Error> {
    if party_a == party_b {
        return Err(Error::SelfChannel);
    }
    if deposit_a.is_zero() {
        return Err(Error::ZeroDeposit);
    }

    Ok(Channel {
        id,
        token,
        party_a,
        party_b,
        balance_a: deposit_a,
        balance_b: Balance::zero(),
        nonce: crate::types::Nonce::zero(),
        close_time: 0,
        challenge_period,
        status: ChannelStatus::Open,
        joined: false,
    })
}
