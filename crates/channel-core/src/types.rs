//! core types for the settlement protocol

pub use primitive_types::{H160 as Address, H256, U256};

use parity_scale_codec::{Decode, Encode};
use scale_info::TypeInfo;

/// channel identifier: keccak256(token || partyA || partyB || block_number)
pub type ChannelId = H256;

/// escrowed balance / nonce, checked 256-bit unsigned throughout
pub type Balance = U256;
pub type Nonce = U256;

/// wall-clock seconds (monotonic) and durations measured in the same unit
pub type Timestamp = u64;

/// a 65-byte `(r, s, v)` ECDSA signature over a prefixed receipt digest
#[derive(Clone, Copy, Debug, Encode, Decode, TypeInfo, PartialEq, Eq)]
pub struct Signature65 {
    pub r: [u8; 32],
    pub s: [u8; 32],
    pub v: u8,
}

impl Signature65 {
    pub fn from_bytes(bytes: &[u8; 65]) -> Self {
        let mut r = [0u8; 32];
        let mut s = [0u8; 32];
        r.copy_from_slice(&bytes[0..32]);
        s.copy_from_slice(&bytes[32..64]);
        Self { r, s, v: bytes[64] }
    }

    pub fn to_bytes(&self) -> [u8; 65] {
        let mut out = [0u8; 65];
        out[0..32].copy_from_slice(&self.r);
        out[32..64].copy_from_slice(&self.s);
        out[64] = self.v;
        out
    }
}

/// status of a channel record, see the lifecycle in the data model
#[derive(Clone, Copy, Debug, Encode, Decode, TypeInfo, PartialEq, Eq)]
pub enum ChannelStatus {
    Open,
    OnChallenge,
    Closed,
}

/// the only persistent entity: a bilateral escrow record
#[derive(Clone, Debug, Encode, Decode, TypeInfo, PartialEq, Eq)]
pub struct Channel {
    pub id: ChannelId,
    pub token: Address,
    pub party_a: Address,
    pub party_b: Address,
    pub balance_a: Balance,
    pub balance_b: Balance,
    pub nonce: Nonce,
    pub close_time: Timestamp,
    pub challenge_period: Timestamp,
    pub status: ChannelStatus,
    /// true once `join` has been called, regardless of deposited amount.
    /// `balanceB == 0` alone cannot distinguish "never joined" from "joined
    /// with a zero stake" (see DESIGN.md, Open Question 1), so this field
    /// is the authoritative single-shot-join detector.
    pub joined: bool,
}

impl Channel {
    pub fn total(&self) -> Balance {
        // never overflows: both operands already passed a checked_add at
        // the point they were stored.
        self.balance_a.saturating_add(self.balance_b)
    }

    pub fn is_party(&self, who: Address) -> bool {
        who == self.party_a || who == self.party_b
    }

    pub fn challenge_deadline(&self) -> Option<Timestamp> {
        self.close_time.checked_add(self.challenge_period)
    }
}

/// lifecycle event carrying enough payload for off-chain indexers
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChannelEvent {
    ChannelOpened {
        id: ChannelId,
        party_a: Address,
        party_b: Address,
    },
    CounterPartyJoined {
        id: ChannelId,
    },
    ChannelOnChallenge {
        id: ChannelId,
    },
    ChannelChallenged {
        id: ChannelId,
    },
    ChannelClosed {
        id: ChannelId,
    },
}

impl ChannelEvent {
    pub fn channel_id(&self) -> ChannelId {
        match self {
            ChannelEvent::ChannelOpened { id, .. } => *id,
            ChannelEvent::CounterPartyJoined { id } => *id,
            ChannelEvent::ChannelOnChallenge { id } => *id,
            ChannelEvent::ChannelChallenged { id } => *id,
            ChannelEvent::ChannelClosed { id } => *id,
        }
    }
}

/// a signed receipt as produced off-chain and submitted to `close`/`challenge`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Receipt {
    pub channel_id: ChannelId,
    pub nonce: Nonce,
    pub balance_a: Balance,
    pub balance_b: Balance,
}
