//! bilateral payment channel settlement core
//!
//! channel opening, counterparty join, signed-receipt close/challenge, and
//! final distribution, parameterized over the host environment (storage,
//! token ledger, event sink, clock, hashing, signature recovery) so the same
//! logic runs unchanged on-chain (`channel-contract`) and in a host-side
//! simulation (`channel-sim`).

#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

pub mod channel;
pub mod encoding;
pub mod error;
pub mod guards;
pub mod settlement;
pub mod traits;
pub mod types;

pub use channel::*;
pub use error::*;
pub use traits::*;
pub use types::*;
